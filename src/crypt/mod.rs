//! The scheme catalogue: one module per supported algorithm family.

pub mod argon2;
pub mod bcrypt;
pub mod digest;
pub mod ldap;
pub mod md5_crypt;
pub mod pbkdf2;
pub mod plaintext;
pub mod scrypt;
pub mod sha_crypt;

pub use argon2::Argon2Hasher;
pub use bcrypt::Bcrypt;
pub use digest::DigestScheme;
pub use ldap::{LdapCrypt, LdapDigest, LdapPlain};
pub use md5_crypt::Md5Crypt;
pub use pbkdf2::Pbkdf2;
pub use plaintext::Plaintext;
pub use scrypt::Scrypt;
pub use sha_crypt::ShaCrypt;
