//! Legacy database hash formats: MySQL (old and 4.1), PostgreSQL
//! `md5`, Oracle 11g, and the bare hex digest family.
//!
//! None of these are acceptable defaults; they exist so stored
//! credentials can be verified and migrated off.

use md5::Md5;
use sha1::Sha1;
use sha2::digest::Digest;
use sha2::{Sha256, Sha512};

use crate::consteq;
use crate::encode::{hex_encode, hex_encode_upper, is_hex};
use crate::error::{Error, Result};
use crate::scheme::{Descriptor, Hasher, HashInfo, HashSettings, SaltSpec, TruncatePolicy};

const ORACLE_SALT: SaltSpec = SaltSpec {
    min_size: 10,
    max_size: 10,
    default_size: 10,
    chars: None,
};

#[derive(Clone, Copy)]
enum Kind {
    HexMd5,
    HexSha1,
    HexSha256,
    HexSha512,
    Mysql323,
    Mysql41,
    PostgresMd5,
    Oracle11,
}

macro_rules! digest_desc {
    ($name:literal, $aliases:expr, $checksum:expr) => {
        Descriptor {
            name: $name,
            aliases: $aliases,
            idents: &[],
            default_ident: None,
            setting_kwds: &[],
            context_kwds: &[],
            rounds: None,
            salt: None,
            checksum_size: $checksum,
            truncate_size: None,
            truncate_policy: TruncatePolicy::Silent,
        }
    };
}

static HEX_MD5_DESC: Descriptor = digest_desc!("hex_md5", &["hex-md5"], 32);
static HEX_SHA1_DESC: Descriptor = digest_desc!("hex_sha1", &["hex-sha1"], 40);
static HEX_SHA256_DESC: Descriptor = digest_desc!("hex_sha256", &["hex-sha256"], 64);
static HEX_SHA512_DESC: Descriptor = digest_desc!("hex_sha512", &["hex-sha512"], 128);
static MYSQL323_DESC: Descriptor = digest_desc!("mysql323", &["mysql-323", "mysql_old"], 16);
static MYSQL41_DESC: Descriptor = digest_desc!("mysql41", &["mysql-41"], 40);

static POSTGRES_DESC: Descriptor = Descriptor {
    name: "postgres_md5",
    aliases: &["postgres-md5"],
    idents: &[],
    default_ident: None,
    setting_kwds: &[],
    context_kwds: &["user"],
    rounds: None,
    salt: None,
    checksum_size: 32,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static ORACLE11_DESC: Descriptor = Descriptor {
    name: "oracle11",
    aliases: &["oracle-11"],
    idents: &[],
    default_ident: None,
    setting_kwds: &["salt"],
    context_kwds: &[],
    rounds: None,
    salt: Some(ORACLE_SALT),
    checksum_size: 40,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

fn hex_digest<D: Digest>(secret: &[u8]) -> String {
    hex_encode(&D::digest(secret))
}

/// The old MySQL PASSWORD() function, pre-4.1. Spaces and tabs in the
/// secret are skipped, as the server does.
fn mysql323_digest(secret: &[u8]) -> String {
    let mut nr1: u32 = 0x5030_5735;
    let mut nr2: u32 = 0x1234_5671;
    let mut add: u32 = 7;
    for &b in secret {
        if b == b' ' || b == b'\t' {
            continue;
        }
        let tmp = b as u32;
        nr1 ^= (nr1 & 63)
            .wrapping_add(add)
            .wrapping_mul(tmp)
            .wrapping_add(nr1 << 8);
        nr2 = nr2.wrapping_add((nr2 << 8) ^ nr1);
        add = add.wrapping_add(tmp);
    }
    format!("{:08x}{:08x}", nr1 & 0x7fff_ffff, nr2 & 0x7fff_ffff)
}

fn mysql41_digest(secret: &[u8]) -> String {
    let inner = Sha1::digest(secret);
    format!("*{}", hex_encode_upper(&Sha1::digest(inner)))
}

fn postgres_digest(secret: &[u8], user: &str) -> String {
    let mut d = Md5::new();
    d.update(secret);
    d.update(user.as_bytes());
    format!("md5{}", hex_encode(&d.finalize()))
}

fn oracle11_digest(secret: &[u8], salt: &[u8]) -> String {
    let mut d = Sha1::new();
    d.update(secret);
    d.update(salt);
    format!(
        "S:{}{}",
        hex_encode_upper(&d.finalize()),
        hex_encode_upper(salt)
    )
}

/// One of the fixed-width legacy digest schemes.
pub struct DigestScheme {
    desc: &'static Descriptor,
    kind: Kind,
}

impl DigestScheme {
    /// Bare lowercase hex MD5.
    pub fn hex_md5() -> Self {
        Self { desc: &HEX_MD5_DESC, kind: Kind::HexMd5 }
    }

    /// Bare lowercase hex SHA-1.
    pub fn hex_sha1() -> Self {
        Self { desc: &HEX_SHA1_DESC, kind: Kind::HexSha1 }
    }

    /// Bare lowercase hex SHA-256.
    pub fn hex_sha256() -> Self {
        Self { desc: &HEX_SHA256_DESC, kind: Kind::HexSha256 }
    }

    /// Bare lowercase hex SHA-512.
    pub fn hex_sha512() -> Self {
        Self { desc: &HEX_SHA512_DESC, kind: Kind::HexSha512 }
    }

    /// MySQL `PASSWORD()` before 4.1.
    pub fn mysql323() -> Self {
        Self { desc: &MYSQL323_DESC, kind: Kind::Mysql323 }
    }

    /// MySQL 4.1 `PASSWORD()`: `*` plus uppercase hex of a double
    /// SHA-1.
    pub fn mysql41() -> Self {
        Self { desc: &MYSQL41_DESC, kind: Kind::Mysql41 }
    }

    /// PostgreSQL `md5` auth hash; binds the hash to the login name
    /// via the `user` context keyword.
    pub fn postgres_md5() -> Self {
        Self { desc: &POSTGRES_DESC, kind: Kind::PostgresMd5 }
    }

    /// Oracle 11g `S:` SHA-1 hash with a 10-byte salt.
    pub fn oracle11() -> Self {
        Self { desc: &ORACLE11_DESC, kind: Kind::Oracle11 }
    }

    fn check_shape(&self, hash: &str) -> Result<()> {
        let ok = match self.kind {
            Kind::HexMd5 => hash.len() == 32 && is_hex(hash),
            Kind::HexSha1 => hash.len() == 40 && is_hex(hash),
            Kind::HexSha256 => hash.len() == 64 && is_hex(hash),
            Kind::HexSha512 => hash.len() == 128 && is_hex(hash),
            Kind::Mysql323 => hash.len() == 16 && is_hex(hash),
            Kind::Mysql41 => {
                hash.len() == 41
                    && hash.starts_with('*')
                    && is_hex(&hash[1..])
                    && !hash[1..].bytes().any(|b| b.is_ascii_lowercase())
            }
            Kind::PostgresMd5 => {
                hash.len() == 35 && hash.starts_with("md5") && is_hex(&hash[3..])
            }
            Kind::Oracle11 => {
                hash.len() == 62
                    && hash.starts_with("S:")
                    && is_hex(&hash[2..])
                    && !hash[2..].bytes().any(|b| b.is_ascii_lowercase())
            }
        };
        if ok { Ok(()) } else { Err(Error::MalformedHash) }
    }

    fn recompute(&self, secret: &[u8], hash: &str, settings: &HashSettings) -> Result<String> {
        Ok(match self.kind {
            Kind::HexMd5 => hex_digest::<Md5>(secret),
            Kind::HexSha1 => hex_digest::<Sha1>(secret),
            Kind::HexSha256 => hex_digest::<Sha256>(secret),
            Kind::HexSha512 => hex_digest::<Sha512>(secret),
            Kind::Mysql323 => mysql323_digest(secret),
            Kind::Mysql41 => mysql41_digest(secret),
            Kind::PostgresMd5 => {
                let user = settings
                    .user
                    .as_deref()
                    .ok_or_else(|| Error::Config("postgres_md5 requires a user".into()))?;
                postgres_digest(secret, user)
            }
            Kind::Oracle11 => {
                let salt = crate::encode::hex_decode(&hash[42..].to_ascii_lowercase())?;
                oracle11_digest(secret, &salt)
            }
        })
    }
}

impl Hasher for DigestScheme {
    fn descriptor(&self) -> &Descriptor {
        self.desc
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        Ok(match self.kind {
            Kind::HexMd5 => hex_digest::<Md5>(secret),
            Kind::HexSha1 => hex_digest::<Sha1>(secret),
            Kind::HexSha256 => hex_digest::<Sha256>(secret),
            Kind::HexSha512 => hex_digest::<Sha512>(secret),
            Kind::Mysql323 => mysql323_digest(secret),
            Kind::Mysql41 => mysql41_digest(secret),
            Kind::PostgresMd5 => {
                let user = settings
                    .user
                    .as_deref()
                    .ok_or_else(|| Error::Config("postgres_md5 requires a user".into()))?;
                postgres_digest(secret, user)
            }
            Kind::Oracle11 => {
                let salt =
                    ORACLE_SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
                oracle11_digest(secret, &salt)
            }
        })
    }

    fn verify(&self, secret: &[u8], hash: &str, settings: &HashSettings) -> Result<bool> {
        self.check_shape(hash)?;
        let expected = self.recompute(secret, hash, settings)?;
        // mysql323 and the hex family are case-insensitive on input
        let normalized = match self.kind {
            Kind::Mysql41 | Kind::Oracle11 => hash.to_owned(),
            _ => hash.to_ascii_lowercase(),
        };
        Ok(consteq(expected.as_bytes(), normalized.as_bytes()))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        self.check_shape(hash)?;
        let (salt, salt_len) = match self.kind {
            Kind::Oracle11 => (Some(hash[42..].to_owned()), Some(10)),
            _ => (None, None),
        };
        Ok(HashInfo {
            ident: self.desc.name.to_owned(),
            salt,
            salt_len,
            has_checksum: true,
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        match self.kind {
            Kind::Oracle11 => {
                let salt =
                    ORACLE_SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
                Ok(format!(
                    "S:{}{}",
                    "0".repeat(40),
                    hex_encode_upper(&salt)
                ))
            }
            _ => Err(Error::Config(
                "scheme stores no settings; genconfig is meaningless".into(),
            )),
        }
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        match self.kind {
            Kind::PostgresMd5 => Err(Error::Config(
                "postgres_md5 requires the user context keyword".into(),
            )),
            _ => {
                self.check_shape(config)?;
                self.recompute(secret, config, &HashSettings::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> HashSettings {
        HashSettings::default()
    }

    #[test]
    fn mysql323_vector() {
        let h = DigestScheme::mysql323();
        assert_eq!(h.hash(b"password", &none()).unwrap(), "5d2e19393cc5ef67");
        assert!(h.verify(b"password", "5d2e19393cc5ef67", &none()).unwrap());
        // whitespace is ignored by the server's function
        assert_eq!(
            h.hash(b"pass word", &none()).unwrap(),
            h.hash(b"password", &none()).unwrap()
        );
    }

    #[test]
    fn mysql41_vector() {
        let h = DigestScheme::mysql41();
        let out = h.hash(b"password", &none()).unwrap();
        assert_eq!(out, "*2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19");
        assert!(h.verify(b"password", &out, &none()).unwrap());
        assert!(!h.verify(b"passwore", &out, &none()).unwrap());
        assert!(h.identify(&out));
        assert!(!h.identify("2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19"));
    }

    #[test]
    fn postgres_binds_user() {
        let h = DigestScheme::postgres_md5();
        let out = h
            .hash(b"secret", &HashSettings::default().user("admin"))
            .unwrap();
        assert!(out.starts_with("md5"));
        assert_eq!(out.len(), 35);
        assert!(
            h.verify(b"secret", &out, &HashSettings::default().user("admin"))
                .unwrap()
        );
        assert!(
            !h.verify(b"secret", &out, &HashSettings::default().user("other"))
                .unwrap()
        );
        assert!(matches!(
            h.verify(b"secret", &out, &none()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn oracle11_roundtrip() {
        let h = DigestScheme::oracle11();
        let out = h.hash(b"SHAlala", &none()).unwrap();
        assert_eq!(out.len(), 62);
        assert!(out.starts_with("S:"));
        assert!(h.identify(&out));
        assert!(h.verify(b"SHAlala", &out, &none()).unwrap());
        assert!(!h.verify(b"SHAlalb", &out, &none()).unwrap());
        let info = h.inspect(&out).unwrap();
        assert_eq!(info.salt_len, Some(10));
    }

    #[test]
    fn hex_family() {
        let h = DigestScheme::hex_sha256();
        let out = h.hash(b"password", &none()).unwrap();
        assert_eq!(
            out,
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert!(h.verify(b"password", &out, &none()).unwrap());
        assert!(h.verify(b"password", &out.to_uppercase(), &none()).unwrap());
        assert!(!DigestScheme::hex_md5().identify(&out));
    }

    #[test]
    fn shapes_are_disjoint() {
        let candidates = [
            DigestScheme::hex_md5(),
            DigestScheme::mysql323(),
            DigestScheme::mysql41(),
            DigestScheme::postgres_md5(),
            DigestScheme::oracle11(),
        ];
        let mysql_old = "5d2e19393cc5ef67";
        let matches = candidates.iter().filter(|h| h.identify(mysql_old)).count();
        assert_eq!(matches, 1);
    }
}
