//! Plaintext "hash": stores the secret verbatim.
//!
//! Exists so contexts can accept credential stores that were never
//! hashed and migrate them on first login. Identifies every string, so
//! it must be configured last in a context.

use crate::consteq;
use crate::error::{Error, Result};
use crate::scheme::{Descriptor, Hasher, HashInfo, HashSettings, TruncatePolicy};

static DESC: Descriptor = Descriptor {
    name: "plaintext",
    aliases: &[],
    idents: &[],
    default_ident: None,
    setting_kwds: &[],
    context_kwds: &[],
    rounds: None,
    salt: None,
    checksum_size: 0,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

/// The identity scheme.
pub struct Plaintext;

impl Plaintext {
    /// The plaintext scheme.
    pub fn new() -> Self {
        Plaintext
    }
}

impl Default for Plaintext {
    fn default() -> Self {
        Plaintext::new()
    }
}

impl Hasher for Plaintext {
    fn descriptor(&self) -> &Descriptor {
        &DESC
    }

    fn hash(&self, secret: &[u8], _settings: &HashSettings) -> Result<String> {
        String::from_utf8(secret.to_vec()).map_err(|_| Error::PasswordValue)
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        Ok(consteq(secret, hash.as_bytes()))
    }

    fn inspect(&self, _hash: &str) -> Result<HashInfo> {
        Ok(HashInfo {
            ident: "plaintext".to_owned(),
            has_checksum: true,
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, _settings: &HashSettings) -> Result<String> {
        Ok(String::new())
    }

    fn genhash(&self, secret: &[u8], _config: &str) -> Result<String> {
        self.hash(secret, &HashSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_verbatim() {
        let h = Plaintext::new();
        assert_eq!(h.hash(b"password", &HashSettings::default()).unwrap(), "password");
        assert!(h.verify(b"password", "password", &HashSettings::default()).unwrap());
        assert!(!h.verify(b"password", "Password", &HashSettings::default()).unwrap());
        assert!(h.identify("anything at all"));
    }
}
