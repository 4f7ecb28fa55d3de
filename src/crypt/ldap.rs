//! RFC 2307 LDAP password schemes: `{MD5}`, `{SHA}`, `{SMD5}`,
//! `{SSHA}`, `{PLAIN}` and the `{CRYPT}` wrapper around the
//! crypt-family formats.
//!
//! # Hash Format
//!
//! __`{SCHEME}`__*`{payload}`*. For the digest schemes the payload is
//! the padded base64 of the raw digest, with the salt bytes appended
//! to the digest before encoding in the salted variants. `{PLAIN}`
//! carries the secret verbatim. `{CRYPT}` carries an ordinary
//! modular-crypt hash and resolves it through the registry catalogue.

use std::str;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::consteq;
use crate::error::{Error, Result};
use crate::registry;
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, SaltSpec, TruncatePolicy,
};

const SALT: SaltSpec = SaltSpec {
    min_size: 4,
    max_size: 16,
    default_size: 8,
    chars: None,
};

#[derive(Clone, Copy)]
enum Alg {
    Md5,
    Sha1,
}

impl Alg {
    fn digest_len(self) -> usize {
        match self {
            Alg::Md5 => 16,
            Alg::Sha1 => 20,
        }
    }

    fn digest(self, secret: &[u8], salt: &[u8]) -> Vec<u8> {
        match self {
            Alg::Md5 => {
                let mut d = Md5::new();
                d.update(secret);
                d.update(salt);
                d.finalize().to_vec()
            }
            Alg::Sha1 => {
                let mut d = Sha1::new();
                d.update(secret);
                d.update(salt);
                d.finalize().to_vec()
            }
        }
    }
}

static LDAP_MD5_DESC: Descriptor = Descriptor {
    name: "ldap_md5",
    aliases: &["ldap-md5"],
    idents: &["{MD5}"],
    default_ident: Some("{MD5}"),
    setting_kwds: &[],
    context_kwds: &[],
    rounds: None,
    salt: None,
    checksum_size: 24,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static LDAP_SHA1_DESC: Descriptor = Descriptor {
    name: "ldap_sha1",
    aliases: &["ldap-sha1"],
    idents: &["{SHA}"],
    default_ident: Some("{SHA}"),
    setting_kwds: &[],
    context_kwds: &[],
    rounds: None,
    salt: None,
    checksum_size: 28,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static LDAP_SMD5_DESC: Descriptor = Descriptor {
    name: "ldap_salted_md5",
    aliases: &["ldap-salted-md5", "smd5"],
    idents: &["{SMD5}"],
    default_ident: Some("{SMD5}"),
    setting_kwds: &["salt", "salt_size"],
    context_kwds: &[],
    rounds: None,
    salt: Some(SALT),
    checksum_size: 16,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static LDAP_SSHA1_DESC: Descriptor = Descriptor {
    name: "ldap_salted_sha1",
    aliases: &["ldap-salted-sha1", "ssha"],
    idents: &["{SSHA}"],
    default_ident: Some("{SSHA}"),
    setting_kwds: &["salt", "salt_size"],
    context_kwds: &[],
    rounds: None,
    salt: Some(SALT),
    checksum_size: 20,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

/// An RFC 2307 digest scheme, salted or not.
pub struct LdapDigest {
    desc: &'static Descriptor,
    alg: Alg,
    salted: bool,
}

impl LdapDigest {
    /// `{MD5}`: unsalted MD5.
    pub fn md5() -> Self {
        LdapDigest {
            desc: &LDAP_MD5_DESC,
            alg: Alg::Md5,
            salted: false,
        }
    }

    /// `{SHA}`: unsalted SHA-1.
    pub fn sha1() -> Self {
        LdapDigest {
            desc: &LDAP_SHA1_DESC,
            alg: Alg::Sha1,
            salted: false,
        }
    }

    /// `{SMD5}`: salted MD5.
    pub fn salted_md5() -> Self {
        LdapDigest {
            desc: &LDAP_SMD5_DESC,
            alg: Alg::Md5,
            salted: true,
        }
    }

    /// `{SSHA}`: salted SHA-1.
    pub fn salted_sha1() -> Self {
        LdapDigest {
            desc: &LDAP_SSHA1_DESC,
            alg: Alg::Sha1,
            salted: true,
        }
    }

    fn prefix(&self) -> &'static str {
        self.desc.idents[0]
    }

    /// Payload bytes: digest, then salt (empty for the unsalted forms).
    fn split_payload(&self, hash: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let payload = hash.strip_prefix(self.prefix()).ok_or(Error::MalformedHash)?;
        if payload.is_empty() {
            return Ok(None);
        }
        let raw = STANDARD.decode(payload).map_err(|_| Error::MalformedHash)?;
        let dlen = self.alg.digest_len();
        if raw.len() < dlen {
            return Err(Error::MalformedHash);
        }
        let salt = raw[dlen..].to_vec();
        if self.salted {
            SALT.check_len(salt.len())?;
        } else if !salt.is_empty() {
            return Err(Error::MalformedHash);
        }
        Ok(Some((raw[..dlen].to_vec(), salt)))
    }

    fn serialize(&self, secret: &[u8], salt: &[u8]) -> String {
        let mut payload = self.alg.digest(secret, salt);
        payload.extend_from_slice(salt);
        format!("{}{}", self.prefix(), STANDARD.encode(&payload))
    }
}

impl Hasher for LdapDigest {
    fn descriptor(&self) -> &Descriptor {
        self.desc
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        let salt = if self.salted {
            SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?
        } else {
            Vec::new()
        };
        Ok(self.serialize(secret, &salt))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        let Some((digest, salt)) = self.split_payload(hash)? else {
            return Err(Error::InvalidHash("missing checksum"));
        };
        let expected = self.alg.digest(secret, &salt);
        Ok(consteq(&expected, &digest))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let payload = self.split_payload(hash)?;
        let salt_len = payload.as_ref().map(|(_, salt)| salt.len());
        Ok(HashInfo {
            ident: self.prefix().to_owned(),
            salt: payload.map(|(_, salt)| STANDARD.encode(salt)),
            salt_len,
            has_checksum: salt_len.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        if !self.salted {
            return Ok(self.prefix().to_owned());
        }
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        let mut payload = vec![0u8; self.alg.digest_len()];
        payload.extend_from_slice(&salt);
        Ok(format!("{}{}", self.prefix(), STANDARD.encode(&payload)))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let salt = match self.split_payload(config)? {
            Some((_, salt)) => salt,
            None => Vec::new(),
        };
        Ok(self.serialize(secret, &salt))
    }
}

static LDAP_PLAIN_DESC: Descriptor = Descriptor {
    name: "ldap_plaintext",
    aliases: &["ldap_plain"],
    idents: &["{PLAIN}"],
    default_ident: Some("{PLAIN}"),
    setting_kwds: &[],
    context_kwds: &[],
    rounds: None,
    salt: None,
    checksum_size: 0,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

/// `{PLAIN}`: the verbatim-secret userPassword form.
pub struct LdapPlain;

impl LdapPlain {
    /// The `{PLAIN}` scheme.
    pub fn new() -> Self {
        LdapPlain
    }
}

impl Default for LdapPlain {
    fn default() -> Self {
        LdapPlain::new()
    }
}

impl Hasher for LdapPlain {
    fn descriptor(&self) -> &Descriptor {
        &LDAP_PLAIN_DESC
    }

    fn hash(&self, secret: &[u8], _settings: &HashSettings) -> Result<String> {
        let secret = str::from_utf8(secret).map_err(|_| Error::PasswordValue)?;
        Ok(format!("{{PLAIN}}{secret}"))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        let payload = hash.strip_prefix("{PLAIN}").ok_or(Error::MalformedHash)?;
        Ok(consteq(secret, payload.as_bytes()))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        hash.strip_prefix("{PLAIN}").ok_or(Error::MalformedHash)?;
        Ok(HashInfo {
            ident: "{PLAIN}".to_owned(),
            has_checksum: true,
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, _settings: &HashSettings) -> Result<String> {
        Ok("{PLAIN}".to_owned())
    }

    fn genhash(&self, secret: &[u8], _config: &str) -> Result<String> {
        self.hash(secret, &HashSettings::default())
    }
}

/// `{CRYPT}` wrapper: the payload is any modular-crypt hash the
/// registry catalogue understands.
pub struct LdapCrypt;

static LDAP_CRYPT_DESC: Descriptor = Descriptor {
    name: "ldap_crypt",
    aliases: &["ldap-crypt"],
    idents: &["{CRYPT}"],
    default_ident: Some("{CRYPT}"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: None,
    salt: None,
    checksum_size: 0,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

/// Scheme used for new `{CRYPT}` hashes.
const CRYPT_DEFAULT_SCHEME: &str = "sha512_crypt";

impl LdapCrypt {
    /// Wrapper over the registry's modular-crypt schemes, hashing new
    /// secrets with sha512_crypt.
    pub fn new() -> Self {
        LdapCrypt
    }

    fn payload<'a>(&self, hash: &'a str) -> Result<&'a str> {
        hash.strip_prefix("{CRYPT}").ok_or(Error::MalformedHash)
    }

    /// Resolve an MCF payload against the registry catalogue,
    /// honoring whatever backend the registry has selected for each
    /// scheme. Non-MCF schemes and the LDAP wrappers themselves are
    /// skipped, as are schemes whose backends fail to load.
    fn resolve(&self, payload: &str) -> Result<Arc<dyn Hasher>> {
        if !payload.starts_with('$') {
            return Err(Error::MalformedHash);
        }
        for name in registry::scheme_names() {
            let Ok(hasher) = registry::lookup(&name) else {
                continue;
            };
            let idents = hasher.descriptor().idents;
            if idents.is_empty() || idents.iter().any(|i| i.starts_with('{')) {
                continue;
            }
            if hasher.identify(payload) {
                return Ok(hasher);
            }
        }
        Err(Error::MalformedHash)
    }

    fn inner_default(&self) -> Result<Arc<dyn Hasher>> {
        registry::lookup(CRYPT_DEFAULT_SCHEME)
    }
}

impl Default for LdapCrypt {
    fn default() -> Self {
        LdapCrypt::new()
    }
}

impl Hasher for LdapCrypt {
    fn descriptor(&self) -> &Descriptor {
        &LDAP_CRYPT_DESC
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        let inner = self.inner_default()?.hash(secret, settings)?;
        Ok(format!("{{CRYPT}}{inner}"))
    }

    fn verify(&self, secret: &[u8], hash: &str, settings: &HashSettings) -> Result<bool> {
        let payload = self.payload(hash)?;
        self.resolve(payload)?.verify(secret, payload, settings)
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let payload = self.payload(hash)?;
        let mut info = self.resolve(payload)?.inspect(payload)?;
        info.ident = "{CRYPT}".to_owned();
        Ok(info)
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let inner = self.inner_default()?.genconfig(settings)?;
        Ok(format!("{{CRYPT}}{inner}"))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let payload = self.payload(config)?;
        let inner = self.resolve(payload)?.genhash(secret, payload)?;
        Ok(format!("{{CRYPT}}{inner}"))
    }

    fn needs_update(&self, hash: &str, secret: Option<&[u8]>) -> bool {
        match self.payload(hash) {
            Ok(payload) => match self.resolve(payload) {
                Ok(inner) => inner.needs_update(payload, secret),
                Err(_) => false,
            },
            Err(_) => false,
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
    fn ldap_md5_vector() {
        let h = LdapDigest::md5();
        let out = h.hash(b"helloworld", &none()).unwrap();
        assert_eq!(out, "{MD5}/F4DjTilcDIIVEHn/nAQsA==");
        assert!(h.verify(b"helloworld", &out, &none()).unwrap());
        assert!(!h.verify(b"helloworlD", &out, &none()).unwrap());
    }

    #[test]
    fn ldap_sha1_vector() {
        let h = LdapDigest::sha1();
        let out = h.hash(b"test", &none()).unwrap();
        assert_eq!(out, "{SHA}qUqP5cyxm6YcTAhz05Hph5gvu9M=");
        assert!(h.verify(b"test", &out, &none()).unwrap());
    }

    #[test]
    fn salted_roundtrip() {
        for h in [LdapDigest::salted_md5(), LdapDigest::salted_sha1()] {
            let out = h.hash(b"testing123", &none()).unwrap();
            assert!(h.identify(&out));
            assert!(h.verify(b"testing123", &out, &none()).unwrap());
            assert!(!h.verify(b"testing124", &out, &none()).unwrap());
            let info = h.inspect(&out).unwrap();
            assert_eq!(info.salt_len, Some(8));
        }
    }

    #[test]
    fn salted_with_explicit_salt() {
        let h = LdapDigest::salted_sha1();
        let a = h.hash(b"pw", &HashSettings::default().salt("abcd")).unwrap();
        let b = h.hash(b"pw", &HashSettings::default().salt("abcd")).unwrap();
        assert_eq!(a, b);
        let config = h.genconfig(&HashSettings::default().salt("abcd")).unwrap();
        assert_eq!(h.genhash(b"pw", &config).unwrap(), a);
    }

    #[test]
    fn prefixes_are_disjoint() {
        let md5 = LdapDigest::md5();
        let smd5 = LdapDigest::salted_md5();
        let out = smd5.hash(b"pw", &none()).unwrap();
        assert!(smd5.identify(&out));
        assert!(!md5.identify(&out));
        // unsalted payload with trailing bytes is rejected
        let unsalted = md5.hash(b"pw", &none()).unwrap();
        assert!(md5.identify(&unsalted));
        assert!(!smd5.identify(&unsalted));
    }

    #[test]
    fn plain_prefix_roundtrip() {
        let h = LdapPlain::new();
        let out = h.hash(b"hunter2", &none()).unwrap();
        assert_eq!(out, "{PLAIN}hunter2");
        assert!(h.identify(&out));
        assert!(h.verify(b"hunter2", &out, &none()).unwrap());
        assert!(!h.verify(b"hunter3", &out, &none()).unwrap());
        assert!(!h.identify("hunter2"));
        assert!(!h.identify("{SHA}hunter2"));
    }

    #[test]
    fn crypt_wrapper_delegates_through_registry() {
        let h = LdapCrypt::new();
        let wrapped = "{CRYPT}$1$5pZSV9va$azfrPr6af3Fc7dLblQXVa0";
        assert!(h.identify(wrapped));
        assert!(h.verify(b"password", wrapped, &none()).unwrap());
        assert!(!h.verify(b"Password", wrapped, &none()).unwrap());
        // any registered modular-crypt scheme works as payload
        let apr1 = "{CRYPT}$apr1$63JlJ2NH$smE0mnB5h3tDri0zkpWXt1";
        assert!(h.identify(apr1));
        assert!(h.verify(b"password", apr1, &none()).unwrap());
        let fresh = h.hash(b"secret", &none()).unwrap();
        assert!(fresh.starts_with("{CRYPT}$6$"));
        assert!(h.verify(b"secret", &fresh, &none()).unwrap());
        // LDAP payloads never resolve as {CRYPT} content
        assert!(!h.identify("{CRYPT}{SHA}qUqP5cyxm6YcTAhz05Hph5gvu9M="));
    }
}
