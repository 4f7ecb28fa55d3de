//! Process-wide scheme resolver.
//!
//! Maps names (case-insensitive, `-`/`_` interchangeable, aliases
//! honored) to lazily constructed [`Hasher`] instances. The table is
//! seeded with the builtin catalogue at first use; external hashers
//! can be added through [`register_scheme`]. Construction happens on
//! first lookup, so a scheme with an unusable backend only fails when
//! it is actually exercised.
//!
//! Backend selection order per scheme: a [`set_backend`] pin, the
//! `PASSFORT_BACKEND_<SCHEME>` environment variable (scheme name
//! uppercased), then the first registered candidate. Selection never
//! changes hash output for identical inputs.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use log::debug;

use crate::crypt::{
    Argon2Hasher, Bcrypt, DigestScheme, LdapCrypt, LdapDigest, LdapPlain, Md5Crypt, Pbkdf2,
    Plaintext, Scrypt, ShaCrypt,
};
use crate::error::{Error, Result};
use crate::scheme::Hasher;

/// Constructor for one scheme instance.
pub type SchemeFactory = Box<dyn Fn() -> Box<dyn Hasher> + Send + Sync>;

struct Entry {
    factory: SchemeFactory,
    backends: Vec<&'static str>,
    pinned: Option<String>,
    instance: Option<Arc<dyn Hasher>>,
}

struct Registry {
    entries: HashMap<String, Entry>,
    aliases: HashMap<String, String>,
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

macro_rules! builtin {
    ($f:expr) => {
        Box::new(|| Box::new($f) as Box<dyn Hasher>) as SchemeFactory
    };
}

impl Registry {
    fn builtin() -> Registry {
        let mut reg = Registry {
            entries: HashMap::new(),
            aliases: HashMap::new(),
        };
        let table: Vec<(&'static str, &'static [&'static str], SchemeFactory)> = vec![
            ("bcrypt", &["blowfish-crypt"], builtin!(Bcrypt::new())),
            ("md5_crypt", &["md5-crypt"], builtin!(Md5Crypt::new())),
            (
                "apr_md5_crypt",
                &["apr1", "apr-md5-crypt"],
                builtin!(Md5Crypt::apr1()),
            ),
            (
                "sha256_crypt",
                &["sha-256-crypt"],
                builtin!(ShaCrypt::sha256()),
            ),
            (
                "sha512_crypt",
                &["sha-512-crypt"],
                builtin!(ShaCrypt::sha512()),
            ),
            ("pbkdf2_sha1", &[], builtin!(Pbkdf2::sha1())),
            ("pbkdf2_sha256", &[], builtin!(Pbkdf2::sha256())),
            ("pbkdf2_sha512", &[], builtin!(Pbkdf2::sha512())),
            (
                "argon2",
                &["argon2id", "argon2i", "argon2d"],
                builtin!(Argon2Hasher::new()),
            ),
            ("scrypt", &[], builtin!(Scrypt::new())),
            ("ldap_md5", &[], builtin!(LdapDigest::md5())),
            ("ldap_sha1", &[], builtin!(LdapDigest::sha1())),
            (
                "ldap_salted_md5",
                &["smd5"],
                builtin!(LdapDigest::salted_md5()),
            ),
            (
                "ldap_salted_sha1",
                &["ssha"],
                builtin!(LdapDigest::salted_sha1()),
            ),
            (
                "ldap_plaintext",
                &["ldap_plain"],
                builtin!(LdapPlain::new()),
            ),
            ("ldap_crypt", &[], builtin!(LdapCrypt::new())),
            (
                "mysql323",
                &["mysql_old"],
                builtin!(DigestScheme::mysql323()),
            ),
            ("mysql41", &[], builtin!(DigestScheme::mysql41())),
            ("postgres_md5", &[], builtin!(DigestScheme::postgres_md5())),
            ("oracle11", &[], builtin!(DigestScheme::oracle11())),
            ("hex_md5", &[], builtin!(DigestScheme::hex_md5())),
            ("hex_sha1", &[], builtin!(DigestScheme::hex_sha1())),
            ("hex_sha256", &[], builtin!(DigestScheme::hex_sha256())),
            ("hex_sha512", &[], builtin!(DigestScheme::hex_sha512())),
            ("plaintext", &[], builtin!(Plaintext::new())),
        ];
        for (name, aliases, factory) in table {
            for alias in aliases {
                reg.aliases.insert(normalize(alias), name.to_owned());
            }
            reg.entries.insert(
                name.to_owned(),
                Entry {
                    factory,
                    backends: vec!["builtin"],
                    pinned: None,
                    instance: None,
                },
            );
        }
        reg
    }

    fn canonical(&self, name: &str) -> Result<String> {
        let key = normalize(name);
        if self.entries.contains_key(&key) {
            return Ok(key);
        }
        self.aliases
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UnknownScheme(name.to_owned()))
    }

    fn instantiate(&mut self, key: &str) -> Result<Arc<dyn Hasher>> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::UnknownScheme(key.to_owned()))?;
        if let Some(instance) = &entry.instance {
            return Ok(instance.clone());
        }
        let env_key = format!("PASSFORT_BACKEND_{}", key.to_ascii_uppercase());
        let requested = entry
            .pinned
            .clone()
            .or_else(|| std::env::var(env_key).ok());
        let backend = match requested {
            Some(name) => entry
                .backends
                .iter()
                .find(|b| **b == name)
                .copied()
                .ok_or_else(|| Error::MissingBackend {
                    scheme: key.to_owned(),
                })?,
            None => entry
                .backends
                .first()
                .copied()
                .ok_or_else(|| Error::MissingBackend {
                    scheme: key.to_owned(),
                })?,
        };
        debug!("instantiating scheme {key} with backend {backend}");
        let instance: Arc<dyn Hasher> = Arc::from((entry.factory)());
        entry.instance = Some(instance.clone());
        Ok(instance)
    }
}

static REGISTRY: LazyLock<RwLock<Registry>> =
    LazyLock::new(|| RwLock::new(Registry::builtin()));

/// Resolve a scheme name to a shared hasher instance.
pub fn lookup(name: &str) -> Result<Arc<dyn Hasher>> {
    let key = {
        let reg = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        let key = reg.canonical(name)?;
        if let Some(entry) = reg.entries.get(&key) {
            if let Some(instance) = &entry.instance {
                return Ok(instance.clone());
            }
        }
        key
    };
    let mut reg = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    reg.instantiate(&key)
}

/// Register an external hasher under `name`. Fails if the name or an
/// alias is already taken.
pub fn register_scheme(
    name: &str,
    aliases: &[&str],
    factory: SchemeFactory,
) -> Result<()> {
    let mut reg = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    let key = normalize(name);
    if reg.entries.contains_key(&key) || reg.aliases.contains_key(&key) {
        return Err(Error::Config(format!("scheme already registered: {name}")));
    }
    for alias in aliases {
        let akey = normalize(alias);
        if reg.entries.contains_key(&akey) || reg.aliases.contains_key(&akey) {
            return Err(Error::Config(format!("alias already registered: {alias}")));
        }
        reg.aliases.insert(akey, key.clone());
    }
    debug!("registered external scheme {key}");
    reg.entries.insert(
        key,
        Entry {
            factory,
            backends: vec!["builtin"],
            pinned: None,
            instance: None,
        },
    );
    Ok(())
}

/// Pin the backend used for `scheme`. The pinned name must be one of
/// the scheme's registered candidates; the instance is rebuilt on the
/// next lookup.
pub fn set_backend(scheme: &str, backend: &str) -> Result<()> {
    let mut reg = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    let key = reg.canonical(scheme)?;
    let entry = reg
        .entries
        .get_mut(&key)
        .ok_or_else(|| Error::UnknownScheme(scheme.to_owned()))?;
    if !entry.backends.iter().any(|b| *b == backend) {
        return Err(Error::MissingBackend { scheme: key });
    }
    entry.pinned = Some(backend.to_owned());
    entry.instance = None;
    Ok(())
}

/// Names of every registered scheme, sorted.
pub fn scheme_names() -> Vec<String> {
    let reg = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<String> = reg.entries.keys().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::HashSettings;

    #[test]
    fn lookup_is_case_and_dash_insensitive() {
        let a = lookup("sha256_crypt").unwrap();
        let b = lookup("SHA-256-CRYPT").unwrap();
        assert_eq!(a.descriptor().name, "sha256_crypt");
        assert_eq!(b.descriptor().name, "sha256_crypt");
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(lookup("apr1").unwrap().descriptor().name, "apr_md5_crypt");
        assert_eq!(lookup("ssha").unwrap().descriptor().name, "ldap_salted_sha1");
    }

    #[test]
    fn unknown_scheme() {
        assert!(matches!(
            lookup("no_such_scheme"),
            Err(Error::UnknownScheme(_))
        ));
    }

    #[test]
    fn instances_are_shared() {
        let a = lookup("md5_crypt").unwrap();
        let b = lookup("md5_crypt").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn backend_pinning() {
        assert!(set_backend("bcrypt", "builtin").is_ok());
        assert!(lookup("bcrypt").is_ok());
        assert!(matches!(
            set_backend("bcrypt", "openssl"),
            Err(Error::MissingBackend { .. })
        ));
        assert!(matches!(
            set_backend("nonexistent", "builtin"),
            Err(Error::UnknownScheme(_))
        ));
    }

    #[test]
    fn external_registration() {
        register_scheme(
            "plaintext_clone",
            &["cleartext"],
            Box::new(|| Box::new(crate::crypt::Plaintext::new())),
        )
        .unwrap();
        let h = lookup("cleartext").unwrap();
        assert_eq!(
            h.hash(b"pw", &HashSettings::default()).unwrap(),
            "pw"
        );
        assert!(matches!(
            register_scheme("plaintext", &[], Box::new(|| Box::new(crate::crypt::Plaintext::new()))),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn catalogue_is_complete() {
        let names = scheme_names();
        for required in [
            "bcrypt",
            "sha256_crypt",
            "sha512_crypt",
            "md5_crypt",
            "pbkdf2_sha1",
            "pbkdf2_sha256",
            "pbkdf2_sha512",
            "argon2",
            "scrypt",
            "ldap_salted_sha1",
            "ldap_plaintext",
            "mysql41",
            "plaintext",
        ] {
            assert!(names.iter().any(|n| n == required), "missing {required}");
        }
    }
}
