//! A password-hashing framework: a catalogue of hash schemes behind a
//! uniform contract, composed into policy contexts that pick a default
//! for new hashes, accept legacy hashes for verification, and flag
//! stale hashes for upgrade.
//!
//! # Examples
//!
//! To verify a password against a hash of a known scheme:
//!
//! ```
//! # fn main() -> passfort::Result<()> {
//! use passfort::HashSettings;
//!
//! let bcrypt = passfort::registry::lookup("bcrypt")?;
//! let h = "$2y$05$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe";
//! assert!(bcrypt.verify(b"password", h, &HashSettings::default())?);
//! # Ok(())
//! # }
//! ```
//!
//! To manage a credentials table with a policy, including migration
//! off a deprecated scheme:
//!
//! ```
//! # fn main() -> passfort::Result<()> {
//! use passfort::CryptContext;
//!
//! let ctx = CryptContext::builder()
//!     .schemes(["sha256_crypt", "md5_crypt"])
//!     .deprecated(["md5_crypt"])
//!     .build()?;
//!
//! let stored = ctx.hash("hunter2")?;
//! assert!(ctx.verify("hunter2", &stored)?);
//! assert_eq!(ctx.identify(&stored), Some("sha256_crypt"));
//!
//! // on login, stale hashes come back re-hashed under current policy
//! let (ok, replacement) = ctx.verify_and_update("hunter2", &stored)?;
//! assert!(ok && replacement.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Summary
//!
//! Each algorithm lives in its own module under [`crypt`] and
//! implements the [`Hasher`] contract: identify, hash, verify,
//! configuration strings, and staleness checks. The [`registry`]
//! resolves names to shared instances, lazily. A [`CryptContext`]
//! composes schemes into a policy: ordered scheme list, per-category
//! parameter overrides, deprecation marking, rounds jitter, timing
//! hardening, and an INI-like text form that round-trips.
//!
//! One-time-password support ([`totp`]) rides along for credential
//! stores that keep a second factor next to the password hash.

#![warn(missing_docs)]

mod calibrate;
mod encode;
mod parse;
mod policy;
mod random;

pub mod context;
pub mod crypt;
pub mod error;
pub mod registry;
pub mod scheme;
pub mod totp;

pub use context::{
    CryptContext, CryptContextBuilder, DeprecationPolicy, SchemeOptions, VaryRounds,
};
pub use error::{Error, ErrorKind, Result};
pub use scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
};
pub use totp::{Totp, TotpAlgorithm};

/// Constant-time byte comparison used by every verify path.
#[inline]
pub(crate) fn consteq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consteq_behaves() {
        assert!(consteq(b"abc", b"abc"));
        assert!(!consteq(b"abc", b"abd"));
        assert!(!consteq(b"abc", b"abcd"));
    }

    #[test]
    fn every_scheme_round_trips() {
        for name in registry::scheme_names() {
            let hasher = registry::lookup(&name).unwrap();
            let mut settings = HashSettings::default();
            // keep the slow schemes fast in tests
            if let Some(spec) = hasher.descriptor().rounds {
                settings.rounds = Some(match spec.cost {
                    RoundsCost::Log2 => spec.min,
                    RoundsCost::Linear => spec.default.min(1000).max(spec.min),
                });
            }
            if name == "postgres_md5" {
                settings.user = Some("melissa".into());
            }
            let h = hasher.hash(b"test-secret", &settings).unwrap();
            assert!(hasher.identify(&h), "{name} must identify its own hash");
            assert!(
                hasher.verify(b"test-secret", &h, &settings).unwrap(),
                "{name} round trip"
            );
            assert!(
                !hasher.verify(b"other-secret", &h, &settings).unwrap(),
                "{name} rejection"
            );
        }
    }

    #[test]
    fn identify_matches_verify_error_class() {
        let hasher = registry::lookup("sha256_crypt").unwrap();
        for candidate in [
            "$5$rounds=10000$saltstring$bad!",
            "not-a-hash",
            "$6$saltstring$x",
            "$5$rounds=010$saltstring$x",
        ] {
            assert!(!hasher.identify(candidate));
            let err = hasher
                .verify(b"pw", candidate, &HashSettings::default())
                .unwrap_err();
            assert!(err.is_malformed(), "{candidate}: {err:?}");
        }
    }
}
