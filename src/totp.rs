//! HOTP (RFC 4226) and TOTP (RFC 6238) one-time passwords.
//!
//! Bundled alongside the password schemes for credential stores that
//! keep a second factor next to the hash. Keys are wrapped as base32;
//! nothing here encrypts them at rest.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::consteq;
use crate::error::{Error, Result};

/// HMAC digest driving the code generation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TotpAlgorithm {
    /// HMAC-SHA1, the RFC 6238 default.
    #[default]
    Sha1,
    /// HMAC-SHA256.
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

fn hmac_digest(alg: TotpAlgorithm, key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    macro_rules! mac {
        ($d:ty) => {{
            let mut m =
                Hmac::<$d>::new_from_slice(key).map_err(|_| Error::Config("empty key".into()))?;
            m.update(msg);
            Ok(m.finalize().into_bytes().to_vec())
        }};
    }
    match alg {
        TotpAlgorithm::Sha1 => mac!(Sha1),
        TotpAlgorithm::Sha256 => mac!(Sha256),
        TotpAlgorithm::Sha512 => mac!(Sha512),
    }
}

/// A time-based one-time password generator/validator.
#[derive(Clone, Debug)]
pub struct Totp {
    key: Vec<u8>,
    digits: u32,
    period: u64,
    t0: u64,
    alg: TotpAlgorithm,
}

impl Totp {
    /// Wrap a raw key with the RFC 6238 defaults: SHA-1, 6 digits,
    /// 30-second steps starting at the Unix epoch.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Totp {
            key: key.into(),
            digits: 6,
            period: 30,
            t0: 0,
            alg: TotpAlgorithm::Sha1,
        }
    }

    /// Import a base32 key. Case, whitespace and padding are
    /// tolerated.
    pub fn from_base32(encoded: &str) -> Result<Self> {
        let cleaned: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let key = data_encoding::BASE32_NOPAD
            .decode(cleaned.as_bytes())
            .map_err(|_| Error::Config("invalid base32 key".into()))?;
        Ok(Totp::new(key))
    }

    /// Export the key as unpadded base32.
    pub fn key_base32(&self) -> String {
        data_encoding::BASE32_NOPAD.encode(&self.key)
    }

    /// Number of code digits, 6 to 10.
    pub fn digits(mut self, digits: u32) -> Result<Self> {
        if !(6..=10).contains(&digits) {
            return Err(Error::Config(format!("digits must be 6..=10, got {digits}")));
        }
        self.digits = digits;
        Ok(self)
    }

    /// Time-step size in seconds.
    pub fn period(mut self, period: u64) -> Result<Self> {
        if period == 0 {
            return Err(Error::Config("period must be nonzero".into()));
        }
        self.period = period;
        Ok(self)
    }

    /// Counter epoch offset in seconds.
    pub fn t0(mut self, t0: u64) -> Self {
        self.t0 = t0;
        self
    }

    /// Digest selection.
    pub fn algorithm(mut self, alg: TotpAlgorithm) -> Self {
        self.alg = alg;
        self
    }

    fn counter_at(&self, unix_time: u64) -> u64 {
        unix_time.saturating_sub(self.t0) / self.period
    }

    /// RFC 4226 dynamic truncation for one counter value.
    pub fn hotp(&self, counter: u64) -> Result<String> {
        let mac = hmac_digest(self.alg, &self.key, &counter.to_be_bytes())?;
        let offset = (mac[mac.len() - 1] & 0xf) as usize;
        let code = u32::from_be_bytes([
            mac[offset] & 0x7f,
            mac[offset + 1],
            mac[offset + 2],
            mac[offset + 3],
        ]) as u64;
        let code = code % 10u64.pow(self.digits);
        Ok(format!("{code:0width$}", width = self.digits as usize))
    }

    /// Code for the step containing `unix_time`.
    pub fn generate_at(&self, unix_time: u64) -> Result<String> {
        self.hotp(self.counter_at(unix_time))
    }

    /// Validate a presented code, accepting up to `window` counter
    /// steps of clock drift in either direction. Comparison is
    /// constant-time per candidate.
    pub fn verify_at(&self, code: &str, unix_time: u64, window: u64) -> Result<bool> {
        let center = self.counter_at(unix_time);
        let mut ok = false;
        for counter in center.saturating_sub(window)..=center.saturating_add(window) {
            let expected = self.hotp(counter)?;
            ok |= consteq(expected.as_bytes(), code.as_bytes());
        }
        Ok(ok)
    }
}
