//! The uniform hasher contract and the immutable metadata records that
//! describe each scheme.
//!
//! A scheme is a value implementing [`Hasher`]; per-family behavior
//! (rounds, salt, idents, truncation) lives in the [`Descriptor`] the
//! scheme carries rather than in a type hierarchy. The context engine
//! dispatches over `dyn Hasher` and consults descriptors for policy
//! decisions.

use crate::encode::validate_salt_chars;
use crate::error::{Error, Result};
use crate::random;

/// How a scheme's rounds value scales the work performed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoundsCost {
    /// Work is proportional to the stored value.
    Linear,
    /// The stored value is an exponent; work is `2^rounds`.
    Log2,
}

/// Rounds metadata for schemes with a variable work factor.
#[derive(Clone, Copy, Debug)]
pub struct RoundsSpec {
    /// Smallest accepted rounds value.
    pub min: u32,
    /// Largest accepted rounds value.
    pub max: u32,
    /// Value used when neither caller nor policy picks one.
    pub default: u32,
    /// How the value scales the work performed.
    pub cost: RoundsCost,
}

impl RoundsSpec {
    /// Resolve the effective rounds for a new hash: explicit setting
    /// wins over the scheme default; out-of-range values are a
    /// configuration error, not a hash error.
    pub(crate) fn resolve(&self, requested: Option<u32>) -> Result<u32> {
        let rounds = requested.unwrap_or(self.default);
        self.check(rounds)
            .map_err(|_| Error::Config(format!("rounds must be in {}..={}", self.min, self.max)))?;
        Ok(rounds)
    }

    /// Range-check a rounds value parsed out of an existing hash.
    pub(crate) fn check(&self, rounds: u32) -> Result<u32> {
        if (self.min..=self.max).contains(&rounds) {
            Ok(rounds)
        } else {
            Err(Error::InvalidRounds)
        }
    }
}

/// Salt metadata. `chars` is the allowed alphabet for string salts;
/// `None` means the salt is raw bytes and sizes are in bytes.
#[derive(Clone, Copy, Debug)]
pub struct SaltSpec {
    /// Smallest accepted salt size.
    pub min_size: usize,
    /// Largest accepted salt size.
    pub max_size: usize,
    /// Size of generated salts.
    pub default_size: usize,
    /// Allowed alphabet for string salts; `None` for raw byte salts.
    pub chars: Option<&'static [u8]>,
}

impl SaltSpec {
    /// Resolve the salt for a new hash: validate a caller-provided one
    /// or generate `salt_size` (default `default_size`) characters.
    /// Only meaningful for string-salt schemes.
    pub(crate) fn resolve_str(&self, salt: Option<&str>, salt_size: Option<usize>) -> Result<String> {
        match salt {
            Some(s) => {
                if !(self.min_size..=self.max_size).contains(&s.len()) {
                    return Err(Error::InvalidSalt);
                }
                if let Some(chars) = self.chars {
                    validate_salt_chars(s, chars)?;
                }
                Ok(s.to_owned())
            }
            None => {
                let size = salt_size.unwrap_or(self.default_size);
                if !(self.min_size..=self.max_size).contains(&size) {
                    return Err(Error::Config(format!(
                        "salt_size must be in {}..={}",
                        self.min_size, self.max_size
                    )));
                }
                let chars = self.chars.ok_or(Error::InvalidSalt)?;
                Ok(random::gen_salt_str(chars, size))
            }
        }
    }

    /// Resolve a raw byte salt for the binary-salt schemes. A provided
    /// salt string is taken verbatim as bytes; the encoded form only
    /// exists inside the hash string.
    pub(crate) fn resolve_bytes(
        &self,
        salt: Option<&str>,
        salt_size: Option<usize>,
    ) -> Result<Vec<u8>> {
        match salt {
            Some(s) => {
                if !(self.min_size..=self.max_size).contains(&s.len()) {
                    return Err(Error::InvalidSalt);
                }
                Ok(s.as_bytes().to_vec())
            }
            None => {
                let size = salt_size.unwrap_or(self.default_size);
                if !(self.min_size..=self.max_size).contains(&size) {
                    return Err(Error::Config(format!(
                        "salt_size must be in {}..={}",
                        self.min_size, self.max_size
                    )));
                }
                let mut buf = vec![0u8; size];
                random::gen_salt_bytes(&mut buf);
                Ok(buf)
            }
        }
    }

    /// Range-check a salt length parsed out of an existing hash.
    pub(crate) fn check_len(&self, len: usize) -> Result<()> {
        if (self.min_size..=self.max_size).contains(&len) {
            Ok(())
        } else {
            Err(Error::InvalidSalt)
        }
    }
}

/// What a scheme does with secrets longer than `truncate_size`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TruncatePolicy {
    /// Silently hash only the first `truncate_size` bytes.
    Silent,
    /// Reject oversize secrets.
    Error,
}

/// Immutable description of a scheme, created once at registration.
#[derive(Debug)]
pub struct Descriptor {
    /// Canonical identifier, e.g. `bcrypt`, `sha512_crypt`.
    pub name: &'static str,
    /// Alternate registry spellings.
    pub aliases: &'static [&'static str],
    /// Prefix tokens that identify the hash format. Empty for bare
    /// fixed-width formats.
    pub idents: &'static [&'static str],
    /// Ident used for new hashes when several are accepted.
    pub default_ident: Option<&'static str>,
    /// Settings stored in the hash string.
    pub setting_kwds: &'static [&'static str],
    /// Runtime-only inputs not stored in the hash (e.g. `user`).
    pub context_kwds: &'static [&'static str],
    /// Work-factor metadata, absent for fixed-cost schemes.
    pub rounds: Option<RoundsSpec>,
    /// Salt metadata, absent for unsalted schemes.
    pub salt: Option<SaltSpec>,
    /// Length of the encoded checksum, in characters.
    pub checksum_size: usize,
    /// Bytes of the secret actually digested, if limited.
    pub truncate_size: Option<usize>,
    /// Default reaction to an oversize secret.
    pub truncate_policy: TruncatePolicy,
}

impl Descriptor {
    /// Apply the truncation policy: returns the (possibly shortened)
    /// slice of `secret` this scheme digests. `truncate_error`
    /// overrides the scheme default when set.
    pub(crate) fn truncate<'a>(
        &self,
        secret: &'a [u8],
        truncate_error: Option<bool>,
    ) -> Result<&'a [u8]> {
        let Some(limit) = self.truncate_size else {
            return Ok(secret);
        };
        if secret.len() <= limit {
            return Ok(secret);
        }
        let reject = match truncate_error {
            Some(flag) => flag,
            None => self.truncate_policy == TruncatePolicy::Error,
        };
        if reject {
            Err(Error::PasswordTruncate { limit })
        } else {
            Ok(&secret[..limit])
        }
    }
}

/// Reject secrets containing NUL where the underlying algorithm
/// consumes a C string.
pub(crate) fn reject_nul(secret: &[u8]) -> Result<()> {
    if secret.contains(&0) {
        Err(Error::PasswordValue)
    } else {
        Ok(())
    }
}

/// Caller-supplied settings for one hash operation.
///
/// All fields default to "use the scheme/policy value". The context
/// engine layers its per-scheme and per-category overrides into this
/// structure before dispatching.
#[derive(Clone, Debug, Default)]
pub struct HashSettings {
    /// Custom salt. String-salt schemes validate it against their
    /// alphabet; binary-salt schemes take the raw bytes.
    pub salt: Option<String>,
    /// Generated salt length when `salt` is not given.
    pub salt_size: Option<usize>,
    /// Work factor; interpretation depends on the scheme's cost model.
    pub rounds: Option<u32>,
    /// Format variant for schemes with several idents.
    pub ident: Option<String>,
    /// Memory cost in KiB (argon2 only).
    pub memory_cost: Option<u32>,
    /// Lane count (argon2) or `p` (scrypt).
    pub parallelism: Option<u32>,
    /// Reject secrets the scheme would silently truncate.
    pub truncate_error: Option<bool>,
    /// Login name for schemes that bind the hash to a user.
    pub user: Option<String>,
}

impl HashSettings {
    /// Configure a custom salt.
    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Configure the generated salt length.
    pub fn salt_size(mut self, size: usize) -> Self {
        self.salt_size = Some(size);
        self
    }

    /// Configure the work factor.
    pub fn rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Configure the format variant.
    pub fn ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = Some(ident.into());
        self
    }

    /// Configure the argon2 memory cost, in KiB.
    pub fn memory_cost(mut self, kib: u32) -> Self {
        self.memory_cost = Some(kib);
        self
    }

    /// Configure the lane / thread count.
    pub fn parallelism(mut self, lanes: u32) -> Self {
        self.parallelism = Some(lanes);
        self
    }

    /// Reject, rather than truncate, oversize secrets.
    pub fn truncate_error(mut self, flag: bool) -> Self {
        self.truncate_error = Some(flag);
        self
    }

    /// Bind the operation to a login name.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Parameters recovered from an existing hash string; the context
/// engine's policy checks read these.
#[derive(Clone, Debug, Default)]
pub struct HashInfo {
    /// Ident the hash carries, normalized without `$` framing.
    pub ident: String,
    /// Work factor, if the scheme stores one.
    pub rounds: Option<u32>,
    /// Salt in its wire form.
    pub salt: Option<String>,
    /// Salt length in the scheme's native unit (characters for string
    /// salts, bytes for binary salts).
    pub salt_len: Option<usize>,
    /// Argon2 memory cost.
    pub memory_cost: Option<u32>,
    /// Argon2 / scrypt parallelism.
    pub parallelism: Option<u32>,
    /// False for configuration strings produced by `genconfig`.
    pub has_checksum: bool,
}

/// The uniform scheme contract.
///
/// Implementations are immutable and cheap to share; all methods are
/// callable concurrently.
pub trait Hasher: Send + Sync {
    /// The scheme's metadata record.
    fn descriptor(&self) -> &Descriptor;

    /// Produce a new hash for `secret`.
    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String>;

    /// Check `secret` against an existing hash. Returns `Ok(false)` on
    /// a wrong secret; errors only on structural or parameter problems.
    fn verify(&self, secret: &[u8], hash: &str, settings: &HashSettings) -> Result<bool>;

    /// Parse parameters out of a hash or configuration string.
    fn inspect(&self, hash: &str) -> Result<HashInfo>;

    /// Produce a salt-and-parameters configuration string with no
    /// checksum, for calibration and tests.
    fn genconfig(&self, settings: &HashSettings) -> Result<String>;

    /// Apply `secret` to a pre-built configuration string; equivalent
    /// to [`Hasher::hash`] with every setting pinned.
    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let info = self.inspect(config)?;
        let mut settings = HashSettings::default();
        settings.ident = Some(info.ident);
        settings.salt = info.salt;
        settings.rounds = info.rounds;
        settings.memory_cost = info.memory_cost;
        settings.parallelism = info.parallelism;
        self.hash(secret, &settings)
    }

    /// True when this scheme recognizes the structure of `hash`.
    /// Parameter-range violations still identify; only structural
    /// mismatches do not.
    fn identify(&self, hash: &str) -> bool {
        match self.inspect(hash) {
            Ok(_) => true,
            Err(e) => !e.is_malformed(),
        }
    }

    /// Scheme-specific staleness checks (variant upgrades, truncation
    /// risk). Policy-level checks live in the context.
    fn needs_update(&self, _hash: &str, _secret: Option<&[u8]>) -> bool {
        false
    }
}
