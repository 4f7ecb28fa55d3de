//! Error types shared by every scheme and by the context engine.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification, stable across crate versions.
///
/// Callers that need to branch on the outcome of a parse or a policy
/// operation should match on this rather than on [`Error`] variants,
/// which may grow fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Hash string is structurally broken.
    MalformedHash,
    /// Hash string is well-formed but a parameter is out of range.
    InvalidHash,
    /// No configured scheme recognizes the hash.
    UnknownHash,
    /// Scheme exists but no usable backend is available.
    MissingBackend,
    /// Secret violates a scheme restriction (size, NUL bytes).
    BadSecret,
    /// Policy map or settings rejected at construction time.
    Config,
}

/// All failures produced by hashing, verification, and policy handling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Structurally invalid hash string: bad magic, wrong delimiter
    /// count, illegal alphabet, wrong field length.
    #[error("malformed hash string")]
    MalformedHash,

    /// Well-formed hash whose parameters fall outside the range the
    /// scheme accepts (e.g. bcrypt cost 99).
    #[error("hash parameter out of range: {0}")]
    InvalidHash(&'static str),

    /// No scheme in the active context can identify the hash.
    #[error("hash does not match any configured scheme")]
    UnknownHash,

    /// The scheme is registered but none of its backends can be used,
    /// or the pinned backend is unknown.
    #[error("no usable backend for scheme {scheme}")]
    MissingBackend {
        /// Canonical scheme name.
        scheme: String,
    },

    /// Secret exceeds the scheme limit and the policy forbids
    /// silent truncation.
    #[error("secret longer than {limit} bytes")]
    PasswordSize {
        /// Maximum secret length of the scheme, in bytes.
        limit: usize,
    },

    /// Truncating scheme (bcrypt family) was given a secret longer
    /// than it can digest while `truncate_error` is in force.
    #[error("secret would be truncated to {limit} bytes")]
    PasswordTruncate {
        /// Number of bytes the scheme actually digests.
        limit: usize,
    },

    /// Secret contains a NUL byte where the scheme forbids one.
    #[error("secret contains a NUL byte")]
    PasswordValue,

    /// Rounds value outside the scheme's accepted range, or below a
    /// policy floor.
    #[error("invalid rounds value")]
    InvalidRounds,

    /// Salt is too short, too long, or uses characters outside the
    /// scheme alphabet.
    #[error("invalid salt")]
    InvalidSalt,

    /// A value could not be encoded or decoded in the scheme's wire
    /// alphabet.
    #[error("encoding error")]
    Encoding,

    /// Invalid policy map: unknown scheme, unparsable value, or a
    /// combination the context refuses (e.g. deprecating the default).
    #[error("invalid context configuration: {0}")]
    Config(String),

    /// An unknown scheme name was given to the registry.
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),
}

impl Error {
    /// Map the error onto its stable [`ErrorKind`] tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedHash | Error::Encoding => ErrorKind::MalformedHash,
            Error::InvalidHash(_) | Error::InvalidRounds | Error::InvalidSalt => {
                ErrorKind::InvalidHash
            }
            Error::UnknownHash => ErrorKind::UnknownHash,
            Error::MissingBackend { .. } => ErrorKind::MissingBackend,
            Error::PasswordSize { .. }
            | Error::PasswordTruncate { .. }
            | Error::PasswordValue => ErrorKind::BadSecret,
            Error::Config(_) | Error::UnknownScheme(_) => ErrorKind::Config,
        }
    }

    /// True when the hash string itself is structurally unusable.
    ///
    /// `identify` treats exactly these errors as "not ours"; parameter
    /// range errors still identify, and surface from `verify`.
    pub fn is_malformed(&self) -> bool {
        self.kind() == ErrorKind::MalformedHash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::MalformedHash.kind(), ErrorKind::MalformedHash);
        assert_eq!(Error::Encoding.kind(), ErrorKind::MalformedHash);
        assert_eq!(Error::InvalidRounds.kind(), ErrorKind::InvalidHash);
        assert_eq!(
            Error::InvalidHash("rounds").kind(),
            ErrorKind::InvalidHash
        );
        assert_eq!(Error::UnknownHash.kind(), ErrorKind::UnknownHash);
        assert_eq!(Error::PasswordSize { limit: 72 }.kind(), ErrorKind::BadSecret);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn malformed_vs_invalid() {
        assert!(Error::MalformedHash.is_malformed());
        assert!(!Error::InvalidRounds.is_malformed());
        assert!(!Error::UnknownHash.is_malformed());
    }
}
