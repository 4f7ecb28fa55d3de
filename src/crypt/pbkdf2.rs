//! PBKDF2-HMAC hashes over SHA-1, SHA-256 and SHA-512.
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt__: raw bytes, 0 to 1024; 16 generated by default.
//!
//! * __Rounds__: 1 to 2<sup>32</sup>-1 iterations.
//!
//! # Hash Format
//!
//! __`$pbkdf2-sha256$`__*`{rounds}`*__$__*`{salt}`*__$__*`{checksum}`*
//! (ident __`$pbkdf2$`__ for the SHA-1 variant). Salt and checksum use
//! adapted base64: the standard alphabet with `+` replaced by `.` and
//! no padding.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::consteq;
use crate::encode::{ab64_decode, ab64_encode, decode_dec_rounds};
use crate::error::{Error, Result};
use crate::parse::split_mcf;
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
};

const SALT: SaltSpec = SaltSpec {
    min_size: 0,
    max_size: 1024,
    default_size: 16,
    chars: None,
};

macro_rules! rounds_spec {
    ($default:expr) => {
        RoundsSpec {
            min: 1,
            max: u32::MAX,
            default: $default,
            cost: RoundsCost::Linear,
        }
    };
}

static PBKDF2_SHA1_DESC: Descriptor = Descriptor {
    name: "pbkdf2_sha1",
    aliases: &["pbkdf2-sha1"],
    idents: &["pbkdf2"],
    default_ident: Some("pbkdf2"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: Some(rounds_spec!(131_000)),
    salt: Some(SALT),
    checksum_size: 27,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static PBKDF2_SHA256_DESC: Descriptor = Descriptor {
    name: "pbkdf2_sha256",
    aliases: &["pbkdf2-sha256"],
    idents: &["pbkdf2-sha256"],
    default_ident: Some("pbkdf2-sha256"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: Some(rounds_spec!(29_000)),
    salt: Some(SALT),
    checksum_size: 43,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static PBKDF2_SHA512_DESC: Descriptor = Descriptor {
    name: "pbkdf2_sha512",
    aliases: &["pbkdf2-sha512"],
    idents: &["pbkdf2-sha512"],
    default_ident: Some("pbkdf2-sha512"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: Some(rounds_spec!(25_000)),
    salt: Some(SALT),
    checksum_size: 86,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

#[derive(Clone, Copy)]
enum Prf {
    Sha1,
    Sha256,
    Sha512,
}

impl Prf {
    fn digest_len(self) -> usize {
        match self {
            Prf::Sha1 => 20,
            Prf::Sha256 => 32,
            Prf::Sha512 => 64,
        }
    }

    fn derive(self, secret: &[u8], salt: &[u8], rounds: u32) -> Vec<u8> {
        let mut out = vec![0u8; self.digest_len()];
        match self {
            Prf::Sha1 => pbkdf2_hmac::<Sha1>(secret, salt, rounds, &mut out),
            Prf::Sha256 => pbkdf2_hmac::<Sha256>(secret, salt, rounds, &mut out),
            Prf::Sha512 => pbkdf2_hmac::<Sha512>(secret, salt, rounds, &mut out),
        }
        out
    }
}

/// One member of the pbkdf2 family.
pub struct Pbkdf2 {
    desc: &'static Descriptor,
    prf: Prf,
}

impl Pbkdf2 {
    /// PBKDF2-HMAC-SHA1, ident `$pbkdf2$`.
    pub fn sha1() -> Self {
        Pbkdf2 {
            desc: &PBKDF2_SHA1_DESC,
            prf: Prf::Sha1,
        }
    }

    /// PBKDF2-HMAC-SHA256, ident `$pbkdf2-sha256$`.
    pub fn sha256() -> Self {
        Pbkdf2 {
            desc: &PBKDF2_SHA256_DESC,
            prf: Prf::Sha256,
        }
    }

    /// PBKDF2-HMAC-SHA512, ident `$pbkdf2-sha512$`.
    pub fn sha512() -> Self {
        Pbkdf2 {
            desc: &PBKDF2_SHA512_DESC,
            prf: Prf::Sha512,
        }
    }

    fn rounds_spec(&self) -> &RoundsSpec {
        const FALLBACK: RoundsSpec = rounds_spec!(1);
        self.desc.rounds.as_ref().unwrap_or(&FALLBACK)
    }

    fn serialize(&self, rounds: u32, salt: &[u8], secret: &[u8]) -> String {
        let checksum = self.prf.derive(secret, salt, rounds);
        format!(
            "${}${rounds}${}${}",
            self.desc.idents[0],
            ab64_encode(salt),
            ab64_encode(&checksum)
        )
    }
}

impl Hasher for Pbkdf2 {
    fn descriptor(&self) -> &Descriptor {
        self.desc
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        let rounds = self.rounds_spec().resolve(settings.rounds)?;
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        Ok(self.serialize(rounds, &salt, secret))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        let fields = split_mcf(hash)?;
        if fields.ident != self.desc.idents[0] {
            return Err(Error::MalformedHash);
        }
        let (rounds, salt, checksum) = match fields.fields.as_slice() {
            [rounds, salt, checksum] => (*rounds, *salt, *checksum),
            [_, _] => return Err(Error::InvalidHash("missing checksum")),
            _ => return Err(Error::MalformedHash),
        };
        let rounds = self.rounds_spec().check(decode_dec_rounds(rounds)?)?;
        let salt = ab64_decode(salt)?;
        let checksum = ab64_decode(checksum)?;
        if checksum.len() != self.prf.digest_len() {
            return Err(Error::MalformedHash);
        }
        let expected = self.prf.derive(secret, &salt, rounds);
        Ok(consteq(&expected, &checksum))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let fields = split_mcf(hash)?;
        if fields.ident != self.desc.idents[0] {
            return Err(Error::MalformedHash);
        }
        let (rounds, salt, checksum) = match fields.fields.as_slice() {
            [rounds, salt] => (*rounds, *salt, None),
            [rounds, salt, checksum] => (*rounds, *salt, Some(*checksum)),
            _ => return Err(Error::MalformedHash),
        };
        let rounds = self.rounds_spec().check(decode_dec_rounds(rounds)?)?;
        let salt_bytes = ab64_decode(salt)?;
        if let Some(chk) = checksum {
            if ab64_decode(chk)?.len() != self.prf.digest_len() {
                return Err(Error::MalformedHash);
            }
        }
        Ok(HashInfo {
            ident: fields.ident.to_owned(),
            rounds: Some(rounds),
            salt: Some(salt.to_owned()),
            salt_len: Some(salt_bytes.len()),
            has_checksum: checksum.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let rounds = self.rounds_spec().resolve(settings.rounds)?;
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        Ok(format!(
            "${}${rounds}${}",
            self.desc.idents[0],
            ab64_encode(&salt)
        ))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let fields = split_mcf(config)?;
        if fields.ident != self.desc.idents[0] {
            return Err(Error::MalformedHash);
        }
        let (rounds, salt) = match fields.fields.as_slice() {
            [rounds, salt] | [rounds, salt, _] => (*rounds, *salt),
            _ => return Err(Error::MalformedHash),
        };
        let rounds = self.rounds_spec().check(decode_dec_rounds(rounds)?)?;
        let salt = ab64_decode(salt)?;
        Ok(self.serialize(rounds, &salt, secret))
    }
}
