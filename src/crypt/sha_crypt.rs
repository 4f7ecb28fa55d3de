//! SHA-256 and SHA-512 crypt hashes (`$5$` / `$6$`).
//!
//! Implements the published sha-crypt specification used by glibc.
//! These remain reasonable choices for new system-wide hashes.
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt length__: 1 to 16 characters. Default is 16.
//!
//! * __Rounds__: 1000 to 999,999,999. Default is 5000; the `rounds=`
//!   segment is omitted from the hash exactly when the value is 5000.
//!
//! # Hash Format
//!
//! __`$5$`__[__`rounds=`__*`{rounds}`*__$__]*`{salt}`*__$__*`{checksum}`*
//! with a 43-character checksum; `$6$` and 86 characters for SHA-512.

use sha2::digest::Digest;
use sha2::{Sha256, Sha512};

use crate::consteq;
use crate::encode::{HASH64, decode_dec_rounds, h64_encode_24bit, validate_salt_chars};
use crate::error::{Error, Result};
use crate::parse::split_mcf;
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
    reject_nul,
};

const DEFAULT_ROUNDS: u32 = 5000;

const ROUNDS: RoundsSpec = RoundsSpec {
    min: 1000,
    max: 999_999_999,
    default: DEFAULT_ROUNDS,
    cost: RoundsCost::Linear,
};

const SALT: SaltSpec = SaltSpec {
    min_size: 1,
    max_size: 16,
    default_size: 16,
    chars: Some(HASH64),
};

const SHA256_CHECKSUM_LEN: usize = 43;
const SHA512_CHECKSUM_LEN: usize = 86;

// Output byte order of the reference implementation's base64 step.
const SHA256_ORDER: [(usize, usize, usize); 10] = [
    (0, 10, 20),
    (21, 1, 11),
    (12, 22, 2),
    (3, 13, 23),
    (24, 4, 14),
    (15, 25, 5),
    (6, 16, 26),
    (27, 7, 17),
    (18, 28, 8),
    (9, 19, 29),
];

const SHA512_ORDER: [(usize, usize, usize); 21] = [
    (0, 21, 42),
    (22, 43, 1),
    (44, 2, 23),
    (3, 24, 45),
    (25, 46, 4),
    (47, 5, 26),
    (6, 27, 48),
    (28, 49, 7),
    (50, 8, 29),
    (9, 30, 51),
    (31, 52, 10),
    (53, 11, 32),
    (12, 33, 54),
    (34, 55, 13),
    (56, 14, 35),
    (15, 36, 57),
    (37, 58, 16),
    (59, 17, 38),
    (18, 39, 60),
    (40, 61, 19),
    (62, 20, 41),
];

fn repeat_to(src: &[u8], len: usize) -> Vec<u8> {
    src.iter().copied().cycle().take(len).collect()
}

fn sha_crypt_digest<D: Digest>(secret: &[u8], salt: &[u8], rounds: u32) -> Vec<u8> {
    let n = <D as Digest>::output_size();

    let mut alt = D::new();
    alt.update(secret);
    alt.update(salt);
    alt.update(secret);
    let mut alt_result = alt.finalize().to_vec();

    let mut ctx = D::new();
    ctx.update(secret);
    ctx.update(salt);
    let mut cnt = secret.len();
    while cnt > n {
        ctx.update(&alt_result);
        cnt -= n;
    }
    ctx.update(&alt_result[..cnt]);
    let mut i = secret.len();
    while i > 0 {
        if i & 1 != 0 {
            ctx.update(&alt_result);
        } else {
            ctx.update(secret);
        }
        i >>= 1;
    }
    alt_result = ctx.finalize().to_vec();

    let mut p = D::new();
    for _ in 0..secret.len() {
        p.update(secret);
    }
    let p_bytes = repeat_to(&p.finalize(), secret.len());

    let mut s = D::new();
    for _ in 0..(16 + alt_result[0] as usize) {
        s.update(salt);
    }
    let s_bytes = repeat_to(&s.finalize(), salt.len());

    for r in 0..rounds {
        let mut c = D::new();
        if r & 1 != 0 {
            c.update(&p_bytes);
        } else {
            c.update(&alt_result);
        }
        if r % 3 != 0 {
            c.update(&s_bytes);
        }
        if r % 7 != 0 {
            c.update(&p_bytes);
        }
        if r & 1 != 0 {
            c.update(&alt_result);
        } else {
            c.update(&p_bytes);
        }
        alt_result = c.finalize().to_vec();
    }
    alt_result
}

/// SHA-256 or SHA-512 crypt; the digest and output tables are the only
/// differences between the two.
pub struct ShaCrypt {
    desc: &'static Descriptor,
    wide: bool,
}

static SHA256_DESC: Descriptor = Descriptor {
    name: "sha256_crypt",
    aliases: &["sha-256-crypt"],
    idents: &["5"],
    default_ident: Some("5"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: Some(ROUNDS),
    salt: Some(SALT),
    checksum_size: SHA256_CHECKSUM_LEN,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static SHA512_DESC: Descriptor = Descriptor {
    name: "sha512_crypt",
    aliases: &["sha-512-crypt"],
    idents: &["6"],
    default_ident: Some("6"),
    setting_kwds: &["salt", "salt_size", "rounds"],
    context_kwds: &[],
    rounds: Some(ROUNDS),
    salt: Some(SALT),
    checksum_size: SHA512_CHECKSUM_LEN,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

impl ShaCrypt {
    /// The `$5$` scheme.
    pub fn sha256() -> Self {
        ShaCrypt {
            desc: &SHA256_DESC,
            wide: false,
        }
    }

    /// The `$6$` scheme.
    pub fn sha512() -> Self {
        ShaCrypt {
            desc: &SHA512_DESC,
            wide: true,
        }
    }

    fn checksum_len(&self) -> usize {
        self.desc.checksum_size
    }

    fn encode_checksum(&self, digest: &[u8], out: &mut String) {
        if self.wide {
            for &(a, b, c) in &SHA512_ORDER {
                h64_encode_24bit(out, digest[a], digest[b], digest[c], 4);
            }
            h64_encode_24bit(out, 0, 0, digest[63], 2);
        } else {
            for &(a, b, c) in &SHA256_ORDER {
                h64_encode_24bit(out, digest[a], digest[b], digest[c], 4);
            }
            h64_encode_24bit(out, 0, digest[31], digest[30], 3);
        }
    }

    fn serialize(&self, rounds: u32, salt: &str, secret: &[u8]) -> String {
        let digest = if self.wide {
            sha_crypt_digest::<Sha512>(secret, salt.as_bytes(), rounds)
        } else {
            sha_crypt_digest::<Sha256>(secret, salt.as_bytes(), rounds)
        };
        let mut out = String::with_capacity(8 + 16 + salt.len() + 1 + self.checksum_len());
        out.push('$');
        out.push_str(self.desc.idents[0]);
        out.push('$');
        if rounds != DEFAULT_ROUNDS {
            out.push_str("rounds=");
            out.push_str(&rounds.to_string());
            out.push('$');
        }
        out.push_str(salt);
        out.push('$');
        self.encode_checksum(&digest, &mut out);
        out
    }
}

impl Hasher for ShaCrypt {
    fn descriptor(&self) -> &Descriptor {
        self.desc
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        reject_nul(secret)?;
        let rounds = ROUNDS.resolve(settings.rounds)?;
        let salt = SALT.resolve_str(settings.salt.as_deref(), settings.salt_size)?;
        Ok(self.serialize(rounds, &salt, secret))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        reject_nul(secret)?;
        let info = self.inspect(hash)?;
        if !info.has_checksum {
            return Err(Error::InvalidHash("missing checksum"));
        }
        let salt = info.salt.unwrap_or_default();
        let rounds = info.rounds.unwrap_or(DEFAULT_ROUNDS);
        let expected = self.serialize(rounds, &salt, secret);
        // an explicit rounds=5000 segment is accepted but not re-emitted
        let canonical = hash.replacen("$rounds=5000", "", 1);
        Ok(consteq(expected.as_bytes(), canonical.as_bytes()))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let fields = split_mcf(hash)?;
        if fields.ident != self.desc.idents[0] {
            return Err(Error::MalformedHash);
        }
        let mut rest = fields.fields.as_slice();
        let mut rounds = None;
        if let Some(first) = rest.first() {
            if let Some(r) = first.strip_prefix("rounds=") {
                rounds = Some(ROUNDS.check(decode_dec_rounds(r)?)?);
                rest = &rest[1..];
            }
        }
        let (salt, checksum) = match rest {
            [salt] => (*salt, None),
            [salt, checksum] => (*salt, Some(*checksum)),
            _ => return Err(Error::MalformedHash),
        };
        if salt.len() > SALT.max_size {
            return Err(Error::InvalidSalt);
        }
        validate_salt_chars(salt, HASH64).map_err(|_| Error::MalformedHash)?;
        if let Some(chk) = checksum {
            if chk.len() != self.checksum_len() {
                return Err(Error::MalformedHash);
            }
            validate_salt_chars(chk, HASH64).map_err(|_| Error::MalformedHash)?;
        }
        Ok(HashInfo {
            ident: fields.ident.to_owned(),
            rounds,
            salt: Some(salt.to_owned()),
            salt_len: Some(salt.len()),
            has_checksum: checksum.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let rounds = ROUNDS.resolve(settings.rounds)?;
        let salt = SALT.resolve_str(settings.salt.as_deref(), settings.salt_size)?;
        let mut out = format!("${}$", self.desc.idents[0]);
        if rounds != DEFAULT_ROUNDS {
            out.push_str(&format!("rounds={rounds}$"));
        }
        out.push_str(&salt);
        Ok(out)
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        reject_nul(secret)?;
        let info = self.inspect(config)?;
        let salt = info.salt.unwrap_or_default();
        Ok(self.serialize(info.rounds.unwrap_or(DEFAULT_ROUNDS), &salt, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> HashSettings {
        HashSettings::default()
    }

    #[test]
    fn sha512_reference_vectors() {
        let h = ShaCrypt::sha512();
        assert_eq!(
            h.hash(b"Hello world!", &HashSettings::default().salt("saltstring"))
                .unwrap(),
            "$6$saltstring$svn8UoSVapNtMuq1ukKS4tPQd8iKwSMHWjl/O817G3uBnIFNjnQJuesI6\
             8u4OTLiBFdcbYEdFCoEOfaS35inz1"
        );
        assert_eq!(
            h.hash(
                b"Hello world!",
                &HashSettings::default().salt("saltstringsaltst").rounds(10000)
            )
            .unwrap(),
            "$6$rounds=10000$saltstringsaltst$OW1/O6BYHV6BcXZu8QVeXbDWra3Oeqh0sbHbbMCVNSnCM/UrjmM0\
             Dp8vOuZeHBy/YTBmSK6H9qs/y3RnOaw5v."
        );
    }

    #[test]
    fn sha256_reference_vectors() {
        let h = ShaCrypt::sha256();
        assert_eq!(
            h.hash(b"Hello world!", &HashSettings::default().salt("saltstring"))
                .unwrap(),
            "$5$saltstring$5B8vYYiY.CVt1RlTTf8KbXBH3hsxY/GNooZaBBGWEc5"
        );
        assert_eq!(
            h.hash(
                b"Hello world!",
                &HashSettings::default().salt("saltstringsaltst").rounds(10000)
            )
            .unwrap(),
            "$5$rounds=10000$saltstringsaltst$3xv.VbSHBb70AL0lob7lFKRWfv78XCmpU2Q5l8hXyR5"
        );
    }

    #[test]
    fn explicit_rounds_prefix_and_shape() {
        let h = ShaCrypt::sha512();
        let out = h
            .hash(
                b"Hello world!",
                &HashSettings::default().salt("saltstring").rounds(10000),
            )
            .unwrap();
        assert!(out.starts_with("$6$rounds=10000$saltstring$"));
        let checksum = out.rsplit('$').next().unwrap();
        assert_eq!(checksum.len(), 86);
        assert!(h.verify(b"Hello world!", &out, &none()).unwrap());
        let info = h.inspect(&out).unwrap();
        assert_eq!(info.rounds, Some(10000));
        assert_eq!(info.salt.as_deref(), Some("saltstring"));
    }

    #[test]
    fn default_rounds_segment_omitted() {
        let h = ShaCrypt::sha256();
        let out = h
            .hash(b"x", &HashSettings::default().salt("somesalt").rounds(5000))
            .unwrap();
        assert!(!out.contains("rounds="));
        let out = h
            .hash(b"x", &HashSettings::default().salt("somesalt").rounds(5001))
            .unwrap();
        assert!(out.starts_with("$5$rounds=5001$"));
    }

    #[test]
    fn explicit_default_rounds_verifies() {
        let h = ShaCrypt::sha256();
        let canonical = h
            .hash(b"secret", &HashSettings::default().salt("somesalt"))
            .unwrap();
        let explicit = canonical.replacen("$5$", "$5$rounds=5000$", 1);
        assert!(h.verify(b"secret", &explicit, &none()).unwrap());
    }

    #[test]
    fn rounds_bounds() {
        let h = ShaCrypt::sha512();
        assert!(matches!(
            h.hash(b"x", &HashSettings::default().rounds(999)),
            Err(Error::Config(_))
        ));
        // parsed out-of-range rounds identify but do not verify
        let bad = "$6$rounds=999$saltstring$svn8UoSVapNtMuq1ukKS4tPQd8iKwSMHWjl/O817G3uBnIFNjnQJu\
                   esI68u4OTLiBFdcbYEdFCoEOfaS35inz1";
        assert!(h.identify(bad));
        assert!(h.verify(b"Hello world!", bad, &none()).is_err());
    }

    #[test]
    fn leading_zero_rounds_is_malformed() {
        let h = ShaCrypt::sha512();
        assert!(!h.identify("$6$rounds=010000$saltstring$x"));
    }

    #[test]
    fn genconfig_pins_settings() {
        let h = ShaCrypt::sha512();
        let config = h
            .genconfig(&HashSettings::default().salt("saltstringsaltst").rounds(10000))
            .unwrap();
        assert_eq!(config, "$6$rounds=10000$saltstringsaltst");
        assert_eq!(
            h.genhash(b"Hello world!", &config).unwrap(),
            h.hash(
                b"Hello world!",
                &HashSettings::default().salt("saltstringsaltst").rounds(10000)
            )
            .unwrap()
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let h = ShaCrypt::sha512();
        let out = h.hash(b"Hello world!", &none()).unwrap();
        assert!(h.verify(b"Hello world!", &out, &none()).unwrap());
        assert!(!h.verify(b"hello world!", &out, &none()).unwrap());
    }
}
