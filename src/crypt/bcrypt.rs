//! Bcrypt hash, the OpenBSD Blowfish-based scheme.
//!
//! The preferred crypt-family choice for new passwords. Work factor is
//! logarithmic: each cost step doubles the key-setup time.
//!
//! # Parameters
//!
//! * __Password length__: at most 72 bytes; longer secrets are
//!   truncated unless `truncate_error` is set. NUL bytes are rejected.
//!
//! * __Salt length__: 22 characters (16 bytes).
//!
//! * __Rounds__: cost exponent 4 to 31. Default is 12.
//!
//! # Hash Format
//!
//! __`$2b$`__*`{cc}`*__$__*`{salt}{checksum}`*, where *`{cc}`* is the
//! zero-padded two-digit cost, *`{salt}`* is 22 characters and
//! *`{checksum}`* 31 characters of bcrypt base64. The legacy `$2a$`,
//! `$2x$` and `$2y$` idents are accepted for verification and flagged
//! for upgrade.

use blowfish::Blowfish;
use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

use crate::consteq;
use crate::encode::{BCRYPT64, bcrypt64_decode, bcrypt64_encode};
use crate::error::{Error, Result};
use crate::parse::HashCursor;
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
    reject_nul,
};

const IDENTS: [&str; 4] = ["2b", "2a", "2x", "2y"];
const DEFAULT_IDENT: &str = "2b";
const SALT_CHARS: usize = 22;
const CHECKSUM_CHARS: usize = 31;
const SECRET_LIMIT: usize = 72;

const COST: RoundsSpec = RoundsSpec {
    min: 4,
    max: 31,
    default: 12,
    cost: RoundsCost::Log2,
};

static DESC: Descriptor = Descriptor {
    name: "bcrypt",
    aliases: &["blowfish-crypt"],
    idents: &["2b", "2a", "2x", "2y"],
    default_ident: Some(DEFAULT_IDENT),
    setting_kwds: &["salt", "rounds", "ident", "truncate_error"],
    context_kwds: &[],
    rounds: Some(COST),
    salt: Some(SaltSpec {
        min_size: SALT_CHARS,
        max_size: SALT_CHARS,
        default_size: SALT_CHARS,
        chars: Some(BCRYPT64),
    }),
    checksum_size: CHECKSUM_CHARS,
    truncate_size: Some(SECRET_LIMIT),
    truncate_policy: TruncatePolicy::Silent,
};

// "OrpheanBeholderScryDoubt"
const CTEXT: [u32; 6] = [
    0x4f72_7068,
    0x6561_6e42,
    0x6568_6f6c,
    0x6465_7253,
    0x6372_7944,
    0x6f75_6274,
];

/// Eksblowfish key setup plus the 64-fold magic-block encryption. The
/// 24th output byte is dropped from the encoded checksum.
fn bcrypt_checksum(secret: &[u8], salt: &[u8], cost: u32) -> [u8; 23] {
    let mut key = Vec::with_capacity(secret.len() + 1);
    key.extend_from_slice(secret);
    key.push(0);

    let mut state = Blowfish::bc_init_state();
    state.salted_expand_key(salt, &key);
    for _ in 0..1u64 << cost {
        state.bc_expand_key(&key);
        state.bc_expand_key(salt);
    }
    key.zeroize();

    let mut ctext = CTEXT;
    let mut raw = [0u8; 24];
    for i in (0..6).step_by(2) {
        for _ in 0..64 {
            let [l, r] = state.bc_encrypt([ctext[i], ctext[i + 1]]);
            ctext[i] = l;
            ctext[i + 1] = r;
        }
        BigEndian::write_u32(&mut raw[i * 4..(i + 1) * 4], ctext[i]);
        BigEndian::write_u32(&mut raw[(i + 1) * 4..(i + 2) * 4], ctext[i + 1]);
    }
    let mut out = [0u8; 23];
    out.copy_from_slice(&raw[..23]);
    out
}

struct Parsed {
    ident: String,
    cost: u32,
    salt: String,
    checksum: Option<String>,
}

fn parse(hash: &str) -> Result<Parsed> {
    let mut cur = HashCursor::new(hash);
    if cur.take(1)? != "$" {
        return Err(Error::MalformedHash);
    }
    let ident = cur.take_until(b'$')?;
    if !IDENTS.contains(&ident) {
        return Err(Error::MalformedHash);
    }
    let cost_str = cur.take_until(b'$')?;
    if cost_str.len() != 2 || !cost_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedHash);
    }
    let cost = COST.check(cost_str.parse().map_err(|_| Error::MalformedHash)?)?;
    let salt = cur.take(SALT_CHARS)?;
    if !salt.bytes().all(|b| BCRYPT64.contains(&b)) {
        return Err(Error::MalformedHash);
    }
    let checksum = if cur.at_end() {
        None
    } else {
        let chk = cur.take(CHECKSUM_CHARS)?;
        if !chk.bytes().all(|b| BCRYPT64.contains(&b)) || !cur.at_end() {
            return Err(Error::MalformedHash);
        }
        Some(chk.to_owned())
    };
    Ok(Parsed {
        ident: ident.to_owned(),
        cost,
        salt: salt.to_owned(),
        checksum,
    })
}

/// The bcrypt hasher.
pub struct Bcrypt;

impl Bcrypt {
    /// The bcrypt scheme with its standard `$2b$` default.
    pub fn new() -> Self {
        Bcrypt
    }

    fn resolve_ident(&self, settings: &HashSettings) -> Result<&'static str> {
        match settings.ident.as_deref() {
            None => Ok(DEFAULT_IDENT),
            Some(id) => IDENTS
                .iter()
                .find(|&&known| known == id)
                .copied()
                .ok_or_else(|| Error::Config(format!("unknown bcrypt ident: {id}"))),
        }
    }

    fn serialize(&self, ident: &str, cost: u32, salt_bytes: &[u8], secret: &[u8]) -> String {
        let checksum = bcrypt_checksum(secret, salt_bytes, cost);
        format!(
            "${ident}${cost:02}${}{}",
            bcrypt64_encode(salt_bytes),
            bcrypt64_encode(&checksum)
        )
    }
}

impl Default for Bcrypt {
    fn default() -> Self {
        Bcrypt::new()
    }
}

impl Hasher for Bcrypt {
    fn descriptor(&self) -> &Descriptor {
        &DESC
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        reject_nul(secret)?;
        let secret = DESC.truncate(secret, settings.truncate_error)?;
        let ident = self.resolve_ident(settings)?;
        let cost = COST.resolve(settings.rounds)?;
        let salt_bytes = match settings.salt.as_deref() {
            Some(s) => {
                if s.len() != SALT_CHARS {
                    return Err(Error::InvalidSalt);
                }
                bcrypt64_decode(s, 16).map_err(|_| Error::InvalidSalt)?
            }
            None => {
                let mut buf = [0u8; 16];
                crate::random::gen_salt_bytes(&mut buf);
                buf.to_vec()
            }
        };
        Ok(self.serialize(ident, cost, &salt_bytes, secret))
    }

    fn verify(&self, secret: &[u8], hash: &str, settings: &HashSettings) -> Result<bool> {
        reject_nul(secret)?;
        let secret = DESC.truncate(secret, settings.truncate_error)?;
        let parsed = parse(hash)?;
        let Some(checksum) = parsed.checksum else {
            return Err(Error::InvalidHash("missing checksum"));
        };
        let salt_bytes = bcrypt64_decode(&parsed.salt, 16)?;
        let expected = bcrypt64_encode(&bcrypt_checksum(secret, &salt_bytes, parsed.cost));
        Ok(consteq(expected.as_bytes(), checksum.as_bytes()))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let parsed = parse(hash)?;
        Ok(HashInfo {
            ident: parsed.ident,
            rounds: Some(parsed.cost),
            salt_len: Some(parsed.salt.len()),
            salt: Some(parsed.salt),
            has_checksum: parsed.checksum.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let ident = self.resolve_ident(settings)?;
        let cost = COST.resolve(settings.rounds)?;
        let salt = match settings.salt.as_deref() {
            Some(s) => {
                let bytes = bcrypt64_decode(s, 16).map_err(|_| Error::InvalidSalt)?;
                bcrypt64_encode(&bytes)
            }
            None => {
                let mut buf = [0u8; 16];
                crate::random::gen_salt_bytes(&mut buf);
                bcrypt64_encode(&buf)
            }
        };
        Ok(format!("${ident}${cost:02}${salt}"))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        reject_nul(secret)?;
        let secret = DESC.truncate(secret, None)?;
        let parsed = parse(config)?;
        let salt_bytes = bcrypt64_decode(&parsed.salt, 16)?;
        Ok(self.serialize(&parsed.ident, parsed.cost, &salt_bytes, secret))
    }

    fn needs_update(&self, hash: &str, secret: Option<&[u8]>) -> bool {
        match parse(hash) {
            Ok(parsed) => {
                parsed.ident != DEFAULT_IDENT
                    || secret.is_some_and(|s| s.len() > SECRET_LIMIT)
            }
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
    fn published_vector() {
        let h = Bcrypt::new();
        let out = h
            .hash(
                b"password",
                &HashSettings::default()
                    .salt("CCCCCCCCCCCCCCCCCCCCC.")
                    .rounds(5),
            )
            .unwrap();
        assert_eq!(
            out,
            "$2b$05$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy"
        );
        assert!(h.verify(b"password", &out, &none()).unwrap());
        assert!(!h.verify(b"Password", &out, &none()).unwrap());
    }

    #[test]
    fn legacy_ident_verifies() {
        let h = Bcrypt::new();
        let legacy = "$2y$05$bvIG6Nmid91Mu9RcmmWZfO5HJIMCT8riNW0hEp8f6/FuA2/mHZFpe";
        assert!(h.verify(b"password", legacy, &none()).unwrap());
        assert!(h.needs_update(legacy, None));
        assert!(!h.needs_update(
            "$2b$05$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy",
            None
        ));
    }

    #[test]
    fn cost_is_zero_padded_and_bounded() {
        let h = Bcrypt::new();
        let out = h.hash(b"x", &HashSettings::default().rounds(4)).unwrap();
        assert!(out.starts_with("$2b$04$"));
        assert!(matches!(
            h.hash(b"x", &HashSettings::default().rounds(3)),
            Err(Error::Config(_))
        ));
        assert!(!h.identify("$2b$5$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy"));
        // out-of-range two-digit cost identifies but verify fails
        assert!(h.identify("$2b$99$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy"));
        assert!(
            h.verify(
                b"password",
                "$2b$99$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy",
                &none()
            )
            .is_err()
        );
    }

    #[test]
    fn truncation_policy() {
        let h = Bcrypt::new();
        let long = vec![b'a'; 80];
        let head = vec![b'a'; 72];
        let out = h
            .hash(&long, &HashSettings::default().rounds(4))
            .unwrap();
        // documented aliasing beyond 72 bytes
        assert!(h.verify(&head, &out, &none()).unwrap());
        assert!(matches!(
            h.hash(&long, &HashSettings::default().rounds(4).truncate_error(true)),
            Err(Error::PasswordTruncate { limit: 72 })
        ));
        assert!(h.needs_update(&out, Some(&long)));
        assert!(!h.needs_update(&out, Some(&head)));
    }

    #[test]
    fn nul_rejected() {
        let h = Bcrypt::new();
        assert!(matches!(
            h.hash(b"a\0b", &none()),
            Err(Error::PasswordValue)
        ));
    }

    #[test]
    fn config_roundtrip() {
        let h = Bcrypt::new();
        let config = h
            .genconfig(&HashSettings::default().salt("CCCCCCCCCCCCCCCCCCCCC.").rounds(5))
            .unwrap();
        assert_eq!(config, "$2b$05$CCCCCCCCCCCCCCCCCCCCC.");
        assert!(h.identify(&config));
        assert_eq!(
            h.genhash(b"password", &config).unwrap(),
            "$2b$05$CCCCCCCCCCCCCCCCCCCCC.7uG0VCzI2bS7j6ymqJi9CdcdxiRTWNy"
        );
    }

    #[test]
    fn random_salt_roundtrip() {
        let h = Bcrypt::new();
        let out = h.hash(b"secret", &HashSettings::default().rounds(4)).unwrap();
        assert_eq!(out.len(), 60);
        assert!(h.verify(b"secret", &out, &none()).unwrap());
        assert!(!h.verify(b"other", &out, &none()).unwrap());
    }
}
