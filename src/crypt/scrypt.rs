//! Scrypt memory-hard hash.
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt__: raw bytes, 0 to 1024; 16 generated by default.
//!
//! * __Rounds__: `ln`, the log2 of the scrypt `N` parameter, 1 to 31.
//!   Default is 16. `r` (block size) and `p` (parallelism) default to
//!   8 and 1.
//!
//! # Hash Format
//!
//! __`$scrypt$ln=`__*`{ln}`*__`,r=`__*`{r}`*__`,p=`__*`{p}`*
//! __$__*`{salt}`*__$__*`{checksum}`* with standard unpadded base64.

use scrypt::Params;

use crate::consteq;
use crate::encode::{b64_decode, b64_encode};
use crate::error::{Error, Result};
use crate::parse::{parse_params, split_mcf};
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
};

const DEFAULT_R: u32 = 8;
const DEFAULT_P: u32 = 1;
const CHECKSUM_BYTES: usize = 32;

const LN: RoundsSpec = RoundsSpec {
    min: 1,
    max: 31,
    default: 16,
    cost: RoundsCost::Log2,
};

const SALT: SaltSpec = SaltSpec {
    min_size: 0,
    max_size: 1024,
    default_size: 16,
    chars: None,
};

static DESC: Descriptor = Descriptor {
    name: "scrypt",
    aliases: &[],
    idents: &["scrypt"],
    default_ident: Some("scrypt"),
    setting_kwds: &["salt", "salt_size", "rounds", "parallelism"],
    context_kwds: &[],
    rounds: Some(LN),
    salt: Some(SALT),
    checksum_size: 43,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

fn scrypt_digest(
    secret: &[u8],
    salt: &[u8],
    ln: u32,
    r: u32,
    p: u32,
    out_len: usize,
    range_error: fn() -> Error,
) -> Result<Vec<u8>> {
    let params = Params::new(ln as u8, r, p, out_len).map_err(|_| range_error())?;
    let mut out = vec![0u8; out_len];
    scrypt::scrypt(secret, salt, &params, &mut out).map_err(|_| range_error())?;
    Ok(out)
}

struct Parsed {
    ln: u32,
    r: u32,
    p: u32,
    salt: Vec<u8>,
    checksum: Option<Vec<u8>>,
}

fn parse(hash: &str) -> Result<Parsed> {
    let fields = split_mcf(hash)?;
    if fields.ident != "scrypt" {
        return Err(Error::MalformedHash);
    }
    let (params, salt, checksum) = match fields.fields.as_slice() {
        [params, salt] => (*params, *salt, None),
        [params, salt, checksum] => (*params, *salt, Some(*checksum)),
        _ => return Err(Error::MalformedHash),
    };
    let (mut ln, mut r, mut p) = (None, None, None);
    for (k, v) in parse_params(params)? {
        let value: u32 = v.parse().map_err(|_| Error::MalformedHash)?;
        match k {
            "ln" => ln = Some(value),
            "r" => r = Some(value),
            "p" => p = Some(value),
            _ => return Err(Error::InvalidHash("unknown scrypt parameter")),
        }
    }
    let (Some(ln), Some(r), Some(p)) = (ln, r, p) else {
        return Err(Error::MalformedHash);
    };
    LN.check(ln)?;
    Ok(Parsed {
        ln,
        r,
        p,
        salt: b64_decode(salt)?,
        checksum: checksum.map(b64_decode).transpose()?,
    })
}

/// The scrypt hasher.
pub struct Scrypt;

impl Scrypt {
    /// The scrypt scheme with its standard parameters.
    pub fn new() -> Self {
        Scrypt
    }
}

impl Default for Scrypt {
    fn default() -> Self {
        Scrypt::new()
    }
}

impl Hasher for Scrypt {
    fn descriptor(&self) -> &Descriptor {
        &DESC
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        let ln = LN.resolve(settings.rounds)?;
        let p = settings.parallelism.unwrap_or(DEFAULT_P);
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        let checksum = scrypt_digest(secret, &salt, ln, DEFAULT_R, p, CHECKSUM_BYTES, || {
            Error::Config("invalid scrypt parameters".into())
        })?;
        Ok(format!(
            "$scrypt$ln={ln},r={DEFAULT_R},p={p}${}${}",
            b64_encode(&salt),
            b64_encode(&checksum)
        ))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        let parsed = parse(hash)?;
        let Some(checksum) = parsed.checksum else {
            return Err(Error::InvalidHash("missing checksum"));
        };
        let expected = scrypt_digest(
            secret,
            &parsed.salt,
            parsed.ln,
            parsed.r,
            parsed.p,
            checksum.len(),
            || Error::InvalidHash("scrypt parameter out of range"),
        )?;
        Ok(consteq(&expected, &checksum))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let parsed = parse(hash)?;
        Ok(HashInfo {
            ident: "scrypt".to_owned(),
            rounds: Some(parsed.ln),
            salt: Some(b64_encode(&parsed.salt)),
            salt_len: Some(parsed.salt.len()),
            parallelism: Some(parsed.p),
            has_checksum: parsed.checksum.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let ln = LN.resolve(settings.rounds)?;
        let p = settings.parallelism.unwrap_or(DEFAULT_P);
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        Ok(format!(
            "$scrypt$ln={ln},r={DEFAULT_R},p={p}${}",
            b64_encode(&salt)
        ))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let parsed = parse(config)?;
        let out_len = parsed.checksum.as_ref().map_or(CHECKSUM_BYTES, Vec::len);
        let checksum = scrypt_digest(
            secret,
            &parsed.salt,
            parsed.ln,
            parsed.r,
            parsed.p,
            out_len,
            || Error::InvalidHash("scrypt parameter out of range"),
        )?;
        Ok(format!(
            "$scrypt$ln={},r={},p={}${}${}",
            parsed.ln,
            parsed.r,
            parsed.p,
            b64_encode(&parsed.salt),
            b64_encode(&checksum)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::hex_encode;

    fn none() -> HashSettings {
        HashSettings::default()
    }

    #[test]
    fn rfc7914_vectors() {
        let dk = scrypt_digest(b"password", b"NaCl", 10, 8, 16, 64, || Error::Encoding).unwrap();
        assert_eq!(
            hex_encode(&dk),
            "fdbabe1c9d3472007856e7190d01e9fe7c6ad7cbc8237830e77376634b3731622eaf30d92e22a3886f\
             f109279d9830dac727afb94a83ee6d8360cbdfa2cc0640"
        );
        let dk =
            scrypt_digest(b"pleaseletmein", b"SodiumChloride", 14, 8, 1, 64, || Error::Encoding)
                .unwrap();
        assert_eq!(
            hex_encode(&dk),
            "7023bdcb3afd7348461c06cd81fd38ebfda8fbba904f8e3ea9b543f6545da1f2d5432955613f0fcf62\
             d49705242a9af9e61e85dc0d651e40dfcf017b45575887"
        );
    }

    #[test]
    fn wire_format_roundtrip() {
        let h = Scrypt::new();
        let out = h
            .hash(b"hunter2", &HashSettings::default().rounds(4))
            .unwrap();
        assert!(out.starts_with("$scrypt$ln=4,r=8,p=1$"));
        assert!(h.verify(b"hunter2", &out, &none()).unwrap());
        assert!(!h.verify(b"hunter3", &out, &none()).unwrap());
        let info = h.inspect(&out).unwrap();
        assert_eq!(info.rounds, Some(4));
        assert_eq!(info.salt_len, Some(16));
    }

    #[test]
    fn genconfig_genhash_matches_hash() {
        let h = Scrypt::new();
        let config = h
            .genconfig(&HashSettings::default().salt("saltsalt").rounds(4))
            .unwrap();
        assert_eq!(config, "$scrypt$ln=4,r=8,p=1$c2FsdHNhbHQ");
        assert_eq!(
            h.genhash(b"pw", &config).unwrap(),
            h.hash(b"pw", &HashSettings::default().salt("saltsalt").rounds(4))
                .unwrap()
        );
    }

    #[test]
    fn bad_params_do_not_verify() {
        let h = Scrypt::new();
        assert!(!h.identify("$scrypt$ln=4,r=8$c2FsdHNhbHQ$AAAA"));
        // out-of-range ln still identifies but refuses to verify
        let oversize = "$scrypt$ln=99,r=8,p=1$c2FsdHNhbHQ$AAAA";
        assert!(h.identify(oversize));
        assert!(h.verify(b"x", oversize, &none()).is_err());
        assert!(matches!(
            h.hash(b"x", &HashSettings::default().rounds(40)),
            Err(Error::Config(_))
        ));
    }
}
