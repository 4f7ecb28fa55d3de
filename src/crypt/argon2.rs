//! Argon2 memory-hard hash (PHC winner), all three variants.
//!
//! The recommended scheme for new deployments that can afford the
//! memory cost.
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt__: raw bytes, 8 to 1024; 16 generated by default.
//!
//! * __Rounds__: time cost `t`, 1 and up. Memory cost `m` is in KiB;
//!   `p` is the lane count.
//!
//! # Hash Format
//!
//! __`$argon2id$v=19$m=`__*`{m}`*__`,t=`__*`{t}`*__`,p=`__*`{p}`*
//! __$__*`{salt}`*__$__*`{checksum}`* with standard unpadded base64.
//! Version-1.0 strings without the `v=` segment are accepted and
//! flagged for upgrade.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::consteq;
use crate::encode::{b64_decode, b64_encode};
use crate::error::{Error, Result};
use crate::parse::{parse_params, split_mcf};
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, RoundsCost, RoundsSpec, SaltSpec, TruncatePolicy,
};

const DEFAULT_MEMORY: u32 = 19_456; // KiB
const DEFAULT_TIME: u32 = 2;
const DEFAULT_PARALLELISM: u32 = 1;
const CHECKSUM_BYTES: usize = 32;

const TIME: RoundsSpec = RoundsSpec {
    min: 1,
    max: u32::MAX,
    default: DEFAULT_TIME,
    cost: RoundsCost::Linear,
};

const SALT: SaltSpec = SaltSpec {
    min_size: 8,
    max_size: 1024,
    default_size: 16,
    chars: None,
};

static DESC: Descriptor = Descriptor {
    name: "argon2",
    aliases: &["argon2id", "argon2i", "argon2d"],
    idents: &["argon2id", "argon2i", "argon2d"],
    default_ident: Some("argon2id"),
    setting_kwds: &[
        "salt",
        "salt_size",
        "rounds",
        "ident",
        "memory_cost",
        "parallelism",
    ],
    context_kwds: &[],
    rounds: Some(TIME),
    salt: Some(SALT),
    checksum_size: 43,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

fn algorithm(ident: &str) -> Result<Algorithm> {
    match ident {
        "argon2id" => Ok(Algorithm::Argon2id),
        "argon2i" => Ok(Algorithm::Argon2i),
        "argon2d" => Ok(Algorithm::Argon2d),
        _ => Err(Error::MalformedHash),
    }
}

fn version(v: u32) -> Result<Version> {
    match v {
        0x10 => Ok(Version::V0x10),
        0x13 => Ok(Version::V0x13),
        _ => Err(Error::InvalidHash("argon2 version")),
    }
}

struct Parsed {
    ident: String,
    version: u32,
    memory: u32,
    time: u32,
    parallelism: u32,
    salt: Vec<u8>,
    checksum: Option<Vec<u8>>,
}

fn parse(hash: &str) -> Result<Parsed> {
    let fields = split_mcf(hash)?;
    algorithm(fields.ident)?;
    let mut rest = fields.fields.as_slice();

    let mut ver = 0x10;
    if let Some(first) = rest.first() {
        if let Some(v) = first.strip_prefix("v=") {
            ver = v.parse().map_err(|_| Error::MalformedHash)?;
            rest = &rest[1..];
        }
    }

    let (params, salt, checksum) = match rest {
        [params, salt] => (*params, *salt, None),
        [params, salt, checksum] => (*params, *salt, Some(*checksum)),
        _ => return Err(Error::MalformedHash),
    };

    let (mut memory, mut time, mut parallelism) = (None, None, None);
    for (k, v) in parse_params(params)? {
        let value: u32 = v.parse().map_err(|_| Error::MalformedHash)?;
        match k {
            "m" => memory = Some(value),
            "t" => time = Some(value),
            "p" => parallelism = Some(value),
            _ => return Err(Error::InvalidHash("unknown argon2 parameter")),
        }
    }
    let (Some(memory), Some(time), Some(parallelism)) = (memory, time, parallelism) else {
        return Err(Error::MalformedHash);
    };

    let salt = b64_decode(salt)?;
    SALT.check_len(salt.len())?;
    let checksum = checksum.map(b64_decode).transpose()?;

    Ok(Parsed {
        ident: fields.ident.to_owned(),
        version: ver,
        memory,
        time,
        parallelism,
        salt,
        checksum,
    })
}

fn derive(
    alg: Algorithm,
    ver: Version,
    memory: u32,
    time: u32,
    parallelism: u32,
    secret: &[u8],
    salt: &[u8],
    out_len: usize,
    range_error: fn() -> Error,
) -> Result<Vec<u8>> {
    let params =
        Params::new(memory, time, parallelism, Some(out_len)).map_err(|_| range_error())?;
    let mut out = vec![0u8; out_len];
    Argon2::new(alg, ver, params)
        .hash_password_into(secret, salt, &mut out)
        .map_err(|_| range_error())?;
    Ok(out)
}

/// The argon2 hasher; the variant is chosen per hash via the ident.
pub struct Argon2Hasher;

impl Argon2Hasher {
    /// The argon2 scheme with its `argon2id` default variant.
    pub fn new() -> Self {
        Argon2Hasher
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Argon2Hasher::new()
    }
}

impl Hasher for Argon2Hasher {
    fn descriptor(&self) -> &Descriptor {
        &DESC
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        let ident = settings.ident.as_deref().unwrap_or("argon2id");
        let alg =
            algorithm(ident).map_err(|_| Error::Config(format!("unknown argon2 ident: {ident}")))?;
        let time = TIME.resolve(settings.rounds)?;
        let memory = settings.memory_cost.unwrap_or(DEFAULT_MEMORY);
        let parallelism = settings.parallelism.unwrap_or(DEFAULT_PARALLELISM);
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        let checksum = derive(
            alg,
            Version::V0x13,
            memory,
            time,
            parallelism,
            secret,
            &salt,
            CHECKSUM_BYTES,
            || Error::Config("invalid argon2 parameters".into()),
        )?;
        Ok(format!(
            "${ident}$v=19$m={memory},t={time},p={parallelism}${}${}",
            b64_encode(&salt),
            b64_encode(&checksum)
        ))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        let parsed = parse(hash)?;
        let Some(checksum) = parsed.checksum else {
            return Err(Error::InvalidHash("missing checksum"));
        };
        let expected = derive(
            algorithm(&parsed.ident)?,
            version(parsed.version)?,
            parsed.memory,
            parsed.time,
            parsed.parallelism,
            secret,
            &parsed.salt,
            checksum.len(),
            || Error::InvalidHash("argon2 parameter out of range"),
        )?;
        Ok(consteq(&expected, &checksum))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let parsed = parse(hash)?;
        Ok(HashInfo {
            ident: parsed.ident,
            rounds: Some(parsed.time),
            salt: Some(b64_encode(&parsed.salt)),
            salt_len: Some(parsed.salt.len()),
            memory_cost: Some(parsed.memory),
            parallelism: Some(parsed.parallelism),
            has_checksum: parsed.checksum.is_some(),
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let ident = settings.ident.as_deref().unwrap_or("argon2id");
        algorithm(ident).map_err(|_| Error::Config(format!("unknown argon2 ident: {ident}")))?;
        let time = TIME.resolve(settings.rounds)?;
        let memory = settings.memory_cost.unwrap_or(DEFAULT_MEMORY);
        let parallelism = settings.parallelism.unwrap_or(DEFAULT_PARALLELISM);
        let salt = SALT.resolve_bytes(settings.salt.as_deref(), settings.salt_size)?;
        Ok(format!(
            "${ident}$v=19$m={memory},t={time},p={parallelism}${}",
            b64_encode(&salt)
        ))
    }

    fn genhash(&self, secret: &[u8], config: &str) -> Result<String> {
        let parsed = parse(config)?;
        let checksum = derive(
            algorithm(&parsed.ident)?,
            version(parsed.version)?,
            parsed.memory,
            parsed.time,
            parsed.parallelism,
            secret,
            &parsed.salt,
            parsed.checksum.map_or(CHECKSUM_BYTES, |c| c.len()),
            || Error::InvalidHash("argon2 parameter out of range"),
        )?;
        Ok(format!(
            "${}$v={}$m={},t={},p={}${}${}",
            parsed.ident,
            parsed.version,
            parsed.memory,
            parsed.time,
            parsed.parallelism,
            b64_encode(&parsed.salt),
            b64_encode(&checksum)
        ))
    }

    fn needs_update(&self, hash: &str, _secret: Option<&[u8]>) -> bool {
        match parse(hash) {
            Ok(parsed) => parsed.version < 0x13,
            Err(_) => false,
        }
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
    fn reference_digest() {
        // phc-winner-argon2 CLI reference: argon2i, m=65536, t=2, p=4
        let h = Argon2Hasher::new();
        let out = h
            .hash(
                b"password",
                &HashSettings::default()
                    .ident("argon2i")
                    .salt("somesalt")
                    .rounds(2)
                    .memory_cost(65536)
                    .parallelism(4),
            )
            .unwrap();
        assert!(out.starts_with("$argon2i$v=19$m=65536,t=2,p=4$c29tZXNhbHQ$"));
        let checksum = out.rsplit('$').next().unwrap();
        assert_eq!(
            hex_encode(&b64_decode(checksum).unwrap()),
            "c1628832147d9720c5bd1cfd61367078729f6dfb6f8fea9ff98158e0d7816ed0"
        );
        assert!(h.verify(b"password", &out, &none()).unwrap());
        assert!(!h.verify(b"passwore", &out, &none()).unwrap());
    }

    #[test]
    fn variants_are_distinct() {
        let h = Argon2Hasher::new();
        let settings = |ident: &str| {
            HashSettings::default()
                .ident(ident)
                .salt("somesalt")
                .rounds(1)
                .memory_cost(64)
        };
        let id = h.hash(b"pw", &settings("argon2id")).unwrap();
        let i = h.hash(b"pw", &settings("argon2i")).unwrap();
        assert!(id.starts_with("$argon2id$"));
        assert!(i.starts_with("$argon2i$"));
        assert_ne!(
            id.rsplit('$').next().unwrap(),
            i.rsplit('$').next().unwrap()
        );
        assert!(h.verify(b"pw", &id, &none()).unwrap());
        assert!(h.verify(b"pw", &i, &none()).unwrap());
    }

    #[test]
    fn inspect_reads_params() {
        let h = Argon2Hasher::new();
        let out = h
            .hash(
                b"pw",
                &HashSettings::default().rounds(3).memory_cost(128).parallelism(2),
            )
            .unwrap();
        let info = h.inspect(&out).unwrap();
        assert_eq!(info.ident, "argon2id");
        assert_eq!(info.rounds, Some(3));
        assert_eq!(info.memory_cost, Some(128));
        assert_eq!(info.parallelism, Some(2));
        assert_eq!(info.salt_len, Some(16));
    }

    #[test]
    fn versionless_hash_needs_update() {
        let h = Argon2Hasher::new();
        let modern = h
            .hash(b"pw", &HashSettings::default().rounds(1).memory_cost(64))
            .unwrap();
        assert!(!h.needs_update(&modern, None));
        let legacy = "$argon2i$m=64,t=1,p=1$c29tZXNhbHQ$b64doesnotmatterhere";
        assert!(h.identify(legacy));
        assert!(h.needs_update(legacy, None));
    }

    #[test]
    fn malformed_params_do_not_identify() {
        let h = Argon2Hasher::new();
        assert!(!h.identify("$argon2id$v=19$m=65536,t=2$c29tZXNhbHQ$AAAA"));
        assert!(!h.identify("$argon2q$v=19$m=65536,t=2,p=1$c29tZXNhbHQ$AAAA"));
        assert!(!h.identify("$argon2id$v=19$m=,t=2,p=1$c29tZXNhbHQ$AAAA"));
    }
}
