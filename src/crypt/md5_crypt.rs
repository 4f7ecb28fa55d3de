//! MD5-based crypt hashes: `md5_crypt` and its Apache `apr1` variant.
//!
//! Developed for FreeBSD to replace the aging DES crypt and later
//! adopted across Linux distributions. Considered insecure today;
//! accepted for verification and migration only.
//!
//! # Parameters
//!
//! * __Password length__: unlimited.
//!
//! * __Salt length__: 1 to 8 characters. Default is 8.
//!
//! * __Rounds__: 1000 (fixed).
//!
//! # Hash Format
//!
//! __`$1$`__*`{salt}`*__$__*`{checksum}`* (`$apr1$` for the Apache
//! variant), where *`{checksum}`* is a 22-character hash64 encoding of
//! the digest.

use md5::{Digest, Md5};

use crate::consteq;
use crate::encode::{HASH64, h64_encode_24bit, validate_salt_chars};
use crate::error::{Error, Result};
use crate::parse::split_mcf;
use crate::scheme::{
    Descriptor, Hasher, HashInfo, HashSettings, SaltSpec, TruncatePolicy, reject_nul,
};

const CHECKSUM_LEN: usize = 22;
const FIXED_ROUNDS: usize = 1000;

const SALT: SaltSpec = SaltSpec {
    min_size: 1,
    max_size: 8,
    default_size: 8,
    chars: Some(HASH64),
};

/// The shared md5-crypt transform; `magic` selects the variant prefix.
fn do_md5_crypt(secret: &[u8], salt: &str, magic: &str) -> String {
    let salt_b = salt.as_bytes();

    let mut alt = Md5::new();
    alt.update(secret);
    alt.update(salt_b);
    alt.update(secret);
    let mut digest: [u8; 16] = alt.finalize().into();

    let mut ctx = Md5::new();
    ctx.update(secret);
    ctx.update(magic.as_bytes());
    ctx.update(salt_b);
    let mut cnt = secret.len();
    while cnt > 16 {
        ctx.update(digest);
        cnt -= 16;
    }
    ctx.update(&digest[..cnt]);
    let mut i = secret.len();
    while i > 0 {
        if i & 1 != 0 {
            ctx.update([0u8]);
        } else {
            ctx.update(&secret[..1]);
        }
        i >>= 1;
    }
    digest = ctx.finalize().into();

    for r in 0..FIXED_ROUNDS {
        let mut c = Md5::new();
        if r & 1 != 0 {
            c.update(secret);
        } else {
            c.update(digest);
        }
        if r % 3 != 0 {
            c.update(salt_b);
        }
        if r % 7 != 0 {
            c.update(secret);
        }
        if r & 1 != 0 {
            c.update(digest);
        } else {
            c.update(secret);
        }
        digest = c.finalize().into();
    }

    let mut out = String::with_capacity(magic.len() + salt.len() + 1 + CHECKSUM_LEN);
    out.push_str(magic);
    out.push_str(salt);
    out.push('$');
    for &(a, b, c) in &[(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        h64_encode_24bit(&mut out, digest[a], digest[b], digest[c], 4);
    }
    h64_encode_24bit(&mut out, 0, 0, digest[11], 2);
    out
}

/// One of the two md5-crypt variants; the magic string is the only
/// difference between them.
pub struct Md5Crypt {
    desc: &'static Descriptor,
    magic: &'static str,
}

static MD5_CRYPT_DESC: Descriptor = Descriptor {
    name: "md5_crypt",
    aliases: &["md5-crypt"],
    idents: &["1"],
    default_ident: Some("1"),
    setting_kwds: &["salt", "salt_size"],
    context_kwds: &[],
    rounds: None,
    salt: Some(SALT),
    checksum_size: CHECKSUM_LEN,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

static APR1_DESC: Descriptor = Descriptor {
    name: "apr_md5_crypt",
    aliases: &["apr1", "apr-md5-crypt"],
    idents: &["apr1"],
    default_ident: Some("apr1"),
    setting_kwds: &["salt", "salt_size"],
    context_kwds: &[],
    rounds: None,
    salt: Some(SALT),
    checksum_size: CHECKSUM_LEN,
    truncate_size: None,
    truncate_policy: TruncatePolicy::Silent,
};

impl Md5Crypt {
    /// The `$1$` variant.
    pub fn new() -> Self {
        Md5Crypt {
            desc: &MD5_CRYPT_DESC,
            magic: "$1$",
        }
    }

    /// The Apache `$apr1$` variant.
    pub fn apr1() -> Self {
        Md5Crypt {
            desc: &APR1_DESC,
            magic: "$apr1$",
        }
    }

    fn salt_spec(&self) -> &SaltSpec {
        self.desc.salt.as_ref().unwrap_or(&SALT)
    }
}

impl Default for Md5Crypt {
    fn default() -> Self {
        Md5Crypt::new()
    }
}

impl Hasher for Md5Crypt {
    fn descriptor(&self) -> &Descriptor {
        self.desc
    }

    fn hash(&self, secret: &[u8], settings: &HashSettings) -> Result<String> {
        reject_nul(secret)?;
        let salt = self
            .salt_spec()
            .resolve_str(settings.salt.as_deref(), settings.salt_size)?;
        Ok(do_md5_crypt(secret, &salt, self.magic))
    }

    fn verify(&self, secret: &[u8], hash: &str, _settings: &HashSettings) -> Result<bool> {
        reject_nul(secret)?;
        let info = self.inspect(hash)?;
        if !info.has_checksum {
            return Err(Error::InvalidHash("missing checksum"));
        }
        let salt = info.salt.unwrap_or_default();
        let expected = do_md5_crypt(secret, &salt, self.magic);
        Ok(consteq(expected.as_bytes(), hash.as_bytes()))
    }

    fn inspect(&self, hash: &str) -> Result<HashInfo> {
        let fields = split_mcf(hash)?;
        if fields.ident != self.desc.idents[0] {
            return Err(Error::MalformedHash);
        }
        let (salt, checksum) = match fields.fields.as_slice() {
            [salt] => (*salt, None),
            [salt, checksum] => (*salt, Some(*checksum)),
            _ => return Err(Error::MalformedHash),
        };
        if salt.len() > SALT.max_size {
            return Err(Error::InvalidSalt);
        }
        validate_salt_chars(salt, HASH64).map_err(|_| Error::MalformedHash)?;
        if let Some(chk) = checksum {
            if chk.len() != CHECKSUM_LEN {
                return Err(Error::MalformedHash);
            }
            validate_salt_chars(chk, HASH64).map_err(|_| Error::MalformedHash)?;
        }
        Ok(HashInfo {
            ident: fields.ident.to_owned(),
            salt: Some(salt.to_owned()),
            salt_len: Some(salt.len()),
            has_checksum: checksum.is_some(),
            ..HashInfo::default()
        })
    }

    fn genconfig(&self, settings: &HashSettings) -> Result<String> {
        let salt = self
            .salt_spec()
            .resolve_str(settings.salt.as_deref(), settings.salt_size)?;
        Ok(format!("{}{}", self.magic, salt))
    }
}
