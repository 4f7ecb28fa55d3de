//! Wire-format alphabets and value coders shared by the scheme catalogue.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

use crate::error::{Error, Result};

/// Alphabet used by the crypt-family hash64 encoding (md5_crypt,
/// sha256_crypt, sha512_crypt).
pub(crate) const HASH64: &[u8; 64] =
    b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Bcrypt's nonstandard base64 alphabet.
pub(crate) const BCRYPT64: &[u8; 64] =
    b"./ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Append `n` hash64 characters encoding the 24-bit group `(b2, b1, b0)`,
/// least-significant 6 bits first. This is the `b64_from_24bit` helper of
/// the published md5/sha crypt references.
pub(crate) fn h64_encode_24bit(out: &mut String, b2: u8, b1: u8, b0: u8, n: usize) {
    let mut w = ((b2 as u32) << 16) | ((b1 as u32) << 8) | b0 as u32;
    for _ in 0..n {
        out.push(HASH64[(w & 0x3f) as usize] as char);
        w >>= 6;
    }
}

fn alphabet_index(alphabet: &[u8; 64], c: u8) -> Option<u8> {
    alphabet.iter().position(|&a| a == c).map(|i| i as u8)
}

/// Encode raw bytes in bcrypt's base64, most-significant bits first,
/// without padding.
pub(crate) fn bcrypt64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let w = (b0 << 16) | (b1 << 8) | b2;
        let chars = match chunk.len() {
            1 => 2,
            2 => 3,
            _ => 4,
        };
        for i in 0..chars {
            out.push(BCRYPT64[((w >> (18 - 6 * i)) & 0x3f) as usize] as char);
        }
    }
    out
}

/// Decode a bcrypt base64 string into exactly `len` bytes.
pub(crate) fn bcrypt64_decode(s: &str, len: usize) -> Result<Vec<u8>> {
    if s.len() != b64_len(len) {
        return Err(Error::MalformedHash);
    }
    let mut out = Vec::with_capacity(len);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &c in s.as_bytes() {
        let v = alphabet_index(BCRYPT64, c).ok_or(Error::MalformedHash)? as u32;
        acc = (acc << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    out.truncate(len);
    if out.len() != len {
        return Err(Error::MalformedHash);
    }
    Ok(out)
}

/// Unpadded base64 length for `len` raw bytes.
pub(crate) fn b64_len(len: usize) -> usize {
    (len * 8).div_ceil(6)
}

/// Adapted base64 used by the pbkdf2 family: standard alphabet with
/// `+` replaced by `.`, no padding.
pub(crate) fn ab64_encode(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes).replace('+', ".")
}

/// Decode the pbkdf2-family adapted base64.
pub(crate) fn ab64_decode(s: &str) -> Result<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(s.replace('.', "+"))
        .map_err(|_| Error::MalformedHash)
}

/// Standard unpadded base64 used in PHC strings (argon2, scrypt).
pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

pub(crate) fn b64_decode(s: &str) -> Result<Vec<u8>> {
    STANDARD_NO_PAD.decode(s).map_err(|_| Error::MalformedHash)
}

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";
const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    hex_with(bytes, HEX_LOWER)
}

pub(crate) fn hex_encode_upper(bytes: &[u8]) -> String {
    hex_with(bytes, HEX_UPPER)
}

fn hex_with(bytes: &[u8], table: &[u8; 16]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(table[(b >> 4) as usize] as char);
        out.push(table[(b & 0xf) as usize] as char);
    }
    out
}

pub(crate) fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 || !is_hex(s) {
        return Err(Error::MalformedHash);
    }
    let nib = |b: u8| -> u8 {
        match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            _ => b - b'A' + 10,
        }
    };
    Ok(s.as_bytes()
        .chunks(2)
        .map(|p| (nib(p[0]) << 4) | nib(p[1]))
        .collect())
}

/// Strict decimal rounds parser: nonempty, digits only, no leading zero.
pub(crate) fn decode_dec_rounds(s: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedHash);
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(Error::MalformedHash);
    }
    s.parse().map_err(|_| Error::InvalidRounds)
}

/// Check that every character of `salt` belongs to `alphabet`.
pub(crate) fn validate_salt_chars(salt: &str, alphabet: &[u8]) -> Result<()> {
    if salt.bytes().all(|b| alphabet.contains(&b)) {
        Ok(())
    } else {
        Err(Error::InvalidSalt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h64_groups() {
        // md5_crypt tail group: two chars from one byte
        let mut s = String::new();
        h64_encode_24bit(&mut s, 0, 0, 0, 2);
        assert_eq!(s, "..");
    }

    #[test]
    fn bcrypt64_roundtrip() {
        let raw: Vec<u8> = (0u8..16).collect();
        let enc = bcrypt64_encode(&raw);
        assert_eq!(enc.len(), 22);
        assert_eq!(bcrypt64_decode(&enc, 16).unwrap(), raw);
    }

    #[test]
    fn bcrypt64_rejects_bad_chars() {
        assert!(bcrypt64_decode("!!!!!!!!!!!!!!!!!!!!!!", 16).is_err());
    }

    #[test]
    fn ab64() {
        // 0xfb 0xef 0xff encodes to "++//" in standard base64
        assert_eq!(ab64_encode(&[0xfb, 0xef, 0xff]), "..//");
        assert_eq!(ab64_decode("..//").unwrap(), vec![0xfb, 0xef, 0xff]);
        assert_eq!(ab64_decode("c2FsdA").unwrap(), b"salt");
    }

    #[test]
    fn hex() {
        assert_eq!(hex_encode(&[0xde, 0xad]), "dead");
        assert_eq!(hex_encode_upper(&[0xde, 0xad]), "DEAD");
        assert_eq!(hex_decode("dead").unwrap(), vec![0xde, 0xad]);
        assert!(hex_decode("xyz").is_err());
        assert!(is_hex("00ff"));
        assert!(!is_hex("00fg"));
    }

    #[test]
    fn dec_rounds() {
        assert_eq!(decode_dec_rounds("5000").unwrap(), 5000);
        assert_eq!(decode_dec_rounds("1").unwrap(), 1);
        assert!(decode_dec_rounds("").is_err());
        assert!(decode_dec_rounds("05000").is_err());
        assert!(decode_dec_rounds("12a").is_err());
    }

    #[test]
    fn salt_alphabet() {
        assert!(validate_salt_chars("abcXYZ19", HASH64).is_ok());
        assert!(validate_salt_chars("abc$", HASH64).is_err());
    }
}
