use std::str;

use crate::error::{Error, Result};

/// Cursor over the fields of a hash string.
///
/// Fixed-width formats (bcrypt) interleave `$`-delimited segments with
/// salt and checksum runs of known length; the cursor pulls both out
/// of one left-to-right pass. A string shorter than the format demands
/// is a structural failure, so exhaustion surfaces as
/// [`Error::MalformedHash`] rather than an empty field.
pub(crate) struct HashCursor<'a> {
    rest: &'a [u8],
}

impl<'a> HashCursor<'a> {
    pub fn new(hash: &'a str) -> HashCursor<'a> {
        HashCursor {
            rest: hash.as_bytes(),
        }
    }

    /// The next `n` bytes, as a fixed-width field.
    pub fn take(&mut self, n: usize) -> Result<&'a str> {
        if self.rest.len() < n {
            return Err(Error::MalformedHash);
        }
        let (field, rest) = self.rest.split_at(n);
        self.rest = rest;
        str::from_utf8(field).map_err(|_| Error::MalformedHash)
    }

    /// Everything before the next `delim`, which is consumed; the tail
    /// of the string when no delimiter remains. The field may be empty.
    pub fn take_until(&mut self, delim: u8) -> Result<&'a str> {
        let end = self
            .rest
            .iter()
            .position(|&b| b == delim)
            .unwrap_or(self.rest.len());
        let field = &self.rest[..end];
        self.rest = &self.rest[(end + 1).min(self.rest.len())..];
        str::from_utf8(field).map_err(|_| Error::MalformedHash)
    }

    /// True once every byte has been consumed.
    pub fn at_end(&self) -> bool {
        self.rest.is_empty()
    }
}

/// A modular-crypt-format hash split into its `$`-delimited fields.
///
/// The ident is the first field; the remaining fields keep their order.
/// Interior fields must be nonempty; a missing final checksum field is
/// tolerated so that configuration strings (salt and parameters, no
/// checksum yet) parse with the same grammar.
#[derive(Debug)]
pub(crate) struct McfFields<'a> {
    pub ident: &'a str,
    pub fields: Vec<&'a str>,
}

pub(crate) fn split_mcf(hash: &str) -> Result<McfFields<'_>> {
    let rest = hash.strip_prefix('$').ok_or(Error::MalformedHash)?;
    if rest.ends_with('$') {
        return Err(Error::MalformedHash);
    }
    let mut parts = rest.split('$');
    let ident = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(Error::MalformedHash)?;
    let fields: Vec<&str> = parts.collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err(Error::MalformedHash);
    }
    Ok(McfFields { ident, fields })
}

/// Parse a PHC-style `k=v,k=v` parameter list, preserving order.
pub(crate) fn parse_params(s: &str) -> Result<Vec<(&str, &str)>> {
    s.split(',')
        .map(|kv| {
            let (k, v) = kv.split_once('=').ok_or(Error::MalformedHash)?;
            if k.is_empty() || v.is_empty() || !k.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(Error::MalformedHash);
            }
            Ok((k, v))
        })
        .collect()
}
