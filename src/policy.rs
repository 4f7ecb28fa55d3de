//! The flat key-value policy file format.
//!
//! A context policy round-trips through an INI-like text:
//!
//! ```text
//! [passfort]
//! schemes = sha256_crypt, md5_crypt
//! default = sha256_crypt
//! deprecated = md5_crypt
//! sha256_crypt__rounds = 29000
//! admin__sha256_crypt__rounds = 40000
//! ```
//!
//! Key grammar: `schemes`, `default`, `deprecated`, `harden_verify`,
//! `min_verify_time`, `<category>__default`, `<scheme>__<param>` and
//! `<category>__<scheme>__<param>`. A single `.` between scheme and
//! parameter is accepted on input. Durations take `ms` or `s` units;
//! a bare number means seconds.

use std::fmt::Write;
use std::time::Duration;

use crate::context::{CryptContext, CryptContextBuilder, DeprecationPolicy};
use crate::error::{Error, Result};

fn parse_duration(s: &str) -> Result<Duration> {
    let bad = || Error::Config(format!("invalid duration: {s}"));
    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(ms.trim().parse().map_err(|_| bad())?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(secs.trim().parse().map_err(|_| bad())?))
    } else {
        Ok(Duration::from_secs(s.parse().map_err(|_| bad())?))
    }
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ' ')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl CryptContextBuilder {
    /// Load policy keys from the INI-like text into this builder.
    /// Section headers are accepted and ignored; later keys override
    /// earlier ones.
    pub fn load_ini(mut self, text: &str) -> Result<Self> {
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected key = value: {line}")))?;
            let key = key.trim().replace('.', "__");
            let value = value.trim();
            let parts: Vec<&str> = key.split("__").collect();
            self = match parts.as_slice() {
                ["schemes"] => self.schemes(split_list(value)),
                ["default"] => self.default_scheme(value),
                ["deprecated"] => {
                    if value == "auto" {
                        self.deprecated_auto()
                    } else {
                        self.deprecated(split_list(value))
                    }
                }
                ["harden_verify"] => match value {
                    "true" | "1" => self.harden_verify(true),
                    "false" | "0" => self.harden_verify(false),
                    _ => {
                        return Err(Error::Config(format!(
                            "invalid harden_verify value: {value}"
                        )));
                    }
                },
                ["min_verify_time"] => self.min_verify_time(parse_duration(value)?),
                ["truncate_error"] => self.option(None, "all", "truncate_error", value)?,
                [category, "default"] => self.category_default(category, value),
                [scheme, param] => self.option(None, scheme, param, value)?,
                [category, scheme, param] => {
                    self.option(Some(*category), scheme, param, value)?
                }
                _ => {
                    return Err(Error::Config(format!("unrecognized policy key: {key}")));
                }
            };
        }
        Ok(self)
    }
}

impl CryptContext {
    /// Build a context directly from policy text.
    pub fn from_ini_str(text: &str) -> Result<CryptContext> {
        CryptContext::builder().load_ini(text)?.build()
    }

    /// Serialize the policy to its canonical text form. Feeding the
    /// result back through [`CryptContext::from_ini_str`] reproduces
    /// the same policy.
    pub fn to_ini_string(&self) -> String {
        let mut out = String::from("[passfort]\n");
        let schemes: Vec<&str> = self.schemes().collect();
        let _ = writeln!(out, "schemes = {}", schemes.join(", "));
        let _ = writeln!(out, "default = {}", self.default_scheme(None));
        match self.deprecation_policy() {
            DeprecationPolicy::None => {}
            DeprecationPolicy::Auto => out.push_str("deprecated = auto\n"),
            DeprecationPolicy::Explicit(list) => {
                let _ = writeln!(out, "deprecated = {}", list.join(", "));
            }
        }
        if self.harden_verify_enabled() {
            out.push_str("harden_verify = true\n");
        }
        if let Some(floor) = self.min_verify_time_floor() {
            let _ = writeln!(out, "min_verify_time = {}", format_duration(floor));
        }
        for (category, scheme) in self.category_default_entries() {
            let _ = writeln!(out, "{category}__default = {scheme}");
        }
        for ((category, scheme), opts) in self.option_entries() {
            for (key, value) in opts.entries() {
                if category.is_empty() {
                    let _ = writeln!(out, "{scheme}__{key} = {value}");
                } else {
                    let _ = writeln!(out, "{category}__{scheme}__{key} = {value}");
                }
            }
        }
        out
    }
}
