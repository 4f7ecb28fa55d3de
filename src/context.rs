//! Policy contexts: an ordered scheme list with defaults, deprecations
//! and per-category overrides, dispatching to the registry's hashers.
//!
//! A [`CryptContext`] is immutable once built; [`CryptContext::to_builder`]
//! yields a builder seeded with the current policy for the update/copy
//! lifecycle. All dispatch methods are safe to call concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use crate::calibrate::calibrate_rounds;
use crate::error::{Error, Result};
use crate::random;
use crate::registry;
use crate::scheme::{Hasher, HashSettings, RoundsCost};

const DUMMY_SECRET: &[u8] = b"incorrect-dummy-secret";

/// Rounds jitter applied to new hashes so equal-cost hashes do not all
/// carry the same work factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VaryRounds {
    /// Fraction of the base rounds value, 0.0 to 1.0.
    Percent(f64),
    /// Absolute rounds amount.
    Absolute(u32),
}

impl VaryRounds {
    pub(crate) fn parse(s: &str) -> Result<Self> {
        let bad = || Error::Config(format!("invalid vary_rounds value: {s}"));
        if let Some(pct) = s.strip_suffix('%') {
            let v: f64 = pct.trim().parse().map_err(|_| bad())?;
            if !(0.0..=100.0).contains(&v) {
                return Err(bad());
            }
            Ok(VaryRounds::Percent(v / 100.0))
        } else if s.contains('.') {
            let v: f64 = s.parse().map_err(|_| bad())?;
            if !(0.0..=1.0).contains(&v) {
                return Err(bad());
            }
            Ok(VaryRounds::Percent(v))
        } else {
            Ok(VaryRounds::Absolute(s.parse().map_err(|_| bad())?))
        }
    }

    pub(crate) fn delta(&self, base: u32, _cost: RoundsCost) -> u32 {
        match self {
            VaryRounds::Percent(f) => (base as f64 * f) as u32,
            VaryRounds::Absolute(n) => *n,
        }
    }

    fn to_policy_string(self) -> String {
        match self {
            VaryRounds::Percent(f) => format!("{}%", (f * 100.0).round() as u32),
            VaryRounds::Absolute(n) => n.to_string(),
        }
    }
}

/// Per-scheme parameter overrides; one set per (category, scheme) pair,
/// with the pseudo-scheme `all` applying to every scheme.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemeOptions {
    /// Base work factor for new hashes.
    pub rounds: Option<u32>,
    /// Lower rounds bound; also the `needs_update` floor.
    pub min_rounds: Option<u32>,
    /// Upper rounds bound.
    pub max_rounds: Option<u32>,
    /// Generated salt size.
    pub salt_size: Option<usize>,
    /// Format variant for new hashes.
    pub ident: Option<String>,
    /// Jitter applied to the base rounds.
    pub vary_rounds: Option<VaryRounds>,
    /// Argon2 memory cost in KiB.
    pub memory_cost: Option<u32>,
    /// Argon2 / scrypt lane count.
    pub parallelism: Option<u32>,
    /// Reject secrets a truncating scheme would shorten.
    pub truncate_error: Option<bool>,
}

impl SchemeOptions {
    fn merge_from(&mut self, other: &SchemeOptions) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(rounds);
        take!(min_rounds);
        take!(max_rounds);
        take!(salt_size);
        take!(ident);
        take!(vary_rounds);
        take!(memory_cost);
        take!(parallelism);
        take!(truncate_error);
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let bad = |what: &str| Error::Config(format!("invalid {what} value: {value}"));
        match key {
            "rounds" | "default_rounds" => {
                self.rounds = Some(value.parse().map_err(|_| bad("rounds"))?)
            }
            "min_rounds" => self.min_rounds = Some(value.parse().map_err(|_| bad("min_rounds"))?),
            "max_rounds" => self.max_rounds = Some(value.parse().map_err(|_| bad("max_rounds"))?),
            "salt_size" => self.salt_size = Some(value.parse().map_err(|_| bad("salt_size"))?),
            "ident" => self.ident = Some(value.to_owned()),
            "vary_rounds" => self.vary_rounds = Some(VaryRounds::parse(value)?),
            "memory_cost" => {
                self.memory_cost = Some(value.parse().map_err(|_| bad("memory_cost"))?)
            }
            "parallelism" => {
                self.parallelism = Some(value.parse().map_err(|_| bad("parallelism"))?)
            }
            "truncate_error" => {
                self.truncate_error = Some(match value {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(bad("truncate_error")),
                })
            }
            _ => return Err(Error::Config(format!("unknown policy parameter: {key}"))),
        }
        Ok(())
    }

    pub(crate) fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(v) = self.rounds {
            out.push(("rounds", v.to_string()));
        }
        if let Some(v) = self.min_rounds {
            out.push(("min_rounds", v.to_string()));
        }
        if let Some(v) = self.max_rounds {
            out.push(("max_rounds", v.to_string()));
        }
        if let Some(v) = self.salt_size {
            out.push(("salt_size", v.to_string()));
        }
        if let Some(v) = &self.ident {
            out.push(("ident", v.clone()));
        }
        if let Some(v) = self.vary_rounds {
            out.push(("vary_rounds", v.to_policy_string()));
        }
        if let Some(v) = self.memory_cost {
            out.push(("memory_cost", v.to_string()));
        }
        if let Some(v) = self.parallelism {
            out.push(("parallelism", v.to_string()));
        }
        if let Some(v) = self.truncate_error {
            out.push(("truncate_error", v.to_string()));
        }
        out
    }
}

/// Which configured schemes are accepted but flagged for rehash.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DeprecationPolicy {
    /// Nothing is deprecated.
    #[default]
    None,
    /// Everything except the (per-category) default is deprecated.
    Auto,
    /// The listed schemes are deprecated.
    Explicit(Vec<String>),
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

/// Builder for [`CryptContext`]. Invalid policy surfaces from
/// [`CryptContextBuilder::build`], never later.
#[derive(Default)]
pub struct CryptContextBuilder {
    schemes: Vec<String>,
    default: Option<String>,
    category_defaults: BTreeMap<String, String>,
    deprecated: DeprecationPolicy,
    options: BTreeMap<(String, String), SchemeOptions>,
    harden_verify: bool,
    min_verify_time: Option<Duration>,
}

impl CryptContextBuilder {
    /// Configure the ordered scheme list; the first entry is the
    /// default unless overridden.
    pub fn schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemes = schemes.into_iter().map(|s| normalize(&s.into())).collect();
        self
    }

    /// Set the global default scheme.
    pub fn default_scheme(mut self, name: &str) -> Self {
        self.default = Some(normalize(name));
        self
    }

    /// Set the default scheme for one category.
    pub fn category_default(mut self, category: &str, scheme: &str) -> Self {
        self.category_defaults
            .insert(category.to_owned(), normalize(scheme));
        self
    }

    /// Deprecate the listed schemes.
    pub fn deprecated<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deprecated = DeprecationPolicy::Explicit(
            schemes.into_iter().map(|s| normalize(&s.into())).collect(),
        );
        self
    }

    /// Deprecate everything except the per-category default.
    pub fn deprecated_auto(mut self) -> Self {
        self.deprecated = DeprecationPolicy::Auto;
        self
    }

    /// Equalize verify timing with a dummy hash on unknown-hash misses.
    pub fn harden_verify(mut self, flag: bool) -> Self {
        self.harden_verify = flag;
        self
    }

    /// Pad every verify call to at least this duration.
    pub fn min_verify_time(mut self, floor: Duration) -> Self {
        self.min_verify_time = Some(floor);
        self
    }

    /// Set one override parameter by name, as the policy file format
    /// spells it. `category` of `None` is the global policy; `scheme`
    /// may be `all`.
    pub fn option(
        mut self,
        category: Option<&str>,
        scheme: &str,
        key: &str,
        value: &str,
    ) -> Result<Self> {
        let cat = category.unwrap_or("").to_owned();
        self.options
            .entry((cat, normalize(scheme)))
            .or_default()
            .set(key, value)?;
        Ok(self)
    }

    /// Shorthand for the common per-scheme rounds override.
    pub fn rounds(self, scheme: &str, rounds: u32) -> Result<Self> {
        self.option(None, scheme, "rounds", &rounds.to_string())
    }

    /// Resolve every configured name through the registry, validate
    /// the policy, and freeze it into a context.
    pub fn build(self) -> Result<CryptContext> {
        if self.schemes.is_empty() {
            return Err(Error::Config("no schemes configured".into()));
        }
        let mut hashers = Vec::with_capacity(self.schemes.len());
        let mut names: Vec<String> = Vec::with_capacity(self.schemes.len());
        for name in &self.schemes {
            let hasher = registry::lookup(name)?;
            let canonical = hasher.descriptor().name.to_owned();
            if names.contains(&canonical) {
                return Err(Error::Config(format!("duplicate scheme: {name}")));
            }
            hashers.push(hasher);
            names.push(canonical);
        }
        let member = |name: &str| -> Result<String> {
            let canonical = registry::lookup(name)?.descriptor().name.to_owned();
            if names.contains(&canonical) {
                Ok(canonical)
            } else {
                Err(Error::Config(format!("scheme not in context: {name}")))
            }
        };

        let default_name = match &self.default {
            Some(name) => member(name)?,
            None => names[0].clone(),
        };
        let mut category_defaults = BTreeMap::new();
        for (category, scheme) in &self.category_defaults {
            category_defaults.insert(category.clone(), member(scheme)?);
        }

        let deprecated = match self.deprecated {
            DeprecationPolicy::Explicit(list) => {
                let mut canonical = Vec::with_capacity(list.len());
                for name in &list {
                    let name = member(name)?;
                    if name == default_name || category_defaults.values().any(|d| *d == name) {
                        return Err(Error::Config(format!(
                            "default scheme may not be deprecated: {name}"
                        )));
                    }
                    canonical.push(name);
                }
                DeprecationPolicy::Explicit(canonical)
            }
            other => other,
        };

        let mut options = BTreeMap::new();
        for ((category, scheme), opts) in self.options {
            let scheme = if scheme == "all" {
                scheme
            } else {
                member(&scheme)?
            };
            if scheme != "all" {
                let idx = names.iter().position(|n| *n == scheme);
                if let Some(spec) = idx.and_then(|i| hashers[i].descriptor().rounds) {
                    for bound in [opts.rounds, opts.min_rounds, opts.max_rounds]
                        .into_iter()
                        .flatten()
                    {
                        if !(spec.min..=spec.max).contains(&bound) {
                            return Err(Error::Config(format!(
                                "rounds bound {bound} outside {}..={} for {scheme}",
                                spec.min, spec.max
                            )));
                        }
                    }
                }
            }
            if let (Some(lo), Some(hi)) = (opts.min_rounds, opts.max_rounds) {
                if lo > hi {
                    return Err(Error::Config(format!(
                        "min_rounds {lo} exceeds max_rounds {hi} for {scheme}"
                    )));
                }
            }
            options.insert((category, scheme), opts);
        }

        Ok(CryptContext {
            hashers,
            names,
            default_name,
            category_defaults,
            deprecated,
            options,
            harden_verify: self.harden_verify,
            min_verify_time: self.min_verify_time,
            calibration: Mutex::new(HashMap::new()),
        })
    }
}

/// An immutable password policy over an ordered set of schemes.
pub struct CryptContext {
    hashers: Vec<Arc<dyn Hasher>>,
    names: Vec<String>,
    default_name: String,
    category_defaults: BTreeMap<String, String>,
    deprecated: DeprecationPolicy,
    options: BTreeMap<(String, String), SchemeOptions>,
    harden_verify: bool,
    min_verify_time: Option<Duration>,
    calibration: Mutex<HashMap<(String, u128), u32>>,
}

impl CryptContext {
    /// Start building a fresh policy.
    pub fn builder() -> CryptContextBuilder {
        CryptContextBuilder::default()
    }

    /// A builder seeded with this context's policy, for the
    /// update-and-rebuild lifecycle. The calibration cache is not
    /// carried over.
    pub fn to_builder(&self) -> CryptContextBuilder {
        CryptContextBuilder {
            schemes: self.names.clone(),
            default: Some(self.default_name.clone()),
            category_defaults: self.category_defaults.clone(),
            deprecated: self.deprecated.clone(),
            options: self.options.clone(),
            harden_verify: self.harden_verify,
            min_verify_time: self.min_verify_time,
        }
    }

    /// Configured scheme names, in policy order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The default scheme for new hashes under `category`.
    pub fn default_scheme(&self, category: Option<&str>) -> &str {
        category
            .and_then(|c| self.category_defaults.get(c))
            .unwrap_or(&self.default_name)
    }

    pub(crate) fn harden_verify_enabled(&self) -> bool {
        self.harden_verify
    }

    pub(crate) fn min_verify_time_floor(&self) -> Option<Duration> {
        self.min_verify_time
    }

    pub(crate) fn deprecation_policy(&self) -> &DeprecationPolicy {
        &self.deprecated
    }

    pub(crate) fn category_default_entries(&self) -> &BTreeMap<String, String> {
        &self.category_defaults
    }

    pub(crate) fn option_entries(&self) -> &BTreeMap<(String, String), SchemeOptions> {
        &self.options
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        let canonical = normalize(name);
        self.names
            .iter()
            .position(|n| *n == canonical)
            .ok_or_else(|| Error::UnknownScheme(name.to_owned()))
    }

    fn resolved_options(&self, scheme: &str, category: Option<&str>) -> SchemeOptions {
        let mut opts = SchemeOptions::default();
        let mut layer = |cat: &str, sch: &str| {
            if let Some(o) = self.options.get(&(cat.to_owned(), sch.to_owned())) {
                opts.merge_from(o);
            }
        };
        layer("", "all");
        layer("", scheme);
        if let Some(cat) = category {
            layer(cat, "all");
            layer(cat, scheme);
        }
        opts
    }

    /// Layer policy overrides under the call-site settings and apply
    /// rounds jitter. Explicit call-site values always win.
    fn settings_for(
        &self,
        idx: usize,
        category: Option<&str>,
        call: &HashSettings,
    ) -> Result<HashSettings> {
        let desc = self.hashers[idx].descriptor();
        let opts = self.resolved_options(&self.names[idx], category);
        let mut settings = call.clone();

        if let Some(spec) = desc.rounds {
            if settings.rounds.is_none() {
                let base = opts.rounds.unwrap_or(spec.default);
                let rounds = match opts.vary_rounds {
                    Some(vary) => {
                        let delta = vary.delta(base, spec.cost);
                        let floor = opts.min_rounds.unwrap_or(spec.min).max(spec.min);
                        random::jitter_rounds(base, delta, floor)
                    }
                    None => base,
                };
                settings.rounds = Some(rounds);
            }
            if let Some(rounds) = settings.rounds {
                if opts.min_rounds.is_some_and(|lo| rounds < lo)
                    || opts.max_rounds.is_some_and(|hi| rounds > hi)
                {
                    return Err(Error::Config(format!(
                        "rounds {rounds} violates policy bounds for {}",
                        desc.name
                    )));
                }
            }
        }
        if settings.salt_size.is_none() {
            settings.salt_size = opts.salt_size;
        }
        if settings.ident.is_none() {
            settings.ident = opts.ident.clone();
        }
        if settings.memory_cost.is_none() {
            settings.memory_cost = opts.memory_cost;
        }
        if settings.parallelism.is_none() {
            settings.parallelism = opts.parallelism;
        }
        if settings.truncate_error.is_none() {
            settings.truncate_error = opts.truncate_error;
        }
        Ok(settings)
    }

    /// Hash with the default scheme and policy settings.
    pub fn hash<B: AsRef<[u8]>>(&self, secret: B) -> Result<String> {
        self.hash_using(secret, None, None, &HashSettings::default())
    }

    /// Hash under a category's policy.
    pub fn hash_for<B: AsRef<[u8]>>(&self, secret: B, category: &str) -> Result<String> {
        self.hash_using(secret, None, Some(category), &HashSettings::default())
    }

    /// Full hashing dispatch: explicit scheme, category, and call-site
    /// settings, each optional.
    pub fn hash_using<B: AsRef<[u8]>>(
        &self,
        secret: B,
        scheme: Option<&str>,
        category: Option<&str>,
        settings: &HashSettings,
    ) -> Result<String> {
        let name = match scheme {
            Some(name) => name,
            None => self.default_scheme(category),
        };
        let idx = self.index_of(name)?;
        let settings = self.settings_for(idx, category, settings)?;
        self.hashers[idx].hash(secret.as_ref(), &settings)
    }

    /// Name of the first configured scheme that identifies `hash`.
    pub fn identify(&self, hash: &str) -> Option<&str> {
        self.hashers
            .iter()
            .position(|h| h.identify(hash))
            .map(|idx| self.names[idx].as_str())
    }

    fn locate(&self, hash: &str, scheme: Option<&str>) -> Result<usize> {
        match scheme {
            Some(name) => self.index_of(name),
            None => self
                .hashers
                .iter()
                .position(|h| h.identify(hash))
                .ok_or(Error::UnknownHash),
        }
    }

    /// Verify against any configured scheme.
    pub fn verify<B: AsRef<[u8]>>(&self, secret: B, hash: &str) -> Result<bool> {
        self.verify_using(secret, hash, None, None, &HashSettings::default())
    }

    /// Full verify dispatch. All verify outcomes, including unknown
    /// hashes, are padded to `min_verify_time` when one is set.
    pub fn verify_using<B: AsRef<[u8]>>(
        &self,
        secret: B,
        hash: &str,
        scheme: Option<&str>,
        category: Option<&str>,
        settings: &HashSettings,
    ) -> Result<bool> {
        let start = Instant::now();
        let outcome = match self.locate(hash, scheme) {
            Ok(idx) => self.hashers[idx].verify(secret.as_ref(), hash, settings),
            Err(err) => {
                if self.harden_verify {
                    self.dummy_verify(category);
                }
                Err(err)
            }
        };
        self.pad_verify(start);
        outcome
    }

    /// Burn the wall-clock cost of one default-scheme hash, for timing
    /// equalization on paths that never reach a real hasher.
    pub fn dummy_verify(&self, category: Option<&str>) {
        let _ = self.hash_using(DUMMY_SECRET, None, category, &HashSettings::default());
    }

    fn pad_verify(&self, start: Instant) {
        if let Some(floor) = self.min_verify_time {
            let elapsed = start.elapsed();
            if elapsed < floor {
                std::thread::sleep(floor - elapsed);
            }
        }
    }

    fn is_deprecated(&self, name: &str, category: Option<&str>) -> bool {
        match &self.deprecated {
            DeprecationPolicy::None => false,
            DeprecationPolicy::Auto => name != self.default_scheme(category),
            DeprecationPolicy::Explicit(list) => list.iter().any(|d| d == name),
        }
    }

    /// True when the stored hash should be re-hashed under current
    /// policy on the next successful login.
    pub fn needs_update(
        &self,
        hash: &str,
        category: Option<&str>,
        secret: Option<&[u8]>,
    ) -> Result<bool> {
        let idx = self.locate(hash, None)?;
        let name = &self.names[idx];
        if name != self.default_scheme(category) {
            return Ok(true);
        }
        if self.is_deprecated(name, category) {
            return Ok(true);
        }
        let hasher = &self.hashers[idx];
        if hasher.needs_update(hash, secret) {
            return Ok(true);
        }
        let info = hasher.inspect(hash)?;
        let opts = self.resolved_options(name, category);
        if let (Some(spec), Some(rounds)) = (hasher.descriptor().rounds, info.rounds) {
            let floor = opts.min_rounds.or_else(|| {
                opts.rounds.map(|base| {
                    let delta = opts
                        .vary_rounds
                        .map_or(0, |vary| vary.delta(base, spec.cost));
                    base.saturating_sub(delta)
                })
            });
            if floor.is_some_and(|lo| rounds < lo) {
                return Ok(true);
            }
            if opts.max_rounds.is_some_and(|hi| rounds > hi) {
                return Ok(true);
            }
        }
        if let (Some(policy_size), Some(len)) = (opts.salt_size, info.salt_len) {
            if len < policy_size {
                return Ok(true);
            }
        }
        if let (Some(want), Some(have)) = (opts.memory_cost, info.memory_cost) {
            if have < want {
                return Ok(true);
            }
        }
        if let Some(want) = &opts.ident {
            if info.ident != *want {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Atomic verify-plus-rehash: on a successful verify of a stale
    /// hash, the replacement to persist is returned alongside.
    pub fn verify_and_update<B: AsRef<[u8]>>(
        &self,
        secret: B,
        hash: &str,
    ) -> Result<(bool, Option<String>)> {
        self.verify_and_update_for(secret, hash, None)
    }

    /// Category-aware [`CryptContext::verify_and_update`].
    pub fn verify_and_update_for<B: AsRef<[u8]>>(
        &self,
        secret: B,
        hash: &str,
        category: Option<&str>,
    ) -> Result<(bool, Option<String>)> {
        let secret = secret.as_ref();
        if !self.verify_using(secret, hash, None, category, &HashSettings::default())? {
            return Ok((false, None));
        }
        if self.needs_update(hash, category, Some(secret))? {
            let new_hash = self.hash_using(secret, None, category, &HashSettings::default())?;
            debug!("rehashed stale {} hash", self.identify(hash).unwrap_or("?"));
            return Ok((true, Some(new_hash)));
        }
        Ok((true, None))
    }

    /// Smallest rounds value for `scheme` whose hash time meets
    /// `target`; cached per context.
    pub fn calibrate(&self, scheme: &str, target: Duration) -> Result<u32> {
        let idx = self.index_of(scheme)?;
        let key = (self.names[idx].clone(), target.as_millis());
        {
            let cache = self.calibration.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(&rounds) = cache.get(&key) {
                return Ok(rounds);
            }
        }
        let rounds = calibrate_rounds(self.hashers[idx].as_ref(), target)?;
        let mut cache = self.calibration.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(*cache.entry(key).or_insert(rounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_context() -> CryptContext {
        CryptContext::builder()
            .schemes(["sha256_crypt", "md5_crypt"])
            .default_scheme("sha256_crypt")
            .deprecated(["md5_crypt"])
            .build()
            .unwrap()
    }

    #[test]
    fn hash_uses_default_scheme() {
        let ctx = upgrade_context();
        let h = ctx.hash("secret").unwrap();
        assert!(h.starts_with("$5$"));
        assert_eq!(ctx.identify(&h), Some("sha256_crypt"));
        assert!(ctx.verify("secret", &h).unwrap());
        assert!(!ctx.verify("other", &h).unwrap());
        assert!(!ctx.needs_update(&h, None, None).unwrap());
    }

    #[test]
    fn deprecated_scheme_upgrades_on_login() {
        let ctx = upgrade_context();
        let old = crate::registry::lookup("md5_crypt")
            .unwrap()
            .hash(b"abc", &HashSettings::default())
            .unwrap();
        assert!(ctx.needs_update(&old, None, None).unwrap());
        let (ok, new) = ctx.verify_and_update("abc", &old).unwrap();
        assert!(ok);
        let new = new.expect("stale hash must be replaced");
        assert_eq!(ctx.identify(&new), Some("sha256_crypt"));
        let (ok, again) = ctx.verify_and_update("abc", &new).unwrap();
        assert!(ok);
        assert!(again.is_none());
    }

    #[test]
    fn wrong_secret_never_updates() {
        let ctx = upgrade_context();
        let old = crate::registry::lookup("md5_crypt")
            .unwrap()
            .hash(b"abc", &HashSettings::default())
            .unwrap();
        let (ok, new) = ctx.verify_and_update("wrong", &old).unwrap();
        assert!(!ok);
        assert!(new.is_none());
    }

    #[test]
    fn category_overrides_take_precedence() {
        let ctx = CryptContext::builder()
            .schemes(["sha256_crypt"])
            .option(None, "sha256_crypt", "rounds", "29000")
            .unwrap()
            .option(Some("admin"), "sha256_crypt", "rounds", "40000")
            .unwrap()
            .build()
            .unwrap();
        let h = ctx.hash("x").unwrap();
        let info = crate::registry::lookup("sha256_crypt")
            .unwrap()
            .inspect(&h)
            .unwrap();
        assert_eq!(info.rounds, Some(29000));
        let h = ctx.hash_for("x", "admin").unwrap();
        let info = crate::registry::lookup("sha256_crypt")
            .unwrap()
            .inspect(&h)
            .unwrap();
        assert_eq!(info.rounds, Some(40000));
    }

    #[test]
    fn unknown_hash_is_an_error() {
        let ctx = upgrade_context();
        assert!(matches!(
            ctx.verify("x", "not-a-hash"),
            Err(Error::UnknownHash)
        ));
        assert!(ctx.identify("not-a-hash").is_none());
        assert!(matches!(
            ctx.needs_update("not-a-hash", None, None),
            Err(Error::UnknownHash)
        ));
    }

    #[test]
    fn vary_rounds_jitters_within_bounds() {
        let ctx = CryptContext::builder()
            .schemes(["pbkdf2_sha256"])
            .option(None, "pbkdf2_sha256", "rounds", "1000")
            .unwrap()
            .option(None, "pbkdf2_sha256", "vary_rounds", "10%")
            .unwrap()
            .build()
            .unwrap();
        let hasher = crate::registry::lookup("pbkdf2_sha256").unwrap();
        for _ in 0..20 {
            let h = ctx.hash("x").unwrap();
            let rounds = hasher.inspect(&h).unwrap().rounds.unwrap();
            assert!((900..=1000).contains(&rounds), "rounds {rounds}");
            assert!(!ctx.needs_update(&h, None, None).unwrap());
        }
    }

    #[test]
    fn policy_bounds_are_validated_at_build() {
        let err = CryptContext::builder()
            .schemes(["sha256_crypt"])
            .option(None, "sha256_crypt", "rounds", "500")
            .unwrap()
            .build();
        assert!(matches!(err, Err(Error::Config(_))));

        let err = CryptContext::builder()
            .schemes(["sha256_crypt"])
            .option(None, "sha256_crypt", "min_rounds", "20000")
            .unwrap()
            .option(None, "sha256_crypt", "max_rounds", "10000")
            .unwrap()
            .build();
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn default_may_not_be_deprecated() {
        let err = CryptContext::builder()
            .schemes(["sha256_crypt", "md5_crypt"])
            .deprecated(["sha256_crypt"])
            .build();
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_scheme_fails_construction() {
        assert!(matches!(
            CryptContext::builder().schemes(["sha256_crypt", "rot13"]).build(),
            Err(Error::UnknownScheme(_))
        ));
        assert!(matches!(
            CryptContext::builder().schemes(Vec::<String>::new()).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn auto_deprecation_tracks_category_default() {
        let ctx = CryptContext::builder()
            .schemes(["sha512_crypt", "sha256_crypt"])
            .category_default("legacy", "sha256_crypt")
            .deprecated_auto()
            .build()
            .unwrap();
        let h256 = ctx.hash_for("pw", "legacy").unwrap();
        assert!(!ctx.needs_update(&h256, Some("legacy"), None).unwrap());
        assert!(ctx.needs_update(&h256, None, None).unwrap());
    }

    #[test]
    fn explicit_scheme_dispatch() {
        let ctx = upgrade_context();
        let h = ctx
            .hash_using("pw", Some("md5_crypt"), None, &HashSettings::default())
            .unwrap();
        assert!(h.starts_with("$1$"));
        assert!(
            ctx.verify_using("pw", &h, Some("md5_crypt"), None, &HashSettings::default())
                .unwrap()
        );
        assert!(matches!(
            ctx.hash_using("pw", Some("bcrypt"), None, &HashSettings::default()),
            Err(Error::UnknownScheme(_))
        ));
    }

    #[test]
    fn min_verify_time_pads_all_outcomes() {
        let ctx = CryptContext::builder()
            .schemes(["plaintext"])
            .min_verify_time(Duration::from_millis(20))
            .build()
            .unwrap();
        for (secret, hash) in [("pw", "pw"), ("pw", "nope")] {
            let start = Instant::now();
            let _ = ctx.verify(secret, hash);
            assert!(start.elapsed() >= Duration::from_millis(20));
        }
    }

    #[test]
    fn plaintext_identifies_last() {
        let ctx = CryptContext::builder()
            .schemes(["sha256_crypt", "plaintext"])
            .build()
            .unwrap();
        let h = ctx.hash("pw").unwrap();
        assert_eq!(ctx.identify(&h), Some("sha256_crypt"));
        assert_eq!(ctx.identify("raw-password"), Some("plaintext"));
    }

    #[test]
    fn update_lifecycle_copies_policy() {
        let ctx = upgrade_context();
        let updated = ctx
            .to_builder()
            .option(None, "sha256_crypt", "rounds", "10000")
            .unwrap()
            .build()
            .unwrap();
        let h = updated.hash("pw").unwrap();
        assert!(h.starts_with("$5$rounds=10000$"));
        // original is untouched
        let h = ctx.hash("pw").unwrap();
        assert!(!h.contains("rounds="));
    }

    #[test]
    fn calibration_is_cached() {
        let ctx = CryptContext::builder()
            .schemes(["pbkdf2_sha256"])
            .build()
            .unwrap();
        let target = Duration::from_micros(100);
        let a = ctx.calibrate("pbkdf2_sha256", target).unwrap();
        let b = ctx.calibrate("pbkdf2_sha256", target).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn truncate_error_policy_flows_to_bcrypt() {
        let ctx = CryptContext::builder()
            .schemes(["bcrypt"])
            .option(None, "bcrypt", "rounds", "4")
            .unwrap()
            .option(None, "bcrypt", "truncate_error", "true")
            .unwrap()
            .build()
            .unwrap();
        let long = vec![b'a'; 80];
        assert!(matches!(
            ctx.hash(&long),
            Err(Error::PasswordTruncate { .. })
        ));
        assert!(ctx.hash(&vec![b'a'; 72]).is_ok());
    }
}
