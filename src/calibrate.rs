//! Rounds auto-calibration: find the smallest work factor whose
//! observed hash time meets a wall-clock target.

use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, Result};
use crate::scheme::{Hasher, HashSettings, RoundsCost};

const PROBE_SECRET: &[u8] = b"calibration probe secret";

fn timed_hash(hasher: &dyn Hasher, rounds: u32) -> Result<Duration> {
    let settings = HashSettings::default().rounds(rounds);
    let start = Instant::now();
    hasher.hash(PROBE_SECRET, &settings)?;
    Ok(start.elapsed())
}

/// Exponential probe upward from the scheme minimum, then a binary
/// refinement for linear-cost schemes. Log2 costs step one exponent at
/// a time, so the probe result is already minimal.
pub(crate) fn calibrate_rounds(hasher: &dyn Hasher, target: Duration) -> Result<u32> {
    let desc = hasher.descriptor();
    let Some(spec) = desc.rounds else {
        return Err(Error::Config(format!(
            "{} has no tunable rounds",
            desc.name
        )));
    };

    let mut rounds = spec.min;
    let mut elapsed = timed_hash(hasher, rounds)?;
    while elapsed < target && rounds < spec.max {
        rounds = match spec.cost {
            RoundsCost::Log2 => rounds + 1,
            RoundsCost::Linear => rounds.saturating_mul(2).min(spec.max),
        };
        elapsed = timed_hash(hasher, rounds)?;
    }

    if spec.cost == RoundsCost::Linear && rounds > spec.min {
        let mut lo = rounds / 2;
        let mut hi = rounds;
        while hi - lo > lo / 8 + 1 {
            let mid = lo + (hi - lo) / 2;
            if timed_hash(hasher, mid)? >= target {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        rounds = hi;
    }

    debug!(
        "calibrated {} to rounds={rounds} for target {:?} (last probe {:?})",
        desc.name, target, elapsed
    );
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::{Bcrypt, Pbkdf2, Plaintext};

    #[test]
    fn finds_rounds_meeting_target() {
        // tiny target so the probe terminates fast
        let hasher = Pbkdf2::sha256();
        let rounds = calibrate_rounds(&hasher, Duration::from_micros(50)).unwrap();
        assert!(rounds >= 1);
        let spec = hasher.descriptor().rounds.unwrap();
        assert!(rounds <= spec.max);
    }

    #[test]
    fn log2_schemes_stop_at_minimum_cost() {
        let hasher = Bcrypt::new();
        let rounds = calibrate_rounds(&hasher, Duration::from_nanos(1)).unwrap();
        assert_eq!(rounds, hasher.descriptor().rounds.unwrap().min);
    }

    #[test]
    fn roundless_scheme_is_an_error() {
        assert!(matches!(
            calibrate_rounds(&Plaintext::new(), Duration::from_millis(1)),
            Err(Error::Config(_))
        ));
    }
}
