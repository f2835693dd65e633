use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reconnect schedule for failed channels.
///
/// Retry `n` (1-based) waits `base_delay * 2^(n-1)`, capped at `max_delay`,
/// then scaled by a random factor in `[1 - jitter, 1 + jitter]` and capped
/// again. After `max_consecutive_failures` failures in a row the channel
/// goes offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub jitter: f64,
	pub max_consecutive_failures: u32,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			base_delay_ms: 500,
			max_delay_ms: 30_000,
			jitter: 0.2,
			max_consecutive_failures: 5,
		}
	}
}

impl ReconnectPolicy {
	pub fn max_delay(&self) -> Duration {
		Duration::from_millis(self.max_delay_ms)
	}

	/// Un-jittered delay before retry `attempt`.
	pub fn nominal_delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(32);
		let millis = self.base_delay_ms.saturating_mul(1u64 << exponent);
		Duration::from_millis(millis.min(self.max_delay_ms))
	}

	/// Delay before retry `attempt` for a jitter sample in `[-1, 1]`.
	pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
		let nominal = self.nominal_delay(attempt).as_secs_f64();
		let factor = 1.0 + self.jitter.clamp(0.0, 1.0) * sample.clamp(-1.0, 1.0);
		Duration::from_secs_f64(nominal * factor).min(self.max_delay())
	}

	/// Jittered delay before retry `attempt`.
	pub fn delay(&self, attempt: u32) -> Duration {
		if self.jitter <= 0.0 {
			return self.nominal_delay(attempt);
		}
		let sample = rand::thread_rng().gen_range(-1.0..=1.0);
		self.delay_with_sample(attempt, sample)
	}

	/// Returns true once `failures` consecutive failures exhaust the policy.
	pub fn exhausted(&self, failures: u32) -> bool {
		failures >= self.max_consecutive_failures
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> ReconnectPolicy {
		ReconnectPolicy {
			base_delay_ms: 100,
			max_delay_ms: 1_000,
			jitter: 0.5,
			max_consecutive_failures: 3,
		}
	}

	#[test]
	fn nominal_delay_doubles_until_capped() {
		let p = policy();
		let delays: Vec<_> = (1..=6).map(|n| p.nominal_delay(n).as_millis()).collect();
		assert_eq!(delays, [100, 200, 400, 800, 1_000, 1_000]);
		assert_eq!(p.nominal_delay(200), Duration::from_millis(1_000));
	}

	#[test]
	fn jitter_stays_within_bounds_and_cap() {
		let p = policy();
		let approx = |d: Duration, ms: f64| (d.as_secs_f64() * 1_000.0 - ms).abs() < 1e-3;
		assert!(approx(p.delay_with_sample(2, -1.0), 100.0));
		assert!(approx(p.delay_with_sample(2, 1.0), 300.0));
		assert_eq!(p.delay_with_sample(5, 1.0), Duration::from_millis(1_000));
		for _ in 0..100 {
			let d = p.delay(3);
			assert!(d >= Duration::from_millis(199) && d <= Duration::from_millis(601), "{d:?}");
		}
	}

	#[test]
	fn exhaustion_counts_consecutive_failures() {
		let p = policy();
		assert!(!p.exhausted(2));
		assert!(p.exhausted(3));
	}
}
