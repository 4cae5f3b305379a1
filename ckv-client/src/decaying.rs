//! # Decaying Error Score
//!
//! Purpose: A scalar that shrinks exponentially toward zero, used as the
//! per-endpoint error score.
//!
//! `value(t) = value(t0) * e^(rate * (t - t0))` with `rate = ln(0.5) / half_life`,
//! so after one half-life the score is halved. Decay is applied lazily on
//! every read and every add.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default half-life of an endpoint error score.
pub const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(10);

struct State {
    value: f64,
    last_observed: Instant,
}

/// Exponentially decaying counter, safe to share between threads.
pub struct DecayingCounter {
    rate: f64,
    state: Mutex<State>,
}

impl DecayingCounter {
    /// Counter with a 10 second half-life.
    pub fn new() -> Self {
        Self::with_half_life(DEFAULT_HALF_LIFE)
    }

    pub fn with_half_life(half_life: Duration) -> Self {
        let secs = half_life.as_secs_f64().max(f64::MIN_POSITIVE);
        DecayingCounter {
            rate: 0.5f64.ln() / secs,
            state: Mutex::new(State {
                value: 0.0,
                last_observed: Instant::now(),
            }),
        }
    }

    /// Decay rate per second (negative).
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current value, decayed to now.
    pub fn value(&self) -> f64 {
        self.value_at(Instant::now())
    }

    /// Decays, then adds `amount`.
    pub fn add(&self, amount: f64) {
        self.add_at(amount, Instant::now());
    }

    /// Value decayed to `now`. Instants earlier than the last observation
    /// are treated as no elapsed time.
    pub fn value_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        self.decay(&mut state, now);
        state.value
    }

    /// Decay to `now` and add `amount` under one lock.
    pub fn add_at(&self, amount: f64, now: Instant) {
        let mut state = self.state.lock();
        self.decay(&mut state, now);
        state.value += amount;
    }

    /// Zeroes the score.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.value = 0.0;
        state.last_observed = Instant::now();
    }

    fn decay(&self, state: &mut State, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_observed);
        state.value *= (self.rate * elapsed.as_secs_f64()).exp();
        if now > state.last_observed {
            state.last_observed = now;
        }
    }
}

impl Default for DecayingCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecayingCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecayingCounter")
            .field("value", &self.value())
            .field("rate", &self.rate)
            .finish()
    }
}
