use std::time::Instant;

/// Token bucket with lazy refill driven by caller-supplied timestamps.
///
/// A bucket with `rate <= 0` is unlimited: it holds infinite tokens, never
/// decrements and always admits. The bucket carries no lock of its own; the
/// owner serialises access.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    rate: f64,     // tokens per second
    capacity: f64, // max tokens, >= 1
}

impl TokenBucket {
    /// Creates a bucket seeded with `initial` tokens clamped to
    /// `[0, capacity]`. A non-positive `initial` seeds a full bucket.
    pub fn new(now: Instant, rate: f64, burst: u32, initial: f64) -> Self {
        let capacity = f64::from(burst.max(1));
        let tokens = if rate <= 0.0 {
            f64::INFINITY
        } else {
            clamp_initial(initial, capacity)
        };

        Self {
            tokens,
            last_refill: now,
            rate,
            capacity,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Adds `elapsed * rate` tokens, capped at capacity. A `now` earlier than
    /// the last refill counts as zero elapsed time and leaves the reference
    /// point where it is.
    pub fn refill(&mut self, now: Instant) {
        if self.is_unlimited() {
            self.last_refill = now;
            return;
        }

        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        if elapsed.is_zero() {
            return;
        }

        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Refills, then reports whether at least `cost` tokens are available.
    pub fn has_at_least(&mut self, now: Instant, cost: f64) -> bool {
        self.refill(now);
        self.tokens >= cost
    }

    /// Subtracts `cost` without checking, flooring at zero. Callers must have
    /// checked `has_at_least` under the same lock.
    pub fn consume_no_check(&mut self, cost: f64) {
        if self.is_unlimited() {
            return;
        }
        self.tokens = (self.tokens - cost).max(0.0);
    }

    /// Refills and consumes `cost` tokens in one step if enough are available.
    pub fn take(&mut self, now: Instant, cost: f64) -> bool {
        if self.has_at_least(now, cost) {
            self.consume_no_check(cost);
            true
        } else {
            false
        }
    }
}

fn clamp_initial(initial: f64, capacity: f64) -> f64 {
    if initial <= 0.0 || initial.is_nan() {
        capacity
    } else {
        initial.min(capacity)
    }
}
