//! Adaptive request pacing driven by Reddit's `x-ratelimit-*` response headers.
//!
//! The limiter is a feedback controller: [`update`](RateLimiter::update) folds each
//! response's budget headers into the state and [`delay`](RateLimiter::delay) sleeps just
//! long enough that the remaining budget spreads across the rest of the window. It is
//! advisory; a caller who skips `delay` simply starts seeing 429 responses, which the
//! session classifies as `TooManyRequests`.

// self
use crate::{_prelude::*, obs};

/// Reddit's rate-limit counting interval in seconds.
pub const WINDOW_SIZE: u64 = 600;

const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";
const HEADER_USED: &str = "x-ratelimit-used";
// Seconds of slack when deciding that an update belongs to an already-superseded window.
const STALE_RESET_SLACK: StdDuration = StdDuration::from_secs(1);

#[derive(Clone, Copy, Debug, Default)]
struct LimiterState {
	remaining: Option<f64>,
	used: Option<u64>,
	next_request_at: Option<Instant>,
	reset_at: Option<Instant>,
}

/// Read-only view of the limiter's budget counters, used for response logging.
#[derive(Clone, Copy, Debug, Default)]
pub struct RateLimitSnapshot {
	/// Requests left in the current window.
	pub remaining: Option<f64>,
	/// Requests spent in the current window.
	pub used: Option<u64>,
}

/// Paces requests using the server's own budget accounting.
pub struct RateLimiter {
	state: Mutex<LimiterState>,
	window: StdDuration,
}
impl RateLimiter {
	/// Creates a limiter for Reddit's standard ten-minute window.
	pub fn new() -> Self {
		Self::with_window(StdDuration::from_secs(WINDOW_SIZE))
	}

	/// Creates a limiter with a custom window size.
	pub fn with_window(window: StdDuration) -> Self {
		Self { state: Mutex::new(LimiterState::default()), window }
	}

	/// Size of the rate-limit reset window.
	pub fn window(&self) -> StdDuration {
		self.window
	}

	/// Current budget counters.
	pub fn snapshot(&self) -> RateLimitSnapshot {
		let state = self.state.lock();

		RateLimitSnapshot { remaining: state.remaining, used: state.used }
	}

	/// Sleeps until the next request may be sent, if the limiter has elected to delay.
	///
	/// Cancelling the sleep leaves the limiter state untouched.
	pub async fn delay(&self) {
		let Some(wait) = self.pending_delay_at(Instant::now()) else {
			return;
		};

		obs::debug(|| format!("Sleeping: {:.2} seconds prior to call", wait.as_secs_f64()));
		obs::record_pacing_delay(wait);

		tokio::time::sleep(wait).await;
	}

	/// Computes the wait the limiter would impose at `now`.
	///
	/// The wait is clamped so it never extends past the window reset; a stale pacing
	/// computation must not sleep into the next window.
	pub fn pending_delay_at(&self, now: Instant) -> Option<StdDuration> {
		let state = self.state.lock();
		let next = state.next_request_at?;

		if next <= now {
			return None;
		}

		let mut wait = next.saturating_duration_since(now);

		if let Some(reset_at) = state.reset_at {
			wait = wait.min(reset_at.saturating_duration_since(now));
		}

		(wait > StdDuration::ZERO).then_some(wait)
	}

	/// Folds one response's `x-ratelimit-*` headers into the pacing state.
	///
	/// Responses without the headers clear any pending delay; such responses come from
	/// endpoints outside the budget (or error paths) and must not keep stale pacing alive.
	pub fn update(&self, headers: &HeaderMap) {
		self.update_at(headers, Instant::now());
	}

	pub(crate) fn update_at(&self, headers: &HeaderMap, now: Instant) {
		let mut state = self.state.lock();
		let parsed = (
			header_f64(headers, HEADER_REMAINING),
			header_f64(headers, HEADER_USED),
			header_f64(headers, HEADER_RESET),
		);
		let (Some(remaining), Some(used), Some(reset_seconds)) = parsed else {
			state.next_request_at = Some(now);

			return;
		};
		let reset_at = now + StdDuration::from_secs_f64(reset_seconds.max(0.0));

		// Concurrent responses race to this update; one from an already-superseded window
		// must not rewind the newer reset.
		if state.reset_at.is_some_and(|current| reset_at + STALE_RESET_SLACK < current) {
			return;
		}

		let next = if remaining <= 0.0 {
			reset_at
		} else if remaining <= used {
			(now + StdDuration::from_secs_f64(reset_seconds.max(0.0) / remaining)).min(reset_at)
		} else {
			now
		};

		state.remaining = Some(remaining);
		state.used = Some(used as u64);
		state.reset_at = Some(reset_at);
		state.next_request_at = Some(next);
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RateLimiter")
			.field("remaining", &state.remaining)
			.field("used", &state.used)
			.field("window", &self.window)
			.finish()
	}
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
	headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
