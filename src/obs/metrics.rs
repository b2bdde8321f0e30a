// std
use std::time::Duration;
#[cfg(feature = "metrics")] use std::time::Instant;
// self
use crate::obs::{RequestKind, RequestOutcome};

/// Why the session pipeline scheduled another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryCause {
	/// Transport-level failure below HTTP.
	Transport,
	/// Retryable 5xx or Cloudflare status.
	ServerError,
	/// 401 healed by clearing the token and re-authorizing.
	Unauthorized,
}
impl RetryCause {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryCause::Transport => "transport",
			RetryCause::ServerError => "server_error",
			RetryCause::Unauthorized => "unauthorized",
		}
	}
}

/// Times one exchange from its first attempt to its final outcome.
///
/// With the `metrics` feature enabled, [`finish`](Self::finish) bumps the
/// `reddit_session_exchanges_total` counter and records the end-to-end wall time into the
/// `reddit_session_exchange_duration_seconds` histogram, both labeled by exchange kind.
/// Retries and pacing sleeps inside the exchange are part of the measured duration.
/// Without the feature the observation compiles down to nothing.
#[derive(Debug)]
pub struct ExchangeObservation {
	kind: RequestKind,
	#[cfg(feature = "metrics")]
	started: Instant,
}
impl ExchangeObservation {
	/// Starts timing an exchange of the given kind.
	pub fn start(kind: RequestKind) -> Self {
		Self {
			kind,
			#[cfg(feature = "metrics")]
			started: Instant::now(),
		}
	}

	/// Records the exchange outcome together with its duration.
	pub fn finish(self, outcome: RequestOutcome) {
		#[cfg(feature = "metrics")]
		{
			metrics::counter!(
				"reddit_session_exchanges_total",
				"kind" => self.kind.as_str(),
				"outcome" => outcome.as_str()
			)
			.increment(1);
			metrics::histogram!(
				"reddit_session_exchange_duration_seconds",
				"kind" => self.kind.as_str()
			)
			.record(self.started.elapsed().as_secs_f64());
		}

		#[cfg(not(feature = "metrics"))]
		{
			let _ = (self.kind, outcome);
		}
	}

	/// Folds a result into [`finish`](Self::finish), mapping `Ok` to success and `Err` to
	/// failure.
	pub fn finish_with<T, E>(self, result: &Result<T, E>) {
		self.finish(match result {
			Ok(_) => RequestOutcome::Success,
			Err(_) => RequestOutcome::Failure,
		});
	}
}

/// Counts a scheduled retry by cause.
pub(crate) fn record_retry(cause: RetryCause) {
	#[cfg(feature = "metrics")]
	metrics::counter!("reddit_session_retries_total", "cause" => cause.as_str()).increment(1);

	#[cfg(not(feature = "metrics"))]
	{
		let _ = cause;
	}
}

/// Records how long the rate limiter held a request back.
pub(crate) fn record_pacing_delay(delay: Duration) {
	#[cfg(feature = "metrics")]
	metrics::histogram!("reddit_session_pacing_delay_seconds").record(delay.as_secs_f64());

	#[cfg(not(feature = "metrics"))]
	{
		let _ = delay;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn observations_finish_without_a_recorder() {
		ExchangeObservation::start(RequestKind::Api).finish(RequestOutcome::Failure);

		let failed: Result<(), ()> = Err(());

		ExchangeObservation::start(RequestKind::AccessToken).finish_with(&failed);
	}

	#[test]
	fn retry_and_pacing_recorders_are_callable() {
		record_retry(RetryCause::ServerError);
		record_pacing_delay(Duration::from_millis(5));
	}
}
