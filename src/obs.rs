//! Optional observability helpers for the session and authorizer.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `reddit_session.request` with the
//!   `kind` (exchange family) and `stage` (grant flow or API path) fields, plus the debug
//!   and warning events the pipeline logs around pacing and retries.
//! - Enable `metrics` to record each exchange's outcome and wall time
//!   (`reddit_session_exchanges_total`, `reddit_session_exchange_duration_seconds`),
//!   retries by cause (`reddit_session_retries_total`), and rate-limit pacing sleeps
//!   (`reddit_session_pacing_delay_seconds`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Exchange families observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
	/// Token-endpoint exchange (any grant).
	AccessToken,
	/// Authenticated API call through the session pipeline.
	Api,
	/// Token revocation.
	Revoke,
}
impl RequestKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestKind::AccessToken => "access_token",
			RequestKind::Api => "api",
			RequestKind::Revoke => "revoke",
		}
	}
}
impl Display for RequestKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each completed exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl RequestOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestOutcome::Success => "success",
			RequestOutcome::Failure => "failure",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
