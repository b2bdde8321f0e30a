// self
use crate::{_prelude::*, obs::RequestKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedExchange<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedExchange<F> = F;

/// A span builder used around token exchanges and pipeline requests.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Creates a new span tagged with the provided exchange kind + stage.
	pub fn new(kind: RequestKind, stage: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("reddit_session.request", kind = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedExchange<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug-level event when tracing is enabled; the closure is not evaluated
/// otherwise.
pub(crate) fn debug(message: impl FnOnce() -> String) {
	#[cfg(feature = "tracing")]
	tracing::debug!("{}", message());
	#[cfg(not(feature = "tracing"))]
	{
		let _ = message;
	}
}

/// Emits a warn-level event when tracing is enabled; the closure is not evaluated
/// otherwise.
pub(crate) fn warn(message: impl FnOnce() -> String) {
	#[cfg(feature = "tracing")]
	tracing::warn!("{}", message());
	#[cfg(not(feature = "tracing"))]
	{
		let _ = message;
	}
}
