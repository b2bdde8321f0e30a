//! Blocking persona layered over the async core.
//!
//! The same authorizer, limiter, and pipeline state machines run underneath; only the
//! sleep and transport primitives differ, driven here by an owned single-threaded
//! runtime. Enable the `blocking` cargo feature to use this module.

// crates.io
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
// self
use crate::{
	_prelude::*,
	auth::Authorizer,
	error::RequestError,
	session::{ApiRequest, Session},
};

/// Synchronous facade over [`Session`].
///
/// Calls block the current thread until the underlying async pipeline resolves,
/// including any rate-limit pacing sleeps.
pub struct BlockingSession {
	inner: Session,
	runtime: Runtime,
}
impl BlockingSession {
	/// Creates a blocking session over the standard rate-limit window.
	pub fn new(authorizer: Arc<Authorizer>) -> Result<Self> {
		let runtime = Builder::new_current_thread()
			.enable_all()
			.build()
			.map_err(RequestError::from)?;

		Ok(Self { inner: Session::new(authorizer), runtime })
	}

	/// Authorizer stamping this session's requests.
	pub fn authorizer(&self) -> &Arc<Authorizer> {
		self.inner.authorizer()
	}

	/// Performs one authenticated API call, blocking until it completes.
	pub fn request(&self, request: ApiRequest) -> Result<Option<Value>> {
		self.runtime.block_on(self.inner.request(request))
	}

	/// Unconditionally refreshes the shared authorizer's access token.
	pub fn refresh(&self) -> Result<()> {
		self.runtime.block_on(self.inner.authorizer().refresh())
	}

	/// Revokes the shared authorizer's credentials.
	pub fn revoke(&self) -> Result<()> {
		self.runtime.block_on(self.inner.authorizer().revoke())
	}

	/// Closes the session.
	pub fn close(self) {}
}
impl Debug for BlockingSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BlockingSession").field("inner", &self.inner).finish()
	}
}
