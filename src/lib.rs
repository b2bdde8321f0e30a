//! Authenticated HTTP session core for Reddit's OAuth2 API—token lifecycle across five grant
//! flows, header-driven adaptive rate limiting, and typed status classification in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
#[cfg(feature = "blocking")] pub mod blocking;
pub mod error;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod session;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::http::Requestor;

	/// User agent stamped on every request issued by the test suite.
	pub const TEST_USER_AGENT: &str = "reddit-session test suite";

	/// Builds a [`Requestor`] whose API and token-endpoint bases both point at a mock server.
	pub fn test_requestor(base_url: &str) -> Arc<Requestor> {
		let base = Url::parse(base_url).expect("Failed to parse mock server base URL.");
		let requestor = Requestor::new(TEST_USER_AGENT)
			.expect("Failed to build requestor for tests.")
			.with_oauth_url(base.clone())
			.with_reddit_url(base);

		Arc::new(requestor)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::{Duration as StdDuration, Instant},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use http::{HeaderMap, Method, StatusCode};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
#[cfg(all(test, feature = "test"))] use reddit_session as _;
