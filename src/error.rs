//! Error taxonomy shared across the authenticator, authorizer, rate limiter, and session.
//!
//! Three families mirror the failure surfaces of the request pipeline: [`RequestError`] wraps
//! low-level transport failures (retried by the session), [`ResponseError`] classifies HTTP
//! status codes, and [`OAuthError`] carries token-endpoint JSON error bodies. Misuse of the
//! API itself surfaces as [`Error::InvalidInvocation`], while a token the server repudiates
//! surfaces as [`Error::InvalidToken`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Transport-layer failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Request(#[from] RequestError),
	/// HTTP response classified into the status-code taxonomy.
	#[error(transparent)]
	Response(#[from] ResponseError),
	/// Token endpoint rejected the grant with an OAuth error body.
	#[error(transparent)]
	OAuth(#[from] OAuthError),

	/// The requested operation cannot be performed with this configuration.
	#[error("Invalid invocation: {reason}.")]
	InvalidInvocation {
		/// Why the call cannot be completed.
		reason: String,
	},
	/// The server repudiated the access or refresh token.
	#[error("The server rejected the supplied token.")]
	InvalidToken,
}
impl Error {
	/// Shorthand for [`Error::InvalidInvocation`].
	pub fn invalid_invocation(reason: impl Into<String>) -> Self {
		Self::InvalidInvocation { reason: reason.into() }
	}
}

/// Transport-level failures (network, IO). Absorbed by the session retry loop until the
/// attempt budget is exhausted.
#[derive(Debug, ThisError)]
pub enum RequestError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl RequestError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for RequestError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Status and URL context attached to every classified response error.
#[derive(Clone, Debug)]
pub struct ResponseContext {
	/// HTTP status code returned by the server.
	pub status: StatusCode,
	/// URL the failing request was sent to.
	pub url: String,
}
impl Display for ResponseContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} from {}", self.status, self.url)
	}
}

/// HTTP responses classified by status code.
///
/// The mapping is the complete contract of the session dispatch table. Statuses without a
/// dedicated variant surface as [`ResponseError::Other`] carrying the raw context.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// A success status carried a body that could not be decoded as JSON.
	#[error("Response body could not be decoded as JSON ({context}).")]
	BadJson {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
		/// Structured decoding failure.
		#[source]
		source: serde_json::Error,
	},
	/// HTTP 400.
	#[error("Bad request ({context}).")]
	BadRequest {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 409.
	#[error("Conflict ({context}).")]
	Conflict {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 403 without an OAuth sub-classification.
	#[error("Forbidden ({context}).")]
	Forbidden {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 403 whose `www-authenticate` header names `insufficient_scope`.
	#[error("Token lacks the scope required by this request ({context}).")]
	InsufficientScope {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 404.
	#[error("Not found ({context}).")]
	NotFound {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 301 or 302.
	#[error("Redirect to {location:?} ({context}).")]
	Redirect {
		/// Target of the redirect, when the server supplied one.
		location: Option<String>,
		/// True for HTTP 301, false for HTTP 302.
		permanent: bool,
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// Retryable 5xx or Cloudflare status that outlived the attempt budget.
	#[error("Server error ({context}).")]
	ServerError {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 415; Reddit attaches a JSON body explaining the rejection.
	#[error("Unsupported media type ({context}): {explanation:?}.")]
	SpecialError {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
		/// `explanation` field of the error body, if present.
		explanation: Option<String>,
		/// `reason` field of the error body, if present.
		reason: Option<String>,
		/// `message` field of the error body, if present.
		message: Option<String>,
	},
	/// Token endpoint returned JSON that does not match the token envelope.
	#[error("Token endpoint returned malformed JSON ({context}).")]
	TokenParse {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// HTTP 413.
	#[error("Request entity too large ({context}).")]
	TooLarge {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 429.
	#[error("Too many requests ({context}); retry after {retry_after:?} seconds.")]
	TooManyRequests {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
		/// `Retry-After` hint in seconds, when the server supplied one.
		retry_after: Option<u64>,
	},
	/// HTTP 451.
	#[error("Unavailable for legal reasons ({context}).")]
	UnavailableForLegalReasons {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
	/// HTTP 414.
	#[error("Request URI too long ({context}).")]
	UriTooLong {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},

	/// Any status code without a dedicated variant.
	#[error("Unexpected response ({context}).")]
	Other {
		/// Status and URL of the failing exchange.
		context: ResponseContext,
	},
}
impl ResponseError {
	/// Returns the status and URL context of the classified response.
	pub fn context(&self) -> &ResponseContext {
		match self {
			Self::BadJson { context, .. }
			| Self::BadRequest { context }
			| Self::Conflict { context }
			| Self::Forbidden { context }
			| Self::InsufficientScope { context }
			| Self::NotFound { context }
			| Self::Redirect { context, .. }
			| Self::ServerError { context }
			| Self::SpecialError { context, .. }
			| Self::TokenParse { context, .. }
			| Self::TooLarge { context }
			| Self::TooManyRequests { context, .. }
			| Self::UnavailableForLegalReasons { context }
			| Self::UriTooLong { context }
			| Self::Other { context } => context,
		}
	}
}

/// OAuth error envelope returned by the token endpoint with a 200-level status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthError {
	/// Machine-readable error code (e.g. `invalid_grant`).
	pub error: String,
	/// Human-readable description; absent when the server sent none or the literal `"None"`.
	pub description: Option<String>,
	/// Scope the error applies to, when the server names one.
	pub scope: Option<String>,
}
impl OAuthError {
	/// Builds an error from the token endpoint's `error` and `error_description` fields.
	///
	/// Legacy servers render a missing description as the literal string `"None"`; that value
	/// is treated as absent.
	pub fn new(error: impl Into<String>, description: Option<String>) -> Self {
		let description = description.filter(|value| value != "None");

		Self { error: error.into(), description, scope: None }
	}

	/// Attaches the scope the error applies to.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}
}
impl Display for OAuthError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.description {
			Some(description) => write!(f, "{} ({description})", self.error),
			None => f.write_str(&self.error),
		}
	}
}
impl StdError for OAuthError {}
