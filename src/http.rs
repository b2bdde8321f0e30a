//! Transport primitives shared by the session pipeline and the token endpoints.
//!
//! The module exposes [`HttpTransport`] alongside [`TransportRequest`] and
//! [`TransportResponse`] so downstream crates can integrate custom HTTP clients. The
//! [`Requestor`] wraps one long-lived transport together with the user-agent policy, the API
//! and token-endpoint base URLs, and the default per-request timeout.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
#[cfg(feature = "reqwest")] use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, error::RequestError};

/// Default per-request timeout, matching Reddit's recommended client behavior.
pub const TIMEOUT: StdDuration = StdDuration::from_secs(16);
/// Environment variable overriding the default timeout, read once at requestor construction.
pub const TIMEOUT_ENVIRONMENT_VARIABLE: &str = "REDDIT_SESSION_TIMEOUT";

const DEFAULT_OAUTH_URL: &str = "https://oauth.reddit.com";
const DEFAULT_REDDIT_URL: &str = "https://www.reddit.com";
// Reddit refuses unidentifiable clients; anything shorter cannot name an app.
const MIN_USER_AGENT_LEN: usize = 7;

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, RequestError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing one request with a timeout.
///
/// The trait is the crate's only dependency on an HTTP stack. Implementations must not
/// follow redirects; the session classifies 301/302 responses itself.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and resolves to the response or a transport-level failure.
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// One fully-resolved HTTP request handed to the transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// Request verb.
	pub method: Method,
	/// Absolute URL including any query parameters.
	pub url: Url,
	/// Headers to send verbatim; the [`Requestor`] has already stamped `User-Agent`.
	pub headers: Vec<(String, String)>,
	/// Request body framing.
	pub body: RequestBody,
	/// Per-request timeout; implementations must abort the exchange once it elapses.
	pub timeout: StdDuration,
}
impl TransportRequest {
	/// Creates a request with no headers and an empty body.
	pub fn new(method: Method, url: Url, timeout: StdDuration) -> Self {
		Self { method, url, headers: Vec::new(), body: RequestBody::Empty, timeout }
	}

	/// Appends a header pair.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets the request body.
	pub fn body(mut self, body: RequestBody) -> Self {
		self.body = body;

		self
	}
}

/// Body framing variants understood by every transport.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
	/// No request body.
	#[default]
	Empty,
	/// `application/x-www-form-urlencoded` key/value pairs.
	Form(Vec<(String, String)>),
	/// JSON-serialized body.
	Json(serde_json::Value),
	/// `multipart/form-data` with text fields and file parts.
	Multipart {
		/// Plain text fields.
		fields: Vec<(String, String)>,
		/// File attachments.
		files: Vec<FilePart>,
	},
}

/// One file attachment within a multipart body.
#[derive(Clone, Debug)]
pub struct FilePart {
	/// Form field name.
	pub name: String,
	/// File name reported to the server.
	pub filename: String,
	/// Raw file contents.
	pub bytes: Vec<u8>,
}
impl FilePart {
	/// Creates a file part from raw bytes.
	pub fn new(name: impl Into<String>, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
		Self { name: name.into(), filename: filename.into(), bytes }
	}
}

/// Response surfaced by a transport, with the body fully buffered.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
	/// URL the response was served from.
	pub url: Url,
}
impl TransportResponse {
	/// Returns a header value as UTF-8, when present and decodable.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Decodes the body as JSON.
	pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
		serde_json::from_slice(&self.body)
	}
}

/// Owns the long-lived transport plus the request policies every exchange shares.
///
/// The requestor is shared by the session (API calls against [`oauth_url`](Self::oauth_url))
/// and the authenticator (token-endpoint calls against [`reddit_url`](Self::reddit_url)).
/// Dropping the last reference releases the transport's connections; no explicit close is
/// required.
pub struct Requestor {
	transport: Arc<dyn HttpTransport>,
	user_agent: String,
	oauth_url: Url,
	reddit_url: Url,
	timeout: StdDuration,
}
impl Requestor {
	/// Creates a requestor backed by the crate's default reqwest transport.
	///
	/// `user_agent` must be descriptive (at least seven characters); Reddit's API rules
	/// require clients to identify themselves. The crate name and version are appended.
	#[cfg(feature = "reqwest")]
	pub fn new(user_agent: impl Into<String>) -> Result<Self> {
		Self::with_transport(user_agent, Arc::new(ReqwestTransport::new()?))
	}

	/// Creates a requestor around a caller-provided transport.
	pub fn with_transport(
		user_agent: impl Into<String>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self> {
		let user_agent = user_agent.into();

		if user_agent.len() < MIN_USER_AGENT_LEN {
			return Err(Error::invalid_invocation("user_agent is not descriptive"));
		}

		Ok(Self {
			transport,
			user_agent: format!(
				"{user_agent} {}/{}",
				env!("CARGO_PKG_NAME"),
				env!("CARGO_PKG_VERSION")
			),
			oauth_url: Url::parse(DEFAULT_OAUTH_URL).expect("Default OAuth URL must parse."),
			reddit_url: Url::parse(DEFAULT_REDDIT_URL).expect("Default Reddit URL must parse."),
			timeout: timeout_from_environment().unwrap_or(TIMEOUT),
		})
	}

	/// Overrides the base URL for authenticated API calls.
	pub fn with_oauth_url(mut self, url: Url) -> Self {
		self.oauth_url = url;

		self
	}

	/// Overrides the base URL for token-endpoint and revocation calls.
	pub fn with_reddit_url(mut self, url: Url) -> Self {
		self.reddit_url = url;

		self
	}

	/// Overrides the default per-request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Base URL for authenticated API calls.
	pub fn oauth_url(&self) -> &Url {
		&self.oauth_url
	}

	/// Base URL for token-endpoint and revocation calls.
	pub fn reddit_url(&self) -> &Url {
		&self.reddit_url
	}

	/// Default per-request timeout.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}

	/// User agent stamped on every outgoing request.
	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	/// Sends one request through the transport, applying the shared header policy.
	///
	/// Token-endpoint hosts get `Connection: close`; keep-alive sockets to
	/// `www.reddit.com` are prone to mid-refresh resets.
	pub(crate) async fn send(
		&self,
		mut request: TransportRequest,
	) -> Result<TransportResponse, RequestError> {
		request.headers.push(("user-agent".into(), self.user_agent.clone()));

		if request.url.host_str() == self.reddit_url.host_str() {
			request.headers.push(("connection".into(), "close".into()));
		}

		self.transport.execute(request).await
	}
}
impl Debug for Requestor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Requestor")
			.field("user_agent", &self.user_agent)
			.field("oauth_url", &self.oauth_url.as_str())
			.field("reddit_url", &self.reddit_url.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Encodes HTTP Basic credentials for the `Authorization` header.
pub(crate) fn basic_auth(username: &str, password: Option<&str>) -> String {
	let raw = format!("{username}:{}", password.unwrap_or_default());

	format!("Basic {}", STANDARD.encode(raw))
}

fn timeout_from_environment() -> Option<StdDuration> {
	let raw = std::env::var(TIMEOUT_ENVIRONMENT_VARIABLE).ok()?;
	let seconds = raw.trim().parse::<f64>().ok().filter(|value| *value > 0.0)?;

	Some(StdDuration::from_secs_f64(seconds))
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirect following is disabled; the session must observe 301/302 statuses itself to
/// surface them as typed errors.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds the default transport with redirects disabled.
	pub fn new() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(Policy::none())
			.build()
			.map_err(RequestError::from)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// The client must be configured to not follow redirects.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder =
				client.request(request.method, request.url).timeout(request.timeout);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			builder = match request.body {
				RequestBody::Empty => builder,
				RequestBody::Form(pairs) => builder.form(&pairs),
				RequestBody::Json(value) => builder.json(&value),
				RequestBody::Multipart { fields, files } => {
					let mut form = reqwest::multipart::Form::new();

					for (name, value) in fields {
						form = form.text(name, value);
					}
					for file in files {
						form = form.part(
							file.name,
							reqwest::multipart::Part::bytes(file.bytes).file_name(file.filename),
						);
					}

					builder.multipart(form)
				},
			};

			let response = builder.send().await.map_err(RequestError::from)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let url = response.url().to_owned();
			let body = response.bytes().await.map_err(RequestError::from)?.to_vec();

			Ok(TransportResponse { status, headers, body, url })
		})
	}
}
