//! The per-request pipeline composing authorization, pacing, transport, and retry.
//!
//! [`Session::request`] walks a strict order for every attempt: ensure the authorizer
//! holds a valid token, let the rate limiter pace the call, send through the transport,
//! fold the response headers back into the limiter, then classify the status code.
//! Transient failures (wrapped I/O errors and the retryable 5xx statuses) are absorbed by
//! a finite attempt budget; everything else surfaces as a typed error.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Authorizer, TokenSecret},
	error::{ResponseContext, ResponseError},
	http::{FilePart, RequestBody, Requestor, TransportRequest, TransportResponse},
	obs::{self, ExchangeObservation, RequestKind, RequestSpan, RetryCause},
	rate_limit::RateLimiter,
};

/// Statuses worth retrying, including the Cloudflare pair Reddit serves from its edge.
const RETRY_STATUSES: [u16; 6] = [500, 502, 503, 504, 520, 522];

/// One API request intent, built up before being handed to [`Session::request`].
#[derive(Clone, Debug, Default)]
pub struct ApiRequest {
	method: Method,
	path: String,
	params: Vec<(String, String)>,
	data: Option<BTreeMap<String, String>>,
	json: Option<Value>,
	files: Vec<FilePart>,
	timeout: Option<StdDuration>,
}
impl ApiRequest {
	/// Creates a request for the given verb and path.
	///
	/// A path beginning with `http` is used verbatim; anything else is joined onto the
	/// requestor's OAuth base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), ..Default::default() }
	}

	/// Shorthand for a GET request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a POST request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Appends one query parameter.
	pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((key.into(), value.into()));

		self
	}

	/// Replaces the form body.
	pub fn data(mut self, data: BTreeMap<String, String>) -> Self {
		self.data = Some(data);

		self
	}

	/// Inserts one form body entry.
	pub fn data_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.data.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());

		self
	}

	/// Sets a JSON body.
	pub fn json(mut self, json: Value) -> Self {
		self.json = Some(json);

		self
	}

	/// Attaches a file, switching the body to `multipart/form-data`.
	pub fn file(mut self, file: FilePart) -> Self {
		self.files.push(file);

		self
	}

	/// Overrides the requestor's default timeout for this request only.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// Schedules request retries a finite number of times.
///
/// Values are immutable; consuming a retry produces the successor state. The first
/// attempt carries no backoff, each retry doubles it and adds sub-second jitter so
/// simultaneous clients do not reconverge on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FiniteRetryStrategy {
	remaining: u32,
}
impl FiniteRetryStrategy {
	const ATTEMPTS: u32 = 3;

	fn new() -> Self {
		Self { remaining: Self::ATTEMPTS }
	}

	fn consume_available_retry(self) -> Self {
		Self { remaining: self.remaining.saturating_sub(1) }
	}

	fn should_retry_on_failure(&self) -> bool {
		self.remaining > 1
	}

	fn backoff(&self) -> Option<StdDuration> {
		let consumed = Self::ATTEMPTS - self.remaining;

		(consumed > 0).then(|| {
			StdDuration::from_secs_f64(2_u64.pow(consumed) as f64 + rand::random::<f64>())
		})
	}
}

enum Disposition {
	Done(Option<Value>),
	Retry { reason: String, cause: RetryCause, fallback: Error },
}

/// The low-level connection interface to Reddit's API.
///
/// A session is stateless between calls apart from its shared [`Authorizer`] and its owned
/// [`RateLimiter`]; several sessions may point at the same authorizer. Dropping the
/// session (or calling [`close`](Self::close)) releases its reference to the underlying
/// transport.
pub struct Session {
	authorizer: Arc<Authorizer>,
	rate_limiter: RateLimiter,
	requestor: Arc<Requestor>,
}
impl Session {
	/// Creates a session over the standard rate-limit window.
	pub fn new(authorizer: Arc<Authorizer>) -> Self {
		Self::with_window_size(authorizer, StdDuration::from_secs(crate::rate_limit::WINDOW_SIZE))
	}

	/// Creates a session with a custom rate-limit window.
	pub fn with_window_size(authorizer: Arc<Authorizer>, window: StdDuration) -> Self {
		let requestor = authorizer.authenticator().requestor().clone();

		Self { authorizer, rate_limiter: RateLimiter::with_window(window), requestor }
	}

	/// Authorizer stamping this session's requests.
	pub fn authorizer(&self) -> &Arc<Authorizer> {
		&self.authorizer
	}

	/// The session's rate limiter.
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.rate_limiter
	}

	/// Performs one authenticated API call and decodes the JSON body.
	///
	/// Returns `None` for bodiless responses (HTTP 204 or a zero-byte body). The access
	/// token is refreshed automatically whenever the authorizer can do so; a token the
	/// server repudiates twice in a row surfaces as [`Error::InvalidToken`].
	pub async fn request(&self, request: ApiRequest) -> Result<Option<Value>> {
		const KIND: RequestKind = RequestKind::Api;

		let observation = ExchangeObservation::start(KIND);
		let span = RequestSpan::new(KIND, &request.path);
		let result = span.instrument(self.request_with_retries(request)).await;

		observation.finish_with(&result);

		result
	}

	/// Closes the session.
	///
	/// Transport resources are shared with the requestor and released once the last
	/// reference drops; closing twice is therefore harmless.
	pub fn close(self) {}

	async fn request_with_retries(&self, request: ApiRequest) -> Result<Option<Value>> {
		let url = resolve_url(self.requestor.oauth_url(), &request.path)?;
		let params = prepare_params(&request.params);
		let data = prepare_data(request.data.as_ref());
		let json = prepare_json(request.json.as_ref());
		let mut strategy = FiniteRetryStrategy::new();
		let mut reauthorized = false;

		loop {
			if let Some(backoff) = strategy.backoff() {
				obs::debug(|| {
					format!("Sleeping: {:.2} seconds prior to retry", backoff.as_secs_f64())
				});

				tokio::time::sleep(backoff).await;
			}

			if !self.authorizer.is_valid() && self.authorizer.can_refresh() {
				self.authorizer.ensure_valid().await?;
			}

			let token = self.authorizer.access_token().ok_or_else(|| {
				Error::invalid_invocation("no access token is available for this request")
			})?;

			self.rate_limiter.delay().await;
			obs::debug(|| format!("Fetching: {} {url}", request.method));

			let transport_request = self.build_transport_request(
				&request,
				url.clone(),
				&params,
				data.as_ref(),
				json.as_ref(),
				&token,
			);
			let response = match self.requestor.send(transport_request).await {
				Ok(response) => response,
				Err(err) => {
					if strategy.should_retry_on_failure() {
						obs::warn(|| format!("Retrying due to {err}: {} {url}", request.method));
						obs::record_retry(RetryCause::Transport);

						strategy = strategy.consume_available_retry();

						continue;
					}

					return Err(err.into());
				},
			};

			self.rate_limiter.update(&response.headers);
			obs::debug(|| {
				let snapshot = self.rate_limiter.snapshot();

				format!(
					"Response: {} ({} bytes) (rem-{:?}:used-{:?} ratelimit)",
					response.status,
					response.body.len(),
					snapshot.remaining,
					snapshot.used,
				)
			});

			match self.dispatch(&response, &mut reauthorized)? {
				Disposition::Done(value) => return Ok(value),
				Disposition::Retry { reason, cause, fallback } => {
					if strategy.should_retry_on_failure() {
						obs::warn(|| format!("Retrying due to {reason}: {} {url}", request.method));
						obs::record_retry(cause);

						strategy = strategy.consume_available_retry();
					} else {
						return Err(fallback);
					}
				},
			}
		}
	}

	fn build_transport_request(
		&self,
		request: &ApiRequest,
		mut url: Url,
		params: &[(String, String)],
		data: Option<&BTreeMap<String, String>>,
		json: Option<&Value>,
		token: &TokenSecret,
	) -> TransportRequest {
		url.query_pairs_mut().extend_pairs(params);

		let body = if !request.files.is_empty() {
			RequestBody::Multipart {
				fields: data
					.map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
					.unwrap_or_default(),
				files: request.files.clone(),
			}
		} else if let Some(data) = data {
			RequestBody::Form(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
		} else if let Some(json) = json {
			RequestBody::Json(json.clone())
		} else {
			RequestBody::Empty
		};

		TransportRequest::new(
			request.method.clone(),
			url,
			request.timeout.unwrap_or_else(|| self.requestor.timeout()),
		)
		.header("authorization", token.bearer())
		.body(body)
	}

	fn dispatch(
		&self,
		response: &TransportResponse,
		reauthorized: &mut bool,
	) -> Result<Disposition> {
		let status = response.status;
		let context = ResponseContext { status, url: response.url.to_string() };

		match status.as_u16() {
			200 | 201 | 202 => {
				if response.body.is_empty() {
					return Ok(Disposition::Done(None));
				}

				response
					.json()
					.map(|value| Disposition::Done(Some(value)))
					.map_err(|source| ResponseError::BadJson { context, source }.into())
			},
			204 => Ok(Disposition::Done(None)),
			301 | 302 => Err(ResponseError::Redirect {
				location: response.header("location").map(str::to_string),
				permanent: status == StatusCode::MOVED_PERMANENTLY,
				context,
			}
			.into()),
			400 => Err(ResponseError::BadRequest { context }.into()),
			401 => {
				// The server repudiated the token; drop it so the next attempt re-auths.
				self.authorizer.clear_access_token();

				if self.authorizer.can_refresh() && !*reauthorized {
					*reauthorized = true;

					Ok(Disposition::Retry {
						reason: "401 status".into(),
						cause: RetryCause::Unauthorized,
						fallback: Error::InvalidToken,
					})
				} else {
					Err(Error::InvalidToken)
				}
			},
			403 => {
				let challenge = response.header("www-authenticate").unwrap_or_default();

				if challenge.contains("insufficient_scope") {
					Err(ResponseError::InsufficientScope { context }.into())
				} else if challenge.contains("invalid_token") {
					Err(Error::InvalidToken)
				} else {
					Err(ResponseError::Forbidden { context }.into())
				}
			},
			404 => Err(ResponseError::NotFound { context }.into()),
			409 => Err(ResponseError::Conflict { context }.into()),
			413 => Err(ResponseError::TooLarge { context }.into()),
			414 => Err(ResponseError::UriTooLong { context }.into()),
			415 => {
				let body = response.json().unwrap_or_default();
				let field = |name: &str| {
					body.get(name).and_then(Value::as_str).map(str::to_string)
				};

				Err(ResponseError::SpecialError {
					context,
					explanation: field("explanation"),
					reason: field("reason"),
					message: field("message"),
				}
				.into())
			},
			429 => Err(ResponseError::TooManyRequests {
				retry_after: response
					.header("retry-after")
					.and_then(|raw| raw.trim().parse::<f64>().ok())
					.map(|seconds| seconds as u64),
				context,
			}
			.into()),
			451 => Err(ResponseError::UnavailableForLegalReasons { context }.into()),
			code if RETRY_STATUSES.contains(&code) => Ok(Disposition::Retry {
				reason: format!("{code} status"),
				cause: RetryCause::ServerError,
				fallback: ResponseError::ServerError { context }.into(),
			}),
			_ => Err(ResponseError::Other { context }.into()),
		}
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("authorizer", &self.authorizer)
			.field("rate_limiter", &self.rate_limiter)
			.finish()
	}
}

fn resolve_url(oauth_url: &Url, path: &str) -> Result<Url> {
	if path.starts_with("http") {
		return Url::parse(path)
			.map_err(|_| Error::invalid_invocation("path is not a valid absolute URL"));
	}

	oauth_url
		.join(path)
		.map_err(|_| Error::invalid_invocation("path cannot be joined onto the OAuth base URL"))
}

fn prepare_params(params: &[(String, String)]) -> Vec<(String, String)> {
	let mut prepared = params.to_vec();

	prepared.push(("raw_json".into(), "1".into()));

	prepared
}

fn prepare_data(data: Option<&BTreeMap<String, String>>) -> Option<BTreeMap<String, String>> {
	data.map(|map| {
		let mut prepared = map.clone();

		prepared.insert("api_type".into(), "json".into());

		prepared
	})
}

fn prepare_json(json: Option<&Value>) -> Option<Value> {
	json.map(|value| match value {
		Value::Object(map) => {
			let mut prepared = map.clone();

			prepared.insert("api_type".into(), Value::String("json".into()));

			Value::Object(prepared)
		},
		other => other.clone(),
	})
}
