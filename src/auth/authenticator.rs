//! App credentials and the OAuth endpoints they unlock.
//!
//! An [`Authenticator`] represents one registered Reddit application. Trusted apps (web
//! apps, script apps) hold a client secret and authenticate with full HTTP Basic
//! credentials; untrusted (installed) apps authenticate with their client id and an empty
//! password. The authenticator builds browser authorization URLs locally and performs the
//! token-endpoint and revocation calls on behalf of an
//! [`Authorizer`](crate::auth::Authorizer).

// self
use crate::{
	_prelude::*,
	auth::{scope::ScopeSet, token::TokenSecret},
	error::{OAuthError, ResponseContext, ResponseError},
	http::{RequestBody, Requestor, TransportRequest, TransportResponse, basic_auth},
};

const ACCESS_TOKEN_PATH: &str = "api/v1/access_token";
const AUTHORIZE_PATH: &str = "api/v1/authorize";
const REVOKE_TOKEN_PATH: &str = "api/v1/revoke_token";

/// Requested lifetime of the authorization produced by the browser flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationDuration {
	/// Authorization persists until revoked; the code exchange yields a refresh token.
	Permanent,
	/// Authorization yields a single one-hour access token.
	Temporary,
}
impl AuthorizationDuration {
	/// Returns the query-parameter value for the duration.
	pub fn as_str(self) -> &'static str {
		match self {
			AuthorizationDuration::Permanent => "permanent",
			AuthorizationDuration::Temporary => "temporary",
		}
	}
}
impl Display for AuthorizationDuration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Hint sent alongside a revocation so the server skips token-type discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenTypeHint {
	/// The revoked value is an access token.
	AccessToken,
	/// The revoked value is a refresh token; revoking it invalidates every derived token.
	RefreshToken,
}
impl TokenTypeHint {
	/// Returns the `token_type_hint` form value.
	pub fn as_str(self) -> &'static str {
		match self {
			TokenTypeHint::AccessToken => "access_token",
			TokenTypeHint::RefreshToken => "refresh_token",
		}
	}
}

/// Successful token-endpoint envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenPayload {
	pub access_token: String,
	pub expires_in: i64,
	pub scope: String,
	#[serde(default)]
	pub refresh_token: Option<String>,
}

/// Credentials for one registered Reddit application.
pub struct Authenticator {
	requestor: Arc<Requestor>,
	client_id: String,
	client_secret: Option<TokenSecret>,
	redirect_uri: Option<Url>,
}
impl Authenticator {
	/// Creates credentials for a trusted (confidential) app holding a client secret.
	pub fn trusted(
		requestor: Arc<Requestor>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		Self {
			requestor,
			client_id: client_id.into(),
			client_secret: Some(TokenSecret::new(client_secret)),
			redirect_uri: None,
		}
	}

	/// Creates credentials for an untrusted (installed) app without a secret.
	pub fn untrusted(requestor: Arc<Requestor>, client_id: impl Into<String>) -> Self {
		Self { requestor, client_id: client_id.into(), client_secret: None, redirect_uri: None }
	}

	/// Sets the redirect URI used by the browser authorization and code-exchange flows.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// OAuth2 client identifier of the app.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Returns true when the app holds a client secret.
	pub fn is_trusted(&self) -> bool {
		self.client_secret.is_some()
	}

	/// Requestor shared with the session layer.
	pub fn requestor(&self) -> &Arc<Requestor> {
		&self.requestor
	}

	pub(crate) fn redirect_uri(&self) -> Result<&Url> {
		self.redirect_uri
			.as_ref()
			.ok_or_else(|| Error::invalid_invocation("redirect URI not provided"))
	}

	/// Builds the browser authorization URL. No network traffic is involved.
	///
	/// `implicit` switches the response type from `code` to `token` and is only available
	/// to untrusted apps requesting a temporary authorization.
	pub fn authorization_url(
		&self,
		scopes: &ScopeSet,
		state: &str,
		duration: AuthorizationDuration,
		implicit: bool,
	) -> Result<Url> {
		if implicit && self.is_trusted() {
			return Err(Error::invalid_invocation(
				"only installed apps may use the implicit grant flow",
			));
		}
		if implicit && duration == AuthorizationDuration::Permanent {
			return Err(Error::invalid_invocation(
				"implicit grant authorizations must be temporary",
			));
		}

		let redirect_uri = self.redirect_uri()?;
		let mut url = self
			.requestor
			.reddit_url()
			.join(AUTHORIZE_PATH)
			.map_err(|_| Error::invalid_invocation("reddit URL cannot host the authorize path"))?;

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("client_id", &self.client_id);
			pairs.append_pair("response_type", if implicit { "token" } else { "code" });
			pairs.append_pair("state", state);
			pairs.append_pair("redirect_uri", redirect_uri.as_str());
			pairs.append_pair("duration", duration.as_str());
			pairs.append_pair("scope", &scopes.normalized());
		}

		Ok(url)
	}

	/// Revokes `token` at the revocation endpoint.
	///
	/// The endpoint historically answered 204 and now answers 200; both count as success.
	pub async fn revoke_token(
		&self,
		token: &TokenSecret,
		token_type_hint: Option<TokenTypeHint>,
	) -> Result<()> {
		let mut form = vec![("token".to_string(), token.expose().to_string())];

		if let Some(hint) = token_type_hint {
			form.push(("token_type_hint".into(), hint.as_str().into()));
		}

		let response = self.post_form(REVOKE_TOKEN_PATH, form).await?;

		if response.status == StatusCode::OK || response.status == StatusCode::NO_CONTENT {
			return Ok(());
		}
		if response.status == StatusCode::UNAUTHORIZED {
			return Err(Error::InvalidToken);
		}

		Err(ResponseError::Other { context: context_of(&response) }.into())
	}

	/// Performs one token-endpoint exchange with the provided grant parameters.
	///
	/// A 200 body carrying an `error` field is an OAuth rejection even though the HTTP
	/// exchange succeeded; a 401 means the server repudiated our credentials or token.
	pub(crate) async fn request_token(
		&self,
		form: Vec<(String, String)>,
	) -> Result<TokenPayload> {
		let response = self.post_form(ACCESS_TOKEN_PATH, form).await?;
		let context = context_of(&response);

		match response.status {
			StatusCode::OK => {},
			StatusCode::UNAUTHORIZED => return Err(Error::InvalidToken),
			_ => return Err(ResponseError::Other { context }.into()),
		}

		if let Ok(value) = response.json()
			&& let Some(error) = value.get("error")
		{
			let error = match error {
				serde_json::Value::String(code) => code.clone(),
				other => other.to_string(),
			};
			let description = value
				.get("error_description")
				.and_then(serde_json::Value::as_str)
				.map(str::to_string);
			let mut oauth_error = OAuthError::new(error, description);

			if let Some(scope) = value.get("scope").and_then(serde_json::Value::as_str) {
				oauth_error = oauth_error.with_scope(scope);
			}

			return Err(oauth_error.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ResponseError::TokenParse { context, source }.into())
	}

	async fn post_form(
		&self,
		path: &str,
		form: Vec<(String, String)>,
	) -> Result<TransportResponse> {
		let url = self
			.requestor
			.reddit_url()
			.join(path)
			.map_err(|_| Error::invalid_invocation("reddit URL cannot host the token path"))?;
		let request = TransportRequest::new(Method::POST, url, self.requestor.timeout())
			.header(
				"authorization",
				basic_auth(&self.client_id, self.client_secret.as_ref().map(TokenSecret::expose)),
			)
			.body(RequestBody::Form(form));

		Ok(self.requestor.send(request).await?)
	}
}
impl Debug for Authenticator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authenticator")
			.field("client_id", &self.client_id)
			.field("trusted", &self.is_trusted())
			.field("redirect_uri", &self.redirect_uri.as_ref().map(Url::as_str))
			.finish()
	}
}

fn context_of(response: &TransportResponse) -> ResponseContext {
	ResponseContext { status: response.status, url: response.url.to_string() }
}
