//! Token ownership and the grant-flow state machine.
//!
//! An [`Authorizer`] exclusively owns the `(access_token, refresh_token, scopes,
//! expiration)` record for one authorization and moves it between the
//! [`AuthState`] states. The five grant flows differ only in the parameters they send to
//! the token endpoint; flow selection happens once at construction and
//! [`refresh`](Authorizer::refresh) dispatches on it.
//!
//! Sessions share one authorizer. Refreshing is guarded so concurrent callers observe at
//! most one in-flight token request; losers of the race wait and re-read the fresh state.

// self
use crate::{
	_prelude::*,
	auth::{
		authenticator::Authenticator,
		scope::ScopeSet,
		token::{AuthState, EXPIRY_MARGIN, TokenSecret, TokenSnapshot, TokenState},
	},
	obs::{ExchangeObservation, RequestKind, RequestSpan},
};

/// Device identifier sent when the caller declines per-device tracking, as blessed by
/// Reddit's API documentation.
pub const DEFAULT_DEVICE_ID: &str = "DO_NOT_TRACK_THIS_DEVICE";

const GRANT_INSTALLED_CLIENT: &str = "https://oauth.reddit.com/grants/installed_client";

/// Supplies the one-time passcode appended to a script app's password.
pub trait TwoFactorProvider
where
	Self: Send + Sync,
{
	/// Returns the current OTP, or `None` when the account has no second factor.
	fn one_time_passcode(&self) -> Option<String>;
}
impl<F> TwoFactorProvider for F
where
	F: Fn() -> Option<String> + Send + Sync,
{
	fn one_time_passcode(&self) -> Option<String> {
		self()
	}
}

/// Invoked before every token request; may swap in a refresh token loaded from storage.
pub trait PreRefreshHook
where
	Self: Send + Sync,
{
	/// Observes and optionally replaces the refresh token about to be used.
	fn before_refresh(&self, refresh_token: &mut Option<TokenSecret>);
}

/// Invoked after every successful token request; typically persists the rotated tokens.
pub trait PostRefreshHook
where
	Self: Send + Sync,
{
	/// Observes the freshly issued token state.
	fn after_refresh(&self, snapshot: &TokenSnapshot);
}

enum GrantFlow {
	/// `authorization_code` once via [`Authorizer::authorize`], then `refresh_token`.
	AuthorizationCode,
	/// `client_credentials` for trusted apps, `installed_client` for installed apps.
	ReadOnly { device_id: String },
	/// `password` grant for script apps, with an optional OTP suffix.
	Script {
		username: String,
		password: TokenSecret,
		two_factor: Option<Arc<dyn TwoFactorProvider>>,
	},
	/// `installed_client` grant keyed by a device identifier.
	DeviceId { device_id: String },
	/// Token injected from a browser-flow redirect fragment; cannot refresh.
	Implicit,
}
impl GrantFlow {
	fn label(&self) -> &'static str {
		match self {
			GrantFlow::AuthorizationCode => "authorization_code",
			GrantFlow::ReadOnly { .. } => "read_only",
			GrantFlow::Script { .. } => "script",
			GrantFlow::DeviceId { .. } => "device_id",
			GrantFlow::Implicit => "implicit",
		}
	}
}

/// Owns the tokens for one authorization and keeps them fresh.
pub struct Authorizer {
	authenticator: Arc<Authenticator>,
	flow: GrantFlow,
	state: RwLock<TokenState>,
	refresh_guard: AsyncMutex<()>,
	pre_refresh: Option<Arc<dyn PreRefreshHook>>,
	post_refresh: Option<Arc<dyn PostRefreshHook>>,
}
impl Authorizer {
	/// Creates an authorizer for the authorization-code flow.
	///
	/// Exchange the browser-supplied code with [`authorize`](Self::authorize); afterwards
	/// the authorizer renews itself with the refresh token. Seed a stored refresh token
	/// with [`with_refresh_token`](Self::with_refresh_token) to skip the exchange.
	pub fn authorization_code(authenticator: Arc<Authenticator>) -> Self {
		Self::new(authenticator, GrantFlow::AuthorizationCode)
	}

	/// Creates a read-only authorizer.
	///
	/// Trusted apps obtain application-only tokens via `client_credentials`; installed
	/// apps fall back to the `installed_client` grant with a device identifier.
	pub fn read_only(authenticator: Arc<Authenticator>) -> Self {
		Self::new(
			authenticator,
			GrantFlow::ReadOnly { device_id: DEFAULT_DEVICE_ID.to_string() },
		)
	}

	/// Creates a script-app authorizer for the `password` grant.
	///
	/// Script apps are always trusted; an untrusted authenticator is a misuse.
	pub fn script(
		authenticator: Arc<Authenticator>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Result<Self> {
		if !authenticator.is_trusted() {
			return Err(Error::invalid_invocation(
				"script apps require a trusted authenticator",
			));
		}

		Ok(Self::new(
			authenticator,
			GrantFlow::Script {
				username: username.into(),
				password: TokenSecret::new(password),
				two_factor: None,
			},
		))
	}

	/// Creates an installed-app authorizer for the `installed_client` grant.
	pub fn device_id(authenticator: Arc<Authenticator>) -> Result<Self> {
		if authenticator.is_trusted() {
			return Err(Error::invalid_invocation(
				"the installed_client grant is reserved for untrusted authenticators",
			));
		}

		Ok(Self::new(
			authenticator,
			GrantFlow::DeviceId { device_id: DEFAULT_DEVICE_ID.to_string() },
		))
	}

	/// Creates an authorizer around a token obtained externally via the implicit flow.
	///
	/// Implicit tokens cannot be refreshed; once expired, the caller must run the browser
	/// flow again.
	pub fn implicit(
		authenticator: Arc<Authenticator>,
		access_token: impl Into<String>,
		expires_in: Duration,
		scopes: ScopeSet,
	) -> Result<Self> {
		if authenticator.is_trusted() {
			return Err(Error::invalid_invocation(
				"the implicit flow is reserved for untrusted authenticators",
			));
		}

		let authorizer = Self::new(authenticator, GrantFlow::Implicit);

		*authorizer.state.write() = TokenState {
			access_token: Some(TokenSecret::new(access_token)),
			refresh_token: None,
			scopes: Some(scopes),
			expires_at: Some(OffsetDateTime::now_utc() + expires_in - EXPIRY_MARGIN),
		};

		Ok(authorizer)
	}

	fn new(authenticator: Arc<Authenticator>, flow: GrantFlow) -> Self {
		Self {
			authenticator,
			flow,
			state: RwLock::new(TokenState::default()),
			refresh_guard: AsyncMutex::new(()),
			pre_refresh: None,
			post_refresh: None,
		}
	}

	/// Seeds a refresh token obtained out of band (e.g. loaded from storage).
	pub fn with_refresh_token(self, refresh_token: impl Into<String>) -> Self {
		self.state.write().refresh_token = Some(TokenSecret::new(refresh_token));

		self
	}

	/// Overrides the device identifier for read-only and installed-app flows. No effect on
	/// other flows.
	pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
		match &mut self.flow {
			GrantFlow::ReadOnly { device_id: slot } | GrantFlow::DeviceId { device_id: slot } => {
				*slot = device_id.into();
			},
			_ => {},
		}

		self
	}

	/// Attaches an OTP provider for script apps whose account has a second factor. No
	/// effect on other flows.
	pub fn with_two_factor(mut self, provider: Arc<dyn TwoFactorProvider>) -> Self {
		if let GrantFlow::Script { two_factor, .. } = &mut self.flow {
			*two_factor = Some(provider);
		}

		self
	}

	/// Registers a hook invoked before every token request.
	pub fn with_pre_refresh_hook(mut self, hook: Arc<dyn PreRefreshHook>) -> Self {
		self.pre_refresh = Some(hook);

		self
	}

	/// Registers a hook invoked after every successful token request.
	pub fn with_post_refresh_hook(mut self, hook: Arc<dyn PostRefreshHook>) -> Self {
		self.post_refresh = Some(hook);

		self
	}

	/// Authenticator whose credentials this authorizer exchanges tokens with.
	pub fn authenticator(&self) -> &Arc<Authenticator> {
		&self.authenticator
	}

	/// Computes the lifecycle state against the current clock.
	pub fn auth_state(&self) -> AuthState {
		self.state.read().state_at(OffsetDateTime::now_utc())
	}

	/// Returns true iff an unexpired access token is held.
	pub fn is_valid(&self) -> bool {
		matches!(self.auth_state(), AuthState::Authorized)
	}

	/// Current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.state.read().access_token.clone()
	}

	/// Current refresh token, if any.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.state.read().refresh_token.clone()
	}

	/// Scopes granted to the current access token, if any.
	pub fn scopes(&self) -> Option<ScopeSet> {
		self.state.read().scopes.clone()
	}

	/// Returns true when this authorizer can mint a new access token on its own.
	pub fn can_refresh(&self) -> bool {
		match &self.flow {
			GrantFlow::Implicit => false,
			GrantFlow::AuthorizationCode => self.state.read().refresh_token.is_some(),
			_ => true,
		}
	}

	/// Exchanges a browser-flow authorization code for the initial token pair.
	pub async fn authorize(&self, code: &str) -> Result<()> {
		if !matches!(self.flow, GrantFlow::AuthorizationCode) {
			return Err(Error::invalid_invocation(
				"only authorization-code authorizers may exchange a code",
			));
		}

		let redirect_uri = self.authenticator.redirect_uri()?.to_string();
		let form = vec![
			("grant_type".to_string(), "authorization_code".to_string()),
			("code".to_string(), code.to_string()),
			("redirect_uri".to_string(), redirect_uri),
		];
		let _guard = self.refresh_guard.lock().await;

		self.exchange(form).await
	}

	/// Unconditionally requests a new access token.
	pub async fn refresh(&self) -> Result<()> {
		let _guard = self.refresh_guard.lock().await;

		self.refresh_locked().await
	}

	/// Refreshes only when the current state is not [`AuthState::Authorized`].
	///
	/// Concurrent callers serialize on the guard; whoever wins performs the request and
	/// the rest find a valid token on re-check.
	pub async fn ensure_valid(&self) -> Result<()> {
		if self.is_valid() {
			return Ok(());
		}

		let _guard = self.refresh_guard.lock().await;

		if self.is_valid() {
			return Ok(());
		}

		self.refresh_locked().await
	}

	/// Revokes the held credentials and transitions to [`AuthState::Unauthorized`].
	///
	/// When a refresh token is held it is the one revoked, which invalidates every token
	/// derived from it; otherwise the access token is revoked directly.
	pub async fn revoke(&self) -> Result<()> {
		const KIND: RequestKind = RequestKind::Revoke;

		let observation = ExchangeObservation::start(KIND);
		let span = RequestSpan::new(KIND, self.flow.label());
		let result = span
			.instrument(async move {
				let (token, hint) = {
					let state = self.state.read();

					if let Some(refresh) = &state.refresh_token {
						(refresh.clone(), crate::auth::TokenTypeHint::RefreshToken)
					} else if let Some(access) = &state.access_token {
						(access.clone(), crate::auth::TokenTypeHint::AccessToken)
					} else {
						return Err(Error::invalid_invocation("no token available to revoke"));
					}
				};

				self.authenticator.revoke_token(&token, Some(hint)).await?;
				self.state.write().clear();

				Ok(())
			})
			.await;

		observation.finish_with(&result);

		result
	}

	pub(crate) fn clear_access_token(&self) {
		self.state.write().clear_access_token();
	}

	async fn refresh_locked(&self) -> Result<()> {
		const KIND: RequestKind = RequestKind::AccessToken;

		let observation = ExchangeObservation::start(KIND);
		let span = RequestSpan::new(KIND, self.flow.label());
		let result = span
			.instrument(async move {
				if let Some(hook) = &self.pre_refresh {
					let mut refresh_token = self.state.read().refresh_token.clone();

					hook.before_refresh(&mut refresh_token);

					self.state.write().refresh_token = refresh_token;
				}

				let form = self.grant_parameters()?;

				self.exchange(form).await
			})
			.await;

		observation.finish_with(&result);

		result
	}

	fn grant_parameters(&self) -> Result<Vec<(String, String)>> {
		// Flows that have obtained a refresh token renew with it instead of repeating
		// their initial grant.
		if !matches!(self.flow, GrantFlow::Implicit)
			&& let Some(refresh) = &self.state.read().refresh_token
		{
			return Ok(vec![
				("grant_type".to_string(), "refresh_token".to_string()),
				("refresh_token".to_string(), refresh.expose().to_string()),
			]);
		}

		match &self.flow {
			GrantFlow::AuthorizationCode =>
				Err(Error::invalid_invocation("refresh token not provided")),
			GrantFlow::ReadOnly { device_id } =>
				if self.authenticator.is_trusted() {
					Ok(vec![("grant_type".to_string(), "client_credentials".to_string())])
				} else {
					Ok(installed_client_parameters(device_id))
				},
			GrantFlow::Script { username, password, two_factor } => {
				let password = match two_factor.as_ref().and_then(|tf| tf.one_time_passcode()) {
					Some(otp) => format!("{}:{otp}", password.expose()),
					None => password.expose().to_string(),
				};

				Ok(vec![
					("grant_type".to_string(), "password".to_string()),
					("username".to_string(), username.clone()),
					("password".to_string(), password),
				])
			},
			GrantFlow::DeviceId { device_id } => Ok(installed_client_parameters(device_id)),
			GrantFlow::Implicit =>
				Err(Error::invalid_invocation("implicit authorizers cannot be refreshed")),
		}
	}

	async fn exchange(&self, form: Vec<(String, String)>) -> Result<()> {
		let payload = self.authenticator.request_token(form).await?;
		let scopes = ScopeSet::from_str(&payload.scope).unwrap_or_default();
		let snapshot = {
			let mut state = self.state.write();

			state.access_token = Some(TokenSecret::new(payload.access_token));

			if let Some(refresh) = payload.refresh_token {
				state.refresh_token = Some(TokenSecret::new(refresh));
			}

			state.scopes = Some(scopes);
			state.expires_at =
				Some(OffsetDateTime::now_utc() + Duration::seconds(payload.expires_in)
					- EXPIRY_MARGIN);

			TokenSnapshot::from(&*state)
		};

		if let Some(hook) = &self.post_refresh {
			hook.after_refresh(&snapshot);
		}

		Ok(())
	}
}
impl Debug for Authorizer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authorizer")
			.field("flow", &self.flow.label())
			.field("state", &self.auth_state())
			.finish()
	}
}

fn installed_client_parameters(device_id: &str) -> Vec<(String, String)> {
	vec![
		("grant_type".to_string(), GRANT_INSTALLED_CLIENT.to_string()),
		("device_id".to_string(), device_id.to_string()),
	]
}
