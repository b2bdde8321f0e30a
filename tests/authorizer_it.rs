#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use reddit_session::{
	_preludet::*,
	auth::{
		AuthState, Authenticator, Authorizer, PostRefreshHook, PreRefreshHook, TokenSecret,
		TokenSnapshot,
	},
	error::OAuthError,
};

const CLIENT_ID: &str = "an-id";
const CLIENT_SECRET: &str = "sekrit";
// base64("an-id:sekrit") and base64("an-id:"), the Basic credentials for the fixtures.
const TRUSTED_BASIC: &str = "Basic YW4taWQ6c2Vrcml0";
const UNTRUSTED_BASIC: &str = "Basic YW4taWQ6";

fn trusted(server: &MockServer) -> Arc<Authenticator> {
	Arc::new(Authenticator::trusted(test_requestor(&server.base_url()), CLIENT_ID, CLIENT_SECRET))
}

fn untrusted(server: &MockServer) -> Arc<Authenticator> {
	Arc::new(Authenticator::untrusted(test_requestor(&server.base_url()), CLIENT_ID))
}

#[tokio::test]
async fn client_credentials_refresh_authorizes_a_read_only_app() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.header("authorization", TRUSTED_BASIC)
				.x_www_form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(serde_json::json!({
				"access_token": "app-only-token",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "*",
			}));
		})
		.await;
	let authorizer = Authorizer::read_only(trusted(&server));

	assert_eq!(authorizer.auth_state(), AuthState::Unauthorized);

	authorizer.refresh().await.expect("Client credentials refresh should succeed.");
	mock.assert_async().await;

	assert!(authorizer.is_valid());
	assert_eq!(authorizer.access_token().as_ref().map(TokenSecret::expose), Some("app-only-token"));
	assert!(authorizer.scopes().is_some_and(|scopes| scopes.contains("*")));

	// Refreshing again yields the same scope set.
	authorizer.refresh().await.expect("A second refresh should succeed.");

	assert!(authorizer.scopes().is_some_and(|scopes| scopes.contains("*")));
	assert_eq!(mock.hits_async().await, 2);
}

#[tokio::test]
async fn untrusted_read_only_apps_use_the_installed_client_grant() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.header("authorization", UNTRUSTED_BASIC)
				.x_www_form_urlencoded_tuple(
					"grant_type",
					"https://oauth.reddit.com/grants/installed_client",
				)
				.x_www_form_urlencoded_key_exists("device_id");
			then.status(200).json_body(serde_json::json!({
				"access_token": "device-token",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "*",
			}));
		})
		.await;
	let authorizer = Authorizer::read_only(untrusted(&server));

	authorizer.refresh().await.expect("Installed-client refresh should succeed.");
	mock.assert_async().await;

	assert!(authorizer.is_valid());
}

#[tokio::test]
async fn script_refresh_sends_the_otp_suffixed_password() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("grant_type", "password")
				.x_www_form_urlencoded_tuple("username", "a-user")
				.x_www_form_urlencoded_tuple("password", "a-password:123456");
			then.status(200).json_body(serde_json::json!({
				"access_token": "script-token",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "identity read",
			}));
		})
		.await;
	let authorizer = Authorizer::script(trusted(&server), "a-user", "a-password")
		.expect("Script authorizer should accept a trusted authenticator.")
		.with_two_factor(Arc::new(|| Some("123456".to_string())));

	authorizer.refresh().await.expect("Script refresh should succeed.");
	mock.assert_async().await;

	assert!(authorizer.is_valid());
	assert!(authorizer.scopes().is_some_and(|scopes| scopes.contains("identity")));
}

#[tokio::test]
async fn oauth_error_bodies_surface_with_the_literal_none_dropped() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v1/access_token");
			then.status(200).json_body(serde_json::json!({
				"error": "invalid_grant",
				"error_description": "None",
			}));
		})
		.await;
	let authorizer = Authorizer::read_only(trusted(&server));
	let err = authorizer.refresh().await.expect_err("An OAuth error body must fail the refresh.");

	match err {
		Error::OAuth(OAuthError { error, description, .. }) => {
			assert_eq!(error, "invalid_grant");
			assert_eq!(description, None);
		},
		other => panic!("Expected an OAuth error, got {other:?}."),
	}
}

#[tokio::test]
async fn unauthorized_token_endpoint_responses_repudiate_the_token() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v1/access_token");
			then.status(401);
		})
		.await;
	let authorizer = Authorizer::read_only(trusted(&server));
	let err = authorizer.refresh().await.expect_err("A 401 from the token endpoint must fail.");

	assert!(matches!(err, Error::InvalidToken));
}

#[tokio::test]
async fn refresh_rotates_tokens_only_when_the_server_returns_a_new_one() {
	let server = MockServer::start_async().await;
	let mut first = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("grant_type", "refresh_token")
				.x_www_form_urlencoded_tuple("refresh_token", "refresh-1");
			then.status(200).json_body(serde_json::json!({
				"access_token": "access-1",
				"refresh_token": "refresh-2",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "identity",
			}));
		})
		.await;
	let authorizer =
		Authorizer::authorization_code(trusted(&server)).with_refresh_token("refresh-1");

	authorizer.refresh().await.expect("First refresh should rotate the token pair.");
	first.assert_async().await;
	first.delete_async().await;

	assert_eq!(authorizer.refresh_token().as_ref().map(TokenSecret::expose), Some("refresh-2"));

	// The follow-up response omits refresh_token; the held one must persist.
	let second = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("refresh_token", "refresh-2");
			then.status(200).json_body(serde_json::json!({
				"access_token": "access-2",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "identity",
			}));
		})
		.await;

	authorizer.refresh().await.expect("Second refresh should reuse the rotated token.");
	second.assert_async().await;

	assert_eq!(authorizer.refresh_token().as_ref().map(TokenSecret::expose), Some("refresh-2"));
	assert_eq!(authorizer.access_token().as_ref().map(TokenSecret::expose), Some("access-2"));
}

#[tokio::test]
async fn authorize_exchanges_a_code_for_the_initial_token_pair() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("grant_type", "authorization_code")
				.x_www_form_urlencoded_tuple("code", "browser-code")
				.x_www_form_urlencoded_tuple("redirect_uri", "https://example.com/callback");
			then.status(200).json_body(serde_json::json!({
				"access_token": "code-access",
				"refresh_token": "code-refresh",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "identity",
			}));
		})
		.await;
	let authenticator = Arc::new(
		Authenticator::trusted(test_requestor(&server.base_url()), CLIENT_ID, CLIENT_SECRET)
			.with_redirect_uri(
				Url::parse("https://example.com/callback").expect("Redirect fixture should parse."),
			),
	);
	let authorizer = Authorizer::authorization_code(authenticator);

	assert!(!authorizer.can_refresh());

	authorizer.authorize("browser-code").await.expect("Code exchange should succeed.");
	mock.assert_async().await;

	assert!(authorizer.is_valid());
	assert!(authorizer.can_refresh());
}

struct LoadStoredToken;
impl PreRefreshHook for LoadStoredToken {
	fn before_refresh(&self, refresh_token: &mut Option<TokenSecret>) {
		*refresh_token = Some(TokenSecret::new("stored-refresh"));
	}
}

struct CaptureSnapshot(Mutex<Option<TokenSnapshot>>);
impl PostRefreshHook for CaptureSnapshot {
	fn after_refresh(&self, snapshot: &TokenSnapshot) {
		*self.0.lock() = Some(snapshot.clone());
	}
}

#[tokio::test]
async fn refresh_hooks_load_and_persist_tokens() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("refresh_token", "stored-refresh");
			then.status(200).json_body(serde_json::json!({
				"access_token": "hooked-access",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "identity",
			}));
		})
		.await;
	let capture = Arc::new(CaptureSnapshot(Mutex::new(None)));
	let authorizer = Authorizer::authorization_code(trusted(&server))
		.with_pre_refresh_hook(Arc::new(LoadStoredToken))
		.with_post_refresh_hook(capture.clone());

	authorizer.refresh().await.expect("Hooked refresh should succeed.");
	mock.assert_async().await;

	let snapshot = capture.0.lock().clone().expect("Post-refresh hook should have observed state.");

	assert_eq!(snapshot.access_token.as_ref().map(TokenSecret::expose), Some("hooked-access"));
	assert_eq!(snapshot.refresh_token.as_ref().map(TokenSecret::expose), Some("stored-refresh"));
}

#[tokio::test]
async fn revoking_prefers_the_refresh_token_and_clears_all_state() {
	let server = MockServer::start_async().await;
	let revoke = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/revoke_token")
				.x_www_form_urlencoded_tuple("token", "refresh-1")
				.x_www_form_urlencoded_tuple("token_type_hint", "refresh_token");
			then.status(204);
		})
		.await;
	let authorizer =
		Authorizer::authorization_code(trusted(&server)).with_refresh_token("refresh-1");

	authorizer.revoke().await.expect("Revocation should succeed.");
	revoke.assert_async().await;

	assert_eq!(authorizer.auth_state(), AuthState::Unauthorized);
	assert!(authorizer.refresh_token().is_none());

	// Revoking again is a misuse; there is nothing left to revoke.
	let err = authorizer.revoke().await.expect_err("Revoking twice must fail.");

	assert!(matches!(err, Error::InvalidInvocation { .. }));
}
