#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use reddit_session::{
	_preludet::*,
	auth::{Authenticator, Authorizer},
	error::ResponseError,
	session::{ApiRequest, Session},
};

const CLIENT_ID: &str = "an-id";
const CLIENT_SECRET: &str = "sekrit";

async fn token_endpoint<'a>(server: &'a MockServer, access_token: &str) -> httpmock::Mock<'a> {
	let body = serde_json::json!({
		"access_token": access_token,
		"token_type": "bearer",
		"expires_in": 3600,
		"scope": "*",
	});

	server
		.mock_async(move |when, then| {
			when.method(POST).path("/api/v1/access_token");
			then.status(200).json_body(body);
		})
		.await
}

fn read_only_session(server: &MockServer) -> Session {
	let authenticator = Arc::new(Authenticator::trusted(
		test_requestor(&server.base_url()),
		CLIENT_ID,
		CLIENT_SECRET,
	));

	Session::new(Arc::new(Authorizer::read_only(authenticator)))
}

#[tokio::test]
async fn read_only_flow_fetches_trophies() {
	let server = MockServer::start_async().await;
	let token = token_endpoint(&server, "app-only-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v1/user/bboe/trophies")
				.header("authorization", "bearer app-only-token")
				.query_param("raw_json", "1");
			then.status(200).json_body(serde_json::json!({"trophies": []}));
		})
		.await;
	let session = read_only_session(&server);
	let body = session
		.request(ApiRequest::get("/api/v1/user/bboe/trophies"))
		.await
		.expect("Read-only trophies request should succeed.")
		.expect("Trophies response should carry a body.");

	token.assert_async().await;
	api.assert_async().await;

	assert!(body.get("trophies").is_some());
	assert!(session.authorizer().is_valid());
}

#[tokio::test]
async fn an_expired_token_is_refreshed_before_the_request_is_sent() {
	let server = MockServer::start_async().await;
	// expires_in equal to the safety margin yields an immediately-expired token.
	let mut stale = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/v1/access_token");
			then.status(200).json_body(serde_json::json!({
				"access_token": "short-lived",
				"token_type": "bearer",
				"expires_in": 10,
				"scope": "*",
			}));
		})
		.await;
	let session = read_only_session(&server);

	session.authorizer().refresh().await.expect("Initial refresh should succeed.");

	assert!(!session.authorizer().is_valid());

	stale.delete_async().await;

	let token = token_endpoint(&server, "fresh-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer fresh-token");
			then.status(200).json_body(serde_json::json!({"name": "bboe"}));
		})
		.await;
	let body = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect("Request with an expired token should transparently refresh.");

	token.assert_async().await;
	api.assert_async().await;

	assert_eq!(body.and_then(|v| v.get("name").cloned()), Some(serde_json::json!("bboe")));
}

#[tokio::test]
async fn a_repudiated_token_triggers_one_reauthorization() {
	let server = MockServer::start_async().await;
	let first_token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("refresh_token", "refresh-1");
			then.status(200).json_body(serde_json::json!({
				"access_token": "token-1",
				"refresh_token": "refresh-2",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "*",
			}));
		})
		.await;
	let second_token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/access_token")
				.x_www_form_urlencoded_tuple("refresh_token", "refresh-2");
			then.status(200).json_body(serde_json::json!({
				"access_token": "token-2",
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "*",
			}));
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer token-1");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer token-2");
			then.status(200).json_body(serde_json::json!({"name": "bboe"}));
		})
		.await;
	let authenticator = Arc::new(Authenticator::trusted(
		test_requestor(&server.base_url()),
		CLIENT_ID,
		CLIENT_SECRET,
	));
	let authorizer =
		Arc::new(Authorizer::authorization_code(authenticator).with_refresh_token("refresh-1"));
	let session = Session::new(authorizer);
	let body = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect("A single 401 should be healed by re-authorization.");

	first_token.assert_async().await;
	second_token.assert_async().await;
	rejected.assert_async().await;
	accepted.assert_async().await;

	assert!(body.is_some());
}

#[tokio::test]
async fn a_second_consecutive_401_surfaces_as_invalid_token() {
	let server = MockServer::start_async().await;
	let token = token_endpoint(&server, "doomed-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me");
			then.status(401);
		})
		.await;
	let session = read_only_session(&server);
	let err = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect_err("Two consecutive 401 responses must fail.");

	assert!(matches!(err, Error::InvalidToken));
	assert_eq!(api.hits_async().await, 2);
	assert_eq!(token.hits_async().await, 2);
}

#[tokio::test]
async fn retryable_server_errors_exhaust_the_attempt_budget() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me");
			then.status(503);
		})
		.await;
	let session = read_only_session(&server);
	let err = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect_err("Persistent 503 responses must surface after the retry budget.");

	assert_eq!(api.hits_async().await, 3);
	assert!(matches!(
		err,
		Error::Response(ResponseError::ServerError { context }) if context.status.as_u16() == 503,
	));
}

#[tokio::test]
async fn connection_failures_are_retried_then_surfaced() {
	let server = MockServer::start_async().await;
	let token = token_endpoint(&server, "app-only-token").await;
	// Bind an ephemeral port and release it so API attempts fail below HTTP while the
	// token endpoint keeps working.
	let closed_port = {
		let listener = std::net::TcpListener::bind("127.0.0.1:0")
			.expect("Ephemeral port should be bindable.");

		listener.local_addr().expect("Bound listener should expose its address.").port()
	};
	let requestor = Arc::new(
		reddit_session::http::Requestor::new(TEST_USER_AGENT)
			.expect("Requestor fixture should build.")
			.with_oauth_url(
				Url::parse(&format!("http://127.0.0.1:{closed_port}"))
					.expect("Closed-port URL should parse."),
			)
			.with_reddit_url(
				Url::parse(&server.base_url()).expect("Mock base URL should parse."),
			),
	);
	let authenticator = Arc::new(Authenticator::trusted(requestor, CLIENT_ID, CLIENT_SECRET));
	let session = Session::new(Arc::new(Authorizer::read_only(authenticator)));
	let err = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect_err("Requests against a closed port must exhaust their retries.");

	token.assert_async().await;

	assert!(matches!(err, Error::Request(_)));
}

#[tokio::test]
async fn rate_limit_headers_pace_the_next_request() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let _api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me");
			then.status(200)
				.header("x-ratelimit-remaining", "60.0")
				.header("x-ratelimit-used", "540")
				.header("x-ratelimit-reset", "300")
				.json_body(serde_json::json!({"name": "bboe"}));
		})
		.await;
	let session = read_only_session(&server);

	session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect("Paced request should succeed.");

	let wait = session
		.rate_limiter()
		.pending_delay_at(Instant::now())
		.expect("A constrained budget should impose a delay.")
		.as_secs_f64();

	assert!((4.0..=5.0).contains(&wait), "Expected a roughly five second delay, got {wait}.");
}

#[tokio::test]
async fn bodiless_responses_return_none() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let deleted = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/v1/me/friends/spez");
			then.status(204);
		})
		.await;
	let empty = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/empty");
			then.status(200);
		})
		.await;
	let session = read_only_session(&server);
	let no_content = session
		.request(ApiRequest::new(Method::DELETE, "/api/v1/me/friends/spez"))
		.await
		.expect("DELETE should succeed.");
	let zero_bytes = session
		.request(ApiRequest::get("/api/v1/empty"))
		.await
		.expect("Zero-byte success should not be a decode error.");

	deleted.assert_async().await;
	empty.assert_async().await;

	assert_eq!(no_content, None);
	assert_eq!(zero_bytes, None);
}

#[tokio::test]
async fn form_bodies_are_stamped_and_sorted_on_the_wire() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/v1/compose")
				.query_param("raw_json", "1")
				.x_www_form_urlencoded_tuple("api_type", "json")
				.x_www_form_urlencoded_tuple("subject", "hi")
				.x_www_form_urlencoded_tuple("text", "hello");
			then.status(200).json_body(serde_json::json!({"json": {"errors": []}}));
		})
		.await;
	let session = read_only_session(&server);

	session
		.request(
			ApiRequest::post("/api/v1/compose").data_entry("text", "hello").data_entry("subject", "hi"),
		)
		.await
		.expect("Form POST should succeed.");

	api.assert_async().await;
}

#[tokio::test]
async fn status_codes_map_to_the_error_taxonomy() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let _not_found = server
		.mock_async(|when, then| {
			when.method(GET).path("/r/missing/about");
			then.status(404);
		})
		.await;
	let _redirect = server
		.mock_async(|when, then| {
			when.method(GET).path("/r/random");
			then.status(302).header("location", "/r/redditdev/hot");
		})
		.await;
	let _forbidden = server
		.mock_async(|when, then| {
			when.method(GET).path("/r/quarantined/about");
			then.status(403).header("www-authenticate", "Bearer realm=\"reddit\", error=\"insufficient_scope\"");
		})
		.await;
	let _throttled = server
		.mock_async(|when, then| {
			when.method(GET).path("/r/busy/new");
			then.status(429).header("retry-after", "7");
		})
		.await;
	let session = read_only_session(&server);

	let err = session.request(ApiRequest::get("/r/missing/about")).await.expect_err("404 must fail.");

	assert!(matches!(err, Error::Response(ResponseError::NotFound { .. })));

	let err = session.request(ApiRequest::get("/r/random")).await.expect_err("302 must fail.");

	assert!(matches!(
		err,
		Error::Response(ResponseError::Redirect { location: Some(ref l), permanent: false, .. })
			if l == "/r/redditdev/hot",
	));

	let err =
		session.request(ApiRequest::get("/r/quarantined/about")).await.expect_err("403 must fail.");

	assert!(matches!(err, Error::Response(ResponseError::InsufficientScope { .. })));

	let err = session.request(ApiRequest::get("/r/busy/new")).await.expect_err("429 must fail.");

	assert!(matches!(
		err,
		Error::Response(ResponseError::TooManyRequests { retry_after: Some(7), .. }),
	));
}

#[tokio::test]
async fn implicit_tokens_cannot_be_reauthorized() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer fragment-token");
			then.status(401);
		})
		.await;
	let authenticator =
		Arc::new(Authenticator::untrusted(test_requestor(&server.base_url()), CLIENT_ID));
	let scopes = "identity".parse().expect("Scope fixture should parse.");
	let authorizer = Arc::new(
		Authorizer::implicit(authenticator, "fragment-token", Duration::hours(1), scopes)
			.expect("Implicit authorizer should build."),
	);
	let session = Session::new(authorizer);
	let err = session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect_err("A 401 on an implicit token must not be retried.");

	assert!(matches!(err, Error::InvalidToken));
	assert_eq!(api.hits_async().await, 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
	let server = MockServer::start_async().await;
	let token = token_endpoint(&server, "shared-token").await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/me").header("authorization", "bearer shared-token");
			then.status(200).json_body(serde_json::json!({"name": "bboe"}));
		})
		.await;
	let authenticator = Arc::new(Authenticator::trusted(
		test_requestor(&server.base_url()),
		CLIENT_ID,
		CLIENT_SECRET,
	));
	let authorizer = Arc::new(Authorizer::read_only(authenticator));
	let first = Session::new(authorizer.clone());
	let second = Session::new(authorizer);
	let (a, b) = tokio::join!(
		first.request(ApiRequest::get("/api/v1/me")),
		second.request(ApiRequest::get("/api/v1/me")),
	);

	a.expect("First concurrent request should succeed.");
	b.expect("Second concurrent request should succeed.");

	assert_eq!(token.hits_async().await, 1, "Concurrent callers must share one refresh.");
	assert_eq!(api.hits_async().await, 2);
}

#[tokio::test]
async fn the_user_agent_identifies_the_crate() {
	let server = MockServer::start_async().await;
	let _token = token_endpoint(&server, "app-only-token").await;
	let user_agent =
		format!("{TEST_USER_AGENT} {}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
	let api = server
		.mock_async(move |when, then| {
			when.method(GET).path("/api/v1/me").header("user-agent", user_agent);
			then.status(200).json_body(serde_json::json!({"name": "bboe"}));
		})
		.await;
	let session = read_only_session(&server);

	session
		.request(ApiRequest::get("/api/v1/me"))
		.await
		.expect("Request with the suffixed user agent should succeed.");

	api.assert_async().await;
}
