//! Token secrets and the authorizer's token state record.

// self
use crate::{_prelude::*, auth::scope::ScopeSet};

/// Safety margin subtracted from `expires_in` so a token is never used at the wire just as
/// it lapses server-side.
pub const EXPIRY_MARGIN: Duration = Duration::seconds(10);

/// Bearer credential minted by the token endpoint.
///
/// The wrapper keeps raw token material out of logs; formatting renders only the token's
/// length. The session stamps requests with [`bearer`](Self::bearer) while the token and
/// revocation endpoints read the raw value through [`expose`](Self::expose).
#[derive(Clone)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token received from the server or seeded by the caller.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token material. Callers must not log the returned string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value carrying this token.
	pub fn bearer(&self) -> String {
		format!("bearer {}", self.0)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({} bytes)", self.0.len())
	}
}

/// Lifecycle state of an authorizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
	/// No access token is held.
	Unauthorized,
	/// An access token is held and has not reached its expiry margin.
	Authorized,
	/// The held access token passed its expiry margin and must be refreshed before use.
	Expired,
}

/// The four fields set atomically from one token-endpoint response.
///
/// `expires_at` already has [`EXPIRY_MARGIN`] subtracted; [`state_at`](Self::state_at)
/// therefore compares against the bare instant.
#[derive(Clone, Debug, Default)]
pub struct TokenState {
	/// Current access token, when one has been issued.
	pub access_token: Option<TokenSecret>,
	/// Long-lived refresh token; persists across refreshes unless the server rotates it.
	pub refresh_token: Option<TokenSecret>,
	/// Scopes granted to the current access token.
	pub scopes: Option<ScopeSet>,
	/// Margin-adjusted expiry of the current access token.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenState {
	/// Computes the lifecycle state at a given instant.
	pub fn state_at(&self, instant: OffsetDateTime) -> AuthState {
		if self.access_token.is_none() {
			return AuthState::Unauthorized;
		}

		match self.expires_at {
			Some(expires_at) if expires_at > instant => AuthState::Authorized,
			_ => AuthState::Expired,
		}
	}

	/// Drops the access token while retaining any refresh token, scopes, and expiry.
	pub fn clear_access_token(&mut self) {
		self.access_token = None;
	}

	/// Drops every field, returning to [`AuthState::Unauthorized`].
	pub fn clear(&mut self) {
		*self = Self::default();
	}
}

/// Read-only view of a [`TokenState`] handed to refresh hooks.
#[derive(Clone, Debug)]
pub struct TokenSnapshot {
	/// Current access token.
	pub access_token: Option<TokenSecret>,
	/// Current refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Scopes granted to the current access token.
	pub scopes: Option<ScopeSet>,
	/// Margin-adjusted expiry of the current access token.
	pub expires_at: Option<OffsetDateTime>,
}
impl From<&TokenState> for TokenSnapshot {
	fn from(state: &TokenState) -> Self {
		Self {
			access_token: state.access_token.clone(),
			refresh_token: state.refresh_token.clone(),
			scopes: state.scopes.clone(),
			expires_at: state.expires_at,
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn token_material_stays_out_of_debug_output() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(12 bytes)");
		assert_eq!(secret.bearer(), "bearer super-secret");
		assert_eq!(secret.expose(), "super-secret");
	}

	#[test]
	fn state_transitions_cover_all_states() {
		let mut state = TokenState::default();

		assert_eq!(state.state_at(macros::datetime!(2025-01-01 00:00 UTC)), AuthState::Unauthorized);

		state.access_token = Some(TokenSecret::new("token"));
		state.expires_at = Some(macros::datetime!(2025-01-01 01:00 UTC));

		assert_eq!(state.state_at(macros::datetime!(2025-01-01 00:30 UTC)), AuthState::Authorized);
		assert_eq!(state.state_at(macros::datetime!(2025-01-01 01:00 UTC)), AuthState::Expired);
	}

	#[test]
	fn clearing_access_token_retains_refresh_token() {
		let mut state = TokenState {
			access_token: Some(TokenSecret::new("access")),
			refresh_token: Some(TokenSecret::new("refresh")),
			scopes: None,
			expires_at: Some(OffsetDateTime::now_utc()),
		};

		state.clear_access_token();

		assert!(state.access_token.is_none());
		assert_eq!(state.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));

		state.clear();

		assert!(state.refresh_token.is_none());
	}
}
