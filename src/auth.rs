//! OAuth2 credentials and token lifecycle for Reddit's API.
//!
//! [`Authenticator`] holds the registered app's credentials and talks to the token and
//! revocation endpoints. [`Authorizer`] owns the issued tokens and drives the grant-flow
//! state machine that keeps them fresh.

pub mod authenticator;
pub mod authorizer;
pub mod scope;
pub mod token;

pub use authenticator::*;
pub use authorizer::*;
pub use scope::*;
pub use token::*;
