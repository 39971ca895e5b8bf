//! Headless OpenID Connect login.
//!
//! Drives a backend that fronts an identity provider through a CSRF-protected
//! headless auth API: fetch the CSRF cookie, resolve the provider's scope from
//! a suppressed redirect, run the authorization-code + PKCE flow in a
//! [`UserAgent`], then trade the id token for the backend's own api token.

mod authorize;
mod callback;
mod client;
mod error;
mod icon;
#[cfg(feature = "local-server")]
mod local_server;
mod pkce;
mod provider;
mod session;
mod types;
mod user_agent;

pub use authorize::build_authorization_url;
pub use callback::{CallbackResult, validate_callback};
pub use client::{LoginStage, OidcClient, OidcClientConfig};
pub use error::{AuthFailure, OidcError};
#[cfg(feature = "local-server")]
pub use local_server::{LocalServerConfig, LoopbackUserAgent};
pub use pkce::PkcePair;
pub use provider::{FLOW_PROVIDER_REDIRECT, FLOW_PROVIDER_TOKEN, Provider};
pub use session::HeadlessSession;
pub use types::{BackendTokenMeta, BackendTokenResponse, Discovery, IdTokenResponse};
pub use user_agent::UserAgent;
