use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::session::client_builder;
use crate::{
    HeadlessSession, OidcError, PkcePair, Provider, UserAgent, build_authorization_url,
    validate_callback,
};

#[derive(Debug, Clone)]
pub struct OidcClientConfig {
    pub base_url: String,
    pub redirect_uri: String,
    pub timeout: Option<Duration>,
}

impl OidcClientConfig {
    pub fn new(base_url: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            redirect_uri: redirect_uri.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Where a login attempt is. Stages only move forward; any failure ends the
/// attempt in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Idle,
    CsrfFetched,
    ScopeResolved,
    DiscoveryFetched,
    AuthUrlBuilt,
    AwaitingUserAuth,
    CallbackReceived,
    StateValidated,
    CodeExchanged,
    Authenticated,
    Failed,
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CsrfFetched => "csrf_fetched",
            Self::ScopeResolved => "scope_resolved",
            Self::DiscoveryFetched => "discovery_fetched",
            Self::AuthUrlBuilt => "auth_url_built",
            Self::AwaitingUserAuth => "awaiting_user_auth",
            Self::CallbackReceived => "callback_received",
            Self::StateValidated => "state_validated",
            Self::CodeExchanged => "code_exchanged",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Ephemeral state owned by a single `login` call.
struct LoginAttempt<'a> {
    provider: &'a Provider,
    session: HeadlessSession,
    pkce: PkcePair,
    state: String,
    stage: LoginStage,
}

impl<'a> LoginAttempt<'a> {
    fn new(provider: &'a Provider, session: HeadlessSession) -> Self {
        Self {
            provider,
            session,
            pkce: PkcePair::generate(),
            state: Uuid::new_v4().to_string(),
            stage: LoginStage::Idle,
        }
    }

    fn advance(&mut self, stage: LoginStage) {
        debug!(provider = %self.provider.id, from = %self.stage, to = %stage, "login stage");
        self.stage = stage;
    }
}

/// Runs the headless OIDC login against one backend.
///
/// Holds the token from the last successful login and the last provider list.
/// Each instance runs at most one attempt at a time (`login` takes `&mut self`)
/// and every attempt gets its own cookie jar.
#[derive(Debug)]
pub struct OidcClient {
    config: OidcClientConfig,
    base_url: Url,
    redirect_uri: Url,
    callback_scheme: String,
    token: Option<String>,
    providers: Vec<Provider>,
}

impl OidcClient {
    pub fn new(config: OidcClientConfig) -> Result<Self, OidcError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| OidcError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(OidcError::InvalidUrl(config.base_url.clone()));
        }

        let redirect_uri = Url::parse(&config.redirect_uri).map_err(|err| {
            OidcError::InvalidRedirectUrl(format!("{}: {err}", config.redirect_uri))
        })?;
        let callback_scheme = redirect_uri.scheme().to_string();

        Ok(Self {
            config,
            base_url,
            redirect_uri,
            callback_scheme,
            token: None,
            providers: Vec::new(),
        })
    }

    pub fn config(&self) -> &OidcClientConfig {
        &self.config
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn callback_scheme(&self) -> &str {
        &self.callback_scheme
    }

    /// Api token from the last successful login. Cleared as soon as a new
    /// login starts.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Icons of the cached providers, looked up concurrently. Providers
    /// without a reachable icon are left out.
    pub async fn provider_icons(&self) -> Result<Vec<(String, Url)>, OidcError> {
        let client = client_builder(self.config.timeout).build()?;

        let lookups = self.providers.iter().map(|provider| {
            let client = &client;
            async move {
                let icon = provider.icon_url(client).await;
                icon.map(|icon| (provider.id.clone(), icon))
            }
        });
        let icons: Vec<_> = join_all(lookups).await.into_iter().flatten().collect();
        debug!(count = icons.len(), "resolved provider icons");
        Ok(icons)
    }

    fn session(&self) -> Result<HeadlessSession, OidcError> {
        HeadlessSession::new(self.base_url.clone(), self.config.timeout)
    }

    /// Fetch and cache the providers the backend offers for this login.
    pub async fn fetch_providers(&mut self) -> Result<&[Provider], OidcError> {
        self.providers = self.session()?.fetch_providers().await?;
        info!(count = self.providers.len(), "providers available");
        Ok(&self.providers)
    }

    /// Run one full login with `provider` and return the backend api token.
    pub async fn login(
        &mut self,
        provider: &Provider,
        user_agent: &dyn UserAgent,
    ) -> Result<String, OidcError> {
        info!(provider = %provider.id, "starting oidc login");
        self.token = None;

        let mut attempt = LoginAttempt::new(provider, self.session()?);
        match self.run(&mut attempt, user_agent).await {
            Ok(token) => {
                attempt.advance(LoginStage::Authenticated);
                info!(provider = %provider.id, "oidc login succeeded");
                self.token = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                let stage = attempt.stage;
                attempt.advance(LoginStage::Failed);
                if err.is_security_event() {
                    warn!(provider = %provider.id, %stage, "callback state mismatch");
                } else {
                    warn!(provider = %provider.id, %stage, error = %err, "oidc login failed");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        attempt: &mut LoginAttempt<'_>,
        user_agent: &dyn UserAgent,
    ) -> Result<String, OidcError> {
        let provider = attempt.provider;
        let discovery_url = provider
            .discovery_url
            .as_deref()
            .and_then(|url| Url::parse(url).ok())
            .ok_or(OidcError::MissingConfigurationUrl)?;

        let csrf = attempt.session.fetch_csrf().await?;
        attempt.advance(LoginStage::CsrfFetched);

        let scope = attempt.session.fetch_scope(&provider.id, &csrf).await?;
        attempt.advance(LoginStage::ScopeResolved);

        let discovery = attempt.session.fetch_discovery(&discovery_url).await?;
        attempt.advance(LoginStage::DiscoveryFetched);

        let authorization_url = build_authorization_url(
            discovery.authorization_endpoint.as_str(),
            &provider.client_id,
            self.redirect_uri.as_str(),
            &scope,
            &attempt.state,
            &attempt.pkce.challenge,
        )?;
        attempt.advance(LoginStage::AuthUrlBuilt);

        attempt.advance(LoginStage::AwaitingUserAuth);
        let callback = user_agent
            .authenticate(&authorization_url, &self.callback_scheme)
            .await?;
        attempt.advance(LoginStage::CallbackReceived);

        let code = validate_callback(&callback, &attempt.state)?;
        attempt.advance(LoginStage::StateValidated);

        let id_token = attempt
            .session
            .exchange_code(
                &discovery.token_endpoint,
                &provider.client_id,
                &code,
                self.redirect_uri.as_str(),
                &attempt.pkce.verifier,
            )
            .await?;
        attempt.advance(LoginStage::CodeExchanged);

        attempt
            .session
            .exchange_id_token(&provider.id, &provider.client_id, &id_token, &csrf)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_callback_scheme_from_redirect_uri() {
        let config =
            OidcClientConfig::new("https://paperless.example", "x-paperless://oidc-callback");
        let client = OidcClient::new(config).unwrap();
        assert_eq!(client.callback_scheme(), "x-paperless");
        assert_eq!(client.token(), None);
        assert!(client.providers().is_empty());
    }

    #[test]
    fn rejects_malformed_urls() {
        let bad_base = OidcClient::new(OidcClientConfig::new("paperless", "app://cb"));
        assert!(matches!(bad_base, Err(OidcError::InvalidUrl(_))));

        let bad_redirect = OidcClient::new(OidcClientConfig::new("https://p.example", "callback"));
        assert!(matches!(bad_redirect, Err(OidcError::InvalidRedirectUrl(_))));
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(LoginStage::AwaitingUserAuth.to_string(), "awaiting_user_auth");
        assert_eq!(LoginStage::Failed.to_string(), "failed");
    }

    #[test]
    fn attempts_get_fresh_secrets() {
        let provider = Provider {
            id: "github".to_string(),
            display_name: "GitHub".to_string(),
            flows: vec!["provider_redirect".into(), "provider_token".into()],
            client_id: "cid".to_string(),
            discovery_url: Some("https://idp.example/.well-known/openid-configuration".into()),
        };
        let base = Url::parse("https://paperless.example/").unwrap();
        let session = HeadlessSession::new(base, None).unwrap();
        let first = LoginAttempt::new(&provider, session.clone());
        let second = LoginAttempt::new(&provider, session);

        assert_eq!(first.stage, LoginStage::Idle);
        assert_ne!(first.state, second.state);
        assert_ne!(first.pkce.verifier, second.pkce.verifier);
    }
}
