//! Loopback [`UserAgent`]: capture the identity provider's redirect on a local
//! HTTP listener. Needs an `http://127.0.0.1:<port>/<path>` style redirect uri
//! registered with the provider.

mod config;
mod http;
mod target;

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;
use url::Url;

use crate::{AuthFailure, OidcError, UserAgent};

pub use config::LocalServerConfig;
use self::http::{
    LocalServerState, callback_handler, fallback_handler, send_callback, wait_for_callback,
};

type Launcher = Box<dyn Fn(&Url) -> Result<(), AuthFailure> + Send + Sync>;

pub struct LoopbackUserAgent {
    config: LocalServerConfig,
    launcher: Launcher,
}

impl fmt::Debug for LoopbackUserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackUserAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LoopbackUserAgent {
    pub fn new(redirect_uri: &str) -> Result<Self, OidcError> {
        let config = LocalServerConfig::from_redirect_uri(redirect_uri)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: LocalServerConfig) -> Self {
        Self {
            config,
            launcher: Box::new(|url| {
                info!(
                    url = %without_query(url),
                    "open the authorization url in a browser to continue"
                );
                Ok(())
            }),
        }
    }

    /// Called with the authorization url once the listener is ready, e.g. to
    /// open the system browser.
    pub fn with_launcher<F>(mut self, launcher: F) -> Self
    where
        F: Fn(&Url) -> Result<(), AuthFailure> + Send + Sync + 'static,
    {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn config(&self) -> &LocalServerConfig {
        &self.config
    }

    pub fn redirect_uri(&self) -> String {
        self.config.redirect_uri()
    }

    async fn listen(&self, authorization_url: &Url) -> Result<Url, AuthFailure> {
        let target = self.config.target();
        let listener = TcpListener::bind((target.host.as_str(), target.port))
            .await
            .map_err(|err| {
                AuthFailure::Failed(format!("cannot listen on {}: {err}", target.redirect_uri()))
            })?;

        let (callback_tx, callback_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let callback_tx = Arc::new(Mutex::new(Some(callback_tx)));

        let state = LocalServerState {
            target: target.clone(),
            callback_tx: Arc::clone(&callback_tx),
        };

        let app = Router::new()
            .route(&target.path, get(callback_handler))
            .fallback(fallback_handler)
            .with_state(state);

        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        let server_handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                send_callback(&callback_tx, Err(AuthFailure::Failed(err.to_string())));
            }
        });

        info!(redirect_uri = %target.redirect_uri(), "waiting for login callback");
        let callback = match (self.launcher)(authorization_url) {
            Ok(()) => wait_for_callback(callback_rx, self.config.timeout).await,
            Err(failure) => Err(failure),
        };

        let _ = shutdown_tx.send(());
        let _ = server_handle.await;

        callback
    }
}

/// The authorization url minus its query, which carries the login state.
fn without_query(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[async_trait]
impl UserAgent for LoopbackUserAgent {
    async fn authenticate(
        &self,
        authorization_url: &Url,
        callback_scheme: &str,
    ) -> Result<Url, AuthFailure> {
        if callback_scheme != "http" {
            return Err(AuthFailure::Failed(format!(
                "loopback listener cannot receive {callback_scheme}:// callbacks"
            )));
        }
        self.listen(authorization_url).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn returns_callback_url_from_browser_redirect() {
        let config = LocalServerConfig::new("127.0.0.1", 18765, "/cb");
        let agent = LoopbackUserAgent::from_config(config).with_launcher(|_| {
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = reqwest::get("http://127.0.0.1:18765/cb?state=s1&code=xyz").await;
            });
            Ok(())
        });

        let authorization_url = Url::parse("https://idp.example/authorize").unwrap();
        let callback = agent.authenticate(&authorization_url, "http").await.unwrap();
        assert_eq!(callback.as_str(), "http://127.0.0.1:18765/cb?state=s1&code=xyz");
    }

    #[tokio::test]
    async fn returns_callback_without_code_for_the_caller_to_reject() {
        let config = LocalServerConfig::new("127.0.0.1", 18769, "/cb");
        let agent = LoopbackUserAgent::from_config(config).with_launcher(|_| {
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = reqwest::get("http://127.0.0.1:18769/cb?state=s1").await;
            });
            Ok(())
        });

        let authorization_url = Url::parse("https://idp.example/authorize").unwrap();
        let callback = agent.authenticate(&authorization_url, "http").await.unwrap();
        assert_eq!(callback.as_str(), "http://127.0.0.1:18769/cb?state=s1");
        assert!(matches!(
            crate::validate_callback(&callback, "s1"),
            Err(OidcError::MissingCode)
        ));
    }

    #[test]
    fn launcher_log_drops_login_state() {
        let url = Url::parse(
            "https://idp.example/authorize?client_id=cid&state=s1&code_challenge=abc",
        )
        .unwrap();
        assert_eq!(without_query(&url).as_str(), "https://idp.example/authorize");
    }

    #[tokio::test]
    async fn access_denied_counts_as_cancellation() {
        let config = LocalServerConfig::new("127.0.0.1", 18766, "/cb");
        let agent = LoopbackUserAgent::from_config(config).with_launcher(|_| {
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let denied = "http://127.0.0.1:18766/cb?error=access_denied&state=s1";
                let _ = reqwest::get(denied).await;
            });
            Ok(())
        });

        let authorization_url = Url::parse("https://idp.example/authorize").unwrap();
        let result = agent.authenticate(&authorization_url, "http").await;
        assert_eq!(result, Err(AuthFailure::Cancelled));
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let timeout = Duration::from_millis(100);
        let config = LocalServerConfig::new("127.0.0.1", 18767, "/cb").with_timeout(timeout);
        let agent = LoopbackUserAgent::from_config(config);

        let authorization_url = Url::parse("https://idp.example/authorize").unwrap();
        let result = agent.authenticate(&authorization_url, "http").await;
        assert_eq!(result, Err(AuthFailure::TimedOut { timeout }));
    }

    #[tokio::test]
    async fn refuses_non_http_callback_schemes() {
        let config = LocalServerConfig::new("127.0.0.1", 18768, "/cb");
        let agent = LoopbackUserAgent::from_config(config);
        let authorization_url = Url::parse("https://idp.example/authorize").unwrap();
        let result = agent.authenticate(&authorization_url, "x-paperless").await;
        assert!(matches!(result, Err(AuthFailure::Failed(_))));
    }
}
