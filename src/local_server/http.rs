use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::AuthFailure;

use super::target::RedirectTarget;

const RECEIVED_HTML: &str = include_str!("html/received.html");
const ERROR_HTML: &str = include_str!("html/error.html");

type CallbackResult = Result<Url, AuthFailure>;
type CallbackSender = oneshot::Sender<CallbackResult>;
type CallbackReceiver = oneshot::Receiver<CallbackResult>;
type SharedCallbackSender = Arc<Mutex<Option<CallbackSender>>>;

#[derive(Clone)]
pub(super) struct LocalServerState {
    pub(super) target: RedirectTarget,
    pub(super) callback_tx: SharedCallbackSender,
}

pub(super) fn send_callback(callback_tx: &SharedCallbackSender, result: CallbackResult) {
    if let Ok(mut guard) = callback_tx.lock() {
        if let Some(sender) = guard.take() {
            let _ = sender.send(result);
        }
    }
}

/// Hand the raw callback url to the waiting login, whatever its query holds.
/// State and code are checked by the caller; only a provider `error` is
/// turned into a failure here.
pub(super) async fn callback_handler(
    State(state): State<LocalServerState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let LocalServerState { target, callback_tx } = state;

    let callback_url = match target.callback_url(&query.unwrap_or_default()) {
        Ok(url) => url,
        Err(error) => {
            send_callback(&callback_tx, Err(AuthFailure::Failed(error.to_string())));
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_HTML));
        }
    };

    let provider_error = callback_url
        .query_pairs()
        .find(|(key, _)| key == "error")
        .map(|(_, value)| value.into_owned());

    if let Some(error) = provider_error {
        warn!(%error, "identity provider returned an error to the callback");
        let failure = if error == "access_denied" {
            AuthFailure::Cancelled
        } else {
            AuthFailure::Failed(format!("identity provider returned {error}"))
        };
        send_callback(&callback_tx, Err(failure));
        return (StatusCode::BAD_REQUEST, Html(ERROR_HTML));
    }

    debug!(path = callback_url.path(), "received login callback");
    send_callback(&callback_tx, Ok(callback_url));
    (StatusCode::OK, Html(RECEIVED_HTML))
}

pub(super) async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(ERROR_HTML))
}

pub(super) async fn wait_for_callback(
    callback_rx: CallbackReceiver,
    timeout: Option<Duration>,
) -> Result<Url, AuthFailure> {
    let closed = || AuthFailure::Failed("local server stopped before a callback arrived".into());
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, callback_rx)
            .await
            .map_err(|_| AuthFailure::TimedOut { timeout })?
            .map_err(|_| closed())?,
        None => callback_rx.await.map_err(|_| closed())?,
    }
}
