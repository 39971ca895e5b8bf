use async_trait::async_trait;
use url::Url;

use crate::AuthFailure;

/// Drives the identity provider's hosted login page.
///
/// Implementations present `authorization_url` to the user (system browser,
/// webview, loopback listener, manual copy/paste) and resolve with the url the
/// provider redirected to once it hands control back on `callback_scheme`.
/// Dropping the returned future must abandon the attempt.
#[async_trait]
pub trait UserAgent: Send + Sync {
    async fn authenticate(
        &self,
        authorization_url: &Url,
        callback_scheme: &str,
    ) -> Result<Url, AuthFailure>;
}
