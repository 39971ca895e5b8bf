use serde::{Deserialize, Serialize};
use url::Url;

use crate::Provider;

/// The two endpoints this crate needs from an OIDC discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
}

/// Token endpoint response from the identity provider. Only the id token is
/// read; whatever else the provider sends is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenResponse {
    pub id_token: String,
}

/// Backend reply to the provider token exchange. The api token lives at
/// `meta.access_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendTokenResponse {
    pub meta: BackendTokenMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendTokenMeta {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProviderTokenRequest<'a> {
    pub provider: &'a str,
    pub process: &'a str,
    pub token: ProviderToken<'a>,
    pub csrfmiddlewaretoken: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProviderToken<'a> {
    pub client_id: &'a str,
    pub id_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeadlessConfig {
    pub data: HeadlessConfigData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeadlessConfigData {
    pub socialaccount: SocialAccountConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SocialAccountConfig {
    #[serde(default)]
    pub providers: Vec<Provider>,
}
