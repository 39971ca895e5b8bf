use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::icon::{fetch_favicon, site_root};

pub const FLOW_PROVIDER_REDIRECT: &str = "provider_redirect";
pub const FLOW_PROVIDER_TOKEN: &str = "provider_token";

/// A social login provider as advertised by the backend's headless config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub flows: Vec<String>,
    pub client_id: String,
    #[serde(rename = "openid_configuration_url", default)]
    pub discovery_url: Option<String>,
}

impl Provider {
    /// Whether this provider can drive the redirect + token login used here.
    pub fn is_usable(&self) -> bool {
        self.supports_flow(FLOW_PROVIDER_REDIRECT)
            && self.supports_flow(FLOW_PROVIDER_TOKEN)
            && self.discovery_url.is_some()
    }

    /// Favicon of the site hosting the provider's discovery document, if it
    /// advertises one that is actually served.
    pub async fn icon_url(&self, client: &Client) -> Option<Url> {
        let discovery = Url::parse(self.discovery_url.as_deref()?).ok()?;
        fetch_favicon(client, &site_root(&discovery)).await
    }

    fn supports_flow(&self, flow: &str) -> bool {
        self.flows.iter().any(|candidate| candidate == flow)
    }
}
