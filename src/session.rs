use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    Client, ClientBuilder, RequestBuilder, Response,
    cookie::{CookieStore, Jar},
    StatusCode,
    header::{ACCEPT, HeaderValue, LOCATION},
    redirect,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{
    BackendTokenResponse, HeadlessConfig, IdTokenResponse, ProviderToken, ProviderTokenRequest,
};
use crate::{Discovery, OidcError, Provider};

const LOGIN_PAGE_PATH: &str = "accounts/login";
const PROVIDER_REDIRECT_PATH: &str = "api/auth/headless/browser/v1/auth/provider/redirect";
const PROVIDER_TOKEN_PATH: &str = "api/auth/headless/app/v1/auth/provider/token";
const CONFIG_PATH: &str = "api/auth/headless/app/v1/config";

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";
const CSRF_FIELD: &str = "csrfmiddlewaretoken";
const PROCESS_LOGIN: &str = "login";

/// Redirect handling for a single backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Redirects {
    Follow,
    /// Hand the 3xx response back untouched so its `Location` can be read.
    Suppress,
}

/// HTTP plumbing for one login attempt against a headless-auth backend.
///
/// Every backend request goes through the same cookie jar, which holds the
/// session cookie the backend pairs with the CSRF token. Create one session per
/// attempt and never share it between concurrent attempts.
#[derive(Debug, Clone)]
pub struct HeadlessSession {
    base_url: Url,
    jar: Arc<Jar>,
    follow: Client,
    suppress: Client,
    detached: Client,
}

impl HeadlessSession {
    pub fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, OidcError> {
        let jar = Arc::new(Jar::default());
        let follow = client_builder(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let suppress = client_builder(timeout)
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::none())
            .build()?;
        let detached = client_builder(timeout).build()?;

        Ok(Self {
            base_url: with_trailing_slash(base_url),
            jar,
            follow,
            suppress,
            detached,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn client(&self, redirects: Redirects) -> &Client {
        match redirects {
            Redirects::Follow => &self.follow,
            Redirects::Suppress => &self.suppress,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, OidcError> {
        self.base_url
            .join(path)
            .map_err(|err| OidcError::InvalidUrl(format!("{}{path}: {err}", self.base_url)))
    }

    /// Value of the named cookie the jar would send to the base url.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let header = header.to_str().ok()?;
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    pub async fn fetch_csrf(&self) -> Result<String, OidcError> {
        let url = self.endpoint(LOGIN_PAGE_PATH)?;
        info!(%url, "fetching csrf cookie");
        let response = send(self.client(Redirects::Follow).get(url)).await?;
        debug!(status = %response.status(), "login page responded");

        match self.cookie(CSRF_COOKIE) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                warn!("login page response did not set a csrf cookie");
                Err(OidcError::MissingCsrf)
            }
        }
    }

    /// Start the backend's provider redirect and read `scope` off the
    /// suppressed redirect's `Location`.
    pub async fn fetch_scope(
        &self,
        provider_id: &str,
        csrf_token: &str,
    ) -> Result<String, OidcError> {
        let url = self.endpoint(PROVIDER_REDIRECT_PATH)?;
        info!(provider = provider_id, "resolving scope from provider redirect");

        let form = [
            ("provider", provider_id),
            ("callback_url", self.base_url.as_str()),
            ("process", PROCESS_LOGIN),
            (CSRF_FIELD, csrf_token),
        ];
        let request = self
            .client(Redirects::Suppress)
            .post(url.clone())
            .header(CSRF_HEADER, csrf_header(csrf_token)?)
            .form(&form);
        let response = send(request).await?;

        let status = response.status();
        if !is_redirect(status) {
            warn!(%status, "provider redirect endpoint did not redirect");
            return Err(OidcError::MissingScope);
        }

        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
        else {
            warn!(%status, "redirect response has no location header");
            return Err(OidcError::MissingScope);
        };

        let Ok(location) = url.join(location) else {
            warn!(location, "redirect location is not a url");
            return Err(OidcError::MissingScope);
        };

        let scope = location
            .query_pairs()
            .find(|(key, _)| key == "scope")
            .map(|(_, value)| value.into_owned())
            .filter(|scope| !scope.is_empty());

        match scope {
            Some(scope) => {
                debug!(%scope, "resolved provider scope");
                Ok(scope)
            }
            None => {
                warn!(host = location.host_str(), "redirect location has no scope parameter");
                Err(OidcError::MissingScope)
            }
        }
    }

    pub async fn fetch_discovery(&self, url: &Url) -> Result<Discovery, OidcError> {
        info!(%url, "fetching openid configuration");
        let response = send(self.client(Redirects::Follow).get(url.clone())).await?;
        let discovery: Discovery = decode_json(response).await?;
        debug!(
            authorization = %discovery.authorization_endpoint,
            token = %discovery.token_endpoint,
            "resolved openid configuration"
        );
        Ok(discovery)
    }

    /// Trade the authorization code for an id token at the identity provider.
    /// This request carries neither the backend's cookies nor its CSRF token.
    pub async fn exchange_code(
        &self,
        token_endpoint: &Url,
        client_id: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<String, OidcError> {
        info!(url = %token_endpoint, "exchanging authorization code");
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];
        let request = self
            .detached
            .post(token_endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(&form);
        let token: IdTokenResponse = decode_json(send(request).await?).await?;
        Ok(token.id_token)
    }

    pub async fn exchange_id_token(
        &self,
        provider_id: &str,
        client_id: &str,
        id_token: &str,
        csrf_token: &str,
    ) -> Result<String, OidcError> {
        let url = self.endpoint(PROVIDER_TOKEN_PATH)?;
        info!(provider = provider_id, "exchanging id token with backend");
        let payload = ProviderTokenRequest {
            provider: provider_id,
            process: PROCESS_LOGIN,
            token: ProviderToken {
                client_id,
                id_token,
            },
            csrfmiddlewaretoken: csrf_token,
        };
        let request = self
            .client(Redirects::Follow)
            .post(url)
            .header(CSRF_HEADER, csrf_header(csrf_token)?)
            .json(&payload);
        let response: BackendTokenResponse = decode_json(send(request).await?).await?;
        Ok(response.meta.access_token)
    }

    /// Usable providers from the backend's headless config. A backend that
    /// does not serve the config yields an empty list.
    pub async fn fetch_providers(&self) -> Result<Vec<Provider>, OidcError> {
        let url = self.endpoint(CONFIG_PATH)?;
        info!(%url, "fetching providers");
        let response = send(self.client(Redirects::Follow).get(url)).await?;

        match decode_json::<HeadlessConfig>(response).await {
            Ok(config) => {
                let providers: Vec<_> = config
                    .data
                    .socialaccount
                    .providers
                    .into_iter()
                    .filter(Provider::is_usable)
                    .collect();
                debug!(count = providers.len(), "usable providers");
                Ok(providers)
            }
            Err(err @ (OidcError::HttpStatus { .. } | OidcError::InvalidResponse { .. })) => {
                info!(error = %err, "headless config unavailable, no providers offered");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

pub(crate) fn client_builder(timeout: Option<Duration>) -> ClientBuilder {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
}

/// 3xx codes that carry a `Location`; 304 and friends do not count.
fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn csrf_header(token: &str) -> Result<HeaderValue, OidcError> {
    HeaderValue::from_str(token).map_err(|_| OidcError::InvalidHeader {
        name: CSRF_HEADER.to_string(),
        value: token.to_string(),
    })
}

async fn send(builder: RequestBuilder) -> Result<Response, OidcError> {
    let (client, request) = builder.build_split();
    // Headers are validated up front, so a builder error here is the body.
    let request = request.map_err(|err| {
        if err.is_builder() {
            OidcError::FormBodyEncodingFailed(err.to_string())
        } else {
            OidcError::Http(err)
        }
    })?;
    debug!(method = %request.method(), url = %request.url(), "sending request");
    Ok(client.execute(request).await?)
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, OidcError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(OidcError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| OidcError::InvalidResponse {
        message: err.to_string(),
        body,
    })
}
