use url::Url;

use crate::OidcError;

#[derive(Debug, Clone)]
pub(super) struct RedirectTarget {
    pub(super) host: String,
    pub(super) port: u16,
    pub(super) path: String,
}

impl RedirectTarget {
    pub(super) fn parse(redirect_uri: &str) -> Result<Self, OidcError> {
        let url = Url::parse(redirect_uri)
            .map_err(|err| OidcError::InvalidRedirectUrl(format!("{redirect_uri}: {err}")))?;
        if url.scheme() != "http" {
            return Err(OidcError::InvalidRedirectUrl(
                "loopback redirect uri must use http scheme".to_string(),
            ));
        }

        let host = url.host_str().ok_or_else(|| {
            OidcError::InvalidRedirectUrl("redirect uri is missing host".to_string())
        })?;

        let port = url.port_or_known_default().ok_or_else(|| {
            OidcError::InvalidRedirectUrl("redirect uri is missing port".to_string())
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
            path: url.path().to_string(),
        })
    }

    pub(super) fn redirect_uri(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    /// Rebuild the url the identity provider redirected the browser to.
    pub(super) fn callback_url(&self, query: &str) -> Result<Url, OidcError> {
        let mut url = Url::parse(&self.redirect_uri())
            .map_err(|err| OidcError::InvalidRedirectUrl(err.to_string()))?;
        if !query.is_empty() {
            url.set_query(Some(query));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::RedirectTarget;
    use crate::OidcError;

    #[test]
    fn parses_redirect_target() {
        let target = RedirectTarget::parse("http://127.0.0.1:8765/callback").unwrap();
        assert_eq!(target.host, "127.0.0.1");
        assert_eq!(target.port, 8765);
        assert_eq!(target.path, "/callback");
    }

    #[test]
    fn custom_schemes_cannot_be_served_locally() {
        let result = RedirectTarget::parse("x-paperless://oidc-callback");
        assert!(matches!(result, Err(OidcError::InvalidRedirectUrl(_))));
    }

    #[test]
    fn callback_url_keeps_raw_query() {
        let target = RedirectTarget::parse("http://localhost:8765/callback").unwrap();
        let url = target.callback_url("state=a%2Bb&code=xyz").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8765/callback?state=a%2Bb&code=xyz");
    }
}
