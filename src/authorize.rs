use url::Url;

use crate::OidcError;

/// Assemble the authorization-code request url. Query pairs already present on
/// `auth_endpoint` are kept; the seven OAuth parameters are appended in a fixed
/// order.
pub fn build_authorization_url(
    auth_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
    code_challenge: &str,
) -> Result<Url, OidcError> {
    let mut url = Url::parse(auth_endpoint)
        .map_err(|err| OidcError::InvalidUrl(format!("{auth_endpoint}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(OidcError::InvalidUrl(auth_endpoint.to_string()));
    }

    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", scope)
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "S256");

    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn authorization_url_includes_required_params() {
        let url = build_authorization_url(
            "https://idp.example/authorize",
            "client-id",
            "x-paperless://oidc-callback",
            "openid email",
            "s1",
            "challenge",
        )
        .unwrap();

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.len(), 7);
        assert_eq!(pairs["client_id"], "client-id");
        assert_eq!(pairs["redirect_uri"], "x-paperless://oidc-callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["state"], "s1");
        assert_eq!(pairs["code_challenge"], "challenge");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(url.host_str(), Some("idp.example"));
        assert_eq!(url.path(), "/authorize");
    }

    #[test]
    fn keeps_existing_endpoint_query() {
        let url = build_authorization_url(
            "https://idp.example/authorize?tenant=acme",
            "c",
            "app://cb",
            "openid",
            "s",
            "x",
        )
        .unwrap();
        let keys: Vec<_> = url.query_pairs().map(|(key, _)| key.into_owned()).collect();
        assert_eq!(
            keys,
            [
                "tenant",
                "client_id",
                "redirect_uri",
                "response_type",
                "scope",
                "state",
                "code_challenge",
                "code_challenge_method"
            ]
        );
    }

    #[test]
    fn malformed_endpoint_is_invalid_url() {
        for endpoint in ["not a url", "/authorize", "mailto:someone@idp.example"] {
            let result = build_authorization_url(endpoint, "c", "app://cb", "openid", "s", "x");
            assert!(matches!(result, Err(OidcError::InvalidUrl(_))), "{endpoint}");
        }
    }
}
