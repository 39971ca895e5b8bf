use url::Url;

use crate::OidcError;

/// Query parameters the identity provider appends to the redirect uri.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub state: String,
    pub code: String,
}

impl CallbackResult {
    /// Read `state` and `code` from a callback url. A missing `state` is
    /// reported as [`OidcError::InvalidState`] since nothing can be matched.
    pub fn from_url(callback_url: &Url) -> Result<Self, OidcError> {
        let mut state = None;
        let mut code = None;

        for (key, value) in callback_url.query_pairs() {
            match key.as_ref() {
                "state" if state.is_none() => state = Some(value.into_owned()),
                "code" if code.is_none() => code = Some(value.into_owned()),
                _ => {}
            }
        }

        let state = state.ok_or(OidcError::InvalidState)?;
        let code = code.ok_or(OidcError::MissingCode)?;
        Ok(Self { state, code })
    }
}

/// Check the callback against the state sent with the authorization request and
/// return the authorization code. The state must match byte for byte, and is
/// checked before the code is looked at.
pub fn validate_callback(callback_url: &Url, expected_state: &str) -> Result<String, OidcError> {
    let state = callback_url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value);

    if state.as_deref() != Some(expected_state) {
        return Err(OidcError::InvalidState);
    }

    CallbackResult::from_url(callback_url).map(|callback| callback.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn returns_code_for_matching_state() {
        let code = validate_callback(&url("https://app/callback?state=s1&code=xyz"), "s1").unwrap();
        assert_eq!(code, "xyz");
    }

    #[test]
    fn custom_scheme_callbacks_parse() {
        let callback = url("x-paperless://oidc-callback?code=abc&state=0F9C-11");
        assert_eq!(validate_callback(&callback, "0F9C-11").unwrap(), "abc");
    }

    #[test]
    fn percent_encoded_values_are_decoded_before_comparison() {
        let callback = url("https://app/callback?state=a%2Bb%20c&code=x%2Fy");
        assert_eq!(validate_callback(&callback, "a+b c").unwrap(), "x/y");
    }

    #[test]
    fn any_state_difference_is_rejected() {
        for callback in [
            "https://app/callback?state=WRONG&code=xyz",
            "https://app/callback?state=S1&code=xyz",
            "https://app/callback?state=s1%20&code=xyz",
            "https://app/callback?state=&code=xyz",
            "https://app/callback?code=xyz",
            "https://app/callback",
        ] {
            let result = validate_callback(&url(callback), "s1");
            assert!(matches!(result, Err(OidcError::InvalidState)), "{callback}");
        }
    }

    #[test]
    fn matching_state_without_code_is_missing_code() {
        let result = validate_callback(&url("https://app/callback?state=s1"), "s1");
        assert!(matches!(result, Err(OidcError::MissingCode)));
    }

    #[test]
    fn state_mismatch_wins_over_missing_code() {
        let result = validate_callback(&url("https://app/callback?state=other"), "s1");
        assert!(matches!(result, Err(OidcError::InvalidState)));
    }

    #[test]
    fn from_url_parses_query_params() {
        let callback =
            CallbackResult::from_url(&url("http://localhost/cb?code=abc123&state=st")).unwrap();
        assert_eq!(
            callback,
            CallbackResult {
                state: "st".to_string(),
                code: "abc123".to_string()
            }
        );
    }
}
