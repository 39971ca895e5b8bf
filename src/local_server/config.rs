use std::time::Duration;

use crate::OidcError;

use super::target::RedirectTarget;

#[derive(Debug, Clone)]
pub struct LocalServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout: Option<Duration>,
}

impl LocalServerConfig {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: normalize_path(path.into()),
            timeout: None,
        }
    }

    pub fn from_redirect_uri(redirect_uri: &str) -> Result<Self, OidcError> {
        let target = RedirectTarget::parse(redirect_uri)?;
        Ok(Self::new(target.host, target.port, target.path))
    }

    pub fn redirect_uri(&self) -> String {
        self.target().redirect_uri()
    }

    pub(super) fn target(&self) -> RedirectTarget {
        RedirectTarget {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn normalize_path(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::LocalServerConfig;

    #[test]
    fn local_server_config_normalizes_path() {
        let config = LocalServerConfig::new("127.0.0.1", 8765, "callback");
        assert_eq!(config.path, "/callback");
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:8765/callback");
    }

    #[test]
    fn from_redirect_uri_round_trips() {
        let config =
            LocalServerConfig::from_redirect_uri("http://localhost:1455/auth/callback").unwrap();
        assert_eq!(config.port, 1455);
        assert_eq!(config.redirect_uri(), "http://localhost:1455/auth/callback");
    }
}
