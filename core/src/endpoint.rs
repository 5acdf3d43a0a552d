use std::fmt;

use url::Url;

use crate::error::EndpointError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9091;
pub const DEFAULT_RPC_PATH: &str = "/transmission/rpc";

/// Location of the daemon's RPC endpoint. Validated once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    path: String,
    url: Url,
}

impl Endpoint {
    pub fn new(
        scheme: &str,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<Self, EndpointError> {
        let scheme = scheme.trim().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(EndpointError::UnsupportedScheme(scheme));
        }
        let host = host.trim().to_string();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort);
        }
        let path = normalize_rpc_path(path);

        // IPv6 literals need brackets inside the authority.
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let url = Url::parse(&format!("{scheme}://{authority}{path}"))?;

        Ok(Self {
            host,
            port,
            path,
            url,
        })
    }

    /// Plain-HTTP endpoint on the default RPC path.
    pub fn http(host: &str, port: u16) -> Result<Self, EndpointError> {
        Self::new("http", host, port, DEFAULT_RPC_PATH)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn normalize_rpc_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_RPC_PATH.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Static HTTP Basic credentials for the daemon.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials are only usable when both halves are present.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Some(Self::new(username, password))
            }
            _ => None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_endpoint_uses_default_rpc_path() {
        let endpoint = Endpoint::http("seedbox.lan", 9091).unwrap();
        assert_eq!(
            endpoint.url().as_str(),
            "http://seedbox.lan:9091/transmission/rpc"
        );
        assert_eq!(endpoint.path(), DEFAULT_RPC_PATH);
    }

    #[test]
    fn path_without_leading_slash_is_normalized() {
        let endpoint = Endpoint::new("https", "example.org", 443, "rpc").unwrap();
        assert_eq!(endpoint.url().as_str(), "https://example.org/rpc");
        assert_eq!(endpoint.path(), "/rpc");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let endpoint = Endpoint::http("::1", 9091).unwrap();
        assert_eq!(endpoint.url().as_str(), "http://[::1]:9091/transmission/rpc");
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(matches!(
            Endpoint::new("ftp", "localhost", 21, "/"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::http("  ", 9091),
            Err(EndpointError::EmptyHost)
        ));
        assert!(matches!(
            Endpoint::http("localhost", 0),
            Err(EndpointError::InvalidPort)
        ));
        assert!(matches!(
            Endpoint::http("bad host", 9091),
            Err(EndpointError::InvalidUrl(_))
        ));
    }

    #[test]
    fn credentials_require_both_parts() {
        assert!(Credentials::from_parts(Some("admin".into()), None).is_none());
        assert!(Credentials::from_parts(None, Some("secret".into())).is_none());
        let creds = Credentials::from_parts(Some("admin".into()), Some("secret".into())).unwrap();
        assert_eq!(creds.username(), "admin");
        assert_eq!(creds.password(), "secret");
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
