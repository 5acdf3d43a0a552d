use thiserror::Error;

/// Boxed cause carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Longest response body excerpt kept inside an error.
pub const BODY_SNIPPET_MAX_CHARS: usize = 512;

/// Failure of a single `RpcClient::call`.
///
/// The 409 session-token handshake is the only failure the client recovers
/// from on its own; everything else surfaces here so callers can tell
/// transient network trouble apart from a daemon that misbehaves.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, timeout or a broken response stream.
    #[error("failed to reach transmission daemon at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The daemon answered with a non-2xx status.
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The daemon broke the session handshake contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response body was not a valid RPC response document.
    #[error("failed to decode daemon response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl ClientError {
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn http_status(status: u16, body: &[u8]) -> Self {
        Self::HttpStatus {
            status,
            body: body_snippet(body),
        }
    }

    /// Whether retrying the whole call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source
                .downcast_ref::<reqwest::Error>()
                .is_some_and(reqwest::Error::is_timeout),
            _ => false,
        }
    }

    /// HTTP status attached to the error, if the daemon answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration problems detected while building an `Endpoint`.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("host must not be empty")]
    EmptyHost,

    #[error("port must be between 1 and 65535")]
    InvalidPort,

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Lossy UTF-8 excerpt of a response body, bounded in size.
pub(crate) fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut snippet: String = trimmed.chars().take(BODY_SNIPPET_MAX_CHARS).collect();
    snippet.push('…');
    snippet
}
