use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use url::Url;

use crate::endpoint::Credentials;
use crate::error::ClientError;
use crate::session::SESSION_ID_HEADER;

/// One outbound POST of a serialized RPC request.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub url: Url,
    pub body: Vec<u8>,
    pub session_token: Option<String>,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

/// Raw daemon answer. Either 2xx or the 409 session challenge.
#[derive(Debug, Clone)]
pub struct PostResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl PostResponse {
    pub fn is_session_challenge(&self) -> bool {
        self.status == 409
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// A single network round-trip.
///
/// Implementations must not retry. A 409 is returned as a normal response;
/// any other non-2xx status is an `HttpStatus` error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: PostRequest) -> Result<PostResponse, ClientError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: PostRequest) -> Result<PostResponse, ClientError> {
        let PostRequest {
            url,
            body,
            session_token,
            credentials,
            timeout,
        } = request;

        let mut builder = self
            .http
            .post(url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &session_token {
            builder = builder.header(SESSION_ID_HEADER, token.as_str());
        }
        if let Some(credentials) = &credentials {
            builder = builder.basic_auth(credentials.username(), Some(credentials.password()));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?
            .to_vec();

        tracing::debug!(url = %url, status, bytes = body.len(), "transmission rpc round-trip");

        if status == 409 || (200..=299).contains(&status) {
            Ok(PostResponse {
                status,
                headers,
                body,
            })
        } else {
            Err(ClientError::http_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_to(server: &MockServer) -> PostRequest {
        PostRequest {
            url: Url::parse(&format!("{}/transmission/rpc", server.uri())).unwrap(),
            body: br#"{"method":"session-get","arguments":{}}"#.to_vec(),
            session_token: None,
            credentials: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn sends_json_with_token_and_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transmission/rpc"))
            .and(header("content-type", "application/json"))
            .and(header(SESSION_ID_HEADER, "tok-1"))
            .and(basic_auth("admin", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":"success"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = post_to(&server);
        request.session_token = Some("tok-1".to_string());
        request.credentials = Some(Credentials::new("admin", "secret"));

        let response = HttpTransport::new().post(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"result":"success"}"#);
    }

    #[tokio::test]
    async fn session_challenge_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).insert_header(SESSION_ID_HEADER, "fresh"))
            .mount(&server)
            .await;

        let response = HttpTransport::new().post(post_to(&server)).await.unwrap();
        assert!(response.is_session_challenge());
        assert_eq!(response.header(SESSION_ID_HEADER), Some("fresh"));
    }

    #[tokio::test]
    async fn other_statuses_become_http_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized User"))
            .mount(&server)
            .await;

        let err = HttpTransport::new()
            .post(post_to(&server))
            .await
            .expect_err("401 must surface as an error");
        match err {
            ClientError::HttpStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Unauthorized User");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_daemon_surfaces_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut request = post_to(&server);
        request.timeout = Duration::from_millis(50);
        let err = HttpTransport::new()
            .post(request)
            .await
            .expect_err("request should time out");
        assert!(err.is_transient());
        assert!(err.is_timeout());
    }
}
