use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoint::{Credentials, Endpoint};
use crate::error::{ClientError, body_snippet};
use crate::session::{SESSION_ID_HEADER, SessionTokens};
use crate::transport::{HttpTransport, PostRequest, PostResponse, Transport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outgoing RPC document: `{"method", "arguments", "tag"?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    method: String,
    arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<i64>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Map::new(),
            tag: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attach `value` to a single argument key.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Any explicit tag is sent, including zero.
    pub fn with_tag(mut self, tag: i64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    pub fn tag(&self) -> Option<i64> {
        self.tag
    }
}

/// Daemon reply. `result` is `"success"` or a failure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Empty when the daemon omitted it; reported as "Unknown error".
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<i64>,
}

impl RpcResponse {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }

    /// The daemon's failure description, `None` on success.
    pub fn failure_reason(&self) -> Option<&str> {
        if self.is_success() {
            None
        } else if self.result.trim().is_empty() {
            Some("Unknown error")
        } else {
            Some(&self.result)
        }
    }
}

/// Session-token aware client for one daemon endpoint.
///
/// Every call is a single POST, plus exactly one retry when the daemon
/// answers with the 409 session challenge.
#[derive(Debug, Clone)]
pub struct RpcClient<T = HttpTransport> {
    endpoint: Endpoint,
    credentials: Option<Credentials>,
    tokens: SessionTokens,
    transport: T,
    timeout: Duration,
}

impl RpcClient<HttpTransport> {
    pub fn new(endpoint: Endpoint, credentials: Option<Credentials>) -> Self {
        Self::with_transport(endpoint, credentials, HttpTransport::new())
    }
}

impl<T: Transport> RpcClient<T> {
    pub fn with_transport(endpoint: Endpoint, credentials: Option<Credentials>, transport: T) -> Self {
        Self {
            endpoint,
            credentials,
            tokens: SessionTokens::new(),
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Share a token slot with other clients talking to the same daemon.
    pub fn with_tokens(mut self, tokens: SessionTokens) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the request from its parts and `call` it. `tag` is sent even when 0.
    pub async fn call_method(
        &self,
        method: &str,
        arguments: Map<String, Value>,
        tag: Option<i64>,
    ) -> Result<RpcResponse, ClientError> {
        let mut request = RpcRequest::new(method).with_arguments(arguments);
        if let Some(tag) = tag {
            request = request.with_tag(tag);
        }
        self.call(&request).await
    }

    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {e}")))?;

        let first = self
            .transport
            .post(self.post_request(body.clone(), self.tokens.current()))
            .await?;

        let response = if first.is_session_challenge() {
            let token = first
                .header(SESSION_ID_HEADER)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    ClientError::Protocol(
                        "daemon returned 409 without a refreshed session token".to_string(),
                    )
                })?
                .to_string();

            if self.tokens.update(token.clone()) {
                tracing::info!(
                    method = request.method(),
                    endpoint = %self.endpoint,
                    "transmission session token refreshed"
                );
            }

            let retried = self
                .transport
                .post(self.post_request(body, Some(token)))
                .await?;
            if retried.is_session_challenge() {
                return Err(ClientError::http_status(retried.status, &retried.body));
            }
            retried
        } else {
            first
        };

        decode_response(request.method(), response)
    }

    fn post_request(&self, body: Vec<u8>, session_token: Option<String>) -> PostRequest {
        PostRequest {
            url: self.endpoint.url().clone(),
            body,
            session_token,
            credentials: self.credentials.clone(),
            timeout: self.timeout,
        }
    }
}

fn decode_response(method: &str, response: PostResponse) -> Result<RpcResponse, ClientError> {
    let decoded: RpcResponse =
        serde_json::from_slice(&response.body).map_err(|source| ClientError::Decode {
            source,
            body: body_snippet(&response.body),
        })?;
    tracing::debug!(
        method,
        status = response.status,
        result = decoded.result.as_str(),
        "transmission rpc completed"
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    enum Scripted {
        Reply(u16, Option<&'static str>, &'static str),
        Refused,
    }

    /// Replays a fixed script of responses and records what was sent.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        seen: Mutex<Vec<PostRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn posts(&self) -> Vec<PostRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, request: PostRequest) -> Result<PostResponse, ClientError> {
            let url = request.url.to_string();
            self.seen.lock().unwrap().push(request);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted");
            match step {
                Scripted::Refused => Err(ClientError::transport(
                    url,
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
                )),
                Scripted::Reply(status, token, body) => {
                    let mut headers = HeaderMap::new();
                    if let Some(token) = token {
                        headers.insert(session_header(), HeaderValue::from_static(token));
                    }
                    Ok(PostResponse {
                        status,
                        headers,
                        body: body.as_bytes().to_vec(),
                    })
                }
            }
        }
    }

    /// Behaves like a daemon: 409 unless the caller presents `valid_token`.
    struct ChallengingTransport {
        valid_token: &'static str,
        posts: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ChallengingTransport {
        async fn post(&self, request: PostRequest) -> Result<PostResponse, ClientError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let mut headers = HeaderMap::new();
            if request.session_token.as_deref() == Some(self.valid_token) {
                return Ok(PostResponse {
                    status: 200,
                    headers,
                    body: br#"{"result":"success","arguments":{}}"#.to_vec(),
                });
            }
            headers.insert(session_header(), HeaderValue::from_static(self.valid_token));
            Ok(PostResponse {
                status: 409,
                headers,
                body: Vec::new(),
            })
        }
    }

    fn session_header() -> HeaderName {
        HeaderName::from_static("x-transmission-session-id")
    }

    const SUCCESS_EMPTY_TORRENTS: &str = r#"{"result":"success","arguments":{"torrents":[]}}"#;

    fn endpoint() -> Endpoint {
        Endpoint::http("localhost", 9091).unwrap()
    }

    fn scripted(script: Vec<Scripted>) -> RpcClient<ScriptedTransport> {
        RpcClient::with_transport(endpoint(), None, ScriptedTransport::new(script))
    }

    #[test]
    fn request_serializes_zero_tag_and_empty_arguments() {
        let request = RpcRequest::new("session-stats").with_tag(0);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "method": "session-stats", "arguments": {}, "tag": 0 })
        );

        let untagged = RpcRequest::new("torrent-start").with_argument("ids", json!([7]));
        assert_eq!(
            serde_json::to_value(&untagged).unwrap(),
            json!({ "method": "torrent-start", "arguments": { "ids": [7] } })
        );
    }

    #[test]
    fn response_failure_reason_reports_daemon_message() {
        let ok: RpcResponse = serde_json::from_str(SUCCESS_EMPTY_TORRENTS).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.failure_reason(), None);

        let failed: RpcResponse =
            serde_json::from_str(r#"{"result":"invalid or corrupt torrent file"}"#).unwrap();
        assert!(failed.arguments.is_empty());
        assert_eq!(
            failed.failure_reason(),
            Some("invalid or corrupt torrent file")
        );
    }

    #[tokio::test]
    async fn success_without_challenge_posts_once() {
        let client = scripted(vec![Scripted::Reply(200, None, SUCCESS_EMPTY_TORRENTS)]);

        let response = client.call(&RpcRequest::new("torrent-get")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.arguments["torrents"], json!([]));
        let posts = client.transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].session_token, None);
    }

    #[tokio::test]
    async fn challenge_stores_token_and_retries_once() {
        let client = scripted(vec![
            Scripted::Reply(409, Some("abc123"), ""),
            Scripted::Reply(200, None, SUCCESS_EMPTY_TORRENTS),
        ]);

        let response = client.call(&RpcRequest::new("torrent-get")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(client.tokens().current().as_deref(), Some("abc123"));
        let posts = client.transport.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].session_token, None);
        assert_eq!(posts[1].session_token.as_deref(), Some("abc123"));
        assert_eq!(posts[0].body, posts[1].body);
    }

    #[tokio::test]
    async fn challenge_without_token_is_protocol_error() {
        let client = scripted(vec![Scripted::Reply(409, None, "")]);

        let err = client
            .call(&RpcRequest::new("session-get"))
            .await
            .expect_err("409 without a token must fail");

        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(client.transport.posts().len(), 1);
        assert_eq!(client.tokens().current(), None);
    }

    #[tokio::test]
    async fn second_challenge_is_not_retried() {
        let client = scripted(vec![
            Scripted::Reply(409, Some("first"), ""),
            Scripted::Reply(409, Some("second"), "still conflicted"),
        ]);

        let err = client
            .call(&RpcRequest::new("session-get"))
            .await
            .expect_err("second 409 must propagate");

        assert_eq!(err.status(), Some(409));
        assert_eq!(client.transport.posts().len(), 2);
        assert_eq!(client.tokens().current().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn failure_after_challenge_still_counts_two_posts() {
        let client = scripted(vec![
            Scripted::Reply(409, Some("abc123"), ""),
            Scripted::Refused,
        ]);

        let err = client
            .call(&RpcRequest::new("session-get"))
            .await
            .expect_err("retry failure must propagate");

        assert!(err.is_transient());
        assert_eq!(client.transport.posts().len(), 2);
        assert_eq!(client.tokens().current().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error_without_retry() {
        let client = scripted(vec![Scripted::Refused]);

        let err = client
            .call(&RpcRequest::new("session-get"))
            .await
            .expect_err("refused connection must fail");

        assert!(matches!(err, ClientError::Transport { .. }));
        assert_eq!(client.transport.posts().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let client = scripted(vec![Scripted::Reply(200, None, "<html>not json</html>")]);

        let err = client
            .call(&RpcRequest::new("session-get"))
            .await
            .expect_err("html body must not decode");

        match err {
            ClientError::Decode { body, .. } => assert_eq!(body, "<html>not json</html>"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_without_result_is_an_unknown_failure() {
        let client = scripted(vec![Scripted::Reply(200, None, r#"{"arguments":{"version":"4.0.5"}}"#)]);

        let response = client.call(&RpcRequest::new("session-get")).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(response.failure_reason(), Some("Unknown error"));
        assert_eq!(response.arguments["version"], "4.0.5");
    }

    #[tokio::test]
    async fn non_object_json_body_is_decode_error() {
        let client = scripted(vec![Scripted::Reply(200, None, "[1, 2]")]);

        let err = client.call(&RpcRequest::new("session-get")).await.unwrap_err();

        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn call_method_sends_arguments_and_explicit_tag() {
        let client = scripted(vec![
            Scripted::Reply(200, None, r#"{"result":"success","arguments":{},"tag":0}"#),
            Scripted::Reply(200, None, r#"{"result":"success","arguments":{}}"#),
        ]);
        let mut arguments = Map::new();
        arguments.insert("ids".to_string(), json!([4]));

        let tagged = client
            .call_method("torrent-start", arguments.clone(), Some(0))
            .await
            .unwrap();
        client.call_method("torrent-start", arguments, None).await.unwrap();

        assert_eq!(tagged.tag, Some(0));
        let posts = client.transport.posts();
        let first: Value = serde_json::from_slice(&posts[0].body).unwrap();
        let second: Value = serde_json::from_slice(&posts[1].body).unwrap();
        assert_eq!(
            first,
            json!({ "method": "torrent-start", "arguments": { "ids": [4] }, "tag": 0 })
        );
        assert!(second.get("tag").is_none());
    }

    #[tokio::test]
    async fn refreshed_token_is_attached_to_later_calls() {
        let client = scripted(vec![
            Scripted::Reply(409, Some("abc123"), ""),
            Scripted::Reply(200, None, SUCCESS_EMPTY_TORRENTS),
            Scripted::Reply(200, None, r#"{"result":"success"}"#),
            Scripted::Reply(200, None, r#"{"result":"success"}"#),
        ]);

        client.call(&RpcRequest::new("torrent-get")).await.unwrap();
        client.call(&RpcRequest::new("session-stats")).await.unwrap();
        client.call(&RpcRequest::new("session-stats")).await.unwrap();

        let posts = client.transport.posts();
        assert_eq!(posts.len(), 4);
        assert!(
            posts[2..]
                .iter()
                .all(|post| post.session_token.as_deref() == Some("abc123"))
        );
    }

    #[tokio::test]
    async fn clients_sharing_tokens_skip_the_second_handshake() {
        let tokens = SessionTokens::new();
        let first = scripted(vec![
            Scripted::Reply(409, Some("shared"), ""),
            Scripted::Reply(200, None, r#"{"result":"success"}"#),
        ])
        .with_tokens(tokens.clone());
        let second = scripted(vec![Scripted::Reply(200, None, r#"{"result":"success"}"#)])
            .with_tokens(tokens.clone());

        first.call(&RpcRequest::new("session-get")).await.unwrap();
        second.call(&RpcRequest::new("session-get")).await.unwrap();

        let posts = second.transport.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].session_token.as_deref(), Some("shared"));
    }

    #[tokio::test]
    async fn concurrent_challenges_converge_on_one_token() {
        let client = Arc::new(RpcClient::with_transport(
            endpoint(),
            None,
            ChallengingTransport {
                valid_token: "converged-token",
                posts: AtomicUsize::new(0),
            },
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                client.call(&RpcRequest::new("session-stats")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_success());
        }

        assert_eq!(
            client.tokens().current().as_deref(),
            Some("converged-token")
        );
        let posts = client.transport.posts.load(Ordering::SeqCst);
        assert!((16..=32).contains(&posts));
    }

    #[tokio::test]
    async fn http_client_completes_handshake_against_daemon() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transmission/rpc"))
            .and(header(SESSION_ID_HEADER, "abc123"))
            .and(body_json(json!({ "method": "torrent-get", "arguments": {} })))
            .respond_with(ResponseTemplate::new(200).set_body_string(SUCCESS_EMPTY_TORRENTS))
            .expect(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/transmission/rpc"))
            .respond_with(ResponseTemplate::new(409).insert_header(SESSION_ID_HEADER, "abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let address = server.address();
        let client = RpcClient::new(
            Endpoint::http(&address.ip().to_string(), address.port()).unwrap(),
            None,
        );

        let first = client.call(&RpcRequest::new("torrent-get")).await.unwrap();
        let second = client.call(&RpcRequest::new("torrent-get")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.tokens().current().as_deref(), Some("abc123"));
    }
}
