use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use transmission_rpc::{ClientError, RpcClient, RpcRequest, RpcResponse};

use crate::format::{progress, status_name};

const PROBE_FIELDS: [&str; 5] = ["id", "name", "status", "totalSize", "percentDone"];
const SAMPLE_SIZE: usize = 3;

struct ProbeFailure {
    method: &'static str,
    message: String,
    hints: Vec<String>,
}

async fn probe(
    client: &RpcClient,
    method: &'static str,
    request: RpcRequest,
) -> Result<RpcResponse, ProbeFailure> {
    let response = client.call(&request).await.map_err(|err| ProbeFailure {
        method,
        message: err.to_string(),
        hints: hints_for(client, &err),
    })?;
    if let Some(reason) = response.failure_reason() {
        return Err(ProbeFailure {
            method,
            message: format!("daemon answered '{reason}'"),
            hints: vec![format!("The daemon rejected {method}; check its log for details.")],
        });
    }
    Ok(response)
}

fn hints_for(client: &RpcClient, err: &ClientError) -> Vec<String> {
    let endpoint = client.endpoint();
    match err {
        ClientError::Transport { .. } if err.is_timeout() => vec![format!(
            "No answer within {}s; raise --timeout-secs or check the network path to {}.",
            client.timeout().as_secs(),
            endpoint.host()
        )],
        ClientError::Transport { .. } => vec![
            format!("Is transmission-daemon running and listening on {endpoint}?"),
            "Set TRANSMISSION_HOST / TRANSMISSION_PORT if the daemon runs elsewhere.".to_string(),
        ],
        ClientError::HttpStatus { status: 401, .. } => vec![
            "The daemon requires authentication; set TRANSMISSION_USERNAME and TRANSMISSION_PASSWORD."
                .to_string(),
        ],
        ClientError::HttpStatus { status: 403, .. } => vec![
            "Access denied; add this host to rpc-whitelist in the daemon's settings.json.".to_string(),
        ],
        ClientError::HttpStatus { status: 404, .. } => vec![format!(
            "Nothing served at {}; check TRANSMISSION_RPC_PATH.",
            endpoint.path()
        )],
        ClientError::HttpStatus { .. } => Vec::new(),
        ClientError::Protocol(_) | ClientError::Decode { .. } => vec![format!(
            "{endpoint} does not behave like a Transmission RPC endpoint."
        )],
    }
}

/// Probe the daemon with three read-only calls. Returns the report and
/// whether every call succeeded.
pub(crate) async fn run_diagnostics(client: &RpcClient) -> (Value, bool) {
    let mut report = json!({
        "status": "ready",
        "endpoint": client.endpoint().to_string(),
        "checked_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "authenticated": client.has_credentials(),
    });

    let outcome = collect(client, &mut report).await;
    report["session_token_acquired"] = Value::Bool(client.tokens().current().is_some());

    match outcome {
        Ok(()) => {
            tracing::info!(endpoint = %client.endpoint(), "daemon ready");
            (report, true)
        }
        Err(failure) => {
            tracing::warn!(
                endpoint = %client.endpoint(),
                method = failure.method,
                error = %failure.message,
                "daemon check failed"
            );
            report["status"] = json!("unreachable");
            report["error"] = json!({
                "method": failure.method,
                "message": failure.message,
            });
            report["hints"] = json!(failure.hints);
            (report, false)
        }
    }
}

async fn collect(client: &RpcClient, report: &mut Value) -> Result<(), ProbeFailure> {
    let session = probe(client, "session-get", RpcRequest::new("session-get")).await?;
    if let Some(version) = session.arguments.get("version").and_then(Value::as_str) {
        report["daemon_version"] = json!(version);
    }

    let listing = probe(
        client,
        "torrent-get",
        RpcRequest::new("torrent-get").with_argument("fields", json!(PROBE_FIELDS)),
    )
    .await?;
    let torrents: Vec<_> = listing
        .arguments
        .get("torrents")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    report["torrent_count"] = json!(torrents.len());
    report["sample_torrents"] = torrents
        .iter()
        .take(SAMPLE_SIZE)
        .map(|torrent| {
            json!({
                "name": torrent.get("name").and_then(Value::as_str).unwrap_or("N/A"),
                "status": status_name(torrent.get("status").and_then(Value::as_i64).unwrap_or(-1)),
                "progress": progress(torrent),
            })
        })
        .collect();

    let stats = probe(client, "session-stats", RpcRequest::new("session-stats")).await?;
    report["active_torrent_count"] = json!(
        stats
            .arguments
            .get("activeTorrentCount")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    );
    Ok(())
}
