use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};
use transmission_rpc::{RpcRequest, RpcResponse};

use crate::McpServer;
use crate::args::{
    ToolError, arg_bool, arg_choice, arg_optional_string, arg_optional_u64, arg_string,
    required_torrent_id,
};
use crate::format;

const PRIORITIES: [&str; 3] = ["high", "normal", "low"];
const STATUS_FILTERS: [&str; 5] = ["all", "downloading", "seeding", "paused", "completed"];

const SUMMARY_FIELDS: [&str; 7] = [
    "id",
    "name",
    "status",
    "totalSize",
    "percentDone",
    "rateDownload",
    "rateUpload",
];

pub(crate) const LISTING_FIELDS: [&str; 16] = [
    "id",
    "name",
    "status",
    "totalSize",
    "percentDone",
    "rateDownload",
    "rateUpload",
    "uploadRatio",
    "eta",
    "peersConnected",
    "downloadDir",
    "error",
    "errorString",
    "addedDate",
    "doneDate",
    "trackerStats",
];

const DETAIL_FIELDS: [&str; 19] = [
    "id",
    "name",
    "status",
    "totalSize",
    "percentDone",
    "rateDownload",
    "rateUpload",
    "uploadRatio",
    "eta",
    "peersConnected",
    "downloadDir",
    "error",
    "errorString",
    "addedDate",
    "doneDate",
    "files",
    "fileStats",
    "pieceCount",
    "pieceSize",
];

#[derive(Debug)]
pub(crate) struct ToolDefinition {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) input_schema: Value,
}

fn torrent_id_schema(description: &str) -> Value {
    json!({ "type": "integer", "minimum": 1, "description": description })
}

pub(crate) fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "add_torrent",
            description: "Add a new torrent by URL, magnet link, or local .torrent file",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Torrent URL, magnet link, or base64-encoded .torrent file"
                    },
                    "torrent_file": {
                        "type": "string",
                        "description": "Path to a local .torrent file (alternative to url)"
                    },
                    "download_dir": {
                        "type": "string",
                        "description": "Download directory (optional)"
                    },
                    "paused": {
                        "type": "boolean",
                        "description": "Start paused (optional, default false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDefinition {
            name: "remove_torrent",
            description: "Remove a torrent by ID",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "torrent_id": torrent_id_schema("Torrent ID to remove"),
                    "delete_local_data": {
                        "type": "boolean",
                        "description": "Also delete local data (default false)",
                        "default": false
                    }
                },
                "required": ["torrent_id"]
            }),
        },
        ToolDefinition {
            name: "start_torrent",
            description: "Start/resume a torrent by ID",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "torrent_id": torrent_id_schema("Torrent ID to start")
                },
                "required": ["torrent_id"]
            }),
        },
        ToolDefinition {
            name: "stop_torrent",
            description: "Stop/pause a torrent by ID",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "torrent_id": torrent_id_schema("Torrent ID to stop")
                },
                "required": ["torrent_id"]
            }),
        },
        ToolDefinition {
            name: "get_torrent_info",
            description: "Get detailed information about a specific torrent",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "torrent_id": torrent_id_schema("Torrent ID to get info for")
                },
                "required": ["torrent_id"]
            }),
        },
        ToolDefinition {
            name: "set_torrent_priority",
            description: "Set download priority for a torrent",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "torrent_id": torrent_id_schema("Torrent ID"),
                    "priority": {
                        "type": "string",
                        "enum": PRIORITIES,
                        "description": "Priority level"
                    }
                },
                "required": ["torrent_id", "priority"]
            }),
        },
        ToolDefinition {
            name: "set_speed_limits",
            description: "Set global download/upload speed limits",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "download_limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Download speed limit in KB/s (0 = unlimited)"
                    },
                    "upload_limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Upload speed limit in KB/s (0 = unlimited)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "search_torrents",
            description: "Search torrents by name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (torrent name, case-insensitive; empty matches all)"
                    },
                    "status_filter": {
                        "type": "string",
                        "enum": STATUS_FILTERS,
                        "description": "Filter by status (optional)",
                        "default": "all"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "get_session_stats",
            description: "Get Transmission session statistics",
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

fn id_list(torrent_id: i64) -> Value {
    json!([torrent_id])
}

/// `Err` with the daemon's reason unless `result == "success"`.
fn ensure_success(response: &RpcResponse, action: &'static str) -> Result<(), ToolError> {
    match response.failure_reason() {
        None => Ok(()),
        Some(reason) => Err(ToolError::daemon(action, reason)),
    }
}

/// Magnet links and web URLs go to `filename`; anything else must be
/// base64-encoded metainfo.
fn torrent_source(raw: &str) -> Result<(&'static str, String), ToolError> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("magnet:") || lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Ok(("filename", trimmed.to_string()));
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if BASE64.decode(compact.as_bytes()).is_ok() {
        return Ok(("metainfo", compact));
    }
    Err(ToolError::validation(
        "url",
        "'url' must be a magnet link, an http(s) URL, or base64-encoded .torrent data",
    ))
}

fn named_torrent(arguments: &Map<String, Value>, key: &str) -> Option<(String, String)> {
    let torrent = arguments.get(key)?.as_object()?;
    let name = torrent
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string();
    let id = torrent
        .get("id")
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "N/A".to_string());
    Some((name, id))
}

fn torrents(response: &RpcResponse) -> Vec<&Map<String, Value>> {
    response
        .arguments
        .get("torrents")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn matches_status(filter: &str, status: i64) -> bool {
    match filter {
        "downloading" => status == 4,
        "seeding" | "completed" => status == 6,
        "paused" => status == 0,
        _ => true,
    }
}

impl McpServer {
    pub(crate) async fn execute_tool(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        match tool_name {
            "add_torrent" => self.tool_add_torrent(args).await,
            "remove_torrent" => self.tool_remove_torrent(args).await,
            "start_torrent" => self.tool_start_torrent(args).await,
            "stop_torrent" => self.tool_stop_torrent(args).await,
            "get_torrent_info" => self.tool_get_torrent_info(args).await,
            "set_torrent_priority" => self.tool_set_torrent_priority(args).await,
            "set_speed_limits" => self.tool_set_speed_limits(args).await,
            "search_torrents" => self.tool_search_torrents(args).await,
            "get_session_stats" => self.tool_get_session_stats(args).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn tool_add_torrent(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let url = arg_optional_string(args, "url")?;
        let torrent_file = arg_optional_string(args, "torrent_file")?;
        let download_dir = arg_optional_string(args, "download_dir")?;
        let paused = arg_bool(args, "paused", false)?;

        let mut request = RpcRequest::new("torrent-add");
        request = match (url, torrent_file) {
            (Some(_), Some(_)) => {
                return Err(ToolError::validation(
                    "url",
                    "Pass either 'url' or 'torrent_file', not both",
                ));
            }
            (None, None) => {
                return Err(ToolError::validation("url", "Missing required field 'url'"));
            }
            (Some(url), None) => {
                let (key, value) = torrent_source(&url)?;
                request.with_argument(key, value)
            }
            (None, Some(path)) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    ToolError::validation("torrent_file", format!("Cannot read '{path}': {e}"))
                })?;
                request.with_argument("metainfo", BASE64.encode(bytes))
            }
        };
        if let Some(download_dir) = download_dir {
            request = request.with_argument("download-dir", download_dir);
        }
        request = request.with_argument("paused", paused);

        let response = self.client.call(&request).await?;
        ensure_success(&response, "add torrent")?;

        Ok(
            if let Some((name, id)) = named_torrent(&response.arguments, "torrent-added") {
                format!("Successfully added torrent '{name}' (ID: {id})")
            } else if let Some((name, id)) = named_torrent(&response.arguments, "torrent-duplicate") {
                format!("Torrent already exists: '{name}' (ID: {id})")
            } else {
                "Torrent added successfully".to_string()
            },
        )
    }

    async fn tool_remove_torrent(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let torrent_id = required_torrent_id(args, "torrent_id")?;
        let delete_local_data = arg_bool(args, "delete_local_data", false)?;

        let request = RpcRequest::new("torrent-remove")
            .with_argument("ids", id_list(torrent_id))
            .with_argument("delete-local-data", delete_local_data);
        let response = self.client.call(&request).await?;
        ensure_success(&response, "remove torrent")?;

        let action = if delete_local_data {
            "removed and local data deleted"
        } else {
            "removed"
        };
        Ok(format!("Torrent {torrent_id} successfully {action}"))
    }

    async fn tool_start_torrent(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let torrent_id = required_torrent_id(args, "torrent_id")?;
        let request = RpcRequest::new("torrent-start").with_argument("ids", id_list(torrent_id));
        let response = self.client.call(&request).await?;
        ensure_success(&response, "start torrent")?;
        Ok(format!("Torrent {torrent_id} started successfully"))
    }

    async fn tool_stop_torrent(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let torrent_id = required_torrent_id(args, "torrent_id")?;
        let request = RpcRequest::new("torrent-stop").with_argument("ids", id_list(torrent_id));
        let response = self.client.call(&request).await?;
        ensure_success(&response, "stop torrent")?;
        Ok(format!("Torrent {torrent_id} stopped successfully"))
    }

    async fn tool_get_torrent_info(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let torrent_id = required_torrent_id(args, "torrent_id")?;
        let request = RpcRequest::new("torrent-get")
            .with_argument("ids", id_list(torrent_id))
            .with_argument("fields", json!(DETAIL_FIELDS));
        let response = self.client.call(&request).await?;
        ensure_success(&response, "get torrent info")?;

        Ok(match torrents(&response).first() {
            Some(torrent) => format::torrent_details(torrent),
            None => format!("Torrent {torrent_id} not found"),
        })
    }

    async fn tool_set_torrent_priority(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let torrent_id = required_torrent_id(args, "torrent_id")?;
        let priority = arg_choice(args, "priority", &PRIORITIES, None)?;
        let bandwidth_priority = match priority {
            "high" => 1,
            "low" => -1,
            _ => 0,
        };

        let request = RpcRequest::new("torrent-set")
            .with_argument("ids", id_list(torrent_id))
            .with_argument("bandwidthPriority", bandwidth_priority);
        let response = self.client.call(&request).await?;
        ensure_success(&response, "set priority")?;
        Ok(format!("Torrent {torrent_id} priority set to {priority}"))
    }

    async fn tool_set_speed_limits(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let download_limit = arg_optional_u64(args, "download_limit")?;
        let upload_limit = arg_optional_u64(args, "upload_limit")?;
        if download_limit.is_none() && upload_limit.is_none() {
            return Err(ToolError::validation(
                "download_limit",
                "Provide 'download_limit' and/or 'upload_limit'",
            ));
        }

        let mut request = RpcRequest::new("session-set");
        if let Some(limit) = download_limit {
            request = request
                .with_argument("speed-limit-down-enabled", limit > 0)
                .with_argument("speed-limit-down", limit);
        }
        if let Some(limit) = upload_limit {
            request = request
                .with_argument("speed-limit-up-enabled", limit > 0)
                .with_argument("speed-limit-up", limit);
        }

        let response = self.client.call(&request).await?;
        ensure_success(&response, "set speed limits")?;
        Ok("Speed limits updated successfully".to_string())
    }

    async fn tool_search_torrents(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let query = arg_string(args, "query", "")?.trim().to_lowercase();
        let status_filter = arg_choice(args, "status_filter", &STATUS_FILTERS, Some("all"))?;

        let request = RpcRequest::new("torrent-get").with_argument("fields", json!(SUMMARY_FIELDS));
        let response = self.client.call(&request).await?;
        ensure_success(&response, "search torrents")?;

        let matching: Vec<String> = torrents(&response)
            .into_iter()
            .filter(|torrent| {
                torrent
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(&query)
            })
            .filter(|torrent| {
                let status = torrent.get("status").and_then(Value::as_i64).unwrap_or(-1);
                matches_status(status_filter, status)
            })
            .map(format::torrent_line)
            .collect();

        if matching.is_empty() {
            return Ok("No torrents found matching the search criteria".to_string());
        }
        Ok(format!(
            "Found {} matching torrents:\n{}",
            matching.len(),
            matching.join("\n")
        ))
    }

    async fn tool_get_session_stats(&self, _args: &Map<String, Value>) -> Result<String, ToolError> {
        let response = self.client.call(&RpcRequest::new("session-stats")).await?;
        ensure_success(&response, "get session stats")?;
        Ok(format::session_stats(&response.arguments))
    }
}
