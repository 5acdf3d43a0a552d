//! Human-readable renderings of daemon payloads.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Daemon `status` codes.
pub(crate) fn status_name(code: i64) -> &'static str {
    match code {
        0 => "Stopped",
        1 => "Check queued",
        2 => "Checking",
        3 => "Download queued",
        4 => "Downloading",
        5 => "Seed queued",
        6 => "Seeding",
        _ => "Unknown",
    }
}

fn number(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn integer(map: &Map<String, Value>, key: &str) -> i64 {
    map.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn text<'a>(map: &'a Map<String, Value>, key: &str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or("N/A")
}

fn id_text(map: &Map<String, Value>) -> String {
    match map.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "N/A".to_string(),
    }
}

fn section<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn timestamp(seconds: i64) -> Option<String> {
    if seconds <= 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0).map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Percent-done fraction as `12.3%`.
pub(crate) fn progress(map: &Map<String, Value>) -> String {
    format!("{:.1}%", number(map, "percentDone") * 100.0)
}

fn eta(map: &Map<String, Value>) -> String {
    match map.get("eta").and_then(Value::as_i64) {
        Some(seconds) if seconds >= 0 => format!("{seconds} seconds"),
        _ => "Unknown".to_string(),
    }
}

/// Multi-line summary of one torrent from `torrent-get`.
pub(crate) fn torrent_details(torrent: &Map<String, Value>) -> String {
    let mut out = String::from("Torrent Information:\n");
    let _ = writeln!(out, "Name: {}", text(torrent, "name"));
    let _ = writeln!(out, "ID: {}", id_text(torrent));
    let _ = writeln!(out, "Status: {}", status_name(integer(torrent, "status")));
    let _ = writeln!(out, "Size: {:.2} MB", number(torrent, "totalSize") / MIB);
    let _ = writeln!(out, "Progress: {}", progress(torrent));
    let _ = writeln!(out, "Download Rate: {:.1} KB/s", number(torrent, "rateDownload") / KIB);
    let _ = writeln!(out, "Upload Rate: {:.1} KB/s", number(torrent, "rateUpload") / KIB);
    let _ = writeln!(out, "Ratio: {:.2}", number(torrent, "uploadRatio"));
    let _ = writeln!(out, "ETA: {}", eta(torrent));
    let _ = writeln!(out, "Peers: {}", integer(torrent, "peersConnected"));
    let _ = writeln!(out, "Download Dir: {}", text(torrent, "downloadDir"));
    if let Some(files) = torrent.get("files").and_then(Value::as_array) {
        let _ = writeln!(out, "Files: {}", files.len());
    }
    let piece_count = integer(torrent, "pieceCount");
    if piece_count > 0 {
        let _ = writeln!(
            out,
            "Pieces: {piece_count} x {:.0} KB",
            number(torrent, "pieceSize") / KIB
        );
    }
    if let Some(added) = timestamp(integer(torrent, "addedDate")) {
        let _ = writeln!(out, "Added: {added}");
    }
    if let Some(done) = timestamp(integer(torrent, "doneDate")) {
        let _ = writeln!(out, "Completed: {done}");
    }
    if integer(torrent, "error") != 0 {
        let _ = writeln!(out, "Error: {}", text(torrent, "errorString"));
    }
    out
}

/// Single-line entry used by search results.
pub(crate) fn torrent_line(torrent: &Map<String, Value>) -> String {
    format!(
        "ID: {} | {} | Status: {} | Progress: {}",
        id_text(torrent),
        torrent.get("name").and_then(Value::as_str).unwrap_or_default(),
        status_name(integer(torrent, "status")),
        progress(torrent)
    )
}

/// Current and cumulative counters from `session-stats`.
pub(crate) fn session_stats(stats: &Map<String, Value>) -> String {
    let empty = Map::new();
    let current = section(stats, "current-stats").unwrap_or(&empty);
    let cumulative = section(stats, "cumulative-stats").unwrap_or(&empty);

    let mut out = String::from("Transmission Session Statistics:\n\nCurrent Session:\n");
    let _ = writeln!(out, "- Download Speed: {:.1} KB/s", number(current, "downloadSpeed") / KIB);
    let _ = writeln!(out, "- Upload Speed: {:.1} KB/s", number(current, "uploadSpeed") / KIB);
    let _ = writeln!(out, "- Downloaded: {:.2} MB", number(current, "downloadedBytes") / MIB);
    let _ = writeln!(out, "- Uploaded: {:.2} MB", number(current, "uploadedBytes") / MIB);
    let _ = writeln!(out, "- Files Added: {}", integer(current, "filesAdded"));
    let _ = writeln!(out, "- Active Torrents: {}", integer(stats, "activeTorrentCount"));
    let _ = writeln!(out, "- Paused Torrents: {}", integer(stats, "pausedTorrentCount"));
    let _ = writeln!(out, "- Total Torrents: {}", integer(stats, "torrentCount"));
    out.push_str("\nCumulative:\n");
    let _ = writeln!(out, "- Downloaded: {:.2} GB", number(cumulative, "downloadedBytes") / GIB);
    let _ = writeln!(out, "- Uploaded: {:.2} GB", number(cumulative, "uploadedBytes") / GIB);
    let _ = writeln!(out, "- Files Added: {}", integer(cumulative, "filesAdded"));
    let _ = writeln!(out, "- Sessions: {}", integer(cumulative, "sessionCount"));
    let _ = writeln!(out, "- Uptime: {:.1} hours", number(cumulative, "secondsActive") / 3600.0);
    out
}
