use serde_json::Value;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// How a message was delimited on the wire. Replies reuse the same framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Framing {
    /// `Content-Length: n` headers, a blank line, then `n` bytes of JSON.
    ContentLength,
    /// One JSON document per line.
    Newline,
}

/// Largest `Content-Length` body accepted. Bigger frames are skipped.
pub(crate) const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub(crate) enum Incoming {
    Message(Value, Framing),
    /// The input could not be turned into a JSON value; the stream is
    /// still positioned at the next message.
    Malformed(Framing, String),
}

/// Read the next message. `Ok(None)` on a clean EOF between messages.
///
/// Only a broken stream (EOF inside a header block or body, I/O failure)
/// is an error.
pub(crate) async fn read_message<R>(reader: &mut R) -> io::Result<Option<Incoming>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            return Ok(Some(Incoming::Malformed(
                Framing::Newline,
                "line is not valid UTF-8".to_string(),
            )));
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Ok(Some(decode(trimmed.as_bytes(), Framing::Newline)));
        }

        return match content_length(trimmed) {
            Some(declared) => read_frame(reader, declared).await.map(Some),
            None => Ok(Some(Incoming::Malformed(
                Framing::Newline,
                "expected a JSON message or a Content-Length header".to_string(),
            ))),
        };
    }
}

/// Raw value of a `Content-Length` header line.
fn content_length(line: &str) -> Option<&str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-length")
        .then(|| value.trim())
}

/// Rest of a header block whose first line declared `declared`, then the body.
async fn read_frame<R>(reader: &mut R, declared: &str) -> io::Result<Incoming>
where
    R: AsyncBufRead + Unpin,
{
    let mut declared = declared.to_string();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = content_length(trimmed) {
            declared = value.to_string();
        }
    }

    let Ok(length) = declared.parse::<usize>() else {
        return Ok(Incoming::Malformed(
            Framing::ContentLength,
            format!("invalid Content-Length header: {declared}"),
        ));
    };

    if length > MAX_FRAME_BYTES {
        let skipped = io::copy(&mut (&mut *reader).take(length as u64), &mut io::sink()).await?;
        if skipped < length as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while skipping oversized MCP frame",
            ));
        }
        return Ok(Incoming::Malformed(
            Framing::ContentLength,
            format!("frame of {length} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }

    let mut payload = vec![0_u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(decode(&payload, Framing::ContentLength))
}

fn decode(payload: &[u8], framing: Framing) -> Incoming {
    match serde_json::from_slice(payload) {
        Ok(value) => Incoming::Message(value, framing),
        Err(e) => Incoming::Malformed(framing, e.to_string()),
    }
}

pub(crate) async fn write_message<W>(writer: &mut W, value: &Value, framing: Framing) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Newline => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await
}
