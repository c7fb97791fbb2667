//! Wire frames for remote execution of developer functions.
//!
//! Every frame is one JSON object on its own line, tagged by `type`:
//!
//! | Direction | Kinds |
//! |-----------|-------|
//! | caller to server | `invoke`, `start-stream`, `stop-stream` |
//! | server to caller | `result`, `data`, `error`, `connect`, `disconnect` |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use toolspec::{StreamEvent, StreamSignal};

use crate::error::{Error, Result};

/// Maximum size of a single frame (1MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Request ID (can be string or number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Message {
    /// Call a request/response function.
    Invoke {
        id: RequestId,
        tool_id: String,
        function_name: String,
        #[serde(default)]
        params: Value,
    },
    /// Reply to `invoke` or `start-stream`: either a value or an error.
    Result {
        id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Open a stream. Frames for it carry `stream_id`.
    StartStream {
        id: RequestId,
        stream_id: String,
        tool_id: String,
        function_name: String,
        #[serde(default)]
        params: Value,
    },
    /// Release a stream opened with `start-stream`.
    StopStream { stream_id: String },
    Data { stream_id: String, event: StreamEvent },
    Error { stream_id: String, message: String },
    Connect { stream_id: String },
    Disconnect { stream_id: String },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Invoke { .. } => "invoke",
            Message::Result { .. } => "result",
            Message::StartStream { .. } => "start-stream",
            Message::StopStream { .. } => "stop-stream",
            Message::Data { .. } => "data",
            Message::Error { .. } => "error",
            Message::Connect { .. } => "connect",
            Message::Disconnect { .. } => "disconnect",
        }
    }

    /// Build a `result` frame from an invocation outcome.
    pub fn reply<E: ToString>(id: RequestId, result: std::result::Result<Value, E>) -> Self {
        match result {
            Ok(value) => Message::Result {
                id,
                value: Some(value),
                error: None,
            },
            Err(err) => Message::Result {
                id,
                value: None,
                error: Some(err.to_string()),
            },
        }
    }

    /// Wrap a stream signal for `stream_id`.
    pub fn from_signal(stream_id: String, signal: StreamSignal) -> Self {
        match signal {
            StreamSignal::Data(event) => Message::Data { stream_id, event },
            StreamSignal::Error(message) => Message::Error { stream_id, message },
            StreamSignal::Connect => Message::Connect { stream_id },
            StreamSignal::Disconnect => Message::Disconnect { stream_id },
        }
    }

    /// The stream a frame belongs to and its signal, for server-to-caller
    /// stream frames.
    pub fn into_signal(self) -> Option<(String, StreamSignal)> {
        match self {
            Message::Data { stream_id, event } => Some((stream_id, StreamSignal::Data(event))),
            Message::Error { stream_id, message } => Some((stream_id, StreamSignal::Error(message))),
            Message::Connect { stream_id } => Some((stream_id, StreamSignal::Connect)),
            Message::Disconnect { stream_id } => Some((stream_id, StreamSignal::Disconnect)),
            _ => None,
        }
    }

    /// Encode as a single line, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one line.
    pub fn parse(line: &str) -> Result<Self> {
        if line.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge {
                size: line.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// Read one newline-terminated frame.
///
/// At most `MAX_FRAME_SIZE + 1` bytes of a line are buffered; the rest of
/// an oversized line is discarded as it streams past. Returns `Ok(None)` at
/// end of input. Oversized and non-UTF-8 lines come back as `Some(Err(..))`
/// so the caller can skip them and keep reading.
pub(crate) async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Result<String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = MAX_FRAME_SIZE as u64 + 1;
    if (&mut *reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_FRAME_SIZE {
        let size = buf.len() + discard_line(reader).await?;
        return Ok(Some(Err(Error::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        })));
    }

    Ok(Some(String::from_utf8(buf).map_err(|_| Error::InvalidUtf8)))
}

/// Skip input up to and including the next newline. Returns the number of
/// bytes skipped before it.
async fn discard_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(skipped + used - 1);
        }
        skipped += used;
    }
}

/// Split a `result` frame into the remote value or error.
///
/// A missing value is treated as `null`, like a function returning nothing.
pub fn into_result(value: Option<Value>, error: Option<String>) -> Result<Value> {
    match error {
        Some(message) => Err(Error::Remote(message)),
        None => Ok(value.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn oversized_lines_are_skipped_without_buffering() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"type\":\"stop-stream\",\"streamId\":\"a\"}\n");
        input.extend(std::iter::repeat_n(b'x', MAX_FRAME_SIZE + 10));
        input.push(b'\n');
        input.extend_from_slice(b"\xff\xfe\n");
        input.extend_from_slice(b"{\"type\":\"stop-stream\",\"streamId\":\"b\"}");
        let mut reader = input.as_slice();

        let first = read_frame(&mut reader).await.unwrap().unwrap().unwrap();
        assert_eq!(Message::parse(&first).unwrap().kind(), "stop-stream");

        let err = read_frame(&mut reader).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { size, .. } if size == MAX_FRAME_SIZE + 10));

        let err = read_frame(&mut reader).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8));

        let last = read_frame(&mut reader).await.unwrap().unwrap().unwrap();
        assert!(matches!(
            Message::parse(&last).unwrap(),
            Message::StopStream { stream_id } if stream_id == "b"
        ));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[test]
    fn invoke_frame_shape() {
        let msg = Message::Invoke {
            id: RequestId::Number(3),
            tool_id: "users".into(),
            function_name: "loadUsers".into(),
            params: json!({"page": 1}),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "invoke",
                "id": 3,
                "toolId": "users",
                "functionName": "loadUsers",
                "params": {"page": 1}
            })
        );
    }

    #[test]
    fn stream_frames_use_kebab_case_kinds() {
        let line = r#"{"type":"start-stream","id":"a","streamId":"s1","toolId":"t","functionName":"feed"}"#;
        let msg = Message::parse(line).unwrap();
        assert_eq!(msg.kind(), "start-stream");
        assert!(matches!(msg, Message::StartStream { params: Value::Null, .. }));

        let stop = Message::StopStream {
            stream_id: "s1".into(),
        };
        assert_eq!(
            stop.to_line().unwrap(),
            r#"{"type":"stop-stream","streamId":"s1"}"#
        );
    }

    #[test]
    fn data_frame_carries_event() {
        let msg = Message::parse(
            r#"{"type":"data","streamId":"s","event":{"type":"delete","itemId":7}}"#,
        )
        .unwrap();
        let (stream_id, signal) = msg.into_signal().unwrap();
        assert_eq!(stream_id, "s");
        assert_eq!(
            signal,
            StreamSignal::Data(StreamEvent::Delete {
                item_id: toolspec::RowId::from(7)
            })
        );
    }

    #[test]
    fn result_frames() {
        let ok = Message::reply::<String>(RequestId::from("x"), Ok(json!(1)));
        assert_eq!(ok.to_line().unwrap(), r#"{"type":"result","id":"x","value":1}"#);

        let err = Message::reply(RequestId::from(1), Err::<Value, _>("nope"));
        let Message::Result { value, error, .. } = err else {
            panic!("expected result");
        };
        assert!(matches!(into_result(value, error), Err(Error::Remote(m)) if m == "nope"));
        assert_eq!(into_result(None, None).unwrap(), Value::Null);
    }

    #[test]
    fn oversize_frames_are_rejected() {
        let line = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            Message::parse(&line),
            Err(Error::FrameTooLarge { .. })
        ));
    }
}
