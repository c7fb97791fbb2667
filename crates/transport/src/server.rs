//! Executes developer functions on behalf of remote callers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use toolspec::{CleanupHandle, StreamSink};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{Message, RequestId, read_frame};
use crate::registry::Registry;

/// Per-connection state.
struct Connection {
    tx: mpsc::UnboundedSender<Message>,
    streams: Arc<Mutex<Streams>>,
    /// Invocations and stream starts; joined before the connection closes.
    calls: JoinSet<()>,
    /// Stream signal forwarders; aborted when the connection closes.
    forwarders: JoinSet<()>,
}

/// Cleanup handles of the streams open on one connection.
#[derive(Default)]
struct Streams {
    active: HashMap<String, CleanupHandle>,
    /// Start requested, not yet settled.
    starting: HashSet<String>,
    /// Stopped while still starting.
    stopped: HashSet<String>,
}

impl Streams {
    fn begin(&mut self, stream_id: &str) {
        self.starting.insert(stream_id.to_string());
    }

    /// Record a successful start. Hands the cleanup back if a stop already
    /// arrived for it.
    fn started(&mut self, stream_id: String, cleanup: CleanupHandle) -> Option<CleanupHandle> {
        self.starting.remove(&stream_id);
        if self.stopped.remove(&stream_id) {
            return Some(cleanup);
        }
        self.active.insert(stream_id, cleanup);
        None
    }

    fn failed(&mut self, stream_id: &str) {
        self.starting.remove(stream_id);
        self.stopped.remove(stream_id);
    }

    /// Take the cleanup of an open stream. A stop for a stream still
    /// starting is remembered until the start settles; any other id is
    /// ignored.
    fn stop(&mut self, stream_id: &str) -> Option<CleanupHandle> {
        if let Some(cleanup) = self.active.remove(stream_id) {
            return Some(cleanup);
        }
        if self.starting.contains(stream_id) {
            self.stopped.insert(stream_id.to_string());
        }
        None
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serves a [`Registry`] over line-delimited JSON.
#[derive(Debug, Clone)]
pub struct Server {
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve on stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one connection until the caller closes it.
    ///
    /// Invocations run concurrently; replies are written as they settle.
    /// When the connection ends every stream still open is released.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(writer, rx));
        let mut conn = Connection {
            tx,
            streams: Arc::new(Mutex::new(Streams::default())),
            calls: JoinSet::new(),
            forwarders: JoinSet::new(),
        };

        let mut reader = BufReader::new(reader);
        while let Some(frame) = read_frame(&mut reader).await? {
            let message = frame.and_then(|line| {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                Message::parse(&line).map(Some)
            });
            match message {
                Ok(Some(message)) => self.dispatch(message, &mut conn),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "dropping malformed frame"),
            }
        }

        while conn.calls.join_next().await.is_some() {}

        let open: Vec<_> = lock(&conn.streams).active.drain().collect();
        info!(streams = open.len(), "connection closed, releasing streams");
        for (stream_id, cleanup) in open {
            debug!(stream = %stream_id, "releasing stream");
            cleanup.release();
        }

        conn.forwarders.abort_all();
        drop(conn);
        writer.await?
    }

    fn dispatch(&self, message: Message, conn: &mut Connection) {
        match message {
            Message::Invoke {
                id,
                tool_id,
                function_name,
                params,
            } => {
                debug!(tool = %tool_id, function = %function_name, "invoke");
                let registry = self.registry.clone();
                let tx = conn.tx.clone();
                conn.calls.spawn(async move {
                    let reply = match registry.get(&tool_id) {
                        Some(functions) => {
                            let result = runtime::invoke(Some(functions), &function_name, params).await;
                            Message::reply(id, result)
                        }
                        None => unknown_tool(id, tool_id),
                    };
                    let _ = tx.send(reply);
                });
            }
            Message::StartStream {
                id,
                stream_id,
                tool_id,
                function_name,
                params,
            } => {
                debug!(tool = %tool_id, function = %function_name, stream = %stream_id, "start stream");
                let registry = self.registry.clone();
                let tx = conn.tx.clone();
                let streams = conn.streams.clone();
                lock(&streams).begin(&stream_id);
                let (sink, mut signals) = StreamSink::channel();

                let forward_tx = tx.clone();
                let forward_id = stream_id.clone();
                conn.forwarders.spawn(async move {
                    while let Some(signal) = signals.recv().await {
                        if forward_tx.send(Message::from_signal(forward_id.clone(), signal)).is_err() {
                            break;
                        }
                    }
                });

                conn.calls.spawn(async move {
                    let Some(functions) = registry.get(&tool_id) else {
                        lock(&streams).failed(&stream_id);
                        let _ = tx.send(unknown_tool(id, tool_id));
                        return;
                    };
                    match runtime::start_stream(Some(functions), &function_name, params, sink).await {
                        Ok(cleanup) => {
                            let stopped = lock(&streams).started(stream_id.clone(), cleanup);
                            if let Some(cleanup) = stopped {
                                debug!(stream = %stream_id, "stream stopped during start");
                                cleanup.release();
                            }
                            let _ = tx.send(Message::reply::<String>(id, Ok(Value::Null)));
                        }
                        Err(err) => {
                            lock(&streams).failed(&stream_id);
                            let _ = tx.send(Message::reply(id, Err::<Value, _>(err)));
                        }
                    }
                });
            }
            Message::StopStream { stream_id } => {
                let cleanup = lock(&conn.streams).stop(&stream_id);
                match cleanup {
                    Some(cleanup) => {
                        debug!(stream = %stream_id, "stop stream");
                        cleanup.release();
                    }
                    None => debug!(stream = %stream_id, "stop for stream not open"),
                }
            }
            other => warn!(kind = other.kind(), "unexpected frame from caller"),
        }
    }
}

fn unknown_tool(id: RequestId, tool_id: String) -> Message {
    warn!(tool = %tool_id, "unknown tool");
    Message::reply(id, Err::<Value, _>(Error::UnknownTool(tool_id)))
}

/// Write queued frames until every sender is gone.
pub(crate) async fn write_frames<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Message>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let line = message.to_line()?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use toolspec::FunctionTable;

    fn registry() -> Registry {
        let mut functions = FunctionTable::new();
        functions.register("double", |params: Value| async move {
            Ok(json!(params["n"].as_i64().unwrap_or(0) * 2))
        });
        let mut registry = Registry::new();
        registry.register("math", functions);
        registry
    }

    async fn exchange(frames: &[&str]) -> Vec<Message> {
        let (mut client, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = Server::new(registry());
        let handle = tokio::spawn(async move { server.serve(server_read, server_write).await });

        for frame in frames {
            client.write_all(frame.as_bytes()).await.unwrap();
            client.write_all(b"\n").await.unwrap();
        }
        let (read_half, mut write_half) = tokio::io::split(client);
        write_half.shutdown().await.unwrap();
        drop(write_half);

        let mut replies = Vec::new();
        let mut lines = BufReader::new(read_half).lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            replies.push(Message::parse(&line).unwrap());
        }
        handle.await.unwrap().unwrap();
        replies
    }

    #[test]
    fn stops_are_only_remembered_for_starting_streams() {
        let mut streams = Streams::default();
        assert!(streams.stop("never-started").is_none());
        assert!(streams.stopped.is_empty());

        streams.begin("s1");
        assert!(streams.stop("s1").is_none());
        let early = streams.started("s1".into(), CleanupHandle::new(|| {}));
        assert!(early.is_some());
        assert!(streams.active.is_empty());

        streams.begin("s2");
        assert!(streams.started("s2".into(), CleanupHandle::new(|| {})).is_none());
        assert!(streams.stop("s2").is_some());
        assert!(streams.stop("s2").is_none());

        streams.begin("s3");
        streams.stop("s3");
        streams.failed("s3");
        assert!(streams.stop("s3").is_none());

        assert!(streams.starting.is_empty());
        assert!(streams.stopped.is_empty());
        assert!(streams.active.is_empty());
    }

    #[tokio::test]
    async fn answers_invocations_and_skips_garbage() {
        let replies = exchange(&[
            "not json",
            r#"{"type":"invoke","id":1,"toolId":"math","functionName":"double","params":{"n":21}}"#,
        ])
        .await;
        assert_eq!(
            replies,
            vec![Message::Result {
                id: RequestId::Number(1),
                value: Some(json!(42)),
                error: None,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_function_are_reported() {
        let mut replies = exchange(&[
            r#"{"type":"invoke","id":1,"toolId":"nope","functionName":"double"}"#,
            r#"{"type":"invoke","id":2,"toolId":"math","functionName":"triple"}"#,
        ])
        .await;
        replies.sort_by_key(|m| match m {
            Message::Result {
                id: RequestId::Number(n),
                ..
            } => *n,
            _ => 0,
        });
        let errors: Vec<_> = replies
            .into_iter()
            .filter_map(|m| match m {
                Message::Result { error, .. } => error,
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec!["unknown tool: nope", "function not found: triple"]);
    }
}
