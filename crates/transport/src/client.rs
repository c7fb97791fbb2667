//! Calls developer functions hosted by a remote [`Server`](crate::Server).
//!
//! [`Client::functions_for`] turns a tool specification's function names
//! into a local [`FunctionTable`] whose entries forward over the
//! connection, so the runtime can render a tool whose functions live
//! elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use toolspec::{
    CleanupHandle, Content, FunctionError, FunctionTable, StreamFunction, StreamSink, ToolFunction,
    ToolSpec,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{Message, RequestId, into_result, read_frame};
use crate::server::write_frames;

/// Where incoming frames are delivered.
#[derive(Default)]
struct Routes {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Message>>>,
    streams: Mutex<HashMap<String, StreamSink>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    outgoing: mpsc::UnboundedSender<Message>,
    routes: Arc<Routes>,
    next_id: AtomicI64,
}

/// Handle to one connection. Cloning shares the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Start the reader and writer tasks for a connection.
    ///
    /// The connection stays open while any clone of the client, or any
    /// function or cleanup handle created from it, is alive.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing, rx) = mpsc::unbounded_channel();
        let routes = Arc::new(Routes::default());

        tokio::spawn(async move {
            if let Err(err) = write_frames(writer, rx).await {
                warn!(error = %err, "transport writer stopped");
            }
        });
        tokio::spawn(read_frames(reader, routes.clone()));

        Self {
            inner: Arc::new(Inner {
                outgoing,
                routes,
                next_id: AtomicI64::new(1),
            }),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request(&self, id: RequestId, message: Message) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.routes.pending).insert(id.clone(), tx);

        if self.inner.outgoing.send(message).is_err() {
            lock(&self.inner.routes.pending).remove(&id);
            return Err(Error::ConnectionClosed);
        }

        match rx.await.map_err(|_| Error::ConnectionClosed)? {
            Message::Result { value, error, .. } => into_result(value, error),
            other => Err(Error::UnexpectedFrame(other.kind())),
        }
    }

    /// Invoke a request/response function of `tool_id`.
    pub async fn invoke(&self, tool_id: &str, function_name: &str, params: Value) -> Result<Value> {
        let id = self.next_request_id();
        debug!(tool = tool_id, function = function_name, ?id, "remote invoke");
        let message = Message::Invoke {
            id: id.clone(),
            tool_id: tool_id.to_string(),
            function_name: function_name.to_string(),
            params,
        };
        self.request(id, message).await
    }

    /// Start a remote stream whose signals are delivered to `sink`.
    ///
    /// The returned handle sends `stop-stream` when released.
    pub async fn start_stream(
        &self,
        tool_id: &str,
        function_name: &str,
        params: Value,
        sink: StreamSink,
    ) -> Result<CleanupHandle> {
        let stream_id = Uuid::new_v4().to_string();
        let id = self.next_request_id();
        debug!(tool = tool_id, function = function_name, stream = %stream_id, "remote stream start");

        lock(&self.inner.routes.streams).insert(stream_id.clone(), sink);
        let message = Message::StartStream {
            id: id.clone(),
            stream_id: stream_id.clone(),
            tool_id: tool_id.to_string(),
            function_name: function_name.to_string(),
            params,
        };
        if let Err(err) = self.request(id, message).await {
            lock(&self.inner.routes.streams).remove(&stream_id);
            return Err(err);
        }

        let outgoing = self.inner.outgoing.clone();
        let routes = self.inner.routes.clone();
        Ok(CleanupHandle::new(move || {
            lock(&routes.streams).remove(&stream_id);
            debug!(stream = %stream_id, "remote stream stop");
            let _ = outgoing.send(Message::StopStream { stream_id });
        }))
    }

    pub fn remote_function(&self, tool_id: impl Into<String>, name: impl Into<String>) -> RemoteFunction {
        RemoteFunction {
            client: self.clone(),
            tool_id: tool_id.into(),
            name: name.into(),
        }
    }

    pub fn remote_stream(&self, tool_id: impl Into<String>, name: impl Into<String>) -> RemoteStream {
        RemoteStream {
            client: self.clone(),
            tool_id: tool_id.into(),
            name: name.into(),
        }
    }

    /// A function table forwarding every function `spec` references.
    ///
    /// A live grid's stream name is bound as a stream; all other names as
    /// request/response functions.
    pub fn functions_for(&self, spec: &ToolSpec) -> FunctionTable {
        let stream = match &spec.content {
            Content::LiveGrid(content) => Some(content.stream.as_str()),
            _ => None,
        };
        let mut functions = FunctionTable::new();
        for name in spec.content.function_names() {
            if Some(name) == stream {
                functions.insert_stream(name, self.remote_stream(&spec.id, name));
            } else {
                functions.insert(name, self.remote_function(&spec.id, name));
            }
        }
        functions
    }
}

/// Route server frames until the connection closes, then fail everything
/// still waiting on it.
async fn read_frames<R>(reader: R, routes: Arc<Routes>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let line = match read_frame(&mut reader).await {
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(err))) => {
                warn!(error = %err, "dropping malformed frame");
                continue;
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "transport read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let message = match Message::parse(&line) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                continue;
            }
        };

        if let Message::Result { id, .. } = &message {
            let waiting = lock(&routes.pending).remove(id);
            match waiting {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => warn!(?id, "result for unknown request"),
            }
            continue;
        }

        let kind = message.kind();
        match message.into_signal() {
            Some((stream_id, signal)) => {
                let sink = lock(&routes.streams).get(&stream_id).cloned();
                match sink {
                    Some(sink) => {
                        sink.send(signal);
                    }
                    None => debug!(stream = %stream_id, kind, "frame for closed stream"),
                }
            }
            None => warn!(kind, "unexpected frame from server"),
        }
    }

    lock(&routes.pending).clear();
    let streams: Vec<_> = lock(&routes.streams).drain().collect();
    for (_, sink) in streams {
        sink.error("connection closed");
        sink.disconnect();
    }
}

/// A request/response function hosted by the server.
pub struct RemoteFunction {
    client: Client,
    tool_id: String,
    name: String,
}

#[async_trait]
impl ToolFunction for RemoteFunction {
    async fn call(&self, params: Value) -> std::result::Result<Value, FunctionError> {
        self.client
            .invoke(&self.tool_id, &self.name, params)
            .await
            .map_err(|err| FunctionError::new(err.to_string()))
    }
}

/// A streaming function hosted by the server.
pub struct RemoteStream {
    client: Client,
    tool_id: String,
    name: String,
}

#[async_trait]
impl StreamFunction for RemoteStream {
    async fn start(
        &self,
        params: Value,
        sink: StreamSink,
    ) -> std::result::Result<CleanupHandle, FunctionError> {
        self.client
            .start_stream(&self.tool_id, &self.name, params, sink)
            .await
            .map_err(|err| FunctionError::new(err.to_string()))
    }
}
