//! Developer-supplied functions and the table that names them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::FunctionError;
use crate::event::StreamEvent;

/// An asynchronous request/response function (data loader, item updater,
/// action, form submit).
#[async_trait]
pub trait ToolFunction: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value, FunctionError>;
}

/// A function that opens a long-lived stream of [`StreamEvent`]s.
///
/// Implementations report through `sink` and must hand back a
/// [`CleanupHandle`] that tears the stream down.
#[async_trait]
pub trait StreamFunction: Send + Sync {
    async fn start(&self, params: Value, sink: StreamSink) -> Result<CleanupHandle, FunctionError>;
}

struct FnFunction<F>(F);

#[async_trait]
impl<F, Fut> ToolFunction for FnFunction<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, FunctionError>> + Send,
{
    async fn call(&self, params: Value) -> Result<Value, FunctionError> {
        (self.0)(params).await
    }
}

struct FnStream<F>(F);

#[async_trait]
impl<F, Fut> StreamFunction for FnStream<F>
where
    F: Fn(Value, StreamSink) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CleanupHandle, FunctionError>> + Send,
{
    async fn start(&self, params: Value, sink: StreamSink) -> Result<CleanupHandle, FunctionError> {
        (self.0)(params, sink).await
    }
}

/// What a function name resolves to.
#[derive(Clone)]
pub enum Binding {
    Call(Arc<dyn ToolFunction>),
    Stream(Arc<dyn StreamFunction>),
    /// Declared but never wired to a callable.
    Unbound,
}

impl Binding {
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Call(_) => "function",
            Binding::Stream(_) => "stream",
            Binding::Unbound => "unbound",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Function name to callable mapping for one tool.
///
/// Cloning is cheap; the callables are shared.
#[derive(Clone, Default)]
pub struct FunctionTable {
    bindings: HashMap<String, Binding>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
    {
        self.insert(name, FnFunction(f))
    }

    /// Register an async closure that opens a stream.
    pub fn register_stream<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value, StreamSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CleanupHandle, FunctionError>> + Send + 'static,
    {
        self.insert_stream(name, FnStream(f))
    }

    pub fn insert(&mut self, name: impl Into<String>, function: impl ToolFunction + 'static) -> &mut Self {
        self.bindings
            .insert(name.into(), Binding::Call(Arc::new(function)));
        self
    }

    pub fn insert_stream(
        &mut self,
        name: impl Into<String>,
        function: impl StreamFunction + 'static,
    ) -> &mut Self {
        self.bindings
            .insert(name.into(), Binding::Stream(Arc::new(function)));
        self
    }

    /// Record a name without a callable.
    pub fn declare(&mut self, name: impl Into<String>) -> &mut Self {
        self.bindings.entry(name.into()).or_insert(Binding::Unbound);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.bindings.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map().entries(entries).finish()
    }
}

/// Signal emitted by a running stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Data(StreamEvent),
    Error(String),
    Connect,
    Disconnect,
}

/// The four stream handlers (`onData`, `onError`, `onConnect`,
/// `onDisconnect`), backed by an ordered channel.
///
/// Each method returns `false` once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: mpsc::UnboundedSender<StreamSignal>,
}

impl StreamSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn data(&self, event: StreamEvent) -> bool {
        self.send(StreamSignal::Data(event))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(StreamSignal::Error(message.into()))
    }

    pub fn connect(&self) -> bool {
        self.send(StreamSignal::Connect)
    }

    pub fn disconnect(&self) -> bool {
        self.send(StreamSignal::Disconnect)
    }

    pub fn send(&self, signal: StreamSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Releases a stream's resources.
///
/// The closure runs at most once: on [`CleanupHandle::release`], or on
/// drop if it was never released explicitly.
pub struct CleanupHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CleanupHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("pending", &self.release.is_some())
            .finish()
    }
}
