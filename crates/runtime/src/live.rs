//! Live grid: an identity-indexed row cache kept in sync with an ordered
//! stream of events.
//!
//! The stream function is started once per connection and hands back a
//! [`CleanupHandle`]. The grid owns that handle and releases it exactly
//! once, on [`LiveGrid::disconnect`], on reconnect, or when the grid is
//! dropped.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use toolspec::{
    CleanupHandle, FunctionTable, LiveGridContent, Row, RowId, StreamEvent, StreamSignal,
    StreamSink,
};
use tracing::{debug, info, warn};

use crate::format::format_value;
use crate::invoke::start_stream;
use crate::view::{CellView, HeaderView, RowView, TableView, View};
use crate::{InvokeError, RuntimeConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error(String),
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => f.write_str("Connecting..."),
            ConnectionStatus::Connected => f.write_str("Connected"),
            ConnectionStatus::Error(message) => write!(f, "Error: {message}"),
            ConnectionStatus::Disconnected => f.write_str("Disconnected"),
        }
    }
}

pub struct LiveGrid {
    content: LiveGridContent,
    functions: FunctionTable,
    config: Arc<RuntimeConfig>,
    row_identifier: String,
    rows: HashMap<RowId, Row>,
    /// Most recent first.
    order: VecDeque<RowId>,
    status: ConnectionStatus,
    signals: Option<mpsc::UnboundedReceiver<StreamSignal>>,
    cleanup: Option<CleanupHandle>,
}

impl LiveGrid {
    pub fn new(
        content: LiveGridContent,
        functions: FunctionTable,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        let row_identifier = content
            .row_identifier
            .clone()
            .unwrap_or_else(|| config.row_identifier.clone());
        Self {
            content,
            functions,
            config,
            row_identifier,
            rows: HashMap::new(),
            order: VecDeque::new(),
            status: ConnectionStatus::Disconnected,
            signals: None,
            cleanup: None,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.cleanup.is_some()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Visible rows, most recent first.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    pub fn get(&self, id: &RowId) -> Option<&Row> {
        self.rows.get(id)
    }

    fn max_rows(&self) -> Option<usize> {
        self.content.max_rows.filter(|&n| n > 0)
    }

    /// Apply one event. Events must be applied in arrival order.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Add { item } => {
                if self.insert_front(item) {
                    self.evict();
                }
            }
            StreamEvent::Update { item_id, changes } => match self.rows.get_mut(&item_id) {
                Some(row) => {
                    for (key, value) in changes {
                        row.insert(key, value);
                    }
                }
                None => debug!(row = %item_id, "update for unknown row ignored"),
            },
            StreamEvent::Delete { item_id } => {
                if self.rows.remove(&item_id).is_some() {
                    self.order.retain(|id| *id != item_id);
                } else {
                    debug!(row = %item_id, "delete for unknown row ignored");
                }
            }
            StreamEvent::Replace { items } => {
                self.clear();
                for item in items {
                    self.insert_front(item);
                }
            }
            StreamEvent::Clear => self.clear(),
        }
    }

    /// Returns `false` if the row had no usable identity.
    fn insert_front(&mut self, item: Row) -> bool {
        let Some(id) = RowId::of(&item, &self.row_identifier) else {
            warn!(
                field = %self.row_identifier,
                "live row without identity ignored"
            );
            return false;
        };
        if self.rows.insert(id.clone(), item).is_some() {
            self.order.retain(|existing| *existing != id);
        }
        self.order.push_front(id);
        true
    }

    fn evict(&mut self) {
        let Some(limit) = self.max_rows() else {
            return;
        };
        let mut evicted = 0;
        while self.order.len() > limit {
            if let Some(id) = self.order.pop_back() {
                self.rows.remove(&id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, limit, "evicted oldest live rows");
        }
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.order.clear();
    }

    /// Apply a transport signal. Errors touch only the status.
    pub fn apply_signal(&mut self, signal: StreamSignal) {
        match signal {
            StreamSignal::Data(event) => self.apply(event),
            StreamSignal::Error(message) => {
                warn!(error = %message, "live stream error");
                self.status = ConnectionStatus::Error(message);
            }
            StreamSignal::Connect => {
                info!(stream = %self.content.stream, "live stream connected");
                self.status = ConnectionStatus::Connected;
            }
            StreamSignal::Disconnect => {
                info!(stream = %self.content.stream, "live stream disconnected");
                self.status = ConnectionStatus::Disconnected;
            }
        }
    }

    /// Start the stream function with the current filter values.
    ///
    /// Any previous connection is released first. On failure the status
    /// shows the error and no handle is retained.
    pub async fn connect(&mut self, filters: &Map<String, Value>) -> Result<(), InvokeError> {
        self.disconnect();
        self.status = ConnectionStatus::Connecting;

        let (sink, rx) = StreamSink::channel();
        let params = Value::Object(filters.clone());
        match start_stream(Some(&self.functions), &self.content.stream, params, sink).await {
            Ok(cleanup) => {
                debug!(stream = %self.content.stream, "live stream started");
                self.cleanup = Some(cleanup);
                self.signals = Some(rx);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: InvokeError) -> InvokeError {
        warn!(stream = %self.content.stream, error = %err, "live stream failed to start");
        self.status = ConnectionStatus::Error(err.to_string());
        err
    }

    /// Release the current connection, if any.
    pub fn disconnect(&mut self) {
        self.signals = None;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.release();
            self.status = ConnectionStatus::Disconnected;
            info!(stream = %self.content.stream, "live stream released");
        }
    }

    /// Restart the stream with new filter values. Cached rows are kept
    /// until the new stream replaces or clears them.
    pub async fn reconnect(&mut self, filters: &Map<String, Value>) -> Result<(), InvokeError> {
        self.connect(filters).await
    }

    /// Apply every signal already delivered. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = self.signals.as_mut() {
            while let Ok(signal) = rx.try_recv() {
                pending.push(signal);
            }
        }
        let count = pending.len();
        for signal in pending {
            self.apply_signal(signal);
        }
        count
    }

    /// Wait for the next signal and apply it. Returns `false` once the
    /// stream has no senders left.
    pub async fn next(&mut self) -> bool {
        let Some(rx) = self.signals.as_mut() else {
            return false;
        };
        match rx.recv().await {
            Some(signal) => {
                self.apply_signal(signal);
                true
            }
            None => {
                self.signals = None;
                if self.status != ConnectionStatus::Disconnected {
                    debug!(stream = %self.content.stream, "live stream ended");
                    self.status = ConnectionStatus::Disconnected;
                }
                false
            }
        }
    }

    pub fn view(&self) -> View {
        let body = if self.order.is_empty() {
            View::Empty("Waiting for data...".into())
        } else {
            View::Table(TableView {
                headers: self
                    .content
                    .columns
                    .iter()
                    .map(|c| HeaderView {
                        field: c.field.clone(),
                        label: c.label.clone(),
                        sortable: false,
                        sort: None,
                    })
                    .collect(),
                rows: self
                    .order
                    .iter()
                    .filter_map(|id| self.rows.get(id).map(|row| (id, row)))
                    .map(|(id, row)| RowView {
                        id: Some(id.clone()),
                        cells: self
                            .content
                            .columns
                            .iter()
                            .map(|c| {
                                CellView::Text(format_value(
                                    c.formatter.unwrap_or_default(),
                                    row.get(&c.field),
                                    &self.config,
                                ))
                            })
                            .collect(),
                        actions: Vec::new(),
                    })
                    .collect(),
                pagination: None,
            })
        };

        View::Section {
            title: String::new(),
            children: vec![View::Status(self.status.to_string()), body],
        }
    }
}

impl Drop for LiveGrid {
    fn drop(&mut self) {
        self.disconnect();
    }
}
