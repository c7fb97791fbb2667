//! Incremental events delivered to a live grid.

use serde::{Deserialize, Serialize};

use crate::row::{Row, RowId};

/// One ordered change to a live row set.
///
/// `Update` and `Delete` address rows by identity, never by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// A new row, shown first.
    Add { item: Row },
    /// Shallow-merge `changes` into an existing row.
    Update { item_id: RowId, changes: Row },
    /// Remove a row.
    Delete { item_id: RowId },
    /// Discard everything and load `items`.
    Replace { items: Vec<Row> },
    /// Discard everything.
    Clear,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Add { .. } => "add",
            StreamEvent::Update { .. } => "update",
            StreamEvent::Delete { .. } => "delete",
            StreamEvent::Replace { .. } => "replace",
            StreamEvent::Clear => "clear",
        }
    }
}
