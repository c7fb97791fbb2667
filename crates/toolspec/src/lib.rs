//! Declarative tool specifications and the developer functions behind them.
//!
//! A tool specification describes one data-bound interface: a record view,
//! an action button, a form, an editable grid, or a live-updating grid.
//! The specification names the developer functions it needs by string key;
//! the embedding application supplies a [`FunctionTable`] that resolves
//! those names to asynchronous callables.
//!
//! # Core Concepts
//!
//! ## ToolSpec
//!
//! A [`ToolSpec`] carries a stable `id`, a `title`, optional filter
//! [`InputConfig`]s, the [`Content`] variant, and the function table. It is
//! built once and never mutated by the runtime.
//!
//! ## Functions
//!
//! Two function shapes are supported:
//! - [`ToolFunction`]: request/response (data loaders, item updaters,
//!   actions, form submits).
//! - [`StreamFunction`]: opens a stream, reports through a [`StreamSink`]
//!   and returns a [`CleanupHandle`].
//!
//! ## Rows and events
//!
//! Rows are open-ended JSON objects ([`Row`]) identified by a configured
//! field ([`RowId`]). Loaders return a [`PageResult`]; live grids consume
//! ordered [`StreamEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use toolspec::{Column, Content, EditableGridContent, FunctionTable, ToolSpec};
//!
//! let mut functions = FunctionTable::new();
//! functions.register("loadUsers", |_params| async {
//!     Ok(json!({"items": [{"id": 1, "name": "Ada"}], "totalItems": 1}))
//! });
//!
//! let spec = ToolSpec::new(
//!     "users",
//!     "Users",
//!     Content::EditableGrid(EditableGridContent {
//!         data_loader: "loadUsers".into(),
//!         item_updater: None,
//!         columns: vec![Column::new("id"), Column::new("name").sortable()],
//!         page_size: Some(20),
//!         default_sort: None,
//!         row_identifier: None,
//!     }),
//! )
//! .with_functions(functions);
//! ```

mod error;
mod event;
mod function;
mod row;
mod spec;

pub use error::{Error, FunctionError, Result};
pub use event::StreamEvent;
pub use function::{
    Binding, CleanupHandle, FunctionTable, StreamFunction, StreamSignal, StreamSink, ToolFunction,
};
pub use row::{PageResult, Row, RowId};
pub use spec::{
    ActionButtonContent, Column, Content, EditableGridContent, EditorType, FormContent, FormField,
    FormatterKind, InputConfig, InputKind, LiveGridContent, RecordViewContent, SortDirection,
    SortSpec, ToolSpec, capitalize,
};
