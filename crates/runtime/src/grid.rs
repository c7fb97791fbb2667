//! Editable grid engine: server-side pagination and sorting plus inline
//! row editing.
//!
//! Every page fetch goes through [`EditableGrid::begin_fetch`] and
//! [`EditableGrid::complete_fetch`]. Each fetch is stamped with a
//! generation; only the latest generation may change what is displayed, so
//! a slow response to an older request can never overwrite a newer one.
//!
//! Row editing is a per-instance state machine:
//!
//! ```text
//! Viewing --edit--> Editing --save--> Saving --ok--> Viewing
//!                      ^  |              |
//!                      |  +--cancel--> Viewing
//!                      +------err--------+
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use toolspec::{
    Column, EditableGridContent, EditorType, FunctionTable, PageResult, Row, RowId, SortDirection,
    SortSpec,
};
use tracing::{debug, info, warn};

use crate::format::{format_value, input_text};
use crate::inputs::parse_number;
use crate::invoke::invoke;
use crate::view::{ButtonView, CellView, HeaderView, PaginationView, RowView, TableView, View};
use crate::{GridError, InvokeError, RuntimeConfig};

/// What the grid body currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum GridStatus {
    /// Nothing requested yet.
    Idle,
    Loading,
    Loaded(PageResult),
    /// Load or shape failure; prior rows are discarded.
    Failed(String),
}

/// Edit state of the grid's single editable row.
#[derive(Debug, Clone, PartialEq)]
pub enum EditState {
    Viewing,
    Editing {
        row_id: RowId,
        draft: Map<String, Value>,
        error: Option<String>,
    },
    Saving {
        row_id: RowId,
        draft: Map<String, Value>,
    },
}

/// A page fetch that has been issued but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub params: Value,
}

/// A row save that has been issued but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    pub row_id: RowId,
    pub changes: Row,
    pub params: Value,
}

/// Result of [`EditableGrid::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// No field changed; nothing was invoked.
    Unchanged,
    Saved,
    /// The updater failed; the row is back in Editing.
    Rejected(String),
}

pub struct EditableGrid {
    content: EditableGridContent,
    functions: FunctionTable,
    config: Arc<RuntimeConfig>,
    row_identifier: String,
    page_size: usize,
    current_page: usize,
    sort: Option<SortSpec>,
    status: GridStatus,
    edit: EditState,
    generation: u64,
    notice: Option<String>,
}

impl EditableGrid {
    pub fn new(
        content: EditableGridContent,
        functions: FunctionTable,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        let page_size = content
            .page_size
            .filter(|&n| n > 0)
            .unwrap_or(config.default_page_size);
        let row_identifier = content
            .row_identifier
            .clone()
            .unwrap_or_else(|| config.row_identifier.clone());
        let sort = content.default_sort.clone();

        Self {
            content,
            functions,
            config,
            row_identifier,
            page_size,
            current_page: 1,
            sort,
            status: GridStatus::Idle,
            edit: EditState::Viewing,
            generation: 0,
            notice: None,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn status(&self) -> &GridStatus {
        &self.status
    }

    pub fn edit_state(&self) -> &EditState {
        &self.edit
    }

    /// Last save failure, shown until the next edit action.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Rows of the last successfully loaded page.
    pub fn rows(&self) -> &[Row] {
        match &self.status {
            GridStatus::Loaded(page) => &page.items,
            _ => &[],
        }
    }

    pub fn total_items(&self) -> usize {
        match &self.status {
            GridStatus::Loaded(page) => page.total_items,
            _ => 0,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total_items().div_ceil(self.page_size).max(1)
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page * self.page_size < self.total_items()
    }

    /// Pagination controls appear only when there is more than one page.
    pub fn shows_pagination(&self) -> bool {
        self.total_items() > self.page_size
    }

    pub fn is_editable(&self) -> bool {
        self.content.item_updater.is_some() && self.content.columns.iter().any(|c| c.is_editable)
    }

    /// Parameters for fetching the current page.
    ///
    /// Filter values are spread last and override paging keys of the same
    /// name.
    pub fn fetch_params(&self, filters: &Map<String, Value>) -> Value {
        let mut params = Map::new();
        params.insert("page".into(), Value::from(self.current_page));
        params.insert("pageSize".into(), Value::from(self.page_size));
        if let Some(sort) = &self.sort {
            params.insert("sortField".into(), Value::String(sort.field.clone()));
            params.insert(
                "sortDirection".into(),
                Value::String(sort.direction.as_str().to_string()),
            );
        }
        for (key, value) in filters {
            params.insert(key.clone(), value.clone());
        }
        Value::Object(params)
    }

    /// Start a fetch of the current page: show the loading placeholder and
    /// issue a new generation.
    pub fn begin_fetch(&mut self, filters: &Map<String, Value>) -> FetchTicket {
        self.generation += 1;
        self.status = GridStatus::Loading;
        self.edit = EditState::Viewing;
        self.notice = None;
        FetchTicket {
            generation: self.generation,
            params: self.fetch_params(filters),
        }
    }

    /// Apply a fetch result. Returns `false` when the ticket is stale and
    /// the result was discarded.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Value, InvokeError>,
    ) -> bool {
        if ticket.generation != self.generation {
            debug!(
                generation = ticket.generation,
                latest = self.generation,
                "discarding stale page fetch"
            );
            return false;
        }

        self.status = match result {
            Ok(value) => match PageResult::from_value(value) {
                Ok(page) => {
                    debug!(
                        page = self.current_page,
                        rows = page.items.len(),
                        total = page.total_items,
                        "page loaded"
                    );
                    GridStatus::Loaded(page)
                }
                Err(err) => {
                    warn!(error = %err, "data loader returned an invalid page");
                    GridStatus::Failed(format!("Invalid data format: {err}"))
                }
            },
            Err(err) => GridStatus::Failed(err.to_string()),
        };
        true
    }

    /// Fetch the current page through the data loader.
    pub async fn load(&mut self, filters: &Map<String, Value>) {
        let ticket = self.begin_fetch(filters);
        let result = invoke(
            Some(&self.functions),
            &self.content.data_loader,
            ticket.params.clone(),
        )
        .await;
        self.complete_fetch(ticket, result);
    }

    /// Refetch in response to a filter change, starting over at page 1.
    pub async fn refresh(&mut self, filters: &Map<String, Value>) {
        self.current_page = 1;
        self.load(filters).await;
    }

    pub async fn next_page(&mut self, filters: &Map<String, Value>) -> Result<(), GridError> {
        if !self.has_next() {
            return Err(GridError::PageOutOfRange {
                page: self.current_page + 1,
            });
        }
        self.current_page += 1;
        self.load(filters).await;
        Ok(())
    }

    pub async fn previous_page(&mut self, filters: &Map<String, Value>) -> Result<(), GridError> {
        if !self.has_previous() {
            return Err(GridError::PageOutOfRange { page: 0 });
        }
        self.current_page -= 1;
        self.load(filters).await;
        Ok(())
    }

    pub async fn go_to_page(
        &mut self,
        page: usize,
        filters: &Map<String, Value>,
    ) -> Result<(), GridError> {
        if page == 0 || page > self.total_pages() {
            return Err(GridError::PageOutOfRange { page });
        }
        self.current_page = page;
        self.load(filters).await;
        Ok(())
    }

    /// Header click: toggle the active column, or switch to a new column
    /// ascending. Always resets to page 1. Rows are never sorted locally.
    pub fn select_sort(&mut self, field: &str) -> Result<(), GridError> {
        let sortable = self
            .content
            .columns
            .iter()
            .any(|c| c.field == field && c.is_sortable);
        if !sortable {
            return Err(GridError::NotSortable(field.to_string()));
        }

        self.sort = Some(match self.sort.take() {
            Some(active) if active.field == field => SortSpec {
                field: active.field,
                direction: active.direction.toggle(),
            },
            _ => SortSpec {
                field: field.to_string(),
                direction: SortDirection::Asc,
            },
        });
        self.current_page = 1;
        Ok(())
    }

    pub async fn sort_by(
        &mut self,
        field: &str,
        filters: &Map<String, Value>,
    ) -> Result<(), GridError> {
        self.select_sort(field)?;
        self.load(filters).await;
        Ok(())
    }

    fn find_row(&self, id: &RowId) -> Option<&Row> {
        self.rows()
            .iter()
            .find(|row| RowId::of(row, &self.row_identifier).as_ref() == Some(id))
    }

    fn editable_columns(&self) -> impl Iterator<Item = &Column> {
        self.content.columns.iter().filter(|c| c.is_editable)
    }

    /// Enter Editing for `id`, seeding inputs from the current values.
    ///
    /// Starting an edit abandons any other row's unsaved draft.
    pub fn begin_edit(&mut self, id: &RowId) -> Result<(), GridError> {
        if !self.is_editable() {
            return Err(GridError::ReadOnly);
        }
        if matches!(self.edit, EditState::Saving { .. }) {
            return Err(GridError::SaveInProgress);
        }
        let row = self
            .find_row(id)
            .ok_or_else(|| GridError::UnknownRow(id.clone()))?;

        let draft = self
            .editable_columns()
            .map(|c| (c.field.clone(), Value::String(input_text(row.get(&c.field)))))
            .collect();

        self.edit = EditState::Editing {
            row_id: id.clone(),
            draft,
            error: None,
        };
        self.notice = None;
        Ok(())
    }

    /// Change one input of the row under edit.
    pub fn update_draft(&mut self, field: &str, value: impl Into<String>) -> Result<(), GridError> {
        if !self.editable_columns().any(|c| c.field == field) {
            return Err(GridError::NotEditable(field.to_string()));
        }
        match &mut self.edit {
            EditState::Editing { draft, .. } => {
                draft.insert(field.to_string(), Value::String(value.into()));
                Ok(())
            }
            EditState::Saving { .. } => Err(GridError::SaveInProgress),
            EditState::Viewing => Err(GridError::NotEditing),
        }
    }

    /// Discard the draft. Cached values are untouched.
    pub fn cancel_edit(&mut self) -> Result<(), GridError> {
        match self.edit {
            EditState::Editing { .. } => {
                self.edit = EditState::Viewing;
                self.notice = None;
                Ok(())
            }
            EditState::Saving { .. } => Err(GridError::SaveInProgress),
            EditState::Viewing => Err(GridError::NotEditing),
        }
    }

    /// Editable fields whose input text differs from the cached value.
    fn diff(&self, row: &Row, draft: &Map<String, Value>) -> Row {
        let mut changes = Row::new();
        for column in self.editable_columns() {
            let Some(Value::String(new)) = draft.get(&column.field) else {
                continue;
            };
            if *new != input_text(row.get(&column.field)) {
                changes.insert(column.field.clone(), coerce_edit(column.editor_type, new));
            }
        }
        changes
    }

    /// Move the row under edit to Saving. Returns `None` when nothing
    /// changed, in which case the edit is simply closed.
    pub fn prepare_save(&mut self) -> Result<Option<SaveTicket>, GridError> {
        let (row_id, draft) = match &self.edit {
            EditState::Editing { row_id, draft, .. } => (row_id.clone(), draft.clone()),
            EditState::Saving { .. } => return Err(GridError::SaveInProgress),
            EditState::Viewing => return Err(GridError::NotEditing),
        };
        let row = self
            .find_row(&row_id)
            .ok_or_else(|| GridError::UnknownRow(row_id.clone()))?;

        let changes = self.diff(row, &draft);
        if changes.is_empty() {
            debug!(row = %row_id, "save without changes");
            self.edit = EditState::Viewing;
            return Ok(None);
        }

        let item_id = row
            .get(&self.row_identifier)
            .cloned()
            .unwrap_or_else(|| Value::String(row_id.to_string()));
        let params = serde_json::json!({
            "itemId": item_id,
            "changes": changes,
            "currentItem": row,
        });
        self.edit = EditState::Saving {
            row_id: row_id.clone(),
            draft,
        };
        Ok(Some(SaveTicket {
            row_id,
            changes,
            params,
        }))
    }

    /// Apply an updater result.
    ///
    /// Success merges the returned object (or the change set if nothing
    /// usable came back) into the cached row. Failure returns to Editing
    /// with the draft preserved and the row untouched.
    pub fn complete_save(&mut self, ticket: SaveTicket, result: Result<Value, InvokeError>) -> SaveOutcome {
        let still_saving = matches!(
            &self.edit,
            EditState::Saving { row_id, .. } if *row_id == ticket.row_id
        );

        match result {
            Ok(value) => {
                let merge = match value {
                    Value::Object(updated) => updated,
                    _ => ticket.changes,
                };
                let identifier = self.row_identifier.clone();
                if let GridStatus::Loaded(page) = &mut self.status {
                    if let Some(row) = page
                        .items
                        .iter_mut()
                        .find(|row| RowId::of(row, &identifier).as_ref() == Some(&ticket.row_id))
                    {
                        for (key, value) in merge {
                            row.insert(key, value);
                        }
                    }
                }
                if still_saving {
                    self.edit = EditState::Viewing;
                }
                self.notice = None;
                info!(row = %ticket.row_id, "row saved");
                SaveOutcome::Saved
            }
            Err(err) => {
                let message = err.to_string();
                warn!(row = %ticket.row_id, error = %message, "row save failed");
                if still_saving {
                    if let EditState::Saving { row_id, draft } =
                        std::mem::replace(&mut self.edit, EditState::Viewing)
                    {
                        self.edit = EditState::Editing {
                            row_id,
                            draft,
                            error: Some(message.clone()),
                        };
                    }
                }
                self.notice = Some(message.clone());
                SaveOutcome::Rejected(message)
            }
        }
    }

    /// Save the row under edit through the item updater.
    pub async fn save(&mut self) -> Result<SaveOutcome, GridError> {
        let updater = self
            .content
            .item_updater
            .clone()
            .ok_or(GridError::ReadOnly)?;
        let Some(ticket) = self.prepare_save()? else {
            return Ok(SaveOutcome::Unchanged);
        };
        let result = invoke(Some(&self.functions), &updater, ticket.params.clone()).await;
        Ok(self.complete_save(ticket, result))
    }

    pub fn view(&self) -> View {
        let page = match &self.status {
            GridStatus::Idle | GridStatus::Loading => return View::Loading("Loading...".into()),
            GridStatus::Failed(message) => return View::Error(message.clone()),
            GridStatus::Loaded(page) => page,
        };
        if page.items.is_empty() {
            return View::Empty("No items found".into());
        }

        let table = View::Table(TableView {
            headers: self.headers(),
            rows: page.items.iter().map(|row| self.row_view(row)).collect(),
            pagination: self.shows_pagination().then(|| PaginationView {
                page: self.current_page,
                total_pages: self.total_pages(),
                total_items: page.total_items,
                has_previous: self.has_previous(),
                has_next: self.has_next(),
            }),
        });

        match &self.notice {
            Some(notice) => View::Section {
                title: String::new(),
                children: vec![View::Notice(notice.clone()), table],
            },
            None => table,
        }
    }

    fn headers(&self) -> Vec<HeaderView> {
        self.content
            .columns
            .iter()
            .map(|c| HeaderView {
                field: c.field.clone(),
                label: c.label.clone(),
                sortable: c.is_sortable,
                sort: self
                    .sort
                    .as_ref()
                    .filter(|s| s.field == c.field)
                    .map(|s| s.direction),
            })
            .collect()
    }

    fn row_view(&self, row: &Row) -> RowView {
        let id = RowId::of(row, &self.row_identifier);
        let (draft, saving) = match (&self.edit, &id) {
            (EditState::Editing { row_id, draft, .. }, Some(id)) if row_id == id => {
                (Some(draft), false)
            }
            (EditState::Saving { row_id, draft }, Some(id)) if row_id == id => (Some(draft), true),
            _ => (None, false),
        };

        let cells = self
            .content
            .columns
            .iter()
            .map(|c| match draft {
                Some(draft) if c.is_editable => CellView::Editor {
                    field: c.field.clone(),
                    editor: c.editor_type,
                    value: input_text(draft.get(&c.field)),
                    enabled: !saving,
                },
                _ => CellView::Text(format_value(
                    c.formatter.unwrap_or_default(),
                    row.get(&c.field),
                    &self.config,
                )),
            })
            .collect();

        let actions = if !self.is_editable() || id.is_none() {
            Vec::new()
        } else if saving {
            vec![ButtonView::new("Saving...", false), ButtonView::new("Cancel", false)]
        } else if draft.is_some() {
            vec![ButtonView::new("Save", true), ButtonView::new("Cancel", true)]
        } else {
            let busy = matches!(self.edit, EditState::Saving { .. });
            vec![ButtonView::new("Edit", !busy)]
        };

        RowView { id, cells, actions }
    }
}

/// Convert edited text back to the column's value type.
fn coerce_edit(editor: EditorType, text: &str) -> Value {
    match editor {
        EditorType::Number => {
            parse_number(text).unwrap_or_else(|| Value::String(text.to_string()))
        }
        EditorType::Checkbox => Value::Bool(matches!(text, "true" | "on" | "1")),
        _ => Value::String(text.to_string()),
    }
}
