//! Rendered output.
//!
//! Components render into a [`View`] tree which the embedding layer turns
//! into pixels, HTML, or terminal text. `Display` gives a plain-text
//! rendering.

use std::fmt;

use toolspec::{EditorType, InputKind, RowId, SortDirection};

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Titled container for a whole tool.
    Section { title: String, children: Vec<View> },
    Inputs(Vec<InputView>),
    Text(String),
    Loading(String),
    Empty(String),
    Error(String),
    /// A blocking notification, such as a failed save.
    Notice(String),
    Record(Vec<(String, String)>),
    Table(TableView),
    Button(ButtonView),
    Form(FormView),
    Status(String),
}

impl View {
    /// Depth-first search for the first table.
    pub fn find_table(&self) -> Option<&TableView> {
        match self {
            View::Table(table) => Some(table),
            View::Section { children, .. } => children.iter().find_map(View::find_table),
            _ => None,
        }
    }

    /// Depth-first search for the first error panel message.
    pub fn find_error(&self) -> Option<&str> {
        match self {
            View::Error(message) => Some(message),
            View::Section { children, .. } => children.iter().find_map(View::find_error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputView {
    pub name: String,
    pub label: String,
    pub kind: InputKind,
    pub value: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ButtonView {
    pub label: String,
    pub enabled: bool,
}

impl ButtonView {
    pub fn new(label: impl Into<String>, enabled: bool) -> Self {
        Self {
            label: label.into(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderView {
    pub field: String,
    pub label: String,
    pub sortable: bool,
    /// Direction when this is the active sort column.
    pub sort: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellView {
    Text(String),
    Editor {
        field: String,
        editor: EditorType,
        value: String,
        enabled: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub id: Option<RowId>,
    pub cells: Vec<CellView>,
    pub actions: Vec<ButtonView>,
}

impl RowView {
    /// Displayed text of each cell.
    pub fn texts(&self) -> Vec<&str> {
        self.cells
            .iter()
            .map(|cell| match cell {
                CellView::Text(text) => text.as_str(),
                CellView::Editor { value, .. } => value.as_str(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationView {
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub headers: Vec<HeaderView>,
    pub rows: Vec<RowView>,
    pub pagination: Option<PaginationView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub fields: Vec<InputView>,
    pub submit: ButtonView,
    pub message: Option<String>,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Section { title, children } => {
                writeln!(f, "== {title} ==")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                Ok(())
            }
            View::Inputs(inputs) => {
                for input in inputs {
                    writeln!(f, "[{}: {}]", input.label, input.value)?;
                }
                Ok(())
            }
            View::Text(text) => writeln!(f, "{text}"),
            View::Loading(text) => writeln!(f, "... {text}"),
            View::Empty(text) => writeln!(f, "({text})"),
            View::Error(text) => writeln!(f, "Error: {text}"),
            View::Notice(text) => writeln!(f, "! {text}"),
            View::Status(text) => writeln!(f, "status: {text}"),
            View::Record(pairs) => {
                for (label, value) in pairs {
                    writeln!(f, "{label}: {value}")?;
                }
                Ok(())
            }
            View::Button(button) => writeln!(f, "{button}"),
            View::Form(form) => {
                for field in &form.fields {
                    writeln!(f, "{}: [{}]", field.label, field.value)?;
                }
                writeln!(f, "{}", form.submit)?;
                if let Some(message) = &form.message {
                    writeln!(f, "{message}")?;
                }
                Ok(())
            }
            View::Table(table) => write!(f, "{table}"),
        }
    }
}

impl fmt::Display for ButtonView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            write!(f, "<{}>", self.label)
        } else {
            write!(f, "<{} (disabled)>", self.label)
        }
    }
}

impl fmt::Display for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|h| match h.sort {
                Some(SortDirection::Asc) => format!("{} ^", h.label),
                Some(SortDirection::Desc) => format!("{} v", h.label),
                None => h.label.clone(),
            })
            .collect();
        writeln!(f, "| {} |", headers.join(" | "))?;

        for row in &self.rows {
            let mut cells: Vec<String> = row
                .cells
                .iter()
                .map(|cell| match cell {
                    CellView::Text(text) => text.clone(),
                    CellView::Editor { value, .. } => format!("[{value}]"),
                })
                .collect();
            cells.extend(row.actions.iter().map(ToString::to_string));
            writeln!(f, "| {} |", cells.join(" | "))?;
        }

        if let Some(p) = &self.pagination {
            writeln!(
                f,
                "{} Page {} of {} ({} items) {}",
                ButtonView::new("Previous", p.has_previous),
                p.page,
                p.total_pages,
                p.total_items,
                ButtonView::new("Next", p.has_next),
            )?;
        }
        Ok(())
    }
}
