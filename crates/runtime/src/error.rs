use thiserror::Error;
use toolspec::RowId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown input: {0}")]
    UnknownInput(String),

    #[error("unknown form field: {0}")]
    UnknownField(String),

    #[error("action {action} does not apply to {content} content")]
    UnsupportedAction {
        action: &'static str,
        content: String,
    },

    #[error("nothing has been rendered yet")]
    NotRendered,

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single invocation.
///
/// Configuration variants are raised before any developer code runs and
/// are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("function table is missing")]
    MissingFunctionTable,

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("'{0}' is not a callable function")]
    NotCallable(String),

    #[error("'{name}' is a {actual} binding, expected {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{message}")]
    Rejected { message: String },

    #[error("function panicked: {message}")]
    Panicked { message: String },
}

impl InvokeError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingFunctionTable
                | Self::FunctionNotFound(_)
                | Self::NotCallable(_)
                | Self::WrongKind { .. }
        )
    }
}

impl From<toolspec::FunctionError> for InvokeError {
    fn from(err: toolspec::FunctionError) -> Self {
        Self::Rejected {
            message: err.message,
        }
    }
}

/// Misuse of an editable grid (acting on a disabled control).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("column is not sortable: {0}")]
    NotSortable(String),

    #[error("column is not editable: {0}")]
    NotEditable(String),

    #[error("row is not on the current page: {0}")]
    UnknownRow(RowId),

    #[error("grid has no item updater")]
    ReadOnly,

    #[error("no row is being edited")]
    NotEditing,

    #[error("a save is already in progress")]
    SaveInProgress,

    #[error("page {page} is out of range")]
    PageOutOfRange { page: usize },
}
