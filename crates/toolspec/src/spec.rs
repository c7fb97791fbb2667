//! Tool specification types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::function::FunctionTable;
use crate::{Error, Result};

/// Complete declarative description of one interface.
///
/// Built once by the embedding application and never mutated by the
/// runtime. `functions` is not part of the serialized form; it is wired
/// up after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, InputConfig>>,
    pub content: Content,
    #[serde(skip)]
    pub functions: FunctionTable,
}

impl ToolSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: Content) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            inputs: None,
            content,
            functions: FunctionTable::new(),
        }
    }

    /// Parse a specification from JSON. The function table starts out
    /// with every referenced name declared but unbound.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut spec: ToolSpec = serde_json::from_str(json)?;
        if spec.id.trim().is_empty() {
            return Err(Error::InvalidSpec("tool id must not be empty".into()));
        }
        for name in spec.content.function_names() {
            spec.functions.declare(name);
        }
        Ok(spec)
    }

    pub fn with_input(mut self, name: impl Into<String>, config: InputConfig) -> Self {
        self.inputs
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), config);
        self
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }
}

/// Kind of a filter or form input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Select,
    Checkbox,
    Date,
}

impl InputKind {
    /// Continuous inputs change on every keystroke and are debounced.
    pub fn is_continuous(self) -> bool {
        matches!(self, InputKind::Text | InputKind::Number)
    }
}

/// A user-editable input (filter or form field).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(rename = "type", default)]
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl InputConfig {
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Label to display for the input named `name`.
    pub fn label_for(&self, name: &str) -> String {
        self.label.clone().unwrap_or_else(|| capitalize(name))
    }
}

/// Selects one of the five interface kinds.
///
/// Unrecognized `type` tags deserialize to [`Content::Unknown`] so they can
/// be reported at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    RecordView(RecordViewContent),
    ActionButton(ActionButtonContent),
    EditableGrid(EditableGridContent),
    Form(FormContent),
    LiveGrid(LiveGridContent),
    Unknown { kind: String },
}

impl Content {
    pub fn kind(&self) -> &str {
        match self {
            Content::RecordView(_) => "recordView",
            Content::ActionButton(_) => "actionButton",
            Content::EditableGrid(_) => "editableGrid",
            Content::Form(_) => "form",
            Content::LiveGrid(_) => "liveGrid",
            Content::Unknown { kind } => kind,
        }
    }

    /// Every function name this content refers to.
    pub fn function_names(&self) -> Vec<&str> {
        match self {
            Content::RecordView(c) => vec![c.loader.as_str()],
            Content::ActionButton(c) => vec![c.action.as_str()],
            Content::EditableGrid(c) => {
                let mut names = vec![c.data_loader.as_str()];
                names.extend(c.item_updater.as_deref());
                names
            }
            Content::Form(c) => {
                let mut names = vec![c.submit.as_str()];
                names.extend(c.loader.as_deref());
                names
            }
            Content::LiveGrid(c) => vec![c.stream.as_str()],
            Content::Unknown { .. } => Vec::new(),
        }
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let body = match self {
            Content::RecordView(c) => serde_json::to_value(c),
            Content::ActionButton(c) => serde_json::to_value(c),
            Content::EditableGrid(c) => serde_json::to_value(c),
            Content::Form(c) => serde_json::to_value(c),
            Content::LiveGrid(c) => serde_json::to_value(c),
            Content::Unknown { .. } => Ok(Value::Object(Map::new())),
        }
        .map_err(serde::ser::Error::custom)?;

        let mut map = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert("type".into(), Value::String(self.kind().to_string()));
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error as _;

        let mut map = Map::deserialize(deserializer)?;
        let kind = match map.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "content type must be a string, got {other}"
                )));
            }
            None => return Err(D::Error::missing_field("type")),
        };
        let body = Value::Object(map);

        let content = match kind.as_str() {
            "recordView" => serde_json::from_value(body).map(Content::RecordView),
            "actionButton" => serde_json::from_value(body).map(Content::ActionButton),
            "editableGrid" => serde_json::from_value(body).map(Content::EditableGrid),
            "form" => serde_json::from_value(body).map(Content::Form),
            "liveGrid" => serde_json::from_value(body).map(Content::LiveGrid),
            _ => return Ok(Content::Unknown { kind }),
        };
        content.map_err(|e| D::Error::custom(format!("invalid {kind} content: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordViewContent {
    pub loader: String,
    /// Fields to show; every field of the loaded row when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionButtonContent {
    pub action: String,
    #[serde(default = "default_action_label")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
}

fn default_action_label() -> String {
    "Run".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormContent {
    pub submit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
    pub fields: Vec<FormField>,
    #[serde(default = "default_submit_label")]
    pub submit_label: String,
}

fn default_submit_label() -> String {
    "Submit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(flatten)]
    pub input: InputConfig,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableGridContent {
    pub data_loader: String,
    /// Row editing is unavailable without an updater.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_updater: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGridContent {
    pub stream: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Input control used when a cell is edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorType {
    #[default]
    Text,
    Number,
    Checkbox,
    Date,
    Select,
}

/// Named cell formatter. Unrecognized names format as plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum FormatterKind {
    Currency,
    DateTime,
    Date,
    Time,
    Uppercase,
    Lowercase,
    Capitalize,
    #[default]
    Plain,
}

impl FormatterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatterKind::Currency => "currency",
            FormatterKind::DateTime => "datetime",
            FormatterKind::Date => "date",
            FormatterKind::Time => "time",
            FormatterKind::Uppercase => "uppercase",
            FormatterKind::Lowercase => "lowercase",
            FormatterKind::Capitalize => "capitalize",
            FormatterKind::Plain => "plain",
        }
    }
}

impl FromStr for FormatterKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "currency" => FormatterKind::Currency,
            "datetime" => FormatterKind::DateTime,
            "date" => FormatterKind::Date,
            "time" => FormatterKind::Time,
            "uppercase" => FormatterKind::Uppercase,
            "lowercase" => FormatterKind::Lowercase,
            "capitalize" => FormatterKind::Capitalize,
            _ => FormatterKind::Plain,
        })
    }
}

impl From<String> for FormatterKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<FormatterKind> for &'static str {
    fn from(kind: FormatterKind) -> Self {
        kind.as_str()
    }
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grid column descriptor.
///
/// Deserializes from either a full descriptor or a bare field name; a bare
/// name gets a capitalized label and no sorting or editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ColumnEntry")]
pub struct Column {
    pub field: String,
    pub label: String,
    pub is_sortable: bool,
    pub is_editable: bool,
    pub editor_type: EditorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatter: Option<FormatterKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl Column {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            label: capitalize(&field),
            field,
            is_sortable: false,
            is_editable: false,
            editor_type: EditorType::default(),
            formatter: None,
            width: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn sortable(mut self) -> Self {
        self.is_sortable = true;
        self
    }

    pub fn editable(mut self, editor: EditorType) -> Self {
        self.is_editable = true;
        self.editor_type = editor;
        self
    }

    pub fn formatter(mut self, formatter: FormatterKind) -> Self {
        self.formatter = Some(formatter);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnEntry {
    Field(String),
    Descriptor(ColumnDescriptor),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDescriptor {
    field: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    is_sortable: bool,
    #[serde(default)]
    is_editable: bool,
    #[serde(default)]
    editor_type: EditorType,
    #[serde(default)]
    formatter: Option<FormatterKind>,
    #[serde(default)]
    width: Option<u32>,
}

impl From<ColumnEntry> for Column {
    fn from(entry: ColumnEntry) -> Self {
        match entry {
            ColumnEntry::Field(field) => Column::new(field),
            ColumnEntry::Descriptor(d) => Column {
                label: d.label.unwrap_or_else(|| capitalize(&d.field)),
                field: d.field,
                is_sortable: d.is_sortable,
                is_editable: d.is_editable,
                editor_type: d.editor_type,
                formatter: d.formatter,
                width: d.width,
            },
        }
    }
}

/// Upper-case the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
