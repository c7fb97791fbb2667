//! One-shot renderers: record view, action button, and form.

use std::sync::Arc;

use serde_json::{Map, Value};
use toolspec::{
    ActionButtonContent, FormContent, FunctionTable, RecordViewContent, Row, capitalize,
};
use tracing::debug;

use crate::format::{format_value, input_text, plain};
use crate::inputs::{coerce, initial_value};
use crate::invoke::{Lifecycle, invoke, invoke_with};
use crate::view::{ButtonView, FormView, InputView, View};
use crate::{Error, InvokeError, Result, RuntimeConfig};

/// Shared state of a single load.
#[derive(Debug, Clone, PartialEq)]
enum Load<T> {
    Loading,
    Loaded(T),
    Failed(String),
}

/// Shows a single row as label/value pairs.
pub struct RecordView {
    content: RecordViewContent,
    functions: FunctionTable,
    config: Arc<RuntimeConfig>,
    state: Load<Option<Row>>,
}

impl RecordView {
    pub fn new(
        content: RecordViewContent,
        functions: FunctionTable,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            content,
            functions,
            config,
            state: Load::Loading,
        }
    }

    pub async fn load(&mut self, filters: &Map<String, Value>) {
        self.state = Load::Loading;
        let result = invoke(
            Some(&self.functions),
            &self.content.loader,
            Value::Object(filters.clone()),
        )
        .await;

        self.state = match result {
            Ok(Value::Object(row)) => Load::Loaded(Some(row)),
            Ok(Value::Null) => Load::Loaded(None),
            Ok(other) => Load::Failed(format!(
                "Invalid data format: expected an object, got {}",
                json_type(&other)
            )),
            Err(err) => Load::Failed(err.to_string()),
        };
    }

    pub fn record(&self) -> Option<&Row> {
        match &self.state {
            Load::Loaded(row) => row.as_ref(),
            _ => None,
        }
    }

    pub fn view(&self) -> View {
        let row = match &self.state {
            Load::Loading => return View::Loading("Loading...".into()),
            Load::Failed(message) => return View::Error(message.clone()),
            Load::Loaded(None) => return View::Empty("No data".into()),
            Load::Loaded(Some(row)) => row,
        };

        if self.content.fields.is_empty() {
            return View::Record(
                row.iter()
                    .map(|(key, value)| (capitalize(key), plain(value)))
                    .collect(),
            );
        }
        View::Record(
            self.content
                .fields
                .iter()
                .map(|c| {
                    let value = format_value(
                        c.formatter.unwrap_or_default(),
                        row.get(&c.field),
                        &self.config,
                    );
                    (c.label.clone(), value)
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionState {
    Idle,
    Pending,
    Done(String),
    Failed(String),
}

/// Routes invocation signals into an [`ActionState`].
struct Press<'a> {
    state: &'a mut ActionState,
    success_message: Option<&'a str>,
}

impl Lifecycle for Press<'_> {
    fn pending(&mut self) {
        *self.state = ActionState::Pending;
    }

    fn fulfilled(&mut self, value: &Value) {
        let message = match (self.success_message, value) {
            (Some(message), _) => message.to_string(),
            (None, Value::Null) => "Done".to_string(),
            (None, value) => plain(value),
        };
        *self.state = ActionState::Done(message);
    }

    fn rejected(&mut self, error: &InvokeError) {
        *self.state = ActionState::Failed(error.to_string());
    }
}

/// A labeled button bound to one function.
pub struct ActionButton {
    content: ActionButtonContent,
    functions: FunctionTable,
    state: ActionState,
}

impl ActionButton {
    pub fn new(content: ActionButtonContent, functions: FunctionTable) -> Self {
        Self {
            content,
            functions,
            state: ActionState::Idle,
        }
    }

    pub fn state(&self) -> &ActionState {
        &self.state
    }

    /// Run the action with the current filter values.
    pub async fn press(&mut self, filters: &Map<String, Value>) -> std::result::Result<Value, InvokeError> {
        let mut press = Press {
            state: &mut self.state,
            success_message: self.content.success_message.as_deref(),
        };
        invoke_with(
            Some(&self.functions),
            &self.content.action,
            Value::Object(filters.clone()),
            &mut press,
        )
        .await
    }

    pub fn view(&self) -> View {
        let pending = self.state == ActionState::Pending;
        let mut children = vec![View::Button(ButtonView::new(&self.content.label, !pending))];
        match &self.state {
            ActionState::Idle => {}
            ActionState::Pending => children.push(View::Loading("Running...".into())),
            ActionState::Done(message) => children.push(View::Text(message.clone())),
            ActionState::Failed(message) => children.push(View::Error(message.clone())),
        }
        View::Section {
            title: String::new(),
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormState {
    Editing,
    Loading,
    Submitting,
    Submitted(String),
    Failed(String),
}

/// Typed fields plus a submit function.
pub struct Form {
    content: FormContent,
    functions: FunctionTable,
    values: Map<String, Value>,
    state: FormState,
}

impl Form {
    pub fn new(content: FormContent, functions: FunctionTable) -> Self {
        let values = content
            .fields
            .iter()
            .filter_map(|f| initial_value(&f.input).map(|v| (f.name.clone(), v)))
            .collect();
        Self {
            content,
            functions,
            values,
            state: FormState::Editing,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Seed field values from the loader, if one is configured.
    pub async fn load(&mut self, filters: &Map<String, Value>) {
        let Some(loader) = self.content.loader.clone() else {
            return;
        };
        self.state = FormState::Loading;
        let result = invoke(
            Some(&self.functions),
            &loader,
            Value::Object(filters.clone()),
        )
        .await;

        self.state = match result {
            Ok(Value::Object(row)) => {
                for field in &self.content.fields {
                    if let Some(value) = row.get(&field.name).filter(|v| !v.is_null()) {
                        self.values.insert(field.name.clone(), value.clone());
                    }
                }
                FormState::Editing
            }
            Ok(Value::Null) => FormState::Editing,
            Ok(other) => FormState::Failed(format!(
                "Invalid data format: expected an object, got {}",
                json_type(&other)
            )),
            Err(err) => FormState::Failed(err.to_string()),
        };
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self
            .content
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        match coerce(field.input.kind, value) {
            Some(value) => self.values.insert(name.to_string(), value),
            None => self.values.remove(name),
        };
        if matches!(self.state, FormState::Failed(_) | FormState::Submitted(_)) {
            self.state = FormState::Editing;
        }
        Ok(())
    }

    /// Labels of required fields that have no value.
    fn missing(&self) -> Vec<String> {
        self.content
            .fields
            .iter()
            .filter(|f| f.required && !self.values.contains_key(&f.name))
            .map(|f| f.input.label_for(&f.name))
            .collect()
    }

    /// Validate required fields, then invoke the submit function with the
    /// field values.
    pub async fn submit(&mut self) -> std::result::Result<Value, InvokeError> {
        let missing = self.missing();
        if !missing.is_empty() {
            let message = format!("Required: {}", missing.join(", "));
            debug!(fields = %message, "form submit blocked");
            self.state = FormState::Failed(message.clone());
            return Err(InvokeError::Rejected { message });
        }

        self.state = FormState::Submitting;
        let result = invoke(
            Some(&self.functions),
            &self.content.submit,
            Value::Object(self.values.clone()),
        )
        .await;

        self.state = match &result {
            Ok(Value::String(message)) => FormState::Submitted(message.clone()),
            Ok(_) => FormState::Submitted("Submitted successfully".into()),
            Err(err) => FormState::Failed(err.to_string()),
        };
        result
    }

    pub fn view(&self) -> View {
        if self.state == FormState::Loading {
            return View::Loading("Loading...".into());
        }
        let fields = self
            .content
            .fields
            .iter()
            .map(|f| InputView {
                name: f.name.clone(),
                label: if f.required {
                    format!("{} *", f.input.label_for(&f.name))
                } else {
                    f.input.label_for(&f.name)
                },
                kind: f.input.kind,
                value: input_text(self.values.get(&f.name)),
                options: f.input.options.clone(),
            })
            .collect();
        let message = match &self.state {
            FormState::Submitted(message) => Some(message.clone()),
            FormState::Failed(message) => Some(format!("Error: {message}")),
            _ => None,
        };
        View::Form(FormView {
            fields,
            submit: ButtonView::new(
                &self.content.submit_label,
                self.state != FormState::Submitting,
            ),
            message,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolspec::{Column, FormField, FormatterKind, FunctionError, InputConfig, InputKind};

    fn filters() -> Map<String, Value> {
        let mut filters = Map::new();
        filters.insert("userId".into(), json!(7));
        filters
    }

    #[tokio::test]
    async fn record_view_formats_configured_fields() {
        let mut functions = FunctionTable::new();
        functions.register("getUser", |params: Value| async move {
            Ok(json!({"id": params["userId"], "name": "ada", "balance": 1500}))
        });
        let content = RecordViewContent {
            loader: "getUser".into(),
            fields: vec![
                Column::new("name").formatter(FormatterKind::Capitalize),
                Column::new("balance").formatter(FormatterKind::Currency),
                Column::new("email"),
            ],
        };
        let mut view = RecordView::new(content, functions, Arc::new(RuntimeConfig::default()));
        assert_eq!(view.view(), View::Loading("Loading...".into()));

        view.load(&filters()).await;
        assert_eq!(view.record().unwrap()["id"], json!(7));
        assert_eq!(
            view.view(),
            View::Record(vec![
                ("Name".into(), "Ada".into()),
                ("Balance".into(), "$1,500.00".into()),
                ("Email".into(), "N/A".into()),
            ])
        );
    }

    #[tokio::test]
    async fn record_view_without_fields_shows_everything() {
        let mut functions = FunctionTable::new();
        functions.register("get", |_| async { Ok(json!({"b": 2, "a": "x"})) });
        let content = RecordViewContent {
            loader: "get".into(),
            fields: Vec::new(),
        };
        let mut view = RecordView::new(content, functions, Arc::new(RuntimeConfig::default()));
        view.load(&Map::new()).await;
        assert_eq!(view.view().to_string(), "A: x\nB: 2\n");
    }

    #[tokio::test]
    async fn record_view_null_and_failures() {
        let mut functions = FunctionTable::new();
        functions
            .register("none", |_| async { Ok(Value::Null) })
            .register("list", |_| async { Ok(json!([1])) });
        let config = Arc::new(RuntimeConfig::default());

        let mut view = RecordView::new(
            RecordViewContent {
                loader: "none".into(),
                fields: Vec::new(),
            },
            functions.clone(),
            config.clone(),
        );
        view.load(&Map::new()).await;
        assert_eq!(view.view(), View::Empty("No data".into()));

        let mut view = RecordView::new(
            RecordViewContent {
                loader: "list".into(),
                fields: Vec::new(),
            },
            functions.clone(),
            config.clone(),
        );
        view.load(&Map::new()).await;
        assert!(view.view().find_error().unwrap().contains("got array"));

        let mut view = RecordView::new(
            RecordViewContent {
                loader: "missing".into(),
                fields: Vec::new(),
            },
            functions,
            config,
        );
        view.load(&Map::new()).await;
        assert_eq!(view.view(), View::Error("function not found: missing".into()));
    }

    fn button(success_message: Option<&str>) -> ActionButton {
        let mut functions = FunctionTable::new();
        functions
            .register("sync", |params: Value| async move {
                Ok(json!(format!("synced {}", params["userId"])))
            })
            .register("broken", |_| async {
                Err::<Value, _>(FunctionError::from("remote offline"))
            });
        ActionButton::new(
            ActionButtonContent {
                action: "sync".into(),
                label: "Sync".into(),
                success_message: success_message.map(str::to_string),
            },
            functions,
        )
    }

    #[tokio::test]
    async fn action_button_shows_result() {
        let mut button = button(None);
        assert_eq!(button.view().to_string(), "==  ==\n<Sync>\n");
        button.press(&filters()).await.unwrap();
        assert_eq!(button.state(), &ActionState::Done("synced 7".into()));
    }

    #[tokio::test]
    async fn action_button_prefers_success_message() {
        let mut button = button(Some("All good"));
        button.press(&Map::new()).await.unwrap();
        assert_eq!(button.state(), &ActionState::Done("All good".into()));
    }

    #[tokio::test]
    async fn action_button_failure() {
        let mut button = button(None);
        button.content.action = "broken".into();
        assert!(button.press(&Map::new()).await.is_err());
        assert_eq!(button.view().find_error(), Some("remote offline"));
    }

    #[test]
    fn pending_button_is_disabled() {
        let mut button = button(None);
        button.state = ActionState::Pending;
        assert_eq!(
            button.view().to_string(),
            "==  ==\n<Sync (disabled)>\n... Running...\n"
        );
    }

    fn form_content() -> FormContent {
        FormContent {
            submit: "save".into(),
            loader: Some("load".into()),
            fields: vec![
                FormField {
                    name: "name".into(),
                    input: InputConfig::new(InputKind::Text),
                    required: true,
                },
                FormField {
                    name: "age".into(),
                    input: InputConfig::new(InputKind::Number),
                    required: false,
                },
                FormField {
                    name: "active".into(),
                    input: InputConfig::new(InputKind::Checkbox),
                    required: false,
                },
            ],
            submit_label: "Save".into(),
        }
    }

    fn form_functions() -> FunctionTable {
        let mut functions = FunctionTable::new();
        functions
            .register("load", |_| async { Ok(json!({"name": "Ada", "age": 36, "extra": 1})) })
            .register("save", |params: Value| async move {
                if params["age"].as_i64() == Some(36) {
                    Ok(json!({"ok": true}))
                } else {
                    Err(FunctionError::from("age must be 36"))
                }
            });
        functions
    }

    #[tokio::test]
    async fn form_loads_then_submits_values() {
        let mut form = Form::new(form_content(), form_functions());
        form.load(&Map::new()).await;
        assert_eq!(form.values()["name"], json!("Ada"));
        assert!(!form.values().contains_key("extra"));
        assert_eq!(form.values()["active"], json!(false));

        form.submit().await.unwrap();
        assert_eq!(form.state(), &FormState::Submitted("Submitted successfully".into()));
    }

    #[tokio::test]
    async fn form_coerces_and_reports_rejection() {
        let mut form = Form::new(form_content(), form_functions());
        form.set_field("name", json!("Bob")).unwrap();
        form.set_field("age", json!("40")).unwrap();
        assert_eq!(form.values()["age"], json!(40));

        let err = form.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "age must be 36");
        let View::Form(view) = form.view() else {
            panic!("expected form view");
        };
        assert_eq!(view.message.as_deref(), Some("Error: age must be 36"));
        assert_eq!(view.fields[0].label, "Name *");
    }

    #[tokio::test]
    async fn required_fields_block_submit() {
        let mut form = Form::new(form_content(), form_functions());
        let err = form.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Required: Name");
        assert!(matches!(
            form.set_field("nope", json!(1)),
            Err(Error::UnknownField(_))
        ));
    }
}
