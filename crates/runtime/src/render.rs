//! Render dispatcher.
//!
//! A [`Renderer`] owns one tool specification. Each [`Renderer::render`]
//! call discards the previous output, rebuilds the filter inputs, and
//! builds exactly one component for the content variant. Filter changes
//! are routed to the component's refresh hook, immediately for discrete
//! inputs and after the debounce window for continuous ones.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use toolspec::{Content, RowId, ToolSpec};
use tracing::{debug, info, warn};

use crate::grid::EditableGrid;
use crate::inputs::{FilterInputs, Refresh};
use crate::live::LiveGrid;
use crate::statics::{ActionButton, Form, RecordView};
use crate::view::View;
use crate::{Error, Result, RuntimeConfig};

/// A user interaction with the rendered tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    NextPage,
    PreviousPage,
    GoToPage(usize),
    /// Header click on a sortable column.
    Sort(String),
    Edit(RowId),
    /// Change one input of the row under edit.
    Draft { field: String, value: String },
    CancelEdit,
    Save,
    Press,
    SetField { name: String, value: Value },
    Submit,
    Refresh,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::NextPage => "next-page",
            Action::PreviousPage => "previous-page",
            Action::GoToPage(_) => "go-to-page",
            Action::Sort(_) => "sort",
            Action::Edit(_) => "edit",
            Action::Draft { .. } => "draft",
            Action::CancelEdit => "cancel-edit",
            Action::Save => "save",
            Action::Press => "press",
            Action::SetField { .. } => "set-field",
            Action::Submit => "submit",
            Action::Refresh => "refresh",
        }
    }
}

/// The component built for the current render.
pub enum Component {
    Record(RecordView),
    Action(ActionButton),
    Grid(EditableGrid),
    Form(Form),
    Live(LiveGrid),
    /// Content tag this runtime does not know.
    Unsupported(String),
}

impl Component {
    pub fn kind(&self) -> &str {
        match self {
            Component::Record(_) => "recordView",
            Component::Action(_) => "actionButton",
            Component::Grid(_) => "editableGrid",
            Component::Form(_) => "form",
            Component::Live(_) => "liveGrid",
            Component::Unsupported(kind) => kind,
        }
    }
}

pub struct Renderer {
    spec: ToolSpec,
    config: Arc<RuntimeConfig>,
    inputs: FilterInputs,
    component: Option<Component>,
}

impl Renderer {
    pub fn new(spec: ToolSpec, config: RuntimeConfig) -> Self {
        let inputs = FilterInputs::new(spec.inputs.as_ref(), config.debounce());
        Self {
            spec,
            config: Arc::new(config),
            inputs,
            component: None,
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn inputs(&self) -> &FilterInputs {
        &self.inputs
    }

    pub fn component(&self) -> Option<&Component> {
        self.component.as_ref()
    }

    pub fn grid(&self) -> Option<&EditableGrid> {
        match &self.component {
            Some(Component::Grid(grid)) => Some(grid),
            _ => None,
        }
    }

    pub fn live(&self) -> Option<&LiveGrid> {
        match &self.component {
            Some(Component::Live(live)) => Some(live),
            _ => None,
        }
    }

    /// Render from scratch.
    ///
    /// The previous component is dropped first, which releases any live
    /// connection it held.
    pub async fn render(&mut self) {
        self.component = None;
        self.inputs = FilterInputs::new(self.spec.inputs.as_ref(), self.config.debounce());
        let filters = self.inputs.values();
        let functions = self.spec.functions.clone();
        let config = self.config.clone();

        info!(tool = %self.spec.id, content = self.spec.content.kind(), "rendering tool");
        let component = match self.spec.content.clone() {
            Content::RecordView(content) => {
                let mut view = RecordView::new(content, functions, config);
                view.load(&filters).await;
                Component::Record(view)
            }
            Content::ActionButton(content) => Component::Action(ActionButton::new(content, functions)),
            Content::EditableGrid(content) => {
                let mut grid = EditableGrid::new(content, functions, config);
                grid.load(&filters).await;
                Component::Grid(grid)
            }
            Content::Form(content) => {
                let mut form = Form::new(content, functions);
                form.load(&filters).await;
                Component::Form(form)
            }
            Content::LiveGrid(content) => {
                let mut live = LiveGrid::new(content, functions, config);
                // a failed start is shown in the status line
                let _ = live.connect(&filters).await;
                Component::Live(live)
            }
            Content::Unknown { kind } => {
                warn!(tool = %self.spec.id, kind = %kind, "unknown content type");
                Component::Unsupported(kind)
            }
        };
        self.component = Some(component);
    }

    /// Re-fetch the component's data with the current filter values.
    pub async fn refresh(&mut self) {
        let filters = self.inputs.values();
        match self.component.as_mut() {
            Some(Component::Grid(grid)) => grid.refresh(&filters).await,
            Some(Component::Live(live)) => {
                let _ = live.reconnect(&filters).await;
            }
            Some(Component::Record(view)) => view.load(&filters).await,
            Some(Component::Action(_) | Component::Form(_) | Component::Unsupported(_)) | None => {}
        }
    }

    /// Change a filter input. Discrete inputs refresh before returning;
    /// continuous ones schedule a refresh at the returned deadline.
    pub async fn set_input(&mut self, name: &str, value: Value) -> Result<Refresh> {
        let refresh = self.inputs.set(name, value)?;
        debug!(input = name, ?refresh, "filter input changed");
        if refresh == Refresh::Now {
            self.refresh().await;
        }
        Ok(refresh)
    }

    /// When the pending debounced refresh is due, if any.
    pub fn input_deadline(&self) -> Option<Instant> {
        self.inputs.deadline()
    }

    /// Run the debounced refresh if its deadline has passed.
    pub async fn flush_due_inputs(&mut self) -> bool {
        if self.inputs.take_due(Instant::now()) {
            self.refresh().await;
            true
        } else {
            false
        }
    }

    /// Wait out the debounce window and run the pending refresh.
    pub async fn settle_inputs(&mut self) -> bool {
        match self.inputs.deadline() {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.flush_due_inputs().await
            }
            None => false,
        }
    }

    /// Apply every live-grid signal already delivered.
    pub fn drain_stream(&mut self) -> usize {
        match self.component.as_mut() {
            Some(Component::Live(live)) => live.drain(),
            _ => 0,
        }
    }

    /// Wait for and apply the next live-grid signal.
    pub async fn pump(&mut self) -> bool {
        match self.component.as_mut() {
            Some(Component::Live(live)) => live.next().await,
            _ => false,
        }
    }

    /// Route a user interaction to the rendered component.
    ///
    /// Invocation failures are shown in the component's view; the returned
    /// error is reserved for actions the component cannot take.
    pub async fn handle(&mut self, action: Action) -> Result<()> {
        if action == Action::Refresh {
            self.refresh().await;
            return Ok(());
        }

        let filters = self.inputs.values();
        let component = self.component.as_mut().ok_or(Error::NotRendered)?;
        debug!(action = action.name(), content = component.kind(), "handling action");

        match (action, component) {
            (Action::NextPage, Component::Grid(grid)) => grid.next_page(&filters).await?,
            (Action::PreviousPage, Component::Grid(grid)) => grid.previous_page(&filters).await?,
            (Action::GoToPage(page), Component::Grid(grid)) => grid.go_to_page(page, &filters).await?,
            (Action::Sort(field), Component::Grid(grid)) => grid.sort_by(&field, &filters).await?,
            (Action::Edit(id), Component::Grid(grid)) => grid.begin_edit(&id)?,
            (Action::Draft { field, value }, Component::Grid(grid)) => {
                grid.update_draft(&field, value)?
            }
            (Action::CancelEdit, Component::Grid(grid)) => grid.cancel_edit()?,
            (Action::Save, Component::Grid(grid)) => {
                grid.save().await?;
            }
            (Action::Press, Component::Action(button)) => {
                let _ = button.press(&filters).await;
            }
            (Action::SetField { name, value }, Component::Form(form)) => {
                form.set_field(&name, value)?
            }
            (Action::Submit, Component::Form(form)) => {
                let _ = form.submit().await;
            }
            (action, component) => {
                return Err(Error::UnsupportedAction {
                    action: action.name(),
                    content: component.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn view(&self) -> View {
        let mut children = Vec::new();
        if !self.inputs.is_empty() {
            children.push(self.inputs.view());
        }
        children.push(match &self.component {
            None => View::Loading("Loading...".into()),
            Some(Component::Record(view)) => view.view(),
            Some(Component::Action(button)) => button.view(),
            Some(Component::Grid(grid)) => grid.view(),
            Some(Component::Form(form)) => form.view(),
            Some(Component::Live(live)) => live.view(),
            Some(Component::Unsupported(kind)) => View::Error(format!("Unknown content type: {kind}")),
        });
        View::Section {
            title: self.spec.title.clone(),
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridError;
    use crate::grid::EditState;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use toolspec::{CleanupHandle, FunctionTable, InputConfig, InputKind, StreamEvent, StreamSink};

    const GRID_SPEC: &str = r#"{
        "id": "users",
        "title": "Users",
        "content": {
            "type": "editableGrid",
            "dataLoader": "loadUsers",
            "itemUpdater": "updateUser",
            "columns": [
                "id",
                {"field": "name", "label": "Name", "isSortable": true, "isEditable": true}
            ],
            "pageSize": 1
        }
    }"#;

    type Calls = Arc<Mutex<Vec<Value>>>;

    fn user_functions(calls: Calls) -> FunctionTable {
        let mut functions = FunctionTable::new();
        functions
            .register("loadUsers", move |params: Value| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(params.clone());
                    let rows = [json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})];
                    let page = params["page"].as_u64().unwrap_or(1) as usize;
                    Ok(json!({"items": [rows[page - 1].clone()], "totalItems": 2}))
                }
            })
            .register("updateUser", |params: Value| async move { Ok(params["changes"].clone()) });
        functions
    }

    fn grid_renderer(calls: Calls) -> Renderer {
        let spec = ToolSpec::from_json(GRID_SPEC)
            .unwrap()
            .with_input("q", InputConfig::new(InputKind::Text))
            .with_input(
                "team",
                InputConfig::new(InputKind::Select).with_options(["core", "infra"]),
            )
            .with_functions(user_functions(calls));
        Renderer::new(spec, RuntimeConfig::default())
    }

    #[tokio::test]
    async fn grid_pages_through_the_dispatcher() {
        let calls = Calls::default();
        let mut renderer = grid_renderer(calls.clone());
        renderer.render().await;

        assert_eq!(
            renderer.view().to_string(),
            "== Users ==\n[Q: ]\n[Team: ]\n| Id | Name |\n| 1 | A | <Edit> |\n\
             <Previous (disabled)> Page 1 of 2 (2 items) <Next>\n"
        );

        renderer.handle(Action::NextPage).await.unwrap();
        let view = renderer.view();
        let table = view.find_table().unwrap();
        assert_eq!(table.rows[0].texts(), vec!["2", "B"]);
        let pagination = table.pagination.as_ref().unwrap();
        assert!(pagination.has_previous);
        assert!(!pagination.has_next);
        assert_eq!(calls.lock().unwrap()[1], json!({"page": 2, "pageSize": 1}));
    }

    #[tokio::test]
    async fn edit_and_save_through_actions() {
        let mut renderer = grid_renderer(Calls::default());
        renderer.render().await;

        renderer.handle(Action::Edit(RowId::from(1))).await.unwrap();
        renderer
            .handle(Action::Draft {
                field: "name".into(),
                value: "Ann".into(),
            })
            .await
            .unwrap();
        renderer.handle(Action::Save).await.unwrap();

        let grid = renderer.grid().unwrap();
        assert_eq!(grid.edit_state(), &EditState::Viewing);
        assert_eq!(grid.rows()[0]["name"], json!("Ann"));
    }

    #[tokio::test]
    async fn grid_misuse_is_reported() {
        let mut renderer = grid_renderer(Calls::default());
        assert!(matches!(
            renderer.handle(Action::NextPage).await,
            Err(Error::NotRendered)
        ));
        renderer.render().await;
        assert!(matches!(
            renderer.handle(Action::PreviousPage).await,
            Err(Error::Grid(GridError::PageOutOfRange { page: 0 }))
        ));
        assert!(matches!(
            renderer.handle(Action::Submit).await,
            Err(Error::UnsupportedAction { action: "submit", .. })
        ));
    }

    #[tokio::test]
    async fn discrete_filter_refetches_from_page_one() {
        let calls = Calls::default();
        let mut renderer = grid_renderer(calls.clone());
        renderer.render().await;
        renderer.handle(Action::NextPage).await.unwrap();

        let refresh = renderer.set_input("team", json!("core")).await.unwrap();
        assert_eq!(refresh, Refresh::Now);
        assert_eq!(
            calls.lock().unwrap().last().unwrap(),
            &json!({"page": 1, "pageSize": 1, "team": "core"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn text_filter_is_debounced() {
        let calls = Calls::default();
        let mut renderer = grid_renderer(calls.clone());
        renderer.render().await;

        renderer.set_input("q", json!("a")).await.unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        renderer.set_input("q", json!("ad")).await.unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!renderer.flush_due_inputs().await);
        assert_eq!(calls.lock().unwrap().len(), 1);

        assert!(renderer.settle_inputs().await);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1]["q"], json!("ad"));
        assert!(renderer.input_deadline().is_none());
    }

    #[tokio::test]
    async fn unknown_content_renders_an_error() {
        let spec = ToolSpec::from_json(
            r#"{"id": "x", "title": "X", "content": {"type": "chart", "series": []}}"#,
        )
        .unwrap();
        let mut renderer = Renderer::new(spec, RuntimeConfig::default());
        renderer.render().await;
        assert_eq!(renderer.view().find_error(), Some("Unknown content type: chart"));
        assert!(matches!(
            renderer.handle(Action::Press).await,
            Err(Error::UnsupportedAction { .. })
        ));
    }

    #[tokio::test]
    async fn missing_function_renders_an_error_panel() {
        let spec = ToolSpec::from_json(GRID_SPEC).unwrap();
        let mut renderer = Renderer::new(spec, RuntimeConfig::default());
        renderer.render().await;
        assert_eq!(
            renderer.view().find_error(),
            Some("'loadUsers' is not a callable function")
        );
    }

    type SinkSlot = Arc<Mutex<Option<StreamSink>>>;

    fn live_renderer(released: Arc<AtomicUsize>, slot: SinkSlot) -> Renderer {
        let mut functions = FunctionTable::new();
        functions.register_stream("feed", move |params: Value, sink: StreamSink| {
            let released = released.clone();
            let slot = slot.clone();
            async move {
                sink.connect();
                sink.data(StreamEvent::Add {
                    item: json!({"id": "e1", "topic": params["topic"]})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                });
                *slot.lock().unwrap() = Some(sink);
                Ok(CleanupHandle::new(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                }))
            }
        });
        let spec = ToolSpec::from_json(
            r#"{
                "id": "events",
                "title": "Events",
                "inputs": {"topic": {"type": "select", "default": "orders", "options": ["orders", "users"]}},
                "content": {"type": "liveGrid", "stream": "feed", "columns": ["id", "topic"], "maxRows": 50}
            }"#,
        )
        .unwrap()
        .with_functions(functions);
        Renderer::new(spec, RuntimeConfig::default())
    }

    #[tokio::test]
    async fn live_grid_connects_and_applies_events() {
        let slot = SinkSlot::default();
        let mut renderer = live_renderer(Arc::new(AtomicUsize::new(0)), slot.clone());
        renderer.render().await;

        assert_eq!(renderer.drain_stream(), 2);
        let live = renderer.live().unwrap();
        assert_eq!(live.status(), &crate::ConnectionStatus::Connected);
        assert_eq!(live.rows().next().unwrap()["topic"], json!("orders"));

        let sink = slot.lock().unwrap().clone().unwrap();
        sink.data(StreamEvent::Clear);
        assert!(renderer.pump().await);
        assert!(renderer.live().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerender_and_filter_changes_release_the_stream() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut renderer = live_renderer(released.clone(), SinkSlot::default());
        renderer.render().await;
        renderer.set_input("topic", json!("users")).await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        renderer.render().await;
        assert_eq!(released.load(Ordering::SeqCst), 2);

        drop(renderer);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }
}
