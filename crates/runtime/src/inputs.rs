//! Filter inputs rendered above a tool's content.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use toolspec::{InputConfig, InputKind};

use crate::format::input_text;
use crate::view::{InputView, View};
use crate::{Error, Result};

/// When a change should reach the content's refresh hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Now,
    At(Instant),
}

/// Current filter values plus the pending debounce deadline.
#[derive(Debug, Clone)]
pub struct FilterInputs {
    fields: BTreeMap<String, InputConfig>,
    values: Map<String, Value>,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl FilterInputs {
    pub fn new(fields: Option<&BTreeMap<String, InputConfig>>, debounce: Duration) -> Self {
        let fields = fields.cloned().unwrap_or_default();
        let values = fields
            .iter()
            .filter_map(|(name, config)| initial_value(config).map(|v| (name.clone(), v)))
            .collect();
        Self {
            fields,
            values,
            debounce,
            deadline: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Snapshot of current values, read at fetch time.
    ///
    /// Inputs without a value are omitted.
    pub fn values(&self) -> Map<String, Value> {
        self.values.clone()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Record a change. Continuous inputs push the debounce deadline back;
    /// discrete inputs ask for an immediate refresh.
    pub fn set(&mut self, name: &str, value: Value) -> Result<Refresh> {
        let config = self
            .fields
            .get(name)
            .ok_or_else(|| Error::UnknownInput(name.to_string()))?;

        match coerce(config.kind, value) {
            Some(value) => self.values.insert(name.to_string(), value),
            None => self.values.remove(name),
        };

        if config.kind.is_continuous() {
            let at = Instant::now() + self.debounce;
            self.deadline = Some(at);
            Ok(Refresh::At(at))
        } else {
            self.deadline = None;
            Ok(Refresh::Now)
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clear and report an elapsed deadline.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn view(&self) -> View {
        View::Inputs(
            self.fields
                .iter()
                .map(|(name, config)| InputView {
                    name: name.clone(),
                    label: config.label_for(name),
                    kind: config.kind,
                    value: input_text(self.values.get(name)),
                    options: config.options.clone(),
                })
                .collect(),
        )
    }
}

pub(crate) fn initial_value(config: &InputConfig) -> Option<Value> {
    match (&config.default, config.kind) {
        (Some(value), kind) => coerce(kind, value.clone()),
        (None, InputKind::Checkbox) => Some(Value::Bool(false)),
        (None, _) => None,
    }
}

/// Normalize raw control values. Empty text clears the input.
pub(crate) fn coerce(kind: InputKind, value: Value) -> Option<Value> {
    match (kind, value) {
        (_, Value::Null) => None,
        (_, Value::String(s)) if s.is_empty() => None,
        (InputKind::Number, Value::String(s)) => Some(
            parse_number(&s).unwrap_or(Value::String(s)),
        ),
        (InputKind::Checkbox, Value::String(s)) => Some(Value::Bool(s == "true" || s == "on")),
        (_, value) => Some(value),
    }
}

pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::from(n));
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
