//! Function tables keyed by tool id.

use std::collections::HashMap;

use toolspec::{FunctionTable, ToolSpec};

/// Every tool a server can execute, built at startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tools: HashMap<String, FunctionTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool_id: impl Into<String>, functions: FunctionTable) -> &mut Self {
        self.tools.insert(tool_id.into(), functions);
        self
    }

    /// Register a specification's function table under its id.
    pub fn register_spec(&mut self, spec: &ToolSpec) -> &mut Self {
        self.register(spec.id.clone(), spec.functions.clone())
    }

    pub fn get(&self, tool_id: &str) -> Option<&FunctionTable> {
        self.tools.get(tool_id)
    }

    /// Registered tool ids, sorted.
    pub fn tool_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.tools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
