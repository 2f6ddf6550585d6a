//! Run-scoped configuration

use std::fmt;
use std::sync::Arc;

use baton_ai::ModelSettings;
use baton_trace::TraceOptions;
use serde_json::{Map, Value};

use crate::{
    context::DEFAULT_MAX_TURNS,
    guardrail::{BoxedGuardrail, Guardrail},
    handoff::{HandoffInput, HandoffInputFilter},
};

/// Default workflow name recorded on traces
pub const DEFAULT_WORKFLOW_NAME: &str = "Agent workflow";

/// Settings applying to a whole run, across every agent it touches
#[derive(Clone)]
pub struct RunConfig {
    /// Name recorded on the run's trace
    pub workflow_name: String,
    /// Turn budget for each agent loop
    pub max_turns: u32,
    /// Model used by every agent, overriding their own
    pub model: Option<String>,
    /// Settings overlaid on every agent's own settings
    pub model_settings: Option<ModelSettings>,
    /// Filter applied to handoffs that have no filter of their own
    pub handoff_input_filter: Option<HandoffInputFilter>,
    /// Transforms applied to the run input, in order
    pub input_guardrails: Vec<BoxedGuardrail>,
    /// Transforms applied to the final output, in order
    pub output_guardrails: Vec<BoxedGuardrail>,
    pub trace_id: Option<String>,
    pub group_id: Option<String>,
    pub trace_metadata: Map<String, Value>,
    pub tracing_disabled: bool,
    /// Override the tracer's sensitive-data setting for this run
    pub trace_include_sensitive_data: Option<bool>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workflow_name: DEFAULT_WORKFLOW_NAME.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            model: None,
            model_settings: None,
            handoff_input_filter: None,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            trace_id: None,
            group_id: None,
            trace_metadata: Map::new(),
            tracing_disabled: false,
            trace_include_sensitive_data: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("workflow_name", &self.workflow_name)
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("model_settings", &self.model_settings)
            .field("handoff_input_filter", &self.handoff_input_filter.is_some())
            .field(
                "input_guardrails",
                &self.input_guardrails.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field(
                "output_guardrails",
                &self.output_guardrails.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("trace_id", &self.trace_id)
            .field("group_id", &self.group_id)
            .field("tracing_disabled", &self.tracing_disabled)
            .finish()
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = name.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }

    /// Set the global handoff input filter
    pub fn with_handoff_input_filter(
        mut self,
        filter: impl Fn(HandoffInput) -> HandoffInput + Send + Sync + 'static,
    ) -> Self {
        self.handoff_input_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.input_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.output_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_trace_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.trace_metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tracing_disabled(mut self, disabled: bool) -> Self {
        self.tracing_disabled = disabled;
        self
    }

    pub fn with_sensitive_data(mut self, include: bool) -> Self {
        self.trace_include_sensitive_data = Some(include);
        self
    }

    /// Options for the run's trace
    pub fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            trace_id: self.trace_id.clone(),
            group_id: self.group_id.clone(),
            metadata: self.trace_metadata.clone(),
            disabled: self.tracing_disabled,
            include_sensitive_data: self.trace_include_sensitive_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_turns, 25);
        assert_eq!(config.workflow_name, DEFAULT_WORKFLOW_NAME);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_trace_options_carry_ids() {
        let config = RunConfig::new()
            .with_trace_id("trace_abc")
            .with_group_id("thread_1")
            .with_trace_metadata("user", "u1")
            .with_sensitive_data(false);
        let options = config.trace_options();
        assert_eq!(options.trace_id.as_deref(), Some("trace_abc"));
        assert_eq!(options.group_id.as_deref(), Some("thread_1"));
        assert_eq!(options.metadata["user"], "u1");
        assert_eq!(options.include_sensitive_data, Some(false));
    }
}
