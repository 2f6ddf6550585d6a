//! Agent descriptors

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use baton_ai::{ModelSettings, ToolSpec};
use serde_json::Value;

use crate::{
    config::RunConfig,
    context::RunContext,
    handoff::{
        self, Handoff, HandoffInput, HandoffInputFilter, HandoffMatch, normalize_agent_name,
    },
    instructions::Instructions,
    tool::{self, BoxedTool, Tool, to_tool_spec},
};

/// Model used when neither the run config nor the agent names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration of one agent.
///
/// An agent is read-only once built. [`Agent::clone_with`] produces an
/// independent copy with overrides applied; the original is never touched.
#[derive(Clone)]
pub struct Agent {
    name: String,
    handoff_description: Option<String>,
    instructions: Option<Instructions>,
    model: Option<String>,
    model_settings: ModelSettings,
    tools: Vec<BoxedTool>,
    handoffs: Vec<Handoff>,
    /// Keyed by normalized target name
    handoff_filters: HashMap<String, HandoffInputFilter>,
    output_schema: Option<Value>,

    validators: HashMap<String, Arc<jsonschema::Validator>>,
    output_validator: Option<Arc<jsonschema::Validator>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .field("model", &self.model)
            .field("tools", &self.tool_names())
            .field(
                "handoffs",
                &self.handoffs.iter().map(|h| h.agent_name()).collect::<Vec<_>>(),
            )
            .field("output_schema", &self.output_schema.is_some())
            .finish()
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    /// A builder pre-filled with this agent's configuration
    pub fn to_builder(&self) -> AgentBuilder {
        AgentBuilder {
            name: self.name.clone(),
            handoff_description: self.handoff_description.clone(),
            instructions: self.instructions.clone(),
            model: self.model.clone(),
            model_settings: self.model_settings.clone(),
            tools: self.tools.clone(),
            handoffs: self.handoffs.clone(),
            handoff_filters: self.handoff_filters.clone(),
            output_schema: self.output_schema.clone(),
        }
    }

    /// Copy this agent with overrides applied
    pub fn clone_with(&self, f: impl FnOnce(AgentBuilder) -> AgentBuilder) -> Agent {
        f(self.to_builder()).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra text added to the description of handoffs to this agent
    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    pub fn instructions(&self) -> Option<&Instructions> {
        self.instructions.as_ref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn model_settings(&self) -> &ModelSettings {
        &self.model_settings
    }

    pub fn tools(&self) -> &[BoxedTool] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn find_tool(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Classify a tool-call name.
    ///
    /// A handoff's exact tool name wins, then the agent's own tools, then
    /// `transfer_to_` decomposition against the handoff targets.
    pub fn resolve_call(&self, name: &str) -> HandoffMatch<'_> {
        let exact_handoff = self.handoffs.iter().any(|h| h.tool_name() == name);
        if !exact_handoff && self.find_tool(name).is_some() {
            return HandoffMatch::NotHandoff;
        }
        handoff::resolve(name, &self.handoffs)
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    pub fn has_handoffs(&self) -> bool {
        !self.handoffs.is_empty()
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Resolve the system prompt for a request
    pub fn resolve_instructions(&self, context: &RunContext) -> Option<String> {
        self.instructions.as_ref().map(|i| i.resolve(context))
    }

    /// Model for this agent under `config`
    pub fn effective_model(&self, config: &RunConfig) -> String {
        config
            .model
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Settings for this agent under `config`; run-level values win
    pub fn effective_settings(&self, config: &RunConfig) -> ModelSettings {
        match &config.model_settings {
            Some(overrides) => self.model_settings.merged_with(overrides),
            None => self.model_settings.clone(),
        }
    }

    /// Tools advertised to the model: the agent's own tools followed by one
    /// synthesized tool per handoff
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| to_tool_spec(t.as_ref()))
            .chain(self.handoffs.iter().map(Handoff::tool_spec))
            .collect()
    }

    /// Filter for delegations to `target`, by priority: one registered on
    /// this agent for the target, then the handoff's own, then the run's
    /// global filter
    pub fn handoff_filter<'a>(
        &'a self,
        handoff: &'a Handoff,
        config: &'a RunConfig,
    ) -> Option<&'a HandoffInputFilter> {
        self.handoff_filters
            .get(&normalize_agent_name(handoff.agent_name()))
            .or_else(|| handoff.input_filter())
            .or(config.handoff_input_filter.as_ref())
    }

    pub(crate) fn validate_arguments(&self, tool_name: &str, arguments: &Value) -> Option<String> {
        self.validators
            .get(tool_name)
            .and_then(|v| tool::validate_with_validator(arguments, v))
    }

    /// Parse and validate final text against the output schema.
    ///
    /// Returns `Ok(None)` for agents without an output type.
    pub(crate) fn parse_output(&self, text: &str) -> Result<Option<Value>, String> {
        if self.output_schema.is_none() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|e| format!("invalid JSON: {}", e))?;
        if let Some(ref validator) = self.output_validator {
            let errors: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
            if !errors.is_empty() {
                return Err(errors.join("; "));
            }
        }
        Ok(Some(value))
    }
}

/// Builder for [`Agent`]
#[derive(Clone)]
pub struct AgentBuilder {
    name: String,
    handoff_description: Option<String>,
    instructions: Option<Instructions>,
    model: Option<String>,
    model_settings: ModelSettings,
    tools: Vec<BoxedTool>,
    handoffs: Vec<Handoff>,
    handoff_filters: HashMap<String, HandoffInputFilter>,
    output_schema: Option<Value>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handoff_description: None,
            instructions: None,
            model: None,
            model_settings: ModelSettings::default(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            handoff_filters: HashMap::new(),
            output_schema: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Instructions computed from the run context for every request
    pub fn dynamic_instructions(
        mut self,
        f: impl Fn(&RunContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.instructions = Some(Instructions::dynamic(f));
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.model_settings.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.model_settings.max_tokens = Some(max_tokens);
        self
    }

    /// Add a tool, replacing any tool with the same name
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.push_tool(Arc::new(tool));
        self
    }

    pub fn boxed_tool(mut self, tool: BoxedTool) -> Self {
        self.push_tool(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = BoxedTool>) -> Self {
        for tool in tools {
            self.push_tool(tool);
        }
        self
    }

    fn push_tool(&mut self, tool: BoxedTool) {
        if let Some(i) = self.tools.iter().position(|t| t.name() == tool.name()) {
            tracing::warn!("Tool '{}' registered twice on '{}'; keeping the last", tool.name(), self.name);
            self.tools.remove(i);
        }
        self.tools.push(tool);
    }

    /// Add a handoff target (an [`Agent`], `Arc<Agent>` or [`Handoff`])
    pub fn handoff(mut self, handoff: impl Into<Handoff>) -> Self {
        self.handoffs.push(handoff.into());
        self
    }

    pub fn handoffs<H: Into<Handoff>>(mut self, handoffs: impl IntoIterator<Item = H>) -> Self {
        self.handoffs.extend(handoffs.into_iter().map(Into::into));
        self
    }

    pub fn clear_handoffs(mut self) -> Self {
        self.handoffs.clear();
        self.handoff_filters.clear();
        self
    }

    /// Register an input filter for delegations to `target`.
    ///
    /// Takes priority over the handoff's own filter and the run's global
    /// filter.
    pub fn handoff_input_filter(
        mut self,
        target: &str,
        filter: impl Fn(HandoffInput) -> HandoffInput + Send + Sync + 'static,
    ) -> Self {
        self.handoff_filters
            .insert(normalize_agent_name(target), Arc::new(filter));
        self
    }

    /// Require the final output to be JSON matching `schema`
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> Agent {
        for handoff in &self.handoffs {
            if self.tools.iter().any(|t| t.name() == handoff.tool_name()) {
                tracing::warn!(
                    agent = %self.name,
                    tool = %handoff.tool_name(),
                    "tool is shadowed by a handoff with the same name"
                );
            }
        }
        let validators = self
            .tools
            .iter()
            .filter_map(|t| {
                tool::compile_schema(t.name(), &t.parameters_schema())
                    .map(|v| (t.name().to_string(), v))
            })
            .collect();
        let output_validator = self
            .output_schema
            .as_ref()
            .and_then(|s| tool::compile_schema(&self.name, s));

        Agent {
            name: self.name,
            handoff_description: self.handoff_description,
            instructions: self.instructions,
            model: self.model,
            model_settings: self.model_settings,
            tools: self.tools,
            handoffs: self.handoffs,
            handoff_filters: self.handoff_filters,
            output_schema: self.output_schema,
            validators,
            output_validator,
        }
    }
}
