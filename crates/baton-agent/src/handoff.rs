//! Handoffs: delegating the rest of a run to another agent

use std::fmt;
use std::sync::{Arc, LazyLock};

use baton_ai::{Message, ToolSpec};
use regex::Regex;
use serde_json::{Value, json};

use crate::{agent::Agent, context::RunContext, tool};

/// Prefix of synthesized handoff tool names
pub const HANDOFF_PREFIX: &str = "transfer_to_";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase the name and replace each run of whitespace with `_`
pub fn normalize_agent_name(name: &str) -> String {
    WHITESPACE_RE
        .replace_all(name.trim(), "_")
        .to_lowercase()
}

/// Default tool name for a handoff to `agent_name`
pub fn default_tool_name(agent_name: &str) -> String {
    format!("{}{}", HANDOFF_PREFIX, normalize_agent_name(agent_name))
}

/// What a handoff target receives
#[derive(Debug, Clone)]
pub struct HandoffInput {
    /// The run's original query; used when `history` is empty
    pub input: String,
    /// Conversation so far, ending with the handoff call and its result
    pub history: Vec<Message>,
}

impl HandoffInput {
    /// Messages the target's turn loop starts from
    pub fn into_messages(self) -> Vec<Message> {
        if self.history.is_empty() {
            vec![Message::user(self.input)]
        } else {
            self.history
        }
    }
}

/// Pure transform of the delegation input
pub type HandoffInputFilter = Arc<dyn Fn(HandoffInput) -> HandoffInput + Send + Sync>;

/// Observer called when a handoff is taken, with the parsed call arguments
pub type OnHandoff = Arc<dyn Fn(&RunContext, &Value) + Send + Sync>;

/// Drop tool calls and tool results from the history
pub fn remove_tool_messages(mut input: HandoffInput) -> HandoffInput {
    input.history.retain(|m| match m {
        Message::Tool { .. } => false,
        Message::Assistant { content, .. } => content.as_deref().is_some_and(|c| !c.trim().is_empty()),
        _ => true,
    });
    input.history = input
        .history
        .into_iter()
        .map(|m| match m {
            Message::Assistant {
                content, timestamp, ..
            } => Message::Assistant {
                content,
                tool_calls: vec![],
                timestamp,
            },
            other => other,
        })
        .collect();
    input
}

/// Keep only the most recent user message
pub fn last_user_message(mut input: HandoffInput) -> HandoffInput {
    let last = input.history.iter().rev().find(|m| m.is_user()).cloned();
    input.history = last.into_iter().collect();
    input
}

/// A delegation target plus how it is presented to the model
#[derive(Clone)]
pub struct Handoff {
    agent: Arc<Agent>,
    tool_name: Option<String>,
    tool_description: Option<String>,
    on_handoff: Option<OnHandoff>,
    input_filter: Option<HandoffInputFilter>,
    input_schema: Option<Value>,
    input_validator: Option<Arc<jsonschema::Validator>>,
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("agent", &self.agent.name())
            .field("tool_name", &self.tool_name())
            .field("input_filter", &self.input_filter.is_some())
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

impl Handoff {
    pub fn new(agent: impl Into<Arc<Agent>>) -> Self {
        Self {
            agent: agent.into(),
            tool_name: None,
            tool_description: None,
            on_handoff: None,
            input_filter: None,
            input_schema: None,
            input_validator: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = Some(description.into());
        self
    }

    pub fn on_handoff(mut self, f: impl Fn(&RunContext, &Value) + Send + Sync + 'static) -> Self {
        self.on_handoff = Some(Arc::new(f));
        self
    }

    pub fn with_input_filter(
        mut self,
        filter: impl Fn(HandoffInput) -> HandoffInput + Send + Sync + 'static,
    ) -> Self {
        self.input_filter = Some(Arc::new(filter));
        self
    }

    /// Expect structured arguments matching `schema` on the handoff call
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_validator = tool::compile_schema(&self.tool_name(), &schema);
        self.input_schema = Some(schema);
        self
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn tool_name(&self) -> String {
        self.tool_name
            .clone()
            .unwrap_or_else(|| default_tool_name(self.agent.name()))
    }

    pub fn tool_description(&self) -> String {
        self.tool_description.clone().unwrap_or_else(|| {
            let mut description = format!(
                "Handoff to the {} agent to handle the request.",
                self.agent.name()
            );
            if let Some(extra) = self.agent.handoff_description() {
                description.push(' ');
                description.push_str(extra);
            }
            description
        })
    }

    pub fn input_filter(&self) -> Option<&HandoffInputFilter> {
        self.input_filter.as_ref()
    }

    pub(crate) fn notify(&self, context: &RunContext, arguments: &Value) {
        if let Some(ref f) = self.on_handoff {
            f(context, arguments);
        }
    }

    /// Check the call arguments against the expected input type
    pub(crate) fn validate_input(&self, arguments: &Value) -> Option<String> {
        self.input_validator
            .as_ref()
            .and_then(|v| tool::validate_with_validator(arguments, v))
    }

    /// Tool signature advertised to the model
    pub fn tool_spec(&self) -> ToolSpec {
        let parameters = self.input_schema.clone().unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            })
        });
        ToolSpec::new(self.tool_name(), self.tool_description(), parameters)
    }
}

impl From<Agent> for Handoff {
    fn from(agent: Agent) -> Self {
        Handoff::new(agent)
    }
}

impl From<Arc<Agent>> for Handoff {
    fn from(agent: Arc<Agent>) -> Self {
        Handoff::new(agent)
    }
}

/// How a tool-call name relates to an agent's handoffs
#[derive(Debug)]
pub enum HandoffMatch<'a> {
    /// Resolved to one of the handoffs
    Target(&'a Handoff),
    /// Looks like a handoff but names no known agent
    Unresolved(String),
    /// An ordinary tool call
    NotHandoff,
}

/// Resolve a tool-call name against a handoff list.
///
/// Exact tool-name matches (including overridden names) win. Otherwise a
/// name carrying the `transfer_to_` prefix is decomposed and the remainder
/// compared with each target's normalized agent name.
pub fn resolve<'a>(tool_name: &str, handoffs: &'a [Handoff]) -> HandoffMatch<'a> {
    if let Some(h) = handoffs.iter().find(|h| h.tool_name() == tool_name) {
        return HandoffMatch::Target(h);
    }

    let normalized = normalize_agent_name(tool_name);
    let Some(target) = normalized.strip_prefix(HANDOFF_PREFIX) else {
        return HandoffMatch::NotHandoff;
    };

    match handoffs
        .iter()
        .find(|h| normalize_agent_name(h.agent_name()) == target)
    {
        Some(h) => HandoffMatch::Target(h),
        None => HandoffMatch::Unresolved(target.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handoffs(names: &[&str]) -> Vec<Handoff> {
        names
            .iter()
            .map(|n| Handoff::new(Agent::builder(*n).build()))
            .collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_agent_name("Research Agent"), "research_agent");
        assert_eq!(normalize_agent_name("  Report\t\tWriter "), "report_writer");
        assert_eq!(normalize_agent_name("ResearchAgent"), "researchagent");
    }

    #[test]
    fn test_default_tool_name() {
        assert_eq!(default_tool_name("Research Agent"), "transfer_to_research_agent");
    }

    #[test]
    fn test_resolve_by_normalized_name() {
        let list = handoffs(&["Research Agent", "ReportAgent"]);
        match resolve("transfer_to_research_agent", &list) {
            HandoffMatch::Target(h) => assert_eq!(h.agent_name(), "Research Agent"),
            other => panic!("expected target, got {:?}", other),
        }
        match resolve("Transfer_To_ReportAgent", &list) {
            HandoffMatch::Target(h) => assert_eq!(h.agent_name(), "ReportAgent"),
            other => panic!("expected target, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_target() {
        let list = handoffs(&["Research Agent"]);
        match resolve("transfer_to_billing", &list) {
            HandoffMatch::Unresolved(target) => assert_eq!(target, "billing"),
            other => panic!("expected unresolved, got {:?}", other),
        }
        assert!(matches!(resolve("web_search", &list), HandoffMatch::NotHandoff));
    }

    #[test]
    fn test_resolve_overridden_tool_name() {
        let list = vec![Handoff::new(Agent::builder("Billing").build()).with_tool_name("escalate")];
        assert!(matches!(resolve("escalate", &list), HandoffMatch::Target(_)));
        assert_eq!(list[0].tool_spec().name, "escalate");
    }

    #[test]
    fn test_tool_description_default_and_override() {
        let agent = Agent::builder("Research")
            .handoff_description("Finds sources.")
            .build();
        let h = Handoff::new(agent);
        assert_eq!(
            h.tool_description(),
            "Handoff to the Research agent to handle the request. Finds sources."
        );
        let h = h.with_tool_description("Ask research");
        assert_eq!(h.tool_spec().description, "Ask research");
    }

    #[test]
    fn test_input_schema_validation() {
        let h = Handoff::new(Agent::builder("Billing").build()).with_input_schema(json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"]
        }));
        assert!(h.validate_input(&json!({})).is_some());
        assert!(h.validate_input(&json!({"reason": "refund"})).is_none());
        assert_eq!(h.tool_spec().parameters["required"][0], "reason");
    }

    #[test]
    fn test_filters() {
        let input = HandoffInput {
            input: "q".into(),
            history: vec![
                Message::user("first"),
                Message::assistant(
                    None,
                    vec![baton_ai::ToolCall::new("1", "search", "{}")],
                ),
                Message::tool_result("1", "search", "found", false),
                Message::assistant_text("partial answer"),
                Message::user("second"),
            ],
        };

        let stripped = remove_tool_messages(input.clone());
        assert_eq!(stripped.history.len(), 3);
        assert!(stripped.history.iter().all(|m| m.tool_calls().is_empty()));

        let last = last_user_message(input);
        assert_eq!(last.history.len(), 1);
        assert_eq!(last.history[0].text(), Some("second"));
    }

    #[test]
    fn test_empty_history_falls_back_to_input() {
        let input = HandoffInput {
            input: "original".into(),
            history: vec![],
        };
        let messages = input.into_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some("original"));
    }
}
