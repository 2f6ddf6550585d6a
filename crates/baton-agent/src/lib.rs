//! baton-agent: agent execution and delegation
//!
//! An [`Agent`] is a named configuration of instructions, tools and handoff
//! targets. A [`Runner`] drives it through a bounded turn loop against a
//! [`baton_ai::ModelProvider`]: each turn calls the model, runs the requested
//! tools in order, and either continues, hands the run to another agent, or
//! finishes. Every run is recorded as a [`baton_trace::Trace`].
//!
//! The [`Orchestrator`] wraps a fixed triage/research/report topology, or
//! any caller-built agent graph, behind input and output guardrails.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod handoff;
pub mod instructions;
pub mod orchestrator;
pub mod result;
pub mod runner;
pub mod streaming;
pub mod tool;

pub use agent::{Agent, AgentBuilder, DEFAULT_MODEL};
pub use config::{DEFAULT_WORKFLOW_NAME, RunConfig};
pub use context::{DEFAULT_MAX_TURNS, RunContext};
pub use error::{Error, FailureKind, Result};
pub use guardrail::{
    BlockedPatternGuardrail, BoxedGuardrail, FnGuardrail, Guardrail, GuardrailError,
    GuardrailStage, MaxLengthGuardrail, TrimGuardrail, run_guardrails,
};
pub use handoff::{
    HANDOFF_PREFIX, Handoff, HandoffInput, HandoffInputFilter, HandoffMatch, default_tool_name,
    last_user_message, normalize_agent_name, remove_tool_messages,
};
pub use instructions::{Instructions, InstructionsProvider};
pub use orchestrator::{Orchestrator, OrchestratorResult, Topology, Workflow};
pub use result::{AgentResult, ResultMetadata, ToolCallRecord};
pub use runner::{RunInput, Runner};
pub use streaming::RunEvent;
pub use tool::{BoxedTool, FunctionTool, Tool, ToolError, ToolResult, to_tool_spec};
