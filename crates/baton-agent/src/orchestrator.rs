//! One-call composition of agents behind guardrails and a trace

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    agent::Agent,
    config::RunConfig,
    context::RunContext,
    error::Error,
    guardrail::{GuardrailStage, run_guardrails},
    result::AgentResult,
    runner::Runner,
    streaming::{EventSink, RunEvent},
};

/// Branch picked by the triage pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Research,
    Report,
    /// Research first, then a report built on its findings
    Combined,
}

impl Workflow {
    /// Read a workflow out of the triage agent's answer
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        let research = text.contains("research");
        let report = text.contains("report");
        if text.contains("combined") || (research && report) {
            Some(Workflow::Combined)
        } else if report {
            Some(Workflow::Report)
        } else if research {
            Some(Workflow::Research)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::Research => "research",
            Workflow::Report => "report",
            Workflow::Combined => "combined",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The agent graph an orchestrator drives
#[derive(Debug, Clone)]
pub enum Topology {
    /// Triage picks research, report or both.
    ///
    /// When the triage agent has handoffs of its own it is run as the entry
    /// agent and delegates by itself; otherwise its answer is classified and
    /// the orchestrator runs the chosen branch.
    Standard {
        triage: Agent,
        research: Agent,
        report: Agent,
    },
    /// A caller-built graph entered at `entry`
    Custom { entry: Agent },
}

impl Topology {
    /// The agent a run starts with
    pub fn entry(&self) -> &Agent {
        match self {
            Topology::Standard { triage, .. } => triage,
            Topology::Custom { entry } => entry,
        }
    }
}

/// Result of an orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub result: AgentResult,
    /// Agents the run passed through, in order
    pub handoff_path: Vec<String>,
    /// Branch picked by triage classification, when one ran
    pub workflow: Option<Workflow>,
    pub trace_id: Option<String>,
}

/// Runs a [`Topology`] behind input/output guardrails.
///
/// Every run gets its own context and trace; the trace is finished exactly
/// once whatever the outcome.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    runner: Runner,
    topology: Topology,
    config: RunConfig,
}

impl Orchestrator {
    pub fn new(runner: Runner, topology: Topology) -> Self {
        Self {
            runner,
            topology,
            config: RunConfig::default(),
        }
    }

    pub fn standard(runner: Runner, triage: Agent, research: Agent, report: Agent) -> Self {
        Self::new(
            runner,
            Topology::Standard {
                triage,
                research,
                report,
            },
        )
    }

    pub fn custom(runner: Runner, entry: Agent) -> Self {
        Self::new(runner, Topology::Custom { entry })
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub async fn run(&self, query: &str) -> OrchestratorResult {
        self.run_with_context(query, RunContext::new("")).await
    }

    /// Run with caller-supplied context fields; the orchestrator's config
    /// replaces the context's
    pub async fn run_with_context(&self, query: &str, context: RunContext) -> OrchestratorResult {
        self.run_events(query, context, &EventSink::none()).await
    }

    /// Spawn an orchestrated run and return its events.
    ///
    /// Guardrails apply as in [`Orchestrator::run`]: an input rejection is
    /// the only event sent, and `Complete` carries the output after the
    /// output guardrails. Tokens are forwarded as the model produces them,
    /// before output guardrails see the final text.
    pub fn run_streamed(
        &self,
        query: &str,
        context: RunContext,
    ) -> UnboundedReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = self.clone();
        let query = query.to_string();

        tokio::spawn(async move {
            let out = orchestrator
                .run_events(&query, context, &EventSink::new(tx))
                .await;
            tracing::debug!(success = out.result.success, "streamed orchestrated run finished");
        });

        UnboundedReceiverStream::new(rx)
    }

    async fn run_events(
        &self,
        query: &str,
        context: RunContext,
        events: &EventSink,
    ) -> OrchestratorResult {
        let mut context = context.with_run_config(self.config.clone());
        context.begin_run(query);

        if query.trim().is_empty() {
            tracing::warn!("rejecting empty query");
            let error = Error::EmptyInput;
            events.emit(RunEvent::error(&error));
            let result = AgentResult::failure(&error, context.metadata());
            return OrchestratorResult {
                handoff_path: Vec::new(),
                workflow: None,
                trace_id: None,
                result,
            };
        }

        let owned = self.runner.ensure_trace(&mut context);
        let trace_id = context.trace().map(|t| t.trace_id().to_string());
        tracing::info!(
            workflow = %self.config.workflow_name,
            trace_id = trace_id.as_deref().unwrap_or_default(),
            "orchestrated run started"
        );

        let outcome = AssertUnwindSafe(self.run_guarded(query, &mut context, events))
            .catch_unwind()
            .await;
        self.runner.finish_owned(owned, &mut context).await;

        let (result, workflow) = match outcome {
            Ok(out) => out,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        tracing::info!(
            success = result.success,
            path = ?result.metadata.handoff_tracker,
            "orchestrated run finished"
        );
        if result.success {
            events.emit(RunEvent::Complete {
                result: Box::new(result.clone()),
            });
        } else {
            events.emit(RunEvent::Error {
                message: result.error.clone().unwrap_or_default(),
                kind: result.failure,
            });
        }
        OrchestratorResult {
            handoff_path: result.metadata.handoff_tracker.clone(),
            workflow,
            trace_id,
            result,
        }
    }

    async fn run_guarded(
        &self,
        query: &str,
        context: &mut RunContext,
        events: &EventSink,
    ) -> (AgentResult, Option<Workflow>) {
        let input = match run_guardrails(
            &self.config.input_guardrails,
            GuardrailStage::Input,
            query.to_string(),
            context,
        )
        .await
        {
            Ok(input) => input,
            Err((guardrail, e)) => {
                let error = Error::InputGuardrail {
                    guardrail,
                    message: e.message,
                };
                return (AgentResult::failure(&error, context.metadata()), None);
            }
        };
        context.original_query = input.clone();
        events.emit(RunEvent::Start {
            agent: self.topology.entry().name().to_string(),
            trace_id: context.trace().map(|t| t.trace_id().to_string()),
        });

        let (mut result, workflow) = self.run_topology(&input, context, &events.nested()).await;
        if !result.success {
            return (result, workflow);
        }

        match run_guardrails(
            &self.config.output_guardrails,
            GuardrailStage::Output,
            std::mem::take(&mut result.content),
            context,
        )
        .await
        {
            Ok(output) => {
                result.content = output;
                (result, workflow)
            }
            Err((guardrail, e)) => {
                let error = Error::OutputGuardrail {
                    guardrail,
                    message: e.message,
                };
                (AgentResult::failure(&error, context.metadata()), workflow)
            }
        }
    }

    async fn run_topology(
        &self,
        input: &str,
        context: &mut RunContext,
        events: &EventSink,
    ) -> (AgentResult, Option<Workflow>) {
        match &self.topology {
            Topology::Custom { entry } => (self.step(entry, input, context, events).await, None),
            Topology::Standard { triage, .. } if triage.has_handoffs() => {
                (self.step(triage, input, context, events).await, None)
            }
            Topology::Standard {
                triage,
                research,
                report,
            } => {
                let classified = self.step(triage, input, context, events).await;
                if !classified.success {
                    return (classified, None);
                }
                let workflow = Workflow::parse(&classified.content).unwrap_or_else(|| {
                    tracing::warn!(
                        "triage answer {:?} names no workflow; defaulting to research",
                        classified.content
                    );
                    Workflow::Research
                });
                tracing::debug!(workflow = %workflow, "triage classified query");

                let result = match workflow {
                    Workflow::Research => {
                        self.delegate(research, input.to_string(), context, events)
                            .await
                    }
                    Workflow::Report => {
                        self.delegate(report, input.to_string(), context, events)
                            .await
                    }
                    Workflow::Combined => {
                        let findings = self
                            .delegate(research, input.to_string(), context, events)
                            .await;
                        if !findings.success {
                            return (findings, Some(workflow));
                        }
                        let report_input =
                            format!("{}\n\nResearch findings:\n{}", input, findings.content);
                        self.delegate(report, report_input, context, events).await
                    }
                };
                (result, Some(workflow))
            }
        }
    }

    async fn step(
        &self,
        agent: &Agent,
        input: &str,
        context: &mut RunContext,
        events: &EventSink,
    ) -> AgentResult {
        self.runner
            .execute_inner(agent, input.into(), context, events)
            .await
    }

    async fn delegate(
        &self,
        agent: &Agent,
        input: String,
        context: &mut RunContext,
        events: &EventSink,
    ) -> AgentResult {
        context.record_agent(agent.name());
        self.runner
            .execute_inner(agent, input.into(), context, events)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_parse() {
        assert_eq!(Workflow::parse("research"), Some(Workflow::Research));
        assert_eq!(Workflow::parse("Workflow: REPORT"), Some(Workflow::Report));
        assert_eq!(Workflow::parse("combined"), Some(Workflow::Combined));
        assert_eq!(
            Workflow::parse("research, then a report"),
            Some(Workflow::Combined)
        );
        assert_eq!(Workflow::parse("no idea"), None);
    }
}
