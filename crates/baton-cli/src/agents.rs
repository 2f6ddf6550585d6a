//! The standard triage, research and report agents

use baton_agent::{Agent, remove_tool_messages};

use crate::tools::{CurrentTimeTool, FetchUrlTool, FormatReportTool};

const TRIAGE_INSTRUCTIONS: &str = "You route user requests. Reply with exactly one word: \
`research` when the user needs facts gathered, `report` when they need a written \
report on material they supplied, or `combined` when they need both.";

const DELEGATING_TRIAGE_INSTRUCTIONS: &str = "You route user requests. Hand off to the \
research agent when facts need gathering and to the report agent when a written \
report is wanted. Answer directly only for trivial greetings.";

const RESEARCH_INSTRUCTIONS: &str = "You are a careful researcher. Use fetch_url to read \
sources and current_time when dates matter. Answer with concise findings and cite \
the URLs you used.";

const REPORT_INSTRUCTIONS: &str = "You write clear reports. Build the document with \
format_report and return its Markdown as your final answer.";

pub fn research_agent() -> Agent {
    Agent::builder("Research Agent")
        .handoff_description("Gathers facts and sources for a question.")
        .instructions(RESEARCH_INSTRUCTIONS)
        .tool(FetchUrlTool::new())
        .tool(CurrentTimeTool::new())
        .build()
}

pub fn report_agent() -> Agent {
    Agent::builder("Report Agent")
        .handoff_description("Writes a structured Markdown report.")
        .instructions(REPORT_INSTRUCTIONS)
        .tool(FormatReportTool::new())
        .tool(CurrentTimeTool::new())
        .build()
}

/// Triage that only classifies; the orchestrator runs the branch
pub fn triage_agent() -> Agent {
    Agent::builder("Triage Agent")
        .instructions(TRIAGE_INSTRUCTIONS)
        .temperature(0.0)
        .build()
}

/// Triage that delegates by handoff, used for streamed runs
pub fn delegating_triage_agent() -> Agent {
    Agent::builder("Triage Agent")
        .instructions(DELEGATING_TRIAGE_INSTRUCTIONS)
        .handoff(research_agent())
        .handoff(report_agent())
        .handoff_input_filter("Report Agent", remove_tool_messages)
        .build()
}
