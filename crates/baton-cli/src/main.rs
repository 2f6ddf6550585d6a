//! baton - run a query through the triage, research and report agents

mod agents;
mod config;
mod tools;
mod utils;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use baton_agent::{
    AgentResult, MaxLengthGuardrail, Orchestrator, OrchestratorResult, RunConfig, RunContext,
    RunEvent, Runner, TrimGuardrail,
};
use baton_ai::providers::openai::OpenAIProvider;
use baton_trace::{JsonlSink, LogSink, Tracer, TracingConfig};
use clap::Parser;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use crate::utils::one_line;

const MAX_QUERY_CHARS: usize = 8000;

/// baton - agent execution and delegation from the command line
#[derive(Parser, Debug)]
#[command(name = "baton")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Query to run
    query: Option<String>,

    /// Model used by every agent
    #[arg(short, long)]
    model: Option<String>,

    /// OpenAI-compatible API root
    #[arg(long)]
    base_url: Option<String>,

    /// Turn budget for each agent loop
    #[arg(long)]
    max_turns: Option<u32>,

    /// Print tokens and events as they arrive
    #[arg(short, long)]
    stream: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Append finished traces to this file as JSON lines
    #[arg(long)]
    trace_file: Option<String>,

    /// Disable tracing
    #[arg(long)]
    no_trace: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "baton=debug,baton_agent=debug,baton_ai=debug,baton_trace=debug"
    } else {
        "warn,baton=info,baton_agent=info,baton_trace=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn expand_home(path: &str) -> std::path::PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => std::path::PathBuf::from(path),
    }
}

fn build_tracer(args: &Args, cfg: &config::Config) -> Tracer {
    let mut tracing_config = TracingConfig::from_env();
    if args.no_trace || cfg.tracing.enabled == Some(false) {
        tracing_config.disabled = true;
    }
    if let Some(include) = cfg.tracing.include_sensitive_data {
        tracing_config.include_sensitive_data = include;
    }

    let mut tracer = Tracer::new(tracing_config).with_processor(Arc::new(LogSink::new()));
    if let Some(path) = args.trace_file.as_ref().or(cfg.tracing.trace_file.as_ref()) {
        tracer.add_processor(Arc::new(JsonlSink::new(expand_home(path))));
    }
    tracer
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.init_config {
        let path = config::Config::init().context("Error creating config")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let Some(query) = args.query.clone() else {
        bail!("No query given. Usage: baton \"<query>\"");
    };

    let cfg = config::Config::load();
    let Some(api_key) = cfg.api_key() else {
        bail!(
            "No API key found. Set OPENAI_API_KEY or add api_key to {}",
            config::Config::config_path().display()
        );
    };

    let mut provider = OpenAIProvider::new(api_key);
    if let Some(base_url) = args.base_url.as_ref().or(cfg.base_url.as_ref()) {
        provider = provider.with_base_url(base_url);
    }
    let runner = Runner::new(Arc::new(provider)).with_tracer(build_tracer(&args, &cfg));

    let mut run_config = RunConfig::new()
        .with_workflow_name("baton")
        .with_input_guardrail(TrimGuardrail)
        .with_input_guardrail(MaxLengthGuardrail::new(MAX_QUERY_CHARS))
        .with_output_guardrail(TrimGuardrail);
    if let Some(model) = args.model.as_ref().or(cfg.model.as_ref()) {
        run_config = run_config.with_model(model);
    }
    if let Some(max_turns) = args.max_turns.or(cfg.max_turns) {
        run_config = run_config.with_max_turns(max_turns);
    }

    let stream = args.stream || cfg.stream.unwrap_or(false);
    let result = if stream {
        let orchestrator =
            Orchestrator::custom(runner, agents::delegating_triage_agent()).with_config(run_config);
        run_streamed(&orchestrator, &query).await
    } else {
        let orchestrator = Orchestrator::standard(
            runner,
            agents::triage_agent(),
            agents::research_agent(),
            agents::report_agent(),
        )
        .with_config(run_config);
        let out = orchestrator.run(&query).await;
        print_buffered(&out);
        out.result
    };

    if !result.success {
        bail!(result.error.unwrap_or_else(|| "run failed".to_string()));
    }
    Ok(())
}

/// Stream a run through the delegating triage agent
async fn run_streamed(orchestrator: &Orchestrator, query: &str) -> AgentResult {
    let mut events = orchestrator.run_streamed(query, RunContext::new(""));
    let mut stdout = std::io::stdout();
    let mut final_result = None;
    let mut failure = None;
    let mut mid_line = false;

    while let Some(event) = events.next().await {
        if mid_line && !matches!(event, RunEvent::Token { .. }) {
            println!();
            mid_line = false;
        }
        match event {
            RunEvent::Start { agent, trace_id } => {
                tracing::debug!(
                    agent = %agent,
                    trace_id = trace_id.as_deref().unwrap_or_default(),
                    "run started"
                );
            }
            RunEvent::AgentStart { agent } => eprintln!("[{}]", agent),
            RunEvent::Token { delta, .. } => {
                print!("{}", delta);
                let _ = stdout.flush();
                mid_line = true;
            }
            RunEvent::ToolStart {
                name, arguments, ..
            } => eprintln!("  -> {}({})", name, one_line(&arguments, 80)),
            RunEvent::ToolEnd {
                name,
                output,
                is_error,
                ..
            } => {
                let marker = if is_error { "!!" } else { "<-" };
                eprintln!("  {} {}: {}", marker, name, one_line(&output, 120));
            }
            RunEvent::Handoff { from, to } => eprintln!("  handoff: {} -> {}", from, to),
            RunEvent::Error { message, kind } => {
                failure = Some((message, kind));
            }
            RunEvent::Complete { result } => {
                print_metadata(&result, None);
                final_result = Some(*result);
            }
        }
    }

    final_result.unwrap_or_else(|| {
        let (message, kind) =
            failure.unwrap_or_else(|| ("run ended without a result".to_string(), None));
        AgentResult {
            content: String::new(),
            success: false,
            error: Some(message),
            failure: kind,
            metadata: Default::default(),
        }
    })
}

fn print_buffered(out: &OrchestratorResult) {
    if out.result.success {
        println!("{}", out.result.content);
    }
    print_metadata(&out.result, out.workflow.map(|w| w.as_str()));
}

fn print_metadata(result: &AgentResult, workflow: Option<&str>) {
    let meta = &result.metadata;
    eprintln!();
    if let Some(workflow) = workflow {
        eprintln!("workflow: {}", workflow);
    }
    eprintln!("path: {}", meta.handoff_tracker.join(" -> "));
    eprintln!(
        "turns: {}  tool calls: {}  tokens: {} in / {} out",
        meta.turns,
        meta.tool_calls.len(),
        meta.usage.input,
        meta.usage.output
    );
    if let Some(trace_id) = &meta.trace_id {
        eprintln!("trace: {}", trace_id);
    }
}
