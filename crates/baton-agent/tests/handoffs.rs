mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use baton_agent::{
    Agent, FunctionTool, Handoff, HandoffInput, RunConfig, RunContext, last_user_message,
};
use baton_ai::{CompletionRequest, Message};
use baton_test_model::{ScriptedProvider, ScriptedResponse, call};
use common::{counting_echo, scripted_runner};
use parking_lot::Mutex;
use serde_json::json;

/// Replies by agent: requests carry the agent's instructions as system prompt
fn by_agent(
    f: impl Fn(&str, &CompletionRequest) -> ScriptedResponse + Send + Sync + 'static,
) -> ScriptedProvider {
    ScriptedProvider::from_fn(move |request| {
        let agent = request.system_prompt.clone().unwrap_or_default();
        f(&agent, request)
    })
}

#[tokio::test]
async fn delegation_records_both_agents() {
    let research = Agent::builder("ResearchAgent").instructions("research").build();
    let delegation = Agent::builder("DelegationAgent")
        .instructions("delegate")
        .handoff(research)
        .build();
    let (runner, provider, _) = scripted_runner(by_agent(|agent, _| match agent {
        "delegate" => ScriptedResponse::tool_call("h1", "transfer_to_researchagent", json!({})),
        _ => ScriptedResponse::text("Findings: the sky is blue."),
    }));

    let mut ctx = RunContext::new("");
    let result = runner.execute(&delegation, "Why is the sky blue?", &mut ctx).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.content, "Findings: the sky is blue.");
    assert_eq!(
        result.metadata.handoff_tracker,
        vec!["DelegationAgent", "ResearchAgent"]
    );
    assert_eq!(result.metadata.last_agent.as_deref(), Some("ResearchAgent"));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn spaced_names_resolve_through_normalized_tool_name() {
    let research = Agent::builder("Research Agent").instructions("research").build();
    let triage = Agent::builder("Triage").instructions("triage").handoff(research).build();
    assert_eq!(triage.tool_specs()[0].name, "transfer_to_research_agent");

    let (runner, _, _) = scripted_runner(by_agent(|agent, _| match agent {
        "triage" => ScriptedResponse::tool_call("h1", "transfer_to_research_agent", json!({})),
        _ => ScriptedResponse::text("researched"),
    }));

    let result = runner.execute(&triage, "look into it", &mut RunContext::new("")).await;
    assert_eq!(result.content, "researched");
    assert_eq!(result.metadata.handoff_tracker, vec!["Triage", "Research Agent"]);
}

#[tokio::test]
async fn first_handoff_in_batch_wins_and_later_calls_are_skipped() {
    let counter = Arc::new(AtomicUsize::new(0));
    let target = Agent::builder("Target").instructions("target").build();
    let agent = Agent::builder("Source")
        .instructions("source")
        .tool(counting_echo(counter.clone()))
        .handoff(target)
        .build();
    let (runner, provider, _) = scripted_runner(by_agent(|agent, _| match agent {
        "source" => ScriptedResponse::tool_calls(vec![
            call("t1", "echo", json!({"text": "one"})),
            call("h1", "transfer_to_target", json!({})),
            call("t3", "echo", json!({"text": "three"})),
        ]),
        _ => ScriptedResponse::text("target answer"),
    }));

    let result = runner.execute(&agent, "go", &mut RunContext::new("")).await;

    assert!(result.success);
    assert_eq!(result.content, "target answer");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(result.metadata.tool_calls.len(), 1);
    assert_eq!(result.metadata.tool_calls[0].call_id, "t1");

    // Every call in the delegating batch has exactly one response.
    let target_request = &provider.requests()[1];
    let responses: Vec<(String, bool)> = target_request
        .messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool {
                tool_call_id,
                is_error,
                ..
            } => Some((tool_call_id.clone(), *is_error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        responses,
        vec![
            ("t1".to_string(), false),
            ("h1".to_string(), false),
            ("t3".to_string(), true)
        ]
    );
}

#[tokio::test]
async fn unknown_target_is_a_per_call_error() {
    let agent = Agent::builder("Solo")
        .handoff(Agent::builder("Helper").build())
        .build();
    let (runner, provider, _) = scripted_runner(ScriptedProvider::new([
        ScriptedResponse::tool_call("h1", "transfer_to_billing", json!({})),
        ScriptedResponse::text("handled myself"),
    ]));

    let result = runner.execute(&agent, "refund please", &mut RunContext::new("")).await;

    assert!(result.success);
    assert_eq!(result.content, "handled myself");
    assert_eq!(result.metadata.handoff_tracker, vec!["Solo"]);
    let last = provider.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(last.text(), Some("Error: Handoff target not found: billing"));
}

#[tokio::test]
async fn target_filter_beats_global_filter() {
    let seen = Arc::new(Mutex::new(Vec::<Vec<Message>>::new()));
    let recorder = seen.clone();
    let target = Agent::builder("Writer").instructions("writer").build();
    let agent = Agent::builder("Lead")
        .instructions("lead")
        .handoff(target)
        .handoff_input_filter("Writer", last_user_message)
        .build();
    let (runner, _, _) = scripted_runner(by_agent(move |agent, request| {
        if agent == "lead" {
            ScriptedResponse::tool_call("h1", "transfer_to_writer", json!({}))
        } else {
            recorder.lock().push(request.messages.clone());
            ScriptedResponse::text("written")
        }
    }));
    let config = RunConfig::new().with_handoff_input_filter(|_| HandoffInput {
        input: "global".into(),
        history: vec![],
    });
    let mut ctx = RunContext::new("").with_run_config(config);

    let result = runner.execute(&agent, "draft a memo", &mut ctx).await;

    assert!(result.success);
    let seen = seen.lock();
    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[0][0].text(), Some("draft a memo"));
}

#[tokio::test]
async fn global_filter_applies_without_target_filter() {
    let seen = Arc::new(Mutex::new(Vec::<Vec<Message>>::new()));
    let recorder = seen.clone();
    let agent = Agent::builder("Lead")
        .instructions("lead")
        .handoff(Agent::builder("Writer").instructions("writer").build())
        .build();
    let (runner, _, _) = scripted_runner(by_agent(move |agent, request| {
        if agent == "lead" {
            ScriptedResponse::tool_call("h1", "transfer_to_writer", json!({}))
        } else {
            recorder.lock().push(request.messages.clone());
            ScriptedResponse::text("written")
        }
    }));
    // An empty history falls back to the original query.
    let config = RunConfig::new().with_handoff_input_filter(|mut input| {
        input.history.clear();
        input
    });
    let mut ctx = RunContext::new("").with_run_config(config);

    runner.execute(&agent, "draft a memo", &mut ctx).await;

    let seen = seen.lock();
    assert_eq!(seen[0].len(), 1);
    assert!(seen[0][0].is_user());
    assert_eq!(seen[0][0].text(), Some("draft a memo"));
}

#[tokio::test]
async fn unfiltered_handoff_carries_full_history() {
    let seen = Arc::new(Mutex::new(Vec::<Vec<Message>>::new()));
    let recorder = seen.clone();
    let agent = Agent::builder("Lead")
        .instructions("lead")
        .handoff(Agent::builder("Writer").instructions("writer").build())
        .build();
    let (runner, _, _) = scripted_runner(by_agent(move |agent, request| {
        if agent == "lead" {
            ScriptedResponse::tool_call("h1", "transfer_to_writer", json!({}))
        } else {
            recorder.lock().push(request.messages.clone());
            ScriptedResponse::text("written")
        }
    }));

    runner.execute(&agent, "draft a memo", &mut RunContext::new("")).await;

    let history = &seen.lock()[0];
    let roles: Vec<_> = history.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool"]);
    assert_eq!(history[2].text(), Some(r#"{"assistant":"Writer"}"#));
}

#[tokio::test]
async fn on_handoff_observer_and_input_schema() {
    let observed = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = observed.clone();
    let escalation = Handoff::new(Agent::builder("Billing").instructions("billing").build())
        .with_input_schema(json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"]
        }))
        .on_handoff(move |ctx, args| {
            sink.lock().push(format!(
                "{}:{}",
                ctx.original_query,
                args["reason"].as_str().unwrap_or_default()
            ));
        });
    let agent = Agent::builder("Support")
        .instructions("support")
        .handoff(escalation)
        .build();
    let (runner, provider, _) = scripted_runner(ScriptedProvider::new([
        ScriptedResponse::tool_call("h1", "transfer_to_billing", json!({})),
        ScriptedResponse::tool_call("h2", "transfer_to_billing", json!({"reason": "refund"})),
        ScriptedResponse::text("refund issued"),
    ]));

    let result = runner.execute(&agent, "I want my money back", &mut RunContext::new("")).await;

    assert!(result.success);
    assert_eq!(result.content, "refund issued");
    assert_eq!(*observed.lock(), vec!["I want my money back:refund"]);
    let rejected = provider.requests()[1].messages.last().cloned().unwrap();
    assert!(rejected.text().unwrap().contains("Argument validation failed"));
}

#[tokio::test]
async fn repeated_agent_names_are_bounded_by_turn_budgets() {
    // Ping hands to Pong, which hands to a second agent also named "Ping"
    // that only calls a missing tool. Names are not deduplicated; the last
    // loop's budget ends the run.
    let stuck = Agent::builder("Ping").instructions("stuck").build();
    let pong = Agent::builder("Pong").instructions("pong").handoff(stuck).build();
    let ping = Agent::builder("Ping").instructions("ping").handoff(pong).build();
    let (runner, _, _) = scripted_runner(by_agent(|agent, _| match agent {
        "ping" => ScriptedResponse::tool_call("h", "transfer_to_pong", json!({})),
        "pong" => ScriptedResponse::tool_call("h", "transfer_to_ping", json!({})),
        _ => ScriptedResponse::tool_call("x", "missing_tool", json!({})),
    }));
    let mut ctx = RunContext::new("").with_max_turns(3);

    let result = runner.execute(&ping, "bounce", &mut ctx).await;

    assert!(result.is_max_turns_exceeded());
    assert_eq!(result.metadata.handoff_tracker, vec!["Ping", "Pong", "Ping"]);
    assert_eq!(result.metadata.turns, 2 + 3);
}

#[tokio::test]
async fn prefixed_tool_name_runs_as_a_tool() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let savings = FunctionTool::new(
        "transfer_to_savings",
        "Move money into the savings account",
        json!({"type": "object"}),
        move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("moved 100".to_string())
            }
        },
    );
    let agent = Agent::builder("Bank")
        .tool(savings)
        .handoff(Agent::builder("Fraud").build())
        .build();
    let (runner, provider, _) = scripted_runner(ScriptedProvider::new([
        ScriptedResponse::tool_call("t1", "transfer_to_savings", json!({})),
        ScriptedResponse::text("Done."),
    ]));

    let result = runner.execute(&agent, "save 100", &mut RunContext::new("")).await;

    assert!(result.success);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(result.metadata.handoff_tracker, vec!["Bank"]);
    let last = provider.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(last.text(), Some("moved 100"));
}

#[tokio::test]
async fn reused_context_starts_each_run_fresh() {
    let research = Agent::builder("Research").instructions("research").build();
    let triage = Agent::builder("Triage")
        .instructions("triage")
        .handoff(research)
        .handoff_input_filter("Research", |input: HandoffInput| HandoffInput {
            history: Vec::new(),
            ..input
        })
        .build();
    let (runner, provider, _) = scripted_runner(ScriptedProvider::from_fn(|request| {
        match request.system_prompt.as_deref() {
            Some("triage") => ScriptedResponse::tool_call("h", "transfer_to_research", json!({})),
            _ => ScriptedResponse::text("ok"),
        }
    }));
    let mut ctx = RunContext::new("").with_field("user_id", "u-7");

    runner.execute(&triage, "first question", &mut ctx).await;
    let second = runner.execute(&triage, "second question", &mut ctx).await;

    assert!(second.success);
    assert_eq!(ctx.original_query, "second question");
    assert_eq!(second.metadata.handoff_tracker, vec!["Triage", "Research"]);
    assert_eq!(second.metadata.turns, 2);
    assert_eq!(ctx.field("user_id"), Some(&json!("u-7")));

    let request = provider.last_request().unwrap();
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].text(), Some("second question"));
}
