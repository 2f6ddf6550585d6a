//! Guardrails: ordered transforms over run input and output

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use baton_trace::SpanKind;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Map;
use thiserror::Error;

use crate::context::RunContext;

/// Rejection returned by a guardrail
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct GuardrailError {
    pub message: String,
}

impl GuardrailError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A transform applied to the run input or the final output.
///
/// Each guardrail receives the payload produced by the previous one and
/// returns the payload for the next, or rejects it.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, payload: String, context: &RunContext) -> Result<String, GuardrailError>;
}

pub type BoxedGuardrail = Arc<dyn Guardrail>;

/// Where a guardrail pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailStage {
    Input,
    Output,
}

impl GuardrailStage {
    fn as_str(&self) -> &'static str {
        match self {
            GuardrailStage::Input => "input",
            GuardrailStage::Output => "output",
        }
    }
}

/// Run `guardrails` in order over `payload`.
///
/// Returns the transformed payload, or the name of the first guardrail that
/// rejected it together with its error. Later guardrails do not run after a
/// rejection.
pub async fn run_guardrails(
    guardrails: &[BoxedGuardrail],
    stage: GuardrailStage,
    payload: String,
    context: &RunContext,
) -> Result<String, (String, GuardrailError)> {
    let mut payload = payload;
    for guardrail in guardrails {
        let span = context.open_span(
            SpanKind::Custom,
            format!("guardrail:{}", guardrail.name()),
            Map::new(),
        );
        span.set("stage", stage.as_str());

        match guardrail.check(payload, context).await {
            Ok(next) => {
                span.set("triggered", false);
                payload = next;
            }
            Err(e) => {
                tracing::info!(
                    guardrail = %guardrail.name(),
                    stage = stage.as_str(),
                    "guardrail rejected payload: {}",
                    e
                );
                span.set("triggered", true);
                span.record_error(e.message.clone());
                return Err((guardrail.name().to_string(), e));
            }
        }
    }
    Ok(payload)
}

/// Reject payloads longer than a character limit
#[derive(Debug, Clone)]
pub struct MaxLengthGuardrail {
    max_chars: usize,
}

impl MaxLengthGuardrail {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl Guardrail for MaxLengthGuardrail {
    fn name(&self) -> &str {
        "max_length"
    }

    async fn check(&self, payload: String, _context: &RunContext) -> Result<String, GuardrailError> {
        let len = payload.chars().count();
        if len > self.max_chars {
            return Err(GuardrailError::new(format!(
                "Payload is {} characters, the limit is {}",
                len, self.max_chars
            )));
        }
        Ok(payload)
    }
}

/// Reject payloads matching any of a set of patterns
#[derive(Debug, Clone)]
pub struct BlockedPatternGuardrail {
    patterns: Vec<Regex>,
}

impl BlockedPatternGuardrail {
    /// Compile the patterns; fails on the first invalid one
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

#[async_trait]
impl Guardrail for BlockedPatternGuardrail {
    fn name(&self) -> &str {
        "blocked_pattern"
    }

    async fn check(&self, payload: String, _context: &RunContext) -> Result<String, GuardrailError> {
        if let Some(re) = self.patterns.iter().find(|re| re.is_match(&payload)) {
            return Err(GuardrailError::new(format!(
                "Payload matches blocked pattern '{}'",
                re.as_str()
            )));
        }
        Ok(payload)
    }
}

/// Trim surrounding whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimGuardrail;

#[async_trait]
impl Guardrail for TrimGuardrail {
    fn name(&self) -> &str {
        "trim"
    }

    async fn check(&self, payload: String, _context: &RunContext) -> Result<String, GuardrailError> {
        Ok(payload.trim().to_string())
    }
}

#[derive(Clone)]
enum CheckFn {
    Sync(Arc<dyn Fn(String, &RunContext) -> Result<String, GuardrailError> + Send + Sync>),
    Async(Arc<dyn Fn(String) -> BoxFuture<'static, Result<String, GuardrailError>> + Send + Sync>),
}

/// A guardrail backed by a closure
#[derive(Clone)]
pub struct FnGuardrail {
    name: String,
    check: CheckFn,
}

impl FnGuardrail {
    /// Guardrail from a synchronous transform
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(String, &RunContext) -> Result<String, GuardrailError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: CheckFn::Sync(Arc::new(f)),
        }
    }

    /// Guardrail from an async transform that does not need the context
    pub fn from_async<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, GuardrailError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            check: CheckFn::Async(Arc::new(move |payload| Box::pin(f(payload)))),
        }
    }
}

impl fmt::Debug for FnGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGuardrail").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Guardrail for FnGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, payload: String, context: &RunContext) -> Result<String, GuardrailError> {
        match &self.check {
            CheckFn::Sync(f) => f(payload, context),
            CheckFn::Async(f) => f(payload).await,
        }
    }
}
