//! Agent instructions: static text or resolved per run

use std::fmt;
use std::sync::Arc;

use crate::context::RunContext;

/// Produces instructions from the run context
pub trait InstructionsProvider: Send + Sync {
    fn resolve(&self, context: &RunContext) -> String;
}

impl<F> InstructionsProvider for F
where
    F: Fn(&RunContext) -> String + Send + Sync,
{
    fn resolve(&self, context: &RunContext) -> String {
        self(context)
    }
}

/// Instructions used as the system prompt
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(Arc<dyn InstructionsProvider>),
}

impl Instructions {
    /// Instructions computed from the context at request time
    pub fn dynamic(provider: impl InstructionsProvider + 'static) -> Self {
        Self::Dynamic(Arc::new(provider))
    }

    pub fn resolve(&self, context: &RunContext) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(provider) => provider.resolve(context),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Instructions::Dynamic(_))
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Static(text)
    }
}
