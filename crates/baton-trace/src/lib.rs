//! baton-trace: span and trace recorder
//!
//! A [`Tracer`] starts one [`TraceHandle`] per top-level run. Spans opened
//! through the handle nest under whichever span of *that run* is currently
//! open; there is no process-wide "current span", so concurrent runs never
//! see each other's trees. Finished traces are handed to the registered
//! [`TraceProcessor`]s.

pub mod config;
pub mod error;
pub mod processor;
pub mod span;
pub mod trace;

pub use config::TracingConfig;
pub use error::{Result, TraceError};
pub use processor::{JsonlSink, LogSink, MemorySink, TraceProcessor};
pub use span::{Span, SpanKind};
pub use trace::{SpanHandle, Trace, TraceHandle, TraceOptions, Tracer};
