//! Demo tools for the standard agents

mod current_time;
mod fetch_url;
mod format_report;

pub use current_time::CurrentTimeTool;
pub use fetch_url::FetchUrlTool;
pub use format_report::FormatReportTool;
