//! Markdown report assembly

use async_trait::async_trait;
use baton_agent::{Tool, ToolError};
use serde::Deserialize;
use serde_json::json;

/// Tool rendering a title and sections as a Markdown document
pub struct FormatReportTool;

impl FormatReportTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FormatReportTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ReportArgs {
    title: String,
    #[serde(default)]
    summary: Option<String>,
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    heading: String,
    body: String,
}

fn render(args: &ReportArgs) -> String {
    let mut out = format!("# {}\n", args.title.trim());
    if let Some(summary) = args.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(&format!("\n_{}_\n", summary));
    }
    for section in &args.sections {
        out.push_str(&format!(
            "\n## {}\n\n{}\n",
            section.heading.trim(),
            section.body.trim()
        ));
    }
    out
}

#[async_trait]
impl Tool for FormatReportTool {
    fn name(&self) -> &str {
        "format_report"
    }

    fn description(&self) -> &str {
        "Format a report as Markdown from a title, an optional summary and a list of sections."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "summary": { "type": "string" },
                "sections": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "heading": { "type": "string" },
                            "body": { "type": "string" }
                        },
                        "required": ["heading", "body"]
                    }
                }
            },
            "required": ["title", "sections"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: ReportArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::new(format!("Invalid report: {}", e)))?;
        Ok(render(&args))
    }
}
