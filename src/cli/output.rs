//! Output formatting for the `health` and `models` commands
//!
//! Reports render as JSON, YAML, or human-readable text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Health status for one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HealthStatus {
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            available: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub name: String,
    pub endpoint: String,
    pub status: HealthStatus,
}

/// Everything the `health` command reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub backends: Vec<BackendHealth>,
    /// The backend a chat session would use
    pub selected: Option<String>,
    /// What to do when nothing is selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Everything the `models` command reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsReport {
    pub backend: String,
    pub configured_model: String,
    pub models: Vec<String>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_health(&self, report: &HealthReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize health status to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize health status to YAML")
            }
            OutputFormat::Human => Ok(self.format_health_human(report)),
        }
    }

    pub fn format_models(&self, report: &ModelsReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize model list to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize model list to YAML")
            }
            OutputFormat::Human => Ok(self.format_models_human(report)),
        }
    }

    fn format_health_human(&self, report: &HealthReport) -> String {
        let mut output = String::new();

        output.push_str("Backend Health Status\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for backend in &report.backends {
            let symbol = if backend.status.available {
                "\u{2713}"
            } else {
                "\u{2717}"
            };
            output.push_str(&format!("{} {} ({})\n", symbol, backend.name, backend.endpoint));
            output.push_str(&format!("  Message: {}\n", backend.status.message));
            if let Some(ref details) = backend.status.details {
                output.push_str(&format!("  Details: {}\n", details));
            }
            output.push('\n');
        }

        match &report.selected {
            Some(selected) => output.push_str(&format!("Selected backend: {}\n", selected)),
            None => output.push_str("Selected backend: none\n"),
        }
        if let Some(ref remediation) = report.remediation {
            output.push('\n');
            output.push_str(remediation);
            output.push('\n');
        }

        output
    }

    fn format_models_human(&self, report: &ModelsReport) -> String {
        let mut output = format!("Models on {}\n{}\n\n", report.backend, RULE);

        if report.models.is_empty() {
            output.push_str("(none)\n");
        }
        for model in &report.models {
            let marker = if crate::llm::normalize_model_name(model)
                == crate::llm::normalize_model_name(&report.configured_model)
            {
                "*"
            } else {
                " "
            };
            output.push_str(&format!("{} {}\n", marker, model));
        }
        output.push_str("\n* = configured model\n");
        output
    }
}
