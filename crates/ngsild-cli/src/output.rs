//! Output formatting for ngsild-federate (table, json)

use clap::ValueEnum;
use colored::Colorize;
use ngsild_core::{CompactedEntity, ContextSourceRegistration, FederatedResult, NgsiLdWarning};
use serde::Serialize;
use serde_json::Value;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print federation warnings to stderr
    pub fn warnings(&self, warnings: &[NgsiLdWarning]) {
        for warning in warnings {
            self.warn(&format!("warning: {}", warning));
        }
    }

    /// Print a federated result. Warnings always go to stderr.
    pub fn print_result(&self, result: &FederatedResult) {
        match self.format {
            OutputFormat::Table => {
                if result.entities.is_empty() {
                    println!("No entities");
                } else {
                    let rows: Vec<EntityRow> = result.entities.iter().map(EntityRow::from).collect();
                    println!("{}", Table::new(rows));
                }
                println!("{} {}", "Count:".bold(), result.count);
            }
            OutputFormat::Json => print_json(&result.entities),
        }
        self.warnings(&result.warnings);
    }

    /// Print one entity in full
    pub fn print_entity(&self, entity: &CompactedEntity) {
        match self.format {
            OutputFormat::Table => {
                println!("{}: {}", "id".bold(), entity.id());
                println!("{}: {}", "type".bold(), entity.types().join(", "));
                for (name, value) in entity.attributes() {
                    println!("{}: {}", name.bold(), summarize(value));
                }
            }
            OutputFormat::Json => print_json(entity),
        }
    }

    /// Print registrations with their health
    pub fn print_sources(&self, sources: &[ContextSourceRegistration]) {
        match self.format {
            OutputFormat::Table => {
                if sources.is_empty() {
                    println!("No matching context sources");
                } else {
                    let rows: Vec<SourceRow> = sources.iter().map(SourceRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
            OutputFormat::Json => print_json(sources),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(data: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string())
    );
}

/// Short rendering of an attribute value for tables
fn summarize(value: &Value) -> String {
    match value {
        Value::Object(attr) => match attr.get("value").or_else(|| attr.get("object")) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        Value::Array(instances) => format!("[{} instances]", instances.len()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Entity display for query command
#[derive(Debug, Tabled, Serialize)]
pub struct EntityRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Type")]
    pub entity_type: String,
    #[tabled(rename = "Attributes")]
    pub attributes: String,
}

impl From<&CompactedEntity> for EntityRow {
    fn from(entity: &CompactedEntity) -> Self {
        Self {
            id: entity.id().to_string(),
            entity_type: entity.types().join(", "),
            attributes: entity
                .attributes()
                .map(|(name, value)| format!("{}={}", name, summarize(value)))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Registration display for sources command
#[derive(Debug, Tabled, Serialize)]
pub struct SourceRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Endpoint")]
    pub endpoint: String,
    #[tabled(rename = "Mode")]
    pub mode: String,
    #[tabled(rename = "Healthy")]
    pub healthy: String,
    #[tabled(rename = "Last Success")]
    pub last_success: String,
    #[tabled(rename = "Last Failure")]
    pub last_failure: String,
}

impl From<&ContextSourceRegistration> for SourceRow {
    fn from(csr: &ContextSourceRegistration) -> Self {
        let status = &csr.status;
        Self {
            id: csr.id.clone(),
            endpoint: csr.endpoint.clone(),
            mode: format!("{:?}", csr.mode).to_lowercase(),
            healthy: if status.is_healthy() {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            },
            last_success: status
                .last_success_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            last_failure: status
                .last_failure_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}
