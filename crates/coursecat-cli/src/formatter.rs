//! Output formatters for command results.

use chrono::DateTime;
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use coursecat_core::{
    ApprovalWorkflow, CatalogApproval, CatalogRecord, ChangeSet, DraftOutcome, MetricsSnapshot,
    Submission, VersionComparison, VersionRecord,
};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    fn format_catalogs(&self, catalogs: &[CatalogRecord]) -> String;

    fn format_versions(&self, versions: &[VersionRecord]) -> String;

    /// Format one version including its content.
    fn format_version(&self, version: &VersionRecord) -> String;

    fn format_draft(&self, outcome: &DraftOutcome) -> String;

    fn format_changes(&self, changes: &ChangeSet) -> String;

    fn format_submission(&self, submission: &Submission) -> String;

    fn format_workflows(&self, workflows: &[ApprovalWorkflow]) -> String;

    /// Format one workflow including its steps.
    fn format_workflow(&self, workflow: &ApprovalWorkflow) -> String;

    fn format_approvals(&self, approvals: &[CatalogApproval]) -> String;

    fn format_comparison(&self, comparison: &VersionComparison) -> String;

    fn format_metrics(&self, metrics: &MetricsSnapshot) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_catalogs(&self, catalogs: &[CatalogRecord]) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "id", "name", "type", "status", "current", "versions", "effective", "expires",
            "based_on",
        ]);
        for catalog in catalogs {
            table.add_row(vec![
                Cell::new(catalog.id),
                Cell::new(&catalog.name),
                Cell::new(&catalog.catalog_type),
                Cell::new(catalog.status),
                Cell::new(format_option(catalog.current_version)),
                Cell::new(catalog.version_count),
                Cell::new(format_timestamp(catalog.effective_at)),
                Cell::new(
                    catalog
                        .expires_at
                        .map(format_timestamp)
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(format_option(catalog.based_on)),
            ]);
        }
        format!("{}\n{} catalog(s)", table, catalogs.len())
    }

    fn format_versions(&self, versions: &[VersionRecord]) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "id", "number", "label", "status", "current", "published", "previous", "author",
            "created",
        ]);
        for version in versions {
            table.add_row(version_row(version));
        }
        format!("{}\n{} version(s)", table, versions.len())
    }

    fn format_version(&self, version: &VersionRecord) -> String {
        let content = match version.content() {
            Ok(content) => serde_json::to_string_pretty(&content.to_json())
                .unwrap_or_else(|_| "<unprintable>".to_string()),
            Err(e) => format!("<undecodable: {}>", e),
        };
        format!("{}\n\n{}", self.format_versions(std::slice::from_ref(version)), content)
    }

    fn format_draft(&self, outcome: &DraftOutcome) -> String {
        let summary = &outcome.summary;
        let state = if outcome.promoted {
            "promoted"
        } else if summary.requires_approval() {
            "needs approval"
        } else {
            "draft"
        };
        format!(
            "Created version {} (#{}) of catalog {}: {}\n\
             {} change(s): {} added, {} modified, {} removed; {} high, {} medium, {} low impact",
            outcome.version.id,
            outcome.version.number,
            outcome.version.catalog_id,
            state,
            summary.total,
            summary.added,
            summary.modified,
            summary.removed,
            summary.high_impact,
            summary.medium_impact,
            summary.low_impact,
        )
    }

    fn format_changes(&self, changes: &ChangeSet) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "#", "entity", "id", "path", "change", "old", "new", "impact", "approval",
        ]);
        for change in &changes.changes {
            table.add_row(vec![
                Cell::new(change.sequence),
                Cell::new(&change.entity_type),
                Cell::new(&change.entity_id),
                Cell::new(&change.path),
                Cell::new(change.change_type),
                Cell::new(truncate(change.old_value.as_deref().unwrap_or("-"))),
                Cell::new(truncate(change.new_value.as_deref().unwrap_or("-"))),
                Cell::new(change.impact),
                Cell::new(if change.requires_approval { "yes" } else { "no" }),
            ]);
        }
        format!(
            "{}\n{} change(s) since {}",
            table,
            changes.changes.len(),
            format_option(changes.previous_version),
        )
    }

    fn format_submission(&self, submission: &Submission) -> String {
        match submission {
            Submission::Promoted(version) => format!(
                "No change required review; version {} is now current",
                version.id
            ),
            Submission::InReview(workflow) => format!(
                "Opened workflow {}\n\n{}",
                workflow.id,
                self.format_workflow(workflow)
            ),
        }
    }

    fn format_workflows(&self, workflows: &[ApprovalWorkflow]) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "id", "name", "version", "status", "stage", "priority", "initiator", "created",
        ]);
        for workflow in workflows {
            table.add_row(vec![
                Cell::new(workflow.id),
                Cell::new(&workflow.name),
                Cell::new(format_option(workflow.version_id)),
                Cell::new(workflow.status),
                Cell::new(format_option(workflow.current_stage)),
                Cell::new(workflow.priority),
                Cell::new(&workflow.initiator),
                Cell::new(format_timestamp(workflow.created_at)),
            ]);
        }
        format!("{}\n{} workflow(s)", table, workflows.len())
    }

    fn format_workflow(&self, workflow: &ApprovalWorkflow) -> String {
        let mut steps = Table::new();
        steps.set_header(vec![
            "step", "stage", "assignee", "status", "decided_by", "decided", "comments",
        ]);
        for step in &workflow.steps {
            steps.add_row(vec![
                Cell::new(step.step_order),
                Cell::new(step.stage),
                Cell::new(&step.assignee),
                Cell::new(step.status),
                Cell::new(format_option(step.decided_by.as_ref())),
                Cell::new(
                    step.decided_at
                        .map(format_timestamp)
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(step.comments.as_deref().unwrap_or("")),
            ]);
        }
        format!(
            "{}\n\n{}",
            self.format_workflows(std::slice::from_ref(workflow)),
            steps
        )
    }

    fn format_approvals(&self, approvals: &[CatalogApproval]) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "id", "workflow", "version", "stage", "outcome", "decided_by", "decided", "comments",
        ]);
        for approval in approvals {
            table.add_row(vec![
                Cell::new(approval.id),
                Cell::new(approval.workflow_id),
                Cell::new(format_option(approval.version_id)),
                Cell::new(approval.stage),
                Cell::new(approval.outcome),
                Cell::new(&approval.decided_by),
                Cell::new(format_timestamp(approval.decided_at)),
                Cell::new(approval.comments.as_deref().unwrap_or("")),
            ]);
        }
        format!("{}\n{} record(s)", table, approvals.len())
    }

    fn format_comparison(&self, comparison: &VersionComparison) -> String {
        let mut output = format!(
            "Comparison {} ({}): version {} -> {}{}\n\
             similarity {:.1}% ({}/{} fields equal); {} added, {} modified, {} removed",
            comparison.id,
            comparison.comparison_type,
            comparison.source,
            comparison.target,
            if comparison.is_cross_catalog {
                " (cross-catalog)"
            } else {
                ""
            },
            comparison.similarity * 100.0,
            comparison.fields_equal,
            comparison.fields_total,
            comparison.added,
            comparison.modified,
            comparison.removed,
        );

        if !comparison.details.is_empty() {
            let mut table = Table::new();
            table.set_header(vec![
                "entity", "id", "path", "change", "old", "new", "significance",
            ]);
            for detail in &comparison.details {
                table.add_row(vec![
                    Cell::new(&detail.entity_type),
                    Cell::new(&detail.entity_id),
                    Cell::new(&detail.path),
                    Cell::new(detail.change_type),
                    Cell::new(truncate(detail.old_value.as_deref().unwrap_or("-"))),
                    Cell::new(truncate(detail.new_value.as_deref().unwrap_or("-"))),
                    Cell::new(detail.significance),
                ]);
            }
            output.push_str(&format!("\n\n{}", table));
        }
        output
    }

    fn format_metrics(&self, metrics: &MetricsSnapshot) -> String {
        let mut table = Table::new();
        table.set_header(vec!["metric", "value"]);
        let rows: [(&str, u64); 13] = [
            ("uptime_secs", metrics.uptime_secs),
            ("catalogs_created", metrics.catalogs_created),
            ("versions_created", metrics.versions_created),
            ("promotions", metrics.promotions),
            ("workflows_opened", metrics.workflows_opened),
            ("workflows_approved", metrics.workflows_approved),
            ("workflows_rejected", metrics.workflows_rejected),
            ("workflows_cancelled", metrics.workflows_cancelled),
            ("step_decisions", metrics.step_decisions),
            ("comparisons_computed", metrics.comparisons_computed),
            ("comparison_cache_hits", metrics.comparison_cache_hits),
            ("comparison_cache_misses", metrics.comparison_cache_misses),
            ("conflicts", metrics.conflicts),
        ];
        for (name, value) in rows {
            table.add_row(vec![Cell::new(name), Cell::new(value)]);
        }
        table.to_string()
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn render(value: serde_json::Value) -> String {
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string())
    }

    fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }
}

impl Formatter for JsonFormatter {
    fn format_catalogs(&self, catalogs: &[CatalogRecord]) -> String {
        Self::render(Self::to_value(&catalogs))
    }

    fn format_versions(&self, versions: &[VersionRecord]) -> String {
        Self::render(serde_json::Value::Array(
            versions.iter().map(|v| version_to_json(v, false)).collect(),
        ))
    }

    fn format_version(&self, version: &VersionRecord) -> String {
        Self::render(version_to_json(version, true))
    }

    fn format_draft(&self, outcome: &DraftOutcome) -> String {
        Self::render(serde_json::json!({
            "version": version_to_json(&outcome.version, false),
            "promoted": outcome.promoted,
            "summary": Self::to_value(&outcome.summary),
            "changes": Self::to_value(&outcome.changes),
        }))
    }

    fn format_changes(&self, changes: &ChangeSet) -> String {
        Self::render(Self::to_value(changes))
    }

    fn format_submission(&self, submission: &Submission) -> String {
        let value = match submission {
            Submission::Promoted(version) => serde_json::json!({
                "outcome": "promoted",
                "version": version_to_json(version, false),
            }),
            Submission::InReview(workflow) => serde_json::json!({
                "outcome": "in_review",
                "workflow": Self::to_value(workflow),
            }),
        };
        Self::render(value)
    }

    fn format_workflows(&self, workflows: &[ApprovalWorkflow]) -> String {
        Self::render(Self::to_value(&workflows))
    }

    fn format_workflow(&self, workflow: &ApprovalWorkflow) -> String {
        Self::render(Self::to_value(workflow))
    }

    fn format_approvals(&self, approvals: &[CatalogApproval]) -> String {
        Self::render(Self::to_value(&approvals))
    }

    fn format_comparison(&self, comparison: &VersionComparison) -> String {
        Self::render(Self::to_value(comparison))
    }

    fn format_metrics(&self, metrics: &MetricsSnapshot) -> String {
        Self::render(Self::to_value(metrics))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }
}

/// Version as JSON with decoded content instead of snapshot bytes.
fn version_to_json(version: &VersionRecord, with_content: bool) -> serde_json::Value {
    let mut value = serde_json::json!({
        "id": version.id,
        "catalog_id": version.catalog_id,
        "number": version.number,
        "label": version.label,
        "is_current": version.is_current,
        "is_published": version.is_published,
        "approval_status": version.approval_status,
        "previous_version": version.previous_version,
        "author": version.author,
        "created_at": version.created_at,
    });
    if with_content {
        if let serde_json::Value::Object(map) = &mut value {
            let content = version
                .content()
                .map(|c| c.to_json())
                .unwrap_or(serde_json::Value::Null);
            map.insert("content".to_string(), content);
        }
    }
    value
}

fn version_row(version: &VersionRecord) -> Vec<Cell> {
    vec![
        Cell::new(version.id),
        Cell::new(version.number),
        Cell::new(&version.label),
        Cell::new(version.approval_status),
        Cell::new(if version.is_current { "*" } else { "" }),
        Cell::new(if version.is_published { "yes" } else { "no" }),
        Cell::new(format_option(version.previous_version)),
        Cell::new(&version.author),
        Cell::new(format_timestamp(version.created_at)),
    ]
}

fn format_option<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Format a microsecond timestamp as ISO 8601.
pub fn format_timestamp(micros: u64) -> String {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| micros.to_string())
}

fn truncate(value: &str) -> String {
    const MAX: usize = 40;
    if value.chars().count() <= MAX {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(MAX - 3).collect();
        out.push_str("...");
        out
    }
}
