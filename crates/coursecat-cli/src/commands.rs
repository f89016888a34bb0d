//! Subcommand definitions and dispatch.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Subcommand;
use coursecat::{CatalogService, Error};
use coursecat_core::{
    CatalogId, ComparisonType, NewCatalog, NewVersion, Priority, StepDecision, SubmitRequest,
    VersionId, WorkflowId,
};

use crate::formatter::Formatter;

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage catalogs
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Manage versions
    #[command(subcommand)]
    Version(VersionCommand),

    /// Submit a draft version for approval
    Submit {
        /// Version to submit
        version: u64,
        /// Workflow name (defaults to the version label)
        #[arg(long)]
        name: Option<String>,
        /// Workflow priority: low, normal, high or urgent
        #[arg(long)]
        priority: Option<Priority>,
    },

    /// Decide the active step of a workflow
    Review {
        /// Workflow to advance
        workflow: u64,
        /// Order of the step being decided
        #[arg(long)]
        step: u32,
        /// approve or reject
        #[arg(long)]
        decision: StepDecision,
        /// Reviewer comments
        #[arg(long)]
        comments: Option<String>,
    },

    /// Inspect and cancel workflows
    #[command(subcommand)]
    Workflow(WorkflowCommand),

    /// Compare two versions
    Compare {
        /// Source version
        source: u64,
        /// Target version
        target: u64,
        /// full, summary or critical_only
        #[arg(long = "type", default_value = "full")]
        comparison_type: ComparisonType,
        /// Recompute even if a stored comparison exists
        #[arg(long)]
        force: bool,
    },

    /// Show engine counters for this invocation
    Metrics,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Create a catalog
    Create {
        name: String,
        /// Catalog type, e.g. undergraduate or graduate
        #[arg(long = "type")]
        catalog_type: String,
        /// First day in effect (YYYY-MM-DD)
        #[arg(long)]
        effective: Option<String>,
        /// First day no longer in effect (YYYY-MM-DD)
        #[arg(long)]
        expires: Option<String>,
        /// Catalog this one derives from
        #[arg(long)]
        based_on: Option<u64>,
    },
    /// List catalogs
    List,
    /// Show a catalog
    Show { catalog: u64 },
    /// Mark a catalog active
    Activate { catalog: u64 },
    /// Archive a catalog
    Archive { catalog: u64 },
    /// Change or clear the catalog a catalog derives from
    Rebase {
        catalog: u64,
        /// New base; omit to clear
        #[arg(long)]
        based_on: Option<u64>,
    },
    /// Create a catalog seeded with another catalog's current content
    Clone {
        source: u64,
        /// Name of the new catalog
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum VersionCommand {
    /// Create a draft version from a JSON content file
    Create {
        catalog: u64,
        /// Path to the JSON content
        file: PathBuf,
        /// Version label
        #[arg(long)]
        label: String,
    },
    /// List a catalog's versions
    List { catalog: u64 },
    /// Show a version and its content
    Show { version: u64 },
    /// Show a catalog's current version
    Current { catalog: u64 },
    /// Walk a version's predecessors
    History { version: u64 },
    /// Show the changes a version introduced
    Changes { version: u64 },
    /// Approve and promote a version without review
    Promote { version: u64 },
    /// Publish an approved version
    Publish { version: u64 },
}

#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Show a workflow
    Show { workflow: u64 },
    /// Show the latest workflow of a version
    ForVersion { version: u64 },
    /// List a catalog's workflows
    List { catalog: u64 },
    /// Cancel an open workflow
    Cancel {
        workflow: u64,
        /// Confirm the actor may cancel this workflow
        #[arg(long)]
        authorized: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show a catalog's approval audit records
    History { catalog: u64 },
}

/// Execute a command and return its formatted output.
pub fn execute(
    service: &CatalogService,
    command: Command,
    formatter: &dyn Formatter,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match command {
        Command::Catalog(command) => execute_catalog(service, command, formatter)?,
        Command::Version(command) => execute_version(service, command, formatter)?,
        Command::Submit {
            version,
            name,
            priority,
        } => {
            let mut request = SubmitRequest::new();
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if let Some(priority) = priority {
                request = request.with_priority(priority);
            }
            let submission = service.submit_for_approval(VersionId(version), request)?;
            formatter.format_submission(&submission)
        }
        Command::Review {
            workflow,
            step,
            decision,
            comments,
        } => {
            let workflow =
                service.advance_approval_step(WorkflowId(workflow), step, decision, comments)?;
            formatter.format_workflow(&workflow)
        }
        Command::Workflow(command) => execute_workflow(service, command, formatter)?,
        Command::Compare {
            source,
            target,
            comparison_type,
            force,
        } => {
            let comparison = service.compare(
                VersionId(source),
                VersionId(target),
                comparison_type,
                force,
            )?;
            formatter.format_comparison(&comparison)
        }
        Command::Metrics => formatter.format_metrics(&service.metrics()),
    };
    Ok(output)
}

fn execute_catalog(
    service: &CatalogService,
    command: CatalogCommand,
    formatter: &dyn Formatter,
) -> Result<String, Error> {
    let catalog = match command {
        CatalogCommand::Create {
            name,
            catalog_type,
            effective,
            expires,
            based_on,
        } => {
            let mut new = NewCatalog::new(name, catalog_type);
            if effective.is_some() || expires.is_some() {
                let effective_at = match effective {
                    Some(date) => parse_date(&date)?,
                    None => 0,
                };
                let expires_at = expires.as_deref().map(parse_date).transpose()?;
                new = new.with_window(effective_at, expires_at);
            }
            if let Some(based_on) = based_on {
                new = new.with_based_on(CatalogId(based_on));
            }
            service.create_catalog(new)?
        }
        CatalogCommand::List => return Ok(formatter.format_catalogs(&service.list_catalogs()?)),
        CatalogCommand::Show { catalog } => service.get_catalog(CatalogId(catalog))?,
        CatalogCommand::Activate { catalog } => service.activate_catalog(CatalogId(catalog))?,
        CatalogCommand::Archive { catalog } => service.archive_catalog(CatalogId(catalog))?,
        CatalogCommand::Rebase { catalog, based_on } => {
            service.rebase_catalog(CatalogId(catalog), based_on.map(CatalogId))?
        }
        CatalogCommand::Clone { source, name } => {
            service.clone_catalog(CatalogId(source), &name)?
        }
    };
    Ok(formatter.format_catalogs(std::slice::from_ref(&catalog)))
}

fn execute_version(
    service: &CatalogService,
    command: VersionCommand,
    formatter: &dyn Formatter,
) -> Result<String, Error> {
    let output = match command {
        VersionCommand::Create {
            catalog,
            file,
            label,
        } => {
            let bytes = std::fs::read(&file)?;
            let json: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                coursecat_core::Error::InvalidInput(format!(
                    "cannot parse {}: {}",
                    file.display(),
                    e
                ))
            })?;
            let new = NewVersion::from_json(label, &json)?;
            let outcome = service.create_draft_version(CatalogId(catalog), new)?;
            formatter.format_draft(&outcome)
        }
        VersionCommand::List { catalog } => {
            formatter.format_versions(&service.list_versions(CatalogId(catalog))?)
        }
        VersionCommand::Show { version } => {
            formatter.format_version(&service.get_version(VersionId(version))?)
        }
        VersionCommand::Current { catalog } => {
            match service.get_current_version(CatalogId(catalog))? {
                Some(version) => formatter.format_version(&version),
                None => formatter.format_message(&format!(
                    "Catalog {} has no current version",
                    catalog
                )),
            }
        }
        VersionCommand::History { version } => {
            formatter.format_versions(&service.version_history(VersionId(version))?)
        }
        VersionCommand::Changes { version } => {
            formatter.format_changes(&service.get_changes(VersionId(version))?)
        }
        VersionCommand::Promote { version } => {
            let version = service.promote_version(VersionId(version))?;
            formatter.format_versions(std::slice::from_ref(&version))
        }
        VersionCommand::Publish { version } => {
            let version = service.publish_version(VersionId(version))?;
            formatter.format_versions(std::slice::from_ref(&version))
        }
    };
    Ok(output)
}

fn execute_workflow(
    service: &CatalogService,
    command: WorkflowCommand,
    formatter: &dyn Formatter,
) -> Result<String, Error> {
    let output = match command {
        WorkflowCommand::Show { workflow } => {
            formatter.format_workflow(&service.get_workflow(WorkflowId(workflow))?)
        }
        WorkflowCommand::ForVersion { version } => {
            match service.workflow_for_version(VersionId(version))? {
                Some(workflow) => formatter.format_workflow(&workflow),
                None => {
                    formatter.format_message(&format!("Version {} has no workflow", version))
                }
            }
        }
        WorkflowCommand::List { catalog } => {
            formatter.format_workflows(&service.list_workflows(CatalogId(catalog))?)
        }
        WorkflowCommand::Cancel {
            workflow,
            authorized,
            reason,
        } => {
            let workflow = service.cancel_workflow(WorkflowId(workflow), authorized, reason)?;
            formatter.format_workflow(&workflow)
        }
        WorkflowCommand::History { catalog } => {
            formatter.format_approvals(&service.approval_history(CatalogId(catalog))?)
        }
    };
    Ok(output)
}

/// Parse a `YYYY-MM-DD` date as microseconds since the epoch at midnight UTC.
pub fn parse_date(input: &str) -> Result<u64, coursecat_core::Error> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|e| {
        coursecat_core::Error::InvalidInput(format!("invalid date '{}': {}", input, e))
    })?;
    let micros = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_micros())
        .unwrap_or_default();
    u64::try_from(micros).map_err(|_| {
        coursecat_core::Error::InvalidInput(format!("date '{}' is before 1970", input))
    })
}
