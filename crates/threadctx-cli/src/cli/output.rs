//! Output formatting for the threadctx CLI
//!
//! Every command result renders as JSON, YAML, or a colored table.

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use threadctx_core::policy::PolicyEntry;
use threadctx_core::ContextPolicy;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// A command result that can be rendered in every [`OutputFormat`]
pub trait Render: Serialize {
    /// Write the human-readable table
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Render to `out` in the given format
    fn render_to(&self, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(self)?)?,
            OutputFormat::Yaml => write!(out, "{}", serde_yaml::to_string(self)?)?,
            OutputFormat::Table => self.render_table(out)?,
        }
        Ok(())
    }

    /// Render to stdout
    fn render(&self, format: OutputFormat) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.render_to(format, &mut out)
    }
}

fn colored_policy(policy: ContextPolicy) -> colored::ColoredString {
    match policy {
        ContextPolicy::Propagated => policy.as_str().green(),
        ContextPolicy::Cleared => policy.as_str().yellow(),
        ContextPolicy::Unchanged => policy.as_str().blue(),
    }
}

fn write_policies(out: &mut dyn Write, policies: &[PolicyEntry]) -> io::Result<()> {
    for entry in policies {
        writeln!(
            out,
            "  {:<20} {}",
            entry.context_type.as_str(),
            colored_policy(entry.policy)
        )?;
    }
    Ok(())
}

/// Resolved policy of one definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionOutput {
    pub name: String,
    pub policies: Vec<PolicyEntry>,
}

/// Output of `threadctx resolve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutput {
    pub definitions: Vec<DefinitionOutput>,
}

impl Render for ResolveOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", "Resolved Context Policies".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        for definition in &self.definitions {
            writeln!(out)?;
            writeln!(out, "{}", definition.name.bold())?;
            write_policies(out, &definition.policies)?;
        }
        Ok(())
    }
}

/// One registered context type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeOutput {
    pub position: usize,
    pub context_type: String,
    pub builtin: bool,
    pub has_default: bool,
    pub default_policy: ContextPolicy,
}

/// Output of `threadctx types`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesOutput {
    pub types: Vec<TypeOutput>,
}

impl Render for TypesOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", "Registered Context Types".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(
            out,
            "  {:<4} {:<20} {:<10} {}",
            "#", "TYPE", "SOURCE", "DEFAULT POLICY"
        )?;
        for ty in &self.types {
            let source = if ty.builtin { "builtin" } else { "discovered" };
            writeln!(
                out,
                "  {:<4} {:<20} {:<10} {}",
                ty.position,
                ty.context_type,
                source,
                colored_policy(ty.default_policy)
            )?;
        }
        Ok(())
    }
}

/// What a piece of work saw of every context type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub int_context: i32,
    pub string_context: String,
    pub principal: Option<String>,
    pub naming_component: Option<String>,
    pub class_loader: String,
    pub transaction: Option<String>,
}

impl Observation {
    fn write(&self, out: &mut dyn Write, label: &str) -> io::Result<()> {
        let none = || "-".dimmed().to_string();
        writeln!(out, "{}", label.bold())?;
        writeln!(out, "  {:<20} {}", "IntContext", self.int_context)?;
        writeln!(out, "  {:<20} {:?}", "StringContext", self.string_context)?;
        writeln!(
            out,
            "  {:<20} {}",
            "Security",
            self.principal.clone().unwrap_or_else(none)
        )?;
        writeln!(
            out,
            "  {:<20} {}",
            "Naming",
            self.naming_component.clone().unwrap_or_else(none)
        )?;
        writeln!(out, "  {:<20} {}", "ClassResolution", self.class_loader)?;
        writeln!(
            out,
            "  {:<20} {}",
            "Transaction",
            self.transaction.clone().unwrap_or_else(none)
        )
    }
}

/// Output of `threadctx demo`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoOutput {
    pub definition: String,
    pub policies: Vec<PolicyEntry>,
    /// Submitting thread, at capture time
    pub submitter: Observation,
    /// Worker thread, before the task ran
    pub worker: Observation,
    /// Inside the task, on the worker
    pub running: Observation,
    /// Worker thread, after the task finished
    pub after: Observation,
}

impl DemoOutput {
    /// Whether the worker got its own state back
    pub fn restored(&self) -> bool {
        self.worker == self.after
    }
}

impl Render for DemoOutput {
    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{}",
            format!("Propagation Demo: {}", self.definition).cyan().bold()
        )?;
        writeln!(out, "{}", "=".repeat(60))?;
        write_policies(out, &self.policies)?;
        writeln!(out)?;
        self.submitter.write(out, "Submitting thread")?;
        self.worker.write(out, "Worker before task")?;
        self.running.write(out, "Inside task")?;
        self.after.write(out, "Worker after task")?;
        writeln!(out)?;
        let status = if self.restored() {
            "+ worker state restored".green()
        } else {
            "x worker state not restored".red()
        };
        writeln!(out, "{}", status)
    }
}
