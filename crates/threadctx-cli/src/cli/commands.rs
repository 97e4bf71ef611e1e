//! CLI command definitions for threadctx
//!
//! Clap-based commands for resolving context service definitions, listing
//! the registered context types, and running the propagation demonstration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use threadctx_core::providers::class_resolution::{self, ClassResolutionScope};
use threadctx_core::providers::naming::{self, NamingScope};
use threadctx_core::providers::security::{self, Principal};
use threadctx_core::providers::transaction;
use threadctx_core::{
    ContextRegistry, ContextService, ContextServiceDefinition, ContextServices, DefinitionSet,
};
use threadctx_spi::{int_context, string_context, SpiProviders};

use super::output::{
    DefinitionOutput, DemoOutput, Observation, OutputFormat, Render, ResolveOutput, TypeOutput,
    TypesOutput,
};
use super::ExitCode;
use crate::error::CliError;

/// Definition the demo runs when none is named
pub const DEMO_DEFINITION: &str = "app/ContextA";

/// threadctx CLI
///
/// Inspect how context service definitions resolve against the registered
/// context types, and watch context cross a thread boundary.
#[derive(Parser, Debug)]
#[command(name = "threadctx")]
#[command(about = "Thread context propagation - resolve definitions and run the demo", long_about = None)]
#[command(version)]
pub struct ThreadctxCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Context service definition file (TOML, YAML or JSON)
    ///
    /// Without one, the built-in ContextA, ContextB and default
    /// definitions are used.
    #[arg(short, long, global = true, env = "THREADCTX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve definitions into one policy per context type
    Resolve {
        /// Only resolve this definition
        #[arg(short, long)]
        definition: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// List registered context types in registry order
    Types {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Hand a task to a worker thread and show what it observes
    ///
    /// The submitting thread sets IntContext to 42 and StringContext to
    /// "secret"; the worker starts with 0 and "worker-default".
    Demo {
        /// Definition to run the task under
        #[arg(short, long, default_value = DEMO_DEFINITION)]
        definition: String,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Definitions used when no configuration file is given
pub fn builtin_definitions() -> DefinitionSet {
    DefinitionSet {
        definitions: vec![
            ContextServiceDefinition::new("app/ContextA")
                .with_propagated(["Application", "IntContext"])
                .with_cleared(["StringContext"])
                .with_unchanged(["Remaining"]),
            ContextServiceDefinition::new("app/ContextB")
                .with_propagated(["Remaining"])
                .with_cleared(Vec::<String>::new())
                .with_unchanged(["IntContext"]),
            ContextServiceDefinition::default(),
        ],
    }
}

/// Built-in providers followed by the discovered third-party ones
pub fn build_registry() -> anyhow::Result<Arc<ContextRegistry>> {
    let registry = ContextRegistry::builder()
        .with_builtin_providers()?
        .discover(&SpiProviders)
        .context("registering third-party context providers")?
        .build();
    Ok(registry)
}

fn load_definitions(config: Option<&Path>) -> anyhow::Result<DefinitionSet> {
    match config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::file_error(format!(
                    "Definition file not found: {}",
                    path.display()
                ))
                .into());
            }
            DefinitionSet::from_file(path)
                .with_context(|| format!("loading definitions from '{}'", path.display()))
        }
        None => Ok(builtin_definitions()),
    }
}

fn load_services(config: Option<&Path>) -> anyhow::Result<ContextServices> {
    let definitions = load_definitions(config)?;
    let services = ContextServices::from_definitions(build_registry()?, &definitions)
        .context("resolving context service definitions")?;
    tracing::debug!(services = services.len(), "Context services ready");
    Ok(services)
}

fn describe(service: &ContextService) -> DefinitionOutput {
    DefinitionOutput {
        name: service.name().to_string(),
        policies: service.policy().entries().to_vec(),
    }
}

/// Build the resolve command's output
pub fn resolve(config: Option<&Path>, definition: Option<&str>) -> anyhow::Result<ResolveOutput> {
    let services = load_services(config)?;
    let definitions = match definition {
        Some(name) => vec![describe(services.get(name)?)],
        None => services.iter().map(describe).collect(),
    };
    Ok(ResolveOutput { definitions })
}

/// Execute the resolve command
pub fn execute_resolve(
    config: Option<PathBuf>,
    definition: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    resolve(config.as_deref(), definition.as_deref())?.render(format)?;
    Ok(ExitCode::Success)
}

/// Build the types command's output
pub fn types() -> anyhow::Result<TypesOutput> {
    let registry = build_registry()?;
    let defaults = ContextService::with_defaults(Arc::clone(&registry))?;

    let types = registry
        .entries()
        .iter()
        .enumerate()
        .filter_map(|(position, entry)| {
            let default_policy = defaults.policy().policy_at(position)?;
            Some(TypeOutput {
                position,
                context_type: entry.context_type().to_string(),
                builtin: entry.context_type().is_builtin(),
                has_default: entry.provider().has_default(),
                default_policy,
            })
        })
        .collect();

    Ok(TypesOutput { types })
}

/// Execute the types command
pub fn execute_types(format: OutputFormat) -> anyhow::Result<ExitCode> {
    types()?.render(format)?;
    Ok(ExitCode::Success)
}

fn observe() -> Observation {
    Observation {
        int_context: int_context::current(),
        string_context: string_context::current(),
        principal: security::current_principal().map(|p| p.name().to_string()),
        naming_component: naming::current().map(|scope| scope.component().to_string()),
        class_loader: class_resolution::current().loader().to_string(),
        transaction: transaction::current().map(|tx| tx.to_string()),
    }
}

/// Third-party values installed on the calling thread for the demo
///
/// Dropping the guard puts back whatever the thread held before.
struct ThirdPartyValues {
    int: i32,
    string: String,
}

impl ThirdPartyValues {
    fn install(int: i32, string: &str) -> Self {
        let previous = Self {
            int: int_context::current(),
            string: string_context::current(),
        };
        int_context::set(int);
        string_context::set(string);
        previous
    }
}

impl Drop for ThirdPartyValues {
    fn drop(&mut self) {
        int_context::set(self.int);
        string_context::set(std::mem::take(&mut self.string));
    }
}

/// Run the demonstration scenario under one definition
pub fn demo(config: Option<&Path>, definition: &str) -> anyhow::Result<DemoOutput> {
    let services = load_services(config)?;
    let service = services.get(definition)?.clone();

    let _submitter_values = ThirdPartyValues::install(42, "secret");
    let scope = NamingScope::new("demo-app").with_binding("env/greeting", "hello");
    let loader = ClassResolutionScope::new("demo-app").with_class("demo::Greeter");

    let (submitter, task) = naming::run_in_scope(scope, || {
        class_resolution::run_in_scope(loader, || {
            security::run_as(Principal::new("demo-user").with_role("operator"), || {
                let _tx = transaction::begin();
                let submitter = observe();
                service.contextualize(observe).map(|task| (submitter, task))
            })
        })
    })?;

    let worker = std::thread::Builder::new()
        .name("threadctx-worker".into())
        .spawn(move || -> anyhow::Result<(Observation, Observation, Observation)> {
            int_context::set(int_context::CLEARED);
            string_context::set("worker-default");
            let worker = observe();
            let running = task.call()?;
            let after = observe();
            Ok((worker, running, after))
        })
        .context("spawning worker thread")?;

    let (worker, running, after) = worker
        .join()
        .map_err(|_| CliError::DemoFailed("worker thread panicked".into()))??;

    let output = DemoOutput {
        definition: service.name().to_string(),
        policies: service.policy().entries().to_vec(),
        submitter,
        worker,
        running,
        after,
    };

    if !output.restored() {
        return Err(CliError::DemoFailed("worker state was not restored".into()).into());
    }
    Ok(output)
}

/// Execute the demo command
pub fn execute_demo(
    config: Option<PathBuf>,
    definition: String,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    demo(config.as_deref(), &definition)?.render(format)?;
    Ok(ExitCode::Success)
}
