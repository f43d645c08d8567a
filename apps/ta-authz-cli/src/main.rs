//! # ta-authz
//!
//! Command-line front end for the `ta-authz` engine. Loads JSON policy
//! sources and an optional YAML data fixture, then:
//! - `ta-authz check` — decide one (actor, action, resource) request
//! - `ta-authz query` — enumerate solutions of any rule
//! - `ta-authz rules` — list loaded rule groups
//!
//! Arguments use a small syntax: `@name` is a fixture instance, `?x` a query
//! variable, numbers and `true`/`false` are parsed, anything else is a string.

mod commands;
mod fixture;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Evaluate authorization policies locally.
#[derive(Parser)]
#[command(name = "ta-authz", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether an actor may perform an action on a resource.
    Check {
        #[command(flatten)]
        inputs: commands::Inputs,
        /// The actor (e.g. "alice@example.com" or @alice).
        #[arg(long)]
        actor: String,
        /// The action (e.g. GET).
        #[arg(long)]
        action: String,
        /// The resource (e.g. @expense1).
        #[arg(long)]
        resource: String,
        /// Print the full evaluation trace as JSON.
        #[arg(long)]
        explain: bool,
    },
    /// Print every solution of a rule as JSON, one per line.
    Query {
        #[command(flatten)]
        inputs: commands::Inputs,
        /// Rule name to query.
        #[arg(long)]
        rule: String,
        /// Stop after this many solutions.
        #[arg(long)]
        limit: Option<usize>,
        /// Rule arguments.
        args: Vec<String>,
    },
    /// List loaded rule groups (name/arity) with their rule counts.
    Rules {
        /// JSON policy source files, loaded in order.
        #[arg(long = "policy", required = true)]
        policies: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with results on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ta_authz=warn".parse()?))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Check {
            inputs,
            actor,
            action,
            resource,
            explain,
        } => {
            let allowed = commands::check::execute(inputs, actor, action, resource, *explain)?;
            if !allowed {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Query {
            inputs,
            rule,
            limit,
            args,
        } => commands::query::execute(inputs, rule, args, *limit),
        Commands::Rules { policies } => commands::rules::execute(policies),
    }
}
