mod commands;

use clap::{Parser, Subcommand};
use graft_core::types::DeletePolicy;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "graft",
    version,
    about = "Keep imported git-hosted artifacts in sync with their upstreams",
    long_about = "Graft tracks files imported from upstream git repositories into local\n\
        artifact trees and keeps them current: it classifies upstream changes\n\
        against the state recorded at the last import, detects conflicts with\n\
        local edits, and applies updates transactionally.\n\n\
        Quick start:\n  \
        graft list\n  \
        graft check --all\n  \
        graft apply --id my-tools\n  \
        graft apply --id my-tools --no-dry-run"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: ~/.graft/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Path to the registry file (default: <data_dir>/registry.json)
    #[arg(long, global = true)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check integrations for pending upstream updates
    ///
    /// Refreshes the source mirror, compares the recorded import point
    /// against the remote head, and reports the commit range and changed
    /// files. Never touches installed artifacts.
    ///
    /// Examples:
    ///   graft check --id my-tools
    ///   graft check --all
    Check {
        /// Integration to check
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<String>,

        /// Check every registered integration
        #[arg(long)]
        all: bool,
    },
    /// Apply pending upstream updates
    ///
    /// Classifies each upstream change as apply, conflict, or skip based
    /// on per-file state, then applies the clean changes in a single
    /// all-or-nothing transaction. Conflicting files are left untouched
    /// and reported; in a real run the upstream diff is saved next to
    /// each conflicting file for manual merging.
    ///
    /// Dry-run is the default; pass --no-dry-run to write changes.
    ///
    /// Examples:
    ///   graft apply --id my-tools
    ///   graft apply --id my-tools --no-dry-run
    ///   graft apply --all --no-dry-run --delete-policy soft
    Apply {
        /// Integration to update
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<String>,

        /// Update every registered integration
        #[arg(long)]
        all: bool,

        /// Write changes instead of only reporting the plan
        #[arg(long)]
        no_dry_run: bool,

        /// Overwrite locally modified files after saving a timestamped backup
        #[arg(long)]
        overwrite_with_backup: bool,

        /// Policy for files deleted upstream: soft, hard, ask, or skip
        /// (default from config)
        #[arg(long, value_parser = parse_delete_policy)]
        delete_policy: Option<DeletePolicy>,

        /// Track and install artifacts added upstream
        #[arg(long)]
        auto_import_new: bool,

        /// Proceed even when another integration owns a destination
        #[arg(long)]
        force_conflicting: bool,
    },
    /// List registered integrations
    List,
    /// Remove an integration from the registry
    ///
    /// Example: graft unregister --id my-tools --remove-files
    Unregister {
        /// Integration to remove
        #[arg(long)]
        id: String,

        /// Also delete the installed artifact files
        #[arg(long)]
        remove_files: bool,
    },
}

fn parse_delete_policy(s: &str) -> Result<DeletePolicy, String> {
    DeletePolicy::parse_policy(s)
        .ok_or_else(|| format!("invalid delete policy `{s}` (expected soft, hard, ask, or skip)"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Reports go to stdout; diagnostics stay on stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(4)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_file = cli.config.as_deref().map(std::path::Path::new);
    let registry_override = cli.registry.as_deref().map(std::path::Path::new);

    match cli.command {
        Commands::Check { id, all } => {
            commands::check::run(id.as_deref(), all, config_file, registry_override)
        }
        Commands::Apply {
            id,
            all,
            no_dry_run,
            overwrite_with_backup,
            delete_policy,
            auto_import_new,
            force_conflicting,
        } => commands::apply::run(
            id.as_deref(),
            all,
            commands::apply::Flags {
                dry_run: !no_dry_run,
                overwrite_with_backup,
                delete_policy,
                auto_import_new,
                force_conflicting,
            },
            config_file,
            registry_override,
        ),
        Commands::List => commands::list::run(config_file, registry_override),
        Commands::Unregister { id, remove_files } => {
            commands::unregister::run(&id, remove_files, config_file, registry_override)
        }
    }
}
