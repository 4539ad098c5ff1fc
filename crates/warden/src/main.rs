// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Warden - domain-scoped plugin runtime for an OAuth2/OIDC gateway.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod catalog;
mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use warden_config::{ConfigError, WardenConfig};
use warden_core::PluginKind;

/// Warden - domain-scoped plugin runtime.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy plugin registries for every domain and serve health endpoints.
    Serve,
    /// Show readiness of a running server.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// List the plugin types compiled into this binary.
    Catalog {
        /// Only show this kind, e.g. IDENTITY_PROVIDER.
        #[arg(long)]
        kind: Option<PluginKind>,
        /// Case-insensitive search over type, kind and description.
        query: Option<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> WardenConfig {
    let loaded: Result<WardenConfig, Vec<ConfigError>> = match path {
        Some(path) => warden_config::load_and_validate_path(path),
        None => warden_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            warden_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Serve) => {
            let config = load_config(cli.config.as_ref());
            serve::run_serve(config).await
        }
        Some(Commands::Status { json, plain }) => {
            let config = load_config(cli.config.as_ref());
            status::run_status(&config, json, plain).await
        }
        Some(Commands::Catalog { kind, query, json }) => {
            catalog::run_catalog(kind, query.as_deref(), json)
        }
        None => {
            println!("warden: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
