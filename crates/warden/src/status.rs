// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `warden status` command implementation.
//!
//! Queries the readiness endpoint of a running `warden serve` and reports
//! which domains are not yet stable. Falls back gracefully when the server
//! is not running.

use std::io::IsTerminal;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_config::model::WardenConfig;
use warden_core::WardenError;

/// Body of `GET /health/readiness`.
#[derive(Debug, Deserialize)]
struct ReadinessBody {
    ready: bool,
    domains: usize,
    unstable: Vec<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub ready: bool,
    pub domains: Option<usize>,
    pub unstable: Vec<String>,
    pub endpoint: String,
}

/// Address clients should use for a listener bound to `host`.
fn client_host(host: &str) -> &str {
    match host {
        "0.0.0.0" => "127.0.0.1",
        "::" => "::1",
        other => other,
    }
}

/// Readiness URL of the configured gateway.
pub fn readiness_url(config: &WardenConfig) -> String {
    let host = client_host(&config.gateway.host);
    if host.contains(':') {
        format!("http://[{host}]:{}/health/readiness", config.gateway.port)
    } else {
        format!("http://{host}:{}/health/readiness", config.gateway.port)
    }
}

/// Query the readiness endpoint. Connection failures mean "not running".
pub async fn fetch_status(config: &WardenConfig) -> Result<StatusResponse, WardenError> {
    let endpoint = readiness_url(config);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| WardenError::Internal(format!("failed to create HTTP client: {e}")))?;

    let Ok(resp) = client.get(&endpoint).send().await else {
        return Ok(StatusResponse {
            running: false,
            ready: false,
            domains: None,
            unstable: Vec::new(),
            endpoint,
        });
    };

    // 503 carries the same body as 200.
    let body: ReadinessBody = resp.json().await.map_err(|e| {
        WardenError::Internal(format!("failed to parse readiness response: {e}"))
    })?;

    Ok(StatusResponse {
        running: true,
        ready: body.ready,
        domains: Some(body.domains),
        unstable: body.unstable,
        endpoint,
    })
}

/// Run the `warden status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &WardenConfig, json: bool, plain: bool) -> Result<(), WardenError> {
    let status = fetch_status(config).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    print_status(&status, use_color);
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  warden status");
    println!("  {}", "-".repeat(35));

    if !status.running {
        if use_color {
            println!("    State:    {} {}", "✗".red(), "not running".red());
        } else {
            println!("    State:    [FAIL] not running");
        }
        println!("    Endpoint: {}", status.endpoint);
        println!();
        println!("  Start with: warden serve");
        println!();
        return;
    }

    let domains = status.domains.unwrap_or_default();
    match (status.ready, use_color) {
        (true, true) => println!("    State:    {} {}", "✓".green(), "ready".green()),
        (true, false) => println!("    State:    [OK] ready"),
        (false, true) => println!("    State:    {} {}", "!".yellow(), "not ready".yellow()),
        (false, false) => println!("    State:    [WAIT] not ready"),
    }
    println!("    Domains:  {domains}");
    for domain in &status.unstable {
        println!("    Unstable: {domain}");
    }
    println!();
}
