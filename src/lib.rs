// src/lib.rs

pub mod app;
pub mod cli;
pub mod config;
pub mod duration;
pub mod errors;
pub mod exec;
pub mod handler;
pub mod logging;
pub mod placeholder;
pub mod registry;
pub mod server;
pub mod spec;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - registry / runner / handlers (provision + validate)
/// - startup commands
/// - the HTTP listener
/// - Ctrl-C / SIGTERM handling, handler cleanup and registry shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if let Some(ref bind) = args.bind {
        cfg.server.bind = bind
            .parse()
            .with_context(|| format!("--bind '{bind}' is not a socket address"))?;
    }

    let app = Arc::new(App::from_config(&cfg)?);

    if args.dry_run {
        print_dry_run(&cfg, &app);
        return Ok(());
    }

    let failed = app.startup().await;
    if failed > 0 {
        warn!(failed, "some startup commands failed");
    }

    let listener = TcpListener::bind(cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;
    info!(bind = %cfg.server.bind, commands = cfg.command.len(), "http-exec listening");

    app.serve(listener, server::shutdown_signal()).await?;
    Ok(())
}

/// Simple dry-run output: print commands and how they are reached.
fn print_dry_run(cfg: &ConfigFile, app: &App) {
    println!("http-exec dry-run");
    println!("  server.bind = {}", cfg.server.bind);
    println!(
        "  server.default_timeout = {}",
        describe_timeout(cfg.server.default_timeout_ms)
    );
    println!("  server.grace_period = {:?}", cfg.server.grace_period);
    println!();

    println!("commands ({}):", app.handlers().len());
    for handler in app.handlers() {
        let Some(spec) = handler.spec() else {
            continue;
        };
        println!("  - {}", spec.name);
        println!("      executable: {}", spec.executable);
        if !spec.args.is_empty() {
            println!("      args: {:?}", spec.args);
        }
        if let Some(ref dir) = spec.dir {
            println!("      dir: {}", dir.display());
        }
        if !spec.env.is_empty() {
            println!("      env: {:?}", spec.env.keys().collect::<Vec<_>>());
        }
        println!("      timeout: {}", describe_timeout(spec.timeout_ms));
        if let Some(ref path) = spec.path {
            println!("      path: {path}");
        }
        if !spec.route_scoped {
            println!("      route_scoped: false");
        }
        if !spec.at.is_empty() {
            println!("      at: {:?}", spec.at);
        }
        if !spec.foreground {
            println!("      foreground: false");
        }
        if spec.pass_thru {
            println!("      pass_thru: true");
        }
    }

    debug!("dry-run complete (nothing served)");
}

fn describe_timeout(ms: i64) -> String {
    if ms == 0 {
        "none".to_string()
    } else {
        format!("{ms}ms")
    }
}
