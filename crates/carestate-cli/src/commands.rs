use std::collections::BTreeMap;

use anyhow::Context;
use carestate_backend::BackendTarget;
use carestate_server::{CarestateServer, ServerConfig};
use carestate_store::PersistenceMode;
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    match cli.command {
        Command::Serve(args) => runtime.block_on(cmd_serve(args)),
        Command::Inspect(args) => runtime.block_on(cmd_inspect(args, cli.format)),
    }
}

/// Config file (or defaults), then environment, then command-line flags.
fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    apply_flags(&mut config, args);
    config.store.validate()?;
    tracing::debug!(
        bind = %config.bind_addr,
        mode = %config.store.mode,
        target = ?config.store.target,
        "server config resolved"
    );
    Ok(config)
}

fn apply_flags(config: &mut ServerConfig, args: &ServeArgs) {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(target) = &args.target {
        config.store.mode = PersistenceMode::Durable;
        config.store.target = Some(target.clone());
    }
    if let Some(ms) = args.quiet_period_ms {
        config.store.quiet_period_ms = ms;
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(&args)?;
    let server = CarestateServer::open(config).await?;
    match server.store().backend_description() {
        Some(backend) => println!("{} Hydrated from {}", "✓".green().bold(), backend.cyan()),
        None => println!("{} Pure-memory mode; state is lost on exit", "!".yellow().bold()),
    }
    println!("Listening on {}", server.config().bind_addr.to_string().bold());

    let report = server.serve().await?;
    if report.is_clean() {
        println!("{} Drained {} bucket(s).", "✓".green().bold(), report.flushed.len());
        Ok(())
    } else {
        anyhow::bail!("failed to flush: {}", report.failed.join(", "))
    }
}

async fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = BackendTarget::parse(&args.target)?;
    let backend = target.open()?;

    let names = match &args.bucket {
        Some(name) => vec![name.clone()],
        None => backend.list_buckets().await?,
    };
    let snapshots = backend.load_all(&names).await?;
    if let Some(name) = &args.bucket {
        if !snapshots.contains_key(name) {
            anyhow::bail!("no snapshot for bucket {name:?} at {}", backend.describe());
        }
    }
    let snapshots: BTreeMap<_, _> = snapshots.into_iter().collect();

    match format {
        OutputFormat::Json => {
            let body = json!(snapshots);
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            if snapshots.is_empty() {
                println!("No snapshots at {}.", backend.describe());
            }
            for (name, snapshot) in &snapshots {
                println!(
                    "{} {}",
                    name.yellow().bold(),
                    format!("(updated {})", snapshot.updated_at).dimmed()
                );
                println!("{}", serde_json::to_string_pretty(&snapshot.data)?);
            }
        }
    }
    Ok(())
}
