use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "carestate",
    about = "Carestate -- in-memory telehealth state with debounced durable write-back",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP host until Ctrl-C, then drain pending writes
    Serve(ServeArgs),
    /// Print snapshots stored at a durable target
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Listen address, overriding the config file
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Durable target (`memory:`, `file:<dir>`, or a directory); implies durable mode
    #[arg(long)]
    pub target: Option<String>,
    /// Quiet period before a changed bucket is flushed
    #[arg(long)]
    pub quiet_period_ms: Option<u64>,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Durable target to read from
    #[arg(long)]
    pub target: String,
    /// Print only this bucket
    pub bucket: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["carestate", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.config.is_none());
            assert!(args.bind.is_none());
            assert!(args.target.is_none());
        } else {
            panic!("wrong command");
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "carestate",
            "serve",
            "--config",
            "carestate.toml",
            "--bind",
            "0.0.0.0:9000",
            "--target",
            "file:/tmp/state",
            "--quiet-period-ms",
            "300",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("carestate.toml")));
            assert_eq!(args.bind.unwrap().port(), 9000);
            assert_eq!(args.target.as_deref(), Some("file:/tmp/state"));
            assert_eq!(args.quiet_period_ms, Some(300));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_bad_bind_fails() {
        assert!(Cli::try_parse_from(["carestate", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn parse_inspect() {
        let cli =
            Cli::try_parse_from(["carestate", "inspect", "--target", "./data", "users", "--format", "json"])
                .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.target, "./data");
            assert_eq!(args.bucket.as_deref(), Some("users"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn inspect_requires_target() {
        assert!(Cli::try_parse_from(["carestate", "inspect"]).is_err());
    }
}
