use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fritzctl::cmd_collect_all;
use fritzctl::cmd_serve;
use fritzctl::cmd_test;
use fritzctl::common::{GatewayArgs, DEFAULT_LISTEN_ADDRESS};

#[derive(Parser, Debug)]
#[command(name = "fritzctl", version, about = "FRITZ!Box Prometheus exporter")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(flatten)]
    gateway: GatewayArgs,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve /metrics for Prometheus
    Serve {
        #[arg(long, env = "FRITZ_LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
        listen_address: SocketAddr,
    },
    /// Run one collection pass and print the results
    Test,
    /// Call every get-only TR-064 action and dump the results as JSON
    CollectAll {
        #[arg(long)]
        result_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        gateway,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .init();

    match cmd {
        Cmd::Serve { listen_address } => cmd_serve::run(&gateway, listen_address).await?,
        Cmd::Test => cmd_test::run(&gateway).await?,
        Cmd::CollectAll { result_file } => cmd_collect_all::run(&gateway, result_file).await?,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::parse_from(["fritzctl", "serve"]);
        assert_eq!(cli.gateway.gateway_upnp_url, "http://fritz.box:49000");
        assert_eq!(cli.gateway.gateway_lua_url, "http://fritz.box");
        assert!(cli.gateway.metrics_upnp.is_none());
        assert!(cli.gateway.metrics_lua.is_none());
        assert!(cli.gateway.credentials().is_none());
        match cli.cmd {
            Cmd::Serve { listen_address } => {
                assert_eq!(listen_address, "127.0.0.1:9042".parse().unwrap());
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "fritzctl",
            "-vv",
            "test",
            "--username",
            "admin",
            "--password",
            "secret",
            "--metrics-lua",
            "metrics-lua.json",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.cmd, Cmd::Test));
        assert!(cli.gateway.credentials().is_some());
        assert_eq!(cli.gateway.metrics_lua, Some(PathBuf::from("metrics-lua.json")));
    }

    #[test]
    fn parse_lua_only_serve() {
        let cli = Cli::parse_from(["fritzctl", "serve", "--metrics-lua", "lua.json"]);
        assert!(cli.gateway.metrics_upnp.is_none());
        assert_eq!(cli.gateway.metrics_lua, Some(PathBuf::from("lua.json")));
        assert!(matches!(cli.cmd, Cmd::Serve { .. }));
    }

    #[test]
    fn parse_collect_all_result_file() {
        let cli = Cli::parse_from(["fritzctl", "collect-all", "--result-file", "all.json"]);
        match cli.cmd {
            Cmd::CollectAll { result_file } => {
                assert_eq!(result_file, Some(PathBuf::from("all.json")));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
