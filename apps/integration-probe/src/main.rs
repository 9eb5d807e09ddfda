use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use integrations::{ActionResult, IntegrationKind, IntegrationManager, build_manager};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "integration_probe=info,integrations=info,integration_http=info";

/// Integration probe - exercise an integration from its stored configuration
#[derive(Parser)]
#[command(name = "integration-probe")]
#[command(about = "Run integration managers against a stored configuration")]
#[command(version)]
struct Cli {
    /// Integration type (`rest_api` or `slack`)
    #[arg(short, long)]
    kind: IntegrationKind,

    /// Path to the stored configuration JSON
    #[arg(short, long)]
    config: PathBuf,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the connection and print the resulting status
    Test,
    /// List the supported actions
    Actions,
    /// Execute one action
    Exec {
        /// Action name
        name: String,

        /// Action parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Per-call timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,
    },
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => DEFAULT_FILTER.to_owned(),
        1 => DEFAULT_FILTER.replace("=info", "=debug"),
        _ => DEFAULT_FILTER.replace("=info", "=trace"),
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    } else {
        EnvFilter::new(fallback)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &Path) -> Result<Value> {
    if !path.is_file() {
        anyhow::bail!("config file does not exist: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn parse_params(raw: Option<&str>, timeout: Option<f64>) -> Result<Map<String, Value>> {
    let mut params = match raw {
        None => Map::new(),
        Some(raw) => match serde_json::from_str(raw).context("--params is not valid JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--params must be a JSON object"),
        },
    };
    if let Some(secs) = timeout {
        params.insert("timeout".to_owned(), json!(secs));
    }
    Ok(params)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(result: &ActionResult, manager: &dyn IntegrationManager) -> Result<ExitCode> {
    print_json(&json!({
        "result": result,
        "status": manager.status(),
    }))?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn exec(manager: &dyn IntegrationManager, name: &str, params: &Map<String, Value>) -> ActionResult {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling the action");
            on_signal.cancel();
        }
    });

    let result = manager.execute_action_with(name, params, cancel).await;
    watcher.abort();
    result
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli.config)?;
    let manager = build_manager(cli.kind, &config)
        .with_context(|| format!("invalid {} configuration", cli.kind))?;
    tracing::info!(integration = %cli.kind, "integration manager ready");

    match cli.command {
        Commands::Test => {
            let result = manager.test_connection().await;
            report(&result, manager.as_ref())
        }
        Commands::Actions => {
            print_json(&manager.list_actions())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec {
            name,
            params,
            timeout,
        } => {
            let params = parse_params(params.as_deref(), timeout)?;
            let result = exec(manager.as_ref(), &name, &params).await;
            report(&result, manager.as_ref())
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_exec_with_params() {
        let cli = Cli::try_parse_from([
            "integration-probe",
            "--kind",
            "rest_api",
            "--config",
            "rest.json",
            "-vv",
            "exec",
            "get",
            "--params",
            r#"{"path": "/users"}"#,
            "--timeout",
            "2.5",
        ])
        .unwrap();
        assert_eq!(cli.kind, IntegrationKind::RestApi);
        assert_eq!(cli.verbose, 2);
        let Commands::Exec { name, params, timeout } = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(name, "get");
        let params = parse_params(params.as_deref(), timeout).unwrap();
        assert_eq!(params["path"], json!("/users"));
        assert_eq!(params["timeout"], json!(2.5));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["integration-probe", "--kind", "jira", "--config", "x.json", "test"]).is_err());
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(parse_params(Some("[1, 2]"), None).is_err());
        assert!(parse_params(Some("{not json"), None).is_err());
        assert!(parse_params(None, None).unwrap().is_empty());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Path::new("/nonexistent/integration.json")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
