//! cartola: extract and classify bank movements through the consumer web
//! channel. Three operations, mirroring what callers need: movements only,
//! totals only, or everything.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use cartola_client::{Credentials, Pipeline, PipelineOptions};

mod config;
use config::FileConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cartola",
    version,
    about = "Extract bank movements through the consumer web channel"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and classify movements only
    Movements(CommonArgs),

    /// Fetch movements and print only the aggregate totals
    Totals(CommonArgs),

    /// Fetch everything: access token, movements, and totals
    Full(CommonArgs),
}

impl Command {
    fn args(&self) -> &CommonArgs {
        match self {
            Command::Movements(a) | Command::Totals(a) | Command::Full(a) => a,
        }
    }

    /// Whether this operation reports aggregate totals; `movements` skips
    /// the aggregation entirely.
    fn aggregates(&self) -> bool {
        !matches!(self, Command::Movements(_))
    }
}

#[derive(Args, Debug, Default)]
struct CommonArgs {
    /// Login identifier (RUT)
    #[arg(long, env = "CARTOLA_USERNAME")]
    username: Option<String>,

    /// Login secret
    #[arg(long, env = "CARTOLA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Client id for the token endpoint
    #[arg(long, env = "CARTOLA_CLIENT_ID")]
    client_id: Option<String>,

    /// Client id for the movements endpoint
    #[arg(long, env = "CARTOLA_API_CLIENT_ID")]
    api_client_id: Option<String>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Log stage-by-stage detail to stderr
    #[arg(long)]
    verbose: bool,

    /// Maximum records to request
    #[arg(long)]
    limit: Option<u32>,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// TOML file with credentials and option defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Caller-facing result envelope: success payload or a single
/// human-readable error, never both, never partial state.
#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn emit<T: Serialize>(envelope: &Envelope<T>) {
    match serde_json::to_string_pretty(envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render result: {e}"),
    }
}

/// Merge flags, environment and the optional config file into pipeline
/// inputs. A missing credential field is rejected here, before any
/// browser or network work starts. `want_totals` comes from the
/// subcommand: only `totals` and `full` aggregate.
fn resolve(
    args: &CommonArgs,
    file: &FileConfig,
    want_totals: bool,
) -> Result<(Credentials, PipelineOptions), String> {
    let pick = |flag: &Option<String>, file_value: &Option<String>| {
        flag.clone().or_else(|| file_value.clone()).unwrap_or_default()
    };

    let credentials = Credentials {
        username: pick(&args.username, &file.credentials.username),
        password: pick(&args.password, &file.credentials.password),
        client_id: pick(&args.client_id, &file.credentials.client_id),
        api_client_id: pick(&args.api_client_id, &file.credentials.api_client_id),
    };

    if let Some(field) = credentials.missing_field() {
        return Err(format!(
            "missing credential field `{field}`: supply username, password, clientId and apiClientId"
        ));
    }

    let headed = args.headed || file.options.headed.unwrap_or(false);
    let options = PipelineOptions {
        headless: !headed,
        limit: args.limit.or(file.options.limit).unwrap_or(50),
        totals: want_totals,
        deadline: args
            .deadline
            .or(file.options.deadline_secs)
            .map(Duration::from_secs),
    };

    Ok((credentials, options))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "cartola=debug,cartola_client=debug,cartola_ingest=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = cli.command.args();
    init_tracing(args.verbose);

    let file = match &args.config {
        Some(path) => config::load(path)?,
        None => FileConfig::default(),
    };

    let (credentials, options) = match resolve(args, &file, cli.command.aggregates()) {
        Ok(resolved) => resolved,
        Err(message) => {
            emit(&Envelope::<()>::fail(message));
            std::process::exit(1);
        }
    };

    match Pipeline::run(&credentials, &options).await {
        Ok(output) => match cli.command {
            Command::Movements(_) => emit(&Envelope::ok(&output.ledger)),
            Command::Totals(_) => emit(&Envelope::ok(&output.totals)),
            Command::Full(_) => emit(&Envelope::ok(&output)),
        },
        Err(e) => {
            emit(&Envelope::<()>::fail(format!("{} failed: {e}", e.stage())));
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_args() -> CommonArgs {
        CommonArgs {
            username: Some("11111111-1".into()),
            password: Some("secret".into()),
            client_id: Some("a".into()),
            api_client_id: Some("b".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let (credentials, options) =
            resolve(&complete_args(), &FileConfig::default(), true).unwrap();
        assert_eq!(credentials.username, "11111111-1");
        assert!(options.headless);
        assert_eq!(options.limit, 50);
        assert_eq!(options.deadline, None);
    }

    #[test]
    fn test_missing_credential_rejected_before_pipeline() {
        let mut args = complete_args();
        args.api_client_id = None;
        let err = resolve(&args, &FileConfig::default(), true).unwrap_err();
        assert!(err.contains("apiClientId"));
    }

    #[test]
    fn test_only_aggregating_subcommands_compute_totals() {
        assert!(!Command::Movements(CommonArgs::default()).aggregates());
        assert!(Command::Totals(CommonArgs::default()).aggregates());
        assert!(Command::Full(CommonArgs::default()).aggregates());

        let (_, options) = resolve(&complete_args(), &FileConfig::default(), false).unwrap();
        assert!(!options.totals);
        let (_, options) = resolve(&complete_args(), &FileConfig::default(), true).unwrap();
        assert!(options.totals);
    }

    #[test]
    fn test_flags_override_config_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [credentials]
            username = "from-file"
            password = "file-secret"
            client_id = "file-a"
            api_client_id = "file-b"

            [options]
            limit = 25
            "#,
        )
        .unwrap();

        let mut args = complete_args();
        args.limit = Some(10);
        let (credentials, options) = resolve(&args, &file, true).unwrap();
        assert_eq!(credentials.username, "11111111-1");
        assert_eq!(options.limit, 10);
    }

    #[test]
    fn test_config_file_fills_gaps() {
        let file: FileConfig = toml::from_str(
            r#"
            [credentials]
            username = "22222222-2"
            password = "file-secret"
            client_id = "file-a"
            api_client_id = "file-b"

            [options]
            headed = true
            deadline_secs = 180
            "#,
        )
        .unwrap();

        let (credentials, options) = resolve(&CommonArgs::default(), &file, true).unwrap();
        assert_eq!(credentials.username, "22222222-2");
        assert!(!options.headless);
        assert_eq!(options.deadline, Some(Duration::from_secs(180)));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let envelope = Envelope::<()>::fail("missing credential field `password`");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "success": false,
                "error": "missing credential field `password`"
            })
        );
    }
}
