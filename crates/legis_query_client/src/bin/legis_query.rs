//! legis-query: terminal client for the legislation query service.
//! Reads config, submits one question (argument or first stdin line) over a
//! WebSocket session, prints the answer and its citations to stdout.

use clap::Parser;
use legis_query_client::{
    config, run_query, Config, ConfigError, JsonRenderer, Outcome, TextRenderer,
};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "legis-query")]
#[command(about = "Ask the legislation query service a question")]
struct Args {
    /// Config file (default: ~/.legis-query/config.yaml)
    #[arg(long, env = "LEGIS_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket URL of the query service; overrides the config file
    #[arg(long)]
    url: Option<String>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print newline-delimited JSON snapshots instead of text
    #[arg(long)]
    json: bool,

    /// Question to ask; read from stdin when omitted
    query: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error("failed to load config from {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("failed to read question from stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed to create runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("no question provided")]
    NoQuestion,
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// An explicitly named file must load; a missing default file means defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config, ClientError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config::default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("no config file, using defaults");
                return Ok(Config::default());
            }
        },
    };
    config::load(&path).map_err(|source| ClientError::Config { path, source })
}

fn read_question(arg: Option<String>) -> Result<String, ClientError> {
    let raw = match arg {
        Some(q) => q,
        None => {
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(ClientError::Stdin)?;
            line
        }
    };
    let question = raw.trim();
    if question.is_empty() {
        return Err(ClientError::NoQuestion);
    }
    Ok(question.to_string())
}

fn run(args: Args) -> Result<Outcome, ClientError> {
    let cfg = load_config(args.config.as_deref())?;
    let endpoint = args.url.unwrap_or_else(|| cfg.endpoint());
    let timeout = args.timeout.map(Duration::from_secs).or_else(|| cfg.timeout());
    let question = read_question(args.query)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ClientError::Runtime)?;

    let outcome = rt.block_on(async {
        if args.json {
            run_query(&endpoint, &question, timeout, JsonRenderer::stdout()).await
        } else {
            run_query(&endpoint, &question, timeout, TextRenderer::stdio()).await
        }
    });
    outcome.ok_or(ClientError::NoQuestion)
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(Outcome::Success(_)) => ExitCode::SUCCESS,
        // The renderer has already reported the failure.
        Ok(Outcome::Failed { .. }) => ExitCode::FAILURE,
        Ok(Outcome::TimedOut(limit)) => {
            eprintln!("Error: no answer within {}s", limit.as_secs());
            ExitCode::FAILURE
        }
        Ok(Outcome::Cancelled) => {
            eprintln!("Error: query was cancelled");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
