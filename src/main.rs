//! meta-ads-mcp: MCP server for the Meta Marketing API
//!
//! Serves tools over stdio by default; `--login` and `--status` are one-shot
//! commands that exit when done.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use meta_ads_mcp::auth::{
    AuthGuard, CredentialSource, CredentialStore, LoginFlow, LoginSettings, SystemBrowser,
};
use meta_ads_mcp::config::{self, Config, Environment};
use meta_ads_mcp::graph::{GraphClient, GraphSettings};
use meta_ads_mcp::mcp::McpServer;

/// MCP server for the Meta Marketing (Graph) API.
///
/// Authenticate with META_ACCESS_TOKEN, or set META_APP_ID and
/// META_APP_SECRET and run with --login once.
#[derive(Parser, Debug)]
#[command(name = "meta-ads-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Run the browser login, cache the token, and exit
    #[arg(long, conflicts_with = "status")]
    login: bool,

    /// Meta app id (overrides META_APP_ID)
    #[arg(long, value_name = "ID")]
    app_id: Option<String>,

    /// Show which credential would be used, and exit
    #[arg(long)]
    status: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr; stdout carries JSON-RPC.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Describes the credential a tool call would use. Never prints the token.
fn describe_credential(store: &CredentialStore, env: &Environment) -> (bool, String) {
    match store.resolve(env) {
        Ok(credential) => {
            let mut lines = vec![format!("credential source: {}", credential.source())];
            if credential.source() == CredentialSource::OAuthCache {
                lines.push(format!("token cache: {}", store.cache_path().display()));
                match credential.expires_at() {
                    Some(at) => lines.push(format!("expires at: {}", at.to_rfc3339())),
                    None => lines.push("expires at: unknown".to_string()),
                }
                if !credential.scopes().is_empty() {
                    let scopes: Vec<_> = credential.scopes().iter().map(String::as_str).collect();
                    lines.push(format!("scopes: {}", scopes.join(",")));
                }
            }
            (true, lines.join("\n"))
        }
        Err(e) => {
            let mut text = format!("no usable credential: {e}");
            if let Some(hint) = e.remediation() {
                text.push('\n');
                text.push_str(&hint);
            }
            (false, text)
        }
    }
}

/// Server mode refuses to start without a credential. Tool calls still
/// resolve their credential afresh once the server is running.
fn require_startup_credential(store: &CredentialStore, env: &Environment) -> Result<(), String> {
    match describe_credential(store, env) {
        (true, _) => Ok(()),
        (false, report) => Err(report),
    }
}

fn build_runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            None
        }
    }
}

fn run_login(cfg: &Config, env: &Environment, store: CredentialStore) -> ExitCode {
    let Some(runtime) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    let mut flow = LoginFlow::new(LoginSettings::from_config(cfg, env), store.clone(), SystemBrowser);
    match runtime.block_on(flow.run(env)) {
        Ok(record) => {
            eprintln!("Login complete. Token cached at {}", store.cache_path().display());
            if record.long_lived {
                eprintln!("Long-lived token obtained.");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(kind = e.kind(), "Login failed");
            eprintln!("Login failed: {e}");
            if let Some(hint) = e.remediation() {
                eprintln!("{hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run_server(cfg: &Config, env: &Environment, store: CredentialStore, app_id: Option<String>) -> ExitCode {
    if let Err(report) = require_startup_credential(&store, env) {
        error!("No credential available, refusing to start");
        eprintln!("{report}");
        return ExitCode::FAILURE;
    }

    let settings = GraphSettings::from_config(cfg, env);
    info!(api_version = %settings.api_version, "Graph API settings loaded");

    let client = match GraphClient::new(settings) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create Graph API client");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(AuthGuard::new(store, app_id), client);
    info!("MCP server ready, waiting for client connection...");

    let Some(runtime) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    let env = Environment::capture().with_app_id(args.app_id.clone());
    let store = CredentialStore::from_config(cfg.auth.token_cache_path.as_deref());

    if args.status {
        let (available, report) = describe_credential(&store, &env);
        println!("{report}");
        return if available {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    if args.login {
        return run_login(&cfg, &env, store);
    }

    eprintln!(
        "meta-ads-mcp {}. This program comes with ABSOLUTELY NO WARRANTY; \
         licensed under GPL-3.0-or-later.",
        env!("CARGO_PKG_VERSION")
    );
    info!(version = env!("CARGO_PKG_VERSION"), "Starting meta-ads-mcp server");

    run_server(&cfg, &env, store, args.app_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_ads_mcp::auth::TokenCacheRecord;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn login_and_status_conflict() {
        assert!(Args::try_parse_from(["meta-ads-mcp", "--login", "--status"]).is_err());
        let args = Args::try_parse_from(["meta-ads-mcp", "--login", "--app-id", "123"]).unwrap();
        assert!(args.login);
        assert_eq!(args.app_id.as_deref(), Some("123"));
    }

    #[test]
    fn log_level_selection() {
        assert_eq!(get_log_level(0, true, "debug"), Level::ERROR);
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
    }

    #[test]
    fn status_never_prints_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token_cache.json"));
        let mut record = TokenCacheRecord::new("EAAB-secret-cached", "123", serde_json::json!({}));
        record.scopes = vec!["ads_read".into()];
        store.persist(&record).unwrap();

        let (available, report) = describe_credential(&store, &Environment::default());
        assert!(available);
        assert!(report.contains("oauth-cache"));
        assert!(report.contains("ads_read"));
        assert!(!report.contains("EAAB-secret-cached"));

        let env = Environment {
            access_token: Some("EAAB-secret-env".into()),
            ..Environment::default()
        };
        let (_, report) = describe_credential(&store, &env);
        assert!(report.contains("env-token"));
        assert!(!report.contains("EAAB-secret-env"));
    }

    #[test]
    fn status_without_credential_explains_remediation() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token_cache.json"));
        let (available, report) = describe_credential(&store, &Environment::default());
        assert!(!available);
        assert!(report.contains("--login"));
    }

    #[test]
    fn server_start_requires_a_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("token_cache.json"));

        let report = require_startup_credential(&store, &Environment::default()).unwrap_err();
        assert!(report.contains("no usable credential"));
        assert!(report.contains("--login"));

        let env = Environment {
            access_token: Some("EAAB-startup-token".into()),
            ..Environment::default()
        };
        assert!(require_startup_credential(&store, &env).is_ok());

        store
            .persist(&TokenCacheRecord::new("EAAB-cached", "123", serde_json::json!({})))
            .unwrap();
        assert!(require_startup_credential(&store, &Environment::default()).is_ok());
    }
}
