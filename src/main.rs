use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use terra_session::net::interceptor::ApiError;
use terra_session::permissions::accessible_modules;
use terra_session::storage::{FileStore, SessionStore, StorageError};
use terra_session::{ApiClient, AuthState, Credentials, LoginError, RestAuthBackend, TerraConfig};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] terra_session::config::ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Login(#[from] LoginError),
    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
    #[error("not logged in; run `terra login` first")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "terra", about = "Terra Canada session and API CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate and persist the session.
    Login {
        #[arg(long, env = "TERRA_USERNAME")]
        username: String,
        #[arg(long, env = "TERRA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Close the session on the server and locally.
    Logout,
    /// Show the logged-in user and reachable modules.
    Whoami,
    /// Check module access, or an action within a module.
    Can { module: String, action: Option<String> },
    /// GET an API path with the session's bearer token.
    Get { path: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Arc::new(TerraConfig::from_env()?);
    let store = SessionStore::new(Arc::new(FileStore::new(&config.storage_path)));
    let backend = Arc::new(RestAuthBackend::new(config.clone())?);
    let auth = AuthState::new(backend, store);
    auth.restore()?;

    match cli.command {
        Command::Login { username, password } => run_login(&auth, username, password).await,
        Command::Logout => {
            auth.sign_out().await;
            println!("sesión cerrada");
            Ok(())
        }
        Command::Whoami => run_whoami(&auth),
        Command::Can { module, action } => run_can(&auth, &module, action.as_deref()),
        Command::Get { path } => {
            let client = ApiClient::new(config, auth)?;
            let data: Value = client.get(&path).await?;
            print_json(&data)
        }
    }
}

async fn run_login(auth: &AuthState, username: String, password: String) -> Result<(), CliError> {
    let user = auth.login(&Credentials::new(username, password)).await?;
    println!("{} ({})", user.full_name, user.role_name);
    Ok(())
}

fn run_whoami(auth: &AuthState) -> Result<(), CliError> {
    let user = auth.current_user().ok_or(CliError::NotLoggedIn)?;
    println!("{} <{}>", user.username, user.email);
    println!("role: {}", user.role_name);
    println!("modules: {}", accessible_modules(&user).join(", "));
    Ok(())
}

fn run_can(auth: &AuthState, module: &str, action: Option<&str>) -> Result<(), CliError> {
    if !auth.is_authenticated() {
        return Err(CliError::NotLoggedIn);
    }
    let allowed = match action {
        Some(action) => auth.has_action_permission(module, action),
        None => auth.has_module_access(module),
    };
    println!("{}", if allowed { "yes" } else { "no" });
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
