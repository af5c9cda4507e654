//! resourcehub - a command-line client for the resourcehub backend.
//!
//! Logs in with email/password or OAuth, lists and shows resources, and
//! creates new ones. Credentials saved with `--remember` persist between
//! runs; otherwise they only last for the current invocation.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use resourcehub_core::{
    ApiClient, Config, NewResource, OAuthProvider, RegisterForm, Resource,
    ResourceQuery, SessionManager, SessionState, SortBy,
};

#[derive(Parser, Debug)]
#[command(name = "resourcehub", version, about = "Browse and share resources from the command line")]
struct Cli {
    /// Backend origin, e.g. https://api.example.com (default: RESOURCEHUB_API_URL or config)
    #[arg(long)]
    api_url: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the session after this command exits
        #[arg(long)]
        remember: bool,
    },
    /// Create a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
    },
    /// End the session and revoke the refresh token
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Print the URL that starts an OAuth login
    OauthUrl {
        /// google or github
        provider: String,
    },
    /// Finish an OAuth login from the redirect URL
    OauthCallback {
        url: String,
        #[arg(long)]
        remember: bool,
    },
    /// List resources
    List {
        /// newest, oldest or title
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one resource
    Show { id: String },
    /// Create a resource
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Print the active configuration
    Config,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;

    let mut config = Config::load()?;
    let base_url = match cli.api_url {
        Some(ref url) => Config::validate_base_url(url)?,
        None => config.api_base_url()?,
    };
    debug!(%base_url, "Using backend");

    let store = Arc::new(config.credential_store()?);
    let session = Arc::new(SessionManager::new(store, config.http_client()?, base_url));
    session.initialize();
    let client = ApiClient::new(session);

    run(cli.command, &client, &mut config).await
}

async fn run(command: Command, client: &ApiClient, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { email, remember } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;

            let user = client.login_with_password(&email, &password, remember).await?;
            config.last_email = Some(email);
            config.save()?;

            println!("Logged in as {}", user.display_name());
            if !remember {
                println!("(not remembered - the session ends when this command exits)");
            }
        }
        Command::Register { username, email } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm_password = rpassword::prompt_password("Confirm password: ")?;
            let form = RegisterForm {
                username,
                email,
                password,
                confirm_password,
            };
            client.register(&form).await?;
            println!("Account created. Log in with `resourcehub login --email {}`", form.email);
        }
        Command::Logout => {
            client.logout().await;
            println!("Logged out");
        }
        Command::Whoami => match client.session().state() {
            SessionState::Authenticated(user) => {
                println!("{}", serde_json::to_string_pretty(user.as_json())?);
            }
            _ => println!("Not logged in"),
        },
        Command::OauthUrl { provider } => {
            let provider = OAuthProvider::from_str(&provider)
                .with_context(|| format!("Unknown OAuth provider: {}", provider))?;
            println!("{}", client.oauth_authorize_url(provider));
        }
        Command::OauthCallback { url, remember } => {
            let user = client.session().login_with_oauth_callback(&url, remember)?;
            println!("Logged in as {}", user.display_name());
        }
        Command::List { sort_by, limit, json } => {
            let mut query = ResourceQuery::new();
            if let Some(ref s) = sort_by {
                let sort_by = SortBy::from_str(s).with_context(|| format!("Unknown sort order: {}", s))?;
                query = query.sort_by(sort_by);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }

            let resources = client.list_resources(&query).await?;
            info!(count = resources.len(), "Listed resources");
            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else if resources.is_empty() {
                println!("No resources found");
            } else {
                for resource in &resources {
                    print_summary(resource);
                }
            }
        }
        Command::Show { id } => {
            let resource = client.get_resource(&id).await?;
            print_detail(&resource);
        }
        Command::Create {
            title,
            description,
            url,
        } => {
            let resource = client
                .create_resource(&NewResource {
                    title,
                    description,
                    url,
                })
                .await?;
            println!("Created resource {}", resource.id);
        }
        Command::Config => {
            println!("config file:    {}", Config::config_path()?.display());
            println!("api base url:   {}", client.base_url());
            println!("durable store:  {:?}", config.durable_store);
            println!(
                "session:        {}",
                client
                    .session()
                    .user()
                    .map(|u| format!("logged in as {}", u.display_name()))
                    .unwrap_or_else(|| "not logged in".to_string())
            );
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn print_summary(resource: &Resource) {
    let created = resource.created_display();
    if created.is_empty() {
        println!("{:>8}  {}", resource.id, resource.title);
    } else {
        println!("{:>8}  {}  {}", resource.id, created, resource.title);
    }
}

fn print_detail(resource: &Resource) {
    println!("{}", resource.title);
    println!("  id:          {}", resource.id);
    if let Some(ref description) = resource.description {
        println!("  description: {}", description);
    }
    if let Some(ref url) = resource.url {
        println!("  url:         {}", url);
    }
    let created = resource.created_display();
    if !created.is_empty() {
        println!("  created:     {}", created);
    }
    for (key, value) in &resource.extra {
        println!("  {}: {}", key, value);
    }
}

