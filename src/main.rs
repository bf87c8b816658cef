#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastkeeper::events::Notice;
use fastkeeper::{ApiError, AppContext, Config, Session, Status};
use serde::Serialize;
use std::process::ExitCode;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt};

/// `fastkeeper` - fasting sessions against your backend, with demo data when it is down.
#[derive(Parser, Debug)]
#[command(name = "fastkeeper")]
#[command(version)]
#[command(about = "Start, stop and review fasting sessions.", long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a fasting session
    Begin {
        /// Goal in hours (default: 16)
        #[arg(long)]
        goal: Option<f64>,
    },

    /// End the active session
    End,

    /// Show the active session, if any
    Status,

    /// List past sessions, newest first
    History {
        /// Show at most this many sessions
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check whether the backend is reachable
    Health,

    /// Sign in to the backend (creating the account if needed)
    Login {
        /// Account name (switches to account-scoped endpoints)
        #[arg(long)]
        user: String,

        /// Email address sent along when signing in
        #[arg(long)]
        email: Option<String>,

        /// Store this bearer token instead of signing in
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget stored credentials
    Logout,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, ignored_overrides) = match Config::load_or_init() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging - respects RUST_LOG, defaults to the configured level
    let subscriber = fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&config.observability.log_level)
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        }))
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    for problem in &ignored_overrides {
        tracing::warn!("{problem}");
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(api) => eprintln!("error ({}): {api}", api.category()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    let app = AppContext::from_config(config)?;
    let (subscriber_id, mut notices) = app.service.subscribe();

    let result = match cli.command {
        Commands::Begin { goal } => app
            .service
            .begin(goal)
            .await
            .map(|session| print_session("Started", &session, json)),
        Commands::End => app
            .service
            .end()
            .await
            .map(|session| print_session("Ended", &session, json)),
        Commands::Status => app
            .service
            .status()
            .await
            .map(|status| print_status(&status, json)),
        Commands::History { limit } => app.service.history().await.map(|mut sessions| {
            if let Some(limit) = limit {
                sessions.truncate(limit);
            }
            print_history(&sessions, json);
        }),
        Commands::Health => {
            let healthy = app.health.is_healthy().await;
            print_health(&app, healthy, json);
            Ok(())
        }
        Commands::Login { user, email, token } => {
            return login(&app, &user, email.as_deref(), token.as_deref()).await;
        }
        Commands::Logout => {
            app.auth.logout()?;
            println!("Logged out.");
            return Ok(());
        }
        Commands::Config => return print_config(&app.config, json),
    };

    print_notices(&mut notices);
    app.service.unsubscribe(subscriber_id);
    result.map_err(anyhow::Error::from)
}

async fn login(
    app: &AppContext,
    user: &str,
    email: Option<&str>,
    token: Option<&str>,
) -> Result<()> {
    if let Some(token) = token {
        app.auth.store_token(token, Some(user))?;
        println!("Token stored for {}.", user.trim());
        return Ok(());
    }
    let response = app.auth.login_or_create(user, email).await?;
    println!("Logged in as {}.", response.user.username);
    Ok(())
}

fn print_notices(notices: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("notice: {}", notice.message);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("error: failed to encode JSON: {e}"),
    }
}

fn format_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn print_session(verb: &str, session: &Session, json: bool) {
    if json {
        print_json(session);
        return;
    }
    match session.ended_at {
        Some(ended) => println!(
            "{verb} session #{} at {} after {} (goal {}h).",
            session.id,
            format_time(ended),
            session.duration_label,
            session.goal_hours
        ),
        None => println!(
            "{verb} session #{} at {} (goal {}h).",
            session.id,
            format_time(session.started_at),
            session.goal_hours
        ),
    }
}

fn print_status(status: &Status, json: bool) {
    if json {
        print_json(status);
        return;
    }
    if !status.active {
        println!("No active session.");
        return;
    }
    let since = status.since.map(format_time).unwrap_or_default();
    match (status.goal_hours, status.progress()) {
        (Some(goal), Some(progress)) => println!(
            "Active for {}h {}m since {since} ({:.0}% of {goal}h goal).",
            status.elapsed_hours,
            status.elapsed_minutes,
            progress * 100.0
        ),
        _ => println!(
            "Active for {}h {}m since {since}.",
            status.elapsed_hours, status.elapsed_minutes
        ),
    }
}

fn print_history(sessions: &[Session], json: bool) {
    if json {
        print_json(&sessions);
        return;
    }
    if sessions.is_empty() {
        println!("No sessions yet.");
        return;
    }
    for session in sessions {
        let end = session
            .ended_at
            .map_or_else(|| "active".to_string(), format_time);
        println!(
            "#{:<4} {}  ->  {:<20} {:>8}",
            session.id,
            format_time(session.started_at),
            end,
            session.duration_label
        );
    }
}

fn print_health(app: &AppContext, healthy: bool, json: bool) {
    let snapshot = app.health.snapshot();
    if json {
        print_json(&serde_json::json!({
            "base_url": app.transport.base_url(),
            "reachable": healthy,
            "mode": app.service.mode(),
            "health": snapshot,
        }));
        return;
    }
    let verdict = if healthy { "reachable" } else { "unreachable" };
    println!("Backend {} is {verdict}.", app.transport.base_url());
    if let Some(error) = snapshot.last_error {
        println!("Last error: {error}");
    }
    println!("Data source: {}", app.service.mode());
}

fn print_config(config: &Config, json: bool) -> Result<()> {
    if json {
        print_json(config);
        return Ok(());
    }
    println!("# {}", config.config_path.display());
    print!(
        "{}",
        toml::to_string_pretty(config).context("Failed to serialize config")?
    );
    Ok(())
}
