use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "facelog", about = "facelog authentication log CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an authentication attempt
    Log {
        /// Whether the attempt succeeded
        #[arg(long, action = ArgAction::Set)]
        success: bool,
        /// Match confidence between 0 and 1
        #[arg(long)]
        confidence: f64,
        /// User the attempt belongs to
        #[arg(long)]
        user: Option<String>,
        /// Attempt time as epoch seconds (defaults to now)
        #[arg(long)]
        timestamp: Option<f64>,
        /// Attempt type (e.g. "face_recognition")
        #[arg(long = "type")]
        attempt_type: Option<String>,
    },
    /// List recorded attempts, newest first
    Logs {
        #[arg(long)]
        page: Option<u32>,
        /// Entries per page (at most 100)
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        success: Option<bool>,
        #[arg(long)]
        user: Option<String>,
        /// Lower time bound, RFC 3339 or YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Upper time bound, RFC 3339 or YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
    },
    /// Show stats for a period: 1h, 24h, 7d, 30d or all
    Stats {
        #[arg(long, default_value = "24h")]
        period: String,
    },
    /// Show the dashboard overview
    Dashboard,
    /// Register a new user
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Show a user and their recent activity
    User {
        id: String,
    },
    /// Show authentication stats for one user
    UserStats {
        id: String,
    },
    /// Mark a user active
    Activate {
        id: String,
    },
    /// Mark a user inactive
    Deactivate {
        id: String,
    },
    /// Remove a user; their recorded attempts are kept
    RemoveUser {
        id: String,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.freedesktop.FaceLog1",
    default_service = "org.freedesktop.FaceLog1",
    default_path = "/org/freedesktop/FaceLog1"
)]
trait FaceLog {
    async fn log_attempt(&self, attempt: &str) -> zbus::Result<String>;
    async fn logs(&self, query: &str) -> zbus::Result<String>;
    async fn stats(&self, period: &str) -> zbus::Result<String>;
    async fn dashboard(&self) -> zbus::Result<String>;
    async fn register_user(&self, name: &str, email: &str) -> zbus::Result<String>;
    async fn set_user_active(&self, user_id: &str, active: bool) -> zbus::Result<bool>;
    async fn remove_user(&self, user_id: &str) -> zbus::Result<bool>;
    async fn user_detail(&self, user_id: &str) -> zbus::Result<String>;
    async fn user_stats(&self, user_id: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to the message bus")?;
    let proxy = FaceLogProxy::new(&conn)
        .await
        .context("facelogd is not reachable")?;

    let reply = match cli.command {
        Commands::Log {
            success,
            confidence,
            user,
            timestamp,
            attempt_type,
        } => {
            let attempt = json!({
                "success": success,
                "confidence": confidence,
                "user_id": user,
                "timestamp": timestamp,
                "attempt_type": attempt_type,
            });
            tracing::debug!(%attempt, "logging attempt");
            proxy.log_attempt(&attempt.to_string()).await?
        }
        Commands::Logs {
            page,
            limit,
            success,
            user,
            from,
            to,
        } => {
            let query = logs_query(page, limit, success, user, from, to);
            proxy.logs(&query.to_string()).await?
        }
        Commands::Stats { period } => proxy.stats(&period).await?,
        Commands::Dashboard => proxy.dashboard().await?,
        Commands::Register { name, email } => proxy.register_user(&name, &email).await?,
        Commands::User { id } => proxy.user_detail(&id).await?,
        Commands::UserStats { id } => proxy.user_stats(&id).await?,
        Commands::Activate { id } => {
            updated(&id, proxy.set_user_active(&id, true).await?).to_string()
        }
        Commands::Deactivate { id } => {
            updated(&id, proxy.set_user_active(&id, false).await?).to_string()
        }
        Commands::RemoveUser { id } => {
            let removed = proxy.remove_user(&id).await?;
            json!({ "user_id": id, "removed": removed }).to_string()
        }
        Commands::Status => proxy.status().await?,
    };

    println!("{}", pretty(&reply)?);
    Ok(())
}

/// Build the `Logs` query, leaving out anything not given on the command line.
fn logs_query(
    page: Option<u32>,
    limit: Option<u32>,
    success: Option<bool>,
    user: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Value {
    let mut query = Map::new();
    if let Some(page) = page {
        query.insert("page".into(), page.into());
    }
    if let Some(limit) = limit {
        query.insert("limit".into(), limit.into());
    }
    if let Some(success) = success {
        query.insert("success".into(), success.into());
    }
    if let Some(user) = user {
        query.insert("user_id".into(), user.into());
    }
    if let Some(from) = from {
        query.insert("date_from".into(), from.into());
    }
    if let Some(to) = to {
        query.insert("date_to".into(), to.into());
    }
    Value::Object(query)
}

fn updated(id: &str, found: bool) -> Value {
    json!({ "user_id": id, "updated": found })
}

fn pretty(reply: &str) -> Result<String> {
    let value: Value = serde_json::from_str(reply).context("daemon returned invalid JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}
