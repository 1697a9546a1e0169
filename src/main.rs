use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use alias_inbox::api::{self, AppState};
use alias_inbox::cache::{self, MemoryCache};
use alias_inbox::client::{ClientEvent, ClientRunner, HttpTransport, TerminalView};
use alias_inbox::config::{AppConfig, PollingConfig};
use alias_inbox::gate::AccessGate;
use alias_inbox::inbox::InboxService;
use alias_inbox::mailbox::ImapMailbox;
use alias_inbox::pipeline::RetrievalPipeline;
use alias_inbox::store::AllowlistStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Watch an alias from the terminal, printing new messages as they arrive
    Watch {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Alias email address to watch
        #[arg(long)]
        email: String,

        /// Access password for the alias
        #[arg(long, env = "ALIAS_INBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let _log_guard = init_tracing();

    let args = Args::parse();
    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Watch {
            server,
            email,
            password,
        } => watch(server, email, password).await,
    }
}

/// stderr logging, plus a daily rolling file when `LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "alias-inbox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::from_env().context("Invalid configuration")?);

    eprintln!("📬 Alias Inbox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}:{}", config.bind_addr, config.port);
    eprintln!("   Allowlist: {}", config.prefix_db_path.display());
    eprintln!("   Domains: {}", config.allowed_domains.join(", "));
    for account in &config.accounts {
        eprintln!("   Mailbox {}: {} ({})", account.id, account.user, account.domain);
    }
    if config.accounts.is_empty() {
        tracing::warn!("No mailbox configured; every check will be rejected");
    }
    if config.admin_key.is_none() {
        tracing::warn!("ADMIN_KEY not set; admin endpoints are disabled");
    }

    // ── Allowlist ────────────────────────────────────────────────────────
    let store = Arc::new(
        AllowlistStore::open(&config.prefix_db_path)
            .await
            .with_context(|| {
                format!("Failed to open allowlist at {}", config.prefix_db_path.display())
            })?,
    );

    // ── Retrieval ────────────────────────────────────────────────────────
    let mailbox = Arc::new(ImapMailbox::new(config.imap_timeout));
    let pipeline = Arc::new(RetrievalPipeline::new(mailbox));

    let result_cache = Arc::new(MemoryCache::new(config.cache_ttl));
    let sweep_period = config.cache_ttl.max(Duration::from_secs(60));
    let _sweep_handle = cache::spawn_sweep_task(result_cache.clone(), sweep_period);

    let inbox = Arc::new(InboxService::new(
        AccessGate::new(config.clone(), store.clone()),
        pipeline.clone(),
        result_cache,
    ));

    let app = api::routes(AppState {
        config: config.clone(),
        store,
        inbox,
        pipeline,
    });

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Alias inbox server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn watch(server: String, email: String, password: String) -> anyhow::Result<()> {
    eprintln!("📬 Watching {email} via {server} (Ctrl-C to stop)");

    let transport = Arc::new(HttpTransport::new(server));
    let runner = ClientRunner::new(PollingConfig::default(), transport, TerminalView);
    let tx = runner.sender();

    tx.send(ClientEvent::Submit { email, password })?;
    tokio::spawn({
        let tx = tx.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(ClientEvent::Unload);
        }
    });

    runner.run().await;
    Ok(())
}
