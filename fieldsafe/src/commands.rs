//! Subcommand implementations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fieldsafe_core::connectivity::ConnectivityMonitor;
use fieldsafe_core::delivery::{self, DeliveryClient};
use fieldsafe_core::sync::{
    EventSyncService, SafetyReporter, SyncReport, REPORT_PENDING_STATUS, SOS_PENDING_STATUS,
};
use fieldsafe_core::{Config, DurableQueueStore, EventKind, GeoPoint, QueueDatabase};

/// Everything a submitting command needs
struct Session {
    db: Arc<QueueDatabase>,
    client: Arc<dyn DeliveryClient>,
    service: Arc<EventSyncService>,
}

impl Session {
    /// Open the queue, build the client and probe connectivity
    async fn open(config: &Config, force_offline: bool) -> Result<Self> {
        let db = Arc::new(open_database()?);
        let client =
            delivery::client_for(&config.endpoint).context("failed to create delivery client")?;

        let connectivity = ConnectivityMonitor::new(false);
        if !force_offline {
            connectivity.refresh_from(client.as_ref()).await;
        }
        tracing::info!(online = connectivity.is_online(), "Connectivity probed");

        let service = Arc::new(
            EventSyncService::new(db.clone(), client.clone(), connectivity)
                .with_max_concurrency(config.sync.max_concurrency),
        );

        Ok(Self {
            db,
            client,
            service,
        })
    }

    fn reporter(&self, config: &Config) -> SafetyReporter {
        SafetyReporter::new(self.service.clone(), config.reporter.user_id.clone())
    }

    /// Replay the backlog when online; runs after the command's own event
    async fn startup_sync(&self) {
        match self.service.sync_if_online().await {
            Ok(report) if report.total_attempted() > 0 => {
                tracing::info!(
                    delivered = report.total_delivered(),
                    failed = report.total_failed(),
                    "Startup sync finished"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Startup sync failed"),
        }
    }
}

fn open_database() -> Result<QueueDatabase> {
    let db_path = Config::database_path();
    tracing::debug!(path = %db_path.display(), "Opening queue database");

    let db = QueueDatabase::open(&db_path).context("failed to open queue database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(db)
}

pub async fn status(config: &Config) -> Result<()> {
    println!("fieldsafe Status");
    println!("================");
    println!();

    let endpoint = &config.endpoint;
    println!(
        "Endpoint:        {}",
        endpoint.server_url.as_deref().unwrap_or("<not set>")
    );
    println!(
        "API Key:         {}",
        if endpoint.api_key.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    println!("Timeout:         {}s", endpoint.timeout_secs);
    println!("Concurrency:     {}", config.sync.max_concurrency);
    println!("User ID:         {}", config.reporter.user_id);
    println!("Database:        {}", Config::database_path().display());

    if endpoint.is_ready() {
        let client = delivery::client_for(endpoint)?;
        let reachable = client.health_check().await.unwrap_or(false);
        println!(
            "Reachable:       {}",
            if reachable { "yes" } else { "no" }
        );
    } else {
        println!();
        println!("No endpoint configured; every event is queued. Set one in config.toml:");
        println!();
        println!("  [endpoint]");
        println!("  server_url = \"https://safety.example.org\"");
    }

    let db = open_database()?;
    println!();
    println!("Pending:");
    for kind in EventKind::ALL {
        println!("  {:<14} {}", format!("{}:", kind.display_name()), db.len(kind)?);
    }

    Ok(())
}

pub async fn sos(config: &Config, location: Option<(f64, f64)>, offline: bool) -> Result<()> {
    let location = location
        .map(|(lat, lon)| GeoPoint::new(lat, lon))
        .transpose()
        .context("invalid location")?;

    let session = Session::open(config, offline).await?;

    // The alert goes out (or is queued) before any backlog replay
    println!("{}", SOS_PENDING_STATUS);
    let status = session
        .reporter(config)
        .panic_alert(location)
        .await
        .context("failed to record alert")?;
    println!("{}", status);

    session.startup_sync().await;

    Ok(())
}

pub async fn report(config: &Config, text: &str, offline: bool) -> Result<()> {
    let session = Session::open(config, offline).await?;

    println!("{}", REPORT_PENDING_STATUS);
    let status = session
        .reporter(config)
        .submit_report(text)
        .await
        .context("failed to record report")?;
    println!("{}", status);

    session.startup_sync().await;

    Ok(())
}

pub async fn sync(config: &Config) -> Result<()> {
    let session = Session::open(config, false).await?;

    if !session.service.connectivity().is_online() {
        let pending: usize = EventKind::ALL
            .iter()
            .map(|kind| session.db.len(*kind))
            .sum::<fieldsafe_core::Result<usize>>()?;
        println!("Endpoint unreachable (offline). {} event(s) remain queued.", pending);
        return Ok(());
    }

    let report = session.service.sync().await.context("sync failed")?;
    print_sync_report(&report);

    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!("Sync complete:");
    for outcome in &report.queues {
        let result = if outcome.attempted == 0 {
            "nothing queued"
        } else if outcome.cleared {
            "cleared"
        } else {
            "kept (will retry)"
        };
        println!(
            "  {:<12} {} sent, {} failed, {}",
            format!("{}:", outcome.kind.display_name()),
            outcome.delivered,
            outcome.failed,
            result
        );
    }
}

pub fn queue(kind: Option<EventKind>) -> Result<()> {
    let db = open_database()?;
    let kinds: Vec<EventKind> = match kind {
        Some(kind) => vec![kind],
        None => EventKind::ALL.to_vec(),
    };

    for kind in kinds {
        let items = db.read_all(kind)?;
        println!("# {} ({})", kind.display_name(), items.len());
        for item in items {
            println!("{}", serde_json::to_string(&item)?);
        }
    }

    Ok(())
}

pub fn purge(kind: EventKind, yes: bool) -> Result<()> {
    let db = open_database()?;
    let pending = db.len(kind)?;

    if pending == 0 {
        println!("{} queue is already empty.", kind.display_name());
        return Ok(());
    }

    if !yes {
        bail!(
            "refusing to discard {} queued {} event(s) without --yes",
            pending,
            kind
        );
    }

    db.clear(kind)?;
    tracing::warn!(kind = %kind, discarded = pending, "Queue purged");
    println!("Discarded {} queued {} event(s).", pending, kind);

    Ok(())
}

pub async fn watch(config: &Config, poll_override: Option<u64>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let poll_ms = poll_override.unwrap_or(config.sync.probe_interval_ms).max(100);
    let session = Session::open(config, false).await?;
    let connectivity = session.service.connectivity().clone();

    println!(
        "Watch mode active (probe every {}ms, currently {}). Press Ctrl+C to stop.",
        poll_ms,
        if connectivity.is_online() { "online" } else { "offline" }
    );

    let initial = session.service.sync_if_online().await.context("startup sync failed")?;
    if initial.total_attempted() > 0 {
        print_sync_report(&initial);
    }

    let sync_task = session.service.spawn_reconnect_sync();
    let poll = Duration::from_millis(poll_ms);

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(poll).await;

        let was_online = connectivity.is_online();
        let online = connectivity.refresh_from(session.client.as_ref()).await;
        if online != was_online {
            let timestamp = chrono::Local::now().format("%H:%M:%S");
            println!(
                "[{}] {}",
                timestamp,
                if online { "Online, syncing queued events" } else { "Offline, queueing" }
            );
        }
    }

    sync_task.abort();
    println!("Watch mode stopped.");
    tracing::info!(stats = ?session.service.stats(), "fieldsafe watch mode stopped");

    Ok(())
}
