/// Offer Watch - Main entry point
/// Replays a captured trade feed through the reload loop and prints alerts

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use offer_watch::api::start_api_server;
use offer_watch::config::reloadable::ReloadableSettings;
use offer_watch::config::store::{DEFAULT_SETTINGS_FILE, SettingsStore};
use offer_watch::feed::FileFeed;
use offer_watch::models::{Note, NoteLevel};
use offer_watch::poll::PollReport;
use offer_watch::runtime::{DisplaySink, Monitor};
use offer_watch::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "offer_watch", about = "Watches incoming trade offers and alerts on worthwhile bundles")]
struct Args {
    /// Settings file (created on first save, defaults used when missing)
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Directory holding trades_page_N.json and outgoing.json
    #[arg(long, default_value = "feed")]
    feed_dir: PathBuf,

    /// Run a single reload cycle and exit
    #[arg(long)]
    once: bool,

    /// Serve the status API on this port (implies API_ENABLED)
    #[arg(long)]
    api_port: Option<u16>,
}

// ============================================================================
// Console sinks
// ============================================================================

/// Prints each poll's alerts to stdout
struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn render(&self, report: &PollReport) {
        if let Some(title) = &report.effects.set_title {
            println!("\n=== {} ===", title);
        }
        for alert in &report.alerts {
            let marker = if alert.show_new_marker { "*" } else { " " };
            println!("{} {:>6}  {}", marker, alert.value, alert.message);
        }
        for warning in &report.point_warnings {
            println!("  ! {}", warning);
        }
        if let Some(sound) = &report.effects.play_sound {
            println!("\x07[sound: {}]", sound);
        }
        if let Some(notification) = &report.effects.show_notification {
            println!("[notify] {}", notification.text);
        }
        println!(
            "Total: {} visible, {} filtered, {} alerts ({} new)",
            report.visible_count,
            report.filtered_count,
            report.alerts.len(),
            report.new_count
        );
    }

    fn note(&self, note: &Note) {
        match note.level {
            NoteLevel::Warning => eprintln!("{}", note.text),
            NoteLevel::Muted => tracing::debug!("{}", note.text),
            NoteLevel::Info | NoteLevel::Success => println!("{}", note.text),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Command-line flags win over the file and the environment, on reload too
    let api_port = args.api_port;
    let cli_overrides = move |mut settings: Settings| {
        if let Some(port) = api_port {
            settings.api_enabled = true;
            settings.api_port = port;
        }
        settings
    };

    let store = SettingsStore::new(&args.settings);
    let settings = cli_overrides(
        store
            .load()
            .with_context(|| format!("Failed to load settings from {}", args.settings.display()))?
            .apply_env_overrides(),
    );

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let api_config = settings.api_config();
    let reloadable = ReloadableSettings::with_store(settings, store).with_overrides(cli_overrides);

    let feed = FileFeed::new(&args.feed_dir);
    let blocking = feed.modal_signal();
    tracing::info!(feed_dir = %feed.dir().display(), "using file feed");

    let (monitor, handle) = Monitor::new(Arc::new(feed), reloadable.clone());
    let monitor = monitor
        .with_blocking(Box::new(blocking))
        .with_display(Box::new(ConsoleDisplay))
        .once(args.once);

    // Start HTTP API server (if enabled)
    if api_config.enabled {
        let port = api_config.port;
        match start_api_server(api_config, monitor.status(), Some(reloadable.clone())).await {
            Ok(_handle) => {
                println!("HTTP API server started on http://127.0.0.1:{}", port);
                println!("  - GET /health - Health check");
                println!("  - GET /alerts?new_only=true&limit=N - Alerts from the last poll");
                println!("  - GET /stats - Session statistics");
                println!("  - POST /reload - Reload settings file");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start API server");
            }
        }
    }

    // Spawn SIGHUP handler for settings reload (Unix only)
    #[cfg(unix)]
    {
        let reloadable_sighup = reloadable.clone();
        let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("Failed to register SIGHUP handler")?;
        tokio::spawn(async move {
            loop {
                sighup.recv().await;
                tracing::info!("received SIGHUP, reloading settings");
                match reloadable_sighup.reload().await {
                    Ok(true) => tracing::info!("settings reloaded, applied at next cycle"),
                    Ok(false) => tracing::info!("settings unchanged"),
                    Err(e) => tracing::error!(error = %e, "failed to reload settings"),
                }
            }
        });
        tracing::debug!(pid = std::process::id(), "SIGHUP handler registered");
    }

    // Spawn signal handler for graceful shutdown
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            println!("\nReceived shutdown signal, shutting down...");
            if let Err(e) = handle.shutdown() {
                tracing::warn!(error = %e, "monitor already stopped");
            }
        }
    });

    let stats = monitor.run().await;
    tracing::info!(
        polls = stats.polls,
        alerted_offers = stats.alerted_offers,
        "session finished"
    );
    Ok(())
}
