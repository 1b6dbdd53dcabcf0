use std::{
    io::Read as _,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use camwatch::{
    backend::BackendClient,
    delivery::DeliveryAgent,
    desktop::{DesktopNotifier, SystemBrowser},
    diagnostics::SocketDiagnostics,
    feed::{FeedSynchronizer, FeedView},
    settings::{read_settings, save_settings, settings_path, SettingsUpdate, StoredSettings},
    stream::EventsSocket,
    FeedSnapshot,
};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "camwatch", version, about = "Security camera event feed and push notification client")]
struct Cli {
    /// Server URL, overriding the stored setting.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Settings file to use instead of the per-user default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the event list, refreshing on every server signal.
    Watch {
        /// List every event, not only classified ones.
        #[arg(long, conflicts_with = "classified")]
        all: bool,
        /// List only events with a detection.
        #[arg(long)]
        classified: bool,
    },
    /// Render a push payload (from FILE or stdin) as a desktop notification.
    Render {
        file: Option<PathBuf>,
        /// Seconds to wait for a click on the notification.
        #[arg(long, default_value_t = 0)]
        wait: u64,
    },
    /// List subscriptions known to the server's registry.
    Subscriptions,
    /// Ask the server to send a test push to every subscription.
    PushTest,
    /// Show or update stored settings.
    Config {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        only_classified: Option<bool>,
        #[arg(long)]
        live_route: Option<String>,
        #[arg(long)]
        retry_attempts: Option<u32>,
        #[arg(long)]
        retry_backoff_ms: Option<u64>,
        #[arg(long)]
        desktop_notifications: Option<bool>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => settings_path()?,
    };
    let settings = read_settings(&path)?;
    log::debug!("camwatch starting (pid={}) settings={path:?}", std::process::id());

    match cli.command {
        Command::Watch { all, classified } => {
            let only_classified = if all {
                false
            } else {
                classified || settings.only_classified
            };
            watch_feed(&settings, cli.server.as_deref(), only_classified).await
        }
        Command::Render { file, wait } => {
            render_payload(&settings, cli.server.as_deref(), file.as_deref(), wait).await
        }
        Command::Subscriptions => list_subscriptions(&settings, cli.server.as_deref()).await,
        Command::PushTest => {
            let client = BackendClient::new(settings.server(cli.server.as_deref())?);
            client
                .push_test()
                .await
                .context("server refused the test push")?;
            println!("Test push requested from {}", client.base_url());
            Ok(())
        }
        Command::Config {
            base_url,
            only_classified,
            live_route,
            retry_attempts,
            retry_backoff_ms,
            desktop_notifications,
        } => {
            let update = SettingsUpdate {
                base_url,
                only_classified,
                live_route,
                registry_retry_attempts: retry_attempts,
                registry_retry_backoff_ms: retry_backoff_ms,
                desktop_notifications,
            };
            configure(&path, &settings, update)
        }
    }
}

async fn watch_feed(
    settings: &StoredSettings,
    server: Option<&str>,
    only_classified: bool,
) -> Result<()> {
    let base_url = settings.server(server)?;
    let client = Arc::new(BackendClient::new(base_url.clone()));
    let feed = FeedSynchronizer::new(client, only_classified);
    let diagnostics = Arc::new(SocketDiagnostics::default());

    let (signal_tx, mut signal_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let socket = EventsSocket::new(&base_url, signal_tx, diagnostics.clone())
        .map_err(anyhow::Error::msg)
        .context("cannot open the events socket")?;
    let socket_task = tokio::spawn(socket.run(stop_rx));

    log::info!(
        "watching {base_url} ({})",
        if only_classified { "classified events" } else { "all events" }
    );
    feed.refresh().await;
    print_feed(&feed.view());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = signal_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                feed.refresh().await;
                print_feed(&feed.view());
            }
        }
    }

    let _ = stop_tx.send(true);
    if let Err(error) = socket_task.await {
        log::warn!("events socket task failed: {error}");
    }
    let snapshot = diagnostics.snapshot();
    log::info!(
        "stopped after {} connection(s), {} signal(s)",
        snapshot.connections,
        snapshot.signals_received
    );
    if let Ok(json) = serde_json::to_string(&snapshot) {
        log::debug!("socket diagnostics: {json}");
    }
    Ok(())
}

fn print_feed(view: &FeedView) {
    let Some(snapshot) = view.snapshot.as_ref() else {
        println!("{} no events loaded yet", now_label());
        return;
    };
    println!("{} {}", now_label(), feed_summary(snapshot));
    for item in snapshot.items.iter().take(5) {
        let detection = item
            .detection
            .as_ref()
            .map(|detection| {
                format!(
                    "{} {:.0}%",
                    detection.class,
                    detection.confidence * 100.0
                )
            })
            .unwrap_or_else(|| "unclassified".to_string());
        println!(
            "  {} {} {}s {detection}",
            format_timestamp(item.timestamp),
            item.id,
            item.duration_sec
        );
    }
}

fn feed_summary(snapshot: &FeedSnapshot) -> String {
    format!(
        "{} events, {:.1} MiB, oldest {}",
        snapshot.items_count,
        snapshot.items_total_size as f64 / (1024.0 * 1024.0),
        format_timestamp(snapshot.oldest_timestamp)
    )
}

fn format_timestamp(unix_secs: i64) -> String {
    match chrono::DateTime::from_timestamp(unix_secs, 0) {
        Some(time) if unix_secs > 0 => time
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        _ => "-".to_string(),
    }
}

fn now_label() -> String {
    chrono::Local::now().format("[%H:%M:%S]").to_string()
}

async fn render_payload(
    settings: &StoredSettings,
    server: Option<&str>,
    file: Option<&Path>,
    wait_secs: u64,
) -> Result<()> {
    let payload = match file {
        Some(path) => std::fs::read(path).with_context(|| format!("failed to read {path:?}"))?,
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read payload from stdin")?;
            buffer
        }
    };

    let (click_tx, mut click_rx) = mpsc::unbounded_channel();
    let notifier = DesktopNotifier::new(settings.desktop_notifications, Some(click_tx));
    let agent = DeliveryAgent::new(
        Arc::new(notifier),
        Arc::new(SystemBrowser),
        settings.server(server)?,
        settings.live_route.clone(),
    );

    let Some(shown) = agent.handle_push(&payload) else {
        bail!("payload is not a detection event");
    };
    println!("{}\n{}\n{}", shown.title, shown.body, shown.image);

    if wait_secs > 0 {
        match tokio::time::timeout(Duration::from_secs(wait_secs), click_rx.recv()).await {
            Ok(Some(camwatch::delivery::AgentEvent::Click(tag))) => agent.handle_click(&tag).await,
            Ok(_) => {}
            Err(_) => log::info!("no click within {wait_secs}s"),
        }
    }
    Ok(())
}

async fn list_subscriptions(settings: &StoredSettings, server: Option<&str>) -> Result<()> {
    let client = BackendClient::new(settings.server(server)?);
    let records = client
        .subscriptions()
        .await
        .context("failed to list subscriptions")?;
    if records.is_empty() {
        println!("No subscriptions registered at {}", client.base_url());
        return Ok(());
    }

    for record in records {
        println!(
            "#{} {} peer={} created={} last_success={} last_failure={}",
            record.id,
            record.subscription_id,
            record.peer,
            record.created_at.as_deref().unwrap_or("-"),
            record.last_success.as_deref().unwrap_or("-"),
            record.last_failure.as_deref().unwrap_or("-"),
        );
        if !record.last_failure_message.is_empty() {
            println!("    {}", record.last_failure_message);
        }
    }
    Ok(())
}

fn configure(path: &Path, current: &StoredSettings, update: SettingsUpdate) -> Result<()> {
    if update.is_empty() {
        println!("# {}", path.display());
        println!("{}", serde_json::to_string_pretty(current)?);
        return Ok(());
    }

    let next = update.apply(current)?;
    save_settings(path, &next)?;
    println!("Saved {}", path.display());
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}
