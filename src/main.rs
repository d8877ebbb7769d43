use anyhow::Result;
use clap::Parser;
use rs_dashstream::{
    EventClient, cli::Args, config::Config, events::create_event_channel,
    formatter::FrameFormatter, monitoring::setup_metrics, tracing_setup::setup_tracing,
    ui::UIController,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::{sync::mpsc, time::Instant};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs, !args.no_color)?;
    info!(
        "Starting dashboard event stream v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(Config::from_args(&args)?);

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let (event_sender, event_receiver) = create_event_channel();
    let client = EventClient::with_websocket(config.clone(), event_sender)?;

    let display = config.display.clone();
    let mut ui = UIController::new(event_receiver, display.colored, display.quiet);
    let ui_task = tokio::spawn(async move { ui.run().await });

    let formatter = Arc::new(Mutex::new(FrameFormatter::new(
        display.format.clone(),
        display.colored,
        display.quiet,
    )));
    formatter
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .print_header();

    let (limit_tx, mut limit_rx) = mpsc::unbounded_channel::<()>();
    let subscriptions: Vec<_> = display
        .categories
        .iter()
        .map(|&category| {
            let formatter = formatter.clone();
            let limit_tx = limit_tx.clone();
            let max_frames = display.max_frames;
            client.subscribe_fn(category, move |payload| {
                let mut formatter = formatter.lock().unwrap_or_else(PoisonError::into_inner);
                if max_frames.is_some_and(|max| formatter.frame_count() >= max) {
                    return;
                }
                formatter.print_frame(category, payload);
                if max_frames.is_some_and(|max| formatter.frame_count() >= max) {
                    let _ = limit_tx.send(());
                }
            })
        })
        .collect();

    info!(
        "Subscribed to {} categories. Press Ctrl+C to shutdown...",
        subscriptions.len()
    );
    let started = Instant::now();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        _ = limit_rx.recv() => info!("Reached configured max frames"),
    }

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    client.disconnect();

    let health = client.health().await;
    info!(health = %health.to_json(), "Final client health");

    // last handle gone: the supervisor closes up and the UI loop drains
    drop(client);
    let notices = ui_task.await.unwrap_or_default();

    formatter
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .print_summary(started.elapsed().as_secs());
    info!(notices, "Client stopped successfully");
    Ok(())
}
