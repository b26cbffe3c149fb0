//! Funding monitor.
//!
//! Polls the exchange on a schedule, folds realized funding into running totals and
//! prints the derived metrics after every wake. Configuration comes from the environment.

use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use funding_monitor::*;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(class = err.class(), error = %err, "funding monitor stopped");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run() -> Result<(), MonitorError> {
    let config = MonitorConfig::from_env()?;
    let credentials = Credentials::from_env()?;
    info!(
        environment = ?config.environment,
        base_url = %config.base_url,
        schedule = ?config.schedule,
        "configuration loaded"
    );

    let transport = HttpTransport::new(config.request_timeout())?;
    let client = Arc::new(SignedRequestClient::new(transport, &config, credentials));
    if let Err(err) = client.resync_clock() {
        warn!(error = %err, "initial clock sync failed, starting with zero offset");
    }

    let log = JsonlRecordLog::new(config.record_log.clone(), config.summary_file.clone());
    let records = log.load(config.start_time.map(Timestamp::from_datetime))?;
    let mut monitor = FundingMonitor::new(client, &config, Box::new(log), Timestamp::now());
    monitor.replay(&records);
    let publisher = monitor.publisher();

    if config.run_once {
        monitor.tick(Timestamp::now())?;
        print_snapshot(&publisher.read());
        return Ok(());
    }

    let stop = StopSignal::new();
    let on_signal = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        warn!("shutdown signal received");
        on_signal.stop();
    }) {
        warn!(error = %err, "failed to install Ctrl-C handler");
    }

    let (woke_tx, woke_rx) = mpsc::channel();
    let handle = Scheduler::new(config.schedule)
        .with_stop_signal(stop.clone())
        .spawn(move |now| {
            monitor.tick_logged(now);
            let _ = woke_tx.send(());
        });

    // reader side: one print per wake, from copies only
    print_snapshot(&publisher.read());
    while !stop.is_stopped() {
        match woke_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) => print_snapshot(&publisher.read()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.join();
    info!("funding monitor shut down");
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("funding snapshot @ {}", snapshot.taken_at);
    for (key, value) in snapshot.metrics.to_pairs() {
        println!("  {key:<26} {value}");
    }
    if let Some(point) = snapshot.series.last() {
        println!(
            "  last event: net {} over {}h ({} events kept)",
            point.net.normalize(),
            point.window_hours.round_dp(4).normalize(),
            snapshot.series.len()
        );
    }
}
