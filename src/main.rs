//! ssh-batch - entry point
//!
//! Parses CLI arguments, loads the hosts file, runs the batch under the
//! orchestrator, and streams transcripts to stdout while the run is live.
//! Ctrl+C / SIGTERM set the cooperative stop flag: queued hosts are marked
//! stopped, in-flight sessions finish naturally.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ssh_batch::ansi::{AnsiRenderer, Span};
use ssh_batch::config::{Args, RunConfig};
use ssh_batch::error::Result;
use ssh_batch::events::Event;
use ssh_batch::hosts::load_hosts;
use ssh_batch::orchestrator::{Orchestrator, TaskStateStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging to stderr; stdout carries transcripts
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Arc::new(RunConfig::from_args(&args)?);
    let hosts = load_hosts(&args.hosts)?;

    info!("ssh-batch v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "{} host(s), {} command(s), max {} in parallel, timeout {}s",
        hosts.len(),
        config.commands.len(),
        config.max_threads,
        config.timeout.as_secs()
    );

    let (orchestrator, mut rx) = Orchestrator::new(config);
    let stop = orchestrator.stop_handle();

    // Cooperative cancellation on Ctrl+C or SIGTERM
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, stopping new dispatch...");
            }
            _ = async {
                #[cfg(unix)]
                {
                    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(mut sigterm) => { sigterm.recv().await; }
                        Err(_) => std::future::pending::<()>().await,
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("received SIGTERM, stopping new dispatch...");
            }
        }
        stop.store(true, Ordering::SeqCst);
    });

    let run_handle = tokio::spawn(async move { orchestrator.run(hosts).await });

    // Single consumer: owns all task state, prints transcripts as they come
    let mut store = TaskStateStore::new();
    let mut renderers: HashMap<String, AnsiRenderer> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match &event {
            Event::Log(log) => {
                let renderer = renderers.entry(log.host.clone()).or_default();
                let spans = renderer.render(&log.text);
                println!(
                    "[{}] {}: {}",
                    log.timestamp.format("%H:%M:%S"),
                    log.host,
                    format_spans(&spans, !args.no_color)
                );
            }
            Event::Status { host, status } => {
                if status.is_terminal() {
                    info!("{} -> {}", host, status);
                }
            }
            Event::Progress { completed, total } => {
                info!("progress: {}/{}", completed, total);
            }
            Event::Done => {
                store.apply(&event);
                break;
            }
        }
        store.apply(&event);
    }

    let _ = run_handle.await;
    signal_handle.abort();

    // Final per-host summary
    let mut summary: Vec<_> = store.iter().collect();
    summary.sort_by(|a, b| a.0.cmp(b.0));
    println!("\n=== run summary ===");
    for (host, task) in summary {
        println!("{}\t{}", host, task.status);
    }

    Ok(())
}

/// Reassemble spans for terminal output. With color enabled, styles are
/// re-emitted as clean SGR sequences (everything the renderer discarded,
/// like line clears, stays gone); otherwise plain text only.
fn format_spans(spans: &[Span], color: bool) -> String {
    let mut out = String::new();
    for span in spans {
        if color && !span.style.is_plain() {
            let mut params = Vec::new();
            if span.style.bold {
                params.push("1".to_string());
            }
            if let Some(fg) = span.style.fg {
                params.push(fg.sgr().to_string());
            }
            out.push_str(&format!("\x1b[{}m{}\x1b[0m", params.join(";"), span.text));
        } else {
            out.push_str(&span.text);
        }
    }
    out
}
