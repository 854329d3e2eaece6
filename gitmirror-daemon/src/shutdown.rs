//! Graceful drain on SIGINT/SIGTERM.
//!
//! In-flight syncs are never cancelled. After a termination signal the
//! daemon waits for every repository of the active configuration to go idle
//! and only then broadcasts shutdown to the other tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::context::AppContext;
use crate::error::{io_err, DaemonError};
use crate::timing::DRAIN_LOG_INTERVAL;

/// Resolve on the first SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn termination_signal() -> Result<&'static str, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| io_err("SIGINT handler", e))?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
pub async fn termination_signal() -> Result<&'static str, DaemonError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| io_err("ctrl-c handler", e))?;
    Ok("ctrl-c")
}

/// Block until no repository of the current configuration is busy.
pub async fn drain(ctx: &AppContext, interval: Duration) {
    let config = ctx.config().await;
    ctx.status()
        .wait_idle(
            &config.repos.paths(),
            interval,
            "waiting for all repo updates to finish before exiting",
        )
        .await;
}

/// Wait for `signal`, drain, then tell every other task to stop.
///
/// Returns early without draining if shutdown was already broadcast by
/// another task.
pub async fn shutdown_task<F>(
    ctx: &AppContext,
    signal: F,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError>
where
    F: Future<Output = Result<&'static str, DaemonError>>,
{
    shutdown_with_interval(ctx, signal, shutdown_tx, DRAIN_LOG_INTERVAL).await
}

async fn shutdown_with_interval<F>(
    ctx: &AppContext,
    signal: F,
    shutdown_tx: broadcast::Sender<()>,
    interval: Duration,
) -> Result<(), DaemonError>
where
    F: Future<Output = Result<&'static str, DaemonError>>,
{
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = signal => {
            let name = signal?;
            tracing::info!(signal = name, "received termination signal, draining");
            drain(ctx, interval).await;
            tracing::info!("all repos idle, shutting down");
            let _ = shutdown_tx.send(());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    use tempfile::TempDir;

    use crate::test_support::{context_at, hold_busy};

    const ONE_REPO: &str = "\
repos:
  - url: git@github.com:acme/site.git
    path: /site
    directory: /srv/site
";

    #[tokio::test]
    async fn signal_while_busy_delays_shutdown_until_idle() {
        let dir = TempDir::new().unwrap();
        let (ctx, _queue) = context_at(&dir, ONE_REPO);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
        let guard = hold_busy(&ctx, "/site");

        let task = tokio::spawn({
            let ctx = ctx.clone();
            let shutdown_tx = shutdown_tx.clone();
            async move {
                shutdown_with_interval(
                    &ctx,
                    ready(Ok("SIGTERM")),
                    shutdown_tx,
                    Duration::from_millis(10),
                )
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(shutdown_rx.try_recv().is_err(), "no shutdown while /site is busy");
        assert!(!task.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("drained")
            .unwrap()
            .unwrap();
        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn idle_daemon_shuts_down_immediately() {
        let dir = TempDir::new().unwrap();
        let (ctx, _queue) = context_at(&dir, ONE_REPO);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);

        shutdown_task(&ctx, ready(Ok("SIGINT")), shutdown_tx)
            .await
            .unwrap();

        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_from_elsewhere_skips_the_drain() {
        let dir = TempDir::new().unwrap();
        let (ctx, _queue) = context_at(&dir, ONE_REPO);
        let (shutdown_tx, _) = broadcast::channel(4);
        let _guard = hold_busy(&ctx, "/site");

        let task = tokio::spawn({
            let ctx = ctx.clone();
            let shutdown_tx = shutdown_tx.clone();
            async move {
                shutdown_task(&ctx, std::future::pending(), shutdown_tx).await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = shutdown_tx.send(());

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("stopped")
            .unwrap()
            .unwrap();
    }
}
