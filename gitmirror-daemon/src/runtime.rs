use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use gitmirror_core::{config, Config};
use gitmirror_sync::{Git2Backend, StatusTable, SyncWorker, Syncable};

use crate::context::AppContext;
use crate::dispatcher::{self, Dispatcher};
use crate::error::{io_err, DaemonError};
use crate::logging::{self, LogHandle};
use crate::reload::{self, ConfigCoordinator};
use crate::shutdown;
use crate::webhook;

/// Load the configuration, install logging, and run the daemon on a fresh
/// multi-threaded runtime until it drains after a termination signal.
pub fn start_blocking(config_path: &Path) -> Result<(), DaemonError> {
    let config = config::load_at(config_path)?;
    let log = logging::init(&config.logging)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, config_path.to_path_buf(), log))
}

/// Run the daemon with the libgit2 backend, stopping on SIGINT/SIGTERM.
pub async fn run(config: Config, config_path: PathBuf, log: LogHandle) -> Result<(), DaemonError> {
    let status = StatusTable::new();
    let (handle, queue) = dispatcher::channel(config.threads);
    let address = config.bind_address();
    let ctx = Arc::new(AppContext::new(
        Arc::new(config),
        config_path,
        status.clone(),
        handle,
        log,
    ));
    let worker: Arc<dyn Syncable> = Arc::new(SyncWorker::new(Git2Backend, status));

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| DaemonError::Bind {
            address: address.clone(),
            source,
        })?;
    serve(ctx, queue, worker, listener, shutdown::termination_signal()).await
}

/// Drive every daemon task until `signal` resolves and in-flight work drains.
///
/// Missing checkouts are queued for cloning before the listener starts
/// accepting webhooks.
pub async fn serve<F>(
    ctx: Arc<AppContext>,
    queue: Dispatcher,
    worker: Arc<dyn Syncable>,
    listener: TcpListener,
    signal: F,
) -> Result<(), DaemonError>
where
    F: Future<Output = Result<&'static str, DaemonError>> + Send + 'static,
{
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let dispatcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = queue.run(worker, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let config = ctx.config().await;
    let clones = ctx.clone_missing(&config, config.repositories()).await?;
    tracing::info!(
        repos = config.repos.len(),
        clones,
        threads = config.threads,
        "starting gitmirror",
    );

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let coordinator = Arc::new(ConfigCoordinator::new(ctx.clone()));
        tokio::spawn(async move {
            let result = reload::watch_task(coordinator, shutdown_rx).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "config watcher stopped");
            }
            result
        })
    };

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let router = webhook::router(ctx.clone());
        let address = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        tokio::spawn(async move {
            tracing::info!(address = %address, "listening for webhooks");
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(DaemonError::Serve);
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { shutdown::shutdown_task(&ctx, signal, shutdown).await })
    };

    let (dispatcher_result, watcher_result, http_result, signal_result) = tokio::join!(
        dispatcher_handle,
        watcher_handle,
        http_handle,
        signal_handle
    );

    handle_join("dispatcher", dispatcher_result)?;
    handle_join("http_server", http_result)?;
    handle_join("signal_handler", signal_result)?;
    // A broken watcher only disables hot reload.
    if let Err(err) = handle_join("config_watcher", watcher_result) {
        tracing::warn!(error = %err, "config watcher exited with an error");
    }
    tracing::info!("gitmirror stopped");
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}
