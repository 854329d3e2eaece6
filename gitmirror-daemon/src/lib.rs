//! gitmirror daemon: webhook ingress, job dispatch, config hot reload and
//! graceful shutdown around the sync engine.

pub mod context;
pub mod dispatcher;
mod error;
pub mod logging;
pub mod reload;
mod runtime;
pub mod shutdown;
pub mod timing;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use context::AppContext;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use error::DaemonError;
pub use logging::LogHandle;
pub use reload::{ConfigCoordinator, ReloadOutcome};
pub use runtime::{run, serve, start_blocking};
