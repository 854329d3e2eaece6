use std::time::Duration;

/// Config change notifications this close to the last reload are dropped.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

/// Progress log interval while a reload waits for active repos to go idle.
pub const QUIESCE_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Progress log interval while shutdown drains in-flight syncs.
pub const DRAIN_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Pending jobs the dispatcher queue holds before `submit` waits.
pub const JOB_QUEUE_CAPACITY: usize = 100;
