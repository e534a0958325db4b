//! Coordination with the external indexing pipeline.
//!
//! The pipeline tails the metadata store and feeds a search index. Some
//! migrations have to stop it, flip it into reindex mode through its config
//! file, restart it and wait until its queue table is empty.

pub mod config_file;
pub mod service;

use std::thread;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::validate_identifier;
use crate::error::{MigratorError, Result};
pub use config_file::rewrite_config_file;
pub use service::ServicePipeline;

/// Lifecycle operations on the indexing pipeline.
pub trait IndexingPipeline {
    fn stop(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    /// Switches reindex mode on or off for the next start.
    fn set_reindex(&self, enabled: bool) -> Result<()>;
}

/// Number of events the pipeline still has to process.
pub trait QueueProbe {
    fn pending(&self) -> Result<u64>;
}

/// Counts rows of the pipeline's queue table.
pub struct SqlQueueProbe<'c> {
    conn: &'c Connection,
    count_sql: String,
}

impl<'c> SqlQueueProbe<'c> {
    pub fn new(conn: &'c Connection, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            conn,
            count_sql: format!("SELECT COUNT(*) FROM {}", table),
        })
    }
}

impl QueueProbe for SqlQueueProbe<'_> {
    fn pending(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(&self.count_sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Polls `probe` every `poll_interval` until it reports nothing pending.
///
/// Fails with a pipeline error once `timeout` has elapsed.
pub fn wait_for_drain(
    probe: &dyn QueueProbe,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let pending = probe.pending()?;
        if pending == 0 {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "pipeline queue drained");
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(MigratorError::Pipeline(format!(
                "queue still has {} pending events after {:?}",
                pending, timeout
            )));
        }
        debug!(pending, "waiting for pipeline queue to drain");
        thread::sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct CountdownProbe {
        remaining: Cell<u64>,
        polls: Cell<u32>,
    }

    impl QueueProbe for CountdownProbe {
        fn pending(&self) -> Result<u64> {
            self.polls.set(self.polls.get() + 1);
            let current = self.remaining.get();
            self.remaining.set(current.saturating_sub(10));
            Ok(current)
        }
    }

    #[test]
    fn test_wait_for_drain_polls_until_empty() {
        let probe = CountdownProbe {
            remaining: Cell::new(30),
            polls: Cell::new(0),
        };
        wait_for_drain(&probe, Duration::from_millis(1), Duration::from_secs(5)).unwrap();
        assert_eq!(probe.polls.get(), 4);
    }

    #[test]
    fn test_wait_for_drain_times_out() {
        struct Stuck;
        impl QueueProbe for Stuck {
            fn pending(&self) -> Result<u64> {
                Ok(3)
            }
        }

        let err = wait_for_drain(&Stuck, Duration::from_millis(1), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, MigratorError::Pipeline(_)));
    }

    #[test]
    fn test_sql_queue_probe() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE hdfs_metadata_log (id INTEGER); INSERT INTO hdfs_metadata_log VALUES (1), (2);",
        )
        .unwrap();

        let probe = SqlQueueProbe::new(&conn, "hdfs_metadata_log").unwrap();
        assert_eq!(probe.pending().unwrap(), 2);

        conn.execute("DELETE FROM hdfs_metadata_log", []).unwrap();
        assert_eq!(probe.pending().unwrap(), 0);

        assert!(SqlQueueProbe::new(&conn, "log; DROP TABLE x").is_err());
    }
}
