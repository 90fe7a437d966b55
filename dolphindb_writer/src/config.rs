//! Writer configuration, usable both as a CLI/env config block and through a builder.

use std::time::Duration;

use secrecy::{ExposeSecret, Secret};

use dolphindb_client::{Credentials, TableHandle};
use dolphindb_partition::RouterError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the worker count must be greater than or equal to 1")]
    ZeroWorkers,

    #[error("the batch size must be greater than or equal to 1")]
    ZeroBatchSize,

    #[error("the throttle interval must be greater than 0")]
    ZeroThrottle,

    #[error("a table name must be specified")]
    MissingTable,

    #[error("a partition column must be specified when the worker count is greater than 1")]
    PartitionColumnRequired,

    #[error("the settings do not fit the partitioning of the table: {0}")]
    Partitioning(#[from] RouterError),
}

/// CLI config for a partitioned table writer.
#[derive(Debug, Clone, clap::Parser)]
pub struct WriterConfig {
    /// Address of the server to write to, as `host:port`.
    #[clap(
        long = "address",
        env = "DOLPHINDB_ADDRESS",
        default_value = "localhost:8848",
        action
    )]
    pub address: String,

    /// User to log in as.
    #[clap(long = "user", env = "DOLPHINDB_USER", default_value = "admin", action)]
    pub user_id: String,

    /// Password of the user.
    #[clap(long = "password", env = "DOLPHINDB_PASSWORD", action)]
    pub password: Option<Secret<String>>,

    /// Database holding the table, e.g. `dfs://valuedb`. Leave empty for a shared in-memory table.
    #[clap(
        long = "database",
        env = "DOLPHINDB_DATABASE",
        default_value = "",
        action
    )]
    pub database: String,

    /// Table to write to.
    #[clap(long = "table", env = "DOLPHINDB_TABLE", action)]
    pub table_name: String,

    /// Column used to pick the worker for each row.
    ///
    /// Required when more than one worker is used. For a partitioned table it must be one of the
    /// table's partitioning columns.
    #[clap(long = "partition-column", env = "DOLPHINDB_PARTITION_COLUMN", action)]
    pub partition_column: Option<String>,

    /// Number of workers, each writing through its own connection.
    #[clap(
        long = "worker-count",
        env = "DOLPHINDB_WRITER_WORKER_COUNT",
        default_value = "1",
        action
    )]
    pub worker_count: usize,

    /// Number of buffered rows that triggers a write.
    #[clap(
        long = "batch-size",
        env = "DOLPHINDB_WRITER_BATCH_SIZE",
        default_value = "10000",
        action
    )]
    pub batch_size: usize,

    /// Longest time buffered rows wait before they are written, whatever their number.
    #[clap(
        long = "throttle",
        env = "DOLPHINDB_WRITER_THROTTLE",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    pub throttle: Duration,
}

impl WriterConfig {
    /// A single-worker config writing to `table_name` on the server at `address`, with every other
    /// setting at its default.
    pub fn new(address: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user_id: "admin".to_string(),
            password: None,
            database: String::new(),
            table_name: table_name.into(),
            partition_column: None,
            worker_count: 1,
            batch_size: 10_000,
            throttle: Duration::from_secs(1),
        }
    }

    pub fn with_credentials(
        mut self,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user_id = user_id.into();
        self.password = Some(Secret::new(password.into()));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = Some(column.into());
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Check the settings that need no server to validate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.throttle.is_zero() {
            return Err(ConfigError::ZeroThrottle);
        }
        if self.table_name.is_empty() {
            return Err(ConfigError::MissingTable);
        }
        if self.worker_count > 1 && self.partition_column.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::PartitionColumnRequired);
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret().clone())
            .unwrap_or_default();
        Credentials::new(self.user_id.clone(), password)
    }

    pub fn table(&self) -> TableHandle {
        TableHandle::new(self.database.clone(), self.table_name.clone())
    }

    /// The partition column, treating an empty name as none.
    pub fn partition_column(&self) -> Option<&str> {
        self.partition_column.as_deref().filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_flags() {
        let config = WriterConfig::try_parse_from([
            "writer",
            "--address",
            "10.0.0.1:8902",
            "--user",
            "writer",
            "--password",
            "s3cret",
            "--database",
            "dfs://valuedb",
            "--table",
            "pt",
            "--partition-column",
            "sym",
            "--worker-count",
            "4",
            "--batch-size",
            "500",
            "--throttle",
            "250ms",
        ])
        .unwrap();
        assert_eq!(config.address, "10.0.0.1:8902");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.throttle, Duration::from_millis(250));
        assert_eq!(config.partition_column(), Some("sym"));
        assert_eq!(config.table().to_string(), "loadTable(\"dfs://valuedb\", \"pt\")");
        assert!(config.credentials().matches("writer", "s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn defaults() {
        let config = WriterConfig::try_parse_from(["writer", "--table", "t"]).unwrap();
        assert_eq!(config.address, "localhost:8848");
        assert_eq!(config.user_id, "admin");
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.throttle, Duration::from_secs(1));
        assert_eq!(config.table(), TableHandle::in_memory("t"));
        assert!(config.credentials().matches("admin", ""));
    }

    #[test]
    fn validation() {
        let config = WriterConfig::new("localhost:8848", "t");
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.clone().with_worker_count(0).validate(),
            Err(ConfigError::ZeroWorkers)
        );
        assert_eq!(
            config.clone().with_batch_size(0).validate(),
            Err(ConfigError::ZeroBatchSize)
        );
        assert_eq!(
            config.clone().with_throttle(Duration::ZERO).validate(),
            Err(ConfigError::ZeroThrottle)
        );
        assert_eq!(
            config.clone().with_worker_count(2).validate(),
            Err(ConfigError::PartitionColumnRequired)
        );
        assert_eq!(
            config
                .clone()
                .with_worker_count(2)
                .with_partition_column("")
                .validate(),
            Err(ConfigError::PartitionColumnRequired)
        );
        assert_eq!(
            WriterConfig::new("localhost:8848", "").validate(),
            Err(ConfigError::MissingTable)
        );
    }
}
