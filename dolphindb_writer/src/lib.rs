//! Concurrent, partition-aware writer for DolphinDB tables.
//!
//! A [`TableWriter`] spreads rows over a fixed number of workers. Each worker owns one connection
//! and one buffer, and a row always goes to the worker that owns its server partition, so
//! partitions are never written concurrently from two connections.
//!
//! ```no_run
//! # async fn example(connector: std::sync::Arc<dyn dolphindb_client::Connector>) -> Result<(), Box<dyn std::error::Error>> {
//! use dolphindb_types::Value;
//! use dolphindb_writer::{TableWriter, WriterConfig};
//!
//! let config = WriterConfig::new("localhost:8848", "pt")
//!     .with_credentials("admin", "123456")
//!     .with_database("dfs://valuedb")
//!     .with_partition_column("sym")
//!     .with_worker_count(4);
//! let writer = TableWriter::new(config, connector).await?;
//!
//! writer.insert(vec![Value::from("IBM"), Value::Double(142.5)])?;
//! writer.wait_for_completion().await;
//! println!("{}", writer.status());
//! # Ok(())
//! # }
//! ```

mod checker;
mod config;
mod resolver;
mod status;
mod worker;
mod writer;

pub use checker::{RowTypeChecker, TypeError};
pub use config::{ConfigError, WriterConfig};
pub use resolver::{ResolvedTable, SchemaError, SchemaResolver};
pub use status::{WorkerState, WorkerStatus, WriterStatus};
pub use writer::{Error, InsertError, TableWriter};
