use std::sync::Arc;

use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use dolphindb_client::{Address, Connection, ConnectionError, Connector, TableHandle};
use dolphindb_partition::{PartitionRouter, RoutingError};
use dolphindb_types::{ColumnError, ColumnarBatch, Schema, Value};

use crate::{
    checker::{RowTypeChecker, TypeError},
    config::{ConfigError, WriterConfig},
    resolver::{SchemaError, SchemaResolver},
    status::{StatusBoard, WriterStatus},
    worker::{Worker, WorkerShared},
};

/// Reasons a writer cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid writer configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("cannot lay out buffers for the table: {0}")]
    Layout(#[from] ColumnError),

    #[error("failed to open the connection of worker {index}: {source}")]
    WorkerConnection {
        index: usize,
        #[source]
        source: ConnectionError,
    },
}

/// Reasons rows are refused by [`TableWriter::insert`] and
/// [`TableWriter::insert_unwritten_data`]. Nothing is buffered when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error("the writer has been drained")]
    Closed,

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Appends rows to one table through a fixed set of workers.
///
/// Every row is checked against the table schema and routed by its partition column, then
/// buffered by its worker. Each worker writes its buffer over its own connection once
/// `batch_size` rows have accumulated or the throttle interval has elapsed, so rows of one server
/// partition are always written through the same connection, in insertion order.
///
/// Write failures do not surface from `insert`; they are reported by [`TableWriter::status`] and
/// the rows can be recovered with [`TableWriter::take_unwritten_data`].
#[derive(Debug)]
pub struct TableWriter {
    table: TableHandle,
    checker: RowTypeChecker,
    router: PartitionRouter,
    workers: Vec<Arc<WorkerShared>>,
    status: Arc<StatusBoard>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl TableWriter {
    /// Resolve the table, open one connection per worker and start the workers.
    pub async fn new(config: WriterConfig, connector: Arc<dyn Connector>) -> Result<Self, Error> {
        config.validate()?;
        let address: Address = config.address.parse().map_err(SchemaError::from)?;
        let credentials = config.credentials();
        let table = config.table();

        let resolved = SchemaResolver::new(Arc::clone(&connector))
            .resolve(&address, &credentials, &table)
            .await?;
        let router = PartitionRouter::new(
            &resolved.schema,
            &resolved.kind,
            config.partition_column(),
            config.worker_count,
        )
        .map_err(ConfigError::from)?;
        let empty = ColumnarBatch::empty_for(&resolved.schema, 0)?;

        let mut connections: Vec<Box<dyn Connection>> = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            match connector.connect(&address, &credentials).await {
                Ok(connection) => connections.push(connection),
                Err(source) => {
                    for mut connection in connections {
                        connection.close().await;
                    }
                    return Err(Error::WorkerConnection { index, source });
                }
            }
        }

        let status = Arc::new(StatusBoard::default());
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let workers = connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| {
                let shared = Arc::new(WorkerShared::new(index, config.batch_size, empty.clone()));
                let worker = Worker::new(
                    Arc::clone(&shared),
                    connection,
                    table.clone(),
                    config.throttle,
                    Arc::clone(&status),
                );
                tasks.spawn(worker.run(shutdown.child_token()));
                shared
            })
            .collect();

        info!(
            %table,
            worker_count = config.worker_count,
            batch_size = config.batch_size,
            throttle = ?config.throttle,
            partition_column = config.partition_column().unwrap_or_default(),
            "table writer started"
        );

        Ok(Self {
            table,
            checker: RowTypeChecker::new(resolved.schema),
            router,
            workers,
            status,
            shutdown,
            tasks,
        })
    }

    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.checker.schema()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Check, route and buffer one row. Returns as soon as the row is buffered.
    pub fn insert(&self, row: Vec<Value>) -> Result<(), InsertError> {
        if self.status.exited() {
            return Err(InsertError::Closed);
        }
        let cells = self.checker.check_row(row)?;
        let worker = self.router.route(&cells)?;
        self.workers[worker].push_row(cells)
    }

    /// Buffer batches previously returned by [`TableWriter::take_unwritten_data`], or any batch
    /// laid out like the table.
    ///
    /// Every row of every batch is checked and routed before any of them is buffered.
    pub fn insert_unwritten_data(&self, batches: Vec<ColumnarBatch>) -> Result<(), InsertError> {
        if self.status.exited() {
            return Err(InsertError::Closed);
        }

        let mut routed = Vec::with_capacity(batches.len());
        for batch in &batches {
            self.checker.check_batch(batch)?;
            let mut rows_by_worker = vec![Vec::new(); self.workers.len()];
            let partition_column = self.router.column().and_then(|c| batch.column(c));
            for row in 0..batch.num_rows() {
                let worker = match partition_column.and_then(|c| c.cell(row)) {
                    Some(cell) => self.router.route_value(&cell)?,
                    None => 0,
                };
                rows_by_worker[worker].push(row);
            }
            routed.push(rows_by_worker);
        }

        let mut parts = Vec::new();
        for (batch, rows_by_worker) in batches.into_iter().zip(routed) {
            for (worker, rows) in rows_by_worker.iter().enumerate() {
                if rows.len() == batch.num_rows() {
                    parts.push((worker, batch));
                    break;
                }
                if !rows.is_empty() {
                    parts.push((worker, batch.select(rows)));
                }
            }
        }
        WorkerShared::push_batches(&self.workers, parts)
    }

    pub fn status(&self) -> WriterStatus {
        WriterStatus::from_workers(
            self.workers.iter().map(|w| w.status()).collect(),
            self.status.error(),
            self.status.exited(),
        )
    }

    /// Remove and return, worker by worker, the batches that failed to write followed by the rows
    /// not yet written.
    pub fn take_unwritten_data(&self) -> Vec<ColumnarBatch> {
        self.workers
            .iter()
            .flat_map(|w| w.take_unwritten())
            .collect()
    }

    /// Stop accepting rows, write everything still buffered and close every connection.
    ///
    /// Calling this again waits for the same drain and changes nothing.
    pub async fn wait_for_completion(&self) {
        let already_exited = self.status.set_exited();
        for worker in &self.workers {
            worker.close();
        }
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        if !already_exited {
            let status = self.status();
            info!(
                table = %self.table,
                sent_rows = status.sent_rows,
                failed_rows = status.failed_rows,
                "table writer drained"
            );
        }
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        // workers still write what they buffered, but nobody waits for them
        for worker in &self.workers {
            worker.close();
        }
        self.shutdown.cancel();
    }
}
