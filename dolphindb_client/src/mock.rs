//! An in-memory server for exercising writers without a running DolphinDB.
//!
//! ```
//! # use dolphindb_client::{Address, TableHandle, TableDescription, mock::MockServer};
//! # use dolphindb_partition::TableKind;
//! # use dolphindb_types::{ColumnDef, ColumnType, DataType, Schema};
//! let server = MockServer::new(Address::new("localhost", 8848)).with_user("admin", "123456");
//! let table = TableHandle::in_memory("trades");
//! server.create_table(
//!     table.clone(),
//!     TableDescription {
//!         schema: Schema::new(vec![ColumnDef::new("id", ColumnType::scalar(DataType::Int))]),
//!         kind: TableKind::InMemory,
//!     },
//! );
//! assert_eq!(server.row_count(&table), 0);
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use dolphindb_types::ColumnarBatch;

use crate::{
    Address, Connection, ConnectionError, Connector, Credentials, DescribeError, TableDescription,
    TableHandle, WriteError,
};

/// One successful `execute_write` as the server saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct MockWrite {
    /// Which connection carried the write, in the order connections were opened.
    pub connection_id: usize,
    pub batch: ColumnarBatch,
}

#[derive(Debug)]
struct MockTable {
    description: TableDescription,
    writes: Vec<MockWrite>,
}

#[derive(Debug, Default)]
struct MockState {
    users: BTreeMap<String, String>,
    databases: BTreeSet<String>,
    tables: BTreeMap<TableHandle, MockTable>,
    /// Number of upcoming writes that fail.
    failing_writes: usize,
    write_delay: Duration,
    /// When set, only this many more connections are accepted.
    connections_left: Option<usize>,
    connections_opened: usize,
    open_connections: BTreeSet<usize>,
}

/// Shared handle to an in-memory server. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct MockServer {
    address: Address,
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Default::default(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Accept logins as `user_id` with `password`.
    pub fn with_user(self, user_id: impl Into<String>, password: impl Into<String>) -> Self {
        self.state
            .lock()
            .users
            .insert(user_id.into(), password.into());
        self
    }

    /// Create `table`, and its database if it has one.
    pub fn create_table(&self, table: TableHandle, description: TableDescription) {
        let mut state = self.state.lock();
        if let Some(database) = table.database() {
            state.databases.insert(database.to_string());
        }
        state.tables.insert(
            table,
            MockTable {
                description,
                writes: Vec::new(),
            },
        );
    }

    /// Make the next `n` writes fail with a server error.
    pub fn fail_next_writes(&self, n: usize) {
        self.state.lock().failing_writes = n;
    }

    /// Delay every write by `delay` before it is applied.
    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().write_delay = delay;
    }

    /// Accept only `n` more connections, refusing every later one as unreachable.
    pub fn refuse_connections_after(&self, n: usize) {
        self.state.lock().connections_left = Some(n);
    }

    /// Every write applied to `table`, in the order the server applied them.
    pub fn writes(&self, table: &TableHandle) -> Vec<MockWrite> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.writes.clone())
            .unwrap_or_default()
    }

    /// All rows written to `table` as one batch.
    pub fn rows(&self, table: &TableHandle) -> ColumnarBatch {
        let mut rows = ColumnarBatch::default();
        for write in self.writes(table) {
            // every recorded batch was checked against the table schema
            if rows.append(write.batch).is_err() {
                break;
            }
        }
        rows
    }

    pub fn row_count(&self, table: &TableHandle) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.writes.iter().map(|w| w.batch.num_rows()).sum())
            .unwrap_or_default()
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections.len()
    }

    /// Number of connections ever opened.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().connections_opened
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(
        &self,
        address: &Address,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let mut state = self.state.lock();
        if *address != self.address || state.connections_left == Some(0) {
            return Err(ConnectionError::Unreachable(address.clone()));
        }
        let known = state
            .users
            .iter()
            .any(|(user, password)| credentials.matches(user, password));
        if !known {
            return Err(ConnectionError::AuthenticationFailed(
                credentials.user_id().to_string(),
            ));
        }

        if let Some(left) = state.connections_left.as_mut() {
            *left -= 1;
        }
        let id = state.connections_opened;
        state.connections_opened += 1;
        state.open_connections.insert(id);
        debug!(connection_id = id, %address, "mock connection opened");

        Ok(Box::new(MockConnection {
            id,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    id: usize,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn describe_table(
        &mut self,
        table: &TableHandle,
    ) -> Result<TableDescription, DescribeError> {
        if self.closed {
            return Err(ConnectionError::Closed.into());
        }
        let state = self.state.lock();
        if let Some(database) = table.database() {
            if !state.databases.contains(database) {
                return Err(DescribeError::DatabaseNotFound(database.to_string()));
            }
        }
        state
            .tables
            .get(table)
            .map(|t| t.description.clone())
            .ok_or_else(|| DescribeError::TableNotFound(table.table().to_string()))
    }

    async fn execute_write(
        &mut self,
        table: &TableHandle,
        batch: &ColumnarBatch,
    ) -> Result<usize, WriteError> {
        if self.closed {
            return Err(ConnectionError::Closed.into());
        }

        let delay = self.state.lock().write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(WriteError::Server {
                table: table.to_string(),
                message: "injected write failure".to_string(),
            });
        }

        let Some(target) = state.tables.get_mut(table) else {
            return Err(WriteError::Server {
                table: table.to_string(),
                message: "table does not exist".to_string(),
            });
        };
        let schema = &target.description.schema;
        if batch.num_columns() != schema.len() {
            return Err(WriteError::SchemaMismatch {
                table: table.to_string(),
                message: format!(
                    "{} columns written, table has {}",
                    batch.num_columns(),
                    schema.len()
                ),
            });
        }
        if let Some((column, def)) = batch
            .columns()
            .iter()
            .zip(schema.columns())
            .find(|(column, def)| !column.matches(&def.column_type))
        {
            return Err(WriteError::SchemaMismatch {
                table: table.to_string(),
                message: format!(
                    "column {} is not laid out as {} ({} rows)",
                    def.name,
                    def.column_type,
                    column.len()
                ),
            });
        }

        target.writes.push(MockWrite {
            connection_id: self.id,
            batch: batch.clone(),
        });
        Ok(batch.num_rows())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().open_connections.remove(&self.id);
            debug!(connection_id = self.id, "mock connection closed");
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.state.lock().open_connections.remove(&self.id);
        }
    }
}
