//! Transport seam between the writer and a DolphinDB server.
//!
//! The writer never speaks the wire protocol itself. It opens connections through a
//! [`Connector`], asks one of them to [describe](Connection::describe_table) the target table,
//! then hands whole [`ColumnarBatch`]es to [`Connection::execute_write`]. The [`mock`] module
//! provides an in-memory server implementing both traits.

mod address;
pub mod mock;

use std::fmt::{Debug, Display};

use async_trait::async_trait;
use dolphindb_partition::TableKind;
use dolphindb_types::{ColumnarBatch, Schema};

pub use address::{Address, AddressError, Credentials};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("cannot reach server at {0}")]
    Unreachable(Address),

    #[error("the user name or password is incorrect for user {0}")]
    AuthenticationFailed(String),

    #[error("connection is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("database {0} does not exist")]
    DatabaseNotFound(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("server error while describing {table}: {message}")]
    Server { table: String, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("server rejected the write to {table}: {message}")]
    Server { table: String, message: String },

    #[error("batch does not match the schema of {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A table on the server: a DFS table inside a database, or a shared in-memory table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableHandle {
    database: Option<String>,
    table: String,
}

impl TableHandle {
    /// An empty `database` names a shared in-memory table.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        let database = database.into();
        Self {
            database: (!database.is_empty()).then_some(database),
            table: table.into(),
        }
    }

    pub fn in_memory(table: impl Into<String>) -> Self {
        Self::new("", table)
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Display for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(database) => write!(f, "loadTable(\"{database}\", \"{}\")", self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

/// What the server reports about a table.
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub schema: Schema,
    pub kind: TableKind,
}

/// Opens authenticated connections to a server.
#[async_trait]
pub trait Connector: Debug + Send + Sync {
    async fn connect(
        &self,
        address: &Address,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// One open, logged-in session with a server.
#[async_trait]
pub trait Connection: Debug + Send {
    /// Schema and partitioning of `table`.
    async fn describe_table(
        &mut self,
        table: &TableHandle,
    ) -> Result<TableDescription, DescribeError>;

    /// Append every row of `batch` to `table` in one request, returning the number of rows
    /// written.
    async fn execute_write(
        &mut self,
        table: &TableHandle,
        batch: &ColumnarBatch,
    ) -> Result<usize, WriteError>;

    /// Close the session. Further calls fail with [`ConnectionError::Closed`].
    async fn close(&mut self);
}
