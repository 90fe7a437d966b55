use std::sync::Arc;

use tracing::debug;

use dolphindb_client::{
    Address, AddressError, ConnectionError, Connector, Credentials, DescribeError, TableHandle,
};
use dolphindb_partition::TableKind;
use dolphindb_types::{ColumnType, Schema};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid server address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: Address,
        #[source]
        source: ConnectionError,
    },

    #[error("failed to describe table {table}: {source}")]
    Describe {
        table: TableHandle,
        #[source]
        source: DescribeError,
    },

    #[error("table {0} has no columns")]
    NoColumns(TableHandle),

    #[error("column {name} has type {column_type}, which cannot be written")]
    UnsupportedColumn {
        name: String,
        column_type: ColumnType,
    },
}

/// A table's schema and partitioning as resolved from the server.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub schema: Arc<Schema>,
    pub kind: TableKind,
}

/// Looks up the schema and partitioning of the table a writer appends to.
#[derive(Debug)]
pub struct SchemaResolver {
    connector: Arc<dyn Connector>,
}

impl SchemaResolver {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Describe `table` over a short-lived connection.
    pub async fn resolve(
        &self,
        address: &Address,
        credentials: &Credentials,
        table: &TableHandle,
    ) -> Result<ResolvedTable, SchemaError> {
        let mut connection = self
            .connector
            .connect(address, credentials)
            .await
            .map_err(|source| SchemaError::Connect {
                address: address.clone(),
                source,
            })?;
        let described = connection.describe_table(table).await;
        connection.close().await;

        let description = described.map_err(|source| SchemaError::Describe {
            table: table.clone(),
            source,
        })?;
        if description.schema.is_empty() {
            return Err(SchemaError::NoColumns(table.clone()));
        }
        if let Some(column) = description
            .schema
            .columns()
            .iter()
            .find(|c| c.column_type.data_type().storage().is_none())
        {
            return Err(SchemaError::UnsupportedColumn {
                name: column.name.clone(),
                column_type: column.column_type,
            });
        }

        debug!(%table, columns = description.schema.len(), "resolved table schema");
        Ok(ResolvedTable {
            schema: Arc::new(description.schema),
            kind: description.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use dolphindb_client::{TableDescription, mock::MockServer};
    use dolphindb_types::{ColumnDef, DataType};

    use super::*;

    fn server() -> MockServer {
        MockServer::new(Address::new("localhost", 8848)).with_user("admin", "123456")
    }

    fn admin() -> Credentials {
        Credentials::new("admin", "123456")
    }

    #[test_log::test(tokio::test)]
    async fn resolves_and_closes_its_connection() {
        let server = server();
        let table = TableHandle::in_memory("t");
        server.create_table(
            table.clone(),
            TableDescription {
                schema: Schema::new(vec![ColumnDef::new("id", ColumnType::scalar(DataType::Int))]),
                kind: TableKind::InMemory,
            },
        );

        let resolver = SchemaResolver::new(Arc::new(server.clone()));
        let resolved = resolver
            .resolve(server.address(), &admin(), &table)
            .await
            .unwrap();
        assert_eq!(resolved.schema.len(), 1);
        assert!(matches!(resolved.kind, TableKind::InMemory));
        assert_eq!(server.connections_opened(), 1);
        assert_eq!(server.open_connections(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn reports_missing_tables_and_bad_credentials() {
        let server = server();
        let resolver = SchemaResolver::new(Arc::new(server.clone()));

        let err = resolver
            .resolve(server.address(), &admin(), &TableHandle::new("dfs://db", "pt"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Describe {
                source: DescribeError::DatabaseNotFound(_),
                ..
            }
        ));
        assert_eq!(server.open_connections(), 0);

        let err = resolver
            .resolve(
                server.address(),
                &Credentials::new("admin", "nope"),
                &TableHandle::in_memory("t"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Connect {
                source: ConnectionError::AuthenticationFailed(_),
                ..
            }
        ));
    }

    #[test_log::test(tokio::test)]
    async fn rejects_unwritable_columns() {
        let server = server();
        let table = TableHandle::in_memory("t");
        server.create_table(
            table.clone(),
            TableDescription {
                schema: Schema::new(vec![ColumnDef::new("x", ColumnType::scalar(DataType::Any))]),
                kind: TableKind::InMemory,
            },
        );
        let err = SchemaResolver::new(Arc::new(server.clone()))
            .resolve(server.address(), &admin(), &table)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedColumn { name, .. } if name == "x"));
    }
}
