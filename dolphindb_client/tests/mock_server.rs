use std::time::Duration;

use dolphindb_client::{
    Address, ConnectionError, Connector, Credentials, DescribeError, TableDescription,
    TableHandle, WriteError, mock::MockServer,
};
use dolphindb_partition::TableKind;
use dolphindb_types::{ColumnData, ColumnDef, ColumnType, ColumnarBatch, DataType, Schema};
use pretty_assertions::assert_eq;

fn address() -> Address {
    Address::new("localhost", 8848)
}

fn admin() -> Credentials {
    Credentials::new("admin", "123456")
}

fn server_with_table() -> (MockServer, TableHandle) {
    let server = MockServer::new(address()).with_user("admin", "123456");
    let table = TableHandle::new("dfs://db", "pt");
    server.create_table(
        table.clone(),
        TableDescription {
            schema: Schema::new(vec![
                ColumnDef::new("id", ColumnType::scalar(DataType::Int)),
                ColumnDef::new("sym", ColumnType::scalar(DataType::Symbol)),
            ]),
            kind: TableKind::Dimension,
        },
    );
    (server, table)
}

fn batch(ids: &[i32]) -> ColumnarBatch {
    ColumnarBatch::new(vec![
        ColumnData::I32(ids.to_vec()),
        ColumnData::Text(ids.iter().map(|i| format!("s{i}")).collect()),
    ])
    .unwrap()
}

#[test_log::test(tokio::test)]
async fn rejects_unknown_addresses_and_users() {
    let (server, _) = server_with_table();

    let err = server
        .connect(&Address::new("localhost", 9999), &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Unreachable(_)));

    let err = server
        .connect(&address(), &Credentials::new("admin", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::AuthenticationFailed(user) if user == "admin"));
    assert_eq!(server.connections_opened(), 0);
}

#[test_log::test(tokio::test)]
async fn describes_tables() {
    let (server, table) = server_with_table();
    let mut conn = server.connect(&address(), &admin()).await.unwrap();

    let description = conn.describe_table(&table).await.unwrap();
    assert_eq!(description.schema.len(), 2);
    assert!(matches!(description.kind, TableKind::Dimension));

    let err = conn
        .describe_table(&TableHandle::new("dfs://missing", "pt"))
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::DatabaseNotFound(db) if db == "dfs://missing"));

    let err = conn
        .describe_table(&TableHandle::new("dfs://db", "nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::TableNotFound(t) if t == "nope"));
}

#[test_log::test(tokio::test)]
async fn records_writes_per_connection() {
    let (server, table) = server_with_table();
    let mut first = server.connect(&address(), &admin()).await.unwrap();
    let mut second = server.connect(&address(), &admin()).await.unwrap();
    assert_eq!(server.open_connections(), 2);

    assert_eq!(first.execute_write(&table, &batch(&[1, 2])).await.unwrap(), 2);
    assert_eq!(second.execute_write(&table, &batch(&[3])).await.unwrap(), 1);

    let writes = server.writes(&table);
    assert_eq!(
        writes.iter().map(|w| w.connection_id).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(server.rows(&table), batch(&[1, 2, 3]));
    assert_eq!(server.row_count(&table), 3);

    first.close().await;
    assert_eq!(server.open_connections(), 1);
    let err = first.execute_write(&table, &batch(&[4])).await.unwrap_err();
    assert!(matches!(err, WriteError::Connection(ConnectionError::Closed)));

    drop(second);
    assert_eq!(server.open_connections(), 0);
}

#[test_log::test(tokio::test)]
async fn injected_failures_and_mismatched_batches() {
    let (server, table) = server_with_table();
    let mut conn = server.connect(&address(), &admin()).await.unwrap();

    server.fail_next_writes(1);
    let err = conn.execute_write(&table, &batch(&[1])).await.unwrap_err();
    assert!(matches!(err, WriteError::Server { .. }));
    assert_eq!(conn.execute_write(&table, &batch(&[1])).await.unwrap(), 1);

    let wrong = ColumnarBatch::new(vec![ColumnData::I64(vec![1]), ColumnData::Text(vec![])]);
    assert!(wrong.is_err(), "ragged batch must not be constructible");
    let wrong = ColumnarBatch::new(vec![
        ColumnData::I64(vec![1]),
        ColumnData::Text(vec!["a".to_string()]),
    ])
    .unwrap();
    let err = conn.execute_write(&table, &wrong).await.unwrap_err();
    assert!(matches!(err, WriteError::SchemaMismatch { .. }));
    assert_eq!(server.row_count(&table), 1);
}

#[test_log::test(tokio::test)]
async fn connection_limit_and_write_delay() {
    let (server, table) = server_with_table();
    server.refuse_connections_after(1);
    let mut conn = server.connect(&address(), &admin()).await.unwrap();
    assert!(matches!(
        server.connect(&address(), &admin()).await.unwrap_err(),
        ConnectionError::Unreachable(_)
    ));

    server.set_write_delay(Duration::from_millis(20));
    let start = tokio::time::Instant::now();
    conn.execute_write(&table, &batch(&[1])).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(20));
}
