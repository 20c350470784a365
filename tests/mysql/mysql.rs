use std::sync::Arc;
use std::time::Duration;

use mywire::mysql::{
    ColumnType, MySqlConnection, MySqlDatabaseError, Row, RowType, SqlTemplate, Value,
};
use mywire::Error;
use mywire_test::MockServer;
use tokio::io::AsyncReadExt;

const AUTOCOMMIT: u16 = 0x0002;
const MORE_RESULTS: u16 = 0x0008;

#[tokio::test]
async fn it_connects_on_first_use() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.expect_query("SELECT 1 + 5").await?;
        session
            .resultset(&[("n", ColumnType::LongLong)], &[&[Some("6")]], AUTOCOMMIT)
            .await?;

        // COM_QUIT, then the socket closes
        let rest = session.read_to_end().await?;
        assert_eq!(rest, b"\x01\x00\x00\x00\x01");

        anyhow::Ok(())
    });

    assert_eq!(conn.connection_id(), None);

    let n = conn
        .query_col(SqlTemplate::new("SELECT 1 + '").param(5).sql("'"))
        .await?;

    assert_eq!(n, Value::Int(6));
    assert_eq!(conn.connection_id(), Some(1));
    assert_eq!(conn.server_version().as_deref(), Some("8.0.36-mock"));

    conn.close().await?;
    script.await??;

    Ok(())
}

#[tokio::test]
async fn it_reads_rows_in_each_shape() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        for _ in 0..3 {
            session.read_packet().await?;
            session
                .resultset(
                    &[("id", ColumnType::Long), ("name", ColumnType::VarString)],
                    &[&[Some("1"), Some("ann")], &[Some("2"), None]],
                    AUTOCOMMIT,
                )
                .await?;
        }

        anyhow::Ok(session)
    });

    let sql = "SELECT id, name FROM users";

    let maps = conn.query_all(sql, RowType::Map).await?;
    let Row::Map(first) = &maps[0] else {
        panic!("expected a map, got {:?}", maps[0]);
    };
    assert_eq!(first["name"], Value::String("ann".into()));

    let arrays = conn.query_all(sql, RowType::Array).await?;
    assert_eq!(arrays[1], Row::Array(vec![Value::Int(2), Value::Null]));

    let ids = conn.query_all(sql, RowType::FirstColumn).await?;
    assert_eq!(ids, vec![Row::Value(Value::Int(1)), Row::Value(Value::Int(2))]);

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_reports_sql_errors_and_keeps_the_socket() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.expect_query("SELECT * FROM nope").await?;
        session
            .err(1146, "42S02", "Table 'test.nope' doesn't exist")
            .await?;

        assert_eq!(session.read_packet().await?, [0x0e]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    let err = conn.execute("SELECT * FROM nope").await.unwrap_err();

    let db_err = err
        .as_database_error()
        .and_then(|err| err.try_downcast_ref::<MySqlDatabaseError>())
        .expect("a server error");

    assert_eq!(db_err.number(), 1146);
    assert_eq!(db_err.sql_state(), Some("42S02"));

    conn.ping().await?;
    assert_eq!(conn.connection_id(), Some(1));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_walks_every_resultset_of_a_multi_statement_query() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?.multi_statements(true));

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.read_packet().await?;
        session.ok_with(2, 41, AUTOCOMMIT | MORE_RESULTS).await?;
        session
            .resultset(
                &[("n", ColumnType::LongLong)],
                &[&[Some("1")]],
                AUTOCOMMIT | MORE_RESULTS,
            )
            .await?;
        session.ok_with(1, 0, AUTOCOMMIT).await?;

        anyhow::Ok(session)
    });

    let mut rs = conn
        .query("INSERT INTO t VALUES (1), (2); SELECT 1; DELETE FROM t WHERE n = 1")
        .await?;

    assert_eq!(rs.affected_rows(), 2);
    assert_eq!(rs.last_insert_id(), 41);

    assert!(rs.next_resultset().await?);
    assert_eq!(rs.columns().len(), 1);
    assert_eq!(rs.rows().await?.len(), 1);

    assert!(rs.next_resultset().await?);
    assert_eq!(rs.affected_rows(), 1);

    assert!(!rs.next_resultset().await?);
    assert!(!conn.is_busy());

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_cancels_a_running_query_on_end() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = Arc::new(MySqlConnection::new(server.options()?));

    let query = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.execute("SELECT SLEEP(60)").await })
    };

    let mut session = server.accept().await?;
    session.expect_query("SELECT SLEEP(60)").await?;

    conn.end();

    assert!(matches!(query.await?, Err(Error::Canceled)));
    assert!(!conn.is_busy());

    // the canceled socket is closed
    tokio::time::timeout(Duration::from_secs(5), session.read_to_end()).await??;

    // and the connection opens a new one when used again
    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        assert_eq!(session.read_packet().await?, [0x0e]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    conn.ping().await?;
    assert_eq!(conn.connection_id(), Some(2));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_cancels_a_connection_attempt_on_end() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = Arc::new(MySqlConnection::new(server.options()?));

    let ping = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.ping().await })
    };

    // the socket is open but the server never sends its handshake
    let mut stalled = server.accept_silent().await?;
    assert!(conn.is_busy());

    conn.end();

    assert!(matches!(ping.await?, Err(Error::Canceled)));
    assert!(!conn.is_busy());
    assert_eq!(conn.connection_id(), None);

    // the half-open socket is dropped
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stalled.read_to_end(&mut rest)).await??;
    assert!(rest.is_empty());

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        assert_eq!(session.read_packet().await?, [0x0e]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    conn.ping().await?;
    assert_eq!(conn.connection_id(), Some(1));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_runs_one_operation_at_a_time() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.read_packet().await?;
        session
            .resultset(
                &[("n", ColumnType::LongLong)],
                &[&[Some("1")], &[Some("2")]],
                AUTOCOMMIT,
            )
            .await?;

        assert_eq!(session.read_packet().await?, [0x0e]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    let mut rs = conn.query("SELECT n FROM t").await?;

    assert!(matches!(conn.execute("SELECT 2").await, Err(Error::Busy(_))));

    rs.discard().await?;
    assert!(!conn.is_busy());

    conn.ping().await?;

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_fails_to_connect_to_a_closed_port() -> anyhow::Result<()> {
    let server = MockServer::bind().await?;
    let options = server.options()?;
    drop(server);

    let conn = MySqlConnection::new(options);
    let err = conn.ping().await.unwrap_err();

    assert!(matches!(err, Error::Io(_)), "{err:?}");
    assert!(!conn.is_busy());

    Ok(())
}
