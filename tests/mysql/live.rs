//! Tests against a real server. They do nothing unless `DATABASE_URL` is set.

use futures::TryStreamExt;
use indexmap::IndexMap;
use mywire::mysql::{MySqlPoolOptions, Param, Row, RowType, SqlTemplate, Value};
use mywire::params;
use mywire_test::{connect, live_options};

#[tokio::test]
async fn it_connects() -> anyhow::Result<()> {
    let Some(conn) = connect().await? else {
        return Ok(());
    };

    conn.ping().await?;
    assert!(conn.server_version().is_some());

    conn.close().await?;

    Ok(())
}

#[tokio::test]
async fn it_round_trips_template_values() -> anyhow::Result<()> {
    let Some(conn) = connect().await? else {
        return Ok(());
    };

    let tricky = "it's a \"quote\" \\ and a\nnewline";

    let value = conn
        .query_col(SqlTemplate::new("SELECT '").param(tricky).sql("'"))
        .await?;

    assert_eq!(value, Value::String(tricky.into()));

    let sum = conn
        .query_col(SqlTemplate::new("SELECT 1 + '").param(41).sql("'"))
        .await?;

    assert_eq!(sum.as_i64(), Some(42));

    Ok(())
}

#[tokio::test]
async fn it_inserts_and_selects_with_templates() -> anyhow::Result<()> {
    let Some(conn) = connect().await? else {
        return Ok(());
    };

    conn.execute(
        "CREATE TEMPORARY TABLE users (id INT PRIMARY KEY AUTO_INCREMENT, name TEXT, age INT)",
    )
    .await?;

    let rows: Vec<Value> = [("ann", 31), ("bob", 42)]
        .into_iter()
        .map(|(name, age)| {
            let mut row = IndexMap::new();
            row.insert("name".to_owned(), Value::from(name));
            row.insert("age".to_owned(), Value::from(age));
            Value::Object(row)
        })
        .collect();

    let summary = conn
        .execute(SqlTemplate::new("INSERT INTO users <").param(rows).sql(">"))
        .await?;

    assert_eq!(summary.affected_rows, 2);

    let mut filter = IndexMap::new();
    filter.insert("name".to_owned(), Value::from("bob"));

    let found = conn
        .query_all(
            SqlTemplate::new("SELECT name, age FROM users WHERE {")
                .param(filter)
                .sql("&}"),
            RowType::Map,
        )
        .await?;

    let [Row::Map(bob)] = &found[..] else {
        panic!("expected one row, got {found:?}");
    };

    assert_eq!(bob["age"].as_i64(), Some(42));

    let ids = conn
        .query_all(
            SqlTemplate::new("SELECT id FROM users WHERE id IN [")
                .param(vec![Value::from(1), Value::from(2), Value::from(99)])
                .sql("] ORDER BY id"),
            RowType::FirstColumn,
        )
        .await?;

    assert_eq!(ids.len(), 2);

    Ok(())
}

#[tokio::test]
async fn it_streams_rows_and_prepared_statements() -> anyhow::Result<()> {
    let Some(conn) = connect().await? else {
        return Ok(());
    };

    conn.execute("CREATE TEMPORARY TABLE blobs (id INT PRIMARY KEY, data LONGBLOB)")
        .await?;

    let data: Vec<u8> = (0..200_000_u32).map(|n| (n % 251) as u8).collect();

    let mut insert = conn.prepare("INSERT INTO blobs (id, data) VALUES (?, ?)").await?;
    insert.execute(params![1, data.clone()]).await?;
    insert
        .execute(vec![Param::from(2), Param::stream(std::io::Cursor::new(data[..1000].to_vec()))])
        .await?;
    drop(insert);

    let mut rs = conn.query("SELECT id, data FROM blobs ORDER BY id").await?;

    let (row, column) = rs.next_row_streaming().await?.expect("first row");
    assert_eq!(row.get(0)?.as_i64(), Some(1));
    assert_eq!(&column.read_to_end().await?[..], &data[..]);

    let rows: Vec<_> = rs.into_rows().try_collect().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(1)?.as_bytes(), Some(&data[..1000]));

    Ok(())
}

#[tokio::test]
async fn it_pools_connections() -> anyhow::Result<()> {
    let Some(options) = live_options()? else {
        return Ok(());
    };

    let pool = MySqlPoolOptions::new().max_connections(2).build();

    let first = pool.connection(options.clone());
    first.execute("SET @marker = 1").await?;
    let id = first.connection_id();
    first.end();

    // the reused session was reset
    let second = pool.connection(options);
    assert_eq!(second.query_col("SELECT @marker").await?, Value::Null);
    assert_eq!(second.connection_id(), id);
    second.end();

    pool.shutdown().await;
    assert_eq!(pool.size(), 0);

    Ok(())
}
