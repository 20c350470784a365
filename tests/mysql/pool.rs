use std::sync::Arc;
use std::time::Duration;

use mywire::mysql::{ColumnType, InfileHandler, MySqlPoolOptions, Value};
use mywire::Error;
use mywire_test::{MockServer, MockSession};
use tokio::io::AsyncRead;

const COM_PING: u8 = 0x0e;
const COM_RESET_CONNECTION: u8 = 0x1f;

async fn expect_command(session: &mut MockSession, command: u8) -> anyhow::Result<()> {
    let packet = session.read_packet().await?;
    anyhow::ensure!(packet == [command], "expected command 0x{command:02x}, got {packet:?}");

    session.ok().await
}

#[tokio::test]
async fn it_reuses_idle_connections() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().build();

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        expect_command(&mut session, COM_PING).await?;

        // the second user gets a clean session
        expect_command(&mut session, COM_RESET_CONNECTION).await?;
        expect_command(&mut session, COM_PING).await?;

        anyhow::Ok(session)
    });

    let first = pool.connection(options.clone());
    first.ping().await?;
    assert_eq!(pool.num_busy(), 1);

    first.end();
    assert_eq!(pool.num_busy(), 0);
    assert_eq!(pool.num_idle(), 1);

    let second = pool.connection(options);
    second.ping().await?;
    assert_eq!(second.connection_id(), Some(1));
    assert_eq!(pool.size(), 1);

    drop(second);
    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_keys_idle_connections_by_dsn() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().build();

    let script = tokio::spawn(async move {
        let mut a = server.accept().await?;
        expect_command(&mut a, COM_PING).await?;

        let mut b = server.accept().await?;
        expect_command(&mut b, COM_PING).await?;

        anyhow::Ok((a, b))
    });

    let a = pool.connection(options.clone().schema("a"));
    a.ping().await?;
    a.end();

    let b = pool.connection(options.schema("b"));
    b.ping().await?;
    assert_eq!(b.connection_id(), Some(2));
    b.end();

    assert_eq!(pool.num_idle(), 2);

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_waits_for_a_free_slot() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().max_connections(1).build();

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        expect_command(&mut session, COM_PING).await?;
        expect_command(&mut session, COM_RESET_CONNECTION).await?;
        expect_command(&mut session, COM_PING).await?;

        anyhow::Ok(session)
    });

    let first = pool.connection(options.clone());
    first.ping().await?;

    let second = Arc::new(pool.connection(options));
    let waiting = {
        let second = Arc::clone(&second);
        tokio::spawn(async move { second.ping().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    first.end();

    waiting.await??;
    assert_eq!(second.connection_id(), Some(1));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_retires_connections_after_their_last_use() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().keepalive_max(1).build();

    let script = tokio::spawn(async move {
        let mut first = server.accept().await?;
        expect_command(&mut first, COM_PING).await?;

        // closed on release: COM_QUIT, then end of stream
        let rest = first.read_to_end().await?;
        assert_eq!(rest, b"\x01\x00\x00\x00\x01");

        let mut second = server.accept().await?;
        expect_command(&mut second, COM_PING).await?;

        anyhow::Ok(second)
    });

    let conn = pool.connection(options.clone());
    conn.ping().await?;
    conn.end();

    assert_eq!(pool.num_idle(), 0);

    let conn = pool.connection(options);
    conn.ping().await?;
    assert_eq!(conn.connection_id(), Some(2));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_sweeps_idle_connections_after_the_keepalive_timeout() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new()
        .keepalive_timeout(Duration::from_millis(50))
        .sweep_interval(Duration::from_millis(10))
        .build();

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;
        expect_command(&mut session, COM_PING).await?;

        session.read_to_end().await?;

        anyhow::Ok(())
    });

    let conn = pool.connection(options);
    conn.ping().await?;
    conn.end();

    assert_eq!(pool.num_idle(), 1);

    tokio::time::timeout(Duration::from_secs(5), script).await???;
    assert_eq!(pool.size(), 0);

    Ok(())
}

#[tokio::test]
async fn it_retries_once_when_an_idle_socket_died() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().build();

    let first = tokio::spawn(async move {
        let mut session = server.accept().await?;
        expect_command(&mut session, COM_PING).await?;

        anyhow::Ok((server, session))
    });

    let conn = pool.connection(options.clone());
    conn.ping().await?;
    conn.end();

    // the server goes away while the connection sits idle
    let (mut server, session) = first.await??;
    drop(session);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.expect_query("SELECT 1").await?;
        session
            .resultset(&[("1", ColumnType::LongLong)], &[&[Some("1")]], 0x0002)
            .await?;

        anyhow::Ok(session)
    });

    let conn = pool.connection(options);
    assert_eq!(conn.query_col("SELECT 1").await?, Value::Int(1));
    assert_eq!(conn.connection_id(), Some(2));

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_serves_local_infile_requests_with_the_pool_handler() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;

    let handler: InfileHandler = Arc::new(|name: &str| {
        (name == "people.csv").then(|| {
            Box::new(&b"1,ann\n2,bob\n"[..]) as Box<dyn AsyncRead + Send + Unpin>
        })
    });

    let pool = MySqlPoolOptions::new().local_infile(handler).build();

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        session.read_packet().await?;
        session.write_packet(b"\xfbpeople.csv").await?;

        let mut upload = Vec::new();
        loop {
            let packet = session.read_packet().await?;
            if packet.is_empty() {
                break;
            }
            upload.extend_from_slice(&packet);
        }

        assert_eq!(upload, b"1,ann\n2,bob\n");
        session.ok_with(2, 0, 0x0002).await?;

        anyhow::Ok(session)
    });

    let conn = pool.connection(options);
    let summary = conn
        .execute("LOAD DATA LOCAL INFILE 'people.csv' INTO TABLE people")
        .await?;

    assert_eq!(summary.affected_rows, 2);

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_refuses_new_work_after_shutdown() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let options = server.options()?;
    let pool = MySqlPoolOptions::new().build();

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;
        expect_command(&mut session, COM_PING).await?;

        let rest = session.read_to_end().await?;
        assert_eq!(rest, b"\x01\x00\x00\x00\x01");

        anyhow::Ok(())
    });

    let conn = pool.connection(options.clone());
    conn.ping().await?;
    conn.end();

    tokio::time::timeout(Duration::from_secs(5), pool.shutdown()).await?;
    assert!(pool.is_closed());
    assert_eq!(pool.size(), 0);

    let conn = pool.connection(options);
    assert!(matches!(conn.ping().await, Err(Error::PoolClosed)));

    script.await??;

    Ok(())
}
