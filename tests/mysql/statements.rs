use mywire::mysql::{ColumnType, MySqlConnection, Param, SqlTemplate, Value};
use mywire::params;
use mywire_test::{MockServer, MockSession};

const AUTOCOMMIT: u16 = 0x0002;

const COM_STMT_PREPARE: u8 = 0x16;
const COM_STMT_EXECUTE: u8 = 0x17;
const COM_STMT_SEND_LONG_DATA: u8 = 0x18;
const COM_STMT_CLOSE: u8 = 0x19;
const COM_PING: u8 = 0x0e;

async fn expect_prepare(session: &mut MockSession, sql: &str) -> anyhow::Result<()> {
    let packet = session.read_packet().await?;

    anyhow::ensure!(packet[0] == COM_STMT_PREPARE, "expected COM_STMT_PREPARE");
    anyhow::ensure!(
        &packet[1..] == sql.as_bytes(),
        "prepared {:?}",
        String::from_utf8_lossy(&packet[1..])
    );

    Ok(())
}

#[tokio::test]
async fn it_executes_prepared_statements_with_binary_rows() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        expect_prepare(&mut session, "SELECT id, name FROM users WHERE name = ?").await?;
        session
            .prepare_ok(
                5,
                &[("?", ColumnType::VarString)],
                &[("id", ColumnType::LongLong), ("name", ColumnType::VarString)],
            )
            .await?;

        let execute = session.read_packet().await?;
        assert_eq!(execute[0], COM_STMT_EXECUTE);
        assert_eq!(&execute[1..5], &5_u32.to_le_bytes());

        // the value goes inline, at the end of the packet
        assert!(execute.ends_with(b"\x03ann"));

        session
            .columns(&[("id", ColumnType::LongLong), ("name", ColumnType::VarString)])
            .await?;
        session
            .write_packet(b"\x00\x00\x07\x00\x00\x00\x00\x00\x00\x00\x03ann")
            .await?;
        session.eof(AUTOCOMMIT).await?;

        // dropping the statement closes it ahead of the next command
        let close = session.read_packet().await?;
        assert_eq!(close, [COM_STMT_CLOSE, 5, 0, 0, 0]);

        assert_eq!(session.read_packet().await?, [COM_PING]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    let mut statement = conn
        .prepare("SELECT id, name FROM users WHERE name = ?")
        .await?;

    assert_eq!(statement.params_len(), 1);
    assert_eq!(statement.columns().len(), 2);

    let mut rs = statement.query(params!["ann"]).await?;

    let row = rs.next_row().await?.expect("one row");
    assert_eq!(row.get(0)?, &Value::Int(7));
    assert_eq!(row.get_by_name("name")?, &Value::String("ann".into()));

    assert!(rs.next_row().await?.is_none());
    drop(rs);

    drop(statement);
    conn.ping().await?;

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_sends_stream_parameters_as_long_data() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        // values in quotes become placeholders when a template holds a stream
        expect_prepare(&mut session, "INSERT INTO files (name, data) VALUES (?, ?)").await?;
        session
            .prepare_ok(
                1,
                &[("?", ColumnType::VarString), ("?", ColumnType::VarString)],
                &[],
            )
            .await?;

        let mut data = Vec::new();

        let execute = loop {
            let packet = session.read_packet().await?;

            match packet[0] {
                COM_STMT_SEND_LONG_DATA => {
                    assert_eq!(&packet[1..5], &1_u32.to_le_bytes());
                    assert_eq!(&packet[5..7], &1_u16.to_le_bytes());
                    data.extend_from_slice(&packet[7..]);
                }

                _ => break packet,
            }
        };

        assert_eq!(data, b"hello world");
        assert_eq!(execute[0], COM_STMT_EXECUTE);

        session.ok_with(1, 9, AUTOCOMMIT).await?;

        let close = session.read_packet().await?;
        assert_eq!(close, [COM_STMT_CLOSE, 1, 0, 0, 0]);

        assert_eq!(session.read_packet().await?, [COM_PING]);
        session.ok().await?;

        anyhow::Ok(session)
    });

    let summary = conn
        .execute(
            SqlTemplate::new("INSERT INTO files (name, data) VALUES ('")
                .param("hello.txt")
                .sql("', '")
                .param(Param::stream(&b"hello world"[..]))
                .sql("')"),
        )
        .await?;

    assert_eq!(summary.affected_rows, 1);
    assert_eq!(summary.last_insert_id, 9);

    conn.ping().await?;

    drop(script.await??);

    Ok(())
}

#[tokio::test]
async fn it_prepares_again_on_a_new_socket() -> anyhow::Result<()> {
    let mut server = MockServer::bind().await?;
    let conn = MySqlConnection::new(server.options()?);

    let first = tokio::spawn(async move {
        let mut session = server.accept().await?;

        expect_prepare(&mut session, "DELETE FROM t").await?;
        session.prepare_ok(3, &[], &[]).await?;

        anyhow::Ok((server, session))
    });

    let mut statement = conn.prepare("DELETE FROM t").await?;
    let (mut server, first) = first.await??;

    // a fresh socket knows nothing of the statement
    conn.end();
    drop(first);

    let script = tokio::spawn(async move {
        let mut session = server.accept().await?;

        expect_prepare(&mut session, "DELETE FROM t").await?;
        session.prepare_ok(8, &[], &[]).await?;

        let execute = session.read_packet().await?;
        assert_eq!(execute[0], COM_STMT_EXECUTE);
        assert_eq!(&execute[1..5], &8_u32.to_le_bytes());

        session.ok_with(4, 0, AUTOCOMMIT).await?;

        anyhow::Ok(session)
    });

    let summary = statement.execute(params![]).await?;
    assert_eq!(summary.affected_rows, 4);

    drop(script.await??);

    Ok(())
}
