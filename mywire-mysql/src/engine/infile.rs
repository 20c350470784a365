//! `LOAD DATA LOCAL INFILE`.
//!
//! The server answers such a statement with a request naming a file. The client replies
//! with the file's contents as a run of packets, then an empty packet, and the server
//! finishes with an `OK` or `ERR`.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_local_infile_request.html>

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::engine::MySqlEngine;
use crate::error::{Error, MySqlDatabaseError, CR_LOAD_DATA_LOCAL_INFILE_REJECTED};

/// Serves `LOAD DATA LOCAL INFILE` requests.
///
/// Called with the file name from the statement; returns the data to upload, or `None` to
/// refuse. A refused request fails the statement with client error 2068.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mywire::mysql::{InfileHandler, MySqlConnectOptions};
///
/// let handler: InfileHandler = Arc::new(|name: &str| {
///     (name == "people.csv").then(|| {
///         Box::new(&b"1,ann\n2,bob\n"[..]) as Box<dyn tokio::io::AsyncRead + Send + Unpin>
///     })
/// });
///
/// let options = MySqlConnectOptions::new().local_infile(handler);
/// ```
pub type InfileHandler =
    Arc<dyn Fn(&str) -> Option<Box<dyn AsyncRead + Send + Unpin>> + Send + Sync>;

impl MySqlEngine {
    /// Answer a `LOCAL INFILE` request. The server's response is left for the caller.
    pub(crate) async fn send_local_infile(&mut self, filename: &str) -> Result<(), Error> {
        let reader = self
            .options
            .infile
            .as_ref()
            .and_then(|handler| handler(filename));

        let Some(mut reader) = reader else {
            tracing::debug!(target: "mywire::protocol", filename, "refusing LOCAL INFILE request");

            // the server still expects the (empty) upload; its response is read and dropped
            self.stream.write_raw_packet(&[])?;
            self.stream.flush().await?;

            match self.stream.recv_packet().await {
                Ok(packet) => {
                    let ok = packet.ok(self.stream.capabilities)?;
                    self.apply_ok(&ok);
                    self.end_of_result(ok.status, false);
                }

                Err(error) if error.breaks_connection() => return Err(error),
                Err(_) => {}
            }

            return Err(MySqlDatabaseError::client(
                CR_LOAD_DATA_LOCAL_INFILE_REJECTED,
                format!("LOAD DATA LOCAL INFILE request for {filename:?} was refused"),
            )
            .into());
        };

        let mut chunk = vec![0_u8; self.stream.upload_chunk_len(0)];
        let mut total = 0_usize;

        loop {
            let n = reader.read(&mut chunk).await?;

            if n == 0 {
                break;
            }

            self.stream.write_raw_packet(&chunk[..n])?;
            self.stream.flush().await?;

            total += n;
        }

        self.stream.write_raw_packet(&[])?;
        self.stream.flush().await?;

        tracing::debug!(target: "mywire::protocol", filename, bytes = total, "sent LOCAL INFILE data");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockServer;
    use crate::options::MySqlConnectOptions;

    fn request(name: &str) -> Vec<u8> {
        let mut packet = vec![0xfb];
        packet.extend_from_slice(name.as_bytes());
        packet
    }

    #[tokio::test]
    async fn it_uploads_local_files() {
        let data: Vec<u8> = b"1,ann\n2,bob\n".repeat(2_000);
        let upload = data.clone();

        let handler: InfileHandler = Arc::new(move |name: &str| {
            assert_eq!(name, "people.csv");
            let reader: Box<dyn AsyncRead + Send + Unpin> =
                Box::new(std::io::Cursor::new(upload.clone()));
            Some(reader)
        });

        let options = MySqlConnectOptions::new()
            .username("root")
            .local_infile(handler);

        let (mut engine, mut server) = MockServer::connected_with(options, false).await;

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;
            server.write_packet(&request("people.csv")).await;

            let mut received = Vec::new();
            loop {
                let packet = server.read_packet().await;
                if packet.is_empty() {
                    break;
                }
                received.extend_from_slice(&packet);
            }

            assert_eq!(received, data);
            server.ok_with(4_000, 0, 0x0002, 0, "Records: 4000  Deleted: 0  Skipped: 0  Warnings: 0").await;
        });

        let head = engine
            .query("LOAD DATA LOCAL INFILE 'people.csv' INTO TABLE people")
            .await
            .unwrap();

        assert_eq!(head.summary.affected_rows, 4_000);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_reports_the_statement_size_when_the_server_refuses_the_upload() {
        let handler: InfileHandler = Arc::new(|_: &str| {
            Some(Box::new(&b"1,ann\n"[..]) as Box<dyn AsyncRead + Send + Unpin>)
        });

        let options = MySqlConnectOptions::new()
            .username("root")
            .local_infile(handler);

        let (mut engine, mut server) = MockServer::connected_with(options, false).await;

        let sql = "LOAD DATA LOCAL INFILE 'people.csv' INTO TABLE people";

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;
            server.write_packet(&request("people.csv")).await;

            while !server.read_packet().await.is_empty() {}

            server
                .err(1153, "08S01", "Got a packet bigger than 'max_allowed_packet' bytes")
                .await;
        });

        let err = engine.query(sql).await.unwrap_err();

        // the size of COM_QUERY, not of the empty packet that ended the upload
        assert!(
            matches!(err, Error::TooLarge { size } if size == 4 + 1 + sql.len()),
            "{err:?}"
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_refuses_without_a_handler() {
        let (mut engine, mut server) = MockServer::connected().await;

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;
            server.write_packet(&request("/etc/passwd")).await;

            let packet = server.read_packet().await;
            assert!(packet.is_empty());

            server.ok().await;

            // the connection is still in sync
            let ping = server.read_packet().await;
            assert_eq!(&ping[..], &[0x0e]);
            server.ok().await;
        });

        let err = engine
            .query("LOAD DATA LOCAL INFILE '/etc/passwd' INTO TABLE t")
            .await
            .unwrap_err();

        let db = err.as_database_error().unwrap();
        assert_eq!(db.downcast_ref::<MySqlDatabaseError>().number(), 2068);
        assert!(!engine.needs_drain());

        engine.ping().await.unwrap();

        server.await.unwrap();
    }
}
