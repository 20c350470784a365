use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use mywire_core::net::{connect_tcp, Buffers, Socket};

use crate::engine::{Cursor, MySqlEngine, MySqlStream};
use crate::error::Error;
use crate::options::MySqlConnectOptions;
use crate::protocol::auth::{AuthExchange, AuthPlugin};
use crate::protocol::connect::{AuthSwitchRequest, Handshake, HandshakeResponse};
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase.html

// the connection phase performs these tasks:
//  - exchange the capabilities of client and server
//  - authenticate the client against the server, possibly switching plugins
//  - run the configured init statement

/// Largest command we announce; the server's `max_allowed_packet` still applies.
const MAX_PACKET_SIZE: u32 = 1 << 24;

const DESIRED_CAPABILITIES: Capabilities = Capabilities::PLUGIN_AUTH
    .union(Capabilities::LONG_PASSWORD)
    .union(Capabilities::TRANSACTIONS)
    .union(Capabilities::MULTI_RESULTS)
    .union(Capabilities::PS_MULTI_RESULTS)
    .union(Capabilities::SECURE_CONNECTION)
    .union(Capabilities::PROTOCOL_41)
    .union(Capabilities::LONG_FLAG)
    .union(Capabilities::SESSION_TRACK)
    .union(Capabilities::LOCAL_FILES)
    .union(Capabilities::DEPRECATE_EOF)
    .union(Capabilities::PLUGIN_AUTH_LENENC_DATA);

pub(crate) fn client_capabilities(options: &MySqlConnectOptions) -> Capabilities {
    let mut capabilities = DESIRED_CAPABILITIES;

    if options.schema.is_some() {
        capabilities |= Capabilities::CONNECT_WITH_DB;
    }

    if options.found_rows {
        capabilities |= Capabilities::FOUND_ROWS;
    }

    if options.ignore_space {
        capabilities |= Capabilities::IGNORE_SPACE;
    }

    if options.multi_statements {
        capabilities |= Capabilities::MULTI_STATEMENTS;
    }

    capabilities
}

async fn dial(options: &MySqlConnectOptions) -> Result<Box<dyn Socket>, Error> {
    match &options.socket {
        #[cfg(unix)]
        Some(path) => Ok(mywire_core::net::connect_uds(path).await?),

        #[cfg(not(unix))]
        Some(_) => Err(Error::Configuration(
            "unix domain sockets are not supported on this platform".into(),
        )),

        None => Ok(connect_tcp(&options.host, options.port).await?),
    }
}

impl MySqlEngine {
    /// Dial the server and authenticate.
    pub(crate) async fn establish(
        options: Arc<MySqlConnectOptions>,
        buffers: Buffers,
    ) -> Result<Self, Error> {
        let socket = dial(&options).await?;

        Self::establish_with(socket, options, buffers).await
    }

    pub(crate) async fn establish_with(
        socket: Box<dyn Socket>,
        options: Arc<MySqlConnectOptions>,
        buffers: Buffers,
    ) -> Result<Self, Error> {
        let mut stream = MySqlStream::new(socket, buffers);

        // the server may reject us right away with an ERR packet, e.g. too many connections
        let handshake: Handshake = stream.recv_packet().await?.decode()?;

        tracing::debug!(
            target: "mywire::protocol",
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            auth_plugin = ?handshake.auth_plugin_name,
            "received handshake"
        );

        stream.capabilities = client_capabilities(&options) & handshake.server_capabilities;

        let plugin = match handshake.auth_plugin_name.as_deref() {
            Some(name) => AuthPlugin::from_name(name)?,

            // servers without plugin auth only speak the 4.1 scramble
            None => AuthPlugin::MySqlNativePassword,
        };

        let password = options.password.as_deref().unwrap_or_default();
        let mut nonce = handshake.auth_plugin_data;
        let auth_response = plugin.scramble(password, &nonce);

        stream.write_packet(HandshakeResponse {
            schema: options.schema.as_deref(),
            max_packet_size: MAX_PACKET_SIZE,
            collation: options.collation,
            username: &options.username,
            auth_plugin: Some(plugin),
            auth_response: &auth_response,
        })?;

        stream.flush().await?;

        let mut exchange = AuthExchange::new(plugin);

        let ok = loop {
            let packet = stream.recv_packet().await?;

            match packet.first().copied() {
                Some(0x00) => break packet.ok(stream.capabilities)?,

                Some(0xfe) => {
                    let switch: AuthSwitchRequest = packet.decode()?;
                    let plugin = AuthPlugin::from_name(&switch.plugin_name)?;

                    tracing::debug!(
                        target: "mywire::protocol",
                        from = %exchange.plugin(),
                        to = %plugin,
                        "server requested an authentication switch"
                    );

                    nonce = switch.data;
                    exchange = AuthExchange::new(plugin);

                    stream.write_raw_packet(&plugin.scramble(password, &nonce))?;
                    stream.flush().await?;
                }

                Some(0x01) => {
                    let data: Bytes = packet.0.slice(1..);

                    if let Some(response) = exchange.handle(data, password, &nonce)? {
                        stream.write_raw_packet(&response)?;
                        stream.flush().await?;
                    }
                }

                Some(id) => {
                    return Err(err_protocol!(
                        "unexpected packet 0x{:02x} during authentication",
                        id
                    ));
                }

                None => return Err(err_protocol!("empty packet during authentication")),
            }
        };

        let use_n_times = options.keepalive_max;
        let use_till = Instant::now() + options.keepalive_timeout;

        let mut engine = MySqlEngine {
            stream,
            server_version: handshake.server_version,
            connection_id: handshake.connection_id,
            status: handshake.status,
            schema: options.schema.clone(),
            character_set: None,
            generation: MySqlEngine::next_generation(),
            cursor: Cursor::Idle,
            lob_remaining: 0,
            broken: false,
            needs_reset: false,
            use_till,
            use_n_times,
            lease: None,
            logger: None,
            options,
        };

        engine.apply_ok(&ok);

        tracing::debug!(
            target: "mywire::protocol",
            connection_id = engine.connection_id,
            plugin = %exchange.plugin(),
            capabilities = ?engine.stream.capabilities,
            no_backslash_escapes = engine.status.contains(Status::NO_BACKSLASH_ESCAPES),
            "authenticated"
        );

        engine.run_init_sql().await?;

        Ok(engine)
    }

    /// Run the configured init statement, discarding whatever it returns.
    pub(crate) async fn run_init_sql(&mut self) -> Result<(), Error> {
        let Some(sql) = self.options.init_sql.clone() else {
            return Ok(());
        };

        self.query(&sql).await?;
        self.drain().await
    }
}
