//! Authentication plugins.
//!
//! The server names the plugin in its handshake (or in a later auth switch request). Only
//! the two plugins every supported server speaks are implemented; anything else fails the
//! connection with client error 2059.

use std::fmt::{self, Display, Formatter};

use bytes::Bytes;
use digest::Digest;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{
    Error, MySqlDatabaseError, CR_AUTH_PLUGIN_CANNOT_LOAD, CR_AUTH_PLUGIN_ERR,
};

mod rsa;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
}

impl AuthPlugin {
    pub(crate) fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "mysql_native_password" => Ok(AuthPlugin::MySqlNativePassword),
            "caching_sha2_password" => Ok(AuthPlugin::CachingSha2Password),

            // an unsupported plugin error looks like this in the official client:
            //  ERROR 2059 (HY000): Authentication plugin 'dialog' cannot be loaded
            _ => Err(MySqlDatabaseError::client(
                CR_AUTH_PLUGIN_CANNOT_LOAD,
                format!("Authentication plugin '{name}' cannot be loaded"),
            )
            .into()),
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            AuthPlugin::MySqlNativePassword => "mysql_native_password",
            AuthPlugin::CachingSha2Password => "caching_sha2_password",
        }
    }

    /// The one-shot proof sent in the handshake response or after an auth switch.
    ///
    /// An empty password sends an empty proof.
    pub(crate) fn scramble(self, password: &str, nonce: &[u8]) -> Vec<u8> {
        if password.is_empty() {
            return Vec::new();
        }

        match self {
            AuthPlugin::MySqlNativePassword => scramble_sha1(password, nonce),
            AuthPlugin::CachingSha2Password => scramble_sha256(password, nonce),
        }
    }
}

impl Display for AuthPlugin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Stage {
    Initial,
    Encrypt,
    Done,
}

/// The multi-round part of an authentication, fed with every `AuthMoreData` packet.
#[derive(Debug)]
pub(crate) struct AuthExchange {
    plugin: AuthPlugin,
    stage: Stage,
}

impl AuthExchange {
    pub(crate) fn new(plugin: AuthPlugin) -> Self {
        Self {
            plugin,
            stage: Stage::Initial,
        }
    }

    pub(crate) fn plugin(&self) -> AuthPlugin {
        self.plugin
    }

    /// Handle the payload of an `AuthMoreData` packet, without its `0x01` header.
    ///
    /// Returns the bytes to send back, or `None` when the server will follow up on its own.
    pub(crate) fn handle(
        &mut self,
        data: Bytes,
        password: &str,
        nonce: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        // fast_auth_success
        const AUTH_SUCCESS: u8 = 0x03;

        // perform_full_authentication
        const AUTH_CONTINUE: u8 = 0x04;

        // request_public_key
        const REQUEST_PUBLIC_KEY: u8 = 0x02;

        match (self.plugin, self.stage) {
            (AuthPlugin::CachingSha2Password, Stage::Initial) => match data.first() {
                Some(&AUTH_SUCCESS) => {
                    self.stage = Stage::Done;
                    Ok(None)
                }

                Some(&AUTH_CONTINUE) => {
                    // without TLS, the password has to be sealed with the server's public key
                    self.stage = Stage::Encrypt;
                    Ok(Some(vec![REQUEST_PUBLIC_KEY]))
                }

                Some(&status) => Err(plugin_error(
                    self.plugin,
                    format!("unexpected status 0x{status:02x}"),
                )),

                None => Err(plugin_error(self.plugin, "empty auth data")),
            },

            (AuthPlugin::CachingSha2Password, Stage::Encrypt) => {
                let sealed = rsa::encrypt(self.plugin, &data, password, nonce)?;

                self.stage = Stage::Done;
                Ok(Some(sealed))
            }

            (plugin, _) => Err(plugin_error(
                plugin,
                "received more data after authentication was complete",
            )),
        }
    }
}

// SHA1( password ) ^ SHA1( nonce + SHA1( SHA1( password ) ) )
fn scramble_sha1(password: &str, nonce: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();

    hasher.update(password);

    // SHA1( password )
    let mut pw_hash = hasher.finalize_reset();

    hasher.update(pw_hash);

    // SHA1( SHA1( password ) )
    let pw_hash_hash = hasher.finalize_reset();

    hasher.update(nonce);
    hasher.update(pw_hash_hash);

    // SHA1( nonce + SHA1( SHA1( password ) ) )
    let pw_seed_hash_hash = hasher.finalize();

    xor_eq(&mut pw_hash, &pw_seed_hash_hash);

    pw_hash.to_vec()
}

// SHA256( password ) ^ SHA256( SHA256( SHA256( password ) ) + nonce )
fn scramble_sha256(password: &str, nonce: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();

    hasher.update(password);

    // SHA256( password )
    let mut pw_hash = hasher.finalize_reset();

    hasher.update(pw_hash);

    // SHA256( SHA256( password ) )
    let pw_hash_hash = hasher.finalize_reset();

    hasher.update(pw_hash_hash);
    hasher.update(nonce);

    // SHA256( SHA256( SHA256( password ) ) + nonce )
    let pw_seed_hash_hash = hasher.finalize();

    xor_eq(&mut pw_hash, &pw_seed_hash_hash);

    pw_hash.to_vec()
}

// XOR(x, y)
// If len(y) < len(x), wrap around inside y
pub(crate) fn xor_eq(x: &mut [u8], y: &[u8]) {
    let y_len = y.len();
    if y_len == 0 {
        return;
    }

    for (i, b) in x.iter_mut().enumerate() {
        *b ^= y[i % y_len];
    }
}

pub(crate) fn plugin_error(plugin: AuthPlugin, message: impl Display) -> Error {
    MySqlDatabaseError::client(
        CR_AUTH_PLUGIN_ERR,
        format!("Authentication plugin '{plugin}' reported error: {message}"),
    )
    .into()
}
