use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};

use crate::error::Error;
use crate::protocol::auth::{plugin_error, xor_eq, AuthPlugin};

/// Encrypt the password for a full `caching_sha2_password` exchange over an insecure channel.
///
/// The server's PEM key arrives as the payload of an auth-more-data packet. The NUL
/// terminated password is XOR-ed with the scramble, repeating the scramble as needed,
/// then sealed with RSA-OAEP (SHA-1).
pub(crate) fn encrypt(
    plugin: AuthPlugin,
    key: &[u8],
    password: &str,
    nonce: &[u8],
) -> Result<Vec<u8>, Error> {
    let pem = std::str::from_utf8(key)
        .map_err(|_| plugin_error(plugin, "server sent a public key that is not valid UTF-8"))?
        .trim_end_matches('\0')
        .trim();

    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|err| plugin_error(plugin, format!("could not parse server public key: {err}")))?;

    let mut pass = Vec::with_capacity(password.len() + 1);
    pass.extend_from_slice(password.as_bytes());
    pass.push(0);

    xor_eq(&mut pass, nonce);

    key.encrypt(&mut rand::thread_rng(), Oaep::new::<sha1::Sha1>(), &pass)
        .map_err(|err| plugin_error(plugin, format!("could not encrypt password: {err}")))
}
