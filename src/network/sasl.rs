//! SASL authentication over a broker connection.
//!
//! Authentication runs in two protocol steps once the connection is up:
//! a `SaslHandshake` announcing the mechanism, then one or more
//! `SaslAuthenticate` exchanges carrying the mechanism's own bytes.
//! PLAIN needs a single exchange, SCRAM needs two.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
#[cfg(feature = "serde")]
use serde_derive::Deserialize;
use sha2::{Digest, Sha256, Sha512};

use super::connection::Connection;
use crate::{
    error::{Error, Result},
    protocol::{SaslAuthenticate, SaslAuthenticateRequest, SaslHandshake, SaslHandshakeRequest},
};

const NONCE_LENGTH: usize = 24;

/// SASL credentials, one variant per supported mechanism.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mechanism"))]
pub enum SaslConfig {
    #[cfg_attr(feature = "serde", serde(rename = "PLAIN"))]
    Plain { username: String, password: String },
    #[cfg_attr(feature = "serde", serde(rename = "SCRAM-SHA-256"))]
    ScramSha256 { username: String, password: String },
    #[cfg_attr(feature = "serde", serde(rename = "SCRAM-SHA-512"))]
    ScramSha512 { username: String, password: String },
}

impl SaslConfig {
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        SaslConfig::Plain {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn scram_sha_256(username: impl Into<String>, password: impl Into<String>) -> Self {
        SaslConfig::ScramSha256 {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn scram_sha_512(username: impl Into<String>, password: impl Into<String>) -> Self {
        SaslConfig::ScramSha512 {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The mechanism name announced in the handshake.
    pub fn mechanism(&self) -> &'static str {
        match self {
            SaslConfig::Plain { .. } => "PLAIN",
            SaslConfig::ScramSha256 { .. } => "SCRAM-SHA-256",
            SaslConfig::ScramSha512 { .. } => "SCRAM-SHA-512",
        }
    }

    pub fn username(&self) -> &str {
        match self {
            SaslConfig::Plain { username, .. }
            | SaslConfig::ScramSha256 { username, .. }
            | SaslConfig::ScramSha512 { username, .. } => username,
        }
    }
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism())
            .field("username", &self.username())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// PLAIN auth bytes: an empty authorization id, then username and password,
/// each preceded by a NUL byte.
pub fn plain_auth_bytes(username: &str, password: &str) -> Bytes {
    let mut buf = Vec::with_capacity(username.len() + password.len() + 2);
    buf.push(0);
    buf.extend_from_slice(username.as_bytes());
    buf.push(0);
    buf.extend_from_slice(password.as_bytes());
    Bytes::from(buf)
}

/// Announce the configured mechanism to the broker.
pub async fn handshake(conn: &Connection, config: &SaslConfig) -> Result<()> {
    let request = SaslHandshakeRequest::new(config.mechanism());
    let response = conn.send_request::<SaslHandshake>(&request).await?;
    tracing::debug!(
        "SASL handshake accepted {}, broker enables {:?}",
        config.mechanism(),
        response.mechanisms
    );
    Ok(())
}

/// Run the mechanism's authentication exchanges.
pub async fn authenticate(conn: &Connection, config: &SaslConfig) -> Result<()> {
    match config {
        SaslConfig::Plain { username, password } => {
            exchange(conn, plain_auth_bytes(username, password)).await?;
        }
        SaslConfig::ScramSha256 { username, password } => {
            let mut scram = ScramClient::new(ScramDigest::Sha256, username, password);
            scram_exchange(conn, &mut scram).await?;
        }
        SaslConfig::ScramSha512 { username, password } => {
            let mut scram = ScramClient::new(ScramDigest::Sha512, username, password);
            scram_exchange(conn, &mut scram).await?;
        }
    }
    tracing::info!(
        "Authenticated as {} using {}",
        config.username(),
        config.mechanism()
    );
    Ok(())
}

async fn exchange(conn: &Connection, auth_bytes: Bytes) -> Result<Bytes> {
    let request = SaslAuthenticateRequest::new(auth_bytes);
    let response = conn.send_request::<SaslAuthenticate>(&request).await?;
    Ok(response.auth_bytes)
}

async fn scram_exchange(conn: &Connection, scram: &mut ScramClient) -> Result<()> {
    let server_first = exchange(conn, Bytes::from(scram.client_first())).await?;
    let client_final = scram.handle_server_first(&server_first)?;
    let server_final = exchange(conn, Bytes::from(client_final)).await?;
    scram.handle_server_final(&server_final)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScramDigest {
    Sha256,
    Sha512,
}

/// Client side of a SCRAM conversation (RFC 5802, RFC 7677).
///
/// Kafka does not use channel binding, so the GS2 header is always `n,,`.
pub struct ScramClient {
    digest: ScramDigest,
    username: String,
    password: String,
    nonce: String,
    server_signature: Option<Vec<u8>>,
}

struct ScramKeys {
    client_proof: Vec<u8>,
    server_signature: Vec<u8>,
}

macro_rules! scram_keys {
    ($digest:ty, $password:expr, $salt:expr, $iterations:expr, $auth_message:expr) => {{
        let mac = |key: &[u8], data: &[u8]| -> Result<Vec<u8>> {
            let mut mac = Hmac::<$digest>::new_from_slice(key)
                .map_err(|err| Error::SaslAuthFailed(format!("HMAC key: {}", err)))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        };

        let mut salted_password = vec![0u8; <$digest as Digest>::output_size()];
        pbkdf2::pbkdf2_hmac::<$digest>($password, $salt, $iterations, &mut salted_password);

        let client_key = mac(&salted_password, b"Client Key")?;
        let stored_key = <$digest as Digest>::digest(&client_key);
        let client_signature = mac(&stored_key, $auth_message)?;
        let client_proof = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = mac(&salted_password, b"Server Key")?;
        let server_signature = mac(&server_key, $auth_message)?;

        ScramKeys {
            client_proof,
            server_signature,
        }
    }};
}

impl ScramClient {
    pub fn new(digest: ScramDigest, username: &str, password: &str) -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();
        Self::with_nonce(digest, username, password, nonce)
    }

    pub fn with_nonce(digest: ScramDigest, username: &str, password: &str, nonce: String) -> Self {
        Self {
            digest,
            username: username.to_owned(),
            password: password.to_owned(),
            nonce,
            server_signature: None,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", escape_username(&self.username), self.nonce)
    }

    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare())
    }

    /// Check the server challenge and compute the client proof.
    pub fn handle_server_first(&mut self, server_first: &[u8]) -> Result<String> {
        let server_first = std::str::from_utf8(server_first)
            .map_err(|_| scram_error("server-first message is not UTF-8"))?;
        tracing::trace!("SCRAM server-first {}", server_first);

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attr in server_first.split(',') {
            match attr.split_once('=') {
                Some(("r", value)) => nonce = Some(value),
                Some(("s", value)) => salt = Some(value),
                Some(("i", value)) => iterations = Some(value),
                Some(("e", value)) => return Err(scram_error(value)),
                _ => {}
            }
        }
        let nonce = nonce.ok_or_else(|| scram_error("server-first message has no nonce"))?;
        let salt = salt.ok_or_else(|| scram_error("server-first message has no salt"))?;
        let iterations =
            iterations.ok_or_else(|| scram_error("server-first message has no iteration count"))?;

        if !nonce.starts_with(&self.nonce) || nonce.len() == self.nonce.len() {
            return Err(scram_error("server nonce does not extend the client nonce"));
        }
        let salt = STANDARD
            .decode(salt)
            .map_err(|_| scram_error("salt is not valid base64"))?;
        let iterations = iterations
            .parse::<u32>()
            .ok()
            .filter(|i| *i > 0)
            .ok_or_else(|| scram_error("invalid iteration count"))?;

        let client_final_without_proof = format!("c=biws,r={}", nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let password = self.password.as_bytes();
        let auth_message = auth_message.as_bytes();
        let keys = match self.digest {
            ScramDigest::Sha256 => scram_keys!(Sha256, password, &salt, iterations, auth_message),
            ScramDigest::Sha512 => scram_keys!(Sha512, password, &salt, iterations, auth_message),
        };
        self.server_signature = Some(keys.server_signature);

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            STANDARD.encode(keys.client_proof)
        ))
    }

    /// Verify the server signature, proving the server knows the password too.
    pub fn handle_server_final(&self, server_final: &[u8]) -> Result<()> {
        let server_final = std::str::from_utf8(server_final)
            .map_err(|_| scram_error("server-final message is not UTF-8"))?;
        tracing::trace!("SCRAM server-final {}", server_final);

        let expected = self
            .server_signature
            .as_ref()
            .ok_or_else(|| scram_error("server-final received before server-first"))?;

        for attr in server_final.split(',') {
            match attr.split_once('=') {
                Some(("e", value)) => return Err(scram_error(value)),
                Some(("v", value)) => {
                    let signature = STANDARD
                        .decode(value)
                        .map_err(|_| scram_error("server signature is not valid base64"))?;
                    if &signature != expected {
                        return Err(scram_error("server signature mismatch"));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(scram_error("server-final message has no signature"))
    }
}

fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn scram_error(msg: &str) -> Error {
    tracing::error!("ERROR: SCRAM {}", msg);
    Error::SaslAuthFailed(msg.to_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    // RFC 7677 section 3
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn rfc_client() -> ScramClient {
        ScramClient::with_nonce(
            ScramDigest::Sha256,
            "user",
            "pencil",
            CLIENT_NONCE.to_owned(),
        )
    }

    #[test]
    fn plain_bytes() {
        assert_eq!(plain_auth_bytes("admin", "secret").as_ref(), b"\0admin\0secret");
        assert_eq!(plain_auth_bytes("", "").as_ref(), b"\0\0");
        assert_eq!(plain_auth_bytes("a\0b", "p w").as_ref(), b"\0a\0b\0p w");
    }

    #[test]
    fn mechanism_names() {
        assert_eq!(SaslConfig::plain("u", "p").mechanism(), "PLAIN");
        assert_eq!(SaslConfig::scram_sha_256("u", "p").mechanism(), "SCRAM-SHA-256");
        assert_eq!(SaslConfig::scram_sha_512("u", "p").mechanism(), "SCRAM-SHA-512");
    }

    #[test]
    fn debug_hides_password() {
        let debug = format!("{:?}", SaslConfig::plain("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn scram_sha_256_conversation() {
        let mut client = rfc_client();
        assert_eq!(client.client_first(), "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = client.handle_server_first(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(client_final, CLIENT_FINAL);

        client.handle_server_final(SERVER_FINAL.as_bytes()).unwrap();
    }

    #[test]
    fn scram_rejects_foreign_nonce() {
        let mut client = rfc_client();
        let err = client
            .handle_server_first(b"r=someoneelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert_eq!(
            err,
            Error::SaslAuthFailed("server nonce does not extend the client nonce".to_owned())
        );
    }

    #[test]
    fn scram_rejects_bad_server_signature() {
        let mut client = rfc_client();
        client.handle_server_first(SERVER_FIRST.as_bytes()).unwrap();
        let err = client
            .handle_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap_err();
        assert_eq!(err, Error::SaslAuthFailed("server signature mismatch".to_owned()));
    }

    #[test]
    fn scram_server_error() {
        let client = rfc_client();
        assert!(client.handle_server_final(b"e=invalid-proof").is_err());
    }

    #[test]
    fn scram_sha_512_proof_has_digest_width() {
        let mut client = ScramClient::with_nonce(ScramDigest::Sha512, "u", "p", "abc".to_owned());
        let client_final = client
            .handle_server_first(b"r=abcdef,s=c2FsdA==,i=16")
            .unwrap();
        let proof = client_final.rsplit_once("p=").unwrap().1;
        assert_eq!(STANDARD.decode(proof).unwrap().len(), 64);
    }

    #[test]
    fn escapes_username() {
        let client = ScramClient::with_nonce(ScramDigest::Sha256, "a=b,c", "p", "n".to_owned());
        assert_eq!(client.client_first(), "n,,n=a=3Db=2Cc,r=n");
    }
}
