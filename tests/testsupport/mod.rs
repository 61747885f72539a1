//! In-process fake broker and live cluster helpers for integration tests.

use std::{
    env,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use brokerlink::prelude::{
    bytes::{BufMut, Bytes, BytesMut},
    encode::{self, ToByte},
    parser, BrokerAddress, Error,
};
use hmac::{Hmac, Mac};
use nom::{number::complete::be_i8, IResult};
use nombytes::NomBytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use sha2::{Digest, Sha256};

const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
const SCRAM_SALT: &[u8] = b"fake-broker-salt";
const SCRAM_ITERATIONS: u32 = 4096;

#[allow(dead_code)]
pub fn get_brokers() -> Result<(bool, Vec<String>), Error> {
    let brokers: Vec<String> = match env::var(KAFKA_BROKERS) {
        Ok(brokers) => brokers.split(',').map(str::to_string).collect(),
        Err(_) => {
            tracing::warn!("Skipping test because no {} is set", KAFKA_BROKERS);
            return Ok((true, vec![]));
        }
    };
    Ok((false, brokers))
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_address() -> BrokerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    BrokerAddress::new("127.0.0.1", port)
}

/// Poll `condition` until it holds, failing the test after five seconds.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let polling = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), polling)
        .await
        .expect("condition never held");
}

/// A request as the fake broker saw it.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub api_key: i16,
    pub api_version: i16,
    pub client_id: Option<String>,
    pub body: Bytes,
}

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct FakeBrokerConfig {
    /// `(api_key, min, max)` reported by ApiVersions.
    pub api_versions: Vec<(i16, i16, i16)>,
    pub api_versions_delay: Option<Duration>,
    pub sasl_mechanisms: Vec<String>,
    /// The PLAIN auth bytes a client must send to be let in.
    pub expected_auth: Option<Vec<u8>>,
    /// `(username, password)` accepted by SCRAM-SHA-256.
    pub scram_credentials: Option<(String, String)>,
}

impl Default for FakeBrokerConfig {
    fn default() -> Self {
        Self {
            api_versions: vec![(3, 0, 12), (10, 0, 4), (17, 0, 1), (18, 0, 3), (36, 0, 2)],
            api_versions_delay: None,
            sasl_mechanisms: vec!["PLAIN".to_owned()],
            expected_auth: None,
            scram_credentials: None,
        }
    }
}

#[derive(Default)]
struct Topology {
    brokers: Vec<(i32, BrokerAddress)>,
    controller_id: i32,
}

struct FakeState {
    node_id: i32,
    address: BrokerAddress,
    config: FakeBrokerConfig,
    requests: Mutex<Vec<ReceivedRequest>>,
    topology: Mutex<Topology>,
    open_connections: AtomicUsize,
    sessions: Mutex<Vec<JoinHandle<()>>>,
}

/// Counts a client connection for as long as its session task lives.
struct OpenConnection(Arc<FakeState>);

impl OpenConnection {
    fn new(state: Arc<FakeState>) -> Self {
        state.open_connections.fetch_add(1, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A broker speaking just enough of the protocol to connect a client:
/// ApiVersions, SaslHandshake, SaslAuthenticate (PLAIN and SCRAM-SHA-256),
/// Metadata and FindCoordinator.
#[allow(dead_code)]
pub struct FakeBroker {
    state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.task.abort();
        self.close_connections();
    }
}

#[allow(dead_code)]
impl FakeBroker {
    pub async fn start(node_id: i32) -> Self {
        Self::with_config(node_id, FakeBrokerConfig::default()).await
    }

    pub async fn with_config(node_id: i32, config: FakeBrokerConfig) -> Self {
        Self::bind(node_id, config, 0).await
    }

    /// Listen on a given port, `0` picking a free one.
    pub async fn bind(node_id: i32, config: FakeBrokerConfig, port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = BrokerAddress::new("127.0.0.1", port);

        let state = Arc::new(FakeState {
            node_id,
            address: address.clone(),
            config,
            requests: Mutex::new(vec![]),
            topology: Mutex::new(Topology {
                brokers: vec![(node_id, address)],
                controller_id: node_id,
            }),
            open_connections: AtomicUsize::new(0),
            sessions: Mutex::new(vec![]),
        });

        let task = tokio::spawn(accept_loop(listener, state.clone()));
        Self { state, task }
    }

    pub fn address(&self) -> BrokerAddress {
        self.state.address.clone()
    }

    pub fn node_id(&self) -> i32 {
        self.state.node_id
    }

    /// What Metadata responses report from now on.
    pub fn set_topology(&self, brokers: Vec<(i32, BrokerAddress)>, controller_id: i32) {
        *self.state.topology.lock().unwrap() = Topology {
            brokers,
            controller_id,
        };
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count(&self, api_key: i16) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.api_key == api_key)
            .count()
    }

    /// Client connections currently open on this broker.
    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    /// Drop every client connection, as a broker restart would.
    pub fn close_connections(&self) {
        for session in self.state.sessions.lock().unwrap().drain(..) {
            session.abort();
        }
    }
}

/// Share one topology between fake brokers.
#[allow(dead_code)]
pub fn link(brokers: &[&FakeBroker], controller_id: i32) {
    let topology: Vec<(i32, BrokerAddress)> = brokers
        .iter()
        .map(|broker| (broker.node_id(), broker.address()))
        .collect();
    for broker in brokers {
        broker.set_topology(topology.clone(), controller_id);
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<FakeState>) {
    while let Ok((stream, _)) = listener.accept().await {
        let session = tokio::spawn(serve(stream, state.clone()));
        let mut sessions = state.sessions.lock().unwrap();
        sessions.retain(|session| !session.is_finished());
        sessions.push(session);
    }
}

/// Per connection SASL progress.
#[derive(Default)]
struct Session {
    mechanism: Option<String>,
    scram: Option<ScramExchange>,
}

struct ScramExchange {
    username: String,
    client_first_bare: String,
    server_first: String,
}

async fn serve(mut stream: TcpStream, state: Arc<FakeState>) {
    let _open = OpenConnection::new(state.clone());
    let mut session = Session::default();
    loop {
        let Ok(length) = stream.read_u32().await else {
            return;
        };
        let mut frame = BytesMut::zeroed(length as usize);
        if stream.read_exact(&mut frame).await.is_err() {
            return;
        }
        let (correlation_id, request) = split_request(frame.freeze());
        state.requests.lock().unwrap().push(request.clone());

        if request.api_key == 18 {
            if let Some(delay) = state.config.api_versions_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let body = respond(&state, &mut session, &request);
        let mut out = Vec::with_capacity(body.len() + 8);
        out.put_u32(body.len() as u32 + 4);
        out.put_i32(correlation_id);
        out.extend_from_slice(&body);
        if stream.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn split_request(mut frame: Bytes) -> (i32, ReceivedRequest) {
    use brokerlink::prelude::bytes::Buf;

    let api_key = frame.get_i16();
    let api_version = frame.get_i16();
    let correlation_id = frame.get_i32();
    let client_id_len = frame.get_i16();
    let client_id = if client_id_len < 0 {
        None
    } else {
        let raw = frame.split_to(client_id_len as usize);
        Some(String::from_utf8(raw.to_vec()).unwrap())
    };

    (
        correlation_id,
        ReceivedRequest {
            api_key,
            api_version,
            client_id,
            body: frame,
        },
    )
}

fn respond(state: &FakeState, session: &mut Session, request: &ReceivedRequest) -> Vec<u8> {
    let mut out = Vec::new();
    match request.api_key {
        18 => {
            0i16.encode(&mut out).unwrap();
            encode::encode_as_array(&mut out, &state.config.api_versions, |buf, (key, min, max)| {
                key.encode(buf)?;
                min.encode(buf)?;
                max.encode(buf)
            })
            .unwrap();
            0i32.encode(&mut out).unwrap();
        }
        17 => {
            let mechanism = parser::decode(request.body.clone(), parser::parse_string).unwrap();
            let error_code: i16 = if state.config.sasl_mechanisms.contains(&mechanism) {
                0
            } else {
                33
            };
            error_code.encode(&mut out).unwrap();
            encode::encode_as_array(&mut out, &state.config.sasl_mechanisms, |buf, m| {
                m.encode(buf)
            })
            .unwrap();
            session.mechanism = Some(mechanism);
        }
        36 => {
            let auth_bytes = parser::decode(request.body.slice(1..), parser::parse_compact_bytes)
                .unwrap();
            let reply = match session.mechanism.as_deref() {
                Some("SCRAM-SHA-256") => scram_step(state, session, &auth_bytes),
                _ => state
                    .config
                    .expected_auth
                    .as_ref()
                    .map_or(true, |expected| expected.as_slice() == auth_bytes.as_ref())
                    .then(Vec::new),
            };

            encode::encode_empty_tag_buffer(&mut out);
            match &reply {
                Some(_) => {
                    0i16.encode(&mut out).unwrap();
                    encode::encode_compact_string(&mut out, None).unwrap();
                }
                None => {
                    58i16.encode(&mut out).unwrap();
                    encode::encode_compact_string(&mut out, Some("Authentication failed"))
                        .unwrap();
                }
            }
            let reply = reply.unwrap_or_default();
            encode::encode_compact_bytes(&mut out, Some(&reply[..])).unwrap();
            3_600_000i64.encode(&mut out).unwrap();
            encode::encode_empty_tag_buffer(&mut out);
        }
        3 => {
            let topology = state.topology.lock().unwrap();
            encode::encode_empty_tag_buffer(&mut out);
            0i32.encode(&mut out).unwrap();
            encode::encode_compact_array(&mut out, &topology.brokers, |buf, (node_id, addr)| {
                node_id.encode(buf)?;
                encode::encode_compact_string(buf, Some(addr.host.as_str()))?;
                (addr.port as i32).encode(buf)?;
                encode::encode_compact_string(buf, None)?;
                encode::encode_empty_tag_buffer(buf);
                Ok(())
            })
            .unwrap();
            encode::encode_compact_string(&mut out, Some("fake-cluster")).unwrap();
            topology.controller_id.encode(&mut out).unwrap();
            // no topics
            encode::encode_compact_array::<i32, _, _>(&mut out, &[], |buf, x| x.encode(buf))
                .unwrap();
            encode::encode_empty_tag_buffer(&mut out);
        }
        10 => {
            let keys = parser::decode(request.body.clone(), parse_coordinator_keys).unwrap();
            encode::encode_empty_tag_buffer(&mut out);
            0i32.encode(&mut out).unwrap();
            encode::encode_compact_array(&mut out, &keys, |buf, key| {
                encode::encode_compact_string(buf, Some(key.as_str()))?;
                state.node_id.encode(buf)?;
                encode::encode_compact_string(buf, Some(state.address.host.as_str()))?;
                (state.address.port as i32).encode(buf)?;
                0i16.encode(buf)?;
                encode::encode_compact_string(buf, None)?;
                encode::encode_empty_tag_buffer(buf);
                Ok(())
            })
            .unwrap();
            encode::encode_empty_tag_buffer(&mut out);
        }
        other => panic!("fake broker does not speak api {}", other),
    }
    out
}

fn parse_coordinator_keys(s: NomBytes) -> IResult<NomBytes, Vec<String>> {
    let (s, _) = parser::parse_tag_buffer(s)?;
    let (s, _key_type) = be_i8(s)?;
    parser::parse_compact_array(parser::parse_compact_string)(s)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// One SCRAM-SHA-256 round: the server-first challenge for a client-first
/// message, then the server signature for a valid client-final proof.
/// `None` rejects the client.
fn scram_step(state: &FakeState, session: &mut Session, auth_bytes: &[u8]) -> Option<Vec<u8>> {
    let (username, password) = state.config.scram_credentials.as_ref()?;
    let message = std::str::from_utf8(auth_bytes).ok()?;

    let Some(exchange) = session.scram.take() else {
        let client_first_bare = message.strip_prefix("n,,")?.to_owned();
        let mut client_name = None;
        let mut client_nonce = None;
        for attr in client_first_bare.split(',') {
            match attr.split_once('=') {
                Some(("n", value)) => client_name = Some(value.to_owned()),
                Some(("r", value)) => client_nonce = Some(value),
                _ => {}
            }
        }
        let server_first = format!(
            "r={}fake-server-nonce,s={},i={}",
            client_nonce?,
            STANDARD.encode(SCRAM_SALT),
            SCRAM_ITERATIONS
        );
        let reply = server_first.clone().into_bytes();
        session.scram = Some(ScramExchange {
            username: client_name?,
            client_first_bare,
            server_first,
        });
        return Some(reply);
    };

    let (client_final_without_proof, proof) = message.split_once(",p=")?;
    let proof = STANDARD.decode(proof).ok()?;
    let auth_message = format!(
        "{},{},{}",
        exchange.client_first_bare, exchange.server_first, client_final_without_proof
    );

    let mut salted_password = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        SCRAM_SALT,
        SCRAM_ITERATIONS,
        &mut salted_password,
    );
    let client_key = hmac_sha256(&salted_password, b"Client Key");
    let stored_key = Sha256::digest(&client_key);
    let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
    let expected_proof: Vec<u8> = client_key
        .iter()
        .zip(client_signature.iter())
        .map(|(k, s)| k ^ s)
        .collect();
    if exchange.username != *username || proof != expected_proof {
        return None;
    }

    let server_key = hmac_sha256(&salted_password, b"Server Key");
    let server_signature = hmac_sha256(&server_key, auth_message.as_bytes());
    Some(format!("v={}", STANDARD.encode(server_signature)).into_bytes())
}
