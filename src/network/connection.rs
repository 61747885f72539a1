//! Multiplexed request/response over one broker socket.
//!
//! A [`Connection`] owns the write half of the socket and a background
//! task owning the read half. Every request gets a fresh correlation id
//! and a pending entry in the in-flight table; the read task pulls
//! complete frames off the socket and hands each one to the entry with
//! the matching id. Responses may come back in any order.
//!
//! The id is allocated, the pending entry registered, and the frame
//! written while holding the writer lock, so frames go out in call order
//! and a response can never arrive before its entry exists.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{oneshot, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::instrument;

use super::{tcp, tls, Transport};
use crate::{
    config::ConnectionConfig,
    encode::ToByte,
    error::{Error, Result},
    protocol::{Api, ApiDescriptor, HeaderRequest},
};

const FIRST_CORRELATION_ID: i32 = 1;

/// Largest response frame accepted, matching the broker side default of
/// `socket.request.max.bytes`.
pub const MAX_FRAME_SIZE: u32 = 100 * 1024 * 1024;

/// A request written to the socket and waiting for its response.
struct PendingCall {
    api: ApiDescriptor,
    complete: Box<dyn FnOnce(Result<Bytes>) + Send>,
}

impl PendingCall {
    fn new<A: Api>(sender: oneshot::Sender<Result<A::Response>>) -> Self {
        Self {
            api: A::DESCRIPTOR,
            complete: Box::new(move |body| {
                let response = body.and_then(A::decode_response);
                if sender.send(response).is_err() {
                    tracing::trace!("{} caller went away before its response", A::DESCRIPTOR.name);
                }
            }),
        }
    }
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<i32, PendingCall>,
    closed: bool,
}

/// The in-flight table, shared by senders and the read task.
#[derive(Default)]
struct Pending {
    table: Mutex<PendingTable>,
}

impl Pending {
    fn lock(&self) -> std::sync::MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, correlation_id: i32, call: PendingCall) -> Result<()> {
        let mut table = self.lock();
        if table.closed {
            return Err(Error::ConnectionClosed);
        }
        table.calls.insert(correlation_id, call);
        Ok(())
    }

    fn remove(&self, correlation_id: i32) -> Option<PendingCall> {
        self.lock().calls.remove(&correlation_id)
    }

    /// Complete the call waiting on this frame's correlation id.
    fn dispatch(&self, mut frame: Bytes) -> Result<()> {
        if frame.len() < 4 {
            return Err(Error::TruncatedMessage);
        }
        let header = frame.split_to(4);
        let correlation_id = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);

        let Some(call) = self.remove(correlation_id) else {
            tracing::error!(
                "ERROR: Protocol violation, response for unknown correlation id {}",
                correlation_id
            );
            return Err(Error::UnmatchedCorrelationId(correlation_id));
        };
        tracing::trace!(
            "Received {} response for correlation id {}",
            call.api.name,
            correlation_id
        );
        (call.complete)(Ok(frame));
        Ok(())
    }

    /// Reject every outstanding call and refuse new ones.
    fn close(&self) {
        let calls = {
            let mut table = self.lock();
            table.closed = true;
            std::mem::take(&mut table.calls)
        };
        if !calls.is_empty() {
            tracing::debug!("Rejecting {} in-flight requests", calls.len());
        }
        for (_, call) in calls {
            (call.complete)(Err(Error::ConnectionClosed));
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn len(&self) -> usize {
        self.lock().calls.len()
    }
}

struct Writer {
    stream: Option<Box<dyn AsyncWrite + Unpin + Send>>,
    next_correlation_id: i32,
}

struct Shared {
    client_id: Option<String>,
    peer: String,
    writer: AsyncMutex<Writer>,
    pending: Arc<Pending>,
    reader: JoinHandle<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.close();
    }
}

/// One multiplexed connection to a broker.
///
/// Cloning is cheap and every clone talks over the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.shared.peer)
            .field("client_id", &self.shared.client_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Resolves to the decoded response of one request.
///
/// Fails with [`Error::ConnectionClosed`] if the connection goes away
/// before the response arrives.
#[derive(Debug)]
pub struct ResponseHandle<T> {
    correlation_id: i32,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> ResponseHandle<T> {
    pub fn correlation_id(&self) -> i32 {
        self.correlation_id
    }
}

impl<T> Future for ResponseHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(response),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Connection {
    /// Open a socket to the configured broker, wrapping it in TLS if asked.
    ///
    /// ### Example
    /// ```ignore
    /// let address = "localhost:9092".parse()?;
    /// let config = brokerlink::prelude::ConnectionConfig::new(address);
    /// let conn = brokerlink::prelude::Connection::connect(&config).await?;
    /// ```
    #[instrument(name = "connection-connect", level = "debug", skip(config), fields(address = %config.address))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let stream = tcp::connect(&config.address).await?;
        let peer = config.address.to_string();
        match &config.tls {
            Some(tls_config) => {
                let stream = tls::connect(stream, &config.address, tls_config).await?;
                Ok(Self::from_transport(stream, config.client_id.clone(), peer))
            }
            None => Ok(Self::from_transport(stream, config.client_id.clone(), peer)),
        }
    }

    /// Run a connection over an already established byte stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S: Transport>(stream: S, client_id: Option<String>) -> Self {
        Self::from_transport(stream, client_id, "stream".to_owned())
    }

    fn from_transport<S: Transport>(stream: S, client_id: Option<String>, peer: String) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let pending = Arc::new(Pending::default());
        let reader = tokio::spawn(read_loop(reader, pending.clone(), peer.clone()));

        Self {
            shared: Arc::new(Shared {
                client_id,
                peer,
                writer: AsyncMutex::new(Writer {
                    stream: Some(Box::new(writer)),
                    next_correlation_id: FIRST_CORRELATION_ID,
                }),
                pending,
                reader,
            }),
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        self.shared.client_id.as_deref()
    }

    /// Write a request and return a handle resolving to its response.
    ///
    /// Does not wait for the response, so many requests can be in flight
    /// on one connection.
    #[instrument(name = "network-send", level = "trace", skip(self, request), fields(api = A::DESCRIPTOR.name))]
    pub async fn send<A: Api>(&self, request: &A::Request) -> Result<ResponseHandle<A::Response>> {
        let mut writer = self.shared.writer.lock().await;
        if writer.stream.is_none() {
            return Err(Error::ConnectionClosed);
        }

        let correlation_id = writer.next_correlation_id;
        let frame = encode_frame::<A>(correlation_id, self.client_id(), request)?;
        writer.next_correlation_id = correlation_id.wrapping_add(1);

        let (sender, receiver) = oneshot::channel();
        self.shared
            .pending
            .register(correlation_id, PendingCall::new::<A>(sender))?;

        tracing::trace!(
            "Sending {} request, correlation id {}, {} bytes",
            A::DESCRIPTOR.name,
            correlation_id,
            frame.len()
        );
        let written = match writer.stream.as_mut() {
            Some(stream) => match stream.write_all(&frame).await {
                Ok(()) => stream.flush().await,
                Err(err) => Err(err),
            },
            None => Err(std::io::ErrorKind::NotConnected.into()),
        };

        if let Err(err) = written {
            tracing::error!("ERROR: Writing to {} {:?}", self.shared.peer, err);
            self.shared.pending.remove(correlation_id);
            // a partially written frame leaves the stream unusable
            writer.stream = None;
            self.shared.reader.abort();
            self.shared.pending.close();
            return Err(err.into());
        }

        Ok(ResponseHandle {
            correlation_id,
            receiver,
        })
    }

    /// Send a request and wait for its decoded response.
    pub async fn send_request<A: Api>(&self, request: &A::Request) -> Result<A::Response> {
        self.send::<A>(request).await?.await
    }

    /// True once the socket is gone, either closed by us or by the broker.
    pub fn is_closed(&self) -> bool {
        self.shared.pending.is_closed()
    }

    /// Number of requests still waiting on a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Close the socket and reject every in-flight request. Safe to call
    /// more than once.
    pub async fn disconnect(&self) {
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut stream) = writer.stream.take() {
            tracing::debug!("Disconnecting from {}", self.shared.peer);
            if let Err(err) = stream.shutdown().await {
                tracing::debug!("Error shutting down {} {:?}", self.shared.peer, err);
            }
        }
        self.shared.reader.abort();
        self.shared.pending.close();
    }
}

/// Length prefix, request header, then the API body.
fn encode_frame<A: Api>(
    correlation_id: i32,
    client_id: Option<&str>,
    request: &A::Request,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(64);
    buffer.extend_from_slice(&[0, 0, 0, 0]);
    HeaderRequest::new(A::DESCRIPTOR, correlation_id, client_id).encode(&mut buffer)?;
    A::encode_request(&mut buffer, request)?;

    let size = i32::try_from(buffer.len() - 4).map_err(|_| Error::EncodingError)?;
    size.encode(&mut &mut buffer[..4])?;
    Ok(buffer)
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Bytes> {
    let length = reader.read_u32().await?;
    if length < 4 {
        tracing::error!("ERROR: Frame of {} bytes cannot hold a correlation id", length);
        return Err(Error::TruncatedMessage);
    }
    if length > MAX_FRAME_SIZE {
        tracing::error!(
            "ERROR: Frame of {} bytes is over the {} byte limit, is this a Kafka listener?",
            length,
            MAX_FRAME_SIZE
        );
        return Err(Error::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buffer = BytesMut::zeroed(length as usize);
    reader.read_exact(&mut buffer).await?;
    Ok(buffer.freeze())
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, pending: Arc<Pending>, peer: String) {
    let reason = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(err) => break err,
        };
        if let Err(err) = pending.dispatch(frame) {
            break err;
        }
    };

    match reason {
        Error::ConnectionError(std::io::ErrorKind::UnexpectedEof) => {
            tracing::debug!("Connection to {} closed by peer", peer)
        }
        err => tracing::error!("ERROR: Connection to {} failed {:?}", peer, err),
    }
    pending.close();
}
