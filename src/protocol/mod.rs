//! Bytecode protocol requests & responses.
//!
//! This module aims to implement the bytecode protocol outlined in the
//! [Kafka Documentation](https://kafka.apache.org/protocol.html)
//!
//! Every protocol call is a type implementing [`Api`]: a fixed api key and
//! version, a request encoder and a response parser. The module is set up
//! as a list of message pairs, each holding a request file with the
//! encoding logic and a response file with the parsing logic.
//!
//! Flexible API versions carry a tag buffer at the end of the request and
//! response headers. The header tag buffers are written and read by each
//! flexible API itself, at the start of its body.

pub mod api_versions;
pub mod find_coordinator;
pub mod metadata;
pub mod sasl_authenticate;
pub mod sasl_handshake;

use std::{collections::HashMap, fmt::Debug};

use bytes::{BufMut, Bytes};
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

// re exporting these for ease
pub use self::{
    api_versions::{
        request::ApiVersionsRequest,
        response::{ApiVersionRange, ApiVersionsResponse},
        ApiVersions,
    },
    find_coordinator::{
        request::{FindCoordinatorRequest, KeyType},
        response::{Coordinator, FindCoordinatorResponse},
        FindCoordinator,
    },
    metadata::{
        request::{MetadataRequest, MetadataRequestTopic},
        response::{MetadataBroker, MetadataPartition, MetadataResponse, MetadataTopic},
        Metadata,
    },
    sasl_authenticate::{
        request::SaslAuthenticateRequest, response::SaslAuthenticateResponse, SaslAuthenticate,
    },
    sasl_handshake::{
        request::SaslHandshakeRequest, response::SaslHandshakeResponse, SaslHandshake,
    },
};
use crate::{encode::ToByte, error::Result, parser};

/// Static description of one protocol call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiDescriptor {
    pub name: &'static str,
    pub api_key: i16,
    pub api_version: i16,
    /// Whether this version uses compact encodings and tag buffers.
    pub flexible: bool,
}

/// A protocol call this client knows how to make.
///
/// Implementors only describe the body; framing, the request header and
/// correlation are handled by the connection.
///
/// ### Example
/// ```ignore
/// let request = protocol::FindCoordinatorRequest::group("my-group");
/// let response = broker.send_request::<protocol::FindCoordinator>(&request).await?;
/// ```
pub trait Api: Send + Sync + 'static {
    const DESCRIPTOR: ApiDescriptor;

    type Request: Debug + Send + Sync;
    type Response: Debug + Send + Sync + 'static;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()>;

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response>;

    /// Turn a decoded response carrying an error code into an error.
    fn check_response(response: Self::Response) -> Result<Self::Response> {
        Ok(response)
    }

    /// Parse a response body and check it for broker errors.
    ///
    /// Callers get either a complete error free response or an error,
    /// never a half parsed structure.
    fn decode_response(s: Bytes) -> Result<Self::Response> {
        tracing::trace!("Parsing {} response {:?}", Self::DESCRIPTOR.name, s);
        let response = parser::decode(s, Self::parse_response)?;
        tracing::trace!("Parsed {} response {:?}", Self::DESCRIPTOR.name, response);
        Self::check_response(response)
    }
}

/// Every API compiled into this client.
pub const SUPPORTED_APIS: &[ApiDescriptor] = &[
    ApiVersions::DESCRIPTOR,
    FindCoordinator::DESCRIPTOR,
    Metadata::DESCRIPTOR,
    SaslAuthenticate::DESCRIPTOR,
    SaslHandshake::DESCRIPTOR,
];

/// Index [`SUPPORTED_APIS`] by api key.
pub fn api_by_key() -> HashMap<i16, ApiDescriptor> {
    SUPPORTED_APIS
        .iter()
        .map(|api| (api.api_key, *api))
        .collect()
}

#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: Option<&'a str>,
}

impl<'a> HeaderRequest<'a> {
    /// Create new header request.
    ///
    /// This goes at the beginning of every single request.
    pub fn new(api: ApiDescriptor, correlation_id: i32, client_id: Option<&'a str>) -> Self {
        HeaderRequest {
            api_key: api.api_key,
            api_version: api.api_version,
            correlation_id,
            client_id,
        }
    }
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}
