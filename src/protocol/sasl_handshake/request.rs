//! Encoding and creation for SASL Handshake requests.
//!
//! ### Protocol Def
//! ```text
//! SaslHandshake Request (Version: 1) => mechanism
//!   mechanism => STRING
//! ```
//!
//! Note that we are using version 1 of this API, which means the
//! authentication bytes that follow are wrapped in SaslAuthenticate
//! requests rather than sent raw on the socket.

use bytes::BufMut;

use crate::{encode::ToByte, error::Result};

/// The base SASL Handshake request object.
#[derive(Debug, Clone, PartialEq)]
pub struct SaslHandshakeRequest {
    /// The SASL mechanism chosen by the client.
    pub mechanism: String,
}

impl SaslHandshakeRequest {
    pub fn new(mechanism: &str) -> Self {
        Self {
            mechanism: mechanism.to_owned(),
        }
    }
}

pub fn encode_sasl_handshake_request<W: BufMut>(
    buffer: &mut W,
    request: &SaslHandshakeRequest,
) -> Result<()> {
    tracing::trace!("Encoding SaslHandshakeRequest {:?}", request);
    request.mechanism.encode(buffer)?;
    Ok(())
}
