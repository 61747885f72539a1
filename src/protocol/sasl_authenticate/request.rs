//! Encoding and creation for SASL Authenticate requests.
//!
//! ### Protocol Def
//! ```text
//! SaslAuthenticate Request (Version: 2) => auth_bytes TAG_BUFFER
//!   auth_bytes => COMPACT_BYTES
//! ```
//!
//! Note that we are using version 2 of this API, which is preceded by
//! the request header tag buffer.

use bytes::{BufMut, Bytes};

use crate::{encode, error::Result};

/// The base SASL Authenticate request object.
#[derive(Clone, PartialEq)]
pub struct SaslAuthenticateRequest {
    /// The SASL authentication bytes from the client, as defined by the SASL mechanism.
    pub auth_bytes: Bytes,
}

impl SaslAuthenticateRequest {
    pub fn new(auth_bytes: Bytes) -> Self {
        Self { auth_bytes }
    }
}

// auth bytes carry credentials, keep them out of the logs
impl std::fmt::Debug for SaslAuthenticateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslAuthenticateRequest")
            .field("auth_bytes", &format_args!("<{} bytes>", self.auth_bytes.len()))
            .finish()
    }
}

pub fn encode_sasl_authenticate_request<W: BufMut>(
    buffer: &mut W,
    request: &SaslAuthenticateRequest,
) -> Result<()> {
    tracing::trace!("Encoding {:?}", request);
    encode::encode_empty_tag_buffer(buffer);
    encode::encode_compact_bytes(buffer, Some(&request.auth_bytes))?;
    encode::encode_empty_tag_buffer(buffer);
    Ok(())
}
