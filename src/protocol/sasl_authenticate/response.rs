//! Parsing and processing for SASL Authenticate responses.
//!
//! ### Protocol Defs
//! ```text
//! SaslAuthenticate Response (Version: 2) => error_code error_message auth_bytes session_lifetime_ms TAG_BUFFER
//!   error_code => INT16
//!   error_message => COMPACT_NULLABLE_STRING
//!   auth_bytes => COMPACT_BYTES
//!   session_lifetime_ms => INT64
//! ```
//!
//! Note we are using version 2 for the response, which is preceded by the
//! response header tag buffer.

use bytes::Bytes;
use nom::{
    number::complete::{be_i16, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{BrokerProtocolError, Result},
    parser,
};

/// The base SASL Authenticate response object.
#[derive(Debug, Clone, PartialEq)]
pub struct SaslAuthenticateResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: i16,
    /// The error message, or null if there was no error.
    pub error_message: Option<String>,
    /// The SASL authentication bytes from the server, as defined by the SASL mechanism.
    pub auth_bytes: Bytes,
    /// Number of milliseconds after which only re-authentication over the existing connection to create a new session can occur.
    pub session_lifetime_ms: i64,
}

impl SaslAuthenticateResponse {
    pub fn is_error(self) -> Result<Self> {
        if self.error_code != 0 {
            tracing::info!(
                "SASL authentication failed: {} {:?}",
                self.error_code,
                self.error_message
            );
            let error = BrokerProtocolError::new(self.error_code, self.error_message.clone());
            return Err(error.with_partial_result(self).into());
        }
        Ok(self)
    }
}

pub fn parse_sasl_authenticate_response(
    s: NomBytes,
) -> IResult<NomBytes, SaslAuthenticateResponse> {
    let (s, _) = parser::parse_tag_buffer(s)?;
    let (s, error_code) = be_i16(s)?;
    let (s, error_message) = parser::parse_compact_nullable_string(s)?;
    let (s, auth_bytes) = parser::parse_compact_bytes(s)?;
    let (s, session_lifetime_ms) = be_i64(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        SaslAuthenticateResponse {
            error_code,
            error_message,
            auth_bytes,
            session_lifetime_ms,
        },
    ))
}
