//! Parsing and processing for SASL Handshake responses.
//!
//! ### Protocol Defs
//! ```text
//! SaslHandshake Response (Version: 1) => error_code [mechanisms]
//!   error_code => INT16
//!   mechanisms => STRING
//! ```
//!
//! Note we are using version 1 for the response.

use nom::{number::complete::be_i16, IResult};
use nombytes::NomBytes;

use crate::{
    error::{BrokerProtocolError, Result},
    parser,
};

/// The base SASL Handshake response object.
#[derive(Debug, Clone, PartialEq)]
pub struct SaslHandshakeResponse {
    /// The error code, or 0 if there was no error.
    pub error_code: i16,
    /// The mechanisms enabled in the server.
    pub mechanisms: Vec<String>,
}

impl SaslHandshakeResponse {
    pub fn is_error(self) -> Result<Self> {
        if self.error_code != 0 {
            tracing::error!(
                "ERROR: SASL handshake failed with {}, broker enables {:?}",
                self.error_code,
                self.mechanisms
            );
            let message = format!("enabled mechanisms: {}", self.mechanisms.join(", "));
            let error = BrokerProtocolError::new(self.error_code, Some(message));
            return Err(error.with_partial_result(self).into());
        }
        Ok(self)
    }
}

pub fn parse_sasl_handshake_response(s: NomBytes) -> IResult<NomBytes, SaslHandshakeResponse> {
    let (s, error_code) = be_i16(s)?;
    let (s, mechanisms) = parser::parse_array(parser::parse_string)(s)?;

    Ok((
        s,
        SaslHandshakeResponse {
            error_code,
            mechanisms,
        },
    ))
}
