//! Parsing and processing for Find Coordinator responses.
//!
//! ### Protocol Def
//! ```text
//! FindCoordinator Response (Version: 4) => throttle_time_ms [coordinators] TAG_BUFFER
//!   throttle_time_ms => INT32
//!   coordinators => key node_id host port error_code error_message TAG_BUFFER
//!     key => COMPACT_STRING
//!     node_id => INT32
//!     host => COMPACT_STRING
//!     port => INT32
//!     error_code => INT16
//!     error_message => COMPACT_NULLABLE_STRING
//! ```
//!
//! Note we are using version 4 of the response, which is preceded by the
//! response header tag buffer.

use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{BrokerProtocolError, Result},
    parser,
};

/// The base Find Coordinator response object.
#[derive(Debug, Clone, PartialEq)]
pub struct FindCoordinatorResponse {
    /// The duration in milliseconds for which the request was throttled.
    pub throttle_time_ms: i32,
    /// Each coordinator that was looked up.
    pub coordinators: Vec<Coordinator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinator {
    /// The coordinator key.
    pub key: String,
    /// The node id, or -1 if it was not found.
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: i16,
    pub error_message: Option<String>,
}

impl FindCoordinatorResponse {
    /// Fails on the first coordinator that reported an error.
    pub fn is_error(self) -> Result<Self> {
        if let Some(failed) = self.coordinators.iter().find(|c| c.error_code != 0) {
            tracing::error!(
                "ERROR: Kafka Error {} finding coordinator for {:?}",
                failed.error_code,
                failed.key
            );
            let error = BrokerProtocolError::new(failed.error_code, failed.error_message.clone());
            return Err(error.with_partial_result(self).into());
        }
        Ok(self)
    }
}

pub fn parse_find_coordinator_response(s: NomBytes) -> IResult<NomBytes, FindCoordinatorResponse> {
    let (s, _) = parser::parse_tag_buffer(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, coordinators) = parser::parse_compact_array(parse_coordinator)(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        FindCoordinatorResponse {
            throttle_time_ms,
            coordinators,
        },
    ))
}

fn parse_coordinator(s: NomBytes) -> IResult<NomBytes, Coordinator> {
    let (s, key) = parser::parse_compact_string(s)?;
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_compact_string(s)?;
    let (s, port) = be_i32(s)?;
    let (s, error_code) = be_i16(s)?;
    let (s, error_message) = parser::parse_compact_nullable_string(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        Coordinator {
            key,
            node_id,
            host,
            port,
            error_code,
            error_message,
        },
    ))
}
