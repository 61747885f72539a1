//! Parsing and processing for API Versions responses.
//!
//! ### Protocol Def
//! ```text
//! ApiVersions Response (Version: 2) => error_code [api_keys] throttle_time_ms
//!   error_code => INT16
//!   api_keys => api_key min_version max_version
//!     api_key => INT16
//!     min_version => INT16
//!     max_version => INT16
//!   throttle_time_ms => INT32
//! ```
//!
//! A broker that does not speak version 2 answers with version 0, an
//! `UNSUPPORTED_VERSION` error code and its supported ranges. The
//! throttle time is then missing and parses as zero.

use nom::{
    combinator::opt,
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{BrokerProtocolError, Result},
    parser,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiVersionsResponse {
    /// The top-level error code.
    pub error_code: i16,
    /// The APIs supported by the broker.
    pub api_keys: Vec<ApiVersionRange>,
    pub throttle_time_ms: i32,
}

/// Range of versions the broker accepts for one api key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersionRange {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
}

impl ApiVersionRange {
    pub fn contains(&self, version: i16) -> bool {
        self.min_version <= version && version <= self.max_version
    }
}

impl ApiVersionsResponse {
    pub fn is_error(self) -> Result<Self> {
        if self.error_code != 0 {
            tracing::error!("ERROR: Kafka Error {} in ApiVersions", self.error_code);
            let error = BrokerProtocolError::new(self.error_code, None);
            return Err(error.with_partial_result(self).into());
        }
        Ok(self)
    }
}

pub fn parse_api_versions_response(s: NomBytes) -> IResult<NomBytes, ApiVersionsResponse> {
    let (s, error_code) = be_i16(s)?;
    let (s, api_keys) = parser::parse_array(parse_api_version_range)(s)?;
    let (s, throttle_time_ms) = opt(be_i32)(s)?;

    Ok((
        s,
        ApiVersionsResponse {
            error_code,
            api_keys,
            throttle_time_ms: throttle_time_ms.unwrap_or_default(),
        },
    ))
}

fn parse_api_version_range(s: NomBytes) -> IResult<NomBytes, ApiVersionRange> {
    let (s, api_key) = be_i16(s)?;
    let (s, min_version) = be_i16(s)?;
    let (s, max_version) = be_i16(s)?;

    Ok((
        s,
        ApiVersionRange {
            api_key,
            min_version,
            max_version,
        },
    ))
}
