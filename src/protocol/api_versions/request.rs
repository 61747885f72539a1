//! Encoding and creation for API Versions requests.
//!
//! ### Protocol Def
//! ```text
//! ApiVersions Request (Version: 2) =>
//! ```
//!
//! Note we are using version 2 of the request, the body is empty.

use bytes::BufMut;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ApiVersionsRequest;

pub fn encode_api_versions_request<W: BufMut>(
    _buffer: &mut W,
    request: &ApiVersionsRequest,
) -> Result<()> {
    tracing::trace!("Encoding ApiVersionsRequest {:?}", request);
    Ok(())
}
