//! Encoding and creation for Find Coordinator requests.
//!
//! The offsets for a given consumer group are maintained by a
//! specific broker called the group coordinator. i.e., a consumer
//! needs to issue its offset commit and fetch requests to this
//! specific broker. It can discover the current coordinator by
//! issuing a group coordinator request. Transactional producers
//! locate their transaction coordinator the same way.
//!
//! ### Example
//! ```ignore
//! let request = protocol::FindCoordinatorRequest::group(group_id);
//! let response = broker.send_request::<protocol::FindCoordinator>(&request).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! FindCoordinator Request (Version: 4) => key_type [coordinator_keys] TAG_BUFFER
//!   key_type => INT8
//!   coordinator_keys => COMPACT_STRING
//! ```
//!
//! Note we are using version 4 of the request, which is preceded by the
//! request header tag buffer.

use bytes::BufMut;

use crate::{
    encode::{self, ToByte},
    error::Result,
};

/// What kind of coordinator is being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Group = 0,
    Transaction = 1,
}

/// The base Find Coordinator request object.
#[derive(Debug, Clone, PartialEq)]
pub struct FindCoordinatorRequest {
    /// The coordinator key type.
    pub key_type: KeyType,
    /// The coordinator keys.
    pub keys: Vec<String>,
}

impl FindCoordinatorRequest {
    pub fn new(key_type: KeyType, keys: Vec<String>) -> Self {
        Self { key_type, keys }
    }

    /// Look up the coordinator of a single consumer group.
    pub fn group(group_id: &str) -> Self {
        Self::new(KeyType::Group, vec![group_id.to_owned()])
    }

    pub fn transaction(transactional_id: &str) -> Self {
        Self::new(KeyType::Transaction, vec![transactional_id.to_owned()])
    }
}

pub fn encode_find_coordinator_request<W: BufMut>(
    buffer: &mut W,
    request: &FindCoordinatorRequest,
) -> Result<()> {
    tracing::trace!("Encoding FindCoordinatorRequest {:?}", request);
    encode::encode_empty_tag_buffer(buffer);
    (request.key_type as i8).encode(buffer)?;
    encode::encode_compact_array(buffer, &request.keys, |buffer, key| {
        encode::encode_compact_string(buffer, Some(key))
    })?;
    encode::encode_empty_tag_buffer(buffer);
    Ok(())
}
