//! Encoding and creation for Metadata requests.
//!
//! ### Example
//! ```ignore
//! let request = protocol::MetadataRequest::for_topics(&["purchases"]);
//! let metadata = cluster.send_request::<protocol::Metadata>(&request).await?;
//! ```
//!
//! ### Protocol Def
//! ```text
//! Metadata Request (Version: 12) => [topics] allow_auto_topic_creation include_topic_authorized_operations TAG_BUFFER
//!   topics => topic_id name TAG_BUFFER
//!     topic_id => UUID
//!     name => COMPACT_NULLABLE_STRING
//!   allow_auto_topic_creation => BOOLEAN
//!   include_topic_authorized_operations => BOOLEAN
//! ```
//!
//! Note we are using version 12 of the request. A null topic array asks
//! for every topic, an empty one for none.

use bytes::BufMut;

use crate::{
    encode::{self, ToByte},
    error::Result,
};

/// The base Metadata request object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRequest {
    /// The topics to fetch metadata for, `None` for all of them.
    pub topics: Option<Vec<MetadataRequestTopic>>,
    /// If this is true, the broker may auto-create topics that we
    /// requested which do not already exist.
    pub allow_auto_topic_creation: bool,
    /// Whether to include topic authorized operations.
    pub include_topic_authorized_operations: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRequestTopic {
    /// The topic id, all zeroes when looking up by name.
    pub topic_id: [u8; 16],
    pub name: Option<String>,
}

impl MetadataRequest {
    /// Brokers and controller only, no topics.
    pub fn brokers_only() -> Self {
        Self {
            topics: Some(vec![]),
            ..Default::default()
        }
    }

    pub fn all_topics() -> Self {
        Self::default()
    }

    pub fn for_topics<T: AsRef<str>>(topics: &[T]) -> Self {
        let topics = topics
            .iter()
            .map(|name| MetadataRequestTopic {
                topic_id: [0; 16],
                name: Some(name.as_ref().to_owned()),
            })
            .collect();
        Self {
            topics: Some(topics),
            ..Default::default()
        }
    }
}

pub fn encode_metadata_request<W: BufMut>(buffer: &mut W, request: &MetadataRequest) -> Result<()> {
    tracing::trace!("Encoding MetadataRequest {:?}", request);
    encode::encode_empty_tag_buffer(buffer);
    encode::encode_nullable_compact_array(buffer, request.topics.as_deref(), |buffer, topic| {
        buffer.put_slice(&topic.topic_id);
        encode::encode_compact_string(buffer, topic.name.as_deref())?;
        encode::encode_empty_tag_buffer(buffer);
        Ok(())
    })?;
    request.allow_auto_topic_creation.encode(buffer)?;
    request.include_topic_authorized_operations.encode(buffer)?;
    encode::encode_empty_tag_buffer(buffer);
    Ok(())
}
