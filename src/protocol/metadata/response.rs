//! Parsing and processing for Metadata responses.
//!
//! The response contains metadata for each partition, with
//! partitions grouped together by topic. This metadata
//! refers to brokers by their broker id. The brokers each
//! have a host and port.
//!
//! ### Protocol Def
//! ```text
//! Metadata Response (Version: 12) => throttle_time_ms [brokers] cluster_id controller_id [topics] TAG_BUFFER
//!   throttle_time_ms => INT32
//!   brokers => node_id host port rack TAG_BUFFER
//!     node_id => INT32
//!     host => COMPACT_STRING
//!     port => INT32
//!     rack => COMPACT_NULLABLE_STRING
//!   cluster_id => COMPACT_NULLABLE_STRING
//!   controller_id => INT32
//!   topics => error_code name topic_id is_internal [partitions] topic_authorized_operations TAG_BUFFER
//!     error_code => INT16
//!     name => COMPACT_NULLABLE_STRING
//!     topic_id => UUID
//!     is_internal => BOOLEAN
//!     partitions => error_code partition_index leader_id leader_epoch [replica_nodes] [isr_nodes] [offline_replicas] TAG_BUFFER
//!       error_code => INT16
//!       partition_index => INT32
//!       leader_id => INT32
//!       leader_epoch => INT32
//!       replica_nodes => INT32
//!       isr_nodes => INT32
//!       offline_replicas => INT32
//!     topic_authorized_operations => INT32
//! ```

use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{BrokerProtocolError, Result},
    network::BrokerAddress,
    parser,
};

/// The base Metadata response object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataResponse {
    pub throttle_time_ms: i32,
    /// Each broker in the response.
    pub brokers: Vec<MetadataBroker>,
    pub cluster_id: Option<String>,
    /// The ID of the controller broker, -1 if unknown.
    pub controller_id: i32,
    /// Each topic in the response.
    pub topics: Vec<MetadataTopic>,
}

impl MetadataResponse {
    pub fn is_error(self) -> Result<Self> {
        if let Some(topic) = self.topics.iter().find(|topic| topic.error_code != 0) {
            tracing::error!(
                "ERROR: Kafka Error {} in topic {:?}",
                topic.error_code,
                topic.name
            );
            let message = topic.name.as_ref().map(|name| format!("topic {}", name));
            let error = BrokerProtocolError::new(topic.error_code, message);
            return Err(error.with_partial_result(self).into());
        }
        Ok(self)
    }

    pub fn broker(&self, node_id: i32) -> Option<&MetadataBroker> {
        self.brokers.iter().find(|b| b.node_id == node_id)
    }
}

/// Each broker in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBroker {
    /// The broker ID.
    pub node_id: i32,
    /// The broker hostname.
    pub host: String,
    /// The broker port.
    pub port: i32,
    pub rack: Option<String>,
}

impl MetadataBroker {
    /// The broker address, `None` when the advertised port is not a valid
    /// TCP port.
    pub fn addr(&self) -> Option<BrokerAddress> {
        let port = u16::try_from(self.port).ok()?;
        Some(BrokerAddress::new(self.host.clone(), port))
    }
}

/// Each topic in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTopic {
    /// The topic error, or 0 if there was no error.
    pub error_code: i16,
    pub name: Option<String>,
    pub topic_id: [u8; 16],
    pub is_internal: bool,
    /// Each partition in the topic.
    pub partitions: Vec<MetadataPartition>,
    pub topic_authorized_operations: i32,
}

/// Each partition in the topic.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPartition {
    /// The partition error, or 0 if there was no error.
    pub error_code: i16,
    pub partition_index: i32,
    /// The ID of the leader broker.
    pub leader_id: i32,
    pub leader_epoch: i32,
    pub replica_nodes: Vec<i32>,
    /// The set of nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
    pub offline_replicas: Vec<i32>,
}

pub fn parse_metadata_response(s: NomBytes) -> IResult<NomBytes, MetadataResponse> {
    let (s, _) = parser::parse_tag_buffer(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, brokers) = parser::parse_compact_array(parse_broker)(s)?;
    let (s, cluster_id) = parser::parse_compact_nullable_string(s)?;
    let (s, controller_id) = be_i32(s)?;
    let (s, topics) = parser::parse_compact_array(parse_topic)(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        MetadataResponse {
            throttle_time_ms,
            brokers,
            cluster_id,
            controller_id,
            topics,
        },
    ))
}

fn parse_broker(s: NomBytes) -> IResult<NomBytes, MetadataBroker> {
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_compact_string(s)?;
    let (s, port) = be_i32(s)?;
    let (s, rack) = parser::parse_compact_nullable_string(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        MetadataBroker {
            node_id,
            host,
            port,
            rack,
        },
    ))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, MetadataTopic> {
    let (s, error_code) = be_i16(s)?;
    let (s, name) = parser::parse_compact_nullable_string(s)?;
    let (s, topic_id) = parser::parse_uuid(s)?;
    let (s, is_internal) = parser::parse_bool(s)?;
    let (s, partitions) = parser::parse_compact_array(parse_partition)(s)?;
    let (s, topic_authorized_operations) = be_i32(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        MetadataTopic {
            error_code,
            name,
            topic_id,
            is_internal,
            partitions,
            topic_authorized_operations,
        },
    ))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, MetadataPartition> {
    let (s, error_code) = be_i16(s)?;
    let (s, partition_index) = be_i32(s)?;
    let (s, leader_id) = be_i32(s)?;
    let (s, leader_epoch) = be_i32(s)?;
    let (s, replica_nodes) = parser::parse_compact_array(be_i32)(s)?;
    let (s, isr_nodes) = parser::parse_compact_array(be_i32)(s)?;
    let (s, offline_replicas) = parser::parse_compact_array(be_i32)(s)?;
    let (s, _) = parser::parse_tag_buffer(s)?;

    Ok((
        s,
        MetadataPartition {
            error_code,
            partition_index,
            leader_id,
            leader_epoch,
            replica_nodes,
            isr_nodes,
            offline_replicas,
        },
    ))
}
