//! Describes the currently available brokers, their host and port
//! information, and gives information about which broker hosts
//! which partitions.
//!
//! This API answers the following questions:
//! - What topics exist?
//! - How many partitions does each topic have?
//! - Which broker is currently the leader for each partition?
//! - What is the host and port for each of these brokers?
//! - Which broker is the controller?
//!
//! This is the only request that can be addressed to any broker
//! in the cluster.

pub mod request;
pub mod response;

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use super::{Api, ApiDescriptor};
use crate::error::Result;

pub struct Metadata;

impl Api for Metadata {
    const DESCRIPTOR: ApiDescriptor = ApiDescriptor {
        name: "Metadata",
        api_key: 3,
        api_version: 12,
        flexible: true,
    };

    type Request = request::MetadataRequest;
    type Response = response::MetadataResponse;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()> {
        request::encode_metadata_request(buffer, request)
    }

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response> {
        response::parse_metadata_response(s)
    }

    fn check_response(response: Self::Response) -> Result<Self::Response> {
        response.is_error()
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::error::{Error, KafkaCode};

    fn response_bytes(topic_error: u8) -> Bytes {
        let mut b: Vec<u8> = vec![0, 0, 0, 0, 0];
        // brokers
        b.extend_from_slice(&[2, 0, 0, 0, 1, 10]);
        b.extend_from_slice(b"localhost");
        b.extend_from_slice(&[0, 0, 0x23, 0x84, 0, 0]);
        // cluster id, controller
        b.extend_from_slice(&[4, b'a', b'b', b'c', 0, 0, 0, 1]);
        // topics
        b.extend_from_slice(&[2, 0, topic_error, 10]);
        b.extend_from_slice(b"purchases");
        b.extend_from_slice(&[0; 16]);
        b.push(0);
        // one partition: error, index, leader, epoch, replicas, isr, offline, tags
        b.extend_from_slice(&[2, 0, 0]);
        b.extend_from_slice(&[0, 0, 0, 0]);
        b.extend_from_slice(&[0, 0, 0, 1]);
        b.extend_from_slice(&[0, 0, 0, 0]);
        b.extend_from_slice(&[2, 0, 0, 0, 1, 2, 0, 0, 0, 1, 1, 0]);
        b.extend_from_slice(&[0x80, 0, 0, 0, 0, 0]);
        Bytes::from(b)
    }

    #[test]
    fn encode() {
        let req = request::MetadataRequest::for_topics(&["purchases"]);
        let mut buffer: Vec<u8> = vec![];
        Metadata::encode_request(&mut buffer, &req).unwrap();

        let mut b = vec![0, 2];
        b.extend_from_slice(&[0; 16]);
        b.push(10);
        b.extend_from_slice(b"purchases");
        b.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(buffer, b);
    }

    #[test]
    fn encode_all_and_none() {
        let mut buffer: Vec<u8> = vec![];
        Metadata::encode_request(&mut buffer, &request::MetadataRequest::all_topics()).unwrap();
        assert_eq!(buffer, [0, 0, 0, 0, 0]);

        let mut buffer: Vec<u8> = vec![];
        Metadata::encode_request(&mut buffer, &request::MetadataRequest::brokers_only()).unwrap();
        assert_eq!(buffer, [0, 1, 0, 0, 0]);
    }

    #[test]
    fn parse() {
        let metadata = Metadata::decode_response(response_bytes(0)).unwrap();

        assert_eq!(metadata.controller_id, 1);
        assert_eq!(metadata.cluster_id.as_deref(), Some("abc"));
        assert_eq!(
            metadata.brokers,
            vec![response::MetadataBroker {
                node_id: 1,
                host: "localhost".to_owned(),
                port: 9092,
                rack: None,
            }]
        );
        assert_eq!(metadata.topics.len(), 1);

        let topic = &metadata.topics[0];
        assert_eq!(topic.name.as_deref(), Some("purchases"));
        assert_eq!(topic.topic_authorized_operations, i32::MIN);
        assert_eq!(
            topic.partitions,
            vec![response::MetadataPartition {
                error_code: 0,
                partition_index: 0,
                leader_id: 1,
                leader_epoch: 0,
                replica_nodes: vec![1],
                isr_nodes: vec![1],
                offline_replicas: vec![],
            }]
        );
        assert_eq!(metadata.broker(1).unwrap().addr().unwrap().to_string(), "localhost:9092");
    }

    #[test]
    fn out_of_range_port_has_no_address() {
        let mut broker = response::MetadataBroker {
            node_id: 1,
            host: "localhost".to_owned(),
            port: 70000,
            rack: None,
        };
        assert_eq!(broker.addr(), None);
        broker.port = -1;
        assert_eq!(broker.addr(), None);
        broker.port = 65535;
        assert_eq!(broker.addr().unwrap().port, 65535);
    }

    #[test]
    fn parse_topic_error() {
        let err = Metadata::decode_response(response_bytes(3)).unwrap_err();
        let Error::BrokerProtocol(err) = err else {
            panic!("expected a broker error, got {:?}", err);
        };
        assert_eq!(err.code, KafkaCode::UnknownTopicOrPartition);
        assert_eq!(err.error_message.as_deref(), Some("topic purchases"));
        assert_eq!(
            err.partial_result::<response::MetadataResponse>()
                .unwrap()
                .controller_id,
            1
        );
    }
}
