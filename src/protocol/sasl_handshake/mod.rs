//! Announce the SASL mechanism the client is about to use.

pub mod request;
pub mod response;

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use super::{Api, ApiDescriptor};
use crate::error::Result;

pub struct SaslHandshake;

impl Api for SaslHandshake {
    const DESCRIPTOR: ApiDescriptor = ApiDescriptor {
        name: "SaslHandshake",
        api_key: 17,
        api_version: 1,
        flexible: false,
    };

    type Request = request::SaslHandshakeRequest;
    type Response = response::SaslHandshakeResponse;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()> {
        request::encode_sasl_handshake_request(buffer, request)
    }

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response> {
        response::parse_sasl_handshake_response(s)
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

    #[test]
    fn encode() {
        let mut buffer: Vec<u8> = vec![];
        SaslHandshake::encode_request(&mut buffer, &request::SaslHandshakeRequest::new("PLAIN"))
            .unwrap();
        assert_eq!(buffer, [0, 5, b'P', b'L', b'A', b'I', b'N']);
    }

    #[test]
    fn parse() {
        let b = Bytes::from_static(b"\0\0\0\0\0\x01\0\x05PLAIN");
        let res = SaslHandshake::decode_response(b).unwrap();
        assert_eq!(res.mechanisms, vec!["PLAIN".to_owned()]);
    }

    #[test]
    fn parse_unsupported_mechanism() {
        let b = Bytes::from_static(b"\0\x21\0\0\0\x01\0\x0dSCRAM-SHA-512");

        let Err(Error::BrokerProtocol(err)) = SaslHandshake::decode_response(b) else {
            panic!("expected a broker error");
        };
        assert_eq!(err.code, KafkaCode::UnsupportedSaslMechanism);
        assert_eq!(
            err.error_message.as_deref(),
            Some("enabled mechanisms: SCRAM-SHA-512")
        );
    }
}
