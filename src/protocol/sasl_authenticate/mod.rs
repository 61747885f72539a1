//! Exchange SASL authentication bytes with the broker.

pub mod request;
pub mod response;

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use super::{Api, ApiDescriptor};
use crate::error::Result;

pub struct SaslAuthenticate;

impl Api for SaslAuthenticate {
    const DESCRIPTOR: ApiDescriptor = ApiDescriptor {
        name: "SaslAuthenticate",
        api_key: 36,
        api_version: 2,
        flexible: true,
    };

    type Request = request::SaslAuthenticateRequest;
    type Response = response::SaslAuthenticateResponse;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()> {
        request::encode_sasl_authenticate_request(buffer, request)
    }

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response> {
        response::parse_sasl_authenticate_response(s)
    }

    fn check_response(response: Self::Response) -> Result<Self::Response> {
        response.is_error()
    }
}
