//! Discover which API versions a broker accepts.
//!
//! Sent first on every new connection, before authentication.

pub mod request;
pub mod response;

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use super::{Api, ApiDescriptor};
use crate::error::Result;

pub struct ApiVersions;

impl Api for ApiVersions {
    const DESCRIPTOR: ApiDescriptor = ApiDescriptor {
        name: "ApiVersions",
        api_key: 18,
        api_version: 2,
        flexible: false,
    };

    type Request = request::ApiVersionsRequest;
    type Response = response::ApiVersionsResponse;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()> {
        request::encode_api_versions_request(buffer, request)
    }

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response> {
        response::parse_api_versions_response(s)
    }

    fn check_response(response: Self::Response) -> Result<Self::Response> {
        response.is_error()
    }
}
