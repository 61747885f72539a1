//! Locate the current coordinator of a group or transaction.

pub mod request;
pub mod response;

use bytes::BufMut;
use nom::IResult;
use nombytes::NomBytes;

use super::{Api, ApiDescriptor};
use crate::error::Result;

pub struct FindCoordinator;

impl Api for FindCoordinator {
    const DESCRIPTOR: ApiDescriptor = ApiDescriptor {
        name: "FindCoordinator",
        api_key: 10,
        api_version: 4,
        flexible: true,
    };

    type Request = request::FindCoordinatorRequest;
    type Response = response::FindCoordinatorResponse;

    fn encode_request<W: BufMut>(buffer: &mut W, request: &Self::Request) -> Result<()> {
        request::encode_find_coordinator_request(buffer, request)
    }

    fn parse_response(s: NomBytes) -> IResult<NomBytes, Self::Response> {
        response::parse_find_coordinator_response(s)
    }

    fn check_response(response: Self::Response) -> Result<Self::Response> {
        response.is_error()
    }
}
