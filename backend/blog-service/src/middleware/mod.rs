/// Request identity for blog-service
///
/// The gateway in front of this service authenticates the caller and passes
/// the user ID along in the `x-user-id` header.
use crate::error::AppError;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

impl UserId {
    fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let raw = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".into()))?;

        let value = raw
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".into()))?;

        Uuid::parse_str(value.trim())
            .map(UserId)
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header value".into()))
    }
}

impl FromRequest for UserId {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(UserId::from_headers(req))
    }
}
