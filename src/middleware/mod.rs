use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::models::ClientId;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Client already authenticated upstream, identified by `X-Client-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthClient {
    pub client_id: ClientId,
}

impl<S> FromRequestParts<S> for AuthClient
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let client_id = parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<ClientId>().ok())
            .filter(|id| *id > 0)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthClient { client_id })
    }
}
