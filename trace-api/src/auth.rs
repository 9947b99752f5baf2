//! Acting-user extraction.
//!
//! Authentication is owned by the upstream gateway; requests arrive with
//! trusted `x-actor-id` and `x-actor-role` headers identifying who acts.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use trace_core::types::{Actor, Role, UserId};

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated actor behind the current request
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, ACTOR_ID_HEADER)?
            .parse::<UserId>()
            .map_err(|_| {
                ApiError::Unauthorized(format!("{} is not a valid user id", ACTOR_ID_HEADER))
            })?;
        let role = header_value(parts, ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|_| {
                ApiError::Unauthorized(format!("{} is not a valid role", ACTOR_ROLE_HEADER))
            })?;

        Ok(CurrentActor(Actor::new(user_id, role)))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", name)))
}
