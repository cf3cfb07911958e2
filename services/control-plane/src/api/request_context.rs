//! Request-scoped context extracted from HTTP requests.
//!
//! Authentication happens in front of the control plane. The auth layer
//! forwards the caller identity in [`OWNER_HEADER`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use hearth_id::RequestId;

use crate::api::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const OWNER_HEADER: &str = "x-owner-id";

const MAX_OWNER_LEN: usize = 320;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub owner: Option<String>,
}

impl RequestContext {
    /// The caller identity, or 401 when the auth layer did not set one.
    pub fn require_owner(&self) -> Result<&str, ApiError> {
        self.owner.as_deref().ok_or_else(|| {
            ApiError::unauthorized("missing_owner", format!("{OWNER_HEADER} header is required"))
                .with_request_id(self.request_id.clone())
        })
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| RequestId::new().to_string());

        let owner = header_string(&parts.headers, OWNER_HEADER);
        if let Some(owner) = &owner {
            if owner.len() > MAX_OWNER_LEN {
                return Err(ApiError::bad_request(
                    "invalid_owner",
                    format!("{OWNER_HEADER} must be at most {MAX_OWNER_LEN} characters"),
                )
                .with_request_id(request_id));
            }
        }

        Ok(Self { request_id, owner })
    }
}
