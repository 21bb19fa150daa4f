use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::config::AuthConfig;
use crate::error::AdminError;

use super::error::ApiError;

// ============================================================================
// Caller identity
// ============================================================================
//
// Token verification happens at the gateway, which forwards the verified
// identity as headers:
//   x-user-id:     caller id (required)
//   x-user-groups: comma-separated group names
//
// ============================================================================

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_GROUPS_HEADER: &str = "x-user-groups";

#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
    pub groups: Vec<String>,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?
            .to_string();

        let groups = headers
            .get(USER_GROUPS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { user_id, groups })
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn is_admin(&self, auth: &AuthConfig) -> bool {
        self.in_group(&auth.admin_group)
    }

    pub fn can_create(&self, auth: &AuthConfig) -> bool {
        self.is_admin(auth) || self.in_group(&auth.creator_group)
    }

    pub fn require_admin(&self, auth: &AuthConfig) -> Result<(), AdminError> {
        if self.is_admin(auth) {
            Ok(())
        } else {
            Err(AdminError::RecordAccessNotAllowed(format!(
                "user {} is not in group {}",
                self.user_id, auth.admin_group
            )))
        }
    }

    /// Creating requires both the creator right and admin membership.
    pub fn require_create(&self, auth: &AuthConfig) -> Result<(), AdminError> {
        if !self.can_create(auth) {
            return Err(AdminError::RecordAccessNotAllowed(format!(
                "user {} may not create enterprises",
                self.user_id
            )));
        }
        self.require_admin(auth)
    }
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Caller::from_headers(req.headers()))
    }
}
