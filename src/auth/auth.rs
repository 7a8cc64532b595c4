use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::{
    auth::permission::{Access, PermissionMatrix, PermissionResolver, Section, resolver_for},
    error::AppError,
    model::role::Role,
};

/// Caller identity, placed into request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    pub permissions: PermissionMatrix,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Missing token".to_string())),
        )
    }
}

impl PermissionResolver for AuthUser {
    fn has_permission(&self, section: Section, mode: Access) -> bool {
        resolver_for(self.role, &self.permissions).has_permission(section, mode)
    }
}

impl AuthUser {
    pub fn require(&self, section: Section, mode: Access) -> Result<(), AppError> {
        if self.has_permission(section, mode) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Access denied. Missing {mode} permission for {section}."
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::forbidden("Access denied. Admin only."))
        }
    }

    pub fn require_tutor(&self) -> Result<(), AppError> {
        if self.role == Role::Tutor {
            Ok(())
        } else {
            Err(AppError::forbidden("Access denied. Tutor only."))
        }
    }

    /// Admins see everyone; a tutor only sees their own records.
    pub fn require_self_or_admin(&self, tutor_id: u64) -> Result<(), AppError> {
        if self.role == Role::Admin || (self.role == Role::Tutor && self.user_id == tutor_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("Not authorized to view this report"))
        }
    }

    pub fn is_tutor(&self) -> bool {
        self.role == Role::Tutor
    }
}
