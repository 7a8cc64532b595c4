use serde::{Deserialize, Serialize};

use crate::{auth::permission::PermissionMatrix, model::role::Role};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Tutor, admin or supervisor id, depending on `role`
    pub user_id: u64,
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Section grants; only meaningful for supervisors
    #[serde(default)]
    pub permissions: PermissionMatrix,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
