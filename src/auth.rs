//! Login gate. There is no credential store: any non-blank ID and password
//! are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub id: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub role: Role,
}

pub fn login(request: LoginRequest) -> Result<User> {
    let username = request.id.trim();
    if username.is_empty() || request.password.trim().is_empty() {
        return Err(HiveError::InvalidCredentials);
    }

    tracing::info!(username = %username, role = ?request.role, "User logged in");
    Ok(User {
        username: username.to_string(),
        role: request.role,
    })
}
