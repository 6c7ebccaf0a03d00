use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub archived: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub archived: Option<bool>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            role: Role::from_str(&user.role.unwrap_or_default()).unwrap_or(Role::Client),
            display_name: user.display_name.unwrap_or_default(),
            archived: user.archived.unwrap_or_default(),
        }
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "{:?} permission required",
                permission
            )))
        }
    }

    pub fn require_all_permissions(&self, permissions: &[Permission]) -> Result<(), AppError> {
        if permissions.iter().all(|p| self.role.has_permission(*p)) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permissions = ?permissions,
                "Permission denied (require all)"
            );
            Err(AppError::Authorization(format!(
                "{:?} permissions required",
                permissions
            )))
        }
    }
}
