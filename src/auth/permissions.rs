use anyhow::Error;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ViewOwnPlan,
    LogWorkouts,
    RespondCheckIns,

    ViewAllClients,
    AssignPlans,
    InitiateCheckIns,
    ReviewCheckIns,
    RegisterUsers,

    EditUserRoles,
    EditUserCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Client,
    Coach,
    Admin,
}

static CLIENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewOwnPlan);
    permissions.insert(Permission::LogWorkouts);
    permissions.insert(Permission::RespondCheckIns);

    permissions
});

static COACH_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(CLIENT_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewAllClients);
    permissions.insert(Permission::AssignPlans);
    permissions.insert(Permission::InitiateCheckIns);
    permissions.insert(Permission::ReviewCheckIns);
    permissions.insert(Permission::RegisterUsers);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(COACH_PERMISSIONS.iter().copied());

    permissions.insert(Permission::EditUserRoles);
    permissions.insert(Permission::EditUserCredentials);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Client => &CLIENT_PERMISSIONS,
            Role::Coach => &COACH_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Client => "client",
            Role::Coach => "coach",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "client" => Ok(Role::Client),
            "coach" => Ok(Role::Coach),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
