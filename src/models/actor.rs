use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// An authenticated caller as resolved by the authentication collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn rider(id: Uuid) -> Self {
        Self::new(id, Role::Rider)
    }

    pub fn driver(id: Uuid) -> Self {
        Self::new(id, Role::Driver)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
