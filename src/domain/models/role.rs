//! Role catalog for the release flow.
//!
//! The catalog is closed and ordered. Each role either maps to a slot on the
//! part-number request (the employee filling that role for the request) or is
//! administrative and has no slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A participant category in the release chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Administrative SLC employee. Has no request slot.
    SlcEmployee,
    /// Administrative SJP employee. Has no request slot.
    SjpEmployee,
    ProductManager,
    ProductSpecialist,
    /// The employee who created the request. Implicit start and end of every flow.
    Requester,
}

/// A named employee slot on a part-number request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleSlot {
    ProductManager,
    ProductSpecialist,
    Creator,
}

impl Role {
    /// All roles in catalog order.
    pub const ALL: [Role; 5] = [
        Role::SlcEmployee,
        Role::SjpEmployee,
        Role::ProductManager,
        Role::ProductSpecialist,
        Role::Requester,
    ];

    /// The request slot holding the employee for this role, if any.
    pub const fn slot(self) -> Option<RoleSlot> {
        match self {
            Self::ProductManager => Some(RoleSlot::ProductManager),
            Self::ProductSpecialist => Some(RoleSlot::ProductSpecialist),
            Self::Requester => Some(RoleSlot::Creator),
            Self::SlcEmployee | Self::SjpEmployee => None,
        }
    }

    /// Whether this role may appear as a stop in a release flow.
    ///
    /// The requester is never a mid-chain stop and administrative roles have
    /// nobody to resolve to.
    pub const fn can_be_release_step(self) -> bool {
        !matches!(self, Self::Requester) && self.slot().is_some()
    }

    /// Human-readable name shown to users.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::SlcEmployee => "SLC Employee",
            Self::SjpEmployee => "SJP Employee",
            Self::ProductManager => "Product Manager",
            Self::ProductSpecialist => "Product Specialist",
            Self::Requester => "Request Creator",
        }
    }

    /// Stable storage key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlcEmployee => "slc_employee",
            Self::SjpEmployee => "sjp_employee",
            Self::ProductManager => "product_manager",
            Self::ProductSpecialist => "product_specialist",
            Self::Requester => "requester",
        }
    }

    /// Roles a caller may put into a release flow, in catalog order.
    pub fn release_step_roles() -> impl Iterator<Item = Role> {
        Self::ALL.into_iter().filter(|r| r.can_be_release_step())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "slc_employee" | "slc" => Ok(Self::SlcEmployee),
            "sjp_employee" | "sjp" => Ok(Self::SjpEmployee),
            "product_manager" | "pm" => Ok(Self::ProductManager),
            "product_specialist" | "ps" => Ok(Self::ProductSpecialist),
            "requester" | "request_creator" => Ok(Self::Requester),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}
