//! Responsible-party resolution.

use uuid::Uuid;

use crate::domain::models::{PartNumberRequest, Role};

/// The employee currently filling `role` on `request`.
///
/// `Requester` resolves to the request creator, slotted roles to their slot and
/// administrative roles to nobody. `None` means "not currently assigned".
pub fn resolve(role: Role, request: &PartNumberRequest) -> Option<Uuid> {
    role.slot().and_then(|slot| request.slot(slot))
}
