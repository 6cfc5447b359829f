//! Part-number request model.
//!
//! The request is owned by the surrounding CRUD layer. The release workflow only
//! reads its employee slots, creator and comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::RoleSlot;

/// A request for a new part number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartNumberRequest {
    pub id: Uuid,
    pub part_number: String,
    /// Customer the part number is requested for.
    pub customer_code: Option<String>,
    /// Employee who created the request (the Requester).
    pub created_by: Option<Uuid>,
    pub product_manager: Option<Uuid>,
    pub product_specialist: Option<Uuid>,
    /// Free-text comments. A denial needs these or an explicit comment.
    pub comments: Option<String>,
    /// Optimistic concurrency token, bumped on every successful save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartNumberRequest {
    /// Create a new request with empty role slots.
    pub fn new(part_number: impl Into<String>, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            part_number: part_number.into(),
            customer_code: None,
            created_by: Some(created_by),
            product_manager: None,
            product_specialist: None,
            comments: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_product_manager(mut self, employee: Uuid) -> Self {
        self.product_manager = Some(employee);
        self
    }

    pub fn with_product_specialist(mut self, employee: Uuid) -> Self {
        self.product_specialist = Some(employee);
        self
    }

    pub fn with_customer(mut self, customer_code: impl Into<String>) -> Self {
        self.customer_code = Some(customer_code.into());
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    /// Read the employee occupying a slot.
    pub const fn slot(&self, slot: RoleSlot) -> Option<Uuid> {
        match slot {
            RoleSlot::ProductManager => self.product_manager,
            RoleSlot::ProductSpecialist => self.product_specialist,
            RoleSlot::Creator => self.created_by,
        }
    }

    /// Assign (or clear) the employee occupying a slot.
    pub fn set_slot(&mut self, slot: RoleSlot, employee: Option<Uuid>) {
        let field = match slot {
            RoleSlot::ProductManager => &mut self.product_manager,
            RoleSlot::ProductSpecialist => &mut self.product_specialist,
            RoleSlot::Creator => &mut self.created_by,
        };
        *field = employee;
    }

    /// Clear every slot held by `employee`. Returns how many slots changed.
    pub fn clear_employee(&mut self, employee: Uuid) -> usize {
        let mut cleared = 0;
        for slot in [RoleSlot::ProductManager, RoleSlot::ProductSpecialist, RoleSlot::Creator] {
            if self.slot(slot) == Some(employee) {
                self.set_slot(slot, None);
                cleared += 1;
            }
        }
        cleared
    }

    /// Whether the request carries non-blank comments.
    pub fn has_comments(&self) -> bool {
        self.comments.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}
