//! Quality reviewer identity resolution
//!
//! The store's user lookup may come back blank for accounts that exist in
//! the mail system but not in the QA roster; those resolve to the "N/A"
//! sentinel. The administrative service account always resolves to a fixed
//! identity regardless of what the store says.

use crate::store::StoreUser;
use serde::{Deserialize, Serialize};

/// Sentinel QR identity for accounts the store cannot resolve
pub const UNRESOLVED_QR_ID: &str = "N/A";

/// Designated administrative account
pub const ADMIN_EMAIL: &str = "qa.admin@callaudit.example";
const ADMIN_QR_ID: &str = "QR-0001";
const ADMIN_SITE: &str = "Central QA";

/// A resolved quality reviewer identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reviewer {
    pub qr_id: String,
    pub site_name: String,
    pub email: String,
}

impl Reviewer {
    pub fn admin() -> Self {
        Self {
            qr_id: ADMIN_QR_ID.to_string(),
            site_name: ADMIN_SITE.to_string(),
            email: ADMIN_EMAIL.to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.qr_id != UNRESOLVED_QR_ID
    }
}

pub fn is_admin(email: &str) -> bool {
    email.eq_ignore_ascii_case(ADMIN_EMAIL)
}

/// Resolve a store user row into a reviewer identity
pub fn resolve_reviewer(email: &str, user: &StoreUser) -> Reviewer {
    if is_admin(email) {
        return Reviewer::admin();
    }
    let qr_id = if user.qr_id.is_empty() {
        UNRESOLVED_QR_ID.to_string()
    } else {
        user.qr_id.clone()
    };
    Reviewer {
        qr_id,
        site_name: user.site_name.clone(),
        email: email.to_string(),
    }
}
