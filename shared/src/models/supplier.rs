//! Supplier models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::SupplierId;

/// A supplier of stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a supplier
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSupplier {
    #[serde(alias = "supplier_name")]
    #[validate(length(min = 1, max = 200, message = "Supplier name is required"))]
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Patch for supplier fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SupplierUpdate {
    #[serde(alias = "supplier_name")]
    #[validate(length(min = 1, max = 200, message = "Supplier name is required"))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplier_email_validation() {
        let mut supplier = NewSupplier {
            name: "Aqua Feeds Ltd".into(),
            contact_person: None,
            phone: None,
            email: Some("orders@aquafeeds.in".into()),
            address: None,
        };
        assert!(supplier.validate().is_ok());

        supplier.email = Some("not-an-email".into());
        assert!(supplier.validate().is_err());

        supplier.email = None;
        assert!(supplier.validate().is_ok());
    }
}
