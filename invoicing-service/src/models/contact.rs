//! Contact (customer / vendor) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactRole {
    Customer,
    Vendor,
}

impl ContactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactRole::Customer => "customer",
            ContactRole::Vendor => "vendor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(ContactRole::Customer),
            "vendor" => Some(ContactRole::Vendor),
            _ => None,
        }
    }
}

/// A customer or vendor, unique by email within its organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub roles: Vec<ContactRole>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub vendor_reference: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn has_role(&self, role: ContactRole) -> bool {
        self.roles.contains(&role)
    }

    /// Add a role if missing. Returns true when the role set changed.
    pub fn grant_role(&mut self, role: ContactRole) -> bool {
        if self.has_role(role) {
            return false;
        }
        self.roles.push(role);
        self.updated_at = Utc::now();
        true
    }
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ContactChanges {
    pub name: Option<String>,
    pub roles: Option<Vec<ContactRole>>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub vendor_reference: Option<String>,
}

impl ContactChanges {
    pub fn apply_to(self, contact: &mut Contact) {
        if let Some(name) = self.name {
            contact.name = name;
        }
        if let Some(roles) = self.roles {
            contact.roles = dedup_roles(roles);
        }
        if let Some(email) = self.email {
            contact.email = email;
        }
        if let Some(phone) = self.phone {
            contact.phone = Some(phone);
        }
        if let Some(address) = self.address {
            contact.address = Some(address);
        }
        if let Some(vendor_reference) = self.vendor_reference {
            contact.vendor_reference = Some(vendor_reference);
        }
        contact.updated_at = Utc::now();
    }
}

/// Remove duplicate roles, keeping first-seen order.
pub fn dedup_roles(roles: Vec<ContactRole>) -> Vec<ContactRole> {
    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        if !out.contains(&role) {
            out.push(role);
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub role: Option<ContactRole>,
    pub include_archived: bool,
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        (self.include_archived || !contact.archived)
            && self.role.map_or(true, |role| contact.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        let now = Utc::now();
        Contact {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            roles: vec![ContactRole::Vendor],
            email: "ap@acme.test".to_string(),
            phone: Some("555-0100".to_string()),
            address: None,
            vendor_reference: Some("V-1".to_string()),
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn omitted_fields_are_kept() {
        let mut c = contact();
        ContactChanges {
            name: Some("Acme Ltd".to_string()),
            ..Default::default()
        }
        .apply_to(&mut c);

        assert_eq!(c.name, "Acme Ltd");
        assert_eq!(c.email, "ap@acme.test");
        assert_eq!(c.phone.as_deref(), Some("555-0100"));
        assert_eq!(c.vendor_reference.as_deref(), Some("V-1"));
        assert_eq!(c.roles, vec![ContactRole::Vendor]);
    }

    #[test]
    fn grant_role_is_idempotent() {
        let mut c = contact();
        assert!(c.grant_role(ContactRole::Customer));
        assert!(!c.grant_role(ContactRole::Customer));
        assert_eq!(c.roles, vec![ContactRole::Vendor, ContactRole::Customer]);
    }
}
