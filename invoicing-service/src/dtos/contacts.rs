use serde::Deserialize;
use validator::Validate;

use super::not_blank;
use crate::models::{dedup_roles, ContactChanges, ContactFilter, ContactRole};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContactRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name is required")
    )]
    pub name: String,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<ContactRole>,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 100, message = "Vendor reference must be at most 100 characters"))]
    pub vendor_reference: Option<String>,
}

impl CreateContactRequest {
    pub fn normalized_roles(&self) -> Vec<ContactRole> {
        dedup_roles(self.roles.clone())
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateContactRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name cannot be blank")
    )]
    pub name: Option<String>,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Option<Vec<ContactRole>>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 100, message = "Vendor reference must be at most 100 characters"))]
    pub vendor_reference: Option<String>,
}

impl From<UpdateContactRequest> for ContactChanges {
    fn from(req: UpdateContactRequest) -> Self {
        ContactChanges {
            name: req.name,
            roles: req.roles,
            email: req.email,
            phone: req.phone,
            address: req.address,
            vendor_reference: req.vendor_reference,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactListParams {
    pub role: Option<ContactRole>,
    #[serde(default)]
    pub include_archived: bool,
}

impl From<ContactListParams> for ContactFilter {
    fn from(params: ContactListParams) -> Self {
        ContactFilter {
            role: params.role,
            include_archived: params.include_archived,
        }
    }
}
