//! Customer contact details.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Name/email pair identifying the buyer on an external sale.
///
/// Internal sales carry no contact; this is deliberately not an entity — the
/// business keeps no customer accounts, only the contact captured per sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
}

impl ValueObject for CustomerInfo {}
