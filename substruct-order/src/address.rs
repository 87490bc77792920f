use serde::{Deserialize, Serialize};
use substruct_core::payment::BillingDetails;

const US_STATES: &[&str] = &[
    "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "GU", "HI", "IA", "ID", "IL",
    "IN", "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE", "NH",
    "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "PR", "RI", "SC", "SD", "TN", "TX", "UT", "VA",
    "VI", "VT", "WA", "WI", "WV", "WY",
];

const US_NAMES: &[&str] = &["UNITED STATES OF AMERICA", "UNITED STATES", "USA", "US"];

const MAX_NAME_LEN: usize = 50;
const MAX_ADDRESS_LEN: usize = 255;

/// Billing or shipping address attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    /// Street address.
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub zip: String,
    pub country: String,
    pub telephone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("{0} can't be blank")]
    Blank(&'static str),

    #[error("{field} is too long (maximum is {max} characters)")]
    TooLong { field: &'static str, max: usize },

    #[error("Sorry, we don't ship to P.O. boxes")]
    PoBox,

    #[error("Please enter a valid zip")]
    InvalidZip,

    #[error("Please use a US state abbreviation")]
    InvalidState,
}

impl Address {
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_us(&self) -> bool {
        US_NAMES.contains(&self.country.trim().to_uppercase().as_str())
    }

    /// Upper-cases US state abbreviations and trims every field.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.first_name,
            &mut self.last_name,
            &mut self.address,
            &mut self.city,
            &mut self.state,
            &mut self.zip,
            &mut self.country,
            &mut self.telephone,
        ] {
            *field = field.trim().to_string();
        }
        if self.is_us() {
            self.state = self.state.to_uppercase();
        }
    }

    /// Returns the first problem found. Expects a normalized address.
    pub fn validate(&self) -> Result<(), AddressError> {
        let required = [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("address", &self.address),
            ("zip", &self.zip),
            ("country", &self.country),
            ("telephone", &self.telephone),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AddressError::Blank(field));
            }
        }

        if self.first_name.chars().count() > MAX_NAME_LEN {
            return Err(AddressError::TooLong { field: "first name", max: MAX_NAME_LEN });
        }
        if self.last_name.chars().count() > MAX_NAME_LEN {
            return Err(AddressError::TooLong { field: "last name", max: MAX_NAME_LEN });
        }
        if self.address.chars().count() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong { field: "address", max: MAX_ADDRESS_LEN });
        }

        if is_po_box(&self.address) {
            return Err(AddressError::PoBox);
        }

        if self.is_us() {
            if self.city.trim().is_empty() {
                return Err(AddressError::Blank("city"));
            }
            if self.state.trim().is_empty() {
                return Err(AddressError::Blank("state"));
            }
            if self.zip.chars().count() < 5 || !self.zip.chars().take(5).all(|c| c.is_ascii_digit()) {
                return Err(AddressError::InvalidZip);
            }
            if !US_STATES.contains(&self.state.to_uppercase().as_str()) {
                return Err(AddressError::InvalidState);
            }
        }

        Ok(())
    }

    pub fn to_billing_details(&self) -> BillingDetails {
        BillingDetails {
            address1: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            country: self.country.clone(),
        }
    }
}

/// `local@domain.tld` with a letters-only top level domain of at least two characters.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };

    !rest.is_empty()
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && rest
            .iter()
            .all(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// P.O. box and military (APO/AFO) addresses, with or without dots and spaces.
fn is_po_box(address: &str) -> bool {
    let cleaned = address.to_uppercase().replace('.', " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    words.iter().any(|w| matches!(*w, "POBOX" | "PBOX" | "APO" | "AFO"))
        || words
            .windows(2)
            .any(|w| matches!((w[0], w[1]), ("PO", "BOX") | ("P", "BOX") | ("P", "OBOX")))
        || words.windows(3).any(|w| {
            matches!((w[0], w[1], w[2]), ("P", "O", "BOX") | ("A", "P", "O") | ("A", "F", "O"))
        })
}
