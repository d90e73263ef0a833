//! Patient models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A patient record keyed by its personal health number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patient {
    /// Personal health number, unique across the store
    pub phn: u64,
    /// Full name
    pub name: String,
    /// Birth date as entered (not calendar-validated)
    pub birth_date: String,
    /// Contact phone
    pub phone: String,
    /// Contact email
    pub email: String,
    /// Home address
    pub address: String,
}

/// The mutable, non-key attributes of a patient.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatientFields {
    pub name: String,
    pub birth_date: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

impl PatientFields {
    pub fn new(
        name: impl Into<String>,
        birth_date: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            birth_date: birth_date.into(),
            phone: phone.into(),
            email: email.into(),
            address: address.into(),
        }
    }
}

impl Patient {
    /// Create a patient from its identifier and attributes.
    pub fn new(phn: u64, fields: PatientFields) -> Self {
        Self {
            phn,
            name: fields.name,
            birth_date: fields.birth_date,
            phone: fields.phone,
            email: fields.email,
            address: fields.address,
        }
    }

    /// Overwrite every non-key attribute in place.
    pub fn apply(&mut self, fields: PatientFields) {
        self.name = fields.name;
        self.birth_date = fields.birth_date;
        self.phone = fields.phone;
        self.email = fields.email;
        self.address = fields.address;
    }

    /// Case-sensitive substring match on the name.
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.contains(needle)
    }
}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; {}; {}; {}; {}; {}",
            self.phn, self.name, self.birth_date, self.phone, self.email, self.address
        )
    }
}
