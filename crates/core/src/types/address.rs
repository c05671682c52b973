//! Delivery address type.

use serde::{Deserialize, Serialize};

/// Errors that can occur when validating a [`DeliveryAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is missing or blank.
    #[error("address field `{0}` is required")]
    MissingField(&'static str),
}

/// Where an order is shipped.
///
/// The address is opaque to the inventory logic: it is validated for
/// presence only and stored as given (trimmed).
///
/// Fields default to empty so that a request omitting them deserializes and
/// is then rejected by [`DeliveryAddress::validate`] with a precise message.
///
/// ## Examples
///
/// ```
/// use stockroom_core::DeliveryAddress;
///
/// let address = DeliveryAddress::new("Lisbon", "Portugal", "1100-148");
/// assert!(address.validate().is_ok());
///
/// let blank_city = DeliveryAddress::new("  ", "Portugal", "1100-148");
/// assert!(blank_city.validate().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip_code: String,
}

impl DeliveryAddress {
    /// Create an address from its parts.
    #[must_use]
    pub fn new(
        city: impl Into<String>,
        country: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            country: country.into(),
            zip_code: zip_code.into(),
        }
    }

    /// Check that every field is present.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::MissingField` naming the first blank field.
    pub fn validate(&self) -> Result<(), AddressError> {
        for (field, value) in [
            ("city", &self.city),
            ("country", &self.country),
            ("zip_code", &self.zip_code),
        ] {
            if value.trim().is_empty() {
                return Err(AddressError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Validate and return a copy with surrounding whitespace removed.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::MissingField` naming the first blank field.
    pub fn normalized(&self) -> Result<Self, AddressError> {
        self.validate()?;
        Ok(Self::new(
            self.city.trim(),
            self.country.trim(),
            self.zip_code.trim(),
        ))
    }
}
