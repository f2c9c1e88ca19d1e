//! Translation of cart user errors into wallet field errors.
//!
//! The table is data: a default set ships with the crate and configuration
//! can add rules that are checked first. Errors that no rule covers are left
//! to the orchestrator, which treats them as hard failures.

use crate::domain::model::{
    UserError, WalletAddressField, WalletContactField, WalletFieldError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTarget {
    Email,
    Phone,
    Name,
    Street,
    SubLocality,
    City,
    State,
    PostalCode,
    Country,
    Unserviceable,
}

/// Which wallet address a mutation's errors refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRole {
    Shipping,
    Billing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMappingRule {
    pub code: String,
    /// Last segment of the error's field path. `None` matches any field.
    #[serde(default)]
    pub field: Option<String>,
    pub target: ErrorTarget,
}

impl ErrorMappingRule {
    pub fn new(code: &str, field: Option<&str>, target: ErrorTarget) -> Self {
        Self {
            code: code.to_string(),
            field: field.map(str::to_string),
            target,
        }
    }

    fn matches(&self, error: &UserError) -> bool {
        if error.code.as_deref() != Some(self.code.as_str()) {
            return false;
        }
        match &self.field {
            Some(field) => error.field.last().map(String::as_str) == Some(field.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorMap {
    rules: Vec<ErrorMappingRule>,
}

impl Default for ValidationErrorMap {
    fn default() -> Self {
        use ErrorTarget::*;

        let rules = [
            ("INVALID", Some("email"), Email),
            ("BUYER_IDENTITY_EMAIL_IS_INVALID", None, Email),
            ("INVALID", Some("phone"), Phone),
            ("BUYER_IDENTITY_PHONE_IS_INVALID", None, Phone),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("firstName"), Name),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("lastName"), Name),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("address1"), Street),
            ("ADDRESS_FIELD_IS_TOO_LONG", Some("address1"), Street),
            ("ADDRESS_FIELD_IS_TOO_LONG", Some("address2"), Street),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("city"), City),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("zip"), PostalCode),
            ("INVALID_ZIP_CODE_FOR_COUNTRY", None, PostalCode),
            ("INVALID_ZIP_CODE_FOR_PROVINCE", None, PostalCode),
            ("ZIP_CODE_NOT_SUPPORTED", None, PostalCode),
            ("INVALID_PROVINCE_IN_COUNTRY", None, State),
            ("ADDRESS_FIELD_IS_REQUIRED", Some("province"), State),
            ("INVALID_COUNTRY", None, Country),
            ("DELIVERY_NO_DELIVERY_AVAILABLE", None, Unserviceable),
        ]
        .into_iter()
        .map(|(code, field, target)| ErrorMappingRule::new(code, field, target))
        .collect();

        Self { rules }
    }
}

impl ValidationErrorMap {
    /// Default table with `overrides` consulted before the built-in rules.
    pub fn with_overrides(overrides: Vec<ErrorMappingRule>) -> Self {
        let mut rules = overrides;
        rules.extend(Self::default().rules);
        Self { rules }
    }

    pub fn rules(&self) -> &[ErrorMappingRule] {
        &self.rules
    }

    pub fn target_for(&self, error: &UserError) -> Option<ErrorTarget> {
        self.rules
            .iter()
            .find(|rule| rule.matches(error))
            .map(|rule| rule.target)
    }

    /// Translates the whole error list, or returns `None` when the list is
    /// empty or any entry has no rule.
    pub fn translate(
        &self,
        errors: &[UserError],
        role: AddressRole,
    ) -> Option<Vec<WalletFieldError>> {
        if errors.is_empty() {
            return None;
        }
        errors
            .iter()
            .map(|error| {
                self.target_for(error)
                    .map(|target| to_wallet_error(target, role, error.message.clone()))
            })
            .collect()
    }
}

fn to_wallet_error(target: ErrorTarget, role: AddressRole, message: String) -> WalletFieldError {
    let address_field = match target {
        ErrorTarget::Email => {
            return WalletFieldError::ContactInvalid {
                field: WalletContactField::EmailAddress,
                message,
            }
        }
        ErrorTarget::Phone => {
            return WalletFieldError::ContactInvalid {
                field: WalletContactField::PhoneNumber,
                message,
            }
        }
        ErrorTarget::Name => {
            return WalletFieldError::ContactInvalid {
                field: WalletContactField::Name,
                message,
            }
        }
        ErrorTarget::Unserviceable => return WalletFieldError::AddressUnserviceable { message },
        ErrorTarget::Street => WalletAddressField::Street,
        ErrorTarget::SubLocality => WalletAddressField::SubLocality,
        ErrorTarget::City => WalletAddressField::City,
        ErrorTarget::State => WalletAddressField::State,
        ErrorTarget::PostalCode => WalletAddressField::PostalCode,
        ErrorTarget::Country => WalletAddressField::Country,
    };

    match role {
        AddressRole::Shipping => WalletFieldError::ShippingAddressInvalid {
            field: address_field,
            message,
        },
        AddressRole::Billing => WalletFieldError::BillingAddressInvalid {
            field: address_field,
            message,
        },
    }
}
