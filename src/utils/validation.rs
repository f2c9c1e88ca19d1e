use crate::utils::error::{CheckoutError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl Into<String>, reason: impl Into<String>) -> CheckoutError {
    CheckoutError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.into(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| CheckoutError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// ISO 3166-1 alpha-2, upper case.
pub fn validate_country_code(field_name: &str, value: &str) -> Result<()> {
    let valid = value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase());
    if !valid {
        return Err(invalid(
            field_name,
            value,
            "Expected a two-letter upper-case country code",
        ));
    }
    Ok(())
}

pub fn validate_non_empty_list<T>(field_name: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(invalid(field_name, "[]", "At least one value is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("endpoint", "https://shop.example.com/api/graphql.json").is_ok());
        assert!(validate_url("endpoint", "http://localhost:8080").is_ok());
        assert!(validate_url("endpoint", "").is_err());
        assert!(validate_url("endpoint", "invalid-url").is_err());
        assert!(validate_url("endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_country_code() {
        assert!(validate_country_code("country_code", "US").is_ok());
        assert!(validate_country_code("country_code", "us").is_err());
        assert!(validate_country_code("country_code", "USA").is_err());
    }

    #[test]
    fn test_validate_non_empty_list() {
        assert!(validate_non_empty_list("supported_networks", &["visa"]).is_ok());
        let empty: [&str; 0] = [];
        match validate_non_empty_list("supported_networks", &empty) {
            Err(CheckoutError::InvalidConfigValueError { field, .. }) => {
                assert_eq!(field, "supported_networks")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
