use crate::core::error_mapping::{ErrorMappingRule, ValidationErrorMap};
use crate::core::orchestrator::WalletSettings;
use crate::core::ConfigProvider;
use crate::domain::model::WalletContactField;
use crate::utils::error::{CheckoutError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub storefront: StorefrontConfig,
    pub wallet: WalletConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    /// Full GraphQL endpoint, API version included.
    pub endpoint: String,
    pub access_token: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub merchant_identifier: String,
    pub merchant_display_name: Option<String>,
    pub country_code: String,
    pub supported_networks: Vec<String>,
    pub required_contact_fields: Option<Vec<WalletContactField>>,
    /// Checked before the built-in error table.
    #[serde(default)]
    pub error_mappings: Vec<ErrorMappingRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CheckoutError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CheckoutError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the variable's value. Unset variables are left
    /// as written so validation can point at them.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| CheckoutError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("storefront.endpoint", &self.storefront.endpoint)?;
        validation::validate_non_empty_string(
            "storefront.access_token",
            &self.storefront.access_token,
        )?;
        if self.storefront.access_token.starts_with("${") {
            return Err(CheckoutError::MissingConfigError {
                field: "storefront.access_token".to_string(),
            });
        }
        if let Some(timeout) = self.storefront.timeout_seconds {
            validation::validate_range("storefront.timeout_seconds", timeout, 1, 300)?;
        }

        validation::validate_non_empty_string(
            "wallet.merchant_identifier",
            &self.wallet.merchant_identifier,
        )?;
        validation::validate_country_code("wallet.country_code", &self.wallet.country_code)?;
        validation::validate_non_empty_list(
            "wallet.supported_networks",
            &self.wallet.supported_networks,
        )?;
        for rule in &self.wallet.error_mappings {
            validation::validate_non_empty_string("wallet.error_mappings.code", &rule.code)?;
        }

        Ok(())
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.storefront
            .timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn json_logs(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.json)
            .unwrap_or(false)
    }

    pub fn wallet_settings(&self) -> WalletSettings {
        let defaults = WalletSettings::default();
        WalletSettings {
            merchant_identifier: self.wallet.merchant_identifier.clone(),
            merchant_display_name: self
                .wallet
                .merchant_display_name
                .clone()
                .unwrap_or_default(),
            country_code: self.wallet.country_code.clone(),
            supported_networks: self.wallet.supported_networks.clone(),
            required_contact_fields: self
                .wallet
                .required_contact_fields
                .clone()
                .unwrap_or(defaults.required_contact_fields),
            error_map: ValidationErrorMap::with_overrides(self.wallet.error_mappings.clone()),
        }
    }
}

impl ConfigProvider for TomlConfig {
    fn storefront_endpoint(&self) -> &str {
        &self.storefront.endpoint
    }

    fn access_token(&self) -> &str {
        &self.storefront.access_token
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds())
    }

    fn merchant_display_name(&self) -> &str {
        self.wallet.merchant_display_name.as_deref().unwrap_or("")
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error_mapping::ErrorTarget;
    use crate::domain::model::UserError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[storefront]
endpoint = "https://shop.example.com/api/2025-01/graphql.json"
access_token = "public-token"

[wallet]
merchant_identifier = "merchant.com.example.shop"
merchant_display_name = "Example Shop"
country_code = "CA"
supported_networks = ["visa", "masterCard"]
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = TomlConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.access_token(), "public-token");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.merchant_display_name(), "Example Shop");
        assert!(!config.json_logs());
        assert!(config.validate().is_ok());

        let settings = config.wallet_settings();
        assert_eq!(settings.country_code, "CA");
        assert_eq!(settings.required_contact_fields.len(), 4);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WALLET_TEST_ACCESS_TOKEN", "from-env");

        let content = BASIC.replace("public-token", "${WALLET_TEST_ACCESS_TOKEN}");
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.storefront.access_token, "from-env");

        std::env::remove_var("WALLET_TEST_ACCESS_TOKEN");
    }

    #[test]
    fn test_unset_variable_fails_validation() {
        let content = BASIC.replace("public-token", "${WALLET_TEST_UNSET_TOKEN}");
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        let content = BASIC.replace(
            "https://shop.example.com/api/2025-01/graphql.json",
            "invalid-url",
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());

        let content = BASIC.replace("\"CA\"", "\"Canada\"");
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_mappings_override_defaults() {
        let content = format!(
            "{BASIC}\n[[wallet.error_mappings]]\ncode = \"INVALID\"\nfield = \"email\"\ntarget = \"unserviceable\"\n"
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        let settings = config.wallet_settings();

        let error = UserError {
            field: vec!["buyerIdentity".to_string(), "email".to_string()],
            code: Some("INVALID".to_string()),
            message: "Email is invalid".to_string(),
        };
        assert_eq!(
            settings.error_map.target_for(&error),
            Some(ErrorTarget::Unserviceable)
        );
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let content = format!("{BASIC}\n[logging]\nlevel = \"debug\"\njson = true\n");
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.log_level(), Some("debug"));
        assert!(config.json_logs());
    }
}
