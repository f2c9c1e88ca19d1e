pub mod cli;
pub mod event_script;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use args::CliConfig;

#[cfg(feature = "cli")]
mod args {
    use crate::config::toml_config::TomlConfig;
    use crate::core::ConfigProvider;
    use crate::utils::error::Result;
    use crate::utils::validation::{self, Validate};
    use clap::Parser;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "wallet-checkout")]
    #[command(about = "Replays wallet sheet events against a storefront cart")]
    pub struct CliConfig {
        #[arg(long, help = "TOML configuration file")]
        pub config: Option<String>,

        #[arg(long, help = "Storefront GraphQL endpoint, overrides the config file")]
        pub endpoint: Option<String>,

        #[arg(long, help = "Storefront access token, overrides the config file")]
        pub access_token: Option<String>,

        #[arg(long, help = "Start from an existing cart instead of the scripted one")]
        pub cart_id: Option<String>,

        #[arg(long, help = "JSON file with the wallet events to replay")]
        pub events: String,

        #[arg(long, default_value = "30")]
        pub timeout_seconds: u64,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,
    }

    impl CliConfig {
        /// Command-line values win over the file.
        pub fn apply_overrides(&self, config: &mut TomlConfig) {
            if let Some(endpoint) = &self.endpoint {
                config.storefront.endpoint = endpoint.clone();
            }
            if let Some(access_token) = &self.access_token {
                config.storefront.access_token = access_token.clone();
            }
        }
    }

    impl ConfigProvider for CliConfig {
        fn storefront_endpoint(&self) -> &str {
            self.endpoint.as_deref().unwrap_or_default()
        }

        fn access_token(&self) -> &str {
            self.access_token.as_deref().unwrap_or_default()
        }

        fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.timeout_seconds)
        }

        fn merchant_display_name(&self) -> &str {
            ""
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validation::validate_path("events", &self.events)?;
            validation::validate_range("timeout_seconds", self.timeout_seconds, 1, 300)?;

            // Without a config file the connection settings must come from flags.
            if self.config.is_none() {
                let endpoint = validation::validate_required_field("endpoint", &self.endpoint)?;
                validation::validate_url("endpoint", endpoint)?;
                let token = validation::validate_required_field("access_token", &self.access_token)?;
                validation::validate_non_empty_string("access_token", token)?;
            }
            Ok(())
        }
    }

}
