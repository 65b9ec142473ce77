//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Proxmox VE connection settings derived from environment variables and
/// configuration files.
///
/// The driver never inspects the credential fields individually; they exist
/// only to compose the opaque API token sent with every request.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "PVE")]
pub struct ProxmoxConfig {
    /// Base URL of the cluster API, for example `https://pve.example.org:8006`.
    pub api_url: String,
    /// API user the token belongs to, for example `provisioner@pam`.
    pub user: String,
    /// Identifier of the API token.
    pub token_id: String,
    /// Secret half of the API token.
    pub secret: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProxmoxConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [proxmox] in hoverla.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration by merging defaults, configuration files, and
    /// environment variables. Command-line arguments are never consulted;
    /// argument parsing belongs to the embedding tool.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("hoverla")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Composes the opaque credential sent in the `Authorization` header.
    ///
    /// The cluster expects `user!token_id=secret`; callers treat the result
    /// as a single token and never take it apart again.
    #[must_use]
    pub fn api_token(&self) -> String {
        format!("{}!{}={}", self.user, self.token_id, self.secret)
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_url,
            &FieldMetadata::new("cluster API base URL", "PVE_API_URL", "api_url"),
        )?;
        Self::require_field(
            &self.user,
            &FieldMetadata::new("API user", "PVE_USER", "user"),
        )?;
        Self::require_field(
            &self.token_id,
            &FieldMetadata::new("API token identifier", "PVE_TOKEN_ID", "token_id"),
        )?;
        Self::require_field(
            &self.secret,
            &FieldMetadata::new("API token secret", "PVE_SECRET", "secret"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> ProxmoxConfig {
        ProxmoxConfig {
            api_url: String::from("https://pve.example.org:8006"),
            user: String::from("provisioner@pam"),
            token_id: String::from("driver"),
            secret: String::from("s3cret"),
        }
    }

    #[test]
    fn api_token_composes_user_token_id_and_secret() {
        assert_eq!(full_config().api_token(), "provisioner@pam!driver=s3cret");
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert_eq!(full_config().validate(), Ok(()));
    }

    #[test]
    fn validate_names_the_environment_variable_for_missing_secret() {
        let config = ProxmoxConfig {
            secret: String::new(),
            ..full_config()
        };
        let Err(ConfigError::MissingField(message)) = config.validate() else {
            panic!("expected a missing-field error");
        };
        assert!(message.contains("PVE_SECRET"), "unhelpful message: {message}");
        assert!(message.contains("secret"), "unhelpful message: {message}");
    }

    #[test]
    fn validate_rejects_whitespace_only_url() {
        let config = ProxmoxConfig {
            api_url: String::from("   "),
            ..full_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }
}
