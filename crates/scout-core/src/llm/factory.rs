//! Builds the configured [`LlmProvider`] from [`LlmConfig`]. Kept here
//! rather than in scout-cli so both the daemon and one-off CLI commands
//! construct providers identically.

use super::anthropic::AnthropicProvider;
use super::google::GoogleProvider;
use super::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;

/// Builds the default provider named by `config.provider`. A scout that
/// names its own `llm_provider`/`llm_model` overrides this per-run instead
/// of going through the factory (see `crate::workflow` run assembly).
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(LlmError::NotConfigured)?;

    match config.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(api_key, &config.model))),
        "google" => Ok(Box::new(GoogleProvider::new(api_key, &config.model))),
        _ => Err(LlmError::NotConfigured),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> LlmConfig {
        LlmConfig {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key: Some("test-key".to_string()),
            timeout_secs: 60,
        }
    }

    #[test]
    fn creates_anthropic_provider() {
        let provider = create_provider(&base_config()).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn creates_google_provider() {
        let config = LlmConfig {
            provider: "google".to_string(),
            ..base_config()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "google");
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let config = LlmConfig {
            api_key: None,
            ..base_config()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    #[test]
    fn unknown_provider_is_not_configured() {
        let config = LlmConfig {
            provider: "bogus".to_string(),
            ..base_config()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured));
    }
}
