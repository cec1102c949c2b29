//! Session configuration, loaded once and passed by reference.
//!
//! Defaults, then `testbridge.toml`, then `TESTBRIDGE_`-prefixed
//! environment variables (double underscore for nesting, e.g.
//! `TESTBRIDGE_LLM__MODEL`). There is no ambient global client state:
//! everything downstream receives its configuration at construction.

use crate::application::use_cases::completion_service::CompletionConfig;
use crate::application::use_cases::refinement_loop::RefinementConfig;
use crate::application::use_cases::test_ticket_service::TicketLoopConfig;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "testbridge.toml";
pub const ENV_PREFIX: &str = "TESTBRIDGE_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub llm: LLMConfig,
    pub completion: CompletionConfig,
    pub refinement: RefinementConfig,
    pub ticket_loop: TicketLoopConfig,
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(CONFIG_FILE)
}

pub fn load_settings_from(path: &str) -> Result<Settings> {
    dotenvy::dotenv().ok();
    Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|err| AppError::ValidationError(format!("Invalid configuration: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm_config::LLMProvider;

    // Defaults and env override live in one test: env mutation is
    // process-wide and must not race a parallel settings load.
    #[test]
    fn test_defaults_then_env_override() {
        let settings = load_settings_from("does-not-exist.toml").unwrap();
        assert_eq!(settings.refinement.max_iterations, 3);
        assert_eq!(settings.ticket_loop.approval_threshold, 80);
        assert_eq!(settings.completion.max_retries, 2);
        assert_eq!(settings.llm.provider, LLMProvider::Local);

        std::env::set_var("TESTBRIDGE_REFINEMENT__MAX_ITERATIONS", "5");
        let overridden = load_settings_from("does-not-exist.toml").unwrap();
        std::env::remove_var("TESTBRIDGE_REFINEMENT__MAX_ITERATIONS");
        assert_eq!(overridden.refinement.max_iterations, 5);
    }
}
