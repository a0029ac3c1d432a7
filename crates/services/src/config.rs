use std::env;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Question budgets for the dialogue loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Hard cap per Overview / ConceptLearning loop.
    pub max_topic_questions: usize,
    /// The learner is asked whether to continue after this many questions.
    pub confirm_every: usize,
    /// Upper bound on main questions in DrawingConnections, before the
    /// two-per-connection limit is applied.
    pub max_connection_questions: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_topic_questions: 15,
            confirm_every: 3,
            max_connection_questions: 10,
        }
    }
}

impl LoopLimits {
    #[must_use]
    pub fn connection_bound(&self, connections: usize) -> usize {
        self.max_connection_questions
            .min(connections.saturating_mul(2))
    }

    /// True when a confirmation prompt is due before the next question.
    #[must_use]
    pub fn confirm_due(&self, asked: usize) -> bool {
        self.confirm_every > 0 && asked > 0 && asked % self.confirm_every == 0
    }
}

/// Runtime settings for the phase state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TutorConfig {
    pub limits: LoopLimits,
    pub generation_timeout: Option<Duration>,
    pub rng_seed: Option<u64>,
}

impl TutorConfig {
    /// Read `TUTOR_GENERATION_TIMEOUT_SECS` and `TUTOR_RNG_SEED`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set but not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set but not a number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let generation_timeout = parse_u64(&lookup, "TUTOR_GENERATION_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let rng_seed = parse_u64(&lookup, "TUTOR_RNG_SEED")?;
        Ok(Self {
            limits: LoopLimits::default(),
            generation_timeout,
            rng_seed,
        })
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    /// Random source for the special-question policy.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

fn parse_u64<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { var, value: raw })
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
}

impl GenerationConfig {
    /// Read `TUTOR_AI_API_KEY`, `TUTOR_AI_BASE_URL`, and `TUTOR_AI_MODEL`.
    ///
    /// Returns `Ok(None)` when no API key is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` for an unparsable base URL.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` for an unparsable base URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(api_key) = lookup("TUTOR_AI_API_KEY").filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let base_url = lookup("TUTOR_AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = lookup("TUTOR_AI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        Ok(Some(Self {
            base_url: Url::parse(base_url.trim())?,
            api_key,
            model,
        }))
    }

    /// Endpoint for chat completions under the base URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_dialogue_budgets() {
        let limits = LoopLimits::default();
        assert_eq!(limits.max_topic_questions, 15);
        assert_eq!(limits.confirm_every, 3);
        assert_eq!(limits.connection_bound(3), 6);
        assert_eq!(limits.connection_bound(7), 10);
        assert_eq!(limits.connection_bound(0), 0);
    }

    #[test]
    fn confirmation_every_third_question() {
        let limits = LoopLimits::default();
        let due: Vec<usize> = (0..10).filter(|n| limits.confirm_due(*n)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn tutor_config_reads_timeout_and_seed() {
        let config = TutorConfig::from_lookup(lookup(&[
            ("TUTOR_GENERATION_TIMEOUT_SECS", "20"),
            ("TUTOR_RNG_SEED", " 42 "),
        ]))
        .unwrap();
        assert_eq!(config.generation_timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.rng_seed, Some(42));
    }

    #[test]
    fn tutor_config_rejects_garbage() {
        let err = TutorConfig::from_lookup(lookup(&[("TUTOR_RNG_SEED", "abc")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: "TUTOR_RNG_SEED", .. }
        ));
    }

    #[test]
    fn generation_config_requires_key() {
        assert!(GenerationConfig::from_lookup(lookup(&[])).unwrap().is_none());
        let config = GenerationConfig::from_lookup(lookup(&[
            ("TUTOR_AI_API_KEY", "secret"),
            ("TUTOR_AI_BASE_URL", "http://localhost:8080/v1/"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(
            config.completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn generation_config_rejects_bad_url() {
        let err = GenerationConfig::from_lookup(lookup(&[
            ("TUTOR_AI_API_KEY", "secret"),
            ("TUTOR_AI_BASE_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }
}
