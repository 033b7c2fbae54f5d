use std::fmt;

/// Vendor secrets, read from the environment only and never persisted.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub heygen_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Whitespace-only values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            openai_api_key: read("OPENAI_API_KEY"),
            replicate_api_token: read("REPLICATE_API_TOKEN"),
            heygen_api_key: read("HEYGEN_API_KEY"),
            gemini_api_key: read("GEMINI_API_KEY"),
            anthropic_api_key: read("ANTHROPIC_API_KEY"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &state(&self.openai_api_key))
            .field("replicate_api_token", &state(&self.replicate_api_token))
            .field("heygen_api_key", &state(&self.heygen_api_key))
            .field("gemini_api_key", &state(&self.gemini_api_key))
            .field("anthropic_api_key", &state(&self.anthropic_api_key))
            .finish()
    }
}
