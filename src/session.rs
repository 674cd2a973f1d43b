use tracing::debug;

use crate::error::{ThumbError, ThumbResult};

pub const KEY_ENV_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

pub const MISSING_KEY_MESSAGE: &str = "Please select an API Key to proceed.";
pub const ESTABLISH_FAILED_MESSAGE: &str = "Failed to select API key. Please try again.";

/// Credential state handed to the studio instead of being read from the
/// environment on every call.
#[derive(Clone, Default)]
pub struct Session {
    key: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key.as_ref().map(|_| "(set)"))
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// An explicit key wins over the environment.
    pub fn from_env(override_key: Option<&str>) -> Self {
        let key = override_key
            .map(str::to_string)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| KEY_ENV_VARS.iter().find_map(|name| get_env(name)));
        Self { key }
    }

    pub fn has_credential(&self) -> bool {
        self.key.is_some()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn require_key(&self) -> ThumbResult<&str> {
        self.key()
            .ok_or_else(|| ThumbError::validation(MISSING_KEY_MESSAGE))
    }

    pub fn establish(&mut self, key: impl Into<String>) -> ThumbResult<()> {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return Err(ThumbError::validation(ESTABLISH_FAILED_MESSAGE));
        }
        debug!("credential established");
        self.key = Some(key.to_string());
        Ok(())
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
