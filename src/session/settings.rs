use serde::{Deserialize, Serialize};

/// Operator settings. Credentials are kept in memory only and never used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub openai_api_key: String,
    pub perplexity_api_key: String,
    pub auto_detection: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            perplexity_api_key: String::new(),
            auto_detection: true,
        }
    }
}

/// Partial update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub openai_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub auto_detection: Option<bool>,
}

/// What API consumers get to see of the settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub openai_api_key_set: bool,
    pub perplexity_api_key_set: bool,
    pub auto_detection: bool,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(key) = patch.openai_api_key {
            self.openai_api_key = key;
        }
        if let Some(key) = patch.perplexity_api_key {
            self.perplexity_api_key = key;
        }
        if let Some(enabled) = patch.auto_detection {
            self.auto_detection = enabled;
        }
    }

    pub fn view(&self) -> SettingsView {
        SettingsView {
            openai_api_key_set: !self.openai_api_key.is_empty(),
            perplexity_api_key_set: !self.perplexity_api_key.is_empty(),
            auto_detection: self.auto_detection,
        }
    }
}
