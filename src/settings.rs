//! Per-party language and voice preferences
//!
//! The recorder itself never reads these; they travel alongside the mode so
//! the translation side knows what each party speaks and hears.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::session::Party;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartySettings {
    /// Language the party speaks (BCP 47)
    pub input_language: String,
    /// Language the party's speech is translated into
    pub output_language: String,
    /// Synthesis voice; empty for the service default
    pub voice: String,
}

impl Default for PartySettings {
    fn default() -> Self {
        Self {
            input_language: "en-US".to_string(),
            output_language: "es".to_string(),
            voice: String::new(),
        }
    }
}

/// Partial update; `None` fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartySettingsUpdate {
    pub input_language: Option<String>,
    pub output_language: Option<String>,
    pub voice: Option<String>,
}

/// Settings for both parties as they appear in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartiesConfig {
    pub person1: PartySettings,
    pub person2: PartySettings,
}

#[derive(Debug)]
pub struct SettingsStore {
    parties: RwLock<HashMap<Party, PartySettings>>,
}

impl SettingsStore {
    pub fn new(config: &PartiesConfig) -> Self {
        let parties = HashMap::from([
            (Party::Person1, config.person1.clone()),
            (Party::Person2, config.person2.clone()),
        ]);

        Self {
            parties: RwLock::new(parties),
        }
    }

    pub fn get(&self, mode: Party) -> PartySettings {
        self.parties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&mode)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge `update` into the settings for `mode` and return the result
    pub fn update(&self, mode: Party, update: PartySettingsUpdate) -> PartySettings {
        let mut parties = self.parties.write().unwrap_or_else(PoisonError::into_inner);
        let settings = parties.entry(mode).or_default();

        if let Some(input_language) = update.input_language {
            settings.input_language = input_language;
        }
        if let Some(output_language) = update.output_language {
            settings.output_language = output_language;
        }
        if let Some(voice) = update.voice {
            settings.voice = voice;
        }

        debug!("Settings for {} updated: {:?}", mode, settings);
        settings.clone()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(&PartiesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_both_parties() {
        let store = SettingsStore::default();

        for mode in [Party::Person1, Party::Person2] {
            let settings = store.get(mode);
            assert_eq!(settings.input_language, "en-US");
            assert_eq!(settings.output_language, "es");
            assert!(settings.voice.is_empty());
        }
    }

    #[test]
    fn test_update_merges_only_given_fields() {
        let store = SettingsStore::default();

        let updated = store.update(
            Party::Person2,
            PartySettingsUpdate {
                output_language: Some("fr".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(updated.input_language, "en-US");
        assert_eq!(updated.output_language, "fr");
        assert_eq!(store.get(Party::Person2), updated);
        // The other party is untouched
        assert_eq!(store.get(Party::Person1).output_language, "es");
    }
}
