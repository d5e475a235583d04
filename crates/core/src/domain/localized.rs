use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Languages the site is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
}

impl Language {
    pub const fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        // Accept region-qualified tags such as "es-MX".
        let primary = normalized.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" => Some(Language::En),
            "es" => Some(Language::Es),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Text stored either as a single legacy string or as a language-code map.
///
/// Both shapes live side by side in the store: records written before the
/// bilingual schema are flat strings and are never migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedString {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl Default for LocalizedString {
    fn default() -> Self {
        LocalizedString::Plain(String::new())
    }
}

impl LocalizedString {
    pub fn bilingual(en: impl Into<String>, es: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(Language::En.code().to_string(), en.into());
        map.insert(Language::Es.code().to_string(), es.into());
        LocalizedString::Localized(map)
    }

    /// Display string for `lang`. A plain string is returned as-is; a map falls
    /// back to the default language, then to "".
    pub fn resolve(&self, lang: &str) -> &str {
        match self {
            LocalizedString::Plain(s) => s,
            LocalizedString::Localized(map) => map
                .get(lang)
                .or_else(|| map.get(DEFAULT_LANGUAGE))
                .map(String::as_str)
                .unwrap_or(""),
        }
    }

    pub fn english(&self) -> &str {
        self.resolve(DEFAULT_LANGUAGE)
    }

    /// True when the value has something to show in the default language.
    pub fn has_default_text(&self) -> bool {
        match self {
            LocalizedString::Plain(s) => !s.trim().is_empty(),
            LocalizedString::Localized(map) => map
                .get(DEFAULT_LANGUAGE)
                .is_some_and(|s| !s.trim().is_empty()),
        }
    }

    pub fn trimmed(self) -> Self {
        match self {
            LocalizedString::Plain(s) => LocalizedString::Plain(s.trim().to_string()),
            LocalizedString::Localized(map) => LocalizedString::Localized(
                map.into_iter()
                    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for LocalizedString {
    fn from(value: &str) -> Self {
        LocalizedString::Plain(value.to_string())
    }
}
