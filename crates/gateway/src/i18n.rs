//! User-facing string tables.

use std::collections::HashMap;
use std::path::Path;

use cr_domain::config::LocaleConfig;
use cr_domain::{Error, Result};

const BUILTIN: &str = include_str!("../locales/translations.json");

/// Locale every lookup falls back to.
pub const FALLBACK_LOCALE: &str = "en";

type Table = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone)]
pub struct Translator {
    tables: Table,
    default_locale: String,
}

impl Translator {
    /// The embedded English and Russian table.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN).unwrap_or_else(|_| Self {
            tables: Table::new(),
            default_locale: FALLBACK_LOCALE.into(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let tables: Table = serde_json::from_str(raw)?;
        if !tables.contains_key(FALLBACK_LOCALE) {
            return Err(Error::Config(format!(
                "translations have no '{FALLBACK_LOCALE}' table"
            )));
        }
        Ok(Self {
            tables,
            default_locale: FALLBACK_LOCALE.into(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Built-in table, or the file named in `cfg`, with the configured
    /// default locale.
    pub fn load(cfg: &LocaleConfig) -> Result<Self> {
        let mut translator = match &cfg.translations_path {
            Some(path) => Self::from_path(path)?,
            None => Self::builtin(),
        };
        if translator.supports(&cfg.default) {
            translator.default_locale = cfg.default.clone();
        } else {
            tracing::warn!(
                locale = %cfg.default,
                "default locale has no translation table, using '{FALLBACK_LOCALE}'"
            );
        }
        Ok(translator)
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn supports(&self, locale: &str) -> bool {
        self.tables.contains_key(locale)
    }

    /// Supported locale codes, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }

    /// Locale for a client-reported language hint such as `ru-RU`.
    pub fn resolve(&self, hint: Option<&str>) -> String {
        hint.map(|h| h.split(['-', '_']).next().unwrap_or(h).to_ascii_lowercase())
            .filter(|code| self.supports(code))
            .unwrap_or_else(|| self.default_locale.clone())
    }

    pub fn get(&self, key: &str, locale: &str) -> String {
        self.format(key, locale, &[])
    }

    /// Look up `key` and substitute `{name}` placeholders.
    ///
    /// Unsupported locales use English; keys missing from a locale use the
    /// English string; keys missing everywhere render as
    /// `<translation_missing: KEY>`.
    pub fn format(&self, key: &str, locale: &str, args: &[(&str, &str)]) -> String {
        let lookup = |loc: &str| self.tables.get(loc).and_then(|t| t.get(key));
        let Some(template) = lookup(locale).or_else(|| lookup(FALLBACK_LOCALE)) else {
            tracing::debug!(key, locale, "missing translation");
            return format!("<translation_missing: {key}>");
        };

        args.iter().fold(template.clone(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::builtin()
    }
}
