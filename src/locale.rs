//! Translations for user-facing text.
//!
//! A [`Translator`] is built once by the host and passed to whatever renders
//! messages; there is no global instance. Tables come from a
//! [`LocaleProvider`] (by default `{root}/{lang}/{namespace}.json`, the layout
//! the web front end serves) and fall back to built-in English per key.

use crate::error::SvgrError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Language codes with shipped translations.
pub const SUPPORTED_LANGUAGES: [&str; 16] = [
    "en", "zh", "zh-hant", "ja", "ko", "es", "fr", "de", "it", "pt", "ru", "ar", "sv", "th", "uk",
    "vi",
];

pub const FALLBACK_LANGUAGE: &str = "en";
pub const DEFAULT_NAMESPACE: &str = "svgr";

/// Flat key → string table; nested JSON objects become dotted keys.
pub type TranslationTable = HashMap<String, String>;

const ENGLISH: &[(&str, &str)] = &[
    ("appName", "SVGR"),
    ("tagline", "Convert raster images to scalable vector graphics"),
    ("converting", "Converting..."),
    ("convertToSvg", "Convert to SVG"),
    ("conversionFailed", "Conversion failed"),
    ("invalidFileType", "Please select an image file (PNG, JPG, WEBP, BMP, GIF)"),
    ("downloadSvg", "Download SVG"),
    ("downloadPdf", "Download PDF"),
    ("saved", "Saved {{path}}"),
    ("credits.title", "Buy Credits"),
    ("credits.currentBalance", "Current Balance"),
    ("credits.unit", "credits"),
    ("credits.buy", "Buy"),
    ("credits.processing", "Processing..."),
    ("credits.noProducts", "No packages available"),
    ("credits.error", "Error"),
    ("credits.loginRequired", "Log in to purchase credits"),
    ("credits.insufficient", "Not enough credits to download. Buy more at {{route}}."),
];

/// Source of translation tables.
#[async_trait]
pub trait LocaleProvider: Send + Sync {
    async fn load(&self, lang: &str, namespace: &str) -> Result<TranslationTable, SvgrError>;
}

/// Reads `{root}/{lang}/{namespace}.json`.
#[derive(Debug, Clone)]
pub struct DirLocaleProvider {
    root: PathBuf,
}

impl DirLocaleProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl LocaleProvider for DirLocaleProvider {
    async fn load(&self, lang: &str, namespace: &str) -> Result<TranslationTable, SvgrError> {
        let path = self.root.join(lang).join(format!("{namespace}.json"));
        let fail = |reason: String| SvgrError::LocaleLoadFailed {
            lang: lang.to_string(),
            reason,
        };

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| fail(format!("{}: {e}", path.display())))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| fail(format!("{}: {e}", path.display())))?;

        let mut table = TranslationTable::new();
        flatten_into(&mut table, "", &value);
        debug!("Loaded {} strings from {}", table.len(), path.display());
        Ok(table)
    }
}

fn flatten_into(table: &mut TranslationTable, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_into(table, &key, v);
            }
        }
        Value::String(s) => {
            table.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            table.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            table.insert(prefix.to_string(), b.to_string());
        }
        Value::Null | Value::Array(_) => {}
    }
}

/// Map a requested code (`"fr_FR.UTF-8"`, `"ZH-Hant"`, `"pt-BR"`) to a
/// supported one, or the fallback.
pub fn resolve_language(requested: Option<&str>) -> &'static str {
    let Some(raw) = requested else {
        return FALLBACK_LANGUAGE;
    };
    let code = raw
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-")
        .to_ascii_lowercase();

    if let Some(lang) = SUPPORTED_LANGUAGES.iter().find(|l| **l == code) {
        return *lang;
    }
    let primary = code.split('-').next().unwrap_or_default();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| **l == primary)
        .copied()
        .unwrap_or(FALLBACK_LANGUAGE)
}

/// Key lookup for one language.
#[derive(Debug, Clone)]
pub struct Translator {
    language: &'static str,
    table: TranslationTable,
    defaults: HashMap<&'static str, &'static str>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::english()
    }
}

impl Translator {
    /// Built-in English only; needs no provider.
    pub fn english() -> Self {
        Self::with_table(FALLBACK_LANGUAGE, TranslationTable::new())
    }

    pub fn with_table(language: &'static str, table: TranslationTable) -> Self {
        Self {
            language,
            table,
            defaults: ENGLISH.iter().copied().collect(),
        }
    }

    /// Resolve `requested`, then load its table from `provider`.
    ///
    /// A load failure is logged and leaves the built-in English strings in
    /// place; a missing translation never stops the program.
    pub async fn load(provider: &dyn LocaleProvider, requested: Option<&str>) -> Self {
        let language = resolve_language(requested);
        match provider.load(language, DEFAULT_NAMESPACE).await {
            Ok(table) => Self::with_table(language, table),
            Err(e) => {
                warn!("{}; using built-in English", e);
                Self::with_table(language, TranslationTable::new())
            }
        }
    }

    pub fn language(&self) -> &'static str {
        self.language
    }

    /// Translation for `key`: table, then built-in English, then the key.
    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.table
            .get(key)
            .map(String::as_str)
            .or_else(|| self.defaults.get(key).copied())
            .unwrap_or(key)
    }

    /// [`t`](Self::t) with `{{name}}` placeholders filled from `args`.
    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.t(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{{{name}}}}}"), value);
        }
        text
    }
}
