//! Locale resolution.
//!
//! Every translated read or write resolves its effective locale through a
//! [`LocaleContext`]: an explicit argument wins, then the instance override,
//! then the provider's current locale. The base locale is always the
//! provider's fallback locale and cannot be overridden per instance.

use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;

use crate::config::TranslatableConfig;

static LOCALE_TAG: OnceLock<Regex> = OnceLock::new();

/// Check whether `value` looks like a locale tag (`de`, `en-US`).
///
/// The match is case-sensitive: the language part is lowercase and the
/// optional region is uppercase.
pub fn is_locale_tag(value: &str) -> bool {
    LOCALE_TAG
        .get_or_init(|| Regex::new(r"^[a-z]{2}(?:-[A-Z]{2})?$").expect("locale tag pattern is valid"))
        .is_match(value)
}

/// Source of the application's current and fallback locales.
///
/// Implementations are owned by the caller (typically one per request), so
/// nothing in this crate reads a process-wide locale.
pub trait LocaleProvider: Send + Sync {
    /// The locale reads and writes use when nothing more specific is set.
    fn current_locale(&self) -> String;

    /// The base locale whose values live on the host record itself.
    fn fallback_locale(&self) -> String;
}

/// Settable locale provider scoped to whoever holds it.
#[derive(Debug)]
pub struct AppLocale {
    current: RwLock<String>,
    fallback: String,
}

impl AppLocale {
    pub fn new(current: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(current.into()),
            fallback: fallback.into(),
        }
    }

    pub fn from_config(config: &TranslatableConfig) -> Self {
        Self::new(config.locale.clone(), config.fallback_locale.clone())
    }

    /// Change the current locale for every record bound to this provider.
    pub fn set_current(&self, locale: impl Into<String>) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = locale.into();
    }
}

impl LocaleProvider for AppLocale {
    fn current_locale(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn fallback_locale(&self) -> String {
        self.fallback.clone()
    }
}

/// Per-instance locale state: the provider plus an optional override.
#[derive(Clone)]
pub struct LocaleContext {
    provider: Arc<dyn LocaleProvider>,
    override_locale: Option<String>,
}

impl std::fmt::Debug for LocaleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocaleContext")
            .field("current", &self.provider.current_locale())
            .field("fallback", &self.provider.fallback_locale())
            .field("override_locale", &self.override_locale)
            .finish()
    }
}

impl LocaleContext {
    pub fn new(provider: Arc<dyn LocaleProvider>) -> Self {
        Self {
            provider,
            override_locale: None,
        }
    }

    /// Resolve the effective locale.
    ///
    /// # Arguments
    /// * `explicit` - A locale passed directly to the operation; ignored when empty
    ///
    /// # Returns
    /// The explicit locale, else the instance override, else the provider's
    /// current locale.
    pub fn resolve(&self, explicit: Option<&str>) -> String {
        match explicit.filter(|locale| !locale.is_empty()) {
            Some(locale) => locale.to_string(),
            None => self
                .override_locale
                .clone()
                .unwrap_or_else(|| self.provider.current_locale()),
        }
    }

    /// The base (fallback) locale.
    pub fn base(&self) -> String {
        self.provider.fallback_locale()
    }

    pub fn is_base(&self, locale: &str) -> bool {
        locale == self.base()
    }

    pub fn override_locale(&self) -> Option<&str> {
        self.override_locale.as_deref()
    }

    /// Replace the override, returning the previous one.
    pub fn set_override(&mut self, locale: Option<String>) -> Option<String> {
        let locale = locale.filter(|l| !l.is_empty());
        std::mem::replace(&mut self.override_locale, locale)
    }
}
