use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default storage key for the persisted session record.
pub const DEFAULT_STORAGE_KEY: &str = "sso_user_data";

/// Placeholder values applied to optional token fields the shell left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenDefaults {
    pub(crate) display_name: String,
    pub(crate) year_of_study: String,
    pub(crate) role: String,
}

impl TokenDefaults {
    fn defaults() -> Self {
        Self {
            display_name: "User".into(),
            year_of_study: "Unknown".into(),
            role: "student".into(),
        }
    }
}

/// SSO handoff configuration.
///
/// Required field (`shell_origin`) is a constructor parameter, so there is no runtime "missing field" error.
///
/// Use [`from_env()`](SsoConfig::from_env) for convention-based setup,
/// or [`new()`](SsoConfig::new) with `with_*` methods for full control.
///
/// ```rust,ignore
/// use shell_sso::SsoConfig;
///
/// let config = SsoConfig::new("https://shell.example.com".parse()?)
///     .with_storage_key("my_app_session")
///     .with_stored_fallback(true);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SsoConfig {
    pub(crate) shell_origin: Url,
    pub(crate) storage_key: String,
    pub(crate) provider_settle: Duration,
    pub(crate) stored_fallback: bool,
    pub(crate) token_defaults: TokenDefaults,
}

impl SsoConfig {
    /// Create a configuration bound to the default shell origin.
    ///
    /// The shell origin is where logout lands when neither the session nor
    /// the page URL names one.
    #[must_use]
    pub fn new(shell_origin: Url) -> Self {
        Self {
            shell_origin,
            storage_key: DEFAULT_STORAGE_KEY.into(),
            provider_settle: Duration::from_secs(5),
            stored_fallback: false,
            token_defaults: TokenDefaults::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SSO_SHELL_DOMAIN`: default shell origin (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `SSO_STORAGE_KEY`: storage key for the persisted session
    /// - `SSO_PROVIDER_SETTLE_MS`: wait for the identity provider's first event, in milliseconds
    /// - `SSO_STORED_FALLBACK`: set to `"1"` or `"true"` to reuse a stored session when a handoff fails
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let shell_str = lookup("SSO_SHELL_DOMAIN")
            .ok_or_else(|| Error::Config("SSO_SHELL_DOMAIN is required".into()))?;
        let shell_origin: Url = shell_str
            .parse()
            .map_err(|e| Error::Config(format!("SSO_SHELL_DOMAIN: {e}")))?;

        let mut config = Self::new(shell_origin);

        if let Some(key) = lookup("SSO_STORAGE_KEY") {
            if key.trim().is_empty() {
                return Err(Error::Config("SSO_STORAGE_KEY must not be empty".into()));
            }
            config = config.with_storage_key(key);
        }
        if let Some(ms) = lookup("SSO_PROVIDER_SETTLE_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("SSO_PROVIDER_SETTLE_MS: {e}")))?;
            config = config.with_provider_settle(Duration::from_millis(ms));
        }

        let stored_fallback = matches!(
            lookup("SSO_STORED_FALLBACK").as_deref(),
            Some("1") | Some("true"),
        );

        Ok(config.with_stored_fallback(stored_fallback))
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_provider_settle(mut self, settle: Duration) -> Self {
        self.provider_settle = settle;
        self
    }

    /// When a handoff URL fails decoding or validation, reuse a previously
    /// stored session instead of going unauthenticated.
    #[must_use]
    pub fn with_stored_fallback(mut self, enabled: bool) -> Self {
        self.stored_fallback = enabled;
        self
    }

    #[must_use]
    pub fn with_default_display_name(mut self, name: impl Into<String>) -> Self {
        self.token_defaults.display_name = name.into();
        self
    }

    #[must_use]
    pub fn with_default_year_of_study(mut self, year: impl Into<String>) -> Self {
        self.token_defaults.year_of_study = year.into();
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.token_defaults.role = role.into();
        self
    }

    /// Default shell origin.
    #[must_use]
    pub fn shell_origin(&self) -> &Url {
        &self.shell_origin
    }

    /// Storage key of the persisted session record.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// How long activation waits for the identity provider's first event.
    #[must_use]
    pub fn provider_settle(&self) -> Duration {
        self.provider_settle
    }

    /// Whether a failed handoff falls back to the stored session.
    #[must_use]
    pub fn stored_fallback(&self) -> bool {
        self.stored_fallback
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_constructor_defaults() {
        let config = SsoConfig::new("https://shell.example.com".parse().unwrap());

        assert_eq!(config.shell_origin().as_str(), "https://shell.example.com/");
        assert_eq!(config.storage_key(), "sso_user_data");
        assert_eq!(config.provider_settle(), Duration::from_secs(5));
        assert!(!config.stored_fallback());
        assert_eq!(config.token_defaults.display_name, "User");
        assert_eq!(config.token_defaults.year_of_study, "Unknown");
        assert_eq!(config.token_defaults.role, "student");
    }

    #[test]
    fn test_config_with_overrides() {
        let config = SsoConfig::new("https://shell.example.com".parse().unwrap())
            .with_storage_key("other_key")
            .with_default_role("guest")
            .with_stored_fallback(true);

        assert_eq!(config.storage_key(), "other_key");
        assert_eq!(config.token_defaults.role, "guest");
        assert!(config.stored_fallback());
    }

    #[test]
    fn test_from_env_requires_shell_domain() {
        let err = SsoConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("SSO_SHELL_DOMAIN")));
    }

    #[test]
    fn test_from_env_rejects_invalid_url() {
        let err = SsoConfig::from_lookup(lookup(&[("SSO_SHELL_DOMAIN", "not a url")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_env_reads_optional_vars() {
        let config = SsoConfig::from_lookup(lookup(&[
            ("SSO_SHELL_DOMAIN", "https://shell.example.com"),
            ("SSO_STORAGE_KEY", "k"),
            ("SSO_PROVIDER_SETTLE_MS", "250"),
            ("SSO_STORED_FALLBACK", "true"),
        ]))
        .unwrap();

        assert_eq!(config.storage_key(), "k");
        assert_eq!(config.provider_settle(), Duration::from_millis(250));
        assert!(config.stored_fallback());
    }

    #[test]
    fn test_from_env_rejects_bad_settle() {
        let err = SsoConfig::from_lookup(lookup(&[
            ("SSO_SHELL_DOMAIN", "https://shell.example.com"),
            ("SSO_PROVIDER_SETTLE_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("SSO_PROVIDER_SETTLE_MS")));
    }
}
