use time::OffsetDateTime;
use url::Url;

use crate::codec::RawToken;
use crate::config::{SsoConfig, TokenDefaults};
use crate::types::{Session, SubjectId};

/// Token validation errors. The first failing rule wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("token expired at {expires_at} (now {now})")]
    Expired { expires_at: i64, now: i64 },
}

/// Non-fatal findings. The token is accepted regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationWarning {
    /// The token is bound to a different micro-app origin than the page's.
    /// Expected for deployment mirrors.
    OriginMismatch { expected: String, actual: String },
}

/// Fully validated SSO token. Every field is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SsoToken {
    pub subject_id: SubjectId,
    pub email: String,
    pub display_name: String,
    pub year_of_study: String,
    pub role: String,
    pub is_admin: bool,
    pub shell_origin: String,
    pub micro_app_origin: String,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl SsoToken {
    /// Drop the transient claims, keeping what gets persisted.
    #[must_use]
    pub fn into_session(self) -> Session {
        Session {
            subject_id: self.subject_id,
            email: self.email,
            display_name: self.display_name,
            year_of_study: self.year_of_study,
            role: self.role,
            is_admin: self.is_admin,
            shell_origin: self.shell_origin,
            micro_app_origin: self.micro_app_origin,
        }
    }
}

/// Applies the structural, expiration and domain-binding rules to a [`RawToken`].
#[derive(Debug, Clone)]
pub struct TokenValidator {
    current_origin: String,
    shell_origin: String,
    defaults: TokenDefaults,
}

impl TokenValidator {
    /// Validator for a page served from `current_origin` (serialized origin,
    /// e.g. `https://app.example.com`).
    #[must_use]
    pub fn new(config: &SsoConfig, current_origin: impl Into<String>) -> Self {
        Self {
            current_origin: current_origin.into(),
            shell_origin: origin_of(config.shell_origin()),
            defaults: config.token_defaults.clone(),
        }
    }

    /// Validator for the page at `page_url`.
    #[must_use]
    pub fn for_page(config: &SsoConfig, page_url: &Url) -> Self {
        Self::new(config, origin_of(page_url))
    }

    /// Origin this validator binds tokens to.
    #[must_use]
    pub fn current_origin(&self) -> &str {
        &self.current_origin
    }

    /// Validates against the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingFields`] if `uid` or `email` is absent
    /// or empty, and [`ValidationError::Expired`] if `exp` lies in the past.
    pub fn validate(&self, raw: RawToken) -> Result<SsoToken, ValidationError> {
        self.validate_at(raw, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Validates against `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn validate_at(&self, raw: RawToken, now: i64) -> Result<SsoToken, ValidationError> {
        let subject_id = non_empty(raw.subject_id);
        let email = non_empty(raw.email);
        let (subject_id, email) = match (subject_id, email) {
            (Some(s), Some(e)) => (s, e),
            (s, e) => {
                let mut missing = Vec::new();
                if s.is_none() {
                    missing.push("uid");
                }
                if e.is_none() {
                    missing.push("email");
                }
                return Err(ValidationError::MissingFields(missing));
            }
        };

        if let Some(expires_at) = raw.expires_at {
            if expires_at < now {
                return Err(ValidationError::Expired { expires_at, now });
            }
        }

        let micro_app_origin = non_empty(raw.micro_app_origin);
        if let Some(warning) = micro_app_origin
            .as_deref()
            .and_then(|claimed| self.check_origin(claimed))
        {
            tracing::warn!(?warning, "SSO token domain mismatch");
        }

        Ok(SsoToken {
            subject_id: SubjectId(subject_id),
            email,
            display_name: non_empty(raw.display_name)
                .unwrap_or_else(|| self.defaults.display_name.clone()),
            year_of_study: non_empty(raw.year_of_study)
                .unwrap_or_else(|| self.defaults.year_of_study.clone()),
            role: non_empty(raw.role).unwrap_or_else(|| self.defaults.role.clone()),
            is_admin: raw.is_admin.unwrap_or(false),
            shell_origin: non_empty(raw.shell_origin).unwrap_or_else(|| self.shell_origin.clone()),
            micro_app_origin: micro_app_origin.unwrap_or_else(|| self.current_origin.clone()),
            issued_at: raw.issued_at,
            expires_at: raw.expires_at,
        })
    }

    /// Domain-binding check for a claimed micro-app origin.
    ///
    /// Returns a warning when `claimed` names a different origin than the
    /// page's; never an error.
    #[must_use]
    pub fn check_origin(&self, claimed: &str) -> Option<ValidationWarning> {
        let normalized = Url::parse(claimed)
            .map(|u| origin_of(&u))
            .unwrap_or_else(|_| claimed.to_owned());
        (normalized != self.current_origin).then(|| ValidationWarning::OriginMismatch {
            expected: claimed.to_owned(),
            actual: self.current_origin.clone(),
        })
    }
}

/// Serialized origin of `url` (`scheme://host[:port]`).
pub(crate) fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
