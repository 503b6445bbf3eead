use url::Url;

use crate::codec::{self, DecodeError, SHELL_PARAM};
use crate::config::SsoConfig;
use crate::navigator::Navigator;
use crate::store::{SessionStore, Storage, StoreError};
use crate::types::Session;
use crate::validator::{TokenValidator, ValidationError};

/// Why [`SsoGateway::resolve`] produced no session.
///
/// `NoSession` (nothing to resolve) is distinct from a handoff that was
/// present but rejected.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SsoError {
    #[error("No valid SSO token found")]
    NoSession,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of [`SsoGateway::resolve`].
pub type SsoResult = Result<Session, SsoError>;

/// Turns the current navigation into an SSO session, and tears it down on logout.
pub struct SsoGateway<S, N> {
    config: SsoConfig,
    store: SessionStore<S>,
    navigator: N,
}

impl<S: Storage, N: Navigator> SsoGateway<S, N> {
    #[must_use]
    pub fn new(config: SsoConfig, storage: S, navigator: N) -> Self {
        let store = SessionStore::new(storage, config.storage_key().to_owned());
        Self {
            config,
            store,
            navigator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Whether the current URL is an SSO handoff.
    #[must_use]
    pub fn is_sso_request(&self) -> bool {
        codec::detect(&self.navigator.current_url())
    }

    /// Resolve the SSO session for the current navigation.
    ///
    /// Without handoff parameters this is a stored-session lookup. With them,
    /// the token is decoded and validated; on success it is persisted and the
    /// handoff parameters are stripped from history. A rejected token is
    /// reported as such and never falls back to the stored session here.
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::NoSession`] when there is neither a handoff nor a
    /// stored session, and the specific decode, validation or store error otherwise.
    pub async fn resolve(&self) -> SsoResult {
        let url = self.navigator.current_url();

        if !codec::detect(&url) {
            return match self.store.load().await? {
                Some(session) => {
                    tracing::info!(subject_id = %session.subject_id, "Using stored SSO session");
                    Ok(session)
                }
                None => Err(SsoError::NoSession),
            };
        }

        let raw = codec::decode(&url).inspect_err(|e| {
            tracing::warn!(error = %e, "SSO token decoding failed");
        })?;
        let token = TokenValidator::for_page(&self.config, &url)
            .validate(raw)
            .inspect_err(|e| {
                tracing::warn!(error = %e, "SSO token validation failed");
            })?;

        let session = token.into_session();
        self.store.save(&session).await?;
        self.navigator.replace_url(codec::strip(&url));

        tracing::info!(subject_id = %session.subject_id, role = %session.role, "SSO login successful");
        Ok(session)
    }

    /// Read the stored session without looking at the URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn stored_session(&self) -> Result<Option<Session>, StoreError> {
        self.store.load().await
    }

    /// Clear the stored session, then navigate to the shell.
    ///
    /// The target is the stored session's shell origin, else the page's
    /// `shell` parameter, else the configured shell origin; query and
    /// fragment are dropped. Returns the target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the session could not be cleared, in which
    /// case no navigation happens.
    pub async fn logout(&self) -> Result<Url, StoreError> {
        let page = self.navigator.current_url();
        let stored = self.store.load().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read session during logout");
            None
        });

        let target = logout_target(stored.as_ref(), &page, self.config.shell_origin());

        self.store.clear().await?;

        tracing::info!(shell = %target, "SSO logout: redirecting to shell");
        self.navigator.navigate(target.clone());
        Ok(target)
    }
}

fn logout_target(session: Option<&Session>, page: &Url, fallback: &Url) -> Url {
    let mut target = session
        .and_then(|s| parse_web_url(&s.shell_origin))
        .or_else(|| codec::query_param(page, SHELL_PARAM).and_then(|s| parse_web_url(&s)))
        .unwrap_or_else(|| fallback.clone());
    target.set_query(None);
    target.set_fragment(None);
    target
}

/// Only `http`/`https` targets are followed; the shell origin comes from an
/// unsigned token.
fn parse_web_url(s: &str) -> Option<Url> {
    Url::parse(s)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}
