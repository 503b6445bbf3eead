//! Independent identity provider boundary.
//!
//! The provider SDK itself is opaque; this module only fixes the capability
//! the reconciler needs (sign in, sign out, password reset, a cancellable
//! stream of session changes) and ships an in-process implementation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::types::ProviderIdentity;

/// Provider failure categories, keyed by the provider's `auth/*` codes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidEmail,
    UserDisabled,
    TooManyRequests,
    NetworkRequestFailed,
    PopupClosedByUser,
    CancelledPopupRequest,
    PopupBlocked,
    Other(String),
}

impl ProviderErrorCode {
    /// Map a provider code such as `auth/user-not-found`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/user-not-found" => Self::UserNotFound,
            "auth/wrong-password" => Self::WrongPassword,
            "auth/invalid-email" => Self::InvalidEmail,
            "auth/user-disabled" => Self::UserDisabled,
            "auth/too-many-requests" => Self::TooManyRequests,
            "auth/network-request-failed" => Self::NetworkRequestFailed,
            "auth/popup-closed-by-user" => Self::PopupClosedByUser,
            "auth/cancelled-popup-request" => Self::CancelledPopupRequest,
            "auth/popup-blocked" => Self::PopupBlocked,
            other => Self::Other(other.to_owned()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::InvalidEmail => "auth/invalid-email",
            Self::UserDisabled => "auth/user-disabled",
            Self::TooManyRequests => "auth/too-many-requests",
            Self::NetworkRequestFailed => "auth/network-request-failed",
            Self::PopupClosedByUser => "auth/popup-closed-by-user",
            Self::CancelledPopupRequest => "auth/cancelled-popup-request",
            Self::PopupBlocked => "auth/popup-blocked",
            Self::Other(code) => code,
        }
    }

    /// Short message suitable for display next to the failed action.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "No account found with this email address.",
            Self::WrongPassword => "Incorrect password. Please try again.",
            Self::InvalidEmail => "Invalid email address. Please check your email.",
            Self::UserDisabled => "This account has been disabled. Please contact support.",
            Self::TooManyRequests => "Too many failed attempts. Please try again later.",
            Self::NetworkRequestFailed => "Network error. Please check your internet connection.",
            Self::PopupClosedByUser => "Sign-in popup was closed. Please try again.",
            Self::CancelledPopupRequest => "Sign-in was cancelled. Please try again.",
            Self::PopupBlocked => {
                "Popup was blocked by your browser. Please allow popups and try again."
            }
            Self::Other(_) => "An error occurred during authentication. Please try again.",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity provider failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// See [`ProviderErrorCode::user_message`].
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        self.code.user_message()
    }
}

/// Sign-in credentials.
#[derive(Clone)]
#[non_exhaustive]
pub enum Credentials {
    EmailPassword { email: String, password: String },
    /// Federated sign-in through a named upstream (e.g. `google.com`).
    Federated { provider: String },
}

impl Credentials {
    #[must_use]
    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::EmailPassword {
            email: email.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn federated(provider: impl Into<String>) -> Self {
        Self::Federated {
            provider: provider.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Self::Federated { provider } => f
                .debug_struct("Federated")
                .field("provider", provider)
                .finish(),
        }
    }
}

/// One session-change notification: the provider's current identity, or a
/// stream-level failure.
pub type ProviderEvent = Result<Option<ProviderIdentity>, ProviderError>;

/// Cancellable stream of [`ProviderEvent`]s.
///
/// Call [`unsubscribe`](Self::unsubscribe) to release it; dropping it has the
/// same effect.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ProviderEvent>,
}

impl Subscription {
    /// Subscription plus the sender a provider adapter feeds.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<ProviderEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { events: rx })
    }

    /// Next event, or `None` once the provider side is gone.
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        self.events.recv().await
    }

    /// Stop receiving. The provider observes the channel as closed.
    pub fn unsubscribe(mut self) {
        self.events.close();
    }
}

/// Independent identity provider capability.
///
/// `subscribe` must deliver the current session state promptly, then every
/// subsequent change.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityProvider for MySdk {
///     async fn sign_in(&self, credentials: Credentials) -> Result<ProviderIdentity, ProviderError> {
///         self.client.sign_in(credentials).await.map_err(into_provider_error)
///     }
///     // sign_out, send_password_reset ...
///     fn subscribe(&self) -> Subscription {
///         let (tx, subscription) = Subscription::channel();
///         self.client.on_auth_state_changed(move |user| { let _ = tx.send(Ok(user)); });
///         subscription
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    fn sign_in(
        &self,
        credentials: Credentials,
    ) -> impl Future<Output = Result<ProviderIdentity, ProviderError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn send_password_reset(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn subscribe(&self) -> Subscription;
}

#[derive(Debug, Default)]
struct ProviderInner {
    accounts: HashMap<String, (String, ProviderIdentity)>,
    federated: HashMap<String, ProviderIdentity>,
    current: Option<ProviderIdentity>,
    listeners: Vec<mpsc::UnboundedSender<ProviderEvent>>,
    fail_next: Option<ProviderError>,
    reset_requests: Vec<String>,
}

impl ProviderInner {
    fn broadcast(&mut self, event: &ProviderEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_current(&mut self, identity: Option<ProviderIdentity>) {
        self.current = identity.clone();
        self.broadcast(&Ok(identity));
    }
}

/// In-process [`IdentityProvider`] with a fixed account table.
///
/// Clones share state, so a test can keep one clone to drive session changes
/// while the reconciler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<Mutex<ProviderInner>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an email/password account.
    #[must_use]
    pub fn with_account(
        self,
        email: impl Into<String>,
        password: impl Into<String>,
        identity: ProviderIdentity,
    ) -> Self {
        self.inner
            .lock()
            .accounts
            .insert(email.into(), (password.into(), identity));
        self
    }

    /// Register the identity a federated sign-in through `provider` yields.
    #[must_use]
    pub fn with_federated(self, provider: impl Into<String>, identity: ProviderIdentity) -> Self {
        self.inner.lock().federated.insert(provider.into(), identity);
        self
    }

    /// Start with a restored session, as if the SDK had one cached.
    #[must_use]
    pub fn with_session(self, identity: ProviderIdentity) -> Self {
        self.inner.lock().current = Some(identity);
        self
    }

    /// Change the session from outside (another tab, token restore, revocation).
    pub fn set_session(&self, identity: Option<ProviderIdentity>) {
        self.inner.lock().set_current(identity);
    }

    /// Push a stream-level failure to every subscriber.
    pub fn emit_error(&self, error: ProviderError) {
        self.inner.lock().broadcast(&Err(error));
    }

    /// Make the next sign-in, sign-out or reset call fail with `error`.
    pub fn fail_next(&self, error: ProviderError) {
        self.inner.lock().fail_next = Some(error);
    }

    /// Current provider session.
    #[must_use]
    pub fn current(&self) -> Option<ProviderIdentity> {
        self.inner.lock().current.clone()
    }

    /// Live subscriptions. Released ones are pruned first.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|tx| !tx.is_closed());
        inner.listeners.len()
    }

    /// Emails password resets were requested for, oldest first.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        self.inner.lock().reset_requests.clone()
    }

    fn take_failure(&self) -> Result<(), ProviderError> {
        match self.inner.lock().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    matches!(email.split_once('@'), Some((local, domain)) if !local.is_empty() && !domain.is_empty())
}

impl IdentityProvider for MemoryProvider {
    async fn sign_in(&self, credentials: Credentials) -> Result<ProviderIdentity, ProviderError> {
        self.take_failure()?;
        let mut inner = self.inner.lock();

        let identity = match credentials {
            Credentials::EmailPassword { email, password } => {
                if !looks_like_email(&email) {
                    return Err(ProviderError::new(
                        ProviderErrorCode::InvalidEmail,
                        "malformed email",
                    ));
                }
                let (expected, identity) = inner.accounts.get(&email).ok_or_else(|| {
                    ProviderError::new(ProviderErrorCode::UserNotFound, "no such account")
                })?;
                if *expected != password {
                    return Err(ProviderError::new(
                        ProviderErrorCode::WrongPassword,
                        "password mismatch",
                    ));
                }
                identity.clone()
            }
            Credentials::Federated { provider } => {
                inner.federated.get(&provider).cloned().ok_or_else(|| {
                    ProviderError::new(
                        ProviderErrorCode::Other("auth/operation-not-allowed".into()),
                        format!("federated provider {provider} is not enabled"),
                    )
                })?
            }
        };

        inner.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.take_failure()?;
        self.inner.lock().set_current(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        self.take_failure()?;
        let mut inner = self.inner.lock();
        if !looks_like_email(email) {
            return Err(ProviderError::new(
                ProviderErrorCode::InvalidEmail,
                "malformed email",
            ));
        }
        if !inner.accounts.contains_key(email) {
            return Err(ProviderError::new(
                ProviderErrorCode::UserNotFound,
                "no such account",
            ));
        }
        inner.reset_requests.push(email.to_owned());
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        let (tx, subscription) = Subscription::channel();
        let mut inner = self.inner.lock();
        if tx.send(Ok(inner.current.clone())).is_ok() {
            inner.listeners.push(tx);
        }
        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p1() -> ProviderIdentity {
        ProviderIdentity::new("p1").with_email("p1@example.com")
    }

    fn provider() -> MemoryProvider {
        MemoryProvider::new().with_account("p1@example.com", "secret", p1())
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ProviderErrorCode::from_code("auth/wrong-password"),
            ProviderErrorCode::WrongPassword
        );
        assert_eq!(
            ProviderErrorCode::from_code("auth/popup-blocked").as_str(),
            "auth/popup-blocked"
        );
        let other = ProviderErrorCode::from_code("auth/quota-exceeded");
        assert_eq!(other, ProviderErrorCode::Other("auth/quota-exceeded".into()));
        assert_eq!(
            other.user_message(),
            "An error occurred during authentication. Please try again."
        );
        assert_eq!(
            ProviderErrorCode::NetworkRequestFailed.user_message(),
            "Network error. Please check your internet connection."
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::email_password("a@b.com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("a@b.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_subscribe_emits_current_state_first() {
        let provider = provider().with_session(p1());
        let mut sub = provider.subscribe();
        assert_eq!(sub.next().await, Some(Ok(Some(p1()))));
    }

    #[tokio::test]
    async fn test_sign_in_and_out_are_broadcast() {
        let provider = provider();
        let mut sub = provider.subscribe();
        assert_eq!(sub.next().await, Some(Ok(None)));

        let identity = provider
            .sign_in(Credentials::email_password("p1@example.com", "secret"))
            .await
            .unwrap();
        assert_eq!(identity, p1());
        assert_eq!(sub.next().await, Some(Ok(Some(p1()))));

        provider.sign_out().await.unwrap();
        assert_eq!(sub.next().await, Some(Ok(None)));
        assert_eq!(provider.current(), None);
    }

    #[tokio::test]
    async fn test_sign_in_failures() {
        let provider = provider();

        let err = provider
            .sign_in(Credentials::email_password("nobody@example.com", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserNotFound);

        let err = provider
            .sign_in(Credentials::email_password("p1@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::WrongPassword);

        let err = provider
            .sign_in(Credentials::email_password("not-an-email", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::InvalidEmail);

        provider.fail_next(ProviderError::new(
            ProviderErrorCode::NetworkRequestFailed,
            "offline",
        ));
        let err = provider
            .sign_in(Credentials::email_password("p1@example.com", "secret"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::NetworkRequestFailed);
        assert_eq!(provider.current(), None);
    }

    #[tokio::test]
    async fn test_federated_sign_in() {
        let provider = MemoryProvider::new().with_federated("google.com", p1());
        assert_eq!(
            provider.sign_in(Credentials::federated("google.com")).await,
            Ok(p1())
        );
        assert!(provider
            .sign_in(Credentials::federated("github.com"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_password_reset() {
        let provider = provider();
        provider.send_password_reset("p1@example.com").await.unwrap();
        assert_eq!(provider.reset_requests(), vec!["p1@example.com".to_string()]);

        let err = provider
            .send_password_reset("ghost@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn test_errors_reach_subscribers() {
        let provider = provider();
        let mut sub = provider.subscribe();
        sub.next().await;

        let error = ProviderError::new(ProviderErrorCode::NetworkRequestFailed, "offline");
        provider.emit_error(error.clone());
        assert_eq!(sub.next().await, Some(Err(error)));
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_listener() {
        let provider = provider();
        let a = provider.subscribe();
        let b = provider.subscribe();
        assert_eq!(provider.listener_count(), 2);

        a.unsubscribe();
        assert_eq!(provider.listener_count(), 1);

        drop(b);
        assert_eq!(provider.listener_count(), 0);
    }
}
