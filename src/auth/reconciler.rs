use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::machine::{AuthMachine, Disposition, Phase};
use super::state::AuthState;
use crate::error::Error;
use crate::gateway::{SsoError, SsoGateway};
use crate::navigator::Navigator;
use crate::provider::{Credentials, IdentityProvider};
use crate::store::Storage;
use crate::types::{ProviderIdentity, Session};

/// Shared between the background task and the handle.
struct Shared<S, N, P> {
    gateway: SsoGateway<S, N>,
    provider: P,
    machine: Mutex<AuthMachine>,
    state_tx: watch::Sender<AuthState>,
}

impl<S: Storage, N: Navigator, P: IdentityProvider> Shared<S, N, P> {
    /// Run one machine transition and publish the result if it changed.
    fn update<R>(&self, f: impl FnOnce(&mut AuthMachine) -> R) -> R {
        let mut machine = self.machine.lock();
        let out = f(&mut *machine);
        let next = machine.state();
        self.state_tx.send_if_modified(|current| {
            if *current == *next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        out
    }

    fn phase(&self) -> Phase {
        self.machine.lock().phase()
    }

    async fn resolve_sso(&self, sso_request: bool) -> Option<Session> {
        let error = match self.gateway.resolve().await {
            Ok(session) => return Some(session),
            Err(SsoError::NoSession) => return None,
            Err(error) => error,
        };
        tracing::warn!(error = %error, "SSO authentication failed");

        let recoverable = matches!(error, SsoError::Decode(_) | SsoError::Validation(_));
        if !(sso_request && recoverable && self.gateway.config().stored_fallback()) {
            return None;
        }
        match self.gateway.stored_session().await {
            Ok(Some(session)) => {
                tracing::info!(subject_id = %session.subject_id, "Falling back to stored SSO session");
                Some(session)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Stored session fallback failed");
                None
            }
        }
    }
}

/// Merges SSO resolution with the identity provider's session stream into
/// one authoritative [`AuthState`].
///
/// ```rust,ignore
/// let gateway = SsoGateway::new(config, storage, navigator);
/// let mut auth = AuthReconciler::new(gateway, provider).activate();
/// let state = auth.ready().await;
/// if state.is_authenticated() { /* ... */ }
/// ```
pub struct AuthReconciler<S, N, P> {
    gateway: SsoGateway<S, N>,
    provider: P,
}

impl<S: Storage, N: Navigator, P: IdentityProvider> AuthReconciler<S, N, P> {
    #[must_use]
    pub fn new(gateway: SsoGateway<S, N>, provider: P) -> Self {
        Self { gateway, provider }
    }

    /// Start reconciling in a background task. Must be called within a Tokio runtime.
    ///
    /// The returned handle owns the task: dropping it (or calling
    /// [`AuthHandle::shutdown`]) releases the provider subscription.
    #[must_use]
    pub fn activate(self) -> AuthHandle<S, N, P> {
        let (state_tx, state_rx) = watch::channel(AuthState::initial());
        let shared = Arc::new(Shared {
            gateway: self.gateway,
            provider: self.provider,
            machine: Mutex::new(AuthMachine::new()),
            state_tx,
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(Arc::clone(&shared), shutdown_rx));

        AuthHandle {
            shared,
            state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn run<S, N, P>(shared: Arc<Shared<S, N, P>>, mut shutdown: oneshot::Receiver<()>)
where
    S: Storage,
    N: Navigator,
    P: IdentityProvider,
{
    let sso_request = shared.gateway.is_sso_request();
    shared.update(|m| m.begin(sso_request));

    // Subscribed alongside resolution; the machine holds early events back.
    let mut subscription = shared.provider.subscribe();

    let resolution = shared.resolve_sso(sso_request);
    tokio::pin!(resolution);
    let session = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                subscription.unsubscribe();
                return;
            }
            session = &mut resolution => break session,
            Some(event) = subscription.next() => {
                let disposition = shared.update(|m| m.provider_event(event));
                tracing::debug!(?disposition, "Provider event during SSO resolution");
            }
        }
    };
    shared.update(|m| m.sso_resolved(session));

    let settle = tokio::time::sleep(shared.gateway.config().provider_settle());
    tokio::pin!(settle);
    let mut stream_open = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = subscription.next(), if stream_open => match event {
                Some(event) => {
                    if shared.update(|m| m.provider_event(event)) == Disposition::Discarded {
                        tracing::debug!("Provider event suppressed by SSO precedence");
                    }
                }
                None => {
                    tracing::warn!("Identity provider stream ended");
                    stream_open = false;
                    shared.update(AuthMachine::provider_closed);
                }
            },
            () = &mut settle, if shared.phase() == Phase::Resolving => {
                tracing::info!("Identity provider did not report; treating visitor as unauthenticated");
                shared.update(AuthMachine::settle_timeout);
            }
        }
    }

    subscription.unsubscribe();
}

/// The application-facing auth surface: current user, loading flag, SSO
/// flag and logout, plus change notification.
pub struct AuthHandle<S, N, P> {
    shared: Arc<Shared<S, N, P>>,
    state_rx: watch::Receiver<AuthState>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl<S: Storage, N: Navigator, P: IdentityProvider> AuthHandle<S, N, P> {
    /// Snapshot of the current state. The signed-in user is `state().user()`.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state_rx.borrow().clone()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.state_rx.borrow().loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state_rx.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_sso(&self) -> bool {
        self.state_rx.borrow().is_sso()
    }

    /// Independent receiver for UI layers that want to observe changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state_rx.clone()
    }

    /// The gateway this handle resolves through.
    #[must_use]
    pub fn gateway(&self) -> &SsoGateway<S, N> {
        &self.shared.gateway
    }

    /// Wait for the next state change. `None` once the reconciler is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.state_rx.changed().await.ok()?;
        Some(self.state_rx.borrow_and_update().clone())
    }

    /// Wait until the first state is resolved (`loading == false`).
    pub async fn ready(&mut self) -> AuthState {
        if let Ok(state) = self.state_rx.wait_for(|s| !s.loading).await {
            return state.clone();
        }
        self.state()
    }

    /// Re-read the stored session and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backend read fails.
    pub async fn refresh(&self) -> Result<AuthState, Error> {
        let stored = self.shared.gateway.stored_session().await?;
        self.shared.update(|m| m.refreshed(stored));
        Ok(self.state())
    }

    /// Sign in with the identity provider.
    ///
    /// The resulting session reaches the state through the provider stream.
    /// A failure is surfaced on [`AuthState::error`] and returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] with the provider's error.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<ProviderIdentity, Error> {
        match self.shared.provider.sign_in(credentials).await {
            Ok(identity) => {
                self.shared.update(|m| {
                    m.set_provider_session(true);
                    m.clear_error();
                });
                Ok(identity)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Provider sign-in failed");
                self.shared.update(|m| m.surface_error(error.user_message()));
                Err(error.into())
            }
        }
    }

    /// Ask the identity provider to send a password reset email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`], also surfaced on [`AuthState::error`].
    pub async fn send_password_reset(&self, email: &str) -> Result<(), Error> {
        self.shared
            .provider
            .send_password_reset(email)
            .await
            .map_err(|error| {
                tracing::warn!(error = %error, "Password reset request failed");
                self.shared.update(|m| m.surface_error(error.user_message()));
                Error::from(error)
            })
    }

    /// Log out: end any provider session, clear the stored SSO session and
    /// navigate to the shell. Returns the navigation target.
    ///
    /// The provider is signed out whenever it holds a session, including one
    /// suppressed by SSO precedence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the stored session could not be cleared;
    /// nothing is navigated in that case.
    pub async fn logout(&self) -> Result<Url, Error> {
        let provider_session = self.shared.machine.lock().has_provider_session();
        if provider_session {
            match self.shared.provider.sign_out().await {
                Ok(()) => self.shared.update(|m| m.set_provider_session(false)),
                Err(e) => tracing::warn!(error = %e, "Provider sign-out failed during logout"),
            }
        }

        let target = self.shared.gateway.logout().await?;
        self.shared.update(AuthMachine::logged_out);
        Ok(target)
    }

    /// Stop reconciling and release the provider subscription.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Auth reconciler task ended abnormally");
        }
    }
}
