use super::state::{AuthMode, AuthState};
use crate::provider::ProviderEvent;
use crate::types::Session;

/// Lifecycle phase within one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Resolving,
    Settled,
}

/// What happened to a provider event fed to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Held until SSO resolution completes; only the latest is kept.
    Buffered,
    /// Suppressed by SSO precedence.
    Discarded,
}

/// Synchronous auth-state transition rules.
///
/// Inputs arrive in any order; the machine enforces that:
/// - provider events cannot change the observed state before SSO resolution
///   completes (they are buffered);
/// - once the page declared SSO intent, or an SSO session was accepted,
///   provider events are discarded until logout;
/// - `loading` is cleared once and never set again.
#[derive(Debug, Clone)]
pub struct AuthMachine {
    state: AuthState,
    phase: Phase,
    sso_resolved: bool,
    sso_locked: bool,
    buffered: Option<ProviderEvent>,
    provider_session: bool,
}

impl Default for AuthMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AuthState::initial(),
            phase: Phase::Init,
            sso_resolved: false,
            sso_locked: false,
            buffered: None,
            provider_session: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Provider events are being suppressed.
    #[must_use]
    pub fn is_sso_locked(&self) -> bool {
        self.sso_locked
    }

    /// The provider last reported a session, whether or not it was applied.
    #[must_use]
    pub fn has_provider_session(&self) -> bool {
        self.provider_session
    }

    /// Record a provider session change observed outside the event stream
    /// (a completed sign-in or sign-out call).
    pub fn set_provider_session(&mut self, active: bool) {
        self.provider_session = active;
    }

    /// Activation. Only the first call has any effect.
    pub fn begin(&mut self, sso_request: bool) {
        if self.phase != Phase::Init {
            return;
        }
        self.phase = Phase::Resolving;
        self.state.loading = true;
        self.state.sso_request = sso_request;
        self.sso_locked = sso_request;
    }

    /// Outcome of SSO resolution: the accepted session, or none.
    ///
    /// Without a session on a non-SSO page the machine keeps resolving and
    /// the latest buffered provider event, if any, is applied.
    pub fn sso_resolved(&mut self, session: Option<Session>) {
        if self.phase != Phase::Resolving || self.sso_resolved {
            return;
        }
        self.sso_resolved = true;

        match session {
            Some(session) => {
                self.sso_locked = true;
                self.buffered = None;
                self.settle(AuthMode::SsoAuthenticated(session), None);
            }
            None if self.state.sso_request => {
                self.buffered = None;
                self.settle(AuthMode::Unauthenticated, None);
            }
            None => {
                if let Some(event) = self.buffered.take() {
                    self.apply_provider(event);
                }
            }
        }
    }

    /// A provider session-change event.
    pub fn provider_event(&mut self, event: ProviderEvent) -> Disposition {
        if let Ok(identity) = &event {
            self.provider_session = identity.is_some();
        }
        if self.sso_locked || self.phase == Phase::Init {
            return Disposition::Discarded;
        }
        if !self.sso_resolved {
            self.buffered = Some(event);
            return Disposition::Buffered;
        }
        self.apply_provider(event);
        Disposition::Applied
    }

    /// The provider did not report within the settle window.
    pub fn settle_timeout(&mut self) {
        if self.phase == Phase::Resolving && self.sso_resolved {
            self.settle(AuthMode::Unauthenticated, None);
        }
    }

    /// The provider stream ended. Treated like a timeout if still resolving.
    pub fn provider_closed(&mut self) {
        self.settle_timeout();
    }

    /// Re-read of the stored session after activation.
    ///
    /// A stored session wins over whatever is active; a vanished one demotes
    /// an SSO-authenticated page to unauthenticated.
    pub fn refreshed(&mut self, stored: Option<Session>) {
        if self.phase != Phase::Settled {
            return;
        }
        match stored {
            Some(session) => {
                self.sso_locked = true;
                self.state.mode = AuthMode::SsoAuthenticated(session);
            }
            None => {
                if matches!(self.state.mode, AuthMode::SsoAuthenticated(_)) {
                    self.state.mode = AuthMode::Unauthenticated;
                }
            }
        }
    }

    /// Explicit logout: unauthenticated, precedence lifted.
    pub fn logged_out(&mut self) {
        self.sso_locked = false;
        self.sso_resolved = true;
        self.buffered = None;
        self.state.sso_request = false;
        self.settle(AuthMode::Unauthenticated, None);
    }

    /// Surface a user-facing message without touching the mode.
    pub fn surface_error(&mut self, message: impl Into<String>) {
        self.state.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    fn apply_provider(&mut self, event: ProviderEvent) {
        match event {
            Ok(Some(identity)) => self.settle(AuthMode::ProviderAuthenticated(identity), None),
            Ok(None) => self.settle(AuthMode::Unauthenticated, None),
            Err(error) => self.settle(
                AuthMode::Unauthenticated,
                Some(error.user_message().to_owned()),
            ),
        }
    }

    fn settle(&mut self, mode: AuthMode, error: Option<String>) {
        self.phase = Phase::Settled;
        self.state.mode = mode;
        self.state.loading = false;
        self.state.error = error;
    }
}
