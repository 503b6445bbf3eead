use crate::types::{ProviderIdentity, Session, SubjectId};

/// Which source, if any, authenticated the visitor.
///
/// The variants carry their session, so the two authenticated modes cannot
/// both be active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Unauthenticated,
    SsoAuthenticated(Session),
    ProviderAuthenticated(ProviderIdentity),
}

/// Borrowed view of the authenticated user, whichever source it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthUser<'a> {
    Sso(&'a Session),
    Provider(&'a ProviderIdentity),
}

impl AuthUser<'_> {
    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        match self {
            Self::Sso(s) => &s.subject_id,
            Self::Provider(p) => &p.subject_id,
        }
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Sso(s) => Some(&s.email),
            Self::Provider(p) => p.email.as_deref(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Sso(s) => Some(&s.display_name),
            Self::Provider(p) => p.display_name.as_deref(),
        }
    }
}

/// Authoritative authentication state, as exposed to the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AuthState {
    pub mode: AuthMode,
    /// `true` from activation until the first resolved state, never again after.
    pub loading: bool,
    /// The page was opened with SSO handoff parameters.
    pub sso_request: bool,
    /// Last user-facing error message (provider failures).
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

impl AuthState {
    /// State before anything has been resolved.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            mode: AuthMode::Unauthenticated,
            loading: true,
            sso_request: false,
            error: None,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser<'_>> {
        match &self.mode {
            AuthMode::Unauthenticated => None,
            AuthMode::SsoAuthenticated(s) => Some(AuthUser::Sso(s)),
            AuthMode::ProviderAuthenticated(p) => Some(AuthUser::Provider(p)),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self.mode, AuthMode::Unauthenticated)
    }

    /// SSO-derived: authenticated through the shell, or opened as a handoff.
    #[must_use]
    pub fn is_sso(&self) -> bool {
        self.sso_request || matches!(self.mode, AuthMode::SsoAuthenticated(_))
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match &self.mode {
            AuthMode::SsoAuthenticated(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn provider_identity(&self) -> Option<&ProviderIdentity> {
        match &self.mode {
            AuthMode::ProviderAuthenticated(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            subject_id: "u1".into(),
            email: "a@b.com".into(),
            display_name: "Ada".into(),
            year_of_study: "Unknown".into(),
            role: "student".into(),
            is_admin: false,
            shell_origin: "https://shell.example.com".into(),
            micro_app_origin: "https://app.example.com".into(),
        }
    }

    #[test]
    fn test_initial_state_is_loading_and_anonymous() {
        let state = AuthState::initial();
        assert!(state.loading);
        assert!(!state.is_authenticated());
        assert!(state.user().is_none());
        assert!(!state.is_sso());
    }

    #[test]
    fn test_user_view_for_each_mode() {
        let mut state = AuthState::initial();
        state.mode = AuthMode::SsoAuthenticated(session());
        let user = state.user().unwrap();
        assert_eq!(user.subject_id().as_str(), "u1");
        assert_eq!(user.email(), Some("a@b.com"));
        assert_eq!(user.display_name(), Some("Ada"));
        assert!(state.is_sso());
        assert!(state.provider_identity().is_none());

        state.mode = AuthMode::ProviderAuthenticated(ProviderIdentity::new("p1"));
        let user = state.user().unwrap();
        assert_eq!(user.subject_id().as_str(), "p1");
        assert_eq!(user.email(), None);
        assert!(!state.is_sso());
        assert!(state.session().is_none());
    }

    #[test]
    fn test_sso_request_marks_state_as_sso() {
        let mut state = AuthState::initial();
        state.sso_request = true;
        assert!(state.is_sso());
        assert!(!state.is_authenticated());
    }
}
