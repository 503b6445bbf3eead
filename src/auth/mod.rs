//! Authentication state reconciliation.
//!
//! [`AuthReconciler`] is the single authority for "who is the user": it runs
//! SSO resolution, listens to the identity provider, and publishes one
//! [`AuthState`] in which SSO takes precedence.

mod machine;
mod reconciler;
mod state;

pub use machine::{AuthMachine, Disposition, Phase};
pub use reconciler::{AuthHandle, AuthReconciler};
pub use state::{AuthMode, AuthState, AuthUser};
