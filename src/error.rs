/// Errors from the crate's top-level surfaces: configuration and the auth handle.
///
/// Token handling reports through [`SsoError`](crate::SsoError), which keeps
/// "no session" distinct from a rejected handoff.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Session store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[cfg(feature = "reconciler")]
    #[error("Identity provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),
}
