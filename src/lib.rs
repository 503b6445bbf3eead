#![doc = include_str!("../README.md")]

#[cfg(feature = "reconciler")]
pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
#[cfg(feature = "file-store")]
pub mod file_store;
pub mod gateway;
pub mod navigator;
#[cfg(feature = "reconciler")]
pub mod provider;
pub mod store;
pub mod types;
pub mod validator;

// Re-exports for convenient access
#[cfg(feature = "reconciler")]
pub use auth::{AuthHandle, AuthMode, AuthReconciler, AuthState, AuthUser};
pub use codec::{DecodeError, RawToken};
pub use config::SsoConfig;
pub use error::Error;
#[cfg(feature = "file-store")]
pub use file_store::FileStorage;
pub use gateway::{SsoError, SsoGateway, SsoResult};
pub use navigator::{MemoryNavigator, Navigator};
#[cfg(feature = "reconciler")]
pub use provider::{
    Credentials, IdentityProvider, MemoryProvider, ProviderError, ProviderErrorCode,
    ProviderEvent, Subscription,
};
pub use store::{MemoryStorage, SessionStore, Storage, StorageError, StoreError};
pub use types::{ProviderIdentity, Session, SubjectId};
pub use validator::{SsoToken, TokenValidator, ValidationError, ValidationWarning};
