//! Two-tier access control: master password plus per-report passwords

mod credentials;

pub use credentials::{mint_secret, ConfigFileSink, CredentialSink, CredentialStore};
