pub mod payment;
pub mod preferences;
pub mod mailer;

pub use preferences::{CardProcessor, StorePreferences};

/// Error type returned by the async repository traits across the workspace.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown preference value for {key}: {value}")]
    PreferenceError { key: String, value: String },
}
