use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A credential required for the selected role is absent.
    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
