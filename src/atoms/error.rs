// ── LINGR Atoms: Error Types ───────────────────────────────────────────────
// Single canonical error enum for the simulation core, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Config, Transport…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Engines never surface these to the UI layer: every collaborator call
//     site logs the error and degrades to a default. `EngineResult` is used
//     for store setup, config loading, collaborator traits and the CLI.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// TOML config file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is invalid (bad timezone, bad quiet-hours string…).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Notification transport failure (schedule / cancel).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Location provider failure.
    #[error("Location error: {0}")]
    Location(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a transport error from any displayable message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a location error from any displayable message.
    pub fn location(message: impl Into<String>) -> Self {
        Self::Location(message.into())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All fallible core operations return this type.
pub type EngineResult<T> = Result<T, EngineError>;
