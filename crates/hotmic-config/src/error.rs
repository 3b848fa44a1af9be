//! Session errors.

use std::path::PathBuf;
use thiserror::Error;

use hotmic_core::GraphError;

/// Why a session could not be loaded, saved or turned into an engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The session file could not be read.
    #[error("cannot read session '{path}': {source}")]
    ReadFile {
        /// Session file path.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// The session file could not be written.
    #[error("cannot write session '{path}': {source}")]
    WriteFile {
        /// Session file path.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// The parent directory of a session being saved could not be created.
    #[error("cannot create session directory '{path}': {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid session document.
    #[error("malformed session: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The session could not be encoded as TOML.
    #[error("session cannot be encoded: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A plugin type id with no registry entry.
    #[error("unknown plugin type: {0}")]
    UnknownPlugin(String),

    /// Rejected by [`validate_session`](crate::validate_session).
    #[error("invalid session: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// A channel or the analysis tap was refused while building the engine.
    #[error("engine rejected session: {0}")]
    Engine(#[from] GraphError),
}

impl ConfigError {
    /// [`ConfigError::ReadFile`] for `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// [`ConfigError::WriteFile`] for `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// [`ConfigError::CreateDir`] for `path`.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;
    use std::error::Error;
    use std::io::ErrorKind;

    fn denied() -> std::io::Error {
        std::io::Error::new(ErrorKind::PermissionDenied, "denied")
    }

    #[test]
    fn io_errors_name_the_path() {
        let cases = [
            (ConfigError::read_file("/s/mic.toml", denied()), "cannot read session '/s/mic.toml'"),
            (ConfigError::write_file("/s/mic.toml", denied()), "cannot write session '/s/mic.toml'"),
            (ConfigError::create_dir("/s", denied()), "cannot create session directory '/s'"),
        ];
        for (err, prefix) in cases {
            let msg = err.to_string();
            assert!(msg.starts_with(prefix), "got: {msg}");
            assert!(msg.ends_with("denied"), "got: {msg}");
            let source = err.source().expect("io source kept");
            assert_eq!(
                source.downcast_ref::<std::io::Error>().map(std::io::Error::kind),
                Some(ErrorKind::PermissionDenied)
            );
        }
    }

    #[test]
    fn unknown_plugin_message() {
        let err = ConfigError::UnknownPlugin("reverb".to_string());
        assert_eq!(err.to_string(), "unknown plugin type: reverb");
        assert!(err.source().is_none());
    }

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err = ConfigError::from(GraphError::ChannelNotFound(3));
        assert_eq!(err.to_string(), "engine rejected session: channel 3 not found");

        let err = ConfigError::from(ValidationError::InvalidSampleRate(0));
        assert!(err.to_string().starts_with("invalid session: "));
    }

    #[test]
    fn parse_error_converts() {
        let err: ConfigError = toml::from_str::<toml::Table>("name = ")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("malformed session: "));
    }
}
