//! The configuration error type.

/// `brisk.toml` could not be read, parsed or validated, or a command-line
/// override is malformed.
///
/// The CLI prints these without a backtrace and aborts before any rule
/// executes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("cannot read brisk.toml: {0}")]
    IoError(#[from] std::io::Error),

    /// Not valid TOML, or a value of the wrong type.
    #[error("brisk.toml is malformed: {0}")]
    ParseError(String),

    /// A setting that must not be empty is empty.
    #[error("{0} must not be empty")]
    MissingField(String),

    /// A numeric setting could not be interpreted.
    #[error("unable to determine {setting} from configuration; value used was '{value}'")]
    InvalidNumber {
        /// Dotted name of the setting, e.g. `build.threads`.
        setting: &'static str,
        /// The value as written.
        value: String,
    },

    /// Some other value is out of range or unparseable.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}
