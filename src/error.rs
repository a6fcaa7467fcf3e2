use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Library(err) => err.user_message(),
            PlayerError::Service(err) => err.user_message(),
            PlayerError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Audio(err) => err.recovery_suggestions(),
            PlayerError::File(_) => vec![
                "Check that the file path is correct".to_string(),
                "Check file permissions".to_string(),
            ],
            PlayerError::Decode(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Library(err) => err.recovery_suggestions(),
            PlayerError::Service(err) => err.recovery_suggestions(),
            PlayerError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
        }
    }

    /// Check if this error allows the session to continue
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Decode(err) => err.is_recoverable(),
            PlayerError::Config(_) => true, // Defaults are always available
            PlayerError::Library(err) => err.is_recoverable(),
            PlayerError::Service(_) => false,
            PlayerError::Parse(_) => true,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(AudioError::IllegalState(_)) => ErrorSeverity::Warning,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Decode(_) => ErrorSeverity::Warning,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Library(LibraryError::PlaylistNotFound { .. })
            | PlayerError::Library(LibraryError::PresetNotFound { .. }) => ErrorSeverity::Info,
            PlayerError::Library(_) => ErrorSeverity::Warning,
            PlayerError::Service(ServiceError::SessionEnded) => ErrorSeverity::Info,
            PlayerError::Service(_) => ErrorSeverity::Error,
            PlayerError::Parse(_) => ErrorSeverity::Info,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio output and media-instance errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Media instance not ready: {0}")]
    IllegalState(String),

    #[error("Cannot open {locator}: {source}")]
    Open {
        locator: String,
        #[source]
        source: DecodeError,
    },
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
            AudioError::IllegalState(msg) => format!("Audio player was not ready: {}", msg),
            AudioError::Open { locator, source } => {
                format!("Cannot play '{}': {}", locator, source.user_message())
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::DeviceNotFound { .. } => vec![
                "Use 'devices' to see available audio devices".to_string(),
                "Check that your audio device is connected and powered on".to_string(),
            ],
            AudioError::StreamError(_) => vec![
                "Try pausing and resuming playback".to_string(),
                "Check audio device connections".to_string(),
            ],
            AudioError::InitializationFailed(_) => vec![
                "Restart the application".to_string(),
                "Check that no other application holds exclusive audio access".to_string(),
            ],
            AudioError::IllegalState(_) => vec!["The action is retried once the track is ready".to_string()],
            AudioError::Open { source, .. } => source.recovery_suggestions(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // Can fall back to the default device
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => false,
            AudioError::IllegalState(_) => true,
            AudioError::Open { .. } => true, // The track is skipped
        }
    }
}

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio format '{}' is not supported", format)
            }
            DecodeError::CorruptedFile(msg) => {
                format!("Audio file appears to be corrupted or damaged: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => format!("Failed to decode audio data: {}", msg),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::UnsupportedFormat { .. } => vec![
                "Supported formats: FLAC, WAV, MP3, OGG/Vorbis, AAC/M4A".to_string(),
                "Convert the file to a supported format".to_string(),
            ],
            DecodeError::CorruptedFile(_) | DecodeError::DecodeFailed(_) => vec![
                "Try re-copying the file".to_string(),
                "Run 'playlist clear-errors <name>' after replacing the file".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        false // The file itself has to change
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => format!("Cannot access configuration file: {}", err),
            ConfigError::SerializationError(_) => "Failed to save configuration settings".to_string(),
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/ambient-mixer/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec!["Current settings stay in effect".to_string()],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }
}

/// Playlist library and preset errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Playlist not found: {name}")]
    PlaylistNotFound { name: String },

    #[error("Playlist already exists: {name}")]
    PlaylistExists { name: String },

    #[error("Preset not found: {name}")]
    PresetNotFound { name: String },

    #[error("No audio files found in {path}")]
    NoTracks { path: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl LibraryError {
    pub fn user_message(&self) -> String {
        match self {
            LibraryError::PlaylistNotFound { name } => format!("Playlist '{}' does not exist", name),
            LibraryError::PlaylistExists { name } => format!("A playlist named '{}' already exists", name),
            LibraryError::PresetNotFound { name } => format!("Preset '{}' does not exist", name),
            LibraryError::NoTracks { path } => format!("No supported audio files found in '{}'", path),
            LibraryError::IoError(err) => format!("Cannot access the library file: {}", err),
            LibraryError::SerializationError(_) => "Failed to save the library".to_string(),
            LibraryError::DeserializationError(_) => {
                "Library file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            LibraryError::PlaylistNotFound { .. } => vec![
                "Use 'playlist list' to see available playlists".to_string(),
                "Check the playlist name spelling".to_string(),
            ],
            LibraryError::PlaylistExists { .. } => vec![
                "Use 'playlist add <name> <paths>' to extend the existing playlist".to_string(),
            ],
            LibraryError::PresetNotFound { .. } => vec![
                "Use 'preset list' to see saved presets".to_string(),
            ],
            LibraryError::NoTracks { .. } => vec![
                "Supported formats: FLAC, WAV, MP3, OGG/Vorbis, AAC/M4A".to_string(),
            ],
            LibraryError::IoError(_) | LibraryError::SerializationError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            LibraryError::DeserializationError(_) => vec![
                "Back up and remove library.toml to start with an empty library".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LibraryError::DeserializationError(_))
    }
}

/// Errors talking to the playback service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Playback session has ended")]
    SessionEnded,

    #[error("Playback task failed: {0}")]
    TaskFailed(String),
}

impl ServiceError {
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::SessionEnded => "The playback session has already ended".to_string(),
            ServiceError::TaskFailed(msg) => format!("The playback session crashed: {}", msg),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ServiceError::SessionEnded => {
                vec!["Use 'play' to start a new session".to_string()]
            }
            ServiceError::TaskFailed(_) => vec!["Restart the application".to_string()],
        }
    }
}
