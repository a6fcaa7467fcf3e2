use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque reference to a single audio resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackLocator(String);

impl TrackLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn from_path(path: &std::path::Path) -> Self {
        Self(path.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the locator to a filesystem path, accepting `file://` URIs
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.0.strip_prefix("file://").unwrap_or(&self.0))
    }

    /// Short name for display (file name without directories)
    pub fn display_name(&self) -> String {
        self.to_path()
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.0.clone())
    }
}

impl fmt::Display for TrackLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable playlist identity (the playlist name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaylistId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// An active playlist as seen by the mixer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub shuffle: bool,
    pub volume: f32,
    pub tracks: Vec<TrackLocator>,
}

impl Playlist {
    pub fn new(id: impl Into<PlaylistId>, tracks: Vec<TrackLocator>) -> Self {
        Self {
            id: id.into(),
            shuffle: false,
            volume: 1.0,
            tracks,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

impl From<String> for PlaylistId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Process-wide playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// User-facing informational messages emitted by the playback service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Playback was requested but no playlist is active
    NothingToPlay,
    /// Every track of a newly activated playlist failed to load
    PlaylistUnplayable { playlist: PlaylistId },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::NothingToPlay => "Nothing to play - activate a playlist first".to_string(),
            Notice::PlaylistUnplayable { playlist } => {
                format!("None of the tracks in playlist '{}' could be played", playlist)
            }
        }
    }
}

/// Observable service state published to clients
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub stop_at: Option<DateTime<Utc>>,
    pub locks: Vec<String>,
    pub active_playlists: Vec<PlaylistId>,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Time left until the stop timer fires, recomputed from the stop instant
    pub fn remaining(&self) -> Option<Duration> {
        self.stop_at.map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}
