use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::LibraryError;
use crate::models::{Playlist, PlaylistId, TrackLocator};
use crate::service::PlaylistStore;

/// A track entry as persisted; `error` is set once playback failed on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub locator: TrackLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoredTrack {
    pub fn new(locator: TrackLocator) -> Self {
        Self { locator, error: None }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlaylist {
    pub name: String,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub tracks: Vec<StoredTrack>,
}

impl StoredPlaylist {
    pub fn failed_count(&self) -> usize {
        self.tracks.iter().filter(|track| track.is_failed()).count()
    }

    /// The mixer's view: errored tracks are left out
    pub fn to_playlist(&self) -> Playlist {
        let tracks = self
            .tracks
            .iter()
            .filter(|track| !track.is_failed())
            .map(|track| track.locator.clone())
            .collect();
        Playlist::new(self.name.clone(), tracks)
            .with_volume(self.volume)
            .with_shuffle(self.shuffle)
    }
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub name: String,
    pub volume: f32,
}

/// A named snapshot of the active playlists and their volumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub playlists: Vec<PresetEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryFile {
    #[serde(default)]
    playlists: Vec<StoredPlaylist>,
    #[serde(default)]
    presets: Vec<Preset>,
}

/// Playlists and presets persisted in one TOML file.
///
/// Every mutating call writes the file before returning, so a crash never
/// loses an acknowledged change.
pub struct Library {
    path: PathBuf,
    data: LibraryFile,
}

impl Library {
    /// Open the library at `path`; a missing file is an empty library
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            debug!("No library at {}, starting empty", path.display());
            LibraryFile::default()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn playlists(&self) -> &[StoredPlaylist] {
        &self.data.playlists
    }

    pub fn playlist(&self, name: &str) -> Option<&StoredPlaylist> {
        self.data.playlists.iter().find(|playlist| playlist.name == name)
    }

    /// Create a playlist from audio files, directories and M3U lists
    pub fn create_playlist(&mut self, name: &str, sources: &[PathBuf]) -> Result<usize, LibraryError> {
        if self.playlist(name).is_some() {
            return Err(LibraryError::PlaylistExists {
                name: name.to_string(),
            });
        }
        let locators = collect_tracks(sources)?;
        let count = locators.len();
        self.data.playlists.push(StoredPlaylist {
            name: name.to_string(),
            shuffle: false,
            volume: 1.0,
            active: false,
            tracks: locators.into_iter().map(StoredTrack::new).collect(),
        });
        self.save()?;
        info!("Created playlist '{}' with {} tracks", name, count);
        Ok(count)
    }

    /// Append tracks not already in the playlist; returns how many were added
    pub fn add_tracks(&mut self, name: &str, sources: &[PathBuf]) -> Result<usize, LibraryError> {
        let locators = collect_tracks(sources)?;
        let playlist = self.playlist_mut(name)?;
        let mut added = 0;
        for locator in locators {
            if playlist.tracks.iter().any(|track| track.locator == locator) {
                continue;
            }
            playlist.tracks.push(StoredTrack::new(locator));
            added += 1;
        }
        self.save()?;
        Ok(added)
    }

    pub fn delete_playlist(&mut self, name: &str) -> Result<(), LibraryError> {
        let before = self.data.playlists.len();
        self.data.playlists.retain(|playlist| playlist.name != name);
        if self.data.playlists.len() == before {
            return Err(LibraryError::PlaylistNotFound {
                name: name.to_string(),
            });
        }
        self.save()
    }

    pub fn set_active(&mut self, name: &str, active: bool) -> Result<(), LibraryError> {
        self.playlist_mut(name)?.active = active;
        self.save()
    }

    pub fn set_volume(&mut self, name: &str, volume: f32) -> Result<(), LibraryError> {
        self.playlist_mut(name)?.volume = volume.clamp(0.0, 1.0);
        self.save()
    }

    pub fn set_shuffle(&mut self, name: &str, shuffle: bool) -> Result<(), LibraryError> {
        self.playlist_mut(name)?.shuffle = shuffle;
        self.save()
    }

    /// The active playlists in library order, errored tracks excluded
    pub fn active_playlists(&self) -> Vec<Playlist> {
        self.data
            .playlists
            .iter()
            .filter(|playlist| playlist.active)
            .map(StoredPlaylist::to_playlist)
            .collect()
    }

    /// Flag tracks that failed to play; returns how many were newly flagged
    pub fn mark_failed(&mut self, playlist: &PlaylistId, locators: &[TrackLocator]) -> Result<usize, LibraryError> {
        let stored = self.playlist_mut(playlist.as_str())?;
        let mut flagged = 0;
        for track in stored.tracks.iter_mut() {
            if !track.is_failed() && locators.contains(&track.locator) {
                track.error = Some("playback failed".to_string());
                flagged += 1;
            }
        }
        if flagged > 0 {
            self.save()?;
        }
        Ok(flagged)
    }

    /// Forget recorded failures so the tracks are tried again
    pub fn clear_errors(&mut self, name: &str) -> Result<usize, LibraryError> {
        let playlist = self.playlist_mut(name)?;
        let mut cleared = 0;
        for track in playlist.tracks.iter_mut() {
            if track.error.take().is_some() {
                cleared += 1;
            }
        }
        self.save()?;
        Ok(cleared)
    }

    pub fn presets(&self) -> &[Preset] {
        &self.data.presets
    }

    /// Store the current active set under `name`, replacing an existing preset
    pub fn save_preset(&mut self, name: &str) -> Result<usize, LibraryError> {
        let entries: Vec<PresetEntry> = self
            .data
            .playlists
            .iter()
            .filter(|playlist| playlist.active)
            .map(|playlist| PresetEntry {
                name: playlist.name.clone(),
                volume: playlist.volume,
            })
            .collect();
        let count = entries.len();
        let preset = Preset {
            name: name.to_string(),
            playlists: entries,
        };
        match self.data.presets.iter_mut().find(|existing| existing.name == name) {
            Some(existing) => *existing = preset,
            None => self.data.presets.push(preset),
        }
        self.save()?;
        Ok(count)
    }

    /// Activate exactly the preset's playlists with its volumes.
    ///
    /// Returns the names the preset refers to that no longer exist.
    pub fn load_preset(&mut self, name: &str) -> Result<Vec<String>, LibraryError> {
        let preset = self
            .data
            .presets
            .iter()
            .find(|preset| preset.name == name)
            .cloned()
            .ok_or_else(|| LibraryError::PresetNotFound {
                name: name.to_string(),
            })?;

        for playlist in self.data.playlists.iter_mut() {
            match preset.playlists.iter().find(|entry| entry.name == playlist.name) {
                Some(entry) => {
                    playlist.active = true;
                    playlist.volume = entry.volume.clamp(0.0, 1.0);
                }
                None => playlist.active = false,
            }
        }

        let missing: Vec<String> = preset
            .playlists
            .iter()
            .filter(|entry| self.playlist(&entry.name).is_none())
            .map(|entry| entry.name.clone())
            .collect();
        for name in &missing {
            warn!("Preset refers to missing playlist '{}'", name);
        }
        self.save()?;
        Ok(missing)
    }

    pub fn delete_preset(&mut self, name: &str) -> Result<(), LibraryError> {
        let before = self.data.presets.len();
        self.data.presets.retain(|preset| preset.name != name);
        if self.data.presets.len() == before {
            return Err(LibraryError::PresetNotFound {
                name: name.to_string(),
            });
        }
        self.save()
    }

    fn playlist_mut(&mut self, name: &str) -> Result<&mut StoredPlaylist, LibraryError> {
        self.data
            .playlists
            .iter_mut()
            .find(|playlist| playlist.name == name)
            .ok_or_else(|| LibraryError::PlaylistNotFound {
                name: name.to_string(),
            })
    }
}

/// Library shared between the command surface and the playback session
pub type SharedLibrary = Arc<Mutex<Library>>;

pub fn lock_library(library: &SharedLibrary) -> MutexGuard<'_, Library> {
    library.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Persists playback failures reported by the session into the library
pub struct LibraryStore {
    library: SharedLibrary,
}

impl LibraryStore {
    pub fn new(library: SharedLibrary) -> Self {
        Self { library }
    }
}

impl PlaylistStore for LibraryStore {
    fn report_failed_locators(&mut self, playlist: &PlaylistId, locators: &[TrackLocator]) {
        match lock_library(&self.library).mark_failed(playlist, locators) {
            Ok(flagged) => debug!("Flagged {} failed tracks in '{}'", flagged, playlist),
            Err(e) => warn!("Could not record failed tracks of '{}': {}", playlist, e),
        }
    }
}

/// Check if a file extension is a decodable audio format
pub fn is_supported_format(extension: &str) -> bool {
    matches!(
        extension.to_lowercase().as_str(),
        "flac" | "wav" | "wave" | "m4a" | "alac" | "mp3" | "ogg" | "oga"
    )
}

fn is_m3u(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "m3u" | "m3u8"))
        .unwrap_or(false)
}

/// Recursively collect supported audio files under `dir`, sorted
pub fn scan_audio_files(dir: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let mut audio_files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            audio_files.append(&mut scan_audio_files(&path)?);
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(is_supported_format)
            .unwrap_or(false)
        {
            audio_files.push(path);
        }
    }

    audio_files.sort();
    Ok(audio_files)
}

/// Entries of an M3U list; relative paths resolve against the list's directory
fn read_m3u(path: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = Path::new(line);
        entries.push(if entry.is_absolute() {
            entry.to_path_buf()
        } else {
            base.join(entry)
        });
    }

    Ok(entries)
}

fn collect_tracks(sources: &[PathBuf]) -> Result<Vec<TrackLocator>, LibraryError> {
    let mut files = Vec::new();
    for source in sources {
        if source.is_dir() {
            files.extend(scan_audio_files(source)?);
        } else if is_m3u(source) {
            files.extend(read_m3u(source)?);
        } else if source.is_file() {
            files.push(source.clone());
        } else {
            return Err(LibraryError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            )));
        }
    }

    if files.is_empty() {
        let path = sources
            .iter()
            .map(|source| source.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(LibraryError::NoTracks { path });
    }

    Ok(files
        .into_iter()
        .map(|file| TrackLocator::from_path(&fs::canonicalize(&file).unwrap_or(file)))
        .collect())
}
