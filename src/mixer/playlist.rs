use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::audio::{Completion, Failure, LoopingTrackPlayer, MediaBackend, MediaEvent, MediaEventKind};
use crate::models::{PlaybackState, Playlist, PlaylistId, TrackLocator};

/// Endless rotation over one playlist's tracks
///
/// The rotation order is fixed at construction (shuffled once when the
/// playlist asks for it). Locators that cannot be opened are dropped from the
/// rotation and handed back to the caller exactly once.
pub struct PlaylistPlayer {
    source: Playlist,
    order: Vec<TrackLocator>,
    cursor: usize,
    player: Option<LoopingTrackPlayer>,
    failed: Vec<TrackLocator>,
    transport: PlaybackState,
    volume: f32,
}

impl PlaylistPlayer {
    /// Build the rotation and open its first playable track.
    ///
    /// Returns the player together with every locator that failed while
    /// scanning.
    pub fn new(
        backend: &mut dyn MediaBackend,
        playlist: &Playlist,
        playing: bool,
    ) -> (Self, Vec<TrackLocator>) {
        let mut order = playlist.tracks.clone();
        if playlist.shuffle {
            order.shuffle(&mut thread_rng());
        }

        let mut this = Self {
            source: playlist.clone(),
            order: Vec::with_capacity(order.len()),
            cursor: 0,
            player: None,
            failed: Vec::new(),
            transport: if playing {
                PlaybackState::Playing
            } else {
                PlaybackState::Paused
            },
            volume: playlist.volume.clamp(0.0, 1.0),
        };

        let mut failures = Vec::new();
        for locator in order {
            match backend.probe(&locator) {
                Ok(()) => this.order.push(locator),
                Err(err) => {
                    warn!("Skipping '{}' in playlist '{}': {}", locator, playlist.id, err);
                    if this.record_failure(&locator) {
                        failures.push(locator);
                    }
                }
            }
        }

        this.start(backend, &mut failures);
        (this, failures)
    }

    pub fn id(&self) -> &PlaylistId {
        &self.source.id
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn transport(&self) -> PlaybackState {
        self.transport
    }

    /// True once no track of the playlist can be played
    pub fn is_exhausted(&self) -> bool {
        self.player.is_none()
    }

    pub fn current_locator(&self) -> Option<&TrackLocator> {
        self.player.as_ref().map(|p| p.current_locator())
    }

    pub fn rotation(&self) -> &[TrackLocator] {
        &self.order
    }

    pub fn failed(&self) -> &[TrackLocator] {
        &self.failed
    }

    /// Whether `playlist` describes the same rotation this player was built
    /// from. Volume is not compared; failed locators are ignored on both sides.
    pub fn matches(&self, playlist: &Playlist) -> bool {
        if playlist.id != self.source.id || playlist.shuffle != self.source.shuffle {
            return false;
        }
        let usable = |tracks: &[TrackLocator]| -> Vec<TrackLocator> {
            tracks
                .iter()
                .filter(|l| !self.failed.contains(l))
                .cloned()
                .collect()
        };
        usable(&playlist.tracks) == usable(&self.source.tracks)
    }

    pub fn play(&mut self) {
        self.transport = PlaybackState::Playing;
        if let Some(player) = self.player.as_mut() {
            player.play();
        }
    }

    pub fn pause(&mut self) {
        self.transport = PlaybackState::Paused;
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
    }

    pub fn stop(&mut self) {
        self.transport = PlaybackState::Stopped;
        if let Some(player) = self.player.as_mut() {
            player.stop();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.source.volume = self.volume;
        if let Some(player) = self.player.as_mut() {
            player.set_volume(self.volume);
        }
    }

    pub fn release(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.release();
        }
    }

    /// Apply a media event addressed to this playlist.
    ///
    /// Returns locators that failed for the first time.
    pub fn handle_media(
        &mut self,
        backend: &mut dyn MediaBackend,
        event: MediaEvent,
    ) -> Vec<TrackLocator> {
        let id = event.token.instance;
        let mut failures = Vec::new();
        let Some(player) = self.player.as_mut() else {
            return failures;
        };
        if !player.owns(id) {
            debug!("Ignoring event for released instance {} of '{}'", id, self.source.id);
            return failures;
        }

        match event.kind {
            MediaEventKind::Prepared => {
                player.on_prepared(id);
            }
            MediaEventKind::Completed => match player.on_completed(id) {
                Completion::Promoted(locator) => {
                    self.cursor = (self.cursor + 1) % self.order.len().max(1);
                    debug!("Playlist '{}' continues with '{}'", self.source.id, locator);
                    self.stage_following(backend, &mut failures);
                }
                Completion::Restarted => self.stage_following(backend, &mut failures),
                Completion::Ignored => {}
            },
            MediaEventKind::Failed(err) => {
                let current = player.current_locator().clone();
                match player.on_failed(id) {
                    Failure::NextFailed(locator) => {
                        warn!("Cannot stage '{}' in '{}': {}", locator, self.source.id, err);
                        // The same locator is already playing; keep looping it.
                        if locator != current {
                            self.forget(&locator, &mut failures);
                            self.stage_following(backend, &mut failures);
                        }
                    }
                    Failure::CurrentFailed(locator) => {
                        warn!("Cannot play '{}' in '{}': {}", locator, self.source.id, err);
                        self.release();
                        self.forget(&locator, &mut failures);
                        self.start(backend, &mut failures);
                    }
                    Failure::Ignored => {}
                }
            }
        }

        failures
    }

    /// Open the track at the cursor, skipping locators that cannot be opened
    fn start(&mut self, backend: &mut dyn MediaBackend, failures: &mut Vec<TrackLocator>) {
        self.player = None;
        while !self.order.is_empty() {
            if self.cursor >= self.order.len() {
                self.cursor = 0;
            }
            let locator = self.order[self.cursor].clone();
            match LoopingTrackPlayer::create(backend, &self.source.id, &locator, self.volume) {
                Ok(mut player) => {
                    match self.transport {
                        PlaybackState::Playing => player.play(),
                        PlaybackState::Paused => player.pause(),
                        PlaybackState::Stopped => player.stop(),
                    }
                    self.player = Some(player);
                    self.stage_following(backend, failures);
                    return;
                }
                Err(err) => {
                    warn!("Cannot open '{}' in '{}': {}", locator, self.source.id, err);
                    self.forget(&locator, failures);
                }
            }
        }
        info!("Playlist '{}' has no playable tracks left", self.source.id);
    }

    /// Pre-stage the locator after the cursor, wrapping around
    fn stage_following(&mut self, backend: &mut dyn MediaBackend, failures: &mut Vec<TrackLocator>) {
        while !self.order.is_empty() {
            let locator = self.order[(self.cursor + 1) % self.order.len()].clone();
            let Some(player) = self.player.as_mut() else {
                return;
            };
            let is_current = player.current_locator() == &locator;
            match player.stage_next(backend, &locator) {
                Ok(()) => return,
                Err(err) if is_current => {
                    debug!("Cannot pre-stage '{}' again, it will restart instead: {}", locator, err);
                    return;
                }
                Err(err) => {
                    warn!("Cannot stage '{}' in '{}': {}", locator, self.source.id, err);
                    self.forget(&locator, failures);
                }
            }
        }
    }

    /// Drop every occurrence of `locator` from the rotation, keeping the
    /// cursor on the same track when that track survives
    fn forget(&mut self, locator: &TrackLocator, failures: &mut Vec<TrackLocator>) {
        let cursor = self.cursor;
        let mut index = 0;
        let mut kept_before_cursor = 0;
        self.order.retain(|candidate| {
            let keep = candidate != locator;
            if keep && index < cursor {
                kept_before_cursor += 1;
            }
            index += 1;
            keep
        });
        self.cursor = kept_before_cursor;

        if self.record_failure(locator) {
            failures.push(locator.clone());
        }
    }

    fn record_failure(&mut self, locator: &TrackLocator) -> bool {
        if self.failed.contains(locator) {
            return false;
        }
        self.failed.push(locator.clone());
        true
    }
}
