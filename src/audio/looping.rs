use log::{debug, warn};

use super::{InstanceId, MediaBackend, MediaInstance, MediaToken};
use crate::error::AudioError;
use crate::models::{PlaybackState, PlaylistId, TrackLocator};

/// Outcome of an end-of-media event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The pre-staged instance took over; the owner should stage a new one
    Promoted(TrackLocator),
    /// Nothing was staged, the current track restarted from the top
    Restarted,
    /// Event for an instance this player does not own
    Ignored,
}

/// Outcome of a preparation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The pre-staged instance is gone; the current one keeps playing
    NextFailed(TrackLocator),
    /// The current instance never became playable
    CurrentFailed(TrackLocator),
    Ignored,
}

struct Slot {
    instance: Box<dyn MediaInstance>,
    locator: TrackLocator,
    prepared: bool,
}

impl Slot {
    fn open(
        backend: &mut dyn MediaBackend,
        playlist: &PlaylistId,
        locator: &TrackLocator,
        volume: f32,
    ) -> Result<Self, AudioError> {
        let token = MediaToken {
            playlist: playlist.clone(),
            instance: InstanceId::next(),
        };
        let mut instance = backend.open(locator, token)?;
        instance.set_volume(volume, volume);
        Ok(Self {
            instance,
            locator: locator.clone(),
            prepared: false,
        })
    }

    fn id(&self) -> InstanceId {
        self.instance.id()
    }
}

/// Plays one track at a time and hands over to a pre-staged instance at
/// end of media.
///
/// Transport calls made while an instance is still preparing are remembered
/// and applied once its `Prepared` event arrives.
pub struct LoopingTrackPlayer {
    playlist: PlaylistId,
    current: Slot,
    next: Option<Slot>,
    transport: PlaybackState,
    volume: f32,
    released: bool,
}

impl LoopingTrackPlayer {
    /// Open `locator` as the current track, paused at its start
    pub fn create(
        backend: &mut dyn MediaBackend,
        playlist: &PlaylistId,
        locator: &TrackLocator,
        volume: f32,
    ) -> Result<Self, AudioError> {
        let volume = volume.clamp(0.0, 1.0);
        let current = Slot::open(backend, playlist, locator, volume)?;
        debug!("Opened {} for '{}' as {}", locator, playlist, current.id());

        Ok(Self {
            playlist: playlist.clone(),
            current,
            next: None,
            transport: PlaybackState::Paused,
            volume,
            released: false,
        })
    }

    /// Replace the pre-staged instance with a fresh one for `locator`
    pub fn stage_next(
        &mut self,
        backend: &mut dyn MediaBackend,
        locator: &TrackLocator,
    ) -> Result<(), AudioError> {
        if self.released {
            return Err(AudioError::IllegalState("player released".to_string()));
        }
        self.drop_next();
        let slot = Slot::open(backend, &self.playlist, locator, self.volume)?;
        debug!("Staged {} for '{}' as {}", locator, self.playlist, slot.id());
        self.next = Some(slot);
        Ok(())
    }

    pub fn play(&mut self) {
        self.transport = PlaybackState::Playing;
        self.apply_transport();
    }

    pub fn pause(&mut self) {
        self.transport = PlaybackState::Paused;
        self.apply_transport();
    }

    /// Pause and rewind to the start of the current track
    pub fn stop(&mut self) {
        self.transport = PlaybackState::Stopped;
        self.apply_transport();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if self.released {
            return;
        }
        self.current.instance.set_volume(self.volume, self.volume);
        if let Some(next) = self.next.as_mut() {
            next.instance.set_volume(self.volume, self.volume);
        }
    }

    pub fn on_prepared(&mut self, id: InstanceId) -> bool {
        if self.released {
            return false;
        }
        if self.current.id() == id {
            self.current.prepared = true;
            self.current.instance.set_volume(self.volume, self.volume);
            self.apply_transport();
            self.chain();
            true
        } else if self.next.as_ref().is_some_and(|n| n.id() == id) {
            if let Some(next) = self.next.as_mut() {
                next.prepared = true;
                next.instance.set_volume(self.volume, self.volume);
            }
            self.chain();
            true
        } else {
            false
        }
    }

    pub fn on_completed(&mut self, id: InstanceId) -> Completion {
        if self.released || self.current.id() != id {
            return Completion::Ignored;
        }

        match self.next.take() {
            Some(next) => {
                let mut finished = std::mem::replace(&mut self.current, next);
                finished.instance.release();
                debug!(
                    "'{}' handed over from {} to {}",
                    self.playlist,
                    finished.id(),
                    self.current.id()
                );
                // A chained instance is already running; a late one waits for
                // its Prepared event.
                if self.current.prepared {
                    self.apply_transport();
                }
                Completion::Promoted(self.current.locator.clone())
            }
            None => {
                debug!("'{}' has nothing staged, restarting {}", self.playlist, self.current.locator);
                let rewound = self.current.instance.seek_to_start();
                self.absorb(rewound);
                if self.transport.is_playing() {
                    let resumed = self.current.instance.play();
                    self.absorb(resumed);
                }
                Completion::Restarted
            }
        }
    }

    pub fn on_failed(&mut self, id: InstanceId) -> Failure {
        if self.released {
            return Failure::Ignored;
        }
        if self.next.as_ref().is_some_and(|n| n.id() == id) {
            let locator = self.drop_next().map(|s| s.locator);
            self.current.instance.set_next(None);
            return locator.map_or(Failure::Ignored, Failure::NextFailed);
        }
        if self.current.id() == id {
            return Failure::CurrentFailed(self.current.locator.clone());
        }
        Failure::Ignored
    }

    /// Release both instances
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.drop_next();
        self.current.instance.release();
    }

    pub fn owns(&self, id: InstanceId) -> bool {
        !self.released
            && (self.current.id() == id || self.next.as_ref().is_some_and(|n| n.id() == id))
    }

    pub fn current_locator(&self) -> &TrackLocator {
        &self.current.locator
    }

    pub fn next_locator(&self) -> Option<&TrackLocator> {
        self.next.as_ref().map(|n| &n.locator)
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn transport(&self) -> PlaybackState {
        self.transport
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn apply_transport(&mut self) {
        if self.released || !self.current.prepared {
            return;
        }
        let result = match self.transport {
            PlaybackState::Playing => self.current.instance.play(),
            PlaybackState::Paused => self.current.instance.pause(),
            PlaybackState::Stopped => self
                .current
                .instance
                .pause()
                .and_then(|_| self.current.instance.seek_to_start()),
        };
        self.absorb(result);
    }

    fn chain(&mut self) {
        if !self.current.prepared {
            return;
        }
        if let Some(next) = self.next.as_ref().filter(|n| n.prepared) {
            let next_id = next.id();
            self.current.instance.set_next(Some(next_id));
        }
    }

    fn drop_next(&mut self) -> Option<Slot> {
        let mut slot = self.next.take()?;
        slot.instance.release();
        Some(slot)
    }

    fn absorb(&self, result: Result<(), AudioError>) {
        match result {
            Ok(()) => {}
            Err(AudioError::IllegalState(reason)) => {
                debug!("'{}' transport deferred: {}", self.playlist, reason)
            }
            Err(err) => warn!("'{}' transport failed: {}", self.playlist, err),
        }
    }
}

impl Drop for LoopingTrackPlayer {
    fn drop(&mut self) {
        self.release();
    }
}
