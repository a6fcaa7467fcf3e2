use std::collections::BTreeSet;

use log::debug;

use super::observer::{ObserverId, ObserverRegistry, PlaybackObserver};
use super::system::{AudioSystem, FocusChange, LockKey, SystemEvent};
use crate::audio::{MediaEvent, MediaEventKind};
use crate::logging::PlaybackLogger;
use crate::mixer::{MixReport, Mixer};
use crate::models::{Notice, PlaybackState, Playlist, PlaylistId};

/// User preferences that change how transitions are carried out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterSettings {
    /// Never ask for audio focus; treat it as always held
    pub play_in_background: bool,
    /// Pausing rewinds every track
    pub stop_instead_of_pause: bool,
}

/// Result of a state request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already in the requested state
    Unchanged,
    /// Nothing to play
    Refused,
    /// Focus was denied; paused with the focus lock held
    FocusDenied,
    /// A resume with `clear_locks == false` while unpause locks are held.
    /// Only external callers can hit this; lock release asks for `Playing`
    /// after the set is already empty.
    Blocked,
    Applied(PlaybackState),
}

/// Owner of the playback state, the unpause locks and the mixer
pub struct Arbiter {
    state: PlaybackState,
    locks: BTreeSet<LockKey>,
    mixer: Mixer,
    system: Box<dyn AudioSystem>,
    focus_held: bool,
    settings: ArbiterSettings,
    bound_clients: usize,
    observers: ObserverRegistry,
    logger: PlaybackLogger,
}

impl Arbiter {
    pub fn new(
        mixer: Mixer,
        system: Box<dyn AudioSystem>,
        settings: ArbiterSettings,
        logger: PlaybackLogger,
    ) -> Self {
        Self {
            state: PlaybackState::Stopped,
            locks: BTreeSet::new(),
            mixer,
            system,
            focus_held: false,
            settings,
            bound_clients: 0,
            observers: ObserverRegistry::new(),
            logger,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn locks(&self) -> Vec<String> {
        self.locks.iter().map(|k| k.to_string()).collect()
    }

    pub fn holds_lock(&self, key: &LockKey) -> bool {
        self.locks.contains(key)
    }

    pub fn settings(&self) -> ArbiterSettings {
        self.settings
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn active_playlists(&self) -> Vec<PlaylistId> {
        self.mixer.playlist_ids()
    }

    pub fn bind(&mut self) {
        self.bound_clients += 1;
    }

    pub fn unbind(&mut self) {
        self.bound_clients = self.bound_clients.saturating_sub(1);
    }

    pub fn is_bound(&self) -> bool {
        self.bound_clients > 0
    }

    pub fn register_observer(&mut self, observer: Box<dyn PlaybackObserver>) -> ObserverId {
        self.observers.register(observer)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Move towards `target`, driving the mixer and notifying observers
    pub fn request_state(&mut self, target: PlaybackState, clear_locks: bool) -> Transition {
        // A bound client keeps the session alive.
        let target = if target == PlaybackState::Stopped
            && self.is_bound()
            && self.state != PlaybackState::Stopped
        {
            PlaybackState::Paused
        } else {
            target
        };

        if target == self.state {
            return Transition::Unchanged;
        }

        if target == PlaybackState::Playing {
            if self.mixer.is_initialized() && self.mixer.is_empty() {
                self.logger.log_play_refused("no active playlists");
                self.observers.notify_notice(&Notice::NothingToPlay);
                return Transition::Refused;
            }

            if !clear_locks && !self.locks.is_empty() {
                debug!("Resume blocked by {:?}", self.locks());
                return Transition::Blocked;
            }

            if !self.has_focus() {
                if !self.system.request_focus() {
                    self.logger.log_focus_denied();
                    if clear_locks {
                        self.locks.clear();
                    }
                    self.add_lock(LockKey::AUDIO_FOCUS_LOSS);
                    if self.state != PlaybackState::Paused {
                        self.apply(PlaybackState::Paused);
                    }
                    return Transition::FocusDenied;
                }
                self.focus_held = true;
            }
        }

        if clear_locks && !self.locks.is_empty() {
            debug!("Clearing unpause locks {:?}", self.locks());
            self.locks.clear();
        }
        self.apply(target);
        Transition::Applied(target)
    }

    /// Stop and tear down even while clients are bound
    pub fn end_session(&mut self) -> Transition {
        self.bound_clients = 0;
        self.request_state(PlaybackState::Stopped, true)
    }

    /// Hold or release the lock `key`, pausing on the first lock and resuming
    /// when the last one goes away
    pub fn auto_pause_if(&mut self, condition: bool, key: LockKey) {
        if self.state == PlaybackState::Stopped {
            return;
        }

        if condition {
            if self.locks.contains(&key) {
                return;
            }
            // A user pause is not turned into an automatic resume later.
            if self.state != PlaybackState::Playing && self.locks.is_empty() {
                debug!("Ignoring '{}' while paused by the user", key);
                return;
            }
            self.add_lock(key);
            if self.locks.len() == 1 {
                self.request_state(PlaybackState::Paused, false);
            }
        } else if self.locks.remove(&key) {
            self.logger.log_lock_released(key.as_str(), self.locks.len());
            if self.locks.is_empty() {
                self.request_state(PlaybackState::Playing, false);
            }
        }
    }

    pub fn on_system_event(&mut self, event: &SystemEvent) {
        if let SystemEvent::FocusChanged(change) = event {
            if self.settings.play_in_background {
                debug!("Ignoring focus change {:?} while playing in background", change);
                return;
            }
            match change {
                FocusChange::Gain => self.focus_held = true,
                FocusChange::Loss => self.focus_held = false,
                FocusChange::LossTransient | FocusChange::LossTransientCanDuck => {}
            }
        }
        let (key, condition) = event.lock_condition();
        self.auto_pause_if(condition, key);
    }

    pub fn set_play_in_background(&mut self, enabled: bool) {
        if self.settings.play_in_background == enabled {
            return;
        }
        self.settings.play_in_background = enabled;

        if enabled {
            if self.focus_held {
                self.system.abandon_focus();
                self.focus_held = false;
            }
            self.auto_pause_if(false, LockKey::AUDIO_FOCUS_LOSS);
        } else if self.state == PlaybackState::Playing && !self.focus_held {
            if self.system.request_focus() {
                self.focus_held = true;
            } else {
                self.logger.log_focus_denied();
                self.auto_pause_if(true, LockKey::AUDIO_FOCUS_LOSS);
            }
        }
    }

    /// Takes effect at the next pause
    pub fn set_stop_instead_of_pause(&mut self, enabled: bool) {
        self.settings.stop_instead_of_pause = enabled;
    }

    pub fn set_playlist_volume(&mut self, playlist: &PlaylistId, volume: f32) -> bool {
        let routed = self.mixer.set_volume(playlist, volume);
        if !routed {
            debug!("Volume change for inactive playlist '{}' ignored", playlist);
        }
        routed
    }

    /// Reconcile the mixer with a new set of active playlists
    pub fn apply_active_playlists(&mut self, active: &[Playlist]) -> MixReport {
        let playing = self.state == PlaybackState::Playing;
        let report = self.mixer.update(active, playing);
        if !report.is_quiet() {
            self.logger.log_mix_changed(
                self.mixer.playlist_ids().len(),
                report.added.len(),
                report.removed.len(),
            );
        }
        self.after_mix_change(&report);
        report
    }

    pub fn handle_media(&mut self, event: MediaEvent) -> MixReport {
        let completed = matches!(event.kind, MediaEventKind::Completed)
            .then(|| event.token.playlist.clone());
        let report = self.mixer.handle_media(event);
        if let Some(playlist) = completed {
            if let Some(locator) = self.mixer.player(&playlist).and_then(|p| p.current_locator()) {
                self.logger.log_track_looped(playlist.as_str(), locator.as_str());
            }
        }
        self.after_mix_change(&report);
        report
    }

    fn after_mix_change(&mut self, report: &MixReport) {
        for (playlist, locators) in &report.failed {
            for locator in locators {
                self.logger.log_track_failed(playlist.as_str(), locator.as_str());
            }
        }
        for playlist in &report.unplayable {
            self.observers.notify_notice(&Notice::PlaylistUnplayable {
                playlist: playlist.clone(),
            });
        }

        if self.state == PlaybackState::Playing && self.mixer.is_empty() {
            self.logger.log_play_refused("no playable playlists left");
            self.apply(PlaybackState::Paused);
            self.observers.notify_notice(&Notice::NothingToPlay);
        }
    }

    fn has_focus(&self) -> bool {
        self.settings.play_in_background || self.focus_held
    }

    fn add_lock(&mut self, key: LockKey) {
        let name = key.to_string();
        if self.locks.insert(key) {
            self.logger.log_lock_added(&name, self.locks.len());
        }
    }

    fn apply(&mut self, target: PlaybackState) {
        let previous = self.state;
        self.state = target;

        match target {
            PlaybackState::Playing => self.mixer.play(),
            PlaybackState::Paused if self.settings.stop_instead_of_pause => self.mixer.stop(),
            PlaybackState::Paused => self.mixer.pause(),
            PlaybackState::Stopped => {
                self.mixer.release_all();
                if self.focus_held {
                    self.system.abandon_focus();
                    self.focus_held = false;
                }
                self.locks.clear();
            }
        }

        self.logger.log_state_changed(previous.as_str(), target.as_str());
        self.observers.notify_state(target);
    }
}
