pub mod arbiter;
pub mod observer;
pub mod system;
pub mod timer;

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::audio::{MediaBackend, MediaEvent};
use crate::error::ServiceError;
use crate::logging::PlaybackLogger;
use crate::mixer::{MixReport, Mixer};
use crate::models::{PlaybackSnapshot, PlaybackState, Playlist, PlaylistId, TrackLocator};

pub use arbiter::{Arbiter, ArbiterSettings, Transition};
pub use observer::{ObserverId, PlaybackObserver};
pub use system::{
    AudioSystem, CallState, DesktopAudioSystem, FocusChange, LockKey, RouteWatch, SystemEvent,
};
pub use timer::StopTimer;

/// Requests a client can make of the playback service
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Toggle,
    SetTimer(Duration),
    ClearTimer,
    SetPlaylistVolume { playlist: PlaylistId, volume: f32 },
    SetPlayInBackground(bool),
    SetStopInsteadOfPause(bool),
}

/// Everything that enters the service's mailbox
pub enum ServiceMessage {
    Command(Command),
    /// Latest set of active playlists from the library
    ActivePlaylists(Vec<Playlist>),
    System(SystemEvent),
    Bind,
    Unbind,
    Register(Box<dyn PlaybackObserver>),
    /// End the session even if clients are bound
    Shutdown,
}

/// Receives locators that could not be played, for error marking
pub trait PlaylistStore: Send {
    fn report_failed_locators(&mut self, playlist: &PlaylistId, locators: &[TrackLocator]);
}

/// Store for hosts that do not persist failures
pub struct DiscardFailures;

impl PlaylistStore for DiscardFailures {
    fn report_failed_locators(&mut self, playlist: &PlaylistId, locators: &[TrackLocator]) {
        debug!("Not persisting {} failed tracks of '{}'", locators.len(), playlist);
    }
}

/// The playback session: a single task that owns the arbiter, the mixer and
/// the stop timer and processes one message at a time
pub struct PlaybackService {
    arbiter: Arbiter,
    timer: StopTimer,
    store: Box<dyn PlaylistStore>,
    inbox: UnboundedReceiver<ServiceMessage>,
    media: UnboundedReceiver<MediaEvent>,
    timer_tx: UnboundedSender<u64>,
    timer_rx: UnboundedReceiver<u64>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    logger: PlaybackLogger,
    started: bool,
    finished: bool,
}

impl PlaybackService {
    /// Create a service and the handle clients use to reach it.
    ///
    /// `media` must be the receiving end of the channel `backend` reports
    /// preparation and completion events on.
    pub fn new(
        backend: Box<dyn MediaBackend>,
        media: UnboundedReceiver<MediaEvent>,
        system: Box<dyn AudioSystem>,
        store: Box<dyn PlaylistStore>,
        settings: ArbiterSettings,
        logger: PlaybackLogger,
    ) -> (Self, ServiceHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlaybackSnapshot::default());

        let arbiter = Arbiter::new(Mixer::new(backend), system, settings, logger.clone());
        let service = Self {
            arbiter,
            timer: StopTimer::new(),
            store,
            inbox,
            media,
            timer_tx,
            timer_rx,
            snapshot_tx,
            logger,
            started: false,
            finished: false,
        };
        let handle = ServiceHandle {
            tx,
            snapshot: snapshot_rx,
        };
        (service, handle)
    }

    /// Process messages until the session stops or every handle is gone
    pub async fn run(mut self) -> PlaybackSnapshot {
        info!("Playback service started");
        while !self.finished {
            tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        debug!("All service handles dropped");
                        self.shutdown();
                    }
                },
                Some(event) = self.media.recv() => self.handle_media(event),
                Some(generation) = self.timer_rx.recv() => self.handle_timer(generation),
            }
        }
        info!("Playback service finished");
        self.snapshot()
    }

    /// Process everything already queued without waiting; false once the
    /// session has ended
    pub fn pump(&mut self) -> bool {
        while !self.finished {
            if let Ok(event) = self.media.try_recv() {
                self.handle_media(event);
            } else if let Ok(generation) = self.timer_rx.try_recv() {
                self.handle_timer(generation);
            } else if let Ok(message) = self.inbox.try_recv() {
                self.handle_message(message);
            } else {
                break;
            }
        }
        !self.finished
    }

    pub fn handle_message(&mut self, message: ServiceMessage) {
        match message {
            ServiceMessage::Command(command) => self.handle_command(command),
            ServiceMessage::ActivePlaylists(active) => {
                let report = self.arbiter.apply_active_playlists(&active);
                self.report_failures(&report);
            }
            ServiceMessage::System(event) => self.arbiter.on_system_event(&event),
            ServiceMessage::Bind => self.arbiter.bind(),
            ServiceMessage::Unbind => self.arbiter.unbind(),
            ServiceMessage::Register(observer) => {
                self.arbiter.register_observer(observer);
            }
            ServiceMessage::Shutdown => self.shutdown(),
        }
        self.after_step();
    }

    pub fn handle_media(&mut self, event: MediaEvent) {
        let report = self.arbiter.handle_media(event);
        self.report_failures(&report);
        self.after_step();
    }

    fn handle_timer(&mut self, generation: u64) {
        if self.timer.take_fired(generation) {
            self.logger.log_timer_fired();
            self.arbiter.request_state(PlaybackState::Stopped, true);
        } else {
            debug!("Ignoring stale stop timer {}", generation);
        }
        self.after_step();
    }

    fn handle_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Play => {
                self.arbiter.request_state(PlaybackState::Playing, true);
            }
            Command::Pause => {
                self.arbiter.request_state(PlaybackState::Paused, true);
            }
            Command::Stop => {
                self.arbiter.request_state(PlaybackState::Stopped, true);
            }
            Command::Toggle => {
                let target = if self.arbiter.state().is_playing() {
                    PlaybackState::Paused
                } else {
                    PlaybackState::Playing
                };
                self.arbiter.request_state(target, true);
            }
            Command::SetTimer(duration) => {
                let stop_at = self.timer.set(duration, self.timer_tx.clone());
                self.logger.log_timer_set(duration, stop_at);
            }
            Command::ClearTimer => {
                if self.timer.clear() {
                    self.logger.log_timer_cleared();
                }
            }
            Command::SetPlaylistVolume { playlist, volume } => {
                self.arbiter.set_playlist_volume(&playlist, volume);
            }
            Command::SetPlayInBackground(enabled) => self.arbiter.set_play_in_background(enabled),
            Command::SetStopInsteadOfPause(enabled) => {
                self.arbiter.set_stop_instead_of_pause(enabled)
            }
        }
    }

    fn shutdown(&mut self) {
        self.timer.clear();
        self.arbiter.end_session();
        self.finished = true;
        self.publish();
    }

    fn after_step(&mut self) {
        match self.arbiter.state() {
            PlaybackState::Stopped if self.started => {
                if self.timer.clear() {
                    self.logger.log_timer_cleared();
                }
                self.finished = true;
            }
            PlaybackState::Stopped => {}
            _ => self.started = true,
        }
        self.publish();
    }

    fn report_failures(&mut self, report: &MixReport) {
        for (playlist, locators) in &report.failed {
            self.store.report_failed_locators(playlist, locators);
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.arbiter.state(),
            stop_at: self.timer.stop_at(),
            locks: self.arbiter.locks(),
            active_playlists: self.arbiter.active_playlists(),
        }
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn timer(&self) -> &StopTimer {
        &self.timer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Cloneable client side of the service mailbox
#[derive(Clone)]
pub struct ServiceHandle {
    tx: UnboundedSender<ServiceMessage>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
}

impl ServiceHandle {
    fn send(&self, message: ServiceMessage) -> Result<(), ServiceError> {
        self.tx.send(message).map_err(|_| ServiceError::SessionEnded)
    }

    pub fn submit(&self, command: Command) -> Result<(), ServiceError> {
        self.send(ServiceMessage::Command(command))
    }

    pub fn play(&self) -> Result<(), ServiceError> {
        self.submit(Command::Play)
    }

    pub fn pause(&self) -> Result<(), ServiceError> {
        self.submit(Command::Pause)
    }

    pub fn stop(&self) -> Result<(), ServiceError> {
        self.submit(Command::Stop)
    }

    pub fn toggle(&self) -> Result<(), ServiceError> {
        self.submit(Command::Toggle)
    }

    pub fn set_timer(&self, duration: Duration) -> Result<(), ServiceError> {
        self.submit(Command::SetTimer(duration))
    }

    pub fn clear_timer(&self) -> Result<(), ServiceError> {
        self.submit(Command::ClearTimer)
    }

    pub fn set_playlist_volume(&self, playlist: PlaylistId, volume: f32) -> Result<(), ServiceError> {
        self.submit(Command::SetPlaylistVolume { playlist, volume })
    }

    pub fn publish_active_playlists(&self, active: Vec<Playlist>) -> Result<(), ServiceError> {
        self.send(ServiceMessage::ActivePlaylists(active))
    }

    pub fn system_event(&self, event: SystemEvent) -> Result<(), ServiceError> {
        self.send(ServiceMessage::System(event))
    }

    pub fn register_observer(&self, observer: Box<dyn PlaybackObserver>) -> Result<(), ServiceError> {
        self.send(ServiceMessage::Register(observer))
    }

    /// Keep the session alive (stop becomes pause) until the binding drops
    pub fn bind(&self) -> Result<ClientBinding, ServiceError> {
        self.send(ServiceMessage::Bind)?;
        Ok(ClientBinding {
            tx: self.tx.clone(),
        })
    }

    pub fn shutdown(&self) -> Result<(), ServiceError> {
        self.send(ServiceMessage::Shutdown)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn current_state(&self) -> PlaybackState {
        self.snapshot.borrow().state
    }

    pub fn stop_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot.borrow().stop_at
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.snapshot.borrow().remaining()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A bound client; dropping it unbinds
pub struct ClientBinding {
    tx: UnboundedSender<ServiceMessage>,
}

impl Drop for ClientBinding {
    fn drop(&mut self) {
        let _ = self.tx.send(ServiceMessage::Unbind);
    }
}
