//! In-memory media backend that records every call, for tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;

use super::{InstanceId, MediaBackend, MediaEvent, MediaEventKind, MediaInstance, MediaToken};
use crate::error::{AudioError, DecodeError};
use crate::models::{PlaylistId, TrackLocator};

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub playlist: PlaylistId,
    pub locator: TrackLocator,
    pub prepared: bool,
    pub playing: bool,
    pub volume: (f32, f32),
    pub next: Option<InstanceId>,
    pub released: bool,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub seeks: usize,
}

#[derive(Default)]
struct ScriptState {
    instances: Vec<InstanceRecord>,
    broken: HashSet<TrackLocator>,
    fail_prepare: HashSet<TrackLocator>,
    probes: Vec<TrackLocator>,
    events: Option<UnboundedSender<MediaEvent>>,
}

/// Shared view of what the backend has been asked to do
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.0.lock().unwrap()
    }

    /// Probe and open fail for this locator
    pub fn break_locator(&self, locator: &str) {
        self.state().broken.insert(TrackLocator::new(locator));
    }

    /// Open succeeds but preparation reports a failure
    pub fn fail_prepare(&self, locator: &str) {
        self.state().fail_prepare.insert(TrackLocator::new(locator));
    }

    pub fn instances(&self) -> Vec<InstanceRecord> {
        self.state().instances.clone()
    }

    pub fn instance(&self, id: InstanceId) -> InstanceRecord {
        self.state()
            .instances
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("unknown instance")
    }

    /// Instances not yet released for the playlist, in creation order
    pub fn live(&self, playlist: &str) -> Vec<InstanceRecord> {
        self.state()
            .instances
            .iter()
            .filter(|r| r.playlist.as_str() == playlist && !r.released)
            .cloned()
            .collect()
    }

    pub fn playing(&self, playlist: &str) -> Vec<InstanceRecord> {
        self.live(playlist).into_iter().filter(|r| r.playing).collect()
    }

    pub fn opened_count(&self, locator: &str) -> usize {
        self.state()
            .instances
            .iter()
            .filter(|r| r.locator.as_str() == locator)
            .count()
    }

    pub fn probe_count(&self) -> usize {
        self.state().probes.len()
    }

    /// Mark an instance prepared and return the event the backend would emit
    pub fn prepare(&self, id: InstanceId) -> MediaEvent {
        let mut state = self.state();
        let record = state
            .instances
            .iter_mut()
            .find(|r| r.id == id)
            .expect("unknown instance");
        record.prepared = true;
        let token = MediaToken {
            playlist: record.playlist.clone(),
            instance: id,
        };
        MediaEvent::new(token, MediaEventKind::Prepared)
    }

    /// Event reporting that an instance could not be decoded
    pub fn fail(&self, id: InstanceId) -> MediaEvent {
        let mut state = self.state();
        let record = state
            .instances
            .iter_mut()
            .find(|r| r.id == id)
            .expect("unknown instance");
        record.playing = false;
        let token = MediaToken {
            playlist: record.playlist.clone(),
            instance: id,
        };
        MediaEvent::new(token, MediaEventKind::Failed(broken(&record.locator)))
    }

    /// Mark an instance finished and return the event the backend would emit
    pub fn complete(&self, id: InstanceId) -> MediaEvent {
        let mut state = self.state();
        let record = state
            .instances
            .iter_mut()
            .find(|r| r.id == id)
            .expect("unknown instance");
        record.playing = false;
        let token = MediaToken {
            playlist: record.playlist.clone(),
            instance: id,
        };
        let next = record.next;
        // Chained instances start on their own, like the real output mixer.
        if let Some(next) = next {
            if let Some(chained) = state.instances.iter_mut().find(|r| r.id == next) {
                if chained.prepared && !chained.released {
                    chained.playing = true;
                }
            }
        }
        MediaEvent::new(token, MediaEventKind::Completed)
    }
}

/// `MediaBackend` that never touches audio hardware
pub struct ScriptedBackend {
    script: Script,
}

impl ScriptedBackend {
    /// Backend whose instances only become prepared when a test says so
    pub fn new() -> (Self, Script) {
        let script = Script::default();
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }

    /// Backend that reports preparation results on `events` as soon as an
    /// instance is opened
    pub fn with_events(events: UnboundedSender<MediaEvent>) -> (Self, Script) {
        let (backend, script) = Self::new();
        script.state().events = Some(events);
        (backend, script)
    }
}

impl MediaBackend for ScriptedBackend {
    fn probe(&mut self, locator: &TrackLocator) -> Result<(), AudioError> {
        let mut state = self.script.state();
        state.probes.push(locator.clone());
        if state.broken.contains(locator) {
            return Err(broken(locator));
        }
        Ok(())
    }

    fn open(
        &mut self,
        locator: &TrackLocator,
        token: MediaToken,
    ) -> Result<Box<dyn MediaInstance>, AudioError> {
        let mut state = self.script.state();
        if state.broken.contains(locator) {
            return Err(broken(locator));
        }

        state.instances.push(InstanceRecord {
            id: token.instance,
            playlist: token.playlist.clone(),
            locator: locator.clone(),
            prepared: false,
            playing: false,
            volume: (1.0, 1.0),
            next: None,
            released: false,
            play_calls: 0,
            pause_calls: 0,
            seeks: 0,
        });

        if let Some(events) = state.events.clone() {
            let kind = if state.fail_prepare.contains(locator) {
                MediaEventKind::Failed(broken(locator))
            } else {
                if let Some(record) = state.instances.last_mut() {
                    record.prepared = true;
                }
                MediaEventKind::Prepared
            };
            let _ = events.send(MediaEvent::new(token.clone(), kind));
        }

        Ok(Box::new(ScriptedInstance {
            id: token.instance,
            script: self.script.clone(),
        }))
    }
}

fn broken(locator: &TrackLocator) -> AudioError {
    AudioError::Open {
        locator: locator.to_string(),
        source: DecodeError::CorruptedFile("scripted failure".to_string()),
    }
}

struct ScriptedInstance {
    id: InstanceId,
    script: Script,
}

impl ScriptedInstance {
    fn with_record<R>(&self, f: impl FnOnce(&mut InstanceRecord) -> R) -> R {
        let mut state = self.script.state();
        let record = state
            .instances
            .iter_mut()
            .find(|r| r.id == self.id)
            .expect("unknown instance");
        f(record)
    }

    fn ready(record: &InstanceRecord) -> Result<(), AudioError> {
        if record.released {
            return Err(AudioError::IllegalState("released".to_string()));
        }
        if !record.prepared {
            return Err(AudioError::IllegalState("preparing".to_string()));
        }
        Ok(())
    }
}

impl MediaInstance for ScriptedInstance {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.with_record(|r| {
            Self::ready(r)?;
            r.playing = true;
            r.play_calls += 1;
            Ok(())
        })
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.with_record(|r| {
            Self::ready(r)?;
            r.playing = false;
            r.pause_calls += 1;
            Ok(())
        })
    }

    fn seek_to_start(&mut self) -> Result<(), AudioError> {
        self.with_record(|r| {
            Self::ready(r)?;
            r.seeks += 1;
            Ok(())
        })
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        self.with_record(|r| r.volume = (left, right));
    }

    fn set_next(&mut self, next: Option<InstanceId>) {
        self.with_record(|r| r.next = next);
    }

    fn release(&mut self) {
        self.with_record(|r| {
            r.released = true;
            r.playing = false;
        });
    }
}

