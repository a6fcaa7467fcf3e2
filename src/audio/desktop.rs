use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use super::decoder::{self, DecodedClip};
use super::device::DeviceManager;
use super::output::{Mixdown, OutputStream, SharedMixdown};
use super::{InstanceId, MediaBackend, MediaEvent, MediaEventKind, MediaInstance, MediaToken};
use crate::error::AudioError;
use crate::models::TrackLocator;

/// Decoded clips shared by every instance of the same locator
#[derive(Clone, Default)]
struct ClipCache(Arc<Mutex<HashMap<TrackLocator, Arc<DecodedClip>>>>);

impl ClipCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<TrackLocator, Arc<DecodedClip>>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, locator: &TrackLocator) -> Option<Arc<DecodedClip>> {
        self.lock().get(locator).cloned()
    }

    fn insert(&self, locator: TrackLocator, clip: Arc<DecodedClip>) {
        self.lock().insert(locator, clip);
    }

    /// Drop clips no voice refers to any more
    fn evict_unused(&self) {
        self.lock().retain(|_, clip| Arc::strong_count(clip) > 1);
    }
}

fn lock_mixdown(mixdown: &SharedMixdown) -> MutexGuard<'_, Mixdown> {
    mixdown.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct DecodeJob {
    locator: TrackLocator,
    token: MediaToken,
}

/// Media backend that plays through the system's output device
///
/// Clips are decoded whole on a worker thread, converted to the stream's
/// rate, and mixed by the output callback.
pub struct DesktopBackend {
    mixdown: SharedMixdown,
    cache: ClipCache,
    jobs: std_mpsc::Sender<DecodeJob>,
    device_name: Option<String>,
    // Dropped last so the stream stops after the voices are gone.
    output: OutputStream,
}

impl DesktopBackend {
    pub fn new(
        preferred_device: Option<&str>,
        events: UnboundedSender<MediaEvent>,
    ) -> Result<Self, AudioError> {
        let mut devices = DeviceManager::new()?;
        devices.select_device_with_fallback(preferred_device)?;
        let device = devices
            .current_device()
            .cloned()
            .ok_or_else(|| AudioError::InitializationFailed("No device selected".to_string()))?;
        let device_name = devices.current_device_name();

        let mixdown = Mixdown::shared(events.clone());
        let output = OutputStream::open(device, mixdown.clone())?;
        let cache = ClipCache::default();
        let jobs = spawn_decoder(output.sample_rate(), mixdown.clone(), cache.clone(), events)?;

        info!(
            "Desktop audio ready on {}",
            device_name.as_deref().unwrap_or("the default device")
        );
        Ok(Self {
            mixdown,
            cache,
            jobs,
            device_name,
            output,
        })
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }
}

impl MediaBackend for DesktopBackend {
    fn probe(&mut self, locator: &TrackLocator) -> Result<(), AudioError> {
        if self.cache.get(locator).is_some() {
            return Ok(());
        }
        decoder::probe(&locator.to_path())
            .map(|_| ())
            .map_err(|source| AudioError::Open {
                locator: locator.to_string(),
                source,
            })
    }

    fn open(
        &mut self,
        locator: &TrackLocator,
        token: MediaToken,
    ) -> Result<Box<dyn MediaInstance>, AudioError> {
        let id = token.instance;
        lock_mixdown(&self.mixdown).insert_pending(token.clone());

        let job = DecodeJob {
            locator: locator.clone(),
            token,
        };
        if self.jobs.send(job).is_err() {
            lock_mixdown(&self.mixdown).remove(id);
            return Err(AudioError::IllegalState("Decoder thread has stopped".to_string()));
        }

        Ok(Box::new(DesktopInstance {
            id,
            mixdown: self.mixdown.clone(),
            cache: self.cache.clone(),
            released: false,
        }))
    }
}

/// Worker that turns open requests into `Prepared` or `Failed` events
fn spawn_decoder(
    output_rate: u32,
    mixdown: SharedMixdown,
    cache: ClipCache,
    events: UnboundedSender<MediaEvent>,
) -> Result<std_mpsc::Sender<DecodeJob>, AudioError> {
    let (jobs_tx, jobs_rx) = std_mpsc::channel::<DecodeJob>();

    thread::Builder::new()
        .name("clip-decoder".to_string())
        .spawn(move || {
            for DecodeJob { locator, token } in jobs_rx {
                if !lock_mixdown(&mixdown).contains(token.instance) {
                    debug!("Instance {} released before decoding", token.instance);
                    continue;
                }

                let clip = match cache.get(&locator) {
                    Some(clip) => Ok(clip),
                    None => decoder::decode_clip(&locator.to_path(), output_rate).map(|clip| {
                        let clip = Arc::new(clip);
                        cache.insert(locator.clone(), clip.clone());
                        clip
                    }),
                };

                let kind = match clip {
                    Ok(clip) => {
                        if !lock_mixdown(&mixdown).attach(token.instance, clip) {
                            continue;
                        }
                        MediaEventKind::Prepared
                    }
                    Err(source) => {
                        warn!("Cannot decode {}: {}", locator, source);
                        MediaEventKind::Failed(AudioError::Open {
                            locator: locator.to_string(),
                            source,
                        })
                    }
                };
                if events.send(MediaEvent::new(token, kind)).is_err() {
                    break;
                }
            }
            debug!("Clip decoder stopped");
        })
        .map_err(|e| AudioError::InitializationFailed(format!("Failed to create decoder thread: {}", e)))?;

    Ok(jobs_tx)
}

struct DesktopInstance {
    id: InstanceId,
    mixdown: SharedMixdown,
    cache: ClipCache,
    released: bool,
}

impl DesktopInstance {
    fn with_voice<R>(
        &mut self,
        action: &str,
        apply: impl FnOnce(&mut super::output::Voice) -> R,
    ) -> Result<R, AudioError> {
        if self.released {
            return Err(AudioError::IllegalState(format!("{} on released instance {}", action, self.id)));
        }
        let mut mixdown = lock_mixdown(&self.mixdown);
        match mixdown.voice_mut(self.id) {
            Some(voice) if voice.is_prepared() => Ok(apply(voice)),
            Some(_) => Err(AudioError::IllegalState(format!("{} while instance {} is preparing", action, self.id))),
            None => Err(AudioError::IllegalState(format!("{} on unknown instance {}", action, self.id))),
        }
    }
}

impl MediaInstance for DesktopInstance {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.with_voice("play", |voice| voice.set_playing(true))
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        self.with_voice("pause", |voice| voice.set_playing(false))
    }

    fn seek_to_start(&mut self) -> Result<(), AudioError> {
        self.with_voice("seek", |voice| voice.rewind())
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        if let Some(voice) = lock_mixdown(&self.mixdown).voice_mut(self.id) {
            voice.set_gain(left, right);
        }
    }

    fn set_next(&mut self, next: Option<InstanceId>) {
        if let Some(voice) = lock_mixdown(&self.mixdown).voice_mut(self.id) {
            voice.set_next(next);
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        lock_mixdown(&self.mixdown).remove(self.id);
        self.cache.evict_unused();
    }
}

impl Drop for DesktopInstance {
    fn drop(&mut self) {
        self.release();
    }
}
