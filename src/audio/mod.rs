pub mod decoder;
pub mod desktop;
pub mod device;
pub mod looping;
pub mod output;
pub mod resampler;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AudioError;
use crate::models::{PlaylistId, TrackLocator};

pub use desktop::DesktopBackend;
pub use device::{DeviceCapabilities, DeviceManager};
pub use looping::{Completion, Failure, LoopingTrackPlayer};

/// Identity of one media instance, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Routing information attached to every event a media instance emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaToken {
    pub playlist: PlaylistId,
    pub instance: InstanceId,
}

/// Asynchronous notification from the media layer
#[derive(Debug)]
pub struct MediaEvent {
    pub token: MediaToken,
    pub kind: MediaEventKind,
}

#[derive(Debug)]
pub enum MediaEventKind {
    /// Preparation finished; transport calls are now honoured
    Prepared,
    /// End of media reached
    Completed,
    /// Preparation failed; the instance is unusable
    Failed(AudioError),
}

impl MediaEvent {
    pub fn new(token: MediaToken, kind: MediaEventKind) -> Self {
        Self { token, kind }
    }
}

/// One playable instance of a track, owned by a looping player
pub trait MediaInstance: Send {
    fn id(&self) -> InstanceId;

    /// Start or resume. Fails with `IllegalState` while preparing.
    fn play(&mut self) -> Result<(), AudioError>;

    fn pause(&mut self) -> Result<(), AudioError>;

    fn seek_to_start(&mut self) -> Result<(), AudioError>;

    fn set_volume(&mut self, left: f32, right: f32);

    /// Instance to continue with, without a gap, when this one completes
    fn set_next(&mut self, next: Option<InstanceId>);

    /// Free the instance. Further calls are no-ops.
    fn release(&mut self);
}

/// Factory for media instances
///
/// `open` returns immediately; the matching `Prepared` or `Failed` event is
/// delivered later on the backend's media event channel.
pub trait MediaBackend: Send {
    /// Cheap check that a locator refers to something decodable
    fn probe(&mut self, locator: &TrackLocator) -> Result<(), AudioError>;

    fn open(
        &mut self,
        locator: &TrackLocator,
        token: MediaToken,
    ) -> Result<Box<dyn MediaInstance>, AudioError>;
}
