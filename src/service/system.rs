use std::borrow::Cow;
use std::fmt;

/// Reason playback may not resume; one key per independent cause
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(Cow<'static, str>);

impl LockKey {
    pub const AUDIO_FOCUS_LOSS: LockKey = LockKey(Cow::Borrowed("audio-focus-loss"));
    pub const PHONE_CALL: LockKey = LockKey(Cow::Borrowed("phone-call"));
    pub const ZERO_VOLUME_DEVICE: LockKey = LockKey(Cow::Borrowed("zero-volume-device"));

    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audio focus as reported by the host audio system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Ringing,
    OffHook,
}

/// Host notifications, each mapped to one unpause lock
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    FocusChanged(FocusChange),
    /// Output route switched; `volume` is the new route's level in [0, 1]
    OutputRouteChanged { volume: f32 },
    CallStateChanged(CallState),
}

impl SystemEvent {
    /// The lock this event controls and whether it should be held
    pub fn lock_condition(&self) -> (LockKey, bool) {
        match self {
            SystemEvent::FocusChanged(change) => {
                (LockKey::AUDIO_FOCUS_LOSS, *change != FocusChange::Gain)
            }
            SystemEvent::OutputRouteChanged { volume } => {
                (LockKey::ZERO_VOLUME_DEVICE, *volume <= f32::EPSILON)
            }
            SystemEvent::CallStateChanged(state) => (LockKey::PHONE_CALL, *state != CallState::Idle),
        }
    }
}

/// Access to the host's audio focus arbitration
pub trait AudioSystem: Send {
    /// Ask for exclusive playback; false when another application holds it
    fn request_focus(&mut self) -> bool;

    fn abandon_focus(&mut self);
}

/// Desktop hosts have no focus arbitration; every request is granted.
#[derive(Debug, Default)]
pub struct DesktopAudioSystem {
    held: bool,
}

impl DesktopAudioSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSystem for DesktopAudioSystem {
    fn request_focus(&mut self) -> bool {
        self.held = true;
        true
    }

    fn abandon_focus(&mut self) {
        self.held = false;
    }
}

/// Tracks whether the output device is still present and turns changes
/// into `OutputRouteChanged` events.
///
/// A missing device counts as a silent route; it coming back restores full
/// level. Without a named device the host default is watched.
#[derive(Debug)]
pub struct RouteWatch {
    device: Option<String>,
    present: bool,
}

impl RouteWatch {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            present: true,
        }
    }

    /// Compare one enumeration of the host's outputs with the last one
    pub fn observe(&mut self, devices: &[String], default: Option<&str>) -> Option<SystemEvent> {
        let present = match &self.device {
            Some(name) => devices.iter().any(|device| device == name),
            None => default.is_some(),
        };
        if present == self.present {
            return None;
        }
        self.present = present;
        let volume = if present { 1.0 } else { 0.0 };
        Some(SystemEvent::OutputRouteChanged { volume })
    }
}
