use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Playback event recorded for status display and debugging
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    StateChanged,
    PlayRefused,
    FocusDenied,
    LockAdded,
    LockReleased,
    TrackFailed,
    TrackLooped,
    TimerSet,
    TimerCleared,
    TimerFired,
    MixChanged,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::StateChanged => "STATE_CHANGED",
            PlaybackEventType::PlayRefused => "PLAY_REFUSED",
            PlaybackEventType::FocusDenied => "FOCUS_DENIED",
            PlaybackEventType::LockAdded => "LOCK_ADDED",
            PlaybackEventType::LockReleased => "LOCK_RELEASED",
            PlaybackEventType::TrackFailed => "TRACK_FAILED",
            PlaybackEventType::TrackLooped => "TRACK_LOOPED",
            PlaybackEventType::TimerSet => "TIMER_SET",
            PlaybackEventType::TimerCleared => "TIMER_CLEARED",
            PlaybackEventType::TimerFired => "TIMER_FIRED",
            PlaybackEventType::MixChanged => "MIX_CHANGED",
        }
    }
}

/// Logger for playback decisions, with a bounded in-memory history
#[derive(Clone)]
pub struct PlaybackLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for PlaybackLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackLogger {
    pub fn new() -> Self {
        Self::with_capacity(500)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(64)))),
            max_events,
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("AMBIENT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

        let filter = match log_level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        };
        builder.filter_level(filter);

        builder.try_init()?;

        debug!("Playback logging initialized with level: {}", filter);
        Ok(())
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<PlaybackEvent>> {
        // A panic while holding the lock leaves the ring itself intact.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event and mirror it to the log facade
    pub fn log_event(&self, event_type: PlaybackEventType, details: String) {
        match event_type {
            PlaybackEventType::StateChanged
            | PlaybackEventType::TimerSet
            | PlaybackEventType::TimerFired
            | PlaybackEventType::MixChanged => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::PlayRefused
            | PlaybackEventType::FocusDenied
            | PlaybackEventType::TrackFailed => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::LockAdded
            | PlaybackEventType::LockReleased
            | PlaybackEventType::TimerCleared => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::TrackLooped => {
                trace!("[{}] {}", event_type.as_str(), details);
            }
        }

        let mut events = self.history();
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_state_changed(&self, from: &str, to: &str) {
        self.log_event(
            PlaybackEventType::StateChanged,
            format!("Playback state {} -> {}", from, to),
        );
    }

    pub fn log_play_refused(&self, reason: &str) {
        self.log_event(PlaybackEventType::PlayRefused, format!("Play refused: {}", reason));
    }

    pub fn log_focus_denied(&self) {
        self.log_event(
            PlaybackEventType::FocusDenied,
            "Audio focus request denied, staying paused".to_string(),
        );
    }

    pub fn log_lock_added(&self, key: &str, held: usize) {
        self.log_event(
            PlaybackEventType::LockAdded,
            format!("Unpause lock '{}' added ({} held)", key, held),
        );
    }

    pub fn log_lock_released(&self, key: &str, held: usize) {
        self.log_event(
            PlaybackEventType::LockReleased,
            format!("Unpause lock '{}' released ({} held)", key, held),
        );
    }

    pub fn log_track_failed(&self, playlist: &str, locator: &str) {
        self.log_event(
            PlaybackEventType::TrackFailed,
            format!("Track '{}' in playlist '{}' cannot be played", locator, playlist),
        );
    }

    pub fn log_track_looped(&self, playlist: &str, locator: &str) {
        self.log_event(
            PlaybackEventType::TrackLooped,
            format!("Playlist '{}' moved on to '{}'", playlist, locator),
        );
    }

    pub fn log_timer_set(&self, duration: Duration, stop_at: DateTime<Utc>) {
        self.log_event(
            PlaybackEventType::TimerSet,
            format!(
                "Stop timer set for {}s (at {})",
                duration.as_secs(),
                stop_at.with_timezone(&chrono::Local).format("%H:%M:%S")
            ),
        );
    }

    pub fn log_timer_cleared(&self) {
        self.log_event(PlaybackEventType::TimerCleared, "Stop timer cleared".to_string());
    }

    pub fn log_timer_fired(&self) {
        self.log_event(PlaybackEventType::TimerFired, "Stop timer fired".to_string());
    }

    pub fn log_mix_changed(&self, active: usize, added: usize, removed: usize) {
        self.log_event(
            PlaybackEventType::MixChanged,
            format!("Mix now has {} playlists (+{} / -{})", active, added, removed),
        );
    }

    /// Get recent events, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let events = self.history();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn count(&self, event_type: PlaybackEventType) -> usize {
        self.history().iter().filter(|e| e.event_type == event_type).count()
    }

    pub fn clear_events(&self) {
        self.history().clear();
    }
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}

/// Log a failure at the level its severity asks for
pub fn log_player_error(err: &crate::error::PlayerError) {
    let level = err.severity().log_level();
    if level == log::Level::Error {
        error!("{}", err);
    } else {
        log::log!(level, "{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_logger_starts_empty() {
        let logger = PlaybackLogger::new();
        assert_eq!(logger.max_events, 500);
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = PlaybackLogger::new();
        logger.log_state_changed("Stopped", "Playing");

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Playback state Stopped -> Playing");
        assert_eq!(events[0].event_type, PlaybackEventType::StateChanged);
    }

    #[test]
    fn test_event_history_limit() {
        let logger = PlaybackLogger::with_capacity(3);
        for i in 0..5 {
            logger.log_event(PlaybackEventType::MixChanged, format!("Event {}", i));
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_recent_events_keeps_newest() {
        let logger = PlaybackLogger::new();
        logger.log_lock_added("phone-call", 1);
        logger.log_lock_added("zero-volume-device", 2);
        logger.log_lock_released("phone-call", 1);

        let events = logger.get_recent_events(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, PlaybackEventType::LockAdded);
        assert_eq!(events[1].event_type, PlaybackEventType::LockReleased);
    }

    #[test]
    fn test_count_and_clear() {
        let logger = PlaybackLogger::new();
        logger.log_track_failed("Rain", "/sounds/broken.ogg");
        logger.log_track_failed("Rain", "/sounds/missing.ogg");
        logger.log_play_refused("nothing to play");

        assert_eq!(logger.count(PlaybackEventType::TrackFailed), 2);
        assert_eq!(logger.count(PlaybackEventType::PlayRefused), 1);

        logger.clear_events();
        assert_eq!(logger.count(PlaybackEventType::TrackFailed), 0);
    }

    #[test]
    fn test_clones_share_history() {
        let logger = PlaybackLogger::new();
        let clone = logger.clone();
        clone.log_timer_cleared();
        assert_eq!(logger.get_recent_events(5).len(), 1);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(PlaybackEventType::StateChanged.as_str(), "STATE_CHANGED");
        assert_eq!(PlaybackEventType::FocusDenied.as_str(), "FOCUS_DENIED");
        assert_eq!(PlaybackEventType::TimerFired.as_str(), "TIMER_FIRED");
    }
}
