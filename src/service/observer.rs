use crate::models::{Notice, PlaybackState};

/// Receives playback state changes and user-facing notices
pub trait PlaybackObserver: Send {
    fn on_state_changed(&mut self, state: PlaybackState);

    fn on_notice(&mut self, _notice: &Notice) {}
}

impl<F> PlaybackObserver for F
where
    F: FnMut(PlaybackState) + Send,
{
    fn on_state_changed(&mut self, state: PlaybackState) {
        self(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registration list owned by the arbiter
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<(ObserverId, Box<dyn PlaybackObserver>)>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn PlaybackObserver>) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(candidate, _)| *candidate != id);
        self.observers.len() != before
    }

    pub fn notify_state(&mut self, state: PlaybackState) {
        for (_, observer) in self.observers.iter_mut() {
            observer.on_state_changed(state);
        }
    }

    pub fn notify_notice(&mut self, notice: &Notice) {
        for (_, observer) in self.observers.iter_mut() {
            observer.on_notice(notice);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
