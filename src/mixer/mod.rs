pub mod playlist;

use log::{debug, info};

use crate::audio::{MediaBackend, MediaEvent};
use crate::models::{Playlist, PlaylistId, TrackLocator};

pub use playlist::PlaylistPlayer;

/// What changed during a reconciliation or a media event
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MixReport {
    pub added: Vec<PlaylistId>,
    pub removed: Vec<PlaylistId>,
    /// Locators that failed for the first time, per playlist
    pub failed: Vec<(PlaylistId, Vec<TrackLocator>)>,
    /// Playlists that ran out of playable tracks
    pub unplayable: Vec<PlaylistId>,
}

impl MixReport {
    pub fn is_quiet(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// One playlist player per active playlist, all sharing a media backend
pub struct Mixer {
    backend: Box<dyn MediaBackend>,
    players: Vec<PlaylistPlayer>,
    initialized: bool,
}

impl Mixer {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self {
            backend,
            players: Vec::new(),
            initialized: false,
        }
    }

    /// Reconcile the players with the active playlists.
    ///
    /// Players whose playlist left the set are released. Playlists whose
    /// tracks or shuffle flag changed are rebuilt; a volume-only change is
    /// applied in place. New players start playing iff `playing`.
    pub fn update(&mut self, active: &[Playlist], playing: bool) -> MixReport {
        self.initialized = true;
        let mut report = MixReport::default();

        let mut kept = Vec::with_capacity(self.players.len());
        for mut player in self.players.drain(..) {
            match active.iter().find(|p| p.id == *player.id()) {
                Some(playlist) if player.matches(playlist) => kept.push(player),
                Some(_) => {
                    debug!("Playlist '{}' changed, rebuilding", player.id());
                    player.release();
                }
                None => {
                    player.release();
                    report.removed.push(player.id().clone());
                }
            }
        }
        self.players = kept;

        for playlist in active {
            if let Some(player) = self.players.iter_mut().find(|p| *p.id() == playlist.id) {
                if (player.volume() - playlist.volume).abs() > f32::EPSILON {
                    player.set_volume(playlist.volume);
                }
                continue;
            }
            if playlist.tracks.is_empty() {
                debug!("Playlist '{}' has no tracks, not mixing it", playlist.id);
                continue;
            }

            let (player, failures) = PlaylistPlayer::new(self.backend.as_mut(), playlist, playing);
            if player.is_exhausted() {
                report.unplayable.push(playlist.id.clone());
            }
            if !failures.is_empty() {
                report.failed.push((playlist.id.clone(), failures));
            }
            report.added.push(playlist.id.clone());
            self.players.push(player);
        }

        if !report.is_quiet() {
            info!(
                "Mix updated: {} playlists (+{} / -{})",
                self.players.len(),
                report.added.len(),
                report.removed.len()
            );
        }
        report
    }

    pub fn play(&mut self) {
        self.players.iter_mut().for_each(PlaylistPlayer::play);
    }

    pub fn pause(&mut self) {
        self.players.iter_mut().for_each(PlaylistPlayer::pause);
    }

    pub fn stop(&mut self) {
        self.players.iter_mut().for_each(PlaylistPlayer::stop);
    }

    /// Route a volume change to one playlist; false if it is not mixed
    pub fn set_volume(&mut self, playlist: &PlaylistId, volume: f32) -> bool {
        match self.players.iter_mut().find(|p| p.id() == playlist) {
            Some(player) => {
                player.set_volume(volume);
                true
            }
            None => false,
        }
    }

    pub fn handle_media(&mut self, event: MediaEvent) -> MixReport {
        let mut report = MixReport::default();
        let playlist = event.token.playlist.clone();
        let Some(player) = self.players.iter_mut().find(|p| *p.id() == playlist) else {
            debug!("Dropping media event for inactive playlist '{}'", playlist);
            return report;
        };

        let was_exhausted = player.is_exhausted();
        let failures = player.handle_media(self.backend.as_mut(), event);
        if !was_exhausted && player.is_exhausted() {
            report.unplayable.push(playlist.clone());
        }
        if !failures.is_empty() {
            report.failed.push((playlist, failures));
        }
        report
    }

    pub fn release_all(&mut self) {
        for mut player in self.players.drain(..) {
            player.release();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True when no player has anything left to play
    pub fn is_empty(&self) -> bool {
        self.players.iter().all(PlaylistPlayer::is_exhausted)
    }

    pub fn playlist_ids(&self) -> Vec<PlaylistId> {
        self.players
            .iter()
            .filter(|p| !p.is_exhausted())
            .map(|p| p.id().clone())
            .collect()
    }

    pub fn player(&self, playlist: &PlaylistId) -> Option<&PlaylistPlayer> {
        self.players.iter().find(|p| p.id() == playlist)
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{Script, ScriptedBackend};
    use crate::models::PlaybackState;

    fn playlist(id: &str, tracks: &[&str], volume: f32) -> Playlist {
        Playlist::new(id, tracks.iter().map(|t| TrackLocator::new(*t)).collect()).with_volume(volume)
    }

    fn mixer() -> (Mixer, Script) {
        let (backend, script) = ScriptedBackend::new();
        (Mixer::new(Box::new(backend)), script)
    }

    fn prepare_all(mixer: &mut Mixer, script: &Script) {
        for record in script.instances() {
            if !record.prepared && !record.released {
                let event = script.prepare(record.id);
                mixer.handle_media(event);
            }
        }
    }

    #[test]
    fn test_initialization_tracking() {
        let (mut mixer, _script) = mixer();
        assert!(!mixer.is_initialized());
        assert!(mixer.is_empty());

        mixer.update(&[], false);
        assert!(mixer.is_initialized());
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_update_creates_and_releases_players() {
        let (mut mixer, script) = mixer();
        let rain = playlist("rain", &["r1", "r2"], 0.5);
        let wind = playlist("wind", &["w1"], 1.0);

        let report = mixer.update(&[rain.clone(), wind], true);
        assert_eq!(report.added.len(), 2);
        assert!(!mixer.is_empty());
        prepare_all(&mut mixer, &script);
        assert_eq!(script.playing("rain").len(), 1);
        assert_eq!(script.playing("wind").len(), 1);

        let report = mixer.update(&[rain], true);
        assert_eq!(report.removed, vec![PlaylistId::new("wind")]);
        assert!(script.live("wind").is_empty());
        assert_eq!(script.playing("rain").len(), 1);
    }

    #[test]
    fn test_unchanged_players_are_untouched() {
        let (mut mixer, script) = mixer();
        let rain = playlist("rain", &["r1", "r2"], 0.5);
        mixer.update(&[rain.clone()], true);
        prepare_all(&mut mixer, &script);
        let opened = script.instances().len();

        let report = mixer.update(&[rain.clone().with_volume(0.8)], true);
        assert!(report.is_quiet());
        assert_eq!(script.instances().len(), opened);
        assert_eq!(script.playing("rain")[0].volume, (0.8, 0.8));
    }

    #[test]
    fn test_changed_tracks_rebuild_player() {
        let (mut mixer, script) = mixer();
        mixer.update(&[playlist("rain", &["r1"], 0.5)], false);
        let first = script.live("rain")[0].id;

        mixer.update(&[playlist("rain", &["r1", "r2"], 0.5)], false);
        assert!(script.instance(first).released);
        assert_eq!(mixer.player(&PlaylistId::new("rain")).unwrap().rotation().len(), 2);
    }

    #[test]
    fn test_new_players_follow_playing_flag() {
        let (mut mixer, script) = mixer();
        mixer.update(&[playlist("rain", &["r1"], 1.0)], false);
        prepare_all(&mut mixer, &script);
        assert!(script.playing("rain").is_empty());

        mixer.play();
        mixer.update(&[playlist("rain", &["r1"], 1.0), playlist("fire", &["f1"], 1.0)], true);
        prepare_all(&mut mixer, &script);
        assert_eq!(script.playing("rain").len(), 1);
        assert_eq!(script.playing("fire").len(), 1);
    }

    #[test]
    fn test_volume_routed_to_one_player() {
        let (mut mixer, script) = mixer();
        mixer.update(&[playlist("a", &["a1"], 0.5), playlist("b", &["b1"], 1.0)], true);
        prepare_all(&mut mixer, &script);

        assert!(mixer.set_volume(&PlaylistId::new("a"), 0.2));
        assert_eq!(script.playing("a")[0].volume, (0.2, 0.2));
        assert_eq!(script.playing("b")[0].volume, (1.0, 1.0));

        assert!(!mixer.set_volume(&PlaylistId::new("missing"), 0.3));
    }

    #[test]
    fn test_stop_rewinds_every_player() {
        let (mut mixer, script) = mixer();
        mixer.update(&[playlist("a", &["a1"], 0.5), playlist("b", &["b1"], 1.0)], true);
        prepare_all(&mut mixer, &script);

        mixer.stop();
        for id in ["a", "b"] {
            let player = mixer.player(&PlaylistId::new(id)).unwrap();
            assert_eq!(player.transport(), PlaybackState::Stopped);
            assert!(script.playing(id).is_empty());
        }
        assert!(script.instances().iter().filter(|r| r.seeks > 0).count() >= 2);
    }

    #[test]
    fn test_failures_and_unplayable_are_reported() {
        let (mut mixer, script) = mixer();
        script.break_locator("bad1");
        script.break_locator("bad2");

        let report = mixer.update(
            &[playlist("mixed", &["ok", "bad1"], 1.0), playlist("broken", &["bad2"], 1.0)],
            true,
        );
        assert_eq!(report.unplayable, vec![PlaylistId::new("broken")]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(mixer.playlist_ids(), vec![PlaylistId::new("mixed")]);
        assert!(!mixer.is_empty());

        // Same playlists again, errored tracks now filtered out upstream
        let report = mixer.update(
            &[playlist("mixed", &["ok"], 1.0), playlist("broken", &[], 1.0)],
            true,
        );
        assert!(report.failed.is_empty());
        assert!(report.unplayable.is_empty());
    }

    #[test]
    fn test_running_out_of_tracks_reports_unplayable_once() {
        let (mut mixer, script) = mixer();
        mixer.update(
            &[playlist("rain", &["r1"], 1.0), playlist("storm", &["x1", "x2"], 1.0)],
            true,
        );
        prepare_all(&mut mixer, &script);

        let current = script.live("storm")[0].id;
        let report = mixer.handle_media(script.fail(current));
        assert_eq!(report.failed, vec![(PlaylistId::new("storm"), vec![TrackLocator::new("x1")])]);
        assert!(report.unplayable.is_empty());

        let current = script.live("storm")[0].id;
        let report = mixer.handle_media(script.fail(current));
        assert_eq!(report.unplayable, vec![PlaylistId::new("storm")]);
        assert_eq!(mixer.playlist_ids(), vec![PlaylistId::new("rain")]);
        assert!(!mixer.is_empty());

        // Events for the released instances change nothing
        let report = mixer.handle_media(script.fail(current));
        assert!(report.unplayable.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_only_exhausted_players_count_as_empty() {
        let (mut mixer, script) = mixer();
        script.break_locator("bad");
        mixer.update(&[playlist("broken", &["bad"], 1.0)], true);
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_release_all() {
        let (mut mixer, script) = mixer();
        mixer.update(&[playlist("a", &["a1", "a2"], 0.5)], true);
        mixer.release_all();
        assert!(script.live("a").is_empty());
        assert!(mixer.is_empty());
    }
}
