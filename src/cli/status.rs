use std::time::Duration;
use chrono::Local;
use crate::error::{ErrorSeverity, PlayerError};
use crate::library::StoredPlaylist;
use crate::logging::PlaybackEvent;
use crate::models::{Notice, PlaybackSnapshot, PlaybackState};
use crate::service::PlaybackObserver;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display playback state, timer, interruptions and the mix
    pub fn display_full_status(snapshot: &PlaybackSnapshot, playlists: &[StoredPlaylist]) {
        println!("┌─ Mixer Status ──────────────────────────────────────────┐");
        println!("│ Status: {}", Self::format_playback_state(snapshot.state));

        match (snapshot.stop_at, snapshot.remaining()) {
            (Some(stop_at), Some(remaining)) => {
                println!(
                    "│ Timer: stops at {} ({} left)",
                    stop_at.with_timezone(&Local).format("%H:%M:%S"),
                    Self::format_duration(remaining)
                );
            }
            _ => println!("│ Timer: off"),
        }

        if !snapshot.locks.is_empty() {
            println!("│ Interrupted by: {}", snapshot.locks.join(", "));
        }

        println!("│");
        let active: Vec<&StoredPlaylist> = playlists.iter().filter(|p| p.active).collect();
        if active.is_empty() {
            println!("│ No active playlists");
        }
        for playlist in active {
            let playing = snapshot
                .active_playlists
                .iter()
                .any(|id| id.as_str() == playlist.name);
            println!(
                "│ {} {:<28} {} {:>3}%{}",
                if playing { "♪" } else { " " },
                Self::truncate(&playlist.name, 28),
                Self::create_volume_bar(playlist.volume, 10),
                (playlist.volume * 100.0).round() as u32,
                if playlist.shuffle { " shuffle" } else { "" }
            );
        }
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// One line per playlist for `playlist list`
    pub fn display_playlists(playlists: &[StoredPlaylist]) {
        if playlists.is_empty() {
            println!("No playlists. Create one with 'playlist create <name> <paths...>'");
            return;
        }
        for playlist in playlists {
            let failed = playlist.failed_count();
            println!(
                "{} {:<30} {:>3} tracks  {:>3}%{}{}",
                if playlist.active { "*" } else { " " },
                Self::truncate(&playlist.name, 30),
                playlist.tracks.len(),
                (playlist.volume * 100.0).round() as u32,
                if playlist.shuffle { "  shuffle" } else { "" },
                if failed > 0 { format!("  {} failed", failed) } else { String::new() }
            );
        }
    }

    pub fn display_playlist_tracks(playlist: &StoredPlaylist) {
        println!("{} ({} tracks)", playlist.name, playlist.tracks.len());
        for (index, track) in playlist.tracks.iter().enumerate() {
            match &track.error {
                Some(error) => println!("{:>4}. {}  [{}]", index + 1, track.locator, error),
                None => println!("{:>4}. {}", index + 1, track.locator),
            }
        }
    }

    pub fn display_history(events: &[PlaybackEvent]) {
        if events.is_empty() {
            println!("No playback events yet");
        }
        for event in events {
            println!(
                "{} {:<15} {}",
                event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                event.event_type.as_str(),
                event.details
            );
        }
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());
        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    pub fn display_notice(notice: &Notice) {
        println!("⚠  {}", notice.message());
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    /// Format duration as MM:SS, or HH:MM:SS from an hour up
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_volume_bar(volume: f32, width: usize) -> String {
        let filled = ((volume.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_playback_state(state: PlaybackState) -> String {
        match state {
            PlaybackState::Playing => "▶ Playing".to_string(),
            PlaybackState::Paused => "⏸ Paused".to_string(),
            PlaybackState::Stopped => "⏹ Stopped".to_string(),
        }
    }
}

/// Prints state changes and notices as they happen
pub struct ConsoleObserver;

impl PlaybackObserver for ConsoleObserver {
    fn on_state_changed(&mut self, state: PlaybackState) {
        println!("{}", StatusDisplay::format_playback_state(state));
    }

    fn on_notice(&mut self, notice: &Notice) {
        StatusDisplay::display_notice(notice);
    }
}
