use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::{ConsoleObserver, StatusDisplay};

/// Layered ambient sound mixer
#[derive(Parser)]
#[command(name = "ambient")]
#[command(about = "Mix looping ambient sound playlists with a sleep timer")]
#[command(version)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// One-shot commands; running without one starts an interactive session
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play the active playlists until the timer fires or Ctrl-C
    Play {
        /// Stop after this long (e.g. "90", "15m", "1h", "1:30:00")
        #[arg(long, value_parser = parse_duration)]
        timer: Option<Duration>,
    },
    /// Playlist management commands
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },
    /// Preset management commands
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// List available audio output devices
    Devices,
    /// Show or change preferences
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// on/off switch for positional arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[derive(Debug, Subcommand)]
pub enum PlaylistAction {
    /// Create a playlist from audio files, directories or M3U lists
    Create {
        name: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Add audio files, directories or M3U lists to a playlist
    Add {
        name: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List playlists
    List,
    /// Show the tracks of a playlist
    Show { name: String },
    /// Delete a playlist
    Delete { name: String },
    /// Include a playlist in the mix
    Activate { name: String },
    /// Remove a playlist from the mix
    Deactivate { name: String },
    /// Set a playlist's volume (0-100)
    Volume {
        name: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },
    /// Turn shuffled order on or off
    Shuffle { name: String, mode: Switch },
    /// Forget recorded playback failures so the tracks are tried again
    ClearErrors { name: String },
}

#[derive(Debug, Subcommand)]
pub enum PresetAction {
    /// Save the active playlists and their volumes
    Save { name: String },
    /// Activate exactly the playlists of a preset
    Load { name: String },
    /// List presets
    List,
    /// Delete a preset
    Delete { name: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Keep playing when another application takes audio focus
    Background { mode: Switch },
    /// Rewind instead of pausing when playback is interrupted
    StopInsteadOfPause { mode: Switch },
    /// Default stop timer for `play`, in minutes (0 disables it)
    Timer { minutes: u32 },
    /// Preferred output device; omit the name to use the system default
    Device { name: Option<String> },
}

/// Commands accepted by the interactive session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Play,
    Pause,
    Toggle,
    Stop,
    /// `None` cancels the pending timer
    Timer(Option<Duration>),
    Volume { playlist: String, level: u8 },
    Activate(String),
    Deactivate(String),
    PresetSave(String),
    PresetLoad(String),
    /// Keep playing when audio focus is lost
    Background(bool),
    /// Rewind instead of pausing on interruption
    StopInsteadOfPause(bool),
    Status,
    /// Recent playback events
    History,
    Help,
    Quit,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Parse a line typed in the interactive session
    pub fn parse_command(input: &str) -> Result<SessionCommand, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        if args.is_empty() {
            return Err(ParseError::EmptyCommand);
        }
        let rest = args[1..].join(" ");

        match args[0] {
            "play" | "resume" => Ok(SessionCommand::Play),
            "pause" => Ok(SessionCommand::Pause),
            "toggle" => Ok(SessionCommand::Toggle),
            "stop" => Ok(SessionCommand::Stop),
            "timer" => match args.get(1) {
                None => Err(missing("timer", "duration")),
                Some(&"off") => Ok(SessionCommand::Timer(None)),
                Some(value) => parse_duration(value).map(|d| SessionCommand::Timer(Some(d))),
            },
            "volume" => {
                if args.len() < 3 {
                    return Err(missing("volume", if args.len() < 2 { "playlist" } else { "level" }));
                }
                let raw = args[args.len() - 1];
                let level = parse_level(raw)?;
                Ok(SessionCommand::Volume {
                    playlist: args[1..args.len() - 1].join(" "),
                    level,
                })
            }
            "activate" => named(&rest, "activate").map(SessionCommand::Activate),
            "deactivate" => named(&rest, "deactivate").map(SessionCommand::Deactivate),
            "preset" => match args.get(1) {
                Some(&"save") => named(&args[2..].join(" "), "preset save").map(SessionCommand::PresetSave),
                Some(&"load") => named(&args[2..].join(" "), "preset load").map(SessionCommand::PresetLoad),
                Some(other) => Err(ParseError::UnknownCommand {
                    command: format!("preset {}", other),
                }),
                None => Err(missing("preset", "action")),
            },
            "background" => switch(args.get(1), "background").map(SessionCommand::Background),
            "stop-instead-of-pause" => {
                switch(args.get(1), "stop-instead-of-pause").map(SessionCommand::StopInsteadOfPause)
            }
            "status" => Ok(SessionCommand::Status),
            "history" => Ok(SessionCommand::History),
            "help" | "?" => Ok(SessionCommand::Help),
            "quit" | "exit" => Ok(SessionCommand::Quit),
            other => Err(ParseError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("Ambient Mixer - Available Commands:");
        println!();
        println!("Playback Control:");
        println!("  play            - Start or resume the mix");
        println!("  pause           - Pause the mix");
        println!("  toggle          - Switch between playing and paused");
        println!("  stop            - Stop (pauses while this session is open)");
        println!("  timer <time>    - Stop after a delay (e.g. '90', '15m', '1h', '1:30:00')");
        println!("  timer off       - Cancel the stop timer");
        println!();
        println!("Mix:");
        println!("  volume <playlist> <0-100>  - Set a playlist's volume");
        println!("  activate <playlist>        - Add a playlist to the mix");
        println!("  deactivate <playlist>      - Remove a playlist from the mix");
        println!("  preset save <name>         - Save the active playlists as a preset");
        println!("  preset load <name>         - Switch to a saved preset");
        println!();
        println!("Preferences:");
        println!("  background on|off             - Keep playing when another app takes audio");
        println!("  stop-instead-of-pause on|off  - Rewind instead of pausing on interruptions");
        println!();
        println!("Information:");
        println!("  status          - Show playback state, timer and active playlists");
        println!("  history         - Show recent playback events");
        println!();
        println!("General:");
        println!("  help            - Show this help message");
        println!("  exit, quit      - Stop playback and exit");
    }
}

fn missing(command: &str, argument: &str) -> ParseError {
    ParseError::MissingArgument {
        command: command.to_string(),
        argument: argument.to_string(),
    }
}

fn named(rest: &str, command: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(missing(command, "name"))
    } else {
        Ok(rest.to_string())
    }
}

fn switch(value: Option<&&str>, command: &str) -> Result<bool, ParseError> {
    match value {
        Some(&"on") => Ok(true),
        Some(&"off") => Ok(false),
        Some(other) => Err(ParseError::InvalidArgument {
            argument: command.to_string(),
            value: other.to_string(),
            expected: "on or off".to_string(),
        }),
        None => Err(missing(command, "on|off")),
    }
}

fn parse_level(raw: &str) -> Result<u8, ParseError> {
    match raw.parse::<u8>() {
        Ok(level) if level <= 100 => Ok(level),
        Ok(_) => Err(ParseError::InvalidArgument {
            argument: "volume level".to_string(),
            value: raw.to_string(),
            expected: "0-100".to_string(),
        }),
        Err(_) => Err(ParseError::InvalidArgument {
            argument: "volume level".to_string(),
            value: raw.to_string(),
            expected: "number 0-100".to_string(),
        }),
    }
}

/// Parse a timer duration.
///
/// Accepts plain seconds (`90`), unit suffixes (`90s`, `15m`, `1h`) and clock
/// forms (`mm:ss`, `hh:mm:ss`). Zero is rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let trimmed = input.trim();
    let invalid = || ParseError::InvalidTimeFormat {
        input: input.to_string(),
    };

    let seconds: u64 = if trimmed.contains(':') {
        let parts = trimmed
            .split(':')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<u64>, ParseError>>()?;
        match parts.as_slice() {
            [minutes, seconds] if *seconds < 60 => minutes * 60 + seconds,
            [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
                hours * 3600 + minutes * 60 + seconds
            }
            _ => return Err(invalid()),
        }
    } else {
        let (number, unit) = match trimmed.char_indices().last() {
            Some((idx, c)) if c.is_ascii_alphabetic() => (&trimmed[..idx], c),
            _ => (trimmed, 's'),
        };
        let value: u64 = number.parse().map_err(|_| invalid())?;
        let scale = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(invalid()),
        };
        value.checked_mul(scale).ok_or_else(invalid)?
    };

    if seconds == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(seconds))
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },
}
