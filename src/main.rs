use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ambient_mixer::audio::{DesktopBackend, DeviceManager};
use ambient_mixer::cli::{
    CliApp, Commands, ConfigAction, ConsoleObserver, PlaylistAction, PresetAction, SessionCommand,
    StatusDisplay,
};
use ambient_mixer::config::ConfigManager;
use ambient_mixer::error::{ConfigError, LibraryError, PlayerError, ServiceError};
use ambient_mixer::library::{lock_library, Library, LibraryStore, SharedLibrary};
use ambient_mixer::logging::{log_player_error, PlaybackLogger};
use ambient_mixer::models::{Notice, PlaybackState, PlaylistId};
use ambient_mixer::service::{
    Command, DesktopAudioSystem, PlaybackObserver, PlaybackService, RouteWatch, ServiceHandle,
};
use log::{debug, info, warn};
use tokio::sync::mpsc;

const ROUTE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Poll the host's outputs and tell the session when its device goes away
/// or comes back. Stops once the session has ended.
fn watch_output_route(handle: ServiceHandle, device: Option<String>) {
    std::thread::spawn(move || {
        let mut devices = match DeviceManager::new() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Output route changes will not be detected: {}", e);
                return;
            }
        };
        let mut watch = RouteWatch::new(device);

        while !handle.is_closed() {
            std::thread::sleep(ROUTE_POLL_INTERVAL);
            if let Err(e) = devices.refresh_devices() {
                debug!("Skipping output poll: {}", e);
                continue;
            }
            let default = devices.default_device_name();
            if let Some(event) = watch.observe(&devices.list_devices(), default.as_deref()) {
                info!("Output route changed: {:?}", event);
                if handle.system_event(event).is_err() {
                    break;
                }
            }
        }
    });
}

/// Ends an unbound session when nothing is left to play
struct ShutdownWhenIdle {
    handle: ServiceHandle,
}

impl PlaybackObserver for ShutdownWhenIdle {
    fn on_state_changed(&mut self, _state: PlaybackState) {}

    fn on_notice(&mut self, notice: &Notice) {
        if *notice == Notice::NothingToPlay {
            let _ = self.handle.shutdown();
        }
    }
}

/// Main application controller that coordinates all components
pub struct AppController {
    config: ConfigManager,
    library: SharedLibrary,
    logger: PlaybackLogger,
}

impl AppController {
    pub fn new() -> Result<Self, PlayerError> {
        // Keep the console readable unless asked otherwise
        if std::env::var("AMBIENT_LOG_LEVEL").is_err() {
            std::env::set_var("AMBIENT_LOG_LEVEL", "warn");
        }
        if let Err(e) = PlaybackLogger::init() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config = ConfigManager::new()?;
        let library = Library::open(config.get_config().library_path.clone())?;
        info!("Library loaded from {}", library.path().display());

        Ok(Self {
            config,
            library: Arc::new(Mutex::new(library)),
            logger: PlaybackLogger::new(),
        })
    }

    /// Execute a single command
    pub async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Play { timer } => self.play_until_stopped(timer).await,
            Commands::Playlist { action } => self.execute_playlist_action(action),
            Commands::Preset { action } => self.execute_preset_action(action),
            Commands::Devices => Self::list_devices(),
            Commands::Config { action } => self.execute_config_action(action),
        }
    }

    fn execute_playlist_action(&mut self, action: PlaylistAction) -> Result<(), PlayerError> {
        let mut library = lock_library(&self.library);
        match action {
            PlaylistAction::Create { name, paths } => {
                let count = library.create_playlist(&name, &paths)?;
                println!("Created playlist '{}' with {} tracks", name, count);
            }
            PlaylistAction::Add { name, paths } => {
                let count = library.add_tracks(&name, &paths)?;
                println!("Added {} tracks to '{}'", count, name);
            }
            PlaylistAction::List => StatusDisplay::display_playlists(library.playlists()),
            PlaylistAction::Show { name } => {
                let playlist = library
                    .playlist(&name)
                    .ok_or(LibraryError::PlaylistNotFound { name: name.clone() })?;
                StatusDisplay::display_playlist_tracks(playlist);
            }
            PlaylistAction::Delete { name } => {
                library.delete_playlist(&name)?;
                println!("Deleted playlist '{}'", name);
            }
            PlaylistAction::Activate { name } => {
                library.set_active(&name, true)?;
                println!("'{}' is now part of the mix", name);
            }
            PlaylistAction::Deactivate { name } => {
                library.set_active(&name, false)?;
                println!("'{}' removed from the mix", name);
            }
            PlaylistAction::Volume { name, level } => {
                library.set_volume(&name, f32::from(level) / 100.0)?;
                println!("Volume of '{}' set to {}%", name, level);
            }
            PlaylistAction::Shuffle { name, mode } => {
                library.set_shuffle(&name, mode.is_on())?;
                println!("Shuffle {} for '{}'", if mode.is_on() { "on" } else { "off" }, name);
            }
            PlaylistAction::ClearErrors { name } => {
                let cleared = library.clear_errors(&name)?;
                println!("Cleared {} failed tracks in '{}'", cleared, name);
            }
        }
        Ok(())
    }

    fn execute_preset_action(&mut self, action: PresetAction) -> Result<(), PlayerError> {
        let mut library = lock_library(&self.library);
        match action {
            PresetAction::Save { name } => {
                let count = library.save_preset(&name)?;
                println!("Saved preset '{}' with {} playlists", name, count);
            }
            PresetAction::Load { name } => {
                let missing = library.load_preset(&name)?;
                report_loaded_preset(&name, &missing);
            }
            PresetAction::List => {
                if library.presets().is_empty() {
                    println!("No presets. Save one with 'preset save <name>'");
                }
                for preset in library.presets() {
                    let entries: Vec<String> = preset
                        .playlists
                        .iter()
                        .map(|entry| format!("{} {}%", entry.name, (entry.volume * 100.0).round() as u32))
                        .collect();
                    println!("{:<20} {}", StatusDisplay::truncate(&preset.name, 20), entries.join(", "));
                }
            }
            PresetAction::Delete { name } => {
                library.delete_preset(&name)?;
                println!("Deleted preset '{}'", name);
            }
        }
        Ok(())
    }

    fn list_devices() -> Result<(), PlayerError> {
        let devices = DeviceManager::new()?;
        let default = devices.default_device_name();
        let names = devices.list_devices();
        if names.is_empty() {
            println!("No audio output devices found");
        }
        for name in names {
            let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
            match devices.get_capabilities(&name) {
                Some(caps) => {
                    let rates: Vec<String> = caps
                        .supported_sample_rates
                        .iter()
                        .map(|rate| format!("{}Hz", rate))
                        .collect();
                    println!("{} {} ({} channels, {})", marker, name, caps.max_channels, rates.join(", "));
                }
                None => println!("{} {}", marker, name),
            }
        }
        Ok(())
    }

    fn execute_config_action(&mut self, action: ConfigAction) -> Result<(), PlayerError> {
        match action {
            ConfigAction::Show => {
                let rendered =
                    toml::to_string_pretty(self.config.get_config()).map_err(ConfigError::from)?;
                println!("# {}", self.config.config_path().display());
                print!("{}", rendered);
            }
            ConfigAction::Background { mode } => {
                self.config.set_play_in_background(mode.is_on())?;
                println!("Background playback {}", if mode.is_on() { "on" } else { "off" });
            }
            ConfigAction::StopInsteadOfPause { mode } => {
                self.config.set_stop_instead_of_pause(mode.is_on())?;
                println!("Stop instead of pause {}", if mode.is_on() { "on" } else { "off" });
            }
            ConfigAction::Timer { minutes } => {
                let minutes = (minutes > 0).then_some(minutes);
                self.config.set_default_timer_minutes(minutes)?;
                match minutes {
                    Some(minutes) => println!("'play' stops after {} minutes by default", minutes),
                    None => println!("Default timer disabled"),
                }
            }
            ConfigAction::Device { name } => {
                match &name {
                    Some(name) => println!("Preferred device set to '{}'", name),
                    None => println!("Using the system default device"),
                }
                self.config.set_preferred_device(name)?;
            }
        }
        Ok(())
    }

    fn start_service(&self) -> Result<(PlaybackService, ServiceHandle), PlayerError> {
        let config = self.config.get_config();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let backend = DesktopBackend::new(config.preferred_device.as_deref(), media_tx)?;
        debug!(
            "Output on {} at {}Hz",
            backend.device_name().unwrap_or("default device"),
            backend.sample_rate()
        );

        let device = backend.device_name().map(str::to_string);

        let (service, handle) = PlaybackService::new(
            Box::new(backend),
            media_rx,
            Box::new(DesktopAudioSystem::new()),
            Box::new(LibraryStore::new(self.library.clone())),
            config.arbiter_settings(),
            self.logger.clone(),
        );
        watch_output_route(handle.clone(), device);
        Ok((service, handle))
    }

    fn publish_active_playlists(&self, handle: &ServiceHandle) -> Result<(), PlayerError> {
        let active = lock_library(&self.library).active_playlists();
        handle.publish_active_playlists(active)?;
        Ok(())
    }

    /// Play the active playlists until the timer fires, the mix runs dry or Ctrl-C
    async fn play_until_stopped(&mut self, timer: Option<Duration>) -> Result<(), PlayerError> {
        if lock_library(&self.library).active_playlists().is_empty() {
            StatusDisplay::display_notice(&Notice::NothingToPlay);
            return Ok(());
        }

        let (service, handle) = self.start_service()?;
        let session = tokio::spawn(service.run());

        handle.register_observer(Box::new(ConsoleObserver))?;
        handle.register_observer(Box::new(ShutdownWhenIdle {
            handle: handle.clone(),
        }))?;
        self.publish_active_playlists(&handle)?;

        let stopper = handle.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = stopper.stop();
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        handle.play()?;
        let timer = timer.or_else(|| {
            self.config
                .get_config()
                .default_timer_minutes
                .filter(|minutes| *minutes > 0)
                .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
        });
        match timer {
            Some(duration) => {
                handle.set_timer(duration)?;
                println!("Playing. Stopping in {} (Ctrl-C to stop now)", StatusDisplay::format_duration(duration));
            }
            None => println!("Playing. Press Ctrl-C to stop"),
        }

        let last = session
            .await
            .map_err(|e| ServiceError::TaskFailed(e.to_string()))?;
        debug!("Session ended in state {}", last.state.as_str());
        Ok(())
    }

    /// Run interactive mode
    pub async fn run_interactive_mode(&mut self) -> Result<(), PlayerError> {
        println!("Ambient Mixer v{}", env!("CARGO_PKG_VERSION"));
        println!("Type 'help' for available commands, 'exit' or 'quit' to quit.");
        println!();

        let (service, handle) = self.start_service()?;
        let session = tokio::spawn(service.run());
        let binding = handle.bind()?;
        handle.register_observer(Box::new(ConsoleObserver))?;
        self.publish_active_playlists(&handle)?;

        let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel::<()>();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = interrupt_tx.send(());
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        // Blocking reads stay off the runtime
        let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if line_tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut awaiting_input = false;
        loop {
            if !awaiting_input {
                print!("> ");
                let _ = std::io::stdout().flush();
                awaiting_input = true;
            }

            tokio::select! {
                biased;

                Some(()) = interrupts.recv() => {
                    println!("\nReceived interrupt signal. Shutting down...");
                    break;
                }

                line = lines.recv() => {
                    awaiting_input = false;
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match CliApp::parse_command(&line) {
                        Ok(SessionCommand::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(command) => {
                            if let Err(e) = self.execute_session_command(command, &handle) {
                                Self::report_error(&e);
                            }
                        }
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }
            }
        }

        if let Err(e) = handle.shutdown() {
            debug!("Session already ended: {}", e);
        }
        drop(binding);
        session
            .await
            .map_err(|e| ServiceError::TaskFailed(e.to_string()))?;
        Ok(())
    }

    fn execute_session_command(
        &mut self,
        command: SessionCommand,
        handle: &ServiceHandle,
    ) -> Result<(), PlayerError> {
        match command {
            SessionCommand::Play => handle.play()?,
            SessionCommand::Pause => handle.pause()?,
            SessionCommand::Toggle => handle.toggle()?,
            SessionCommand::Stop => handle.stop()?,
            SessionCommand::Timer(Some(duration)) => {
                handle.set_timer(duration)?;
                println!("Stopping in {}", StatusDisplay::format_duration(duration));
            }
            SessionCommand::Timer(None) => {
                handle.clear_timer()?;
                println!("Timer cancelled");
            }
            SessionCommand::Volume { playlist, level } => {
                let volume = f32::from(level) / 100.0;
                lock_library(&self.library).set_volume(&playlist, volume)?;
                handle.set_playlist_volume(PlaylistId::new(playlist), volume)?;
            }
            SessionCommand::Activate(name) => {
                lock_library(&self.library).set_active(&name, true)?;
                self.publish_active_playlists(handle)?;
            }
            SessionCommand::Deactivate(name) => {
                lock_library(&self.library).set_active(&name, false)?;
                self.publish_active_playlists(handle)?;
            }
            SessionCommand::PresetSave(name) => {
                let count = lock_library(&self.library).save_preset(&name)?;
                println!("Saved preset '{}' with {} playlists", name, count);
            }
            SessionCommand::PresetLoad(name) => {
                let missing = lock_library(&self.library).load_preset(&name)?;
                report_loaded_preset(&name, &missing);
                self.publish_active_playlists(handle)?;
            }
            SessionCommand::Background(enabled) => {
                self.config.set_play_in_background(enabled)?;
                handle.submit(Command::SetPlayInBackground(enabled))?;
            }
            SessionCommand::StopInsteadOfPause(enabled) => {
                self.config.set_stop_instead_of_pause(enabled)?;
                handle.submit(Command::SetStopInsteadOfPause(enabled))?;
            }
            SessionCommand::Status => {
                let snapshot = handle.snapshot();
                StatusDisplay::display_full_status(&snapshot, lock_library(&self.library).playlists());
            }
            SessionCommand::History => {
                StatusDisplay::display_history(&self.logger.get_recent_events(20));
            }
            SessionCommand::Help => CliApp::display_help(),
            SessionCommand::Quit => {}
        }
        Ok(())
    }

    fn report_error(error: &PlayerError) {
        log_player_error(error);
        StatusDisplay::display_error(error);
    }
}

fn report_loaded_preset(name: &str, missing: &[String]) {
    println!("Loaded preset '{}'", name);
    if !missing.is_empty() {
        println!("Skipped playlists that no longer exist: {}", missing.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<(), PlayerError> {
    let cli = CliApp::parse();

    let mut app = match AppController::new() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(command) => app.execute_command(command).await,
        None => app.run_interactive_mode().await,
    };
    if let Err(e) = result {
        AppController::report_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
    Ok(())
}
