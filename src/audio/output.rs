use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use log::{debug, error, info};
use tokio::sync::mpsc::UnboundedSender;

use super::decoder::DecodedClip;
use super::{InstanceId, MediaEvent, MediaEventKind, MediaToken};
use crate::error::AudioError;

/// One media instance as the output stream sees it
pub struct Voice {
    token: MediaToken,
    clip: Option<Arc<DecodedClip>>,
    position: usize,
    playing: bool,
    gain: (f32, f32),
    next: Option<InstanceId>,
}

impl Voice {
    fn pending(token: MediaToken) -> Self {
        Self {
            token,
            clip: None,
            position: 0,
            playing: false,
            gain: (1.0, 1.0),
            next: None,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.clip.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing && self.clip.is_some();
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn set_gain(&mut self, left: f32, right: f32) {
        self.gain = (left, right);
    }

    pub fn set_next(&mut self, next: Option<InstanceId>) {
        self.next = next;
    }

    /// Add this voice into `out`; returns the frames written
    fn mix_into(&mut self, out: &mut [f32], channels: usize) -> usize {
        let Some(clip) = self.clip.as_ref() else {
            return 0;
        };
        let samples = clip.samples();
        let available = clip.frames().saturating_sub(self.position);
        let frames = (out.len() / channels).min(available);
        let (left_gain, right_gain) = self.gain;

        for i in 0..frames {
            let src = (self.position + i) * 2;
            let left = samples[src] * left_gain;
            let right = samples[src + 1] * right_gain;
            if channels == 1 {
                out[i] += (left + right) * 0.5;
            } else {
                out[i * channels] += left;
                out[i * channels + 1] += right;
            }
        }

        self.position += frames;
        frames
    }

    fn at_end(&self) -> bool {
        self.clip
            .as_ref()
            .map(|clip| self.position >= clip.frames())
            .unwrap_or(false)
    }
}

/// Voice table summed by the output callback
pub struct Mixdown {
    voices: HashMap<InstanceId, Voice>,
    events: UnboundedSender<MediaEvent>,
}

pub type SharedMixdown = Arc<Mutex<Mixdown>>;

impl Mixdown {
    pub fn new(events: UnboundedSender<MediaEvent>) -> Self {
        Self {
            voices: HashMap::new(),
            events,
        }
    }

    pub fn shared(events: UnboundedSender<MediaEvent>) -> SharedMixdown {
        Arc::new(Mutex::new(Self::new(events)))
    }

    /// Reserve a slot for an instance whose clip is still decoding
    pub fn insert_pending(&mut self, token: MediaToken) {
        self.voices.insert(token.instance, Voice::pending(token));
    }

    /// Give a pending voice its clip; false when the instance was released
    pub fn attach(&mut self, id: InstanceId, clip: Arc<DecodedClip>) -> bool {
        match self.voices.get_mut(&id) {
            Some(voice) => {
                voice.clip = Some(clip);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn voice(&self, id: InstanceId) -> Option<&Voice> {
        self.voices.get(&id)
    }

    pub fn voice_mut(&mut self, id: InstanceId) -> Option<&mut Voice> {
        self.voices.get_mut(&id)
    }

    pub fn remove(&mut self, id: InstanceId) -> bool {
        self.voices.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Sum every playing voice into `out` (interleaved, `channels` wide).
    ///
    /// A voice reaching its end stops, rewinds and reports `Completed`; its
    /// chained next voice starts at the following frame of the same buffer.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;

        let mut queue: Vec<(InstanceId, usize)> = self
            .voices
            .iter()
            .filter(|(_, voice)| voice.playing)
            .map(|(id, _)| (*id, 0))
            .collect();

        while let Some((id, start)) = queue.pop() {
            let Some(voice) = self.voices.get_mut(&id) else {
                continue;
            };
            let written = voice.mix_into(&mut out[start * channels..], channels);
            if !voice.at_end() {
                continue;
            }

            voice.playing = false;
            voice.position = 0;
            let token = voice.token.clone();
            let next = voice.next;
            let _ = self
                .events
                .send(MediaEvent::new(token, MediaEventKind::Completed));

            let resume_at = start + written;
            if let Some(follower) = next.and_then(|next| self.voices.get_mut(&next)) {
                if follower.is_prepared() && !follower.playing {
                    follower.playing = true;
                    if resume_at < frames {
                        queue.push((follower.token.instance, resume_at));
                    }
                }
            }
        }
    }
}

/// A running cpal output stream fed from a `Mixdown`
///
/// The stream lives on its own thread since cpal streams are not `Send` on
/// every platform.
pub struct OutputStream {
    sample_rate: u32,
    channels: u16,
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputStream {
    pub fn open(device: cpal::Device, mixdown: SharedMixdown) -> Result<Self, AudioError> {
        let default_config = device.default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;
        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, &config, sample_format, mixdown) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(format!("Failed to start stream: {}", e))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Parks until the owner drops the shutdown sender.
                let _ = shutdown_rx.recv();
                let _ = stream.pause();
                debug!("Output stream closed");
            })
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| AudioError::InitializationFailed("Audio thread exited during startup".to_string()))??;

        info!("Output stream running at {} Hz, {} channels", sample_rate, channels);
        Ok(Self {
            sample_rate,
            channels,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    mixdown: SharedMixdown,
) -> Result<Stream, AudioError> {
    match sample_format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, mixdown),
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, mixdown),
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, mixdown),
        other => Err(AudioError::InitializationFailed(format!("Unsupported sample format: {:?}", other))),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixdown: SharedMixdown,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                match mixdown.lock() {
                    Ok(mut mixdown) => mixdown.render(&mut scratch, channels),
                    Err(_) => scratch.fill(0.0),
                }
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = cpal::Sample::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaylistId;
    use tokio::sync::mpsc;

    fn token(id: InstanceId) -> MediaToken {
        MediaToken {
            playlist: PlaylistId::from("rain"),
            instance: id,
        }
    }

    fn clip(frames: usize, value: f32) -> Arc<DecodedClip> {
        Arc::new(DecodedClip::from_stereo(vec![value; frames * 2], 48_000))
    }

    fn voice_with_clip(mixdown: &mut Mixdown, frames: usize, value: f32) -> InstanceId {
        let id = InstanceId::next();
        mixdown.insert_pending(token(id));
        assert!(mixdown.attach(id, clip(frames, value)));
        id
    }

    #[test]
    fn test_pending_voice_cannot_play() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let id = InstanceId::next();
        mixdown.insert_pending(token(id));

        let voice = mixdown.voice_mut(id).unwrap();
        voice.set_playing(true);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_attach_after_release_is_refused() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let id = InstanceId::next();
        mixdown.insert_pending(token(id));
        assert!(mixdown.remove(id));

        assert!(!mixdown.attach(id, clip(4, 0.1)));
        assert!(mixdown.is_empty());
    }

    #[test]
    fn test_voices_are_summed_with_gain() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let a = voice_with_clip(&mut mixdown, 16, 0.25);
        let b = voice_with_clip(&mut mixdown, 16, 0.25);
        mixdown.voice_mut(a).unwrap().set_playing(true);
        let voice = mixdown.voice_mut(b).unwrap();
        voice.set_playing(true);
        voice.set_gain(0.0, 1.0);

        let mut out = vec![0.0; 8];
        mixdown.render(&mut out, 2);
        for frame in out.chunks_exact(2) {
            assert!((frame[0] - 0.25).abs() < 1e-6);
            assert!((frame[1] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mono_output_averages_sides() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let id = voice_with_clip(&mut mixdown, 4, 0.5);
        let voice = mixdown.voice_mut(id).unwrap();
        voice.set_playing(true);
        voice.set_gain(1.0, 0.0);

        let mut out = vec![0.0; 4];
        mixdown.render(&mut out, 1);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_chained_voice_continues_in_same_buffer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let first = voice_with_clip(&mut mixdown, 3, 0.1);
        let second = voice_with_clip(&mut mixdown, 10, 0.2);
        let voice = mixdown.voice_mut(first).unwrap();
        voice.set_next(Some(second));
        voice.set_playing(true);

        let mut out = vec![0.0; 12];
        mixdown.render(&mut out, 2);

        let left: Vec<f32> = out.chunks_exact(2).map(|frame| frame[0]).collect();
        assert_eq!(left, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.2]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.token.instance, first);
        assert!(matches!(event.kind, MediaEventKind::Completed));

        let finished = mixdown.voice(first).unwrap();
        assert!(!finished.is_playing());
        assert_eq!(finished.position(), 0);
        assert!(mixdown.voice(second).unwrap().is_playing());
        assert_eq!(mixdown.voice(second).unwrap().position(), 3);
    }

    #[test]
    fn test_unchained_voice_goes_silent_after_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let id = voice_with_clip(&mut mixdown, 2, 0.3);
        mixdown.voice_mut(id).unwrap().set_playing(true);

        let mut out = vec![0.0; 8];
        mixdown.render(&mut out, 2);
        assert_eq!(&out[4..], &[0.0; 4]);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_follower_queued_at_buffer_end_starts_next_callback() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut mixdown = Mixdown::new(tx);
        let first = voice_with_clip(&mut mixdown, 4, 0.1);
        let second = voice_with_clip(&mut mixdown, 4, 0.2);
        let voice = mixdown.voice_mut(first).unwrap();
        voice.set_next(Some(second));
        voice.set_playing(true);

        let mut out = vec![0.0; 8];
        mixdown.render(&mut out, 2);
        assert!(mixdown.voice(second).unwrap().is_playing());
        assert_eq!(mixdown.voice(second).unwrap().position(), 0);

        mixdown.render(&mut out, 2);
        assert!((out[0] - 0.2).abs() < 1e-6);
    }
}
