//! Audio Engine
//!
//! Keeps a cpal output stream open on the default device. Nothing is
//! synthesized yet, so the callback writes silence; holding the stream keeps
//! the audio device claimed for when note playback is added.
//! The audio callback runs in a separate thread and must be real-time safe.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use thiserror::Error;

/// Errors that can occur during audio engine operation.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// No audio output device was found.
    #[error("No audio output device found")]
    NoOutputDevice,
    /// Failed to get device configuration.
    #[error("Failed to get device configuration: {0}")]
    ConfigurationFailed(String),
    /// Failed to create the audio stream.
    #[error("Failed to create audio stream: {0}")]
    StreamCreationFailed(String),
    /// Failed to start/stop playback.
    #[error("Failed to control audio playback: {0}")]
    StreamPlaybackFailed(String),
}

/// Owns the output device and, while running, its stream.
pub struct AudioEngine {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioEngine {
    /// Create a new AudioEngine using the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioError::ConfigurationFailed(e.to_string()))?;

        let config = StreamConfig {
            channels: supported_config.channels(),
            sample_rate: SampleRate(supported_config.sample_rate().0),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Get the name of the output device.
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Get the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start the (silent) output stream. Starting a running engine is a no-op.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // REAL-TIME SAFE: No allocations, no locks, no blocking
                    write_silence(data);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;

        log::info!(
            "audio output open on '{}' ({} Hz, {} ch)",
            self.device_name(),
            self.sample_rate(),
            self.channels()
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop the audio stream.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| AudioError::StreamPlaybackFailed(e.to_string()))?;
            log::info!("audio output stopped");
        }
        Ok(())
    }

    /// Check if the audio stream is currently running.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

fn write_silence(data: &mut [f32]) {
    data.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::NoOutputDevice;
        assert_eq!(err.to_string(), "No audio output device found");

        let err = AudioError::StreamCreationFailed("test error".to_string());
        assert!(err.to_string().contains("test error"));
    }

    #[test]
    fn test_write_silence_clears_buffer() {
        let mut buffer = [0.5f32, -0.25, 1.0, 0.0];
        write_silence(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    // Hardware-dependent paths (device open, stream start/stop) need real
    // audio hardware and are not exercised here.
}
