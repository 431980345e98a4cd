//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the playback thread checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All samples were played
    Finished,
    /// Stopped early by the cancellation token
    Cancelled,
}

/// Plays audio to the default output device
#[derive(Debug, Clone)]
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play samples until finished or cancelled
    ///
    /// Runs the blocking stream on the blocking thread pool, since cpal
    /// streams are not `Send`.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub async fn play(
        &self,
        samples: Vec<f32>,
        cancel: CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let playback = self.clone();
        tokio::task::spawn_blocking(move || playback.play_blocking(samples, &cancel))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    /// Play MP3 bytes until finished or cancelled
    ///
    /// Streams encoded at another rate are resampled to
    /// [`PLAYBACK_SAMPLE_RATE`] first.
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play_mp3(
        &self,
        mp3_data: &[u8],
        cancel: CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let decoded = decode_mp3(mp3_data)?;
        let samples = resample(&decoded.samples, decoded.sample_rate, PLAYBACK_SAMPLE_RATE)?;
        self.play(samples, cancel).await
    }

    /// Play samples on the current thread
    ///
    /// The output callback writes silence as soon as `cancel` fires, and the
    /// stream is dropped on the next poll, so audio stops mid-utterance rather
    /// than after the queued buffer drains.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_blocking(
        &self,
        samples: Vec<f32>,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        if samples.is_empty() {
            return Ok(PlaybackOutcome::Finished);
        }
        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Cancelled);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();

        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let halted = Arc::new(AtomicBool::new(false));

        let stream = {
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            let halted = Arc::clone(&halted);
            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let stop = halted.load(Ordering::Acquire);
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = if !stop && pos < samples.len() {
                                pos += 1;
                                samples[pos - 1]
                            } else {
                                finished.store(true, Ordering::Release);
                                0.0
                            };

                            for out in frame.iter_mut() {
                                *out = sample;
                            }
                        }

                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        let outcome = loop {
            if cancel.is_cancelled() {
                halted.store(true, Ordering::Release);
                break PlaybackOutcome::Cancelled;
            }
            if finished.load(Ordering::Acquire) || start.elapsed() > timeout {
                break PlaybackOutcome::Finished;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if outcome == PlaybackOutcome::Finished {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        tracing::debug!(
            samples = sample_count,
            played = position.load(Ordering::Relaxed),
            ?outcome,
            "playback ended"
        );

        Ok(outcome)
    }
}

/// Mono PCM decoded from a compressed stream
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Samples in `-1.0..=1.0`
    pub samples: Vec<f32>,
    /// Rate the samples were encoded at
    pub sample_rate: u32,
}

/// Decode MP3 bytes to mono f32 samples at the stream's own rate
///
/// An empty stream decodes to no samples at [`PLAYBACK_SAMPLE_RATE`].
///
/// # Errors
///
/// Returns error if the data is not valid MP3 or the frame rate changes
/// mid-stream
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let rate = u32::try_from(frame.sample_rate)
                    .map_err(|_| Error::Audio(format!("bad MP3 sample rate {}", frame.sample_rate)))?;
                if *sample_rate.get_or_insert(rate) != rate {
                    return Err(Error::Audio(format!(
                        "MP3 sample rate changed mid-stream to {rate}"
                    )));
                }

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.unwrap_or(PLAYBACK_SAMPLE_RATE),
    })
}

/// Input frames per resampler pass
const RESAMPLE_CHUNK: usize = 1024;

/// Resample mono audio using rubato
///
/// The output holds `samples.len() * to_rate / from_rate` frames; the
/// resampler's delay is trimmed and the final partial chunk zero-padded.
///
/// # Errors
///
/// Returns error if either rate is zero or resampling fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio(format!(
            "cannot resample {from_rate} Hz to {to_rate} Hz"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected =
        (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let delay = resampler.output_delay();

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    for chunk in input.chunks(RESAMPLE_CHUNK) {
        let mut block = chunk.to_vec();
        block.resize(RESAMPLE_CHUNK, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the filter tail
    while output.len() < delay + expected {
        let result = resampler
            .process(&[vec![0.0; RESAMPLE_CHUNK]], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output[delay..delay + expected]
        .iter()
        .map(|&s| s as f32)
        .collect())
}
