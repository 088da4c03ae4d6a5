//! Audio feeding the capture hub during a session.

use std::{
    f64::consts::TAU,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use preset_visualiser_core::{AudioBatch, AudioConfig, CaptureHub, Result};

/// Whatever is producing audio. Dropping it stops delivery.
pub enum AudioSource {
    Tone(ToneSource),
    #[cfg(feature = "cpal-capture")]
    Input(crate::capture::InputCapture),
}

/// Stereo sine generator delivering one block per block period from its own
/// thread, standing in for a playback pipeline.
pub struct ToneSource {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ToneSource {
    pub fn start(
        hub: Arc<CaptureHub>,
        audio: &AudioConfig,
        frequency: f32,
        double_precision: bool,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let sample_rate = audio.sample_rate.max(1);
        let block = audio.block_size.max(1);
        let period = Duration::from_secs_f64(block as f64 / f64::from(sample_rate));
        let step = f64::from(frequency) * TAU / f64::from(sample_rate);

        let handle = thread::Builder::new()
            .name("tone-source".to_string())
            .spawn(move || {
                tracing::debug!(sample_rate, block, "tone source started");
                let mut phase = 0.0f64;
                let mut wide = vec![0.0f64; block * 2];
                let mut narrow = vec![0.0f32; block * 2];

                while !stop_thread.load(Ordering::Acquire) {
                    for frame in wide.chunks_exact_mut(2) {
                        // Right channel at half level so the two sides differ.
                        let value = phase.sin() * 0.8;
                        frame[0] = value;
                        frame[1] = value * 0.5;
                        phase = (phase + step) % TAU;
                    }

                    if double_precision {
                        hub.deliver(&AudioBatch::stereo_f64(&wide, sample_rate));
                    } else {
                        for (out, value) in narrow.iter_mut().zip(&wide) {
                            *out = *value as f32;
                        }
                        hub.deliver(&AudioBatch::stereo_f32(&narrow, sample_rate));
                    }
                    thread::sleep(period);
                }
                tracing::debug!("tone source stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
