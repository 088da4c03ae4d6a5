//! PCM ingestion: normalises captured sample batches into the interleaved
//! stereo `f32` frames the engine consumes.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{engine::EngineHandle, Result, VisualiserError};

mod capture;

pub use capture::{CaptureHub, CaptureSink, ListenerId};

/// Interleaved samples as delivered by the audio pipeline.
#[derive(Debug, Clone, Copy)]
pub enum SampleData<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
    /// Little-endian samples of a declared bit width.
    Raw { bits: u16, bytes: &'a [u8] },
}

impl SampleData<'_> {
    pub fn sample_width(&self) -> u16 {
        match self {
            SampleData::F32(_) => 32,
            SampleData::F64(_) => 64,
            SampleData::Raw { bits, .. } => *bits,
        }
    }
}

/// One capture callback's worth of audio. Not retained past the call.
#[derive(Debug, Clone, Copy)]
pub struct AudioBatch<'a> {
    pub samples: SampleData<'a>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl<'a> AudioBatch<'a> {
    pub fn stereo_f32(samples: &'a [f32], sample_rate: u32) -> Self {
        Self {
            samples: SampleData::F32(samples),
            channels: 2,
            sample_rate,
        }
    }

    pub fn stereo_f64(samples: &'a [f64], sample_rate: u32) -> Self {
        Self {
            samples: SampleData::F64(samples),
            channels: 2,
            sample_rate,
        }
    }
}

/// Destination for normalised stereo frames.
pub trait PcmSink {
    fn push_pcm(&self, samples: &[f32], frames: usize);
}

impl PcmSink for EngineHandle {
    fn push_pcm(&self, samples: &[f32], frames: usize) {
        EngineHandle::push_pcm(self, samples, frames);
    }
}

/// Converts a batch into stereo frames without forwarding it anywhere.
///
/// `f64` input is paired `(L, R)` in order; with an odd sample count the
/// final unmatched sample is dropped.
pub fn adapt(batch: &AudioBatch<'_>) -> Result<Vec<[f32; 2]>> {
    check_stereo(batch)?;
    let frames = match batch.samples {
        SampleData::F32(samples) => samples
            .chunks_exact(2)
            .map(|pair| [pair[0], pair[1]])
            .collect(),
        SampleData::F64(samples) => samples
            .chunks_exact(2)
            .map(|pair| [pair[0] as f32, pair[1] as f32])
            .collect(),
        SampleData::Raw { bits: 32, bytes } => decode_f32(bytes)
            .chunks_exact(2)
            .map(|pair| [pair[0], pair[1]])
            .collect(),
        SampleData::Raw { bits: 64, bytes } => decode_f64(bytes)
            .chunks_exact(2)
            .map(|pair| [pair[0] as f32, pair[1] as f32])
            .collect(),
        SampleData::Raw { bits, .. } => return Err(VisualiserError::UnsupportedSampleWidth(bits)),
    };
    Ok(frames)
}

/// Forwards a batch to `sink` and returns the number of frames pushed.
///
/// Single-precision input goes through in one push. Double-precision input
/// is pushed one downcast `(L, R)` frame at a time, dropping a trailing odd
/// sample. Unsupported widths and non-stereo layouts are rejected before
/// anything is pushed.
pub fn ingest(batch: &AudioBatch<'_>, sink: &dyn PcmSink) -> Result<usize> {
    check_stereo(batch)?;
    match batch.samples {
        SampleData::F32(samples) => Ok(push_f32(samples, sink)),
        SampleData::F64(samples) => Ok(push_f64(samples, sink)),
        SampleData::Raw { bits: 32, bytes } => Ok(push_f32(&decode_f32(bytes), sink)),
        SampleData::Raw { bits: 64, bytes } => Ok(push_f64(&decode_f64(bytes), sink)),
        SampleData::Raw { bits, .. } => Err(VisualiserError::UnsupportedSampleWidth(bits)),
    }
}

fn check_stereo(batch: &AudioBatch<'_>) -> Result<()> {
    if batch.channels != 2 {
        return Err(VisualiserError::UnsupportedChannelCount(batch.channels));
    }
    Ok(())
}

fn push_f32(samples: &[f32], sink: &dyn PcmSink) -> usize {
    let frames = samples.len() / 2;
    if frames > 0 {
        sink.push_pcm(samples, frames);
    }
    frames
}

fn push_f64(samples: &[f64], sink: &dyn PcmSink) -> usize {
    let mut frames = 0;
    for pair in samples.chunks_exact(2) {
        let frame = [pair[0] as f32, pair[1] as f32];
        sink.push_pcm(&frame, 1);
        frames += 1;
    }
    frames
}

fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn decode_f64(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect()
}

/// Capture listener that feeds an engine. Batches arriving after the engine
/// is destroyed are dropped silently.
#[derive(Debug)]
pub struct EngineIngest {
    engine: Arc<EngineHandle>,
    reported: AtomicBool,
}

impl EngineIngest {
    pub fn new(engine: Arc<EngineHandle>) -> Self {
        Self {
            engine,
            reported: AtomicBool::new(false),
        }
    }
}

impl CaptureSink for EngineIngest {
    fn on_batch(&self, batch: &AudioBatch<'_>) {
        if let Err(err) = ingest(batch, self.engine.as_ref()) {
            if !self.reported.swap(true, Ordering::Relaxed) {
                tracing::warn!(%err, "rejecting captured audio");
            } else {
                tracing::trace!(%err, "rejecting captured audio");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        calls: Mutex<Vec<(Vec<f32>, usize)>>,
    }

    impl PcmSink for CollectingSink {
        fn push_pcm(&self, samples: &[f32], frames: usize) {
            self.calls.lock().unwrap().push((samples.to_vec(), frames));
        }
    }

    #[test]
    fn single_precision_passes_through_in_one_push() {
        let sink = CollectingSink::default();
        let samples = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];

        let frames = ingest(&AudioBatch::stereo_f32(&samples, 44_100), &sink).unwrap();

        assert_eq!(frames, 3);
        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (samples.to_vec(), 3));
    }

    #[test]
    fn double_precision_even_length_pushes_each_pair() {
        let sink = CollectingSink::default();
        let samples = [0.5f64, -0.5, 0.25, -0.25];

        let frames = ingest(&AudioBatch::stereo_f64(&samples, 48_000), &sink).unwrap();

        assert_eq!(frames, 2);
        let calls = sink.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(vec![0.5f32, -0.5], 1), (vec![0.25f32, -0.25], 1)]
        );
    }

    #[test]
    fn double_precision_odd_length_drops_last_sample() {
        let sink = CollectingSink::default();
        let samples = [0.1f64, 0.2, 0.3, 0.4, 0.9];

        let frames = ingest(&AudioBatch::stereo_f64(&samples, 48_000), &sink).unwrap();

        assert_eq!(frames, 2);
        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0, vec![0.3f32, 0.4f32]);
    }

    #[test]
    fn raw_bytes_decode_by_width() {
        let bytes: Vec<u8> = [1.0f64, -1.0]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        let batch = AudioBatch {
            samples: SampleData::Raw { bits: 64, bytes: &bytes },
            channels: 2,
            sample_rate: 48_000,
        };

        assert_eq!(adapt(&batch).unwrap(), vec![[1.0, -1.0]]);
    }

    #[test]
    fn unsupported_width_is_rejected_without_pushing() {
        let sink = CollectingSink::default();
        let bytes = [0u8; 12];
        let batch = AudioBatch {
            samples: SampleData::Raw { bits: 24, bytes: &bytes },
            channels: 2,
            sample_rate: 48_000,
        };

        let err = ingest(&batch, &sink).unwrap_err();

        assert!(matches!(err, VisualiserError::UnsupportedSampleWidth(24)));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn non_stereo_input_is_rejected() {
        let sink = CollectingSink::default();
        let batch = AudioBatch {
            samples: SampleData::F32(&[0.0; 6]),
            channels: 6,
            sample_rate: 48_000,
        };

        assert!(matches!(
            ingest(&batch, &sink).unwrap_err(),
            VisualiserError::UnsupportedChannelCount(6)
        ));
        assert!(matches!(
            adapt(&batch).unwrap_err(),
            VisualiserError::UnsupportedChannelCount(6)
        ));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn ingest_after_engine_destroyed_is_a_no_op() {
        use crate::testing::{EventLog, RecordingEngine};

        let log = EventLog::default();
        let engine = Arc::new(EngineHandle::from_engine(Box::new(RecordingEngine::new(
            log.clone(),
        ))));
        let listener = EngineIngest::new(engine.clone());

        engine.destroy();
        listener.on_batch(&AudioBatch::stereo_f32(&[0.1, 0.2], 48_000));

        assert_eq!(log.events(), vec!["engine.destroy"]);
    }
}
