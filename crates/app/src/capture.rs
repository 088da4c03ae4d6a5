//! Default input device capture through CPAL.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use preset_visualiser_core::{AudioBatch, CaptureHub, Result, SampleData, VisualiserError};

/// Keeps the input stream alive. Drop this to stop capturing.
pub struct InputCapture {
    _stream: Stream,
}

impl InputCapture {
    pub fn start(hub: Arc<CaptureHub>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VisualiserError::msg("no audio input device found"))?;
        let supported = device
            .default_input_config()
            .map_err(|err| VisualiserError::msg(format!("failed to get input config: {err}")))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(VisualiserError::msg(format!(
                "input sample format {:?} is not supported",
                supported.sample_format()
            )));
        }

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            channels,
            sample_rate,
            "capturing from input device"
        );
        if channels != 2 {
            tracing::warn!(channels, "input is not stereo; batches will be rejected");
        }

        let stream = device
            .build_input_stream(
                &supported.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    hub.deliver(&AudioBatch {
                        samples: SampleData::F32(data),
                        channels,
                        sample_rate,
                    });
                },
                |err| tracing::warn!(%err, "input stream error"),
                None,
            )
            .map_err(|err| VisualiserError::msg(format!("failed to build input stream: {err}")))?;
        stream
            .play()
            .map_err(|err| VisualiserError::msg(format!("failed to start input stream: {err}")))?;

        Ok(Self { _stream: stream })
    }
}
