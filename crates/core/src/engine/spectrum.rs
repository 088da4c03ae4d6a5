use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use super::{EngineFactory, FrameStats, PlaylistEntry, VisualizationEngine};
use crate::{config::TARGET_FPS, surface::RenderSurfaceContext, InitError, Result};

const FFT_SIZE: usize = 1024;
const DEFAULT_RING_FRAMES: usize = 8192;
const DEFAULT_PRESET_SECONDS: u32 = 15;
/// Upper edges of the bass and mid bands as fractions of the spectrum.
const BASS_EDGE: f32 = 1.0 / 64.0;
const MID_EDGE: f32 = 1.0 / 6.0;

/// Creates [`SpectrumEngine`]s.
#[derive(Debug, Clone)]
pub struct SpectrumEngineFactory {
    pub ring_frames: usize,
    pub preset_seconds: u32,
}

impl Default for SpectrumEngineFactory {
    fn default() -> Self {
        Self {
            ring_frames: DEFAULT_RING_FRAMES,
            preset_seconds: DEFAULT_PRESET_SECONDS,
        }
    }
}

impl EngineFactory for SpectrumEngineFactory {
    fn create(
        &self,
        surface: &RenderSurfaceContext,
    ) -> std::result::Result<Box<dyn VisualizationEngine>, InitError> {
        if !surface.version().supports_shaders() {
            return Err(InitError::EngineInitFailed(format!(
                "context version {} lacks shader support",
                surface.version()
            )));
        }
        if self.ring_frames == 0 {
            return Err(InitError::EngineInitFailed(
                "PCM ring must hold at least one frame".to_string(),
            ));
        }
        Ok(Box::new(SpectrumEngine::new(self.ring_frames, self.preset_seconds)))
    }
}

/// Software engine that turns the most recent PCM into band levels and a
/// flat-shaded RGBA frame, cycling through its playlist on a fixed period.
///
/// PCM is kept in a bounded ring of stereo frames. When the ring is full the
/// oldest frames are dropped.
pub struct SpectrumEngine {
    width: u32,
    height: u32,
    fps: u32,
    preset_seconds: u32,
    ring: VecDeque<[f32; 2]>,
    ring_frames: usize,
    playlist: Vec<PlaylistEntry>,
    current: Option<usize>,
    frames_on_preset: u64,
    pixels: Vec<u32>,
    stats: FrameStats,
    fft: FftResources,
}

impl SpectrumEngine {
    pub fn new(ring_frames: usize, preset_seconds: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(FFT_SIZE);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Self {
            width: 0,
            height: 0,
            fps: TARGET_FPS,
            preset_seconds,
            ring: VecDeque::with_capacity(ring_frames),
            ring_frames,
            playlist: Vec::new(),
            current: None,
            frames_on_preset: 0,
            pixels: Vec::new(),
            stats: FrameStats::default(),
            fft,
        }
    }

    /// Rendered frames a preset stays on screen before the next one.
    pub fn preset_duration_frames(&self) -> u64 {
        (u64::from(self.preset_seconds) * u64::from(self.fps)).max(1)
    }

    pub fn current_preset(&self) -> Option<&PlaylistEntry> {
        self.current.and_then(|index| self.playlist.get(index))
    }

    pub fn buffered_frames(&self) -> usize {
        self.ring.len()
    }

    /// Last rendered frame, row-major `0xRRGGBBAA`.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn analyse(&mut self) -> Result<[f32; 3]> {
        let available = self.ring.len().min(FFT_SIZE);
        let offset = FFT_SIZE - available;
        let start = self.ring.len() - available;
        self.fft.input.fill(0.0);
        for (index, frame) in self.ring.range(start..).enumerate() {
            let slot = offset + index;
            self.fft.input[slot] = (frame[0] + frame[1]) * 0.5 * hann_value(slot, FFT_SIZE);
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let bins = self.fft.spectrum.len();
        let bass_end = ((bins as f32 * BASS_EDGE) as usize).max(2);
        let mid_end = ((bins as f32 * MID_EDGE) as usize).max(bass_end + 1);
        let norm = 2.0 / FFT_SIZE as f32;
        let mut levels = [0.0f32; 3];
        // Skip DC.
        for (bin, value) in self.fft.spectrum.iter().enumerate().skip(1) {
            let band = if bin < bass_end {
                0
            } else if bin < mid_end {
                1
            } else {
                2
            };
            levels[band] = levels[band].max(value.norm() * norm);
        }
        Ok(levels)
    }

    fn advance_preset(&mut self) {
        if self.playlist.is_empty() {
            self.current = None;
            return;
        }
        match self.current {
            None => {
                self.current = Some(0);
                self.frames_on_preset = 0;
            }
            Some(index) => {
                self.frames_on_preset += 1;
                if self.frames_on_preset >= self.preset_duration_frames() {
                    let next = (index + 1) % self.playlist.len();
                    tracing::debug!(
                        preset = %self.playlist[next].display_name,
                        "switching preset"
                    );
                    self.current = Some(next);
                    self.frames_on_preset = 0;
                }
            }
        }
    }

    fn shade(&mut self, levels: [f32; 3]) {
        let height = self.height as usize;
        let width = self.width as usize;
        if width == 0 || height == 0 {
            return;
        }
        let channel = |level: f32| (level.clamp(0.0, 1.0) * 255.0) as u32;
        let color =
            (channel(levels[0]) << 24) | (channel(levels[1]) << 16) | (channel(levels[2]) << 8) | 0xff;
        let loudest = levels.iter().copied().fold(0.0f32, f32::max).clamp(0.0, 1.0);
        let lit_rows = (loudest * height as f32).round() as usize;

        for (row, pixels) in self.pixels.chunks_exact_mut(width).enumerate() {
            let lit = row >= height - lit_rows;
            pixels.fill(if lit { color } else { 0x0000_00ff });
        }
    }
}

impl VisualizationEngine for SpectrumEngine {
    fn set_window_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize];
    }

    fn set_target_fps(&mut self, fps: u32) {
        self.fps = fps.max(1);
    }

    fn push_pcm(&mut self, samples: &[f32], frames: usize) {
        for pair in samples.chunks_exact(2).take(frames) {
            if self.ring.len() == self.ring_frames {
                self.ring.pop_front();
            }
            self.ring.push_back([pair[0], pair[1]]);
        }
    }

    fn render_frame(&mut self) {
        let levels = match self.analyse() {
            Ok(levels) => levels,
            Err(err) => {
                tracing::warn!(%err, "spectrum analysis failed, rendering silence");
                [0.0; 3]
            }
        };
        self.advance_preset();
        self.shade(levels);
        self.stats = FrameStats {
            frame: self.stats.frame + 1,
            preset_index: self.current,
            bass: levels[0],
            mid: levels[1],
            treble: levels[2],
        };
    }

    fn clear_playlist(&mut self) {
        self.playlist.clear();
        self.current = None;
        self.frames_on_preset = 0;
    }

    fn add_preset(&mut self, entry: PlaylistEntry) {
        self.playlist.push(entry);
    }

    fn playlist_size(&self) -> usize {
        self.playlist.len()
    }

    fn frame_stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumEngine")
            .field("size", &(self.width, self.height))
            .field("fps", &self.fps)
            .field("ring", &self.ring.len())
            .field("playlist", &self.playlist.len())
            .field("current", &self.current)
            .field("stats", &self.stats)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
