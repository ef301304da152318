//! Decorative level meter for the now-playing strip.
//!
//! There is no audio analysis behind it: levels follow a few offset sine
//! waves that advance one step per time update while playing, and drop to
//! flat when playback stops. Deterministic, so it renders the same in tests.

/// Number of bars drawn by default.
pub const DEFAULT_BANDS: usize = 12;

/// Glyphs from silent to full, for text rendering.
const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Level meter state.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelMeter {
    step: u64,
    /// Bar levels (0.0 - 1.0)
    levels: Vec<f32>,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(DEFAULT_BANDS)
    }
}

impl LevelMeter {
    pub fn new(bands: usize) -> Self {
        Self {
            step: 0,
            levels: vec![0.0; bands],
        }
    }

    /// Advance one animation step.
    pub fn advance(&mut self) {
        self.step = self.step.wrapping_add(1);
        let t = self.step as f32 * 0.7;
        for (i, level) in self.levels.iter_mut().enumerate() {
            let band = i as f32;
            let wave = (t + band * 0.9).sin() * 0.5 + (t * 0.37 + band * 1.7).sin() * 0.3;
            *level = (0.5 + wave * 0.5).clamp(0.05, 1.0);
        }
    }

    /// Drop every bar to zero.
    pub fn flatten(&mut self) {
        self.levels.iter_mut().for_each(|l| *l = 0.0);
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn is_flat(&self) -> bool {
        self.levels.iter().all(|l| *l == 0.0)
    }

    /// Render the bars as block glyphs.
    pub fn render(&self) -> String {
        self.levels
            .iter()
            .map(|level| {
                let idx = (level * (BAR_GLYPHS.len() - 1) as f32).round() as usize;
                BAR_GLYPHS[idx.min(BAR_GLYPHS.len() - 1)]
            })
            .collect()
    }
}
