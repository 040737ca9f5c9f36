use crate::logging::UI_NAMESPACE;
use log::warn;
use std::collections::HashMap;
use thiserror::Error;

const OUTER_PAD_X: u32 = 20;
const CLOCK_PAD_Y: u32 = 6;
const TIMER_PAD_Y: u32 = 8;
const LINE_GAP: u32 = 2;
const TOP_INSET: f32 = 4.0;
const MIN_PRIMARY_MARGIN: u32 = 40;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("No font loaded for family '{0}'")]
    FontUnavailable(String),

    #[error("Canvas failed to measure text: {0}")]
    Canvas(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub line_height: f32,
}

/// Font measurement backend. Implemented over the femtovg canvas at
/// runtime and by a fixed-advance fake in tests.
pub trait TextMeasure {
    fn font_metrics(&mut self, family: &str, size: u32) -> Result<FontMetrics, MeasureError>;

    fn advance(&mut self, family: &str, size: u32, text: &str) -> Result<f32, MeasureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Clock,
    TimerExclusive,
}

/// The strings to render for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayContent {
    Clock {
        time: String,
        date: Option<String>,
        week: Option<String>,
    },
    Timer {
        text: String,
    },
}

impl DisplayContent {
    pub fn mode(&self) -> DisplayMode {
        match self {
            DisplayContent::Clock { .. } => DisplayMode::Clock,
            DisplayContent::Timer { .. } => DisplayMode::TimerExclusive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WidgetSize {
    pub width: u32,
    pub height: u32,
}

impl WidgetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where one line of text goes inside the window (top-left anchored).
#[derive(Debug, Clone, PartialEq)]
pub struct LineLayout {
    pub text: String,
    pub font_size: u32,
    pub x: f32,
    pub y: f32,
    pub advance: f32,
    pub line_height: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layout {
    pub size: WidgetSize,
    pub lines: Vec<LineLayout>,
}

pub fn primary_margin(base_size: u32) -> u32 {
    (base_size * 4 / 5).max(MIN_PRIMARY_MARGIN)
}

pub fn secondary_font_size(base_size: u32) -> u32 {
    base_size * 45 / 100
}

pub fn secondary_margin(base_size: u32) -> u32 {
    base_size / 5
}

struct LineSpec<'a> {
    text: &'a str,
    font_size: u32,
    margin: u32,
}

#[derive(Default)]
pub struct LayoutEngine {
    metrics: HashMap<(String, u32), FontMetrics>,
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops memoized font metrics. Call when the family or size changes.
    pub fn invalidate(&mut self) {
        self.metrics.clear();
    }

    #[cfg(test)]
    pub fn cached_metrics(&self) -> usize {
        self.metrics.len()
    }

    #[cfg(test)]
    pub fn compute_size(
        &mut self,
        content: &DisplayContent,
        family: &str,
        base_size: u32,
        measure: &mut dyn TextMeasure,
    ) -> WidgetSize {
        self.compute(content, family, base_size, measure).size
    }

    /// Lays out `content` and returns the smallest non-clipping size plus
    /// the position of every line.
    pub fn compute(
        &mut self,
        content: &DisplayContent,
        family: &str,
        base_size: u32,
        measure: &mut dyn TextMeasure,
    ) -> Layout {
        let specs = match content {
            DisplayContent::Clock { time, date, week } => {
                let small = secondary_font_size(base_size);
                let small_margin = secondary_margin(base_size);
                let mut specs = vec![LineSpec {
                    text: time,
                    font_size: base_size,
                    margin: primary_margin(base_size),
                }];
                for text in [date, week].into_iter().flatten() {
                    specs.push(LineSpec {
                        text,
                        font_size: small,
                        margin: small_margin,
                    });
                }
                specs
            }
            DisplayContent::Timer { text } => vec![LineSpec {
                text,
                font_size: base_size,
                margin: primary_margin(base_size),
            }],
        };

        let mut measured: Vec<(f32, f32)> = Vec::with_capacity(specs.len());
        for spec in &specs {
            let advance = self.advance(measure, family, spec.font_size, spec.text);
            let line_height = self.metrics(measure, family, spec.font_size).line_height;
            measured.push((advance, line_height));
        }

        let content_width = specs
            .iter()
            .zip(&measured)
            .map(|(spec, (advance, _))| advance.ceil() as u32 + spec.margin)
            .max()
            .unwrap_or(0);
        let width = content_width + OUTER_PAD_X;

        let text_height: u32 = measured
            .iter()
            .map(|(_, line_height)| line_height.ceil() as u32)
            .sum::<u32>()
            + LINE_GAP * (measured.len() as u32).saturating_sub(1);
        let height = match content.mode() {
            DisplayMode::Clock => text_height + CLOCK_PAD_Y,
            DisplayMode::TimerExclusive => text_height + TIMER_PAD_Y,
        };

        let mut y = TOP_INSET;
        let lines = specs
            .iter()
            .zip(measured)
            .map(|(spec, (advance, line_height))| {
                let line = LineLayout {
                    text: spec.text.to_string(),
                    font_size: spec.font_size,
                    x: ((width as f32 - advance) / 2.0).floor(),
                    y,
                    advance,
                    line_height,
                };
                y += line_height.ceil() + LINE_GAP as f32;
                line
            })
            .collect();

        Layout {
            size: WidgetSize::new(width, height),
            lines,
        }
    }

    fn metrics(&mut self, measure: &mut dyn TextMeasure, family: &str, size: u32) -> FontMetrics {
        let key = (family.to_string(), size);
        if let Some(metrics) = self.metrics.get(&key) {
            return *metrics;
        }
        match measure.font_metrics(family, size) {
            Ok(metrics) => {
                self.metrics.insert(key, metrics);
                metrics
            }
            Err(e) => {
                // Not cached, so the next layout retries the real font.
                warn!(target: UI_NAMESPACE, "{e}; estimating line height for {family} {size}px");
                FontMetrics {
                    line_height: size as f32 * 1.5,
                }
            }
        }
    }

    fn advance(&mut self, measure: &mut dyn TextMeasure, family: &str, size: u32, text: &str) -> f32 {
        measure.advance(family, size, text).unwrap_or_else(|e| {
            warn!(target: UI_NAMESPACE, "{e}; estimating width of {text:?}");
            // One em per character bounds every glyph of ordinary fonts.
            text.chars().count() as f32 * size as f32
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Latin glyphs advance 0.6em, wide (CJK, emoji) glyphs 1em. Glyph ink
    /// may overhang the advance by up to `OVERHANG` em on each side.
    pub(crate) struct FixedMeasure {
        pub metric_calls: usize,
        pub fail: bool,
    }

    pub(crate) const OVERHANG: f32 = 0.15;

    impl FixedMeasure {
        pub(crate) fn new() -> Self {
            Self {
                metric_calls: 0,
                fail: false,
            }
        }
    }

    fn is_wide(c: char) -> bool {
        matches!(c as u32, 0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60 | 0x2300..=0x23FF | 0x1F300..=0x1FAFF)
    }

    impl TextMeasure for FixedMeasure {
        fn font_metrics(&mut self, family: &str, size: u32) -> Result<FontMetrics, MeasureError> {
            if self.fail {
                return Err(MeasureError::FontUnavailable(family.to_string()));
            }
            self.metric_calls += 1;
            Ok(FontMetrics {
                line_height: size as f32 * 6.0 / 5.0,
            })
        }

        fn advance(&mut self, family: &str, size: u32, text: &str) -> Result<f32, MeasureError> {
            if self.fail {
                return Err(MeasureError::FontUnavailable(family.to_string()));
            }
            Ok(text
                .chars()
                .map(|c| if is_wide(c) { size as f32 } else { size as f32 * 3.0 / 5.0 })
                .sum())
        }
    }

    fn clock(time: &str, date: Option<&str>, week: Option<&str>) -> DisplayContent {
        DisplayContent::Clock {
            time: time.to_string(),
            date: date.map(str::to_string),
            week: week.map(str::to_string),
        }
    }

    fn assert_unclipped(layout: &Layout) {
        for line in &layout.lines {
            let overhang = OVERHANG * line.font_size as f32;
            assert!(line.x - overhang >= 0.0, "{:?} clipped left in {:?}", line.text, layout.size);
            assert!(
                line.x + line.advance + overhang <= layout.size.width as f32,
                "{:?} clipped right in {:?}",
                line.text,
                layout.size
            );
            assert!(line.y >= 0.0);
            assert!(line.y + line.line_height <= layout.size.height as f32);
        }
    }

    #[test]
    fn test_margins_and_secondary_size() {
        assert_eq!(primary_margin(50), 40);
        assert_eq!(primary_margin(100), 80);
        assert_eq!(primary_margin(20), 40);
        assert_eq!(secondary_font_size(80), 36);
        assert_eq!(secondary_font_size(20), 9);
        assert_eq!(secondary_margin(80), 16);
    }

    #[test]
    fn test_clock_size_formula() {
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        let content = clock("12:34", Some("2024-06-01"), Some("Saturday"));
        let layout = engine.compute(&content, "Arial", 100, &mut measure);

        // time: 5 * 60 + 80 = 380; date at 45px: 10 * 27 + 20 = 290
        assert_eq!(layout.size.width, 380 + 20);
        // 120 + (2 + 54) * 2 + 6
        assert_eq!(layout.size.height, 120 + 112 + 6);
        assert_eq!(layout.lines.len(), 3);
        assert_eq!(layout.lines[0].y, 4.0);
        assert_eq!(layout.lines[1].y, 4.0 + 120.0 + 2.0);
        assert_eq!(layout.lines[1].font_size, 45);
    }

    #[test]
    fn test_clock_without_secondary_lines() {
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        let size = engine.compute_size(&clock("09:05", None, None), "Arial", 50, &mut measure);
        // 5 * 30 + 40 + 20, 60 + 6
        assert_eq!(size, WidgetSize::new(210, 66));
    }

    #[test]
    fn test_timer_size_formula() {
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        let content = DisplayContent::Timer {
            text: "00:10".to_string(),
        };
        let layout = engine.compute(&content, "Arial", 80, &mut measure);
        // 5 * 48 + 64 + 20, 96 + 8
        assert_eq!(layout.size, WidgetSize::new(324, 104));
        assert_eq!(content.mode(), DisplayMode::TimerExclusive);
    }

    #[test]
    fn test_no_clipping_for_any_size() {
        let samples = [
            "23:59:59",
            "00:00",
            "2024-12-31",
            "Wednesday",
            "星期三",
            "二〇二四年十二月三十一日",
            "⏳ 999:59",
            "⏱ 100:00:00",
            "Ωμέγα",
        ];
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        for base in 20..=250 {
            engine.invalidate();
            for text in samples {
                let content = clock(text, Some(text), Some(text));
                assert_unclipped(&engine.compute(&content, "Noto Sans", base, &mut measure));
                let timer = DisplayContent::Timer {
                    text: text.to_string(),
                };
                assert_unclipped(&engine.compute(&timer, "Noto Sans", base, &mut measure));
            }
        }
    }

    #[test]
    fn test_metrics_memoized_per_family_and_size() {
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        let content = clock("12:00", Some("2024-01-01"), Some("Monday"));
        engine.compute(&content, "Arial", 80, &mut measure);
        engine.compute(&content, "Arial", 80, &mut measure);
        assert_eq!(measure.metric_calls, 2);
        assert_eq!(engine.cached_metrics(), 2);

        engine.invalidate();
        engine.compute(&content, "Arial", 80, &mut measure);
        assert_eq!(measure.metric_calls, 4);
    }

    #[test]
    fn test_measure_failure_uses_conservative_estimate() {
        let mut engine = LayoutEngine::new();
        let mut measure = FixedMeasure::new();
        measure.fail = true;
        let layout = engine.compute(&clock("12:00", Some("星期三"), None), "Missing", 60, &mut measure);
        assert_unclipped(&layout);
        assert_eq!(engine.cached_metrics(), 0);
    }
}
