use crate::logging::UI_NAMESPACE;
use crate::ui::layout::WidgetSize;
use crate::ui::theme::{color3, ThemeDefinition};
use femtovg::Color;
use log::{debug, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradientError {
    #[error("Theme '{0}' has no colour stops")]
    NoStops(String),

    #[error("Theme '{theme}' stop {index} has invalid position {position}")]
    BadPosition {
        theme: String,
        index: usize,
        position: f32,
    },

    #[error("Cannot build a gradient for a {width}x{height} widget")]
    EmptyWidget { width: u32, height: u32 },

    #[error("Gradient construction panicked: {0}")]
    Panicked(String),
}

/// How the text of one frame is filled.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintStyle<'a> {
    Solid(Color),
    /// Horizontal linear gradient from `start_x` to `end_x` (canvas pixels).
    Gradient {
        start_x: f32,
        end_x: f32,
        stops: &'a [(f32, Color)],
    },
}

type StopBuilder = fn(&ThemeDefinition, WidgetSize) -> Result<Vec<(f32, Color)>, GradientError>;

struct GradientTemplate {
    theme: ThemeDefinition,
    size: WidgetSize,
    stops: Vec<(f32, Color)>,
}

pub struct GradientRenderer {
    cache: Option<GradientTemplate>,
    builder: StopBuilder,
    builds: usize,
}

impl Default for GradientRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientRenderer {
    pub fn new() -> Self {
        Self {
            cache: None,
            builder: repeating_stops,
            builds: 0,
        }
    }

    #[cfg(test)]
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn stylize(
        &mut self,
        theme: &ThemeDefinition,
        custom_color: Color,
        size: WidgetSize,
        animation_offset: u32,
    ) -> PaintStyle<'_> {
        if theme.is_solid() {
            return PaintStyle::Solid(custom_color);
        }
        match self.template(theme, size) {
            Ok(stops) => {
                let width = size.width as f32;
                let offset = (animation_offset % size.width) as f32;
                PaintStyle::Gradient {
                    start_x: offset - width,
                    end_x: offset + width,
                    stops,
                }
            }
            Err(e) => {
                warn!(target: UI_NAMESPACE, "{e}; painting flat colour this frame");
                PaintStyle::Solid(custom_color)
            }
        }
    }

    fn template(
        &mut self,
        theme: &ThemeDefinition,
        size: WidgetSize,
    ) -> Result<&[(f32, Color)], GradientError> {
        let template = match self.cache.take() {
            Some(cached) if cached.theme == *theme && cached.size == size => cached,
            _ => {
                let builder = self.builder;
                let stops = catch_unwind(AssertUnwindSafe(|| builder(theme, size)))
                    .map_err(|payload| GradientError::Panicked(panic_message(payload)))??;
                self.builds += 1;
                debug!(
                    target: UI_NAMESPACE,
                    "Built gradient '{}' for {}x{} (build #{})",
                    theme.name,
                    size.width,
                    size.height,
                    self.builds
                );
                GradientTemplate {
                    theme: *theme,
                    size,
                    stops,
                }
            }
        };
        Ok(&self.cache.insert(template).stops)
    }
}

/// Validates the theme and lays two periods of it end to end. femtovg
/// gradients clamp, so the caller spans them over `[offset - w, offset + w]`.
fn repeating_stops(
    theme: &ThemeDefinition,
    size: WidgetSize,
) -> Result<Vec<(f32, Color)>, GradientError> {
    if size.is_empty() {
        return Err(GradientError::EmptyWidget {
            width: size.width,
            height: size.height,
        });
    }
    let first = theme
        .stops
        .first()
        .ok_or_else(|| GradientError::NoStops(theme.name.to_string()))?;

    let mut previous = 0.0;
    for (index, stop) in theme.stops.iter().enumerate() {
        let position = stop.position;
        let valid = position.is_finite()
            && (0.0..=1.0).contains(&position)
            && position >= previous
            && (index > 0 || position == 0.0);
        if !valid {
            return Err(GradientError::BadPosition {
                theme: theme.name.to_string(),
                index,
                position,
            });
        }
        previous = position;
    }

    let first_color = color3(first.rgb);
    let mut period: Vec<(f32, Color)> = theme
        .stops
        .iter()
        .map(|stop| (stop.position, color3(stop.rgb)))
        .collect();
    // Seamless tiling: the period must end on the colour it starts with.
    if let Some(last) = period.last_mut() {
        last.1 = first_color;
    }
    if previous < 1.0 {
        period.push((1.0, first_color));
    }

    let mut stops = Vec::with_capacity(period.len() * 2);
    stops.extend(period.iter().map(|(pos, color)| (pos * 0.5, *color)));
    stops.extend(period.iter().map(|(pos, color)| (0.5 + pos * 0.5, *color)));
    Ok(stops)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::theme::{GradientStop, ThemeCatalog};

    fn size(width: u32, height: u32) -> WidgetSize {
        WidgetSize::new(width, height)
    }

    fn white() -> Color {
        Color::rgb(255, 255, 255)
    }

    #[test]
    fn test_solid_theme_uses_custom_color() {
        let mut renderer = GradientRenderer::new();
        let theme = ThemeCatalog.get("Solid");
        let custom = Color::rgb(10, 20, 30);
        assert_eq!(
            renderer.stylize(theme, custom, size(200, 80), 17),
            PaintStyle::Solid(custom)
        );
        assert_eq!(renderer.builds(), 0);
    }

    #[test]
    fn test_gradient_window_follows_offset() {
        let mut renderer = GradientRenderer::new();
        let theme = ThemeCatalog.get("Rainbow");

        let (start, end, first, last, len) = match renderer.stylize(theme, white(), size(300, 90), 40) {
            PaintStyle::Gradient {
                start_x,
                end_x,
                stops,
            } => (start_x, end_x, stops[0], stops[stops.len() - 1], stops.len()),
            other => panic!("expected gradient, got {other:?}"),
        };
        assert_eq!((start, end), (-260.0, 340.0));
        assert_eq!(first, (0.0, Color::rgb(255, 0, 0)));
        assert_eq!(last, (1.0, Color::rgb(255, 0, 0)));
        assert_eq!(len, theme.stops.len() * 2);

        match renderer.stylize(theme, white(), size(300, 90), 342) {
            PaintStyle::Gradient { start_x, .. } => assert_eq!(start_x, -258.0),
            other => panic!("expected gradient, got {other:?}"),
        }
        assert_eq!(renderer.builds(), 1);
    }

    #[test]
    fn test_cache_rebuilt_on_size_or_theme_change() {
        let mut renderer = GradientRenderer::new();
        let catalog = ThemeCatalog;
        renderer.stylize(catalog.get("Aurora"), white(), size(300, 90), 0);
        renderer.stylize(catalog.get("Aurora"), white(), size(300, 90), 2);
        assert_eq!(renderer.builds(), 1);

        renderer.stylize(catalog.get("Aurora"), white(), size(320, 90), 4);
        assert_eq!(renderer.builds(), 2);

        renderer.stylize(catalog.get("Candy"), white(), size(320, 90), 4);
        assert_eq!(renderer.builds(), 3);

        renderer.invalidate();
        renderer.stylize(catalog.get("Candy"), white(), size(320, 90), 4);
        assert_eq!(renderer.builds(), 4);
    }

    #[test]
    fn test_terminal_stop_forced_to_first_color() {
        static STOPS: [GradientStop; 3] = [
            GradientStop { position: 0.0, rgb: [0, 0, 255] },
            GradientStop { position: 0.5, rgb: [0, 255, 0] },
            GradientStop { position: 0.8, rgb: [255, 0, 0] },
        ];
        let theme = ThemeDefinition {
            name: "Seamed",
            stops: &STOPS,
        };
        let stops = repeating_stops(&theme, size(100, 40)).unwrap();
        let blue = Color::rgb(0, 0, 255);
        assert_eq!(stops[2], (0.4, blue));
        assert_eq!(stops[3], (0.5, blue));
        assert_eq!(stops.last(), Some(&(1.0, blue)));
    }

    #[test]
    fn test_invalid_stops_fall_back_to_flat_color() {
        static NAN: [GradientStop; 2] = [
            GradientStop { position: 0.0, rgb: [1, 1, 1] },
            GradientStop { position: f32::NAN, rgb: [1, 1, 1] },
        ];
        static DESCENDING: [GradientStop; 3] = [
            GradientStop { position: 0.0, rgb: [1, 1, 1] },
            GradientStop { position: 0.7, rgb: [2, 2, 2] },
            GradientStop { position: 0.3, rgb: [1, 1, 1] },
        ];
        static LATE_START: [GradientStop; 2] = [
            GradientStop { position: 0.2, rgb: [1, 1, 1] },
            GradientStop { position: 1.0, rgb: [1, 1, 1] },
        ];
        let custom = Color::rgb(9, 9, 9);
        let mut renderer = GradientRenderer::new();
        for stops in [&NAN[..], &DESCENDING[..], &LATE_START[..]] {
            let theme = ThemeDefinition { name: "Broken", stops };
            assert_eq!(
                renderer.stylize(&theme, custom, size(100, 40), 0),
                PaintStyle::Solid(custom)
            );
        }
        assert!(matches!(
            repeating_stops(&ThemeDefinition { name: "Broken", stops: &DESCENDING }, size(100, 40)),
            Err(GradientError::BadPosition { index: 2, .. })
        ));
    }

    #[test]
    fn test_zero_size_widget_falls_back() {
        let mut renderer = GradientRenderer::new();
        let custom = Color::rgb(1, 2, 3);
        assert_eq!(
            renderer.stylize(ThemeCatalog.get("Blaze"), custom, size(0, 0), 0),
            PaintStyle::Solid(custom)
        );
    }

    #[test]
    fn test_panic_in_construction_is_contained() {
        fn exploding(_: &ThemeDefinition, _: WidgetSize) -> Result<Vec<(f32, Color)>, GradientError> {
            panic!("out of gradient memory");
        }
        let mut renderer = GradientRenderer::new();
        renderer.builder = exploding;
        let custom = Color::rgb(4, 5, 6);
        let theme = ThemeCatalog.get("Sunset");

        assert_eq!(
            renderer.stylize(theme, custom, size(200, 60), 0),
            PaintStyle::Solid(custom)
        );

        renderer.builder = repeating_stops;
        assert!(matches!(
            renderer.stylize(theme, custom, size(200, 60), 0),
            PaintStyle::Gradient { .. }
        ));
    }
}
