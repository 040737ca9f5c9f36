use femtovg::Color;

/// A colour stop of a theme gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position along the gradient, 0.0..=1.0.
    pub position: f32,
    pub rgb: [u8; 3],
}

const fn stop(position: f32, r: u8, g: u8, b: u8) -> GradientStop {
    GradientStop {
        position,
        rgb: [r, g, b],
    }
}

/// A named gradient, looked up from the [`ThemeCatalog`].
///
/// A theme with a single stop paints flat text in the user's custom colour.
/// Multi-stop themes end on their first colour so that the gradient can
/// repeat horizontally without a seam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeDefinition {
    pub name: &'static str,
    pub stops: &'static [GradientStop],
}

impl ThemeDefinition {
    pub fn is_solid(&self) -> bool {
        self.stops.len() < 2
    }
}

pub const SOLID_THEME: &str = "Solid";

const THEMES: &[ThemeDefinition] = &[
    ThemeDefinition {
        name: SOLID_THEME,
        stops: &[stop(0.0, 255, 255, 255)],
    },
    ThemeDefinition {
        name: "Rainbow",
        stops: &[
            stop(0.0, 255, 0, 0),
            stop(0.16, 255, 165, 0),
            stop(0.33, 255, 255, 0),
            stop(0.5, 0, 255, 0),
            stop(0.66, 0, 255, 255),
            stop(0.83, 0, 0, 255),
            stop(1.0, 255, 0, 0),
        ],
    },
    ThemeDefinition {
        name: "Sunset",
        stops: &[
            stop(0.0, 255, 69, 0),
            stop(0.33, 255, 140, 0),
            stop(0.66, 255, 215, 0),
            stop(1.0, 255, 69, 0),
        ],
    },
    ThemeDefinition {
        name: "Monochrome",
        stops: &[
            stop(0.0, 255, 255, 255),
            stop(0.33, 200, 200, 200),
            stop(0.66, 100, 100, 100),
            stop(1.0, 255, 255, 255),
        ],
    },
    ThemeDefinition {
        name: "Purple Mood",
        stops: &[
            stop(0.0, 230, 230, 250),
            stop(0.33, 147, 112, 219),
            stop(0.66, 138, 43, 226),
            stop(1.0, 230, 230, 250),
        ],
    },
    ThemeDefinition {
        name: "Red Storm",
        stops: &[
            stop(0.0, 255, 0, 0),
            stop(0.33, 200, 0, 0),
            stop(0.66, 150, 0, 0),
            stop(1.0, 255, 0, 0),
        ],
    },
    ThemeDefinition {
        name: "Ocean Blue",
        stops: &[
            stop(0.0, 0, 191, 255),
            stop(0.33, 30, 144, 255),
            stop(0.66, 70, 130, 180),
            stop(1.0, 0, 191, 255),
        ],
    },
    ThemeDefinition {
        name: "Forest Green",
        stops: &[
            stop(0.0, 173, 255, 47),
            stop(0.33, 124, 252, 0),
            stop(0.66, 50, 205, 50),
            stop(1.0, 173, 255, 47),
        ],
    },
    ThemeDefinition {
        name: "Aurora",
        stops: &[
            stop(0.0, 0, 255, 127),
            stop(0.33, 0, 255, 255),
            stop(0.66, 0, 191, 255),
            stop(1.0, 0, 255, 127),
        ],
    },
    ThemeDefinition {
        name: "Candy",
        stops: &[
            stop(0.0, 255, 182, 193),
            stop(0.33, 255, 192, 203),
            stop(0.66, 255, 218, 185),
            stop(1.0, 255, 182, 193),
        ],
    },
    ThemeDefinition {
        name: "Blaze",
        stops: &[
            stop(0.0, 255, 99, 71),
            stop(0.33, 255, 69, 0),
            stop(0.66, 255, 140, 0),
            stop(1.0, 255, 99, 71),
        ],
    },
];

/// The fixed table of gradient themes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThemeCatalog;

impl ThemeCatalog {
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        THEMES.iter().map(|t| t.name)
    }

    pub fn find(&self, name: &str) -> Option<&'static ThemeDefinition> {
        THEMES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Looks up `name`, falling back to the solid theme.
    pub fn get(&self, name: &str) -> &'static ThemeDefinition {
        self.find(name).unwrap_or(&THEMES[0])
    }
}

// Helpers to convert [u8; 3] to femtovg::Color
pub fn color3(rgb: [u8; 3]) -> Color {
    Color::rgb(rgb[0], rgb[1], rgb[2])
}

pub fn rgb_color(rgb: crate::settings::Rgb) -> Color {
    Color::rgb(rgb.r, rgb.g, rgb.b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_gradient_tiles_without_seam() {
        let catalog = ThemeCatalog;
        for name in catalog.names() {
            let theme = catalog.get(name);
            assert_eq!(theme.stops[0].position, 0.0, "{name}");
            if theme.stops.len() >= 2 {
                assert_eq!(theme.stops.last().unwrap().rgb, theme.stops[0].rgb, "{name}");
            }
            assert!(
                theme.stops.windows(2).all(|w| w[0].position <= w[1].position),
                "{name} stops out of order"
            );
        }
    }

    #[test]
    fn test_unknown_theme_falls_back_to_solid() {
        let catalog = ThemeCatalog;
        assert_eq!(catalog.get("No Such Theme").name, SOLID_THEME);
        assert!(catalog.get("No Such Theme").is_solid());
        assert_eq!(catalog.get("ocean blue").name, "Ocean Blue");
        assert!(!catalog.get("Rainbow").is_solid());
    }
}
