use crate::logging::UI_NAMESPACE;
use crate::ui::layout::{FontMetrics, MeasureError, TextMeasure};
use femtovg::{renderer::Renderer, Canvas, FontId, Paint};
use fontdb::{Database, Family, Query, ID};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Loads font faces from the system font database into a femtovg canvas.
///
/// Every resolved family carries the sans-serif fallback face after its own,
/// so glyphs missing from the chosen family still render.
pub struct FontBook {
    db: Database,
    families: HashMap<String, Vec<FontId>>,
    fallback: Option<Option<FontId>>,
}

impl FontBook {
    pub fn new() -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        info!(target: UI_NAMESPACE, "Font database loaded with {} faces", db.len());
        Self::with_database(db)
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            families: HashMap::new(),
            fallback: None,
        }
    }

    /// Font ids to paint `family` with, loading the face on first use.
    pub fn resolve<R: Renderer>(
        &mut self,
        canvas: &mut Canvas<R>,
        family: &str,
    ) -> Result<Vec<FontId>, MeasureError> {
        let key = family.to_lowercase();
        if let Some(ids) = self.families.get(&key) {
            return Ok(ids.clone());
        }

        let mut ids = Vec::with_capacity(2);
        match self.load_face(canvas, &[Family::Name(family)]) {
            Some(id) => ids.push(id),
            None => warn!(
                target: UI_NAMESPACE,
                "Font family '{}' not found, using fallback face",
                family
            ),
        }
        if let Some(fallback) = self.fallback(canvas) {
            if !ids.contains(&fallback) {
                ids.push(fallback);
            }
        }
        if ids.is_empty() {
            return Err(MeasureError::FontUnavailable(family.to_string()));
        }

        self.families.insert(key, ids.clone());
        Ok(ids)
    }

    fn fallback<R: Renderer>(&mut self, canvas: &mut Canvas<R>) -> Option<FontId> {
        if let Some(loaded) = self.fallback {
            return loaded;
        }
        let loaded = self.load_face(canvas, &[Family::SansSerif]);
        if loaded.is_none() {
            warn!(target: UI_NAMESPACE, "No sans-serif fallback face available");
        }
        self.fallback = Some(loaded);
        loaded
    }

    /// Best match for `families` that the canvas can load. femtovg only
    /// parses the first face of a font collection, so a match at a later
    /// index is swapped for a first face of the same family, if any.
    fn loadable_face(&self, families: &[Family]) -> Option<ID> {
        let query = Query {
            families,
            ..Query::default()
        };
        let id = self.db.query(&query)?;
        let face = self.db.face(id)?;
        if face.index == 0 {
            return Some(id);
        }
        let (family, _) = face.families.first()?;
        let sibling = self
            .db
            .faces()
            .find(|other| other.index == 0 && other.families.iter().any(|(name, _)| name == family));
        match sibling {
            Some(other) => {
                debug!(
                    target: UI_NAMESPACE,
                    "'{}' matched collection face #{}, using '{}' instead",
                    family,
                    face.index,
                    other.post_script_name
                );
                Some(other.id)
            }
            None => {
                warn!(
                    target: UI_NAMESPACE,
                    "'{}' is only available as collection face #{}, skipping",
                    family,
                    face.index
                );
                None
            }
        }
    }

    fn load_face<R: Renderer>(&self, canvas: &mut Canvas<R>, families: &[Family]) -> Option<FontId> {
        let id = self.loadable_face(families)?;
        let loaded = self.db.with_face_data(id, |data, _| canvas.add_font_mem(data))?;
        match loaded {
            Ok(font_id) => {
                debug!(target: UI_NAMESPACE, "Loaded font face {:?}", families);
                Some(font_id)
            }
            Err(e) => {
                warn!(target: UI_NAMESPACE, "Canvas rejected font face {:?}: {:?}", families, e);
                None
            }
        }
    }
}

/// Sets up `paint` for text drawn with its top edge at the given y.
pub fn text_paint(mut paint: Paint, fonts: &[FontId], size: u32) -> Paint {
    paint.set_font(fonts);
    paint.set_font_size(size as f32);
    paint.set_text_baseline(femtovg::Baseline::Top);
    paint.set_text_align(femtovg::Align::Left);
    paint
}

/// [`TextMeasure`] backed by the live canvas and its loaded fonts.
pub struct CanvasMeasure<'a, R: Renderer> {
    pub canvas: &'a mut Canvas<R>,
    pub fonts: &'a mut FontBook,
}

impl<R: Renderer> TextMeasure for CanvasMeasure<'_, R> {
    fn font_metrics(&mut self, family: &str, size: u32) -> Result<FontMetrics, MeasureError> {
        let ids = self.fonts.resolve(self.canvas, family)?;
        let metrics = self
            .canvas
            .measure_font(&text_paint(Paint::default(), &ids, size))
            .map_err(|e| MeasureError::Canvas(format!("{e:?}")))?;
        Ok(FontMetrics {
            line_height: metrics.height(),
        })
    }

    fn advance(&mut self, family: &str, size: u32, text: &str) -> Result<f32, MeasureError> {
        let ids = self.fonts.resolve(self.canvas, family)?;
        let metrics = self
            .canvas
            .measure_text(0.0, 0.0, text, &text_paint(Paint::default(), &ids, size))
            .map_err(|e| MeasureError::Canvas(format!("{e:?}")))?;
        Ok(metrics.width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fontdb::{FaceInfo, Language, Source, Stretch, Style, Weight};
    use std::sync::Arc;

    fn face(db: &mut Database, family: &str, index: u32, weight: Weight) -> ID {
        db.push_face_info(FaceInfo {
            id: ID::dummy(),
            source: Source::Binary(Arc::new(Vec::<u8>::new())),
            index,
            families: vec![(family.to_string(), Language::English_UnitedStates)],
            post_script_name: format!("{family}-{index}"),
            style: Style::Normal,
            weight,
            stretch: Stretch::Normal,
            monospaced: false,
        })
    }

    #[test]
    fn test_first_face_is_used_directly() {
        let mut db = Database::new();
        let regular = face(&mut db, "Plain Sans", 0, Weight::NORMAL);
        let fonts = FontBook::with_database(db);
        assert_eq!(fonts.loadable_face(&[Family::Name("Plain Sans")]), Some(regular));
    }

    #[test]
    fn test_collection_face_swapped_for_first_face() {
        let mut db = Database::new();
        face(&mut db, "Collection Sans", 1, Weight::NORMAL);
        let bold = face(&mut db, "Collection Sans", 0, Weight::BOLD);
        let fonts = FontBook::with_database(db);
        assert_eq!(fonts.loadable_face(&[Family::Name("Collection Sans")]), Some(bold));
    }

    #[test]
    fn test_collection_only_family_is_skipped() {
        let mut db = Database::new();
        face(&mut db, "Collection Sans", 2, Weight::NORMAL);
        let fonts = FontBook::with_database(db);
        assert_eq!(fonts.loadable_face(&[Family::Name("Collection Sans")]), None);
        assert_eq!(fonts.loadable_face(&[Family::Name("Missing Sans")]), None);
    }
}
