use crate::logging::UI_NAMESPACE;
use crate::ui::fonts::{text_paint, FontBook};
use crate::ui::gradient::PaintStyle;
use crate::ui::surface::Frame;
use femtovg::{renderer::Renderer, Canvas, Color, Paint};
use log::warn;

fn fill_paint(style: &PaintStyle<'_>) -> Paint {
    match style {
        PaintStyle::Solid(color) => Paint::color(*color),
        PaintStyle::Gradient {
            start_x,
            end_x,
            stops,
        } => Paint::linear_gradient_stops(*start_x, 0.0, *end_x, 0.0, stops.iter().copied()),
    }
}

/// Draws one frame onto a transparent canvas and flushes it.
pub fn render_frame<R: Renderer>(canvas: &mut Canvas<R>, fonts: &mut FontBook, frame: &Frame<'_>) {
    canvas.clear_rect(
        0,
        0,
        canvas.width() as u32,
        canvas.height() as u32,
        Color::rgba(0, 0, 0, 0),
    );

    let font_ids = match fonts.resolve(canvas, frame.font_family) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(target: UI_NAMESPACE, "Skipping frame: {}", e);
            canvas.flush();
            return;
        }
    };

    canvas.save();
    canvas.set_global_alpha(f32::from(frame.opacity) / 255.0);
    for line in &frame.layout.lines {
        let paint = text_paint(fill_paint(&frame.paint), &font_ids, line.font_size);
        if let Err(e) = canvas.fill_text(line.x, line.y, &line.text, &paint) {
            warn!(target: UI_NAMESPACE, "Text paint failed ({:?}), retrying flat", e);
            let flat = text_paint(Paint::color(frame.custom_color), &font_ids, line.font_size);
            if let Err(e) = canvas.fill_text(line.x, line.y, &line.text, &flat) {
                warn!(target: UI_NAMESPACE, "Dropped line '{}': {:?}", line.text, e);
            }
        }
    }
    canvas.restore();
    canvas.flush();
}
