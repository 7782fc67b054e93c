use crate::pipeline::types::Detection;
use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const OUTLINE_THICKNESS: i32 = 3;
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// Ultralytics-style palette, cycled by class id
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [255, 55, 199],
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draws detections onto annotated copies. Labels need a font; without one only outlines are drawn.
#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TrueType/OpenType font used for `<class> <confidence>` labels.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read label font {:?}", path))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| anyhow::anyhow!("Invalid label font {:?}: {}", path, e))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_labels(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
        draw_detections(image, detections);
        if let Some(font) = &self.font {
            for det in detections {
                draw_label(image, det, font);
            }
        }
    }
}

/// Label text for one detection, e.g. `bottle 0.87`.
pub fn label_text(det: &Detection) -> String {
    format!("{} {:.2}", det.label(), det.confidence)
}

// Filled tab above the box (inside it when the box touches the top edge)
fn draw_label(image: &mut RgbImage, det: &Detection, font: &FontVec) {
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);
    if img_w == 0 || img_h == 0 {
        return;
    }

    let text = label_text(det);
    let scale = PxScale::from(LABEL_FONT_SIZE);
    let (text_w, text_h) = text_size(scale, font, &text);
    let tab_w = text_w as i32 + 2 * LABEL_PADDING;
    let tab_h = text_h as i32 + 2 * LABEL_PADDING;

    let x = (det.bbox.x.floor() as i32).clamp(0, img_w - 1);
    let top = det.bbox.y.floor() as i32;
    let y = if top - tab_h >= 0 { top - tab_h } else { top.clamp(0, img_h - 1) };

    let tab_w = tab_w.min(img_w - x);
    let tab_h = tab_h.min(img_h - y);
    if tab_w <= 0 || tab_h <= 0 {
        return;
    }

    let rect = Rect::at(x, y).of_size(tab_w as u32, tab_h as u32);
    draw_filled_rect_mut(image, rect, class_color(det.class_id));
    draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x + LABEL_PADDING,
        y + LABEL_PADDING,
        scale,
        font,
        &text,
    );
}

/// Draw every detection's outline onto `image` in place.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);
    if img_w == 0 || img_h == 0 {
        return;
    }

    for det in detections {
        let x_min = (det.bbox.x.floor() as i32).clamp(0, img_w - 1);
        let y_min = (det.bbox.y.floor() as i32).clamp(0, img_h - 1);
        let x_max = ((det.bbox.x + det.bbox.w).ceil() as i32).clamp(0, img_w - 1);
        let y_max = ((det.bbox.y + det.bbox.h).ceil() as i32).clamp(0, img_h - 1);

        let color = class_color(det.class_id);
        for inset in 0..OUTLINE_THICKNESS {
            let w = x_max - x_min - 2 * inset;
            let h = y_max - y_min - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x_min + inset, y_min + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BBox;

    #[test]
    fn outlines_box_edges_only() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let det = Detection {
            bbox: BBox {
                x: 5.0,
                y: 5.0,
                w: 10.0,
                h: 10.0,
            },
            confidence: 0.8,
            class_id: 0,
            class_name: Some("box".to_string()),
        };
        draw_detections(&mut image, &[det]);

        assert_eq!(*image.get_pixel(5, 5), class_color(0));
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn labels_name_class_and_confidence() {
        let det = Detection {
            bbox: BBox {
                x: 0.0,
                y: 0.0,
                w: 1.0,
                h: 1.0,
            },
            confidence: 0.873,
            class_id: 39,
            class_name: Some("bottle".to_string()),
        };
        assert_eq!(label_text(&det), "bottle 0.87");
    }

    #[test]
    fn annotator_without_font_draws_outlines_only() {
        let annotator = Annotator::new();
        assert!(!annotator.has_labels());

        let mut image = RgbImage::from_pixel(30, 30, Rgb([0, 0, 0]));
        let det = Detection {
            bbox: BBox {
                x: 10.0,
                y: 10.0,
                w: 10.0,
                h: 10.0,
            },
            confidence: 0.9,
            class_id: 1,
            class_name: None,
        };
        annotator.annotate(&mut image, &[det]);
        assert_eq!(*image.get_pixel(10, 10), class_color(1));
        // no label tab above the box
        assert_eq!(*image.get_pixel(12, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn invalid_font_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(Annotator::with_font_file(&path).is_err());
        assert!(Annotator::with_font_file(&dir.path().join("missing.ttf")).is_err());
    }

    #[test]
    fn out_of_bounds_boxes_are_clamped() {
        let mut image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let det = Detection {
            bbox: BBox {
                x: -10.0,
                y: -10.0,
                w: 100.0,
                h: 100.0,
            },
            confidence: 0.5,
            class_id: 3,
            class_name: None,
        };
        draw_detections(&mut image, &[det]);
        assert_eq!(*image.get_pixel(0, 0), class_color(3));
    }
}
