/// Numbered grid overlay.
///
/// Draws the cell grid onto the captured frame so that a VLM can name a
/// click target by reading the number printed inside the cell.
///
/// Numbering convention:
///   - Cells: 1, 2, 3 … columns×rows
///   - Order: left → right, then top → bottom
use image::RgbaImage;

use crate::perception::grid::GridMapping;

// ── Minimal 5×5 bitmap font ───────────────────────────────────────────────────
// Each glyph: 5 rows, each row is a u8 where bit4=leftmost pixel, bit0=rightmost.
const DIGITS_5X5: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

const LINE_RGBA: (u8, u8, u8, u8) = (255, 255, 255, 60);
const TEXT_RGBA: (u8, u8, u8, u8) = (255, 255, 255, 190);
const SHADOW_RGBA: (u8, u8, u8, u8) = (0, 0, 0, 120);

fn digit_glyph(c: char) -> Option<&'static [u8; 5]> {
    let d = c.to_digit(10)?;
    DIGITS_5X5.get(d as usize)
}

/// Draw a single digit at pixel position (px, py) with the given pixel scale.
fn draw_glyph(
    canvas: &mut RgbaImage,
    c: char,
    px: u32,
    py: u32,
    scale: u32,
    (r, g, b, a): (u8, u8, u8, u8),
) {
    let Some(glyph) = digit_glyph(c) else { return };
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for col in 0..5u32 {
            if (bits >> (4 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + col * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        blend_pixel(canvas.get_pixel_mut(x, y), r, g, b, a);
                    }
                }
            }
        }
    }
}

fn label_width(label: &str, scale: u32) -> u32 {
    let n = label.chars().count() as u32;
    n * 5 * scale + n.saturating_sub(1)
}

/// Draw a label centred in the box at (x, y, w, h), with a drop shadow.
fn draw_label_centered(canvas: &mut RgbaImage, label: &str, x: u32, y: u32, w: u32, h: u32, scale: u32) {
    let text_w = label_width(label, scale);
    let text_h = 5 * scale;
    let lx = x + w.saturating_sub(text_w) / 2;
    let ly = y + h.saturating_sub(text_h) / 2;
    let step = 5 * scale + 1;
    for (i, c) in label.chars().enumerate() {
        let gx = lx + i as u32 * step;
        draw_glyph(canvas, c, gx + 1, ly + 1, scale, SHADOW_RGBA);
        draw_glyph(canvas, c, gx, ly, scale, TEXT_RGBA);
    }
}

/// Overlay the numbered grid described by `mapping` onto a copy of `frame`.
///
/// `frame` must already be cropped to the mapping's region, so that pixel
/// (0, 0) is the top-left corner of cell 1.
pub fn draw_numbered_grid(frame: &RgbaImage, mapping: &GridMapping) -> RgbaImage {
    let mut canvas = frame.clone();
    let (w, h) = canvas.dimensions();
    let (cell_w, cell_h) = mapping.cell_size();
    let (lr, lg, lb, la) = LINE_RGBA;

    for col in 1..mapping.columns() {
        let x = col * cell_w;
        if x >= w {
            break;
        }
        for y in 0..h {
            blend_pixel(canvas.get_pixel_mut(x, y), lr, lg, lb, la);
        }
    }
    for row in 1..mapping.rows() {
        let y = row * cell_h;
        if y >= h {
            break;
        }
        for x in 0..w {
            blend_pixel(canvas.get_pixel_mut(x, y), lr, lg, lb, la);
        }
    }

    // scale=2 when the cell can hold three 10 px digits.
    let scale: u32 = if cell_w >= 40 && cell_h >= 20 { 2 } else { 1 };
    for row in 0..mapping.rows() {
        for col in 0..mapping.columns() {
            let number = row * mapping.columns() + col + 1;
            let x = col * cell_w;
            let y = row * cell_h;
            if x < w && y < h {
                draw_label_centered(&mut canvas, &number.to_string(), x, y, cell_w, cell_h, scale);
            }
        }
    }

    canvas
}

fn blend_pixel(pixel: &mut image::Rgba<u8>, r: u8, g: u8, b: u8, a: u8) {
    let alpha = a as f32 / 255.0;
    pixel[0] = (pixel[0] as f32 * (1.0 - alpha) + r as f32 * alpha).round() as u8;
    pixel[1] = (pixel[1] as f32 * (1.0 - alpha) + g as f32 * alpha).round() as u8;
    pixel[2] = (pixel[2] as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8;
}

/// Prompt paragraph that explains how to address the grid.
pub fn build_grid_prompt(mapping: &GridMapping) -> String {
    let region = mapping.region();
    format!(
        "The image is {w}x{h} pixels and has a {cols}x{rows} grid overlay with numbered cells \
         (ignore the grid and numbers when describing the scene). \
         Cells are numbered from 1 (top-left) to {last} (bottom-right), left to right, then top to bottom. \
         To click somewhere, find the cell whose number is printed on or nearest the target and use \
         {{\"cell\": <number>}}. If you need finer precision use image pixel coordinates \
         {{\"x\": <0..{maxx}>, \"y\": <0..{maxy}>}} measured from the image's top-left corner.",
        w = region.width,
        h = region.height,
        cols = mapping.columns(),
        rows = mapping.rows(),
        last = mapping.cell_count(),
        maxx = region.width.saturating_sub(1),
        maxy = region.height.saturating_sub(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{CropMargins, WindowRect};

    fn mapping() -> GridMapping {
        GridMapping::new(WindowRect::new(0, 0, 160, 120), CropMargins::default(), 4, 3).unwrap()
    }

    #[test]
    fn test_overlay_keeps_dimensions_and_leaves_source_untouched() {
        let frame = RgbaImage::from_pixel(160, 120, image::Rgba([0, 0, 0, 255]));
        let annotated = draw_numbered_grid(&frame, &mapping());
        assert_eq!(annotated.dimensions(), (160, 120));
        assert_eq!(*frame.get_pixel(40, 10), image::Rgba([0, 0, 0, 255]));
        // Vertical line at the first column boundary is lightened.
        assert!(annotated.get_pixel(40, 10)[0] > 0);
    }

    #[test]
    fn test_labels_drawn_inside_cells() {
        let frame = RgbaImage::from_pixel(160, 120, image::Rgba([0, 0, 0, 255]));
        let annotated = draw_numbered_grid(&frame, &mapping());
        // Some pixel inside cell 1 (excluding its lines) must carry the label.
        let lit = (1..40u32)
            .flat_map(|x| (1..40u32).map(move |y| (x, y)))
            .any(|(x, y)| annotated.get_pixel(x, y)[0] > 100);
        assert!(lit);
    }

    #[test]
    fn test_grid_prompt_mentions_last_cell() {
        let prompt = build_grid_prompt(&mapping());
        assert!(prompt.contains("4x3 grid"));
        assert!(prompt.contains("to 12 (bottom-right)"));
    }
}
