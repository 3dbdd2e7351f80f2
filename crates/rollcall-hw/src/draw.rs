//! Preview annotation: bounding boxes and name labels drawn straight
//! into a packed RGB24 buffer. A 5x7 bitmap font keeps the preview path
//! free of any font or GUI dependency.

pub const GREEN: [u8; 3] = [0, 200, 0];
pub const RED: [u8; 3] = [220, 40, 40];

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
/// Pixel multiplier applied to the base font.
const LABEL_SCALE: u32 = 2;

/// Draw a rectangle outline, clamped to the frame bounds.
pub fn draw_box(
    rgb: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    w: u32,
    h: u32,
    color: [u8; 3],
) {
    let thickness = 2i32;
    let (x1, y1) = (x + w as i32, y + h as i32);

    for t in 0..thickness {
        for px in x..=x1 {
            put_pixel(rgb, width, height, px, y + t, color);
            put_pixel(rgb, width, height, px, y1 - t, color);
        }
        for py in y..=y1 {
            put_pixel(rgb, width, height, x + t, py, color);
            put_pixel(rgb, width, height, x1 - t, py, color);
        }
    }
}

/// Draw `text` uppercased at (x, y). Characters outside the font render
/// as `?`; pixels outside the frame are dropped.
pub fn draw_label(rgb: &mut [u8], width: u32, height: u32, x: i32, y: i32, text: &str, color: [u8; 3]) {
    let advance = (GLYPH_W + 1) * LABEL_SCALE;
    for (i, ch) in text.chars().enumerate() {
        let glyph = glyph(ch.to_ascii_uppercase());
        let gx = x + (i as u32 * advance) as i32;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..LABEL_SCALE {
                    for sx in 0..LABEL_SCALE {
                        put_pixel(
                            rgb,
                            width,
                            height,
                            gx + (col * LABEL_SCALE + sx) as i32,
                            y + (row as u32 * LABEL_SCALE + sy) as i32,
                            color,
                        );
                    }
                }
            }
        }
    }
}

/// Pixel height of a rendered label, for placing text above a box.
pub fn label_height() -> u32 {
    GLYPH_H * LABEL_SCALE
}

fn put_pixel(rgb: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    let off = ((y as u32 * width + x as u32) * 3) as usize;
    rgb[off..off + 3].copy_from_slice(&color);
}

/// 5x7 glyph rows, bit 4 is the leftmost column.
fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0E],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> Vec<u8> {
        vec![0u8; (w * h * 3) as usize]
    }

    fn pixel(rgb: &[u8], w: u32, x: u32, y: u32) -> [u8; 3] {
        let off = ((y * w + x) * 3) as usize;
        [rgb[off], rgb[off + 1], rgb[off + 2]]
    }

    #[test]
    fn test_draw_box_paints_corners() {
        let mut rgb = blank(64, 64);
        draw_box(&mut rgb, 64, 64, 10, 10, 20, 20, GREEN);
        assert_eq!(pixel(&rgb, 64, 10, 10), GREEN);
        assert_eq!(pixel(&rgb, 64, 30, 30), GREEN);
        // Interior stays untouched.
        assert_eq!(pixel(&rgb, 64, 20, 20), [0, 0, 0]);
    }

    #[test]
    fn test_draw_box_clips_at_edges() {
        let mut rgb = blank(16, 16);
        draw_box(&mut rgb, 16, 16, -5, -5, 40, 40, RED);
        // Must not panic; in-frame border pixels are painted.
        assert_eq!(pixel(&rgb, 16, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_draw_label_paints_some_pixels() {
        let mut rgb = blank(64, 32);
        draw_label(&mut rgb, 64, 32, 2, 2, "A", GREEN);
        let painted = rgb.chunks_exact(3).filter(|p| p == &GREEN.as_slice()).count();
        assert!(painted > 0);
    }

    #[test]
    fn test_draw_label_lowercase_matches_uppercase() {
        let mut upper = blank(64, 32);
        let mut lower = blank(64, 32);
        draw_label(&mut upper, 64, 32, 2, 2, "ABC", GREEN);
        draw_label(&mut lower, 64, 32, 2, 2, "abc", GREEN);
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_draw_label_off_frame_is_safe() {
        let mut rgb = blank(8, 8);
        draw_label(&mut rgb, 8, 8, -100, -100, "OUT OF FRAME", RED);
        draw_label(&mut rgb, 8, 8, 100, 100, "ALSO OUT", RED);
    }
}
