//! Minimal RGB raster helpers used by the pipeline and the ONNX stages.
//!
//! Buffers are packed RGB24 (`width * height * 3` bytes, row-major).

/// Bilinearly sample one channel at a fractional position, clamped to
/// the image bounds.
pub fn sample_bilinear(rgb: &[u8], width: u32, height: u32, x: f32, y: f32, channel: usize) -> f32 {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return 0.0;
    }

    let x0 = (x.floor() as i64).clamp(0, w as i64 - 1) as usize;
    let y0 = (y.floor() as i64).clamp(0, h as i64 - 1) as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (x - x.floor()).clamp(0.0, 1.0);
    let fy = (y - y.floor()).clamp(0.0, 1.0);

    let at = |px: usize, py: usize| rgb[(py * w + px) * 3 + channel] as f32;

    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bot = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bot * fy
}

/// Bilinear resize of a packed RGB buffer.
pub fn resize_rgb(
    rgb: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
) -> Vec<u8> {
    let mut out = vec![0u8; (new_width * new_height * 3) as usize];
    if new_width == 0 || new_height == 0 {
        return out;
    }

    let sx = width as f32 / new_width as f32;
    let sy = height as f32 / new_height as f32;

    for y in 0..new_height {
        let src_y = (y as f32 + 0.5) * sy - 0.5;
        for x in 0..new_width {
            let src_x = (x as f32 + 0.5) * sx - 0.5;
            for c in 0..3 {
                let v = sample_bilinear(rgb, width, height, src_x, src_y, c);
                out[((y * new_width + x) * 3) as usize + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Downsample by an integer factor with a box filter (each output pixel
/// is the mean of a factor x factor block). Factor 1 is a copy.
pub fn downsample_rgb(rgb: &[u8], width: u32, height: u32, factor: u32) -> (Vec<u8>, u32, u32) {
    if factor <= 1 {
        return (rgb.to_vec(), width, height);
    }

    let new_w = (width / factor).max(1);
    let new_h = (height / factor).max(1);
    let mut out = vec![0u8; (new_w * new_h * 3) as usize];

    for y in 0..new_h {
        for x in 0..new_w {
            let mut acc = [0u32; 3];
            let mut count = 0u32;
            for dy in 0..factor {
                for dx in 0..factor {
                    let sy = y * factor + dy;
                    let sx = x * factor + dx;
                    if sy < height && sx < width {
                        let off = ((sy * width + sx) * 3) as usize;
                        acc[0] += rgb[off] as u32;
                        acc[1] += rgb[off + 1] as u32;
                        acc[2] += rgb[off + 2] as u32;
                        count += 1;
                    }
                }
            }
            let off = ((y * new_w + x) * 3) as usize;
            for c in 0..3 {
                out[off + c] = (acc[c] / count.max(1)) as u8;
            }
        }
    }

    (out, new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![128u8; 4 * 4 * 3];
        let out = resize_rgb(&src, 4, 4, 8, 8);
        assert_eq!(out.len(), 8 * 8 * 3);
        assert!(out.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_downsample_factor_2_averages_blocks() {
        // 2x2 image, one channel-wise gradient: output is the mean.
        #[rustfmt::skip]
        let src = vec![
            0, 0, 0,    100, 100, 100,
            100, 100, 100,  200, 200, 200,
        ];
        let (out, w, h) = downsample_rgb(&src, 2, 2, 2);
        assert_eq!((w, h), (1, 1));
        assert_eq!(out, vec![100, 100, 100]);
    }

    #[test]
    fn test_downsample_factor_1_is_copy() {
        let src = vec![7u8; 2 * 2 * 3];
        let (out, w, h) = downsample_rgb(&src, 2, 2, 1);
        assert_eq!((w, h), (2, 2));
        assert_eq!(out, src);
    }

    #[test]
    fn test_downsample_truncates_odd_edges() {
        let src = vec![50u8; 3 * 3 * 3];
        let (out, w, h) = downsample_rgb(&src, 3, 3, 2);
        assert_eq!((w, h), (1, 1));
        assert_eq!(out, vec![50, 50, 50]);
    }

    #[test]
    fn test_sample_bilinear_midpoint() {
        // 2x1 image, red channel 0 and 100: midpoint samples 50.
        let src = vec![0, 0, 0, 100, 0, 0];
        let v = sample_bilinear(&src, 2, 1, 0.5, 0.0, 0);
        assert!((v - 50.0).abs() < 1e-4);
    }
}
