use image::RgbImage;
use image::imageops::FilterType;

use crate::error::{AppError, AppResult};

/// Preview rasters are capped at this edge length; anything larger is
/// downsampled with Lanczos3.
pub const MAX_PREVIEW_EDGE: u32 = 2048;

/// 2nd/98th percentile stretch. `nodata` values are excluded from both
/// the percentile computation and the output (never treated as a
/// `> 0` proxy, which would corrupt signed imagery with no sentinel).
pub fn percentile_stretch(values: &[f32], nodata: Option<f32>) -> (f32, f32) {
    let mut sorted: Vec<f32> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && nodata.map(|nd| (*v - nd).abs() > f32::EPSILON).unwrap_or(true))
        .collect();

    if sorted.is_empty() {
        return (0.0, 1.0);
    }

    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let low_idx = ((sorted.len() as f64 - 1.0) * 0.02).round() as usize;
    let high_idx = ((sorted.len() as f64 - 1.0) * 0.98).round() as usize;

    let low = sorted[low_idx.min(sorted.len() - 1)];
    let high = sorted[high_idx.min(sorted.len() - 1)];

    if (high - low).abs() < f32::EPSILON {
        (low, low + 1.0)
    } else {
        (low, high)
    }
}

fn stretch_to_u8(value: f32, low: f32, high: f32, nodata: Option<f32>) -> u8 {
    if let Some(nd) = nodata {
        if (value - nd).abs() < f32::EPSILON {
            return 0;
        }
    }
    let t = ((value - low) / (high - low)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

/// Build an 8-bit RGB preview from three bands, each stretched
/// independently. Called with the same band three times for a
/// single-band source, so it replicates into grayscale-as-RGB rather
/// than ever emitting a true 1-channel image; map viewers expect RGB.
pub fn render_rgb(
    width: u32,
    height: u32,
    bands: [&[f32]; 3],
    nodata: Option<f32>,
) -> AppResult<RgbImage> {
    let stretches = bands.map(|b| percentile_stretch(b, nodata));
    let mut img = RgbImage::new(width, height);
    for (i, px) in img.pixels_mut().enumerate() {
        let mut rgb = [0u8; 3];
        for (c, band) in bands.iter().enumerate() {
            let v = *band
                .get(i)
                .ok_or_else(|| AppError::Processing("band buffer shorter than raster size".into()))?;
            let (low, high) = stretches[c];
            rgb[c] = stretch_to_u8(v, low, high, nodata);
        }
        px.0 = rgb;
    }
    Ok(img)
}

pub fn downscale_to_limit(img: &image::DynamicImage) -> image::DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w <= MAX_PREVIEW_EDGE && h <= MAX_PREVIEW_EDGE {
        return img.clone();
    }
    let scale = MAX_PREVIEW_EDGE as f64 / w.max(h) as f64;
    let new_w = (w as f64 * scale).round().max(1.0) as u32;
    let new_h = (h as f64 * scale).round().max(1.0) as u32;
    img.resize(new_w, new_h, FilterType::Lanczos3)
}

pub fn encode_png(img: &image::DynamicImage) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| AppError::Processing(format!("PNG encode failed: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodata_is_excluded_from_percentile_computation() {
        let values: Vec<f32> = (0..100).map(|v| v as f32).collect();
        let mut with_nodata = values.clone();
        with_nodata.extend(std::iter::repeat(-9999.0).take(50));

        let (low_a, high_a) = percentile_stretch(&values, None);
        let (low_b, high_b) = percentile_stretch(&with_nodata, Some(-9999.0));

        assert_eq!(low_a, low_b);
        assert_eq!(high_a, high_b);
    }

    #[test]
    fn nodata_pixels_render_as_zero() {
        assert_eq!(stretch_to_u8(-9999.0, 0.0, 100.0, Some(-9999.0)), 0);
    }

    #[test]
    fn constant_band_does_not_divide_by_zero() {
        let values = vec![5.0f32; 16];
        let (low, high) = percentile_stretch(&values, None);
        assert!(high > low);
    }

    /// A single band passed three times to `render_rgb` replicates
    /// into equal R/G/B channels.
    #[test]
    fn single_band_replicated_three_ways_yields_equal_channels() {
        let band: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let img = render_rgb(4, 4, [&band, &band, &band], None).unwrap();
        for px in img.pixels() {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }
}
