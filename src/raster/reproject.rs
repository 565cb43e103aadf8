use gdal::spatial_ref::{CoordTransform, SpatialRef};

use crate::error::{AppError, AppResult};

/// Target CRS for reprojection. Always EPSG:4326, uniformly across
/// every source CRS.
pub const TARGET_EPSG: u32 = 4326;

/// `true` when the source CRS is absent or already the target, letting
/// the caller skip the warp and copy the source dataset straight into
/// a COG.
pub fn needs_reprojection(source_wkt: &str) -> AppResult<bool> {
    if source_wkt.trim().is_empty() {
        return Ok(false);
    }
    let source = SpatialRef::from_wkt(source_wkt)
        .map_err(|e| AppError::Processing(format!("invalid source CRS: {}", e)))?;
    let target = SpatialRef::from_epsg(TARGET_EPSG)
        .map_err(|e| AppError::Processing(format!("failed to load EPSG:{}: {}", TARGET_EPSG, e)))?;

    let mut probe = source.clone();
    let already_target = probe
        .auto_identify_epsg()
        .ok()
        .and_then(|_| probe.auth_code().ok())
        .map(|code| code as u32 == TARGET_EPSG)
        .unwrap_or(false);

    Ok(!already_target && source.to_proj4().ok() != target.to_proj4().ok())
}

/// Reproject a `[minx, miny, maxx, maxy]` box expressed in `source_wkt`
/// into WGS84, returning `[west, south, east, north]`. Always derived
/// from the source bounds, never the reprojected array's affine.
pub fn bounds_to_wgs84(source_wkt: &str, bounds: [f64; 4]) -> AppResult<[f64; 4]> {
    let source = SpatialRef::from_wkt(source_wkt)
        .map_err(|e| AppError::Processing(format!("invalid source CRS: {}", e)))?;
    let wgs84 = SpatialRef::from_epsg(TARGET_EPSG)
        .map_err(|e| AppError::Processing(format!("failed to load EPSG:{}: {}", TARGET_EPSG, e)))?;

    let transform = CoordTransform::new(&source, &wgs84)
        .map_err(|e| AppError::Processing(format!("failed to build coordinate transform: {}", e)))?;

    let [minx, miny, maxx, maxy] = bounds;
    let mut xs = [minx, maxx, minx, maxx];
    let mut ys = [miny, miny, maxy, maxy];
    let mut zs = [0.0f64; 4];

    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| AppError::Processing(format!("coordinate transform failed: {}", e)))?;

    let west = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let east = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let south = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let north = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    Ok([west, south, east, north])
}

/// Destination grid for a warp: shape and affine transform of the
/// reprojected array.
pub struct DestinationGrid {
    pub width: usize,
    pub height: usize,
    pub geo_transform: [f64; 6],
}

/// Fit `bbox` (WGS84 `[west, south, east, north]`) into a destination
/// grid whose pixel size approximates the source's own resolution,
/// transformed into degrees at the extent's center. A
/// preserving-resolution default destination transform, computed
/// without relying on a dedicated GDAL warp API.
pub fn destination_grid(
    source_wkt: &str,
    source_gt: [f64; 6],
    bbox: [f64; 4],
) -> AppResult<DestinationGrid> {
    let [west, south, east, north] = bbox;

    let source = SpatialRef::from_wkt(source_wkt)
        .map_err(|e| AppError::Processing(format!("invalid source CRS: {}", e)))?;
    let wgs84 = SpatialRef::from_epsg(TARGET_EPSG)
        .map_err(|e| AppError::Processing(format!("failed to load EPSG:{}: {}", TARGET_EPSG, e)))?;
    let to_source = CoordTransform::new(&wgs84, &source)
        .map_err(|e| AppError::Processing(format!("failed to build coordinate transform: {}", e)))?;

    // Source pixel size in map units (may be negative on the y axis).
    let pixel_w = source_gt[1].hypot(source_gt[2]).max(1e-12);
    let pixel_h = source_gt[4].hypot(source_gt[5]).max(1e-12);

    // Degrees-per-map-unit at the extent center, estimated by
    // transforming two points a tiny angular distance apart back into
    // source-CRS space and measuring the resulting map distance.
    let center_lon = (west + east) / 2.0;
    let center_lat = (south + north) / 2.0;
    let mut xs = [center_lon, center_lon + 1e-6];
    let mut ys = [center_lat, center_lat];
    let mut zs = [0.0f64; 2];
    to_source
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| AppError::Processing(format!("coordinate transform failed: {}", e)))?;
    let map_units_per_degree = (xs[1] - xs[0]).hypot(ys[1] - ys[0]) * 1e6;
    let map_units_per_degree = if map_units_per_degree.is_finite() && map_units_per_degree > 1e-9 {
        map_units_per_degree
    } else {
        // Source CRS is itself geographic (degrees); 1:1.
        1.0
    };

    let degrees_per_pixel_x = (pixel_w / map_units_per_degree).max(1e-12);
    let degrees_per_pixel_y = (pixel_h / map_units_per_degree).max(1e-12);

    let width = (((east - west).abs() / degrees_per_pixel_x).round() as usize).max(1);
    let height = (((north - south).abs() / degrees_per_pixel_y).round() as usize).max(1);

    let geo_transform = [
        west,
        (east - west) / width as f64,
        0.0,
        north,
        0.0,
        -(north - south) / height as f64,
    ];

    Ok(DestinationGrid {
        width,
        height,
        geo_transform,
    })
}

/// Inverse-map every destination pixel center back into the source
/// raster and bilinearly sample `band` there.
#[allow(clippy::too_many_arguments)]
pub fn warp_band_bilinear(
    band: &[f32],
    src_width: usize,
    src_height: usize,
    src_gt: [f64; 6],
    dst_width: usize,
    dst_height: usize,
    dst_gt: [f64; 6],
    to_source: &CoordTransform,
    nodata: Option<f32>,
) -> AppResult<Vec<f32>> {
    let fill = nodata.unwrap_or(0.0);
    let mut out = vec![fill; dst_width * dst_height];

    // Inverse of the source affine transform, to map map-coordinates
    // back to fractional (col, row).
    let [ox, a, b, oy, d, e] = src_gt;
    let det = a * e - b * d;
    if det.abs() < 1e-20 {
        return Err(AppError::Processing(
            "source geotransform is not invertible".into(),
        ));
    }
    let inv = [e / det, -b / det, -d / det, a / det];

    for row in 0..dst_height {
        let dst_y = dst_gt[3] + (row as f64 + 0.5) * dst_gt[5];
        for col in 0..dst_width {
            let dst_x = dst_gt[0] + (col as f64 + 0.5) * dst_gt[1];
            let mut xs = [dst_x];
            let mut ys = [dst_y];
            let mut zs = [0.0f64; 1];
            if to_source.transform_coords(&mut xs, &mut ys, &mut zs).is_err() {
                continue;
            }
            let map_x = xs[0] - ox;
            let map_y = ys[0] - oy;
            let col_f = inv[0] * map_x + inv[1] * map_y;
            let row_f = inv[2] * map_x + inv[3] * map_y;

            if col_f < 0.0 || row_f < 0.0 {
                continue;
            }
            let c0 = col_f.floor() as isize;
            let r0 = row_f.floor() as isize;
            if c0 < 0 || r0 < 0 || c0 as usize >= src_width || r0 as usize >= src_height {
                continue;
            }
            let c1 = (c0 as usize + 1).min(src_width - 1);
            let r1 = (r0 as usize + 1).min(src_height - 1);
            let tx = col_f - c0 as f64;
            let ty = row_f - r0 as f64;

            let sample = |c: usize, r: usize| -> f32 { band[r * src_width + c] };
            let v00 = sample(c0 as usize, r0 as usize);
            let v10 = sample(c1, r0 as usize);
            let v01 = sample(c0 as usize, r1);
            let v11 = sample(c1, r1);

            let top = v00 as f64 * (1.0 - tx) + v10 as f64 * tx;
            let bottom = v01 as f64 * (1.0 - tx) + v11 as f64 * tx;
            out[row * dst_width + col] = (top * (1.0 - ty) + bottom * ty) as f32;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_wgs84_needs_no_reprojection() {
        let wgs84_wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
        assert!(!needs_reprojection(&wgs84_wkt).unwrap());
    }

    #[test]
    fn utm_zone_needs_reprojection() {
        let utm_wkt = SpatialRef::from_epsg(32638).unwrap().to_wkt().unwrap();
        assert!(needs_reprojection(&utm_wkt).unwrap());
    }
}
