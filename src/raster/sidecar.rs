use gdal::spatial_ref::SpatialRef;

use crate::error::{AppError, AppResult};

/// World-file line order is `A, D, B, E, C, F`. `C`/`F` are the
/// center, not the corner, of the upper-left pixel: GDAL's geotransform
/// origin is the corner, so half a pixel is added in both axes.
pub fn world_file_contents(geo_transform: [f64; 6]) -> String {
    let [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height] =
        geo_transform;

    let a = pixel_width;
    let d = col_rotation;
    let b = row_rotation;
    let e = pixel_height;
    let c = origin_x + pixel_width / 2.0 + row_rotation / 2.0;
    let f = origin_y + col_rotation / 2.0 + pixel_height / 2.0;

    format!("{a}\n{d}\n{b}\n{e}\n{c}\n{f}\n")
}

/// `.prj` sidecar contents: ESRI-flavored WKT, the form GIS desktop
/// tools expect alongside a world file.
pub fn prj_contents(source_wkt: &str) -> AppResult<String> {
    let mut srs = SpatialRef::from_wkt(source_wkt)
        .map_err(|e| AppError::Processing(format!("invalid CRS for .prj: {}", e)))?;
    srs.morph_to_esri()
        .map_err(|e| AppError::Processing(format!("failed to morph CRS to ESRI form: {}", e)))?;
    srs.to_wkt()
        .map_err(|e| AppError::Processing(format!("failed to serialize CRS: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_file_uses_pixel_center() {
        let gt = [100.0, 10.0, 0.0, 200.0, 0.0, -10.0];
        let contents = world_file_contents(gt);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "10");
        assert_eq!(lines[3], "-10");
        assert_eq!(lines[4], "105");
        assert_eq!(lines[5], "195");
    }
}
