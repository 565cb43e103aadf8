use std::path::{Path, PathBuf};

use gdal::Dataset;
use gdal::spatial_ref::{CoordTransform, SpatialRef};

use crate::error::{AppError, AppResult};
use crate::raster::manifest::RasterManifest;
use crate::raster::{cog, preview, reproject, sidecar};

/// Everything downstream needs once a raster has been processed: the
/// COG on disk (to be uploaded by the caller), the PNG preview bytes,
/// both sidecar file contents, and the manifest persisted on the layer
/// row.
pub struct ProcessedRaster {
    pub cog_path: PathBuf,
    pub preview_png: Vec<u8>,
    pub world_file: String,
    pub prj: String,
    pub manifest: RasterManifest,
}

/// A raster ready to preview/write: either the original GDAL dataset
/// (pass-through) or warped band buffers plus the grid they live on.
enum ArtifactRaster<'a> {
    Source {
        dataset: &'a Dataset,
        width: usize,
        height: usize,
        geo_transform: [f64; 6],
    },
    Warped {
        bands: Vec<Vec<f32>>,
        width: usize,
        height: usize,
        geo_transform: [f64; 6],
        nodata: Option<f32>,
    },
}

/// Opens `input_path` with GDAL, writes a Cloud-Optimized GeoTIFF and
/// PNG preview into `work_dir`, and derives the manifest/sidecars.
pub fn process_raster(input_path: &Path, work_dir: &Path) -> AppResult<ProcessedRaster> {
    let metadata = std::fs::metadata(input_path)
        .map_err(|e| AppError::Processing(format!("failed to stat raster: {}", e)))?;
    if metadata.len() == 0 {
        // A ZIP archive can contain a zero-byte raster entry even when the
        // upload itself passed the dispatcher's empty-file check.
        return Err(AppError::Validation("empty_file".into()));
    }

    let dataset = Dataset::open(input_path)
        .map_err(|e| AppError::Processing(format!("failed to open raster: {}", e)))?;

    let (src_width, src_height) = dataset.raster_size();
    let src_gt = dataset
        .geo_transform()
        .map_err(|e| AppError::Processing(format!("raster has no geotransform: {}", e)))?;
    let src_wkt = dataset.projection();
    if src_wkt.trim().is_empty() {
        // Missing CRS is a validation error, not a fallback to some
        // product-specific default projection.
        return Err(AppError::Validation(
            "raster has no spatial reference system".into(),
        ));
    }
    let band_count = dataset.raster_count();
    if band_count == 2 {
        return Err(AppError::Validation("unsupported_band_configuration".into()));
    }

    // Bounds are always derived from the source bounds, never from the
    // reprojected array's affine, to avoid pixel-center/corner drift.
    let corners = source_corner_bounds(src_width, src_height, src_gt);
    let bbox = reproject::bounds_to_wgs84(&src_wkt, corners)?;

    let reproject_needed = reproject::needs_reprojection(&src_wkt)?;

    let (artifact, crs_label, artifact_wkt): (ArtifactRaster, String, String) = if reproject_needed {
        let grid = reproject::destination_grid(&src_wkt, src_gt, bbox)?;
        let wgs84 = SpatialRef::from_epsg(reproject::TARGET_EPSG)
            .map_err(|e| AppError::Processing(format!("failed to load EPSG:4326: {}", e)))?;
        let source_srs = SpatialRef::from_wkt(&src_wkt)
            .map_err(|e| AppError::Processing(format!("invalid source CRS: {}", e)))?;
        let to_source = CoordTransform::new(&wgs84, &source_srs)
            .map_err(|e| AppError::Processing(format!("failed to build coordinate transform: {}", e)))?;

        let nodata = dataset
            .rasterband(1)
            .ok()
            .and_then(|b| b.no_data_value())
            .map(|v| v as f32);

        let mut warped_bands = Vec::with_capacity(band_count.max(0) as usize);
        for idx in 1..=band_count {
            let band = dataset
                .rasterband(idx)
                .map_err(|e| AppError::Processing(format!("failed to read band {}: {}", idx, e)))?;
            let buf = band
                .read_as::<f32>((0, 0), (src_width, src_height), (src_width, src_height), None)
                .map_err(|e| AppError::Processing(format!("failed to read band {} data: {}", idx, e)))?;
            let warped = reproject::warp_band_bilinear(
                &buf.data,
                src_width,
                src_height,
                src_gt,
                grid.width,
                grid.height,
                grid.geo_transform,
                &to_source,
                nodata,
            )?;
            warped_bands.push(warped);
        }

        let wgs84_wkt = wgs84
            .to_wkt()
            .map_err(|e| AppError::Processing(format!("failed to serialize EPSG:4326 WKT: {}", e)))?;

        (
            ArtifactRaster::Warped {
                bands: warped_bands,
                width: grid.width,
                height: grid.height,
                geo_transform: grid.geo_transform,
                nodata,
            },
            "EPSG:4326".to_string(),
            wgs84_wkt,
        )
    } else {
        let label = crs_label(&src_wkt)?;
        (
            ArtifactRaster::Source {
                dataset: &dataset,
                width: src_width,
                height: src_height,
                geo_transform: src_gt,
            },
            label,
            src_wkt.clone(),
        )
    };

    let cog_path = work_dir.join("layer_cog.tif");
    let (width, height, geo_transform) = match &artifact {
        ArtifactRaster::Source {
            dataset,
            width,
            height,
            geo_transform,
        } => {
            cog::write_cog(*dataset, &cog_path)?;
            (*width, *height, *geo_transform)
        }
        ArtifactRaster::Warped {
            bands,
            width,
            height,
            geo_transform,
            ..
        } => {
            cog::write_cog_from_bands(*width, *height, &artifact_wkt, *geo_transform, bands, &cog_path)?;
            (*width, *height, *geo_transform)
        }
    };

    let (preview_png, preview_width, preview_height) = render_preview(&artifact, band_count)?;

    // The world file is the PNG's sidecar, so its affine transform (and
    // the manifest's reported dimensions) describe the PNG's own pixel
    // grid, not the full-resolution COG's. When the preview was
    // downscaled to the 2048px cap the pixel size must be scaled up to
    // match, or the sidecar would misplace every pixel.
    let preview_geo_transform = scale_geo_transform(
        geo_transform,
        width,
        height,
        preview_width as usize,
        preview_height as usize,
    );
    let manifest = RasterManifest::new(preview_width, preview_height, crs_label, bbox, band_count.max(1) as usize);
    let world_file = sidecar::world_file_contents(preview_geo_transform);
    let prj = sidecar::prj_contents(&artifact_wkt)?;

    Ok(ProcessedRaster {
        cog_path,
        preview_png,
        world_file,
        prj,
        manifest,
    })
}

fn source_corner_bounds(width: usize, height: usize, gt: [f64; 6]) -> [f64; 4] {
    let [origin_x, a, b, origin_y, d, e] = gt;
    let x1 = origin_x + width as f64 * a + height as f64 * b;
    let y1 = origin_y + width as f64 * d + height as f64 * e;

    let minx = origin_x.min(x1);
    let maxx = origin_x.max(x1);
    let miny = origin_y.min(y1);
    let maxy = origin_y.max(y1);
    [minx, miny, maxx, maxy]
}

fn crs_label(wkt: &str) -> AppResult<String> {
    let mut srs = SpatialRef::from_wkt(wkt)
        .map_err(|e| AppError::Processing(format!("invalid CRS: {}", e)))?;
    srs.auto_identify_epsg().ok();
    match srs.auth_code() {
        Ok(code) => Ok(format!("EPSG:{}", code)),
        Err(_) => Ok(srs.to_proj4().unwrap_or_else(|_| "unknown".to_string())),
    }
}

/// Rescale a geotransform's pixel-size terms to match a grid that was
/// resampled from `(orig_w, orig_h)` down to `(new_w, new_h)`, preserving
/// aspect ratio.
fn scale_geo_transform(
    gt: [f64; 6],
    orig_w: usize,
    orig_h: usize,
    new_w: usize,
    new_h: usize,
) -> [f64; 6] {
    let sx = orig_w as f64 / new_w.max(1) as f64;
    let sy = orig_h as f64 / new_h.max(1) as f64;
    let [origin_x, a, b, origin_y, d, e] = gt;
    [origin_x, a * sx, b * sy, origin_y, d * sx, e * sy]
}

fn render_preview(artifact: &ArtifactRaster, band_count: isize) -> AppResult<(Vec<u8>, u32, u32)> {
    let (width, height) = match artifact {
        ArtifactRaster::Source { width, height, .. } => (*width, *height),
        ArtifactRaster::Warped { width, height, .. } => (*width, *height),
    };

    let read_band = |band_idx: isize| -> AppResult<Vec<f32>> {
        match artifact {
            ArtifactRaster::Source { dataset, .. } => {
                let band = dataset
                    .rasterband(band_idx)
                    .map_err(|e| AppError::Processing(format!("failed to read band {}: {}", band_idx, e)))?;
                let buf = band
                    .read_as::<f32>((0, 0), (width, height), (width, height), None)
                    .map_err(|e| AppError::Processing(format!("failed to read band {} data: {}", band_idx, e)))?;
                Ok(buf.data)
            }
            ArtifactRaster::Warped { bands, .. } => Ok(bands[band_idx as usize - 1].clone()),
        }
    };

    let nodata = match artifact {
        ArtifactRaster::Source { dataset, .. } => dataset
            .rasterband(1)
            .ok()
            .and_then(|b| b.no_data_value())
            .map(|v| v as f32),
        ArtifactRaster::Warped { nodata, .. } => *nodata,
    };

    // band_count == 2 is rejected before we get here (unsupported_band_configuration).
    // Single-band rasters are replicated into all three channels rather than
    // emitted as grayscale: map viewers expect an RGB preview regardless of
    // source band count.
    let rgb = if band_count >= 3 {
        let r = read_band(1)?;
        let g = read_band(2)?;
        let b = read_band(3)?;
        preview::render_rgb(width as u32, height as u32, [&r, &g, &b], nodata)?
    } else {
        let band = read_band(1)?;
        preview::render_rgb(width as u32, height as u32, [&band, &band, &band], nodata)?
    };
    let image = image::DynamicImage::ImageRgb8(rgb);

    let image = preview::downscale_to_limit(&image);
    let (out_width, out_height) = (image.width(), image.height());
    let png_bytes = preview::encode_png(&image)?;
    Ok((png_bytes, out_width, out_height))
}
