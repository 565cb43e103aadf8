use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes a processed layer's geometry and artifact locations.
/// `bbox` and `leaflet_bounds` always describe the same rectangle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RasterManifest {
    pub width: u32,
    pub height: u32,
    pub crs: String,
    /// `[west, south, east, north]` in WGS84.
    pub bbox: [f64; 4],
    /// `[[south, west], [north, east]]`, the Leaflet `LatLngBounds` form.
    pub leaflet_bounds: [[f64; 2]; 2],
    pub band_count: usize,
}

impl RasterManifest {
    pub fn new(width: u32, height: u32, crs: String, bbox: [f64; 4], band_count: usize) -> Self {
        let [west, south, east, north] = bbox;
        Self {
            width,
            height,
            crs,
            bbox,
            leaflet_bounds: [[south, west], [north, east]],
            band_count,
        }
    }

    /// Build the canonical `metadata.json` manifest uploaded alongside
    /// the COG/PNG/sidecars.
    #[allow(clippy::too_many_arguments)]
    pub fn to_artifact_manifest(
        &self,
        layer_id: &str,
        job_id: &str,
        original_filename: &str,
        png_url: &str,
        cog_url: &str,
        processed_at: chrono::DateTime<chrono::Utc>,
    ) -> ArtifactManifest {
        ArtifactManifest {
            success: true,
            layer_id: layer_id.to_string(),
            original_filename: original_filename.to_string(),
            image_file: "processed.png".to_string(),
            png_url: png_url.to_string(),
            cog_url: cog_url.to_string(),
            bbox: self.bbox,
            leaflet_bounds: self.leaflet_bounds,
            width: self.width,
            height: self.height,
            crs: self.crs.clone(),
            processed_at,
            job_id: job_id.to_string(),
        }
    }
}

/// The `metadata.json` document uploaded to object storage for every
/// successful job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactManifest {
    pub success: bool,
    pub layer_id: String,
    pub original_filename: String,
    #[serde(rename = "imageFile")]
    pub image_file: String,
    pub png_url: String,
    pub cog_url: String,
    /// `[west, south, east, north]`.
    pub bbox: [f64; 4],
    /// `[[south, west], [north, east]]`.
    pub leaflet_bounds: [[f64; 2]; 2],
    pub width: u32,
    pub height: u32,
    pub crs: String,
    pub processed_at: chrono::DateTime<chrono::Utc>,
    pub job_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// bbox and leaflet_bounds must always agree: they're two views of
    /// the same four numbers.
    #[test]
    fn leaflet_bounds_derive_from_bbox() {
        let m = RasterManifest::new(100, 50, "EPSG:4326".into(), [-10.0, 20.0, -5.0, 25.0], 3);
        assert_eq!(m.leaflet_bounds, [[20.0, -10.0], [25.0, -5.0]]);
    }

    /// The wire manifest carries the same bbox/leaflet_bounds pair
    /// through untouched.
    #[test]
    fn artifact_manifest_preserves_bbox_and_bounds() {
        let m = RasterManifest::new(512, 512, "EPSG:4326".into(), [44.0, 15.0, 45.0, 16.0], 1);
        let wire = m.to_artifact_manifest(
            "layer-1",
            "job-1",
            "input.tif",
            "https://store/layer-1/preview.png",
            "https://store/layer-1/layer.tif",
            chrono::Utc::now(),
        );
        assert_eq!(wire.bbox, m.bbox);
        assert_eq!(wire.leaflet_bounds, m.leaflet_bounds);
        assert_eq!(wire.leaflet_bounds[0], [wire.bbox[1], wire.bbox[0]]);
        assert_eq!(wire.leaflet_bounds[1], [wire.bbox[3], wire.bbox[2]]);
        assert!(wire.success);
    }
}
