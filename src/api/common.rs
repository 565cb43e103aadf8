/// Media types referenced by the dispatcher's content negotiation and docs.
pub mod media_type {
    pub const JSON: &str = "application/json";
    pub const PNG: &str = "image/png";
    pub const TIFF: &str = "image/tiff";
    pub const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
    pub const ZIP: &str = "application/zip";
}
