use crate::db::models::GisLayer;
use crate::db::pool::Database;
use crate::error::AppResult;

pub async fn get_layer(db: &Database, layer_id: &str) -> AppResult<Option<GisLayer>> {
    let layer = sqlx::query_as::<_, GisLayer>("SELECT * FROM gis_layers WHERE id = $1")
        .bind(layer_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(layer)
}

/// Finalize a layer on successful processing: artifact URLs, the
/// WGS84 bounding box (stored as `leaflet_bounds`
/// `[[south, west], [north, east]]`), raster dimensions and CRS.
#[allow(clippy::too_many_arguments)]
pub async fn mark_processed(
    db: &Database,
    layer_id: &str,
    image_url: &str,
    cog_url: &str,
    bounds_wgs84: &serde_json::Value,
    width: i32,
    height: i32,
    crs: &str,
    metadata: &serde_json::Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE gis_layers
        SET status = 'processed',
            image_url = $2,
            cog_url = $3,
            bounds_wgs84 = $4,
            width = $5,
            height = $6,
            crs = $7,
            metadata = $8,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(layer_id)
    .bind(image_url)
    .bind(cog_url)
    .bind(bounds_wgs84)
    .bind(width)
    .bind(height)
    .bind(crs)
    .bind(metadata)
    .execute(db.pool())
    .await?;
    Ok(())
}

pub async fn mark_error(db: &Database, layer_id: &str, message: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE gis_layers
        SET status = 'error',
            metadata = metadata || jsonb_build_object('error', $2::text),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(layer_id)
    .bind(message)
    .execute(db.pool())
    .await?;
    Ok(())
}
