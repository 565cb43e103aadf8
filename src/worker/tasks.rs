use std::io::Read as _;
use std::path::Path;

use crate::config::WorkerConfig;
use crate::db::pool::Database;
use crate::db::{jobs, layers};
use crate::error::ErrorKind;
use crate::queue::Task;
use crate::raster;
use crate::storage::{S3Storage, layer_key};

pub struct WorkerContext {
    pub db: Database,
    pub storage: S3Storage,
    pub config: WorkerConfig,
}

pub type TaskOutcome = Result<(), (ErrorKind, String)>;

fn parse_payload(task: &Task) -> Result<(String, String, String, String), (ErrorKind, String)> {
    let job_id = task
        .job_id
        .clone()
        .ok_or_else(|| (ErrorKind::Validation, "task has no job_id".to_string()))?;
    let layer_id = task.payload["layer_id"]
        .as_str()
        .ok_or_else(|| (ErrorKind::Validation, "payload missing layer_id".to_string()))?
        .to_string();
    let storage_key = task.payload["storage_key"]
        .as_str()
        .ok_or_else(|| (ErrorKind::Validation, "payload missing storage_key".to_string()))?
        .to_string();
    let original_filename = task.payload["original_filename"]
        .as_str()
        .unwrap_or("upload")
        .to_string();
    Ok((job_id, layer_id, storage_key, original_filename))
}

/// `process_geotiff`: download the original upload, run it through the
/// raster engine, push artifacts to storage and finalize the job/layer
/// rows.
pub async fn process_geotiff(ctx: &WorkerContext, task: &Task) -> TaskOutcome {
    let (job_id, layer_id, storage_key, original_filename) = parse_payload(task)?;
    run_single_raster(ctx, &job_id, &layer_id, &storage_key, &original_filename).await
}

/// `process_zip_archive`: extract the archive and process the raster
/// file found inside it. Archives with no raster inside fail
/// validation rather than retrying.
pub async fn process_zip_archive(ctx: &WorkerContext, task: &Task) -> TaskOutcome {
    let (job_id, layer_id, storage_key, _original_filename) = parse_payload(task)?;

    if !advance(ctx, &job_id, Advance::Start).await? {
        return Ok(());
    }

    let bytes = ctx
        .storage
        .get(&storage_key)
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to download archive: {}", e)))?;

    let work_dir = tempfile::tempdir()
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to create work dir: {}", e)))?;

    let cursor = std::io::Cursor::new(bytes.as_ref());
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| (ErrorKind::Validation, format!("invalid ZIP archive: {}", e)))?;

    // If a ZIP contains more than one raster, the single largest (by
    // uncompressed size) is chosen; the rest are ignored. This requires
    // scanning every entry before extracting anything.
    let mut largest_index = None;
    let mut largest_size = 0u64;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| (ErrorKind::Validation, format!("corrupt ZIP entry: {}", e)))?;
        let name = entry.name().to_string();
        let lower = name.to_lowercase();
        if (lower.ends_with(".tif") || lower.ends_with(".tiff")) && entry.size() > largest_size {
            largest_size = entry.size();
            largest_index = Some(i);
        }
    }

    let Some(index) = largest_index else {
        return Err((ErrorKind::Validation, "no_raster_in_archive".to_string()));
    };

    let mut entry = archive
        .by_index(index)
        .map_err(|e| (ErrorKind::Validation, format!("corrupt ZIP entry: {}", e)))?;
    let name = entry.name().to_string();
    let dest = work_dir.path().join(
        Path::new(&name)
            .file_name()
            .ok_or_else(|| (ErrorKind::Validation, "invalid entry name".to_string()))?,
    );
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to extract {}: {}", name, e)))?;
    std::fs::write(&dest, &buf)
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to write {}: {}", name, e)))?;
    let raster_path = dest;

    if !advance(ctx, &job_id, Advance::Progress(25)).await? {
        return Ok(());
    }

    finish_from_local_file(ctx, &job_id, &layer_id, &raster_path).await
}

async fn run_single_raster(
    ctx: &WorkerContext,
    job_id: &str,
    layer_id: &str,
    storage_key: &str,
    original_filename: &str,
) -> TaskOutcome {
    if !advance(ctx, job_id, Advance::Start).await? {
        return Ok(());
    }

    let bytes = ctx
        .storage
        .get(storage_key)
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to download upload: {}", e)))?;

    let work_dir = tempfile::tempdir()
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to create work dir: {}", e)))?;
    let local_path = work_dir.path().join(original_filename);
    std::fs::write(&local_path, &bytes)
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to stage upload: {}", e)))?;

    if !advance(ctx, job_id, Advance::Progress(25)).await? {
        return Ok(());
    }

    finish_from_local_file(ctx, job_id, layer_id, &local_path).await
}

async fn finish_from_local_file(
    ctx: &WorkerContext,
    job_id: &str,
    layer_id: &str,
    local_path: &Path,
) -> TaskOutcome {
    let work_dir = local_path.parent().unwrap_or(Path::new("."));

    let processed = raster::process_raster(local_path, work_dir)
        .map_err(|e| (e.kind(), format!("raster processing failed: {}", e)))?;

    if !advance(ctx, job_id, Advance::Progress(50)).await? {
        return Ok(());
    }

    let cog_bytes = std::fs::read(&processed.cog_path)
        .map_err(|e| (ErrorKind::IoFatal, format!("failed to read COG output: {}", e)))?;

    let cog_key = layer_key(layer_id, "layer.tif");
    let png_key = layer_key(layer_id, "preview.png");
    let pgw_key = layer_key(layer_id, "layer.pgw");
    let prj_key = layer_key(layer_id, "layer.prj");
    let manifest_key = layer_key(layer_id, "metadata.json");

    ctx.storage
        .put(&cog_key, cog_bytes.into())
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to upload COG: {}", e)))?;
    ctx.storage
        .put(&png_key, processed.preview_png.clone().into())
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to upload preview: {}", e)))?;
    ctx.storage
        .put(&pgw_key, processed.world_file.clone().into_bytes().into())
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to upload world file: {}", e)))?;
    ctx.storage
        .put(&prj_key, processed.prj.clone().into_bytes().into())
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to upload .prj: {}", e)))?;

    if !advance(ctx, job_id, Advance::Progress(75)).await? {
        return Ok(());
    }

    let png_url = ctx.storage.public_url(&png_key);
    let cog_url = ctx.storage.public_url(&cog_key);

    // The canonical metadata.json is itself one of the uploaded
    // artifacts, not just a row in Postgres.
    let original_filename = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let artifact_manifest = processed.manifest.to_artifact_manifest(
        layer_id,
        job_id,
        &original_filename,
        &png_url,
        &cog_url,
        chrono::Utc::now(),
    );
    let manifest_json = serde_json::to_vec(&artifact_manifest)
        .map_err(|e| (ErrorKind::Internal, format!("failed to serialize manifest: {}", e)))?;
    ctx.storage
        .put(&manifest_key, manifest_json.into())
        .await
        .map_err(|e| (ErrorKind::IoTransient, format!("failed to upload manifest: {}", e)))?;
    let metadata_url = ctx.storage.public_url(&manifest_key);

    let bbox = serde_json::json!(processed.manifest.leaflet_bounds);
    layers::mark_processed(
        &ctx.db,
        layer_id,
        &png_url,
        &cog_url,
        &bbox,
        processed.manifest.width as i32,
        processed.manifest.height as i32,
        &processed.manifest.crs,
        &serde_json::json!({ "band_count": processed.manifest.band_count, "metadata_url": metadata_url }),
    )
    .await
    .map_err(|e| (ErrorKind::IoTransient, format!("failed to record layer: {}", e)))?;

    jobs::complete_job(
        &ctx.db,
        job_id,
        &serde_json::to_value(&artifact_manifest)
            .map_err(|e| (ErrorKind::Internal, format!("failed to serialize manifest: {}", e)))?,
    )
    .await
    .map_err(|e| (ErrorKind::IoTransient, format!("failed to finalize job: {}", e)))?;

    Ok(())
}

enum Advance {
    Start,
    Progress(i32),
}

/// Advance job state, returning `false` when the write lost the race
/// to a cancellation; the caller should stop without treating that as
/// an error.
async fn advance(ctx: &WorkerContext, job_id: &str, step: Advance) -> Result<bool, (ErrorKind, String)> {
    let ok = match step {
        Advance::Start => jobs::start_processing(&ctx.db, job_id).await,
        Advance::Progress(p) => jobs::update_progress(&ctx.db, job_id, p).await,
    }
    .map_err(|e| (ErrorKind::IoTransient, format!("status update failed: {}", e)))?;
    Ok(ok)
}

/// `cleanup_old_jobs` periodic task.
pub async fn cleanup_old_jobs(ctx: &WorkerContext) -> TaskOutcome {
    let deleted = jobs::cleanup_old_jobs(&ctx.db, ctx.config.job_retention_days)
        .await
        .map_err(|e| (ErrorKind::IoTransient, e.to_string()))?;
    tracing::info!(deleted, "cleaned up old jobs");
    Ok(())
}

/// `update_processing_statistics` periodic task.
pub async fn update_processing_statistics(ctx: &WorkerContext) -> TaskOutcome {
    let counts = jobs::status_counts_24h(&ctx.db)
        .await
        .map_err(|e| (ErrorKind::IoTransient, e.to_string()))?;
    for c in counts {
        tracing::info!(status = %c.status, count = c.count, avg_duration_secs = ?c.avg_duration_secs, "job stats");
    }
    Ok(())
}
