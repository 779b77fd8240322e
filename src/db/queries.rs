use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::models::render::{RenderJob, RenderStatus, UpscaleFactor};

const JOB_COLUMNS: &str = r#"
    id, user_id, status, prompt, style, reference_key, render_key, upscaled_key,
    upscale_factor, upscaled_factor, generation_id, upscale_task_id, error,
    created_at, updated_at, processing_started_at, processing_completed_at
"#;

fn decode_err(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value {:?}", value).into(),
    }
}

fn factor_column(row: &PgRow, column: &str) -> Result<Option<UpscaleFactor>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|f| UpscaleFactor::from_str(&f).map_err(|_| decode_err(column, &f)))
        .transpose()
}

fn job_from_row(row: &PgRow) -> Result<RenderJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = RenderStatus::from_str(&status).map_err(|_| decode_err("status", &status))?;

    let upscale_factor = factor_column(row, "upscale_factor")?;
    let upscaled_factor = factor_column(row, "upscaled_factor")?;

    Ok(RenderJob {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status,
        prompt: row.try_get("prompt")?,
        style: row.try_get("style")?,
        reference_key: row.try_get("reference_key")?,
        render_key: row.try_get("render_key")?,
        upscaled_key: row.try_get("upscaled_key")?,
        upscale_factor,
        upscaled_factor,
        generation_id: row.try_get("generation_id")?,
        upscale_task_id: row.try_get("upscale_task_id")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        processing_started_at: row.try_get("processing_started_at")?,
        processing_completed_at: row.try_get("processing_completed_at")?,
    })
}

/// Insert a new pending render job
pub async fn create_job(
    pool: &PgPool,
    job_id: Uuid,
    user_id: &str,
    prompt: &str,
    style: Option<&str>,
    reference_key: &str,
) -> Result<RenderJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO render_jobs (id, user_id, status, prompt, style, reference_key)
        VALUES ($1, $2, 'pending', $3, $4, $5)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(user_id)
    .bind(prompt)
    .bind(style)
    .bind(reference_key)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID regardless of owner (worker side)
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<RenderJob>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM render_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Get a job only if it belongs to `user_id`
pub async fn get_job_for_user(
    pool: &PgPool,
    job_id: Uuid,
    user_id: &str,
) -> Result<Option<RenderJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM render_jobs WHERE id = $1 AND user_id = $2"
    ))
    .bind(job_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// A user's jobs, newest first
pub async fn list_jobs_for_user(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<RenderJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM render_jobs
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

pub async fn count_jobs_for_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM render_jobs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    row.try_get("total")
}

/// Move a job from `from` to `to`. Returns false if the row was no longer in `from`.
pub async fn transition(
    pool: &PgPool,
    job_id: Uuid,
    from: RenderStatus,
    to: RenderStatus,
) -> Result<bool, sqlx::Error> {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");

    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = $1,
            processing_started_at = CASE WHEN $1 = 'processing' THEN NOW() ELSE processing_started_at END,
            processing_completed_at = CASE WHEN $1 IN ('completed', 'failed') THEN NOW() ELSE processing_completed_at END
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(to.to_string())
    .bind(job_id)
    .bind(from.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record the generation vendor's prediction id
pub async fn set_generation_id(
    pool: &PgPool,
    job_id: Uuid,
    generation_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE render_jobs SET generation_id = $1 WHERE id = $2")
        .bind(generation_id)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the upscaling vendor's task id
pub async fn set_upscale_task_id(
    pool: &PgPool,
    job_id: Uuid,
    task_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE render_jobs SET upscale_task_id = $1 WHERE id = $2")
        .bind(task_id)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// processing -> completed with the stored render
pub async fn complete_render(
    pool: &PgPool,
    job_id: Uuid,
    render_key: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'completed',
            render_key = $1,
            error = NULL,
            processing_completed_at = NOW()
        WHERE id = $2 AND status = 'processing'
        "#,
    )
    .bind(render_key)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// upscaling -> completed with the stored upscaled image.
/// `upscaled_factor` changes only here, so it always describes `upscaled_key`.
pub async fn complete_upscale(
    pool: &PgPool,
    job_id: Uuid,
    upscaled_key: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'completed',
            upscaled_key = $1,
            upscaled_factor = upscale_factor,
            error = NULL,
            processing_completed_at = NOW()
        WHERE id = $2 AND status = 'upscaling'
        "#,
    )
    .bind(upscaled_key)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a job failed with the error shown to the user
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    from: RenderStatus,
    error: &str,
) -> Result<bool, sqlx::Error> {
    debug_assert!(from.can_transition_to(RenderStatus::Failed));

    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'failed',
            error = $1,
            processing_completed_at = NOW()
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(error)
    .bind(job_id)
    .bind(from.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// upscaling -> completed, keeping the original render and recording why the upscale failed.
/// The requested factor falls back to the one actually stored.
pub async fn restore_after_upscale_failure(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'completed',
            error = $1,
            upscale_factor = upscaled_factor,
            processing_completed_at = NOW()
        WHERE id = $2 AND status = 'upscaling'
        "#,
    )
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// completed -> upscaling, only for a finished render not already upscaled at `factor`
pub async fn request_upscale(
    pool: &PgPool,
    job_id: Uuid,
    user_id: &str,
    factor: UpscaleFactor,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = 'upscaling',
            upscale_factor = $1,
            upscale_task_id = NULL,
            error = NULL
        WHERE id = $2
          AND user_id = $3
          AND status = 'completed'
          AND render_key IS NOT NULL
          AND (upscaled_key IS NULL OR upscaled_factor IS DISTINCT FROM $1)
        "#,
    )
    .bind(factor.to_string())
    .bind(job_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete a job that no worker currently owns
pub async fn delete_job(pool: &PgPool, job_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM render_jobs
        WHERE id = $1
          AND user_id = $2
          AND status NOT IN ('pending', 'processing', 'upscaling')
        "#,
    )
    .bind(job_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Give up on in-flight jobs nobody has touched within `timeout`.
///
/// Stalled upscales fall back to their completed render; everything else fails.
pub async fn fail_stale_jobs(pool: &PgPool, timeout: Duration) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE render_jobs
        SET status = CASE
                WHEN status = 'upscaling' AND render_key IS NOT NULL THEN 'completed'
                ELSE 'failed'
            END,
            upscale_factor = CASE WHEN status = 'upscaling' THEN upscaled_factor ELSE upscale_factor END,
            error = 'Timed out waiting for the render service',
            processing_completed_at = NOW()
        WHERE status IN ('pending', 'processing', 'upscaling')
          AND updated_at < NOW() - make_interval(secs => $1)
        RETURNING id
        "#,
    )
    .bind(timeout.as_secs_f64())
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("id")).collect()
}
