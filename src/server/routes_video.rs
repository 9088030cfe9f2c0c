//! Video relay and metadata routes.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mediarelay_common::{AssetKind, Error, VideoId};

use super::{rate_limit_response, AppContext, AppError};
use crate::catalog::VideoRecord;
use crate::relay::RangeRequest;
use crate::server::error::RATE_LIMIT_MESSAGE;

pub fn video_routes() -> Router<AppContext> {
    Router::new()
        .route("/video/:id/stream", get(stream_video))
        .route("/video/:id/metadata", get(video_metadata))
}

async fn find_video(ctx: &AppContext, id: &str) -> Result<VideoRecord, AppError> {
    let id = VideoId::from(id);
    ctx.catalog
        .find_video(&id)
        .await?
        .ok_or_else(|| Error::not_found(format!("video {id}")).into())
}

/// Relay a video with Range support.
///
/// 200/206 on success; 429 with `X-Rate-Limit-Reset` when the upstream is out
/// of quota; 503 when pre-flight fails otherwise; 404 for an unknown id.
async fn stream_video(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let record = find_video(&ctx, &id).await?;
    let locator = record.storage_locator()?;

    if let Some(reset_secs) = ctx.throttle_gate() {
        tracing::debug!(video = %id, reset_secs, "Throttle window open, not contacting upstream");
        return Ok(rate_limit_response(reset_secs, RATE_LIMIT_MESSAGE));
    }

    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    let range = range_header.and_then(RangeRequest::parse);
    if range_header.is_some() && range.is_none() {
        tracing::debug!(video = %id, range = ?range_header, "Ignoring unsupported Range header");
    }

    let prepared = ctx.relay.prepare(AssetKind::Video, locator, range).await?;

    tracing::info!(
        video = %id,
        name = %prepared.handle().display_name(),
        status = prepared.status().as_u16(),
        start = prepared.window().start,
        end = ?prepared.window().end,
        "Streaming video"
    );

    Ok(prepared.into_response(None))
}

/// Name and size from the upstream, plus the catalog duration.
async fn video_metadata(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = find_video(&ctx, &id).await?;
    let locator = record.storage_locator()?;

    if let Some(reset_secs) = ctx.throttle_gate() {
        return Ok(rate_limit_response(reset_secs, RATE_LIMIT_MESSAGE));
    }

    let handle = ctx
        .locator()
        .resolve_handle(AssetKind::Video, locator)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "name": handle.display_name(),
            "size": handle.resolved_size,
            "duration": record.duration,
        }
    }))
    .into_response())
}
