//! Image series routes: page listing, page stream, and cover.
//!
//! Page and cover streams are consumed as `<img src>`, so they never answer
//! with a JSON error. Any failure before the body starts becomes a redirect to
//! a placeholder image; throttle failures also carry `X-Rate-Limit-Reset` so the
//! client still learns the window.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mediarelay_common::{AssetHandle, Error, Result, SeriesId};
use serde::Serialize;

use super::{placeholder_redirect, rate_limit_response, AppContext, AppError};
use crate::catalog::SeriesRecord;
use crate::server::error::RATE_LIMIT_MESSAGE;

pub fn image_routes() -> Router<AppContext> {
    Router::new()
        .route("/image-series/:id/pages", get(list_pages))
        .route("/image-series/:id/page/:n/stream", get(stream_page))
        .route("/image-series/:id/cover", get(stream_cover))
}

#[derive(Debug, Serialize)]
struct PageEntry {
    name: String,
    url: String,
    index: usize,
}

fn placeholder_url(template: &str, seed: &str) -> String {
    template.replace("{seed}", seed)
}

fn page_stream_url(id: &str, n: usize) -> String {
    format!("/assets/image-series/{id}/page/{n}/stream")
}

async fn find_series(ctx: &AppContext, id: &str) -> Result<SeriesRecord> {
    let id = SeriesId::from(id);
    ctx.catalog
        .find_series(&id)
        .await?
        .ok_or_else(|| Error::not_found(format!("image series {id}")))
}

/// Ordered page listing consumed before individual page requests.
async fn list_pages(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> std::result::Result<Response, AppError> {
    let record = find_series(&ctx, &id).await?;
    let locator = record.storage_locator()?;

    if let Some(reset_secs) = ctx.throttle_gate() {
        return Ok(rate_limit_response(reset_secs, RATE_LIMIT_MESSAGE));
    }

    match ctx.locator().list_children(locator).await {
        Ok(pages) => {
            let entries: Vec<PageEntry> = pages
                .iter()
                .enumerate()
                .map(|(i, page)| PageEntry {
                    name: page.display_name().to_string(),
                    url: page_stream_url(&id, i + 1),
                    index: i + 1,
                })
                .collect();

            tracing::debug!(series = %id, pages = entries.len(), "Listed series pages");

            Ok(Json(serde_json::json!({
                "success": true,
                "total": entries.len(),
                "data": entries,
                "seriesName": record.name,
            }))
            .into_response())
        }
        Err(Error::Throttled { reset_secs }) => {
            Ok(rate_limit_response(reset_secs, RATE_LIMIT_MESSAGE))
        }
        Err(err) => {
            tracing::warn!(series = %id, error = %err, "Folder listing failed, serving placeholders");

            let template = &ctx.config.relay.page_placeholder;
            let entries: Vec<PageEntry> = (0..ctx.config.relay.page_placeholder_count)
                .map(|i| PageEntry {
                    name: format!("page_{}.jpg", i + 1),
                    url: placeholder_url(template, &format!("{id}-{i}")),
                    index: i + 1,
                })
                .collect();

            Ok(Json(serde_json::json!({
                "success": true,
                "total": entries.len(),
                "data": entries,
                "fallback": true,
                "message": "Using placeholder images, upstream folder could not be read",
            }))
            .into_response())
        }
    }
}

/// Shared tail of the page and cover handlers.
async fn relay_image(
    ctx: &AppContext,
    id: &str,
    page: usize,
    placeholder: &str,
) -> Response {
    let resolve = async {
        let record = find_series(ctx, id).await?;
        let locator = record.storage_locator()?.to_string();
        if let Some(reset_secs) = ctx.throttle_gate() {
            return Err(Error::throttled(reset_secs));
        }
        let handle: AssetHandle = ctx.locator().page(&locator, page).await?;
        ctx.relay.prepare_resolved(handle, None).await
    };

    match resolve.await {
        Ok(prepared) => {
            tracing::debug!(
                series = %id,
                page,
                name = %prepared.handle().display_name(),
                "Streaming image"
            );
            let cache_control = format!(
                "public, max-age={}",
                ctx.config.relay.image_max_age_secs
            );
            prepared.into_response(Some(&cache_control))
        }
        Err(err) => {
            tracing::debug!(series = %id, page, error = %err, "Redirecting to placeholder");
            placeholder_redirect(placeholder, err.reset_secs())
        }
    }
}

/// Stream page `n` (1-based) of a series.
async fn stream_page(
    State(ctx): State<AppContext>,
    Path((id, n)): Path<(String, String)>,
) -> Response {
    let page = n.parse::<usize>().unwrap_or(0);
    let seed = format!("{}-{}", id, page.saturating_sub(1));
    let placeholder = placeholder_url(&ctx.config.relay.page_placeholder, &seed);

    relay_image(&ctx, &id, page, &placeholder).await
}

/// Stream the first page as the series cover.
async fn stream_cover(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let placeholder = placeholder_url(&ctx.config.relay.cover_placeholder, &id);

    relay_image(&ctx, &id, 1, &placeholder).await
}
