//! Bulk endpoint handler.

use axum::extract::{OriginalUri, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, Uri};
use axum::Json;

use bulkapi_core::RequestContext;

use crate::error::ApiError;
use crate::schema::bulk::{BulkRequest, BulkResponse};
use crate::state::AppState;

/// `POST {bulk path}`
pub async fn bulk(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    let config = state.engine.config();
    let ctx = request_context(&uri, &headers, &config.default_scheme)?;
    if !config.authority_allowed(&ctx.authority) {
        return Err(ApiError::BadRequest(format!(
            "bulk requests are not served for host '{}'",
            ctx.authority
        )));
    }
    let results = state.engine.execute(req.operations, &ctx).await?;
    Ok(Json(BulkResponse { results }))
}

/// Recovers where the bulk request arrived: scheme from `X-Forwarded-Proto`
/// (then the request URI, then `default_scheme`), authority from the request
/// URI or the `Host` header, and the full inbound path.
///
/// Both headers are client-controlled and sub-requests are sent to the
/// authority found here. Unless the engine has a `UriTransform` pinning the
/// upstream, restrict it with `BulkConfig::allowed_authorities`.
pub fn request_context(
    uri: &Uri,
    headers: &HeaderMap,
    default_scheme: &str,
) -> Result<RequestContext, ApiError> {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| default_scheme.to_string());

    let authority = uri
        .authority()
        .map(|a| a.to_string())
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::BadRequest("request carries no Host header".to_string()))?;

    Ok(RequestContext::new(scheme, authority, uri.path()))
}
