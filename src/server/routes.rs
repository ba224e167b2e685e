//! MP4 endpoints
//!
//! - `GET /api/stream.mp4?src=&filename=&rotate=&scale=x:y&duration=&video=&audio=&mp4`
//! - `GET /api/frame.mp4?src=&filename=`

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, RawQuery, State};
use axum::http::header::{
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::Instrument;

use super::error::ApiError;
use super::AppState;
use crate::consumer::{capture_keyframe, open_fragmented, ConsumerInfo, FragmentedRequest};
use crate::media::MediaSelection;

type Params = HashMap<String, String>;

/// Live fragmented MP4
pub async fn stream_mp4(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_agent = header_str(&headers, USER_AGENT.as_str());

    if let Some(target) = &state.config.hls_redirect {
        if is_safari(user_agent) && !params.contains_key("duration") {
            let location = redirect_location(target, raw_query.as_deref(), &params);
            return Ok(redirect(&location));
        }
    }

    let src = params.get("src").map(String::as_str).unwrap_or_default();
    let stream = state.registry.require(src)?;

    let remote = remote_addr(connect.map(|c| c.0), &headers);
    let span = tracing::info_span!("mp4", src = %src, remote = %remote);

    let mut request = FragmentedRequest::new(
        ConsumerInfo::new("MP4/HTTP")
            .remote_addr(remote)
            .user_agent(user_agent),
        MediaSelection::from_query(&params),
    );
    request.rotate = params.get("rotate").and_then(|v| v.parse().ok());
    request.scale = params.get("scale").and_then(|v| parse_scale(v));
    request.duration = params.get("duration").and_then(|v| parse_duration(v));
    request.buffer = state.config.output_buffer;

    let (start, session) = open_fragmented(stream, request)
        .instrument(span.clone())
        .await
        .map_err(|e| {
            tracing::debug!(parent: &span, error = %e, "Stream not opened");
            e
        })?;

    tracing::debug!(parent: &span, mime = %start.mime_type, "Stream started");

    tokio::spawn(
        async move {
            match session.run().await {
                Ok(()) => tracing::debug!("Stream finished"),
                Err(e) => tracing::debug!(error = %e, "Stream ended"),
            }
        }
        .instrument(span),
    );

    let mut response = HeaderMap::new();
    response.insert(CONTENT_TYPE, mime_value(&start.mime_type));
    if let Some(disposition) = content_disposition(&params) {
        response.insert(CONTENT_DISPOSITION, disposition);
    }

    let body = Body::from_stream(ReceiverStream::new(start.body).map(Ok::<_, Infallible>));
    Ok((response, body).into_response())
}

/// One keyframe as a self-contained MP4
pub async fn frame_mp4(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user_agent = header_str(&headers, USER_AGENT.as_str());

    // Chrome probes with a Range-less request first
    if user_agent.contains(" Chrome/") && !headers.contains_key(RANGE) {
        return Ok((StatusCode::OK, [(CONTENT_TYPE, "video/mp4")]).into_response());
    }

    let src = params.get("src").map(String::as_str).unwrap_or_default();
    let stream = state.registry.require(src)?;

    let remote = remote_addr(connect.map(|c| c.0), &headers);
    let span = tracing::info_span!("mp4", src = %src, remote = %remote);

    let info = ConsumerInfo::new("MP4/HTTP keyframe")
        .remote_addr(remote)
        .user_agent(user_agent);
    let snapshot = capture_keyframe(stream, info).instrument(span.clone()).await?;

    tracing::debug!(parent: &span, bytes = snapshot.data.len(), "Keyframe delivered");

    let mut response = HeaderMap::new();
    response.insert(CONTENT_LENGTH, HeaderValue::from(snapshot.data.len()));
    response.insert(CONTENT_TYPE, mime_value(&snapshot.mime_type));
    if let Some(disposition) = content_disposition(&params) {
        response.insert(CONTENT_DISPOSITION, disposition);
    }

    Ok((response, Body::from(snapshot.data)).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn is_safari(user_agent: &str) -> bool {
    user_agent.contains(" Safari/") && !user_agent.contains(" Chrome/")
}

/// `<target>?<raw query>`, with `mp4` appended when absent
fn redirect_location(target: &str, raw_query: Option<&str>, params: &Params) -> String {
    let mut location = format!("{}?{}", target, raw_query.unwrap_or_default());
    if !params.contains_key("mp4") {
        if !location.ends_with('?') {
            location.push('&');
        }
        location.push_str("mp4");
    }
    location
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Peer address followed by `X-Forwarded-For`, when present
fn remote_addr(peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
    let peer = peer.map(|p| p.to_string()).unwrap_or_default();
    match header_str(headers, "x-forwarded-for") {
        "" => peer,
        forwarded if peer.is_empty() => forwarded.to_string(),
        forwarded => format!("{}, {}", peer, forwarded),
    }
}

fn parse_scale(value: &str) -> Option<(i32, i32)> {
    let (x, y) = value.split_once(':')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Whole seconds; zero or garbage means no deadline
fn parse_duration(value: &str) -> Option<Duration> {
    value
        .parse::<u64>()
        .ok()
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}

fn content_disposition(params: &Params) -> Option<HeaderValue> {
    let filename = params.get("filename").filter(|f| !f.is_empty())?;
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)).ok()
}

fn mime_value(mime: &str) -> HeaderValue {
    HeaderValue::from_str(mime).unwrap_or_else(|_| HeaderValue::from_static("video/mp4"))
}
