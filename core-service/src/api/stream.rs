//! Audio streaming handlers.
//!
//! `GET` serves bytes (whole file or one range), `HEAD` describes the file
//! and `OPTIONS` advertises what the endpoint accepts. Query parameters are
//! never rejected: unknown values fall back to defaults and chunk sizes are
//! clamped.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bridge_traits::AudioFormat;
use core_delivery::quality::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use core_delivery::range::ByteRange;
use core_delivery::{ProfileOptions, RequestedQuality, SampleSource};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use super::response::ApiResult;
use super::AppState;

pub const X_PROCESSING_TIME: &str = "x-processing-time";
pub const X_NETWORK_SPEED: &str = "x-network-speed";
pub const X_CHUNK_SIZE: &str = "x-chunk-size";
pub const X_ADAPTIVE_ENABLED: &str = "x-adaptive-enabled";
pub const X_QUALITY_PROFILE: &str = "x-quality-profile";
pub const X_SERVED_FROM: &str = "x-served-from";
pub const X_AUDIO_DURATION: &str = "x-audio-duration";
pub const X_AUDIO_BITRATE: &str = "x-audio-bitrate";
pub const X_AUDIO_FORMAT: &str = "x-audio-format";

/// Raw stream query. Everything is a string so bad values degrade instead of failing.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub quality: Option<String>,
    pub adaptive: Option<String>,
    pub compression: Option<String>,
    pub chunk_size: Option<String>,
    pub network_speed: Option<String>,
    pub format: Option<String>,
}

impl StreamQuery {
    fn adaptive(&self) -> bool {
        match self.adaptive.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "false" || v == "0" || v == "no" => false,
            _ => true,
        }
    }

    fn chunk_size(&self) -> Option<u64> {
        self.chunk_size.as_deref().and_then(|v| v.trim().parse().ok())
    }

    fn network_speed(&self) -> Option<f64> {
        self.network_speed
            .as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl AsRef<str>) {
    if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// `GET /audio/{id}/stream`
#[instrument(skip(state, query, request_headers))]
pub async fn stream_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    request_headers: HeaderMap,
) -> ApiResult<Response> {
    let started = Instant::now();
    let audio = state.metadata().require(&id).await?;
    let file_size = audio.metadata.file_size;

    if let Some(speed) = query.network_speed() {
        state.network().record_sample(speed, SampleSource::Client);
    }
    let metrics = state.network().current_metrics();

    if let Some(requested) = query.format.as_deref() {
        if requested.parse::<AudioFormat>().ok() != Some(audio.metadata.format) {
            debug!(requested, stored = %audio.metadata.format.as_str(), "Serving stored format");
        }
    }
    if let Some(compression) = query.compression.as_deref() {
        debug!(compression, "Compression hint ignored for stored audio");
    }

    let options = ProfileOptions {
        quality: RequestedQuality::parse_lenient(query.quality.as_deref()),
        adaptive: query.adaptive(),
        chunk_size: query.chunk_size(),
        format: Some(audio.metadata.format),
        source_bitrate: Some(audio.metadata.bitrate),
    };
    let profile = state.selector().select_for_request(&options, &metrics);

    let range = request_headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let served = state.range_handler().resolve(range, file_size)?;

    let (body, source) = match served.span {
        None => (Body::empty(), "storage"),
        Some(span) => {
            let cached = state.cache().peek(&id, None).filter(|prefix| {
                !prefix.is_empty()
                    && ByteRange {
                        start: 0,
                        end: prefix.len() as u64 - 1,
                    }
                    .covers(&span)
            });
            match cached {
                Some(prefix) => {
                    let slice = prefix.slice(span.start as usize..=span.end as usize);
                    (Body::from(slice), "cache")
                }
                None => {
                    let reader = state
                        .dependencies()
                        .storage
                        .open_range(&audio.storage_key, span.start, span.len())
                        .await
                        .map_err(core_delivery::DeliveryError::from)?;
                    let stream = ReaderStream::with_capacity(reader, profile.chunk_size);
                    (Body::from_stream(stream), "storage")
                }
            }
        }
    };

    let status = if served.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    for (name, value) in state.range_handler().headers(&served, audio.metadata.format.mime_type()) {
        set_header(headers, name, value);
    }
    set_header(headers, X_NETWORK_SPEED, format!("{:.2}", metrics.speed_mbps));
    set_header(headers, X_CHUNK_SIZE, profile.chunk_size.to_string());
    set_header(
        headers,
        X_ADAPTIVE_ENABLED,
        (options.adaptive && state.selector().adaptive_enabled()).to_string(),
    );
    set_header(headers, X_QUALITY_PROFILE, &profile.name);
    set_header(headers, X_SERVED_FROM, source);
    set_header(
        headers,
        X_PROCESSING_TIME,
        format!("{:.3}ms", started.elapsed().as_secs_f64() * 1000.0),
    );

    debug!(
        audio_id = %id,
        status = status.as_u16(),
        length = served.content_length(),
        source,
        quality = %profile.name,
        "Stream response ready"
    );
    Ok(response)
}

/// `HEAD /audio/{id}/stream`
pub async fn head_audio(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let audio = state.metadata().require(&id).await?;
    let metadata = &audio.metadata;

    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    set_header(headers, "content-type", metadata.format.mime_type());
    set_header(headers, "content-length", metadata.file_size.to_string());
    set_header(headers, "accept-ranges", "bytes");
    set_header(headers, X_AUDIO_DURATION, metadata.duration.to_string());
    set_header(headers, X_AUDIO_BITRATE, metadata.bitrate.to_string());
    set_header(headers, X_AUDIO_FORMAT, metadata.format.as_str());
    Ok(response)
}

/// `OPTIONS /audio/{id}/stream`
pub async fn stream_options(State(state): State<AppState>) -> Response {
    let selector = state.selector();
    let chunk_sizes: serde_json::Map<String, serde_json::Value> = selector
        .recommended_chunk_sizes()
        .into_iter()
        .map(|(tier, size)| (tier.as_str().to_string(), json!(size)))
        .collect();

    let body = json!({
        "supportedQualities": RequestedQuality::all().iter().map(|q| q.as_str()).collect::<Vec<_>>(),
        "supportedFormats": AudioFormat::supported().iter().map(|f| f.as_str()).collect::<Vec<_>>(),
        "recommendedChunkSizes": chunk_sizes,
        "chunkSizeLimits": { "min": MIN_CHUNK_SIZE, "max": MAX_CHUNK_SIZE },
        "adaptiveStreaming": selector.adaptive_enabled(),
        "rangeRequests": "bytes",
    });

    let mut response = Json(body).into_response();
    set_header(response.headers_mut(), "allow", "GET, HEAD, OPTIONS");
    response
}
