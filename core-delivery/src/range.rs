//! # Range Request Handling
//!
//! Resolves an HTTP `Range` header against a file size into the exact byte
//! span to serve and the headers that describe it.
//!
//! ## Rules
//!
//! - No header: full content (200)
//! - `bytes=a-b`: inclusive span, rejected unless `a <= b < size`
//! - `bytes=a-`: from `a` to the last byte
//! - `bytes=-n`: the last `n` bytes (the whole file when `n >= size`)
//! - `bytes=a-b, c-d`: only the first range is honored
//! - Anything else, or a span that falls outside the file: 416
//!
//! Every span handed out satisfies `0 <= start <= end < size`. A span that
//! does not fit is rejected, never shortened.

use crate::error::{DeliveryError, Result};

/// Default `Cache-Control` for audio content, which is immutable once uploaded.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Inclusive byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for this span.
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_size)
    }

    /// True if `other` lies entirely inside this span.
    pub fn covers(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Whether a response carries the whole file or part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// 200 OK
    Full,
    /// 206 Partial Content
    Partial,
}

/// The resolved response shape for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedRange {
    pub kind: RangeKind,
    /// `None` only for a full response of an empty file
    pub span: Option<ByteRange>,
    pub file_size: u64,
}

impl ServedRange {
    pub fn content_length(&self) -> u64 {
        self.span.map_or(0, |s| s.len())
    }

    pub fn is_partial(&self) -> bool {
        self.kind == RangeKind::Partial
    }

    /// `Content-Range` header value, present for partial responses.
    pub fn content_range(&self) -> Option<String> {
        match (self.kind, self.span) {
            (RangeKind::Partial, Some(span)) => Some(span.content_range(self.file_size)),
            _ => None,
        }
    }
}

/// `Content-Range` value sent with a 416 response.
pub fn unsatisfiable_content_range(file_size: u64) -> String {
    format!("bytes */{}", file_size)
}

/// Parse a raw `Range` header value for a file of `file_size` bytes.
///
/// Returns `Ok(None)` when the header is absent or blank.
pub fn parse_range_header(header: Option<&str>, file_size: u64) -> Result<Option<ByteRange>> {
    let Some(raw) = header.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    let unsatisfiable = || DeliveryError::RangeNotSatisfiable { file_size };

    let (unit, specs) = raw.split_once('=').ok_or_else(unsatisfiable)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(unsatisfiable());
    }

    // Multipart responses are not produced; the first range wins.
    let spec = specs.split(',').next().unwrap_or_default().trim();
    let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if file_size == 0 {
        return Err(unsatisfiable());
    }
    let last = file_size - 1;

    let range = if start.is_empty() {
        let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        ByteRange {
            start: file_size.saturating_sub(suffix),
            end: last,
        }
    } else {
        let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
        let end: u64 = if end.is_empty() {
            last
        } else {
            end.parse().map_err(|_| unsatisfiable())?
        };
        ByteRange { start, end }
    };

    if range.start > range.end || range.start >= file_size || range.end >= file_size {
        return Err(unsatisfiable());
    }

    Ok(Some(range))
}

/// Turns `Range` headers into response shapes and headers.
#[derive(Debug, Clone)]
pub struct RangeRequestHandler {
    cache_control: String,
}

impl Default for RangeRequestHandler {
    fn default() -> Self {
        Self {
            cache_control: IMMUTABLE_CACHE_CONTROL.to_string(),
        }
    }
}

impl RangeRequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = value.into();
        self
    }

    /// Resolve the span to serve.
    ///
    /// # Errors
    ///
    /// `DeliveryError::RangeNotSatisfiable` when the header is malformed or
    /// falls outside the file.
    pub fn resolve(&self, header: Option<&str>, file_size: u64) -> Result<ServedRange> {
        match parse_range_header(header, file_size)? {
            Some(span) => Ok(ServedRange {
                kind: RangeKind::Partial,
                span: Some(span),
                file_size,
            }),
            None => Ok(ServedRange {
                kind: RangeKind::Full,
                span: (file_size > 0).then(|| ByteRange {
                    start: 0,
                    end: file_size - 1,
                }),
                file_size,
            }),
        }
    }

    /// Response headers describing `served`.
    pub fn headers(&self, served: &ServedRange, content_type: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("content-type", content_type.to_string()),
            ("content-length", served.content_length().to_string()),
            ("accept-ranges", "bytes".to_string()),
            ("cache-control", self.cache_control.clone()),
        ];
        if let Some(content_range) = served.content_range() {
            headers.push(("content-range", content_range));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(header: &str, size: u64) -> Result<Option<ByteRange>> {
        parse_range_header(Some(header), size)
    }

    fn span(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    #[test]
    fn test_absent_or_blank_header() {
        assert_eq!(parse_range_header(None, 100).unwrap(), None);
        assert_eq!(parse_range_header(Some("  "), 100).unwrap(), None);
    }

    #[test]
    fn test_closed_and_open_ranges() {
        assert_eq!(parse("bytes=0-99", 100).unwrap(), span(0, 99));
        assert_eq!(parse("bytes=10-10", 100).unwrap(), span(10, 10));
        assert_eq!(parse("bytes=500000-", 1_000_000).unwrap(), span(500_000, 999_999));
        assert_eq!(parse("Bytes = 5 - 9", 100).unwrap(), span(5, 9));
    }

    #[test]
    fn test_suffix_ranges() {
        assert_eq!(parse("bytes=-10", 100).unwrap(), span(90, 99));
        assert_eq!(parse("bytes=-500", 100).unwrap(), span(0, 99));
        assert!(parse("bytes=-0", 100).is_err());
    }

    #[test]
    fn test_rejections() {
        for header in [
            "bytes=100-",
            "bytes=50-10",
            "bytes=0-100",
            "bytes=abc-",
            "bytes=1-x",
            "bytes=",
            "bytes=5",
            "items=0-5",
            "0-5",
            "bytes=-",
        ] {
            match parse(header, 100) {
                Err(DeliveryError::RangeNotSatisfiable { file_size }) => assert_eq!(file_size, 100),
                other => panic!("{header:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_file_rejects_any_range() {
        assert!(parse("bytes=0-", 0).is_err());
        assert!(parse("bytes=-1", 0).is_err());
    }

    #[test]
    fn test_multi_range_uses_first() {
        assert_eq!(parse("bytes=0-9, 20-29", 100).unwrap(), span(0, 9));
        assert!(parse("bytes=200-300, 0-9", 100).is_err());
    }

    #[test]
    fn test_every_valid_span_has_exact_length() {
        let size = 37u64;
        for a in 0..size {
            for b in a..size {
                let served = RangeRequestHandler::new()
                    .resolve(Some(&format!("bytes={a}-{b}")), size)
                    .unwrap();
                assert!(served.is_partial());
                assert_eq!(served.content_length(), b - a + 1);
                assert_eq!(served.content_range().unwrap(), format!("bytes {a}-{b}/{size}"));
            }
        }
    }

    #[test]
    fn test_full_response_headers() {
        let handler = RangeRequestHandler::new();
        let served = handler.resolve(None, 1234).unwrap();
        assert_eq!(served.kind, RangeKind::Full);
        assert_eq!(served.content_length(), 1234);
        assert!(served.content_range().is_none());

        let headers = handler.headers(&served, "audio/mpeg");
        assert!(headers.contains(&("accept-ranges", "bytes".to_string())));
        assert!(headers.contains(&("content-length", "1234".to_string())));
        assert!(headers.iter().any(|(k, v)| *k == "cache-control" && v.contains("immutable")));
        assert!(!headers.iter().any(|(k, _)| *k == "content-range"));

        let empty = handler.resolve(None, 0).unwrap();
        assert_eq!(empty.content_length(), 0);
    }

    #[test]
    fn test_partial_headers_and_unsatisfiable_value() {
        let handler = RangeRequestHandler::new().with_cache_control("no-store");
        let served = handler.resolve(Some("bytes=500000-"), 1_000_000).unwrap();
        let headers = handler.headers(&served, "audio/mpeg");
        assert!(headers.contains(&("content-range", "bytes 500000-999999/1000000".to_string())));
        assert!(headers.contains(&("content-length", "500000".to_string())));
        assert!(headers.contains(&("cache-control", "no-store".to_string())));

        assert_eq!(unsatisfiable_content_range(1_000_000), "bytes */1000000");
    }

    #[test]
    fn test_covers() {
        let cached = ByteRange { start: 0, end: 1023 };
        assert!(cached.covers(&ByteRange { start: 0, end: 1 }));
        assert!(cached.covers(&ByteRange { start: 1000, end: 1023 }));
        assert!(!cached.covers(&ByteRange { start: 1000, end: 1024 }));
    }
}
