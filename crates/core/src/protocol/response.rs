use crate::error::RtspError;

/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// Server: rtsp-session/0.1\r\n
/// CSeq: 3\r\n
/// Date: Mon, Oct 19 2026 10:00:00 GMT\r\n
/// Session: 0A1B2C3D\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then
/// call [`serialize`](Self::serialize). Responses carry no body.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = "rtsp-session/0.1";

/// Current time in the RFC 1123 form used by the `Date` header (§12.18).
pub fn date_header_value() -> String {
    chrono::Utc::now()
        .format("%a, %b %d %Y %H:%M:%S GMT")
        .to_string()
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
        }
    }

    /// 200 OK (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// Status line for a failed command, per [`RtspError::status`].
    pub fn from_error(error: &RtspError) -> Self {
        let (code, text) = error.status();
        Self::new(code, text)
    }

    /// Add a `Date` header with the current time.
    pub fn with_date(self) -> Self {
        let date = date_header_value();
        self.add_header("Date", &date)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Value of the first header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Public", "OPTIONS");
        let s = resp.serialize();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains("Server: rtsp-session/0.1\r\n"));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Public: OPTIONS\r\n"));
        assert!(s.ends_with("\r\n"));
    }

    #[test]
    fn not_found_response() {
        let resp = RtspResponse::from_error(&RtspError::NotFound("cam9".into()))
            .add_header("CSeq", "5");
        assert_eq!(resp.status_code, 404);
        let s = resp.serialize();
        assert!(s.starts_with("RTSP/1.0 404 Not Found\r\n"));
        assert!(s.contains("Server: rtsp-session/0.1\r\n"));
        assert!(s.ends_with("CSeq: 5\r\n\r\n"));
    }

    #[test]
    fn error_statuses() {
        let resp = RtspResponse::from_error(&RtspError::UnsupportedTransport("tcp".into()));
        assert!(
            resp.serialize()
                .starts_with("RTSP/1.0 461 Unsupported Transport\r\n")
        );
        let resp = RtspResponse::from_error(&RtspError::PreconditionFailed("play".into()));
        assert_eq!(resp.status_code, 412);
    }

    #[test]
    fn date_header_format() {
        let resp = RtspResponse::ok().with_date();
        let date = resp.header("date").unwrap();
        assert!(date.ends_with(" GMT"), "{date}");
        // "Mon, Oct 19 2026 10:00:00 GMT"
        assert_eq!(date.len(), 29, "{date}");
        assert_eq!(&date[3..5], ", ");
    }
}
