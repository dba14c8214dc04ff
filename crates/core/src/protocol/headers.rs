//! PLAY request headers: `Range` (RFC 2326 §12.29, §3.6–3.7) and
//! `Scale` (§12.34).

/// Parsed `Range` request header.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeHeader {
    /// Normal play time, in seconds. `npt=now-` parses as a start of 0.
    Npt { start: f64, end: Option<f64> },
    /// Absolute UTC time, kept verbatim (`19961108T143720.25Z`).
    Clock { start: String, end: Option<String> },
}

impl RangeHeader {
    /// Parse a `Range` header value. Returns `None` for units other than
    /// `npt` and `clock`, or malformed times.
    ///
    /// ```
    /// use rtsp::protocol::headers::RangeHeader;
    ///
    /// assert_eq!(
    ///     RangeHeader::parse("npt=5.000-"),
    ///     Some(RangeHeader::Npt { start: 5.0, end: None })
    /// );
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        // Drop any ";time=..." suffix.
        let spec = value.split(';').next()?.trim();

        if let Some(npt) = spec.strip_prefix("npt=") {
            let (start, end) = npt.split_once('-')?;
            let start = match start.trim() {
                "" | "now" => 0.0,
                s => s.parse().ok()?,
            };
            let end = match end.trim() {
                "" => None,
                e => Some(e.parse().ok()?),
            };
            Some(RangeHeader::Npt { start, end })
        } else if let Some(clock) = spec.strip_prefix("clock=") {
            let (start, end) = clock.split_once('-')?;
            let start = start.trim();
            if start.is_empty() {
                return None;
            }
            let end = Some(end.trim()).filter(|e| !e.is_empty());
            Some(RangeHeader::Clock {
                start: start.to_string(),
                end: end.map(str::to_string),
            })
        } else {
            None
        }
    }
}

/// Parse a `Scale` header value.
pub fn parse_scale(value: &str) -> Option<f32> {
    value.trim().parse().ok().filter(|s: &f32| s.is_finite())
}

/// `Range` response value for a PLAY.
///
/// Absolute ranges are mirrored back as sent. Otherwise the NPT start is
/// echoed (0 when no range was given), open-ended unless an end was given
/// or playback runs backwards.
pub fn range_response(range: Option<&RangeHeader>, scale: f32) -> String {
    match range {
        Some(RangeHeader::Clock { start, end: None }) => format!("clock={start}-"),
        Some(RangeHeader::Clock {
            start,
            end: Some(end),
        }) => format!("clock={start}-{end}"),
        Some(RangeHeader::Npt { start, end }) => npt_range(*start, *end, scale),
        None => npt_range(0.0, None, scale),
    }
}

fn npt_range(start: f64, end: Option<f64>, scale: f32) -> String {
    match end {
        None if scale >= 0.0 => format!("npt={start:.3}-"),
        end => format!("npt={start:.3}-{:.3}", end.unwrap_or(0.0)),
    }
}

/// `Scale` response value, six decimal places.
pub fn scale_response(scale: f32) -> String {
    format!("{scale:.6}")
}
