use crate::media::MediaRegistry;
use crate::session::StreamSelector;

/// The path of a request URL, split at its last `/`.
///
/// `rtsp://host:8554/cam1/track1` → `("cam1", "track1")`
/// `rtsp://host:8554/cam1`        → `("", "cam1")`
/// `rtsp://host:8554/live/cam1/track1` → `("live/cam1", "track1")`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pre_suffix: String,
    suffix: String,
}

impl RequestTarget {
    pub fn from_uri(uri: &str) -> Self {
        let path = if let Some(after) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            after.find('/').map(|slash| &after[slash..]).unwrap_or("")
        } else if uri.starts_with('/') {
            uri
        } else {
            ""
        };
        let path = path.trim_matches('/');

        let (pre_suffix, suffix) = match path.rfind('/') {
            Some(pos) => (&path[..pos], &path[pos + 1..]),
            None => ("", path),
        };

        Self {
            pre_suffix: pre_suffix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn pre_suffix(&self) -> &str {
        &self.pre_suffix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The full path, without leading or trailing slashes.
    pub fn path(&self) -> String {
        if self.pre_suffix.is_empty() {
            self.suffix.clone()
        } else {
            format!("{}/{}", self.pre_suffix, self.suffix)
        }
    }

    /// Stream name and track id a SETUP on this URL refers to.
    ///
    /// The last path segment is a track of the stream named by the rest,
    /// unless only the full path names a registered stream.
    pub fn setup_names(&self, registry: &MediaRegistry) -> (String, Option<String>) {
        if self.pre_suffix.is_empty() {
            return (self.suffix.clone(), None);
        }
        if registry.lookup(&self.pre_suffix).is_none() {
            let path = self.path();
            if registry.lookup(&path).is_some() {
                return (path, None);
            }
        }
        (self.pre_suffix.clone(), Some(self.suffix.clone()))
    }

    /// Which streams of a session bound to `stream_name` this URL addresses,
    /// or `None` when it names some other stream.
    pub fn selector_for(&self, stream_name: &str) -> Option<StreamSelector> {
        let (pre, suffix) = (self.pre_suffix.as_str(), self.suffix.as_str());

        if !suffix.is_empty() && pre == stream_name {
            Some(StreamSelector::Track(suffix.to_string()))
        } else if suffix == stream_name || (suffix.is_empty() && pre == stream_name) {
            Some(StreamSelector::Aggregate)
        } else if !pre.is_empty() && !suffix.is_empty() && self.path() == stream_name {
            Some(StreamSelector::Aggregate)
        } else {
            None
        }
    }
}
