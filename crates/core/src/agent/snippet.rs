pub const TRUNCATION_MARKER: &str = "\n…[truncated]";

/// A request or response body as the call surface saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Json(serde_json::Value),
    Binary { len: usize },
    Multipart,
    Blob { mime: Option<String>, size: usize },
    /// A body produced incrementally; its content is not available up front.
    Stream,
}

impl Body {
    /// Text when the bytes are valid UTF-8, a binary placeholder otherwise.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Body::Text(text.to_string()),
            Err(_) => Body::Binary { len: bytes.len() },
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(text) => text.is_empty(),
            Body::Json(value) => value.is_null(),
            _ => false,
        }
    }

    /// Bounded textual capture of the body. Non-text bodies become a placeholder.
    pub fn snippet(&self, max_len: usize) -> String {
        match self {
            Body::Text(text) => text_snippet(text, max_len),
            Body::Json(value) => match serde_json::to_string(value) {
                Ok(text) => text_snippet(&text, max_len),
                Err(_) => "[unserializable body]".to_string(),
            },
            Body::Binary { len } => format!("[binary: {len} bytes]"),
            Body::Multipart => "[multipart form data]".to_string(),
            Body::Blob { mime, size } => format!(
                "[blob: {}, size: {size}]",
                mime.as_deref().unwrap_or("unknown")
            ),
            Body::Stream => "[streamed body]".to_string(),
        }
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// First `max_len` characters of `text`, followed by [`TRUNCATION_MARKER`] when anything was cut.
pub fn text_snippet(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut snippet = String::with_capacity(cut + TRUNCATION_MARKER.len());
            snippet.push_str(&text[..cut]);
            snippet.push_str(TRUNCATION_MARKER);
            snippet
        }
    }
}
