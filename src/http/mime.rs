//! Extension to MIME type mapping.

/// Fallback for unknown extensions.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Returns the MIME type for a file extension (without the dot).
pub fn ext_to_type(ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.');
    mime_guess::from_ext(ext).first_raw().unwrap_or(DEFAULT_MIME)
}

/// Returns the MIME type for the extension of the last segment of `path`.
pub fn ext_to_type_for_path(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext_to_type(ext),
        _ => DEFAULT_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_extensions() {
        assert_eq!(ext_to_type("html"), "text/html");
        assert_eq!(ext_to_type(".json"), "application/json");
        assert_eq!(ext_to_type("nope-not-real"), DEFAULT_MIME);
        assert_eq!(ext_to_type_for_path("/static/app.css"), "text/css");
        assert_eq!(ext_to_type_for_path("/v1.2/README"), DEFAULT_MIME);
    }
}
