//! Fixed extension -> MIME table for assets served out of archives.

pub const OCTET_STREAM: &str = "application/octet-stream";

pub fn mime_for_path(path: &str) -> &'static str {
    let ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() => ext,
        _ => return OCTET_STREAM,
    };
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "css" => "text/css",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => OCTET_STREAM,
    }
}

/// Extension for a MIME type, used to name extracted cover files.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(mime_for_path("OEBPS/Images/cover.JPG"), "image/jpeg");
        assert_eq!(mime_for_path("a/b.svg"), "image/svg+xml");
        assert_eq!(mime_for_path("styles/main.css"), "text/css");
    }

    #[test]
    fn unknown_extensions_are_binary() {
        assert_eq!(mime_for_path("data/blob.xyz"), OCTET_STREAM);
        assert_eq!(mime_for_path("noext"), OCTET_STREAM);
        assert_eq!(mime_for_path("dir.d/noext"), OCTET_STREAM);
        assert_eq!(mime_for_path(".hidden"), OCTET_STREAM);
    }

    #[test]
    fn cover_extensions() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/weird"), "bin");
    }
}
