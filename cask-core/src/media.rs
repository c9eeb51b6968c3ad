/// Best-effort media type from a file name's extension. Unknown extensions
/// map to an empty string, mirroring drop sources that report no type.
pub fn media_type_for(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "",
    };
    match ext.as_str() {
        "js" | "mjs" => "text/javascript",
        "wasm" => "application/wasm",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "txt" | "md" | "log" => "text/plain",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        // Unity WebGL exports ship the data blob under these extensions.
        "data" | "bin" | "bundle" | "unityweb" => "application/octet-stream",
        _ => "",
    }
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

/// Text and structured-text types that a viewer can decode as UTF-8.
pub fn is_textual(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type == "application/json"
        || media_type == "application/xml"
}
