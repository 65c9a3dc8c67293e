use std::env;

use actix_cors::Cors;
use actix_web::http::header;

/// CORS for the browser client. Origins come from `CORS_ALLOWED_ORIGINS`
/// (comma-separated); empty, "null" and non-http(s) entries are ignored.
pub fn cors_middleware() -> Cors {
    let allowed_raw = env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default();

    let allowed_origins: Vec<String> = allowed_raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "null")
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(|s| s.to_string())
        .collect();

    // Local dev client when nothing valid is configured
    let effective_origins: Vec<String> = if allowed_origins.is_empty() {
        vec![
            "http://localhost:4200".to_string(),
            "http://127.0.0.1:4200".to_string(),
        ]
    } else {
        allowed_origins
    };

    let mut cors = Cors::default()
        // The HTTP surface is read-only
        .allowed_methods(vec!["GET", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-request-id"),
        ])
        .expose_headers(vec![
            header::HeaderName::from_static("x-trace-id"),
            header::HeaderName::from_static("x-request-id"),
            header::HeaderName::from_static("x-ratelimit-remaining"),
        ])
        .max_age(3600);

    for origin in effective_origins {
        cors = cors.allowed_origin(&origin);
    }

    cors
}
