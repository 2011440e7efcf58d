//! Origin policy: local development hosts, the production site and its
//! subdomains, and Netlify deploy previews.

use axum::http::header::{HeaderName, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().map(origin_allowed).unwrap_or(false)
            },
        ))
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
            AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn origin_allowed(origin: &str) -> bool {
    let Some(host) = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
    else {
        return false;
    };
    let host = host.split(':').next().unwrap_or(host);

    if host == "localhost" || host == "127.0.0.1" {
        return true;
    }
    // The apex is https-only; subdomains are accepted on any scheme.
    if origin == "https://lockpick.co" || host.ends_with(".lockpick.co") {
        return true;
    }
    is_deploy_preview(origin)
}

/// `https://deploy-preview-<digits>--play-lockpick.netlify.app`, optional
/// trailing slash.
fn is_deploy_preview(origin: &str) -> bool {
    let Some(rest) = origin.strip_prefix("https://deploy-preview-") else {
        return false;
    };
    let Some(digits) = rest
        .strip_suffix("--play-lockpick.netlify.app")
        .or_else(|| rest.strip_suffix("--play-lockpick.netlify.app/"))
    else {
        return false;
    };
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
