use std::path::Path;

use crate::domain::value_objects::RouteClass;
use crate::infrastructure::config::RuntimeMode;

/// Framework-internal and static asset prefixes that bypass the pipeline
pub const STATIC_PREFIXES: &[&str] = &[
    "/_next/static",
    "/_next/image",
    "/_next/webpack-hmr",
    "/__nextjs",
    "/static/",
    "/public/",
    "/favicon.ico",
    "/manifest.json",
    "/sw.js",
    "/workbox-",
    "/robots.txt",
];

/// What the pipeline does with a path before any security check runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    /// Pass straight through, untouched
    Skip,
    /// Development-only route outside development: empty 404
    BlockNotFound,
    Continue,
}

pub fn classify_path(path: &str, mode: RuntimeMode) -> PathDecision {
    if is_static_asset(path) {
        return PathDecision::Skip;
    }
    if mode != RuntimeMode::Development && RouteClass::classify(path).development {
        return PathDecision::BlockNotFound;
    }
    PathDecision::Continue
}

fn is_static_asset(path: &str) -> bool {
    if STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    if path.starts_with("/api/") {
        return false;
    }
    // Dotfiles like `/.env` have no extension and stay in the pipeline
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    Path::new(last_segment).extension().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/_next/static/chunks/main.js")]
    #[case("/_next/image?url=%2Flogo.png")]
    #[case("/favicon.ico")]
    #[case("/static/app.css")]
    #[case("/workbox-3f2a.js")]
    #[case("/images/logo.png")]
    fn test_static_assets_skip(#[case] path: &str) {
        assert_eq!(classify_path(path, RuntimeMode::Production), PathDecision::Skip);
    }

    #[rstest]
    #[case("/api/v1/export.csv")]
    #[case("/dashboard")]
    #[case("/.env")]
    #[case("/")]
    fn test_pipeline_paths_continue(#[case] path: &str) {
        assert_eq!(classify_path(path, RuntimeMode::Production), PathDecision::Continue);
    }

    #[test]
    fn test_development_routes_blocked_outside_development() {
        assert_eq!(
            classify_path("/debug/state", RuntimeMode::Production),
            PathDecision::BlockNotFound
        );
        assert_eq!(classify_path("/debug/state", RuntimeMode::Development), PathDecision::Continue);
    }
}
