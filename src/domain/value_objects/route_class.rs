/// Pages and endpoints reachable without a session
pub const PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
    "/about",
    "/privacy",
    "/terms",
    "/api/health",
    "/api/v1/auth",
    "/gateway/health",
];

/// Dashboard pages that require a session
pub const PROTECTED_ROUTES: &[&str] = &[
    "/dashboard",
    "/profile",
    "/settings",
    "/analytics",
    "/reports",
    "/users",
    "/kanban",
    "/calendar",
    "/gantt",
    "/export",
];

/// Pages and endpoints that additionally require the admin role
pub const ADMIN_ROUTES: &[&str] =
    &["/admin", "/dashboard/admin", "/settings/system", "/api/v1/admin"];

/// API endpoints that require a session
pub const API_PROTECTED_ROUTES: &[&str] = &[
    "/api/v1/users",
    "/api/v1/data",
    "/api/v1/upload",
    "/api/v1/reports",
    "/api/v1/analytics",
    "/api/v1/admin",
];

/// Tooling routes that only exist while developing
pub const DEVELOPMENT_ROUTES: &[&str] =
    &["/dev", "/debug", "/test", "/storybook", "/api/dev", "/api/debug"];

/// Routes subject to rate limiting
pub const RATE_LIMITED_ROUTES: &[&str] =
    &["/api", "/login", "/register", "/forgot-password", "/reset-password"];

/// Membership of a path in each of the static route tables.
///
/// Tables overlap: `/dashboard/admin` is both protected and admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RouteClass {
    pub public: bool,
    pub protected: bool,
    pub admin: bool,
    pub api_protected: bool,
    pub development: bool,
    pub rate_limited: bool,
}

impl RouteClass {
    /// Classify a request path against the static tables
    pub fn classify(path: &str) -> Self {
        Self {
            public: matches_any(path, PUBLIC_ROUTES),
            protected: matches_any(path, PROTECTED_ROUTES),
            admin: matches_any(path, ADMIN_ROUTES),
            api_protected: matches_any(path, API_PROTECTED_ROUTES),
            development: matches_any(path, DEVELOPMENT_ROUTES),
            rate_limited: matches_any(path, RATE_LIMITED_ROUTES),
        }
    }

    /// Admin routes always need a session; public entries win over the rest
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.admin || ((self.protected || self.api_protected) && !self.public)
    }

    #[must_use]
    pub fn requires_admin(&self) -> bool {
        self.admin
    }
}

fn matches_any(path: &str, table: &[&str]) -> bool {
    table.iter().any(|prefix| matches_prefix(path, prefix))
}

/// `/` only matches itself; everything else matches on a segment boundary,
/// so `/admin` covers `/admin/users` but not `/administrator`.
pub fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/admin", "/admin", true)]
    #[case("/admin/users", "/admin", true)]
    #[case("/administrator", "/admin", false)]
    #[case("/", "/", true)]
    #[case("/dashboard", "/", false)]
    #[case("/api/v1/users/42", "/api", true)]
    fn test_matches_prefix(#[case] path: &str, #[case] prefix: &str, #[case] expected: bool) {
        assert_eq!(matches_prefix(path, prefix), expected);
    }

    #[test]
    fn test_protected_page() {
        let class = RouteClass::classify("/dashboard/overview");
        assert!(class.protected);
        assert!(class.requires_auth());
        assert!(!class.requires_admin());
        assert!(!class.rate_limited);
    }

    #[test]
    fn test_admin_route_is_also_protected() {
        let class = RouteClass::classify("/dashboard/admin/roles");
        assert!(class.protected);
        assert!(class.admin);
        assert!(class.requires_auth());
        assert!(class.requires_admin());
    }

    #[test]
    fn test_public_wins_over_api_protection() {
        let class = RouteClass::classify("/api/v1/auth/login");
        assert!(class.public);
        assert!(class.rate_limited);
        assert!(!class.requires_auth());
    }

    #[test]
    fn test_api_protected_route() {
        let class = RouteClass::classify("/api/v1/data/export");
        assert!(class.api_protected);
        assert!(class.rate_limited);
        assert!(class.requires_auth());
    }

    #[test]
    fn test_development_route() {
        assert!(RouteClass::classify("/debug/routes").development);
        assert!(!RouteClass::classify("/debugger").development);
    }

    #[test]
    fn test_unknown_route_has_no_classes() {
        assert_eq!(RouteClass::classify("/nowhere"), RouteClass::default());
    }
}
