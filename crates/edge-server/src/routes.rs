//! Route classification by configured path prefixes.

use edge_protocol::{RouteCategory, RouteSets};

/// Prefix marking backend-bound API calls.
pub const API_PREFIX: &str = "/api/";

/// Classifies paths against the configured route sets.
///
/// Precedence is Public > Admin > Protected > Marketing, then InternalApi.
/// By default a pattern matches any path that starts with it, so `/admin`
/// also matches `/administrator`.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    routes: RouteSets,
    segment_matching: bool,
}

impl RouteClassifier {
    pub fn new(routes: RouteSets) -> Self {
        Self {
            routes,
            segment_matching: false,
        }
    }

    /// Only match on whole path segments (`/admin` matches `/admin/x`, not `/administrator`).
    pub fn with_segment_matching(mut self, enabled: bool) -> Self {
        self.segment_matching = enabled;
        self
    }

    pub fn classify(&self, path: &str) -> RouteCategory {
        if self.is_public(path) {
            RouteCategory::Public
        } else if self.is_admin(path) {
            RouteCategory::Admin
        } else if self.is_protected(path) {
            RouteCategory::Protected
        } else if self.is_marketing(path) {
            RouteCategory::Marketing
        } else if is_api_path(path) {
            RouteCategory::InternalApi
        } else {
            RouteCategory::Unclassified
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.matches_any(&self.routes.public, path)
    }

    pub fn is_admin(&self, path: &str) -> bool {
        self.matches_any(&self.routes.admin, path)
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.matches_any(&self.routes.protected, path)
    }

    pub fn is_marketing(&self, path: &str) -> bool {
        self.matches_any(&self.routes.marketing, path)
    }

    fn matches_any(&self, patterns: &[String], path: &str) -> bool {
        patterns.iter().any(|p| self.matches(p, path))
    }

    fn matches(&self, pattern: &str, path: &str) -> bool {
        if !path.starts_with(pattern) {
            return false;
        }
        if !self.segment_matching || pattern.ends_with('/') {
            return true;
        }
        matches!(path.as_bytes().get(pattern.len()), None | Some(b'/') | Some(b'?'))
    }
}

/// Checked independently of the configured sets.
pub fn is_api_path(path: &str) -> bool {
    path.starts_with(API_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RouteClassifier {
        RouteClassifier::new(RouteSets {
            public: vec!["/auth".into(), "/api/health".into()],
            protected: vec!["/dashboard".into(), "/admin/reports".into()],
            admin: vec!["/admin".into()],
            marketing: vec!["/pricing".into(), "/auth/promo".into()],
        })
    }

    #[test]
    fn test_categories() {
        let c = classifier();
        assert_eq!(c.classify("/auth/login"), RouteCategory::Public);
        assert_eq!(c.classify("/admin/users"), RouteCategory::Admin);
        assert_eq!(c.classify("/dashboard"), RouteCategory::Protected);
        assert_eq!(c.classify("/pricing"), RouteCategory::Marketing);
        assert_eq!(c.classify("/api/v1/items"), RouteCategory::InternalApi);
        assert_eq!(c.classify("/blog"), RouteCategory::Unclassified);
    }

    #[test]
    fn test_precedence() {
        let c = classifier();
        // Public beats Marketing, Admin beats Protected, Public beats InternalApi.
        assert_eq!(c.classify("/auth/promo"), RouteCategory::Public);
        assert_eq!(c.classify("/admin/reports"), RouteCategory::Admin);
        assert_eq!(c.classify("/api/health"), RouteCategory::Public);
    }

    #[test]
    fn test_prefix_over_match_is_kept() {
        let c = classifier();
        assert_eq!(c.classify("/administrator"), RouteCategory::Admin);
        assert_eq!(c.classify("/dashboards-old"), RouteCategory::Protected);
    }

    #[test]
    fn test_segment_matching() {
        let c = classifier().with_segment_matching(true);
        assert_eq!(c.classify("/administrator"), RouteCategory::Unclassified);
        assert_eq!(c.classify("/admin"), RouteCategory::Admin);
        assert_eq!(c.classify("/admin/users"), RouteCategory::Admin);
    }

    #[test]
    fn test_idempotent() {
        let c = classifier();
        for path in ["/", "/auth", "/admin", "/x/y", "/api/", "/pricing/team"] {
            assert_eq!(c.classify(path), c.classify(path));
        }
    }
}
