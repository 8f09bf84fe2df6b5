//! Path scope resolution.
//!
//! Turns a target URL into the hostname and path pattern handed to the purge
//! command, or refuses to when the request would escalate into a whole-site
//! flush.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Suffix understood by the purge tool as "this path and everything below it".
pub const RECURSIVE_SUFFIX: &str = "(.*)";

const WWW_PREFIX: &str = "www.";

/// The site the purges are issued for, derived from its home URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRoot {
    home: Url,
    hostname: String,
    root_path: String,
}

impl SiteRoot {
    /// Parse the configured home URL.
    pub fn parse(home_url: &str) -> Result<Self, ScopeError> {
        let mut home = Url::parse(home_url.trim()).map_err(|source| ScopeError::InvalidUrl {
            url: home_url.to_string(),
            source,
        })?;
        let host = home.host_str().ok_or_else(|| ScopeError::MissingHost {
            url: home_url.to_string(),
        })?;
        let hostname = host.strip_prefix(WWW_PREFIX).unwrap_or(host).to_string();
        let root_path = with_trailing_slash(home.path());
        // Relative targets resolve inside the install directory.
        home.set_path(&root_path);
        home.set_query(None);
        home.set_fragment(None);

        Ok(Self {
            home,
            hostname,
            root_path,
        })
    }

    /// Home URL with a trailing slash.
    pub fn home_url(&self) -> String {
        self.home.to_string()
    }

    /// Hostname passed to the purge tool, without a leading `www.`.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Path component of the home URL with a trailing slash (`/` unless
    /// installed in a sub-directory).
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Resolve `target` against the home URL so relative paths are accepted.
    pub fn join(&self, target: &str) -> Result<Url, ScopeError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.home
                    .join(target)
                    .map_err(|source| ScopeError::InvalidUrl {
                        url: target.to_string(),
                        source,
                    })
            }
            Err(source) => Err(ScopeError::InvalidUrl {
                url: target.to_string(),
                source,
            }),
        }
    }
}

/// A purge path expression: an exact path, or a path and all of its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    base: String,
    recursive: bool,
}

impl PathPattern {
    pub fn exact(path: impl Into<String>) -> Self {
        Self {
            base: path.into(),
            recursive: false,
        }
    }

    pub fn recursive(path: impl Into<String>) -> Self {
        Self {
            base: path.into(),
            recursive: true,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Whether a request path falls inside this pattern, as the purge tool
    /// evaluates it (the recursive suffix matches any remainder).
    pub fn matches(&self, path: &str) -> bool {
        if self.recursive {
            path.starts_with(&self.base)
        } else {
            path == self.base
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recursive {
            write!(f, "{}{}", self.base, RECURSIVE_SUFFIX)
        } else {
            f.write_str(&self.base)
        }
    }
}

/// Fully resolved purge target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeTarget {
    pub hostname: String,
    pub pattern: PathPattern,
}

/// Why a request was intentionally not turned into a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// No URL to purge.
    EmptyUrl,
    /// The site root with a query string; purging it would flush the whole site.
    RootWithQuery,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUrl => f.write_str("empty url"),
            Self::RootWithQuery => f.write_str("site root with query string"),
        }
    }
}

/// Outcome of scope resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Purge(PurgeTarget),
    Suppressed(SuppressReason),
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("url `{url}` has no host")]
    MissingHost { url: String },
}

/// Resolve the purge scope for `target_url` on `site`.
pub fn resolve(site: &SiteRoot, target_url: &str, recursive: bool) -> Result<Scope, ScopeError> {
    let target_url = target_url.trim();
    if target_url.is_empty() {
        return Ok(Scope::Suppressed(SuppressReason::EmptyUrl));
    }

    let parsed = site.join(target_url)?;
    let path = non_empty_path(parsed.path());

    let has_query = parsed.query().is_some_and(|query| !query.is_empty());
    if has_query && with_trailing_slash(&path) == site.root_path() {
        return Ok(Scope::Suppressed(SuppressReason::RootWithQuery));
    }

    let pattern = if recursive {
        PathPattern::recursive(path)
    } else {
        PathPattern::exact(path)
    };

    Ok(Scope::Purge(PurgeTarget {
        hostname: site.hostname().to_string(),
        pattern,
    }))
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

fn non_empty_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteRoot {
        SiteRoot::parse("https://www.example.com").expect("valid home url")
    }

    fn target(scope: Scope) -> PurgeTarget {
        match scope {
            Scope::Purge(target) => target,
            Scope::Suppressed(reason) => panic!("unexpected suppression: {reason}"),
        }
    }

    #[test]
    fn site_root_strips_www_and_defaults_path() {
        let site = site();
        assert_eq!(site.hostname(), "example.com");
        assert_eq!(site.root_path(), "/");
        assert_eq!(site.home_url(), "https://www.example.com/");
    }

    #[test]
    fn subdirectory_root_without_slash_is_still_guarded() {
        let site = SiteRoot::parse("https://example.com/blog").expect("valid home url");
        assert_eq!(site.root_path(), "/blog/");

        let scope = resolve(&site, "https://example.com/blog?p=1", false).expect("resolves");
        assert_eq!(scope, Scope::Suppressed(SuppressReason::RootWithQuery));
    }

    #[test]
    fn subdirectory_install_keeps_root_path() {
        let site = SiteRoot::parse("https://example.com/blog/").expect("valid home url");
        assert_eq!(site.root_path(), "/blog/");
    }

    #[test]
    fn empty_url_is_suppressed() {
        let scope = resolve(&site(), "   ", true).expect("resolves");
        assert_eq!(scope, Scope::Suppressed(SuppressReason::EmptyUrl));
    }

    #[test]
    fn root_with_query_is_suppressed() {
        for url in [
            "https://example.com/?utm_source=feed",
            "https://www.example.com/?p=1&preview=true",
            "/?s=search",
        ] {
            for recursive in [true, false] {
                let scope = resolve(&site(), url, recursive).expect("resolves");
                assert_eq!(
                    scope,
                    Scope::Suppressed(SuppressReason::RootWithQuery),
                    "{url} should be suppressed"
                );
            }
        }
    }

    #[test]
    fn empty_query_is_not_suppressed() {
        let scope = resolve(&site(), "https://example.com/?", true).expect("resolves");
        assert_eq!(target(scope).pattern.to_string(), "/(.*)");
    }

    #[test]
    fn non_root_with_query_is_purged() {
        let scope = resolve(&site(), "https://example.com/shop/?page=2", false).expect("resolves");
        assert_eq!(target(scope).pattern.to_string(), "/shop/");
    }

    #[test]
    fn subdirectory_root_with_query_is_suppressed() {
        let site = SiteRoot::parse("https://example.com/blog/").expect("valid home url");
        let scope = resolve(&site, "https://example.com/blog/?ref=x", true).expect("resolves");
        assert_eq!(scope, Scope::Suppressed(SuppressReason::RootWithQuery));

        let scope = resolve(&site, "https://example.com/?ref=x", true).expect("resolves");
        assert!(matches!(scope, Scope::Purge(_)));
    }

    #[test]
    fn recursive_appends_wildcard_suffix() {
        let scope = resolve(&site(), "https://example.com/posts/5", true).expect("resolves");
        let target = target(scope);
        assert_eq!(target.hostname, "example.com");
        assert_eq!(target.pattern.to_string(), "/posts/5(.*)");
        assert!(target.pattern.is_recursive());
    }

    #[test]
    fn missing_path_defaults_to_root() {
        let scope = resolve(&site(), "https://example.com", false).expect("resolves");
        assert_eq!(target(scope).pattern.to_string(), "/");
    }

    #[test]
    fn hostname_comes_from_site_not_target() {
        let scope = resolve(&site(), "https://cdn.example.net/img/a.png", false).expect("resolves");
        assert_eq!(target(scope).hostname, "example.com");
    }

    #[test]
    fn recursive_pattern_is_strict_superset() {
        let probes = [
            "/posts/5",
            "/posts/5/",
            "/posts/5/comments",
            "/posts/55",
            "/posts/",
            "/",
            "/pages/5",
        ];

        for url in ["https://example.com/posts/5", "https://example.com/a/b/c/"] {
            let exact = target(resolve(&site(), url, false).expect("resolves")).pattern;
            let wide = target(resolve(&site(), url, true).expect("resolves")).pattern;

            for path in probes.iter().copied().chain([exact.base()]) {
                if exact.matches(path) {
                    assert!(wide.matches(path), "{wide} must cover {path}");
                }
            }

            let descendant = format!("{}/child", exact.base().trim_end_matches('/'));
            assert!(wide.matches(&descendant));
            assert!(!exact.matches(&descendant));
        }
    }

    #[test]
    fn invalid_url_is_an_error() {
        let err = resolve(&site(), "http://[::1", true).expect_err("invalid url");
        assert!(matches!(err, ScopeError::InvalidUrl { .. }));
    }

    #[test]
    fn home_without_host_is_rejected() {
        let err = SiteRoot::parse("file:///var/www").expect_err("no host");
        assert!(matches!(err, ScopeError::MissingHost { .. }));
    }
}
