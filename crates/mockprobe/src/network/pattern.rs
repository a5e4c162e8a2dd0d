//! URL pattern grammar and method filters.
//!
//! Glob rules: `**` spans any characters (including `/`), `*` spans any
//! characters except `/`, everything else is literal. A pattern starting with
//! `/` is matched against the path and query of the URL; any other pattern is
//! matched against the full URL.

use crate::result::{HarnessError, HarnessResult};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// HTTP methods for request matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method
    #[default]
    #[serde(alias = "*", alias = "any")]
    Any,
}

impl HttpMethod {
    /// Parse from string; unknown methods become [`HttpMethod::Any`], which
    /// only a wildcard filter accepts
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Any,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check if this method filter accepts a request method
    ///
    /// Only the filter side is a wildcard: a `GET` route never answers a
    /// request whose method did not parse.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        *self == Self::Any || *self == *other
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern for matching request and page URLs
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// Glob pattern (e.g. `**/api/users/*`)
    Glob {
        /// Pattern as written
        source: String,
        /// Compiled, anchored form
        compiled: Regex,
        /// Match against path + query only
        path_only: bool,
    },
    /// Regular expression searched anywhere in the full URL
    Regex(Regex),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Compile a glob pattern
    pub fn glob(source: &str) -> HarnessResult<Self> {
        if source.is_empty() {
            return Err(HarnessError::InvalidPattern {
                pattern: source.to_string(),
                message: "pattern is empty".to_string(),
            });
        }
        if source == "**" {
            return Ok(Self::Any);
        }
        let compiled =
            Regex::new(&glob_to_regex(source)).map_err(|e| HarnessError::InvalidPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::Glob {
            source: source.to_string(),
            compiled,
            path_only: source.starts_with('/'),
        })
    }

    /// Compile a regular expression pattern
    pub fn regex(source: &str) -> HarnessResult<Self> {
        Regex::new(source)
            .map(Self::Regex)
            .map_err(|e| HarnessError::InvalidPattern {
                pattern: source.to_string(),
                message: e.to_string(),
            })
    }

    /// Check if a URL matches this pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Glob {
                compiled,
                path_only,
                ..
            } => {
                if *path_only {
                    compiled.is_match(&path_and_query(url))
                } else {
                    compiled.is_match(url)
                }
            }
            Self::Regex(re) => re.is_match(url),
            Self::Any => true,
        }
    }

    /// Pattern source text
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Glob { source, .. } => source,
            Self::Regex(re) => re.as_str(),
            Self::Any => "**",
        }
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL pattern plus method filter
#[derive(Debug, Clone)]
pub struct RoutePattern {
    /// URL pattern
    pub url: UrlPattern,
    /// Method filter
    pub method: HttpMethod,
}

impl RoutePattern {
    /// Create a route pattern
    #[must_use]
    pub const fn new(url: UrlPattern, method: HttpMethod) -> Self {
        Self { url, method }
    }

    /// Compile a glob accepting any method
    pub fn glob(source: &str) -> HarnessResult<Self> {
        Ok(Self::new(UrlPattern::glob(source)?, HttpMethod::Any))
    }

    /// Restrict to a method
    #[must_use]
    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Check whether a request satisfies the pattern
    #[must_use]
    pub fn matches(&self, url: &str, method: &HttpMethod) -> bool {
        self.method.matches(method) && self.url.matches(url)
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
    out.push('$');
    out
}

/// Path plus query of an absolute URL; the input itself when it does not parse
fn path_and_query(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod http_method_tests {
        use super::*;

        #[test]
        fn test_parse() {
            assert_eq!(HttpMethod::parse("GET"), HttpMethod::Get);
            assert_eq!(HttpMethod::parse("post"), HttpMethod::Post);
            assert_eq!(HttpMethod::parse("PATCH"), HttpMethod::Patch);
            assert_eq!(HttpMethod::parse("unknown"), HttpMethod::Any);
        }

        #[test]
        fn test_matches() {
            assert!(HttpMethod::Get.matches(&HttpMethod::Get));
            assert!(HttpMethod::Any.matches(&HttpMethod::Get));
            assert!(!HttpMethod::Get.matches(&HttpMethod::Post));
        }

        #[test]
        fn test_unknown_verb_only_hits_wildcard_routes() {
            let propfind = HttpMethod::parse("PROPFIND");
            assert!(!HttpMethod::Get.matches(&propfind));
            assert!(!HttpMethod::Post.matches(&propfind));
            assert!(HttpMethod::Any.matches(&propfind));

            let get_only = RoutePattern::glob("**/api/club/*")
                .unwrap()
                .with_method(HttpMethod::Get);
            assert!(get_only.matches("http://localhost:3000/api/club/1", &HttpMethod::Get));
            assert!(!get_only.matches("http://localhost:3000/api/club/1", &propfind));
        }

        #[test]
        fn test_yaml_names() {
            let m: HttpMethod = serde_yaml_ng::from_str("GET").unwrap();
            assert_eq!(m, HttpMethod::Get);
            let any: HttpMethod = serde_yaml_ng::from_str("\"*\"").unwrap();
            assert_eq!(any, HttpMethod::Any);
        }
    }

    mod glob_tests {
        use super::*;

        #[test]
        fn test_double_star_spans_segments() {
            let p = UrlPattern::glob("**/api/club/1").unwrap();
            assert!(p.matches("http://localhost:3000/api/club/1"));
            assert!(!p.matches("http://localhost:3000/api/club/12"));
            assert!(!p.matches("http://localhost:3000/api/club/1/players"));
        }

        #[test]
        fn test_single_star_is_one_segment() {
            let p = UrlPattern::glob("**/api/player-history/player/*").unwrap();
            assert!(p.matches("http://localhost:3000/api/player-history/player/7"));
            assert!(!p.matches("http://localhost:3000/api/player-history/player/7/seasons"));
        }

        #[test]
        fn test_question_mark_is_literal() {
            let p = UrlPattern::glob("**/api/admin/users?*").unwrap();
            assert!(p.matches("http://localhost:3000/api/admin/users?page=0"));
            assert!(p.matches("http://localhost:3000/api/admin/users?page=0&size=20"));
            assert!(!p.matches("http://localhost:3000/api/admin/users/dashboard"));
            assert!(!p.matches("http://localhost:3000/api/admin/usersX"));
        }

        #[test]
        fn test_wildcard_suffix() {
            let p = UrlPattern::glob("**/ws/**").unwrap();
            assert!(p.matches("ws://localhost:3000/ws/websocket"));
            assert!(p.matches("http://localhost:3000/ws/info?t=1"));
            assert!(!p.matches("http://localhost:3000/api/ws"));
        }

        #[test]
        fn test_path_only_pattern() {
            let p = UrlPattern::glob("/api/club/1").unwrap();
            assert!(p.matches("http://localhost:3000/api/club/1"));
            assert!(p.matches("https://staging.example.com/api/club/1"));
            assert!(!p.matches("http://localhost:3000/v2/api/club/1"));
        }

        #[test]
        fn test_path_only_query_value() {
            let p = UrlPattern::glob("/api/admin/users?page=*").unwrap();
            assert!(p.matches("http://localhost:3000/api/admin/users?page=3"));
            assert!(!p.matches("http://localhost:3000/api/admin/users"));
        }

        #[test]
        fn test_regex_metachars_escaped() {
            let p = UrlPattern::glob("**/api/v1.0/(x)").unwrap();
            assert!(p.matches("http://h/api/v1.0/(x)"));
            assert!(!p.matches("http://h/api/v1x0/(x)"));
        }

        #[test]
        fn test_empty_rejected() {
            let err = UrlPattern::glob("").unwrap_err();
            assert!(matches!(err, HarnessError::InvalidPattern { .. }));
        }

        #[test]
        fn test_double_star_alone_is_any() {
            assert!(matches!(UrlPattern::glob("**").unwrap(), UrlPattern::Any));
        }

        #[test]
        fn test_display_round_trips_source() {
            let p = UrlPattern::glob("**/api/*").unwrap();
            assert_eq!(p.to_string(), "**/api/*");
        }
    }

    mod regex_tests {
        use super::*;

        #[test]
        fn test_regex_pattern() {
            let p = UrlPattern::regex(r".*/player/\d+").unwrap();
            assert!(p.matches("http://localhost:3000/player/17"));
            assert!(!p.matches("http://localhost:3000/player/abc"));
        }

        #[test]
        fn test_invalid_regex() {
            assert!(UrlPattern::regex("(").is_err());
        }
    }

    mod route_pattern_tests {
        use super::*;

        #[test]
        fn test_method_filter() {
            let p = RoutePattern::glob("**/api/user/register")
                .unwrap()
                .with_method(HttpMethod::Post);
            assert!(p.matches("http://h/api/user/register", &HttpMethod::Post));
            assert!(!p.matches("http://h/api/user/register", &HttpMethod::Get));
        }

        #[test]
        fn test_display() {
            let p = RoutePattern::glob("**/a").unwrap().with_method(HttpMethod::Get);
            assert_eq!(p.to_string(), "GET **/a");
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn literal_pattern_matches_itself(path in "/[a-z0-9_-]{1,8}(/[a-z0-9_-]{1,8}){0,4}") {
                let url = format!("http://localhost:3000{path}");
                let p = UrlPattern::glob(&format!("**{path}")).unwrap();
                prop_assert!(p.matches(&url));
            }

            #[test]
            fn single_star_never_crosses_slash(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
                let p = UrlPattern::glob("**/items/*").unwrap();
                let nested = format!("http://h/items/{a}/{b}");
                let flat = format!("http://h/items/{a}");
                prop_assert!(!p.matches(&nested));
                prop_assert!(p.matches(&flat));
            }
        }
    }
}
