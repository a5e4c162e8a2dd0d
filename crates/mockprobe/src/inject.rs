//! Pre-navigation scripts.
//!
//! An [`InitScript`] runs in every document the session loads after it was
//! registered, before any application script. Typical uses are seeding an
//! authenticated user into `localStorage` and hiding dev-server overlays.

use crate::result::HarnessResult;
use crate::selector::js;
use serde::Serialize;

/// Script source registered to run before page scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitScript {
    source: String,
}

impl InitScript {
    /// Arbitrary source
    #[must_use]
    pub fn raw(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Seed `localStorage[key]` with the JSON encoding of `value`
    pub fn local_storage<T: Serialize + ?Sized>(key: &str, value: &T) -> HarnessResult<Self> {
        Self::storage("localStorage", key, value)
    }

    /// Seed `sessionStorage[key]` with the JSON encoding of `value`
    pub fn session_storage<T: Serialize + ?Sized>(key: &str, value: &T) -> HarnessResult<Self> {
        Self::storage("sessionStorage", key, value)
    }

    fn storage<T: Serialize + ?Sized>(area: &str, key: &str, value: &T) -> HarnessResult<Self> {
        let encoded = serde_json::to_string(value)?;
        Ok(Self::raw(format!(
            "(() => {{ try {{ window.{area}.setItem({}, {}); }} catch (e) {{}} }})();",
            js(key),
            js(&encoded)
        )))
    }

    /// Hide every element matching a CSS selector once the DOM is ready
    #[must_use]
    pub fn hide_selectors(css: &str) -> Self {
        let rule = format!("{css} {{ display: none !important; }}");
        Self::raw(format!(
            "window.addEventListener('DOMContentLoaded', () => {{ \
             const style = document.createElement('style'); \
             style.textContent = {}; \
             document.head.appendChild(style); }});",
            js(&rule)
        ))
    }

    /// Script source
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl From<&str> for InitScript {
    fn from(source: &str) -> Self {
        Self::raw(source)
    }
}

impl From<String> for InitScript {
    fn from(source: String) -> Self {
        Self::raw(source)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_storage_user() {
        let user = json!({"id": 1, "username": "admin", "roles": ["ROLE_ADMIN"]});
        let script = InitScript::local_storage("user", &user).unwrap();
        assert!(script.source().contains("localStorage.setItem(\"user\""));
        assert!(script.source().contains(r#"\"username\":\"admin\""#));
    }

    #[test]
    fn test_session_storage() {
        let script = InitScript::session_storage("token", "abc").unwrap();
        assert!(script.source().contains("sessionStorage.setItem(\"token\", \"\\\"abc\\\"\")"));
    }

    #[test]
    fn test_hostile_key_is_escaped() {
        let script = InitScript::local_storage("a\"); alert(1); (\"", &1).unwrap();
        assert!(script.source().contains(r#""a\"); alert(1); (\"""#));
    }

    #[test]
    fn test_hide_selectors() {
        let script = InitScript::hide_selectors("iframe[style*=\"z-index: 2147483647\"]");
        assert!(script.source().contains("DOMContentLoaded"));
        assert!(script.source().contains("display: none !important"));
        assert!(script.source().contains(r#"iframe[style*=\"z-index: 2147483647\"]"#));
    }

    #[test]
    fn test_from_str() {
        let script: InitScript = "window.__E2E__ = true;".into();
        assert_eq!(script.source(), "window.__E2E__ = true;");
    }
}
