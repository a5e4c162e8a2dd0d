//! Element selectors.
//!
//! Accepted forms:
//!
//! - plain CSS: `button[type='submit']`
//! - text: `text=Career Goals`
//! - CSS filtered by text: `h1:has-text('User Management')`, optionally
//!   followed by more CSS scoped to the filtered elements:
//!   `div.card:has-text('Goals') > button`
//! - test id: `testid=save-button`
//! - ARIA role, optionally by accessible name: `role=button[name='Save']`
//! - placeholder: `placeholder=Search players`
//! - XPath: `xpath=//div[@id='x']` or anything starting with `//`
//!
//! Any form may end in `>> nth=N` to pick the N-th match (zero-based).

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};

/// Elements never matched by text selectors
const NON_TEXT_TAGS: &str = "['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD', 'TITLE']";

/// Parsed element selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selector {
    /// CSS selector
    Css(String),
    /// Smallest elements whose text contains the string
    Text(String),
    /// `data-testid` attribute
    TestId(String),
    /// CSS selector filtered by contained text
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// CSS matched inside the elements of another selector
    Scoped {
        /// Elements to search within
        outer: Box<Selector>,
        /// CSS relative to each outer element; may start with a combinator
        inner: String,
    },
    /// Explicit or implicit ARIA role
    Role {
        /// Role name, e.g. `button`
        role: String,
        /// Case-insensitive substring of the accessible name
        name: Option<String>,
    },
    /// Case-insensitive substring of the `placeholder` attribute
    Placeholder(String),
    /// XPath expression
    XPath(String),
    /// One match of another selector
    Nth {
        /// Selector whose matches are indexed
        inner: Box<Selector>,
        /// Zero-based position in document order
        index: usize,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test id selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Filter a CSS selector by contained text
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Elements with an ARIA role
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    /// Elements with an ARIA role and accessible name
    #[must_use]
    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

    /// Inputs by placeholder text
    #[must_use]
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder(text.into())
    }

    /// The `index`-th match of this selector
    #[must_use]
    pub fn nth(self, index: usize) -> Self {
        match self {
            Self::Nth { inner, .. } => Self::Nth { inner, index },
            other => Self::Nth {
                inner: Box::new(other),
                index,
            },
        }
    }

    /// The first match of this selector
    #[must_use]
    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Parse the string form
    pub fn parse(source: &str) -> HarnessResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(invalid(source, "selector is empty"));
        }
        if let Some((head, index)) = split_nth(source, trimmed)? {
            return Ok(Self::parse(head)?.nth(index));
        }
        if let Some(rest) = trimmed.strip_prefix("text=") {
            let text = unquote(rest);
            if text.is_empty() {
                return Err(invalid(source, "text selector is empty"));
            }
            return Ok(Self::Text(text.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("testid=") {
            let id = unquote(rest);
            if id.is_empty() {
                return Err(invalid(source, "test id is empty"));
            }
            return Ok(Self::TestId(id.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("role=") {
            return parse_role(source, rest);
        }
        if let Some(rest) = trimmed.strip_prefix("placeholder=") {
            let text = unquote(rest);
            if text.is_empty() {
                return Err(invalid(source, "placeholder is empty"));
            }
            return Ok(Self::Placeholder(text.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("xpath=") {
            return Ok(Self::XPath(rest.to_string()));
        }
        if trimmed.starts_with("//") {
            return Ok(Self::XPath(trimmed.to_string()));
        }
        if let Some(idx) = trimmed.find(":has-text(") {
            return parse_has_text(source, &trimmed[..idx], &trimmed[idx + ":has-text(".len()..]);
        }
        check_balanced(source, trimmed)?;
        Ok(Self::Css(trimmed.to_string()))
    }

    /// Page-side expression yielding the matching elements as an array, in
    /// document order
    #[must_use]
    pub fn elements_expr(&self) -> String {
        match self {
            Self::Css(s) => format!("Array.from(document.querySelectorAll({}))", js(s)),
            Self::Text(t) => {
                let t = js(t);
                format!(
                    "Array.from(document.querySelectorAll('body, body *')).filter(el => \
                     !{NON_TEXT_TAGS}.includes(el.tagName) && \
                     (el.textContent || '').includes({t}) && \
                     !Array.from(el.children).some(c => !{NON_TEXT_TAGS}.includes(c.tagName) && \
                     (c.textContent || '').includes({t})))"
                )
            }
            Self::TestId(id) => format!(
                "Array.from(document.querySelectorAll({}))",
                js(&format!("[data-testid=\"{}\"]", id.replace('"', "\\\"")))
            ),
            Self::CssWithText { css, text } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => (el.textContent || '').includes({}))",
                js(css),
                js(text)
            ),
            Self::Scoped { outer, inner } => format!(
                "Array.from(new Set(({}).flatMap(el => Array.from(el.querySelectorAll({})))))",
                outer.elements_expr(),
                js(&format!(":scope {inner}"))
            ),
            Self::Role { role, name } => {
                let base = format!(
                    "Array.from(document.querySelectorAll({}))",
                    js(&role_css(role).join(", "))
                );
                match name {
                    None => base,
                    Some(name) => format!(
                        "{base}.filter(el => (el.getAttribute('aria-label') || el.textContent || \
                         el.value || el.getAttribute('title') || '').trim().toLowerCase().includes({}))",
                        js(&name.to_lowercase())
                    ),
                }
            }
            Self::Placeholder(text) => format!(
                "Array.from(document.querySelectorAll('[placeholder]')).filter(el => \
                 el.getAttribute('placeholder').toLowerCase().includes({}))",
                js(&text.to_lowercase())
            ),
            Self::XPath(x) => format!(
                "(() => {{ const r = document.evaluate({}, document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; \
                 for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                 return out; }})()",
                js(x)
            ),
            Self::Nth { inner, index } => {
                format!("({}).slice({index}, {})", inner.elements_expr(), index + 1)
            }
        }
    }

    /// Page-side expression counting matches
    #[must_use]
    pub fn count_expr(&self) -> String {
        format!("({}).length", self.elements_expr())
    }
}

/// CSS selectors for elements carrying `role`, explicitly or implicitly
#[must_use]
pub(crate) fn role_css(role: &str) -> Vec<String> {
    let implicit: &[&str] = match role {
        "button" => &[
            "button",
            "input[type='button']",
            "input[type='submit']",
            "input[type='reset']",
        ],
        "link" => &["a[href]"],
        "textbox" => &[
            "textarea",
            "input:not([type])",
            "input[type='text']",
            "input[type='email']",
            "input[type='tel']",
            "input[type='url']",
        ],
        "searchbox" => &["input[type='search']"],
        "checkbox" => &["input[type='checkbox']"],
        "radio" => &["input[type='radio']"],
        "combobox" => &["select"],
        "heading" => &["h1", "h2", "h3", "h4", "h5", "h6"],
        "list" => &["ul", "ol"],
        "listitem" => &["li"],
        "table" => &["table"],
        "row" => &["tr"],
        "img" => &["img[alt]"],
        "navigation" => &["nav"],
        "dialog" => &["dialog"],
        _ => &[],
    };
    std::iter::once(format!("[role=\"{}\"]", role.replace('"', "\\\"")))
        .chain(implicit.iter().map(|s| (*s).to_string()))
        .collect()
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => f.write_str(s),
            Self::Text(t) => write!(f, "text={t}"),
            Self::TestId(id) => write!(f, "testid={id}"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text('{text}')"),
            Self::Scoped { outer, inner } => write!(f, "{outer} {inner}"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name='{name}']"),
            Self::Placeholder(text) => write!(f, "placeholder={text}"),
            Self::XPath(x) => write!(f, "xpath={x}"),
            Self::Nth { inner, index } => write!(f, "{inner} >> nth={index}"),
        }
    }
}

impl std::str::FromStr for Selector {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Selector {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(value: Selector) -> Self {
        value.to_string()
    }
}

/// Anything an interaction accepts as a selector
pub trait IntoSelector {
    /// Parse or pass through
    fn into_selector(self) -> HarnessResult<Selector>;
}

impl IntoSelector for Selector {
    fn into_selector(self) -> HarnessResult<Selector> {
        Ok(self)
    }
}

impl IntoSelector for &Selector {
    fn into_selector(self) -> HarnessResult<Selector> {
        Ok(self.clone())
    }
}

impl IntoSelector for &str {
    fn into_selector(self) -> HarnessResult<Selector> {
        Selector::parse(self)
    }
}

impl IntoSelector for String {
    fn into_selector(self) -> HarnessResult<Selector> {
        Selector::parse(&self)
    }
}

impl IntoSelector for &String {
    fn into_selector(self) -> HarnessResult<Selector> {
        Selector::parse(self)
    }
}

/// JSON string literal, safe to embed in page scripts
pub(crate) fn js(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Trailing `>> nth=N`, if any
fn split_nth<'a>(source: &str, trimmed: &'a str) -> HarnessResult<Option<(&'a str, usize)>> {
    let Some((head, tail)) = trimmed.rsplit_once(">>") else {
        return Ok(None);
    };
    let Some(index) = tail.trim().strip_prefix("nth=") else {
        return Ok(None);
    };
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid(source, "nth= needs a non-negative index"))?;
    if head.trim().is_empty() {
        return Err(invalid(source, "missing selector before nth="));
    }
    Ok(Some((head, index)))
}

fn parse_role(source: &str, rest: &str) -> HarnessResult<Selector> {
    let (role, name) = match rest.find('[') {
        Some(idx) => {
            let attr = rest[idx + 1..]
                .trim_end()
                .strip_suffix(']')
                .ok_or_else(|| invalid(source, "unterminated [name=...]"))?;
            let value = attr
                .trim()
                .strip_prefix("name=")
                .ok_or_else(|| invalid(source, "role filters support name= only"))?;
            (&rest[..idx], Some(unquote(value).to_string()))
        }
        None => (rest, None),
    };
    let role = role.trim();
    if role.is_empty() || !role.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(source, "role name must be a single word"));
    }
    Ok(Selector::Role {
        role: role.to_string(),
        name,
    })
}

/// `css:has-text(text)` with an optional scoped continuation after the `)`
fn parse_has_text(source: &str, css: &str, after: &str) -> HarnessResult<Selector> {
    let css = css.trim();
    if css.is_empty() {
        return Err(invalid(source, "missing element before :has-text"));
    }
    let close = closing_paren(after).ok_or_else(|| invalid(source, "unterminated :has-text("))?;
    let text = unquote(after[..close].trim());
    let rest = &after[close + 1..];

    // a compound directly after `)` narrows the same element
    let split = rest
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || matches!(c, '>' | '+' | '~'))
        .map_or(rest.len(), |(i, _)| i);
    let css = format!("{css}{}", &rest[..split]);
    check_balanced(source, &css)?;
    let filtered = Selector::css_with_text(css, text);

    let inner = rest[split..].trim();
    if inner.is_empty() {
        return Ok(filtered);
    }
    if inner.contains(":has-text(") {
        return Err(invalid(source, "only one :has-text is supported"));
    }
    check_balanced(source, inner)?;
    Ok(Selector::Scoped {
        outer: Box::new(filtered),
        inner: inner.to_string(),
    })
}

/// Position of the `)` closing a pseudo-class argument, skipping quoted text
fn closing_paren(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, ')') => return Some(i),
            _ => {}
        }
    }
    None
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn invalid(source: &str, message: &str) -> HarnessError {
    HarnessError::InvalidSelector {
        selector: source.to_string(),
        message: message.to_string(),
    }
}

fn check_balanced(source: &str, css: &str) -> HarnessResult<()> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    for c in css.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' => stack.push(c),
            ']' => {
                if stack.pop() != Some('[') {
                    return Err(invalid(source, "unbalanced ']'"));
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return Err(invalid(source, "unbalanced ')'"));
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(invalid(source, "unterminated string"));
    }
    if !stack.is_empty() {
        return Err(invalid(source, "unclosed bracket"));
    }
    Ok(())
}
