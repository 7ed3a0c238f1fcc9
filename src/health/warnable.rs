//! Warnable definitions.
//!
//! # Responsibilities
//! - Describe a condition a subsystem can report on (code, title, text)
//! - Carry the arguments a report was made with
//! - Render the human-readable text for a report
//!
//! # Design Decisions
//! - Warnables are immutable once registered; trackers refer to them by code
//! - Args are ordered so rendering and serialization are deterministic

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Argument carrying the error message of a failure.
pub const ARG_ERROR: &str = "error";
/// Argument carrying a duration, already formatted for display.
pub const ARG_DURATION: &str = "duration";
/// Argument carrying a server or endpoint name.
pub const ARG_SERVER_NAME: &str = "server-name";

/// Unique identity of a [`Warnable`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarnableCode(String);

impl WarnableCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WarnableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WarnableCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl From<String> for WarnableCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

/// Named arguments attached to an unhealthy report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(BTreeMap<String, String>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an argument, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Args {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Args {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Custom text renderer.
pub type TextFn = Arc<dyn Fn(&Args) -> String + Send + Sync>;

/// How a warnable turns its [`Args`] into display text.
#[derive(Clone)]
pub enum WarnableText {
    /// Fixed message, args ignored.
    Static(String),
    /// Message with `{name}` placeholders filled from the args.
    Template(String),
    /// Arbitrary renderer owned by the defining subsystem.
    Func(TextFn),
}

impl WarnableText {
    pub fn render(&self, args: &Args) -> String {
        match self {
            WarnableText::Static(text) => text.clone(),
            WarnableText::Template(template) => render_template(template, args),
            WarnableText::Func(f) => f(args),
        }
    }
}

impl fmt::Debug for WarnableText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarnableText::Static(text) => f.debug_tuple("Static").field(text).finish(),
            WarnableText::Template(t) => f.debug_tuple("Template").field(t).finish(),
            WarnableText::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Replace each `{name}` with the matching arg. Unknown names are left as-is.
fn render_template(template: &str, args: &Args) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match args.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// A condition that can be healthy or unhealthy.
#[derive(Debug, Clone)]
pub struct Warnable {
    /// Unique identity across the process.
    pub code: WarnableCode,
    /// Short human title.
    pub title: String,
    /// Text renderer. When absent, the `error` arg (or the title) is used.
    pub text: Option<WarnableText>,
    /// Token emitted by the debug flag serializer; empty means none.
    pub map_debug_flag: String,
    /// Suppress unhealthy reports during the startup grace window.
    pub ignored_during_startup: bool,
    /// Codes of warnables this one depends on.
    pub depends_on: Vec<WarnableCode>,
    /// How long the warnable must stay unhealthy before it is reported.
    pub time_to_visible: Duration,
}

impl Warnable {
    pub fn new(code: impl Into<WarnableCode>) -> Self {
        Self {
            code: code.into(),
            title: String::new(),
            text: None,
            map_debug_flag: String::new(),
            ignored_during_startup: false,
            depends_on: Vec::new(),
            time_to_visible: Duration::ZERO,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn text(mut self, text: WarnableText) -> Self {
        self.text = Some(text);
        self
    }

    /// Render with a closure.
    pub fn text_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Args) -> String + Send + Sync + 'static,
    {
        self.text(WarnableText::Func(Arc::new(f)))
    }

    pub fn map_debug_flag(mut self, flag: impl Into<String>) -> Self {
        self.map_debug_flag = flag.into();
        self
    }

    pub fn ignored_during_startup(mut self, ignored: bool) -> Self {
        self.ignored_during_startup = ignored;
        self
    }

    pub fn depends_on(mut self, code: impl Into<WarnableCode>) -> Self {
        self.depends_on.push(code.into());
        self
    }

    pub fn time_to_visible(mut self, after: Duration) -> Self {
        self.time_to_visible = after;
        self
    }

    /// Render the display text for a report with `args`.
    pub fn render_text(&self, args: &Args) -> String {
        if let Some(text) = &self.text {
            return text.render(args);
        }
        if let Some(err) = args.get(ARG_ERROR) {
            return err.to_string();
        }
        if !self.title.is_empty() {
            return self.title.clone();
        }
        self.code.to_string()
    }
}
