//! The login boundary: where unauthenticated navigation is sent, and how the
//! login screen finds its way back.

use std::fmt;

use reqwest::Url;

pub const LOGIN_PATH: &str = "/auth/login";
pub const MUST_BE_LOGGED_IN: &str = "must_be_logged_in";

/// Receives redirects to the login boundary. Implemented by whatever owns
/// navigation (a router, a test recorder).
pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &LoginRedirect);
}

/// A redirect to the login screen carrying the path to return to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Set when a session existed and was lost, so the login screen can
    /// tell "session expired" apart from "never logged in".
    pub session_expired: bool,
    pub from: String,
}

impl LoginRedirect {
    pub fn never_logged_in(from: &str) -> Self {
        Self {
            session_expired: false,
            from: from.to_string(),
        }
    }

    pub fn session_expired(from: &str) -> Self {
        Self {
            session_expired: true,
            from: from.to_string(),
        }
    }

    pub fn to_url(&self) -> String {
        let from = escape_query_value(&self.from);
        if self.session_expired {
            format!("{LOGIN_PATH}?message={MUST_BE_LOGGED_IN}&redirect={from}")
        } else {
            format!("{LOGIN_PATH}?redirect={from}")
        }
    }
}

impl fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

/// Message shown above the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginNotice {
    MustBeLoggedIn,
}

impl LoginNotice {
    /// Read the notice from the login screen's query string (with or
    /// without the leading `?`).
    pub fn from_query(query: &str) -> Option<Self> {
        match query_param(query, "message").as_deref() {
            Some(MUST_BE_LOGGED_IN) => Some(Self::MustBeLoggedIn),
            _ => None,
        }
    }
}

/// Where to go after a successful login: the `redirect` parameter when it
/// names a local path, otherwise the dashboard root.
pub fn post_login_target(query: &str) -> String {
    query_param(query, "redirect")
        .filter(|target| is_local_path(target))
        .unwrap_or_else(|| "/".to_string())
}

/// Browsers read `\` as `/`, so `/\host` is as foreign as `//host`.
fn is_local_path(target: &str) -> bool {
    let mut chars = target.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !target.chars().any(char::is_control)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    let query = query.trim_start_matches('?');
    let url = Url::parse(&format!("http://console.invalid/?{query}")).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Escape only what would break the query string; paths stay readable.
fn escape_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            '=' => out.push_str("%3D"),
            ' ' => out.push_str("%20"),
            c => out.push(c),
        }
    }
    out
}
