//! The visible address.
//!
//! The session lifecycle reads the current location to find OAuth redirect
//! parameters, rewrites it so a reload does not replay a spent code, and
//! performs full navigations (to the identity provider on login, back to the
//! landing page after a 401). [`Navigator`] is that seam; [`MemoryNavigator`]
//! keeps the address in memory for native front-ends and tests.

use std::sync::Mutex;

/// Path of the landing page.
pub const LANDING_PATH: &str = "/";

/// Access to the location the user is looking at.
pub trait Navigator: Send + Sync {
    /// Current location as `path?query`.
    fn location(&self) -> String;

    /// Rewrite the visible address without navigating (history replace).
    fn replace(&self, location: &str);

    /// Leave the current page for `url`.
    fn navigate(&self, url: &str);
}

/// Path component of a `path?query#fragment` location.
pub fn path_of(location: &str) -> &str {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    &location[..end]
}

/// The location with its query and fragment removed.
pub fn strip_query(location: &str) -> String {
    let path = path_of(location);
    if path.is_empty() {
        LANDING_PATH.to_string()
    } else {
        path.to_string()
    }
}

/// Whether `location` points at the landing page.
pub fn is_landing(location: &str) -> bool {
    matches!(path_of(location), "" | LANDING_PATH)
}

/// A navigator holding the address in memory.
///
/// Full navigations are recorded in order; navigating to a relative path also
/// moves the current location there.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<String>,
    navigations: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: Mutex::new(location.into()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to [`Navigator::navigate`], oldest first.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new(LANDING_PATH)
    }
}

impl Navigator for MemoryNavigator {
    fn location(&self) -> String {
        self.location
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|_| LANDING_PATH.to_string())
    }

    fn replace(&self, location: &str) {
        if let Ok(mut current) = self.location.lock() {
            *current = location.to_string();
        }
    }

    fn navigate(&self, url: &str) {
        tracing::debug!(url = %url, "navigating");
        if let Ok(mut navigations) = self.navigations.lock() {
            navigations.push(url.to_string());
        }
        if url.starts_with('/')
            && let Ok(mut current) = self.location.lock()
        {
            *current = url.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_and_query_helpers() {
        assert_eq!(path_of("/files?page=2"), "/files");
        assert_eq!(path_of("/?code=abc#top"), "/");
        assert_eq!(strip_query("/?code=abc&state=xyz"), "/");
        assert_eq!(strip_query("?error=x"), "/");
        assert_eq!(strip_query("/chat#bottom"), "/chat");
    }

    #[test]
    fn landing_detection() {
        assert!(is_landing("/"));
        assert!(is_landing("/?code=abc"));
        assert!(is_landing(""));
        assert!(!is_landing("/files"));
    }

    #[test]
    fn memory_navigator_records_navigations() {
        let nav = MemoryNavigator::new("/files");
        nav.navigate("https://idp.example.com/authorize?state=s");
        assert_eq!(nav.location(), "/files");

        nav.navigate(LANDING_PATH);
        assert_eq!(nav.location(), "/");
        assert_eq!(nav.navigations().len(), 2);
    }

    #[test]
    fn memory_navigator_replace_does_not_navigate() {
        let nav = MemoryNavigator::new("/?code=abc");
        nav.replace("/");
        assert_eq!(nav.location(), "/");
        assert!(nav.navigations().is_empty());
    }
}
