use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

/// The page's location: where we are, history replacement and full navigation.
///
/// In a browser this is `window.location` plus `history.replaceState`; in
/// headless embeddings it is whatever drives the page.
pub trait Navigator: Send + Sync + 'static {
    /// Current page URL.
    fn current_url(&self) -> Url;

    /// Replace the current history entry without navigating.
    fn replace_url(&self, url: Url);

    /// Leave the page for `url`. Nothing after this call is guaranteed to run.
    fn navigate(&self, url: Url);
}

#[derive(Debug)]
struct NavigatorInner {
    current: Url,
    navigations: Vec<Url>,
}

/// In-memory [`Navigator`] that records what happened. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryNavigator {
    inner: Arc<Mutex<NavigatorInner>>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(start: Url) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NavigatorInner {
                current: start,
                navigations: Vec::new(),
            })),
        }
    }

    /// Full-page navigations performed so far, oldest first.
    #[must_use]
    pub fn navigations(&self) -> Vec<Url> {
        self.inner.lock().navigations.clone()
    }

    /// Most recent full-page navigation.
    #[must_use]
    pub fn last_navigation(&self) -> Option<Url> {
        self.inner.lock().navigations.last().cloned()
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> Url {
        self.inner.lock().current.clone()
    }

    fn replace_url(&self, url: Url) {
        self.inner.lock().current = url;
    }

    fn navigate(&self, url: Url) {
        let mut inner = self.inner.lock();
        inner.navigations.push(url.clone());
        inner.current = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_does_not_record_navigation() {
        let nav = MemoryNavigator::new("https://app.example.com/?a=1".parse().unwrap());
        nav.replace_url("https://app.example.com/".parse().unwrap());

        assert_eq!(nav.current_url().as_str(), "https://app.example.com/");
        assert!(nav.navigations().is_empty());
    }

    #[test]
    fn test_navigate_records_and_moves() {
        let nav = MemoryNavigator::new("https://app.example.com/".parse().unwrap());
        nav.navigate("https://shell.example.com/".parse().unwrap());

        assert_eq!(nav.current_url().as_str(), "https://shell.example.com/");
        assert_eq!(
            nav.last_navigation().map(|u| u.to_string()),
            Some("https://shell.example.com/".to_string())
        );
    }
}
