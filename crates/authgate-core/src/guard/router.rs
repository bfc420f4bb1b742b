use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::auth::Session;

use super::{normalize_path, Navigation, NavigationGuard};

/// Redirect hops followed before giving up on a navigation.
const MAX_REDIRECTS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Too many redirects while navigating to {0}")]
    RedirectLoop(String),
}

/// Tracks the current page and runs the guard before every transition,
/// including the first one.
pub struct Router {
    guard: NavigationGuard,
    aliases: HashMap<String, String>,
    current: Option<String>,
}

impl Router {
    /// Router with `/` aliased to the guard's landing page.
    pub fn new(guard: NavigationGuard) -> Self {
        let landing = guard.policy().landing_path.clone();
        let mut aliases = HashMap::new();
        aliases.insert("/".to_string(), landing);

        Self {
            guard,
            aliases,
            current: None,
        }
    }

    /// Add a path that always resolves to another one.
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases
            .insert(normalize_path(from).to_string(), normalize_path(to).to_string());
        self
    }

    /// Path of the page last navigated to.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn resolve(&self, path: &str) -> String {
        let path = normalize_path(path);
        self.aliases
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }

    /// Navigate to `target`, following guard redirects. Returns the page
    /// that was finally entered.
    pub async fn navigate(
        &mut self,
        target: &str,
        session: &Session,
    ) -> Result<String, NavigationError> {
        let mut path = self.resolve(target);

        for _ in 0..=MAX_REDIRECTS {
            match self.guard.check(&path, session).await {
                Navigation::Allow => {
                    debug!(from = ?self.current, to = %path, "Navigated");
                    self.current = Some(path.clone());
                    return Ok(path);
                }
                Navigation::Redirect(next) => {
                    debug!(from = %path, to = %next, "Guard redirect");
                    path = self.resolve(&next);
                }
            }
        }

        Err(NavigationError::RedirectLoop(target.to_string()))
    }

    /// Re-run the guard for the current page, e.g. after logging out.
    pub async fn reload(&mut self, session: &Session) -> Result<String, NavigationError> {
        let target = self
            .current
            .clone()
            .unwrap_or_else(|| "/".to_string());
        self.navigate(&target, session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::CredentialStore;
    use crate::guard::GuardPolicy;
    use crate::testing::MockBackend;

    fn setup(accepted: &[&str]) -> (Arc<MockBackend>, Session, Router) {
        let backend = Arc::new(MockBackend::accepting(accepted));
        let session = Session::new(CredentialStore::in_memory(), backend.clone());
        (backend, session, Router::new(NavigationGuard::default()))
    }

    #[tokio::test]
    async fn test_first_load_without_session_lands_on_login() {
        let (_backend, session, mut router) = setup(&[]);
        assert_eq!(router.current(), None);

        assert_eq!(router.navigate("/", &session).await.unwrap(), "/login");
        assert_eq!(router.current(), Some("/login"));
    }

    #[tokio::test]
    async fn test_root_resolves_to_dashboard_when_verified() {
        let (backend, session, mut router) = setup(&["abc"]);
        session.set_token("abc", true).unwrap();

        assert_eq!(router.navigate("/", &session).await.unwrap(), "/dashboard");
        assert_eq!(router.navigate("/login", &session).await.unwrap(), "/dashboard");
        assert_eq!(backend.me_calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_after_logout_returns_to_login() {
        let (_backend, session, mut router) = setup(&["abc"]);
        session.set_token("abc", true).unwrap();
        router.navigate("/dashboard", &session).await.unwrap();

        session.logout();
        assert_eq!(router.reload(&session).await.unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_forged_token_ends_on_login() {
        let (_backend, session, mut router) = setup(&[]);
        session.set_token("forged", true).unwrap();

        assert_eq!(router.navigate("/dashboard", &session).await.unwrap(), "/login");
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_redirect_loop_detected() {
        let (_backend, session, _) = setup(&[]);
        // Login page is itself protected: every hop redirects to it again.
        let guard = NavigationGuard::new(GuardPolicy {
            public_paths: vec![],
            ..GuardPolicy::default()
        });
        let mut router = Router::new(guard);

        assert_eq!(
            router.navigate("/dashboard", &session).await,
            Err(NavigationError::RedirectLoop("/dashboard".to_string()))
        );
        assert_eq!(router.current(), None);
    }

    #[tokio::test]
    async fn test_custom_alias() {
        let (_backend, session, router) = setup(&[]);
        let mut router = router.with_alias("/signin", "/login");
        assert_eq!(router.navigate("/signin", &session).await.unwrap(), "/login");
    }
}
