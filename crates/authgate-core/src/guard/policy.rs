use tracing::debug;

use crate::auth::Session;

/// Pages reachable without a session
const DEFAULT_PUBLIC_PATHS: [&str; 3] = ["/login", "/register", "/forget"];

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_LANDING_PATH: &str = "/dashboard";

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(String),
}

/// Which paths are public and where to send users.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    /// Guest pages: login, register, forgot password.
    pub public_paths: Vec<String>,
    pub login_path: String,
    /// Where a logged-in user lands when opening a guest page.
    pub landing_path: String,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
        }
    }
}

impl GuardPolicy {
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.public_paths.iter().any(|p| normalize_path(p) == path)
    }
}

/// Strip query string, fragment and trailing slash so `/login?next=/x`
/// and `/login/` match `/login`. The root path stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
    let path = path[..end].trim_end_matches('/');
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Evaluated before every route transition.
#[derive(Debug, Clone, Default)]
pub struct NavigationGuard {
    policy: GuardPolicy,
}

impl NavigationGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Decide whether navigating to `target` may proceed.
    ///
    /// Protected pages require a token the backend has confirmed; a stored
    /// token alone is never enough.
    pub async fn check(&self, target: &str, session: &Session) -> Navigation {
        if self.policy.is_public(target) {
            if session.is_logged_in() {
                debug!(path = target, landing = %self.policy.landing_path, "Guest page with session, redirecting");
                return Navigation::Redirect(self.policy.landing_path.clone());
            }
            return Navigation::Allow;
        }

        if !session.is_logged_in() {
            debug!(path = target, "No session, redirecting to login");
            return Navigation::Redirect(self.policy.login_path.clone());
        }

        if session.verify_once().await {
            Navigation::Allow
        } else {
            debug!(path = target, "Verification failed, redirecting to login");
            Navigation::Redirect(self.policy.login_path.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::{CredentialStore, SessionStatus};
    use crate::testing::MockBackend;

    fn setup(accepted: &[&str]) -> (Arc<MockBackend>, Session, NavigationGuard) {
        let backend = Arc::new(MockBackend::accepting(accepted));
        let session = Session::new(CredentialStore::in_memory(), backend.clone());
        (backend, session, NavigationGuard::default())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/login"), "/login");
        assert_eq!(normalize_path("/login/"), "/login");
        assert_eq!(normalize_path("/login?next=/dashboard"), "/login");
        assert_eq!(normalize_path("/dashboard#top"), "/dashboard");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_policy_public_paths() {
        let policy = GuardPolicy::default();
        assert!(policy.is_public("/login"));
        assert!(policy.is_public("/register?invite=1"));
        assert!(policy.is_public("/forget"));
        assert!(!policy.is_public("/dashboard"));
        assert!(!policy.is_public("/login/extra"));
    }

    #[tokio::test]
    async fn test_guest_page_without_token_allowed() {
        let (backend, session, guard) = setup(&[]);
        assert_eq!(guard.check("/login", &session).await, Navigation::Allow);
        assert_eq!(backend.me_calls(), 0);
    }

    #[tokio::test]
    async fn test_guest_page_with_token_redirects_to_landing() {
        let (backend, session, guard) = setup(&["abc"]);
        session.set_token("abc", true).unwrap();

        assert_eq!(
            guard.check("/login", &session).await,
            Navigation::Redirect("/dashboard".to_string())
        );
        assert_eq!(backend.me_calls(), 0);
    }

    #[tokio::test]
    async fn test_protected_page_without_token_redirects_to_login() {
        let (backend, session, guard) = setup(&[]);
        assert_eq!(
            guard.check("/dashboard", &session).await,
            Navigation::Redirect("/login".to_string())
        );
        assert_eq!(backend.me_calls(), 0);
    }

    #[tokio::test]
    async fn test_protected_page_with_accepted_token_allowed() {
        let (backend, session, guard) = setup(&["abc"]);
        session.set_token("abc", false).unwrap();

        assert_eq!(guard.check("/dashboard", &session).await, Navigation::Allow);
        assert!(session.is_verified());

        // Later navigations reuse the verified state.
        assert_eq!(guard.check("/settings", &session).await, Navigation::Allow);
        assert_eq!(backend.me_calls(), 1);
    }

    #[tokio::test]
    async fn test_protected_page_with_rejected_token_logs_out() {
        let (_backend, session, guard) = setup(&[]);
        session.set_token("forged", true).unwrap();

        assert_eq!(
            guard.check("/dashboard", &session).await,
            Navigation::Redirect("/login".to_string())
        );
        let snap = session.snapshot();
        assert_eq!(snap.status, SessionStatus::Anonymous);
        assert_eq!(snap.token, "");

        // Login page is reachable again afterwards.
        assert_eq!(guard.check("/login", &session).await, Navigation::Allow);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let (_backend, session, _) = setup(&["abc"]);
        let guard = NavigationGuard::new(GuardPolicy {
            public_paths: vec!["/signin".to_string()],
            login_path: "/signin".to_string(),
            landing_path: "/home".to_string(),
        });

        assert_eq!(
            guard.check("/home", &session).await,
            Navigation::Redirect("/signin".to_string())
        );
        session.set_token("abc", true).unwrap();
        assert_eq!(
            guard.check("/signin", &session).await,
            Navigation::Redirect("/home".to_string())
        );
    }
}
