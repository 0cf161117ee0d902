use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{info, warn};

/// Holds the bearer token for the authenticated local backend.
pub trait CredentialStore: Send + Sync {
    /// Current token, if any.
    fn token(&self) -> Option<String>;
    /// Drops the cached token (expired or rejected).
    fn clear(&self);
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Builds a store from an optional token, treating blank as absent.
    pub fn from_optional(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token.into()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.into()),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Navigation collaborator: sends the user to the login page.
pub trait LoginRedirect: Send + Sync {
    /// `target` is the login path with the encoded return location.
    fn redirect_to_login(&self, target: &str);
}

/// Redirect handler for headless use: logs where the user should go.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self, target: &str) {
        info!(target_url = %target, "login required; redirecting");
    }
}

/// Builds `<login_path>?redirect=<return_to>` with the return location
/// form-encoded.
pub fn login_target(login_path: &str, return_to: &str) -> String {
    match reqwest::Url::parse_with_params("http://localhost/", &[("redirect", return_to)]) {
        Ok(url) => format!("{login_path}?{}", url.query().unwrap_or_default()),
        Err(err) => {
            warn!(error = %err, "could not encode login return location");
            login_path.to_string()
        }
    }
}

/// Fires the redirect after `delay` on a background task, so the user can
/// read the synthesized notice first.
pub(crate) fn schedule_login_redirect(
    redirect: Arc<dyn LoginRedirect>,
    target: String,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        redirect.redirect_to_login(&target);
    });
}
