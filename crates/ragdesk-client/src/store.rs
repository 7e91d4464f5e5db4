//! Session store.
//!
//! [`SessionStore`] owns the write side of the session: restoration from an
//! existing credential, login after a verified authentication event, and
//! logout. Every write goes to both the shared [`SessionState`] and the
//! credential cache, so the cache never claims more than the session does.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::cache::CredentialCache;
use crate::error::{ClientError, Result};
use crate::http::ApiClient;
use crate::identity::{Identity, Session};
use crate::state::SessionState;

/// Reads and writes the session on behalf of the lifecycle controller.
pub struct SessionStore {
    auth: AuthService,
    cache: Arc<dyn CredentialCache>,
    state: SessionState,
    restored: OnceCell<()>,
}

impl SessionStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            cache: Arc::clone(api.cache()),
            state: api.session().clone(),
            auth: AuthService::new(api),
            restored: OnceCell::new(),
        }
    }

    pub fn session(&self) -> Session {
        self.state.snapshot()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The last identity written to the cache, for an initial render before
    /// restoration finishes. Never an authentication decision.
    pub fn cached_identity(&self) -> Option<Identity> {
        self.cache.load().ok().and_then(|c| c.auth_user)
    }

    /// Recover the session from the cached credential and settle `loading`.
    ///
    /// Runs at most once per store. Concurrent callers wait for the single
    /// in-flight attempt instead of issuing their own request; later callers
    /// get the settled session back without touching the network. Failures are
    /// absorbed: the session degrades to anonymous. `loading` stays up while a
    /// code exchange is running.
    pub async fn restore(&self) -> Session {
        self.restore_pending().await;
        self.state.settle();
        self.state.snapshot()
    }

    /// Restoration without settling `loading`, for callers that continue with
    /// a callback exchange.
    pub(crate) async fn restore_pending(&self) {
        self.restored.get_or_init(|| self.restore_once()).await;
    }

    async fn restore_once(&self) {
        debug!("restoring session");
        match self.auth.current_user().await {
            Ok(identity) => {
                info!(user_id = identity.id, role = %identity.role, "session restored");
                self.login(identity);
            }
            Err(ClientError::Unauthorized) => {
                debug!("no valid credential, continuing anonymously");
                self.forget();
            }
            Err(e) => {
                warn!(error = %e, "session restoration failed, continuing anonymously");
                self.forget();
            }
        }
    }

    /// Record a verified identity.
    pub fn login(&self, identity: Identity) {
        let cached = identity.clone();
        if let Err(e) = self.cache.update(&mut |c| c.auth_user = Some(cached.clone())) {
            warn!(error = %e, "failed to cache identity");
        }
        self.state.set_identity(identity);
    }

    /// Invalidate the backend session, then clear local state no matter how
    /// the remote call went.
    pub async fn logout(&self) -> Session {
        if let Err(e) = self.auth.logout().await {
            warn!(error = %e, "remote logout failed, clearing local session anyway");
        }

        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "failed to clear credential cache");
        }
        self.state.clear_identity();
        self.state.set_loading(false);

        info!("logged out");
        self.state.snapshot()
    }

    /// Persist a freshly issued bearer token. Any pending login state is spent
    /// at this point and dropped.
    pub(crate) fn store_token(&self, token: &str) -> Result<()> {
        self.cache.update(&mut |c| {
            c.auth_token = Some(token.to_string());
            c.auth_state = None;
        })
    }

    /// Drop the token and identity locally.
    pub(crate) fn forget(&self) {
        if let Err(e) = self.cache.update(&mut |c| c.forget_session()) {
            warn!(error = %e, "failed to clear credential cache");
        }
        self.state.clear_identity();
    }
}
