//! Session lifecycle controller.
//!
//! [`SessionController`] drives the authentication state machine:
//!
//! ```text
//! Initializing ──restore/exchange──> Authenticated
//!      │                                  │   ▲
//!      └───────────> Anonymous <──────────┘   │
//!                       │   logout / any 401  │
//!                       └──── login ──────────┘
//! ```
//!
//! It serializes page-load restoration and redirect handling, guarantees at
//! most one exchange per authorization code, and keeps the auth error shown
//! to the user. It is the only writer of the session besides the wrapper's
//! 401 handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OnceCell, watch};
use tracing::{debug, info, warn};

use crate::auth::{AuthService, LoginUrl};
use crate::cache::CredentialCache;
use crate::callback::CallbackParams;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::http::ApiClient;
use crate::identity::{AuthState, Identity, Session};
use crate::navigator::{self, Navigator};
use crate::state::SessionState;
use crate::store::SessionStore;

/// Result of one exchange attempt, shared by every caller that presented the
/// same code while it was in flight.
#[derive(Debug, Clone)]
enum ExchangeOutcome {
    Authenticated(Identity),
    Failed(String),
}

/// Orchestrates restoration, redirect handling, login and logout.
pub struct SessionController {
    api: Arc<ApiClient>,
    auth: AuthService,
    store: SessionStore,
    cache: Arc<dyn CredentialCache>,
    navigator: Arc<dyn Navigator>,
    state: SessionState,
    // One cell per code ever presented. An initialized cell means the code is spent.
    // Entries live as long as the controller, i.e. one page load or CLI run,
    // and only grow by one per login the user completes or abandons.
    exchanges: Mutex<HashMap<String, Arc<OnceCell<ExchangeOutcome>>>>,
    error: watch::Sender<Option<String>>,
}

impl SessionController {
    /// Build a controller around an existing client.
    pub fn new(api: Arc<ApiClient>) -> Self {
        let (error, _) = watch::channel(None);
        Self {
            auth: AuthService::new(Arc::clone(&api)),
            store: SessionStore::new(Arc::clone(&api)),
            cache: Arc::clone(api.cache()),
            navigator: Arc::clone(api.navigator()),
            state: api.session().clone(),
            exchanges: Mutex::new(HashMap::new()),
            error,
            api,
        }
    }

    /// Wire up a client, session state and controller in one go.
    pub fn connect(
        config: ClientConfig,
        cache: Arc<dyn CredentialCache>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let api = ApiClient::new(config, cache, SessionState::new(), navigator)?;
        Ok(Self::new(Arc::new(api)))
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn session(&self) -> Session {
        self.state.snapshot()
    }

    pub fn state(&self) -> AuthState {
        self.state.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// The authentication error currently shown to the user.
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// Dismiss the shown error.
    pub fn clear_error(&self) {
        self.set_error(None);
    }

    pub fn subscribe_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    // -- Transitions --------------------------------------------------------

    /// Page load: restore the session, then process any redirect parameters in
    /// the current location.
    ///
    /// The two steps run in sequence so a finished exchange cannot be
    /// overwritten by a late restoration result. Leaves `loading` false
    /// whatever the network did, unless another caller's exchange is still
    /// running.
    pub async fn initialize(&self) -> Session {
        self.store.restore_pending().await;

        let location = self.navigator.location();
        if let Some(params) = CallbackParams::from_location(&location) {
            self.handle_redirect(params).await;
        }

        self.state.settle();
        let session = self.state.snapshot();
        info!(state = ?session.state(), "session initialized");
        session
    }

    /// Process the parameters of a redirect back from the identity provider.
    ///
    /// Waits for restoration first, so a late restoration result (and the
    /// 401 cleanup it may trigger) can never undo a finished exchange.
    pub async fn handle_redirect(&self, params: CallbackParams) {
        self.store.restore_pending().await;

        match params {
            CallbackParams::Error { .. } => {
                let error = ClientError::ProviderError {
                    message: params.error_message().unwrap_or_default().to_string(),
                };
                warn!(error = %error, "identity provider reported an error");
                self.set_error(Some(error.to_string()));
                self.strip_address();
            }
            CallbackParams::Code { code, state } => {
                if self.state.snapshot().is_authenticated() {
                    debug!("already authenticated, ignoring authorization code");
                    self.strip_address();
                    self.state.settle();
                    return;
                }

                match self.exchange_once(&code, state.as_deref()).await {
                    ExchangeOutcome::Authenticated(identity) => {
                        info!(user_id = identity.id, "signed in");
                        self.set_error(None);
                    }
                    ExchangeOutcome::Failed(message) => {
                        warn!(error = %message, "authorization code exchange failed");
                        self.set_error(Some(message));
                    }
                }
                self.strip_address();
            }
        }
        self.state.settle();
    }

    /// Start an interactive login: fetch the provider URL and navigate to it.
    ///
    /// The page is left at this point; authentication completes through
    /// [`handle_redirect`](Self::handle_redirect) once the provider sends the
    /// user back. The URL's `state` parameter, if any, is remembered so the
    /// redirect can be checked against it.
    pub async fn login(&self, provider: Option<&str>) -> Result<String> {
        let LoginUrl { authorization_url } = match self.auth.login_url(provider).await {
            Ok(url) => url,
            Err(e) => {
                self.set_error(Some(format!("Failed to start login: {e}")));
                return Err(e);
            }
        };

        let pending = pending_state(&authorization_url);
        if let Err(e) = self.cache.update(&mut |c| c.auth_state = pending.clone()) {
            warn!(error = %e, "failed to record pending login state");
        }

        info!(provider = provider.unwrap_or("default"), "redirecting to identity provider");
        self.set_error(None);
        self.navigator.navigate(&authorization_url);
        Ok(authorization_url)
    }

    /// Log out locally and remotely. Local state is cleared even when the
    /// backend cannot be reached.
    pub async fn logout(&self) -> Session {
        let session = self.store.logout().await;
        self.set_error(None);
        session
    }

    // -- Internal helpers ---------------------------------------------------

    /// Run the exchange for `code` at most once.
    ///
    /// Callers arriving while the first attempt is in flight wait for it and
    /// share its outcome. A code whose attempt already finished is spent: it is
    /// refused without a request, and the user has to start a new login.
    async fn exchange_once(&self, code: &str, state: Option<&str>) -> ExchangeOutcome {
        let cell = {
            let mut exchanges = match self.exchanges.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(
                exchanges
                    .entry(code.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        if cell.initialized() {
            debug!("authorization code already used");
            return ExchangeOutcome::Failed(ClientError::CodeAlreadyUsed.to_string());
        }

        cell.get_or_init(|| async {
            self.state.begin_exchange();
            let outcome = match self.perform_exchange(code, state).await {
                Ok(identity) => ExchangeOutcome::Authenticated(identity),
                Err(e) => {
                    self.store.forget();
                    ExchangeOutcome::Failed(e.to_string())
                }
            };
            if let Err(e) = self.cache.update(&mut |c| c.auth_state = None) {
                warn!(error = %e, "failed to drop pending login state");
            }
            self.state.end_exchange();
            outcome
        })
        .await
        .clone()
    }

    async fn perform_exchange(&self, code: &str, state: Option<&str>) -> Result<Identity> {
        let pending = self.cache.load().ok().and_then(|c| c.auth_state);
        if let Some(expected) = pending
            && state != Some(expected.as_str())
        {
            return Err(ClientError::StateMismatch {
                expected,
                returned: state.unwrap_or_default().to_string(),
            });
        }

        let tokens = self.auth.exchange(code, state).await?;
        self.store.store_token(&tokens.access_token)?;

        let identity = self.auth.current_user().await?;
        self.store.login(identity.clone());
        Ok(identity)
    }

    fn strip_address(&self) {
        let location = self.navigator.location();
        let stripped = navigator::strip_query(&location);
        if stripped != location {
            self.navigator.replace(&stripped);
        }
    }

    fn set_error(&self, message: Option<String>) {
        self.error.send_if_modified(|current| {
            let changed = *current != message;
            *current = message.clone();
            changed
        });
    }
}

/// The `state` query parameter of an authorization URL.
fn pending_state(authorization_url: &str) -> Option<String> {
    let url = url::Url::parse(authorization_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::navigator::MemoryNavigator;

    /// A controller pointed at a closed port; only the offline paths run.
    fn offline_controller(location: &str) -> (SessionController, Arc<MemoryNavigator>) {
        let navigator = Arc::new(MemoryNavigator::new(location));
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..ClientConfig::default()
        };
        let controller = SessionController::connect(
            config,
            Arc::new(MemoryCache::new()),
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        )
        .unwrap();
        (controller, navigator)
    }

    #[test]
    fn pending_state_extraction() {
        assert_eq!(
            pending_state("https://idp.example.com/authorize?client_id=c&state=s%2B1").as_deref(),
            Some("s+1")
        );
        assert_eq!(pending_state("https://idp.example.com/authorize"), None);
        assert_eq!(pending_state("not a url"), None);
    }

    #[tokio::test]
    async fn error_redirect_records_message_and_strips_address() {
        let (controller, navigator) =
            offline_controller("/?error=access_denied&message=User%20cancelled");
        let mut errors = controller.subscribe_error();

        let params = CallbackParams::from_location(&navigator.location()).unwrap();
        controller.handle_redirect(params).await;

        assert!(errors.has_changed().unwrap());
        assert_eq!(errors.borrow_and_update().as_deref(), Some("User cancelled"));
        assert_eq!(controller.error().as_deref(), Some("User cancelled"));
        assert_eq!(navigator.location(), "/");
        assert_eq!(controller.state(), AuthState::Anonymous);

        controller.clear_error();
        assert_eq!(controller.error(), None);
    }

    #[tokio::test]
    async fn initialize_settles_when_backend_is_unreachable() {
        let (controller, _navigator) = offline_controller("/");
        let session = controller.initialize().await;
        assert_eq!(
            session,
            Session {
                identity: None,
                loading: false,
            }
        );
    }

    #[tokio::test]
    async fn mismatched_state_never_reaches_the_network() {
        let (controller, navigator) = offline_controller("/?code=abc&state=forged");
        controller
            .cache
            .update(&mut |c| c.auth_state = Some("expected".to_string()))
            .unwrap();

        let params = CallbackParams::from_location(&navigator.location()).unwrap();
        controller.handle_redirect(params).await;

        let error = controller.error().unwrap();
        assert!(error.contains("state mismatch"), "got: {error}");
        assert_eq!(navigator.location(), "/");
        // The pending state is single-use.
        assert_eq!(controller.cache.load().unwrap().auth_state, None);
    }

    #[test]
    fn controller_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionController>();
    }
}
