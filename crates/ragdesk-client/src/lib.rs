//! Client library for the ragdesk document question-answering backend.
//!
//! This crate owns everything a front end needs to talk to the backend:
//!
//! - **Session lifecycle**: restore a cached sign-in on start-up, complete the
//!   identity provider's redirect, log out, and react to a revoked session
//! - **HTTP wrapper** that attaches the credential and turns every `401` into
//!   a local sign-out
//! - **Domain services** for documents, questions and user administration
//!
//! Session state is published through a `tokio::sync::watch` channel so any
//! number of views can follow it without polling.
//!
//! # Architecture
//!
//! ```text
//! SessionController
//! ├── SessionStore     (restore once, login, logout)
//! │   └── AuthService  (/auth/login, /auth/exchange, /auth/me, /auth/logout)
//! ├── Navigator        (visible address: read, replace, navigate)
//! └── ApiClient        (bearer credential, 401 interception)
//!     ├── CredentialCache  (MemoryCache | FileCache)
//!     └── SessionState     (watch channel of Session)
//!
//! FileService · RagService · Conversation · UserService   (all via ApiClient)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ragdesk_client::{ClientConfig, FileCache, MemoryNavigator, SessionController};
//!
//! # async fn example() -> ragdesk_client::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let cache = Arc::new(FileCache::new(config.cache_path.clone()));
//! let navigator = Arc::new(MemoryNavigator::default());
//! let controller = SessionController::connect(config, cache, navigator)?;
//!
//! let session = controller.initialize().await;
//! if let Some(identity) = &session.identity {
//!     println!("signed in as {}", identity.display_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod callback;
pub mod config;
pub mod controller;
pub mod error;
pub mod files;
pub mod guard;
pub mod http;
pub mod identity;
pub mod navigator;
pub mod rag;
pub mod state;
pub mod store;
pub mod users;

mod timestamp;

// Re-export key types at the crate root for convenience.
pub use auth::{AuthService, LoginResponse, LoginUrl};
pub use cache::{CachedCredentials, CredentialCache, FileCache, MemoryCache};
pub use callback::{CallbackListener, CallbackParams};
pub use config::ClientConfig;
pub use controller::SessionController;
pub use error::{ClientError, Result};
pub use files::{FileItem, FileService};
pub use guard::{RequestGuard, Ticket};
pub use http::ApiClient;
pub use identity::{AuthState, Identity, Role, Session};
pub use navigator::{MemoryNavigator, Navigator};
pub use rag::{AnswerResponse, ChatExchange, Conversation, QaPair, QuestionStats, RagService};
pub use state::SessionState;
pub use store::SessionStore;
pub use users::{UserList, UserRecord, UserService};
