//! CLI entry point for ragdesk.
//!
//! This binary provides the `ragdesk` command: signing in through the
//! identity provider, managing documents, asking questions and administering
//! users.

mod cli;
mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ragdesk_client::{
    AuthService, CallbackListener, ClientConfig, Conversation, CredentialCache, FileCache,
    FileService, Navigator, RagService, SessionController, UserService,
};
use tracing::{debug, info};

use crate::cli::{Cli, Commands, FileAction, UserAction};
use crate::helpers::{TerminalNavigator, init_tracing};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing("warn");

    let config = load_config(&cli)?;
    let app = App::connect(config)?;

    match cli.command {
        Commands::Login { provider } => app.cmd_login(provider.as_deref()).await,
        Commands::Callback { url } => app.cmd_callback(&url).await,
        Commands::Whoami => app.cmd_whoami().await,
        Commands::Logout => app.cmd_logout().await,
        Commands::Refresh => app.cmd_refresh().await,
        Commands::Files { action } => app.cmd_files(action).await,
        Commands::Ask { question, session } => app.cmd_ask(&question, session).await,
        Commands::AskVoice { file, session } => app.cmd_ask_voice(&file, session).await,
        Commands::History { limit } => {
            let pairs = app.rag().history(limit).await?;
            helpers::print_history(&pairs);
            Ok(())
        }
        Commands::SessionHistory { id } => {
            let pairs = app.rag().session_history(&id).await?;
            helpers::print_history(&pairs);
            Ok(())
        }
        Commands::DeleteQuestion { id } => {
            app.rag().delete_question(id).await?;
            println!("Question {id} deleted.");
            Ok(())
        }
        Commands::Stats => {
            let stats = app.rag().stats().await?;
            println!("questions:      {}", stats.total_questions);
            println!("answers:        {}", stats.total_answers);
            println!("avg confidence: {:.0}%", stats.avg_confidence * 100.0);
            Ok(())
        }
        Commands::Users { action } => app.cmd_users(action).await,
    }
}

/// Environment first, then command-line flags on top.
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("failed to read configuration")?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(cache) = &cli.cache {
        config.cache_path = cache.clone();
    }
    if let Some(port) = cli.callback_port {
        config.callback_port = port;
    }
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

struct App {
    controller: SessionController,
    navigator: Arc<TerminalNavigator>,
    cache: Arc<FileCache>,
}

impl App {
    fn connect(config: ClientConfig) -> Result<Self> {
        let cache = Arc::new(FileCache::new(config.cache_path.clone()));
        let navigator = Arc::new(TerminalNavigator::new());
        let controller = SessionController::connect(
            config,
            Arc::clone(&cache) as Arc<dyn CredentialCache>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        )
        .context("failed to create API client")?;
        Ok(Self {
            controller,
            navigator,
            cache,
        })
    }

    fn files(&self) -> FileService {
        FileService::new(Arc::clone(self.controller.api()))
    }

    fn rag(&self) -> RagService {
        RagService::new(Arc::clone(self.controller.api()))
    }

    fn users(&self) -> UserService {
        UserService::new(Arc::clone(self.controller.api()))
    }

    // -- Session ------------------------------------------------------------

    async fn cmd_login(&self, provider: Option<&str>) -> Result<()> {
        let session = self.controller.initialize().await;
        if let Some(identity) = &session.identity {
            print!("Already signed in as ");
            helpers::print_identity(identity);
            return Ok(());
        }

        // Listen before the user can possibly come back.
        let config = self.controller.api().config();
        let listener = CallbackListener::bind(config.callback_port, config.callback_timeout_secs)
            .await
            .context("failed to start callback listener")?;

        self.controller.login(provider).await?;
        println!("Waiting for the browser to come back...");

        let target = listener.wait().await?;
        self.finish_sign_in(&target).await
    }

    async fn cmd_callback(&self, url: &str) -> Result<()> {
        let location = helpers::location_from(url).context("not a redirect URL")?;
        self.finish_sign_in(&location).await
    }

    async fn finish_sign_in(&self, location: &str) -> Result<()> {
        self.navigator.replace(location);
        let session = self.controller.initialize().await;

        if let Some(message) = self.controller.error() {
            bail!(message);
        }
        match &session.identity {
            Some(identity) => {
                print!("Signed in as ");
                helpers::print_identity(identity);
                Ok(())
            }
            None => bail!("sign-in did not complete"),
        }
    }

    async fn cmd_whoami(&self) -> Result<()> {
        if let Some(cached) = self.controller.store().cached_identity() {
            debug!(user_id = cached.id, "checking cached sign-in with the backend");
        }
        match self.controller.initialize().await.identity {
            Some(identity) => helpers::print_identity(&identity),
            None => println!("Not signed in."),
        }
        Ok(())
    }

    async fn cmd_logout(&self) -> Result<()> {
        self.controller.logout().await;
        println!("Signed out.");
        Ok(())
    }

    async fn cmd_refresh(&self) -> Result<()> {
        let Some(token) = self.cache.load()?.auth_token else {
            bail!("not signed in");
        };

        let auth = AuthService::new(Arc::clone(self.controller.api()));
        let refreshed = auth.refresh(&token).await?;
        self.cache
            .update(&mut |c| c.auth_token = Some(refreshed.access_token.clone()))?;

        info!("access token refreshed");
        println!("Token refreshed.");
        Ok(())
    }

    // -- Documents ----------------------------------------------------------

    async fn cmd_files(&self, action: FileAction) -> Result<()> {
        let files = self.files();
        match action {
            FileAction::List => helpers::print_files(&files.list().await?),
            FileAction::Show { id } => {
                let item = files.get(id).await?;
                println!("{}", serde_json::to_string_pretty(&item)?);
            }
            FileAction::Upload { path } => {
                let item = files
                    .upload(&path)
                    .await
                    .with_context(|| format!("failed to upload {}", path.display()))?;
                println!("Uploaded {} as document {}.", item.original_filename, item.id);
            }
            FileAction::Download { id, output } => {
                let output = match output {
                    Some(path) => path,
                    None => PathBuf::from(files.get(id).await?.original_filename),
                };
                let bytes = files.download(id).await?;
                tokio::fs::write(&output, &bytes)
                    .await
                    .with_context(|| format!("failed to write {}", output.display()))?;
                println!("Saved {} ({} bytes).", output.display(), bytes.len());
            }
            FileAction::Delete { id } => {
                files.delete(id).await?;
                println!("Document {id} deleted.");
            }
        }
        Ok(())
    }

    // -- Questions ----------------------------------------------------------

    fn conversation(&self, session: Option<String>) -> Conversation {
        match session {
            Some(id) => Conversation::resume(self.rag(), id),
            None => Conversation::new(self.rag()),
        }
    }

    async fn cmd_ask(&self, question: &str, session: Option<String>) -> Result<()> {
        let conversation = self.conversation(session);
        if let Some(answer) = conversation.ask(question).await? {
            helpers::print_answer(&answer);
            println!("\nconversation: {}", conversation.id());
        }
        Ok(())
    }

    async fn cmd_ask_voice(&self, file: &std::path::Path, session: Option<String>) -> Result<()> {
        let conversation = self.conversation(session);
        let answer = conversation
            .ask_voice(file)
            .await
            .with_context(|| format!("failed to send {}", file.display()))?;
        if let Some(answer) = answer {
            helpers::print_answer(&answer);
            println!("\nconversation: {}", conversation.id());
        }
        Ok(())
    }

    // -- Users --------------------------------------------------------------

    async fn cmd_users(&self, action: UserAction) -> Result<()> {
        let users = self.users();
        match action {
            UserAction::List { skip, limit } => {
                let page = users.list(skip, limit).await?;
                helpers::print_users(&page.users);
                println!("\n{} of {} users", page.users.len(), page.total);
            }
            UserAction::Show { id } => {
                let user = users.get(id).await?;
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            UserAction::Create { email, role } => {
                let user = users.create(&email, role).await?;
                println!("Created user {} ({}).", user.id, user.role);
            }
            UserAction::Update { id, email, role } => {
                if email.is_none() && role.is_none() {
                    bail!("nothing to update: pass --email and/or --role");
                }
                let user = users.update(id, email.as_deref(), role).await?;
                println!("Updated user {}.", user.id);
            }
            UserAction::Delete { id } => {
                users.delete(id).await?;
                println!("User {id} deleted.");
            }
        }
        Ok(())
    }
}
