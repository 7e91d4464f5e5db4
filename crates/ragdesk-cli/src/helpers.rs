//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, the terminal navigator and output
//! formatting.

use std::sync::Mutex;

use ragdesk_client::files::format_size;
use ragdesk_client::navigator::LANDING_PATH;
use ragdesk_client::{AnswerResponse, FileItem, Identity, Navigator, QaPair, UserRecord};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

/// A navigator for a terminal: there is no browser to drive, so external
/// navigations are printed for the user to open.
pub struct TerminalNavigator {
    location: Mutex<String>,
}

impl TerminalNavigator {
    pub fn new() -> Self {
        Self {
            location: Mutex::new(LANDING_PATH.to_string()),
        }
    }
}

impl Navigator for TerminalNavigator {
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
        if url.starts_with('/') {
            debug!(to = url, "navigating");
            self.replace(url);
        } else {
            println!("Open this URL in your browser to sign in:\n\n  {url}\n");
        }
    }
}

/// Turn a pasted redirect URL (absolute or `/path?query`) into a location.
pub fn location_from(pasted: &str) -> anyhow::Result<String> {
    let pasted = pasted.trim();
    if pasted.starts_with('/') {
        return Ok(pasted.to_string());
    }
    let url = url::Url::parse(pasted)?;
    Ok(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

pub fn print_identity(identity: &Identity) {
    println!(
        "{} (id {}, role {})",
        identity.display_name(),
        identity.id,
        identity.role
    );
}

pub fn print_files(files: &[FileItem]) {
    if files.is_empty() {
        println!("No documents uploaded yet.");
        return;
    }
    println!("{:<6} {:<40} {:>10}  {:<10}  UPLOADED", "ID", "NAME", "SIZE", "STATUS");
    for file in files {
        println!(
            "{:<6} {:<40} {:>10}  {:<10}  {}",
            file.id,
            file.original_filename,
            format_size(file.file_size),
            file.status.as_deref().unwrap_or("-"),
            file.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

pub fn print_answer(answer: &AnswerResponse) {
    println!("{}\n", answer.answer);
    println!("confidence: {:.0}%", answer.confidence_score * 100.0);
    for source in &answer.sources {
        match source.page_number {
            Some(page) => println!("  - {} (page {page})", source.filename),
            None => println!("  - {}", source.filename),
        }
    }
    for image in &answer.images {
        println!(
            "  [image] {}",
            image.description.as_deref().unwrap_or(&image.image_path)
        );
    }
}

pub fn print_history(pairs: &[QaPair]) {
    if pairs.is_empty() {
        println!("No questions yet.");
        return;
    }
    for pair in pairs {
        println!(
            "#{} {}  {}",
            pair.question.id,
            pair.question.created_at.format("%Y-%m-%d %H:%M"),
            pair.question.question_text
        );
        println!("    {}\n", pair.answer.answer_text);
    }
}

pub fn print_users(users: &[UserRecord]) {
    println!("{:<6} {:<40} {:<6}  CREATED", "ID", "EMAIL", "ROLE");
    for user in users {
        println!(
            "{:<6} {:<40} {:<6}  {}",
            user.id,
            user.email.as_deref().unwrap_or("-"),
            user.role.to_string(),
            user.created_at.format("%Y-%m-%d"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasted_urls_become_locations() {
        assert_eq!(
            location_from("http://127.0.0.1:8400/?code=abc&state=xyz").unwrap(),
            "/?code=abc&state=xyz"
        );
        assert_eq!(location_from(" /?code=abc ").unwrap(), "/?code=abc");
        assert_eq!(location_from("http://localhost:3000/").unwrap(), "/");
        assert!(location_from("not a url").is_err());
    }

    #[test]
    fn relative_navigation_moves_location() {
        let navigator = TerminalNavigator::new();
        navigator.navigate("/files");
        assert_eq!(navigator.location(), "/files");
        navigator.replace("/");
        assert_eq!(navigator.location(), "/");
    }
}
