mod app;
mod handler;
mod logging;
mod markdown;
mod tui;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use app::App;
use rfp_analyst_core::{Config, HttpBackend};

#[derive(Parser, Debug, Default)]
#[command(name = "rfp-analyst")]
#[command(about = "Chat with an RFP analysis backend about an uploaded proposal PDF")]
#[command(version)]
struct Cli {
    /// Backend root URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Directory where downloaded reports are saved
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Upload this PDF as soon as the app starts
    #[arg(short, long)]
    upload: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Save the effective settings to the config file and exit
    #[arg(long)]
    write_config: bool,
}

/// Command-line flags win over the config file
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(dir) = &cli.download_dir {
        config.download_dir = Some(dir.clone());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    apply_overrides(&mut config, &cli);

    if cli.write_config {
        let path = config.save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let log_path = logging::init(cli.verbose)?;
    let backend = HttpBackend::new(&config.base_url(), config.request_timeout())?;
    let base_url = backend.base_url().to_string();
    tracing::info!(%base_url, log = %log_path.display(), "starting rfp-analyst");

    let mut app = App::new(Arc::new(backend), base_url, config.download_dir());
    app.check_backend();
    if let Some(path) = &cli.upload {
        app.start_upload(path);
    }

    // Restore the terminal even if we panic mid-frame
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(Duration::from_millis(250));

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut tui::EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config {
            base_url: Some("https://from-file.example".to_string()),
            download_dir: None,
            request_timeout_secs: Some(30),
        };
        let cli = Cli::parse_from([
            "rfp-analyst",
            "--base-url",
            "http://localhost:8000/",
            "--download-dir",
            "/tmp/reports",
        ]);
        apply_overrides(&mut config, &cli);

        assert_eq!(config.base_url(), "http://localhost:8000");
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/reports"));
        assert_eq!(config.request_timeout_secs, Some(30));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = Config {
            base_url: Some("https://from-file.example".to_string()),
            ..Config::default()
        };
        apply_overrides(&mut config, &Cli::default());
        assert_eq!(config.base_url(), "https://from-file.example");
    }

    #[test]
    fn test_upload_flag() {
        let cli = Cli::parse_from(["rfp-analyst", "-u", "rfp.pdf", "-v"]);
        assert_eq!(cli.upload, Some(PathBuf::from("rfp.pdf")));
        assert!(cli.verbose);
        assert!(!cli.write_config);
    }
}
