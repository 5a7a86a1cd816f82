use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use rfp_analyst_core::actions::{self, Action, ActionKind, ActionOutcome};
use rfp_analyst_core::{Alert, Backend, BackendError, BackendStatus, Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Path of the RFP PDF to upload
    UploadPath,
    /// "What should be changed?" when rejecting a draft
    Feedback,
}

/// Modal single-line text prompt
#[derive(Debug, Clone)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
    pub cursor: usize,
}

impl Prompt {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            input: String::new(),
            cursor: 0,
        }
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: Session,

    // Chat input
    pub input: String,
    pub input_cursor: usize, // cursor position in input (chars)

    // Modal state; alerts always win over prompts
    pub prompt: Option<Prompt>,
    pub alerts: VecDeque<Alert>,

    // Non-blocking notices (saved report path, hints)
    pub status_line: Option<String>,
    pub backend_status: Option<String>,
    pub backend_service: Option<String>,

    // Transcript scrolling
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of chat area, updated during render
    pub chat_width: u16,  // Inner width of chat area, updated during render
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Backend
    pub base_url: String,
    pub download_dir: PathBuf,
    backend: Arc<dyn Backend>,
    task: Option<(ActionKind, JoinHandle<ActionOutcome>)>,
    status_task: Option<JoinHandle<Result<BackendStatus, BackendError>>>,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, base_url: String, download_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            session: Session::new(),

            input: String::new(),
            input_cursor: 0,

            prompt: None,
            alerts: VecDeque::new(),

            status_line: None,
            backend_status: None,
            backend_service: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,

            base_url,
            download_dir,
            backend,
            task: None,
            status_task: None,
        }
    }

    /// A request is in flight. The session's loading flag is advisory; this is the real guard.
    pub fn is_busy(&self) -> bool {
        self.task.is_some()
    }

    /// Ask the backend for its health line in the background
    pub fn check_backend(&mut self) {
        let backend = self.backend.clone();
        self.backend_status = Some("connecting".to_string());
        self.status_task = Some(tokio::spawn(async move { backend.status().await }));
    }

    fn launch(&mut self, action: Action) {
        tracing::debug!(kind = ?action.kind(), "starting action");
        let kind = action.kind();
        let handle = actions::spawn(self.backend.clone(), action);
        self.task = Some((kind, handle));
        self.scroll_to_bottom();
    }

    fn refuse(&mut self, error: SessionError) {
        tracing::debug!(%error, "action refused");
        self.status_line = Some(error.to_string());
    }

    pub fn push_alert(&mut self, alert: Alert) {
        tracing::info!(message = %alert.message, "alert");
        self.alerts.push_back(alert);
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    pub fn current_alert(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    // User actions

    pub fn open_upload_prompt(&mut self) {
        if self.session.is_file_uploaded() {
            self.refuse(SessionError::AlreadyUploaded);
        } else if self.is_busy() {
            self.refuse(SessionError::Busy);
        } else {
            self.prompt = Some(Prompt::new(PromptKind::UploadPath));
        }
    }

    pub fn start_upload(&mut self, path: &Path) {
        if self.is_busy() {
            self.refuse(SessionError::Busy);
            return;
        }

        let file_name = match actions::validate_pdf_path(path) {
            Ok(name) => name,
            Err(e) => {
                self.push_alert(Alert::new(format!("Error uploading file: {}", e)));
                return;
            }
        };

        match self.session.begin_upload() {
            Ok(()) => {
                self.status_line = Some(format!("Processing {}...", file_name));
                self.launch(Action::Upload {
                    path: path.to_path_buf(),
                    file_name,
                });
            }
            Err(e) => self.refuse(e),
        }
    }

    pub fn focus_input(&mut self) {
        if self.session.can_chat() {
            self.input_mode = InputMode::Editing;
            self.input_cursor = self.input.chars().count();
        } else {
            self.status_line = Some("Upload an RFP PDF first (press u)".to_string());
        }
    }

    pub fn send_message(&mut self) {
        if self.is_busy() || !self.session.can_send(&self.input) {
            return;
        }

        match self.session.begin_chat(&self.input) {
            Ok(request) => {
                self.input.clear();
                self.input_cursor = 0;
                self.launch(Action::Chat(request));
            }
            Err(e) => self.refuse(e),
        }
    }

    pub fn export_report(&mut self) {
        if self.is_busy() {
            self.refuse(SessionError::Busy);
            return;
        }

        match self.session.report_request() {
            Ok(request) => {
                self.status_line = Some("Downloading report...".to_string());
                self.launch(Action::Report {
                    request,
                    download_dir: self.download_dir.clone(),
                });
            }
            Err(alert) => self.push_alert(alert),
        }
    }

    pub fn generate_brief(&mut self) {
        if self.is_busy() {
            self.refuse(SessionError::Busy);
            return;
        }

        match self.session.begin_brief() {
            Ok(()) => self.launch(Action::GenerateBrief),
            Err(e) => self.refuse(e),
        }
    }

    pub fn approve_draft(&mut self) {
        match self.session.approve() {
            Ok(alert) => self.push_alert(alert),
            Err(e) => self.refuse(e),
        }
    }

    pub fn reject_draft(&mut self) {
        if self.session.pending_approval().is_none() {
            self.refuse(SessionError::NothingPending);
        } else if self.is_busy() {
            self.refuse(SessionError::Busy);
        } else {
            self.prompt = Some(Prompt::new(PromptKind::Feedback));
        }
    }

    /// `None` means the prompt was cancelled
    pub fn submit_feedback(&mut self, feedback: Option<&str>) {
        if self.is_busy() {
            self.refuse(SessionError::Busy);
            return;
        }

        match self.session.begin_refine(feedback) {
            Ok(Some(request)) => self.launch(Action::Refine(request)),
            Ok(None) => {}
            Err(e) => self.refuse(e),
        }
    }

    /// Close the open prompt and act on it
    pub fn submit_prompt(&mut self, cancelled: bool) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };

        match prompt.kind {
            PromptKind::UploadPath => {
                let path = prompt.input.trim();
                if !cancelled && !path.is_empty() {
                    self.start_upload(&expand_home(path));
                }
            }
            PromptKind::Feedback => {
                let feedback = if cancelled { None } else { Some(prompt.input.as_str()) };
                self.submit_feedback(feedback);
            }
        }
    }

    /// Apply finished background work. Called after every event.
    pub async fn poll_tasks(&mut self) {
        if self.task.as_ref().map(|(_, h)| h.is_finished()).unwrap_or(false) {
            if let Some((kind, handle)) = self.task.take() {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(error = %e, "action task failed");
                        kind.failed(BackendError::Task(e.to_string()))
                    }
                };

                let feedback = actions::apply(&mut self.session, outcome);
                self.status_line = feedback.status;
                if let Some(alert) = feedback.alert {
                    self.push_alert(alert);
                }
                self.scroll_to_bottom();
            }
        }

        if self.status_task.as_ref().map(|h| h.is_finished()).unwrap_or(false) {
            if let Some(handle) = self.status_task.take() {
                self.backend_status = Some(match handle.await {
                    Ok(Ok(status)) => {
                        tracing::info!(status = %status.status, service = %status.service, "backend reachable");
                        self.backend_service = Some(status.service).filter(|s| !s.is_empty());
                        status.status
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "backend health check failed");
                        "unreachable".to_string()
                    }
                    Err(_) => "unknown".to_string(),
                });
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_loading() || self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Scrolling

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.total_chat_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down(self.visible_height() / 2);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up(self.visible_height() / 2);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Estimated wrapped height of the transcript, matching the layout in `ui`
    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: usize = 0;
        for msg in self.session.messages() {
            total += 1; // Role line
            for line in msg.text.lines() {
                // Character count, not byte length, for UTF-8
                let char_count = line.chars().count();
                total += char_count / wrap_width + 1;
            }
            if !msg.sources.is_empty() {
                total += 1;
            }
            total += 1; // Blank line after message
        }

        if self.session.is_loading() && self.session.is_file_uploaded() {
            total += 2; // "Analyst:" + "Thinking..."
        }

        total.min(u16::MAX as usize) as u16
    }
}

/// Expand a leading `~/` the way a shell would
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfp_analyst_core::backend::{
        BriefReply, ChatReply, ChatRequest, RefineRequest, ReportFile, ReportRequest,
        UploadReceipt,
    };
    use rfp_analyst_core::session::EMPTY_REPORT;

    /// Accepts uploads and drafts briefs, fails everything else
    struct NoBackend;

    fn offline() -> BackendError {
        BackendError::Status {
            status: 503,
            message: "offline".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl Backend for NoBackend {
        async fn status(&self) -> Result<BackendStatus, BackendError> {
            Err(offline())
        }
        async fn upload_pdf(&self, _: &str, _: Vec<u8>) -> Result<UploadReceipt, BackendError> {
            Ok(UploadReceipt::default())
        }
        async fn chat(&self, _: &ChatRequest) -> Result<ChatReply, BackendError> {
            Err(offline())
        }
        async fn download_report(&self, _: &ReportRequest) -> Result<ReportFile, BackendError> {
            Err(offline())
        }
        async fn generate_brief(&self) -> Result<BriefReply, BackendError> {
            Ok(BriefReply {
                answer: "# Brief".to_string(),
                category: None,
            })
        }
        async fn refine_brief(&self, _: &RefineRequest) -> Result<BriefReply, BackendError> {
            Err(offline())
        }
    }

    fn app() -> App {
        App::new(
            Arc::new(NoBackend),
            "http://localhost".to_string(),
            PathBuf::from("."),
        )
    }

    async fn settle(app: &mut App) {
        while app.is_busy() {
            tokio::task::yield_now().await;
            app.poll_tasks().await;
        }
    }

    #[tokio::test]
    async fn test_input_locked_until_upload() {
        let mut app = app();
        app.focus_input();
        assert_eq!(app.input_mode, InputMode::Normal);

        app.input = "What are the legal risks?".to_string();
        app.send_message();
        assert!(!app.is_busy());
        assert_eq!(app.session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_export_of_empty_chat_alerts_without_request() {
        let mut app = app();
        app.export_report();
        assert!(!app.is_busy());
        assert_eq!(app.current_alert().map(|a| a.message.as_str()), Some(EMPTY_REPORT));
        app.dismiss_alert();
        assert!(app.current_alert().is_none());
    }

    #[tokio::test]
    async fn test_non_pdf_upload_alerts() {
        let mut app = app();
        app.open_upload_prompt();
        assert_eq!(app.prompt.as_ref().map(|p| p.kind), Some(PromptKind::UploadPath));
        app.prompt.as_mut().unwrap().input = "/tmp/notes.txt".to_string();
        app.submit_prompt(false);

        assert!(!app.is_busy());
        assert_eq!(
            app.current_alert().map(|a| a.message.as_str()),
            Some("Error uploading file: Only PDF files are allowed.")
        );
    }

    #[tokio::test]
    async fn test_upload_chat_error_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("rfp.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let mut app = app();
        app.start_upload(&pdf);
        settle(&mut app).await;
        assert!(app.session.is_file_uploaded());

        app.focus_input();
        assert_eq!(app.input_mode, InputMode::Editing);
        app.input = "hi".to_string();
        app.send_message();
        assert!(app.input.is_empty());
        settle(&mut app).await;

        assert_eq!(app.session.messages().last().unwrap().text, "Error: offline");
        assert!(app.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_feedback_prompt_cancel_keeps_draft() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("rfp.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let mut app = app();
        app.start_upload(&pdf);
        settle(&mut app).await;
        app.generate_brief();
        settle(&mut app).await;
        assert_eq!(app.session.pending_approval(), Some("# Brief"));

        app.reject_draft();
        assert_eq!(app.prompt.as_ref().map(|p| p.kind), Some(PromptKind::Feedback));
        app.submit_prompt(true);
        assert!(!app.is_busy());
        assert_eq!(app.session.pending_approval(), Some("# Brief"));

        // A failed refinement consumes the draft
        app.reject_draft();
        app.prompt.as_mut().unwrap().input = "shorter".to_string();
        app.submit_prompt(false);
        settle(&mut app).await;
        assert_eq!(app.session.pending_approval(), None);
        assert_eq!(
            app.current_alert().map(|a| a.message.as_str()),
            Some("Error refining: offline")
        );
        app.dismiss_alert();
        app.reject_draft();
        assert!(app.prompt.is_none());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/rfp.pdf"), PathBuf::from("/tmp/rfp.pdf"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/rfp.pdf"), home.join("rfp.pdf"));
        }
    }
}
