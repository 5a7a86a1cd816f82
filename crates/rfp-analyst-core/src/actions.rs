//! One async task per user action
//!
//! The caller runs the matching `Session::begin_*` transition, spawns the
//! action, and hands the outcome back to [`apply`]. Every outcome, including a
//! task that died, goes through a `Session::finish_*` transition so the
//! loading flag is always released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::{
    Backend, BriefReply, ChatReply, ChatRequest, RefineRequest, ReportFile, ReportRequest,
    UploadReceipt, DEFAULT_REPORT_NAME,
};
use crate::error::BackendError;
use crate::session::{Alert, Session};

#[derive(Debug, Clone)]
pub enum Action {
    Upload { path: PathBuf, file_name: String },
    Chat(ChatRequest),
    Report { request: ReportRequest, download_dir: PathBuf },
    GenerateBrief,
    Refine(RefineRequest),
}

/// What is in flight, kept so a crashed task can still be finished properly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Upload { file_name: String },
    Chat,
    Report,
    GenerateBrief,
    Refine,
}

#[derive(Debug)]
pub enum ActionOutcome {
    Uploaded {
        file_name: String,
        result: Result<UploadReceipt, BackendError>,
    },
    Answered(Result<ChatReply, BackendError>),
    ReportSaved(Result<PathBuf, BackendError>),
    BriefDrafted(Result<BriefReply, BackendError>),
    BriefRefined(Result<BriefReply, BackendError>),
}

/// What the UI should surface after an outcome lands
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feedback {
    pub alert: Option<Alert>,
    pub status: Option<String>,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Upload { file_name, .. } => ActionKind::Upload {
                file_name: file_name.clone(),
            },
            Action::Chat(_) => ActionKind::Chat,
            Action::Report { .. } => ActionKind::Report,
            Action::GenerateBrief => ActionKind::GenerateBrief,
            Action::Refine(_) => ActionKind::Refine,
        }
    }
}

impl ActionKind {
    /// The outcome to apply when the task never produced one
    pub fn failed(self, error: BackendError) -> ActionOutcome {
        match self {
            ActionKind::Upload { file_name } => ActionOutcome::Uploaded {
                file_name,
                result: Err(error),
            },
            ActionKind::Chat => ActionOutcome::Answered(Err(error)),
            ActionKind::Report => ActionOutcome::ReportSaved(Err(error)),
            ActionKind::GenerateBrief => ActionOutcome::BriefDrafted(Err(error)),
            ActionKind::Refine => ActionOutcome::BriefRefined(Err(error)),
        }
    }
}

pub fn spawn(backend: Arc<dyn Backend>, action: Action) -> JoinHandle<ActionOutcome> {
    tokio::spawn(run(backend, action))
}

pub async fn run(backend: Arc<dyn Backend>, action: Action) -> ActionOutcome {
    match action {
        Action::Upload { path, file_name } => {
            let result = match tokio::fs::read(&path).await {
                Ok(bytes) => backend.upload_pdf(&file_name, bytes).await,
                Err(e) => Err(BackendError::io(&path, e)),
            };
            if let Ok(receipt) = &result {
                tracing::info!(
                    file_name = %file_name,
                    chunks = ?receipt.chunks,
                    message = ?receipt.message,
                    "document processed"
                );
            }
            ActionOutcome::Uploaded { file_name, result }
        }
        Action::Chat(request) => ActionOutcome::Answered(backend.chat(&request).await),
        Action::Report {
            request,
            download_dir,
        } => {
            let result = match backend.download_report(&request).await {
                Ok(file) => save_report(&download_dir, file).await,
                Err(e) => Err(e),
            };
            ActionOutcome::ReportSaved(result)
        }
        Action::GenerateBrief => ActionOutcome::BriefDrafted(backend.generate_brief().await),
        Action::Refine(request) => ActionOutcome::BriefRefined(backend.refine_brief(&request).await),
    }
}

/// Feed a finished action back into the session
pub fn apply(session: &mut Session, outcome: ActionOutcome) -> Feedback {
    match outcome {
        ActionOutcome::Uploaded { file_name, result } => Feedback {
            alert: session.finish_upload(&file_name, result.map(|_| ())),
            status: None,
        },
        ActionOutcome::Answered(result) => {
            session.finish_chat(result);
            Feedback::default()
        }
        ActionOutcome::ReportSaved(Ok(path)) => {
            tracing::info!(path = %path.display(), "report saved");
            Feedback {
                alert: None,
                status: Some(format!("Report saved to {}", path.display())),
            }
        }
        ActionOutcome::ReportSaved(Err(e)) => Feedback {
            alert: Some(session.report_failed(&e)),
            status: None,
        },
        ActionOutcome::BriefDrafted(result) => Feedback {
            alert: session.finish_brief(result),
            status: None,
        },
        ActionOutcome::BriefRefined(result) => Feedback {
            alert: session.finish_refine(result),
            status: None,
        },
    }
}

/// Check a user-supplied path before anything is sent. Returns the file name to upload under.
pub fn validate_pdf_path(path: &Path) -> Result<String, BackendError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(BackendError::InvalidFile(
            "Only PDF files are allowed.".to_string(),
        ));
    }

    if !path.is_file() {
        return Err(BackendError::InvalidFile(format!(
            "{} is not a readable file",
            path.display()
        )));
    }

    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| BackendError::InvalidFile(format!("{} has no file name", path.display())))
}

/// Write the report into `dir` without clobbering an existing file
pub async fn save_report(dir: &Path, file: ReportFile) -> Result<PathBuf, BackendError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BackendError::io(dir, e))?;

    let name = file.file_name.as_deref().unwrap_or(DEFAULT_REPORT_NAME);
    let path = unique_path(dir, name);
    tokio::fs::write(&path, &file.bytes)
        .await
        .map_err(|e| BackendError::io(&path, e))?;

    Ok(path)
}

/// `name`, or `stem (n).ext` for the first n that is free
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let ext = as_path.extension().and_then(|e| e.to_str());

    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendStatus;
    use crate::session::{Category, Role, EMPTY_REPORT};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory backend that records every call
    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockBackend {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn record(&self, call: String) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(BackendError::Status {
                    status: 503,
                    message: "backend unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn status(&self) -> Result<BackendStatus, BackendError> {
            self.record("status".to_string())?;
            Ok(BackendStatus {
                status: "Active".to_string(),
                service: "mock".to_string(),
            })
        }

        async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, BackendError> {
            self.record(format!("upload {} {}", file_name, bytes.len()))?;
            Ok(UploadReceipt {
                message: Some("saved".to_string()),
                chunks: Some(3),
            })
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
            self.record(format!("chat {}", request.question))?;
            Ok(ChatReply {
                answer: "Liability is uncapped.".to_string(),
                category: Some("LEGAL".to_string()),
                sources: Some(vec!["p.3".to_string()]),
            })
        }

        async fn download_report(&self, request: &ReportRequest) -> Result<ReportFile, BackendError> {
            self.record(format!("report {}", request.history.len()))?;
            Ok(ReportFile {
                file_name: None,
                bytes: b"docx".to_vec(),
            })
        }

        async fn generate_brief(&self) -> Result<BriefReply, BackendError> {
            self.record("brief".to_string())?;
            Ok(BriefReply {
                answer: "# Brief".to_string(),
                category: Some("WRITER".to_string()),
            })
        }

        async fn refine_brief(&self, request: &RefineRequest) -> Result<BriefReply, BackendError> {
            self.record(format!("refine {} / {}", request.original_text, request.feedback))?;
            Ok(BriefReply {
                answer: format!("{} (revised)", request.original_text),
                category: None,
            })
        }
    }

    fn write_pdf(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();
        path
    }

    async fn upload(session: &mut Session, backend: Arc<dyn Backend>, path: &Path) -> Feedback {
        let file_name = validate_pdf_path(path).unwrap();
        session.begin_upload().unwrap();
        let outcome = run(
            backend,
            Action::Upload {
                path: path.to_path_buf(),
                file_name,
            },
        )
        .await;
        apply(session, outcome)
    }

    #[tokio::test]
    async fn test_upload_then_ask_legal_question() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path(), "rfp.pdf");
        let mock = Arc::new(MockBackend::default());
        let backend: Arc<dyn Backend> = mock.clone();
        let mut session = Session::new();

        let feedback = upload(&mut session, backend.clone(), &pdf).await;
        assert_eq!(feedback, Feedback::default());
        assert!(session.is_file_uploaded());
        assert!(session.messages().last().unwrap().text.contains("Processed rfp.pdf"));

        let request = session.begin_chat("What are the legal risks?").unwrap();
        let outcome = run(backend, Action::Chat(request)).await;
        apply(&mut session, outcome);

        let last = session.messages().last().unwrap();
        assert_eq!(last.role, Role::Bot);
        assert_eq!(last.category, Some(Category::Legal));
        assert_eq!(last.sources, vec!["p.3".to_string()]);
        assert_eq!(
            mock.calls(),
            vec![
                "upload rfp.pdf 13".to_string(),
                "chat What are the legal risks?".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path(), "rfp.pdf");
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::failing());
        let mut session = Session::new();

        let feedback = upload(&mut session, backend, &pdf).await;
        assert_eq!(
            feedback.alert.map(|a| a.message),
            Some("Error uploading file: backend unavailable".to_string())
        );
        assert!(!session.is_file_uploaded());
        assert!(!session.is_loading());
    }

    #[test]
    fn test_non_pdf_is_rejected_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = validate_pdf_path(&path).unwrap_err();
        assert_eq!(err.to_string(), "Only PDF files are allowed.");

        let missing = dir.path().join("missing.pdf");
        assert!(validate_pdf_path(&missing).is_err());

        let upper = write_pdf(dir.path(), "RFP.PDF");
        assert_eq!(validate_pdf_path(&upper).unwrap(), "RFP.PDF");
    }

    #[tokio::test]
    async fn test_chat_failure_is_inline_not_alert() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::failing());
        let mut session = Session::new();
        session.begin_upload().unwrap();
        session.finish_upload("rfp.pdf", Ok(()));

        let request = session.begin_chat("q").unwrap();
        let feedback = apply(&mut session, run(backend, Action::Chat(request)).await);

        assert_eq!(feedback, Feedback::default());
        assert_eq!(
            session.messages().last().unwrap().text,
            "Error: backend unavailable"
        );
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_report_is_saved_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_REPORT_NAME), b"older").unwrap();

        let mock = Arc::new(MockBackend::default());
        let backend: Arc<dyn Backend> = mock.clone();
        let mut session = Session::new();
        session.begin_upload().unwrap();
        session.finish_upload("rfp.pdf", Ok(()));

        let request = session.report_request().unwrap();
        let outcome = run(
            backend,
            Action::Report {
                request,
                download_dir: dir.path().to_path_buf(),
            },
        )
        .await;
        let feedback = apply(&mut session, outcome);

        let saved = dir.path().join("RFP_Analysis (1).docx");
        assert_eq!(std::fs::read(&saved).unwrap(), b"docx".to_vec());
        assert_eq!(
            std::fs::read(dir.path().join(DEFAULT_REPORT_NAME)).unwrap(),
            b"older".to_vec()
        );
        assert!(feedback.status.unwrap().contains("RFP_Analysis (1).docx"));
        assert_eq!(mock.calls(), vec!["report 2".to_string()]);
    }

    #[test]
    fn test_empty_transcript_never_builds_report() {
        let session = Session::new();
        assert_eq!(
            session.report_request().unwrap_err().message,
            EMPTY_REPORT
        );
    }

    #[tokio::test]
    async fn test_report_failure_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::failing());
        let mut session = Session::new();
        session.begin_upload().unwrap();
        session.finish_upload("rfp.pdf", Ok(()));

        let request = session.report_request().unwrap();
        let outcome = run(
            backend,
            Action::Report {
                request,
                download_dir: dir.path().to_path_buf(),
            },
        )
        .await;
        let feedback = apply(&mut session, outcome);
        assert_eq!(
            feedback.alert.unwrap().message,
            "Error downloading report: backend unavailable"
        );
    }

    #[tokio::test]
    async fn test_brief_then_refine_then_approve() {
        let mock = Arc::new(MockBackend::default());
        let backend: Arc<dyn Backend> = mock.clone();
        let mut session = Session::new();
        session.begin_upload().unwrap();
        session.finish_upload("rfp.pdf", Ok(()));
        let before = session.messages().len();

        session.begin_brief().unwrap();
        let feedback = apply(&mut session, run(backend.clone(), Action::GenerateBrief).await);
        assert_eq!(feedback.alert, None);
        assert_eq!(session.messages().len(), before + 1);
        assert_eq!(session.pending_approval(), Some("# Brief"));

        let request = session.begin_refine(Some("Add pricing")).unwrap().unwrap();
        apply(&mut session, run(backend, Action::Refine(request)).await);
        assert_eq!(session.pending_approval(), Some("# Brief (revised)"));
        assert_eq!(session.messages().len(), before + 3);

        let alert = session.approve().unwrap();
        assert_eq!(alert.message, crate::session::DRAFT_APPROVED);
        assert_eq!(session.pending_approval(), None);
        assert_eq!(
            mock.calls(),
            vec!["brief".to_string(), "refine # Brief / Add pricing".to_string()]
        );
    }

    #[tokio::test]
    async fn test_crashed_task_still_releases_loading() {
        let mut session = Session::new();
        session.begin_upload().unwrap();
        session.finish_upload("rfp.pdf", Ok(()));
        let before = session.messages().len();
        session.begin_brief().unwrap();

        let outcome = ActionKind::GenerateBrief.failed(BackendError::Task("panicked".to_string()));
        let feedback = apply(&mut session, outcome);

        assert!(!session.is_loading());
        assert_eq!(session.messages().len(), before + 1);
        assert_eq!(session.messages().last().unwrap().category, Some(Category::Writer));
        assert_eq!(
            feedback.alert.unwrap().message,
            "Error: Request task failed: panicked"
        );
    }

    #[tokio::test]
    async fn test_spawned_action_completes() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::default());
        let handle = spawn(backend, Action::GenerateBrief);
        match handle.await.unwrap() {
            ActionOutcome::BriefDrafted(Ok(reply)) => assert_eq!(reply.answer, "# Brief"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report"), b"x").unwrap();
        std::fs::write(dir.path().join("report (1)"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "report"), dir.path().join("report (2)"));
    }
}
