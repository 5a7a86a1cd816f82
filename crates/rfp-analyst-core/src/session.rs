//! UI-agnostic session state
//!
//! The transcript, the pending draft and the session flags live here together
//! with one transition function per user action. Nothing in this module does
//! I/O; requests are returned to the caller, and results are fed back in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{
    BriefReply, ChatReply, ChatRequest, ChatTurn, ChatTurnRole, RefineRequest, ReportRequest,
    ReportTurn, ReportTurnRole,
};
use crate::error::{BackendError, SessionError};

pub const GREETING: &str = "Hello! Please upload an RFP PDF to start analyzing.";
pub const BRIEF_PLACEHOLDER: &str = "Drafting Executive Brief...";
pub const EMPTY_REPORT: &str = "Chat is empty. Nothing to download.";
pub const DRAFT_APPROVED: &str = "Draft approved.";

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Bot,
    System,
}

/// Which backend capability produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Legal,
    Technical,
    Writer,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Legal => "LEGAL",
            Category::Technical => "TECHNICAL",
            Category::Writer => "WRITER",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "LEGAL" => Some(Category::Legal),
            "TECHNICAL" => Some(Category::Technical),
            "WRITER" => Some(Category::Writer),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub category: Option<Category>,
    pub sources: Vec<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            category: None,
            sources: Vec::new(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            category: None,
            sources: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// A message the user has to dismiss before doing anything else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
}

impl Alert {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    messages: Vec<Message>,
    pending_approval: Option<String>,
    is_file_uploaded: bool,
    is_loading: bool,
    uploaded_file: Option<String>,

    // Index of the "drafting" placeholder while a brief is being generated
    placeholder: Option<usize>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::bot(GREETING)],
            pending_approval: None,
            is_file_uploaded: false,
            is_loading: false,
            uploaded_file: None,
            placeholder: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_approval(&self) -> Option<&str> {
        self.pending_approval.as_deref()
    }

    pub fn is_file_uploaded(&self) -> bool {
        self.is_file_uploaded
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn uploaded_file(&self) -> Option<&str> {
        self.uploaded_file.as_deref()
    }

    /// Chat input and the brief button are only live once a document is in
    pub fn can_chat(&self) -> bool {
        self.is_file_uploaded
    }

    pub fn can_send(&self, input: &str) -> bool {
        self.is_file_uploaded && !self.is_loading && !input.trim().is_empty()
    }

    /// Export is offered once there is more than the greeting to export
    pub fn can_export(&self) -> bool {
        self.messages.len() > 1
    }

    // Upload

    pub fn begin_upload(&mut self) -> Result<(), SessionError> {
        if self.is_file_uploaded {
            return Err(SessionError::AlreadyUploaded);
        }
        if self.is_loading {
            return Err(SessionError::Busy);
        }
        self.is_loading = true;
        Ok(())
    }

    pub fn finish_upload(&mut self, file_name: &str, result: Result<(), BackendError>) -> Option<Alert> {
        self.is_loading = false;

        match result {
            Ok(()) => {
                self.is_file_uploaded = true;
                self.uploaded_file = Some(file_name.to_string());
                self.messages.push(Message::bot(format!(
                    "Processed {}. I am ready! Ask me about Risks (Legal) or Architecture (Technical).",
                    file_name
                )));
                None
            }
            Err(e) => Some(Alert::new(format!("Error uploading file: {}", e))),
        }
    }

    // Chat

    /// Record the question and build the request. History is everything said
    /// before this question; the question itself travels separately.
    pub fn begin_chat(&mut self, question: &str) -> Result<ChatRequest, SessionError> {
        if !self.is_file_uploaded {
            return Err(SessionError::NotUploaded);
        }
        if self.is_loading {
            return Err(SessionError::Busy);
        }
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let history = self.chat_history();
        self.messages.push(Message::user(question));
        self.is_loading = true;

        Ok(ChatRequest {
            question: question.to_string(),
            history,
        })
    }

    /// Chat failures are shown inline, never as an alert
    pub fn finish_chat(&mut self, result: Result<ChatReply, BackendError>) {
        self.is_loading = false;

        let message = match result {
            Ok(reply) => {
                let category = reply.category.as_deref().and_then(|label| {
                    let category = Category::from_label(label);
                    if category.is_none() {
                        tracing::warn!(label, "ignoring unknown answer category");
                    }
                    category
                });
                Message::bot(reply.answer)
                    .with_category(category)
                    .with_sources(reply.sources.unwrap_or_default())
            }
            Err(e) => Message::bot(format!("Error: {}", e)),
        };
        self.messages.push(message);
    }

    pub fn chat_history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| ChatTurn {
                role: match msg.role {
                    Role::Bot => ChatTurnRole::Assistant,
                    _ => ChatTurnRole::User,
                },
                content: msg.text.clone(),
            })
            .collect()
    }

    // Report

    pub fn report_request(&self) -> Result<ReportRequest, Alert> {
        if self.messages.len() < 2 {
            return Err(Alert::new(EMPTY_REPORT));
        }

        let history = self
            .messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| ReportTurn {
                role: match msg.role {
                    Role::Bot => ReportTurnRole::Agent,
                    _ => ReportTurnRole::User,
                },
                content: msg.text.clone(),
            })
            .collect();

        Ok(ReportRequest { history })
    }

    pub fn report_failed(&self, error: &BackendError) -> Alert {
        Alert::new(format!("Error downloading report: {}", error))
    }

    // Executive brief

    pub fn begin_brief(&mut self) -> Result<(), SessionError> {
        if !self.is_file_uploaded {
            return Err(SessionError::NotUploaded);
        }
        if self.is_loading {
            return Err(SessionError::Busy);
        }

        self.messages
            .push(Message::bot(BRIEF_PLACEHOLDER).with_category(Some(Category::Writer)));
        self.placeholder = Some(self.messages.len() - 1);
        self.is_loading = true;
        Ok(())
    }

    /// Swap the placeholder for the draft and wait for approval. On failure
    /// the placeholder stays as the WRITER entry for this attempt.
    pub fn finish_brief(&mut self, result: Result<BriefReply, BackendError>) -> Option<Alert> {
        self.is_loading = false;

        match result {
            Ok(reply) => {
                self.retract_placeholder();
                self.present_draft(reply.answer);
                None
            }
            Err(e) => {
                self.placeholder = None;
                Some(Alert::new(format!("Error: {}", e)))
            }
        }
    }

    /// Approval is local only; the draft is not sent anywhere
    pub fn approve(&mut self) -> Result<Alert, SessionError> {
        match self.pending_approval.take() {
            Some(_) => Ok(Alert::new(DRAFT_APPROVED)),
            None => Err(SessionError::NothingPending),
        }
    }

    /// Start a refinement round. `None` or blank feedback means the prompt was
    /// cancelled: nothing changes and the draft stays pending.
    pub fn begin_refine(&mut self, feedback: Option<&str>) -> Result<Option<RefineRequest>, SessionError> {
        if self.pending_approval.is_none() {
            return Err(SessionError::NothingPending);
        }
        if self.is_loading {
            return Err(SessionError::Busy);
        }

        let feedback = match feedback {
            Some(f) if !f.trim().is_empty() => f.to_string(),
            _ => return Ok(None),
        };

        let original_text = self.pending_approval.take().unwrap_or_default();
        self.messages.push(Message::user(format!("Feedback: {}", feedback)));
        self.is_loading = true;

        Ok(Some(RefineRequest {
            original_text,
            feedback,
        }))
    }

    /// A failed refinement leaves nothing pending; the draft was consumed by the feedback
    pub fn finish_refine(&mut self, result: Result<BriefReply, BackendError>) -> Option<Alert> {
        self.is_loading = false;

        match result {
            Ok(reply) => {
                self.present_draft(reply.answer);
                None
            }
            Err(e) => Some(Alert::new(format!("Error refining: {}", e))),
        }
    }

    fn present_draft(&mut self, draft: String) {
        self.messages
            .push(Message::bot(draft.clone()).with_category(Some(Category::Writer)));
        self.pending_approval = Some(draft);
    }

    fn retract_placeholder(&mut self) {
        if let Some(idx) = self.placeholder.take() {
            let is_placeholder = self
                .messages
                .get(idx)
                .map(|msg| msg.role == Role::Bot && msg.text == BRIEF_PLACEHOLDER)
                .unwrap_or(false);
            if is_placeholder {
                self.messages.remove(idx);
            }
        }
    }
}
