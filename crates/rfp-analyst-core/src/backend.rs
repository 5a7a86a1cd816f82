use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Hosted analysis backend used when no override is configured
pub const DEFAULT_BASE_URL: &str = "https://rfp-agent-system.onrender.com";

/// File name used for the report when the backend doesn't suggest one
pub const DEFAULT_REPORT_NAME: &str = "RFP_Analysis.docx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTurnRole {
    Assistant,
    User,
}

/// One prior transcript entry as `/chat` expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatTurnRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub question: String,
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportTurnRole {
    #[serde(rename = "AI Agent")]
    Agent,
    #[serde(rename = "User")]
    User,
}

/// One transcript entry as `/download-report` expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTurn {
    pub role: ReportTurnRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRequest {
    pub history: Vec<ReportTurn>,
}

/// Binary report body plus the file name the backend suggested, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Response of both `/generate-brief` and `/refine-brief`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BriefReply {
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefineRequest {
    pub original_text: String,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub chunks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    pub status: String,
    #[serde(default)]
    pub service: String,
}

/// The remote analysis service. Everything substantive happens behind this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn status(&self) -> Result<BackendStatus, BackendError>;

    async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, BackendError>;

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    async fn download_report(&self, request: &ReportRequest) -> Result<ReportFile, BackendError>;

    async fn generate_brief(&self) -> Result<BriefReply, BackendError>;

    async fn refine_brief(&self, request: &RefineRequest) -> Result<BriefReply, BackendError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-success response into a `BackendError` carrying the backend's message
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, "backend request failed");
    Err(BackendError::from_status(status, &body))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn status(&self) -> Result<BackendStatus, BackendError> {
        let response = self.client.get(self.url("/")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, BackendError> {
        tracing::info!(file_name, size = bytes.len(), "uploading document");

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/upload-pdf"))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // The body is informational only; an unexpected shape is not a failure
        let body = response.text().await?;
        let receipt = serde_json::from_str(&body).unwrap_or_default();
        Ok(receipt)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        tracing::debug!(history = request.history.len(), "sending question");

        let response = self
            .client
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn download_report(&self, request: &ReportRequest) -> Result<ReportFile, BackendError> {
        let response = self
            .client
            .post(self.url("/download-report"))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let file_name = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name);
        let bytes = response.bytes().await?.to_vec();

        Ok(ReportFile { file_name, bytes })
    }

    async fn generate_brief(&self) -> Result<BriefReply, BackendError> {
        let response = self.client.post(self.url("/generate-brief")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn refine_brief(&self, request: &RefineRequest) -> Result<BriefReply, BackendError> {
        let response = self
            .client
            .post(self.url("/refine-brief"))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

/// Extract the suggested file name from a `Content-Disposition` header.
///
/// Only the final path component is kept so a hostile header can't point
/// outside the download directory.
pub fn attachment_file_name(disposition: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in disposition.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'percent-encoded
            let encoded = value.rsplit('\'').next().unwrap_or(value);
            extended = Some(match urlencoding::decode(encoded) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes()))
                    .into_owned(),
            });
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }

    let name = extended.or(plain)?;
    let name = Path::new(&name).file_name()?.to_str()?.to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
