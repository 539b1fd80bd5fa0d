//! REST client for the reference-document service and conversation lookup
//!
//! Every endpoint except the health check answers with the envelope
//! `{success, data?, error?, message?}`. A non-2xx status is mapped before
//! the envelope is read: `400` becomes [`AgentDeskError::Validation`], any
//! other status becomes [`AgentDeskError::Api`] carrying the server's
//! `detail` text.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentDeskError, Result};

/// A reference document known to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    /// File name, used as the `srt` submission field
    pub filename: String,
    /// Server-side path, when reported
    #[serde(default)]
    pub path: Option<String>,
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Name the server stored the file under
    pub filename: String,
    /// True if the server accepted the file
    pub accepted: bool,
}

/// Summary row of a saved conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Stored file name
    pub filename: String,
    /// Stored size in bytes
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn failure_message(&self, fallback: &str) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Client for the backend's REST endpoints
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use agentdesk::api::ApiClient;
///
/// # async fn example() -> agentdesk::error::Result<()> {
/// let client = ApiClient::new("http://localhost:8000", Duration::from_secs(30))?;
/// for doc in client.list_documents().await? {
///     println!("{}", doc.filename);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    accepted_extension: String,
}

impl ApiClient {
    /// Creates a client for `base_url` accepting `.srt` uploads.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).map_err(AgentDeskError::from)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentDeskError::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            accepted_extension: "srt".to_string(),
        })
    }

    /// Overrides the accepted upload extension (without the dot).
    pub fn with_accepted_extension(mut self, extension: impl Into<String>) -> Self {
        self.accepted_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Lists reference documents, newest first as ordered by the server.
    pub async fn list_documents(&self) -> Result<Vec<ReferenceDocument>> {
        let response = self.send(self.client.get(self.endpoint("getSrtList"))).await?;
        let documents: Vec<ReferenceDocument> =
            read_envelope(response, "Failed to fetch reference documents").await?;
        tracing::debug!("Fetched {} reference documents", documents.len());
        Ok(documents)
    }

    /// Uploads the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::Validation`] without contacting the server
    /// if the extension is not the accepted one or the file is empty, and
    /// for a `400` answer.
    pub async fn upload_document(&self, path: &Path) -> Result<UploadReceipt> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AgentDeskError::Validation(format!("{} has no file name", path.display())))?
            .to_string();
        self.check_extension(&filename)?;

        let bytes = tokio::fs::read(path).await.map_err(AgentDeskError::from)?;
        if bytes.is_empty() {
            return Err(AgentDeskError::Validation(format!("{} is empty", filename)).into());
        }
        tracing::info!("Uploading {} ({} bytes)", filename, bytes.len());

        let part = multipart::Part::bytes(bytes).file_name(filename.clone());
        let form = multipart::Form::new().part("file", part);
        let response = self
            .send(self.client.post(self.endpoint("uploadSrt")).multipart(form))
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.map_err(|e| {
            AgentDeskError::Api {
                status,
                message: format!("Invalid upload response: {}", e),
            }
        })?;
        parse_upload_receipt(&body, &filename, status)
    }

    /// Lists saved conversations.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let response = self
            .send(self.client.get(self.endpoint("conversations")))
            .await?;
        read_envelope(response, "Failed to fetch conversations").await
    }

    /// Fetches one saved conversation as raw JSON.
    pub async fn get_conversation(&self, id: &str) -> Result<Value> {
        let response = self
            .send(self.client.get(self.endpoint(&format!("conversations/{}", id))))
            .await?;
        read_envelope(response, "Failed to fetch conversation").await
    }

    /// Deletes a saved conversation.
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let response = self
            .send(self.client.delete(self.endpoint(&format!("conversations/{}", id))))
            .await?;
        let status = response.status().as_u16();
        let envelope: Envelope<Value> = response.json().await.map_err(AgentDeskError::from)?;
        if !envelope.success {
            return Err(AgentDeskError::Api {
                status,
                message: envelope.failure_message("Failed to delete conversation"),
            }
            .into());
        }
        tracing::info!("Deleted conversation {}", id);
        Ok(())
    }

    /// Returns true if the backend reports `status: "ok"`.
    ///
    /// Never fails; any transport or decoding problem counts as unhealthy.
    pub async fn health_check(&self) -> bool {
        let response = match self.client.get(self.endpoint("health")).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                return false;
            }
        };
        match response.json::<Value>().await {
            Ok(body) => body.get("status").and_then(Value::as_str) == Some("ok"),
            Err(e) => {
                tracing::warn!("Health check returned an unreadable body: {}", e);
                false
            }
        }
    }

    fn check_extension(&self, filename: &str) -> Result<()> {
        let matches = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.accepted_extension))
            .unwrap_or(false);
        if matches {
            Ok(())
        } else {
            Err(AgentDeskError::Validation(format!(
                "Only .{} files are allowed",
                self.accepted_extension
            ))
            .into())
        }
    }

    /// Sends a request and maps transport failures and non-2xx statuses.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!("Request to backend failed: {}", e);
            AgentDeskError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status));
        tracing::error!("Backend returned error {}: {}", status, message);

        if status == reqwest::StatusCode::BAD_REQUEST {
            Err(AgentDeskError::Validation(message).into())
        } else {
            Err(AgentDeskError::Api {
                status: status.as_u16(),
                message,
            }
            .into())
        }
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response, fallback: &str) -> Result<T> {
    let status = response.status().as_u16();
    let envelope: Envelope<T> = response.json().await.map_err(|e| AgentDeskError::Api {
        status,
        message: format!("Invalid response body: {}", e),
    })?;

    if envelope.success {
        if let Some(data) = envelope.data {
            return Ok(data);
        }
    }
    Err(AgentDeskError::Api {
        status,
        message: envelope.failure_message(fallback),
    }
    .into())
}

/// Reads an upload answer.
///
/// The server reports `{success, filename, data: true}`; a nested
/// `data: {filename, data}` is accepted as well.
fn parse_upload_receipt(body: &Value, requested: &str, status: u16) -> Result<UploadReceipt> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        let message = body
            .get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Failed to upload reference document")
            .to_string();
        return Err(AgentDeskError::Api { status, message }.into());
    }

    let (filename, accepted) = match body.get("data") {
        Some(Value::Object(inner)) => (
            inner.get("filename").and_then(Value::as_str),
            inner.get("data").and_then(Value::as_bool).unwrap_or(true),
        ),
        Some(Value::Bool(accepted)) => (body.get("filename").and_then(Value::as_str), *accepted),
        _ => (body.get("filename").and_then(Value::as_str), true),
    };

    Ok(UploadReceipt {
        filename: filename.unwrap_or(requested).to_string(),
        accepted,
    })
}
