use std::time::Duration;

use async_trait::async_trait;
use core_types::{
    ChatReply, ChatRequest, DocuError, DocuResult, DocumentBackend, DocumentDescriptor,
    DocumentId, DownloadedFile, PreviewChunk, UploadFile,
};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Response, Url, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// `DocumentBackend` over the JSON/HTTP document service.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> DocuResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|err| DocuError::validation(format!("invalid backend url: {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(DocuError::validation(format!(
                "backend url must be http or https, got `{}`",
                base_url.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DocuError::network(format!("failed to build http client: {err}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> DocuResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DocuError::validation("backend url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> DocuResult<T> {
        debug!(%url, "GET");
        let response = self.client.get(url).send().await.map_err(transport)?;
        read_json(ensure_success(response).await?).await
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Wrapped {
        #[serde(default)]
        documents: Vec<DocumentDescriptor>,
    },
    Bare(Vec<DocumentDescriptor>),
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    document: Option<DocumentDescriptor>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PreviewResponse {
    #[serde(default)]
    zones: Vec<PreviewChunk>,
}

#[async_trait]
impl DocumentBackend for HttpBackend {
    async fn chat(&self, request: ChatRequest) -> DocuResult<ChatReply> {
        let url = self.endpoint(&["api", "chat"])?;
        debug!(%url, turns = request.chat_history.len(), "POST chat");
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        read_json(ensure_success(response).await?).await
    }

    async fn list_documents(&self) -> DocuResult<Vec<DocumentDescriptor>> {
        let url = self.endpoint(&["api", "documents"])?;
        let documents = match self.get_json::<Listing>(url).await? {
            Listing::Wrapped { documents } | Listing::Bare(documents) => documents,
        };
        Ok(documents)
    }

    async fn upload(&self, file: &UploadFile) -> DocuResult<DocumentDescriptor> {
        let url = self.endpoint(&["api", "files"])?;
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|err| {
                DocuError::validation(format!("`{}` has an invalid type: {err}", file.name))
            })?;
        let form = multipart::Form::new().part("file", part);
        debug!(%url, file = %file.name, size = file.size(), "POST upload");
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let body: UploadResponse = read_json(ensure_success(response).await?).await?;
        if body.success == Some(false) {
            return Err(DocuError::backend(
                body.error.unwrap_or_else(|| "Upload failed".to_string()),
            ));
        }
        body.document
            .ok_or_else(|| DocuError::backend("Invalid response from server"))
    }

    async fn delete_document(&self, id: &DocumentId) -> DocuResult<()> {
        let url = self.endpoint(&["api", "documents", id.as_str()])?;
        debug!(%url, "DELETE document");
        let response = self.client.delete(url).send().await.map_err(transport)?;
        let text = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(transport)?;
        if text.trim().is_empty() {
            return Ok(());
        }
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = error_message(&body).unwrap_or("Failed to delete document");
            return Err(DocuError::backend(message));
        }
        Ok(())
    }

    async fn download_document(&self, id: &DocumentId) -> DocuResult<DownloadedFile> {
        let url = self.endpoint(&["api", "documents", id.as_str(), "download"])?;
        debug!(%url, "GET download");
        let response = ensure_success(self.client.get(url).send().await.map_err(transport)?).await?;
        let headers = response.headers();
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_disposition);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(DownloadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn preview_chunks(&self, id: &DocumentId) -> DocuResult<Vec<PreviewChunk>> {
        let url = self.endpoint(&["api", "documents", id.as_str(), "preview"])?;
        let body: PreviewResponse = self.get_json(url).await?;
        Ok(body.zones)
    }
}

fn transport(err: reqwest::Error) -> DocuError {
    if err.is_timeout() {
        DocuError::network("request timed out")
    } else {
        DocuError::network(err.to_string())
    }
}

async fn ensure_success(response: Response) -> DocuResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let message = match error_message(&body) {
        Some(message) => message.to_string(),
        None => format!("backend request failed with status {}", status.as_u16()),
    };
    warn!(status = status.as_u16(), "backend request failed: {message}");
    Err(DocuError::backend(message))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> DocuResult<T> {
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes)
        .map_err(|err| DocuError::backend(format!("Invalid response from server: {err}")))
}

fn error_message(body: &Value) -> Option<&str> {
    ["detail", "error", "message"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
}

/// Pulls the `filename=` parameter out of a `Content-Disposition` value.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let (key, raw) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"').trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
