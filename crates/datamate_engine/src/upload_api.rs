use std::sync::Arc;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

use crate::http::{json_body, map_reqwest_error, read_data, send, HttpSettings};
use crate::{ApiError, FailureKind};

/// Granularity of upload progress events.
const PROGRESS_STEP: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreUploadRequest {
    pub total_file_num: usize,
    pub total_size: u64,
    pub dataset_id: String,
    pub has_archive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// One chunk upload. `file_no` and `chunk_no` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkForm {
    pub req_id: i64,
    pub file_no: usize,
    pub chunk_no: usize,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunk_num: usize,
    pub check_sum_hex: String,
    pub bytes: Bytes,
}

impl ChunkForm {
    /// Text fields of the multipart form, in wire order.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("reqId", self.req_id.to_string()),
            ("fileNo", self.file_no.to_string()),
            ("chunkNo", self.chunk_no.to_string()),
            ("fileName", self.file_name.clone()),
            ("fileSize", self.file_size.to_string()),
            ("totalChunkNum", self.total_chunk_num.to_string()),
            ("checkSumHex", self.check_sum_hex.clone()),
        ]
    }
}

/// Told how many bytes of the current chunk the transport has consumed.
pub trait ChunkProgress: Send + Sync {
    fn on_progress(&self, loaded: u64);
}

#[async_trait::async_trait]
pub trait UploadApi: Send + Sync {
    /// Opens an upload session and returns its id.
    async fn pre_upload(&self, key: &str, request: &PreUploadRequest) -> Result<i64, ApiError>;

    async fn upload_chunk(
        &self,
        key: &str,
        form: ChunkForm,
        progress: Arc<dyn ChunkProgress>,
    ) -> Result<(), ApiError>;

    /// Asks the backend to discard a session. Backends without one accept silently.
    async fn cancel_upload(&self, _req_id: i64) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Dataset upload endpoints of the data-management service.
#[derive(Debug, Clone)]
pub struct ReqwestUploadApi {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl ReqwestUploadApi {
    pub fn new(settings: HttpSettings) -> Result<Self, ApiError> {
        let client = settings.build_client()?;
        Ok(Self { client, settings })
    }
}

#[async_trait::async_trait]
impl UploadApi for ReqwestUploadApi {
    async fn pre_upload(&self, key: &str, request: &PreUploadRequest) -> Result<i64, ApiError> {
        let url = self.settings.endpoint(&format!(
            "/api/data-management/datasets/{key}/files/upload/pre-upload"
        ))?;
        let builder = json_body(self.settings.authorize(self.client.post(url)), request)?;
        let response = send(builder).await?;
        read_data::<i64>(response)
            .await?
            .ok_or_else(|| ApiError::new(FailureKind::Decode, "pre-upload returned no reqId"))
    }

    async fn upload_chunk(
        &self,
        key: &str,
        form: ChunkForm,
        progress: Arc<dyn ChunkProgress>,
    ) -> Result<(), ApiError> {
        let url = self
            .settings
            .endpoint(&format!("/api/data-management/datasets/{key}/files/upload/chunk"))?;

        let len = form.bytes.len() as u64;
        let part = Part::stream_with_length(progress_body(form.bytes.clone(), progress), len)
            .file_name(form.file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(map_reqwest_error)?;
        let mut multipart = Form::new().part("file", part);
        for (name, value) in form.text_fields() {
            multipart = multipart.text(name, value);
        }

        let builder = self
            .settings
            .authorize(self.client.post(url))
            .multipart(multipart);
        send(builder).await?;
        Ok(())
    }

    async fn cancel_upload(&self, req_id: i64) -> Result<(), ApiError> {
        let url = self.settings.endpoint(&format!(
            "/api/data-management/datasets/upload/cancel-upload/{req_id}"
        ))?;
        let builder = json_body(
            self.settings.authorize(self.client.put(url)),
            &serde_json::json!({}),
        )?;
        send(builder).await?;
        Ok(())
    }
}

/// Streams `bytes` in steps, reporting cumulative bytes as the transport pulls them.
fn progress_body(bytes: Bytes, progress: Arc<dyn ChunkProgress>) -> reqwest::Body {
    let mut pieces = Vec::with_capacity(bytes.len().div_ceil(PROGRESS_STEP).max(1));
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + PROGRESS_STEP).min(bytes.len());
        pieces.push(bytes.slice(start..end));
        start = end;
    }

    let mut sent = 0u64;
    let stream = futures_util::stream::iter(pieces.into_iter().map(move |piece| {
        sent += piece.len() as u64;
        progress.on_progress(sent);
        Ok::<Bytes, std::io::Error>(piece)
    }));
    reqwest::Body::wrap_stream(stream)
}
