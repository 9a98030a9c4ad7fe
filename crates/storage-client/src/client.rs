//! reqwest-based storage backend.

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use psyhub_protocol::{
    ApiError, ApiResponse, ChunkQuery, ChunkUploadMeta, MergeData, MergeRequest,
};
use psyhub_upload::{BackendFuture, StorageBackend, UploadError};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Longest response body kept in a [`ClientError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Storage backend speaking the chunk endpoints over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStorageBackend {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpStorageBackend {
    /// Builds a client with the configured timeout.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = config.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(config.base_url));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET {check}?identifier=..&chunkNumber=..`; missing `data` means absent.
    pub async fn check_chunk(&self, query: &ChunkQuery) -> Result<bool, ClientError> {
        let url = self.config.endpoint(&self.config.check_path);
        trace!(url = %url, chunk = query.chunk_number, "checking chunk");
        let response = self
            .authorize(self.http.get(&url).query(query))
            .send()
            .await?;
        let exists = read_envelope::<bool>(response).await?.unwrap_or(false);
        Ok(exists)
    }

    /// `POST {upload}` as a multipart form.
    pub async fn send_chunk(&self, meta: &ChunkUploadMeta, data: Vec<u8>) -> Result<(), ClientError> {
        let url = self.config.endpoint(&self.config.upload_path);
        debug!(
            url = %url,
            chunk = meta.chunk_number,
            bytes = data.len(),
            "uploading chunk"
        );
        let form = meta
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
            .part("file", Part::bytes(data).file_name(meta.filename.clone()));

        let response = self
            .authorize(self.http.post(&url).multipart(form))
            .send()
            .await?;
        read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// `POST {merge}` with a JSON body; returns the asset URL.
    pub async fn merge(&self, request: &MergeRequest) -> Result<String, ClientError> {
        let url = self.config.endpoint(&self.config.merge_path);
        debug!(url = %url, identifier = %request.identifier, "requesting merge");
        let response = self
            .authorize(self.http.post(&url).json(request))
            .send()
            .await?;
        let data = read_envelope::<MergeData>(response)
            .await?
            .ok_or(ClientError::EmptyData("merge"))?;
        Ok(data.into_url())
    }
}

impl StorageBackend for HttpStorageBackend {
    fn chunk_exists(&self, query: ChunkQuery) -> BackendFuture<'_, bool> {
        Box::pin(async move { self.check_chunk(&query).await.map_err(UploadError::from) })
    }

    fn upload_chunk(&self, meta: ChunkUploadMeta, data: Vec<u8>) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.send_chunk(&meta, data).await.map_err(UploadError::from) })
    }

    fn merge_chunks(&self, request: MergeRequest) -> BackendFuture<'_, String> {
        Box::pin(async move { self.merge(&request).await.map_err(UploadError::from) })
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, ClientError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    parse_envelope(status, &body)
}

/// Decodes a response body, preferring the envelope's own error over the
/// HTTP status when both report a failure.
fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>, ClientError> {
    if !(200..300).contains(&status) {
        if let Ok(envelope) = serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
            && !envelope.is_success()
        {
            return Err(ApiError {
                code: envelope.code,
                message: envelope.msg,
            }
            .into());
        }
        let mut body = body.to_string();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ClientError::Status { status, body });
    }

    let envelope: ApiResponse<T> = serde_json::from_str(body)?;
    Ok(envelope.into_result()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single HTTP request with `status_line` and a JSON `body`,
    /// returning the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut tmp = [0u8; 4096];
            let header_end = loop {
                let n = stream.read(&mut tmp).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&tmp[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = stream.read(&mut tmp).await.unwrap();
                assert!(n > 0, "connection closed before body");
                buf.extend_from_slice(&tmp[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn backend(base_url: &str) -> HttpStorageBackend {
        HttpStorageBackend::new(ClientConfig::new(base_url)).unwrap()
    }

    fn meta() -> ChunkUploadMeta {
        ChunkUploadMeta {
            identifier: "abc123".into(),
            chunk_number: 2,
            chunk_size: 5,
            current_chunk_size: 5,
            total_size: 12,
            filename: "clip.mp4".into(),
            total_chunks: 3,
            media_type: "video/mp4".into(),
            relative_path: "video/2026/10".into(),
        }
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = HttpStorageBackend::new(ClientConfig::new("ftp://files")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn envelope_success_with_data() {
        let data: Option<bool> = parse_envelope(200, r#"{"code":200,"msg":"ok","data":true}"#).unwrap();
        assert_eq!(data, Some(true));
    }

    #[test]
    fn envelope_failure_code_is_api_error() {
        let err = parse_envelope::<bool>(200, r#"{"code":500,"msg":"disk full"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Api(ApiError { code: 500, .. })));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn http_error_prefers_envelope_message() {
        let err = parse_envelope::<bool>(401, r#"{"code":401,"msg":"token expired"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Api(ApiError { code: 401, .. })));
    }

    #[test]
    fn http_error_without_envelope_keeps_truncated_body() {
        let body = "x".repeat(2000);
        let err = parse_envelope::<bool>(502, &body).unwrap_err();
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_envelope::<bool>(200, "<html>").unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn check_sends_query_and_token() {
        let (url, server) = serve_once("200 OK", r#"{"code":200,"msg":"ok","data":true}"#).await;
        let client =
            HttpStorageBackend::new(ClientConfig::new(url).with_token("secret")).unwrap();

        let exists = client
            .chunk_exists(ChunkQuery {
                identifier: "abc123".into(),
                chunk_number: 2,
            })
            .await
            .unwrap();
        assert!(exists);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /file/chunk/check?identifier=abc123&chunkNumber=2 "));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn check_without_data_means_absent() {
        let (url, server) = serve_once("200 OK", r#"{"code":0,"msg":"ok"}"#).await;
        let exists = backend(&url)
            .check_chunk(&ChunkQuery {
                identifier: "abc123".into(),
                chunk_number: 1,
            })
            .await
            .unwrap();
        assert!(!exists);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn upload_sends_multipart_form() {
        let (url, server) = serve_once("200 OK", r#"{"code":200,"msg":"ok","data":null}"#).await;
        backend(&url)
            .upload_chunk(meta(), b"hello".to_vec())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /file/chunk/upload "));
        assert!(request.contains("multipart/form-data; boundary="));
        assert!(request.contains("name=\"chunkNumber\"\r\n\r\n2\r\n"));
        assert!(request.contains("name=\"relativePath\"\r\n\r\nvideo/2026/10\r\n"));
        assert!(request.contains("name=\"file\"; filename=\"clip.mp4\""));
        assert!(request.contains("hello"));
    }

    #[tokio::test]
    async fn merge_returns_url() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"code":200,"msg":"ok","data":{"url":"https://cdn.example.com/video/2026/10/clip.mp4"}}"#,
        )
        .await;
        let asset = backend(&url)
            .merge_chunks(MergeRequest {
                identifier: "abc123".into(),
                filename: "clip.mp4".into(),
                total_chunks: 3,
                relative_path: "video/2026/10".into(),
            })
            .await
            .unwrap();
        assert_eq!(asset, "https://cdn.example.com/video/2026/10/clip.mp4");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /file/chunk/merge "));
        assert!(request.contains(r#""totalChunks":3"#));
        assert!(request.contains(r#""relativePath":"video/2026/10""#));
    }

    #[tokio::test]
    async fn merge_without_data_fails() {
        let (url, server) = serve_once("200 OK", r#"{"code":200,"msg":"ok"}"#).await;
        let err = backend(&url)
            .merge(&MergeRequest {
                identifier: "abc123".into(),
                filename: "clip.mp4".into(),
                total_chunks: 3,
                relative_path: "video/2026/10".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::EmptyData("merge")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn backend_errors_become_upload_errors() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"code":500,"msg":"disk full"}"#).await;
        let err = backend(&url)
            .upload_chunk(meta(), b"hello".to_vec())
            .await
            .unwrap_err();
        match err {
            UploadError::Backend(msg) => assert!(msg.contains("disk full")),
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }
}
