use super::detection::{DocumentKind, detect_document_type};
use crate::error::DocumentError;
use crate::utils::{build_http_client, sanitize_api_error};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    file_name: &'a str,
    file_type: &'a str,
    file_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    processed_text: Option<String>,
    #[serde(default)]
    original_size: u64,
    #[serde(default)]
    processed_size: u64,
    error: Option<String>,
}

/// Plain text extracted from an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    pub kind: DocumentKind,
    pub text: String,
    pub original_size: u64,
    pub processed_size: u64,
}

/// Client for the document-processing endpoint, which turns binary formats
/// (PDF, Word, spreadsheets, images) into text.
pub struct DocumentProcessor {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl DocumentProcessor {
    pub fn new(endpoint: &str, api_key: Option<&str>, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client: build_http_client(timeout_secs),
        }
    }

    fn apply_auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    pub async fn process(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ProcessedDocument, DocumentError> {
        let (mime, kind) = detect_document_type(bytes, file_name);
        let request = UploadRequest {
            file_name,
            file_type: &mime,
            file_content: BASE64_STANDARD.encode(bytes),
        };

        let response = self
            .apply_auth_header(self.client.post(&self.endpoint).json(&request))
            .send()
            .await
            .map_err(|error| DocumentError::Upload(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocumentError::Upload(format!(
                "{status}: {}",
                sanitize_api_error(&body)
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|error| DocumentError::Upload(format!("invalid response: {error}")))?;

        if let Some(error) = body.error {
            return Err(DocumentError::Upload(sanitize_api_error(&error)));
        }
        let text = body
            .processed_text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| DocumentError::Upload("no text could be extracted".into()))?;

        tracing::info!(
            file_name,
            original_size = body.original_size,
            processed_size = body.processed_size,
            "document processed"
        );
        Ok(ProcessedDocument {
            kind,
            text,
            original_size: body.original_size,
            processed_size: body.processed_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn uploads_base64_content_and_returns_text() {
        let server = MockServer::start().await;
        let pdf = b"%PDF-1.4 tiny".to_vec();
        Mock::given(method("POST"))
            .and(path("/process"))
            .and(header("x-api-key", "k-1"))
            .and(body_partial_json(serde_json::json!({
                "fileName": "plan.pdf",
                "fileType": "application/pdf",
                "fileContent": BASE64_STANDARD.encode(&pdf),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "processedText": "Quarterly plan",
                "originalSize": 13,
                "processedSize": 14
            })))
            .expect(1)
            .mount(&server)
            .await;

        let processor =
            DocumentProcessor::new(&format!("{}/process", server.uri()), Some("k-1"), 5);
        let processed = processor.process("plan.pdf", &pdf).await.unwrap();
        assert_eq!(processed.kind, DocumentKind::Pdf);
        assert_eq!(processed.text, "Quarterly plan");
        assert_eq!(processed.original_size, 13);
    }

    #[tokio::test]
    async fn http_failure_is_an_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("file too large"))
            .mount(&server)
            .await;

        let processor = DocumentProcessor::new(&server.uri(), None, 5);
        let err = processor.process("big.pdf", b"%PDF").await.unwrap_err();
        let DocumentError::Upload(message) = err else {
            panic!("expected upload error");
        };
        assert!(message.contains("413"));
        assert!(message.contains("file too large"));
    }

    #[tokio::test]
    async fn error_field_in_success_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "unsupported format"})),
            )
            .mount(&server)
            .await;

        let processor = DocumentProcessor::new(&server.uri(), None, 5);
        let err = processor.process("x.bin", &[0, 1, 2]).await.unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }
}
