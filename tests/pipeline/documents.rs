use crate::support::config_in;
use planwise::Services;
use planwise::context::{DocumentKind, NO_DOCUMENTS_FALLBACK, NewDocument, detect_document_type};
use planwise::error::DocumentError;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n";

#[tokio::test]
async fn converted_pdf_reaches_context_after_invalidation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process"))
        .and(body_partial_json(serde_json::json!({
            "fileName": "lease.pdf",
            "fileType": "application/pdf"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "processedText": "Rent is due on the 1st.",
            "originalSize": PDF_BYTES.len(),
            "processedSize": 23
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &server.uri());
    config.context.processor_url = Some(format!("{}/process", server.uri()));
    let services = Services::open(config).await.unwrap();

    assert_eq!(services.context.get_context(false).await, NO_DOCUMENTS_FALLBACK);

    let (_, kind) = detect_document_type(PDF_BYTES, "lease.pdf");
    assert_eq!(kind, DocumentKind::Pdf);
    let processed = services
        .processor
        .as_ref()
        .unwrap()
        .process("lease.pdf", PDF_BYTES)
        .await
        .unwrap();
    services
        .documents
        .save(NewDocument {
            name: "lease.pdf".into(),
            kind: processed.kind,
            content: processed.text,
            is_app_context: false,
        })
        .await
        .unwrap();

    // Served from cache until invalidated.
    assert_eq!(services.context.get_context(false).await, NO_DOCUMENTS_FALLBACK);
    services.context.invalidate().await;
    let context = services.context.get_context(false).await;
    assert!(context.contains("=== DOCUMENT: lease.pdf ==="));
    assert!(context.contains("Rent is due on the 1st."));
}

#[tokio::test]
async fn quota_and_sharing_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "http://127.0.0.1:9");
    config.context.document_quota_bytes = 32;

    {
        let services = Services::open(config.clone()).await.unwrap();
        services
            .documents
            .save(NewDocument {
                name: "a.txt".into(),
                kind: DocumentKind::Text,
                content: "x".repeat(20),
                is_app_context: false,
            })
            .await
            .unwrap();
        let err = services
            .documents
            .save(NewDocument {
                name: "b.txt".into(),
                kind: DocumentKind::Text,
                content: "y".repeat(20),
                is_app_context: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::QuotaExceeded {
                used_bytes: 20,
                requested_bytes: 20,
                limit_bytes: 32
            }
        ));
        services.documents.set_sharing_enabled(false).await.unwrap();
    }

    let services = Services::open(config).await.unwrap();
    assert_eq!(services.documents.list().await.unwrap().len(), 1);
    assert_eq!(services.documents.used_bytes().await.unwrap(), 20);
    assert!(!services.documents.sharing_enabled().await.unwrap());
    assert_eq!(services.context.get_context(true).await, "");
}
