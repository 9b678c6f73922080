use crate::support::{config_in, scripted_socket};
use planwise::Services;
use planwise::context::{DocumentKind, NewDocument};
use planwise::directives::Action;
use planwise::orchestrator::{ObservedEvent, RecordingObserver};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn http_never_called() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn streamed_turn_carries_document_context_and_server_actions() {
    let (socket_url, received) = scripted_socket(vec![
        json!({"type": "chunk", "conversationId": "{cid}", "responseId": "{rid}", "content": "Blocked "}),
        json!({"type": "chunk", "conversationId": "{cid}", "responseId": "{rid}", "content": "your morning."}),
        json!({
            "type": "complete",
            "conversationId": "{cid}",
            "responseId": "{rid}",
            "actions": [{"type": "createTodo", "data": {"title": "Stretch", "tab": "today"}}],
            "title": "Morning plan"
        }),
    ])
    .await;
    let http = http_never_called().await;

    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &http.uri());
    config.transport.socket_url = Some(socket_url);
    let services = Services::open(config).await.unwrap();
    services
        .documents
        .save(NewDocument {
            name: "routine.md".into(),
            kind: DocumentKind::Markdown,
            content: "Wake at 6, run on Tuesdays.".into(),
            is_app_context: false,
        })
        .await
        .unwrap();
    services.connect().await;

    let conversation = services.conversations.create(None).await.unwrap();
    let observer = RecordingObserver::new();
    let turn = services
        .orchestrator
        .send_in_conversation(&conversation.id, "plan my morning", Vec::new(), &observer)
        .await
        .unwrap();
    services.shutdown().await;

    assert_eq!(turn.reply.text, "Blocked your morning.");
    assert_eq!(turn.title.as_deref(), Some("Morning plan"));
    let actions = turn.reply.actions.unwrap();
    assert!(matches!(&actions[..], [Action::CreateTodo(todo)] if todo.title == "Stretch"));

    let events = observer.events();
    assert_eq!(
        events[..2],
        [
            ObservedEvent::Chunk("Blocked ".into()),
            ObservedEvent::Chunk("Blocked your morning.".into()),
        ]
    );
    assert!(matches!(events.last(), Some(ObservedEvent::Complete(_))));

    let requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["action"], "sendMessage");
    assert_eq!(request["conversationId"], conversation.id.as_str());
    assert_eq!(request["isFirstMessage"], true);
    let context = request["userKnowledgeContext"]["documentContext"]
        .as_str()
        .unwrap();
    assert!(context.starts_with("=== DOCUMENT: routine.md ==="));
    assert!(context.contains("run on Tuesdays"));
}

#[tokio::test]
async fn follow_up_turn_sends_history_without_context() {
    let (socket_url, received) = scripted_socket(vec![json!({
        "type": "complete",
        "conversationId": "{cid}",
        "responseId": "{rid}",
        "content": "Noted."
    })])
    .await;
    let http = http_never_called().await;

    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, &http.uri());
    config.transport.socket_url = Some(socket_url);
    let services = Services::open(config).await.unwrap();
    services.connect().await;

    let conversation = services.conversations.create(None).await.unwrap();
    for text in ["first", "second"] {
        let turn = services
            .orchestrator
            .send_in_conversation(&conversation.id, text, Vec::new(), &RecordingObserver::new())
            .await
            .unwrap();
        assert_eq!(turn.reply.text, "Noted.");
    }
    services.shutdown().await;

    let requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["isFirstMessage"], false);
    assert_eq!(requests[1]["userKnowledgeContext"]["enabled"], false);
    let history = requests[1]["messageHistory"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "first");
    assert_eq!(history[1]["role"], "assistant");

    let stored = services.conversations.get(&conversation.id).await.unwrap();
    assert_eq!(stored.title, "first");
    assert_eq!(stored.messages.len(), 4);
}
