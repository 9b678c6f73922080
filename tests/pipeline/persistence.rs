use crate::support::config_in;
use planwise::Services;
use planwise::conversation::MessageType;
use planwise::directives::Action;
use planwise::orchestrator::{APOLOGY_MESSAGE, NoopObserver};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn http_turn_survives_reopening_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"content": "Added it.\n[[CREATE_TODO]]\ntitle: Buy milk\ntab: today\n"},
            "title": "Groceries"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let conversation_id = {
        let services = Services::open(config_in(&dir, &server.uri())).await.unwrap();
        let conversation = services.conversations.create(None).await.unwrap();
        let turn = services
            .orchestrator
            .send_in_conversation(&conversation.id, "remind me to buy milk", Vec::new(), &NoopObserver)
            .await
            .unwrap();
        services.shutdown().await;

        assert!(!turn.reply.is_error);
        assert_eq!(turn.reply.text, "Added it.");
        assert_eq!(turn.title.as_deref(), Some("Groceries"));
        let actions = turn.reply.actions.unwrap();
        assert!(matches!(&actions[..], [Action::CreateTodo(todo)] if todo.title == "Buy milk"));
        conversation.id
    };

    let services = Services::open(config_in(&dir, &server.uri())).await.unwrap();
    let conversation = services.conversations.get(&conversation_id).await.unwrap();
    assert_eq!(conversation.title, "Groceries");
    let kinds: Vec<MessageType> = conversation
        .messages
        .iter()
        .map(|message| message.message_type)
        .collect();
    assert_eq!(kinds, vec![MessageType::User, MessageType::Ai]);
    assert_eq!(conversation.messages[1].text, "Added it.");
    assert!(
        services
            .conversations
            .is_first_message_sent(&conversation_id)
            .await
            .unwrap()
    );
    assert!(services.usage.status().await.percentage_used > 0.0);
}

#[tokio::test]
async fn failed_turn_keeps_first_message_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let services = Services::open(config_in(&dir, &server.uri())).await.unwrap();
    let conversation = services.conversations.create(None).await.unwrap();
    let turn = services
        .orchestrator
        .send_in_conversation(&conversation.id, "hello", Vec::new(), &NoopObserver)
        .await
        .unwrap();
    services.shutdown().await;

    assert!(turn.reply.is_error);
    assert_eq!(turn.reply.text, APOLOGY_MESSAGE);
    assert!(
        !services
            .conversations
            .is_first_message_sent(&conversation.id)
            .await
            .unwrap()
    );
    assert!(services.usage.status().await.percentage_used.abs() < f64::EPSILON);
}
