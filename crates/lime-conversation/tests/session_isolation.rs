use std::sync::Arc;

use lime_auth::{SessionManager, SESSION_MARKER_KEY};
use lime_conversation::{ConversationState, TurnOutcome, FALLBACK_MESSAGE};
use lime_core::{KeyValueStore, LimeError, Message, MockAssistantClient, SessionState};
use lime_storage::MemoryStore;

#[tokio::test]
async fn failing_assistant_leaves_session_authenticated() {
    let store = Arc::new(MemoryStore::new());
    let mut sessions = SessionManager::new(store.clone());
    sessions.restore_session().unwrap();
    assert!(sessions.signup("bob", "secret").unwrap());
    let marker = store.get(SESSION_MARKER_KEY).unwrap();

    let mut mock = MockAssistantClient::new();
    mock.expect_generate_answer()
        .times(1)
        .returning(|_, _| Err(LimeError::ServiceError("quota exceeded".into())));
    let conversation = ConversationState::with_default_greeting(Arc::new(mock));

    assert_eq!(conversation.submit_turn("Hi").await, TurnOutcome::Fallback);
    assert_eq!(
        conversation.messages().last(),
        Some(&Message::model(FALLBACK_MESSAGE))
    );

    assert_eq!(
        sessions.state(),
        &SessionState::Authenticated {
            username: "bob".to_string()
        }
    );
    assert!(marker.is_some());
    assert_eq!(store.get(SESSION_MARKER_KEY).unwrap(), marker);
    assert!(sessions.credentials().verify("bob", "secret").unwrap());
}
