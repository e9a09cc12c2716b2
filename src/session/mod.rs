use async_trait::async_trait;
use log::{ debug, info };
use std::sync::Arc;
use thiserror::Error;

use crate::history::{ ConversationStore, StoreError };
use crate::llm::generator::ResponseGenerator;
use crate::llm::LlmError;
use crate::models::chat::{ Message, Role };
use crate::models::websocket::TranscriptEntry;

pub const ASSISTANT_NAME: &str = "Tuco";
pub const GREETING: &str =
    "Hi! I'm your AI therapist. I'm here to understand your problems, help you explore solutions and build on your strengths. I would love to know more about you, what should I address you as?";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),
    #[error("response generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("failed to deliver view: {0}")]
    Render(String),
}

/// Per-session state. One value per connected client, dropped with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user_id: Option<String>,
    pub conversation: Vec<Message>,
    /// Bumped after every accepted send so the client swaps in a fresh,
    /// empty input widget.
    pub input_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingIdentifier,
    AwaitingInput,
    AwaitingResponse,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        if self.user_id.is_none() {
            return Phase::AwaitingIdentifier;
        }
        match self.conversation.last() {
            Some(last) if last.role == Role::User => Phase::AwaitingResponse,
            _ => Phase::AwaitingInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Identify(String),
    Submit {
        text: String,
        send_clicked: bool,
        /// Generation of the input widget the draft was typed into.
        input_generation: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    IdentifierPrompt {
        greeting: String,
    },
    Transcript {
        user_id: String,
        welcome: String,
        entries: Vec<TranscriptEntry>,
        input_generation: u64,
        thinking: bool,
    },
}

#[async_trait]
pub trait Renderer: Send {
    async fn render(&mut self, view: View) -> Result<(), SessionError>;
}

/// A submission counts when the send action was used, or when it carries no
/// line break (Enter without Shift). Blank text never counts.
pub fn should_send(text: &str, send_clicked: bool) -> bool {
    !text.trim().is_empty() && (send_clicked || !text.contains('\n'))
}

pub struct SessionLoop {
    store: Arc<dyn ConversationStore>,
    generator: Arc<ResponseGenerator>,
    provider: String,
}

impl SessionLoop {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        generator: Arc<ResponseGenerator>,
        provider: impl Into<String>
    ) -> Self {
        Self {
            store,
            generator,
            provider: provider.into(),
        }
    }

    pub fn view(state: &SessionState, thinking: bool) -> View {
        let user_id = match &state.user_id {
            Some(id) => id,
            None => {
                return View::IdentifierPrompt { greeting: GREETING.to_string() };
            }
        };

        let entries = state.conversation
            .iter()
            .map(|m| TranscriptEntry {
                speaker: if m.role == Role::User { user_id.clone() } else { ASSISTANT_NAME.to_string() },
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        View::Transcript {
            user_id: user_id.clone(),
            welcome: format!("Welcome, {}! Please tell me a little about yourself.", user_id),
            entries,
            input_generation: state.input_generation,
            thinking,
        }
    }

    /// First draw of a fresh session.
    pub async fn start<R: Renderer>(&self, state: &mut SessionState, renderer: &mut R) -> Result<(), SessionError> {
        self.render(state, renderer).await
    }

    /// Applies one event, then redraws until the session settles.
    pub async fn handle<R: Renderer>(
        &self,
        state: &mut SessionState,
        event: SessionEvent,
        renderer: &mut R
    ) -> Result<(), SessionError> {
        match event {
            SessionEvent::Identify(text) => self.identify(state, &text).await?,
            SessionEvent::Submit { text, send_clicked, input_generation } => {
                self.submit(state, &text, send_clicked, input_generation).await?
            }
        }
        self.render(state, renderer).await
    }

    async fn identify(&self, state: &mut SessionState, text: &str) -> Result<(), SessionError> {
        if state.user_id.is_some() {
            debug!("Ignoring identify: session already bound to an identifier");
            return Ok(());
        }
        let user_id = text.trim();
        if user_id.is_empty() {
            return Ok(());
        }

        let conversation = self.store.get(user_id).await?;
        info!("Session identified as '{}' with {} stored message(s)", user_id, conversation.len());
        state.user_id = Some(user_id.to_string());
        state.conversation = conversation;
        Ok(())
    }

    async fn submit(
        &self,
        state: &mut SessionState,
        text: &str,
        send_clicked: bool,
        input_generation: u64
    ) -> Result<(), SessionError> {
        let user_id = match &state.user_id {
            Some(id) => id.clone(),
            None => return Ok(()),
        };
        if input_generation != state.input_generation {
            debug!(
                "Ignoring submission from input generation {} (current {})",
                input_generation,
                state.input_generation
            );
            return Ok(());
        }
        if !should_send(text, send_clicked) {
            return Ok(());
        }

        let message = Message::user(text.trim());
        state.conversation.push(message.clone());
        self.store.append(&user_id, &[message]).await?;
        state.input_generation += 1;
        Ok(())
    }

    /// Redraws the session. While the last message is from the user, shows
    /// the thinking indicator, waits for the reply, stores it and redraws.
    async fn render<R: Renderer>(&self, state: &mut SessionState, renderer: &mut R) -> Result<(), SessionError> {
        loop {
            if state.phase() != Phase::AwaitingResponse {
                return renderer.render(Self::view(state, false)).await;
            }
            renderer.render(Self::view(state, true)).await?;

            let (user_id, history, text) = match (&state.user_id, state.conversation.split_last()) {
                (Some(id), Some((last, history))) => (id.clone(), history.to_vec(), last.content.clone()),
                _ => return Ok(()),
            };

            let reply = self.generator.generate(&history, &text, &self.provider).await?;
            let message = Message::assistant(reply);
            state.conversation.push(message.clone());
            self.store.append(&user_id, &[message]).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryConversationStore;
    use crate::llm::chat::{ ChatClient, ChatRequest };
    use crate::llm::generator::tests::{ prompts_file, PromptsFile, ScriptedClient };
    use crate::llm::Provider;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        views: Vec<View>,
    }

    #[async_trait]
    impl Renderer for RecordingRenderer {
        async fn render(&mut self, view: View) -> Result<(), SessionError> {
            self.views.push(view);
            Ok(())
        }
    }

    /// Records what the store held at the moment generation was requested.
    struct StoreProbeClient {
        store: Arc<InMemoryConversationStore>,
        user_id: String,
        reply: String,
        seen: Mutex<Vec<(Vec<Message>, Vec<Message>, String)>>,
    }

    #[async_trait]
    impl ChatClient for StoreProbeClient {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
            let stored = self.store.get(&self.user_id).await.unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((stored, request.history.to_vec(), request.user_text.to_string()));
            Ok(self.reply.clone())
        }
    }

    /// The prompts file lives as long as the returned guard.
    fn session_with(store: Arc<InMemoryConversationStore>, client: Arc<dyn ChatClient>) -> (SessionLoop, PromptsFile) {
        let prompts = prompts_file("You are Tuco.");
        let generator = ResponseGenerator::new(prompts.path()).with_client(client);
        (SessionLoop::new(store, Arc::new(generator), "anthropic"), prompts)
    }

    fn entries(view: &View) -> Vec<(String, String)> {
        match view {
            View::Transcript { entries, .. } => entries.iter().map(|e| (e.speaker.clone(), e.content.clone())).collect(),
            View::IdentifierPrompt { .. } => panic!("expected a transcript view"),
        }
    }

    fn thinking(view: &View) -> bool {
        matches!(view, View::Transcript { thinking: true, .. })
    }

    #[tokio::test]
    async fn new_user_first_turn_end_to_end() {
        let store = Arc::new(InMemoryConversationStore::new());
        let client = Arc::new(StoreProbeClient {
            store: store.clone(),
            user_id: "Sam".to_string(),
            reply: "  What feels stuck right now?  ".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();

        session.start(&mut state, &mut renderer).await.unwrap();
        assert_eq!(renderer.views, vec![View::IdentifierPrompt { greeting: GREETING.to_string() }]);

        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();
        assert!(state.conversation.is_empty());
        assert_eq!(state.phase(), Phase::AwaitingInput);

        session
            .handle(&mut state, SessionEvent::Submit { text: "I feel stuck".into(), send_clicked: false, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(vec![Message::user("I feel stuck")], vec![], "I feel stuck".to_string())]);

        let expected = vec![Message::user("I feel stuck"), Message::assistant("What feels stuck right now?")];
        assert_eq!(store.get("Sam").await.unwrap(), expected);
        assert_eq!(state.conversation, expected);
        assert_eq!(state.input_generation, 1);

        let views = &renderer.views;
        assert_eq!(views.len(), 4);
        assert!(entries(&views[1]).is_empty());
        assert!(thinking(&views[2]));
        assert_eq!(entries(&views[2]), vec![("Sam".to_string(), "I feel stuck".to_string())]);
        assert!(!thinking(&views[3]));
        assert_eq!(
            entries(&views[3]),
            vec![
                ("Sam".to_string(), "I feel stuck".to_string()),
                ("Tuco".to_string(), "What feels stuck right now?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn multiline_draft_waits_for_explicit_send() {
        let store = Arc::new(InMemoryConversationStore::new());
        let client = ScriptedClient::replying(Provider::Anthropic, "ok");
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();
        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();

        session
            .handle(&mut state, SessionEvent::Submit { text: "line one\nline two".into(), send_clicked: false, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();
        assert!(store.get("Sam").await.unwrap().is_empty());
        assert_eq!(state.input_generation, 0);

        session
            .handle(&mut state, SessionEvent::Submit { text: "line one\nline two\n".into(), send_clicked: true, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();
        assert_eq!(client.calls()[0].user_text, "line one\nline two");
        assert_eq!(state.input_generation, 1);
    }

    #[tokio::test]
    async fn blank_input_and_input_before_identify_are_ignored() {
        let store = Arc::new(InMemoryConversationStore::new());
        let client = ScriptedClient::replying(Provider::Anthropic, "ok");
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();

        session
            .handle(&mut state, SessionEvent::Submit { text: "hello".into(), send_clicked: true, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();
        assert_eq!(state.phase(), Phase::AwaitingIdentifier);

        session.handle(&mut state, SessionEvent::Identify("   ".into()), &mut renderer).await.unwrap();
        assert_eq!(state.phase(), Phase::AwaitingIdentifier);

        session.handle(&mut state, SessionEvent::Identify(" Sam ".into()), &mut renderer).await.unwrap();
        assert_eq!(state.user_id.as_deref(), Some("Sam"));

        session
            .handle(&mut state, SessionEvent::Submit { text: "  \t ".into(), send_clicked: true, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();

        assert!(client.calls().is_empty());
        assert!(!store.contains("Sam").await);
        assert!(renderer.views.iter().all(|v| !thinking(v)));
    }

    #[tokio::test]
    async fn identifier_is_fixed_for_the_session() {
        let store = Arc::new(InMemoryConversationStore::new());
        let (session, _prompts) = session_with(store.clone(), ScriptedClient::replying(Provider::Anthropic, "ok"));
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();

        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();
        session.handle(&mut state, SessionEvent::Identify("Alex".into()), &mut renderer).await.unwrap();

        assert_eq!(state.user_id.as_deref(), Some("Sam"));
    }

    #[tokio::test]
    async fn resuming_with_unanswered_message_generates_immediately() {
        let store = Arc::new(InMemoryConversationStore::new());
        store.append("Sam", &[Message::user("a"), Message::assistant("b"), Message::user("c")]).await.unwrap();
        let client = ScriptedClient::replying(Provider::Anthropic, "d");
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();

        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].history, vec![Message::user("a"), Message::assistant("b")]);
        assert_eq!(calls[0].user_text, "c");
        assert_eq!(store.get("Sam").await.unwrap().last(), Some(&Message::assistant("d")));
    }

    #[tokio::test]
    async fn failed_generation_leaves_user_message_and_next_turn_resumes() {
        let store = Arc::new(InMemoryConversationStore::new());
        let failing = ScriptedClient::failing(Provider::Anthropic);
        let (session, _prompts) = session_with(store.clone(), failing.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();
        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();

        let result = session
            .handle(&mut state, SessionEvent::Submit { text: "first".into(), send_clicked: true, input_generation: 0 }, &mut renderer)
            .await;

        assert!(matches!(result, Err(SessionError::Generation(_))));
        assert_eq!(store.get("Sam").await.unwrap(), vec![Message::user("first")]);
        assert_eq!(state.phase(), Phase::AwaitingResponse);

        let working = ScriptedClient::replying(Provider::Anthropic, "reply");
        let (session, _working_prompts) = session_with(store.clone(), working.clone());
        session
            .handle(&mut state, SessionEvent::Submit { text: "second".into(), send_clicked: true, input_generation: 1 }, &mut renderer)
            .await
            .unwrap();

        let calls = working.calls();
        assert_eq!(calls[0].history, vec![Message::user("first")]);
        assert_eq!(calls[0].user_text, "second");
        assert_eq!(
            store.get("Sam").await.unwrap(),
            vec![Message::user("first"), Message::user("second"), Message::assistant("reply")]
        );
    }

    #[tokio::test]
    async fn sessions_keep_separate_state() {
        let store = Arc::new(InMemoryConversationStore::new());
        let (session, _prompts) = session_with(store.clone(), ScriptedClient::replying(Provider::Anthropic, "ok"));
        let mut first = SessionState::default();
        let mut second = SessionState::default();
        let mut renderer = RecordingRenderer::default();

        session.handle(&mut first, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();
        session
            .handle(&mut first, SessionEvent::Submit { text: "hi".into(), send_clicked: false, input_generation: 0 }, &mut renderer)
            .await
            .unwrap();

        assert_eq!(second.phase(), Phase::AwaitingIdentifier);
        session.handle(&mut second, SessionEvent::Identify("Alex".into()), &mut renderer).await.unwrap();
        assert!(second.conversation.is_empty());
        assert_eq!(first.conversation.len(), 2);
    }

    #[tokio::test]
    async fn draft_reported_twice_for_one_widget_is_stored_once() {
        let store = Arc::new(InMemoryConversationStore::new());
        let client = ScriptedClient::replying(Provider::Anthropic, "ok");
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();
        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();

        // Focus leaving the textarea reports the draft, then the click reports it again.
        for send_clicked in [false, true] {
            session
                .handle(
                    &mut state,
                    SessionEvent::Submit { text: "I feel stuck".into(), send_clicked, input_generation: 0 },
                    &mut renderer
                )
                .await
                .unwrap();
        }

        assert_eq!(store.get("Sam").await.unwrap(), vec![Message::user("I feel stuck"), Message::assistant("ok")]);
        assert_eq!(client.calls().len(), 1);
        assert_eq!(state.input_generation, 1);
    }

    #[tokio::test]
    async fn submission_from_current_widget_still_counts() {
        let store = Arc::new(InMemoryConversationStore::new());
        let client = ScriptedClient::replying(Provider::Anthropic, "ok");
        let (session, _prompts) = session_with(store.clone(), client.clone());
        let mut state = SessionState::default();
        let mut renderer = RecordingRenderer::default();
        session.handle(&mut state, SessionEvent::Identify("Sam".into()), &mut renderer).await.unwrap();

        for (text, generation) in [("one", 0), ("stale", 0), ("two", 1), ("ahead", 5)] {
            session
                .handle(
                    &mut state,
                    SessionEvent::Submit { text: text.into(), send_clicked: true, input_generation: generation },
                    &mut renderer
                )
                .await
                .unwrap();
        }

        let user_texts: Vec<String> = client.calls().into_iter().map(|c| c.user_text).collect();
        assert_eq!(user_texts, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(state.input_generation, 2);
    }

    #[test]
    fn send_trigger_rules() {
        assert!(should_send("hello", false));
        assert!(!should_send("hello\n", false));
        assert!(should_send("hello\n", true));
        assert!(!should_send("   ", true));
        assert!(!should_send("", false));
    }
}
