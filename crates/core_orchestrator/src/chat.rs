use std::sync::Arc;
use std::time::Duration;

use core_types::{ChatMessage, ChatRequest, DocuError, DocumentBackend, HistoryTurn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::SharedRegistry;
use crate::resolver::SourceResolver;
use crate::{DEFAULT_REQUEST_TIMEOUT, bounded};

pub const FALLBACK_REPLY: &str =
    "I apologize, but I encountered an error processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    Summarize,
    KeyPoints,
    /// Needs text from the caller; there is no canned question for it.
    Search,
}

impl QuickAction {
    pub fn canned_question(self) -> Option<&'static str> {
        match self {
            QuickAction::Summarize => {
                Some("Please provide a comprehensive summary of all the documents")
            }
            QuickAction::KeyPoints => Some("What are the key points from all the documents?"),
            QuickAction::Search => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    BlankQuestion,
    Busy,
    Closed,
    NeedsQuestionText,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Answered {
        question: ChatMessage,
        answer: ChatMessage,
    },
    /// The request failed; the fixed fallback reply was appended instead.
    Fallback {
        question: ChatMessage,
        answer: ChatMessage,
        error: DocuError,
    },
    Rejected(SubmitRejection),
    /// The session closed while the request was in flight. Nothing was
    /// appended after the question.
    Cancelled { question: ChatMessage },
}

impl SubmitOutcome {
    pub fn answer(&self) -> Option<&ChatMessage> {
        match self {
            SubmitOutcome::Answered { answer, .. } | SubmitOutcome::Fallback { answer, .. } => {
                Some(answer)
            }
            _ => None,
        }
    }
}

struct SessionState {
    history: Vec<ChatMessage>,
    exchange: ExchangeState,
    closed: bool,
}

/// Conversation history for one session and the single in-flight exchange.
///
/// Submissions are serialized: while an exchange is `Sending`, further
/// submits are rejected, so answers are appended in issue order.
pub struct ChatSession {
    backend: Arc<dyn DocumentBackend>,
    registry: SharedRegistry,
    resolver: SourceResolver,
    timeout: Duration,
    state: Mutex<SessionState>,
    shutdown: watch::Sender<bool>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn DocumentBackend>, registry: SharedRegistry) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            backend,
            resolver: SourceResolver::new(Arc::clone(&registry)),
            registry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            state: Mutex::new(SessionState {
                history: Vec::new(),
                exchange: ExchangeState::Idle,
                closed: false,
            }),
            shutdown,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seeds the conversation with an assistant greeting.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        if !greeting.trim().is_empty() {
            self.state
                .get_mut()
                .history
                .push(ChatMessage::assistant(greeting, Vec::new()));
        }
        self
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    pub fn state(&self) -> ExchangeState {
        self.state.lock().exchange
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Tears the session down. An in-flight exchange is abandoned without
    /// appending to the history, and later submits are rejected.
    pub fn close(&self) {
        let was_open = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        self.shutdown.send_replace(true);
        if was_open {
            info!("chat session closed");
        }
    }

    pub async fn quick_action(&self, action: QuickAction) -> SubmitOutcome {
        match action.canned_question() {
            Some(question) => self.submit(question).await,
            None => SubmitOutcome::Rejected(SubmitRejection::NeedsQuestionText),
        }
    }

    pub async fn submit(&self, question_text: &str) -> SubmitOutcome {
        if question_text.trim().is_empty() {
            return SubmitOutcome::Rejected(SubmitRejection::BlankQuestion);
        }
        let document_id = self.registry.lock().active_id().map(str::to_string);

        let (question, request, shutdown) = {
            let mut state = self.state.lock();
            if state.closed {
                return SubmitOutcome::Rejected(SubmitRejection::Closed);
            }
            if state.exchange == ExchangeState::Sending {
                warn!("chat submit rejected: an exchange is already in flight");
                return SubmitOutcome::Rejected(SubmitRejection::Busy);
            }
            let chat_history: Vec<HistoryTurn> =
                state.history.iter().map(ChatMessage::to_turn).collect();
            let question = ChatMessage::user(question_text);
            state.history.push(question.clone());
            state.exchange = ExchangeState::Sending;
            let request = ChatRequest {
                message: question_text.to_string(),
                document_id,
                chat_history,
            };
            (question, request, self.shutdown.subscribe())
        };
        let _sending = SendingGuard(&self.state);

        info!(
            document_id = request.document_id.as_deref().unwrap_or("*"),
            turns = request.chat_history.len(),
            "sending chat question"
        );

        let result = tokio::select! {
            result = bounded(self.timeout, self.backend.chat(request)) => result,
            _ = closed(shutdown) => {
                warn!("chat exchange cancelled by session teardown");
                return SubmitOutcome::Cancelled { question };
            }
        };

        // Registry lock is never taken while the session lock is held.
        let result = result.map(|reply| {
            let sources = self.resolver.resolve(&reply.sources);
            (reply, sources)
        });

        let mut state = self.state.lock();
        if state.closed {
            return SubmitOutcome::Cancelled { question };
        }
        match result {
            Ok((reply, sources)) => {
                let id = reply
                    .id
                    .filter(|id| !id.is_empty() && !state.history.iter().any(|m| &m.id == id))
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let answer = ChatMessage::assistant(reply.content, sources).with_id(id);
                state.history.push(answer.clone());
                info!(sources = answer.sources.len(), "chat answer appended");
                SubmitOutcome::Answered { question, answer }
            }
            Err(error) => {
                warn!(kind = error.kind(), "chat exchange failed: {error}");
                let answer = ChatMessage::assistant(FALLBACK_REPLY, Vec::new());
                state.history.push(answer.clone());
                SubmitOutcome::Fallback {
                    question,
                    answer,
                    error,
                }
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn closed(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Returns the session to `Idle` however the exchange ends, including when
/// the submit future is dropped mid-flight.
struct SendingGuard<'a>(&'a Mutex<SessionState>);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().exchange = ExchangeState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use core_types::{Document, MimeKind, Sender};

    use super::*;
    use crate::registry::DocumentRegistry;
    use crate::test_support::{ScriptedBackend, cite, reply};

    fn session(backend: &Arc<ScriptedBackend>) -> (ChatSession, SharedRegistry) {
        let registry = DocumentRegistry::new().into_shared();
        let chat = ChatSession::new(backend.clone(), registry.clone());
        (chat, registry)
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_side_effects() {
        let backend = Arc::new(ScriptedBackend::default());
        let (chat, _) = session(&backend);
        let outcome = chat.submit("   \n").await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(SubmitRejection::BlankQuestion)
        ));
        assert!(chat.is_empty());
        assert!(backend.chat_requests().is_empty());
    }

    #[tokio::test]
    async fn serializes_prior_history_with_normalized_senders() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Ok(reply("b", Vec::new())));
        backend.push_chat(Ok(reply("d", Vec::new())));
        let (chat, _) = session(&backend);

        chat.submit("a").await;
        chat.submit("c").await;

        let requests = backend.chat_requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.message, "c");
        assert_eq!(
            second.chat_history,
            [
                HistoryTurn::new(Sender::User, "a"),
                HistoryTurn::new(Sender::Assistant, "b"),
            ]
        );
        let body = serde_json::to_value(second).expect("serialize");
        assert_eq!(body["chatHistory"][1]["sender"], "assistant");
        assert!(body.get("documentId").is_none());
        assert_eq!(chat.len(), 4);
    }

    #[tokio::test]
    async fn scopes_question_to_active_document() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Ok(reply("ok", Vec::new())));
        let (chat, registry) = session(&backend);
        registry
            .lock()
            .add(Document::new("doc-1", "a.pdf", MimeKind::Pdf, 1));

        chat.submit("what is this?").await;
        assert_eq!(
            backend.chat_requests()[0].document_id.as_deref(),
            Some("doc-1")
        );
    }

    #[tokio::test]
    async fn answer_carries_resolved_and_dangling_sources() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Ok(reply(
            "Revenue grew.",
            vec![cite("doc-1", 2, 0.8675), cite("deleted", 5, 0.3)],
        )));
        let (chat, registry) = session(&backend);
        registry
            .lock()
            .add(Document::new("doc-1", "q3.pdf", MimeKind::Pdf, 1));

        let outcome = chat.submit("how did revenue do?").await;
        let SubmitOutcome::Answered { answer, .. } = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(answer.sender, Sender::Assistant);
        assert_eq!(answer.sources.len(), 2);
        assert!(answer.sources[0].is_resolved());
        assert_eq!(answer.sources[0].display_score, 0.87);
        assert!(!answer.sources[1].is_resolved());
        assert_eq!(answer.sources[1].excerpt(), "deleted page 5");
    }

    #[tokio::test]
    async fn failure_appends_fallback_and_keeps_question() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Err(DocuError::network("connection refused")));
        let (chat, _) = session(&backend);

        let outcome = chat.submit("hello?").await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Fallback {
                error: DocuError::Network(_),
                ..
            }
        ));
        let history = chat.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello?");
        assert_eq!(history[1].content, FALLBACK_REPLY);
        assert!(history[1].sources.is_empty());
        assert_eq!(chat.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn second_submit_while_sending_is_rejected() {
        let backend = Arc::new(ScriptedBackend::gated());
        backend.push_chat(Ok(reply("first answer", Vec::new())));
        let (chat, _) = session(&backend);

        let (first, second) = tokio::join!(chat.submit("first"), async {
            tokio::task::yield_now().await;
            assert_eq!(chat.state(), ExchangeState::Sending);
            let outcome = chat.submit("second").await;
            backend.release();
            outcome
        });

        assert!(matches!(first, SubmitOutcome::Answered { .. }));
        assert!(matches!(
            second,
            SubmitOutcome::Rejected(SubmitRejection::Busy)
        ));
        let contents: Vec<_> = chat.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, ["first", "first answer"]);
        assert_eq!(backend.chat_requests().len(), 1);
    }

    #[tokio::test]
    async fn close_cancels_in_flight_exchange() {
        let backend = Arc::new(ScriptedBackend::gated());
        backend.push_chat(Ok(reply("late", Vec::new())));
        let (chat, _) = session(&backend);

        let (outcome, _) = tokio::join!(chat.submit("question"), async {
            tokio::task::yield_now().await;
            chat.close();
        });

        assert!(matches!(outcome, SubmitOutcome::Cancelled { .. }));
        let contents: Vec<_> = chat.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, ["question"]);
        assert!(matches!(
            chat.submit("again").await,
            SubmitOutcome::Rejected(SubmitRejection::Closed)
        ));
    }

    #[tokio::test]
    async fn slow_backend_falls_back_after_timeout() {
        let backend = Arc::new(ScriptedBackend::gated());
        let registry = DocumentRegistry::new().into_shared();
        let chat = ChatSession::new(backend.clone(), registry)
            .with_timeout(Duration::from_millis(20));

        let outcome = chat.submit("anyone there?").await;
        assert!(matches!(
            outcome,
            SubmitOutcome::Fallback {
                error: DocuError::Network(_),
                ..
            }
        ));
        assert_eq!(chat.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn quick_actions_route_through_submit() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Ok(reply("points", Vec::new())));
        let (chat, _) = session(&backend);

        let outcome = chat.quick_action(QuickAction::KeyPoints).await;
        assert!(outcome.answer().is_some());
        assert_eq!(
            backend.chat_requests()[0].message,
            "What are the key points from all the documents?"
        );

        assert!(matches!(
            chat.quick_action(QuickAction::Search).await,
            SubmitOutcome::Rejected(SubmitRejection::NeedsQuestionText)
        ));
        assert_eq!(backend.chat_requests().len(), 1);
    }

    #[tokio::test]
    async fn greeting_is_part_of_serialized_history() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_chat(Ok(reply("sure", Vec::new())));
        let registry = DocumentRegistry::new().into_shared();
        let chat = ChatSession::new(backend.clone(), registry).with_greeting("Hello!");
        assert_eq!(chat.len(), 1);

        chat.submit("hi").await;
        assert_eq!(
            backend.chat_requests()[0].chat_history,
            [HistoryTurn::new(Sender::Assistant, "Hello!")]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn history_stays_readable_while_answer_waits_on_registry() {
        let backend = Arc::new(ScriptedBackend::gated());
        backend.push_chat(Ok(reply("ok", vec![cite("d1", 1, 0.5)])));
        let (chat, registry) = session(&backend);
        let chat = Arc::new(chat);
        let task = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { chat.submit("q").await }
        });
        while backend.chat_requests().is_empty() {
            tokio::task::yield_now().await;
        }

        let guard = registry.lock();
        backend.release();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reader = Arc::clone(&chat);
        let len = tokio::time::timeout(
            Duration::from_secs(2),
            tokio::task::spawn_blocking(move || reader.len()),
        )
        .await
        .expect("session lock is free while sources resolve")
        .expect("join");
        assert_eq!(len, 1);
        drop(guard);

        let outcome = task.await.expect("join");
        assert!(matches!(outcome, SubmitOutcome::Answered { .. }));
        assert_eq!(chat.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_reply_id_gets_replaced() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut first = reply("one", Vec::new());
        first.id = Some("m-1".to_string());
        let mut second = reply("two", Vec::new());
        second.id = Some("m-1".to_string());
        backend.push_chat(Ok(first));
        backend.push_chat(Ok(second));
        let (chat, _) = session(&backend);

        chat.submit("a").await;
        chat.submit("b").await;
        let history = chat.history();
        assert_eq!(history[1].id, "m-1");
        assert_ne!(history[3].id, "m-1");
    }
}
