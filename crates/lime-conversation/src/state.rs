use lime_core::{AssistantClient, HistoryEntry, Message, TurnState, DEFAULT_GREETING};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};

pub const FALLBACK_MESSAGE: &str = "I encountered an issue. Please try again.";

/// What happened to a submitted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was appended.
    Ignored,
    /// Another turn was still in flight; the submission was dropped.
    Busy,
    Answered,
    /// The assistant failed and the fallback message was appended instead.
    Fallback,
}

struct Transcript {
    messages: Vec<Message>,
    turn: TurnState,
}

/// Append-only chat transcript with at most one assistant call in flight.
///
/// The transcript always starts with the model greeting and never shrinks.
/// A turn appends the user message immediately, calls the assistant with the
/// history as it was *before* that append, then appends the reply (or
/// [`FALLBACK_MESSAGE`]) once the call settles.
pub struct ConversationState {
    assistant: Arc<dyn AssistantClient>,
    transcript: Mutex<Transcript>,
}

impl ConversationState {
    pub fn new(assistant: Arc<dyn AssistantClient>, greeting: impl Into<String>) -> Self {
        Self {
            assistant,
            transcript: Mutex::new(Transcript {
                messages: vec![Message::model(greeting)],
                turn: TurnState::Idle,
            }),
        }
    }

    pub fn with_default_greeting(assistant: Arc<dyn AssistantClient>) -> Self {
        Self::new(assistant, DEFAULT_GREETING)
    }

    // The lock is never held across an await, so a poisoned guard still
    // holds a consistent transcript.
    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn turn_state(&self) -> TurnState {
        self.lock().turn
    }

    /// Runs one turn against the assistant.
    ///
    /// Blank text and submissions made while a turn is `Sending` are dropped
    /// without touching the transcript or calling the assistant. Assistant
    /// failures never escape; they become [`FALLBACK_MESSAGE`].
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn submit_turn(&self, text: &str) -> TurnOutcome {
        if text.trim().is_empty() {
            debug!("Ignoring blank submission");
            return TurnOutcome::Ignored;
        }

        let Some((history, in_flight)) = self.begin_turn(text) else {
            debug!("Dropping submission while a turn is in flight");
            return TurnOutcome::Busy;
        };

        match self.assistant.generate_answer(text, &history).await {
            Ok(reply) if !reply.trim().is_empty() => {
                in_flight.settle(Message::model(reply));
                TurnOutcome::Answered
            }
            Ok(_) => {
                warn!("Assistant returned an empty answer");
                in_flight.settle(Message::model(FALLBACK_MESSAGE));
                TurnOutcome::Fallback
            }
            Err(e) => {
                warn!("Assistant call failed: {}", e);
                in_flight.settle(Message::model(FALLBACK_MESSAGE));
                TurnOutcome::Fallback
            }
        }
    }

    /// Idle -> Sending. Returns the pre-append history snapshot.
    fn begin_turn(&self, text: &str) -> Option<(Vec<HistoryEntry>, InFlight<'_>)> {
        let mut transcript = self.lock();
        if transcript.turn == TurnState::Sending {
            return None;
        }

        let history = transcript
            .messages
            .iter()
            .map(Message::to_history_entry)
            .collect();
        transcript.messages.push(Message::user(text));
        transcript.turn = TurnState::Sending;

        Some((
            history,
            InFlight {
                conversation: self,
                settled: false,
            },
        ))
    }

    fn finish_turn(&self, reply: Message) {
        let mut transcript = self.lock();
        transcript.messages.push(reply);
        transcript.turn = TurnState::Idle;
    }
}

/// Sending -> Idle exactly once, even if the turn's future is dropped mid-call.
struct InFlight<'a> {
    conversation: &'a ConversationState,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, reply: Message) {
        self.settled = true;
        self.conversation.finish_turn(reply);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Turn abandoned before the assistant answered");
            self.conversation.finish_turn(Message::model(FALLBACK_MESSAGE));
        }
    }
}
