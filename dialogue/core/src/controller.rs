//! Conversation Controller
//!
//! The controller is the only stateful owner in the engine. It accepts the
//! four input verbs, runs at most one backend request at a time, feeds the
//! streamed reply through the directive parser into the reveal engine, and
//! reports everything the presentation layers need as
//! [`PresentationMessage`]s.
//!
//! # State machine
//!
//! ```text
//!            submit                first chunk              reveal complete
//!   Idle ─────────────▶ Requesting ─────────────▶ Revealing ───────────────▶ Idle
//!     ▲                     │                         │
//!     └──── fallback ◀──────┴──── terminal failure ───┘
//!
//!   open_menu / close_menu overlay any of the above (reported as MenuOpen)
//! ```
//!
//! # Driving
//!
//! The host calls [`Controller::tick`] at a fixed rate with the elapsed time
//! and a fresh settings snapshot. Stream events are drained without waiting
//! at the start of each tick, so the controller never blocks the host loop.

use std::time::Duration;

use chrono::Timelike;
use tokio::sync::mpsc;

use crate::backend::{context_from, ChatRequest, ContextTurn, ResponseStream, StreamAdapter, StreamEvent};
use crate::catalog::{AssetCatalog, ExpressionId};
use crate::config::{CharacterConfig, EngineConfig};
use crate::conversation::{Conversation, Role, Turn, TurnId};
use crate::directive::{self, Segment, SegmentAccumulator};
use crate::error::{BackendError, ControllerError, PersistenceError};
use crate::events::InputVerb;
use crate::history::HistoryStore;
use crate::messages::{ConversationState, NotifyLevel, PresentationMessage};
use crate::reveal::{PacingProfile, RevealEngine, RevealEvent};
use crate::settings::SessionSettings;

/// Line shown when the request was refused outright
pub const FALLBACK_BLOCKED: &str = "(Error: My thoughts were blocked!)";

/// Line shown when the backend could not be reached or the reply broke off
pub const FALLBACK_TROUBLE: &str = "(Error: I had trouble thinking...)";

/// Line shown when the reply had nothing to say
pub const FALLBACK_JUMBLED: &str = "(Error: My thoughts got jumbled...)";

/// Controller tuning taken from the engine configuration
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    /// Character the backend plays
    pub character: CharacterConfig,
    /// Prior turns sent as context
    pub context_turns: usize,
    /// Punctuation holds
    pub pacing: PacingProfile,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            character: CharacterConfig::default(),
            context_turns: 40,
            pacing: PacingProfile::default(),
        }
    }
}

impl ControllerOptions {
    /// Options from a loaded configuration
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            character: config.character.clone(),
            context_turns: config.context_turns,
            pacing: config.pacing(),
        }
    }
}

/// Where the request/reveal cycle is, ignoring the menu overlay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Requesting,
    Revealing,
}

/// Request accepted but not yet sent
///
/// Sending waits for the next tick so the prompt is rendered from that
/// tick's settings snapshot.
#[derive(Debug)]
struct PendingRequest {
    user_text: String,
    context: Vec<ContextTurn>,
}

/// Character turn being received and revealed
#[derive(Debug)]
struct ActiveTurn {
    id: TurnId,
    stream: Option<ResponseStream>,
    accumulator: SegmentAccumulator,
    reveal: RevealEngine,
    started: bool,
}

/// Why a turn ended in a fallback line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FallbackReason {
    Blocked,
    Trouble,
    Jumbled,
}

impl FallbackReason {
    fn from_error(error: &BackendError) -> Self {
        if error.is_fatal_request() {
            Self::Blocked
        } else {
            Self::Trouble
        }
    }

    fn line(self) -> &'static str {
        match self {
            Self::Blocked => FALLBACK_BLOCKED,
            Self::Trouble => FALLBACK_TROUBLE,
            Self::Jumbled => FALLBACK_JUMBLED,
        }
    }
}

/// Top-level dialogue state machine
pub struct Controller {
    adapter: StreamAdapter,
    store: Box<dyn HistoryStore>,
    catalog: AssetCatalog,
    options: ControllerOptions,
    tx: mpsc::UnboundedSender<PresentationMessage>,
    conversation: Conversation,
    phase: Phase,
    menu_open: bool,
    pending: Option<PendingRequest>,
    active: Option<ActiveTurn>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("backend", &self.adapter.backend_name())
            .field("phase", &self.phase)
            .field("menu_open", &self.menu_open)
            .field("turns", &self.conversation.len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create an idle controller with an empty conversation
    pub fn new(
        adapter: StreamAdapter,
        store: Box<dyn HistoryStore>,
        catalog: AssetCatalog,
        options: ControllerOptions,
        tx: mpsc::UnboundedSender<PresentationMessage>,
    ) -> Self {
        Self {
            adapter,
            store,
            catalog,
            options,
            tx,
            conversation: Conversation::new(),
            phase: Phase::Idle,
            menu_open: false,
            pending: None,
            active: None,
        }
    }

    /// Replace the in-memory conversation with the stored history
    ///
    /// Returns the number of turns loaded.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] unless idle.
    /// A store failure is reported through [`PresentationMessage::Notify`]
    /// and leaves the conversation empty.
    pub fn load_history(&mut self) -> Result<usize, ControllerError> {
        self.require_idle("load_history")?;

        match self.store.load() {
            Ok(conversation) => {
                let turns = conversation.len();
                self.conversation = conversation;
                tracing::info!(turns, "Conversation history restored");
                Ok(turns)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not load history, starting fresh");
                self.notify(
                    NotifyLevel::Warning,
                    "History unavailable",
                    &e.to_string(),
                );
                Ok(0)
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// State as reported to collaborators
    #[must_use]
    pub fn state(&self) -> ConversationState {
        if self.menu_open {
            return ConversationState::MenuOpen;
        }
        match self.phase {
            Phase::Idle => ConversationState::Idle,
            Phase::Requesting => ConversationState::Requesting,
            Phase::Revealing => ConversationState::Revealing,
        }
    }

    /// Every finished turn, fallback lines included
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Known expression and cue ids
    #[must_use]
    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    /// Text of the turn being revealed, as far as it is visible
    #[must_use]
    pub fn visible_text(&self) -> Option<String> {
        self.active.as_ref().map(|a| a.reveal.visible_text())
    }

    // ========================================================================
    // Input Verbs
    // ========================================================================

    /// Dispatch an input verb
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] if the verb is refused in the current state.
    pub fn handle(&mut self, verb: InputVerb) -> Result<(), ControllerError> {
        tracing::debug!(verb = verb.name(), state = ?self.state(), "Input verb");
        match verb {
            InputVerb::Submit { text } => self.submit(&text),
            InputVerb::OpenMenu => self.open_menu(),
            InputVerb::CloseMenu => self.close_menu(),
            InputVerb::Skip => self.skip(),
        }
    }

    /// Send user text to the character
    ///
    /// The user turn is recorded immediately; the request goes out on the
    /// next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] unless idle with the menu
    /// closed, and [`ControllerError::EmptyInput`] for blank text.
    pub fn submit(&mut self, text: &str) -> Result<(), ControllerError> {
        self.require_idle("submit")?;

        let text = directive::clean_text(text);
        if text.is_empty() {
            return Err(ControllerError::EmptyInput);
        }

        let context = context_from(&self.conversation, self.options.context_turns);
        let turn = Turn::user(text.clone());
        self.emit(PresentationMessage::TurnFinished {
            turn_id: turn.id,
            text: text.clone(),
            fallback: false,
        });
        self.record(turn);

        self.pending = Some(PendingRequest {
            user_text: text,
            context,
        });
        self.set_phase(Phase::Requesting);
        Ok(())
    }

    /// Ask the character to open the conversation
    ///
    /// Nothing is recorded for the prompt itself.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] unless idle.
    pub fn greet(&mut self) -> Result<(), ControllerError> {
        self.require_idle("greet")?;

        let now = chrono::Local::now();
        let time_of_day = match now.hour() {
            5..=11 => "morning",
            12..=16 => "afternoon",
            17..=20 => "evening",
            _ => "night",
        };
        let user_text = format!(
            "{} It is {} {}.",
            self.options.character.greeting_prompt(),
            now.format("%A"),
            time_of_day
        );

        self.pending = Some(PendingRequest {
            user_text,
            context: context_from(&self.conversation, self.options.context_turns),
        });
        self.set_phase(Phase::Requesting);
        Ok(())
    }

    /// Show the options menu; reveal freezes but the reply keeps streaming
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] if the menu is already open.
    pub fn open_menu(&mut self) -> Result<(), ControllerError> {
        if self.menu_open {
            return Err(self.rejected("open_menu"));
        }
        if let Some(active) = self.active.as_mut() {
            active.reveal.pause();
        }
        self.menu_open = true;
        self.emit_state();
        Ok(())
    }

    /// Hide the options menu and carry on where the reveal stopped
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] if the menu is not open.
    pub fn close_menu(&mut self) -> Result<(), ControllerError> {
        if !self.menu_open {
            return Err(self.rejected("close_menu"));
        }
        if let Some(active) = self.active.as_mut() {
            active.reveal.resume();
        }
        self.menu_open = false;
        self.emit_state();
        Ok(())
    }

    /// Reveal the current turn at once
    ///
    /// If the reply is still streaming, later chunks are shown as soon as
    /// they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InputRejected`] unless revealing.
    pub fn skip(&mut self) -> Result<(), ControllerError> {
        if self.menu_open || self.phase != Phase::Revealing {
            return Err(self.rejected("skip"));
        }
        let events = match self.active.as_mut() {
            Some(active) => active.reveal.skip(),
            None => return Err(self.rejected("skip")),
        };
        self.apply_reveal_events(events);
        Ok(())
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the engine by `elapsed`
    ///
    /// `settings` is read for this tick only.
    pub fn tick(&mut self, elapsed: Duration, settings: SessionSettings) {
        if let Some(pending) = self.pending.take() {
            self.start_request(pending, &settings);
        }

        self.drain_stream();

        if self.menu_open {
            return;
        }

        let events = match self.active.as_mut() {
            Some(active) if self.phase == Phase::Revealing => {
                active.reveal.tick(elapsed, settings.reveal_rate_per_char)
            }
            _ => return,
        };
        self.apply_reveal_events(events);
    }

    /// Cancel any in-flight request and drop the unfinished turn
    pub fn shutdown(&mut self) {
        self.pending = None;
        if let Some(mut active) = self.active.take() {
            if let Some(stream) = active.stream.as_mut() {
                stream.cancel();
            }
            tracing::info!(turn_id = %active.id, "Discarding unfinished turn on shutdown");
        }
        self.set_phase(Phase::Idle);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn start_request(&mut self, pending: PendingRequest, settings: &SessionSettings) {
        let system = self
            .options
            .character
            .render_prompt(&settings.display_name, &self.catalog);
        let request = ChatRequest::new(pending.user_text)
            .with_context(pending.context)
            .with_system(system);

        tracing::info!(
            backend = self.adapter.backend_name(),
            context_turns = request.prior_turns.len(),
            "Requesting character reply"
        );

        let stream = self.adapter.send(request);
        self.active = Some(ActiveTurn {
            id: TurnId::new(),
            stream: Some(stream),
            accumulator: SegmentAccumulator::new(),
            reveal: RevealEngine::new(settings.reveal_rate_per_char, self.options.pacing),
            started: false,
        });
        if self.menu_open {
            if let Some(active) = self.active.as_mut() {
                active.reveal.pause();
            }
        }
    }

    /// Apply every stream event that is ready, in arrival order
    fn drain_stream(&mut self) {
        loop {
            let event = match self
                .active
                .as_mut()
                .and_then(|a| a.stream.as_mut())
                .and_then(ResponseStream::try_next)
            {
                Some(event) => event,
                None => return,
            };

            match event {
                StreamEvent::Chunk(chunk) => self.on_chunk(&chunk),
                StreamEvent::Complete => self.on_complete(),
                StreamEvent::Failed(error) => {
                    tracing::warn!(error = %error, "Character reply failed");
                    self.fall_back(FallbackReason::from_error(&error), Some(&error));
                }
            }
        }
    }

    fn on_chunk(&mut self, chunk: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let parsed = active.accumulator.push(chunk);
        active.reveal.extend(self.catalog.resolve_all(parsed));

        if !active.started {
            active.started = true;
            let turn_id = active.id;
            self.emit(PresentationMessage::TurnStarted {
                turn_id,
                role: Role::Character,
            });
            self.set_phase(Phase::Revealing);
        }
    }

    fn on_complete(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let rest = active.accumulator.finish();
        active.reveal.extend(self.catalog.resolve_all(rest));
        active.stream = None;

        let visible = directive::visible_text(active.accumulator.segments());
        if visible.trim().is_empty() {
            tracing::warn!("Character reply had no visible text");
            self.fall_back(FallbackReason::Jumbled, None);
            return;
        }

        active.reveal.close();
        tracing::debug!(turn_id = %active.id, chars = visible.chars().count(), "Reply fully received");
    }

    fn apply_reveal_events(&mut self, events: Vec<RevealEvent>) {
        let Some(turn_id) = self.active.as_ref().map(|a| a.id) else {
            return;
        };

        for event in events {
            match event {
                RevealEvent::Text(delta) => self.emit(PresentationMessage::Text { turn_id, delta }),
                RevealEvent::Expression(id) => self.emit(PresentationMessage::Expression { id }),
                RevealEvent::Cue(id) => self.emit(PresentationMessage::Cue { id }),
                RevealEvent::Completed => self.finish_turn(),
            }
        }
    }

    /// Freeze the revealed reply into the conversation and history
    fn finish_turn(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        let mut turn = Turn::character(
            active.accumulator.raw_text(),
            active.accumulator.segments().to_vec(),
        );
        turn.id = active.id;
        let shown = active.reveal.visible_text();

        self.record(turn);
        self.emit(PresentationMessage::TurnFinished {
            turn_id: active.id,
            text: shown,
            fallback: false,
        });
        self.set_phase(Phase::Idle);
    }

    /// Replace the in-flight turn with a fallback line and return to idle
    fn fall_back(&mut self, reason: FallbackReason, error: Option<&BackendError>) {
        if let Some(mut active) = self.active.take() {
            if let Some(stream) = active.stream.as_mut() {
                stream.cancel();
            }
            if !active.accumulator.is_empty() {
                tracing::debug!(
                    turn_id = %active.id,
                    discarded_chars = active.accumulator.raw_text().len(),
                    "Discarding partial turn"
                );
            }
        }

        let line = reason.line();
        let expression = ExpressionId::default_expression();
        let turn = Turn::character(
            line,
            vec![
                Segment::ExpressionChange(expression.clone()),
                Segment::TextRun(line.to_string()),
            ],
        )
        .into_fallback();

        self.emit(PresentationMessage::TurnStarted {
            turn_id: turn.id,
            role: Role::Character,
        });
        self.emit(PresentationMessage::Expression { id: expression });
        self.emit(PresentationMessage::Text {
            turn_id: turn.id,
            delta: line.to_string(),
        });
        self.emit(PresentationMessage::TurnFinished {
            turn_id: turn.id,
            text: line.to_string(),
            fallback: true,
        });

        if let Some(error) = error {
            let (level, title) = match reason {
                FallbackReason::Blocked => (NotifyLevel::Error, "Request refused"),
                _ => (NotifyLevel::Warning, "Backend unavailable"),
            };
            self.notify(level, title, &error.to_string());
        }

        // Fallback lines are shown and kept in memory, never persisted.
        self.conversation.push(turn);
        self.set_phase(Phase::Idle);
    }

    /// Append to the conversation and persist; failures only notify
    fn record(&mut self, turn: Turn) {
        if let Err(e) = self.store.append(&turn) {
            self.report_persistence_error(&e);
        }
        self.conversation.push(turn);
    }

    fn report_persistence_error(&self, error: &PersistenceError) {
        tracing::warn!(error = %error, "Failed to persist turn");
        self.notify(
            NotifyLevel::Warning,
            "History not saved",
            &error.to_string(),
        );
    }

    fn require_idle(&self, verb: &'static str) -> Result<(), ControllerError> {
        if self.menu_open || self.phase != Phase::Idle || self.pending.is_some() {
            return Err(self.rejected(verb));
        }
        Ok(())
    }

    fn rejected(&self, verb: &'static str) -> ControllerError {
        let state = self.state();
        tracing::debug!(verb, ?state, "Input rejected");
        ControllerError::InputRejected { verb, state }
    }

    fn set_phase(&mut self, phase: Phase) {
        let before = self.state();
        self.phase = phase;
        if self.state() != before {
            self.emit_state();
        }
    }

    fn emit_state(&self) {
        self.emit(PresentationMessage::State {
            state: self.state(),
        });
    }

    fn notify(&self, level: NotifyLevel, title: &str, message: &str) {
        self.emit(PresentationMessage::Notify {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn emit(&self, msg: PresentationMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Presentation receiver dropped");
        }
    }
}
