//! Foreground observer: turns page events and vision messages into attempts.

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::Result;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
	ProcessingState,
	answer::Answer,
	config::AppConfig,
	dom::{Element, NodeHandle},
	input::{InputDriver, Typist},
	llm::{AnswerClient, Disambiguation, FieldsetQuery},
	matcher::{find_match, option_texts},
	quiz::{ChoiceOption, FillTarget, QuizShape, is_quiz_container, plan_fill},
	sanitize::sanitize_container_html,
	session::Session,
	settings::SettingsStore,
	tracker::StateTracker,
	vision::Message,
};

/// Where the page lives, as sent to the text endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct PageLocation {
	pub url: String,
	pub locale: String,
}

/// The live document, seen through snapshots plus input primitives
#[async_trait]
pub trait Host: InputDriver {
	/// Current snapshot of a container, `None` once it left the document
	async fn snapshot(&self, container: NodeHandle) -> Result<Option<Element>>;
	/// Snapshots of every candidate container, in document order
	async fn containers(&self) -> Result<Vec<Element>>;
	async fn location(&self) -> Result<PageLocation>;
}

/// What the page bootstrap reports
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageEvent {
	/// Capture-phase click; `container` is the enclosing candidate container
	Click {
		#[serde(default)]
		container: Option<NodeHandle>,
		/// Target is a submit control
		#[serde(default)]
		submit: bool,
	},
	Key {
		key: String,
		code: String,
		#[serde(default)]
		repeat: bool,
	},
	/// A new document was loaded into the page
	Ready,
}

#[derive(Clone, Debug)]
pub struct KeyBindings {
	/// `code` that flips the kill switch
	pub toggle_code: String,
	/// `key` that requests a screenshot analysis
	pub vision_key: String,
	/// `code` that requests a screenshot analysis
	pub vision_code: String,
}

/// How applying an answer went
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FillOutcome {
	Filled,
	/// `UNKNOWN` or empty answer
	NoUsableAnswer,
	/// Answer (and the retry, if any) matched none of these options
	NoMatchingOption(Vec<ChoiceOption>),
	/// No control this answer could go into
	NoSuitableInput,
}

impl FillOutcome {
	pub fn is_filled(&self) -> bool {
		matches!(self, FillOutcome::Filled)
	}

	pub fn state(&self) -> ProcessingState {
		if self.is_filled() { ProcessingState::Filled } else { ProcessingState::Uncertain }
	}
}

enum AttemptOutcome {
	/// No text endpoint set; nothing was sent
	NotConfigured,
	Finished(FillOutcome),
}

pub struct Agent<H> {
	host: H,
	session: Arc<Session>,
	tracker: StateTracker,
	client: AnswerClient,
	settings: Arc<dyn SettingsStore>,
	typist: Typist,
	shape: QuizShape,
	keys: KeyBindings,
	worker: mpsc::Sender<Message>,
}

impl<H: Host + 'static> Agent<H> {
	pub fn new(host: H, config: &AppConfig, settings: Arc<dyn SettingsStore>, client: AnswerClient, worker: mpsc::Sender<Message>) -> Self {
		Self {
			host,
			session: Arc::new(Session::new(config.start_enabled)),
			tracker: StateTracker::new(config.settle_window()),
			client,
			settings,
			typist: Typist::new(config.reaction_delay_ms()),
			shape: config.quiz.clone(),
			keys: config.key_bindings(),
			worker,
		}
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	pub fn tracker(&self) -> &StateTracker {
		&self.tracker
	}

	pub fn host(&self) -> &H {
		&self.host
	}

	/// Drive the agent until the page event stream ends.
	///
	/// Events and vision messages are handled one at a time; attempts and
	/// vision fills run as their own tasks so the loop keeps listening.
	pub async fn run<S>(self: Arc<Self>, mut events: S, mut inbox: mpsc::Receiver<Message>)
	where
		S: Stream<Item = PageEvent> + Unpin, {
		loop {
			tokio::select! {
				event = events.next() => match event {
					Some(event) => self.handle_event(event).await,
					None => break,
				},
				Some(message) = inbox.recv() => self.handle_message(message).await,
			}
		}
		tracing::debug!("page event stream ended");
	}

	pub async fn handle_event(self: &Arc<Self>, event: PageEvent) {
		match event {
			PageEvent::Click { container, submit } => {
				if let Some(container) = container {
					self.clone().on_click(container, submit);
				}
			}
			PageEvent::Key { key, code, repeat } => self.on_key(&key, &code, repeat),
			PageEvent::Ready => {
				tracing::debug!("new document, evicting container records");
				self.tracker.evict_all();
			}
		}
	}

	/// Gate a click and, if it passes, start an attempt in its own task.
	pub fn on_click(self: Arc<Self>, container: NodeHandle, submit: bool) -> Option<tokio::task::JoinHandle<ProcessingState>> {
		if !self.session.accepts_clicks() || submit || self.tracker.is_busy(container) {
			return None;
		}
		Some(tokio::spawn(async move { self.attempt(container).await }))
	}

	fn on_key(&self, key: &str, code: &str, repeat: bool) {
		if code == self.keys.toggle_code && !repeat {
			let enabled = self.session.toggle();
			tracing::info!("{} via key {:?}", if enabled { "Enabled" } else { "Disabled" }, code);
		}
		if (key == self.keys.vision_key || code == self.keys.vision_code) && self.session.is_enabled() {
			tracing::debug!("vision key pressed, requesting screenshot analysis");
			// Never block the event loop on the worker; it may be waiting on us
			if let Err(e) = self.worker.try_send(Message::CaptureAndAnalyze) {
				tracing::error!("Failed to request screenshot analysis: {e}");
			}
		}
	}

	pub async fn handle_message(self: &Arc<Self>, message: Message) {
		match message {
			Message::VisionStart => self.session.on_vision_start(),
			Message::VisionEnd => self.session.on_vision_end(),
			Message::FillFromVision { answer } => {
				self.clone().on_vision_answer(answer).await;
			}
			Message::VisionError { error } => tracing::error!("vision analysis failed: {error}"),
			Message::CaptureAndAnalyze => tracing::trace!("observer ignores capture requests"),
		}
	}

	/// Start filling the first quiz container from a vision answer.
	///
	/// The fill phase is entered before this returns, so a `visionEnd` handled
	/// right after cannot lift suppression mid-fill.
	pub async fn on_vision_answer(self: Arc<Self>, raw: String) -> Option<tokio::task::JoinHandle<bool>> {
		if raw.trim().is_empty() {
			return None;
		}
		let target = match self.first_quiz_container().await {
			Ok(Some(c)) => c,
			Ok(None) => {
				tracing::warn!("No quiz container found for vision answer");
				return None;
			}
			Err(e) => {
				tracing::error!("Failed to look up quiz containers: {e}");
				return None;
			}
		};
		let answer = Answer::normalize(&raw).strip_code_fences();

		self.session.begin_vision_fill();
		Some(tokio::spawn(async move {
			let filled = match self.apply(&target, &answer).await {
				Ok(outcome) => {
					tracing::debug!(?outcome, "vision fill finished");
					outcome.is_filled()
				}
				Err(e) => {
					tracing::error!("vision fill failed: {e}");
					false
				}
			};
			if filled {
				self.session.disable();
			}
			self.session.finish_vision_fill();
			filled
		}))
	}

	async fn first_quiz_container(&self) -> Result<Option<Element>> {
		Ok(self.host.containers().await?.into_iter().find(|c| is_quiz_container(c, &self.shape)))
	}

	/// One event-driven attempt on `container`, start to terminal state.
	pub async fn attempt(&self, container: NodeHandle) -> ProcessingState {
		let snapshot = match self.host.snapshot(container).await {
			Ok(Some(s)) if is_quiz_container(&s, &self.shape) => s,
			Ok(_) => return ProcessingState::Unset,
			Err(e) => {
				tracing::warn!("Failed to snapshot container {container}: {e}");
				return ProcessingState::Unset;
			}
		};
		let Some(attempt) = self.tracker.admit(container) else {
			return ProcessingState::Unset;
		};
		tracing::debug!(%container, "quiz container clicked");

		let state = match self.answer_container(container, &snapshot).await {
			Ok(AttemptOutcome::NotConfigured) => {
				tracing::warn!("Set the answer endpoint first (question_helper endpoint --set <URL>)");
				attempt.abandon();
				return ProcessingState::Unset;
			}
			Ok(AttemptOutcome::Finished(outcome)) => {
				if outcome.is_filled() {
					tracing::info!("Answer filled; awaiting manual submission");
					// The user's own click on the submit control must not start another attempt
					self.session.disable();
				} else {
					tracing::warn!(?outcome, "Could not fill answer");
				}
				outcome.state()
			}
			Err(e) => {
				tracing::error!("Attempt on {container} failed: {e}");
				ProcessingState::Error
			}
		};
		attempt.complete(state);
		state
	}

	async fn answer_container(&self, container: NodeHandle, snapshot: &Element) -> Result<AttemptOutcome> {
		let endpoint = self.settings.endpoint()?;
		if endpoint.trim().is_empty() {
			return Ok(AttemptOutcome::NotConfigured);
		}
		let location = self.host.location().await?;
		let html = sanitize_container_html(snapshot);
		let query = FieldsetQuery {
			url: &location.url,
			locale: &location.locale,
			html: &html,
			retry: None,
		};
		let answer = self.client.ask_fieldset(&endpoint, &query).await?;
		tracing::debug!("service answered {:?}", answer.as_str());

		// Controls may have been re-rendered while the request was out
		let Some(current) = self.host.snapshot(container).await? else {
			tracing::warn!("Container {container} left the page before the answer arrived");
			return Ok(AttemptOutcome::Finished(FillOutcome::NoSuitableInput));
		};
		let outcome = match self.apply(&current, &answer).await? {
			FillOutcome::NoMatchingOption(options) => self.disambiguate(&endpoint, &location, &current, &answer, options).await?,
			other => other,
		};
		Ok(AttemptOutcome::Finished(outcome))
	}

	/// Apply `answer` to `container` without any retry.
	pub async fn apply(&self, container: &Element, answer: &Answer) -> Result<FillOutcome> {
		if !answer.is_usable() {
			return Ok(FillOutcome::NoUsableAnswer);
		}
		match plan_fill(container, &self.shape) {
			FillTarget::Choices(options) => match find_match(answer, &options) {
				Some(option) => {
					tracing::debug!("selecting option {:?}", option.text);
					self.typist.select_choice(&self.host, option.handle).await?;
					Ok(FillOutcome::Filled)
				}
				None => {
					tracing::warn!("No matching choice for {:?}", answer.as_str());
					Ok(FillOutcome::NoMatchingOption(options))
				}
			},
			FillTarget::FreeText(field) => {
				tracing::debug!("typing free-text answer {:?}", answer.as_str());
				self.typist.type_text(&self.host, field, answer.as_str()).await?;
				Ok(FillOutcome::Filled)
			}
			FillTarget::Unsupported => Ok(FillOutcome::NoSuitableInput),
		}
	}

	/// The single retry: resend the container with the literal options and the
	/// rejected answer. If that still matches nothing, stale selections go.
	async fn disambiguate(&self, endpoint: &str, location: &PageLocation, container: &Element, rejected: &Answer, options: Vec<ChoiceOption>) -> Result<FillOutcome> {
		let texts = option_texts(&options);
		let html = sanitize_container_html(container);
		let query = FieldsetQuery {
			url: &location.url,
			locale: &location.locale,
			html: &html,
			retry: Some(Disambiguation {
				previous_answer: rejected.as_str(),
				options: &texts,
			}),
		};

		let retried = match self.client.ask_fieldset(endpoint, &query).await {
			Ok(answer) => answer,
			Err(e) => {
				tracing::warn!("Retry failed: {e}");
				return Ok(FillOutcome::NoMatchingOption(options));
			}
		};

		if let Some(option) = find_match(&retried, &options) {
			tracing::debug!("selecting option {:?} after retry", option.text);
			self.typist.select_choice(&self.host, option.handle).await?;
			return Ok(FillOutcome::Filled);
		}

		tracing::warn!("Still no matching choice for {:?}", retried.as_str());
		for option in &options {
			self.typist.clear_choice(&self.host, option.handle).await?;
		}
		Ok(FillOutcome::NoMatchingOption(options))
	}
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
