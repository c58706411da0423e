//! Screenshot flow: the message protocol between the page observer and the
//! background worker, and the worker itself.
//!
//! The two sides share nothing but a pair of ordered channels. The worker
//! always follows `visionStart` with exactly one `visionEnd`, whatever happens
//! in between, so the observer's suppression can never get stuck.

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{llm::AnswerClient, settings::SettingsStore};

/// Every message that crosses between the observer and the worker
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
	/// observer -> worker
	CaptureAndAnalyze,
	/// worker -> observer
	VisionStart,
	/// worker -> observer
	VisionEnd,
	/// worker -> observer; the raw answer from the vision endpoint
	FillFromVision { answer: String },
	/// worker -> observer
	VisionError { error: String },
}

/// One side of the bus
#[derive(Debug)]
pub struct Link {
	pub tx: mpsc::Sender<Message>,
	pub rx: mpsc::Receiver<Message>,
}

/// Two connected ends: what one sends, the other receives, in order.
pub fn link(capacity: usize) -> (Link, Link) {
	let (a_tx, b_rx) = mpsc::channel(capacity);
	let (b_tx, a_rx) = mpsc::channel(capacity);
	(Link { tx: a_tx, rx: a_rx }, Link { tx: b_tx, rx: b_rx })
}

/// Source of viewport snapshots
#[async_trait]
pub trait Capturer: Send + Sync {
	/// Whether there is a page to capture and report back to
	async fn has_viewport(&self) -> bool;
	/// Encoded image of the currently visible viewport
	async fn capture_viewport(&self) -> Result<Vec<u8>>;
}

pub struct VisionWorker<C> {
	capturer: C,
	settings: Arc<dyn SettingsStore>,
	client: AnswerClient,
}

impl<C: Capturer> VisionWorker<C> {
	pub fn new(capturer: C, settings: Arc<dyn SettingsStore>, client: AnswerClient) -> Self {
		Self { capturer, settings, client }
	}

	/// Serve capture requests until the observer hangs up.
	pub async fn run(self, mut link: Link) {
		while let Some(message) = link.rx.recv().await {
			match message {
				Message::CaptureAndAnalyze => {
					if self.capture_and_analyze(&link.tx).await.is_err() {
						tracing::debug!("observer is gone, stopping vision worker");
						return;
					}
				}
				other => tracing::trace!(?other, "vision worker ignores message"),
			}
		}
	}

	/// Errors only when the observer can no longer be reached.
	async fn capture_and_analyze(&self, tx: &mpsc::Sender<Message>) -> Result<(), mpsc::error::SendError<Message>> {
		if !self.capturer.has_viewport().await {
			tracing::warn!("no page to capture, ignoring vision request");
			return Ok(());
		}

		tx.send(Message::VisionStart).await?;
		match self.analyze().await {
			Ok(answer) => {
				tracing::info!("vision answer: {}", answer);
				tx.send(Message::FillFromVision { answer }).await?;
			}
			Err(e) => {
				tracing::error!("vision analysis failed: {e}");
				tx.send(Message::VisionError { error: e.to_string() }).await?;
			}
		}
		tx.send(Message::VisionEnd).await
	}

	async fn analyze(&self) -> Result<String> {
		let image = self.capturer.capture_viewport().await?;
		let endpoint = self.settings.vision_endpoint()?;
		if endpoint.trim().is_empty() {
			return Err(eyre!("No vision endpoint configured"));
		}
		let answer = self.client.ask_vision(&endpoint, &image).await?;
		Ok(answer.as_str().to_string())
	}
}
