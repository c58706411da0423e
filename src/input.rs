//! Human-like input synthesis on top of an [`InputDriver`]

use std::{ops::RangeInclusive, time::Duration};

use async_trait::async_trait;
use color_eyre::Result;

use crate::dom::NodeHandle;

/// Signals emitted around each typed character and at the end of typing
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputSignal {
	KeyDown { key: String },
	BeforeInput { data: String },
	Input { data: String },
	KeyUp { key: String },
	/// Value committed (`change`)
	Change,
}

/// Primitive operations on live page controls
#[async_trait]
pub trait InputDriver: Send + Sync {
	async fn focus(&self, node: NodeHandle) -> Result<()>;
	async fn click(&self, node: NodeHandle) -> Result<()>;
	/// Release focus, but only if `node` still holds it
	async fn blur_if_focused(&self, node: NodeHandle) -> Result<()>;
	async fn dispatch(&self, node: NodeHandle, signal: &InputSignal) -> Result<()>;
	/// Append one character to the control's value, without any events
	async fn append_char(&self, node: NodeHandle, ch: char) -> Result<()>;
	async fn is_checked(&self, node: NodeHandle) -> Result<bool>;
	async fn set_checked(&self, node: NodeHandle, checked: bool) -> Result<()>;
}

/// Fills controls the way a person would
#[derive(Clone, Debug)]
pub struct Typist {
	reaction_ms: RangeInclusive<u64>,
}

impl Default for Typist {
	fn default() -> Self {
		Self::new(200..=400)
	}
}

impl Typist {
	pub fn new(reaction_ms: RangeInclusive<u64>) -> Self {
		Self { reaction_ms }
	}

	fn reaction_delay(&self) -> Duration {
		let (lo, hi) = (*self.reaction_ms.start(), *self.reaction_ms.end());
		if lo >= hi { Duration::from_millis(lo) } else { Duration::from_millis(rand::random_range(lo..=hi)) }
	}

	/// Type `text` into a free-text control, one character at a time.
	pub async fn type_text<D: InputDriver + ?Sized>(&self, driver: &D, node: NodeHandle, text: &str) -> Result<()> {
		driver.focus(node).await?;
		driver.click(node).await?;
		tokio::time::sleep(self.reaction_delay()).await;

		for ch in text.chars() {
			let s = ch.to_string();
			driver.dispatch(node, &InputSignal::KeyDown { key: s.clone() }).await?;
			driver.dispatch(node, &InputSignal::BeforeInput { data: s.clone() }).await?;
			driver.append_char(node, ch).await?;
			driver.dispatch(node, &InputSignal::Input { data: s.clone() }).await?;
			driver.dispatch(node, &InputSignal::KeyUp { key: s }).await?;
		}

		driver.dispatch(node, &InputSignal::Change).await?;
		driver.blur_if_focused(node).await
	}

	/// Activate a radio/checkbox control
	pub async fn select_choice<D: InputDriver + ?Sized>(&self, driver: &D, node: NodeHandle) -> Result<()> {
		driver.focus(node).await?;
		driver.click(node).await?;
		driver.blur_if_focused(node).await
	}

	/// Undo a selection. Radio buttons ignore a click on a checked control, so
	/// the state is cleared directly when clicking did not help.
	pub async fn clear_choice<D: InputDriver + ?Sized>(&self, driver: &D, node: NodeHandle) -> Result<()> {
		if !driver.is_checked(node).await? {
			return Ok(());
		}
		self.select_choice(driver, node).await?;
		if driver.is_checked(node).await? {
			driver.set_checked(node, false).await?;
			driver.dispatch(node, &InputSignal::Change).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
pub(crate) mod testing {
	use std::collections::HashMap;

	use parking_lot::Mutex;

	use super::*;

	/// Everything a driver was asked to do, in order
	#[derive(Clone, Debug, Eq, PartialEq)]
	pub enum Op {
		Focus(NodeHandle),
		Click(NodeHandle),
		Blur(NodeHandle),
		Signal(NodeHandle, InputSignal),
		Append(NodeHandle, char),
		SetChecked(NodeHandle, bool),
	}

	/// In-memory controls: values, checked flags, radio groups and focus
	#[derive(Default)]
	pub struct RecordingDriver {
		pub ops: Mutex<Vec<Op>>,
		pub values: Mutex<HashMap<NodeHandle, String>>,
		pub checked: Mutex<HashMap<NodeHandle, bool>>,
		/// Radio controls: clicking checks and never unchecks
		pub radios: Mutex<Vec<NodeHandle>>,
		focused: Mutex<Option<NodeHandle>>,
	}

	impl RecordingDriver {
		pub fn ops(&self) -> Vec<Op> {
			self.ops.lock().clone()
		}

		pub fn value(&self, node: NodeHandle) -> String {
			self.values.lock().get(&node).cloned().unwrap_or_default()
		}

		pub fn is_checked_now(&self, node: NodeHandle) -> bool {
			self.checked.lock().get(&node).copied().unwrap_or(false)
		}

		pub fn typed_chars(&self, node: NodeHandle) -> Vec<char> {
			self.ops()
				.into_iter()
				.filter_map(|op| match op {
					Op::Append(n, c) if n == node => Some(c),
					_ => None,
				})
				.collect()
		}
	}

	#[async_trait]
	impl InputDriver for RecordingDriver {
		async fn focus(&self, node: NodeHandle) -> Result<()> {
			*self.focused.lock() = Some(node);
			self.ops.lock().push(Op::Focus(node));
			Ok(())
		}

		async fn click(&self, node: NodeHandle) -> Result<()> {
			self.ops.lock().push(Op::Click(node));
			let is_radio = self.radios.lock().contains(&node);
			let mut checked = self.checked.lock();
			if is_radio {
				let group: Vec<NodeHandle> = self.radios.lock().clone();
				for other in group {
					checked.insert(other, other == node);
				}
			} else if let Some(state) = checked.get_mut(&node) {
				*state = !*state;
			} else {
				checked.insert(node, true);
			}
			Ok(())
		}

		async fn blur_if_focused(&self, node: NodeHandle) -> Result<()> {
			let mut focused = self.focused.lock();
			if *focused == Some(node) {
				*focused = None;
				self.ops.lock().push(Op::Blur(node));
			}
			Ok(())
		}

		async fn dispatch(&self, node: NodeHandle, signal: &InputSignal) -> Result<()> {
			self.ops.lock().push(Op::Signal(node, signal.clone()));
			Ok(())
		}

		async fn append_char(&self, node: NodeHandle, ch: char) -> Result<()> {
			self.values.lock().entry(node).or_default().push(ch);
			self.ops.lock().push(Op::Append(node, ch));
			Ok(())
		}

		async fn is_checked(&self, node: NodeHandle) -> Result<bool> {
			Ok(self.is_checked_now(node))
		}

		async fn set_checked(&self, node: NodeHandle, checked: bool) -> Result<()> {
			self.checked.lock().insert(node, checked);
			self.ops.lock().push(Op::SetChecked(node, checked));
			Ok(())
		}
	}
}
