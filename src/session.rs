//! Process-wide mode flags, held in an explicit context object so every
//! handler (and every test) works on its own session.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Where the screenshot round trip stands
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VisionPhase {
	#[default]
	Idle,
	/// Worker announced a capture; event-driven attempts are suppressed
	Capturing,
	/// A vision answer is being applied; `visionEnd` must not lift suppression
	Filling,
}

#[derive(Debug, Default)]
pub struct Session {
	enabled: AtomicBool,
	vision: Mutex<VisionPhase>,
}

impl Session {
	pub fn new(enabled: bool) -> Self {
		Self {
			enabled: AtomicBool::new(enabled),
			vision: Mutex::new(VisionPhase::Idle),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::SeqCst)
	}

	/// Flip the kill switch, returning the new value
	pub fn toggle(&self) -> bool {
		!self.enabled.fetch_xor(true, Ordering::SeqCst)
	}

	pub fn disable(&self) {
		self.enabled.store(false, Ordering::SeqCst);
	}

	pub fn vision_phase(&self) -> VisionPhase {
		*self.vision.lock()
	}

	/// `visionActive`: a screenshot round trip or its fill is under way
	pub fn vision_active(&self) -> bool {
		self.vision_phase() != VisionPhase::Idle
	}

	/// `visionFilling`
	pub fn vision_filling(&self) -> bool {
		self.vision_phase() == VisionPhase::Filling
	}

	/// Event-driven attempts run only when enabled and no vision flow is active
	pub fn accepts_clicks(&self) -> bool {
		self.is_enabled() && !self.vision_active()
	}

	pub fn on_vision_start(&self) {
		let mut phase = self.vision.lock();
		if *phase != VisionPhase::Filling {
			*phase = VisionPhase::Capturing;
		}
	}

	/// Ignored while a fill is in progress; the fill lifts suppression itself.
	pub fn on_vision_end(&self) {
		let mut phase = self.vision.lock();
		if *phase != VisionPhase::Filling {
			*phase = VisionPhase::Idle;
		}
	}

	pub fn begin_vision_fill(&self) {
		*self.vision.lock() = VisionPhase::Filling;
	}

	pub fn finish_vision_fill(&self) {
		*self.vision.lock() = VisionPhase::Idle;
	}
}
