use std::{
	ops::RangeInclusive,
	path::{Path, PathBuf},
	time::Duration,
};

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;

use crate::{agent::KeyBindings, quiz::QuizShape};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Whether the agent reacts to clicks right after launch (default: false)
	#[serde(default)]
	pub start_enabled: bool,
	/// Bound on every request to the answer service, in ms (default: 30000)
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
	/// How long a container stays busy after an attempt ends, in ms (default: 500)
	#[serde(default = "default_settle_window_ms")]
	pub settle_window_ms: u64,
	/// Pause between the first click into a text field and typing (default: 200..=400)
	#[serde(default = "default_reaction_delay_min_ms")]
	pub reaction_delay_min_ms: u64,
	#[serde(default = "default_reaction_delay_max_ms")]
	pub reaction_delay_max_ms: u64,
	/// `KeyboardEvent.code` of the on/off toggle (default: "ShiftLeft")
	#[serde(default = "default_toggle_key_code")]
	pub toggle_key_code: String,
	/// `KeyboardEvent.key` that requests a screenshot analysis (default: "<")
	#[serde(default = "default_vision_key")]
	pub vision_key: String,
	/// `KeyboardEvent.code` that requests a screenshot analysis (default: "IntlBackslash")
	#[serde(default = "default_vision_key_code")]
	pub vision_key_code: String,
	/// Where endpoint settings live; the per-user default if unset
	#[serde(default)]
	pub settings_path: Option<PathBuf>,
	#[serde(default)]
	pub quiz: QuizShape,
}

fn default_request_timeout_ms() -> u64 {
	30_000
}

fn default_settle_window_ms() -> u64 {
	500
}

fn default_reaction_delay_min_ms() -> u64 {
	200
}

fn default_reaction_delay_max_ms() -> u64 {
	400
}

fn default_toggle_key_code() -> String {
	"ShiftLeft".to_string()
}

fn default_vision_key() -> String {
	"<".to_string()
}

fn default_vision_key_code() -> String {
	"IntlBackslash".to_string()
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			visible: false,
			start_enabled: false,
			request_timeout_ms: default_request_timeout_ms(),
			settle_window_ms: default_settle_window_ms(),
			reaction_delay_min_ms: default_reaction_delay_min_ms(),
			reaction_delay_max_ms: default_reaction_delay_max_ms(),
			toggle_key_code: default_toggle_key_code(),
			vision_key: default_vision_key(),
			vision_key_code: default_vision_key_code(),
			settings_path: None,
			quiz: QuizShape::default(),
		}
	}
}

impl AppConfig {
	/// `$XDG_CONFIG_HOME/question_helper/config.toml`
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|d| d.join("question_helper").join("config.toml"))
	}

	/// Load from `path`; a missing file is the defaults.
	pub fn load(path: &Path) -> Result<Self> {
		if !path.exists() {
			tracing::debug!("no config at {}, using defaults", path.display());
			return Ok(Self::default());
		}
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read config {}: {}", path.display(), e))?;
		let config: Self = toml::from_str(&raw).map_err(|e| eyre!("Failed to parse config {}: {}", path.display(), e))?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.request_timeout_ms == 0 {
			return Err(eyre!("request_timeout_ms must be positive"));
		}
		if self.reaction_delay_min_ms > self.reaction_delay_max_ms {
			return Err(eyre!(
				"reaction_delay_min_ms ({}) is above reaction_delay_max_ms ({})",
				self.reaction_delay_min_ms,
				self.reaction_delay_max_ms
			));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn settle_window(&self) -> Duration {
		Duration::from_millis(self.settle_window_ms)
	}

	pub fn reaction_delay_ms(&self) -> RangeInclusive<u64> {
		self.reaction_delay_min_ms..=self.reaction_delay_max_ms
	}

	pub fn key_bindings(&self) -> KeyBindings {
		KeyBindings {
			toggle_code: self.toggle_key_code.clone(),
			vision_key: self.vision_key.clone(),
			vision_code: self.vision_key_code.clone(),
		}
	}
}
