//! Endpoint settings shared by the page observer and the vision worker.
//! Read at the start of every attempt, never cached.

use std::path::PathBuf;

use color_eyre::{Result, eyre::eyre};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8787/api/ask";
pub const DEFAULT_VISION_ENDPOINT: &str = "http://localhost:8787/api/ask_vision";

pub trait SettingsStore: Send + Sync {
	fn endpoint(&self) -> Result<String>;
	fn vision_endpoint(&self) -> Result<String>;
	fn set_endpoint(&self, url: &str) -> Result<()>;
	fn set_vision_endpoint(&self, url: &str) -> Result<()>;
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Endpoints {
	#[serde(default = "default_endpoint")]
	pub endpoint: String,
	#[serde(default = "default_vision_endpoint")]
	pub vision_endpoint: String,
}

fn default_endpoint() -> String {
	DEFAULT_ENDPOINT.to_string()
}

fn default_vision_endpoint() -> String {
	DEFAULT_VISION_ENDPOINT.to_string()
}

impl Default for Endpoints {
	fn default() -> Self {
		Self {
			endpoint: default_endpoint(),
			vision_endpoint: default_vision_endpoint(),
		}
	}
}

/// TOML file store. A missing file reads as the defaults.
#[derive(Clone, Debug)]
pub struct FileSettings {
	path: PathBuf,
}

impl FileSettings {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$XDG_CONFIG_HOME/question_helper/settings.toml`
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|d| d.join("question_helper").join("settings.toml"))
	}

	fn read(&self) -> Result<Endpoints> {
		if !self.path.exists() {
			return Ok(Endpoints::default());
		}
		let raw = std::fs::read_to_string(&self.path).map_err(|e| eyre!("Failed to read {}: {}", self.path.display(), e))?;
		toml::from_str(&raw).map_err(|e| eyre!("Failed to parse {}: {}", self.path.display(), e))
	}

	fn update(&self, f: impl FnOnce(&mut Endpoints)) -> Result<()> {
		let mut endpoints = self.read()?;
		f(&mut endpoints);
		if let Some(dir) = self.path.parent() {
			std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create {}: {}", dir.display(), e))?;
		}
		let raw = toml::to_string_pretty(&endpoints).map_err(|e| eyre!("Failed to serialise settings: {}", e))?;
		std::fs::write(&self.path, raw).map_err(|e| eyre!("Failed to write {}: {}", self.path.display(), e))
	}
}

impl SettingsStore for FileSettings {
	fn endpoint(&self) -> Result<String> {
		Ok(self.read()?.endpoint)
	}

	fn vision_endpoint(&self) -> Result<String> {
		Ok(self.read()?.vision_endpoint)
	}

	fn set_endpoint(&self, url: &str) -> Result<()> {
		self.update(|e| e.endpoint = url.trim().to_string())
	}

	fn set_vision_endpoint(&self, url: &str) -> Result<()> {
		self.update(|e| e.vision_endpoint = url.trim().to_string())
	}
}

#[derive(Debug, Default)]
pub struct MemorySettings {
	inner: RwLock<Endpoints>,
}

impl MemorySettings {
	pub fn new(endpoints: Endpoints) -> Self {
		Self { inner: RwLock::new(endpoints) }
	}
}

impl SettingsStore for MemorySettings {
	fn endpoint(&self) -> Result<String> {
		Ok(self.inner.read().endpoint.clone())
	}

	fn vision_endpoint(&self) -> Result<String> {
		Ok(self.inner.read().vision_endpoint.clone())
	}

	fn set_endpoint(&self, url: &str) -> Result<()> {
		self.inner.write().endpoint = url.trim().to_string();
		Ok(())
	}

	fn set_vision_endpoint(&self, url: &str) -> Result<()> {
		self.inner.write().vision_endpoint = url.trim().to_string();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_reads_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let settings = FileSettings::new(dir.path().join("settings.toml"));
		assert_eq!(settings.endpoint().unwrap(), DEFAULT_ENDPOINT);
		assert_eq!(settings.vision_endpoint().unwrap(), DEFAULT_VISION_ENDPOINT);
	}

	#[test]
	fn set_is_visible_to_the_next_read() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("settings.toml");
		let settings = FileSettings::new(&path);
		settings.set_endpoint(" http://proxy.test/ask ").unwrap();

		// A second handle on the same file sees the change; nothing is cached
		let other = FileSettings::new(&path);
		assert_eq!(other.endpoint().unwrap(), "http://proxy.test/ask");
		assert_eq!(other.vision_endpoint().unwrap(), DEFAULT_VISION_ENDPOINT);
	}

	#[test]
	fn partial_file_fills_in_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("settings.toml");
		std::fs::write(&path, "endpoint = \"http://a.test\"\n").unwrap();
		let settings = FileSettings::new(&path);
		assert_eq!(settings.endpoint().unwrap(), "http://a.test");
		assert_eq!(settings.vision_endpoint().unwrap(), DEFAULT_VISION_ENDPOINT);
	}

	#[test]
	fn memory_store_round_trips() {
		let settings = MemorySettings::default();
		settings.set_vision_endpoint("http://v.test").unwrap();
		assert_eq!(settings.vision_endpoint().unwrap(), "http://v.test");
		assert_eq!(settings.endpoint().unwrap(), DEFAULT_ENDPOINT);
	}
}
