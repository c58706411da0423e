use std::{fmt, sync::LazyLock};

use regex::Regex;

static LINE_BREAKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n]+").expect("static regex"));
static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^```[a-z]*\n?|```$").expect("static regex"));
static BACKTICK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^`|`$").expect("static regex"));

/// A normalised answer from the remote service.
///
/// Entities are decoded, line breaks collapsed to single spaces and the
/// surrounding whitespace trimmed. [`Answer::UNKNOWN`] is never applied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Answer(String);

impl Answer {
	/// Sentinel the service returns when it has no answer
	pub const UNKNOWN: &'static str = "UNKNOWN";

	pub fn normalize(raw: &str) -> Self {
		let decoded = html_escape::decode_html_entities(raw);
		Self(LINE_BREAKS.replace_all(&decoded, " ").trim().to_string())
	}

	pub fn unknown() -> Self {
		Self(Self::UNKNOWN.to_string())
	}

	/// Non-empty and not the `UNKNOWN` sentinel
	pub fn is_usable(&self) -> bool {
		!self.0.is_empty() && self.0 != Self::UNKNOWN
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Drop the code-fence or backtick wrapping vision models like to add
	pub fn strip_code_fences(&self) -> Self {
		let unfenced = FENCE.replace_all(&self.0, "");
		let unticked = BACKTICK.replace_all(&unfenced, "");
		Self(unticked.trim().to_string())
	}
}

impl fmt::Display for Answer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_entities() {
		assert_eq!(Answer::normalize("it&#39;s").as_str(), "it's");
		assert_eq!(Answer::normalize("a &amp;&amp; b").as_str(), "a && b");
	}

	#[test]
	fn collapses_line_breaks_and_trims() {
		assert_eq!(Answer::normalize("  first\r\n\nsecond\n").as_str(), "first second");
	}

	#[test]
	fn unknown_and_empty_are_not_usable() {
		assert!(!Answer::normalize("UNKNOWN").is_usable());
		assert!(!Answer::normalize(" \n ").is_usable());
		assert!(!Answer::unknown().is_usable());
		assert!(Answer::normalize("let").is_usable());
	}

	#[test]
	fn strips_fences_and_backticks() {
		assert_eq!(Answer::normalize("```js\nlet\n```").strip_code_fences().as_str(), "let");
		assert_eq!(Answer::normalize("`const`").strip_code_fences().as_str(), "const");
		assert_eq!(Answer::normalize("plain").strip_code_fences().as_str(), "plain");
	}
}
