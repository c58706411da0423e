//! Owned snapshot of a region of the host document.
//!
//! The page bootstrap serialises a container into this shape; everything that
//! inspects a quiz (classifier, sanitizer, fill planning) works on the snapshot
//! and never on the live page.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Page-side identity of an element. Unique within one document; the bootstrap
/// hands them out from a per-document random base.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct NodeHandle(pub u64);

impl std::fmt::Display for NodeHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Elements that never have a closing tag
const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

/// Properties that only exist on the live element, not in its markup
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LiveState {
	/// `checked` property of choice controls
	#[serde(default)]
	pub checked: bool,
	/// Whether the element takes part in layout (`offsetParent !== null`)
	#[serde(default = "default_rendered")]
	pub rendered: bool,
	/// Current `value` property of form controls
	#[serde(default)]
	pub value: String,
}

fn default_rendered() -> bool {
	true
}

impl Default for LiveState {
	fn default() -> Self {
		Self {
			checked: false,
			rendered: true,
			value: String::new(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
	/// Text node content, verbatim
	Text { text: String },
	Element(Element),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Element {
	/// Lowercase tag name
	pub tag: String,
	/// Page-side identity; `None` for elements built locally
	#[serde(default)]
	pub handle: Option<NodeHandle>,
	/// Attributes in document order
	#[serde(default)]
	pub attrs: Vec<(String, String)>,
	/// Child elements and text nodes in document order
	#[serde(default)]
	pub children: Vec<Node>,
	/// Properties read from the live element at snapshot time
	#[serde(default)]
	pub live: LiveState,
}

impl Element {
	pub fn new(tag: impl Into<String>) -> Self {
		Self {
			tag: tag.into().to_ascii_lowercase(),
			handle: None,
			attrs: Vec::new(),
			children: Vec::new(),
			live: LiveState::default(),
		}
	}

	pub fn with_handle(mut self, handle: u64) -> Self {
		self.handle = Some(NodeHandle(handle));
		self
	}

	/// Set an attribute, replacing an existing one of the same name
	pub fn attr(mut self, name: &str, value: &str) -> Self {
		self.set_attr(name, value);
		self
	}

	pub fn text(mut self, text: &str) -> Self {
		self.children.push(Node::Text { text: text.to_string() });
		self
	}

	pub fn child(mut self, child: Element) -> Self {
		self.children.push(Node::Element(child));
		self
	}

	pub fn checked(mut self, checked: bool) -> Self {
		self.live.checked = checked;
		self
	}

	pub fn rendered(mut self, rendered: bool) -> Self {
		self.live.rendered = rendered;
		self
	}

	pub fn value(mut self, value: &str) -> Self {
		self.live.value = value.to_string();
		self
	}

	pub fn get_attr(&self, name: &str) -> Option<&str> {
		self.attrs.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	pub fn has_attr(&self, name: &str) -> bool {
		self.get_attr(name).is_some()
	}

	pub fn set_attr(&mut self, name: &str, value: &str) {
		match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
			Some((_, v)) => *v = value.to_string(),
			None => self.attrs.push((name.to_ascii_lowercase(), value.to_string())),
		}
	}

	pub fn remove_attr(&mut self, name: &str) {
		self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
	}

	pub fn is(&self, tag: &str) -> bool {
		self.tag.eq_ignore_ascii_case(tag)
	}

	/// Lowercased `type` attribute, defaulting to `text` for inputs
	pub fn input_type(&self) -> String {
		self.get_attr("type").map(|t| t.trim().to_ascii_lowercase()).unwrap_or_else(|| "text".to_string())
	}

	pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
		self.children.iter().filter_map(|n| match n {
			Node::Element(e) => Some(e),
			Node::Text { .. } => None,
		})
	}

	/// All descendant elements in document order, excluding `self`
	pub fn descendants(&self) -> Vec<&Element> {
		let mut out = Vec::new();
		fn walk<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
			for child in el.child_elements() {
				out.push(child);
				walk(child, out);
			}
		}
		walk(self, &mut out);
		out
	}

	/// Concatenated text of all descendant text nodes
	pub fn text_content(&self) -> String {
		let mut out = String::new();
		fn walk(el: &Element, out: &mut String) {
			for child in &el.children {
				match child {
					Node::Text { text } => out.push_str(text),
					Node::Element(e) => walk(e, out),
				}
			}
		}
		walk(self, &mut out);
		out
	}

	/// Serialise as markup. Live state is not part of the output, the same way
	/// `outerHTML` only reflects attributes.
	pub fn outer_html(&self) -> String {
		let mut out = String::new();
		self.write_html(&mut out);
		out
	}

	fn write_html(&self, out: &mut String) {
		out.push('<');
		out.push_str(&self.tag);
		for (name, value) in &self.attrs {
			let _ = write!(out, " {name}=\"{}\"", html_escape::encode_double_quoted_attribute(value));
		}
		out.push('>');
		if VOID_ELEMENTS.contains(&self.tag.as_str()) {
			return;
		}
		for child in &self.children {
			match child {
				Node::Text { text } => out.push_str(&html_escape::encode_text(text)),
				Node::Element(e) => e.write_html(out),
			}
		}
		let _ = write!(out, "</{}>", self.tag);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serialises_void_elements_without_closing_tag() {
		let el = Element::new("label").text("A").child(Element::new("input").attr("type", "radio").attr("name", "reponse"));
		assert_eq!(el.outer_html(), r#"<label>A<input type="radio" name="reponse"></label>"#);
	}

	#[test]
	fn escapes_text_and_attributes() {
		let el = Element::new("p").attr("title", r#"say "hi""#).text("a < b & c");
		let html = el.outer_html();
		assert!(html.contains("a &lt; b &amp; c"), "{html}");
		assert!(!html.contains(r#""hi""#), "{html}");
	}

	#[test]
	fn live_value_is_not_serialised() {
		let el = Element::new("input").attr("name", "reponse").value("secret");
		assert!(!el.outer_html().contains("secret"));
	}

	#[test]
	fn text_content_concatenates_descendants() {
		let el = Element::new("div").text("Use ").child(Element::new("b").text("let")).text(" here");
		assert_eq!(el.text_content(), "Use let here");
	}

	#[test]
	fn deserialises_page_snapshot() {
		let json = r#"{
			"tag": "fieldset",
			"handle": 7,
			"attrs": [["id", "field"]],
			"children": [
				{"tag": "h3", "children": [{"text": "Question"}]},
				{"tag": "input", "handle": 8, "attrs": [["name", "reponse"]], "live": {"checked": false, "rendered": true, "value": "x"}}
			]
		}"#;
		let el: Element = serde_json::from_str(json).unwrap();
		assert_eq!(el.handle, Some(NodeHandle(7)));
		assert_eq!(el.descendants().len(), 2);
		assert_eq!(el.descendants()[1].live.value, "x");
		assert_eq!(el.text_content(), "Question");
	}
}
