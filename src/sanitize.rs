//! Markup sent to the remote service: no hidden elements, no entered values.

use crate::dom::{Element, Node};

/// Serialise a detached, cleaned copy of `container`.
///
/// Hidden elements (`type=hidden`, the `hidden` attribute, inline
/// `display:none`/`visibility:hidden`, unrendered inputs) are dropped and every
/// remaining input loses its `value` attribute.
pub fn sanitize_container_html(container: &Element) -> String {
	let mut copy = container.clone();
	scrub(&mut copy);
	copy.outer_html()
}

fn scrub(el: &mut Element) {
	el.children.retain(|child| match child {
		Node::Element(e) => !is_hidden(e),
		Node::Text { .. } => true,
	});
	if el.is("input") {
		el.remove_attr("value");
	}
	el.live.value.clear();
	for child in el.children.iter_mut() {
		if let Node::Element(e) = child {
			scrub(e);
		}
	}
}

fn is_hidden(el: &Element) -> bool {
	if el.has_attr("hidden") {
		return true;
	}
	if el.is("input") && (el.input_type() == "hidden" || !el.live.rendered) {
		return true;
	}
	el.get_attr("style").is_some_and(|style| {
		let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
		compact.contains("display:none") || compact.contains("visibility:hidden")
	})
}
