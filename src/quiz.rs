//! Quiz detection and the answer controls inside a quiz container

use serde::{Deserialize, Serialize};

use crate::dom::{Element, NodeHandle};

/// Markup conventions that identify a quiz on the host site
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QuizShape {
	/// Tag of the element that wraps one question
	#[serde(default = "default_container_tag")]
	pub container_tag: String,
	/// Tag of the question heading inside a container
	#[serde(default = "default_heading_tag")]
	pub heading_tag: String,
	/// `name` attribute shared by every answer control
	#[serde(default = "default_answer_name")]
	pub answer_name: String,
}

fn default_container_tag() -> String {
	"fieldset".to_string()
}

fn default_heading_tag() -> String {
	"h3".to_string()
}

fn default_answer_name() -> String {
	"reponse".to_string()
}

impl Default for QuizShape {
	fn default() -> Self {
		Self {
			container_tag: default_container_tag(),
			heading_tag: default_heading_tag(),
			answer_name: default_answer_name(),
		}
	}
}

impl QuizShape {
	fn is_answer_control(&self, el: &Element) -> bool {
		el.is("input") && el.get_attr("name") == Some(self.answer_name.as_str())
	}
}

/// True iff `container` holds a question heading and at least one answer control.
pub fn is_quiz_container(container: &Element, shape: &QuizShape) -> bool {
	let descendants = container.descendants();
	descendants.iter().any(|el| el.is(&shape.heading_tag)) && descendants.iter().any(|el| shape.is_answer_control(el))
}

/// A selectable option of a choice question
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChoiceOption {
	pub handle: NodeHandle,
	/// Label text, or the control's value when it has no label
	pub text: String,
	pub checked: bool,
}

/// An answer control together with the label that encloses it, if any
#[derive(Clone, Debug)]
pub struct AnswerInput<'a> {
	pub element: &'a Element,
	enclosing_label: Option<&'a Element>,
}

impl AnswerInput<'_> {
	pub fn is_choice(&self) -> bool {
		matches!(self.element.input_type().as_str(), "radio" | "checkbox")
	}

	/// Text shown to the user for this control: `label[for=id]`, then the
	/// enclosing `<label>`, then the control's value.
	pub fn display_text(&self, container: &Element) -> String {
		let for_label = self
			.element
			.get_attr("id")
			.filter(|id| !id.is_empty())
			.and_then(|id| container.descendants().into_iter().find(|el| el.is("label") && el.get_attr("for") == Some(id)));
		let label_text = for_label.or(self.enclosing_label).map(|label| label.text_content()).filter(|t| !t.is_empty());
		let text = match label_text {
			Some(t) => t,
			None => match self.element.get_attr("value") {
				Some(v) if !v.is_empty() => v.to_string(),
				_ => self.element.live.value.clone(),
			},
		};
		text.trim().to_string()
	}
}

/// Visible answer controls of the container, in document order.
pub fn answer_inputs<'a>(container: &'a Element, shape: &QuizShape) -> Vec<AnswerInput<'a>> {
	let mut out = Vec::new();
	fn walk<'a>(el: &'a Element, label: Option<&'a Element>, shape: &QuizShape, out: &mut Vec<AnswerInput<'a>>) {
		for child in el.child_elements() {
			if shape.is_answer_control(child) && child.input_type() != "hidden" && !child.has_attr("hidden") && child.live.rendered {
				out.push(AnswerInput { element: child, enclosing_label: label });
			}
			let label = if child.is("label") { Some(child) } else { label };
			walk(child, label, shape, out);
		}
	}
	walk(container, None, shape, &mut out);
	out
}

/// How an answer can be applied to a container
#[derive(Clone, Debug, PartialEq)]
pub enum FillTarget {
	/// Several radio/checkbox controls to pick from
	Choices(Vec<ChoiceOption>),
	/// A free-text control
	FreeText(NodeHandle),
	/// Nothing we know how to fill (e.g. a lone checkbox)
	Unsupported,
}

/// Decide how to fill `container` from its current controls.
///
/// More than one choice control makes it a choice question; otherwise the
/// first control is typed into if it is not itself a choice.
pub fn plan_fill(container: &Element, shape: &QuizShape) -> FillTarget {
	let inputs: Vec<AnswerInput> = answer_inputs(container, shape).into_iter().filter(|i| i.element.handle.is_some()).collect();

	let choices: Vec<ChoiceOption> = inputs
		.iter()
		.filter(|i| i.is_choice())
		.filter_map(|i| {
			Some(ChoiceOption {
				handle: i.element.handle?,
				text: i.display_text(container),
				checked: i.element.live.checked,
			})
		})
		.collect();

	if choices.len() > 1 {
		return FillTarget::Choices(choices);
	}
	match inputs.first() {
		Some(first) if !first.is_choice() => first.element.handle.map(FillTarget::FreeText).unwrap_or(FillTarget::Unsupported),
		_ => FillTarget::Unsupported,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text_question() -> Element {
		Element::new("fieldset")
			.with_handle(1)
			.child(Element::new("legend").text("Question 1/1"))
			.child(Element::new("h3").text("Quel mot clé JavaScript pour déclarer une variable locale mutable ?"))
			.child(Element::new("label").child(Element::new("input").with_handle(2).attr("type", "text").attr("name", "reponse")))
			.child(Element::new("input").attr("type", "submit").attr("value", "Valider"))
	}

	fn radio(handle: u64, id: &str) -> Element {
		Element::new("input").with_handle(handle).attr("type", "radio").attr("name", "reponse").attr("id", id).attr("value", id)
	}

	#[test]
	fn accepts_heading_with_answer_input() {
		assert!(is_quiz_container(&text_question(), &QuizShape::default()));
	}

	#[test]
	fn rejects_missing_heading() {
		let el = Element::new("fieldset").child(Element::new("input").attr("name", "reponse"));
		assert!(!is_quiz_container(&el, &QuizShape::default()));
	}

	#[test]
	fn rejects_missing_answer_input() {
		let el = Element::new("fieldset").child(Element::new("h3").text("Q")).child(Element::new("input").attr("name", "other"));
		assert!(!is_quiz_container(&el, &QuizShape::default()));
	}

	#[test]
	fn custom_shape_is_honoured() {
		let shape = QuizShape {
			container_tag: "div".into(),
			heading_tag: "h2".into(),
			answer_name: "answer".into(),
		};
		let el = Element::new("div").child(Element::new("h2").text("Q")).child(Element::new("input").attr("name", "answer"));
		assert!(is_quiz_container(&el, &shape));
		assert!(!is_quiz_container(&el, &QuizShape::default()));
	}

	#[test]
	fn hidden_and_unrendered_inputs_are_not_answer_inputs() {
		let el = Element::new("fieldset")
			.child(Element::new("h3").text("Q"))
			.child(Element::new("input").attr("type", "hidden").attr("name", "reponse"))
			.child(Element::new("input").attr("hidden", "").attr("name", "reponse"))
			.child(Element::new("input").attr("name", "reponse").rendered(false))
			.child(Element::new("input").with_handle(9).attr("name", "reponse"));
		let inputs = answer_inputs(&el, &QuizShape::default());
		assert_eq!(inputs.len(), 1);
		assert_eq!(inputs[0].element.handle, Some(NodeHandle(9)));
	}

	#[test]
	fn display_text_prefers_for_label_then_enclosing_label_then_value() {
		let el = Element::new("fieldset")
			.child(Element::new("h3").text("Q"))
			.child(radio(1, "a"))
			.child(Element::new("label").attr("for", "a").text("  Use the let keyword "))
			.child(Element::new("label").text("Enclosed ").child(radio(2, "b")))
			.child(radio(3, "c"));
		let FillTarget::Choices(options) = plan_fill(&el, &QuizShape::default()) else {
			panic!("expected a choice question");
		};
		let texts: Vec<&str> = options.iter().map(|o| o.text.as_str()).collect();
		assert_eq!(texts, vec!["Use the let keyword", "Enclosed", "c"]);
	}

	#[test]
	fn plans_free_text() {
		assert_eq!(plan_fill(&text_question(), &QuizShape::default()), FillTarget::FreeText(NodeHandle(2)));
	}

	#[test]
	fn lone_checkbox_is_unsupported() {
		let el = Element::new("fieldset")
			.child(Element::new("h3").text("Q"))
			.child(Element::new("input").with_handle(4).attr("type", "checkbox").attr("name", "reponse"));
		assert_eq!(plan_fill(&el, &QuizShape::default()), FillTarget::Unsupported);
	}
}
