use crate::{answer::Answer, quiz::ChoiceOption};

/// First option, in container order, whose display text contains the answer
/// (case-insensitive). Unusable answers match nothing.
pub fn find_match<'a>(answer: &Answer, options: &'a [ChoiceOption]) -> Option<&'a ChoiceOption> {
	if !answer.is_usable() {
		return None;
	}
	let needle = answer.as_str().to_lowercase();
	options.iter().find(|option| option.text.trim().to_lowercase().contains(&needle))
}

/// Display texts of `options`, in order, as sent with a disambiguation retry
pub fn option_texts(options: &[ChoiceOption]) -> Vec<String> {
	options.iter().map(|o| o.text.clone()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::NodeHandle;

	fn options(texts: &[&str]) -> Vec<ChoiceOption> {
		texts
			.iter()
			.enumerate()
			.map(|(i, t)| ChoiceOption {
				handle: NodeHandle(i as u64 + 1),
				text: t.to_string(),
				checked: false,
			})
			.collect()
	}

	#[test]
	fn substring_of_longer_label_matches() {
		let opts = options(&["Use the var keyword", "Use the let keyword"]);
		let hit = find_match(&Answer::normalize("let"), &opts).unwrap();
		assert_eq!(hit.handle, NodeHandle(2));
	}

	#[test]
	fn matching_is_case_insensitive() {
		let opts = options(&["var", "let", "const"]);
		assert_eq!(find_match(&Answer::normalize("LET"), &opts).unwrap().text, "let");
	}

	#[test]
	fn first_option_wins_on_ties() {
		let opts = options(&["constant", "const"]);
		assert_eq!(find_match(&Answer::normalize("const"), &opts).unwrap().handle, NodeHandle(1));
	}

	#[test]
	fn no_option_contains_answer() {
		let opts = options(&["var", "let", "const"]);
		assert!(find_match(&Answer::normalize("LET!"), &opts).is_none());
	}

	#[test]
	fn unknown_and_empty_never_match() {
		let opts = options(&["UNKNOWN", "anything"]);
		assert!(find_match(&Answer::unknown(), &opts).is_none());
		assert!(find_match(&Answer::normalize(""), &opts).is_none());
	}

	#[test]
	fn option_texts_keep_order() {
		assert_eq!(option_texts(&options(&["var", "let", "const"])), vec!["var", "let", "const"]);
	}
}
