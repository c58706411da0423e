pub mod agent;
pub mod answer;
pub mod browser;
pub mod config;
pub mod dom;
pub mod input;
pub mod llm;
pub mod matcher;
pub mod quiz;
pub mod sanitize;
pub mod session;
pub mod settings;
pub mod tracker;
pub mod vision;

/// Where a quiz container stands in its current attempt
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProcessingState {
	/// No attempt recorded
	#[default]
	Unset,
	/// Admitted, waiting on the service or filling
	Pending,
	/// An answer was applied to one of the container's controls
	Filled,
	/// The service gave no usable answer, or it matched nothing
	Uncertain,
	/// The attempt failed (transport, page, or dropped mid-flight)
	Error,
}
