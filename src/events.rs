use std::fmt;
use std::io::{self, IsTerminal};

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Category of debug output that can be switched on with `--trace`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum)]
pub enum TraceEvent {
	/// Parsed pipelines and syntax errors.
	Parse,
	/// Descriptor plans, launched processes and built-ins.
	Commands,
	/// Reaped children and exit statuses.
	Jobs,
	/// Signal flags picked up by the main loop.
	Signals,
}

impl TraceEvent {
	fn target(self) -> &'static str {
		match self {
			TraceEvent::Parse => "parse",
			TraceEvent::Commands => "commands",
			TraceEvent::Jobs => "jobs",
			TraceEvent::Signals => "signals",
		}
	}
}

impl fmt::Display for TraceEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.target())
	}
}

fn compose_filter(enabled: &[TraceEvent]) -> Targets {
	Targets::new()
		.with_default(LevelFilter::WARN)
		.with_targets(enabled.iter().map(|event| (event.target(), LevelFilter::DEBUG)))
}

pub fn init(enabled: &[TraceEvent]) {
	let layer = tracing_subscriber::fmt::layer()
		.with_writer(io::stderr)
		.with_ansi(io::stderr().is_terminal())
		.without_time()
		.with_target(false)
		.with_filter(compose_filter(enabled));

	if tracing_subscriber::registry().with(layer).try_init().is_err() {
		eprintln!("warning: failed to initialize tracing.");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracing::Level;

	#[test]
	fn enabled_events_raise_their_target() {
		let filter = compose_filter(&[TraceEvent::Jobs]);
		assert!(filter.would_enable("jobs", &Level::DEBUG));
		assert!(!filter.would_enable("parse", &Level::DEBUG));
		assert!(filter.would_enable("parse", &Level::WARN));
	}
}
