//! User prompts and notifications
//!
//! `None` from a prompt means the user cancelled.

use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;

use crate::pipeline::BatchSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Prompt {
    Destination,
    Prefix,
}

pub trait Prompter {
    fn destination_folder(&mut self) -> Option<PathBuf>;

    /// `suggestion` is offered as the default answer.
    fn prefix(&mut self, suggestion: &str) -> Option<String>;
}

pub trait Notifier {
    fn alert(&mut self, message: &str);

    fn beep(&mut self) {}

    /// Called once per artboard, once its name is known. `current` is 1-based.
    fn progress(&mut self, _current: usize, _total: usize, _artboard: &str) {}

    fn finished(&mut self, summary: &BatchSummary) {
        self.alert(&summary.message());
    }
}

/// Answers fixed up front. A prefix of `None` accepts the suggestion.
#[derive(Debug, Clone, Default)]
pub struct FixedPrompter {
    pub destination: Option<PathBuf>,
    pub prefix: Option<String>,
    pub cancel_prefix: bool,
}

impl FixedPrompter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: Some(destination.into()),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl Prompter for FixedPrompter {
    fn destination_folder(&mut self) -> Option<PathBuf> {
        self.destination.clone()
    }

    fn prefix(&mut self, suggestion: &str) -> Option<String> {
        if self.cancel_prefix {
            return None;
        }
        Some(self.prefix.clone().unwrap_or_else(|| suggestion.to_string()))
    }
}

/// Line-based prompts. An empty line accepts the default, end of input cancels.
pub struct StdioPrompter<R> {
    input: R,
    default_destination: Option<PathBuf>,
}

impl<R: BufRead> StdioPrompter<R> {
    pub fn new(input: R, default_destination: Option<PathBuf>) -> Self {
        Self { input, default_destination }
    }

    fn read_answer(&mut self, question: &str) -> Option<String> {
        eprint!("{} ", question);
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl<R: BufRead> Prompter for StdioPrompter<R> {
    fn destination_folder(&mut self) -> Option<PathBuf> {
        let hint = self
            .default_destination
            .as_ref()
            .map(|p| format!(" [{}]", p.display()))
            .unwrap_or_default();
        let answer = self.read_answer(&format!("Output folder{}:", hint))?;
        if answer.is_empty() {
            return self.default_destination.clone();
        }
        Some(PathBuf::from(answer))
    }

    fn prefix(&mut self, suggestion: &str) -> Option<String> {
        let answer = self.read_answer(&format!("Prefix for artboard names [{}]:", suggestion))?;
        if answer.is_empty() {
            return Some(suggestion.to_string());
        }
        Some(answer)
    }
}

/// Routes notifications through `tracing`.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&mut self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn beep(&mut self) {
        tracing::debug!("beep");
    }

    fn progress(&mut self, current: usize, total: usize, artboard: &str) {
        tracing::info!(current, total, artboard, "Exporting artboard");
    }

    fn finished(&mut self, summary: &BatchSummary) {
        tracing::info!("{}", summary.message());
    }
}

/// Keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub alerts: Vec<String>,
    pub beeps: usize,
    pub progress: Vec<(usize, usize, String)>,
    pub finished: Vec<String>,
}

impl Notifier for RecordingNotifier {
    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn beep(&mut self) {
        self.beeps += 1;
    }

    fn progress(&mut self, current: usize, total: usize, artboard: &str) {
        self.progress.push((current, total, artboard.to_string()));
    }

    fn finished(&mut self, summary: &BatchSummary) {
        self.finished.push(summary.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stdio_defaults_on_empty_line() {
        let mut prompter = StdioPrompter::new(Cursor::new("\n\n"), Some(PathBuf::from("/out")));
        assert_eq!(prompter.destination_folder(), Some(PathBuf::from("/out")));
        assert_eq!(prompter.prefix("Poster_"), Some("Poster_".to_string()));
    }

    #[test]
    fn test_stdio_eof_cancels() {
        let mut prompter = StdioPrompter::new(Cursor::new("/elsewhere\n"), None);
        assert_eq!(prompter.destination_folder(), Some(PathBuf::from("/elsewhere")));
        assert_eq!(prompter.prefix("Poster_"), None);
    }

    #[test]
    fn test_fixed_prompter_accepts_suggestion() {
        let mut prompter = FixedPrompter::new("/out");
        assert_eq!(prompter.prefix("Doc_"), Some("Doc_".to_string()));
        let mut prompter = FixedPrompter::new("/out").with_prefix("X-");
        assert_eq!(prompter.prefix("Doc_"), Some("X-".to_string()));
    }
}
