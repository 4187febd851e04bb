//! Operator decision points
//!
//! Every "continue anyway?" situation in a run goes through a
//! [`DecisionPolicy`], so the same pipeline runs interactively from a
//! terminal or headless from a script or a test.

use std::path::Path;

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};

use crate::core::database::UploadError;
use crate::core::pipeline::PipelineError;

/// Answers the yes/no questions raised while processing a batch
pub trait DecisionPolicy {
    /// Some selected fiducials are missing; average the remaining ones?
    fn accept_partial_fiducials(&self, component_id: &str, missing: &[usize]) -> bool;

    /// Linking to the registered component failed; upload the record unlinked?
    fn upload_without_link(&self, component_id: &str, error: &UploadError) -> bool;

    /// A file was rejected; go on with the rest of the batch?
    fn continue_after_failure(&self, file: &Path, error: &PipelineError) -> bool;
}

/// Fixed answers, for headless runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedPolicy {
    pub accept_partial_fiducials: bool,
    pub upload_without_link: bool,
    pub continue_after_failure: bool,
}

impl FixedPolicy {
    /// Answer yes to everything
    pub fn accept_all() -> Self {
        Self {
            accept_partial_fiducials: true,
            upload_without_link: true,
            continue_after_failure: true,
        }
    }

    /// Answer no to everything
    pub fn decline_all() -> Self {
        Self::default()
    }
}

impl DecisionPolicy for FixedPolicy {
    fn accept_partial_fiducials(&self, component_id: &str, missing: &[usize]) -> bool {
        tracing::info!(component_id, ?missing, answer = self.accept_partial_fiducials, "partial fiducials");
        self.accept_partial_fiducials
    }

    fn upload_without_link(&self, component_id: &str, error: &UploadError) -> bool {
        tracing::info!(component_id, %error, answer = self.upload_without_link, "unlinked upload");
        self.upload_without_link
    }

    fn continue_after_failure(&self, file: &Path, error: &PipelineError) -> bool {
        tracing::info!(file = %file.display(), %error, answer = self.continue_after_failure, "continue after failure");
        self.continue_after_failure
    }
}

/// Ask the operator on the terminal
///
/// A prompt that cannot be shown (no terminal, read error) counts as "no".
#[derive(Default)]
pub struct InteractivePolicy {
    theme: ColorfulTheme,
}

impl InteractivePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn confirm(&self, prompt: String) -> bool {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

impl DecisionPolicy for InteractivePolicy {
    fn accept_partial_fiducials(&self, component_id: &str, missing: &[usize]) -> bool {
        let names: Vec<String> = missing.iter().map(|i| format!("FD{}", i)).collect();
        eprintln!(
            "{} {}: fiducials {} are missing",
            style("!").yellow(),
            style(component_id).cyan(),
            names.join(", ")
        );
        self.confirm("Continue with the available points?".to_string())
    }

    fn upload_without_link(&self, component_id: &str, error: &UploadError) -> bool {
        eprintln!("{} {}", style("!").yellow(), error);
        self.confirm(format!(
            "Upload {} without component number linking?",
            component_id
        ))
    }

    fn continue_after_failure(&self, file: &Path, error: &PipelineError) -> bool {
        eprintln!(
            "{} {}: {}",
            style("✗").red(),
            file.display(),
            error
        );
        self.confirm("Skip this file and continue with the rest of the batch?".to_string())
    }
}
