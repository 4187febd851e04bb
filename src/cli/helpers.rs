//! Shared helper functions for CLI commands

use std::path::Path;

use console::{style, StyledObject};

use crate::core::pipeline::FileState;
use crate::core::Config;
use crate::entities::{ComponentKind, Grade};

/// Truncate a string to max_len, adding "..." if truncated
///
/// Counts characters, not bytes, so paths with non-ASCII names are safe.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// File name of a path, falling back to the whole path
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Kinds selected by an optional `--type`
pub fn selected_kinds(kind: Option<ComponentKind>) -> Vec<ComponentKind> {
    match kind {
        Some(k) => vec![k],
        None => ComponentKind::ALL.to_vec(),
    }
}

pub fn styled_grade(grade: Grade) -> StyledObject<String> {
    let text = grade.to_string();
    match grade {
        Grade::A => style(text).green(),
        Grade::B => style(text).yellow(),
        Grade::C => style(text).red(),
    }
}

pub fn styled_state(state: &FileState) -> StyledObject<&'static str> {
    let label = state.label();
    match state {
        FileState::Recorded | FileState::Computed => style(label).green(),
        FileState::Failed(_) => style(label).red(),
        _ => style(label).dim(),
    }
}

/// Print configuration problems and fail if there are any
pub fn ensure_config_ready(config: &Config) -> miette::Result<()> {
    let issues = config.verify();
    if issues.is_empty() {
        return Ok(());
    }
    for issue in &issues {
        eprintln!("{} {}", style("✗").red(), issue);
    }
    Err(miette::miette!(
        help = "run `ogp config show` to see the effective configuration",
        "Configuration is incomplete ({} problem(s))",
        issues.len()
    ))
}
