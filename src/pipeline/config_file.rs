//! In-place rewrite of `key = value` config files.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Sets each `(key, value)` in the config file at `path`.
///
/// Existing assignments are rewritten in place, missing keys are appended,
/// and every other line (comments and sections included) is kept as is.
pub fn rewrite_config_file(path: &Path, updates: &[(&str, &str)]) -> Result<()> {
    let original = fs::read_to_string(path)?;
    let rewritten = rewrite_config(&original, updates);
    fs::write(path, rewritten)?;
    Ok(())
}

/// String form of [`rewrite_config_file`].
pub fn rewrite_config(original: &str, updates: &[(&str, &str)]) -> String {
    let mut applied = vec![false; updates.len()];
    let mut lines: Vec<String> = Vec::new();

    for line in original.lines() {
        let replacement = assignment_key(line).and_then(|key| {
            updates
                .iter()
                .position(|(k, _)| *k == key)
                .map(|idx| (idx, updates[idx]))
        });

        match replacement {
            Some((idx, (key, value))) => {
                applied[idx] = true;
                lines.push(format!("{} = {}", key, value));
            }
            None => lines.push(line.to_string()),
        }
    }

    for ((key, value), done) in updates.iter().zip(&applied) {
        if !done {
            lines.push(format!("{} = {}", key, value));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn assignment_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}
