//! Inline expansion of argument-less LaTeX macros.
//!
//! Authors define shorthands like `\newcommand{\R}{\mathbb{R}}`. Replacing
//! every use with its definition makes text from different papers more
//! uniform. Macros taking arguments are left alone.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RecordError;

static NEWCOMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\\\bnewcommand\b\*?\{(\\[a-zA-Z0-9]+?)\}\{(.*?)\}$")
        .expect("static regex is valid")
});

static DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\\def\s*(\\[a-zA-Z0-9]+?)\s*\{(.*?)\}$").expect("static regex is valid")
});

/// Collect `(name, value)` pairs in first-definition order; a redefinition
/// replaces the value but keeps the position.
pub fn collect_macros(text: &str) -> Vec<(String, String)> {
    let mut macros: Vec<(String, String)> = Vec::new();
    for re in [&*NEWCOMMAND, &*DEF] {
        for caps in re.captures_iter(text) {
            let name = caps[1].to_string();
            let value = caps[2].to_string();
            match macros.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => macros.push((name, value)),
            }
        }
    }
    macros
}

/// Replace each use of an argument-less macro with its definition.
///
/// A use is the macro name followed by a character that cannot continue the
/// name. That character is only looked at, so adjacent uses like `\R\R` both
/// expand.
pub fn expand_macros(text: &str) -> Result<String, RecordError> {
    let mut expanded = text.to_string();
    for (name, value) in collect_macros(text) {
        let usage = Regex::new(&regex::escape(&name))?;
        let mut out = String::with_capacity(expanded.len());
        let mut last = 0;
        for m in usage.find_iter(&expanded) {
            let terminated = expanded[m.end()..]
                .chars()
                .next()
                .is_some_and(|c| !c.is_ascii_alphanumeric());
            if !terminated {
                continue;
            }
            out.push_str(&expanded[last..m.start()]);
            out.push_str(&value);
            last = m.end();
        }
        out.push_str(&expanded[last..]);
        expanded = out;
    }
    Ok(expanded)
}
