//! Split a PostgreSQL script into individually executable statements.
//!
//! The scanner is line oriented: a statement ends on a line whose trimmed text
//! ends with `;`, unless that line sits inside an open `$$ ... $$` body (a
//! function or `DO` block), in which case accumulation continues. Lines that
//! are pure `--` comments are dropped.

use std::str::Lines;

/// Dollar-quote delimiter counted on every line.
const DOLLAR_QUOTE: &str = "$$";

/// Statement terminator recognised at end of line.
const TERMINATOR: char = ';';

/// Accumulator threaded through the scan: the statement being built and the
/// number of `$$` delimiters seen since the last emitted statement.
#[derive(Debug, Clone, Default)]
pub struct SplitState {
    buffer: String,
    dollar_depth: usize,
}

impl SplitState {
    /// Feed one source line; returns a statement when this line completes one.
    pub fn feed(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            return None;
        }

        self.buffer.push_str(line);
        self.buffer.push('\n');

        // Every raw occurrence toggles depth; a line holding both the opening
        // and closing delimiter leaves parity unchanged.
        self.dollar_depth += line.matches(DOLLAR_QUOTE).count();

        if trimmed.ends_with(TERMINATOR) && self.dollar_depth % 2 == 0 {
            return self.take();
        }
        None
    }

    /// Flush whatever is left at end of input, even without a terminator.
    #[must_use]
    pub fn finish(mut self) -> Option<String> {
        self.take()
    }

    /// Whether a `$$` body is currently open.
    #[must_use]
    pub const fn in_dollar_quote(&self) -> bool {
        self.dollar_depth % 2 == 1
    }

    fn take(&mut self) -> Option<String> {
        let stmt = self.buffer.trim().to_owned();
        self.buffer.clear();
        self.dollar_depth = 0;
        (!stmt.is_empty()).then_some(stmt)
    }
}

/// Lazy iterator over the statements of a script, in source order.
///
/// Cloning the iterator before consuming it gives an independent pass over the
/// same script.
#[derive(Debug, Clone)]
pub struct Statements<'a> {
    lines: Lines<'a>,
    state: Option<SplitState>,
}

impl Iterator for Statements<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let state = self.state.as_mut()?;
        for line in self.lines.by_ref() {
            if let Some(stmt) = state.feed(line) {
                return Some(stmt);
            }
        }
        self.state.take().and_then(SplitState::finish)
    }
}

/// Start splitting `script`. An empty script yields no statements.
#[must_use]
pub fn split_statements(script: &str) -> Statements<'_> {
    Statements { lines: script.lines(), state: Some(SplitState::default()) }
}

/// Collect every statement of `script`.
#[must_use]
pub fn split_script(script: &str) -> Vec<String> {
    split_statements(script).collect()
}
