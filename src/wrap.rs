//! Word wrapping of styled runs into fixed-width display lines.
//!
//! Widths count visible characters only; style metadata rides along with
//! whichever sub-line its word lands on. Lines are never padded.

use crate::ansi::{StyleState, StyledRun};

/// Default terminal width in columns.
pub const DEFAULT_COLUMNS: usize = 136;

/// One rendered row of the scrollback: styled runs whose total visible
/// length never exceeds the wrap width. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayLine {
    runs: Vec<StyledRun>,
}

impl DisplayLine {
    pub fn runs(&self) -> &[StyledRun] {
        &self.runs
    }

    /// Visible character count (style metadata excluded by construction).
    #[allow(dead_code)]
    pub fn visible_len(&self) -> usize {
        self.runs.iter().map(|r| r.text.chars().count()).sum()
    }

    /// The line's text with styling stripped.
    #[allow(dead_code)]
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    fn append(&mut self, text: &str, style: StyleState) {
        match self.runs.last_mut() {
            Some(run) if run.style == style => run.text.push_str(text),
            _ => self.runs.push(StyledRun {
                text: text.to_string(),
                style,
            }),
        }
    }

    /// Extend the last run by one space. The joining space belongs to
    /// the word before it, so no style can leak forward past what was
    /// active when that word was emitted.
    fn append_joining_space(&mut self) {
        if let Some(run) = self.runs.last_mut() {
            run.text.push(' ');
        }
    }
}

/// Wrap one logical line of styled runs to `width` columns.
///
/// Words are whitespace-separated; a word that fits joins the current
/// line with a single space, a word that does not starts the next line,
/// and a word longer than the whole width is hard-split into
/// width-sized chunks. An empty logical line still produces one (empty)
/// display line so blank lines survive into the scrollback.
pub fn wrap_runs(runs: &[StyledRun], width: usize) -> Vec<DisplayLine> {
    let width = width.max(1);
    let mut lines: Vec<DisplayLine> = Vec::new();
    let mut current = DisplayLine::default();
    let mut current_len = 0usize;

    for run in runs {
        for word in run.text.split_whitespace() {
            let word_len = word.chars().count();

            if current_len > 0 {
                if current_len + 1 + word_len <= width {
                    current.append_joining_space();
                    current.append(word, run.style);
                    current_len += 1 + word_len;
                    continue;
                }
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }

            // Start of a fresh line; oversized words hard-split here.
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                }
                let piece: String = chunk.iter().collect();
                current.append(&piece, run.style);
                current_len = chunk.len();
            }
        }
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}
