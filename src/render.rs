//! Scrollback line renderer for the CLI front end.
//!
//! Emits crossterm commands to print one display line with its colors
//! and weight. Reverse video is already folded into the effective
//! colors by the style state, so this layer only maps palette indices
//! and batches attribute changes.

use std::io::{self, Write};

use crossterm::{
    queue,
    style::{self, Attribute, SetAttribute, SetBackgroundColor, SetForegroundColor},
};

use crate::wrap::DisplayLine;

/// Map an effective palette index (0-7 normal, 8-15 bright) to a
/// crossterm color.
fn to_crossterm_color(index: u8) -> style::Color {
    match index {
        0 => style::Color::Black,
        1 => style::Color::DarkRed,
        2 => style::Color::DarkGreen,
        3 => style::Color::DarkYellow,
        4 => style::Color::DarkBlue,
        5 => style::Color::DarkMagenta,
        6 => style::Color::DarkCyan,
        7 => style::Color::Grey,
        8 => style::Color::DarkGrey,
        9 => style::Color::Red,
        10 => style::Color::Green,
        11 => style::Color::Yellow,
        12 => style::Color::Blue,
        13 => style::Color::Magenta,
        14 => style::Color::Cyan,
        15 => style::Color::White,
        n => style::Color::AnsiValue(n),
    }
}

/// Print one display line, followed by a newline and a full reset.
pub fn print_line<W: Write>(out: &mut W, line: &DisplayLine) -> io::Result<()> {
    for run in line.runs() {
        let (fg, bg) = run.style.effective_colors();
        // Reset first, then set what this run needs.
        queue!(out, SetAttribute(Attribute::Reset))?;
        queue!(out, SetForegroundColor(to_crossterm_color(fg)))?;
        if let Some(bg) = bg {
            queue!(out, SetBackgroundColor(to_crossterm_color(bg)))?;
        }
        if run.style.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        queue!(out, style::Print(&run.text))?;
    }
    queue!(
        out,
        style::ResetColor,
        SetAttribute(Attribute::Reset),
        style::Print("\n")
    )?;
    out.flush()
}
