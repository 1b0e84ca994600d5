//! Attribute parsing: inline SGR escape sequences to styled text runs.
//!
//! BBS output interleaves CP437 text with ANSI "Select Graphic
//! Rendition" sequences (`ESC [ codes m`) that recolor everything after
//! them. This module scans one decoded line at a time and emits
//! (text, style) runs, carrying the style state across lines for the
//! whole life of a connection: a color set on one line still applies
//! three lines later unless an explicit reset intervenes.

use crate::cp437;

/// Default foreground: light gray (SGR 37).
const FG_DEFAULT: u8 = 37;

/// The live graphic-rendition state.
///
/// `fg` holds an SGR foreground code (30-37 normal, 90-97 bright); `bg`
/// holds an SGR background code (40-47) or `None` for the terminal
/// default. Reverse video is a flag, not a color rewrite: the stored
/// fields keep their values and the swap happens in
/// [`effective_colors`](StyleState::effective_colors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleState {
    pub bold: bool,
    pub fg: u8,
    pub bg: Option<u8>,
    pub reverse: bool,
}

impl Default for StyleState {
    fn default() -> Self {
        Self {
            bold: false,
            fg: FG_DEFAULT,
            bg: None,
            reverse: false,
        }
    }
}

impl StyleState {
    /// Effective (foreground, background) palette indices for emission.
    ///
    /// Indices are 0-7 for normal colors and 8-15 for bright ones;
    /// `None` background means the terminal default. Reverse video
    /// swaps the two, with the background falling back to black when
    /// unset.
    pub fn effective_colors(&self) -> (u8, Option<u8>) {
        let fg = fg_index(self.fg);
        let bg = self.bg.map(bg_index);
        if self.reverse {
            (bg.unwrap_or(0), Some(fg))
        } else {
            (fg, bg)
        }
    }
}

fn fg_index(code: u8) -> u8 {
    if code >= 90 {
        code - 90 + 8
    } else {
        code - 30
    }
}

fn bg_index(code: u8) -> u8 {
    code - 40
}

/// A span of decoded text with the style that was current when it was
/// scanned. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub style: StyleState,
}

/// Scans decoded lines for SGR sequences and emits styled runs.
///
/// One parser per connection: the style state survives line boundaries
/// and resets only on an explicit SGR 0 (or by constructing a fresh
/// parser on reconnect).
pub struct AttributeParser {
    parser: vte::Parser,
    style: StyleState,
}

impl AttributeParser {
    pub fn new() -> Self {
        Self {
            parser: vte::Parser::new(),
            style: StyleState::default(),
        }
    }

    /// The carried style, as it stands after the last `feed`.
    #[allow(dead_code)]
    pub fn style(&self) -> StyleState {
        self.style
    }

    /// Scan one reassembled line (terminator already removed).
    ///
    /// Raw bytes go through the CP437 table; escape bytes are ASCII and
    /// survive the decode unchanged, so sequence structure is intact
    /// when the vte state machine sees it. Returns the line's runs in
    /// order; the updated style carries into the next call.
    pub fn feed(&mut self, line: &[u8]) -> Vec<StyledRun> {
        let decoded: String = line.iter().map(|&b| cp437::decode(b)).collect();

        let mut runs = Vec::new();
        let mut performer = SgrPerformer {
            style: &mut self.style,
            runs: &mut runs,
        };
        for byte in decoded.bytes() {
            self.parser.advance(&mut performer, byte);
        }
        runs
    }
}

impl Default for AttributeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// vte performer: collects printable text into runs and applies SGR
/// parameters to the shared style state. Everything else the state
/// machine recognizes (cursor movement, erase, OSC titles, DCS) is
/// consumed without output.
struct SgrPerformer<'a> {
    style: &'a mut StyleState,
    runs: &'a mut Vec<StyledRun>,
}

impl SgrPerformer<'_> {
    fn emit(&mut self, c: char) {
        match self.runs.last_mut() {
            Some(run) if run.style == *self.style => run.text.push(c),
            _ => self.runs.push(StyledRun {
                text: c.to_string(),
                style: *self.style,
            }),
        }
    }

    fn apply_sgr(&mut self, code: u16) {
        match code {
            0 => *self.style = StyleState::default(),
            1 => {
                self.style.bold = true;
                // Bold implies a brightened foreground.
                if (30..=37).contains(&self.style.fg) {
                    self.style.fg += 60;
                }
            }
            22 => {
                self.style.bold = false;
                if (90..=97).contains(&self.style.fg) {
                    self.style.fg -= 60;
                }
            }
            7 => self.style.reverse = true,
            27 => self.style.reverse = false,
            30..=37 | 90..=97 => self.style.fg = code as u8,
            40..=47 => self.style.bg = Some(code as u8),
            _ => {} // Unknown SGR, ignore
        }
    }
}

impl vte::Perform for SgrPerformer<'_> {
    fn print(&mut self, c: char) {
        self.emit(c);
    }

    fn execute(&mut self, byte: u8) {
        // Tabs stay visible to the word wrapper as whitespace; other
        // C0 bytes (BEL and friends) carry nothing displayable.
        if byte == 0x09 {
            self.emit('\t');
        }
    }

    fn hook(&mut self, _params: &vte::Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        params: &vte::Params,
        intermediates: &[u8],
        _ignore: bool,
        action: char,
    ) {
        if action != 'm' || !intermediates.is_empty() {
            log::trace!("Ignoring CSI {:?} {:?}", intermediates, action);
            return;
        }
        let codes: Vec<u16> = params.iter().flat_map(|sub| sub.iter().copied()).collect();
        if codes.is_empty() {
            // Bare ESC[m means reset.
            self.apply_sgr(0);
        } else {
            for code in codes {
                self.apply_sgr(code);
            }
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        log::trace!("Ignoring ESC {:?} {:02x}", intermediates, byte);
    }
}
