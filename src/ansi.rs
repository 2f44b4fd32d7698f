//! Terminal escape sequence rendering
//!
//! Captured transcripts contain whatever the remote shell wrote: SGR color
//! codes, line clears, the odd cursor movement. [`AnsiRenderer`] turns a
//! text stream into styled spans, keeping only what a log view needs:
//! foreground color and boldness. Line-clear and cursor sequences are
//! swallowed with no visible effect; this is deliberately not a terminal
//! emulator.

use std::sync::LazyLock;

use regex::Regex;

/// Any CSI sequence: ESC [ params final-letter
static CSI_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());

/// Color and line-clear sequences, stripped before prompt matching
static COLOR_AND_CLEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[mK]").unwrap());

/// Remove color and line-clear escape sequences from text, for pattern
/// matching and plain-text logging
pub fn strip_control(text: &str) -> String {
    COLOR_AND_CLEAR.replace_all(text, "").into_owned()
}

/// Standard 8 + bright 8 foreground colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl Color {
    fn from_sgr(code: u8) -> Option<Self> {
        let color = match code {
            30 => Color::Black,
            31 => Color::Red,
            32 => Color::Green,
            33 => Color::Yellow,
            34 => Color::Blue,
            35 => Color::Magenta,
            36 => Color::Cyan,
            37 => Color::White,
            90 => Color::BrightBlack,
            91 => Color::BrightRed,
            92 => Color::BrightGreen,
            93 => Color::BrightYellow,
            94 => Color::BrightBlue,
            95 => Color::BrightMagenta,
            96 => Color::BrightCyan,
            97 => Color::BrightWhite,
            _ => return None,
        };
        Some(color)
    }

    /// The SGR foreground parameter for this color
    pub fn sgr(&self) -> u8 {
        match self {
            Color::Black => 30,
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
            Color::Magenta => 35,
            Color::Cyan => 36,
            Color::White => 37,
            Color::BrightBlack => 90,
            Color::BrightRed => 91,
            Color::BrightGreen => 92,
            Color::BrightYellow => 93,
            Color::BrightBlue => 94,
            Color::BrightMagenta => 95,
            Color::BrightCyan => 96,
            Color::BrightWhite => 97,
        }
    }
}

/// Active text style: foreground color and bold weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<Color>,
    pub bold: bool,
}

impl Style {
    pub fn is_plain(&self) -> bool {
        self.fg.is_none() && !self.bold
    }
}

/// A run of text carrying one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

/// Stateful SGR renderer
///
/// Style carries across successive chunks until a reset clears it, so a
/// color opened in one transcript line keeps applying to the next, exactly
/// as a terminal would show it.
#[derive(Debug, Default)]
pub struct AnsiRenderer {
    current: Style,
}

impl AnsiRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a chunk into styled spans, updating the carried style.
    ///
    /// SGR (`...m`) sequences update the style: 0 resets, 1 sets bold
    /// without clearing color, 30-37/90-97 replace the foreground, other
    /// parameters are ignored. Every non-SGR sequence (line clear `K`,
    /// cursor codes) is discarded.
    pub fn render(&mut self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut last_end = 0;

        for m in CSI_SEQUENCE.find_iter(text) {
            self.push_text(&mut spans, &text[last_end..m.start()]);
            self.apply_sequence(m.as_str());
            last_end = m.end();
        }
        self.push_text(&mut spans, &text[last_end..]);

        spans
    }

    fn push_text(&self, spans: &mut Vec<Span>, text: &str) {
        if text.is_empty() {
            return;
        }
        // Coalesce with the previous span when the style is unchanged.
        if let Some(last) = spans.last_mut() {
            if last.style == self.current {
                last.text.push_str(text);
                return;
            }
        }
        spans.push(Span {
            text: text.to_string(),
            style: self.current,
        });
    }

    fn apply_sequence(&mut self, seq: &str) {
        if !seq.ends_with('m') {
            return;
        }
        let params = &seq[2..seq.len() - 1];
        if params.is_empty() {
            // ESC[m is shorthand for reset
            self.current = Style::default();
            return;
        }
        for param in params.split(';') {
            match param.parse::<u8>() {
                Ok(0) => self.current = Style::default(),
                Ok(1) => self.current.bold = true,
                Ok(code) => {
                    if let Some(color) = Color::from_sgr(code) {
                        self.current.fg = Some(color);
                    }
                }
                Err(_) => {}
            }
        }
    }
}
