//! Style resolution: color words, table themes and progress bar themes.
//!
//! Descriptions are whitespace-separated words (`"blue bold"`,
//! `"dots alt red"`). Every word must be recognised; leftovers are an error
//! that lists what is available. Pure lookups, no terminal access.

use crossterm::style::{Attribute, Color, ContentStyle};

use crate::error::{Result, TableError};

// ============================================================================
// STYLE TOKENS
// ============================================================================

/// A resolved color/attribute bundle applied to a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleToken(ContentStyle);

impl StyleToken {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn fg(color: Color) -> Self {
        let mut style = ContentStyle::new();
        style.foreground_color = Some(color);
        Self(style)
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.0.background_color = Some(color);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.0.attributes.set(attribute);
        self
    }

    pub fn foreground(&self) -> Option<Color> {
        self.0.foreground_color
    }

    pub fn background(&self) -> Option<Color> {
        self.0.background_color
    }

    pub fn has_attribute(&self, attribute: Attribute) -> bool {
        self.0.attributes.has(attribute)
    }

    pub fn is_plain(&self) -> bool {
        self.0 == ContentStyle::default()
    }

    /// Layer `over` on top of `self`: colors set in `over` win, attributes
    /// accumulate.
    pub fn merge(self, over: StyleToken) -> StyleToken {
        let mut merged = self.0;
        if over.0.foreground_color.is_some() {
            merged.foreground_color = over.0.foreground_color;
        }
        if over.0.background_color.is_some() {
            merged.background_color = over.0.background_color;
        }
        for attribute in Attribute::iterator() {
            if over.0.attributes.has(attribute) {
                merged.attributes.set(attribute);
            }
        }
        StyleToken(merged)
    }

    /// Wrap `text` in this style's escape codes. Plain tokens return the
    /// text untouched.
    pub fn paint(&self, text: &str) -> String {
        if self.is_plain() {
            text.to_string()
        } else {
            self.0.apply(text).to_string()
        }
    }
}

// ============================================================================
// COLOR WORDS
// ============================================================================

enum ColorWord {
    Foreground(Color),
    Attribute(Attribute),
}

const COLOR_NAMES: &[(&str, Color)] = &[
    ("black", Color::Black),
    ("red", Color::DarkRed),
    ("green", Color::DarkGreen),
    ("yellow", Color::DarkYellow),
    ("blue", Color::DarkBlue),
    ("magenta", Color::DarkMagenta),
    ("cyan", Color::DarkCyan),
    ("white", Color::Grey),
    ("grey", Color::DarkGrey),
    ("gray", Color::DarkGrey),
    ("lightblack", Color::DarkGrey),
    ("lightred", Color::Red),
    ("lightgreen", Color::Green),
    ("lightyellow", Color::Yellow),
    ("lightblue", Color::Blue),
    ("lightmagenta", Color::Magenta),
    ("lightcyan", Color::Cyan),
    ("lightwhite", Color::White),
    ("reset", Color::Reset),
];

const ATTRIBUTE_NAMES: &[(&str, Attribute)] = &[
    ("bold", Attribute::Bold),
    ("bright", Attribute::Bold),
    ("dim", Attribute::Dim),
    ("normal", Attribute::NormalIntensity),
    ("italic", Attribute::Italic),
    ("underline", Attribute::Underlined),
    ("reverse", Attribute::Reverse),
];

fn lookup_color(word: &str) -> Option<Color> {
    // `lightred_ex` is accepted as an alias of `lightred`.
    let word = word.strip_suffix("_ex").unwrap_or(word);
    COLOR_NAMES
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, color)| *color)
}

fn lookup_word(word: &str) -> Option<ColorWord> {
    let word = word.to_ascii_lowercase();
    if let Some(color) = lookup_color(&word) {
        return Some(ColorWord::Foreground(color));
    }
    ATTRIBUTE_NAMES
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, attribute)| ColorWord::Attribute(*attribute))
}

/// Comma-separated list of every accepted color and attribute word.
pub fn available_colors() -> String {
    COLOR_NAMES
        .iter()
        .map(|(name, _)| *name)
        .chain(ATTRIBUTE_NAMES.iter().map(|(name, _)| *name))
        .chain(std::iter::once("on_<color>"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a color description such as `"red bold"` or `"white on_blue"`.
///
/// An empty description is the plain style. Later colors override earlier
/// ones.
pub fn parse_color(description: &str) -> Result<StyleToken> {
    let mut token = StyleToken::plain();
    for word in description.split_whitespace() {
        let lower = word.to_ascii_lowercase();
        if let Some(background) = lower.strip_prefix("on_").and_then(lookup_color) {
            token = token.with_background(background);
            continue;
        }
        token = match lookup_word(&lower) {
            Some(ColorWord::Foreground(color)) => token.merge(StyleToken::fg(color)),
            Some(ColorWord::Attribute(attribute)) => token.with_attribute(attribute),
            None => {
                return Err(TableError::UnknownColor {
                    name: word.to_string(),
                    available: available_colors(),
                });
            }
        };
    }
    Ok(token)
}

// ============================================================================
// TABLE THEMES
// ============================================================================

/// Glyphs used to draw the table frame.
///
/// Junction names describe which arms are present: `down_right` is the
/// top-left corner, `no_up` the top tee, `all` the cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStyle {
    pub name: &'static str,
    pub cell_overflow: char,
    pub horizontal: char,
    pub vertical: char,
    pub all: char,
    pub up_left: char,
    pub up_right: char,
    pub down_left: char,
    pub down_right: char,
    pub no_left: char,
    pub no_right: char,
    pub no_up: char,
    pub no_down: char,
}

impl Default for TableStyle {
    fn default() -> Self {
        ROUND
    }
}

const fn frame(name: &'static str, overflow: char, h: char, v: char, j: [char; 9]) -> TableStyle {
    TableStyle {
        name,
        cell_overflow: overflow,
        horizontal: h,
        vertical: v,
        all: j[0],
        up_left: j[1],
        up_right: j[2],
        down_left: j[3],
        down_right: j[4],
        no_left: j[5],
        no_right: j[6],
        no_up: j[7],
        no_down: j[8],
    }
}

pub const MODERN: TableStyle = frame(
    "modern",
    '…',
    '─',
    '│',
    ['┼', '┘', '└', '┐', '┌', '├', '┤', '┬', '┴'],
);
pub const BARE: TableStyle = frame("bare", '…', '─', ' ', ['─'; 9]);
pub const ROUND: TableStyle = frame(
    "round",
    '…',
    '─',
    '│',
    ['┼', '╯', '╰', '╮', '╭', '├', '┤', '┬', '┴'],
);
pub const DOUBLE: TableStyle = frame(
    "double",
    '…',
    '═',
    '║',
    ['╬', '╝', '╚', '╗', '╔', '╠', '╣', '╦', '╩'],
);
pub const BOLD: TableStyle = frame(
    "bold",
    '…',
    '━',
    '┃',
    ['╋', '┛', '┗', '┓', '┏', '┣', '┫', '┳', '┻'],
);
pub const ASCII: TableStyle = frame("ascii", '_', '-', '|', ['+'; 9]);
pub const ASCII_BARE: TableStyle = frame("asciib", '_', '-', ' ', ['-'; 9]);
pub const HIDDEN: TableStyle = frame("hidden", ' ', ' ', ' ', [' '; 9]);

pub const TABLE_STYLES: &[TableStyle] =
    &[MODERN, BARE, ROUND, DOUBLE, BOLD, ASCII, ASCII_BARE, HIDDEN];

pub fn available_table_styles() -> String {
    TABLE_STYLES
        .iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a table theme by name.
pub fn parse_table_style(description: &str) -> Result<TableStyle> {
    let mut words = description.split_whitespace();
    let found = match (words.next(), words.next()) {
        (Some(word), None) => TABLE_STYLES
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(word)),
        _ => None,
    };
    found.copied().ok_or_else(|| TableError::UnknownStyle {
        kind: "table",
        description: description.to_string(),
        available: available_table_styles(),
    })
}

// ============================================================================
// PROGRESS BAR THEMES
// ============================================================================

/// The glyph drawn at the boundary between filled and empty cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head {
    Single(char),
    /// Partial-fill glyphs from least to most filled.
    Graded(&'static [char]),
}

impl Head {
    /// Glyph for a cell that is `fraction` (0..1) full.
    pub fn glyph(&self, fraction: f64) -> char {
        match self {
            Head::Single(c) => *c,
            Head::Graded(glyphs) => {
                let idx = (fraction * glyphs.len() as f64) as usize;
                glyphs[idx.min(glyphs.len() - 1)]
            }
        }
    }
}

struct PbarTheme {
    name: &'static str,
    filled: char,
    empty: char,
    head: Head,
}

const PBAR_THEMES: &[PbarTheme] = &[
    PbarTheme { name: "square", filled: '■', empty: '□', head: Head::Single('◩') },
    PbarTheme {
        name: "full",
        filled: '█',
        empty: ' ',
        head: Head::Graded(&['▏', '▎', '▍', '▌', '▋', '▊', '▉']),
    },
    PbarTheme {
        name: "dots",
        filled: '⣿',
        empty: '⣀',
        head: Head::Graded(&['⣄', '⣤', '⣦', '⣶', '⣷']),
    },
    PbarTheme { name: "short", filled: '▬', empty: '▭', head: Head::Single('▬') },
    PbarTheme { name: "circle", filled: '●', empty: '○', head: Head::Single('◉') },
    PbarTheme { name: "angled", filled: '▰', empty: '▱', head: Head::Single('▰') },
    PbarTheme { name: "rich", filled: '━', empty: ' ', head: Head::Single('━') },
    PbarTheme { name: "cdots", filled: 'ꞏ', empty: ' ', head: Head::Single('>') },
    PbarTheme { name: "dash", filled: '-', empty: ' ', head: Head::Single('>') },
    PbarTheme { name: "under", filled: '_', empty: ' ', head: Head::Single('_') },
    PbarTheme { name: "doubledash", filled: '=', empty: ' ', head: Head::Single('>') },
    PbarTheme { name: "hidden", filled: ' ', empty: ' ', head: Head::Single(' ') },
];

/// A resolved progress bar theme with its colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbarStyle {
    pub name: &'static str,
    pub filled: char,
    pub empty: char,
    pub head: Head,
    pub color: StyleToken,
    pub color_empty: StyleToken,
}

impl PbarStyle {
    fn from_theme(theme: &PbarTheme) -> Self {
        Self {
            name: theme.name,
            filled: theme.filled,
            empty: theme.empty,
            head: theme.head,
            color: StyleToken::plain(),
            color_empty: StyleToken::plain(),
        }
    }

    /// Default style for embedded bars (`cdots`).
    pub fn embed_default() -> Self {
        Self::from_theme(&PBAR_THEMES[7])
    }

    /// Override the filled and/or empty colors.
    pub fn with_colors(mut self, color: Option<StyleToken>, color_empty: Option<StyleToken>) -> Self {
        if let Some(color) = color {
            self.color = color;
        }
        if let Some(color_empty) = color_empty {
            self.color_empty = color_empty;
        }
        self
    }
}

/// `square`, uncolored.
impl Default for PbarStyle {
    fn default() -> Self {
        Self::from_theme(&PBAR_THEMES[0])
    }
}

pub fn available_pbar_styles() -> String {
    PBAR_THEMES
        .iter()
        .map(|t| t.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a progress bar description: one theme name plus optional
/// modifiers `alt` (empty cells drawn filled) and `clean` (empty cells
/// blank), and up to two colors (filled, then empty).
pub fn parse_pbar_style(description: &str) -> Result<PbarStyle> {
    let unknown = || TableError::UnknownStyle {
        kind: "progress bar",
        description: description.to_string(),
        available: available_pbar_styles(),
    };

    let mut theme = None;
    let mut colors = Vec::new();
    let (mut alt, mut clean) = (false, false);

    for word in description.split_whitespace() {
        let lower = word.to_ascii_lowercase();
        if let (None, Some(found)) = (theme, PBAR_THEMES.iter().find(|t| t.name == lower)) {
            theme = Some(found);
        } else if lower == "alt" {
            alt = true;
        } else if lower == "clean" {
            clean = true;
        } else if let Some(color) = lookup_color(&lower) {
            colors.push(StyleToken::fg(color));
        } else {
            return Err(unknown());
        }
    }
    let theme = theme.ok_or_else(unknown)?;
    if colors.len() > 2 {
        return Err(unknown());
    }

    let mut style = PbarStyle::from_theme(theme)
        .with_colors(colors.first().copied(), colors.get(1).copied());
    if alt {
        style.empty = style.filled;
    }
    if clean {
        style.empty = ' ';
    }
    if style.name == "rich" && colors.is_empty() {
        style.color = StyleToken::fg(Color::DarkRed);
        style.color_empty = StyleToken::fg(Color::Black);
        style.empty = style.filled;
    }
    Ok(style)
}

// ============================================================================
// STYLE ARGUMENTS
// ============================================================================

/// Either a description still to be parsed or an already resolved value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleArg<T> {
    Description(String),
    Resolved(T),
}

impl<T> From<&str> for StyleArg<T> {
    fn from(description: &str) -> Self {
        StyleArg::Description(description.to_string())
    }
}

impl<T> From<String> for StyleArg<T> {
    fn from(description: String) -> Self {
        StyleArg::Description(description)
    }
}

impl From<TableStyle> for StyleArg<TableStyle> {
    fn from(style: TableStyle) -> Self {
        StyleArg::Resolved(style)
    }
}

impl From<PbarStyle> for StyleArg<PbarStyle> {
    fn from(style: PbarStyle) -> Self {
        StyleArg::Resolved(style)
    }
}

impl From<StyleToken> for StyleArg<StyleToken> {
    fn from(token: StyleToken) -> Self {
        StyleArg::Resolved(token)
    }
}

impl From<Color> for StyleArg<StyleToken> {
    fn from(color: Color) -> Self {
        StyleArg::Resolved(StyleToken::fg(color))
    }
}

impl StyleArg<TableStyle> {
    pub fn resolve(&self) -> Result<TableStyle> {
        match self {
            StyleArg::Description(d) => parse_table_style(d),
            StyleArg::Resolved(style) => Ok(*style),
        }
    }
}

impl StyleArg<PbarStyle> {
    pub fn resolve(&self) -> Result<PbarStyle> {
        match self {
            StyleArg::Description(d) => parse_pbar_style(d),
            StyleArg::Resolved(style) => Ok(*style),
        }
    }
}

impl StyleArg<StyleToken> {
    pub fn resolve(&self) -> Result<StyleToken> {
        match self {
            StyleArg::Description(d) => parse_color(d),
            StyleArg::Resolved(token) => Ok(*token),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
