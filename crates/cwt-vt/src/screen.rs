use alacritty_terminal::term::cell::{Cell, Flags};
use alacritty_terminal::term::color::Colors;
use alacritty_terminal::vte::ansi::{Color, CursorShape as AlacCursorShape, NamedColor};

use crate::cell::{CellFlags, Rgb, StyledCell};

/// Current state of the cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub shape: CursorShape,
    pub visible: bool,
}

/// Shape of the terminal cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorShape {
    Block,
    Underline,
    Bar,
    Hidden,
}

/// An owned copy of the visible screen, detached from the terminal lock.
#[derive(Clone, Debug)]
pub struct ScreenSnapshot {
    pub rows: Vec<Vec<StyledCell>>,
    pub cursor: CursorState,
}

impl ScreenSnapshot {
    pub fn height(&self) -> u16 {
        self.rows.len() as u16
    }

    pub fn width(&self) -> u16 {
        self.rows.first().map_or(0, |r| r.len() as u16)
    }

    /// Plain text of one row with trailing blanks removed.
    pub fn row_text(&self, row: usize) -> String {
        self.rows.get(row).map(|cells| cells_to_text(cells)).unwrap_or_default()
    }

    /// Plain text of the whole screen, one line per row.
    pub fn text(&self) -> String {
        let lines: Vec<String> = self.rows.iter().map(|cells| cells_to_text(cells)).collect();
        lines.join("\n")
    }
}

pub(crate) fn cells_to_text(cells: &[StyledCell]) -> String {
    let line: String = cells
        .iter()
        .filter(|c| c.width != 0)
        .map(|c| c.ch)
        .collect();
    line.trim_end().to_string()
}

/// Resolve an alacritty color against the terminal palette.
pub(crate) fn resolve_color(color: &Color, colors: &Colors, is_fg: bool) -> Rgb {
    let fallback = if is_fg { Rgb::WHITE } else { Rgb::BLACK };
    match color {
        Color::Spec(rgb) => Rgb::new(rgb.r, rgb.g, rgb.b),
        Color::Indexed(idx) => match colors[*idx as usize] {
            Some(rgb) => Rgb::new(rgb.r, rgb.g, rgb.b),
            None => Rgb::from_index(*idx),
        },
        Color::Named(named) => {
            if let Some(rgb) = colors[*named] {
                return Rgb::new(rgb.r, rgb.g, rgb.b);
            }
            let idx = *named as usize;
            match named {
                NamedColor::Foreground | NamedColor::BrightForeground | NamedColor::Cursor => {
                    Rgb::WHITE
                }
                NamedColor::Background => Rgb::BLACK,
                NamedColor::DimForeground => Rgb::new(178, 178, 178),
                _ if idx < 16 => Rgb::from_index(idx as u8),
                _ => fallback,
            }
        }
    }
}

pub(crate) fn convert_cell(cell: &Cell, colors: &Colors) -> StyledCell {
    const FLAG_MAP: [(Flags, CellFlags); 7] = [
        (Flags::BOLD, CellFlags::BOLD),
        (Flags::ITALIC, CellFlags::ITALIC),
        (Flags::UNDERLINE, CellFlags::UNDERLINE),
        (Flags::STRIKEOUT, CellFlags::STRIKETHROUGH),
        (Flags::INVERSE, CellFlags::INVERSE),
        (Flags::DIM, CellFlags::DIM),
        (Flags::HIDDEN, CellFlags::HIDDEN),
    ];

    let flags = FLAG_MAP
        .iter()
        .filter(|(alac, _)| cell.flags.contains(*alac))
        .fold(CellFlags::empty(), |acc, (_, ours)| acc | *ours);

    let width = if cell.flags.contains(Flags::WIDE_CHAR) {
        2
    } else if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
        0
    } else {
        1
    };

    StyledCell {
        ch: cell.c,
        fg: resolve_color(&cell.fg, colors, true),
        bg: resolve_color(&cell.bg, colors, false),
        flags,
        width,
    }
}

pub(crate) fn convert_cursor_shape(shape: AlacCursorShape) -> CursorShape {
    match shape {
        AlacCursorShape::Block | AlacCursorShape::HollowBlock => CursorShape::Block,
        AlacCursorShape::Underline => CursorShape::Underline,
        AlacCursorShape::Beam => CursorShape::Bar,
        AlacCursorShape::Hidden => CursorShape::Hidden,
    }
}
