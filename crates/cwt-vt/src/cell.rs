use bitflags::bitflags;

/// RGB color value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Resolve an xterm-256 palette index.
    ///
    /// 0..16 are the ANSI colors, 16..232 the 6x6x6 cube, 232..256 the
    /// grayscale ramp.
    pub fn from_index(idx: u8) -> Self {
        let idx = idx as usize;
        if idx < 16 {
            return ANSI_COLORS[idx];
        }
        if idx < 232 {
            let n = idx - 16;
            let level = |v: usize| if v == 0 { 0u8 } else { (55 + 40 * v) as u8 };
            return Rgb::new(level(n / 36 % 6), level(n / 6 % 6), level(n % 6));
        }
        let v = (8 + 10 * (idx - 232)) as u8;
        Rgb::new(v, v, v)
    }
}

/// Standard xterm ANSI palette.
const ANSI_COLORS: [Rgb; 16] = [
    Rgb::new(0, 0, 0),
    Rgb::new(205, 0, 0),
    Rgb::new(0, 205, 0),
    Rgb::new(205, 205, 0),
    Rgb::new(0, 0, 238),
    Rgb::new(205, 0, 205),
    Rgb::new(0, 205, 205),
    Rgb::new(229, 229, 229),
    Rgb::new(127, 127, 127),
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(92, 92, 255),
    Rgb::new(255, 0, 255),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 255, 255),
];

bitflags! {
    /// Style attributes of a cell.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CellFlags: u8 {
        const BOLD          = 0b0000_0001;
        const ITALIC        = 0b0000_0010;
        const UNDERLINE     = 0b0000_0100;
        const STRIKETHROUGH = 0b0000_1000;
        const INVERSE       = 0b0001_0000;
        const DIM           = 0b0010_0000;
        const HIDDEN        = 0b0100_0000;
    }
}

/// One styled cell of the emulated screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledCell {
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
    pub flags: CellFlags,
    /// 1 for normal, 2 for the leading half of a wide char, 0 for its spacer.
    pub width: u8,
}

impl Default for StyledCell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Rgb::WHITE,
            bg: Rgb::BLACK,
            flags: CellFlags::empty(),
            width: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_cube_and_grayscale() {
        assert_eq!(Rgb::from_index(1), Rgb::new(205, 0, 0));
        assert_eq!(Rgb::from_index(16), Rgb::BLACK);
        assert_eq!(Rgb::from_index(231), Rgb::new(255, 255, 255));
        assert_eq!(Rgb::from_index(232), Rgb::new(8, 8, 8));
    }
}
