/// Parsing and emission rules selected by the header's version byte.
///
/// A dialect is resolved once at open time and passed by reference to the
/// header parser and the layout compiler. The flags never change after
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    /// The header promises a memo sidecar next to the table file.
    pub memo_expected: bool,
    /// The decimal-count byte of an N/I descriptor supplies the high byte
    /// of the field length.
    pub decimal_as_high_byte: bool,
    /// Memo values end with a single 0x1a instead of 0x1a 0x1a.
    pub single_memo_terminator: bool,
    /// FlagShip variant; changes how 2/8/10-byte V and X fields decode.
    pub flagship: bool,
}

/// Version byte written by [`crate::table::Table::create`].
pub const DEFAULT_VERSION: u8 = 0x32;

const fn d(
    name: &'static str,
    memo_expected: bool,
    decimal_as_high_byte: bool,
    single_memo_terminator: bool,
    flagship: bool,
) -> Dialect {
    Dialect {
        name,
        memo_expected,
        decimal_as_high_byte,
        single_memo_terminator,
        flagship,
    }
}

impl Dialect {
    /// Resolve the version byte to its dialect. The low-nibble wildcards
    /// x4/xC (dBASE 7) are matched after the exact codes. Unrecognized
    /// values are usable but carry no flags.
    pub fn from_version(version: u8) -> Dialect {
        match version {
            0x02 => d("FoxBASE", false, false, false, false),
            0x03 => d("dBASE III+", false, false, false, false),
            0x05 => d("dBASE V", false, false, false, false),
            0x07 => d("Visual Objects 1.x", false, false, false, false),
            0x30 => d("Visual FoxPro", false, false, false, false),
            0x31 => d("Visual FoxPro, autoincrement", false, true, false, false),
            0x32 => d("Visual FoxPro, varchar/varbinary", false, false, false, false),
            0x43 => d("FlagShip, dbv memo", false, false, true, true),
            0x63 => d("FlagShip, system", false, false, true, true),
            0x7b => d("dBASE IV with memo", true, false, false, false),
            0x83 => d("dBASE III+ with memo", true, false, false, false),
            0x87 => d("Visual Objects 1.x with memo", true, false, false, false),
            0x8b => d("dBASE IV with memo", true, false, false, false),
            0x8e => d("dBASE IV with SQL table", true, false, false, false),
            0xb3 => d("FlagShip, dbv and dbt memo", true, false, true, true),
            0xcb => d("dBASE IV SQL table with memo", true, false, false, false),
            0xe5 => d("Clipper SIX with SMT memo", true, false, true, false),
            0xf5 => d("FoxPro with memo", true, false, false, false),
            0xfb => d("FoxBASE with memo", true, false, false, false),
            _ => match version & 0x0f {
                0x04 => d("dBASE 7", false, true, false, false),
                0x0c => d("dBASE 7 with memo", true, true, false, false),
                _ => d("unknown", false, false, false, false),
            },
        }
    }
}
