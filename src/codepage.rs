// Language-driver byte of the table header and the text conversion it
// selects. Single-byte DOS/Windows pages go through yore, the multi-byte
// and Macintosh pages through encoding_rs.
use std::borrow::Cow;
use std::fmt;

use yore::CodePage;
use yore::code_pages::{
    CP437, CP737, CP850, CP852, CP857, CP861, CP865, CP866, CP1250, CP1251, CP1252, CP1253,
    CP1254, CP1255, CP1256,
};

/// Language-driver code to encoding name, as stored in header byte 29.
pub const DRIVERS: &[(u8, &str)] = &[
    (0x01, "cp437"),
    (0x02, "cp850"),
    (0x03, "cp1252"),
    (0x04, "macRoman"),
    (0x64, "cp852"),
    (0x65, "cp865"),
    (0x66, "cp866"),
    (0x67, "cp861"),
    (0x68, "cp895"),
    (0x69, "cp790"),
    (0x6a, "cp737"),
    (0x6b, "cp857"),
    (0x78, "cp950"),
    (0x7a, "cp936"),
    (0x7d, "cp1255"),
    (0x7e, "cp1256"),
    (0x8b, "cp932"),
    (0x96, "macCyrillic"),
    (0x98, "macGreek"),
    (0xc8, "cp1250"),
    (0xc9, "cp1251"),
    (0xca, "cp1254"),
    (0xcb, "cp1253"),
];

pub fn encoding_name(code: u8) -> Option<&'static str> {
    DRIVERS.iter().find(|(c, _)| *c == code).map(|(_, n)| *n)
}

pub fn driver_code(name: &str) -> Option<u8> {
    DRIVERS
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(c, _)| *c)
}

/// Text conversion applied to encoded field slots and memo bodies.
///
/// `Default` means the file encoding equals the system default and bytes
/// pass through unconverted.
#[derive(Clone, Copy)]
pub enum TextCodec {
    Default,
    Oem(&'static dyn CodePage),
    Wide(&'static encoding_rs::Encoding),
}

impl TextCodec {
    /// Select the codec for a language-driver byte. Codes outside the
    /// driver table, and the recognized codes no maintained encoding
    /// implementation covers (cp895, cp790, macGreek), keep the system
    /// default.
    pub fn from_driver(code: u8) -> TextCodec {
        match code {
            0x01 => TextCodec::Oem(&CP437),
            0x02 => TextCodec::Oem(&CP850),
            0x03 => TextCodec::Oem(&CP1252),
            0x04 => TextCodec::Wide(encoding_rs::MACINTOSH),
            0x64 => TextCodec::Oem(&CP852),
            0x65 => TextCodec::Oem(&CP865),
            0x66 => TextCodec::Oem(&CP866),
            0x67 => TextCodec::Oem(&CP861),
            0x6a => TextCodec::Oem(&CP737),
            0x6b => TextCodec::Oem(&CP857),
            0x78 => TextCodec::Wide(encoding_rs::BIG5),
            0x7a => TextCodec::Wide(encoding_rs::GBK),
            0x7d => TextCodec::Oem(&CP1255),
            0x7e => TextCodec::Oem(&CP1256),
            0x8b => TextCodec::Wide(encoding_rs::SHIFT_JIS),
            0x96 => TextCodec::Wide(encoding_rs::X_MAC_CYRILLIC),
            0xc8 => TextCodec::Oem(&CP1250),
            0xc9 => TextCodec::Oem(&CP1251),
            0xca => TextCodec::Oem(&CP1254),
            0xcb => TextCodec::Oem(&CP1253),
            _ => {
                if encoding_name(code).is_some() {
                    log::debug!("no encoding implementation for driver {code:#04x}");
                }
                TextCodec::Default
            }
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, TextCodec::Default)
    }

    /// File bytes to a native string. Unmappable bytes are replaced,
    /// never reported.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextCodec::Default => String::from_utf8_lossy(bytes).into_owned(),
            TextCodec::Oem(cp) => cp.decode_lossy(bytes).into_owned(),
            TextCodec::Wide(enc) => enc.decode(bytes).0.into_owned(),
        }
    }

    /// Native string to file bytes. Unmappable characters degrade to `?`.
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            TextCodec::Default => s.as_bytes().to_vec(),
            TextCodec::Oem(cp) => match cp.encode_lossy(s, b'?') {
                Cow::Borrowed(b) => b.to_vec(),
                Cow::Owned(b) => b,
            },
            TextCodec::Wide(enc) => enc.encode(s).0.into_owned(),
        }
    }
}

impl fmt::Debug for TextCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextCodec::Default => write!(f, "TextCodec::Default"),
            TextCodec::Oem(_) => write!(f, "TextCodec::Oem"),
            TextCodec::Wide(enc) => write!(f, "TextCodec::Wide({})", enc.name()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{TextCodec, driver_code, encoding_name};

    #[test]
    fn test_driver_table_both_ways() {
        for (code, name) in super::DRIVERS {
            assert_eq!(encoding_name(*code), Some(*name));
            assert_eq!(driver_code(name), Some(*code), "{name}");
        }
        assert_eq!(encoding_name(0x00), None);
        assert_eq!(driver_code("utf-8"), None);
    }

    #[test]
    fn test_cp437_roundtrip() {
        let codec = TextCodec::from_driver(0x01);
        assert!(!codec.is_default());
        // 0x81 is u-umlaut in cp437.
        assert_eq!(codec.decode(&[0x81]), "\u{fc}");
        assert_eq!(codec.encode("\u{fc}"), vec![0x81]);
    }

    #[test]
    fn test_cp1251_roundtrip() {
        let codec = TextCodec::from_driver(0xc9);
        let bytes = codec.encode("Привет");
        assert_eq!(bytes.len(), 6);
        assert_eq!(codec.decode(&bytes), "Привет");
    }

    #[test]
    fn test_shift_jis_roundtrip() {
        let codec = TextCodec::from_driver(0x8b);
        let bytes = codec.encode("日本");
        assert_eq!(codec.decode(&bytes), "日本");
    }

    #[test]
    fn test_unimplemented_pages_fall_back() {
        assert!(TextCodec::from_driver(0x68).is_default()); // cp895
        assert!(TextCodec::from_driver(0x69).is_default()); // cp790
        assert!(TextCodec::from_driver(0x98).is_default()); // macGreek
        assert!(TextCodec::from_driver(0x00).is_default());
    }

    #[test]
    fn test_default_passthrough() {
        let codec = TextCodec::Default;
        assert_eq!(codec.encode("abc"), b"abc".to_vec());
        assert_eq!(codec.decode(b"abc"), "abc");
    }
}
