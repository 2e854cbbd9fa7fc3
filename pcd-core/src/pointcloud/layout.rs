use serde::Serialize;

use crate::error::{Error, Result};

/// Highest point layout id defined by LAS 1.4.
pub const MAX_LAYOUT_ID: u8 = 10;

/// How return numbers and classification flags are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlagStyle {
    /// Layouts 0–5: 3-bit returns, 5-bit class with three flag bits.
    Legacy,
    /// Layouts 6–10: 4-bit returns, separate flag byte, 8-bit class.
    Extended,
}

/// Storage type of an extra attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtraKind {
    /// Undocumented bytes of the attribute's width.
    Raw,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ExtraKind {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ExtraKind::Raw,
            1 => ExtraKind::U8,
            2 => ExtraKind::I8,
            3 => ExtraKind::U16,
            4 => ExtraKind::I16,
            5 => ExtraKind::U32,
            6 => ExtraKind::I32,
            7 => ExtraKind::U64,
            8 => ExtraKind::I64,
            9 => ExtraKind::F32,
            10 => ExtraKind::F64,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Width in bytes; `None` for raw attributes whose width is declared separately.
    pub fn width(&self) -> Option<u16> {
        match self {
            ExtraKind::Raw => None,
            ExtraKind::U8 | ExtraKind::I8 => Some(1),
            ExtraKind::U16 | ExtraKind::I16 => Some(2),
            ExtraKind::U32 | ExtraKind::I32 | ExtraKind::F32 => Some(4),
            ExtraKind::U64 | ExtraKind::I64 | ExtraKind::F64 => Some(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraAttribute {
    pub name: String,
    pub kind: ExtraKind,
    pub byte_width: u16,
}

impl ExtraAttribute {
    pub fn new(name: &str, kind: ExtraKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            byte_width: kind.width().unwrap_or(1),
        }
    }

    pub fn raw(name: &str, byte_width: u16) -> Self {
        Self {
            name: name.to_string(),
            kind: ExtraKind::Raw,
            byte_width,
        }
    }
}

/// One point record variant. The id fixes the fixed-field width and which
/// optional fields are present; extra bytes follow the fixed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordLayout {
    pub id: u8,
    pub fixed_width: u16,
    pub has_gps_time: bool,
    pub has_color: bool,
    pub has_nir: bool,
    pub has_waveform: bool,
    pub flag_style: FlagStyle,
    pub extra_byte_count: u16,
    pub extra_attributes: Vec<ExtraAttribute>,
}

impl RecordLayout {
    pub fn new(id: u8) -> Result<Self> {
        let (fixed_width, has_gps_time, has_color, has_nir, has_waveform) = match id {
            0 => (20, false, false, false, false),
            1 => (28, true, false, false, false),
            2 => (26, false, true, false, false),
            3 => (34, true, true, false, false),
            4 => (57, true, false, false, true),
            5 => (63, true, true, false, true),
            6 => (30, true, false, false, false),
            7 => (36, true, true, false, false),
            8 => (38, true, true, true, false),
            9 => (59, true, false, false, true),
            10 => (67, true, true, true, true),
            _ => return Err(Error::UnsupportedLayout(id)),
        };
        Ok(Self {
            id,
            fixed_width,
            has_gps_time,
            has_color,
            has_nir,
            has_waveform,
            flag_style: if id < 6 {
                FlagStyle::Legacy
            } else {
                FlagStyle::Extended
            },
            extra_byte_count: 0,
            extra_attributes: Vec::new(),
        })
    }

    /// Layout for a header's declared layout id and record length.
    pub fn from_record_length(id: u8, record_length: u16) -> Result<Self> {
        let layout = Self::new(id)?;
        let extra = record_length.checked_sub(layout.fixed_width).ok_or_else(|| {
            Error::MalformedHeader(format!(
                "record length {record_length} is shorter than the {} bytes of layout {id}",
                layout.fixed_width
            ))
        })?;
        Ok(layout.with_extra_bytes(extra))
    }

    /// Untyped extra bytes; clears any attribute schema.
    pub fn with_extra_bytes(mut self, count: u16) -> Self {
        self.extra_byte_count = count;
        self.extra_attributes.clear();
        self
    }

    /// Typed extra attributes. Their widths must fit the extra byte count
    /// unless it is zero, in which case the count is derived from them.
    pub fn with_extra_attributes(mut self, attributes: Vec<ExtraAttribute>) -> Result<Self> {
        let width: u32 = attributes.iter().map(|a| a.byte_width as u32).sum();
        if self.extra_byte_count == 0 {
            self.extra_byte_count = u16::try_from(width)
                .map_err(|_| Error::MalformedHeader(format!("{width} extra bytes per point")))?;
        } else if width > self.extra_byte_count as u32 {
            return Err(Error::MalformedHeader(format!(
                "extra attributes need {width} bytes, records carry {}",
                self.extra_byte_count
            )));
        }
        self.extra_attributes = attributes;
        Ok(self)
    }

    pub fn total_width(&self) -> u16 {
        self.fixed_width + self.extra_byte_count
    }

    pub fn is_extended(&self) -> bool {
        self.flag_style == FlagStyle::Extended
    }

    /// Byte offset within the extra bytes and the attribute named `name`.
    pub fn extra_attribute(&self, name: &str) -> Option<(usize, &ExtraAttribute)> {
        let mut offset = 0;
        for attribute in &self.extra_attributes {
            if attribute.name == name {
                return Some((offset, attribute));
            }
            offset += attribute.byte_width as usize;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_las_formats() {
        let widths: Vec<u16> = (0..=MAX_LAYOUT_ID)
            .map(|id| RecordLayout::new(id).unwrap().fixed_width)
            .collect();
        assert_eq!(widths, vec![20, 28, 26, 34, 57, 63, 30, 36, 38, 59, 67]);
    }

    #[test]
    fn unknown_layout_is_unsupported() {
        assert!(matches!(
            RecordLayout::new(11),
            Err(Error::UnsupportedLayout(11))
        ));
    }

    #[test]
    fn layout_three_has_gps_and_color() {
        let layout = RecordLayout::new(3).unwrap();
        assert!(layout.has_gps_time);
        assert!(layout.has_color);
        assert!(!layout.has_nir);
        assert!(!layout.has_waveform);
        assert!(!layout.is_extended());
    }

    #[test]
    fn record_length_determines_extra_bytes() {
        let layout = RecordLayout::from_record_length(1, 32).unwrap();
        assert_eq!(layout.extra_byte_count, 4);
        assert_eq!(layout.total_width(), 32);
        assert!(RecordLayout::from_record_length(1, 27).is_err());
    }

    #[test]
    fn extra_attributes_define_offsets() {
        let layout = RecordLayout::new(0)
            .unwrap()
            .with_extra_attributes(vec![
                ExtraAttribute::new("range", ExtraKind::F32),
                ExtraAttribute::raw("tag", 3),
                ExtraAttribute::new("echo", ExtraKind::U16),
            ])
            .unwrap();
        assert_eq!(layout.extra_byte_count, 9);
        assert_eq!(layout.extra_attribute("echo").unwrap().0, 7);
        assert!(layout.extra_attribute("none").is_none());

        let too_small = RecordLayout::new(0).unwrap().with_extra_bytes(2);
        assert!(too_small
            .with_extra_attributes(vec![ExtraAttribute::new("range", ExtraKind::F64)])
            .is_err());
    }
}
