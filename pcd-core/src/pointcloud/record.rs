use byteorder::{ByteOrder as _, LittleEndian};
use serde::Serialize;

use super::layout::{ExtraKind, RecordLayout};

/// 16-bit color channels. `nir` is only stored by layouts 8 and 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub nir: u16,
}

impl Color {
    pub fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b, nir: 0 }
    }
}

/// Classification flag bits in their extended-layout positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClassificationFlags(pub u8);

impl ClassificationFlags {
    pub const SYNTHETIC: u8 = 0b0001;
    pub const KEY_POINT: u8 = 0b0010;
    pub const WITHHELD: u8 = 0b0100;
    pub const OVERLAP: u8 = 0b1000;

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

/// Waveform packet descriptor carried by layouts 4, 5, 9 and 10.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WavePacket {
    pub descriptor_index: u8,
    pub byte_offset: u64,
    pub packet_size: u32,
    pub return_point_location: f32,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

/// One decoded point. Coordinates are the stored integers; the real-world
/// value is `x * scale + offset` using the header's scale and offset.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PointRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    pub return_number: u8,
    pub return_count: u8,
    pub scan_direction: bool,
    pub edge_of_flight_line: bool,
    pub classification: u8,
    pub classification_flags: ClassificationFlags,
    pub scanner_channel: u8,
    pub user_data: u8,
    /// Legacy layouts store a whole-degree rank (−90..90), extended
    /// layouts 0.006° increments.
    pub scan_angle: i16,
    pub point_source_id: u16,
    pub gps_time: Option<f64>,
    pub color: Option<Color>,
    pub wave_packet: Option<WavePacket>,
    pub extra_bytes: Vec<u8>,
}

impl PointRecord {
    /// Reads the extra attribute `name` as a number. Raw attributes have no
    /// numeric reading.
    pub fn extra_value(&self, layout: &RecordLayout, name: &str) -> Option<f64> {
        let (offset, attribute) = layout.extra_attribute(name)?;
        let bytes = self
            .extra_bytes
            .get(offset..offset + attribute.byte_width as usize)?;
        Some(match attribute.kind {
            ExtraKind::Raw => return None,
            ExtraKind::U8 => bytes[0] as f64,
            ExtraKind::I8 => bytes[0] as i8 as f64,
            ExtraKind::U16 => LittleEndian::read_u16(bytes) as f64,
            ExtraKind::I16 => LittleEndian::read_i16(bytes) as f64,
            ExtraKind::U32 => LittleEndian::read_u32(bytes) as f64,
            ExtraKind::I32 => LittleEndian::read_i32(bytes) as f64,
            ExtraKind::U64 => LittleEndian::read_u64(bytes) as f64,
            ExtraKind::I64 => LittleEndian::read_i64(bytes) as f64,
            ExtraKind::F32 => LittleEndian::read_f32(bytes) as f64,
            ExtraKind::F64 => LittleEndian::read_f64(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::layout::ExtraAttribute;

    #[test]
    fn classification_flags() {
        let flags = ClassificationFlags(ClassificationFlags::SYNTHETIC | ClassificationFlags::OVERLAP);
        assert!(flags.contains(ClassificationFlags::SYNTHETIC));
        assert!(flags.contains(ClassificationFlags::OVERLAP));
        assert!(!flags.contains(ClassificationFlags::WITHHELD));
    }

    #[test]
    fn extra_values_by_name() {
        let layout = RecordLayout::new(0)
            .unwrap()
            .with_extra_attributes(vec![
                ExtraAttribute::new("gain", ExtraKind::I16),
                ExtraAttribute::new("range", ExtraKind::F32),
                ExtraAttribute::raw("opaque", 2),
            ])
            .unwrap();
        let mut extra_bytes = Vec::new();
        extra_bytes.extend_from_slice(&(-7i16).to_le_bytes());
        extra_bytes.extend_from_slice(&12.5f32.to_le_bytes());
        extra_bytes.extend_from_slice(&[1, 2]);
        let record = PointRecord {
            extra_bytes,
            ..Default::default()
        };

        assert_eq!(record.extra_value(&layout, "gain"), Some(-7.0));
        assert_eq!(record.extra_value(&layout, "range"), Some(12.5));
        assert_eq!(record.extra_value(&layout, "opaque"), None);
        assert_eq!(record.extra_value(&layout, "missing"), None);
    }
}
