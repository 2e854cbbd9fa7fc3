//! Bit-exact encoding of point records against a [`RecordLayout`].
//!
//! The codec never applies scale or offset, so for any record valid under a
//! layout `decode(&encode(r, l)?, l)? == r`.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    layout::{FlagStyle, RecordLayout},
    record::{ClassificationFlags, Color, PointRecord, WavePacket},
};
use crate::error::{Error, Result};

const WAVE_PACKET_WIDTH: usize = 29;

/// Classes "reserved for ASPRS definition" in legacy layouts.
fn is_reserved_legacy_class(class: u8) -> bool {
    (13..=31).contains(&class)
}

/// Classes "reserved for ASPRS definition" in extended layouts.
fn is_reserved_extended_class(class: u8) -> bool {
    (23..=63).contains(&class)
}

pub fn decode(buffer: &[u8], layout: &RecordLayout) -> Result<PointRecord> {
    let width = layout.total_width() as usize;
    if buffer.len() != width {
        return Err(Error::MalformedRecord(format!(
            "{} bytes given, layout {} records are {width} bytes",
            buffer.len(),
            layout.id
        )));
    }
    // Lengths are checked above, so reads below cannot run short.
    decode_fields(buffer, layout).map_err(|e| Error::MalformedRecord(e.to_string()))?
}

fn decode_fields(mut read: &[u8], layout: &RecordLayout) -> std::io::Result<Result<PointRecord>> {
    let mut record = PointRecord {
        x: read.read_i32::<LittleEndian>()?,
        y: read.read_i32::<LittleEndian>()?,
        z: read.read_i32::<LittleEndian>()?,
        intensity: read.read_u16::<LittleEndian>()?,
        ..Default::default()
    };

    match layout.flag_style {
        FlagStyle::Legacy => {
            let flags = read.read_u8()?;
            record.return_number = flags & 0b111;
            record.return_count = (flags >> 3) & 0b111;
            record.scan_direction = flags & 0x40 != 0;
            record.edge_of_flight_line = flags & 0x80 != 0;

            let class = read.read_u8()?;
            record.classification = class & 0b1_1111;
            record.classification_flags = ClassificationFlags(class >> 5);
            if is_reserved_legacy_class(record.classification) {
                return Ok(Err(reserved_class(record.classification, layout)));
            }
            record.scan_angle = read.read_i8()? as i16;
            record.user_data = read.read_u8()?;
            record.point_source_id = read.read_u16::<LittleEndian>()?;
        }
        FlagStyle::Extended => {
            let returns = read.read_u8()?;
            record.return_number = returns & 0x0f;
            record.return_count = returns >> 4;

            let flags = read.read_u8()?;
            record.classification_flags = ClassificationFlags(flags & 0x0f);
            record.scanner_channel = (flags >> 4) & 0b11;
            record.scan_direction = flags & 0x40 != 0;
            record.edge_of_flight_line = flags & 0x80 != 0;

            record.classification = read.read_u8()?;
            if is_reserved_extended_class(record.classification) {
                return Ok(Err(reserved_class(record.classification, layout)));
            }
            record.user_data = read.read_u8()?;
            record.scan_angle = read.read_i16::<LittleEndian>()?;
            record.point_source_id = read.read_u16::<LittleEndian>()?;
        }
    }

    if layout.has_gps_time {
        record.gps_time = Some(read.read_f64::<LittleEndian>()?);
    }
    if layout.has_color {
        let mut color = Color {
            r: read.read_u16::<LittleEndian>()?,
            g: read.read_u16::<LittleEndian>()?,
            b: read.read_u16::<LittleEndian>()?,
            nir: 0,
        };
        if layout.has_nir {
            color.nir = read.read_u16::<LittleEndian>()?;
        }
        record.color = Some(color);
    }
    if layout.has_waveform {
        record.wave_packet = Some(WavePacket {
            descriptor_index: read.read_u8()?,
            byte_offset: read.read_u64::<LittleEndian>()?,
            packet_size: read.read_u32::<LittleEndian>()?,
            return_point_location: read.read_f32::<LittleEndian>()?,
            dx: read.read_f32::<LittleEndian>()?,
            dy: read.read_f32::<LittleEndian>()?,
            dz: read.read_f32::<LittleEndian>()?,
        });
    }

    record.extra_bytes = vec![0; layout.extra_byte_count as usize];
    read.read_exact(&mut record.extra_bytes)?;
    Ok(Ok(record))
}

fn reserved_class(class: u8, layout: &RecordLayout) -> Error {
    Error::MalformedRecord(format!(
        "classification {class} is reserved in point layout {}",
        layout.id
    ))
}

pub fn encode(record: &PointRecord, layout: &RecordLayout) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(layout.total_width() as usize);
    encode_into(record, layout, &mut buffer)?;
    debug_assert_eq!(buffer.len(), layout.total_width() as usize);
    Ok(buffer)
}

/// Validates `record` completely before writing anything.
pub fn encode_into<W: Write>(record: &PointRecord, layout: &RecordLayout, mut write: W) -> Result<()> {
    let id = layout.id;
    validate(record, layout)?;

    write.write_i32::<LittleEndian>(record.x)?;
    write.write_i32::<LittleEndian>(record.y)?;
    write.write_i32::<LittleEndian>(record.z)?;
    write.write_u16::<LittleEndian>(record.intensity)?;

    let direction_bits = (record.scan_direction as u8) << 6 | (record.edge_of_flight_line as u8) << 7;
    match layout.flag_style {
        FlagStyle::Legacy => {
            write.write_u8(record.return_number | record.return_count << 3 | direction_bits)?;
            write.write_u8(record.classification | record.classification_flags.0 << 5)?;
            write.write_i8(record.scan_angle as i8)?;
            write.write_u8(record.user_data)?;
            write.write_u16::<LittleEndian>(record.point_source_id)?;
        }
        FlagStyle::Extended => {
            write.write_u8(record.return_number | record.return_count << 4)?;
            write.write_u8(record.classification_flags.0 | record.scanner_channel << 4 | direction_bits)?;
            write.write_u8(record.classification)?;
            write.write_u8(record.user_data)?;
            write.write_i16::<LittleEndian>(record.scan_angle)?;
            write.write_u16::<LittleEndian>(record.point_source_id)?;
        }
    }

    if layout.has_gps_time {
        let gps_time = record
            .gps_time
            .ok_or_else(|| Error::out_of_range("gps_time", id, "required by layout"))?;
        write.write_f64::<LittleEndian>(gps_time)?;
    }
    if layout.has_color {
        let color = record
            .color
            .ok_or_else(|| Error::out_of_range("color", id, "required by layout"))?;
        write.write_u16::<LittleEndian>(color.r)?;
        write.write_u16::<LittleEndian>(color.g)?;
        write.write_u16::<LittleEndian>(color.b)?;
        if layout.has_nir {
            write.write_u16::<LittleEndian>(color.nir)?;
        }
    }
    if layout.has_waveform {
        let packet = record
            .wave_packet
            .ok_or_else(|| Error::out_of_range("wave_packet", id, "required by layout"))?;
        let mut bytes = Vec::with_capacity(WAVE_PACKET_WIDTH);
        bytes.write_u8(packet.descriptor_index)?;
        bytes.write_u64::<LittleEndian>(packet.byte_offset)?;
        bytes.write_u32::<LittleEndian>(packet.packet_size)?;
        bytes.write_f32::<LittleEndian>(packet.return_point_location)?;
        bytes.write_f32::<LittleEndian>(packet.dx)?;
        bytes.write_f32::<LittleEndian>(packet.dy)?;
        bytes.write_f32::<LittleEndian>(packet.dz)?;
        write.write_all(&bytes)?;
    }

    write.write_all(&record.extra_bytes)?;
    Ok(())
}

fn validate(record: &PointRecord, layout: &RecordLayout) -> Result<()> {
    let id = layout.id;
    let check = |ok: bool, field: &'static str, reason: String| {
        if ok {
            Ok(())
        } else {
            Err(Error::out_of_range(field, id, reason))
        }
    };

    let (return_bits, max_class, max_flags) = match layout.flag_style {
        FlagStyle::Legacy => (3, 31, 0b111),
        FlagStyle::Extended => (4, u8::MAX, 0b1111),
    };
    let max_return = (1u8 << return_bits) - 1;
    check(
        record.return_number <= max_return,
        "return_number",
        format!("{} exceeds {return_bits} bits", record.return_number),
    )?;
    check(
        record.return_count <= max_return,
        "return_count",
        format!("{} exceeds {return_bits} bits", record.return_count),
    )?;
    check(
        record.classification <= max_class,
        "classification",
        format!("{} exceeds {max_class}", record.classification),
    )?;
    let reserved = match layout.flag_style {
        FlagStyle::Legacy => is_reserved_legacy_class(record.classification),
        FlagStyle::Extended => is_reserved_extended_class(record.classification),
    };
    check(
        !reserved,
        "classification",
        format!("{} is reserved", record.classification),
    )?;
    check(
        record.classification_flags.0 <= max_flags,
        "classification_flags",
        format!("{:#06b} has no room in this layout", record.classification_flags.0),
    )?;

    match layout.flag_style {
        FlagStyle::Legacy => {
            check(
                record.scanner_channel == 0,
                "scanner_channel",
                "legacy layouts have no scanner channel".to_string(),
            )?;
            check(
                i8::try_from(record.scan_angle).is_ok(),
                "scan_angle",
                format!("{} does not fit a signed byte", record.scan_angle),
            )?;
        }
        FlagStyle::Extended => {
            check(
                record.scanner_channel <= 0b11,
                "scanner_channel",
                format!("{} exceeds 2 bits", record.scanner_channel),
            )?;
        }
    }

    if let Some(color) = record.color {
        check(
            layout.has_nir || color.nir == 0,
            "nir",
            "layout has no near-infrared channel".to_string(),
        )?;
    }
    check(
        record.extra_bytes.len() == layout.extra_byte_count as usize,
        "extra_bytes",
        format!(
            "{} bytes given, layout carries {}",
            record.extra_bytes.len(),
            layout.extra_byte_count
        ),
    )?;
    if layout.has_gps_time && record.gps_time.is_none() {
        return Err(Error::out_of_range("gps_time", id, "required by layout"));
    }
    if layout.has_color && record.color.is_none() {
        return Err(Error::out_of_range("color", id, "required by layout"));
    }
    if layout.has_waveform && record.wave_packet.is_none() {
        return Err(Error::out_of_range("wave_packet", id, "required by layout"));
    }
    Ok(())
}

/// Reads one record of `layout.total_width()` bytes from `read`.
pub fn read_record<R: Read>(mut read: R, layout: &RecordLayout, buffer: &mut Vec<u8>) -> Result<PointRecord> {
    buffer.resize(layout.total_width() as usize, 0);
    read.read_exact(buffer)?;
    decode(buffer, layout)
}
