//! Grid file decoding.
//!
//! Two layouts are understood: the native `GSHF` layout, which carries
//! horizontal and vertical shifts, and NTv2 (`.gsb`), the format most
//! national agencies publish horizontal shifts in.

use std::io::{self, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{GridCell, GridExtent, ShiftGrid};
use crate::error::GridError;

pub const NATIVE_MAGIC: &[u8; 4] = b"GSHF";
pub const NATIVE_VERSION: u16 = 1;
const NATIVE_HEADER_SIZE: usize = 4 + 2 + 2 + 16 + 16 + 8 * 4 + 4 + 4 + 8;
const NATIVE_CELL_SIZE: usize = 6 * 4;
const DATUM_NAME_LEN: usize = 16;

const NTV2_RECORD_SIZE: usize = 16;
const NTV2_OVERVIEW_RECORDS: usize = 11;
const NTV2_SUBGRID_RECORDS: usize = 11;

/// Decodes a grid file, choosing the layout by its leading bytes.
/// `subgrid` names an NTv2 sub-grid and is ignored for native files.
pub fn read_grid(identifier: &str, bytes: &[u8], subgrid: Option<&str>) -> Result<ShiftGrid, GridError> {
    if bytes.starts_with(NATIVE_MAGIC) {
        read_native(identifier, bytes)
    } else if bytes.starts_with(b"NUM_OREC") {
        read_ntv2(identifier, bytes, subgrid)
    } else {
        Err(GridError::corrupt(identifier, "unrecognised grid file signature"))
    }
}

pub fn read_native(identifier: &str, bytes: &[u8]) -> Result<ShiftGrid, GridError> {
    let truncated = |_| GridError::corrupt(identifier, "truncated header");
    if bytes.len() < NATIVE_HEADER_SIZE || !bytes.starts_with(NATIVE_MAGIC) {
        return Err(GridError::corrupt(identifier, "missing GSHF header"));
    }

    let mut read = &bytes[4..];
    let version = read.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != NATIVE_VERSION {
        return Err(GridError::corrupt(identifier, format!("unsupported version {version}")));
    }
    let _reserved = read.read_u16::<LittleEndian>().map_err(truncated)?;
    let source_datum = fixed_string(&read[..DATUM_NAME_LEN]);
    let target_datum = fixed_string(&read[DATUM_NAME_LEN..2 * DATUM_NAME_LEN]);
    read = &read[2 * DATUM_NAME_LEN..];

    let lat_origin = read.read_f64::<LittleEndian>().map_err(truncated)?;
    let lng_origin = read.read_f64::<LittleEndian>().map_err(truncated)?;
    let lat_step = read.read_f64::<LittleEndian>().map_err(truncated)?;
    let lng_step = read.read_f64::<LittleEndian>().map_err(truncated)?;
    let rows = read.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let columns = read.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let declared = read.read_u64::<LittleEndian>().map_err(truncated)?;

    if declared != (rows as u64) * (columns as u64) {
        return Err(GridError::corrupt(
            identifier,
            format!("{declared} cells declared for {rows} x {columns} nodes"),
        ));
    }
    let payload = usize::try_from(declared)
        .ok()
        .and_then(|cells| cells.checked_mul(NATIVE_CELL_SIZE))
        .ok_or_else(|| GridError::corrupt(identifier, format!("{rows} x {columns} nodes overflow")))?;
    if read.len() < payload {
        return Err(GridError::corrupt(
            identifier,
            format!("{} bytes of cell data, {payload} expected", read.len()),
        ));
    }

    let mut cells = Vec::with_capacity(payload / NATIVE_CELL_SIZE);
    for chunk in read[..payload].chunks_exact(NATIVE_CELL_SIZE) {
        let value = |i: usize| LittleEndian::read_f32(&chunk[i * 4..i * 4 + 4]) as f64;
        cells.push(GridCell {
            shift_lng: value(0),
            shift_lat: value(1),
            shift_height: value(2),
            accuracy_lng: value(3),
            accuracy_lat: value(4),
            accuracy_height: value(5),
        });
    }

    let extent = GridExtent {
        lat_origin,
        lng_origin,
        lat_step,
        lng_step,
        rows,
        columns,
    };
    Ok(ShiftGrid::new(identifier, extent, cells)?.with_datums(&source_datum, &target_datum))
}

/// Writes `grid` in the native layout. Cell values are stored as `f32`.
pub fn write_native<W: Write>(grid: &ShiftGrid, mut write: W) -> io::Result<()> {
    let extent = grid.extent();
    write.write_all(NATIVE_MAGIC)?;
    write.write_u16::<LittleEndian>(NATIVE_VERSION)?;
    write.write_u16::<LittleEndian>(0)?;
    write.write_all(&fixed_bytes::<DATUM_NAME_LEN>(grid.source_datum()))?;
    write.write_all(&fixed_bytes::<DATUM_NAME_LEN>(grid.target_datum()))?;
    write.write_f64::<LittleEndian>(extent.lat_origin)?;
    write.write_f64::<LittleEndian>(extent.lng_origin)?;
    write.write_f64::<LittleEndian>(extent.lat_step)?;
    write.write_f64::<LittleEndian>(extent.lng_step)?;
    write.write_u32::<LittleEndian>(extent.rows as u32)?;
    write.write_u32::<LittleEndian>(extent.columns as u32)?;
    write.write_u64::<LittleEndian>(grid.cells().len() as u64)?;
    for cell in grid.cells() {
        for value in [
            cell.shift_lng,
            cell.shift_lat,
            cell.shift_height,
            cell.accuracy_lng,
            cell.accuracy_lat,
            cell.accuracy_height,
        ] {
            write.write_f32::<LittleEndian>(value as f32)?;
        }
    }
    Ok(())
}

pub fn read_ntv2(identifier: &str, bytes: &[u8], subgrid: Option<&str>) -> Result<ShiftGrid, GridError> {
    if bytes.len() < NTV2_OVERVIEW_RECORDS * NTV2_RECORD_SIZE {
        return Err(GridError::corrupt(identifier, "truncated NTv2 overview header"));
    }
    // NUM_OREC is always 11; its byte order tells the file's byte order.
    if LittleEndian::read_i32(&bytes[8..12]) == NTV2_OVERVIEW_RECORDS as i32 {
        Ntv2Reader::<LittleEndian>::new(identifier, bytes).read(subgrid)
    } else if BigEndian::read_i32(&bytes[8..12]) == NTV2_OVERVIEW_RECORDS as i32 {
        Ntv2Reader::<BigEndian>::new(identifier, bytes).read(subgrid)
    } else {
        Err(GridError::corrupt(identifier, "NUM_OREC is not 11"))
    }
}

struct Ntv2SubgridHeader {
    name: String,
    parent: String,
    south: f64,
    north: f64,
    east: f64,
    west: f64,
    lat_inc: f64,
    lng_inc: f64,
    count: usize,
    data_offset: usize,
}

struct Ntv2Reader<'a, B: ByteOrder> {
    identifier: &'a str,
    bytes: &'a [u8],
    _order: std::marker::PhantomData<B>,
}

impl<'a, B: ByteOrder> Ntv2Reader<'a, B> {
    fn new(identifier: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            identifier,
            bytes,
            _order: std::marker::PhantomData,
        }
    }

    fn record(&self, index: usize) -> Result<&'a [u8], GridError> {
        index
            .checked_mul(NTV2_RECORD_SIZE)
            .and_then(|start| self.bytes.get(start..start.checked_add(NTV2_RECORD_SIZE)?))
            .ok_or_else(|| GridError::corrupt(self.identifier, "truncated NTv2 record"))
    }

    fn int(&self, index: usize) -> Result<i32, GridError> {
        Ok(B::read_i32(&self.record(index)?[8..12]))
    }

    fn float(&self, index: usize) -> Result<f64, GridError> {
        Ok(B::read_f64(&self.record(index)?[8..16]))
    }

    fn text(&self, index: usize) -> Result<String, GridError> {
        Ok(fixed_string(&self.record(index)?[8..16]))
    }

    fn read(&self, subgrid: Option<&str>) -> Result<ShiftGrid, GridError> {
        let subgrid_count = self.int(2)?;
        let units = self.text(3)?;
        let source_datum = self.text(5)?;
        let target_datum = self.text(6)?;
        let units_per_degree = match units.to_ascii_uppercase().as_str() {
            "SECONDS" => 3600.0,
            "MINUTES" => 60.0,
            "DEGREES" => 1.0,
            other => {
                return Err(GridError::corrupt(self.identifier, format!("unknown GS_TYPE {other}")))
            }
        };
        if subgrid_count < 1 {
            return Err(GridError::corrupt(self.identifier, "no sub-grids"));
        }
        let room = (self.bytes.len() / NTV2_RECORD_SIZE).saturating_sub(NTV2_OVERVIEW_RECORDS)
            / NTV2_SUBGRID_RECORDS;
        if subgrid_count as usize > room {
            return Err(GridError::corrupt(
                self.identifier,
                format!("{subgrid_count} sub-grids declared, room for {room}"),
            ));
        }

        let mut headers = Vec::with_capacity(subgrid_count as usize);
        let mut record = NTV2_OVERVIEW_RECORDS;
        for _ in 0..subgrid_count {
            let header = self.subgrid_header(record)?;
            record += NTV2_SUBGRID_RECORDS + header.count;
            headers.push(header);
        }

        let selected = match subgrid {
            Some(name) => headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)).ok_or_else(|| {
                GridError::SubgridSelection {
                    id: self.identifier.to_string(),
                    reason: format!("no sub-grid named {name}"),
                }
            })?,
            None => {
                let mut roots = headers.iter().filter(|h| h.parent.eq_ignore_ascii_case("NONE"));
                match (roots.next(), roots.next()) {
                    (Some(root), None) => root,
                    _ => {
                        return Err(GridError::SubgridSelection {
                            id: self.identifier.to_string(),
                            reason: "several top-level sub-grids; name one with `#NAME`".to_string(),
                        })
                    }
                }
            }
        };

        log::debug!(
            "NTv2 {}: using sub-grid {} of {} ({} -> {})",
            self.identifier,
            selected.name,
            headers.len(),
            source_datum,
            target_datum
        );
        self.build(selected, units_per_degree)
            .map(|grid| grid.with_datums(&source_datum, &target_datum))
    }

    fn subgrid_header(&self, first: usize) -> Result<Ntv2SubgridHeader, GridError> {
        let count = self.int(first + 10)?;
        if count < 0 {
            return Err(GridError::corrupt(self.identifier, "negative GS_COUNT"));
        }
        Ok(Ntv2SubgridHeader {
            name: self.text(first)?,
            parent: self.text(first + 1)?,
            south: self.float(first + 4)?,
            north: self.float(first + 5)?,
            east: self.float(first + 6)?,
            west: self.float(first + 7)?,
            lat_inc: self.float(first + 8)?,
            lng_inc: self.float(first + 9)?,
            count: count as usize,
            data_offset: (first + NTV2_SUBGRID_RECORDS) * NTV2_RECORD_SIZE,
        })
    }

    // NTv2 longitudes are positive west and each row runs east to west;
    // the native orientation is positive east, running west to east.
    fn build(&self, header: &Ntv2SubgridHeader, units_per_degree: f64) -> Result<ShiftGrid, GridError> {
        if !(header.lat_inc > 0.0 && header.lng_inc > 0.0) {
            return Err(GridError::corrupt(self.identifier, "non-positive increment"));
        }
        let rows = node_count(header.north - header.south, header.lat_inc);
        let columns = node_count(header.west - header.east, header.lng_inc);
        let (rows, columns) = match rows.zip(columns) {
            Some((rows, columns))
                if rows >= 2 && columns >= 2 && rows.checked_mul(columns) == Some(header.count) =>
            {
                (rows, columns)
            }
            _ => {
                return Err(GridError::corrupt(
                    self.identifier,
                    format!(
                        "sub-grid {}: {} cells do not match its bounds and increments",
                        header.name, header.count
                    ),
                ))
            }
        };

        let data = header
            .count
            .checked_mul(NTV2_RECORD_SIZE)
            .and_then(|len| header.data_offset.checked_add(len))
            .and_then(|end| self.bytes.get(header.data_offset..end))
            .ok_or_else(|| GridError::corrupt(self.identifier, "truncated NTv2 cell data"))?;

        let mut cells = vec![GridCell::default(); header.count];
        for (index, chunk) in data.chunks_exact(NTV2_RECORD_SIZE).enumerate() {
            let row = index / columns;
            let column = columns - 1 - index % columns;
            cells[row * columns + column] = GridCell {
                shift_lat: B::read_f32(&chunk[0..4]) as f64 / units_per_degree,
                shift_lng: -(B::read_f32(&chunk[4..8]) as f64) / units_per_degree,
                shift_height: 0.0,
                accuracy_lat: (B::read_f32(&chunk[8..12]) as f64 / units_per_degree).abs(),
                accuracy_lng: (B::read_f32(&chunk[12..16]) as f64 / units_per_degree).abs(),
                accuracy_height: 0.0,
            };
        }

        let extent = GridExtent {
            lat_origin: header.south / units_per_degree,
            lng_origin: -header.west / units_per_degree,
            lat_step: header.lat_inc / units_per_degree,
            lng_step: header.lng_inc / units_per_degree,
            rows,
            columns,
        };
        ShiftGrid::new(self.identifier, extent, cells)
    }
}

/// Nodes along one axis of an NTv2 sub-grid, `None` unless the span holds a
/// whole, representable number of steps.
fn node_count(span: f64, step: f64) -> Option<usize> {
    let steps = (span / step).round();
    if !(0.0..=u32::MAX as f64).contains(&steps) {
        return None;
    }
    Some(steps as usize + 1)
}

fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

fn fixed_bytes<const N: usize>(value: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (target, source) in out.iter_mut().zip(value.bytes()) {
        *target = source;
    }
    out
}
