//! The public header block and its chain of metadata records.

pub mod vlr;

use std::{
    fmt,
    io::{Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use projection_transform::crs::{Crs, CrsKind, EpsgCode};
use serde::Serialize;

use self::vlr::{read_string, wkt_epsg, write_string, GeoModel, Vlr};
use crate::{
    error::{Error, Result},
    pointcloud::{
        layout::{ExtraAttribute, RecordLayout},
        point::{BoundingVolume, Point},
        record::PointRecord,
    },
};

pub const MAGIC: &[u8; 4] = b"LASF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1 && self.minor <= 4
    }

    /// Size of the header block this version defines.
    pub fn header_size(&self) -> u16 {
        match self.minor {
            0..=2 => 227,
            3 => 235,
            _ => 375,
        }
    }

    pub fn max_layout_id(&self) -> u8 {
        match self.minor {
            0 => 1,
            1 | 2 => 3,
            3 => 5,
            _ => 10,
        }
    }

    pub fn supports_layout(&self, id: u8) -> bool {
        id <= self.max_layout_id()
    }

    pub fn has_waveform_start(&self) -> bool {
        self.minor >= 3
    }

    pub fn has_large_counts(&self) -> bool {
        self.minor >= 4
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(1, 4)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Spatial reference found in a header's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CrsId {
    Epsg(EpsgCode),
    Wkt(String),
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsId::Epsg(code) => write!(f, "EPSG:{code}"),
            CrsId::Wkt(wkt) => write!(f, "{wkt}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub version: Version,
    pub file_source_id: u16,
    pub global_encoding: u16,
    #[serde(skip)]
    pub project_id: [u8; 16],
    pub system_identifier: String,
    pub generating_software: String,
    pub creation_day: u16,
    pub creation_year: u16,
    pub layout: RecordLayout,
    pub point_count: u64,
    pub point_count_by_return: [u64; 15],
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounding_volume: BoundingVolume,
    pub waveform_data_start: u64,
    pub vlrs: Vec<Vlr>,
    /// Bytes between the known header fields and the first VLR.
    #[serde(skip)]
    pub padding: Vec<u8>,
    /// Bytes between the last VLR and the point data.
    #[serde(skip)]
    pub vlr_padding: Vec<u8>,
}

impl Header {
    pub fn new(version: Version, layout: RecordLayout) -> Result<Self> {
        let mut header = Self {
            version,
            file_source_id: 0,
            global_encoding: 0,
            project_id: [0; 16],
            system_identifier: "OTHER".to_string(),
            generating_software: concat!("pcd-core ", env!("CARGO_PKG_VERSION")).to_string(),
            creation_day: 0,
            creation_year: 0,
            layout: RecordLayout::new(0)?,
            point_count: 0,
            point_count_by_return: [0; 15],
            scale: [0.001; 3],
            offset: [0.0; 3],
            bounding_volume: BoundingVolume::default(),
            waveform_data_start: 0,
            vlrs: Vec::new(),
            padding: Vec::new(),
            vlr_padding: Vec::new(),
        };
        header.set_layout(layout);
        header.validate()?;
        Ok(header)
    }

    pub fn read_from<R: Read>(mut read: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        read.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::MalformedHeader(format!(
                "file signature {magic:?} is not LASF"
            )));
        }
        let file_source_id = read.read_u16::<LittleEndian>()?;
        let global_encoding = read.read_u16::<LittleEndian>()?;
        let mut project_id = [0u8; 16];
        read.read_exact(&mut project_id)?;
        let version = Version::new(read.read_u8()?, read.read_u8()?);
        if !version.is_supported() {
            return Err(Error::UnsupportedVersion(version));
        }
        let system_identifier = read_string::<_, 32>(&mut read)?;
        let generating_software = read_string::<_, 32>(&mut read)?;
        let creation_day = read.read_u16::<LittleEndian>()?;
        let creation_year = read.read_u16::<LittleEndian>()?;
        let header_size = read.read_u16::<LittleEndian>()?;
        if header_size < version.header_size() {
            return Err(Error::MalformedHeader(format!(
                "header size {header_size} is smaller than the {} bytes of LAS {version}",
                version.header_size()
            )));
        }
        let offset_to_point_data = read.read_u32::<LittleEndian>()?;
        let vlr_count = read.read_u32::<LittleEndian>()?;
        let layout_id = read.read_u8()?;
        let record_length = read.read_u16::<LittleEndian>()?;
        let legacy_point_count = read.read_u32::<LittleEndian>()?;
        let mut point_count_by_return = [0u64; 15];
        for count in point_count_by_return.iter_mut().take(5) {
            *count = read.read_u32::<LittleEndian>()? as u64;
        }
        let mut scale = [0.0; 3];
        read.read_f64_into::<LittleEndian>(&mut scale)?;
        let mut offset = [0.0; 3];
        read.read_f64_into::<LittleEndian>(&mut offset)?;
        let mut bounding_volume = BoundingVolume::default();
        for axis in 0..3 {
            bounding_volume.max[axis] = read.read_f64::<LittleEndian>()?;
            bounding_volume.min[axis] = read.read_f64::<LittleEndian>()?;
        }

        let mut waveform_data_start = 0;
        if version.has_waveform_start() {
            waveform_data_start = read.read_u64::<LittleEndian>()?;
        }
        let mut point_count = legacy_point_count as u64;
        if version.has_large_counts() {
            let evlr_start = read.read_u64::<LittleEndian>()?;
            let evlr_count = read.read_u32::<LittleEndian>()?;
            if evlr_count > 0 {
                log::debug!("ignoring {evlr_count} extended VLRs at byte {evlr_start}");
            }
            let large_count = read.read_u64::<LittleEndian>()?;
            if large_count > 0 || legacy_point_count == 0 {
                point_count = large_count;
            }
            let mut large_by_return = [0u64; 15];
            read.read_u64_into::<LittleEndian>(&mut large_by_return)?;
            if large_by_return.iter().any(|&n| n > 0) {
                point_count_by_return = large_by_return;
            }
        }

        let padding = read_padding(&mut read, (header_size - version.header_size()) as u64)?;

        let vlr_budget = (offset_to_point_data as u64)
            .checked_sub(header_size as u64)
            .ok_or_else(|| {
                Error::MalformedHeader(format!(
                    "point data starts at {offset_to_point_data}, inside the {header_size} byte header"
                ))
            })?;
        let mut vlr_bytes = 0u64;
        let mut vlrs = Vec::with_capacity(vlr_count.min(64) as usize);
        for _ in 0..vlr_count {
            let vlr = Vlr::read_from(&mut read)?;
            vlr_bytes += vlr.len() as u64;
            if vlr_bytes > vlr_budget {
                return Err(Error::MalformedHeader(format!(
                    "VLRs run {} bytes past the start of point data",
                    vlr_bytes - vlr_budget
                )));
            }
            if !vlr.is_known() {
                log::debug!(
                    "carrying unrecognized VLR {}/{} ({} bytes)",
                    vlr.user_id,
                    vlr.record_id,
                    vlr.data.len()
                );
            }
            vlrs.push(vlr);
        }
        let vlr_padding = read_padding(&mut read, vlr_budget - vlr_bytes)?;

        if point_count == 0 {
            bounding_volume = BoundingVolume::empty();
        }

        let mut layout = RecordLayout::from_record_length(layout_id, record_length)?;
        if let Some(vlr) = vlrs.iter().find(|vlr| vlr.is_extra_bytes()) {
            match vlr
                .extra_attributes()
                .and_then(|attributes| layout.clone().with_extra_attributes(attributes))
            {
                Ok(described) => layout = described,
                Err(err) => log::warn!("extra bytes schema ignored: {err}"),
            }
        }

        let header = Self {
            version,
            file_source_id,
            global_encoding,
            project_id,
            system_identifier,
            generating_software,
            creation_day,
            creation_year,
            layout,
            point_count,
            point_count_by_return,
            scale,
            offset,
            bounding_volume,
            waveform_data_start,
            vlrs,
            padding,
            vlr_padding,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.version.is_supported() {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if !self.version.supports_layout(self.layout.id) {
            return Err(Error::LayoutNotInVersion {
                layout: self.layout.id,
                version: self.version,
            });
        }
        if self.scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(Error::MalformedHeader(format!(
                "scale {:?} must be finite and non-zero",
                self.scale
            )));
        }
        if !self.version.has_large_counts() && self.point_count > u32::MAX as u64 {
            return Err(Error::TooManyPoints {
                count: self.point_count,
                version: self.version,
            });
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        self.validate()?;
        let header_size = u16::try_from(self.version.header_size() as usize + self.padding.len())
            .map_err(|_| Error::MalformedHeader(format!("{} bytes of header padding", self.padding.len())))?;
        let offset_to_point_data = u32::try_from(self.offset_to_point_data())
            .map_err(|_| Error::MalformedHeader("VLRs do not fit before the point data".to_string()))?;
        let vlr_count = u32::try_from(self.vlrs.len())
            .map_err(|_| Error::MalformedHeader(format!("{} VLRs", self.vlrs.len())))?;

        // Layouts 6-10 leave the legacy counts at zero, as do counts that overflow them.
        let legacy_counts = !self.layout.is_extended() && self.point_count <= u32::MAX as u64;
        let legacy = |count: u64| if legacy_counts { count as u32 } else { 0 };

        write.write_all(MAGIC)?;
        write.write_u16::<LittleEndian>(self.file_source_id)?;
        write.write_u16::<LittleEndian>(self.global_encoding)?;
        write.write_all(&self.project_id)?;
        write.write_u8(self.version.major)?;
        write.write_u8(self.version.minor)?;
        write_string::<_, 32>(&mut write, &self.system_identifier)?;
        write_string::<_, 32>(&mut write, &self.generating_software)?;
        write.write_u16::<LittleEndian>(self.creation_day)?;
        write.write_u16::<LittleEndian>(self.creation_year)?;
        write.write_u16::<LittleEndian>(header_size)?;
        write.write_u32::<LittleEndian>(offset_to_point_data)?;
        write.write_u32::<LittleEndian>(vlr_count)?;
        write.write_u8(self.layout.id)?;
        write.write_u16::<LittleEndian>(self.layout.total_width())?;
        write.write_u32::<LittleEndian>(legacy(self.point_count))?;
        for &count in &self.point_count_by_return[..5] {
            write.write_u32::<LittleEndian>(legacy(count))?;
        }
        for value in self.scale.iter().chain(&self.offset) {
            write.write_f64::<LittleEndian>(*value)?;
        }
        let bounds = if self.bounding_volume.is_empty() {
            BoundingVolume {
                min: [0.0; 3],
                max: [0.0; 3],
            }
        } else {
            self.bounding_volume
        };
        for axis in 0..3 {
            write.write_f64::<LittleEndian>(bounds.max[axis])?;
            write.write_f64::<LittleEndian>(bounds.min[axis])?;
        }
        if self.version.has_waveform_start() {
            write.write_u64::<LittleEndian>(self.waveform_data_start)?;
        }
        if self.version.has_large_counts() {
            write.write_u64::<LittleEndian>(0)?;
            write.write_u32::<LittleEndian>(0)?;
            write.write_u64::<LittleEndian>(self.point_count)?;
            for &count in &self.point_count_by_return {
                write.write_u64::<LittleEndian>(count)?;
            }
        }
        write.write_all(&self.padding)?;
        for vlr in &self.vlrs {
            vlr.write_to(&mut write)?;
        }
        write.write_all(&self.vlr_padding)?;
        Ok(())
    }

    pub fn header_size(&self) -> u64 {
        self.version.header_size() as u64 + self.padding.len() as u64
    }

    pub fn offset_to_point_data(&self) -> u64 {
        self.header_size()
            + self.vlrs.iter().map(|vlr| vlr.len() as u64).sum::<u64>()
            + self.vlr_padding.len() as u64
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Replaces the record layout, keeping the extra bytes VLR in step with
    /// its attribute schema.
    pub fn set_layout(&mut self, layout: RecordLayout) {
        self.vlrs.retain(|vlr| !vlr.is_extra_bytes());
        if !layout.extra_attributes.is_empty() {
            self.vlrs.push(Vlr::extra_bytes(&layout.extra_attributes));
        }
        self.layout = layout;
    }

    pub fn set_extra_attributes(&mut self, attributes: Vec<ExtraAttribute>) -> Result<()> {
        let layout = self.layout.clone().with_extra_attributes(attributes)?;
        self.set_layout(layout);
        Ok(())
    }

    /// Real-world coordinates of a record.
    pub fn to_point(&self, record: &PointRecord) -> Point {
        Point {
            x: record.x as f64 * self.scale[0] + self.offset[0],
            y: record.y as f64 * self.scale[1] + self.offset[1],
            z: record.z as f64 * self.scale[2] + self.offset[2],
        }
    }

    /// Scaled integer coordinates of a real-world point.
    pub fn quantize(&self, point: &Point) -> Result<[i32; 3]> {
        let mut scaled = [0i32; 3];
        for (axis, (value, field)) in point.to_array().into_iter().zip(["x", "y", "z"]).enumerate() {
            let stored = ((value - self.offset[axis]) / self.scale[axis]).round();
            if !(i32::MIN as f64..=i32::MAX as f64).contains(&stored) {
                return Err(Error::out_of_range(
                    field,
                    self.layout.id,
                    format!("{value} does not fit i32 with scale {} and offset {}", self.scale[axis], self.offset[axis]),
                ));
            }
            scaled[axis] = stored as i32;
        }
        Ok(scaled)
    }

    /// The spatial reference: GeoKey directory first, then WKT.
    pub fn crs(&self) -> Option<CrsId> {
        if let Some(epsg) = self.vlrs.iter().find_map(|vlr| vlr.geokey_epsg()) {
            return Some(CrsId::Epsg(epsg));
        }
        let wkt = self.vlrs.iter().find_map(|vlr| vlr.wkt())?;
        Some(match wkt_epsg(&wkt) {
            Some(epsg) => CrsId::Epsg(epsg),
            None => CrsId::Wkt(wkt),
        })
    }

    pub fn epsg(&self) -> Option<EpsgCode> {
        match self.crs()? {
            CrsId::Epsg(epsg) => Some(epsg),
            CrsId::Wkt(_) => None,
        }
    }

    /// Replaces any projection VLRs with a GeoKey directory for `epsg`.
    pub fn set_epsg(&mut self, epsg: EpsgCode) {
        let model = match Crs::from_epsg(epsg).map(|crs| crs.kind) {
            Ok(CrsKind::Geographic) => GeoModel::Geographic,
            Ok(CrsKind::Geocentric) => GeoModel::Geocentric,
            Ok(CrsKind::Projected(_)) => GeoModel::Projected,
            Err(_) => {
                log::debug!("EPSG:{epsg} is not a known CRS, tagging it as projected");
                GeoModel::Projected
            }
        };
        self.vlrs
            .retain(|vlr| !(vlr.is_geokey_directory() || vlr.is_wkt()));
        self.vlrs.push(Vlr::geokey_directory(epsg, model));
    }
}

// Sized by what the source actually holds, not by the offsets it declares.
fn read_padding<R: Read>(read: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut padding = Vec::new();
    read.take(len).read_to_end(&mut padding)?;
    if (padding.len() as u64) < len {
        return Err(Error::MalformedHeader(format!(
            "{len} bytes of padding declared, the source ends after {}",
            padding.len()
        )));
    }
    Ok(padding)
}
