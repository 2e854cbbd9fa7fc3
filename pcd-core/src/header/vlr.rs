//! Variable length records: the metadata blocks chained after the header.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use projection_transform::crs::EpsgCode;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    pointcloud::layout::{ExtraAttribute, ExtraKind},
};

pub const VLR_HEADER_SIZE: usize = 54;

pub const PROJECTION_USER_ID: &str = "LASF_Projection";
pub const GEOKEY_DIRECTORY_RECORD_ID: u16 = 34735;
pub const WKT_RECORD_ID: u16 = 2112;

pub const SPEC_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;
pub const EXTRA_BYTES_DESCRIPTOR_SIZE: usize = 192;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// GeoTIFF model type written into a GeoKey directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoModel {
    Projected = 1,
    Geographic = 2,
    Geocentric = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vlr {
    pub user_id: String,
    pub record_id: u16,
    pub description: String,
    #[serde(rename = "length", serialize_with = "serialize_len")]
    pub data: Vec<u8>,
}

fn serialize_len<S: serde::Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(data.len() as u64)
}

impl Vlr {
    pub fn new(user_id: &str, record_id: u16, description: &str, data: Vec<u8>) -> Self {
        Self {
            user_id: user_id.to_string(),
            record_id,
            description: description.to_string(),
            data,
        }
    }

    pub fn read_from<R: Read>(mut read: R) -> Result<Self> {
        let _reserved = read.read_u16::<LittleEndian>()?;
        let user_id = read_string::<_, 16>(&mut read)?;
        let record_id = read.read_u16::<LittleEndian>()?;
        let length = read.read_u16::<LittleEndian>()?;
        let description = read_string::<_, 32>(&mut read)?;
        let mut data = vec![0; length as usize];
        read.read_exact(&mut data)?;
        Ok(Self {
            user_id,
            record_id,
            description,
            data,
        })
    }

    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        let length = u16::try_from(self.data.len()).map_err(|_| {
            Error::MalformedHeader(format!(
                "{}/{} holds {} bytes, more than a VLR can",
                self.user_id,
                self.record_id,
                self.data.len()
            ))
        })?;
        write.write_u16::<LittleEndian>(0)?;
        write_string::<_, 16>(&mut write, &self.user_id)?;
        write.write_u16::<LittleEndian>(self.record_id)?;
        write.write_u16::<LittleEndian>(length)?;
        write_string::<_, 32>(&mut write, &self.description)?;
        write.write_all(&self.data)?;
        Ok(())
    }

    /// Bytes taken in the file, header included.
    pub fn len(&self) -> usize {
        VLR_HEADER_SIZE + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_geokey_directory(&self) -> bool {
        self.user_id == PROJECTION_USER_ID && self.record_id == GEOKEY_DIRECTORY_RECORD_ID
    }

    pub fn is_wkt(&self) -> bool {
        self.user_id == PROJECTION_USER_ID && self.record_id == WKT_RECORD_ID
    }

    pub fn is_extra_bytes(&self) -> bool {
        self.user_id == SPEC_USER_ID && self.record_id == EXTRA_BYTES_RECORD_ID
    }

    pub fn is_known(&self) -> bool {
        self.is_geokey_directory() || self.is_wkt() || self.is_extra_bytes()
    }

    /// A GeoKey directory naming `epsg` for the given model.
    pub fn geokey_directory(epsg: EpsgCode, model: GeoModel) -> Self {
        let code_key = match model {
            GeoModel::Projected => PROJECTED_CS_TYPE_KEY,
            GeoModel::Geographic | GeoModel::Geocentric => GEOGRAPHIC_TYPE_KEY,
        };
        // header: directory version, key revision, minor revision, key count
        // then one (key, location, count, value) entry per key
        #[rustfmt::skip]
        let keys: [u16; 16] = [
            1, 1, 0, 3,
            GT_MODEL_TYPE_KEY, 0, 1, model as u16,
            GT_RASTER_TYPE_KEY, 0, 1, 1,
            code_key, 0, 1, epsg,
        ];
        let mut data = vec![0; keys.len() * 2];
        LittleEndian::write_u16_into(&keys, &mut data);
        Self::new(PROJECTION_USER_ID, GEOKEY_DIRECTORY_RECORD_ID, "GeoKeyDirectoryTag", data)
    }

    /// EPSG code from ProjectedCSTypeGeoKey, else GeographicTypeGeoKey.
    pub fn geokey_epsg(&self) -> Option<EpsgCode> {
        if !self.is_geokey_directory() || self.data.len() < 8 {
            return None;
        }
        let key_count = LittleEndian::read_u16(&self.data[6..8]) as usize;
        let mut projected = None;
        let mut geographic = None;
        for entry in self.data[8..].chunks_exact(8).take(key_count) {
            let key = LittleEndian::read_u16(&entry[0..2]);
            let location = LittleEndian::read_u16(&entry[2..4]);
            let value = LittleEndian::read_u16(&entry[6..8]);
            // values stored elsewhere are never EPSG codes
            if location != 0 {
                continue;
            }
            match key {
                PROJECTED_CS_TYPE_KEY => projected = Some(value),
                GEOGRAPHIC_TYPE_KEY => geographic = Some(value),
                _ => {}
            }
        }
        // 32767 is "user-defined"
        projected.or(geographic).filter(|&code| code != 0 && code != 32767)
    }

    pub fn wkt(&self) -> Option<String> {
        if !self.is_wkt() {
            return None;
        }
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        Some(String::from_utf8_lossy(&self.data[..end]).trim().to_string())
    }

    pub fn extra_bytes(attributes: &[ExtraAttribute]) -> Self {
        let mut data = Vec::with_capacity(attributes.len() * EXTRA_BYTES_DESCRIPTOR_SIZE);
        for attribute in attributes {
            let mut descriptor = [0u8; EXTRA_BYTES_DESCRIPTOR_SIZE];
            descriptor[2] = attribute.kind.code();
            if attribute.kind == ExtraKind::Raw {
                // undocumented bytes carry their width in the options field
                descriptor[3] = attribute.byte_width.min(u8::MAX as u16) as u8;
            }
            let name = attribute.name.as_bytes();
            let n = name.len().min(32);
            descriptor[4..4 + n].copy_from_slice(&name[..n]);
            data.extend_from_slice(&descriptor);
        }
        Self::new(SPEC_USER_ID, EXTRA_BYTES_RECORD_ID, "Extra Bytes Record", data)
    }

    pub fn extra_attributes(&self) -> Result<Vec<ExtraAttribute>> {
        if self.data.len() % EXTRA_BYTES_DESCRIPTOR_SIZE != 0 {
            return Err(Error::MalformedHeader(format!(
                "extra bytes record of {} bytes is not a whole number of descriptors",
                self.data.len()
            )));
        }
        self.data
            .chunks_exact(EXTRA_BYTES_DESCRIPTOR_SIZE)
            .map(|descriptor| {
                let name = trim_nul(&descriptor[4..36]);
                let kind = ExtraKind::from_code(descriptor[2]).ok_or_else(|| {
                    Error::MalformedHeader(format!(
                        "extra attribute `{name}` has unsupported data type {}",
                        descriptor[2]
                    ))
                })?;
                Ok(match kind {
                    ExtraKind::Raw => ExtraAttribute::raw(&name, descriptor[3] as u16),
                    kind => ExtraAttribute::new(&name, kind),
                })
            })
            .collect()
    }
}

/// EPSG code of the last `AUTHORITY["EPSG","n"]` in a WKT string, which is
/// the one belonging to the outermost CRS.
pub fn wkt_epsg(wkt: &str) -> Option<EpsgCode> {
    let mut found = None;
    let mut rest = wkt;
    while let Some(start) = rest.find("AUTHORITY[") {
        rest = &rest[start + "AUTHORITY[".len()..];
        let Some(end) = rest.find(']') else { break };
        let mut parts = rest[..end]
            .split(',')
            .map(|part| part.trim().trim_matches('"'));
        if let (Some(authority), Some(code)) = (parts.next(), parts.next()) {
            if authority.eq_ignore_ascii_case("EPSG") {
                if let Ok(code) = code.parse() {
                    found = Some(code);
                }
            }
        }
    }
    found
}

fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

pub(crate) fn read_string<R: Read, const N: usize>(mut read: R) -> std::io::Result<String> {
    let mut bytes = [0u8; N];
    read.read_exact(&mut bytes)?;
    Ok(trim_nul(&bytes))
}

/// NUL padded; longer strings are cut at `N` bytes.
pub(crate) fn write_string<W: Write, const N: usize>(mut write: W, value: &str) -> std::io::Result<()> {
    let mut bytes = [0u8; N];
    let n = value.len().min(N);
    bytes[..n].copy_from_slice(&value.as_bytes()[..n]);
    write.write_all(&bytes)
}
