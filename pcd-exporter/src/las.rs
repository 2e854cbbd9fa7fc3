use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::Path,
};

use pcd_core::{
    error::{Error, Result},
    header::Header,
    pointcloud::{
        codec::encode_into,
        point::{BoundingVolume, Point},
        record::PointRecord,
    },
};

/// Writes a LAS stream: the header goes out on creation, each record is
/// encoded as it is appended, and `finalize` rewrites the header with the
/// real counts and extent.
pub struct LasPointWriter<W: Write + Seek> {
    sink: W,
    header: Header,
    start: u64,
    point_count: u64,
    point_count_by_return: [u64; 15],
    bounds: BoundingVolume,
    // extent the caller's header claimed, checked against the written points
    declared_bounds: BoundingVolume,
    closed: bool,
}

impl LasPointWriter<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, header: Header) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write + Seek> LasPointWriter<W> {
    pub fn new(mut sink: W, mut header: Header) -> Result<Self> {
        header.point_count = 0;
        header.point_count_by_return = [0; 15];
        let declared_bounds = std::mem::replace(&mut header.bounding_volume, BoundingVolume::empty());
        let start = sink.stream_position()?;
        header.write_to(&mut sink)?;
        Ok(Self {
            sink,
            header,
            start,
            point_count: 0,
            point_count_by_return: [0; 15],
            bounds: BoundingVolume::empty(),
            declared_bounds,
            closed: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Records appended so far.
    pub fn len(&self) -> u64 {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub fn append(&mut self, record: &PointRecord) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        let version = self.header.version;
        if !version.has_large_counts() && self.point_count >= u32::MAX as u64 {
            return Err(Error::TooManyPoints {
                count: self.point_count + 1,
                version,
            });
        }
        encode_into(record, self.header.layout(), &mut self.sink)?;

        self.point_count += 1;
        if (1..=15).contains(&record.return_number) {
            self.point_count_by_return[record.return_number as usize - 1] += 1;
        }
        self.bounds.extend(&self.header.to_point(record));
        Ok(())
    }

    /// Quantizes a real-world point with the header's scale and offset and
    /// appends it with the other attributes of `template`.
    pub fn write_point(&mut self, point: &Point, template: &PointRecord) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        let [x, y, z] = self.header.quantize(point)?;
        let record = PointRecord {
            x,
            y,
            z,
            ..template.clone()
        };
        self.append(&record)
    }

    pub fn finalize(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        self.closed = true;

        let declared = self.declared_bounds;
        if !declared.is_empty()
            && !self.bounds.is_empty()
            && !(declared.contains(&Point::from(self.bounds.min))
                && declared.contains(&Point::from(self.bounds.max)))
        {
            log::warn!(
                "points extend past the declared extent {:?} - {:?}; writing {:?} - {:?}",
                declared.min,
                declared.max,
                self.bounds.min,
                self.bounds.max
            );
        }
        self.header.point_count = self.point_count;
        self.header.point_count_by_return = self.point_count_by_return;
        self.header.bounding_volume = self.bounds;

        let end = self.sink.stream_position()?;
        self.sink.seek(SeekFrom::Start(self.start))?;
        self.header.write_to(&mut self.sink)?;
        self.sink.seek(SeekFrom::Start(end))?;
        self.sink.flush()?;

        log::info!(
            "wrote {} points, extent {:?} - {:?}",
            self.point_count,
            self.bounds.min,
            self.bounds.max
        );
        Ok(())
    }

    /// Finalizes the stream if that has not happened yet and returns the sink.
    pub fn into_inner(mut self) -> Result<W> {
        if !self.closed {
            self.finalize()?;
        }
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use byteorder::{ByteOrder, LittleEndian};
    use pcd_core::{
        header::Version,
        pointcloud::{codec::decode, layout::RecordLayout, record::Color},
    };

    use super::*;

    fn header() -> Header {
        let mut header = Header::new(Version::new(1, 2), RecordLayout::new(2).unwrap()).unwrap();
        header.scale = [0.001; 3];
        header.offset = [1_000.0, 2_000.0, 0.0];
        header
    }

    fn record(x: i32, y: i32, z: i32, return_number: u8) -> PointRecord {
        PointRecord {
            x,
            y,
            z,
            return_number,
            return_count: 2,
            color: Some(Color::new(1, 2, 3)),
            ..Default::default()
        }
    }

    #[test]
    fn test_finalize_updates_header() {
        let records = [
            record(0, 0, 0, 1),
            record(-5_000, 10_000, 2_500, 1),
            record(7_000, -3_000, -100, 2),
        ];
        let mut writer = LasPointWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        for r in &records {
            writer.append(r).unwrap();
        }
        assert_eq!(writer.len(), 3);
        let bytes = writer.into_inner().unwrap().into_inner();

        let header = Header::read_from(bytes.as_slice()).unwrap();
        assert_eq!(header.point_count, 3);
        assert_eq!(&header.point_count_by_return[..3], &[2, 1, 0]);
        assert_eq!(header.bounding_volume.min, [995.0, 1_997.0, -0.1]);
        assert_eq!(header.bounding_volume.max, [1_007.0, 2_010.0, 2.5]);

        let width = header.layout().total_width() as usize;
        let data = &bytes[header.offset_to_point_data() as usize..];
        assert_eq!(data.len(), 3 * width);
        for (chunk, expected) in data.chunks(width).zip(&records) {
            let decoded = decode(chunk, header.layout()).unwrap();
            assert_eq!(&decoded, expected);
            assert!(header.bounding_volume.contains(&header.to_point(&decoded)));
        }
    }

    #[test]
    fn test_declared_extent_is_replaced() {
        let mut declared = header();
        declared.bounding_volume = BoundingVolume {
            min: [1_000.0, 2_000.0, 0.0],
            max: [1_001.0, 2_001.0, 1.0],
        };
        let mut writer = LasPointWriter::new(Cursor::new(Vec::new()), declared).unwrap();
        writer.append(&record(0, 0, 0, 1)).unwrap();
        writer.append(&record(5_000, 6_000, 7_000, 1)).unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let header = Header::read_from(bytes.as_slice()).unwrap();
        assert_eq!(header.bounding_volume.min, [1_000.0, 2_000.0, 0.0]);
        assert_eq!(header.bounding_volume.max, [1_005.0, 2_006.0, 7.0]);
        let width = header.layout().total_width() as usize;
        for chunk in bytes[header.offset_to_point_data() as usize..].chunks(width) {
            let point = header.to_point(&decode(chunk, header.layout()).unwrap());
            assert!(header.bounding_volume.contains(&point));
        }
    }

    #[test]
    fn test_closed_stream() {
        let mut writer = LasPointWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        writer.append(&record(1, 1, 1, 1)).unwrap();
        writer.finalize().unwrap();
        assert!(matches!(writer.append(&record(1, 1, 1, 1)), Err(Error::StreamClosed)));
        assert!(matches!(writer.finalize(), Err(Error::StreamClosed)));
        assert!(matches!(
            writer.write_point(&Point::new(1.0, 2.0, 3.0), &record(0, 0, 0, 1)),
            Err(Error::StreamClosed)
        ));

        let bytes = writer.into_inner().unwrap().into_inner();
        assert_eq!(LittleEndian::read_u32(&bytes[107..111]), 1);
    }

    #[test]
    fn test_invalid_record_is_not_written() {
        let mut writer = LasPointWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        let missing_color = PointRecord::default();
        assert!(matches!(
            writer.append(&missing_color),
            Err(Error::FieldOutOfRange { field: "color", .. })
        ));
        writer.append(&record(3, 3, 3, 1)).unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();
        let header = Header::read_from(bytes.as_slice()).unwrap();
        assert_eq!(header.point_count, 1);
        assert_eq!(
            bytes.len() as u64,
            header.offset_to_point_data() + header.layout().total_width() as u64
        );
    }

    #[test]
    fn test_write_point_quantizes() {
        let mut writer = LasPointWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        writer
            .write_point(&Point::new(1_001.2346, 1_999.5, 12.0), &record(0, 0, 0, 1))
            .unwrap();
        assert!(matches!(
            writer.write_point(&Point::new(1e9, 0.0, 0.0), &record(0, 0, 0, 1)),
            Err(Error::FieldOutOfRange { field: "x", .. })
        ));
        let bytes = writer.into_inner().unwrap().into_inner();
        let header = Header::read_from(bytes.as_slice()).unwrap();
        let offset = header.offset_to_point_data() as usize;
        let decoded = decode(&bytes[offset..], header.layout()).unwrap();
        assert_eq!((decoded.x, decoded.y, decoded.z), (1_235, -500, 12_000));
        assert_eq!(decoded.color, Some(Color::new(1, 2, 3)));
    }

    #[test]
    fn test_empty_stream() {
        let writer = LasPointWriter::new(Cursor::new(Vec::new()), header()).unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();
        let header = Header::read_from(bytes.as_slice()).unwrap();
        assert_eq!(header.point_count, 0);
        assert!(header.bounding_volume.is_empty());
        assert_eq!(bytes.len() as u64, header.offset_to_point_data());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");
        let mut writer = LasPointWriter::from_path(&path, header()).unwrap();
        writer.append(&record(1, 2, 3, 1)).unwrap();
        writer.finalize().unwrap();
        drop(writer);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(Header::read_from(bytes.as_slice()).unwrap().point_count, 1);
    }
}
