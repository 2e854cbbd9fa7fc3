use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use pcd_core::{
    error::{Error, Result},
    header::Header,
    pointcloud::{
        codec::decode,
        layout::RecordLayout,
        point::Point,
        record::PointRecord,
    },
};

use super::PointReader;

/// Sequential and random access over the records of one LAS source.
///
/// A record that fails to decode only fails that call: the next call reads
/// the following record, and `seek` always repositions.
pub struct LasPointReader<R> {
    source: R,
    header: Header,
    position: u64,
    buffer: Vec<u8>,
    // set when a failed read left the source at an unknown offset
    resync: bool,
}

impl LasPointReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> LasPointReader<R> {
    pub fn new(mut source: R) -> Result<Self> {
        let header = Header::read_from(&mut source)?;
        source.seek(SeekFrom::Start(header.offset_to_point_data()))?;
        log::debug!(
            "LAS {} with {} points of layout {}",
            header.version,
            header.point_count,
            header.layout().id
        );
        Ok(Self {
            buffer: vec![0; header.layout().total_width() as usize],
            source,
            header,
            position: 0,
            resync: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn layout(&self) -> &RecordLayout {
        self.header.layout()
    }

    pub fn len(&self) -> u64 {
        self.header.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the record the next read returns.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Positions the reader at record `index`; `index == len()` positions it
    /// at the end.
    pub fn seek(&mut self, index: u64) -> Result<()> {
        if index > self.len() {
            return Err(Error::SeekOutOfRange {
                index,
                count: self.len(),
            });
        }
        self.source.seek(SeekFrom::Start(self.byte_offset(index)))?;
        self.position = index;
        self.resync = false;
        Ok(())
    }

    pub fn to_point(&self, record: &PointRecord) -> Point {
        self.header.to_point(record)
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn byte_offset(&self, index: u64) -> u64 {
        self.header.offset_to_point_data() + index * self.layout().total_width() as u64
    }

    fn read_record(&mut self) -> Result<Option<PointRecord>> {
        if self.position >= self.len() {
            return Ok(None);
        }
        if self.resync {
            self.source
                .seek(SeekFrom::Start(self.byte_offset(self.position)))?;
            self.resync = false;
        }
        self.position += 1;
        if let Err(err) = self.source.read_exact(&mut self.buffer) {
            self.resync = true;
            return Err(err.into());
        }
        decode(&self.buffer, self.header.layout()).map(Some)
    }
}

impl<R: Read + Seek> PointReader for LasPointReader<R> {
    fn next_point(&mut self) -> Result<Option<PointRecord>> {
        self.read_record()
    }
}

impl<R: Read + Seek> Iterator for LasPointReader<R> {
    type Item = Result<PointRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len().saturating_sub(self.position) as usize;
        (0, Some(remaining))
    }
}
