pub mod las;

use pcd_core::pointcloud::record::PointRecord;

pub trait PointReader {
    fn next_point(&mut self) -> pcd_core::Result<Option<PointRecord>>;
}

/// Reads records in fixed-size batches. A read error is yielded on its own,
/// after the batch holding the records read before it; iteration can go on
/// past it to the following records.
pub struct PointIterator<R: PointReader> {
    reader: R,
    chunk_size: usize,
    pending: Option<pcd_core::Error>,
}

impl<R: PointReader> PointIterator<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            pending: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: PointReader> Iterator for PointIterator<R> {
    type Item = pcd_core::Result<Vec<PointRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        let mut buffer = Vec::with_capacity(self.chunk_size);

        for _ in 0..self.chunk_size {
            match self.reader.next_point() {
                Ok(Some(p)) => buffer.push(p),
                Ok(None) => break,
                Err(e) if buffer.is_empty() => return Some(Err(e)),
                Err(e) => {
                    self.pending = Some(e);
                    break;
                }
            }
        }

        if buffer.is_empty() {
            None
        } else {
            Some(Ok(buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        remaining: u32,
        failing: Option<u32>,
    }

    impl PointReader for Counter {
        fn next_point(&mut self) -> pcd_core::Result<Option<PointRecord>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            if self.failing == Some(self.remaining) {
                return Err(pcd_core::Error::MalformedRecord(format!("record {}", self.remaining)));
            }
            Ok(Some(PointRecord {
                x: self.remaining as i32,
                ..Default::default()
            }))
        }
    }

    fn sizes(chunks: &[pcd_core::Result<Vec<PointRecord>>]) -> Vec<Option<usize>> {
        chunks
            .iter()
            .map(|chunk| chunk.as_ref().ok().map(Vec::len))
            .collect()
    }

    #[test]
    fn test_chunks() {
        let chunks: Vec<_> = PointIterator::new(
            Counter {
                remaining: 7,
                failing: None,
            },
            3,
        )
        .collect();
        assert_eq!(sizes(&chunks), vec![Some(3), Some(3), Some(1)]);
        assert_eq!(chunks[2].as_ref().unwrap()[0].x, 0);
    }

    #[test]
    fn test_errors_are_yielded() {
        // x counts down from 6; the fifth read fails
        let chunks: Vec<_> = PointIterator::new(
            Counter {
                remaining: 7,
                failing: Some(2),
            },
            3,
        )
        .collect();
        assert_eq!(sizes(&chunks), vec![Some(3), Some(1), None, Some(2)]);
        assert!(matches!(chunks[2], Err(pcd_core::Error::MalformedRecord(_))));

        // an error at the start of a batch does not end the iteration
        let chunks: Vec<_> = PointIterator::new(
            Counter {
                remaining: 4,
                failing: Some(3),
            },
            2,
        )
        .collect();
        assert_eq!(sizes(&chunks), vec![None, Some(2), Some(1)]);
    }
}
