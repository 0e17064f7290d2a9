use super::IndexedStorage;
use crate::formats::{ColumnLayout, RecordFormat};
use crate::{Error, Result};
use async_trait::async_trait;
use noodles::bgzf;
use noodles::core::Position;
use noodles::core::region::Interval;
use noodles::csi;
use noodles::csi::binning_index::BinningIndex;
use noodles::csi::binning_index::index::Header;
use noodles::csi::binning_index::index::header::format::{CoordinateSystem, Format};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::tabix;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;

const TABIX_EXTENSION: &str = "tbi";
const CSI_EXTENSION: &str = "csi";

/// A BGZF-compressed, position-sorted text file with a tabix or CSI index.
pub struct TabixStorage {
    path: PathBuf,
    index_path: PathBuf,
    index: Box<dyn BinningIndex + Send + Sync>,
    header: Header,
    layout: ColumnLayout,
}

impl TabixStorage {
    /// Check for the data file and its index, then load the index.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::MissingIndex(path));
        }

        let index_path = Self::index_path(&path).ok_or_else(|| Error::MissingIndex(path.clone()))?;

        let index: Box<dyn BinningIndex + Send + Sync> =
            if index_path.extension().is_some_and(|ext| ext == CSI_EXTENSION) {
                Box::new(csi::r#async::read(&index_path).await.map_err(|e| {
                    Error::InvalidIndex(format!("failed to read CSI index: {}", e))
                })?)
            } else {
                Box::new(tabix::r#async::read(&index_path).await.map_err(|e| {
                    Error::InvalidIndex(format!("failed to read tabix index: {}", e))
                })?)
            };

        let header = index
            .header()
            .cloned()
            .ok_or_else(|| Error::InvalidIndex("index has no tabix header".to_string()))?;
        let layout = column_layout(&header);

        tracing::info!(
            path = %path.display(),
            index = %index_path.display(),
            reference_sequences = header.reference_sequence_names().len(),
            "loaded index"
        );

        Ok(Self {
            path,
            index_path,
            index,
            header,
            layout,
        })
    }

    /// Find the index for `path`.
    ///
    /// Appended names (`file.vcf.gz.tbi`) are tried before replaced
    /// extensions (`file.vcf.tbi`), and tabix before CSI.
    pub fn index_path(path: &Path) -> Option<PathBuf> {
        let appended = [TABIX_EXTENSION, CSI_EXTENSION].map(|ext| {
            let mut name = OsString::from(path.as_os_str());
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        });
        let replaced = [TABIX_EXTENSION, CSI_EXTENSION].map(|ext| path.with_extension(ext));

        appended
            .into_iter()
            .chain(replaced)
            .find(|candidate| candidate.is_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `.tbi` or `.csi` sidecar the index was loaded from.
    pub fn index_file(&self) -> &Path {
        &self.index_path
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Reference sequence names in index order.
    pub fn reference_sequence_names(&self) -> Vec<String> {
        self.header
            .reference_sequence_names()
            .iter()
            .cloned()
            .collect()
    }

    fn max_position(&self) -> u64 {
        let bits = u32::from(self.index.min_shift()) + 3 * u32::from(self.index.depth());
        (1u64 << bits.min(63)) - 1
    }
}

fn column_layout(header: &Header) -> ColumnLayout {
    let format = match header.format() {
        Format::Generic(CoordinateSystem::Bed) => RecordFormat::Bed,
        Format::Generic(CoordinateSystem::Gff) => RecordFormat::Gff,
        Format::Sam => RecordFormat::Sam,
        Format::Vcf => RecordFormat::Vcf,
    };

    ColumnLayout {
        format,
        reference_sequence_name_index: header.reference_sequence_name_index(),
        start_position_index: header.start_position_index(),
        end_position_index: header.end_position_index(),
        line_comment_prefix: header.line_comment_prefix(),
    }
}

/// Positional iterator over the index chunks of one query.
#[derive(Debug)]
pub struct TabixCursor {
    reference_name: Vec<u8>,
    start: u64,
    end: u64,
    chunks: Vec<Chunk>,
    next_chunk: usize,
    positioned: bool,
    done: bool,
}

impl TabixCursor {
    fn advance_chunk(&mut self) {
        self.next_chunk += 1;
        self.positioned = false;
    }
}

#[async_trait]
impl IndexedStorage for TabixStorage {
    type Handle = bgzf::r#async::Reader<File>;
    type Cursor = TabixCursor;

    async fn open_handle(&self) -> Result<Self::Handle> {
        let file = File::open(&self.path).await?;
        Ok(bgzf::r#async::Reader::new(file))
    }

    fn reference_sequence_id(&self, name: &str) -> Option<usize> {
        self.header.reference_sequence_names().get_index_of(name)
    }

    fn query(&self, id: usize, start: u64, end: u64) -> Result<Option<Self::Cursor>> {
        let max_position = self.max_position();
        if start >= end || start >= max_position {
            return Ok(None);
        }

        let reference_name = self
            .header
            .reference_sequence_names()
            .get_index(id)
            .map(|name| name.as_bytes().to_vec())
            .ok_or_else(|| Error::Iterator(format!("invalid reference sequence id: {}", id)))?;

        // Queries are 0-based half-open; noodles positions are 1-based closed.
        let interval_start = to_position(start + 1)?;
        let interval = if end > max_position {
            Interval::from(interval_start..)
        } else {
            Interval::from(interval_start..=to_position(end)?)
        };

        let chunks = self
            .index
            .query(id, interval)
            .map_err(|e| Error::Iterator(format!("index query failed: {}", e)))?;

        if chunks.is_empty() {
            return Ok(None);
        }

        tracing::trace!(id, start, end, chunks = chunks.len(), "positioned iterator");

        Ok(Some(TabixCursor {
            reference_name,
            start,
            end,
            chunks,
            next_chunk: 0,
            positioned: false,
            done: false,
        }))
    }

    async fn read_record(
        &self,
        reader: &mut Self::Handle,
        cursor: &mut Self::Cursor,
        buf: &mut Vec<u8>,
    ) -> Result<bool> {
        loop {
            if cursor.done {
                return Ok(false);
            }

            let Some(chunk) = cursor.chunks.get(cursor.next_chunk).copied() else {
                cursor.done = true;
                return Ok(false);
            };

            if !cursor.positioned {
                reader.seek(chunk.start()).await?;
                cursor.positioned = true;
            }

            if reader.virtual_position() >= chunk.end() {
                cursor.advance_chunk();
                continue;
            }

            buf.clear();
            if reader.read_until(b'\n', buf).await? == 0 {
                cursor.advance_chunk();
                continue;
            }
            trim_line_terminator(buf);

            if self.layout.is_comment(buf) {
                continue;
            }

            let span = self.layout.span(buf)?;
            if span.reference_name != cursor.reference_name.as_slice() || span.start >= cursor.end {
                // Records are sorted: nothing further can overlap.
                cursor.done = true;
                return Ok(false);
            }

            if !span.overlaps(cursor.start, cursor.end) {
                continue;
            }

            return Ok(true);
        }
    }
}

fn to_position(n: u64) -> Result<Position> {
    usize::try_from(n)
        .ok()
        .and_then(|n| Position::try_from(n).ok())
        .ok_or_else(|| Error::InvalidRange(format!("invalid position: {}", n)))
}

fn trim_line_terminator(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_terminator() {
        let mut buf = b"chr1\t1\r\n".to_vec();
        trim_line_terminator(&mut buf);
        assert_eq!(buf, b"chr1\t1");

        let mut buf = b"chr1\t1".to_vec();
        trim_line_terminator(&mut buf);
        assert_eq!(buf, b"chr1\t1");
    }

    #[test]
    fn test_index_path_conventions() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sample.vcf.gz");
        std::fs::write(&data, b"").unwrap();
        assert_eq!(TabixStorage::index_path(&data), None);

        let replaced = dir.path().join("sample.vcf.csi");
        std::fs::write(&replaced, b"").unwrap();
        assert_eq!(TabixStorage::index_path(&data), Some(replaced));

        let appended = dir.path().join("sample.vcf.gz.tbi");
        std::fs::write(&appended, b"").unwrap();
        assert_eq!(TabixStorage::index_path(&data), Some(appended));
    }

    #[tokio::test]
    async fn test_open_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sample.bed.gz");
        std::fs::write(&data, b"").unwrap();

        let result = TabixStorage::open(&data).await;
        assert!(matches!(result, Err(Error::MissingIndex(p)) if p == data));
    }

    #[tokio::test]
    async fn test_open_without_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("missing.vcf.gz");
        std::fs::write(dir.path().join("missing.vcf.gz.tbi"), b"").unwrap();

        let result = TabixStorage::open(&data).await;
        assert!(matches!(result, Err(Error::MissingIndex(_))));
    }

    #[test]
    fn test_to_position() {
        assert_eq!(usize::from(to_position(1).unwrap()), 1);
        assert!(to_position(0).is_err());
    }
}
