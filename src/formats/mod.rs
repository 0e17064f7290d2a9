//! Record coordinates for tab-delimited, position-sorted formats.
//!
//! A tabix index records which columns of a line hold the reference sequence
//! name and the start and end positions, and how those positions are counted.
//! [`ColumnLayout`] captures that description and computes the 0-based,
//! half-open span of a record line so a positional iterator can decide
//! whether the record overlaps a query.
//!
//! # Supported Formats
//!
//! - [`RecordFormat::Bed`] - generic, 0-based start, exclusive end
//! - [`RecordFormat::Gff`] - generic, 1-based start, inclusive end
//! - [`RecordFormat::Vcf`] - end from `REF` length or the `INFO` `END` key
//! - [`RecordFormat::Sam`] - end from the reference length of the CIGAR

mod sam;
mod vcf;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Bed,
    Gff,
    Vcf,
    Sam,
}

/// Column layout of the records in an indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub format: RecordFormat,
    pub reference_sequence_name_index: usize,
    pub start_position_index: usize,
    pub end_position_index: Option<usize>,
    pub line_comment_prefix: u8,
}

/// Where a record sits: its reference sequence and 0-based, half-open span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan<'a> {
    pub reference_name: &'a [u8],
    pub start: u64,
    pub end: u64,
}

impl RecordSpan<'_> {
    /// Whether this record overlaps `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && self.end > start
    }
}

impl ColumnLayout {
    pub fn vcf() -> Self {
        Self {
            format: RecordFormat::Vcf,
            reference_sequence_name_index: 0,
            start_position_index: 1,
            end_position_index: None,
            line_comment_prefix: b'#',
        }
    }

    pub fn bed() -> Self {
        Self {
            format: RecordFormat::Bed,
            reference_sequence_name_index: 0,
            start_position_index: 1,
            end_position_index: Some(2),
            line_comment_prefix: b'#',
        }
    }

    pub fn gff() -> Self {
        Self {
            format: RecordFormat::Gff,
            reference_sequence_name_index: 0,
            start_position_index: 3,
            end_position_index: Some(4),
            line_comment_prefix: b'#',
        }
    }

    pub fn sam() -> Self {
        Self {
            format: RecordFormat::Sam,
            reference_sequence_name_index: 2,
            start_position_index: 3,
            end_position_index: None,
            line_comment_prefix: b'@',
        }
    }

    pub fn is_comment(&self, line: &[u8]) -> bool {
        line.is_empty() || line[0] == self.line_comment_prefix
    }

    /// Compute the span of one record line (without its line terminator).
    pub fn span<'a>(&self, line: &'a [u8]) -> Result<RecordSpan<'a>> {
        let fields: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();

        let reference_name = field(&fields, self.reference_sequence_name_index, "reference name")?;
        let raw_start = parse_position(field(&fields, self.start_position_index, "start")?)?;

        let (start, end) = match self.format {
            RecordFormat::Bed => {
                let end = self.end_column(&fields)?.unwrap_or(raw_start + 1);
                (raw_start, end)
            }
            RecordFormat::Gff => {
                let start = one_based(raw_start)?;
                let end = self.end_column(&fields)?.unwrap_or(start + 1);
                (start, end)
            }
            RecordFormat::Vcf => {
                let start = one_based(raw_start)?;
                (start, vcf::end(&fields, start))
            }
            RecordFormat::Sam => {
                let start = one_based(raw_start)?;
                let cigar = field(&fields, sam::CIGAR_INDEX, "CIGAR")?;
                (start, start + sam::reference_len(cigar)?)
            }
        };

        Ok(RecordSpan {
            reference_name,
            start,
            end: end.max(start + 1),
        })
    }

    fn end_column(&self, fields: &[&[u8]]) -> Result<Option<u64>> {
        self.end_position_index
            .map(|i| field(fields, i, "end").and_then(parse_position))
            .transpose()
    }
}

fn field<'a>(fields: &[&'a [u8]], i: usize, name: &str) -> Result<&'a [u8]> {
    fields
        .get(i)
        .copied()
        .ok_or_else(|| Error::Iterator(format!("record has no {} column ({})", name, i + 1)))
}

pub(crate) fn parse_position(field: &[u8]) -> Result<u64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            Error::Iterator(format!(
                "invalid position: {}",
                String::from_utf8_lossy(field)
            ))
        })
}

fn one_based(position: u64) -> Result<u64> {
    position
        .checked_sub(1)
        .ok_or_else(|| Error::Iterator("position 0 in a 1-based column".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bed_span() {
        let span = ColumnLayout::bed().span(b"chr1\t100\t250\tpeak1").unwrap();
        assert_eq!(span.reference_name, b"chr1");
        assert_eq!((span.start, span.end), (100, 250));
        assert!(span.overlaps(249, 300));
        assert!(!span.overlaps(250, 300));
        assert!(!span.overlaps(0, 100));
    }

    #[test]
    fn test_gff_span() {
        let line = b"chr2\tsrc\tgene\t1001\t2000\t.\t+\t.\tID=g1";
        let span = ColumnLayout::gff().span(line).unwrap();
        assert_eq!(span.reference_name, b"chr2");
        assert_eq!((span.start, span.end), (1000, 2000));
    }

    #[test]
    fn test_vcf_span_uses_ref_length() {
        let line = b"1\t915416\trs1\tACGT\tA\t50\tPASS\tDP=10";
        let span = ColumnLayout::vcf().span(line).unwrap();
        assert_eq!((span.start, span.end), (915415, 915419));
    }

    #[test]
    fn test_zero_length_span_is_widened() {
        let span = ColumnLayout::bed().span(b"chr1\t10\t10").unwrap();
        assert_eq!((span.start, span.end), (10, 11));
    }

    #[test]
    fn test_comment_lines() {
        let layout = ColumnLayout::vcf();
        assert!(layout.is_comment(b"#CHROM\tPOS"));
        assert!(layout.is_comment(b""));
        assert!(!layout.is_comment(b"chr1\t1"));
        assert!(ColumnLayout::sam().is_comment(b"@HD\tVN:1.6"));
    }

    #[test]
    fn test_malformed_records() {
        let layout = ColumnLayout::vcf();
        assert!(matches!(layout.span(b"chr1"), Err(Error::Iterator(_))));
        assert!(matches!(layout.span(b"chr1\tabc\t.\tA"), Err(Error::Iterator(_))));
        assert!(matches!(layout.span(b"chr1\t0\t.\tA"), Err(Error::Iterator(_))));
    }
}
