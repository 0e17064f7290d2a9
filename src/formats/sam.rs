use crate::{Error, Result};

pub(super) const CIGAR_INDEX: usize = 5;

/// Number of reference bases covered by a CIGAR string.
///
/// `M`, `D`, `N`, `=` and `X` consume the reference. An unavailable CIGAR
/// (`*`) covers a single base.
pub(super) fn reference_len(cigar: &[u8]) -> Result<u64> {
    if cigar == b"*" {
        return Ok(1);
    }

    let mut len = 0u64;
    let mut n = 0u64;
    let mut has_digits = false;

    for &b in cigar {
        match b {
            b'0'..=b'9' => {
                n = n
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(u64::from(b - b'0')))
                    .ok_or_else(|| invalid(cigar))?;
                has_digits = true;
            }
            b'M' | b'D' | b'N' | b'=' | b'X' | b'I' | b'S' | b'H' | b'P' => {
                if !has_digits {
                    return Err(invalid(cigar));
                }
                if matches!(b, b'M' | b'D' | b'N' | b'=' | b'X') {
                    len += n;
                }
                n = 0;
                has_digits = false;
            }
            _ => return Err(invalid(cigar)),
        }
    }

    if has_digits {
        return Err(invalid(cigar));
    }

    Ok(len.max(1))
}

fn invalid(cigar: &[u8]) -> Error {
    Error::Iterator(format!("invalid CIGAR: {}", String::from_utf8_lossy(cigar)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_len() {
        assert_eq!(reference_len(b"10M").unwrap(), 10);
        assert_eq!(reference_len(b"5S20M3I10M2D5M").unwrap(), 37);
        assert_eq!(reference_len(b"3M100N4M").unwrap(), 107);
        assert_eq!(reference_len(b"*").unwrap(), 1);
    }

    #[test]
    fn test_soft_clip_only_covers_one_base() {
        assert_eq!(reference_len(b"50S").unwrap(), 1);
    }

    #[test]
    fn test_invalid_cigar() {
        assert!(reference_len(b"M").is_err());
        assert!(reference_len(b"10").is_err());
        assert!(reference_len(b"10Q").is_err());
    }
}
