use super::parse_position;

const REFERENCE_BASES_INDEX: usize = 3;
const INFO_INDEX: usize = 7;

/// Exclusive end of a VCF record starting at 0-based `start`.
///
/// An `END` key in `INFO` wins over the length of the reference bases.
pub(super) fn end(fields: &[&[u8]], start: u64) -> u64 {
    if let Some(end) = fields.get(INFO_INDEX).and_then(|info| info_end(info)) {
        if end > start {
            return end;
        }
    }

    let len = fields
        .get(REFERENCE_BASES_INDEX)
        .map(|bases| bases.len() as u64)
        .unwrap_or(1);

    start + len.max(1)
}

fn info_end(info: &[u8]) -> Option<u64> {
    info.split(|&b| b == b';')
        .find_map(|entry| entry.strip_prefix(b"END="))
        .and_then(|value| parse_position(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &'static [u8]) -> Vec<&'static [u8]> {
        line.split(|&b| b == b'\t').collect()
    }

    #[test]
    fn test_end_from_reference_bases() {
        let f = fields(b"chr1\t100\t.\tAC\tA\t.\tPASS\tDP=3");
        assert_eq!(end(&f, 99), 101);
    }

    #[test]
    fn test_end_from_info() {
        let f = fields(b"chr1\t100\t.\tN\t<DEL>\t.\tPASS\tSVTYPE=DEL;END=500;SVLEN=-400");
        assert_eq!(end(&f, 99), 500);
    }

    #[test]
    fn test_info_end_before_start_is_ignored() {
        let f = fields(b"chr1\t100\t.\tA\tT\t.\tPASS\tEND=50");
        assert_eq!(end(&f, 99), 100);
    }

    #[test]
    fn test_sites_only_record() {
        let f = fields(b"chr1\t100");
        assert_eq!(end(&f, 99), 100);
    }

    #[test]
    fn test_similar_keys_are_not_end() {
        assert_eq!(info_end(b"BLEND=7;XEND=9"), None);
        assert_eq!(info_end(b"DP=1;END=42"), Some(42));
    }
}
