use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A genomic region with 0-based, half-open bounds.
///
/// Missing bounds extend to the start or end of the reference sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub reference_name: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn new(reference_name: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            reference_name: reference_name.into(),
            start: Some(start),
            end: Some(end),
        }
    }

    /// The whole of a reference sequence.
    pub fn whole(reference_name: impl Into<String>) -> Self {
        Self {
            reference_name: reference_name.into(),
            start: None,
            end: None,
        }
    }

    /// Resolved `[start, end)` bounds.
    pub fn bounds(&self) -> (u64, u64) {
        (self.start.unwrap_or(0), self.end.unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => write!(f, "{}", self.reference_name),
            (start, end) => write!(
                f,
                "{}:{}-{}",
                self.reference_name,
                start.unwrap_or(0),
                end.map(|e| e.to_string()).unwrap_or_default()
            ),
        }
    }
}

/// Parses `name`, `name:start-end` or `name:start-`, with 0-based half-open
/// coordinates.
impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((name, (start, end))) = s
            .rsplit_once(':')
            .and_then(|(name, range)| Some((name, range.split_once('-')?)))
            .filter(|(_, (start, _))| is_position(start))
        else {
            // No range suffix. Names may contain `:` themselves, as in HLA-A*01:01.
            return Ok(Region::whole(s));
        };

        let start = start
            .parse::<u64>()
            .map_err(|e| Error::InvalidRange(format!("invalid start position: {}", e)))?;

        let end = if end.is_empty() {
            None
        } else {
            Some(
                end.parse::<u64>()
                    .map_err(|e| Error::InvalidRange(format!("invalid end position: {}", e)))?,
            )
        };

        if name.is_empty() {
            return Err(Error::InvalidRange(format!("missing reference name in {}", s)));
        }

        Ok(Region {
            reference_name: name.to_string(),
            start: Some(start),
            end,
        })
    }
}

fn is_position(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
