/// Line-range segments supplied by the fight-boundary detector.
///
/// Encounter files map an encounter name to its attempts:
///
///   { "Lord Marrowgar": [[1200, 5400], [9000, 15320]] }
///
/// Ranges are half-open line indices into one loaded log.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Segment {
    pub start: usize,
    pub end:   usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The range actually touched in a log of `len` lines. Durations and
    /// aggregation both use this range so their boundaries agree.
    pub fn clamp(self, len: usize) -> Range<usize> {
        let end   = self.end.min(len);
        let start = self.start.min(end);
        start..end
    }

    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

impl From<(usize, usize)> for Segment {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl From<Segment> for (usize, usize) {
    fn from(s: Segment) -> Self {
        (s.start, s.end)
    }
}

/// Encounter name -> attempts, in log order.
pub type EncounterSegments = BTreeMap<String, Vec<Segment>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_log_length() {
        assert_eq!(Segment::new(2, 8).clamp(10), 2..8);
        assert_eq!(Segment::new(2, 80).clamp(10), 2..10);
        assert_eq!(Segment::new(20, 80).clamp(10), 10..10);
        assert_eq!(Segment::new(5, 3).clamp(10), 3..3);
        assert!(Segment::new(5, 5).is_empty());
    }

    #[test]
    fn reads_encounter_file() {
        let raw = r#"{ "Lord Marrowgar": [[1200, 5400], [9000, 15320]] }"#;
        let enc: EncounterSegments = serde_json::from_str(raw).unwrap();
        assert_eq!(enc["Lord Marrowgar"], vec![Segment::new(1200, 5400), Segment::new(9000, 15320)]);
    }
}
