/// Derived statistics over effective-amount hit lists, for reporting.
///
/// All arithmetic is integer; percentile windows truncate (`len / 10`,
/// `len / 2`) with a floor of one sample. Inputs are never reordered; each
/// call sorts its own copy.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HitStats {
    pub count:    usize,
    pub average:  u64,
    pub max:      u64,
    pub top10:    u64,
    pub top50:    u64,
    pub bottom50: u64,
    pub bottom10: u64,
    pub min:      u64,
}

fn mean(samples: &[u64]) -> u64 {
    let sum: u128 = samples.iter().map(|v| u128::from(*v)).sum();
    (sum / samples.len() as u128) as u64
}

/// `None` for an empty list.
pub fn hit_stats(hits: &[u64]) -> Option<HitStats> {
    if hits.is_empty() {
        return None;
    }
    let mut sorted = hits.to_vec();
    sorted.sort_unstable();

    let len   = sorted.len();
    let len10 = (len / 10).max(1);
    let len50 = (len / 2).max(1);

    Some(HitStats {
        count:    len,
        average:  mean(&sorted),
        max:      sorted[len - 1],
        top10:    mean(&sorted[len - len10..]),
        top50:    mean(&sorted[len - len50..]),
        bottom50: mean(&sorted[..len50]),
        bottom10: mean(&sorted[..len10]),
        min:      sorted[0],
    })
}

/// Normal vs critical hits of one kind (direct or periodic).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitSplit {
    pub hits:       usize,
    pub crits:      usize,
    pub hit_stats:  Option<HitStats>,
    pub crit_stats: Option<HitStats>,
    /// Percentage of critical hits; absent when nothing crit.
    pub crit_rate:  Option<f64>,
}

pub fn hit_split(hits: &[u64], crits: &[u64]) -> HitSplit {
    let crit_rate = if crits.is_empty() {
        None
    } else {
        Some(crits.len() as f64 / (hits.len() + crits.len()) as f64 * 100.0)
    };
    HitSplit {
        hits:       hits.len(),
        crits:      crits.len(),
        hit_stats:  hit_stats(hits),
        crit_stats: hit_stats(crits),
        crit_rate,
    }
}
