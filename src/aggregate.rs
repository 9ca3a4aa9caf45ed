/// Segment aggregator: one pass over a line range, folding every counted
/// damage event into per-ability accumulators.
///
/// Pipeline per line: decode -> classify -> record. The fold touches nothing
/// outside the returned `DamageBreakdown`, so independent segments can be
/// aggregated concurrently.
use crate::classify::{classify, AbilityKey, ClassifiedHit, HitCategory, QueryContext};
use crate::parser::{try_decode, EventFlag};
use crate::stats::{hit_split, HitSplit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Effective amounts of one ability, in chronological order, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityHits {
    pub direct_hit:    Vec<u64>,
    pub direct_crit:   Vec<u64>,
    pub periodic_hit:  Vec<u64>,
    pub periodic_crit: Vec<u64>,
}

impl AbilityHits {
    pub fn get(&self, category: HitCategory) -> &[u64] {
        match category {
            HitCategory::DirectHit    => &self.direct_hit,
            HitCategory::DirectCrit   => &self.direct_crit,
            HitCategory::PeriodicHit  => &self.periodic_hit,
            HitCategory::PeriodicCrit => &self.periodic_crit,
        }
    }

    fn bucket_mut(&mut self, category: HitCategory) -> &mut Vec<u64> {
        match category {
            HitCategory::DirectHit    => &mut self.direct_hit,
            HitCategory::DirectCrit   => &mut self.direct_crit,
            HitCategory::PeriodicHit  => &mut self.periodic_hit,
            HitCategory::PeriodicCrit => &mut self.periodic_crit,
        }
    }

    pub fn push(&mut self, category: HitCategory, amount: u64) {
        self.bucket_mut(category).push(amount);
    }

    /// Append every bucket of `other` after the samples already held.
    pub fn extend_from(&mut self, other: &AbilityHits) {
        for category in HitCategory::ALL {
            self.bucket_mut(category).extend_from_slice(other.get(category));
        }
    }

    pub fn count(&self) -> usize {
        HitCategory::ALL.iter().map(|c| self.get(*c).len()).sum()
    }

    pub fn effective_total(&self) -> u64 {
        HitCategory::ALL
            .iter()
            .flat_map(|c| self.get(*c))
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn summary(&self) -> AbilitySummary {
        AbilitySummary {
            direct:   hit_split(&self.direct_hit, &self.direct_crit),
            periodic: hit_split(&self.periodic_hit, &self.periodic_crit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbilitySummary {
    pub direct:   HitSplit,
    pub periodic: HitSplit,
}

/// Result of one damage query over one or more segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageBreakdown {
    /// Pre-mitigation totals per ability.
    pub theoretical:  BTreeMap<AbilityKey, u64>,
    pub hits:         BTreeMap<AbilityKey, AbilityHits>,
    /// Every target hit by "my" units, seen before target filtering.
    pub targets_seen: BTreeSet<String>,
}

impl DamageBreakdown {
    pub fn record(&mut self, hit: ClassifiedHit) {
        let total = self.theoretical.entry(hit.key).or_default();
        *total = total.saturating_add(hit.theoretical);
        self.hits.entry(hit.key).or_default().push(hit.category, hit.effective);
    }

    pub fn is_empty(&self) -> bool {
        self.theoretical.is_empty() && self.hits.is_empty() && self.targets_seen.is_empty()
    }

    pub fn ability(&self, key: AbilityKey) -> Option<&AbilityHits> {
        self.hits.get(&key)
    }

    pub fn effective_totals(&self) -> BTreeMap<AbilityKey, u64> {
        self.hits
            .iter()
            .map(|(key, hits)| (*key, hits.effective_total()))
            .collect()
    }

    /// Damage lost to resists, absorbs and overkill for one ability.
    pub fn mitigated(&self, key: AbilityKey) -> u64 {
        let theoretical = self.theoretical.get(&key).copied().unwrap_or(0);
        let effective   = self.hits.get(&key).map(AbilityHits::effective_total).unwrap_or(0);
        theoretical.saturating_sub(effective)
    }

    pub fn total_effective(&self) -> u64 {
        self.hits
            .values()
            .map(AbilityHits::effective_total)
            .fold(0, u64::saturating_add)
    }

    pub fn total_theoretical(&self) -> u64 {
        self.theoretical.values().fold(0, |acc, v| acc.saturating_add(*v))
    }
}

// ---------------------------------------------------------------------------
// Folds
// ---------------------------------------------------------------------------

pub fn aggregate<I>(lines: I, ctx: &QueryContext) -> DamageBreakdown
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out = DamageBreakdown::default();

    for line in lines {
        let line = line.as_ref();
        let event = match try_decode(line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::trace!("Skipping malformed line: {}", e);
                continue;
            }
        };

        if !ctx.admits_source(&event) {
            continue;
        }
        if !out.targets_seen.contains(event.target_id) {
            out.targets_seen.insert(event.target_id.to_owned());
        }

        if let Some(hit) = classify(&event, ctx) {
            out.record(hit);
        }
    }
    out
}

/// Effective damage per source unit, all sources.
pub type UnitTotals = BTreeMap<String, u64>;

/// Sum effective damage per source unit, leaving out split damage and damage
/// dealt to `friendly` units.
pub fn aggregate_units<I>(lines: I, friendly: &HashSet<String>) -> UnitTotals
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut totals = UnitTotals::new();
    for line in lines {
        let Ok(Some(event)) = try_decode(line.as_ref()) else {
            continue;
        };
        if event.flag == EventFlag::DamageSplit || friendly.contains(event.target_id) {
            continue;
        }
        let total = totals.entry(event.source_id.to_owned()).or_default();
        *total = total.saturating_add(event.effective());
    }
    totals
}
