/// Multi-segment combiner: merges per-segment results into one, and folds
/// pet damage into owners on request.
///
/// Combined results keep the pet/owner split of their inputs. The "by player"
/// view is produced from a combined result on demand, so the same combined
/// value can serve both views.
use crate::aggregate::{AbilityHits, DamageBreakdown, UnitTotals};
use crate::identity::IdentityResolver;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineView {
    /// Pet-cast abilities stay under their own (negative) keys.
    #[default]
    ByPet,
    /// Pet-cast abilities merge into the owner's key.
    ByPlayer,
}

/// Element-wise union in caller order: sums add, hit lists concatenate,
/// target sets union.
pub fn combine<I, B>(results: I) -> DamageBreakdown
where
    I: IntoIterator<Item = B>,
    B: Borrow<DamageBreakdown>,
{
    let mut out = DamageBreakdown::default();
    for result in results {
        merge_into(&mut out, result.borrow());
    }
    out
}

fn merge_into(out: &mut DamageBreakdown, other: &DamageBreakdown) {
    for (key, amount) in &other.theoretical {
        let total = out.theoretical.entry(*key).or_default();
        *total = total.saturating_add(*amount);
    }
    for (key, hits) in &other.hits {
        out.hits.entry(*key).or_default().extend_from(hits);
    }
    out.targets_seen.extend(other.targets_seen.iter().cloned());
}

/// Render a combined result in the requested view.
pub fn view(breakdown: &DamageBreakdown, view: CombineView) -> DamageBreakdown {
    match view {
        CombineView::ByPet    => breakdown.clone(),
        CombineView::ByPlayer => fold_pets(breakdown),
    }
}

/// Merge every pet-cast ability into the owner-cast key of the same id. For a
/// given id the owner's samples come first, then the pet's.
pub fn fold_pets(breakdown: &DamageBreakdown) -> DamageBreakdown {
    let mut out = DamageBreakdown {
        targets_seen: breakdown.targets_seen.clone(),
        ..DamageBreakdown::default()
    };
    for (key, amount) in &breakdown.theoretical {
        let total = out.theoretical.entry(key.as_owner()).or_default();
        *total = total.saturating_add(*amount);
    }
    // Keys iterate owner-before-pet for equal ids
    for (key, hits) in &breakdown.hits {
        out.hits
            .entry(key.as_owner())
            .or_insert_with(AbilityHits::default)
            .extend_from(hits);
    }
    out
}

/// Sum per-unit totals across segments.
pub fn combine_units<I, B>(results: I) -> UnitTotals
where
    I: IntoIterator<Item = B>,
    B: Borrow<UnitTotals>,
{
    let mut out = UnitTotals::new();
    for totals in results {
        for (unit, amount) in totals.borrow() {
            let total = out.entry(unit.clone()).or_default();
            *total = total.saturating_add(*amount);
        }
    }
    out
}

/// Credit every unit's total to its resolved owner. Units missing from the
/// identity table keep their own entry.
pub fn fold_into_owners(totals: &UnitTotals, resolver: &IdentityResolver) -> UnitTotals {
    let mut out = UnitTotals::new();
    for (unit, amount) in totals {
        let owner = match resolver.owner_of_id(unit) {
            Some(owner) => owner.to_owned(),
            None => {
                tracing::debug!("Keeping {} unfolded: not in the identity table", unit);
                unit.clone()
            }
        };
        let total = out.entry(owner).or_default();
        *total = total.saturating_add(*amount);
    }
    out
}
