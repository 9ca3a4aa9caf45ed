/// Damage classifier: decides whether a decoded event counts toward a query
/// and, if it does, which accounting buckets it lands in.
///
/// Every counted event produces two magnitudes (effective, theoretical), one of
/// four hit categories, and an ability key that records whether the queried
/// unit itself or one of its controlled units was the source.
use crate::parser::{DamageEvent, EventFlag};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Ability key
// ---------------------------------------------------------------------------

/// Ability id plus "cast by a controlled unit" marker.
///
/// At the output boundary the key is the signed ability id: `+id` for the
/// queried unit, `-id` for its pets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbilityKey {
    pub ability_id: u32,
    pub pet:        bool,
}

impl AbilityKey {
    pub fn owner(ability_id: u32) -> Self {
        Self { ability_id, pet: false }
    }

    pub fn pet(ability_id: u32) -> Self {
        Self { ability_id, pet: true }
    }

    pub fn signed(self) -> i64 {
        let id = i64::from(self.ability_id);
        if self.pet { -id } else { id }
    }

    /// `None` when the magnitude does not fit an ability id.
    pub fn from_signed(value: i64) -> Option<Self> {
        let ability_id = u32::try_from(value.unsigned_abs()).ok()?;
        Some(Self { ability_id, pet: value < 0 })
    }

    /// Same ability attributed to the owner.
    pub fn as_owner(self) -> Self {
        Self::owner(self.ability_id)
    }
}

impl fmt::Display for AbilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signed())
    }
}

impl Serialize for AbilityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.signed())
    }
}

impl<'de> Deserialize<'de> for AbilityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::from_signed(value)
            .ok_or_else(|| serde::de::Error::custom(format!("ability id out of range: {}", value)))
    }
}

// ---------------------------------------------------------------------------
// Hit category
// ---------------------------------------------------------------------------

/// Bucket order is fixed: consumers index by `index()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitCategory {
    DirectHit    = 0,
    DirectCrit   = 1,
    PeriodicHit  = 2,
    PeriodicCrit = 3,
}

impl HitCategory {
    pub const ALL: [HitCategory; 4] = [
        Self::DirectHit,
        Self::DirectCrit,
        Self::PeriodicHit,
        Self::PeriodicCrit,
    ];

    pub fn of(flag: EventFlag, critical: bool) -> Self {
        match (flag.is_periodic(), critical) {
            (false, false) => Self::DirectHit,
            (false, true)  => Self::DirectCrit,
            (true,  false) => Self::PeriodicHit,
            (true,  true)  => Self::PeriodicCrit,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_crit(self) -> bool {
        matches!(self, Self::DirectCrit | Self::PeriodicCrit)
    }

    pub fn is_periodic(self) -> bool {
        matches!(self, Self::PeriodicHit | Self::PeriodicCrit)
    }
}

// ---------------------------------------------------------------------------
// Query context and classification
// ---------------------------------------------------------------------------

/// Read-only context shared by every classification of one query.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Source units counted as "mine": the main unit and everything it controls.
    pub filter_ids:    &'a HashSet<String>,
    /// Unit whose own casts keep a positive ability key.
    pub main_id:       &'a str,
    /// Keep only targets whose id contains this substring.
    pub target_filter: Option<&'a str>,
}

impl<'a> QueryContext<'a> {
    pub fn new(filter_ids: &'a HashSet<String>, main_id: &'a str, target_filter: Option<&'a str>) -> Self {
        Self {
            filter_ids,
            main_id,
            target_filter: target_filter.filter(|t| !t.is_empty()),
        }
    }

    /// Split damage is skipped, and only "my" units count as sources.
    pub fn admits_source(&self, event: &DamageEvent) -> bool {
        event.flag != EventFlag::DamageSplit && self.filter_ids.contains(event.source_id)
    }

    /// With a target filter only matching targets count; without one, damage
    /// to any of "my" units is friendly fire and does not count.
    pub fn admits_target(&self, event: &DamageEvent) -> bool {
        match self.target_filter {
            Some(needle) => event.target_id.contains(needle),
            None         => !self.filter_ids.contains(event.target_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedHit {
    pub key:         AbilityKey,
    pub category:    HitCategory,
    pub effective:   u64,
    pub theoretical: u64,
}

pub fn classify(event: &DamageEvent, ctx: &QueryContext) -> Option<ClassifiedHit> {
    if !ctx.admits_source(event) || !ctx.admits_target(event) {
        return None;
    }

    let key = if event.source_id == ctx.main_id {
        AbilityKey::owner(event.ability_id)
    } else {
        AbilityKey::pet(event.ability_id)
    };

    Some(ClassifiedHit {
        key,
        category:    HitCategory::of(event.flag, event.critical),
        effective:   event.effective(),
        theoretical: event.theoretical(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn event<'a>(flag: EventFlag, source: &'a str, target: &'a str, critical: bool) -> DamageEvent<'a> {
        DamageEvent {
            flag,
            source_id:  source,
            target_id:  target,
            ability_id: 500,
            amount:     100,
            overkill:   0,
            resisted:   0,
            absorbed:   50,
            critical,
        }
    }

    fn mine() -> HashSet<String> {
        ["P1".to_owned(), "P1PET".to_owned()].into_iter().collect()
    }

    #[test]
    fn classifies_direct_crit_from_main_unit() {
        let ids = mine();
        let ctx = QueryContext::new(&ids, "P1", None);
        let hit = classify(&event(EventFlag::DirectDamage, "P1", "BOSS", true), &ctx).unwrap();
        assert_eq!(hit.key,         AbilityKey::owner(500));
        assert_eq!(hit.key.signed(), 500);
        assert_eq!(hit.category,    HitCategory::DirectCrit);
        assert_eq!(hit.effective,   100);
        assert_eq!(hit.theoretical, 150);
    }

    #[test]
    fn pet_casts_get_negative_key() {
        let ids = mine();
        let ctx = QueryContext::new(&ids, "P1", None);
        let hit = classify(&event(EventFlag::PeriodicDamage, "P1PET", "BOSS", false), &ctx).unwrap();
        assert_eq!(hit.key.signed(), -500);
        assert_eq!(hit.category, HitCategory::PeriodicHit);
        assert_ne!(hit.key, AbilityKey::owner(500));
    }

    #[test]
    fn rejects_split_foreign_and_friendly() {
        let ids = mine();
        let ctx = QueryContext::new(&ids, "P1", None);
        assert!(classify(&event(EventFlag::DamageSplit, "P1", "BOSS", false), &ctx).is_none());
        assert!(classify(&event(EventFlag::DirectDamage, "P2", "BOSS", false), &ctx).is_none());
        assert!(classify(&event(EventFlag::DirectDamage, "P1", "P1PET", false), &ctx).is_none());
    }

    #[test]
    fn target_filter_replaces_friendly_check() {
        let ids = mine();
        let ctx = QueryContext::new(&ids, "P1", Some("BO"));
        assert!(classify(&event(EventFlag::DirectDamage, "P1", "BOSS", false), &ctx).is_some());
        assert!(classify(&event(EventFlag::DirectDamage, "P1", "ADD", false), &ctx).is_none());

        let empty = QueryContext::new(&ids, "P1", Some(""));
        assert!(empty.target_filter.is_none());
    }

    #[test]
    fn exactly_one_category_per_flag_and_crit() {
        let flags = [
            EventFlag::DirectDamage, EventFlag::PeriodicDamage, EventFlag::PeriodicEnergize,
            EventFlag::PeriodicHeal, EventFlag::PeriodicLeech,  EventFlag::PeriodicMissed,
            EventFlag::DamageSplit,  EventFlag::Other,
        ];
        for flag in flags {
            for critical in [false, true] {
                let cat = HitCategory::of(flag, critical);
                assert_eq!(cat.is_crit(), critical);
                assert_eq!(cat.is_periodic(), flag.is_periodic());
                assert_eq!(HitCategory::ALL[cat.index()], cat);
            }
        }
    }

    #[test]
    fn ability_key_signed_round_trip() {
        assert_eq!(AbilityKey::from_signed(-500), Some(AbilityKey::pet(500)));
        assert_eq!(AbilityKey::from_signed(500),  Some(AbilityKey::owner(500)));
        assert_eq!(AbilityKey::pet(500).as_owner(), AbilityKey::owner(500));
        assert!(AbilityKey::from_signed(i64::MAX).is_none());
        assert_eq!(serde_json::to_string(&AbilityKey::pet(7)).unwrap(), "-7");
    }
}
