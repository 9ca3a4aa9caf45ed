/// Serializable views of query results, as printed by the binary.
use crate::aggregate::{AbilitySummary, DamageBreakdown, UnitTotals};
use crate::classify::AbilityKey;
use crate::combine::CombineView;
use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::segment::Segment;
use crate::session::LogSession;
use serde::Serialize;
use std::cmp::Reverse;

#[derive(Debug, Serialize)]
pub struct AbilityReport {
    /// Signed ability id: negative for pet casts.
    pub ability:     AbilityKey,
    pub effective:   u64,
    pub theoretical: u64,
    pub mitigated:   u64,
    pub summary:     AbilitySummary,
}

#[derive(Debug, Serialize)]
pub struct NamedUnit {
    pub id:   String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BreakdownReport {
    pub log:               String,
    pub player:            NamedUnit,
    pub view:              CombineView,
    pub segments:          Vec<Segment>,
    pub duration_secs:     f64,
    pub total_effective:   u64,
    pub total_theoretical: u64,
    /// Sorted by effective damage, highest first.
    pub abilities:         Vec<AbilityReport>,
    pub targets:           Vec<NamedUnit>,
}

impl BreakdownReport {
    pub fn build(
        session:       &LogSession,
        segments:      &[Segment],
        player:        &str,
        target_filter: Option<&str>,
        view:          CombineView,
    ) -> Result<Self> {
        let identity = session.identity();
        let player_id = identity.resolve(player)?.to_owned();
        let breakdown = session.player_damage_all(segments, &player_id, target_filter, view)?;
        let targets = session.player_targets(segments, &player_id)?;

        Ok(Self {
            log:               session.name().to_owned(),
            player:            named(identity, player_id),
            view,
            segments:          segments.to_vec(),
            duration_secs:     session.total_duration(segments),
            total_effective:   breakdown.total_effective(),
            total_theoretical: breakdown.total_theoretical(),
            abilities:         ability_reports(&breakdown),
            targets:           targets.into_iter().map(|t| named(identity, t)).collect(),
        })
    }
}

pub fn ability_reports(breakdown: &DamageBreakdown) -> Vec<AbilityReport> {
    let mut rows: Vec<AbilityReport> = breakdown
        .hits
        .iter()
        .map(|(key, hits)| AbilityReport {
            ability:     *key,
            effective:   hits.effective_total(),
            theoretical: breakdown.theoretical.get(key).copied().unwrap_or(0),
            mitigated:   breakdown.mitigated(*key),
            summary:     hits.summary(),
        })
        .collect();
    rows.sort_by_key(|r| (Reverse(r.effective), r.ability));
    rows
}

#[derive(Debug, Serialize)]
pub struct UnitTotalRow {
    pub unit:      NamedUnit,
    pub effective: u64,
}

/// Per-unit totals with display names, highest first.
pub fn unit_rows(totals: &UnitTotals, identity: &IdentityResolver) -> Vec<UnitTotalRow> {
    let mut rows: Vec<UnitTotalRow> = totals
        .iter()
        .map(|(id, amount)| UnitTotalRow { unit: named(identity, id.clone()), effective: *amount })
        .collect();
    rows.sort_by_key(|r| Reverse(r.effective));
    rows
}

fn named(identity: &IdentityResolver, id: String) -> NamedUnit {
    let name = identity.group_name(&id).map(str::to_owned);
    NamedUnit { id, name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityConfig, UnitRecord, UnitTable};
    use crate::session::SessionOptions;

    const P1:  &str = "0x0600000000000001";
    const PET: &str = "0xF140000001000001";
    const B1:  &str = "0xF130008F46000001";

    fn line(source: &str, ability: u32, amount: u64, crit: bool) -> String {
        format!(
            "4/29 21:05:{:02}.000,SPELL_DAMAGE,{source},Src,{B1},Tgt,{ability},Spell,0x1,{amount},0,0x1,10,0,0,{},nil",
            amount % 60,
            if crit { "1" } else { "nil" }
        )
    }

    fn session() -> LogSession {
        let mut units = UnitTable::new();
        units.insert(P1.into(),  UnitRecord { name: "Stonebraid".into(), master_id: None });
        units.insert(PET.into(), UnitRecord { name: "Wolf".into(), master_id: Some(P1.into()) });
        units.insert(B1.into(),  UnitRecord { name: "Marrowgar".into(), master_id: None });
        let lines = vec![
            line(P1, 500, 10, false),
            line(P1, 500, 30, true),
            line(PET, 500, 5, false),
            line(P1, 600, 50, false),
        ];
        let options = SessionOptions { log_year: 2022, parallel_segments: false };
        LogSession::new("raid", lines, IdentityResolver::new(units, IdentityConfig::default()), options)
    }

    #[test]
    fn report_sorts_abilities_and_names_targets() {
        let s = session();
        let report = BreakdownReport::build(&s, &[Segment::new(0, 4)], "Stonebraid", None, CombineView::ByPet).unwrap();

        assert_eq!(report.player.name.as_deref(), Some("Stonebraid"));
        assert_eq!(report.total_effective, 95);
        assert_eq!(report.total_theoretical, 135);

        let order: Vec<i64> = report.abilities.iter().map(|a| a.ability.signed()).collect();
        assert_eq!(order, vec![600, 500, -500]);
        assert_eq!(report.abilities[1].mitigated, 20);
        assert_eq!(report.abilities[1].summary.direct.crit_rate, Some(50.0));

        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].id, "0xF130008F46");
        assert_eq!(report.targets[0].name.as_deref(), Some("Marrowgar"));
    }

    #[test]
    fn report_json_uses_signed_keys() {
        let s = session();
        let report = BreakdownReport::build(&s, &[Segment::new(0, 4)], P1, None, CombineView::ByPlayer).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["view"], "by_player");
        assert_eq!(json["abilities"][1]["ability"], 500);
        assert_eq!(json["abilities"][1]["effective"], 45);
    }

    #[test]
    fn unit_rows_are_named_and_sorted() {
        let s = session();
        let totals = s.unit_damage_all(&[Segment::new(0, 4)], false);
        let rows = unit_rows(&totals, s.identity());
        assert_eq!(rows[0].unit.name.as_deref(), Some("Stonebraid"));
        assert_eq!(rows[0].effective, 90);
        assert_eq!(rows[1].unit.id, PET);
    }
}
