/// Decodes raw combat log lines into typed `DamageEvent` values.
///
/// Log line format (one event per line, comma-delimited):
///
///   TIMESTAMP,FLAG,SOURCE_ID,SOURCE_NAME,TARGET_ID,TARGET_NAME,ABILITY_ID,ABILITY_NAME,
///   SCHOOL,AMOUNT,OVERKILL,SCHOOL,RESISTED,BLOCKED,ABSORBED,CRITICAL,REST
///
/// Field indices (0-based after splitting on comma):
///   [0]  timestamp "M/D HH:MM:SS.mmm" (no year)
///   [1]  event flag (e.g. "SPELL_DAMAGE")
///   [2]  source unit id          [3] source name
///   [4]  target unit id          [5] target name
///   [6]  ability id              [7] ability name
///   [9]  raw amount              [10] overkill
///   [12] resisted                [14] absorbed
///   [15] critical ("1" = crit)
///   [16] remainder, may itself contain commas, kept joined
///
/// Events borrow from the line they were decoded from; they are built and
/// dropped per line by the aggregator.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Substring every damage line carries. Lines without it are rejected before
/// any split is attempted.
pub const DAMAGE_MARKER: &str = "DAMAGE";

/// Fixed arity of a damage line; the last field keeps the rest of the line.
const FIELD_COUNT: usize = 17;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventFlag {
    DirectDamage,
    PeriodicDamage,
    PeriodicEnergize,
    PeriodicHeal,
    PeriodicLeech,
    PeriodicMissed,
    DamageSplit,
    Other,
}

impl EventFlag {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "SPELL_DAMAGE" | "RANGE_DAMAGE" | "SWING_DAMAGE" | "DAMAGE_SHIELD" => Self::DirectDamage,
            "SPELL_PERIODIC_DAMAGE"   => Self::PeriodicDamage,
            "SPELL_PERIODIC_ENERGIZE" => Self::PeriodicEnergize,
            "SPELL_PERIODIC_HEAL"     => Self::PeriodicHeal,
            "SPELL_PERIODIC_LEECH"    => Self::PeriodicLeech,
            "SPELL_PERIODIC_MISSED"   => Self::PeriodicMissed,
            "DAMAGE_SPLIT"            => Self::DamageSplit,
            _                         => Self::Other,
        }
    }

    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            Self::PeriodicDamage
                | Self::PeriodicEnergize
                | Self::PeriodicHeal
                | Self::PeriodicLeech
                | Self::PeriodicMissed
        )
    }
}

/// One decoded damage line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageEvent<'a> {
    pub flag:       EventFlag,
    pub source_id:  &'a str,
    pub target_id:  &'a str,
    pub ability_id: u32,
    pub amount:     u64,
    pub overkill:   u64,
    pub resisted:   u64,
    pub absorbed:   u64,
    pub critical:   bool,
}

impl DamageEvent<'_> {
    /// Amount actually removed from the target: raw amount minus overkill.
    pub fn effective(&self) -> u64 {
        self.amount.saturating_sub(self.overkill)
    }

    /// Amount before mitigation: raw amount plus resisted and absorbed.
    pub fn theoretical(&self) -> u64 {
        self.amount.saturating_add(self.resisted).saturating_add(self.absorbed)
    }
}

/// A line that passed the marker filter and the arity check but carries a
/// field that is not a base-10 integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {field} field: {value:?}")]
pub struct MalformedLine {
    pub field: &'static str,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn split_fields(line: &str) -> Option<[&str; FIELD_COUNT]> {
    let mut fields = [""; FIELD_COUNT];
    let mut parts = line.splitn(FIELD_COUNT, ',');
    for slot in fields.iter_mut() {
        *slot = parts.next()?;
    }
    Some(fields)
}

fn number(field: &'static str, raw: &str) -> Result<u64, MalformedLine> {
    raw.parse().map_err(|_| MalformedLine { field, value: raw.to_owned() })
}

/// Overkill is logged as -1 by some clients when the hit did not kill.
fn overkill(raw: &str) -> Result<u64, MalformedLine> {
    let value: i64 = raw
        .parse()
        .map_err(|_| MalformedLine { field: "overkill", value: raw.to_owned() })?;
    Ok(value.max(0) as u64)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Decode a line, distinguishing "not a damage line" (`Ok(None)`) from a
/// structurally valid line with a broken numeric field (`Err`).
pub fn try_decode(line: &str) -> Result<Option<DamageEvent<'_>>, MalformedLine> {
    if !line.contains(DAMAGE_MARKER) {
        return Ok(None);
    }
    // Short arity, e.g. the damage-shield-missed variant
    let Some(f) = split_fields(line) else {
        return Ok(None);
    };

    let ability_id = f[6]
        .parse()
        .map_err(|_| MalformedLine { field: "ability_id", value: f[6].to_owned() })?;

    let amount   = number("amount", f[9])?;
    let resisted = number("resisted", f[12])?;
    let absorbed = number("absorbed", f[14])?;
    if amount.checked_add(resisted).and_then(|v| v.checked_add(absorbed)).is_none() {
        return Err(MalformedLine {
            field: "theoretical",
            value: format!("{}+{}+{}", amount, resisted, absorbed),
        });
    }

    Ok(Some(DamageEvent {
        flag:      EventFlag::from_raw(f[1]),
        source_id: f[2],
        target_id: f[4],
        ability_id,
        amount,
        overkill:  overkill(f[10])?,
        resisted,
        absorbed,
        critical:  f[15] == "1",
    }))
}

/// Decode a line, folding every failure into "not applicable".
pub fn decode(line: &str) -> Option<DamageEvent<'_>> {
    try_decode(line).ok().flatten()
}

/// Date the leading "M/D HH:MM:SS.mmm" stamp of any log line. The log does not
/// record the year, so the caller supplies it.
pub fn parse_timestamp(line: &str, year: i32) -> Option<NaiveDateTime> {
    let stamp = line.split(',').next()?.trim();
    let (date, time) = stamp.split_once(' ')?;
    let (month, day) = date.split_once('/')?;

    let date = NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S%.f").ok()?;
    Some(date.and_time(time))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    const CRIT_LINE: &str =
        "4/29 21:05:12.345,SPELL_DAMAGE,0x0600000000123456,Stonebraid,0xF130008F46000A12,Lord Marrowgar,49238,Lightning Bolt,0x8,100,0,0x8,0,0,50,1,nil,nil";

    const DOT_LINE: &str =
        "4/29 21:05:13.001,SPELL_PERIODIC_DAMAGE,0x0600000000123456,Stonebraid,0xF130008F46000A12,Lord Marrowgar,49233,Flame Shock,0x4,812,0,0x4,40,0,0,nil,nil,nil";

    #[test]
    fn decodes_direct_crit() {
        let e = decode(CRIT_LINE).expect("should decode");
        assert_eq!(e.flag,       EventFlag::DirectDamage);
        assert_eq!(e.source_id,  "0x0600000000123456");
        assert_eq!(e.target_id,  "0xF130008F46000A12");
        assert_eq!(e.ability_id, 49238);
        assert!(e.critical);
        assert_eq!(e.effective(),   100);
        assert_eq!(e.theoretical(), 150);
    }

    #[test]
    fn decodes_periodic_hit() {
        let e = decode(DOT_LINE).expect("should decode");
        assert_eq!(e.flag, EventFlag::PeriodicDamage);
        assert!(e.flag.is_periodic());
        assert!(!e.critical);
        assert_eq!(e.resisted, 40);
        assert_eq!(e.theoretical(), 852);
    }

    #[test]
    fn remainder_keeps_commas() {
        let line = format!("{},extra,fields,here", CRIT_LINE);
        assert_eq!(decode(&line).map(|e| e.amount), Some(100));
    }

    #[test]
    fn overkill_is_excluded_from_effective() {
        let line = CRIT_LINE.replace(",100,0,0x8,", ",100,30,0x8,");
        let e = decode(&line).unwrap();
        assert_eq!(e.effective(),   70);
        assert_eq!(e.theoretical(), 150);
    }

    #[test]
    fn negative_overkill_counts_as_zero() {
        let line = CRIT_LINE.replace(",100,0,0x8,", ",100,-1,0x8,");
        assert_eq!(decode(&line).unwrap().effective(), 100);
    }

    #[test]
    fn damage_split_is_decoded() {
        let line = CRIT_LINE.replace("SPELL_DAMAGE", "DAMAGE_SPLIT");
        assert_eq!(decode(&line).unwrap().flag, EventFlag::DamageSplit);
    }

    #[test]
    fn unknown_damage_flag_is_other() {
        let line = CRIT_LINE.replace("SPELL_DAMAGE", "ENVIRONMENTAL_DAMAGE");
        let e = decode(&line).unwrap();
        assert_eq!(e.flag, EventFlag::Other);
        assert!(!e.flag.is_periodic());
    }

    #[test]
    fn short_arity_is_absent() {
        let line = "4/29 21:05:12.345,DAMAGE_SHIELD_MISSED,0x06,A,0xF1,B,7294,Retribution Aura,0x2,MISS";
        assert_eq!(try_decode(line), Ok(None));
    }

    #[test]
    fn non_damage_line_is_absent() {
        let line = "4/29 21:05:12.345,SPELL_CAST_SUCCESS,0x06,A,0xF1,B,7294,Aura,0x2,1,2,3,4,5,6,7,8";
        assert_eq!(try_decode(line), Ok(None));
        assert!(decode("").is_none());
    }

    #[test]
    fn bad_number_is_malformed() {
        let line = CRIT_LINE.replace(",100,0,0x8,", ",lots,0,0x8,");
        let err = try_decode(&line).unwrap_err();
        assert_eq!(err.field, "amount");
        assert!(decode(&line).is_none());
    }

    #[test]
    fn theoretical_overflow_is_malformed() {
        let line = CRIT_LINE.replace(",100,0,0x8,", &format!(",{},0,0x8,", u64::MAX));
        let err = try_decode(&line).unwrap_err();
        assert_eq!(err.field, "theoretical");
        assert!(decode(&line).is_none());

        let fits = CRIT_LINE.replace(",100,0,0x8,0,0,50,", &format!(",{},0,0x8,0,0,0,", u64::MAX));
        assert_eq!(decode(&fits).unwrap().theoretical(), u64::MAX);
    }

    #[test]
    fn parses_timestamp_with_year() {
        let ts = parse_timestamp(CRIT_LINE, 2022).expect("should parse");
        assert_eq!(ts.to_string(), "2022-04-29 21:05:12.345");
        assert!(parse_timestamp("garbage", 2022).is_none());
    }
}
