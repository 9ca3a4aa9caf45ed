/// One loaded log and everything derived from it.
///
/// The session owns the line buffer, the read-only identity resolver and the
/// computation caches. Every query goes through a cache keyed by operation,
/// parameters and segment ranges, so repeated identical queries from
/// independent call sites never re-scan the log. Dropping the session drops
/// every cached result with it.
use crate::aggregate::{aggregate, aggregate_units, DamageBreakdown, UnitTotals};
use crate::cache::{CacheKey, ComputationCache};
use crate::classify::QueryContext;
use crate::combine::{combine, combine_units, fold_into_owners, view, CombineView};
use crate::config::AppConfig;
use crate::error::Result;
use crate::identity::{IdentityResolver, UnitTable};
use crate::log_store;
use crate::parser::parse_timestamp;
use crate::segment::Segment;
use crate::store::{read_through, KvStore};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub log_year:          i32,
    pub parallel_segments: bool,
}

impl From<&AppConfig> for SessionOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            log_year:          cfg.log_year,
            parallel_segments: cfg.parallel_segments,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[derive(Debug)]
pub struct LogSession {
    name:        String,
    lines:       Vec<String>,
    identity:    IdentityResolver,
    options:     SessionOptions,
    breakdowns:  ComputationCache<DamageBreakdown>,
    unit_totals: ComputationCache<UnitTotals>,
    durations:   ComputationCache<f64>,
}

impl LogSession {
    pub fn new(name: impl Into<String>, lines: Vec<String>, identity: IdentityResolver, options: SessionOptions) -> Self {
        let name = name.into();
        tracing::info!("Session {} opened: {} lines", name, lines.len());
        Self {
            name,
            lines,
            identity,
            options,
            breakdowns:  ComputationCache::new(),
            unit_totals: ComputationCache::new(),
            durations:   ComputationCache::new(),
        }
    }

    /// Load a log file and its identity table. The table is read through
    /// `store` under `<log name>/units`, so later runs need not be handed the
    /// unit file again.
    pub fn open(log_path: &Path, units_path: Option<&Path>, store: &dyn KvStore, config: &AppConfig) -> Result<Self> {
        let name = log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| log_path.display().to_string());

        let units: UnitTable = read_through(store, &format!("{}/units", name), || match units_path {
            Some(path) => log_store::load_units(path),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no unit table given or stored for {}", name),
            )
            .into()),
        })?;

        let lines = log_store::load_lines(log_path)?;
        let identity = IdentityResolver::new(units, config.identity.clone());
        Ok(Self::new(name, lines, identity, SessionOptions::from(config)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lines actually covered by `segment` in this log.
    pub fn segment_lines(&self, segment: Segment) -> &[String] {
        &self.lines[segment.clamp(self.lines.len())]
    }

    /// First and last line of the touched range, `None` when it is empty.
    pub fn boundary_lines(&self, segment: Segment) -> Option<(&str, &str)> {
        let lines = self.segment_lines(segment);
        Some((lines.first()?.as_str(), lines.last()?.as_str()))
    }

    // -----------------------------------------------------------------------
    // Durations
    // -----------------------------------------------------------------------

    /// Seconds between the first and last line of the segment; 0 for an empty
    /// or undatable range.
    pub fn segment_duration(&self, segment: Segment) -> f64 {
        let key = CacheKey::new("segment_duration", Vec::new(), vec![segment]);
        *self.durations.get_or_compute(key, || self.compute_duration(segment))
    }

    fn compute_duration(&self, segment: Segment) -> f64 {
        let Some((first, last)) = self.boundary_lines(segment) else {
            return 0.0;
        };
        let year = self.options.log_year;
        let (Some(start), Some(mut end)) = (parse_timestamp(first, year), parse_timestamp(last, year)) else {
            tracing::debug!("Segment {:?} has undatable boundary lines", segment);
            return 0.0;
        };
        // Range crossed New Year
        if end < start {
            if let Some(next) = parse_timestamp(last, year + 1) {
                end = next;
            }
        }
        (end - start).num_milliseconds() as f64 / 1_000.0
    }

    pub fn total_duration(&self, segments: &[Segment]) -> f64 {
        segments.iter().map(|s| self.segment_duration(*s)).sum()
    }

    // -----------------------------------------------------------------------
    // Damage queries
    // -----------------------------------------------------------------------

    /// Damage dealt by `player` (id or name) and its controlled units over one
    /// segment, keyed by signed ability.
    pub fn player_damage(&self, segment: Segment, player: &str, target_filter: Option<&str>) -> Result<Arc<DamageBreakdown>> {
        let main_id = self.identity.resolve(player)?;
        let controlled = self.identity.controlled_by(main_id)?;
        let target_filter = target_filter.filter(|t| !t.is_empty());

        let key = CacheKey::new(
            "player_damage",
            vec![main_id.to_owned(), target_filter.unwrap_or_default().to_owned()],
            vec![segment],
        );
        Ok(self.breakdowns.get_or_compute(key, || {
            let ctx = QueryContext::new(&controlled, main_id, target_filter);
            aggregate(self.segment_lines(segment), &ctx)
        }))
    }

    /// `player_damage` over several segments, combined in the given order and
    /// rendered in the requested view.
    pub fn player_damage_all(
        &self,
        segments:      &[Segment],
        player:        &str,
        target_filter: Option<&str>,
        combine_view:  CombineView,
    ) -> Result<Arc<DamageBreakdown>> {
        let main_id = self.identity.resolve(player)?;
        let target_filter = target_filter.filter(|t| !t.is_empty());

        let key = CacheKey::new(
            "player_damage_all",
            vec![
                main_id.to_owned(),
                target_filter.unwrap_or_default().to_owned(),
                format!("{:?}", combine_view),
            ],
            segments.to_vec(),
        );
        self.breakdowns.get_or_try_compute(key, || {
            let parts: Vec<Arc<DamageBreakdown>> = if self.options.parallel_segments {
                segments
                    .par_iter()
                    .map(|s| self.player_damage(*s, main_id, target_filter))
                    .collect::<Result<_>>()?
            } else {
                segments
                    .iter()
                    .map(|s| self.player_damage(*s, main_id, target_filter))
                    .collect::<Result<_>>()?
            };
            let combined = combine(parts.iter().map(Arc::as_ref));
            Ok(view(&combined, combine_view))
        })
    }

    /// Sub-targets hit by `player` over the segments: NPC spawns collapsed to
    /// their unit group, players listed individually.
    pub fn player_targets(&self, segments: &[Segment], player: &str) -> Result<BTreeSet<String>> {
        let all = self.player_damage_all(segments, player, None, CombineView::ByPet)?;
        Ok(self.identity.target_groups(&all.targets_seen))
    }

    // -----------------------------------------------------------------------
    // Per-unit totals
    // -----------------------------------------------------------------------

    /// Effective damage per source unit against non-friendly targets.
    pub fn unit_damage(&self, segment: Segment) -> Arc<UnitTotals> {
        let key = CacheKey::new("unit_damage", Vec::new(), vec![segment]);
        self.unit_totals.get_or_compute(key, || {
            aggregate_units(self.segment_lines(segment), self.identity.players_and_pets())
        })
    }

    /// `unit_damage` summed over segments; with `by_owner`, pets are credited
    /// to their owner.
    pub fn unit_damage_all(&self, segments: &[Segment], by_owner: bool) -> Arc<UnitTotals> {
        let key = CacheKey::new("unit_damage_all", vec![by_owner.to_string()], segments.to_vec());
        self.unit_totals.get_or_compute(key, || {
            let parts: Vec<Arc<UnitTotals>> = segments.iter().map(|s| self.unit_damage(*s)).collect();
            let totals = combine_units(parts.iter().map(Arc::as_ref));
            if by_owner {
                fold_into_owners(&totals, &self.identity)
            } else {
                totals
            }
        })
    }

    /// Computations performed so far, across every cache.
    pub fn cache_misses(&self) -> usize {
        self.breakdowns.misses() + self.unit_totals.misses() + self.durations.misses()
    }
}
