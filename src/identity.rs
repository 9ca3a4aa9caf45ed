/// Unit identity table and resolver: pets to owners, clones to unit groups.
///
/// The table is produced once per log by an identity-extraction pass outside
/// this crate and loaded here from JSON:
///
///   {
///       "0x0600000000123456": { "name": "Stonebraid" },
///       "0xF1400A1B2C000001": { "name": "Spirit Wolf", "master_id": "0x0600000000123456" }
///   }
///
/// After construction the table is read-only and may be shared across
/// threads. Only the per-owner `controlled_by` answers are memoized.
use crate::error::{LedgerError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Maximum master-chain hops followed when resolving an owner.
const MAX_MASTER_HOPS: usize = 2;

// ---------------------------------------------------------------------------
// Table types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitRecord {
    pub name:      String,
    #[serde(default, alias = "master_guid", skip_serializing_if = "Option::is_none")]
    pub master_id: Option<String>,
}

/// Raw `{id -> record}` table as supplied by the identity-extraction pass.
pub type UnitTable = HashMap<String, UnitRecord>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Prefix reserved for player identifiers.
    #[serde(default = "default_player_prefix")]
    pub player_prefix:    String,
    /// Trailing characters that distinguish spawns of the same unit.
    #[serde(default = "default_group_suffix_len")]
    pub group_suffix_len: usize,
}

fn default_player_prefix() -> String { "0x0".to_owned() }
fn default_group_suffix_len() -> usize { 6 }

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            player_prefix:    default_player_prefix(),
            group_suffix_len: default_group_suffix_len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct IdentityResolver {
    units:            UnitTable,
    /// Display name -> id. Player names win over NPC names, then the
    /// smallest id.
    names:            HashMap<String, String>,
    /// Unit group -> display name of its smallest member id.
    group_names:      HashMap<String, String>,
    config:           IdentityConfig,
    controlled:       Mutex<HashMap<String, Arc<HashSet<String>>>>,
    player_pets:      OnceCell<HashSet<String>>,
    players_and_pets: OnceCell<HashSet<String>>,
}

impl IdentityResolver {
    pub fn new(units: UnitTable, config: IdentityConfig) -> Self {
        // Walk ids in sorted order so ties resolve the same way every run
        let mut ids: Vec<&String> = units.keys().collect();
        ids.sort_unstable();

        let mut names: HashMap<String, String> = HashMap::with_capacity(units.len());
        let mut group_names: HashMap<String, String> = HashMap::new();
        for id in ids {
            let record = &units[id];
            let is_player = is_player_id(id, &config);
            let keep_existing = names
                .get(&record.name)
                .is_some_and(|existing: &String| !is_player || is_player_id(existing, &config));
            if !keep_existing {
                names.insert(record.name.clone(), id.clone());
            }
            group_names
                .entry(group_prefix(id, config.group_suffix_len).to_owned())
                .or_insert_with(|| record.name.clone());
        }
        tracing::info!("Identity table loaded: {} units, {} names", units.len(), names.len());
        Self {
            units,
            names,
            group_names,
            config,
            controlled:       Mutex::new(HashMap::new()),
            player_pets:      OnceCell::new(),
            players_and_pets: OnceCell::new(),
        }
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    /// Normalise a caller-supplied identifier or display name to a unit id.
    pub fn resolve<'a>(&'a self, id_or_name: &'a str) -> Result<&'a str> {
        if self.units.contains_key(id_or_name) {
            return Ok(id_or_name);
        }
        self.names
            .get(id_or_name)
            .map(String::as_str)
            .ok_or_else(|| LedgerError::UnknownUnit(id_or_name.to_owned()))
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.units.get(id).map(|r| r.name.as_str())
    }

    /// Display name for a unit id or a unit group prefix.
    pub fn group_name(&self, id_or_group: &str) -> Option<&str> {
        self.name_of(id_or_group)
            .or_else(|| self.group_names.get(id_or_group).map(String::as_str))
    }

    pub fn is_player_unit(&self, id: &str) -> bool {
        is_player_id(id, &self.config)
    }

    /// Root owner after at most two master hops; the unit itself when it has
    /// no master.
    pub fn master_of(&self, id_or_name: &str) -> Result<String> {
        let id = self.resolve(id_or_name)?;
        Ok(self.root_owner(id).to_owned())
    }

    /// Root owner of a raw unit id; `None` when the id is not in the table.
    /// Display names are not accepted.
    pub fn owner_of_id<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        self.units.contains_key(id).then(|| self.root_owner(id))
    }

    fn root_owner<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        for _ in 0..MAX_MASTER_HOPS {
            match self.units.get(current).and_then(|r| r.master_id.as_deref()) {
                Some(master) => current = master,
                None => return current,
            }
        }
        if self.units.get(current).is_some_and(|r| r.master_id.is_some()) {
            tracing::debug!("Master chain of {} is deeper than {} hops; truncated at {}", id, MAX_MASTER_HOPS, current);
        }
        current
    }

    /// Every unit whose resolved owner is `owner`, plus `owner` itself.
    pub fn controlled_by(&self, id_or_name: &str) -> Result<Arc<HashSet<String>>> {
        let owner = self.resolve(id_or_name)?;

        let mut cache = self.controlled.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(units) = cache.get(owner) {
            return Ok(Arc::clone(units));
        }

        let mut units: HashSet<String> = self
            .units
            .keys()
            .filter(|id| id.as_str() != owner && self.root_owner(id) == owner)
            .cloned()
            .collect();
        units.insert(owner.to_owned());
        tracing::debug!("{} controls {} unit(s)", owner, units.len() - 1);

        let units = Arc::new(units);
        cache.insert(owner.to_owned(), Arc::clone(&units));
        Ok(units)
    }

    /// Units whose direct master is a player.
    pub fn player_pets(&self) -> &HashSet<String> {
        self.player_pets.get_or_init(|| {
            self.units
                .iter()
                .filter(|(_, r)| r.master_id.as_deref().is_some_and(|m| self.is_player_unit(m)))
                .map(|(id, _)| id.clone())
                .collect()
        })
    }

    /// Every player plus every player-owned pet: the "friendly" set.
    pub fn players_and_pets(&self) -> &HashSet<String> {
        self.players_and_pets.get_or_init(|| {
            let mut friendly: HashSet<String> = self
                .units
                .keys()
                .filter(|id| self.is_player_unit(id))
                .cloned()
                .collect();
            friendly.extend(self.player_pets().iter().cloned());
            friendly
        })
    }

    pub fn group_of<'a>(&self, id: &'a str) -> &'a str {
        group_prefix(id, self.config.group_suffix_len)
    }

    /// Partition identifiers by their unit-group prefix.
    pub fn group_by_unit<'a, I>(&self, ids: I) -> BTreeMap<String, BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for id in ids {
            groups
                .entry(self.group_of(id).to_owned())
                .or_default()
                .insert(id.clone());
        }
        groups
    }

    /// Collapse NPC targets to their unit group, keeping every player target
    /// as an individual entry.
    pub fn target_groups<'a, I>(&self, targets: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.group_by_unit(targets)
            .into_iter()
            .flat_map(|(group, members)| {
                if self.is_player_unit(&group) {
                    members.into_iter().collect::<Vec<_>>()
                } else {
                    vec![group]
                }
            })
            .collect()
    }
}

fn is_player_id(id: &str, config: &IdentityConfig) -> bool {
    id.starts_with(&config.player_prefix)
}

fn group_prefix(id: &str, suffix_len: usize) -> &str {
    if id.len() <= suffix_len {
        return id;
    }
    id.get(..id.len() - suffix_len).unwrap_or(id)
}
