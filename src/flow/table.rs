//! Flow table: FlowKey -> FlowAccumulator with reverse-aware lookup, plus an
//! index ordered by last_seen so the longest-idle flow is found without a scan.

use super::{Direction, FlowAccumulator, FlowKey};
use crate::collectors::PacketObservation;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

/// Map an f64 onto an i64 with the same ordering as `f64::total_cmp`.
fn total_order(x: f64) -> i64 {
    let bits = x.to_bits() as i64;
    bits ^ ((((bits >> 63) as u64) >> 1) as i64)
}

/// Outcome of folding one packet into the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recorded {
    /// Key the flow is stored under
    pub key: FlowKey,
    pub direction: Direction,
    /// Inactivity before this packet (0 for a new flow)
    pub idle: f64,
}

#[derive(Debug, Default)]
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowAccumulator>,
    by_last_seen: BTreeSet<(i64, FlowKey)>,
    created: u64,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `obs` into its conversation, creating the flow under the packet's
    /// own key (forward) if neither direction is known yet.
    pub fn record(&mut self, obs: &PacketObservation) -> Recorded {
        let key = FlowKey::from(obs);
        let reverse = key.reverse();
        let (key, direction) = if self.flows.contains_key(&key) || !self.flows.contains_key(&reverse) {
            (key, Direction::Forward)
        } else {
            (reverse, Direction::Backward)
        };

        let acc = match self.flows.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                self.created += 1;
                e.insert(FlowAccumulator::new(key, obs.timestamp))
            }
        };
        let before = acc.last_seen;
        let idle = acc.idle_for(obs.timestamp);
        acc.record(obs, direction);

        self.by_last_seen.remove(&(total_order(before), key));
        self.by_last_seen.insert((total_order(acc.last_seen), key));
        Recorded { key, direction, idle }
    }

    /// Hand ownership of a flow back to the caller. Unknown keys are a no-op.
    pub fn remove(&mut self, key: &FlowKey) -> Option<FlowAccumulator> {
        let acc = self.flows.remove(key)?;
        self.by_last_seen.remove(&(total_order(acc.last_seen), *key));
        Some(acc)
    }

    /// Collect matching keys without touching the table.
    pub fn all_keys_matching<P>(&self, predicate: P) -> Vec<FlowKey>
    where
        P: Fn(&FlowAccumulator) -> bool,
    {
        self.flows
            .iter()
            .filter(|(_, acc)| predicate(acc))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Key of the flow idle the longest (smallest last_seen).
    pub fn oldest_key(&self) -> Option<FlowKey> {
        self.by_last_seen.first().map(|(_, key)| *key)
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowAccumulator> {
        self.flows.get(key)
    }

    /// Empty the table, returning every accumulator.
    pub fn drain(&mut self) -> Vec<FlowAccumulator> {
        self.by_last_seen.clear();
        self.flows.drain().map(|(_, acc)| acc).collect()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Accumulators created over the table's lifetime.
    pub fn created(&self) -> u64 {
        self.created
    }
}
