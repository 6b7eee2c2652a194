// Discovery frontier: which scope names are awaiting a response, which are
// queued for a later round, and which are held back one round.
//
// Invariants:
// - `in_flight`, `next` and `deferred` are pairwise disjoint.
// - A name present in the index is in none of them once it has been completed.

use std::collections::BTreeSet;

use super::index::{CompletionIndex, PATH_SEPARATOR, ROOT_SCOPE};

/// Names requested per round.
pub const ROUND_LIMIT: usize = 100;
/// Work set positions `ROUND_LIMIT..DEFER_LIMIT` are held back one round.
pub const DEFER_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    in_flight: BTreeSet<String>,
    next: BTreeSet<String>,
    deferred: BTreeSet<String>,
}

impl Frontier {
    /// Frontier whose first round requests `scope`.
    pub fn seeded(scope: &str) -> Self {
        Self { next: BTreeSet::from([scope.to_string()]), ..Self::default() }
    }

    pub fn next(&self) -> &BTreeSet<String> {
        &self.next
    }

    pub fn deferred(&self) -> &BTreeSet<String> {
        &self.deferred
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Start a round and return the names to request, in order.
    ///
    /// The work set is every unanswered name from the previous round plus
    /// `next`, followed by the names deferred last round. The first
    /// [`ROUND_LIMIT`] go in flight, the following ones are deferred, and the
    /// remainder stay in `next`. An empty result means discovery is complete.
    pub fn advance(&mut self, index: &CompletionIndex) -> Vec<String> {
        let mut work: Vec<String> = std::mem::take(&mut self.in_flight)
            .into_iter()
            .chain(std::mem::take(&mut self.next))
            .filter(|name| !index.contains(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let released = std::mem::take(&mut self.deferred);
        let seen: BTreeSet<String> = work.iter().cloned().collect();
        work.extend(
            released.into_iter().filter(|name| !index.contains(name) && !seen.contains(name)),
        );

        let mut rest = work.split_off(work.len().min(ROUND_LIMIT));
        let later = rest.split_off(rest.len().min(DEFER_LIMIT - ROUND_LIMIT));
        self.in_flight = work.iter().cloned().collect();
        self.deferred = rest.into_iter().collect();
        self.next = later.into_iter().collect();
        work
    }

    /// Queue newly discovered names that are not known or pending already.
    pub fn expand(&mut self, candidates: impl IntoIterator<Item = String>, index: &CompletionIndex) {
        for name in candidates {
            if index.contains(&name) || self.in_flight.contains(&name) || self.deferred.contains(&name)
            {
                continue;
            }
            self.next.insert(name);
        }
    }

    /// Drop `name` from every set. Returns whether it was in flight.
    pub fn complete(&mut self, name: &str) -> bool {
        self.next.remove(name);
        self.deferred.remove(name);
        self.in_flight.remove(name)
    }
}

/// Scope names to discover below `scope`, given its properties.
///
/// Root properties become top-level names and top-level scopes expand one
/// level (`Game` → `Game.creeps`). Nested scopes are not expanded.
pub fn children(scope: &str, properties: &[String]) -> Vec<String> {
    if scope == ROOT_SCOPE {
        return properties.to_vec();
    }
    if scope.contains(PATH_SEPARATOR) {
        return Vec::new();
    }
    properties.iter().map(|property| format!("{scope}{PATH_SEPARATOR}{property}")).collect()
}
