//! Bounded concurrent fetches.
//!
//! Each item is fetched on its own `smol` task; a semaphore caps how many
//! requests are in flight, and the blocking HTTP call runs on smol's thread
//! pool. A failing item is logged and recorded as skipped without affecting
//! the others.

use async_lock::Semaphore;
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use crate::error::Result;
use crate::hierarchy::Hierarchy;
use crate::models::hierarchy::HierarchyMember;
use crate::models::member::MemberRolesCollection;
use crate::people::People;

/// Results of a batch, keyed by item, plus the items that failed.
#[derive(Debug)]
pub struct BatchOutcome<K, T> {
    pub results: BTreeMap<K, T>,
    /// Failed items with the error message
    pub skipped: Vec<(K, String)>,
}

impl<K, T> Default for BatchOutcome<K, T> {
    fn default() -> Self {
        BatchOutcome {
            results: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }
}

/// Runs `fetch` for every key with at most `threads` calls in flight.
pub async fn fetch_all<K, T, F>(keys: Vec<K>, threads: usize, fetch: F) -> BatchOutcome<K, T>
where
    K: Ord + Clone + Display + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Result<T> + Send + Sync + 'static,
{
    let fetch = Arc::new(fetch);
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));

    let mut tasks = Vec::new();
    for key in keys {
        let fetch_clone = Arc::clone(&fetch);
        let semaphore_clone = Arc::clone(&semaphore);

        let task = smol::spawn(async move {
            let _permit = semaphore_clone.acquire().await;
            info!("Fetching '{}'", key);

            let item = key.clone();
            let result = smol::unblock(move || fetch_clone(item)).await;
            (key, result)
        });
        tasks.push(task);
    }

    let mut outcome = BatchOutcome::default();
    for task in tasks {
        match task.await {
            (key, Ok(value)) => {
                outcome.results.insert(key, value);
            }
            (key, Err(err)) => {
                warn!("Skipping '{}': {}", key, err);
                outcome.skipped.push((key, err.to_string()));
            }
        }
    }
    outcome
}

/// Volunteer roles of many members.
pub fn member_roles(
    people: &People,
    membership_numbers: Vec<i64>,
    threads: usize,
) -> BatchOutcome<i64, MemberRolesCollection> {
    let people = people.clone();
    smol::block_on(fetch_all(membership_numbers, threads, move |number| {
        people.roles(number, false, None)
    }))
}

/// Members with roles in each of many units.
///
/// Compass keeps a single set of search results per session, so unit
/// searches run one at a time.
pub fn unit_members(
    hierarchy: &Hierarchy,
    unit_ids: Vec<i64>,
) -> BatchOutcome<i64, Vec<HierarchyMember>> {
    let hierarchy = hierarchy.clone();
    smol::block_on(fetch_all(unit_ids, 1, move |unit| {
        hierarchy.members_in_unit(unit)
    }))
}
