//! Cross-marketplace catalog id resolution.
//!
//! Lots without a foreign id are looked up in the translation cache first;
//! the rest go to the other marketplace's catalog lookup. Lookups that come
//! back empty are tried once more under the fallback item type before the
//! lot is reported unresolved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lotsync_fetch::{BatchOperation, QueryFlags, ReplyError, Request, Response};
use lotsync_inventory::{Inventory, ItemKey, ItemType};

use crate::error::SyncResult;
use crate::marketplace::{MarketplaceApi, MarketplaceClient};

/// Learned mapping of `(item type, item id)` to the other marketplace's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CacheEntry>", into = "Vec<CacheEntry>")]
pub struct TranslationCache {
    entries: HashMap<(ItemType, String), String>,
}

/// Serialized form of one cache mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub item_type: ItemType,
    pub item_id: String,
    pub foreign_id: String,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, item_type: ItemType, item_id: &str) -> Option<&str> {
        self.entries
            .get(&(item_type, item_id.to_string()))
            .map(String::as_str)
    }

    pub fn learn(&mut self, item_type: ItemType, item_id: impl Into<String>, foreign_id: impl Into<String>) {
        self.entries
            .insert((item_type, item_id.into()), foreign_id.into());
    }
}

impl From<Vec<CacheEntry>> for TranslationCache {
    fn from(entries: Vec<CacheEntry>) -> Self {
        let mut cache = TranslationCache::new();
        for entry in entries {
            cache.learn(entry.item_type, entry.item_id, entry.foreign_id);
        }
        cache
    }
}

impl From<TranslationCache> for Vec<CacheEntry> {
    fn from(value: TranslationCache) -> Self {
        let mut entries: Vec<_> = value
            .entries
            .into_iter()
            .map(|((item_type, item_id), foreign_id)| CacheEntry {
                item_type,
                item_id,
                foreign_id,
            })
            .collect();
        entries.sort_by(|a, b| (a.item_type, &a.item_id).cmp(&(b.item_type, &b.item_id)));
        entries
    }
}

/// Outcome of one [`IdResolver::resolve`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Resolved through a catalog lookup.
    pub resolved: usize,
    /// Resolved from the translation cache.
    pub from_cache: usize,
    /// Keys of lots neither the cache nor any lookup could resolve.
    pub unresolved: Vec<ItemKey>,
}

#[derive(Debug, Default)]
pub struct IdResolver {
    cache: TranslationCache,
}

impl IdResolver {
    pub fn new(cache: TranslationCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn into_cache(self) -> TranslationCache {
        self.cache
    }

    /// Fill in the foreign id of every live lot that lacks one, asking the
    /// catalog behind `client`.
    ///
    /// A failed lookup batch leaves `inventory` and the cache untouched.
    pub async fn resolve<A: MarketplaceApi>(
        &mut self,
        client: &mut MarketplaceClient<A>,
        inventory: &mut Inventory,
    ) -> SyncResult<ResolveReport> {
        let mut report = ResolveReport::default();
        let mut pending: Vec<Target> = Vec::new();

        for (slot, item) in inventory.live() {
            if item.foreign_id().is_some() {
                continue;
            }
            let key = item.key();
            match self.cache.get(key.item_type, &key.item_id) {
                Some(foreign_id) => {
                    let foreign_id = foreign_id.to_string();
                    report.from_cache += 1;
                    pending.push(Target::cached(slot, key, foreign_id));
                }
                None => pending.push(Target::lookup(slot, key)),
            }
        }

        // First round under the lot's own type, second under the fallback.
        let mut round = 0;
        loop {
            let queue: Vec<usize> = pending
                .iter()
                .enumerate()
                .filter(|(_, target)| target.found.is_none() && target.guess.is_some())
                .map(|(index, _)| index)
                .collect();
            if queue.is_empty() {
                break;
            }
            round += 1;

            let (api, fetch, flags) = client.fetch_mut();
            let mut op = LookupBatch {
                api,
                flags,
                targets: &pending,
                queue: &queue,
                replies: vec![None; queue.len()],
            };
            fetch.run(&mut op).await?;
            let replies = op.replies;

            for (index, reply) in queue.into_iter().zip(replies) {
                let target = &mut pending[index];
                match reply {
                    Some(foreign_id) => {
                        debug!(key = %target.key, round, %foreign_id, "catalog id resolved");
                        target.found = Some(foreign_id);
                        report.resolved += 1;
                    }
                    None => {
                        target.guess = match target.guess {
                            Some(guess) if guess == target.key.item_type => guess.alternate(),
                            _ => None,
                        };
                    }
                }
            }
        }

        for target in pending {
            match target.found {
                Some(foreign_id) => {
                    if !target.cached {
                        self.cache.learn(
                            target.key.item_type,
                            target.key.item_id.clone(),
                            foreign_id.clone(),
                        );
                    }
                    inventory.modify(target.slot, |item| item.set_foreign_id(Some(foreign_id)))?;
                }
                None => report.unresolved.push(target.key),
            }
        }

        info!(
            marketplace = %client.marketplace(),
            resolved = report.resolved,
            from_cache = report.from_cache,
            unresolved = report.unresolved.len(),
            "catalog ids resolved"
        );
        Ok(report)
    }
}

struct Target {
    slot: usize,
    key: ItemKey,
    /// Type to look the id up under next; `None` once out of guesses.
    guess: Option<ItemType>,
    found: Option<String>,
    cached: bool,
}

impl Target {
    fn lookup(slot: usize, key: &ItemKey) -> Self {
        Self {
            slot,
            key: key.clone(),
            guess: Some(key.item_type),
            found: None,
            cached: false,
        }
    }

    fn cached(slot: usize, key: &ItemKey, foreign_id: String) -> Self {
        Self {
            slot,
            key: key.clone(),
            guess: None,
            found: Some(foreign_id),
            cached: true,
        }
    }
}

struct LookupBatch<'a, A> {
    api: &'a A,
    flags: QueryFlags,
    targets: &'a [Target],
    queue: &'a [usize],
    replies: Vec<Option<String>>,
}

impl<A: MarketplaceApi> LookupBatch<'_, A> {
    fn target(&self, index: usize) -> &Target {
        &self.targets[self.queue[index]]
    }
}

impl<A: MarketplaceApi> BatchOperation for LookupBatch<'_, A> {
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn request(&self, index: usize) -> Request {
        let target = self.target(index);
        let guess = target.guess.unwrap_or(target.key.item_type);
        self.api.lookup_request(guess, &target.key.item_id)
    }

    fn process(&mut self, index: usize, response: Response) -> Result<(), ReplyError> {
        self.replies[index] = self.api.decode_lookup(&response.body)?;
        Ok(())
    }

    fn flags(&self) -> QueryFlags {
        self.flags
    }

    fn label(&self) -> &'static str {
        "catalog_lookup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trips_through_json_as_a_list() {
        let mut cache = TranslationCache::new();
        cache.learn(ItemType::Part, "3001", "3001");
        cache.learn(ItemType::Minifig, "sw0001a", "75-sw0001");

        let json = serde_json::to_string(&cache).unwrap();
        assert!(json.starts_with('['));
        let back: TranslationCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cache);
        assert_eq!(back.get(ItemType::Minifig, "sw0001a"), Some("75-sw0001"));
        assert_eq!(back.get(ItemType::Part, "sw0001a"), None);
    }

    #[test]
    fn later_learning_overwrites() {
        let mut cache = TranslationCache::new();
        cache.learn(ItemType::Set, "6020-1", "old");
        cache.learn(ItemType::Set, "6020-1", "new");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(ItemType::Set, "6020-1"), Some("new"));
    }
}
