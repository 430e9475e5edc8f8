//! Entity store.
//!
//! Owns every player and ship, keyed by connection id. Two levels of locking:
//! - the map itself sits behind a `RwLock`, held only long enough to look up,
//!   insert, or remove a record;
//! - each record has its own `Mutex`, so mutating one ship never blocks
//!   actions on another and no reader can observe a half-written record.
//!
//! Iteration follows key order, which is join order since ids are allocated
//! from a monotonic counter.

use std::{collections::BTreeMap, sync::Arc};

use broadside_shared::{
    combat::Contact,
    model::{Player, Ship},
    net::ConnectionId,
};
use tokio::{
    sync::{Mutex, RwLock},
    task::AbortHandle,
};

/// One live entity: a player and their ship, plus server-only bookkeeping.
#[derive(Debug)]
pub struct Entity {
    pub player: Player,
    pub ship: Ship,
    /// Bumped on every fire and respawn; a reload only lands if it still matches.
    pub reload_generation: u64,
    /// Pending reload timer, aborted when the entity goes away.
    pub reload_task: Option<AbortHandle>,
}

impl Entity {
    pub fn new(player: Player, ship: Ship) -> Self {
        Self {
            player,
            ship,
            reload_generation: 0,
            reload_task: None,
        }
    }

    pub fn contact(&self) -> Contact {
        Contact {
            id: self.player.id,
            position: self.player.position,
            ship_type: self.ship.ship_type,
        }
    }

    /// Drops any pending reload so it can neither fire nor land.
    pub fn cancel_reload(&mut self) {
        self.reload_generation += 1;
        if let Some(task) = self.reload_task.take() {
            task.abort();
        }
    }
}

type Record = Arc<Mutex<Entity>>;

/// Authoritative map of connection id to entity.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: RwLock<BTreeMap<ConnectionId, Record>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entity. Fails if the id is already live.
    pub async fn create(&self, id: ConnectionId, player: Player, ship: Ship) -> anyhow::Result<()> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(&id) {
            anyhow::bail!("entity {id} already exists");
        }
        entities.insert(id, Arc::new(Mutex::new(Entity::new(player, ship))));
        Ok(())
    }

    async fn record(&self, id: ConnectionId) -> Option<Record> {
        self.entities.read().await.get(&id).cloned()
    }

    /// Copies out the player and ship, or `None` if the id is gone.
    pub async fn get(&self, id: ConnectionId) -> Option<(Player, Ship)> {
        let record = self.record(id).await?;
        let entity = record.lock().await;
        Some((entity.player.clone(), entity.ship.clone()))
    }

    /// Applies `f` to one entity under its lock.
    ///
    /// Returns `None` without calling `f` if the entity does not exist.
    pub async fn mutate<R>(&self, id: ConnectionId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let record = self.record(id).await?;
        let mut entity = record.lock().await;
        Some(f(&mut entity))
    }

    /// Removes an entity, cancelling its pending reload.
    pub async fn remove(&self, id: ConnectionId) -> Option<(Player, Ship)> {
        let record = self.entities.write().await.remove(&id)?;
        let mut entity = record.lock().await;
        entity.cancel_reload();
        Some((entity.player.clone(), entity.ship.clone()))
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.entities.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Records in key order, detached from the map lock.
    async fn records(&self) -> Vec<(ConnectionId, Record)> {
        self.entities
            .read()
            .await
            .iter()
            .map(|(id, r)| (*id, Arc::clone(r)))
            .collect()
    }

    /// Calls `f` on every live entity, one record lock at a time.
    ///
    /// Each entity is seen whole, but different entities may be observed at
    /// slightly different moments.
    pub async fn for_each(&self, mut f: impl FnMut(&Entity)) {
        for (_, record) in self.records().await {
            let entity = record.lock().await;
            f(&entity);
        }
    }

    /// Copies every player and ship, in join order.
    pub async fn snapshot(&self) -> Vec<(Player, Ship)> {
        let mut out = Vec::new();
        self.for_each(|e| out.push((e.player.clone(), e.ship.clone())))
            .await;
        out
    }

    /// Combat view of every live ship, in join order.
    pub async fn contacts(&self) -> Vec<Contact> {
        let mut out = Vec::new();
        self.for_each(|e| out.push(e.contact())).await;
        out
    }

    /// Live ids, in join order.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.entities.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_shared::{
        math::Vec3,
        model::{ShipType, Spawn},
    };

    fn entity(id: ConnectionId) -> (Player, Ship) {
        let spawn = Spawn {
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation: Vec3::ZERO,
        };
        (
            Player::new(id, format!("p{id}"), spawn),
            Ship::new(ShipType::Sloop, serde_json::json!({})),
        )
    }

    #[tokio::test]
    async fn create_get_remove() {
        let store = EntityStore::new();
        let id = ConnectionId::new_unique();
        let (p, s) = entity(id);
        store.create(id, p.clone(), s.clone()).await.unwrap();

        assert_eq!(store.get(id).await, Some((p.clone(), s.clone())));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.remove(id).await, Some((p, s)));
        assert!(store.get(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_keys_are_refused() {
        let store = EntityStore::new();
        let id = ConnectionId::new_unique();
        let (p, s) = entity(id);
        store.create(id, p.clone(), s.clone()).await.unwrap();
        assert!(store.create(id, p, s).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn mutate_missing_is_none() {
        let store = EntityStore::new();
        let called = store
            .mutate(ConnectionId::new_unique(), |_| unreachable!())
            .await;
        assert!(called.is_none());
    }

    #[tokio::test]
    async fn mutate_applies_in_place() {
        let store = EntityStore::new();
        let id = ConnectionId::new_unique();
        let (p, s) = entity(id);
        store.create(id, p, s).await.unwrap();

        let loaded = store
            .mutate(id, |e| {
                e.ship.cannons.loaded = false;
                e.ship.cannons.loaded
            })
            .await;
        assert_eq!(loaded, Some(false));
        assert!(!store.get(id).await.unwrap().1.cannons.loaded);
    }

    #[tokio::test]
    async fn iteration_follows_join_order() {
        let store = EntityStore::new();
        let ids: Vec<_> = (0..5).map(|_| ConnectionId::new_unique()).collect();
        for id in ids.iter().rev() {
            let (p, s) = entity(*id);
            store.create(*id, p, s).await.unwrap();
        }
        assert_eq!(store.ids().await, ids);
        let contact_ids: Vec<_> = store.contacts().await.iter().map(|c| c.id).collect();
        assert_eq!(contact_ids, ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_on_one_entity_serialize() {
        let store = Arc::new(EntityStore::new());
        let id = ConnectionId::new_unique();
        let (p, s) = entity(id);
        store.create(id, p, s).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store
                        .mutate(id, |e| {
                            let score = e.player.score;
                            e.player.score = score + 1;
                        })
                        .await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get(id).await.unwrap().0.score, 800);
    }

    #[tokio::test]
    async fn remove_cancels_pending_reload() {
        let store = EntityStore::new();
        let id = ConnectionId::new_unique();
        let (p, s) = entity(id);
        store.create(id, p, s).await.unwrap();

        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        store
            .mutate(id, |e| e.reload_task = Some(task.abort_handle()))
            .await;
        store.remove(id).await;
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
