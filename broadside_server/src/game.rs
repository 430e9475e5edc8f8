//! Shared game state and the operations sessions perform on it.
//!
//! `Game` is the one object every task holds (behind an `Arc`): the entity
//! store, the broadcast hub, and the world singleton. Each operation reads or
//! mutates the store, asks the combat rules what happened, and then pushes
//! the resulting events to their audiences.
//!
//! Movement is client-authoritative: `updatePosition` is stored verbatim with
//! no plausibility check. Combat outcomes are decided here.

use std::{collections::BTreeMap, sync::Arc};

use broadside_shared::{
    combat::{resolve_cannon_fire, resolve_ram},
    config::ServerConfig,
    math::Vec3,
    model::{Player, Ship, ShipType, Spawn, Wind, WorldState},
    net::{ConnectionId, GameSnapshot, JoinRequest, PositionUpdate, ServerMsg, ShipAction},
};
use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::{
    broadcast::{Audience, Hub},
    damage::{take_damage, Destruction},
    store::EntityStore,
};

pub struct Game {
    pub cfg: ServerConfig,
    pub store: EntityStore,
    pub hub: Hub,
    world: RwLock<WorldState>,
}

impl Game {
    pub fn new(cfg: ServerConfig) -> Self {
        let world = WorldState::new(&mut rand::thread_rng());
        let hub = Hub::new(cfg.outbound_queue);
        Self {
            cfg,
            store: EntityStore::new(),
            hub,
            world: RwLock::new(world),
        }
    }

    /// Allocates an identity and outbound queue for a new transport connection.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<Bytes>) {
        let id = ConnectionId::new_unique();
        let rx = self.hub.register(id).await;
        (id, rx)
    }

    pub async fn world_state(&self) -> WorldState {
        *self.world.read().await
    }

    /// Full snapshot as seen by `self_id`.
    pub async fn snapshot_for(&self, self_id: ConnectionId) -> GameSnapshot {
        let mut players = BTreeMap::new();
        let mut ships = BTreeMap::new();
        for (player, ship) in self.store.snapshot().await {
            ships.insert(player.id, ship);
            players.insert(player.id, player);
        }
        GameSnapshot {
            players,
            ships,
            world_state: self.world_state().await,
            self_id,
        }
    }

    /// Creates the player and ship for `id` and announces them.
    pub async fn join(&self, id: ConnectionId, req: JoinRequest) -> anyhow::Result<()> {
        let name = req
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Pirate_{}", id.short()));
        let ship_type = req
            .ship_type
            .as_deref()
            .and_then(ShipType::from_name)
            .unwrap_or_default();
        let customization = req
            .customization
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let spawn = Spawn::random(&mut rand::thread_rng());

        let player = Player::new(id, name, spawn);
        let ship = Ship::new(ship_type, customization);
        self.store.create(id, player.clone(), ship.clone()).await?;
        info!(conn = %id, name = %player.name, ship = ship_type.as_str(), "Player joined");

        let snapshot = self.snapshot_for(id).await;
        self.hub
            .send(Audience::Only(id), &ServerMsg::GameState(snapshot))
            .await;
        self.hub
            .send(Audience::AllExcept(id), &ServerMsg::PlayerJoined { player, ship })
            .await;
        Ok(())
    }

    /// Stores a client-reported pose and relays it to everyone else.
    pub async fn update_position(&self, id: ConnectionId, update: PositionUpdate) {
        let moved = self
            .store
            .mutate(id, |e| {
                e.player.position = update.position;
                e.player.rotation = update.rotation;
            })
            .await;
        if moved.is_none() {
            debug!(conn = %id, "Position update for unknown entity dropped");
            return;
        }
        self.hub
            .send(
                Audience::AllExcept(id),
                &ServerMsg::PlayerMoved {
                    id,
                    position: update.position,
                    rotation: update.rotation,
                },
            )
            .await;
    }

    /// Runs a ship action, then publishes the actor's resulting ship.
    pub async fn ship_action(self: &Arc<Self>, id: ConnectionId, action: ShipAction) {
        let Some((player, ship)) = self.store.get(id).await else {
            debug!(conn = %id, "Ship action for unknown entity dropped");
            return;
        };

        match action {
            ShipAction::AdjustSails { raised, angle } => {
                self.store
                    .mutate(id, |e| {
                        e.ship.sails.raised = raised;
                        e.ship.sails.angle = angle;
                    })
                    .await;
            }
            ShipAction::FireCannon {
                position,
                direction,
            } => {
                self.fire_cannon(id, position.unwrap_or(player.position), direction)
                    .await;
            }
            ShipAction::Ram { position, .. } => {
                self.ram(id, ship.ship_type, position.unwrap_or(player.position))
                    .await;
            }
        }

        if let Some((_, ship)) = self.store.get(id).await {
            self.hub
                .send(Audience::All, &ServerMsg::ShipUpdated { id, ship })
                .await;
        }
    }

    async fn fire_cannon(self: &Arc<Self>, id: ConnectionId, origin: Vec3, direction: f32) {
        let fired = self
            .store
            .mutate(id, |e| {
                if !e.ship.cannons.loaded {
                    return None;
                }
                e.ship.cannons.loaded = false;
                e.reload_generation += 1;
                Some((e.reload_generation, e.ship.ship_type))
            })
            .await
            .flatten();
        let Some((generation, shooter_type)) = fired else {
            debug!(conn = %id, "Fire rejected, cannons not loaded");
            return;
        };

        self.schedule_reload(id, generation).await;
        self.hub
            .send(
                Audience::All,
                &ServerMsg::CannonFired {
                    id,
                    position: origin,
                    direction,
                },
            )
            .await;

        let contacts = self.store.contacts().await;
        let Some(hit) = resolve_cannon_fire(id, shooter_type, origin, direction, &contacts) else {
            return;
        };
        let Some(destroyed) = self.damage(hit.target, hit.damage).await else {
            debug!(conn = %id, target = %hit.target, "Cannon target left before impact");
            return;
        };

        self.hub
            .send(
                Audience::All,
                &ServerMsg::CannonHit {
                    shooter: id,
                    target: hit.target,
                    damage: hit.damage,
                    position: hit.position,
                },
            )
            .await;
        if let Some(d) = destroyed {
            self.credit(id).await;
            self.announce_destruction(hit.target, d).await;
        }
    }

    async fn ram(&self, id: ConnectionId, rammer_type: ShipType, origin: Vec3) {
        let contacts = self.store.contacts().await;
        let Some(collision) = resolve_ram(id, rammer_type, origin, &contacts) else {
            debug!(conn = %id, "Ram found no target");
            return;
        };

        let Some(rammed_sunk) = self.damage(collision.rammed, collision.rammed_damage).await
        else {
            debug!(conn = %id, target = %collision.rammed, "Ram target left before impact");
            return;
        };
        let rammer_sunk = self.damage(id, collision.rammer_damage).await.flatten();

        self.hub
            .send(
                Audience::All,
                &ServerMsg::ShipCollision {
                    rammer: id,
                    rammed: collision.rammed,
                    rammer_damage: collision.rammer_damage,
                    rammed_damage: collision.rammed_damage,
                    position: origin,
                },
            )
            .await;
        if let Some(d) = rammer_sunk {
            self.credit(collision.rammed).await;
            self.announce_destruction(id, d).await;
        }
        if let Some(d) = rammed_sunk {
            self.credit(id).await;
            self.announce_destruction(collision.rammed, d).await;
        }
    }

    /// Mutates health and hull damage without announcing anything.
    ///
    /// `None` if the entity is gone; `Some(Some(_))` if it sank.
    async fn damage(&self, id: ConnectionId, amount: u32) -> Option<Option<Destruction>> {
        let respawn = Spawn::random(&mut rand::thread_rng());
        self.store
            .mutate(id, |e| take_damage(e, amount, respawn))
            .await
    }

    async fn announce_destruction(&self, id: ConnectionId, d: Destruction) {
        info!(conn = %id, "Ship destroyed");
        self.hub
            .send(
                Audience::All,
                &ServerMsg::ShipDestroyed {
                    id,
                    position: d.wreck,
                },
            )
            .await;
        self.hub
            .send(
                Audience::Only(id),
                &ServerMsg::Respawn {
                    position: d.respawn.position,
                    rotation: d.respawn.rotation,
                },
            )
            .await;
    }

    /// Awards the destroyer of another ship one point. Nothing else changes
    /// `score`.
    async fn credit(&self, id: ConnectionId) {
        self.store.mutate(id, |e| e.player.score += 1).await;
    }

    /// Applies damage to one entity and announces a sinking if it happens.
    ///
    /// Returns `None` if the entity no longer exists.
    pub async fn apply_damage(&self, id: ConnectionId, amount: u32) -> Option<bool> {
        let destroyed = self.damage(id, amount).await?;
        let sank = destroyed.is_some();
        if let Some(d) = destroyed {
            self.announce_destruction(id, d).await;
        }
        Some(sank)
    }

    async fn schedule_reload(self: &Arc<Self>, id: ConnectionId, generation: u64) {
        let game = Arc::clone(self);
        let delay = self.cfg.reload_interval();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            game.finish_reload(id, generation).await;
        });

        let handle = task.abort_handle();
        let stored = self
            .store
            .mutate(id, move |e| {
                if e.reload_generation != generation {
                    return false;
                }
                if let Some(old) = e.reload_task.replace(handle) {
                    old.abort();
                }
                true
            })
            .await;
        if stored != Some(true) {
            task.abort();
        }
    }

    async fn finish_reload(&self, id: ConnectionId, generation: u64) {
        let landed = self
            .store
            .mutate(id, |e| {
                if e.reload_generation != generation || e.ship.cannons.loaded {
                    return false;
                }
                e.ship.cannons.loaded = true;
                e.reload_task = None;
                true
            })
            .await;
        match landed {
            Some(true) => {
                self.hub
                    .send(Audience::Only(id), &ServerMsg::CannonsReloaded)
                    .await;
            }
            Some(false) => debug!(conn = %id, "Stale reload skipped"),
            None => debug!(conn = %id, "Reload for departed entity skipped"),
        }
    }

    /// Drifts the wind one step and tells everyone.
    pub async fn tick_wind(&self) -> Wind {
        let wind = {
            let mut world = self.world.write().await;
            world.tick(&mut rand::thread_rng());
            world.wind
        };
        debug!(direction = wind.direction, strength = wind.strength, "Wind changed");
        self.hub
            .send(Audience::All, &ServerMsg::WindChanged(wind))
            .await;
        wind
    }

    /// Tears down everything owned by `id`. Safe to call more than once.
    pub async fn disconnect(&self, id: ConnectionId) {
        self.hub.unregister(id).await;
        if self.store.remove(id).await.is_some() {
            info!(conn = %id, "Player left");
            self.hub
                .send(Audience::All, &ServerMsg::PlayerLeft(id))
                .await;
        }
    }
}
