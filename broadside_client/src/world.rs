//! Local mirror of server state.
//!
//! The server pushes discrete events; the client folds them into a copy of
//! the world so UI code (or a test) can read it without replaying history.

use std::collections::BTreeMap;

use broadside_shared::{
    model::{Player, Ship, WorldState},
    net::{ConnectionId, ServerMsg},
};

#[derive(Debug, Clone, Default)]
pub struct ClientWorld {
    pub self_id: Option<ConnectionId>,
    pub players: BTreeMap<ConnectionId, Player>,
    pub ships: BTreeMap<ConnectionId, Ship>,
    pub world: Option<WorldState>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn me(&self) -> Option<&Player> {
        self.self_id.and_then(|id| self.players.get(&id))
    }

    pub fn my_ship(&self) -> Option<&Ship> {
        self.self_id.and_then(|id| self.ships.get(&id))
    }

    /// Folds one server event into the mirror.
    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::GameState(snap) => {
                self.self_id = Some(snap.self_id);
                self.players = snap.players.clone();
                self.ships = snap.ships.clone();
                self.world = Some(snap.world_state);
            }
            ServerMsg::PlayerJoined { player, ship } => {
                self.players.insert(player.id, player.clone());
                self.ships.insert(player.id, ship.clone());
            }
            ServerMsg::PlayerMoved {
                id,
                position,
                rotation,
            } => {
                if let Some(p) = self.players.get_mut(id) {
                    p.position = *position;
                    p.rotation = *rotation;
                }
            }
            ServerMsg::ShipUpdated { id, ship } => {
                if self.players.contains_key(id) {
                    self.ships.insert(*id, ship.clone());
                }
            }
            ServerMsg::CannonHit { target, damage, .. } => {
                if let Some(p) = self.players.get_mut(target) {
                    p.health = p.health.saturating_sub(*damage);
                }
            }
            ServerMsg::ShipCollision {
                rammer,
                rammed,
                rammer_damage,
                rammed_damage,
                ..
            } => {
                for (id, dmg) in [(rammer, rammer_damage), (rammed, rammed_damage)] {
                    if let Some(p) = self.players.get_mut(id) {
                        p.health = p.health.saturating_sub(*dmg);
                    }
                }
            }
            ServerMsg::ShipDestroyed { id, .. } => {
                if let Some(p) = self.players.get_mut(id) {
                    p.health = broadside_shared::model::MAX_HEALTH;
                }
                if let Some(s) = self.ships.get_mut(id) {
                    s.damage = 0;
                    s.cannons.loaded = true;
                }
            }
            ServerMsg::Respawn { position, rotation } => {
                if let Some(id) = self.self_id {
                    if let Some(p) = self.players.get_mut(&id) {
                        p.position = *position;
                        p.rotation = *rotation;
                        p.health = broadside_shared::model::MAX_HEALTH;
                    }
                }
            }
            ServerMsg::CannonsReloaded => {
                if let Some(id) = self.self_id {
                    if let Some(s) = self.ships.get_mut(&id) {
                        s.cannons.loaded = true;
                    }
                }
            }
            ServerMsg::PlayerLeft(id) => {
                self.players.remove(id);
                self.ships.remove(id);
            }
            ServerMsg::WindChanged(wind) => {
                if let Some(w) = self.world.as_mut() {
                    w.wind = *wind;
                }
            }
            ServerMsg::CannonFired { .. } => {}
        }
    }
}
