//! Damage application and respawn.
//!
//! Runs under the entity's lock. When health crosses zero the entity is
//! reset and moved to its new spawn inside the same critical section, so no
//! other task ever sees a ship sitting at zero health and a crossing can only
//! be reported once.

use broadside_shared::{
    math::Vec3,
    model::{Spawn, MAX_DAMAGE, MAX_HEALTH},
};

use crate::store::Entity;

/// A ship that was sunk and put back on the water.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Destruction {
    /// Where the ship went down.
    pub wreck: Vec3,
    /// Where it came back.
    pub respawn: Spawn,
}

/// Applies `amount` to `entity`, respawning it at `respawn` if it sinks.
pub fn take_damage(entity: &mut Entity, amount: u32, respawn: Spawn) -> Option<Destruction> {
    entity.player.health = entity.player.health.saturating_sub(amount);
    entity.ship.damage = entity.ship.damage.saturating_add(amount).min(MAX_DAMAGE);

    if entity.player.health > 0 {
        return None;
    }

    let wreck = entity.player.position;
    entity.player.health = MAX_HEALTH;
    entity.player.position = respawn.position;
    entity.player.rotation = respawn.rotation;
    entity.ship.damage = 0;
    entity.ship.cannons.loaded = true;
    entity.cancel_reload();

    Some(Destruction { wreck, respawn })
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_shared::{
        model::{Player, Ship, ShipType},
        net::ConnectionId,
    };

    fn fresh() -> Entity {
        let spawn = Spawn {
            position: Vec3::new(10.0, 0.0, 10.0),
            rotation: Vec3::ZERO,
        };
        Entity::new(
            Player::new(ConnectionId::new_unique(), "Anne".into(), spawn),
            Ship::new(ShipType::Sloop, serde_json::json!({})),
        )
    }

    fn elsewhere() -> Spawn {
        Spawn {
            position: Vec3::new(-300.0, 0.0, 250.0),
            rotation: Vec3::new(0.0, 1.25, 0.0),
        }
    }

    #[test]
    fn damage_mirrors_health_loss() {
        let mut e = fresh();
        for amount in [9, 12, 4, 18] {
            assert!(take_damage(&mut e, amount, elsewhere()).is_none());
            assert_eq!(e.ship.damage, MAX_HEALTH - e.player.health);
        }
        assert_eq!(e.player.health, 57);
    }

    #[test]
    fn crossing_zero_respawns_once() {
        let mut e = fresh();
        e.ship.cannons.loaded = false;
        assert!(take_damage(&mut e, 95, elsewhere()).is_none());

        let d = take_damage(&mut e, 15, elsewhere()).expect("sunk");
        assert_eq!(d.wreck, Vec3::new(10.0, 0.0, 10.0));
        assert_eq!(e.player.health, MAX_HEALTH);
        assert_eq!(e.ship.damage, 0);
        assert!(e.ship.cannons.loaded);
        assert_eq!(e.player.position, d.respawn.position);
        assert_eq!(e.player.rotation, d.respawn.rotation);

        // Follow-up hits land on the fresh hull and do not sink it again.
        assert!(take_damage(&mut e, 15, elsewhere()).is_none());
        assert_eq!(e.player.health, 85);
    }

    #[test]
    fn huge_hits_saturate() {
        let mut e = fresh();
        let d = take_damage(&mut e, u32::MAX, elsewhere());
        assert!(d.is_some());
        assert_eq!(e.player.health, MAX_HEALTH);
        assert!(e.ship.damage <= MAX_DAMAGE);
    }

    #[test]
    fn sinking_invalidates_pending_reload() {
        let mut e = fresh();
        let generation = e.reload_generation;
        take_damage(&mut e, 100, elsewhere());
        assert_ne!(e.reload_generation, generation);
    }
}
