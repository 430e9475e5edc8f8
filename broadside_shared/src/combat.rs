//! Combat rules.
//!
//! Pure functions over entity snapshots: no locking, no I/O, no randomness.
//! The server takes a snapshot of every live ship, asks these functions what
//! happened, then applies the outcome to the entity store.
//!
//! Target selection: when several ships qualify, the nearest one wins; exact
//! distance ties go to whichever comes first in the snapshot (join order).

use crate::{
    math::{normalize_angle, Vec3},
    model::ShipType,
    net::ConnectionId,
};

/// Cannon shots only reach targets strictly closer than this.
pub const CANNON_RANGE: f32 = 50.0;
/// Half-width of the firing cone, in radians (about 17 degrees).
pub const CANNON_ARC: f32 = 0.3;
/// Damage never falls below this fraction of base at the edge of range.
pub const MIN_FALLOFF: f32 = 0.2;
/// Ramming requires hulls strictly closer than this.
pub const RAM_RANGE: f32 = 10.0;
pub const RAMMER_BASE_DAMAGE: f32 = 5.0;
pub const RAMMED_BASE_DAMAGE: f32 = 15.0;

/// What the resolver needs to know about one ship.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub id: ConnectionId,
    pub position: Vec3,
    pub ship_type: ShipType,
}

/// A target selected by a scan, with its range from the actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub contact: Contact,
    pub distance: f32,
}

/// Outcome of a cannon shot that connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannonHit {
    pub target: ConnectionId,
    pub damage: u32,
    /// Where the target was when struck.
    pub position: Vec3,
}

/// Outcome of a ram that connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub rammed: ConnectionId,
    pub rammer_damage: u32,
    pub rammed_damage: u32,
}

fn nearest<'a>(
    candidates: impl Iterator<Item = (&'a Contact, f32)>,
) -> Option<Sighting> {
    let mut best: Option<Sighting> = None;
    for (contact, distance) in candidates {
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(Sighting {
                contact: *contact,
                distance,
            });
        }
    }
    best
}

/// Finds the ship a shot fired from `origin` along `direction` would strike.
pub fn scan_cannon_target(
    shooter: ConnectionId,
    origin: Vec3,
    direction: f32,
    contacts: &[Contact],
) -> Option<Sighting> {
    nearest(
        contacts
            .iter()
            .filter(|c| c.id != shooter)
            .map(|c| (c, origin.horizontal_distance(c.position)))
            .filter(|(_, d)| *d < CANNON_RANGE)
            .filter(|(c, _)| {
                let bearing = origin.heading_to(c.position);
                normalize_angle(bearing - direction).abs() < CANNON_ARC
            }),
    )
}

/// Finds the ship a ram from `origin` would strike.
pub fn scan_ram_target(rammer: ConnectionId, origin: Vec3, contacts: &[Contact]) -> Option<Sighting> {
    nearest(
        contacts
            .iter()
            .filter(|c| c.id != rammer)
            .map(|c| (c, origin.horizontal_distance(c.position)))
            .filter(|(_, d)| *d < RAM_RANGE),
    )
}

/// Cannon damage for an attacker hull at the given range.
pub fn cannon_damage(attacker: ShipType, distance: f32) -> u32 {
    let falloff = (1.0 - distance / CANNON_RANGE).max(MIN_FALLOFF);
    (attacker.cannon_base_damage() * falloff).floor() as u32
}

/// Damage taken by the rammer and by the rammed ship, in that order.
pub fn ram_damage(rammer: ShipType, rammed: ShipType) -> (u32, u32) {
    (
        (RAMMER_BASE_DAMAGE * rammer.size_factor()).floor() as u32,
        (RAMMED_BASE_DAMAGE * rammed.size_factor()).floor() as u32,
    )
}

/// Resolves a shot: target selection plus damage.
pub fn resolve_cannon_fire(
    shooter: ConnectionId,
    shooter_type: ShipType,
    origin: Vec3,
    direction: f32,
    contacts: &[Contact],
) -> Option<CannonHit> {
    scan_cannon_target(shooter, origin, direction, contacts).map(|s| CannonHit {
        target: s.contact.id,
        damage: cannon_damage(shooter_type, s.distance),
        position: s.contact.position,
    })
}

/// Resolves a ram: target selection plus damage to both hulls.
pub fn resolve_ram(
    rammer: ConnectionId,
    rammer_type: ShipType,
    origin: Vec3,
    contacts: &[Contact],
) -> Option<Collision> {
    scan_ram_target(rammer, origin, contacts).map(|s| {
        let (rammer_damage, rammed_damage) = ram_damage(rammer_type, s.contact.ship_type);
        Collision {
            rammed: s.contact.id,
            rammer_damage,
            rammed_damage,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn contact(ship_type: ShipType, x: f32, z: f32) -> Contact {
        Contact {
            id: ConnectionId::new_unique(),
            position: Vec3::new(x, 0.0, z),
            ship_type,
        }
    }

    #[test]
    fn galleon_aligned_at_twenty_units_deals_nine() {
        let a = contact(ShipType::Galleon, 0.0, 0.0);
        let b = contact(ShipType::Sloop, 20.0, 0.0);
        let hit = resolve_cannon_fire(a.id, a.ship_type, a.position, 0.0, &[a, b]).unwrap();
        assert_eq!(hit.target, b.id);
        assert_eq!(hit.damage, 9);
        assert_eq!(hit.position, b.position);
    }

    #[test]
    fn damage_table_by_hull() {
        assert_eq!(cannon_damage(ShipType::Sloop, 0.0), 10);
        assert_eq!(cannon_damage(ShipType::Brigantine, 0.0), 10);
        assert_eq!(cannon_damage(ShipType::Frigate, 0.0), 12);
        assert_eq!(cannon_damage(ShipType::Galleon, 0.0), 15);
    }

    #[test]
    fn falloff_has_a_floor() {
        // 1 - 49/50 = 0.02, floored to 0.2.
        assert_eq!(cannon_damage(ShipType::Galleon, 49.0), 3);
        assert_eq!(cannon_damage(ShipType::Sloop, 45.0), 2);
    }

    #[test]
    fn shots_out_of_range_or_arc_miss() {
        let a = contact(ShipType::Frigate, 0.0, 0.0);
        let far = contact(ShipType::Sloop, 50.0, 0.0);
        assert!(scan_cannon_target(a.id, a.position, 0.0, &[a, far]).is_none());

        let wide = contact(ShipType::Sloop, 0.0, 20.0);
        assert!(scan_cannon_target(a.id, a.position, 0.0, &[a, wide]).is_none());
        assert!(scan_cannon_target(a.id, a.position, PI / 2.0, &[a, wide]).is_some());
    }

    #[test]
    fn arc_check_wraps_around_pi() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        // Target sits just below the -X axis, bearing close to -π.
        let b = contact(ShipType::Sloop, -20.0, -1.0);
        assert!(scan_cannon_target(a.id, a.position, PI, &[a, b]).is_some());
        assert!(scan_cannon_target(a.id, a.position, PI + 2.0 * PI, &[a, b]).is_some());
    }

    #[test]
    fn height_is_ignored() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        let mut b = contact(ShipType::Sloop, 10.0, 0.0);
        b.position.y = 500.0;
        assert!(scan_cannon_target(a.id, a.position, 0.0, &[a, b]).is_some());
    }

    #[test]
    fn shooter_never_targets_itself() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        assert!(scan_cannon_target(a.id, a.position, 0.0, &[a]).is_none());
        assert!(scan_ram_target(a.id, a.position, &[a]).is_none());
    }

    #[test]
    fn nearest_target_wins() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        let far = contact(ShipType::Sloop, 40.0, 0.0);
        let near = contact(ShipType::Sloop, 15.0, 1.0);
        let hit = scan_cannon_target(a.id, a.position, 0.0, &[a, far, near]).unwrap();
        assert_eq!(hit.contact.id, near.id);

        let tie_first = contact(ShipType::Sloop, 5.0, 0.0);
        let tie_second = contact(ShipType::Sloop, -5.0, 0.0);
        let hit = scan_ram_target(a.id, a.position, &[a, tie_first, tie_second]).unwrap();
        assert_eq!(hit.contact.id, tie_first.id);
    }

    #[test]
    fn sloop_ramming_frigate() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        let b = contact(ShipType::Frigate, 6.0, 0.0);
        let c = resolve_ram(a.id, a.ship_type, a.position, &[a, b]).unwrap();
        assert_eq!(c.rammed, b.id);
        assert_eq!(c.rammer_damage, 4);
        assert_eq!(c.rammed_damage, 18);
    }

    #[test]
    fn ram_damage_table() {
        assert_eq!(ram_damage(ShipType::Galleon, ShipType::Sloop), (7, 12));
        assert_eq!(ram_damage(ShipType::Brigantine, ShipType::Galleon), (5, 22));
    }

    #[test]
    fn ram_needs_contact() {
        let a = contact(ShipType::Sloop, 0.0, 0.0);
        let b = contact(ShipType::Sloop, 10.0, 0.0);
        assert!(resolve_ram(a.id, a.ship_type, a.position, &[a, b]).is_none());
    }
}
