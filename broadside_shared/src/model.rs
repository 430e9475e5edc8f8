//! Game model: players, ships, and the world singleton.
//!
//! These are the records the server owns and replicates. Field names follow
//! the JSON the clients expect (`camelCase`).

use std::f32::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{math::Vec3, net::ConnectionId};

/// Half-extent of the square spawn area on the sea plane.
pub const SPAWN_HALF_EXTENT: f32 = 500.0;

pub const MAX_HEALTH: u32 = 100;
pub const MAX_DAMAGE: u32 = 100;

pub const DEFAULT_CANNON_COUNT: u32 = 8;
pub const DEFAULT_CREW: u32 = 1;

pub const MIN_WIND_STRENGTH: f32 = 0.1;
pub const MAX_WIND_STRENGTH: f32 = 1.0;
/// Largest per-tick change applied to wind direction and strength.
pub const WIND_JITTER: f32 = 0.05;

/// Hull class. Bigger hulls hit harder and suffer more from collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShipType {
    #[default]
    Sloop,
    Brigantine,
    Frigate,
    Galleon,
}

impl ShipType {
    /// Parses a client-supplied hull name, `None` for anything unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sloop" => Some(ShipType::Sloop),
            "brigantine" => Some(ShipType::Brigantine),
            "frigate" => Some(ShipType::Frigate),
            "galleon" => Some(ShipType::Galleon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipType::Sloop => "sloop",
            ShipType::Brigantine => "brigantine",
            ShipType::Frigate => "frigate",
            ShipType::Galleon => "galleon",
        }
    }

    /// Base damage of one broadside before range falloff.
    pub fn cannon_base_damage(&self) -> f32 {
        match self {
            ShipType::Galleon => 15.0,
            ShipType::Frigate => 12.0,
            ShipType::Sloop | ShipType::Brigantine => 10.0,
        }
    }

    /// Multiplier applied to ramming damage taken by this hull.
    pub fn size_factor(&self) -> f32 {
        match self {
            ShipType::Sloop => 0.8,
            ShipType::Brigantine => 1.0,
            ShipType::Frigate => 1.2,
            ShipType::Galleon => 1.5,
        }
    }
}

/// Sail state, copied verbatim from `adjustSails`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Sails {
    pub raised: bool,
    pub angle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cannons {
    pub loaded: bool,
    pub count: u32,
}

impl Default for Cannons {
    fn default() -> Self {
        Self {
            loaded: true,
            count: DEFAULT_CANNON_COUNT,
        }
    }
}

/// A player's vessel. Shares its key with the owning [`Player`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    #[serde(rename = "type")]
    pub ship_type: ShipType,
    /// Cosmetic data chosen by the client; never interpreted by the server.
    pub customization: serde_json::Value,
    pub sails: Sails,
    pub cannons: Cannons,
    pub damage: u32,
    pub crew: u32,
}

impl Ship {
    pub fn new(ship_type: ShipType, customization: serde_json::Value) -> Self {
        Self {
            ship_type,
            customization,
            sails: Sails::default(),
            cannons: Cannons::default(),
            damage: 0,
            crew: DEFAULT_CREW,
        }
    }
}

/// A connected captain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ConnectionId,
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub health: u32,
    pub score: u32,
}

impl Player {
    pub fn new(id: ConnectionId, name: String, spawn: Spawn) -> Self {
        Self {
            id,
            name,
            position: spawn.position,
            rotation: spawn.rotation,
            health: MAX_HEALTH,
            score: 0,
        }
    }
}

/// A spawn placement: position on the sea plane and a heading about Y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Spawn {
    /// Uniform position in `[-500, 500]` on X and Z, random heading.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            position: Vec3::new(
                rng.gen_range(-SPAWN_HALF_EXTENT..=SPAWN_HALF_EXTENT),
                0.0,
                rng.gen_range(-SPAWN_HALF_EXTENT..=SPAWN_HALF_EXTENT),
            ),
            rotation: Vec3::new(0.0, rng.gen_range(0.0..TAU), 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Radians. Not wrapped; consumers go through trigonometry.
    pub direction: f32,
    /// Always within `[MIN_WIND_STRENGTH, MAX_WIND_STRENGTH]`.
    pub strength: f32,
}

impl Wind {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            direction: rng.gen_range(0.0..TAU),
            strength: rng.gen_range(0.5..MAX_WIND_STRENGTH),
        }
    }

    /// Applies one drift step and re-clamps strength.
    pub fn perturb(&mut self, direction_delta: f32, strength_delta: f32) {
        self.direction += direction_delta;
        self.strength =
            (self.strength + strength_delta).clamp(MIN_WIND_STRENGTH, MAX_WIND_STRENGTH);
    }

    /// Draws deltas uniformly from `[-WIND_JITTER, WIND_JITTER]` and applies them.
    pub fn drift<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let dd = rng.gen_range(-WIND_JITTER..=WIND_JITTER);
        let ds = rng.gen_range(-WIND_JITTER..=WIND_JITTER);
        self.perturb(dd, ds);
    }
}

/// Process-wide environment shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub wind: Wind,
    /// Wall-clock milliseconds since the Unix epoch of the last update.
    pub time: i64,
}

impl WorldState {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            wind: Wind::random(rng),
            time: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Advances the wind one step and stamps the current time.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.wind.drift(rng);
        self.time = chrono::Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn ship_type_names_roundtrip() {
        for t in [
            ShipType::Sloop,
            ShipType::Brigantine,
            ShipType::Frigate,
            ShipType::Galleon,
        ] {
            assert_eq!(ShipType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(ShipType::from_name("rowboat"), None);
    }

    #[test]
    fn new_ship_starts_loaded_and_undamaged() {
        let ship = Ship::new(ShipType::Frigate, serde_json::json!({}));
        assert!(ship.cannons.loaded);
        assert_eq!(ship.cannons.count, 8);
        assert_eq!(ship.damage, 0);
        assert_eq!(ship.crew, 1);
        assert!(!ship.sails.raised);
    }

    #[test]
    fn ship_serializes_type_field() {
        let ship = Ship::new(ShipType::Galleon, serde_json::json!({"flag": "skull"}));
        let v = serde_json::to_value(&ship).unwrap();
        assert_eq!(v["type"], "galleon");
        assert_eq!(v["customization"]["flag"], "skull");
        assert_eq!(v["cannons"]["loaded"], true);
    }

    #[test]
    fn spawn_stays_inside_sea_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let s = Spawn::random(&mut rng);
            assert!(s.position.x.abs() <= SPAWN_HALF_EXTENT);
            assert!(s.position.z.abs() <= SPAWN_HALF_EXTENT);
            assert_eq!(s.position.y, 0.0);
            assert!((0.0..TAU).contains(&s.rotation.y));
            assert_eq!(s.rotation.x, 0.0);
            assert_eq!(s.rotation.z, 0.0);
        }
    }

    #[test]
    fn wind_strength_is_clamped() {
        let mut wind = Wind {
            direction: 0.0,
            strength: 0.12,
        };
        wind.perturb(0.05, -0.05);
        assert_eq!(wind.strength, MIN_WIND_STRENGTH);
        assert_eq!(wind.direction, 0.05);

        wind.strength = 0.98;
        wind.perturb(-0.05, 0.05);
        assert_eq!(wind.strength, MAX_WIND_STRENGTH);
    }

    #[test]
    fn wind_drift_never_leaves_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut world = WorldState::new(&mut rng);
        for _ in 0..10_000 {
            let before = world.wind;
            world.tick(&mut rng);
            assert!(world.wind.strength >= MIN_WIND_STRENGTH);
            assert!(world.wind.strength <= MAX_WIND_STRENGTH);
            assert!((world.wind.direction - before.direction).abs() <= WIND_JITTER + 1e-4);
        }
    }
}
