//! # Particle Module
//!
//! Particle state as seen by estimators, and the events a random walk
//! reports to them.
//!
//! ## Events
//!
//! ```text
//! EnteringCell ──► Subtrack / Collision ... ──► LeavingCell
//!                          │
//!                  SurfaceCrossing (on every boundary)
//! ```
//!
//! Energies are in MeV, times in seconds, lengths in cm.

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, ParticleType, Vec3};

/// Snapshot of a particle at the moment an event is observed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub particle_type: ParticleType,
    /// Statistical weight
    pub weight: f64,
    /// Kinetic energy (MeV)
    pub energy: f64,
    /// Time since the source event (s)
    pub time: f64,
    /// Number of collisions so far in this history
    pub collision_number: u32,
    /// Energy of the source particle that started the history
    pub source_energy: f64,
    /// Birth time of the source particle
    pub source_time: f64,
    /// Source that emitted the history
    pub source_id: u32,
    pub position: Vec3,
    /// Unit direction of flight
    pub direction: Vec3,
}

impl ParticleState {
    /// Fresh source particle of unit weight at the origin, flying along +z
    pub fn new(particle_type: ParticleType, energy: f64) -> Self {
        Self {
            particle_type,
            weight: 1.0,
            energy,
            time: 0.0,
            collision_number: 0,
            source_energy: energy,
            source_time: 0.0,
            source_id: 0,
            position: Vec3::zero(),
            direction: Vec3::unit_z(),
        }
    }

    pub fn neutron(energy: f64) -> Self {
        Self::new(ParticleType::Neutron, energy)
    }

    pub fn photon(energy: f64) -> Self {
        Self::new(ParticleType::Photon, energy)
    }

    pub fn electron(energy: f64) -> Self {
        Self::new(ParticleType::Electron, energy)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_collision_number(mut self, collision_number: u32) -> Self {
        self.collision_number = collision_number;
        self
    }

    pub fn with_source_id(mut self, source_id: u32) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction.normalize();
        self
    }

    /// Move along the current direction
    pub fn advance(&mut self, distance: f64) {
        self.position = self.position.advance(&self.direction, distance);
    }
}

/// Event reported by the random walk to the estimators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservedEvent {
    /// Straight flight segment inside a cell
    Subtrack {
        cell: EntityId,
        start: Vec3,
        direction: Vec3,
        track_length: f64,
    },
    /// Collision inside a cell
    Collision {
        cell: EntityId,
        /// 1/Σt at the collision energy (cm)
        inverse_total_cross_section: f64,
    },
    /// Boundary crossing
    SurfaceCrossing {
        surface: EntityId,
        /// Cosine between the direction of flight and the surface normal
        angle_cosine: f64,
    },
    EnteringCell { cell: EntityId },
    LeavingCell { cell: EntityId },
}

impl ObservedEvent {
    /// Cell or surface the event happened on
    pub fn entity(&self) -> EntityId {
        match *self {
            ObservedEvent::Subtrack { cell, .. }
            | ObservedEvent::Collision { cell, .. }
            | ObservedEvent::EnteringCell { cell }
            | ObservedEvent::LeavingCell { cell } => cell,
            ObservedEvent::SurfaceCrossing { surface, .. } => surface,
        }
    }

    pub fn is_surface_event(&self) -> bool {
        matches!(self, ObservedEvent::SurfaceCrossing { .. })
    }
}
