//! # Synthetic Transport
//!
//! A small analog random walk through nested spherical shells, used to feed
//! estimators with realistic event streams.
//!
//! ## Model
//!
//! ```text
//! d_collision = −ln(ξ) / Σt(cell)
//! d_boundary  = distance to the enclosing sphere, or to the inner sphere
//!               when the flight points inward
//! ```
//!
//! The shorter distance wins. A collision absorbs the particle with the cell's
//! absorption probability, otherwise it scatters isotropically and keeps a
//! uniform fraction of its energy above `1 − max_energy_loss`. A particle
//! leaving the outermost sphere escapes.
//!
//! Cell `i + 1` is the shell between radii `i − 1` and `i`, surface `i + 1` is
//! the sphere of radius `i`, matching `InMemoryGeometry::concentric_spheres`.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Result, TallyError};
use crate::handler::HistorySource;
use crate::particle::{ObservedEvent, ParticleState};
use crate::types::{EntityId, ParticleType, Vec3};

/// Neutron speed per √MeV (cm/s)
const NEUTRON_SPEED_PER_ROOT_MEV: f64 = 1.3831e9;

/// Speed of light (cm/s)
const SPEED_OF_LIGHT: f64 = 2.997_924_58e10;

/// Boundary distances below this are treated as the surface just crossed
const SURFACE_TOLERANCE: f64 = 1e-10;

/// Material of one spherical shell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellMaterial {
    /// Macroscopic total cross section (1/cm)
    pub sigma_t: f64,
    /// Probability that a collision ends the history
    pub absorption_probability: f64,
}

impl ShellMaterial {
    pub fn new(sigma_t: f64, absorption_probability: f64) -> Self {
        Self {
            sigma_t,
            absorption_probability,
        }
    }

    pub fn void() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Random walk through concentric spheres centred at the origin
#[derive(Debug, Clone)]
pub struct SphericalRandomWalk {
    radii: Vec<f64>,
    materials: Vec<ShellMaterial>,
    particle_type: ParticleType,
    source_energy: f64,
    max_energy_loss: f64,
    energy_cutoff: f64,
    max_collisions: u32,
}

impl SphericalRandomWalk {
    /// `radii` ascending, one material per shell
    pub fn new(radii: Vec<f64>, materials: Vec<ShellMaterial>) -> Result<Self> {
        if radii.is_empty() || radii.len() != materials.len() {
            return Err(TallyError::InvalidSourceModel(format!(
                "{} radii for {} shell materials",
                radii.len(),
                materials.len()
            )));
        }
        if radii[0] <= 0.0 || radii.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TallyError::InvalidSourceModel(
                "shell radii must be positive and strictly ascending".to_string(),
            ));
        }
        if let Some(m) = materials
            .iter()
            .find(|m| m.sigma_t < 0.0 || !(0.0..=1.0).contains(&m.absorption_probability))
        {
            return Err(TallyError::InvalidSourceModel(format!(
                "invalid shell material {:?}",
                m
            )));
        }
        Ok(Self {
            radii,
            materials,
            particle_type: ParticleType::Neutron,
            source_energy: 14.1,
            max_energy_loss: 0.5,
            energy_cutoff: 1e-3,
            max_collisions: 1000,
        })
    }

    /// Point source at the origin emitting `particle_type` at `energy` (MeV)
    pub fn with_source(mut self, particle_type: ParticleType, energy: f64) -> Self {
        self.particle_type = particle_type;
        self.source_energy = energy;
        self
    }

    pub fn with_max_energy_loss(mut self, fraction: f64) -> Self {
        self.max_energy_loss = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_energy_cutoff(mut self, energy: f64) -> Self {
        self.energy_cutoff = energy;
        self
    }

    pub fn number_of_shells(&self) -> usize {
        self.radii.len()
    }

    fn speed(&self, energy: f64) -> f64 {
        match self.particle_type {
            ParticleType::Neutron => NEUTRON_SPEED_PER_ROOT_MEV * energy.sqrt(),
            ParticleType::Photon | ParticleType::Electron => SPEED_OF_LIGHT,
        }
    }

    /// Distance to the next sphere and the shell index entered there
    /// (`None` past the outermost sphere)
    fn next_boundary(&self, shell: usize, pos: &Vec3, dir: &Vec3) -> (f64, usize, Option<usize>) {
        let b = pos.dot(dir);
        let r2 = pos.dot(pos);

        if shell > 0 {
            let inner = self.radii[shell - 1];
            let disc = b * b - (r2 - inner * inner);
            if disc >= 0.0 {
                let d = -b - disc.sqrt();
                if d > SURFACE_TOLERANCE {
                    return (d, shell - 1, Some(shell - 1));
                }
            }
        }

        let outer = self.radii[shell];
        let disc = (b * b - (r2 - outer * outer)).max(0.0);
        let d = (-b + disc.sqrt()).max(0.0);
        let next = (shell + 1 < self.radii.len()).then_some(shell + 1);
        (d, shell, next)
    }
}

/// Direction with polar cosine `mu` relative to `dir` and uniform azimuth
pub fn rotate_direction(dir: &Vec3, mu: f64, rng: &mut StdRng) -> Vec3 {
    let phi = 2.0 * PI * rng.gen::<f64>();
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
    let (u, v, w) = (dir.x, dir.y, dir.z);

    let rotated = if w.abs() < 0.999 {
        let a = (1.0 - w * w).sqrt();
        Vec3::new(
            mu * u + sin_theta * (u * w * phi.cos() - v * phi.sin()) / a,
            mu * v + sin_theta * (v * w * phi.cos() + u * phi.sin()) / a,
            mu * w - sin_theta * phi.cos() * a,
        )
    } else {
        Vec3::new(
            sin_theta * phi.cos(),
            sin_theta * phi.sin(),
            mu * w.signum(),
        )
    };
    rotated.normalize()
}

/// Isotropic unit vector
pub fn isotropic_direction(rng: &mut StdRng) -> Vec3 {
    let mu: f64 = 2.0 * rng.gen::<f64>() - 1.0;
    rotate_direction(&Vec3::unit_z(), mu, rng)
}

impl HistorySource for SphericalRandomWalk {
    fn run_history(
        &self,
        _history: u64,
        rng: &mut StdRng,
        observe: &mut dyn FnMut(&ParticleState, &ObservedEvent),
    ) {
        let mut state = ParticleState::new(self.particle_type, self.source_energy)
            .with_direction(isotropic_direction(rng));
        let mut shell = 0usize;
        let cell_of = |shell: usize| shell as EntityId + 1;

        observe(&state, &ObservedEvent::EnteringCell { cell: cell_of(shell) });

        loop {
            let material = self.materials[shell];
            let (d_boundary, surface_shell, next) =
                self.next_boundary(shell, &state.position, &state.direction);
            let d_collision = if material.sigma_t > 0.0 {
                -(1.0 - rng.gen::<f64>()).ln() / material.sigma_t
            } else {
                f64::INFINITY
            };
            let distance = d_collision.min(d_boundary);

            observe(
                &state,
                &ObservedEvent::Subtrack {
                    cell: cell_of(shell),
                    start: state.position,
                    direction: state.direction,
                    track_length: distance,
                },
            );
            state.time += distance / self.speed(state.energy);
            state.advance(distance);

            if d_collision < d_boundary {
                observe(
                    &state,
                    &ObservedEvent::Collision {
                        cell: cell_of(shell),
                        inverse_total_cross_section: 1.0 / material.sigma_t,
                    },
                );
                state.collision_number += 1;

                if rng.gen::<f64>() < material.absorption_probability {
                    return;
                }
                let kept = 1.0 - self.max_energy_loss * rng.gen::<f64>();
                state.energy *= kept;
                state.direction = isotropic_direction(rng);
                if state.energy < self.energy_cutoff || state.collision_number >= self.max_collisions {
                    return;
                }
                continue;
            }

            let normal = state.position.normalize();
            observe(&state, &ObservedEvent::LeavingCell { cell: cell_of(shell) });
            observe(
                &state,
                &ObservedEvent::SurfaceCrossing {
                    surface: cell_of(surface_shell),
                    angle_cosine: state.direction.dot(&normal),
                },
            );
            match next {
                Some(entered) => {
                    shell = entered;
                    observe(&state, &ObservedEvent::EnteringCell { cell: cell_of(shell) });
                }
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::history_rng;

    fn collect(walk: &SphericalRandomWalk, seed: u64) -> Vec<(ParticleState, ObservedEvent)> {
        let mut events = Vec::new();
        let mut rng = history_rng(seed, 0);
        walk.run_history(0, &mut rng, &mut |s, e| events.push((*s, *e)));
        events
    }

    #[test]
    fn test_void_sphere_streams_to_escape() {
        let walk = SphericalRandomWalk::new(vec![1.0, 2.0], vec![ShellMaterial::void(); 2]).unwrap();
        let events = collect(&walk, 3);

        let tracks: Vec<f64> = events
            .iter()
            .filter_map(|(_, e)| match e {
                ObservedEvent::Subtrack { track_length, .. } => Some(*track_length),
                _ => None,
            })
            .collect();
        assert_eq!(tracks.len(), 2);
        assert!((tracks[0] - 1.0).abs() < 1e-9);
        assert!((tracks[1] - 1.0).abs() < 1e-9);

        let crossings: Vec<(EntityId, f64)> = events
            .iter()
            .filter_map(|(_, e)| match e {
                ObservedEvent::SurfaceCrossing { surface, angle_cosine } => Some((*surface, *angle_cosine)),
                _ => None,
            })
            .collect();
        assert_eq!(crossings.iter().map(|c| c.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!(crossings.iter().all(|c| (c.1 - 1.0).abs() < 1e-9));
        assert!(matches!(events.last(), Some((_, ObservedEvent::SurfaceCrossing { surface: 2, .. }))));
    }

    #[test]
    fn test_enter_leave_balanced() {
        let walk = SphericalRandomWalk::new(
            vec![1.0, 2.0, 3.0],
            vec![ShellMaterial::new(1.0, 0.0); 3],
        )
        .unwrap()
        .with_max_energy_loss(0.0);
        for seed in 0..20 {
            let events = collect(&walk, seed);
            let enters = events.iter().filter(|(_, e)| matches!(e, ObservedEvent::EnteringCell { .. })).count();
            let leaves = events.iter().filter(|(_, e)| matches!(e, ObservedEvent::LeavingCell { .. })).count();
            assert_eq!(enters, leaves);
        }
    }

    #[test]
    fn test_collisions_follow_cross_section() {
        let walk = SphericalRandomWalk::new(vec![1.0e6], vec![ShellMaterial::new(2.0, 1.0)]).unwrap();
        let events = collect(&walk, 11);
        let collision = events
            .iter()
            .find_map(|(s, e)| match e {
                ObservedEvent::Collision { inverse_total_cross_section, .. } => {
                    Some((s.collision_number, *inverse_total_cross_section))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(collision, (0, 0.5));
        assert!(!events.iter().any(|(_, e)| matches!(e, ObservedEvent::LeavingCell { .. })));
    }

    #[test]
    fn test_rejects_bad_shells() {
        assert!(SphericalRandomWalk::new(vec![2.0, 1.0], vec![ShellMaterial::void(); 2]).is_err());
        assert!(SphericalRandomWalk::new(vec![1.0], vec![]).is_err());
        assert!(SphericalRandomWalk::new(vec![1.0], vec![ShellMaterial::new(1.0, 1.5)]).is_err());
    }

    #[test]
    fn test_rotation_keeps_cosine() {
        let mut rng = history_rng(5, 5);
        let dir = Vec3::new(0.3, -0.4, 0.2).normalize();
        let out = rotate_direction(&dir, 0.25, &mut rng);
        assert!((out.mag() - 1.0).abs() < 1e-12);
        assert!((out.dot(&dir) - 0.25).abs() < 1e-9);
    }
}
