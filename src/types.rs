//! # Core Types
//!
//! Fundamental identifiers and small value types shared by every module:
//! estimator ids, entity kinds, particle types and the 3D vector used for
//! particle directions and mesh tracks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// VECTOR TYPES (3D)
// ============================================================================

/// 3D vector for positions and directions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create new vector
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Unit vectors
    pub const fn unit_x() -> Self { Self::new(1.0, 0.0, 0.0) }
    pub const fn unit_y() -> Self { Self::new(0.0, 1.0, 0.0) }
    pub const fn unit_z() -> Self { Self::new(0.0, 0.0, 1.0) }

    /// Component along an axis (0 = x, 1 = y, 2 = z)
    pub fn component(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Magnitude squared
    pub fn mag_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Magnitude
    pub fn mag(&self) -> f64 {
        self.mag_squared().sqrt()
    }

    /// Normalize to unit vector
    pub fn normalize(&self) -> Self {
        let m = self.mag();
        if m > 1e-15 {
            Self::new(self.x / m, self.y / m, self.z / m)
        } else {
            Self::zero()
        }
    }

    /// Dot product
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Point reached after travelling `distance` along `direction`
    pub fn advance(&self, direction: &Self, distance: f64) -> Self {
        *self + *direction * distance
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6e}, {:.6e}, {:.6e})", self.x, self.y, self.z)
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Cell, surface or mesh-element identifier
pub type EntityId = u32;

/// Estimator (observer) identifier
///
/// Unique across the whole resolved estimator set. `EstimatorId::INVALID`
/// is the invalid observer handle and can never be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstimatorId(u32);

impl EstimatorId {
    /// Reserved invalid observer handle
    pub const INVALID: EstimatorId = EstimatorId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Sentinel values that no estimator may use
    pub fn is_reserved(self) -> bool {
        self == Self::INVALID
    }
}

impl fmt::Display for EstimatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EstimatorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// Geometric entity class an estimator is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// 3-D region
    Cell,
    /// 2-D boundary
    Surface,
    /// Element of an estimator-owned structured mesh
    MeshElement,
}

impl EntityKind {
    /// Dimensional discriminator used by geometry property queries
    pub fn dimension(&self) -> u8 {
        match self {
            EntityKind::Cell | EntityKind::MeshElement => 3,
            EntityKind::Surface => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Cell => "cell",
            EntityKind::Surface => "surface",
            EntityKind::MeshElement => "mesh element",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PARTICLE TYPES
// ============================================================================

/// Particle types that can be observed by an estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParticleType {
    Neutron,
    Photon,
    Electron,
}

impl ParticleType {
    pub const ALL: [ParticleType; 3] =
        [ParticleType::Neutron, ParticleType::Photon, ParticleType::Electron];

    /// Short code used in geometry property tags
    pub fn code(&self) -> &'static str {
        match self {
            ParticleType::Neutron => "n",
            ParticleType::Photon => "p",
            ParticleType::Electron => "e",
        }
    }

    /// Verbose name used in run configuration
    pub fn name(&self) -> &'static str {
        match self {
            ParticleType::Neutron => "Neutron",
            ParticleType::Photon => "Photon",
            ParticleType::Electron => "Electron",
        }
    }

    /// Parse a geometry short code (`n`, `p`, `e`)
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Parse a verbose configuration name, falling back to the short code
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .or_else(|| Self::from_code(name))
    }
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParticleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| s.to_string())
    }
}
