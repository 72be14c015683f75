// src/core/mod.rs

pub mod health_check;
pub mod key_rotation;
pub mod rotator;

pub use health_check::{HealthChecker, HealthTargets, KeyCheck, KeyProbe, ProbeResult, SweepReport};
pub use key_rotation::{
    CostOptimizedStrategy, KeyRotationStrategy, KeySelector, LeastUsedStrategy, RandomStrategy,
    RoundRobinStrategy, SingleStrategy,
};
pub use rotator::{KeyRotator, Selection};
