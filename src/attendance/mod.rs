pub mod engine;
pub mod reconcile;

pub use engine::AttendanceEngine;
pub use reconcile::Reconciler;
