//! Domain model (IDs, pool lifecycle state).

pub mod ids;
pub mod state;

pub use ids::{PoolId, TaskId, WorkerId};
pub use state::PoolState;
