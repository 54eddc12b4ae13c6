//! Walk-forward backtesting of the sector pick pipeline.

pub mod error;
pub mod models;
pub mod momentum;
pub mod summary;
pub mod walk_forward;

pub use error::BacktestError;
pub use models::*;
pub use momentum::{MomentumMetricProvider, MomentumScorer, PointInTimeMetricProvider};
pub use walk_forward::WalkForwardBacktester;
