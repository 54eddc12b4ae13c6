pub mod cache;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use cache::CachedProvider;
pub use error::*;
pub use memory::{InMemoryMarketData, MarketSnapshot};
pub use traits::*;
pub use types::*;
