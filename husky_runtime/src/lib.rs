#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod graph;
pub mod instance;
pub mod manager;
pub mod monitor;
pub mod pool;

pub use cache::{CacheConfig, SceneCache, SceneTemplate};
pub use error::SceneError;
pub use graph::DependencyGraph;
pub use instance::{InstanceState, SceneInstance};
pub use manager::{
    AsyncHandle, CreateCallback, CreateRequest, SceneContext, SceneInstanceManager,
};
pub use monitor::{Alert, AlertKind, MonitorConfig, PerformanceMonitor, Snapshot};
pub use pool::{InstancePool, PoolConfig};
