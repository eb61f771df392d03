//! fleet-state — the worker registry for ollama-fleet.
//!
//! Single source of truth for which inference workers exist per model.
//! Both the scaling loop and the request router read and mutate the
//! same `WorkerRegistry`, so scale decisions and routing never observe
//! divergent views of a pool.
//!
//! # Locking
//!
//! ```text
//! WorkerRegistry (Arc<Shared>)
//!   ├── next_port: AtomicU32                 monotonic allocator
//!   ├── pools: Mutex<model → ModelPool>      short, non-awaiting sections
//!   │     └── workers + RoundRobinBalancer
//!   └── guards: Mutex<model → tokio Mutex>   held across runtime start/stop,
//!                                            pruned once no task holds or awaits one
//! ```
//!
//! The registry is `Clone` (backed by `Arc`) and can be shared across
//! async tasks.

pub mod balancer;
pub mod error;
pub mod registry;
pub mod types;

pub use balancer::RoundRobinBalancer;
pub use error::{StateError, StateResult};
pub use registry::{ModelGuard, WorkerRegistry};
pub use types::*;
