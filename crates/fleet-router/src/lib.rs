//! fleet-router — picks a worker for each inbound request.
//!
//! Every call counts towards the model's demand. A model that already
//! has workers is served round-robin without waiting on anything but the
//! registry's data lock; a model with no workers is provisioned inline,
//! exactly once even under concurrent first requests.
//!
//! # Architecture
//!
//! ```text
//! RequestRouter::route(model)
//!   ├── DemandTracker::record(model)
//!   ├── WorkerRegistry::next_worker(model)      fast path
//!   └── WorkerRegistry::lock_model(model)       slow path
//!         ├── re-check next_worker(model)
//!         ├── allocate_port()
//!         ├── ContainerRuntime::start(model, port)
//!         └── add_worker(model, port)
//! ```

pub mod error;
pub mod router;

pub use error::{RouterError, RouterResult};
pub use router::RequestRouter;
