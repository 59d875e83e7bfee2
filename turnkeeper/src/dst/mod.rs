//! Deterministic simulation: shared clock, seeded RNG, summarizer faults and
//! property runs.
//!
//! Every run is reproducible from its seed. To replay a failure:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

mod clock;
mod config;
mod fault;
mod property;
mod rng;
mod simulation;

pub use clock::{ms_to_datetime, SimClock};
pub use config::{SimConfig, DST_SEED_ENV};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use property::{
    test_seeds, PropertyTest, PropertyTestFailure, PropertyTestResult, PropertyTestable,
    TimeAdvanceConfig,
};
pub use rng::DeterministicRng;
pub use simulation::{SimEnvironment, Simulation};
