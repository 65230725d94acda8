pub mod clock;
pub mod geo;
pub mod log;
pub mod machine;
pub mod policy;
pub mod resolver;
pub mod strategy;
pub mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use machine::{AttendanceState, AttendanceStateMachine, MachineSnapshot, Phase};
pub use policy::AttendancePolicy;
pub use resolver::{Resolution, StoreResolver};
pub use strategy::StrategyRegistry;
