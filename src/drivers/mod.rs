//! Concrete device drivers.

pub mod lighthouse;
pub mod simulator;

pub use lighthouse::LighthouseDriver;
pub use simulator::SimulatorDriver;
