//! # vrhal - VR Tracking Hardware Abstraction Layer
//!
//! Uniform access to head-mounted displays and tracked controllers across
//! heterogeneous drivers. Provides:
//! - Driver registry with stable device enumeration
//! - A polymorphic device contract with a typed property protocol
//! - Concurrent pose acquisition with shared background-polling contexts
//! - A pure lens distortion / chromatic aberration model for render paths
//!
//! ## Quick Start
//! ```no_run
//! use vrhal::{FloatProperty, OpenOptions, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register_defaults();
//!
//! let descriptors = registry.enumerate();
//! for d in &descriptors {
//!     println!("{}: {} {}", d.id, d.vendor, d.product);
//! }
//!
//! let mut hmd = registry.open(descriptors[0].id, &OpenOptions::default()).unwrap();
//! let quat = hmd.get_float(FloatProperty::RotationQuat).unwrap();
//! println!("orientation: {:?}", quat);
//! hmd.close().unwrap();
//! ```

pub mod acquisition;
pub mod device;
pub mod distortion;
pub mod drivers;
pub mod error;
pub mod hid;
pub mod math;
pub mod registry;
pub mod types;

pub use acquisition::{AcquisitionContext, ButtonEvent, EngineState, EventSink, TrackingSubsystem};
pub use device::{FloatProperty, IntProperty, StringProperty, TrackedDevice};
pub use distortion::{ChannelUv, CorrectionToggles, LensGeometry};
pub use error::VrHalError;
pub use registry::{DeviceDescriptor, Driver, OpenOptions, Registry};
pub use types::*;

/// Result type alias for vrhal operations.
pub type Result<T> = std::result::Result<T, VrHalError>;
