//! # stickprobe
//!
//! Game controller diagnostics: enumerate attached controllers, poll their axes,
//! buttons and hats, and exercise force-feedback effects.
//!
//! The core is platform-agnostic and talks to the input subsystem through the traits in
//! [`device`]. [`backends`] provides DirectInput 8 on Windows and a scripted virtual
//! subsystem everywhere.
//!
//! ## Flow
//! 1. [`DeviceCatalog`] lists devices as owned [`DeviceDescriptor`]s.
//! 2. [`DeviceSession::open`] opens one, [`DeviceSession::enumerate_objects`] learns its
//!    layout and applies the configured axis range.
//! 3. [`PollLoop::run`] (or [`DeviceSession::poll`] directly) produces
//!    [`JoystickState`] snapshots, recovering from lost input on its own.
//! 4. [`EffectCatalog`] lists supported effect types; [`EffectBinding`] creates and
//!    plays one.
//!
//! ```no_run
//! use std::ops::ControlFlow;
//! use stickprobe::{backends, CancelToken, DeliveryMode, DeviceCatalog, DeviceFilter,
//!                  DeviceSession, PollConfig, PollLoop};
//!
//! let system = backends::default_system()?;
//! let config = PollConfig::default();
//! let device = DeviceCatalog::new(system.as_ref()).select(&DeviceFilter::default(), 0)?;
//! let mut session = DeviceSession::open(system.as_ref(), &device, &config)?;
//! session.enumerate_objects()?;
//!
//! let mut sink = |state: &stickprobe::JoystickState| -> ControlFlow<()> {
//!     println!("{:?}", state.axes);
//!     ControlFlow::Continue(())
//! };
//! PollLoop::run(&mut session, &mut sink, DeliveryMode::Continuous, &CancelToken::new());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backends;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod device;
pub mod effect;
pub mod error;
pub mod logging;
pub mod poll_loop;
pub mod session;
pub mod snapshot;

pub use cancel::CancelToken;
pub use catalog::{DeviceCatalog, DeviceDescriptor, DeviceFilter, DeviceId};
pub use config::{PollConfig, ProbeConfig};
pub use effect::{
    Direction, EffectBinding, EffectCatalog, EffectClass, EffectDescriptor, EffectDuration,
    EffectKind, EffectParameters, Force, Repeat,
};
pub use error::{
    AcquireError, CatalogError, ConfigError, DeviceOpenError, EffectError, ErrorClass, PollError,
    SessionError,
};
pub use poll_loop::{DeliveryMode, LoopOutcome, PollLoop, StateSink};
pub use session::{AxisButtonLayout, DeviceSession, PollStatus, SessionState, SessionWarning};
pub use snapshot::JoystickState;
