//! Windows input backend.
//!
//! - **`ffi`**: hand-declared DirectInput 8 COM interfaces, structures and constants.
//! - **`dinput`**: [`DirectInputSystem`], the [`InputSystem`](crate::device::InputSystem)
//!   over `IDirectInput8W`, plus its device and effect wrappers.
//!
//! Devices reporting force feedback are opened with exclusive background access bound
//! to the console window, which DirectInput requires before effects can play.

pub mod dinput;
pub mod ffi;

pub use dinput::DirectInputSystem;
