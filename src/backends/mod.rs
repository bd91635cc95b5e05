//! Input backends.
//!
//! Implementations of [`InputSystem`](crate::device::InputSystem):
//!
//! - **`windows`**: DirectInput 8 (Windows, feature **`dinput`**, on by default).
//! - **`virtual_input`**: a scripted in-memory subsystem, always available. Used by the
//!   tests and by `--virtual` runs on machines without a controller.

use crate::device::InputSystem;
use crate::error::CatalogError;

#[cfg(all(feature = "dinput", target_os = "windows"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "dinput", target_os = "windows"))))]
pub mod windows;

pub mod virtual_input;

/// The platform's input subsystem.
///
/// Fails with [`CatalogError::SubsystemUnavailable`] when the platform has no backend
/// compiled in or the subsystem refuses to initialize.
pub fn default_system() -> Result<Box<dyn InputSystem>, CatalogError> {
    #[cfg(all(feature = "dinput", target_os = "windows"))]
    {
        let system = windows::DirectInputSystem::new().map_err(|e| {
            CatalogError::SubsystemUnavailable(format!("failed to initialize DirectInput: {e}"))
        })?;
        Ok(Box::new(system))
    }

    #[cfg(not(all(feature = "dinput", target_os = "windows")))]
    {
        Err(CatalogError::SubsystemUnavailable(
            "no native input backend for this platform; try --virtual".into(),
        ))
    }
}
