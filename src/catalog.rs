//! Device discovery.
//!
//! [`DeviceCatalog`] turns the input subsystem's callback enumeration into an owned,
//! order-preserving `Vec<DeviceDescriptor>`.
//!
//! The platform contract is two-pass: the first pass only counts matching devices so
//! storage can be sized, the second pass materializes them into that storage. Both
//! passes run inside a single [`DeviceCatalog::enumerate`] call; callers never see the
//! count-only state. A device that shows up between the two passes is left out of
//! this enumeration (the result never grows past the counted size).

use serde::Serialize;

use crate::device::{DeviceInstance, EnumFlow, Guid, InputSystem};
use crate::error::CatalogError;

/// Device class to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    /// Joysticks, gamepads, wheels and other game controllers.
    #[default]
    GameController,
}

/// Capability filter handed to the input subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub class: DeviceClass,
    pub force_feedback_required: bool,
    /// Skip devices that are installed but not currently attached.
    pub attached_only: bool,
}

impl DeviceFilter {
    pub fn game_controllers() -> Self {
        Self {
            class: DeviceClass::GameController,
            force_feedback_required: false,
            attached_only: true,
        }
    }

    pub fn force_feedback() -> Self {
        Self {
            force_feedback_required: true,
            ..Self::game_controllers()
        }
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::game_controllers()
    }
}

/// Stable handle used to open a device; the platform's instance GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(pub Guid);

/// Immutable description of one discovered device.
///
/// Plain data: it does not own or keep the device open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    /// Instance name as shown by the platform (e.g. `"Logitech G29 Driving Force Racing Wheel USB"`).
    pub display_name: String,
    pub product_name: String,
    pub product: Guid,
    pub supports_force_feedback: bool,
}

impl DeviceDescriptor {
    pub fn from_instance(instance: &DeviceInstance) -> Self {
        Self {
            id: DeviceId(instance.instance),
            display_name: instance.instance_name.clone(),
            product_name: instance.product_name.clone(),
            product: instance.product,
            supports_force_feedback: instance.ff_driver.is_some_and(|g| !g.is_null()),
        }
    }
}

/// Enumerates devices of one input subsystem.
pub struct DeviceCatalog<'a> {
    system: &'a dyn InputSystem,
}

impl<'a> DeviceCatalog<'a> {
    pub fn new(system: &'a dyn InputSystem) -> Self {
        Self { system }
    }

    /// All devices matching `filter`, in platform order.
    ///
    /// Zero devices is a valid, empty result.
    pub fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<DeviceDescriptor>, CatalogError> {
        // Pass 1: count.
        let mut count = 0usize;
        self.system
            .enum_devices(filter, &mut |_| {
                count += 1;
                EnumFlow::Continue
            })
            .map_err(CatalogError::EnumerationFailed)?;

        // Pass 2: fill storage sized by pass 1.
        let mut out = Vec::with_capacity(count);
        self.system
            .enum_devices(filter, &mut |instance| {
                if out.len() == count {
                    return EnumFlow::Stop;
                }
                out.push(DeviceDescriptor::from_instance(instance));
                EnumFlow::Continue
            })
            .map_err(CatalogError::EnumerationFailed)?;

        if out.len() != count {
            log::warn!(
                "device list changed during enumeration: counted {count}, materialized {}",
                out.len()
            );
        }
        log::debug!("enumerated {} device(s) with {filter:?}", out.len());
        Ok(out)
    }

    /// The device at `index` in the enumeration order, or a descriptive
    /// out-of-range error.
    pub fn select(&self, filter: &DeviceFilter, index: usize) -> Result<DeviceDescriptor, CatalogError> {
        let mut devices = self.enumerate(filter)?;
        let count = devices.len();
        if index >= count {
            return Err(CatalogError::DeviceIndexOutOfRange { index, count });
        }
        Ok(devices.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{VirtualDevice, VirtualInput};

    fn two_sticks() -> VirtualInput {
        VirtualInput::new()
            .with_device(VirtualDevice::joystick("Stick A"))
            .with_device(VirtualDevice::joystick("Wheel B").with_force_feedback())
    }

    #[test]
    fn enumeration_preserves_order_and_is_stable() {
        let system = two_sticks();
        let catalog = DeviceCatalog::new(&system);
        let first = catalog.enumerate(&DeviceFilter::game_controllers()).unwrap();
        let second = catalog.enumerate(&DeviceFilter::game_controllers()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[0].display_name, "Stick A");
        assert!(!first[0].supports_force_feedback);
        assert!(first[1].supports_force_feedback);
    }

    #[test]
    fn force_feedback_filter_skips_plain_devices() {
        let system = two_sticks();
        let devices = DeviceCatalog::new(&system)
            .enumerate(&DeviceFilter::force_feedback())
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].display_name, "Wheel B");
    }

    #[test]
    fn empty_system_is_not_an_error() {
        let system = VirtualInput::new();
        let devices = DeviceCatalog::new(&system)
            .enumerate(&DeviceFilter::default())
            .unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn select_out_of_range_is_descriptive() {
        let system = two_sticks();
        let err = DeviceCatalog::new(&system)
            .select(&DeviceFilter::default(), 3)
            .unwrap_err();
        assert!(matches!(err, CatalogError::DeviceIndexOutOfRange { index: 3, count: 2 }));
    }

    #[test]
    fn enumeration_failure_is_reported() {
        let system = two_sticks().failing_enumeration();
        let err = DeviceCatalog::new(&system)
            .enumerate(&DeviceFilter::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::EnumerationFailed(_)));
    }
}
