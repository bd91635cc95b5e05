//! Native platform seam.
//!
//! Everything above this module (catalogs, sessions, effect bindings, the poll loop)
//! talks to the platform only through the three traits defined here:
//!
//! - [`InputSystem`]: the input subsystem itself (device enumeration + device creation)
//! - [`NativeDevice`]: one opened device handle
//! - [`NativeEffect`]: one created force-feedback effect
//!
//! The traits deliberately keep the platform's shape: enumeration is callback-driven
//! (`visit` closures returning [`EnumFlow`]) and failures are native result codes
//! classified into [`NativeError`]. The higher layers are responsible for turning that
//! into owned sequences and typed errors.
//!
//! Backends live in [`crate::backends`].

use std::fmt;

use bitflags::bitflags;
use serde::{Serialize, Serializer};

use crate::catalog::DeviceFilter;
use crate::effect::{DirectionEncoding, EffectDuration, Force};

/// 128-bit identifier used by the platform for device instances, object types and
/// effect types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const NULL: Guid = Guid::from_u128(0);

    /// Build a GUID from its canonical big-endian textual value,
    /// e.g. `0xA36D02E0_C9F3_11CF_BFC7_444553540000`.
    pub const fn from_u128(v: u128) -> Self {
        let tail = v as u64;
        Self {
            data1: (v >> 96) as u32,
            data2: (v >> 80) as u16,
            data3: (v >> 64) as u16,
            data4: tail.to_be_bytes(),
        }
    }

    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Well-known object type and effect type identifiers.
pub mod guids {
    use super::Guid;

    pub const X_AXIS: Guid = Guid::from_u128(0xA36D02E0_C9F3_11CF_BFC7_444553540000);
    pub const Y_AXIS: Guid = Guid::from_u128(0xA36D02E1_C9F3_11CF_BFC7_444553540000);
    pub const Z_AXIS: Guid = Guid::from_u128(0xA36D02E2_C9F3_11CF_BFC7_444553540000);
    pub const RX_AXIS: Guid = Guid::from_u128(0xA36D02F4_C9F3_11CF_BFC7_444553540000);
    pub const RY_AXIS: Guid = Guid::from_u128(0xA36D02F5_C9F3_11CF_BFC7_444553540000);
    pub const RZ_AXIS: Guid = Guid::from_u128(0xA36D02E3_C9F3_11CF_BFC7_444553540000);
    pub const SLIDER: Guid = Guid::from_u128(0xA36D02E4_C9F3_11CF_BFC7_444553540000);
    pub const BUTTON: Guid = Guid::from_u128(0xA36D02F0_C9F3_11CF_BFC7_444553540000);
    pub const KEY: Guid = Guid::from_u128(0x55728220_D33C_11CF_BFC7_444553540000);
    pub const POV: Guid = Guid::from_u128(0xA36D02F2_C9F3_11CF_BFC7_444553540000);

    pub const CONSTANT_FORCE: Guid = Guid::from_u128(0x13541C20_8E33_11D0_9AD0_00A0C9A06E35);
    pub const RAMP_FORCE: Guid = Guid::from_u128(0x13541C21_8E33_11D0_9AD0_00A0C9A06E35);
    pub const SQUARE: Guid = Guid::from_u128(0x13541C22_8E33_11D0_9AD0_00A0C9A06E35);
    pub const SINE: Guid = Guid::from_u128(0x13541C23_8E33_11D0_9AD0_00A0C9A06E35);
    pub const TRIANGLE: Guid = Guid::from_u128(0x13541C24_8E33_11D0_9AD0_00A0C9A06E35);
    pub const SAWTOOTH_UP: Guid = Guid::from_u128(0x13541C25_8E33_11D0_9AD0_00A0C9A06E35);
    pub const SAWTOOTH_DOWN: Guid = Guid::from_u128(0x13541C26_8E33_11D0_9AD0_00A0C9A06E35);
    pub const SPRING: Guid = Guid::from_u128(0x13541C27_8E33_11D0_9AD0_00A0C9A06E35);
    pub const DAMPER: Guid = Guid::from_u128(0x13541C28_8E33_11D0_9AD0_00A0C9A06E35);
    pub const INERTIA: Guid = Guid::from_u128(0x13541C29_8E33_11D0_9AD0_00A0C9A06E35);
    pub const FRICTION: Guid = Guid::from_u128(0x13541C2A_8E33_11D0_9AD0_00A0C9A06E35);
    pub const CUSTOM_FORCE: Guid = Guid::from_u128(0x13541C2B_8E33_11D0_9AD0_00A0C9A06E35);
}

/// Classified native result code.
///
/// Backends map their raw codes (HRESULTs on Windows) into this closed set so the
/// session state machine can make retry/fatal decisions without knowing the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("device input was lost")]
    InputLost,
    #[error("another application has priority access")]
    OtherAppHasPriority,
    #[error("device is not acquired")]
    NotAcquired,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("device is not initialized")]
    NotInitialized,
    #[error("operation not supported by the device")]
    Unsupported,
    #[error("device is not registered")]
    DeviceNotRegistered,
    #[error("native error 0x{0:08x}")]
    Other(u32),
}

/// Whether an enumeration callback wants more items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFlow {
    Continue,
    Stop,
}

/// One device as reported by the input subsystem's enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInstance {
    /// Per-installation instance identity. Used to open the device.
    pub instance: Guid,
    /// Product identity (shared by identical models).
    pub product: Guid,
    pub instance_name: String,
    pub product_name: String,
    /// Force-feedback driver, present only on force-feedback-capable devices.
    pub ff_driver: Option<Guid>,
}

bitflags! {
    /// Object type bits carried in the low byte (and top byte) of an object id.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectType: u32 {
        const ABSAXIS = 0x0000_0001;
        const RELAXIS = 0x0000_0002;
        const PSHBUTTON = 0x0000_0004;
        const TGLBUTTON = 0x0000_0008;
        const POV = 0x0000_0010;
        const COLLECTION = 0x0000_0040;
        const NODATA = 0x0000_0080;
        const FFACTUATOR = 0x0100_0000;
        const FFEFFECTTRIGGER = 0x0200_0000;

        const AXIS = Self::ABSAXIS.bits() | Self::RELAXIS.bits();
        const BUTTON = Self::PSHBUTTON.bits() | Self::TGLBUTTON.bits();
    }
}

/// Device object identifier: type bits plus a 16-bit instance number
/// (`instance << 8 | type`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const fn new(kind: ObjectType, instance: u16) -> Self {
        Self(((instance as u32) << 8) | kind.bits())
    }

    pub fn object_type(self) -> ObjectType {
        ObjectType::from_bits_truncate(self.0 & 0xFF00_00FF)
    }

    pub fn instance(self) -> u16 {
        ((self.0 >> 8) & 0xFFFF) as u16
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(0x{:08x})", self.0)
    }
}

/// Semantic kind of a device object, resolved from its type GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    XAxis,
    YAxis,
    ZAxis,
    RxAxis,
    RyAxis,
    RzAxis,
    Slider,
    Button,
    Key,
    Pov,
    Unknown,
}

impl ObjectKind {
    pub fn from_guid(guid: &Guid) -> Self {
        match *guid {
            guids::X_AXIS => Self::XAxis,
            guids::Y_AXIS => Self::YAxis,
            guids::Z_AXIS => Self::ZAxis,
            guids::RX_AXIS => Self::RxAxis,
            guids::RY_AXIS => Self::RyAxis,
            guids::RZ_AXIS => Self::RzAxis,
            guids::SLIDER => Self::Slider,
            guids::BUTTON => Self::Button,
            guids::KEY => Self::Key,
            guids::POV => Self::Pov,
            _ => Self::Unknown,
        }
    }

    pub fn guid(self) -> Guid {
        match self {
            Self::XAxis => guids::X_AXIS,
            Self::YAxis => guids::Y_AXIS,
            Self::ZAxis => guids::Z_AXIS,
            Self::RxAxis => guids::RX_AXIS,
            Self::RyAxis => guids::RY_AXIS,
            Self::RzAxis => guids::RZ_AXIS,
            Self::Slider => guids::SLIDER,
            Self::Button => guids::BUTTON,
            Self::Key => guids::KEY,
            Self::Pov => guids::POV,
            Self::Unknown => Guid::NULL,
        }
    }

    /// Short label used in object dumps.
    pub fn label(self) -> &'static str {
        match self {
            Self::XAxis => "X",
            Self::YAxis => "Y",
            Self::ZAxis => "Z",
            Self::RxAxis => "Rx",
            Self::RyAxis => "Ry",
            Self::RzAxis => "Rz",
            Self::Slider => "Slider",
            Self::Button => "Button",
            Self::Key => "Key",
            Self::Pov => "POV",
            Self::Unknown => "Unknown",
        }
    }
}

/// One device object (axis, button, POV, ...) as reported by object enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInstance {
    pub id: ObjectId,
    pub guid_type: Guid,
    pub name: String,
    /// Byte offset of the object in the negotiated state buffer.
    pub offset: u32,
}

impl ObjectInstance {
    #[inline]
    pub fn object_type(&self) -> ObjectType {
        self.id.object_type()
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        ObjectKind::from_guid(&self.guid_type)
    }
}

/// State buffer layouts a device can be asked to report in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Canonical joystick report: 6 axes, 2 sliders, 4 POVs, 32 buttons.
    Joystick,
}

/// Raw canonical joystick report as filled by [`NativeDevice::device_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawJoyState {
    /// X, Y, Z, Rx, Ry, Rz.
    pub axes: [i32; 6],
    pub sliders: [i32; 2],
    /// Hundredths of a degree clockwise from north, `u32::MAX` (low word `0xFFFF`) when centered.
    pub pov: [u32; 4],
    /// High bit set = pressed.
    pub buttons: [u8; 32],
}

/// Raw effect type information as reported by effect enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEffectInfo {
    pub guid: Guid,
    /// Type word; the low byte is the effect type code (see [`crate::effect::EffectTypeCode`]).
    pub effect_type: u32,
    pub static_params: u32,
    pub dynamic_params: u32,
    pub name: String,
}

/// Fully validated creation parameters handed to [`NativeDevice::create_effect`].
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEffectSpec {
    pub axes: Vec<ObjectId>,
    pub encoding: DirectionEncoding,
    /// One entry per axis.
    pub direction: Vec<i32>,
    pub duration: EffectDuration,
    /// 0..=10000.
    pub gain: u32,
    pub force: Force,
}

/// The input subsystem: discovers devices and opens them.
pub trait InputSystem {
    /// Invoke `visit` once per device matching `filter`, in platform order.
    fn enum_devices(
        &self,
        filter: &DeviceFilter,
        visit: &mut dyn FnMut(&DeviceInstance) -> EnumFlow,
    ) -> Result<(), NativeError>;

    /// Open the device identified by `instance`.
    fn create_device(&self, instance: &Guid) -> Result<Box<dyn NativeDevice>, NativeError>;
}

/// One opened device handle. Dropping it releases the handle.
pub trait NativeDevice {
    fn set_data_format(&mut self, format: DataFormat) -> Result<(), NativeError>;

    /// Invoke `visit` once per object whose type intersects `mask`.
    fn enum_objects(
        &self,
        mask: ObjectType,
        visit: &mut dyn FnMut(&ObjectInstance) -> EnumFlow,
    ) -> Result<(), NativeError>;

    fn set_axis_range(&mut self, object: ObjectId, min: i32, max: i32) -> Result<(), NativeError>;

    fn set_autocenter(&mut self, enabled: bool) -> Result<(), NativeError>;

    fn acquire(&mut self) -> Result<(), NativeError>;

    fn unacquire(&mut self) -> Result<(), NativeError>;

    /// Ask the driver to refresh polled objects. Fails when the device is not acquired.
    fn poll(&mut self) -> Result<(), NativeError>;

    fn device_state(&mut self, out: &mut RawJoyState) -> Result<(), NativeError>;

    /// Invoke `visit` once per supported effect type.
    fn enum_effects(
        &self,
        visit: &mut dyn FnMut(&NativeEffectInfo) -> EnumFlow,
    ) -> Result<(), NativeError>;

    fn create_effect(
        &mut self,
        effect: &Guid,
        spec: &NativeEffectSpec,
    ) -> Result<Box<dyn NativeEffect>, NativeError>;
}

/// One created force-feedback effect. Dropping it frees the native resource.
pub trait NativeEffect {
    /// Start (or restart from the beginning) playing `iterations` times;
    /// `u32::MAX` repeats until stopped.
    fn start(&mut self, iterations: u32) -> Result<(), NativeError>;

    fn stop(&mut self) -> Result<(), NativeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_formats_canonically() {
        assert_eq!(
            guids::X_AXIS.to_string(),
            "{A36D02E0-C9F3-11CF-BFC7-444553540000}"
        );
        assert_eq!(Guid::from_u128(guids::SINE.to_u128()), guids::SINE);
        assert!(Guid::NULL.is_null());
    }

    #[test]
    fn object_id_splits_type_and_instance() {
        let id = ObjectId::new(ObjectType::ABSAXIS, 3);
        assert_eq!(id.instance(), 3);
        assert!(id.object_type().intersects(ObjectType::AXIS));
        assert!(!id.object_type().intersects(ObjectType::BUTTON));

        let ff = ObjectId(ObjectId::new(ObjectType::ABSAXIS, 0).0 | ObjectType::FFACTUATOR.bits());
        assert!(ff.object_type().contains(ObjectType::FFACTUATOR));
        assert_eq!(ff.instance(), 0);
    }

    #[test]
    fn object_kind_round_trips_through_guid() {
        for kind in [ObjectKind::XAxis, ObjectKind::RzAxis, ObjectKind::Button, ObjectKind::Pov] {
            assert_eq!(ObjectKind::from_guid(&kind.guid()), kind);
        }
        assert_eq!(ObjectKind::from_guid(&guids::SINE), ObjectKind::Unknown);
    }
}
