//! Force-feedback effects: discovery and lifecycle.
//!
//! Two concerns are kept apart here:
//!
//! - [`EffectCatalog`] *describes* the effect types a device supports. It creates nothing.
//! - [`EffectBinding`] *instantiates* one effect against an acquired
//!   [`DeviceSession`], bound to specific axes, and owns it until released.
//!
//! # Numeric conventions
//! - Magnitudes, offsets, gains and coefficients use a fixed integer scale where
//!   `10_000` is 100.00% of what the device can do.
//! - Polar directions are hundredths of a degree (`0..36_000`), clockwise from north.
//! - Cartesian directions are signed per-axis components; only their ratios matter.
//!
//! # Lifetime
//! A binding holds only a weak back-reference to its session. The session counts live
//! bindings and refuses to close while any exist; release every binding first.

use std::fmt;
use std::num::NonZeroU32;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bitflags::bitflags;
use serde::Serialize;

use crate::device::{
    guids, EnumFlow, Guid, NativeEffect, NativeEffectInfo, NativeEffectSpec, NativeError,
    ObjectId,
};
use crate::error::EffectError;
use crate::session::{DeviceSession, SessionLink};

/// Full scale of magnitudes, gains and coefficients.
pub const NOMINAL_MAX: u32 = 10_000;

/// One full turn in hundredths of a degree.
pub const FULL_TURN: i32 = 36_000;

/// Effect type code: the low byte of a native effect type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectTypeCode {
    ConstantForce,
    RampForce,
    Periodic,
    Condition,
    CustomForce,
    Hardware,
    Unknown(u8),
}

impl EffectTypeCode {
    pub const CONSTANT_FORCE: u32 = 0x01;
    pub const RAMP_FORCE: u32 = 0x02;
    pub const PERIODIC: u32 = 0x03;
    pub const CONDITION: u32 = 0x04;
    pub const CUSTOM_FORCE: u32 = 0x05;
    pub const HARDWARE: u32 = 0xFF;

    pub fn from_type_word(word: u32) -> Self {
        match word & 0xFF {
            Self::CONSTANT_FORCE => Self::ConstantForce,
            Self::RAMP_FORCE => Self::RampForce,
            Self::PERIODIC => Self::Periodic,
            Self::CONDITION => Self::Condition,
            Self::CUSTOM_FORCE => Self::CustomForce,
            Self::HARDWARE => Self::Hardware,
            other => Self::Unknown(other as u8),
        }
    }
}

bitflags! {
    /// Parameter families an effect type accepts.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct EffectClass: u8 {
        const CONSTANT_FORCE = 0b0001;
        const PERIODIC = 0b0010;
        const RAMP_FORCE = 0b0100;
        const CONDITION = 0b1000;
    }
}

impl EffectClass {
    /// Classification of a native effect type word. Custom and hardware-specific
    /// effects take parameters this crate does not model and classify as empty.
    pub fn from_type_word(word: u32) -> Self {
        match EffectTypeCode::from_type_word(word) {
            EffectTypeCode::ConstantForce => Self::CONSTANT_FORCE,
            EffectTypeCode::RampForce => Self::RAMP_FORCE,
            EffectTypeCode::Periodic => Self::PERIODIC,
            EffectTypeCode::Condition => Self::CONDITION,
            _ => Self::empty(),
        }
    }
}

/// Well-known effect types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectKind {
    ConstantForce,
    RampForce,
    Square,
    Sine,
    Triangle,
    SawtoothUp,
    SawtoothDown,
    Spring,
    Damper,
    Inertia,
    Friction,
    CustomForce,
    Unknown,
}

impl EffectKind {
    pub fn from_guid(guid: &Guid) -> Self {
        match *guid {
            guids::CONSTANT_FORCE => Self::ConstantForce,
            guids::RAMP_FORCE => Self::RampForce,
            guids::SQUARE => Self::Square,
            guids::SINE => Self::Sine,
            guids::TRIANGLE => Self::Triangle,
            guids::SAWTOOTH_UP => Self::SawtoothUp,
            guids::SAWTOOTH_DOWN => Self::SawtoothDown,
            guids::SPRING => Self::Spring,
            guids::DAMPER => Self::Damper,
            guids::INERTIA => Self::Inertia,
            guids::FRICTION => Self::Friction,
            guids::CUSTOM_FORCE => Self::CustomForce,
            _ => Self::Unknown,
        }
    }

    pub fn guid(self) -> Guid {
        match self {
            Self::ConstantForce => guids::CONSTANT_FORCE,
            Self::RampForce => guids::RAMP_FORCE,
            Self::Square => guids::SQUARE,
            Self::Sine => guids::SINE,
            Self::Triangle => guids::TRIANGLE,
            Self::SawtoothUp => guids::SAWTOOTH_UP,
            Self::SawtoothDown => guids::SAWTOOTH_DOWN,
            Self::Spring => guids::SPRING,
            Self::Damper => guids::DAMPER,
            Self::Inertia => guids::INERTIA,
            Self::Friction => guids::FRICTION,
            Self::CustomForce => guids::CUSTOM_FORCE,
            Self::Unknown => Guid::NULL,
        }
    }

    /// Native type word for this kind.
    pub fn type_word(self) -> u32 {
        match self {
            Self::ConstantForce => EffectTypeCode::CONSTANT_FORCE,
            Self::RampForce => EffectTypeCode::RAMP_FORCE,
            Self::Square | Self::Sine | Self::Triangle | Self::SawtoothUp | Self::SawtoothDown => {
                EffectTypeCode::PERIODIC
            }
            Self::Spring | Self::Damper | Self::Inertia | Self::Friction => {
                EffectTypeCode::CONDITION
            }
            Self::CustomForce => EffectTypeCode::CUSTOM_FORCE,
            Self::Unknown => EffectTypeCode::HARDWARE,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One effect type supported by a device. Purely descriptive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectDescriptor {
    pub guid: Guid,
    pub kind: EffectKind,
    /// Name reported by the driver.
    pub name: String,
    pub classification: EffectClass,
    #[serde(skip)]
    pub raw_info: NativeEffectInfo,
}

impl EffectDescriptor {
    pub fn from_info(info: &NativeEffectInfo) -> Self {
        Self {
            guid: info.guid,
            kind: EffectKind::from_guid(&info.guid),
            name: info.name.clone(),
            classification: EffectClass::from_type_word(info.effect_type),
            raw_info: info.clone(),
        }
    }
}

/// Enumerates the effect types a device supports.
pub struct EffectCatalog;

impl EffectCatalog {
    /// Every effect type `session`'s device supports, in driver order.
    ///
    /// Runs the count-then-fill contract internally: a first enumeration pass only counts
    /// effect types, storage is allocated for exactly that many, and a second pass fills
    /// it. The fill pass never writes past the counted size, so an effect type that
    /// appears between passes is left out of this call's result.
    pub fn enumerate(session: &DeviceSession) -> Result<Vec<EffectDescriptor>, EffectError> {
        let device = session.device();

        let mut count = 0usize;
        device
            .enum_effects(&mut |_| {
                count += 1;
                EnumFlow::Continue
            })
            .map_err(EffectError::EnumerationFailed)?;

        let mut out = Vec::with_capacity(count);
        device
            .enum_effects(&mut |info| {
                if out.len() == count {
                    return EnumFlow::Stop;
                }
                out.push(EffectDescriptor::from_info(info));
                EnumFlow::Continue
            })
            .map_err(EffectError::EnumerationFailed)?;

        log::debug!(
            "'{}' supports {} effect type(s)",
            session.descriptor().display_name,
            out.len()
        );
        Ok(out)
    }
}

/// How a direction is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DirectionEncoding {
    Cartesian,
    Polar,
}

/// One component of a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionComponent {
    /// Signed component along the corresponding bound axis.
    Cartesian(i32),
    /// Angle in hundredths of a degree.
    Polar(i32),
}

/// Effect direction. All components must use the same encoding.
///
/// An empty direction means "positive along every bound axis".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Direction(pub Vec<DirectionComponent>);

impl Direction {
    pub fn cartesian(components: &[i32]) -> Self {
        Self(components.iter().copied().map(DirectionComponent::Cartesian).collect())
    }

    /// Angle in hundredths of a degree; requires a two-axis binding.
    pub fn polar(angle: i32) -> Self {
        Self(vec![DirectionComponent::Polar(angle)])
    }

    /// Resolve to a native encoding plus one value per bound axis.
    pub fn encode(&self, axis_count: usize) -> Result<(DirectionEncoding, Vec<i32>), EffectError> {
        let invalid = |msg: String| Err(EffectError::InvalidDirectionEncoding(msg));

        if self.0.is_empty() {
            return Ok((DirectionEncoding::Cartesian, vec![1; axis_count]));
        }

        let cartesian = self
            .0
            .iter()
            .all(|c| matches!(c, DirectionComponent::Cartesian(_)));
        let polar = self
            .0
            .iter()
            .all(|c| matches!(c, DirectionComponent::Polar(_)));

        if cartesian {
            if self.0.len() != axis_count {
                return invalid(format!(
                    "{} cartesian component(s) for {axis_count} axis/axes",
                    self.0.len()
                ));
            }
            let values = self
                .0
                .iter()
                .map(|c| match c {
                    DirectionComponent::Cartesian(v) | DirectionComponent::Polar(v) => *v,
                })
                .collect();
            Ok((DirectionEncoding::Cartesian, values))
        } else if polar {
            if axis_count != 2 || self.0.len() != 1 {
                return invalid(format!(
                    "polar direction needs one angle over two axes, got {} over {axis_count}",
                    self.0.len()
                ));
            }
            let DirectionComponent::Polar(angle) = self.0[0] else {
                return invalid("polar component expected".into());
            };
            if !(0..FULL_TURN).contains(&angle) {
                return invalid(format!("polar angle {angle} outside 0..{FULL_TURN}"));
            }
            // The trailing axis entry is required by the native layout and always zero.
            Ok((DirectionEncoding::Polar, vec![angle, 0]))
        } else {
            invalid("cartesian and polar components mixed".into())
        }
    }
}

/// How long an effect plays per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectDuration {
    #[default]
    Infinite,
    Finite(Duration),
}

/// Condition coefficients for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionAxis {
    pub offset: i32,
    pub positive_coefficient: i32,
    pub negative_coefficient: i32,
    pub positive_saturation: u32,
    pub negative_saturation: u32,
    pub dead_band: i32,
}

impl ConditionAxis {
    /// Symmetric condition with full saturation and no dead band.
    pub fn symmetric(coefficient: i32) -> Self {
        Self {
            offset: 0,
            positive_coefficient: coefficient,
            negative_coefficient: coefficient,
            positive_saturation: NOMINAL_MAX,
            negative_saturation: NOMINAL_MAX,
            dead_band: 0,
        }
    }
}

/// Type-specific parameters, one variant per [`EffectClass`] flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Force {
    Constant {
        magnitude: i32,
    },
    Ramp {
        start: i32,
        end: i32,
    },
    Periodic {
        magnitude: u32,
        offset: i32,
        /// Hundredths of a degree.
        phase: u32,
        period: Duration,
    },
    /// One entry shared by all axes, or one entry per bound axis.
    Condition(Vec<ConditionAxis>),
}

impl Force {
    pub fn class(&self) -> EffectClass {
        match self {
            Self::Constant { .. } => EffectClass::CONSTANT_FORCE,
            Self::Ramp { .. } => EffectClass::RAMP_FORCE,
            Self::Periodic { .. } => EffectClass::PERIODIC,
            Self::Condition(_) => EffectClass::CONDITION,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant force",
            Self::Ramp { .. } => "ramp force",
            Self::Periodic { .. } => "periodic",
            Self::Condition(_) => "condition",
        }
    }

    fn validate(&self, axes: &[ObjectId]) -> Result<(), EffectError> {
        let signed = NOMINAL_MAX as i64;
        match self {
            Self::Constant { magnitude } => check("magnitude", *magnitude as i64, -signed, signed),
            Self::Ramp { start, end } => {
                check("start", *start as i64, -signed, signed)?;
                check("end", *end as i64, -signed, signed)
            }
            Self::Periodic {
                magnitude,
                offset,
                phase,
                ..
            } => {
                check("magnitude", *magnitude as i64, 0, signed)?;
                check("offset", *offset as i64, -signed, signed)?;
                check("phase", *phase as i64, 0, FULL_TURN as i64 - 1)
            }
            Self::Condition(conditions) => {
                if conditions.len() != 1 && conditions.len() != axes.len() {
                    return Err(EffectError::InvalidAxisBinding {
                        axes: axes.to_vec(),
                    });
                }
                for c in conditions {
                    check("offset", c.offset as i64, -signed, signed)?;
                    check("positive coefficient", c.positive_coefficient as i64, -signed, signed)?;
                    check("negative coefficient", c.negative_coefficient as i64, -signed, signed)?;
                    check("positive saturation", c.positive_saturation as i64, 0, signed)?;
                    check("negative saturation", c.negative_saturation as i64, 0, signed)?;
                    check("dead band", c.dead_band as i64, 0, signed)?;
                }
                Ok(())
            }
        }
    }
}

fn check(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), EffectError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EffectError::MagnitudeOutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Everything needed to create an effect, except the axes it binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectParameters {
    pub force: Force,
    pub direction: Direction,
    pub duration: EffectDuration,
    /// Overall gain, `0..=10_000`.
    pub gain: u32,
}

impl EffectParameters {
    pub fn new(force: Force) -> Self {
        Self {
            force,
            direction: Direction::default(),
            duration: EffectDuration::Infinite,
            gain: NOMINAL_MAX,
        }
    }

    pub fn constant(magnitude: i32) -> Self {
        Self::new(Force::Constant { magnitude })
    }

    pub fn ramp(start: i32, end: i32) -> Self {
        Self::new(Force::Ramp { start, end })
    }

    pub fn periodic(magnitude: u32, offset: i32, phase: u32, period: Duration) -> Self {
        Self::new(Force::Periodic {
            magnitude,
            offset,
            phase,
            period,
        })
    }

    pub fn condition(axes: Vec<ConditionAxis>) -> Self {
        Self::new(Force::Condition(axes))
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_duration(mut self, duration: EffectDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_gain(mut self, gain: u32) -> Self {
        self.gain = gain;
        self
    }

    /// Sensible parameters for a quick test of `descriptor`, or `None` if the effect
    /// takes parameters this crate does not model.
    pub fn test_defaults(descriptor: &EffectDescriptor) -> Option<Self> {
        let c = descriptor.classification;
        let params = if c.contains(EffectClass::PERIODIC) {
            Self::periodic(5000, 0, 0, Duration::from_secs(1))
        } else if c.contains(EffectClass::CONSTANT_FORCE) {
            Self::constant(5000)
        } else if c.contains(EffectClass::RAMP_FORCE) {
            Self::ramp(0, 5000)
        } else if c.contains(EffectClass::CONDITION) {
            Self::condition(vec![ConditionAxis::symmetric(5000)])
        } else {
            return None;
        };
        Some(params)
    }
}

/// How many times [`EffectBinding::start`] plays the effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(NonZeroU32),
    Infinite,
}

impl Repeat {
    pub const ONCE: Repeat = Repeat::Times(NonZeroU32::MIN);

    /// `None` for zero, which would play nothing.
    pub fn times(count: u32) -> Option<Self> {
        NonZeroU32::new(count).map(Self::Times)
    }

    fn iterations(self) -> u32 {
        match self {
            Self::Times(n) => n.get(),
            Self::Infinite => u32::MAX,
        }
    }
}

/// A created force-feedback effect bound to device axes.
///
/// The native effect lives in its session; the binding holds its slot and a weak link.
/// After [`release`](Self::release) (or drop) every call fails with
/// [`EffectError::UseAfterRelease`]. If the session is dropped first it frees the effect
/// itself and the binding reports [`EffectError::SessionClosed`].
pub struct EffectBinding {
    session: Weak<SessionLink>,
    slot: Option<usize>,
    descriptor: EffectDescriptor,
    target_axes: Vec<ObjectId>,
    parameters: EffectParameters,
    encoding: DirectionEncoding,
    started: bool,
}

impl EffectBinding {
    /// Create `descriptor`'s effect on `session`, bound to `axes`.
    ///
    /// `axes` must be a non-empty set of axes from the session's layout. The session is
    /// acquired first if it is not already, and re-acquired once if the device turns out
    /// to have dropped its acquisition.
    pub fn create(
        session: &mut DeviceSession,
        descriptor: &EffectDescriptor,
        parameters: EffectParameters,
        axes: &[ObjectId],
    ) -> Result<Self, EffectError> {
        let layout = session.layout();
        let duplicated = axes
            .iter()
            .enumerate()
            .any(|(i, a)| axes[..i].contains(a));
        if axes.is_empty() || duplicated || !axes.iter().all(|&a| layout.contains_axis(a)) {
            return Err(EffectError::InvalidAxisBinding {
                axes: axes.to_vec(),
            });
        }

        if !descriptor
            .classification
            .contains(parameters.force.class())
            || descriptor.classification.is_empty()
        {
            return Err(EffectError::ParametersMismatch {
                expected: format!("{} ({})", descriptor.kind, descriptor.name),
                given: parameters.force.family(),
            });
        }
        parameters.force.validate(axes)?;
        check("gain", parameters.gain as i64, 0, NOMINAL_MAX as i64)?;
        let (encoding, direction) = parameters.direction.encode(axes.len())?;

        session.acquire().map_err(EffectError::DeviceNotAcquired)?;

        let spec = NativeEffectSpec {
            axes: axes.to_vec(),
            encoding,
            direction,
            duration: parameters.duration,
            gain: parameters.gain,
            force: parameters.force.clone(),
        };
        let effect = match session.device_mut().create_effect(&descriptor.guid, &spec) {
            Err(NativeError::NotAcquired) => {
                log::debug!(
                    "'{}' dropped its acquisition, re-acquiring",
                    session.descriptor().display_name
                );
                session.mark_unacquired();
                session.acquire().map_err(EffectError::DeviceNotAcquired)?;
                session.device_mut().create_effect(&descriptor.guid, &spec)
            }
            created => created,
        }
        .map_err(EffectError::CreateFailed)?;

        let slot = session.link().insert(effect);
        log::debug!(
            "created {} on '{}' bound to {} axis/axes",
            descriptor.kind,
            session.descriptor().display_name,
            axes.len()
        );

        Ok(Self {
            session: Rc::downgrade(session.link()),
            slot: Some(slot),
            descriptor: descriptor.clone(),
            target_axes: axes.to_vec(),
            parameters,
            encoding,
            started: false,
        })
    }

    /// Play the effect. Starting a started effect restarts it from the beginning.
    pub fn start(&mut self, repeat: Repeat) -> Result<(), EffectError> {
        let iterations = repeat.iterations();
        self.command(|effect| effect.start(iterations))?;
        if self.started {
            log::debug!("restarted {}", self.descriptor.kind);
        }
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), EffectError> {
        self.command(|effect| effect.stop())?;
        self.started = false;
        Ok(())
    }

    /// Stop the effect if playing and free it.
    pub fn release(&mut self) -> Result<(), EffectError> {
        let slot = self.slot.take().ok_or(EffectError::UseAfterRelease)?;
        let started = std::mem::take(&mut self.started);
        // A dropped session has already freed everything it owned.
        let link = self.session.upgrade().ok_or(EffectError::SessionClosed)?;
        if let Some(mut effect) = link.remove(slot) {
            if started {
                if let Err(e) = effect.stop() {
                    log::warn!("stopping {} before release failed: {e}", self.descriptor.kind);
                }
            }
        }
        log::debug!("released {}", self.descriptor.kind);
        Ok(())
    }

    fn command(
        &mut self,
        f: impl FnOnce(&mut dyn NativeEffect) -> Result<(), NativeError>,
    ) -> Result<(), EffectError> {
        let slot = self.slot.ok_or(EffectError::UseAfterRelease)?;
        let link = self.session.upgrade().ok_or(EffectError::SessionClosed)?;
        link.with_effect(slot, f)
            .ok_or(EffectError::UseAfterRelease)?
            .map_err(EffectError::CommandFailed)
    }

    pub fn descriptor(&self) -> &EffectDescriptor {
        &self.descriptor
    }

    pub fn target_axes(&self) -> &[ObjectId] {
        &self.target_axes
    }

    pub fn parameters(&self) -> &EffectParameters {
        &self.parameters
    }

    pub fn encoding(&self) -> DirectionEncoding {
        self.encoding
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_released(&self) -> bool {
        self.slot.is_none()
    }
}

impl fmt::Debug for EffectBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBinding")
            .field("kind", &self.descriptor.kind)
            .field("axes", &self.target_axes)
            .field("encoding", &self.encoding)
            .field("started", &self.started)
            .field("released", &self.slot.is_none())
            .finish()
    }
}

impl Drop for EffectBinding {
    fn drop(&mut self) {
        if self.slot.is_some() {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{VirtualDevice, VirtualInput};
    use crate::catalog::{DeviceCatalog, DeviceFilter};
    use crate::config::PollConfig;
    use crate::device::{NativeError, ObjectKind};

    fn wheel() -> VirtualDevice {
        VirtualDevice::joystick("Wheel")
            .with_axes(&[ObjectKind::XAxis, ObjectKind::YAxis])
            .with_force_feedback()
    }

    fn open(device: &VirtualDevice) -> DeviceSession {
        let system = VirtualInput::new().with_device(device.clone());
        let descriptor = DeviceCatalog::new(&system)
            .select(&DeviceFilter::force_feedback(), 0)
            .unwrap();
        let mut session = DeviceSession::open(&system, &descriptor, &PollConfig::default()).unwrap();
        session.enumerate_objects().unwrap();
        session
    }

    fn find(effects: &[EffectDescriptor], kind: EffectKind) -> EffectDescriptor {
        effects.iter().find(|e| e.kind == kind).cloned().unwrap()
    }

    #[test]
    fn type_words_classify() {
        assert_eq!(EffectClass::from_type_word(0x0000_0003), EffectClass::PERIODIC);
        assert_eq!(
            EffectClass::from_type_word(0x0000_0201),
            EffectClass::CONSTANT_FORCE
        );
        assert_eq!(EffectClass::from_type_word(0x05), EffectClass::empty());
        assert_eq!(EffectTypeCode::from_type_word(0x42), EffectTypeCode::Unknown(0x42));
        assert_eq!(EffectKind::from_guid(&EffectKind::Damper.guid()), EffectKind::Damper);
    }

    #[test]
    fn catalog_runs_count_then_fill() {
        let device = wheel();
        let session = open(&device);
        let before = device.effect_enumerations();
        let effects = EffectCatalog::enumerate(&session).unwrap();
        assert_eq!(device.effect_enumerations() - before, 2);
        assert_eq!(effects.len(), device.effect_type_count());
        assert!(effects.iter().any(|e| e.kind == EffectKind::Sine
            && e.classification == EffectClass::PERIODIC));
        // Discovery creates nothing.
        assert!(device.effects().is_empty());
    }

    #[test]
    fn direction_encodings() {
        assert_eq!(
            Direction::default().encode(2).unwrap(),
            (DirectionEncoding::Cartesian, vec![1, 1])
        );
        assert_eq!(
            Direction::cartesian(&[200]).encode(1).unwrap(),
            (DirectionEncoding::Cartesian, vec![200])
        );
        assert_eq!(
            Direction::polar(9000).encode(2).unwrap(),
            (DirectionEncoding::Polar, vec![9000, 0])
        );
        assert!(Direction::polar(9000).encode(1).is_err());
        assert!(Direction::polar(36_000).encode(2).is_err());
        assert!(Direction::cartesian(&[1, 2]).encode(1).is_err());

        let mixed = Direction(vec![
            DirectionComponent::Cartesian(1),
            DirectionComponent::Polar(9000),
        ]);
        assert!(matches!(
            mixed.encode(2),
            Err(EffectError::InvalidDirectionEncoding(_))
        ));
    }

    #[test]
    fn create_acquires_and_records_binding() {
        let device = wheel();
        let mut session = open(&device);
        assert!(!session.is_acquired());
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let sine = find(&effects, EffectKind::Sine);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();

        let params = EffectParameters::periodic(5000, 0, 0, Duration::from_secs(1))
            .with_direction(Direction::cartesian(&[200]));
        let mut binding = EffectBinding::create(&mut session, &sine, params, &[x]).unwrap();

        assert!(session.is_acquired());
        assert_eq!(session.live_effects(), 1);
        assert_eq!(binding.target_axes(), &[x]);
        assert_eq!(binding.encoding(), DirectionEncoding::Cartesian);

        let created = device.effects();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].guid, guids::SINE);
        assert_eq!(created[0].spec.direction, vec![200]);
        assert_eq!(created[0].spec.duration, EffectDuration::Infinite);

        binding.release().unwrap();
        assert_eq!(session.live_effects(), 0);
    }

    #[test]
    fn restart_reinitiates_playback() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        let mut binding =
            EffectBinding::create(&mut session, &constant, EffectParameters::constant(-3000), &[x])
                .unwrap();

        binding.start(Repeat::ONCE).unwrap();
        binding.start(Repeat::Infinite).unwrap();
        assert!(binding.is_started());
        assert_eq!(device.effects()[0].starts, vec![1, u32::MAX]);

        binding.stop().unwrap();
        assert!(!binding.is_started());

        binding.start(Repeat::times(3).unwrap()).unwrap();
        assert_eq!(device.effects()[0].starts, vec![1, u32::MAX, 3]);
    }

    #[test]
    fn zero_repeats_cannot_be_expressed() {
        assert_eq!(Repeat::times(0), None);
        assert_eq!(Repeat::times(1), Some(Repeat::ONCE));
    }

    #[test]
    fn axes_must_come_from_the_layout() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();

        for axes in [vec![], vec![ObjectId(0xDEAD)], vec![x, x]] {
            let err = EffectBinding::create(
                &mut session,
                &constant,
                EffectParameters::constant(1000),
                &axes,
            )
            .unwrap_err();
            assert!(matches!(err, EffectError::InvalidAxisBinding { .. }));
        }
        assert!(device.effects().is_empty());
    }

    #[test]
    fn parameters_must_match_the_effect_type() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let spring = find(&effects, EffectKind::Spring);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();

        let err = EffectBinding::create(&mut session, &spring, EffectParameters::constant(1000), &[x])
            .unwrap_err();
        assert!(matches!(err, EffectError::ParametersMismatch { .. }));

        let err = EffectBinding::create(
            &mut session,
            &find(&effects, EffectKind::Sine),
            EffectParameters::periodic(20_000, 0, 0, Duration::from_millis(100)),
            &[x],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EffectError::MagnitudeOutOfRange { field: "magnitude", .. }
        ));
    }

    #[test]
    fn mixed_direction_is_rejected_before_creation() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let axes = session.layout().axis_object_ids();

        let params = EffectParameters::constant(1000).with_direction(Direction(vec![
            DirectionComponent::Polar(4500),
            DirectionComponent::Cartesian(1),
        ]));
        let err = EffectBinding::create(&mut session, &constant, params, &axes).unwrap_err();
        assert!(matches!(err, EffectError::InvalidDirectionEncoding(_)));
        assert!(device.effects().is_empty());
    }

    #[test]
    fn polar_binding_over_two_axes() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let axes = session.layout().axis_object_ids();

        let params = EffectParameters::constant(1000).with_direction(Direction::polar(27_000));
        let binding = EffectBinding::create(&mut session, &constant, params, &axes).unwrap();
        assert_eq!(binding.encoding(), DirectionEncoding::Polar);
        assert_eq!(device.effects()[0].spec.direction, vec![27_000, 0]);
    }

    #[test]
    fn failed_acquire_blocks_creation() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();

        device.queue_acquire(Err(NativeError::OtherAppHasPriority));
        let err = EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
            .unwrap_err();
        assert!(matches!(
            err,
            EffectError::DeviceNotAcquired(crate::error::AcquireError::OtherAppHasPriority)
        ));
        assert_eq!(session.live_effects(), 0);
    }

    #[test]
    fn release_stops_frees_and_poisons() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        let mut binding =
            EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
                .unwrap();

        binding.start(Repeat::Infinite).unwrap();
        binding.release().unwrap();
        let record = &device.effects()[0];
        assert_eq!(record.stops, 1);
        assert!(record.freed);
        assert!(binding.is_released());

        assert!(matches!(binding.start(Repeat::ONCE), Err(EffectError::UseAfterRelease)));
        assert!(matches!(binding.stop(), Err(EffectError::UseAfterRelease)));
        assert!(matches!(binding.release(), Err(EffectError::UseAfterRelease)));
    }

    #[test]
    fn dropping_a_binding_frees_it() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        {
            let _binding =
                EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
                    .unwrap();
            assert_eq!(session.live_effects(), 1);
        }
        assert_eq!(session.live_effects(), 0);
        assert!(device.effects()[0].freed);
    }

    #[test]
    fn dropping_the_session_frees_effects_before_the_device() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        let mut binding =
            EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
                .unwrap();
        binding.start(Repeat::Infinite).unwrap();

        drop(session);
        assert_eq!(device.open_handles(), 0);
        assert!(device.effects()[0].freed);
        assert_eq!(device.effects_outliving_handle(), 0);

        assert!(matches!(binding.start(Repeat::ONCE), Err(EffectError::SessionClosed)));
        assert!(matches!(binding.release(), Err(EffectError::SessionClosed)));
        assert!(binding.is_released());
    }

    #[test]
    fn released_slots_are_reused() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        let create = |session: &mut DeviceSession| {
            EffectBinding::create(session, &constant, EffectParameters::constant(1000), &[x]).unwrap()
        };

        let mut first = create(&mut session);
        let mut second = create(&mut session);
        first.release().unwrap();
        let mut third = create(&mut session);
        assert_eq!(session.live_effects(), 2);

        // Each binding still drives its own effect.
        second.start(Repeat::ONCE).unwrap();
        third.start(Repeat::Infinite).unwrap();
        let records = device.effects();
        assert_eq!(records[1].starts, vec![1]);
        assert_eq!(records[2].starts, vec![u32::MAX]);
    }

    #[test]
    fn creation_failure_leaves_nothing_live() {
        let device = wheel().failing_effect_creation();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();

        let err = EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
            .unwrap_err();
        assert!(matches!(err, EffectError::CreateFailed(NativeError::Unsupported)));
        assert_eq!(session.live_effects(), 0);
        assert!(device.effects().is_empty());
        session.close().unwrap();
    }

    #[test]
    fn silently_lost_acquisition_is_restored_for_creation() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        session.acquire().unwrap();

        device.lose_acquisition();
        let binding =
            EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
                .unwrap();
        assert_eq!(device.acquire_calls(), 2);
        assert!(session.is_acquired());
        assert!(!binding.is_released());
    }

    #[test]
    fn failed_reacquire_is_reported_as_not_acquired() {
        let device = wheel();
        let mut session = open(&device);
        let effects = EffectCatalog::enumerate(&session).unwrap();
        let constant = find(&effects, EffectKind::ConstantForce);
        let x = session.layout().axis_of_kind(ObjectKind::XAxis).unwrap();
        session.acquire().unwrap();

        device.lose_acquisition();
        device.queue_acquire(Err(NativeError::InputLost));
        let err = EffectBinding::create(&mut session, &constant, EffectParameters::constant(1000), &[x])
            .unwrap_err();
        assert!(matches!(
            err,
            EffectError::DeviceNotAcquired(crate::error::AcquireError::InputLost)
        ));
        assert_eq!(session.live_effects(), 0);
    }

    #[test]
    fn test_defaults_cover_modelled_families() {
        let device = wheel();
        let session = open(&device);
        for effect in EffectCatalog::enumerate(&session).unwrap() {
            let params = EffectParameters::test_defaults(&effect);
            assert_eq!(params.is_some(), !effect.classification.is_empty());
            if let Some(p) = params {
                assert!(effect.classification.contains(p.force.class()));
            }
        }
    }
}
