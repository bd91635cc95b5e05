//! Scripted in-memory input subsystem.
//!
//! Stands in for a real platform in tests and demos. A [`VirtualDevice`] is a cheap
//! cloneable handle onto shared state: keep one clone to script failures and inspect
//! what the session did, and hand another to [`VirtualInput::with_device`].
//!
//! Native behaviour follows the real subsystem where it matters to callers:
//! polling, reading state and creating effects all fail with
//! [`NativeError::NotAcquired`] until the device is acquired, and any scripted error
//! on those paths drops the acquisition.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::catalog::DeviceFilter;
use crate::device::{
    DataFormat, DeviceInstance, EnumFlow, Guid, InputSystem, NativeDevice, NativeEffect,
    NativeEffectInfo, NativeEffectSpec, NativeError, ObjectId, ObjectInstance, ObjectKind,
    ObjectType, RawJoyState,
};
use crate::effect::EffectKind;
use crate::snapshot::MAX_BUTTONS;

const INSTANCE_BASE: u128 = 0x7669_7274_0000_0000_0000_0000_0000_0000;
const PRODUCT_GUID: Guid = Guid::from_u128(0x7669_7274_5052_4F44_0000_0000_0000_0001);
const FF_DRIVER_GUID: Guid = Guid::from_u128(0x7669_7274_4646_4452_0000_0000_0000_0001);

const DEFAULT_EFFECTS: [(EffectKind, &str); 12] = [
    (EffectKind::ConstantForce, "Constant Force"),
    (EffectKind::RampForce, "Ramp Force"),
    (EffectKind::Square, "Square"),
    (EffectKind::Sine, "Sine"),
    (EffectKind::Triangle, "Triangle"),
    (EffectKind::SawtoothUp, "Sawtooth Up"),
    (EffectKind::SawtoothDown, "Sawtooth Down"),
    (EffectKind::Spring, "Spring"),
    (EffectKind::Damper, "Damper"),
    (EffectKind::Inertia, "Inertia"),
    (EffectKind::Friction, "Friction"),
    (EffectKind::CustomForce, "Custom Force"),
];

/// One effect created on a virtual device, as the device saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRecord {
    pub guid: Guid,
    pub spec: NativeEffectSpec,
    /// Iteration count of every start, in order.
    pub starts: Vec<u32>,
    pub stops: usize,
    pub playing: bool,
    pub freed: bool,
}

#[derive(Debug)]
struct VirtualState {
    name: String,
    axes: Vec<ObjectKind>,
    buttons: usize,
    povs: usize,
    /// Objects with arbitrary type bits, reported after the buttons.
    extra_objects: Vec<ObjectType>,
    force_feedback: bool,

    reject_format: bool,
    reject_ranges: bool,
    reject_autocenter: bool,
    fail_open: bool,
    fail_effect_creation: bool,

    current: RawJoyState,
    acquire_script: VecDeque<Result<(), NativeError>>,
    poll_script: VecDeque<Result<(), NativeError>>,
    state_script: VecDeque<Result<RawJoyState, NativeError>>,

    acquired: bool,
    acquire_calls: usize,
    open_handles: usize,
    ranges: HashMap<ObjectId, (i32, i32)>,
    autocenter: Option<bool>,
    effect_enumerations: usize,
    effects: Vec<EffectRecord>,
    effects_outliving_handle: usize,
}

/// A scripted joystick.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    state: Rc<RefCell<VirtualState>>,
}

impl VirtualDevice {
    /// A three-axis stick with eight buttons and one hat.
    pub fn joystick(name: &str) -> Self {
        let mut current = RawJoyState::default();
        current.pov = [u32::MAX; 4];
        Self {
            state: Rc::new(RefCell::new(VirtualState {
                name: name.to_string(),
                axes: vec![ObjectKind::XAxis, ObjectKind::YAxis, ObjectKind::ZAxis],
                buttons: 8,
                povs: 1,
                extra_objects: Vec::new(),
                force_feedback: false,
                reject_format: false,
                reject_ranges: false,
                reject_autocenter: false,
                fail_open: false,
                fail_effect_creation: false,
                current,
                acquire_script: VecDeque::new(),
                poll_script: VecDeque::new(),
                state_script: VecDeque::new(),
                acquired: false,
                acquire_calls: 0,
                open_handles: 0,
                ranges: HashMap::new(),
                autocenter: None,
                effect_enumerations: 0,
                effects: Vec::new(),
                effects_outliving_handle: 0,
            })),
        }
    }

    fn edit(self, f: impl FnOnce(&mut VirtualState)) -> Self {
        f(&mut *self.state.borrow_mut());
        self
    }

    pub fn with_axes(self, axes: &[ObjectKind]) -> Self {
        self.edit(|s| s.axes = axes.to_vec())
    }

    pub fn with_buttons(self, count: usize) -> Self {
        self.edit(|s| s.buttons = count.min(MAX_BUTTONS))
    }

    pub fn with_povs(self, count: usize) -> Self {
        self.edit(|s| s.povs = count.min(4))
    }

    /// Add an object carrying exactly `ty`, e.g. one that claims to be both an axis
    /// and a button.
    pub fn with_object(self, ty: ObjectType) -> Self {
        self.edit(|s| s.extra_objects.push(ty))
    }

    pub fn with_force_feedback(self) -> Self {
        self.edit(|s| s.force_feedback = true)
    }

    pub fn rejecting_format(self) -> Self {
        self.edit(|s| s.reject_format = true)
    }

    pub fn rejecting_ranges(self) -> Self {
        self.edit(|s| s.reject_ranges = true)
    }

    pub fn rejecting_autocenter(self) -> Self {
        self.edit(|s| s.reject_autocenter = true)
    }

    pub fn failing_open(self) -> Self {
        self.edit(|s| s.fail_open = true)
    }

    pub fn failing_effect_creation(self) -> Self {
        self.edit(|s| s.fail_effect_creation = true)
    }

    // Live input.

    pub fn press(&self, button: usize) {
        if let Some(b) = self.state.borrow_mut().current.buttons.get_mut(button) {
            *b = 0x80;
        }
    }

    pub fn release_button(&self, button: usize) {
        if let Some(b) = self.state.borrow_mut().current.buttons.get_mut(button) {
            *b = 0;
        }
    }

    /// Move an axis or the first slider. Other kinds are ignored.
    pub fn set_axis(&self, kind: ObjectKind, value: i32) {
        let mut s = self.state.borrow_mut();
        let slot = match kind {
            ObjectKind::XAxis => &mut s.current.axes[0],
            ObjectKind::YAxis => &mut s.current.axes[1],
            ObjectKind::ZAxis => &mut s.current.axes[2],
            ObjectKind::RxAxis => &mut s.current.axes[3],
            ObjectKind::RyAxis => &mut s.current.axes[4],
            ObjectKind::RzAxis => &mut s.current.axes[5],
            ObjectKind::Slider => &mut s.current.sliders[0],
            _ => return,
        };
        *slot = value;
    }

    /// Hundredths of a degree, or `None` for centered.
    pub fn set_pov(&self, index: usize, value: Option<u32>) {
        if let Some(p) = self.state.borrow_mut().current.pov.get_mut(index) {
            *p = value.unwrap_or(u32::MAX);
        }
    }

    /// The device drops its acquisition without telling any session, as after a
    /// focus change or a suspend.
    pub fn lose_acquisition(&self) {
        self.state.borrow_mut().acquired = false;
    }

    // Scripted results, consumed one per native call.

    pub fn queue_acquire(&self, result: Result<(), NativeError>) {
        self.state.borrow_mut().acquire_script.push_back(result);
    }

    pub fn queue_poll(&self, result: Result<(), NativeError>) {
        self.state.borrow_mut().poll_script.push_back(result);
    }

    pub fn queue_state(&self, result: Result<RawJoyState, NativeError>) {
        self.state.borrow_mut().state_script.push_back(result);
    }

    // Inspection.

    pub fn axis_range(&self, object: ObjectId) -> Option<(i32, i32)> {
        self.state.borrow().ranges.get(&object).copied()
    }

    pub fn autocenter(&self) -> Option<bool> {
        self.state.borrow().autocenter
    }

    pub fn acquire_calls(&self) -> usize {
        self.state.borrow().acquire_calls
    }

    pub fn is_acquired(&self) -> bool {
        self.state.borrow().acquired
    }

    pub fn open_handles(&self) -> usize {
        self.state.borrow().open_handles
    }

    pub fn effect_enumerations(&self) -> usize {
        self.state.borrow().effect_enumerations
    }

    pub fn effect_type_count(&self) -> usize {
        if self.state.borrow().force_feedback {
            DEFAULT_EFFECTS.len()
        } else {
            0
        }
    }

    pub fn effects(&self) -> Vec<EffectRecord> {
        self.state.borrow().effects.clone()
    }

    /// Effects that were still allocated when a device handle was released.
    pub fn effects_outliving_handle(&self) -> usize {
        self.state.borrow().effects_outliving_handle
    }

    fn instance(&self, index: usize) -> DeviceInstance {
        let s = self.state.borrow();
        DeviceInstance {
            instance: Guid::from_u128(INSTANCE_BASE + index as u128),
            product: PRODUCT_GUID,
            instance_name: s.name.clone(),
            product_name: s.name.clone(),
            ff_driver: s.force_feedback.then_some(FF_DRIVER_GUID),
        }
    }
}

fn objects(s: &VirtualState) -> Vec<ObjectInstance> {
    let mut out = Vec::new();
    let ff = if s.force_feedback {
        ObjectType::FFACTUATOR
    } else {
        ObjectType::empty()
    };
    let mut sliders = 0u32;
    for (i, kind) in s.axes.iter().enumerate() {
        let offset = match kind {
            ObjectKind::XAxis => 0,
            ObjectKind::YAxis => 4,
            ObjectKind::ZAxis => 8,
            ObjectKind::RxAxis => 12,
            ObjectKind::RyAxis => 16,
            ObjectKind::RzAxis => 20,
            _ => {
                sliders += 1;
                20 + 4 * sliders
            }
        };
        let id = ObjectId::new(ObjectType::ABSAXIS, i as u16);
        out.push(ObjectInstance {
            id: ObjectId(id.0 | ff.bits()),
            guid_type: kind.guid(),
            name: format!("{} Axis", kind.label()),
            offset,
        });
    }
    for i in 0..s.povs {
        out.push(ObjectInstance {
            id: ObjectId::new(ObjectType::POV, i as u16),
            guid_type: ObjectKind::Pov.guid(),
            name: format!("Hat Switch {i}"),
            offset: 32 + 4 * i as u32,
        });
    }
    for i in 0..s.buttons {
        out.push(ObjectInstance {
            id: ObjectId::new(ObjectType::PSHBUTTON, i as u16),
            guid_type: ObjectKind::Button.guid(),
            name: format!("Button {i}"),
            offset: 48 + i as u32,
        });
    }
    for (i, ty) in s.extra_objects.iter().enumerate() {
        out.push(ObjectInstance {
            id: ObjectId::new(*ty, (0x100 + i) as u16),
            guid_type: Guid::NULL,
            name: format!("Object {i}"),
            offset: 0,
        });
    }
    out
}

/// A scripted input subsystem holding a fixed list of devices.
#[derive(Debug, Default)]
pub struct VirtualInput {
    devices: Vec<VirtualDevice>,
    fail_enumeration: bool,
}

impl VirtualInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: VirtualDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// A stick and a force-feedback wheel, for trying the tool without hardware.
    pub fn demo() -> Self {
        Self::new()
            .with_device(VirtualDevice::joystick("Virtual Stick"))
            .with_device(
                VirtualDevice::joystick("Virtual Wheel")
                    .with_axes(&[ObjectKind::XAxis, ObjectKind::YAxis, ObjectKind::RzAxis])
                    .with_buttons(12)
                    .with_force_feedback(),
            )
    }
}

impl InputSystem for VirtualInput {
    fn enum_devices(
        &self,
        filter: &DeviceFilter,
        visit: &mut dyn FnMut(&DeviceInstance) -> EnumFlow,
    ) -> Result<(), NativeError> {
        if self.fail_enumeration {
            return Err(NativeError::Other(0x8000_4005));
        }
        for (index, device) in self.devices.iter().enumerate() {
            if filter.force_feedback_required && !device.state.borrow().force_feedback {
                continue;
            }
            if visit(&device.instance(index)) == EnumFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn create_device(&self, instance: &Guid) -> Result<Box<dyn NativeDevice>, NativeError> {
        let index = instance
            .to_u128()
            .checked_sub(INSTANCE_BASE)
            .ok_or(NativeError::DeviceNotRegistered)?;
        let device = usize::try_from(index)
            .ok()
            .and_then(|i| self.devices.get(i))
            .ok_or(NativeError::DeviceNotRegistered)?;
        {
            let mut s = device.state.borrow_mut();
            if s.fail_open {
                return Err(NativeError::DeviceNotRegistered);
            }
            s.open_handles += 1;
        }
        Ok(Box::new(VirtualHandle {
            state: device.state.clone(),
        }))
    }
}

struct VirtualHandle {
    state: Rc<RefCell<VirtualState>>,
}

impl NativeDevice for VirtualHandle {
    fn set_data_format(&mut self, _format: DataFormat) -> Result<(), NativeError> {
        if self.state.borrow().reject_format {
            return Err(NativeError::InvalidParam);
        }
        Ok(())
    }

    fn enum_objects(
        &self,
        mask: ObjectType,
        visit: &mut dyn FnMut(&ObjectInstance) -> EnumFlow,
    ) -> Result<(), NativeError> {
        let all = objects(&self.state.borrow());
        for object in all.iter().filter(|o| o.object_type().intersects(mask)) {
            if visit(object) == EnumFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn set_axis_range(&mut self, object: ObjectId, min: i32, max: i32) -> Result<(), NativeError> {
        let mut s = self.state.borrow_mut();
        if s.reject_ranges {
            return Err(NativeError::Unsupported);
        }
        s.ranges.insert(object, (min, max));
        Ok(())
    }

    fn set_autocenter(&mut self, enabled: bool) -> Result<(), NativeError> {
        let mut s = self.state.borrow_mut();
        if s.reject_autocenter {
            return Err(NativeError::Unsupported);
        }
        s.autocenter = Some(enabled);
        Ok(())
    }

    fn acquire(&mut self) -> Result<(), NativeError> {
        let mut s = self.state.borrow_mut();
        s.acquire_calls += 1;
        let result = s.acquire_script.pop_front().unwrap_or(Ok(()));
        s.acquired = result.is_ok();
        result
    }

    fn unacquire(&mut self) -> Result<(), NativeError> {
        self.state.borrow_mut().acquired = false;
        Ok(())
    }

    fn poll(&mut self) -> Result<(), NativeError> {
        let mut s = self.state.borrow_mut();
        if let Some(Err(e)) = s.poll_script.pop_front() {
            s.acquired = false;
            return Err(e);
        }
        if !s.acquired {
            return Err(NativeError::NotAcquired);
        }
        Ok(())
    }

    fn device_state(&mut self, out: &mut RawJoyState) -> Result<(), NativeError> {
        let mut s = self.state.borrow_mut();
        if !s.acquired {
            return Err(NativeError::NotAcquired);
        }
        match s.state_script.pop_front() {
            Some(Ok(raw)) => *out = raw,
            Some(Err(e)) => {
                s.acquired = false;
                return Err(e);
            }
            None => *out = s.current,
        }
        Ok(())
    }

    fn enum_effects(
        &self,
        visit: &mut dyn FnMut(&NativeEffectInfo) -> EnumFlow,
    ) -> Result<(), NativeError> {
        let force_feedback = {
            let mut s = self.state.borrow_mut();
            s.effect_enumerations += 1;
            s.force_feedback
        };
        if !force_feedback {
            return Ok(());
        }
        for (kind, name) in DEFAULT_EFFECTS {
            let info = NativeEffectInfo {
                guid: kind.guid(),
                effect_type: kind.type_word(),
                static_params: 0,
                dynamic_params: 0,
                name: name.to_string(),
            };
            if visit(&info) == EnumFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn create_effect(
        &mut self,
        effect: &Guid,
        spec: &NativeEffectSpec,
    ) -> Result<Box<dyn NativeEffect>, NativeError> {
        let mut s = self.state.borrow_mut();
        if !s.acquired {
            return Err(NativeError::NotAcquired);
        }
        if !s.force_feedback || s.fail_effect_creation {
            return Err(NativeError::Unsupported);
        }
        s.effects.push(EffectRecord {
            guid: *effect,
            spec: spec.clone(),
            starts: Vec::new(),
            stops: 0,
            playing: false,
            freed: false,
        });
        Ok(Box::new(VirtualEffect {
            state: self.state.clone(),
            index: s.effects.len() - 1,
        }))
    }
}

impl Drop for VirtualHandle {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.open_handles = s.open_handles.saturating_sub(1);
        s.acquired = false;
        s.effects_outliving_handle += s.effects.iter().filter(|e| !e.freed).count();
    }
}

struct VirtualEffect {
    state: Rc<RefCell<VirtualState>>,
    index: usize,
}

impl VirtualEffect {
    fn record(&self, f: impl FnOnce(&mut EffectRecord)) {
        if let Some(r) = self.state.borrow_mut().effects.get_mut(self.index) {
            f(r);
        }
    }
}

impl NativeEffect for VirtualEffect {
    fn start(&mut self, iterations: u32) -> Result<(), NativeError> {
        self.record(|r| {
            r.starts.push(iterations);
            r.playing = true;
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        self.record(|r| {
            r.stops += 1;
            r.playing = false;
        });
        Ok(())
    }
}

impl Drop for VirtualEffect {
    fn drop(&mut self) {
        self.record(|r| {
            r.playing = false;
            r.freed = true;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_are_filtered_by_mask() {
        let system = VirtualInput::new().with_device(VirtualDevice::joystick("Stick").with_buttons(2));
        let handle = system
            .create_device(&Guid::from_u128(INSTANCE_BASE))
            .unwrap();
        let mut names = Vec::new();
        handle
            .enum_objects(ObjectType::BUTTON, &mut |o| {
                names.push(o.name.clone());
                EnumFlow::Continue
            })
            .unwrap();
        assert_eq!(names, ["Button 0", "Button 1"]);
    }

    #[test]
    fn state_needs_acquisition() {
        let stick = VirtualDevice::joystick("Stick");
        let system = VirtualInput::new().with_device(stick.clone());
        let mut handle = system
            .create_device(&Guid::from_u128(INSTANCE_BASE))
            .unwrap();
        let mut raw = RawJoyState::default();
        assert_eq!(handle.poll(), Err(NativeError::NotAcquired));
        assert_eq!(handle.device_state(&mut raw), Err(NativeError::NotAcquired));

        handle.acquire().unwrap();
        stick.set_axis(ObjectKind::YAxis, -250);
        handle.device_state(&mut raw).unwrap();
        assert_eq!(raw.axes[1], -250);
        assert_eq!(stick.open_handles(), 1);
        drop(handle);
        assert_eq!(stick.open_handles(), 0);
        assert!(!stick.is_acquired());
    }

    #[test]
    fn unknown_instances_are_not_registered() {
        let system = VirtualInput::demo();
        assert!(matches!(
            system.create_device(&Guid::NULL),
            Err(NativeError::DeviceNotRegistered)
        ));
    }
}
