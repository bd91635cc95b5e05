//! DirectInput 8 implementation of the native seam.
//!
//! Each interface pointer is owned by exactly one wrapper and released in its `Drop`.
//! Enumeration callbacks receive a pointer to the caller's visitor through the
//! `pvRef` argument and translate native records into crate types before calling it.

use std::ffi::c_void;
use std::mem::size_of;
use std::ptr;
use std::time::Duration;

use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::BOOL;
use windows_sys::Win32::System::Console::GetConsoleWindow;
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;

use super::ffi::*;
use crate::catalog::DeviceFilter;
use crate::device::{
    guids, DataFormat, DeviceInstance, EnumFlow, Guid, InputSystem, NativeDevice, NativeEffect,
    NativeEffectInfo, NativeEffectSpec, NativeError, ObjectId, ObjectInstance, ObjectType,
    RawJoyState,
};
use crate::effect::{DirectionEncoding, EffectDuration, Force};

fn to_win(g: &Guid) -> GUID {
    GUID {
        data1: g.data1,
        data2: g.data2,
        data3: g.data3,
        data4: g.data4,
    }
}

fn from_win(g: &GUID) -> Guid {
    Guid {
        data1: g.data1,
        data2: g.data2,
        data3: g.data3,
        data4: g.data4,
    }
}

fn flow(f: EnumFlow) -> BOOL {
    match f {
        EnumFlow::Continue => DIENUM_CONTINUE,
        EnumFlow::Stop => DIENUM_STOP,
    }
}

/// The DirectInput 8 subsystem object.
pub struct DirectInputSystem {
    di: *mut IDirectInput8W,
}

impl DirectInputSystem {
    pub fn new() -> Result<Self, NativeError> {
        let mut out: *mut c_void = ptr::null_mut();
        let hr = unsafe {
            DirectInput8Create(
                GetModuleHandleW(ptr::null()),
                DIRECTINPUT_VERSION,
                &IID_IDirectInput8W,
                &mut out,
                ptr::null_mut(),
            )
        };
        check(hr)?;
        if out.is_null() {
            return Err(NativeError::NotInitialized);
        }
        Ok(Self { di: out.cast() })
    }
}

impl Drop for DirectInputSystem {
    fn drop(&mut self) {
        unsafe { ((*(*self.di).vtbl).Release)(self.di) };
    }
}

unsafe extern "system" fn enum_devices_cb(raw: *const DIDEVICEINSTANCEW, pv: *mut c_void) -> BOOL {
    let visit = &mut *(pv as *mut &mut dyn FnMut(&DeviceInstance) -> EnumFlow);
    let raw = &*raw;
    let ff = from_win(&raw.guidFFDriver);
    let instance = DeviceInstance {
        instance: from_win(&raw.guidInstance),
        product: from_win(&raw.guidProduct),
        instance_name: wide_to_string(&raw.tszInstanceName),
        product_name: wide_to_string(&raw.tszProductName),
        ff_driver: (!ff.is_null()).then_some(ff),
    };
    flow(visit(&instance))
}

impl InputSystem for DirectInputSystem {
    fn enum_devices(
        &self,
        filter: &DeviceFilter,
        mut visit: &mut dyn FnMut(&DeviceInstance) -> EnumFlow,
    ) -> Result<(), NativeError> {
        let mut flags = 0;
        if filter.attached_only {
            flags |= DIEDFL_ATTACHEDONLY;
        }
        if filter.force_feedback_required {
            flags |= DIEDFL_FORCEFEEDBACK;
        }
        let pv = &mut visit as *mut &mut dyn FnMut(&DeviceInstance) -> EnumFlow as *mut c_void;
        let hr = unsafe {
            ((*(*self.di).vtbl).EnumDevices)(self.di, DI8DEVCLASS_GAMECTRL, enum_devices_cb, pv, flags)
        };
        check(hr)
    }

    fn create_device(&self, instance: &Guid) -> Result<Box<dyn NativeDevice>, NativeError> {
        let mut dev: *mut IDirectInputDevice8W = ptr::null_mut();
        let hr = unsafe {
            ((*(*self.di).vtbl).CreateDevice)(self.di, &to_win(instance), &mut dev, ptr::null_mut())
        };
        check(hr)?;
        if dev.is_null() {
            return Err(NativeError::DeviceNotRegistered);
        }
        let device = DirectInputDevice { dev };
        device.claim_force_feedback();
        Ok(Box::new(device))
    }
}

/// Builds the equivalent of `c_dfDIJoystick`.
struct JoystickFormat {
    objects: Vec<DIOBJECTDATAFORMAT>,
}

impl JoystickFormat {
    fn new() -> Self {
        static AXES: [(&GUID, u32); 8] = [
            (&X_AXIS, 0),
            (&Y_AXIS, 4),
            (&Z_AXIS, 8),
            (&RX_AXIS, 12),
            (&RY_AXIS, 16),
            (&RZ_AXIS, 20),
            (&SLIDER, 24),
            (&SLIDER, 28),
        ];
        let mut objects = Vec::with_capacity(44);
        for (guid, ofs) in AXES {
            objects.push(DIOBJECTDATAFORMAT {
                pguid: guid,
                dwOfs: ofs,
                dwType: DIDFT_AXIS | DIDFT_ANYINSTANCE | DIDFT_OPTIONAL,
                dwFlags: DIDOI_ASPECTPOSITION,
            });
        }
        for i in 0..4 {
            objects.push(DIOBJECTDATAFORMAT {
                pguid: &POV,
                dwOfs: 32 + 4 * i,
                dwType: DIDFT_POV | DIDFT_ANYINSTANCE | DIDFT_OPTIONAL,
                dwFlags: 0,
            });
        }
        for i in 0..32 {
            objects.push(DIOBJECTDATAFORMAT {
                pguid: ptr::null(),
                dwOfs: 48 + i,
                dwType: DIDFT_BUTTON | DIDFT_ANYINSTANCE | DIDFT_OPTIONAL,
                dwFlags: 0,
            });
        }
        Self { objects }
    }

    fn as_native(&mut self) -> DIDATAFORMAT {
        DIDATAFORMAT {
            dwSize: size_of::<DIDATAFORMAT>() as u32,
            dwObjSize: size_of::<DIOBJECTDATAFORMAT>() as u32,
            dwFlags: DIDF_ABSAXIS,
            dwDataSize: size_of::<DIJOYSTATE>() as u32,
            dwNumObjs: self.objects.len() as u32,
            rgodf: self.objects.as_mut_ptr(),
        }
    }
}

static X_AXIS: GUID = GUID::from_u128(guids::X_AXIS.to_u128());
static Y_AXIS: GUID = GUID::from_u128(guids::Y_AXIS.to_u128());
static Z_AXIS: GUID = GUID::from_u128(guids::Z_AXIS.to_u128());
static RX_AXIS: GUID = GUID::from_u128(guids::RX_AXIS.to_u128());
static RY_AXIS: GUID = GUID::from_u128(guids::RY_AXIS.to_u128());
static RZ_AXIS: GUID = GUID::from_u128(guids::RZ_AXIS.to_u128());
static SLIDER: GUID = GUID::from_u128(guids::SLIDER.to_u128());
static POV: GUID = GUID::from_u128(guids::POV.to_u128());

struct DirectInputDevice {
    dev: *mut IDirectInputDevice8W,
}

impl DirectInputDevice {
    #[inline]
    fn vtbl(&self) -> &IDirectInputDevice8WVtbl {
        unsafe { &*(*self.dev).vtbl }
    }

    /// Force-feedback devices need exclusive access to play effects.
    fn claim_force_feedback(&self) {
        let mut caps = DIDEVCAPS {
            dwSize: size_of::<DIDEVCAPS>() as u32,
            ..DIDEVCAPS::default()
        };
        if check(unsafe { (self.vtbl().GetCapabilities)(self.dev, &mut caps) }).is_err()
            || caps.dwFlags & DIDC_FORCEFEEDBACK == 0
        {
            return;
        }
        let hwnd = unsafe { GetConsoleWindow() };
        let hr = unsafe {
            (self.vtbl().SetCooperativeLevel)(self.dev, hwnd, DISCL_EXCLUSIVE | DISCL_BACKGROUND)
        };
        if let Err(e) = check(hr) {
            log::warn!("exclusive access for force feedback not granted: {e}");
        }
    }

    fn set_property(&mut self, prop: *const GUID, header: *const DIPROPHEADER) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().SetProperty)(self.dev, prop, header) })
    }
}

unsafe extern "system" fn enum_objects_cb(
    raw: *const DIDEVICEOBJECTINSTANCEW,
    pv: *mut c_void,
) -> BOOL {
    let visit = &mut *(pv as *mut &mut dyn FnMut(&ObjectInstance) -> EnumFlow);
    let raw = &*raw;
    let object = ObjectInstance {
        id: ObjectId(raw.dwType),
        guid_type: from_win(&raw.guidType),
        name: wide_to_string(&raw.tszName),
        offset: raw.dwOfs,
    };
    flow(visit(&object))
}

unsafe extern "system" fn enum_effects_cb(raw: *const DIEFFECTINFOW, pv: *mut c_void) -> BOOL {
    let visit = &mut *(pv as *mut &mut dyn FnMut(&NativeEffectInfo) -> EnumFlow);
    let raw = &*raw;
    let info = NativeEffectInfo {
        guid: from_win(&raw.guid),
        effect_type: raw.dwEffType,
        static_params: raw.dwStaticParams,
        dynamic_params: raw.dwDynamicParams,
        name: wide_to_string(&raw.tszName),
    };
    flow(visit(&info))
}

impl NativeDevice for DirectInputDevice {
    fn set_data_format(&mut self, format: DataFormat) -> Result<(), NativeError> {
        match format {
            DataFormat::Joystick => {
                let mut layout = JoystickFormat::new();
                let native = layout.as_native();
                // DirectInput copies the format; `layout` only has to outlive the call.
                check(unsafe { (self.vtbl().SetDataFormat)(self.dev, &native) })
            }
        }
    }

    fn enum_objects(
        &self,
        mask: ObjectType,
        mut visit: &mut dyn FnMut(&ObjectInstance) -> EnumFlow,
    ) -> Result<(), NativeError> {
        let pv = &mut visit as *mut &mut dyn FnMut(&ObjectInstance) -> EnumFlow as *mut c_void;
        let flags = mask.bits() & 0xFF;
        check(unsafe { (self.vtbl().EnumObjects)(self.dev, enum_objects_cb, pv, flags) })
    }

    fn set_axis_range(&mut self, object: ObjectId, min: i32, max: i32) -> Result<(), NativeError> {
        let range = DIPROPRANGE {
            diph: DIPROPHEADER {
                dwSize: size_of::<DIPROPRANGE>() as u32,
                dwHeaderSize: size_of::<DIPROPHEADER>() as u32,
                dwObj: object.0,
                dwHow: DIPH_BYID,
            },
            lMin: min,
            lMax: max,
        };
        self.set_property(DIPROP_RANGE, &range.diph)
    }

    fn set_autocenter(&mut self, enabled: bool) -> Result<(), NativeError> {
        let value = DIPROPDWORD {
            diph: DIPROPHEADER {
                dwSize: size_of::<DIPROPDWORD>() as u32,
                dwHeaderSize: size_of::<DIPROPHEADER>() as u32,
                dwObj: 0,
                dwHow: DIPH_DEVICE,
            },
            dwData: if enabled {
                DIPROPAUTOCENTER_ON
            } else {
                DIPROPAUTOCENTER_OFF
            },
        };
        self.set_property(DIPROP_AUTOCENTER, &value.diph)
    }

    fn acquire(&mut self) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().Acquire)(self.dev) })
    }

    fn unacquire(&mut self) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().Unacquire)(self.dev) })
    }

    fn poll(&mut self) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().Poll)(self.dev) })
    }

    fn device_state(&mut self, out: &mut RawJoyState) -> Result<(), NativeError> {
        let mut js = DIJOYSTATE::default();
        let hr = unsafe {
            (self.vtbl().GetDeviceState)(
                self.dev,
                size_of::<DIJOYSTATE>() as u32,
                (&mut js as *mut DIJOYSTATE).cast(),
            )
        };
        check(hr)?;
        *out = RawJoyState {
            axes: [js.lX, js.lY, js.lZ, js.lRx, js.lRy, js.lRz],
            sliders: js.rglSlider,
            pov: js.rgdwPOV,
            buttons: js.rgbButtons,
        };
        Ok(())
    }

    fn enum_effects(
        &self,
        mut visit: &mut dyn FnMut(&NativeEffectInfo) -> EnumFlow,
    ) -> Result<(), NativeError> {
        let pv = &mut visit as *mut &mut dyn FnMut(&NativeEffectInfo) -> EnumFlow as *mut c_void;
        check(unsafe { (self.vtbl().EnumEffects)(self.dev, enum_effects_cb, pv, DIEFT_ALL) })
    }

    fn create_effect(
        &mut self,
        effect: &Guid,
        spec: &NativeEffectSpec,
    ) -> Result<Box<dyn NativeEffect>, NativeError> {
        let mut axes: Vec<u32> = spec.axes.iter().map(|a| a.0).collect();
        let mut direction = spec.direction.clone();
        let mut params = TypeSpecific::from_force(&spec.force);
        let (params_ptr, params_len) = params.as_raw();

        let encoding = match spec.encoding {
            DirectionEncoding::Cartesian => DIEFF_CARTESIAN,
            DirectionEncoding::Polar => DIEFF_POLAR,
        };
        let native = DIEFFECT {
            dwSize: size_of::<DIEFFECT>() as u32,
            dwFlags: DIEFF_OBJECTIDS | encoding,
            dwDuration: duration_us(spec.duration),
            dwSamplePeriod: 0,
            dwGain: spec.gain,
            dwTriggerButton: DIEB_NOTRIGGER,
            dwTriggerRepeatInterval: 0,
            cAxes: axes.len() as u32,
            rgdwAxes: axes.as_mut_ptr(),
            rglDirection: direction.as_mut_ptr(),
            lpEnvelope: ptr::null_mut(),
            cbTypeSpecificParams: params_len,
            lpvTypeSpecificParams: params_ptr,
            dwStartDelay: 0,
        };

        let mut out: *mut IDirectInputEffect = ptr::null_mut();
        let hr = unsafe {
            (self.vtbl().CreateEffect)(self.dev, &to_win(effect), &native, &mut out, ptr::null_mut())
        };
        check(hr)?;
        if out.is_null() {
            return Err(NativeError::Unsupported);
        }
        Ok(Box::new(DirectInputEffect { effect: out }))
    }
}

impl Drop for DirectInputDevice {
    fn drop(&mut self) {
        unsafe {
            (self.vtbl().Unacquire)(self.dev);
            (self.vtbl().Release)(self.dev);
        }
    }
}

fn duration_us(duration: EffectDuration) -> u32 {
    match duration {
        EffectDuration::Infinite => INFINITE,
        // Anything past u32::MAX microseconds (~71 minutes) is treated as infinite.
        EffectDuration::Finite(d) => u32::try_from(d.as_micros()).unwrap_or(INFINITE),
    }
}

fn period_us(period: Duration) -> u32 {
    u32::try_from(period.as_micros()).unwrap_or(u32::MAX)
}

enum TypeSpecific {
    Constant(DICONSTANTFORCE),
    Ramp(DIRAMPFORCE),
    Periodic(DIPERIODIC),
    Condition(Vec<DICONDITION>),
}

impl TypeSpecific {
    fn from_force(force: &Force) -> Self {
        match force {
            Force::Constant { magnitude } => Self::Constant(DICONSTANTFORCE {
                lMagnitude: *magnitude,
            }),
            Force::Ramp { start, end } => Self::Ramp(DIRAMPFORCE {
                lStart: *start,
                lEnd: *end,
            }),
            Force::Periodic {
                magnitude,
                offset,
                phase,
                period,
            } => Self::Periodic(DIPERIODIC {
                dwMagnitude: *magnitude,
                lOffset: *offset,
                dwPhase: *phase,
                dwPeriod: period_us(*period),
            }),
            Force::Condition(axes) => Self::Condition(
                axes.iter()
                    .map(|c| DICONDITION {
                        lOffset: c.offset,
                        lPositiveCoefficient: c.positive_coefficient,
                        lNegativeCoefficient: c.negative_coefficient,
                        dwPositiveSaturation: c.positive_saturation,
                        dwNegativeSaturation: c.negative_saturation,
                        lDeadBand: c.dead_band,
                    })
                    .collect(),
            ),
        }
    }

    fn as_raw(&mut self) -> (*mut c_void, u32) {
        fn raw<T>(v: &mut T) -> (*mut c_void, u32) {
            ((v as *mut T).cast(), size_of::<T>() as u32)
        }
        match self {
            Self::Constant(c) => raw(c),
            Self::Ramp(r) => raw(r),
            Self::Periodic(p) => raw(p),
            Self::Condition(list) => (
                list.as_mut_ptr().cast(),
                (list.len() * size_of::<DICONDITION>()) as u32,
            ),
        }
    }
}

struct DirectInputEffect {
    effect: *mut IDirectInputEffect,
}

impl DirectInputEffect {
    #[inline]
    fn vtbl(&self) -> &IDirectInputEffectVtbl {
        unsafe { &*(*self.effect).vtbl }
    }
}

impl NativeEffect for DirectInputEffect {
    fn start(&mut self, iterations: u32) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().Start)(self.effect, iterations, 0) })
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        check(unsafe { (self.vtbl().Stop)(self.effect) })
    }
}

impl Drop for DirectInputEffect {
    fn drop(&mut self) {
        unsafe { (self.vtbl().Release)(self.effect) };
    }
}
