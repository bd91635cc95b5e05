//! Raw DirectInput 8 bindings.
//!
//! `windows-sys` does not cover DirectInput, so the COM vtables, structures and
//! constants needed here are declared by hand. Only the methods this crate calls are
//! typed; every other vtable slot is a `usize` placeholder that keeps the layout.

#![allow(non_snake_case, non_camel_case_types, clippy::upper_case_acronyms)]

use std::ffi::c_void;

use windows_sys::core::{GUID, HRESULT};
use windows_sys::Win32::Foundation::{BOOL, HMODULE, HWND};

use crate::device::NativeError;

pub const DIRECTINPUT_VERSION: u32 = 0x0800;
pub const IID_IDirectInput8W: GUID = GUID::from_u128(0xBF798031_483A_4DA2_AA99_5D64ED369700);

pub const DIENUM_STOP: BOOL = 0;
pub const DIENUM_CONTINUE: BOOL = 1;

pub const DI8DEVCLASS_GAMECTRL: u32 = 4;
pub const DIEDFL_ATTACHEDONLY: u32 = 0x0000_0001;
pub const DIEDFL_FORCEFEEDBACK: u32 = 0x0000_0100;

pub const DIDC_FORCEFEEDBACK: u32 = 0x0000_0100;

pub const DISCL_EXCLUSIVE: u32 = 0x0000_0001;
pub const DISCL_BACKGROUND: u32 = 0x0000_0008;

pub const DIDFT_AXIS: u32 = 0x0000_0003;
pub const DIDFT_BUTTON: u32 = 0x0000_000C;
pub const DIDFT_POV: u32 = 0x0000_0010;
pub const DIDFT_ANYINSTANCE: u32 = 0x00FF_FF00;
pub const DIDFT_OPTIONAL: u32 = 0x8000_0000;
pub const DIDOI_ASPECTPOSITION: u32 = 0x0000_0100;
pub const DIDF_ABSAXIS: u32 = 0x0000_0001;

pub const DIPH_DEVICE: u32 = 0;
pub const DIPH_BYID: u32 = 2;
/// `MAKEDIPROP(4)`.
pub const DIPROP_RANGE: *const GUID = 4 as *const GUID;
/// `MAKEDIPROP(9)`.
pub const DIPROP_AUTOCENTER: *const GUID = 9 as *const GUID;
pub const DIPROPAUTOCENTER_OFF: u32 = 0;
pub const DIPROPAUTOCENTER_ON: u32 = 1;

pub const DIEFT_ALL: u32 = 0;
pub const DIEFF_OBJECTIDS: u32 = 0x0000_0001;
pub const DIEFF_CARTESIAN: u32 = 0x0000_0010;
pub const DIEFF_POLAR: u32 = 0x0000_0020;
pub const DIEB_NOTRIGGER: u32 = 0xFFFF_FFFF;
pub const INFINITE: u32 = 0xFFFF_FFFF;

pub const DIERR_INPUTLOST: u32 = 0x8007_001E;
pub const DIERR_NOTACQUIRED: u32 = 0x8007_000C;
pub const DIERR_OTHERAPPHASPRIO: u32 = 0x8007_0005;
pub const DIERR_INVALIDPARAM: u32 = 0x8007_0057;
pub const DIERR_NOTINITIALIZED: u32 = 0x8007_0015;
pub const DIERR_UNSUPPORTED: u32 = 0x8000_4001;
pub const DIERR_DEVICENOTREG: u32 = 0x8004_0154;

/// Classify an HRESULT. Success codes (including `S_FALSE`-style ones) are `Ok`.
pub fn check(hr: HRESULT) -> Result<(), NativeError> {
    if hr >= 0 {
        return Ok(());
    }
    Err(match hr as u32 {
        DIERR_INPUTLOST => NativeError::InputLost,
        DIERR_NOTACQUIRED => NativeError::NotAcquired,
        DIERR_OTHERAPPHASPRIO => NativeError::OtherAppHasPriority,
        DIERR_INVALIDPARAM => NativeError::InvalidParam,
        DIERR_NOTINITIALIZED => NativeError::NotInitialized,
        DIERR_UNSUPPORTED => NativeError::Unsupported,
        DIERR_DEVICENOTREG => NativeError::DeviceNotRegistered,
        other => NativeError::Other(other),
    })
}

#[repr(C)]
pub struct DIDEVICEINSTANCEW {
    pub dwSize: u32,
    pub guidInstance: GUID,
    pub guidProduct: GUID,
    pub dwDevType: u32,
    pub tszInstanceName: [u16; 260],
    pub tszProductName: [u16; 260],
    pub guidFFDriver: GUID,
    pub wUsagePage: u16,
    pub wUsage: u16,
}

#[repr(C)]
pub struct DIDEVICEOBJECTINSTANCEW {
    pub dwSize: u32,
    pub guidType: GUID,
    pub dwOfs: u32,
    pub dwType: u32,
    pub dwFlags: u32,
    pub tszName: [u16; 260],
    pub dwFFMaxForce: u32,
    pub dwFFForceResolution: u32,
    pub wCollectionNumber: u16,
    pub wDesignatorIndex: u16,
    pub wUsagePage: u16,
    pub wUsage: u16,
    pub dwDimension: u32,
    pub wExponent: u16,
    pub wReportId: u16,
}

#[repr(C)]
pub struct DIEFFECTINFOW {
    pub dwSize: u32,
    pub guid: GUID,
    pub dwEffType: u32,
    pub dwStaticParams: u32,
    pub dwDynamicParams: u32,
    pub tszName: [u16; 260],
}

#[repr(C)]
#[derive(Default)]
pub struct DIDEVCAPS {
    pub dwSize: u32,
    pub dwFlags: u32,
    pub dwDevType: u32,
    pub dwAxes: u32,
    pub dwButtons: u32,
    pub dwPOVs: u32,
    pub dwFFSamplePeriod: u32,
    pub dwFFMinTimeResolution: u32,
    pub dwFirmwareRevision: u32,
    pub dwHardwareRevision: u32,
    pub dwFFDriverVersion: u32,
}

#[repr(C)]
pub struct DIOBJECTDATAFORMAT {
    pub pguid: *const GUID,
    pub dwOfs: u32,
    pub dwType: u32,
    pub dwFlags: u32,
}

#[repr(C)]
pub struct DIDATAFORMAT {
    pub dwSize: u32,
    pub dwObjSize: u32,
    pub dwFlags: u32,
    pub dwDataSize: u32,
    pub dwNumObjs: u32,
    pub rgodf: *mut DIOBJECTDATAFORMAT,
}

#[repr(C)]
pub struct DIPROPHEADER {
    pub dwSize: u32,
    pub dwHeaderSize: u32,
    pub dwObj: u32,
    pub dwHow: u32,
}

#[repr(C)]
pub struct DIPROPRANGE {
    pub diph: DIPROPHEADER,
    pub lMin: i32,
    pub lMax: i32,
}

#[repr(C)]
pub struct DIPROPDWORD {
    pub diph: DIPROPHEADER,
    pub dwData: u32,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
pub struct DIJOYSTATE {
    pub lX: i32,
    pub lY: i32,
    pub lZ: i32,
    pub lRx: i32,
    pub lRy: i32,
    pub lRz: i32,
    pub rglSlider: [i32; 2],
    pub rgdwPOV: [u32; 4],
    pub rgbButtons: [u8; 32],
}

#[repr(C)]
pub struct DIENVELOPE {
    pub dwSize: u32,
    pub dwAttackLevel: u32,
    pub dwAttackTime: u32,
    pub dwFadeLevel: u32,
    pub dwFadeTime: u32,
}

#[repr(C)]
pub struct DIEFFECT {
    pub dwSize: u32,
    pub dwFlags: u32,
    pub dwDuration: u32,
    pub dwSamplePeriod: u32,
    pub dwGain: u32,
    pub dwTriggerButton: u32,
    pub dwTriggerRepeatInterval: u32,
    pub cAxes: u32,
    pub rgdwAxes: *mut u32,
    pub rglDirection: *mut i32,
    pub lpEnvelope: *mut DIENVELOPE,
    pub cbTypeSpecificParams: u32,
    pub lpvTypeSpecificParams: *mut c_void,
    pub dwStartDelay: u32,
}

#[repr(C)]
pub struct DICONSTANTFORCE {
    pub lMagnitude: i32,
}

#[repr(C)]
pub struct DIRAMPFORCE {
    pub lStart: i32,
    pub lEnd: i32,
}

#[repr(C)]
pub struct DIPERIODIC {
    pub dwMagnitude: u32,
    pub lOffset: i32,
    pub dwPhase: u32,
    pub dwPeriod: u32,
}

#[repr(C)]
pub struct DICONDITION {
    pub lOffset: i32,
    pub lPositiveCoefficient: i32,
    pub lNegativeCoefficient: i32,
    pub dwPositiveSaturation: u32,
    pub dwNegativeSaturation: u32,
    pub lDeadBand: i32,
}

pub type EnumDevicesCallback =
    unsafe extern "system" fn(*const DIDEVICEINSTANCEW, *mut c_void) -> BOOL;
pub type EnumObjectsCallback =
    unsafe extern "system" fn(*const DIDEVICEOBJECTINSTANCEW, *mut c_void) -> BOOL;
pub type EnumEffectsCallback = unsafe extern "system" fn(*const DIEFFECTINFOW, *mut c_void) -> BOOL;

#[repr(C)]
pub struct IDirectInput8W {
    pub vtbl: *const IDirectInput8WVtbl,
}

#[repr(C)]
pub struct IDirectInput8WVtbl {
    pub QueryInterface: usize,
    pub AddRef: usize,
    pub Release: unsafe extern "system" fn(*mut IDirectInput8W) -> u32,
    pub CreateDevice: unsafe extern "system" fn(
        *mut IDirectInput8W,
        *const GUID,
        *mut *mut IDirectInputDevice8W,
        *mut c_void,
    ) -> HRESULT,
    pub EnumDevices: unsafe extern "system" fn(
        *mut IDirectInput8W,
        u32,
        EnumDevicesCallback,
        *mut c_void,
        u32,
    ) -> HRESULT,
    pub GetDeviceStatus: usize,
    pub RunControlPanel: usize,
    pub Initialize: usize,
    pub FindDevice: usize,
    pub EnumDevicesBySemantics: usize,
    pub ConfigureDevices: usize,
}

#[repr(C)]
pub struct IDirectInputDevice8W {
    pub vtbl: *const IDirectInputDevice8WVtbl,
}

#[repr(C)]
pub struct IDirectInputDevice8WVtbl {
    pub QueryInterface: usize,
    pub AddRef: usize,
    pub Release: unsafe extern "system" fn(*mut IDirectInputDevice8W) -> u32,
    pub GetCapabilities:
        unsafe extern "system" fn(*mut IDirectInputDevice8W, *mut DIDEVCAPS) -> HRESULT,
    pub EnumObjects: unsafe extern "system" fn(
        *mut IDirectInputDevice8W,
        EnumObjectsCallback,
        *mut c_void,
        u32,
    ) -> HRESULT,
    pub GetProperty: usize,
    pub SetProperty: unsafe extern "system" fn(
        *mut IDirectInputDevice8W,
        *const GUID,
        *const DIPROPHEADER,
    ) -> HRESULT,
    pub Acquire: unsafe extern "system" fn(*mut IDirectInputDevice8W) -> HRESULT,
    pub Unacquire: unsafe extern "system" fn(*mut IDirectInputDevice8W) -> HRESULT,
    pub GetDeviceState:
        unsafe extern "system" fn(*mut IDirectInputDevice8W, u32, *mut c_void) -> HRESULT,
    pub GetDeviceData: usize,
    pub SetDataFormat:
        unsafe extern "system" fn(*mut IDirectInputDevice8W, *const DIDATAFORMAT) -> HRESULT,
    pub SetEventNotification: usize,
    pub SetCooperativeLevel:
        unsafe extern "system" fn(*mut IDirectInputDevice8W, HWND, u32) -> HRESULT,
    pub GetObjectInfo: usize,
    pub GetDeviceInfo: usize,
    pub RunControlPanel: usize,
    pub Initialize: usize,
    pub CreateEffect: unsafe extern "system" fn(
        *mut IDirectInputDevice8W,
        *const GUID,
        *const DIEFFECT,
        *mut *mut IDirectInputEffect,
        *mut c_void,
    ) -> HRESULT,
    pub EnumEffects: unsafe extern "system" fn(
        *mut IDirectInputDevice8W,
        EnumEffectsCallback,
        *mut c_void,
        u32,
    ) -> HRESULT,
    pub GetEffectInfo: usize,
    pub GetForceFeedbackState: usize,
    pub SendForceFeedbackCommand: usize,
    pub EnumCreatedEffectObjects: usize,
    pub Escape: usize,
    pub Poll: unsafe extern "system" fn(*mut IDirectInputDevice8W) -> HRESULT,
    pub SendDeviceData: usize,
    pub EnumEffectsInFile: usize,
    pub WriteEffectToFile: usize,
    pub BuildActionMap: usize,
    pub SetActionMap: usize,
    pub GetImageInfo: usize,
}

#[repr(C)]
pub struct IDirectInputEffect {
    pub vtbl: *const IDirectInputEffectVtbl,
}

#[repr(C)]
pub struct IDirectInputEffectVtbl {
    pub QueryInterface: usize,
    pub AddRef: usize,
    pub Release: unsafe extern "system" fn(*mut IDirectInputEffect) -> u32,
    pub Initialize: usize,
    pub GetEffectGuid: usize,
    pub GetParameters: usize,
    pub SetParameters: usize,
    pub Start: unsafe extern "system" fn(*mut IDirectInputEffect, u32, u32) -> HRESULT,
    pub Stop: unsafe extern "system" fn(*mut IDirectInputEffect) -> HRESULT,
    pub GetEffectStatus: usize,
    pub Download: usize,
    pub Unload: usize,
    pub Escape: usize,
}

#[link(name = "dinput8")]
extern "system" {
    pub fn DirectInput8Create(
        hinst: HMODULE,
        dwVersion: u32,
        riidltf: *const GUID,
        ppvOut: *mut *mut c_void,
        punkOuter: *mut c_void,
    ) -> HRESULT;
}

/// Decode a NUL-terminated UTF-16 buffer.
pub fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}
