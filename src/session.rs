//! Device sessions.
//!
//! A [`DeviceSession`] exclusively owns one opened native device handle. It negotiates the
//! canonical joystick data format on open, discovers the axis/button layout (applying the
//! configured axis range as it goes), and runs the acquire/poll state machine:
//!
//! ```text
//!            poll ok                      state read ok
//! Unacquired ───────────────────────────────────────────► Acquired ──┐
//!     │  native poll failed                        ▲          │       │ read failed
//!     ▼                                            │ ok       │       ▼
//! Acquiring ── InputLost: retry until cancelled ───┘          │   Unacquired
//!     │  OtherAppHasPriority ──► Idle (no state, retry later) │
//!     │  InvalidState ─────────► Fatal (terminal)             │
//! ```
//!
//! Transient conditions never escape [`DeviceSession::poll`]: lost input is retried
//! in place and priority contention is reported as [`PollStatus::Unavailable`].
//!
//! The session owns the native effects created against it; an
//! [`EffectBinding`](crate::effect::EffectBinding) holds a slot in it and a weak
//! back-reference. [`close`](DeviceSession::close) refuses while any binding is live, and
//! dropping the session frees every remaining effect before the device handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::catalog::DeviceDescriptor;
use crate::config::PollConfig;
use crate::device::{
    DataFormat, EnumFlow, InputSystem, NativeDevice, NativeEffect, NativeError, ObjectId,
    ObjectInstance, ObjectKind, ObjectType, RawJoyState,
};
use crate::error::{AcquireError, DeviceOpenError, ErrorClass, PollError, SessionError};
use crate::snapshot::JoystickState;

/// Position in the acquire/poll state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unacquired,
    Acquiring,
    Acquired,
    /// Another application holds priority access; the next poll tries again.
    Idle,
    /// Terminal. The session must be reopened.
    Fatal,
}

/// Successful result of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    State(JoystickState),
    /// No state this time; poll again later. Not a failure.
    Unavailable(Unavailable),
}

/// Why a poll produced no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    OtherAppHasPriority,
    /// The state read failed; the device is re-acquired on the next poll.
    StateLost,
}

/// A best-effort device write that the device rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionWarning {
    AxisRangeRejected {
        object: ObjectId,
        name: String,
        error: NativeError,
    },
    AutocenterRejected {
        enabled: bool,
        error: NativeError,
    },
}

impl SessionWarning {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::BestEffort
    }
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AxisRangeRejected { name, error, .. } => {
                write!(f, "axis '{name}' kept its default range: {error}")
            }
            Self::AutocenterRejected { enabled, error } => {
                write!(f, "autocenter {} rejected: {error}", if *enabled { "on" } else { "off" })
            }
        }
    }
}

/// One axis object of the device layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutAxis {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub name: String,
}

/// Axis/button layout discovered by object enumeration.
///
/// `axis_count` and `button_count` count exactly the objects classified as axis or
/// button, once each; objects that are neither (POVs, collections) are left out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AxisButtonLayout {
    pub axis_count: usize,
    pub button_count: usize,
    /// Axes in enumeration order.
    pub axes: Vec<LayoutAxis>,
}

impl AxisButtonLayout {
    /// Axis object ids in enumeration order.
    pub fn axis_object_ids(&self) -> Vec<ObjectId> {
        self.axes.iter().map(|a| a.id).collect()
    }

    pub fn contains_axis(&self, id: ObjectId) -> bool {
        self.axes.iter().any(|a| a.id == id)
    }

    pub fn axis_of_kind(&self, kind: ObjectKind) -> Option<ObjectId> {
        self.axes.iter().find(|a| a.kind == kind).map(|a| a.id)
    }
}

/// Native effects created against a session.
///
/// The session owns every native effect; a binding only knows its slot. Dropping the
/// session frees whatever is still allocated before the device handle goes away.
#[derive(Default)]
pub(crate) struct SessionLink {
    effects: RefCell<Vec<Option<Box<dyn NativeEffect>>>>,
}

impl SessionLink {
    /// Store `effect` in the first free slot.
    pub(crate) fn insert(&self, effect: Box<dyn NativeEffect>) -> usize {
        let mut effects = self.effects.borrow_mut();
        match effects.iter().position(Option::is_none) {
            Some(slot) => {
                effects[slot] = Some(effect);
                slot
            }
            None => {
                effects.push(Some(effect));
                effects.len() - 1
            }
        }
    }

    pub(crate) fn with_effect<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut dyn NativeEffect) -> R,
    ) -> Option<R> {
        let mut effects = self.effects.borrow_mut();
        let effect = effects.get_mut(slot)?.as_mut()?;
        Some(f(&mut **effect))
    }

    pub(crate) fn remove(&self, slot: usize) -> Option<Box<dyn NativeEffect>> {
        self.effects.borrow_mut().get_mut(slot)?.take()
    }

    pub(crate) fn live_effects(&self) -> usize {
        self.effects.borrow().iter().filter(|e| e.is_some()).count()
    }

    /// Free every allocated effect. Returns how many there were.
    fn free_all(&self) -> usize {
        let effects = std::mem::take(&mut *self.effects.borrow_mut());
        let live = effects.iter().filter(|e| e.is_some()).count();
        drop(effects);
        live
    }
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLink")
            .field("live_effects", &self.live_effects())
            .finish()
    }
}

/// `close()` was called while effect bindings were still live.
///
/// Hands the session back so the caller can release its bindings and close again.
#[derive(Debug, thiserror::Error)]
#[error("cannot close '{name}': {live_effects} effect binding(s) still live")]
pub struct CloseRejected {
    pub name: String,
    pub live_effects: usize,
    pub session: DeviceSession,
}

enum AcquireAttempt {
    Acquired,
    Cancelled,
    OtherAppHasPriority,
    Fatal(NativeError),
}

/// One opened device.
pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    device: Box<dyn NativeDevice>,
    config: PollConfig,
    layout: AxisButtonLayout,
    state: SessionState,
    acquired: bool,
    fatal: Option<NativeError>,
    warnings: Vec<SessionWarning>,
    cancel: Option<CancelToken>,
    link: Rc<SessionLink>,
}

impl DeviceSession {
    /// Open `descriptor` and negotiate the canonical joystick data format.
    pub fn open(
        system: &dyn InputSystem,
        descriptor: &DeviceDescriptor,
        config: &PollConfig,
    ) -> Result<Self, DeviceOpenError> {
        let mut device =
            system
                .create_device(&descriptor.id.0)
                .map_err(|source| DeviceOpenError::CreateFailed {
                    name: descriptor.display_name.clone(),
                    source,
                })?;

        device
            .set_data_format(DataFormat::Joystick)
            .map_err(|source| DeviceOpenError::FormatNegotiationFailed {
                name: descriptor.display_name.clone(),
                source,
            })?;

        log::debug!("opened '{}' ({})", descriptor.display_name, descriptor.id.0);

        Ok(Self {
            descriptor: descriptor.clone(),
            device,
            config: config.clone(),
            layout: AxisButtonLayout::default(),
            state: SessionState::Unacquired,
            acquired: false,
            fatal: None,
            warnings: Vec::new(),
            cancel: None,
            link: Rc::new(SessionLink::default()),
        })
    }

    /// Classify every axis and button object and apply the configured axis range.
    ///
    /// Range failures are recorded as warnings; the axis keeps the driver default.
    /// Calling this again rebuilds the layout from scratch.
    pub fn enumerate_objects(&mut self) -> Result<AxisButtonLayout, SessionError> {
        let mut objects: Vec<ObjectInstance> = Vec::new();
        self.device
            .enum_objects(ObjectType::AXIS | ObjectType::BUTTON, &mut |object| {
                objects.push(object.clone());
                EnumFlow::Continue
            })
            .map_err(SessionError::ObjectEnumerationFailed)?;

        let mut layout = AxisButtonLayout::default();
        for object in &objects {
            if self.config.verbose {
                log::info!("{} ({})", object.name, object.kind().label());
            }

            let ty = object.object_type();
            if ty.intersects(ObjectType::AXIS) {
                layout.axis_count += 1;
                layout.axes.push(LayoutAxis {
                    id: object.id,
                    kind: object.kind(),
                    name: object.name.clone(),
                });
                let (min, max) = (self.config.axis_min, self.config.axis_max);
                if let Err(error) = self.device.set_axis_range(object.id, min, max) {
                    let warning = SessionWarning::AxisRangeRejected {
                        object: object.id,
                        name: object.name.clone(),
                        error,
                    };
                    log::warn!("{warning}");
                    self.warnings.push(warning);
                }
            } else if ty.intersects(ObjectType::BUTTON) {
                layout.button_count += 1;
            }
        }

        log::debug!(
            "'{}' has {} buttons and {} axes",
            self.descriptor.display_name,
            layout.button_count,
            layout.axis_count
        );
        self.layout = layout.clone();
        Ok(layout)
    }

    /// Toggle the device's spring-to-center behaviour. Best-effort.
    pub fn set_autocenter(&mut self, enabled: bool) -> Option<SessionWarning> {
        match self.device.set_autocenter(enabled) {
            Ok(()) => None,
            Err(error) => {
                let warning = SessionWarning::AutocenterRejected { enabled, error };
                log::warn!("{warning}");
                self.warnings.push(warning.clone());
                Some(warning)
            }
        }
    }

    /// Acquire the device. A no-op when already acquired.
    pub fn acquire(&mut self) -> Result<(), AcquireError> {
        if let Some(error) = self.fatal {
            return Err(AcquireError::InvalidState(error));
        }
        if self.acquired {
            return Ok(());
        }
        match self.device.acquire() {
            Ok(()) => {
                self.acquired = true;
                self.state = SessionState::Acquired;
                Ok(())
            }
            Err(NativeError::InputLost) => Err(AcquireError::InputLost),
            Err(NativeError::OtherAppHasPriority) => Err(AcquireError::OtherAppHasPriority),
            Err(error) => {
                self.enter_fatal(error);
                Err(AcquireError::InvalidState(error))
            }
        }
    }

    /// Forget a cached acquisition the device has silently dropped.
    pub(crate) fn mark_unacquired(&mut self) {
        self.acquired = false;
        if self.state != SessionState::Fatal {
            self.state = SessionState::Unacquired;
        }
    }

    /// Give up access to the device. The next poll re-acquires it.
    pub fn release(&mut self) {
        if self.acquired {
            if let Err(e) = self.device.unacquire() {
                log::debug!("unacquire '{}' failed: {e}", self.descriptor.display_name);
            }
            self.acquired = false;
        }
        if self.state != SessionState::Fatal {
            self.state = SessionState::Unacquired;
        }
    }

    /// Read one state snapshot, acquiring (or re-acquiring) the device as needed.
    pub fn poll(&mut self) -> Result<PollStatus, PollError> {
        if let Some(error) = self.fatal {
            return Err(PollError::Fatal(self.fatal_reason(error)));
        }

        if self.device.poll().is_ok() {
            self.acquired = true;
        } else {
            self.acquired = false;
            self.state = SessionState::Acquiring;
            match self.acquire_retrying() {
                AcquireAttempt::Acquired => {}
                AcquireAttempt::Cancelled => {
                    self.state = SessionState::Unacquired;
                    return Err(PollError::Cancelled);
                }
                AcquireAttempt::OtherAppHasPriority => {
                    self.state = SessionState::Idle;
                    return Ok(PollStatus::Unavailable(Unavailable::OtherAppHasPriority));
                }
                AcquireAttempt::Fatal(error) => {
                    return Err(PollError::Fatal(self.fatal_reason(error)));
                }
            }
        }

        let mut raw = RawJoyState::default();
        match self.device.device_state(&mut raw) {
            Ok(()) => {
                self.state = SessionState::Acquired;
                Ok(PollStatus::State(JoystickState::from_raw(
                    &raw,
                    self.layout.button_count,
                )))
            }
            Err(e) => {
                log::debug!("state read on '{}' failed: {e}", self.descriptor.display_name);
                self.acquired = false;
                self.state = SessionState::Unacquired;
                Ok(PollStatus::Unavailable(Unavailable::StateLost))
            }
        }
    }

    /// Close the session.
    ///
    /// Every [`EffectBinding`](crate::effect::EffectBinding) created against this session
    /// must be released first; otherwise the session is handed back inside the error.
    pub fn close(mut self) -> Result<(), CloseRejected> {
        let live_effects = self.link.live_effects();
        if live_effects > 0 {
            log::error!(
                "refusing to close '{}' with {live_effects} live effect binding(s)",
                self.descriptor.display_name
            );
            return Err(CloseRejected {
                name: self.descriptor.display_name.clone(),
                live_effects,
                session: self,
            });
        }
        self.release();
        log::debug!("closed '{}'", self.descriptor.display_name);
        Ok(())
    }

    /// Bound the lost-input retry loop by an external cancellation flag.
    pub fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.cancel = token;
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn layout(&self) -> &AxisButtonLayout {
        &self.layout
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Best-effort failures recorded so far.
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    pub fn live_effects(&self) -> usize {
        self.link.live_effects()
    }

    pub(crate) fn device(&self) -> &dyn NativeDevice {
        self.device.as_ref()
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn NativeDevice {
        self.device.as_mut()
    }

    pub(crate) fn link(&self) -> &Rc<SessionLink> {
        &self.link
    }

    fn acquire_retrying(&mut self) -> AcquireAttempt {
        let backoff = Duration::from_micros(self.config.acquire_backoff_us);
        let mut attempts: u64 = 0;
        loop {
            match self.acquire() {
                Ok(()) => return AcquireAttempt::Acquired,
                Err(AcquireError::InputLost) => {
                    attempts += 1;
                    log::trace!("input lost on '{}', retry {attempts}", self.descriptor.display_name);
                    if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                        return AcquireAttempt::Cancelled;
                    }
                    if backoff.is_zero() {
                        std::thread::yield_now();
                    } else {
                        std::thread::sleep(backoff);
                    }
                }
                Err(AcquireError::OtherAppHasPriority) => {
                    return AcquireAttempt::OtherAppHasPriority
                }
                Err(AcquireError::InvalidState(error)) => return AcquireAttempt::Fatal(error),
            }
        }
    }

    fn enter_fatal(&mut self, error: NativeError) {
        log::error!("'{}' entered a fatal state: {error}", self.descriptor.display_name);
        self.fatal = Some(error);
        self.acquired = false;
        self.state = SessionState::Fatal;
    }

    fn fatal_reason(&self, error: NativeError) -> String {
        format!("'{}': {error}", self.descriptor.display_name)
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device", &self.descriptor.display_name)
            .field("state", &self.state)
            .field("acquired", &self.acquired)
            .field("axes", &self.layout.axis_count)
            .field("buttons", &self.layout.button_count)
            .field("live_effects", &self.link.live_effects())
            .finish()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        let live = self.link.free_all();
        if live > 0 {
            log::warn!(
                "'{}' dropped with {live} live effect binding(s); effects freed",
                self.descriptor.display_name
            );
        }
        if self.acquired {
            let _ = self.device.unacquire();
            self.acquired = false;
        }
    }
}
