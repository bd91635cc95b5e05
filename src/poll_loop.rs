//! The poll loop: repeatedly poll one session and hand each state to a sink.

use std::ops::ControlFlow;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::PollError;
use crate::session::{DeviceSession, PollStatus};
use crate::snapshot::JoystickState;

/// Receives every delivered joystick state.
///
/// Returning [`ControlFlow::Break`] ends the loop with [`LoopOutcome::Completed`].
pub trait StateSink {
    fn on_state(&mut self, state: &JoystickState) -> ControlFlow<()>;
}

impl<F> StateSink for F
where
    F: FnMut(&JoystickState) -> ControlFlow<()>,
{
    fn on_state(&mut self, state: &JoystickState) -> ControlFlow<()> {
        self(state)
    }
}

/// Holds back states until one has a button down.
///
/// The pressing state itself is admitted; from then on everything passes.
#[derive(Debug, Default)]
pub struct FirstPressGate {
    open: bool,
}

impl FirstPressGate {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn admit(&mut self, state: &JoystickState) -> bool {
        if !self.open && state.any_pressed() {
            log::debug!("first button press seen, delivering states");
            self.open = true;
        }
        self.open
    }
}

/// When states start flowing to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Continuous,
    WaitForFirstPress,
}

/// How a loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The sink asked to stop.
    Completed,
    /// The session failed fatally.
    Failed(String),
    Cancelled,
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed | Self::Cancelled => 0,
            Self::Failed(_) => 1,
        }
    }
}

/// Drives one session until the sink stops, the token is cancelled or the session fails.
pub struct PollLoop;

impl PollLoop {
    /// Run the loop on the calling thread.
    ///
    /// Each iteration checks `cancel`, polls once, delivers any state, then sleeps for
    /// the session's `interval_us` (no sleep when zero). Unavailable polls are simply retried on
    /// the next iteration. The token is also installed into the session so a lost-input
    /// retry inside a single poll stops promptly.
    pub fn run(
        session: &mut DeviceSession,
        sink: &mut dyn StateSink,
        mode: DeliveryMode,
        cancel: &CancelToken,
    ) -> LoopOutcome {
        session.set_cancel_token(Some(cancel.clone()));
        let gate = match mode {
            DeliveryMode::Continuous => None,
            DeliveryMode::WaitForFirstPress => Some(FirstPressGate::default()),
        };
        let outcome = Self::drive(session, sink, gate, cancel);
        session.set_cancel_token(None);
        log::debug!("poll loop on '{}' ended: {outcome:?}", session.descriptor().display_name);
        outcome
    }

    fn drive(
        session: &mut DeviceSession,
        sink: &mut dyn StateSink,
        mut gate: Option<FirstPressGate>,
        cancel: &CancelToken,
    ) -> LoopOutcome {
        let interval = Duration::from_micros(session.config().interval_us);
        loop {
            if cancel.is_cancelled() {
                return LoopOutcome::Cancelled;
            }

            match session.poll() {
                Ok(PollStatus::State(state)) => {
                    let admitted = gate.as_mut().map_or(true, |g| g.admit(&state));
                    if admitted && sink.on_state(&state).is_break() {
                        return LoopOutcome::Completed;
                    }
                }
                Ok(PollStatus::Unavailable(reason)) => {
                    log::trace!("no state this iteration: {reason:?}");
                }
                Err(PollError::Cancelled) => return LoopOutcome::Cancelled,
                Err(PollError::Fatal(reason)) => {
                    log::error!("polling stopped: {reason}");
                    return LoopOutcome::Failed(reason);
                }
            }

            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{VirtualDevice, VirtualInput};
    use crate::catalog::{DeviceCatalog, DeviceFilter};
    use crate::config::PollConfig;
    use crate::device::NativeError;

    fn open(stick: &VirtualDevice) -> DeviceSession {
        open_with(stick, &PollConfig::default())
    }

    fn open_with(stick: &VirtualDevice, config: &PollConfig) -> DeviceSession {
        let system = VirtualInput::new().with_device(stick.clone());
        let descriptor = DeviceCatalog::new(&system)
            .select(&DeviceFilter::default(), 0)
            .unwrap();
        let mut session = DeviceSession::open(&system, &descriptor, config).unwrap();
        session.enumerate_objects().unwrap();
        session
    }

    #[test]
    fn sink_break_completes() {
        let stick = VirtualDevice::joystick("Stick");
        let mut session = open(&stick);
        let mut seen = 0;
        let mut sink = |_: &JoystickState| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::Continuous,
            &CancelToken::new(),
        );
        assert_eq!(outcome, LoopOutcome::Completed);
        assert_eq!(seen, 3);
    }

    #[test]
    fn sleeps_for_the_interval_the_session_was_opened_with() {
        let stick = VirtualDevice::joystick("Stick");
        let config = PollConfig {
            interval_us: 5_000,
            ..PollConfig::default()
        };
        let mut session = open_with(&stick, &config);
        let mut seen = 0;
        let mut sink = |_: &JoystickState| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let started = std::time::Instant::now();
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::Continuous,
            &CancelToken::new(),
        );
        assert_eq!(outcome, LoopOutcome::Completed);
        // Two pauses separate three deliveries.
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn cancelled_before_start_polls_nothing() {
        let stick = VirtualDevice::joystick("Stick");
        let mut session = open(&stick);
        let token = CancelToken::new();
        token.cancel();
        let mut sink = |_: &JoystickState| -> ControlFlow<()> { panic!("no state expected") };
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::Continuous,
            &token,
        );
        assert_eq!(outcome, LoopOutcome::Cancelled);
        assert_eq!(stick.acquire_calls(), 0);
    }

    #[test]
    fn waits_for_first_press() {
        let stick = VirtualDevice::joystick("Stick").with_buttons(4);
        for _ in 0..3 {
            stick.queue_state(Ok(Default::default()));
        }
        let mut pressed = crate::device::RawJoyState::default();
        pressed.buttons[2] = 0x80;
        stick.queue_state(Ok(pressed));

        let mut session = open(&stick);
        let mut delivered = Vec::new();
        let mut sink = |state: &JoystickState| {
            delivered.push(state.pressed().collect::<Vec<_>>());
            if delivered.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::WaitForFirstPress,
            &CancelToken::new(),
        );
        assert_eq!(outcome, LoopOutcome::Completed);
        // The pressing state comes first; the next one is delivered even with nothing held.
        assert_eq!(delivered[0], vec![2]);
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn fatal_session_fails_the_loop() {
        let stick = VirtualDevice::joystick("Stick");
        stick.queue_acquire(Err(NativeError::InvalidParam));
        let mut session = open(&stick);
        let mut sink = |_: &JoystickState| -> ControlFlow<()> { ControlFlow::Continue(()) };
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::Continuous,
            &CancelToken::new(),
        );
        assert!(matches!(outcome, LoopOutcome::Failed(_)));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn priority_contention_is_retried() {
        let stick = VirtualDevice::joystick("Stick");
        stick.queue_acquire(Err(NativeError::OtherAppHasPriority));
        stick.queue_acquire(Err(NativeError::OtherAppHasPriority));
        let mut session = open(&stick);
        let mut sink = |_: &JoystickState| -> ControlFlow<()> { ControlFlow::Break(()) };
        let outcome = PollLoop::run(
            &mut session,
            &mut sink,
            DeliveryMode::Continuous,
            &CancelToken::new(),
        );
        assert_eq!(outcome, LoopOutcome::Completed);
        assert_eq!(stick.acquire_calls(), 3);
    }

    #[test]
    fn gate_holds_back_idle_states() {
        let mut gate = FirstPressGate::default();
        let idle = JoystickState::default();
        assert!(!gate.admit(&idle));
        let pressed = JoystickState {
            buttons: vec![true],
            ..JoystickState::default()
        };
        assert!(gate.admit(&pressed));
        assert!(gate.admit(&idle));
        assert!(gate.is_open());
    }
}
