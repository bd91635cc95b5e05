use std::fmt::Write as _;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;

use stickprobe::backends::{self, virtual_input::VirtualInput};
use stickprobe::device::{InputSystem, ObjectKind};
use stickprobe::{
    CancelToken, DeliveryMode, Direction, DeviceCatalog, DeviceFilter, DeviceSession,
    EffectBinding, EffectCatalog, EffectParameters, JoystickState, LoopOutcome, PollLoop,
    ProbeConfig, Repeat,
};

/// Game controller diagnostics: list devices, dump their state, test force feedback.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Poll interval in microseconds; 0 only lists devices
    #[arg(short = 'p', long = "poll", value_name = "US")]
    poll_us: Option<u64>,

    /// Upper bound of every axis
    #[arg(short = 'a', long, allow_negative_numbers = true)]
    axis_max: Option<i32>,

    /// Lower bound of every axis
    #[arg(short = 'i', long, allow_negative_numbers = true)]
    axis_min: Option<i32>,

    /// Index of the joystick to use, as shown by --list
    #[arg(short = 'j', long)]
    joystick: Option<usize>,

    /// Only list attached joysticks
    #[arg(short, long)]
    list: bool,

    /// Dump every device object and log debug output
    #[arg(short, long)]
    verbose: bool,

    /// TOML file with defaults; command-line flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Play every supported force-feedback effect once
    #[arg(long)]
    ff: bool,

    /// Print snapshots and listings as JSON lines
    #[arg(long)]
    json: bool,

    /// Hold back state output until a button is pressed
    #[arg(long, conflicts_with = "no_wait")]
    wait: bool,

    /// Print state from the first poll on
    #[arg(long)]
    no_wait: bool,

    /// Use built-in virtual devices instead of the platform backend
    #[arg(long = "virtual")]
    use_virtual: bool,
}

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

enum Mode {
    List,
    Poll,
    ForceFeedback,
}

fn resolve(cli: &Cli) -> Result<(ProbeConfig, Mode), stickprobe::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(us) = cli.poll_us {
        config.poll.interval_us = us;
        config.list_only = us == 0;
    }
    let poll = &mut config.poll;
    if let Some(max) = cli.axis_max {
        poll.axis_max = max;
    }
    if let Some(min) = cli.axis_min {
        poll.axis_min = min;
    }
    if let Some(j) = cli.joystick {
        poll.chosen_device_index = j;
    }
    poll.verbose |= cli.verbose;
    poll.validate()?;

    if cli.wait {
        config.wait_for_press = true;
    } else if cli.no_wait {
        config.wait_for_press = false;
    }
    if cli.list {
        config.list_only = true;
    }

    let mode = if cli.ff {
        config.force_feedback_only = true;
        if config.autocenter.is_none() {
            config.autocenter = Some(false);
        }
        Mode::ForceFeedback
    } else if config.list_only {
        Mode::List
    } else {
        Mode::Poll
    };
    Ok((config, mode))
}

fn format_state(state: &JoystickState) -> String {
    let pov = |i: usize| state.pov[i].map_or(-1, |p| p as i64);
    let mut out = String::new();
    let _ = writeln!(out, "----------------------------------");
    let _ = writeln!(
        out,
        "Ax: ({:5},{:5},{:5})\tRAx: ({:5},{:5},{:5})",
        state.axes[0], state.axes[1], state.axes[2], state.axes[3], state.axes[4], state.axes[5]
    );
    let _ = writeln!(
        out,
        "Slider: ({:5},{:5})\tPov: ({:5},{:5},{:5},{:5})",
        state.sliders[0],
        state.sliders[1],
        pov(0),
        pov(1),
        pov(2),
        pov(3)
    );
    out.push('\n');
    for i in 0..state.buttons.len() {
        let _ = write!(out, "{i:3}");
    }
    out.push('\n');
    for &pressed in &state.buttons {
        let _ = write!(out, "  {}", if pressed { 'x' } else { 'o' });
    }
    out
}

fn filter_for(config: &ProbeConfig) -> DeviceFilter {
    if config.force_feedback_only {
        DeviceFilter::force_feedback()
    } else {
        DeviceFilter::game_controllers()
    }
}

fn list(system: &dyn InputSystem, config: &ProbeConfig, json: bool) -> BoxResult<()> {
    let devices = DeviceCatalog::new(system).enumerate(&filter_for(config))?;
    if json {
        println!("{}", serde_json::to_string(&devices)?);
        return Ok(());
    }
    println!("Found {} joysticks.", devices.len());
    for (i, device) in devices.iter().enumerate() {
        let ff = if device.supports_force_feedback { " [FF]" } else { "" };
        println!("{i}: {}{ff}", device.display_name);
    }
    Ok(())
}

fn open(system: &dyn InputSystem, config: &ProbeConfig) -> BoxResult<DeviceSession> {
    let descriptor = DeviceCatalog::new(system)
        .select(&filter_for(config), config.poll.chosen_device_index)?;
    let mut session = DeviceSession::open(system, &descriptor, &config.poll)?;
    session.enumerate_objects()?;
    if let Some(enabled) = config.autocenter {
        // Rejection is logged by the session.
        let _ = session.set_autocenter(enabled);
    }
    Ok(session)
}

fn poll(
    system: &dyn InputSystem,
    config: &ProbeConfig,
    json: bool,
    cancel: &CancelToken,
) -> BoxResult<LoopOutcome> {
    let mut session = open(system, config)?;
    let layout = session.layout();
    if !json {
        println!("Polling input from '{}'", session.descriptor().display_name);
        println!(
            "Joystick has {} buttons and {} axes",
            layout.button_count, layout.axis_count
        );
        if config.wait_for_press {
            println!("Press any joystick key");
        }
    }

    let mode = if config.wait_for_press {
        DeliveryMode::WaitForFirstPress
    } else {
        DeliveryMode::Continuous
    };
    let mut sink = |state: &JoystickState| -> ControlFlow<()> {
        if json {
            match serde_json::to_string(state) {
                Ok(line) => println!("{line}"),
                Err(e) => log::error!("failed to serialize state: {e}"),
            }
        } else {
            println!("{}", format_state(state));
        }
        ControlFlow::Continue(())
    };
    let outcome = PollLoop::run(&mut session, &mut sink, mode, cancel);
    session.close()?;
    Ok(outcome)
}

fn force_feedback(
    system: &dyn InputSystem,
    config: &ProbeConfig,
    json: bool,
    cancel: &CancelToken,
) -> BoxResult<LoopOutcome> {
    let mut session = open(system, config)?;
    let effects = EffectCatalog::enumerate(&session)?;
    if json {
        println!("{}", serde_json::to_string(&effects)?);
    } else {
        println!(
            "'{}' supports {} effect type(s)",
            session.descriptor().display_name,
            effects.len()
        );
    }

    let axis = session
        .layout()
        .axis_of_kind(ObjectKind::XAxis)
        .or_else(|| session.layout().axes.first().map(|a| a.id));
    let Some(axis) = axis else {
        log::error!("'{}' has no axis to bind effects to", session.descriptor().display_name);
        session.close()?;
        return Ok(LoopOutcome::Failed("no force-feedback axis".into()));
    };

    let dwell = Duration::from_millis(config.effect_dwell_ms);
    for effect in &effects {
        if cancel.is_cancelled() {
            break;
        }
        if !json {
            println!("{} ({}) {:?}", effect.kind, effect.name, effect.classification);
        }
        let Some(params) = EffectParameters::test_defaults(effect) else {
            log::info!("skipping {}: parameters not modelled", effect.kind);
            continue;
        };
        // On a single axis only the sign of the cartesian component matters.
        let params = params.with_direction(Direction::cartesian(&[200]));

        let mut binding = match EffectBinding::create(&mut session, effect, params, &[axis]) {
            Ok(binding) => binding,
            Err(e) => {
                log::warn!("could not create {}: {e}", effect.kind);
                continue;
            }
        };
        if let Err(e) = binding.start(Repeat::ONCE) {
            log::warn!("could not start {}: {e}", effect.kind);
        } else {
            let until = Instant::now() + dwell;
            while Instant::now() < until && !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(10).min(dwell));
            }
        }
        binding.release()?;
    }

    session.close()?;
    Ok(if cancel.is_cancelled() {
        LoopOutcome::Cancelled
    } else {
        LoopOutcome::Completed
    })
}

fn run(cli: Cli, cancel: &CancelToken) -> BoxResult<LoopOutcome> {
    let (config, mode) = resolve(&cli)?;
    log::debug!("effective config: {config:?}");

    let system: Box<dyn InputSystem> = if cli.use_virtual {
        Box::new(VirtualInput::demo())
    } else {
        backends::default_system()?
    };

    match mode {
        Mode::List => list(system.as_ref(), &config, cli.json).map(|()| LoopOutcome::Completed),
        Mode::Poll => poll(system.as_ref(), &config, cli.json, cancel),
        Mode::ForceFeedback => force_feedback(system.as_ref(), &config, cli.json, cancel),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = stickprobe::logging::setup(cli.verbose) {
        eprintln!("failed to set up logging: {e}");
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Ctrl-C handler not installed: {e}");
    }

    match run(cli, &cancel) {
        Ok(outcome) => ExitCode::from(outcome.exit_code() as u8),
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from(["stickprobe", "-p", "20000", "-a", "500", "-i", "-500", "-j", "1"]);
        let (config, mode) = resolve(&cli).unwrap();
        assert!(matches!(mode, Mode::Poll));
        assert_eq!(config.poll.interval_us, 20000);
        assert_eq!((config.poll.axis_min, config.poll.axis_max), (-500, 500));
        assert_eq!(config.poll.chosen_device_index, 1);
    }

    #[test]
    fn zero_interval_lists() {
        let cli = Cli::parse_from(["stickprobe"]);
        assert!(matches!(resolve(&cli).unwrap().1, Mode::List));
        let cli = Cli::parse_from(["stickprobe", "-p", "0"]);
        assert!(matches!(resolve(&cli).unwrap().1, Mode::List));
    }

    #[test]
    fn ff_mode_disables_autocenter() {
        let cli = Cli::parse_from(["stickprobe", "--ff"]);
        let (config, mode) = resolve(&cli).unwrap();
        assert!(matches!(mode, Mode::ForceFeedback));
        assert!(config.force_feedback_only);
        assert_eq!(config.autocenter, Some(false));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let cli = Cli::parse_from(["stickprobe", "-a", "-10", "-i", "10"]);
        assert!(resolve(&cli).is_err());
    }

    #[test]
    fn state_dump_matches_classic_layout() {
        let state = JoystickState {
            axes: [1, -2, 3, 0, 0, 1000],
            sliders: [0, 0],
            pov: [Some(9000), None, None, None],
            buttons: vec![false, true],
        };
        let dump = format_state(&state);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[1], "Ax: (    1,   -2,    3)\tRAx: (    0,    0, 1000)");
        assert_eq!(lines[2], "Slider: (    0,    0)\tPov: ( 9000,   -1,   -1,   -1)");
        assert_eq!(lines[4], "  0  1");
        assert_eq!(lines[5], "  o  x");
    }

    #[test]
    fn virtual_ff_run_completes() {
        let cli = Cli::parse_from(["stickprobe", "--virtual", "--ff"]);
        let (mut config, _) = resolve(&cli).unwrap();
        config.effect_dwell_ms = 0;
        let outcome = force_feedback(&VirtualInput::demo(), &config, true, &CancelToken::new()).unwrap();
        assert_eq!(outcome, LoopOutcome::Completed);
    }
}
