use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};

use specbar::config::Config;
use specbar::error::PipelineError;
use specbar::pipeline::Pipeline;

/// Keeps the terminal in raw mode for the session and restores it on
/// every exit path, including fatal errors.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run() -> Result<()> {
    let config = Config::default();

    println!("Press q or Ctrl-C to quit");

    let _raw = RawModeGuard::enable()?;
    let mut pipeline = Pipeline::new(config)?;
    pipeline.start()?;

    // Foreground loop: watch for a quit key while both pipeline threads
    // do the work. A dead pipeline drops us out to collect its error.
    while pipeline.is_running() {
        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if is_quit(&key) {
                    break;
                }
            }
        }
    }

    pipeline.stop()
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

/// Exit status by error kind: device 2, malformed frame 3, render 4,
/// anything else 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Device(_)) => 2,
        Some(PipelineError::MalformedFrame { .. }) => 3,
        Some(PipelineError::Render(_)) => 4,
        None => 1,
    }
}
