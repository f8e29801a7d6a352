use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::monitor::metrics::HostResult;

/// Spinner cadence; also the upper bound on input-to-redraw latency.
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(150);

/// Everything the model reacts to, merged into one mailbox and consumed
/// sequentially by the UI thread.
#[derive(Debug)]
pub enum AppEvent {
    /// Time to start a collection cycle.
    Tick,
    /// Advance spinner animation and redraw.
    SpinnerTick,
    Key(KeyEvent),
    Resize(u16, u16),
    /// One host finished its collection for this cycle.
    Host(HostResult),
    /// The cycle's channel closed; exactly one per dispatched cycle.
    CycleFinished { elapsed_ms: u64 },
}

pub type EventSender = mpsc::Sender<AppEvent>;
pub type EventReceiver = mpsc::Receiver<AppEvent>;

/// Merges crossterm input with the two clocks. The refresh tick fires
/// immediately on start so the dashboard does not sit empty for a full
/// delay interval.
pub fn spawn_event_thread(sender: EventSender, delay_interval: Duration) {
    thread::spawn(move || {
        let mut next_spinner = Instant::now() + SPINNER_INTERVAL;
        let mut next_tick = Instant::now();

        loop {
            let now = Instant::now();
            if now >= next_tick {
                next_tick = now + delay_interval;
                if sender.send(AppEvent::Tick).is_err() {
                    return;
                }
            }
            if now >= next_spinner {
                next_spinner = now + SPINNER_INTERVAL;
                if sender.send(AppEvent::SpinnerTick).is_err() {
                    return;
                }
            }

            let wait = next_spinner.min(next_tick).saturating_duration_since(now);
            match event::poll(wait) {
                Ok(true) => match event::read() {
                    Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                        if sender.send(AppEvent::Key(key)).is_err() {
                            return;
                        }
                    }
                    Ok(CrosstermEvent::Resize(width, height)) => {
                        if sender.send(AppEvent::Resize(width, height)).is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => return,
                },
                Ok(false) => {}
                Err(_) => return,
            }
        }
    });
}

/// Raw-mode + alternate-screen guard. Restores the terminal on drop so a
/// panic unwinding through main leaves the shell usable.
pub struct Tui {
    pub terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        return Ok(Tui { terminal });
    }

    pub fn size(&self) -> (u16, u16) {
        let size = self.terminal.size().unwrap_or_default();
        return (size.width, size.height);
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Also called from the panic hook, where no Tui value is reachable.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}
