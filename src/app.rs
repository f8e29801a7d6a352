use anyhow::Result;
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::HistoryStore;
use crate::monitor::metrics::{
    HostConnectionState, HostLockInfo, HostMetrics, HostResult, HostStatus,
};
use crate::monitor::{Worker, WorkerEvent};
use crate::tui::{AppEvent, EventReceiver, Tui};
use crate::view;
use crate::view::theme::Palette;

/// Cyclic via the `s` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Online hosts first, configuration order within each group.
    Default,
    Name,
    Cpu,
    Ram,
    Gpu,
}

impl SortOrder {
    pub fn next(self) -> Self {
        return match self {
            SortOrder::Default => SortOrder::Name,
            SortOrder::Name => SortOrder::Cpu,
            SortOrder::Cpu => SortOrder::Ram,
            SortOrder::Ram => SortOrder::Gpu,
            SortOrder::Gpu => SortOrder::Default,
        };
    }

    pub fn label(&self) -> &'static str {
        return match self {
            SortOrder::Default => "default",
            SortOrder::Name => "name",
            SortOrder::Cpu => "cpu",
            SortOrder::Ram => "ram",
            SortOrder::Gpu => "gpu",
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Minimal,
    Compact,
    Standard,
    Wide,
}

impl LayoutMode {
    pub fn for_width(width: u16) -> Self {
        if width < 80 {
            return LayoutMode::Minimal;
        }
        if width < 120 {
            return LayoutMode::Compact;
        }
        if width < 160 {
            return LayoutMode::Standard;
        }
        return LayoutMode::Wide;
    }

    pub fn cards_per_row(&self) -> usize {
        return match self {
            LayoutMode::Minimal | LayoutMode::Compact => 1,
            LayoutMode::Standard | LayoutMode::Wide => 2,
        };
    }
}

/// Everything the model tracks for one host.
#[derive(Debug, Clone)]
pub struct HostState {
    pub status: HostStatus,
    pub metrics: Option<HostMetrics>,
    pub lock_info: Option<HostLockInfo>,
    pub connection: HostConnectionState,
    pub connected_via: String,
    pub latency: Option<Duration>,
}

impl Default for HostState {
    fn default() -> Self {
        return HostState {
            status: HostStatus::Connecting,
            metrics: None,
            lock_info: None,
            connection: HostConnectionState::default(),
            connected_via: String::new(),
            latency: None,
        };
    }
}

impl HostState {
    pub fn is_online(&self) -> bool {
        return matches!(
            self.status,
            HostStatus::Idle | HostStatus::Running | HostStatus::Slow
        );
    }
}

/// The dashboard model: owns all per-host state, selection, sort, layout
/// and spinner; consumes the merged event mailbox sequentially.
pub struct App {
    pub palette: Palette,
    /// Configuration order; the base every sort starts from.
    pub hosts: Vec<String>,
    pub host_states: HashMap<String, HostState>,
    pub history: Arc<HistoryStore>,

    pub sort_order: SortOrder,
    /// Display order, derived by `resort`.
    pub sorted_hosts: Vec<String>,
    /// Selection follows the host, not the index.
    pub selected: Option<String>,
    pub expanded: bool,
    pub show_help: bool,
    pub detail_scroll: u16,

    pub spinner_frame: usize,
    pub terminal_size: (u16, u16),
    pub delay_interval: Duration,

    cycle_running: bool,
    pub last_cycle_ms: Option<u64>,
    cycle_failures: usize,
    pub last_cycle_failures: usize,

    should_quit: bool,
}

impl App {
    pub fn new(hosts: Vec<String>, history: Arc<HistoryStore>, delay_interval: Duration) -> Self {
        let host_states = hosts
            .iter()
            .map(|alias| (alias.clone(), HostState::default()))
            .collect();
        let selected = hosts.first().cloned();
        return App {
            palette: Palette::default(),
            sorted_hosts: hosts.clone(),
            hosts,
            host_states,
            history,
            sort_order: SortOrder::Default,
            selected,
            expanded: false,
            show_help: false,
            detail_scroll: 0,
            spinner_frame: 0,
            terminal_size: (80, 24),
            delay_interval,
            cycle_running: false,
            last_cycle_ms: None,
            cycle_failures: 0,
            last_cycle_failures: 0,
            should_quit: false,
        };
    }

    pub fn run(&mut self, tui: &mut Tui, events: EventReceiver, worker: &Worker) -> Result<()> {
        self.terminal_size = tui.size();

        while !self.should_quit {
            tui.terminal.draw(|frame| view::draw(frame, self))?;
            match events.recv() {
                Ok(event) => self.handle_event(event, worker),
                Err(_) => break,
            }
        }
        return Ok(());
    }

    fn handle_event(&mut self, event: AppEvent, worker: &Worker) {
        match event {
            AppEvent::Tick => self.request_refresh(worker),
            AppEvent::SpinnerTick => {
                self.spinner_frame = self.spinner_frame.wrapping_add(1);
            }
            AppEvent::Key(key) => self.handle_key(key, worker),
            AppEvent::Resize(width, height) => {
                self.terminal_size = (width, height);
            }
            AppEvent::Host(result) => self.apply_result(result),
            AppEvent::CycleFinished { elapsed_ms } => {
                self.cycle_running = false;
                self.last_cycle_ms = Some(elapsed_ms);
                self.last_cycle_failures = self.cycle_failures;
                log::debug!(
                    "cycle finished in {}ms ({} failures)",
                    elapsed_ms,
                    self.cycle_failures
                );
            }
        }
    }

    /// A new cycle starts only when no cycle is in flight, so cycles never
    /// overlap however slow the fleet is.
    fn request_refresh(&mut self, worker: &Worker) {
        if self.cycle_running || self.should_quit {
            return;
        }
        self.cycle_running = true;
        self.cycle_failures = 0;
        worker.send(WorkerEvent::Collect);
    }

    fn handle_key(&mut self, key: KeyEvent, worker: &Worker) {
        // Ctrl-modified bindings first
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => self.should_quit = true,
                KeyCode::Char('u') => self.scroll_detail(-5),
                KeyCode::Char('d') => self.scroll_detail(5),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => self.request_refresh(worker),
            KeyCode::Char('s') => {
                self.sort_order = self.sort_order.next();
                self.resort();
            }
            KeyCode::Char('?') => self.show_help = !self.show_help,
            KeyCode::Esc => {
                if self.show_help {
                    self.show_help = false;
                } else if self.expanded {
                    self.expanded = false;
                    self.detail_scroll = 0;
                }
            }
            KeyCode::Enter => {
                if self.selected.is_some() {
                    self.expanded = true;
                    self.detail_scroll = 0;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-(self.cards_per_row() as isize));
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(self.cards_per_row() as isize);
            }
            KeyCode::Left | KeyCode::Char('h') => self.move_selection(-1),
            KeyCode::Right | KeyCode::Char('l') => self.move_selection(1),
            KeyCode::Home => self.select_index(0),
            KeyCode::End => {
                if !self.sorted_hosts.is_empty() {
                    self.select_index(self.sorted_hosts.len() - 1);
                }
            }
            KeyCode::PageUp => self.scroll_detail(-10),
            KeyCode::PageDown => self.scroll_detail(10),
            _ => {}
        }
    }

    pub fn apply_result(&mut self, result: HostResult) {
        let state = self.host_states.entry(result.alias.clone()).or_default();
        state.connection.last_attempt = Some(Local::now());

        match result.error {
            Some(error) => {
                log::debug!("{}: {}", result.alias, error);
                state.status = HostStatus::Unreachable;
                state.connection.attempts += 1;
                state.connection.last_error = Some(error);
                self.cycle_failures += 1;
            }
            None => {
                state.connection.attempts = 0;
                state.connection.last_error = None;
                state.connection.connected = true;
                state.connected_via = result.connected_via;
                state.latency = result.latency;

                let locked = result
                    .lock_info
                    .as_ref()
                    .map(|lock| lock.is_locked)
                    .unwrap_or(false);
                state.status = if locked {
                    HostStatus::Running
                } else {
                    HostStatus::Idle
                };
                state.lock_info = result.lock_info;

                self.history.push(&result.alias, result.metrics.as_ref());
                let state = self.host_states.get_mut(&result.alias).unwrap();
                state.metrics = result.metrics;
            }
        }

        self.resort();
    }

    /// Rebuilds the display order from the configuration order, so sorting
    /// is deterministic and re-sorting is idempotent. Stable sorts keep
    /// the configuration order inside equal groups.
    pub fn resort(&mut self) {
        let mut sorted = self.hosts.clone();

        match self.sort_order {
            SortOrder::Default => {
                sorted.sort_by_key(|alias| !self.state(alias).is_online());
            }
            SortOrder::Name => {
                sorted.sort();
            }
            SortOrder::Cpu => {
                self.sort_by_metric(&mut sorted, |metrics| Some(metrics.cpu.percent));
            }
            SortOrder::Ram => {
                self.sort_by_metric(&mut sorted, |metrics| {
                    if metrics.ram.total_bytes > 0 {
                        return Some(metrics.ram.percent());
                    }
                    return None;
                });
            }
            SortOrder::Gpu => {
                self.sort_by_metric(&mut sorted, |metrics| {
                    return metrics.gpu.as_ref().map(|gpu| gpu.percent);
                });
            }
        }

        self.sorted_hosts = sorted;

        // Selection follows the alias; it only moves if its host vanished
        let still_there = self
            .selected
            .as_ref()
            .map(|alias| self.sorted_hosts.contains(alias))
            .unwrap_or(false);
        if !still_there {
            self.selected = self.sorted_hosts.first().cloned();
        }
    }

    /// Descending by the extracted value; hosts without one go last.
    fn sort_by_metric<F>(&self, sorted: &mut [String], value: F)
    where
        F: Fn(&HostMetrics) -> Option<f64>,
    {
        sorted.sort_by(|a, b| {
            let value_a = self.state(a).metrics.as_ref().and_then(&value);
            let value_b = self.state(b).metrics.as_ref().and_then(&value);
            return match (value_a, value_b) {
                (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
        });
    }

    fn state(&self, alias: &str) -> HostState {
        return self.host_states.get(alias).cloned().unwrap_or_default();
    }

    pub fn layout_mode(&self) -> LayoutMode {
        return LayoutMode::for_width(self.terminal_size.0);
    }

    pub fn cards_per_row(&self) -> usize {
        return self.layout_mode().cards_per_row();
    }

    pub fn footer_visible(&self) -> bool {
        return self.terminal_size.1 >= 24;
    }

    fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_ref()?;
        return self.sorted_hosts.iter().position(|alias| alias == selected);
    }

    fn move_selection(&mut self, delta: isize) {
        if self.sorted_hosts.is_empty() {
            return;
        }
        let current = self.selected_index().unwrap_or(0) as isize;
        let target = (current + delta).clamp(0, self.sorted_hosts.len() as isize - 1);
        self.select_index(target as usize);
    }

    fn select_index(&mut self, index: usize) {
        if let Some(alias) = self.sorted_hosts.get(index) {
            self.selected = Some(alias.clone());
            self.detail_scroll = 0;
        }
    }

    fn scroll_detail(&mut self, delta: i16) {
        if !self.expanded {
            return;
        }
        self.detail_scroll = self.detail_scroll.saturating_add_signed(delta);
    }

    pub fn status_counts(&self) -> (usize, usize, usize, usize) {
        let mut online = 0;
        let mut running = 0;
        let mut connecting = 0;
        let mut unreachable = 0;
        for alias in &self.hosts {
            match self.state(alias).status {
                HostStatus::Idle | HostStatus::Slow => online += 1,
                HostStatus::Running => {
                    online += 1;
                    running += 1;
                }
                HostStatus::Connecting => connecting += 1,
                HostStatus::Unreachable => unreachable += 1,
            }
        }
        return (online, running, connecting, unreachable);
    }

    /// "Linking up" with 0..3 trailing dots, cycling at a third of the
    /// spinner cadence.
    pub fn connecting_text(&self) -> String {
        return format!("Linking up{}", ".".repeat((self.spinner_frame / 3) % 4));
    }
}
