use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::loader::{LoadController, RefreshHandle};
use crate::store::StoreHandle;
use crate::ui;

pub mod state;

pub use state::{
    AppState, FacetItem, FacetKind, FacetPicker, LoadState, Navigator, OverlayState, SeedActivated,
};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    StartSearch,
    CycleSort,
    ClearFilters,
    Refresh,
    OpenTagPicker,
    OpenCategoryPicker,
    ActivateSeed,
}

/// Default navigator: reports the activation in the status line and the
/// log. Embedders supply their own to route into a detail view.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn open_seed(&mut self, event: &SeedActivated) {
        tracing::info!(id = %event.id, slug = ?event.slug, "seed activated");
    }
}

pub struct App {
    pub config: Arc<AppConfig>,
    state: AppState,
    list_state: ListState,
    controller: LoadController<StoreHandle>,
    refresh: RefreshHandle,
    navigator: Box<dyn Navigator>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, store: StoreHandle, navigator: Box<dyn Navigator>) -> Self {
        let state = AppState::new(config.default_sort, config.preview_lines as usize);
        let mut controller = LoadController::new(store);
        let refresh = controller.refresh_handle();
        controller.request_refresh();
        Self {
            config,
            state,
            list_state: ListState::default(),
            controller,
            refresh,
            navigator,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        }
    }

    /// Handle an embedder can invoke to schedule a reload from outside the
    /// event loop; the request is picked up on the next tick.
    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| ui::draw_app(frame, &mut self.state, &mut self.list_state))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Resize(_, _) => {
                        // no-op: next draw will naturally adapt to the new size
                    }
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        let outcome = self.controller.poll();
        // A reload requested through the refresh handle starts inside poll;
        // mirror it in the view state.
        if self.controller.is_loading() && !self.state.is_loading() {
            self.state.begin_refresh();
        }
        if let Some(outcome) = outcome {
            self.state.apply_outcome(outcome);
            if let Some(message) = self.state.load_error() {
                let message = format!("Load failed: {message}");
                self.state.set_status_message(Some(message));
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.search_active {
            match key.code {
                KeyCode::Esc => {
                    self.state.cancel_search();
                    return;
                }
                KeyCode::Enter => {
                    self.state.finish_search();
                    return;
                }
                KeyCode::Backspace => {
                    self.state.pop_search_char();
                    return;
                }
                KeyCode::Char(ch)
                    if !key.modifiers.intersects(
                        KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                    ) =>
                {
                    self.state.push_search_char(ch);
                    return;
                }
                _ => {}
            }
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Refresh)
            }
            KeyCode::Enter => Some(Action::ActivateSeed),
            KeyCode::Char('s')
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                Some(Action::CycleSort)
            }
            KeyCode::Char('x')
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                Some(Action::ClearFilters)
            }
            KeyCode::Char('t')
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                Some(Action::OpenTagPicker)
            }
            KeyCode::Char('c')
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                Some(Action::OpenCategoryPicker)
            }
            KeyCode::Char('/')
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                Some(Action::StartSearch)
            }
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.move_selection(1),
            Action::SelectPrevious => self.state.move_selection(-1),
            Action::StartSearch => {
                self.state.begin_search();
            }
            Action::CycleSort => {
                let mode = self.state.cycle_sort();
                self.state
                    .set_status_message(Some(format!("Sorting by {mode}")));
            }
            Action::ClearFilters => {
                self.state.clear_filters();
                self.state.set_status_message(Some("Filters cleared"));
            }
            Action::Refresh => {
                self.state.begin_refresh();
                self.controller.request_refresh();
                self.state.set_status_message(Some("Refreshing seeds"));
            }
            Action::OpenTagPicker => {
                self.state.open_facet_picker(FacetKind::Tag);
                self.state.set_status_message(Some(
                    "Tag filter: j/k move \u{2022} space toggle \u{2022} Esc close",
                ));
            }
            Action::OpenCategoryPicker => {
                self.state.open_facet_picker(FacetKind::Category);
                self.state.set_status_message(Some(
                    "Category filter: j/k move \u{2022} space toggle \u{2022} Esc close",
                ));
            }
            Action::ActivateSeed => {
                if let Some(activated) = self.state.activate_selected() {
                    self.navigator.open_seed(&activated);
                    let target = activated.slug.as_deref().unwrap_or(&activated.id);
                    self.state
                        .set_status_message(Some(format!("Opened seed {target}")));
                } else {
                    self.state.set_status_message(Some("No seed selected"));
                }
            }
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::FacetPicker(_)) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Enter => {
                        self.state.close_overlay();
                    }
                    KeyCode::Char(' ')
                        if !key.modifiers.intersects(
                            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                        ) =>
                    {
                        self.state.facet_picker_toggle();
                    }
                    KeyCode::Char('j') | KeyCode::Down => {
                        self.state.facet_picker_move_selection(1);
                    }
                    KeyCode::Char('k') | KeyCode::Up => {
                        self.state.facet_picker_move_selection(-1);
                    }
                    KeyCode::PageDown => {
                        self.state.facet_picker_move_selection(5);
                    }
                    KeyCode::PageUp => {
                        self.state.facet_picker_move_selection(-5);
                    }
                    _ => {}
                }
                true
            }
            None => false,
        }
    }
}


fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
