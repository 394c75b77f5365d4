//! The UI worker: drains the bus, keeps the rendered model, runs the
//! pattern matcher and draws the full-screen layout.
//!
//! Everything runs cooperatively on one task: keypress polling doubles as
//! the frame pacing, and all state mutation happens here. The layout is
//! three bordered windows:
//!
//! ```text
//! [    SEARCH    ]
//! [   LIST  OF   ]
//! [  PERCENTAGES ]
//! [    STATUS    ]
//! ```

pub mod query;

use {
    crate::{
        linux::worker::{MemoryWorker, WorkerConfig},
        message::{self, Message, QueryEditEnd, BATCH_SIZE},
        pattern::Pattern,
    },
    crossbeam_channel::{Receiver, Sender, TryRecvError},
    crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    log::{debug, error, info, warn},
    ratatui::{
        layout::{Constraint, Layout, Rect},
        style::{Color, Modifier, Style},
        text::{Line, Span, Text},
        widgets::{Block, Paragraph},
        DefaultTerminal, Frame,
    },
    std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    },
    thiserror::Error,
};

/// Frame cadence; also the keypress poll timeout.
const UI_TICK: Duration = Duration::from_millis(48);

const MIN_COLS: u16 = 60;
const MIN_ROWS: u16 = 20;

const SEARCH_HEIGHT: u16 = 5;
const STATUS_HEIGHT: u16 = 5;
/// Fixed width of one percentage cell in the data grid.
const COL_WIDTH: u16 = 12;

const SEARCH_LABEL: &str = "CURRENT SEARCH: ";

#[derive(Debug, Error)]
pub enum UiError {
    #[error("need a terminal at least 60x20 big, got {cols}x{rows}")]
    TerminalTooSmall { cols: u16, rows: u16 },
    #[error("terminal i/o failed")]
    Io(#[from] std::io::Error),
    #[error("failed to spawn the memory worker")]
    SpawnWorker(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub process_name: String,
    pub lookahead: usize,
}

/// The rendered model, owned exclusively by the UI worker.
#[derive(Debug, Default)]
pub struct UiState {
    /// Whether the target generator is currently being mirrored.
    pub online: bool,
    /// Live index cursor of the observed generator.
    pub mti: Option<u32>,
    /// Upcoming percentages; the current one is element 0.
    pub next_percentages: Vec<i32>,
    /// The committed query searches run against.
    pub query: String,
    /// Edit buffer; confirmed or discarded as a whole.
    pub query_buffer: String,
    /// Index runs matching the committed query.
    pub search_matches: Vec<Vec<usize>>,
    /// Total messages processed.
    pub msg_count: u64,
    pub display_count: bool,
    pub editing_query: bool,
}

/// Runs the live TUI until the user quits or the terminal contract breaks.
///
/// Spawns the memory worker, owns the terminal for the duration and
/// restores it on every exit path (a panic hook covers the rest).
pub fn run(config: UiConfig) -> Result<(), UiError> {
    let (cols, rows) = crossterm::terminal::size()?;
    check_dimensions(cols, rows)?;

    let (tx, rx) = message::bus();
    let stop = Arc::new(AtomicBool::new(false));

    let worker = MemoryWorker::new(
        WorkerConfig {
            process_name: config.process_name,
            lookahead: config.lookahead,
        },
        tx.clone(),
        Arc::clone(&stop),
    );
    let worker = std::thread::Builder::new()
        .name("memory-worker".into())
        .spawn(move || worker.run())
        .map_err(UiError::SpawnWorker)?;

    let mut terminal = ratatui::init();
    let result = Ui::new(tx, Arc::clone(&stop)).run_loop(&mut terminal, &rx);
    ratatui::restore();

    // Whether we left on a keypress or an error, take the worker down too.
    stop.store(true, Ordering::Relaxed);
    if worker.join().is_err() {
        error!("memory worker panicked");
    }

    debug!("ui worker: exited");
    result
}

struct Ui {
    state: UiState,
    bus: Sender<Message>,
    stop: Arc<AtomicBool>,
}

impl Ui {
    fn new(bus: Sender<Message>, stop: Arc<AtomicBool>) -> Self {
        Self {
            state: UiState::default(),
            bus,
            stop,
        }
    }

    fn run_loop(
        &mut self,
        terminal: &mut DefaultTerminal,
        rx: &Receiver<Message>,
    ) -> Result<(), UiError> {
        // Don't wait for the first observation to show the layout.
        terminal.draw(|f| draw(f, &self.state))?;

        while !self.stop.load(Ordering::Relaxed) {
            self.poll_input()?;
            let processed = self.drain_messages(rx)?;
            if processed > 0 {
                self.refresh_matches();
                terminal.draw(|f| draw(f, &self.state))?;
            }
        }
        Ok(())
    }

    /// Waits up to one tick for a terminal event and turns it into bus
    /// messages.
    fn poll_input(&mut self) -> Result<(), UiError> {
        if !event::poll(UI_TICK)? {
            return Ok(());
        }
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Resize(cols, rows) => self.emit(Message::Resized { cols, rows }),
            _ => {}
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // Raw mode swallows SIGINT, handle the key directly.
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            info!("interrupted, exiting");
            self.stop.store(true, Ordering::Relaxed);
            return;
        }

        if self.state.editing_query {
            match key.code {
                KeyCode::Esc | KeyCode::Char('q') => {
                    self.emit(Message::EndQueryEdit(QueryEditEnd::Discard));
                }
                KeyCode::Enter => self.emit(Message::EndQueryEdit(QueryEditEnd::Confirm)),
                KeyCode::Backspace => self.emit(Message::QueryBackspace),
                KeyCode::Char(c) if c.is_ascii_digit() || c == '+' || c == '-' || c == ' ' => {
                    self.emit(Message::QueryChar(c));
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                info!("user pressed the exit key, exiting");
                self.stop.store(true, Ordering::Relaxed);
            }
            KeyCode::Char('m') => self.emit(Message::ToggleMessageCount),
            KeyCode::Char('/') | KeyCode::Char('s') => self.emit(Message::BeginQueryEdit),
            _ => {}
        }
    }

    /// Input events go through the same bus the memory worker feeds, so
    /// the consumer sees one ordered stream.
    fn emit(&self, msg: Message) {
        if let Err(e) = self.bus.send_timeout(msg, Duration::from_millis(10)) {
            warn!("bus saturated, dropping an input event: {e:?}");
        }
    }

    fn drain_messages(&mut self, rx: &Receiver<Message>) -> Result<usize, UiError> {
        let mut processed = 0;
        while processed < BATCH_SIZE {
            match rx.try_recv() {
                Ok(msg) => {
                    self.process_message(msg)?;
                    processed += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(processed)
    }

    fn process_message(&mut self, msg: Message) -> Result<(), UiError> {
        match msg {
            Message::OnlineStatus(online) => self.state.online = online,
            Message::MtiValue(mti) => self.state.mti = Some(mti),
            Message::NextPercentages(pcs) => self.state.next_percentages = pcs,
            Message::Resized { cols, rows } => check_dimensions(cols, rows)?,
            Message::ToggleMessageCount => {
                self.state.display_count = !self.state.display_count;
            }
            Message::BeginQueryEdit => self.begin_query_edit(),
            Message::EndQueryEdit(end) => self.end_query_edit(end),
            Message::QueryChar(c) => {
                if query::can_append(&self.state.query_buffer, c) {
                    self.state.query_buffer.push(c);
                }
            }
            Message::QueryBackspace => {
                self.state.query_buffer.pop();
            }
        }
        self.state.msg_count += 1;
        Ok(())
    }

    fn begin_query_edit(&mut self) {
        debug!("entering query editing");
        if self.state.editing_query {
            warn!("entering query editing more than once");
        }
        self.state.editing_query = true;
        self.state.query_buffer = self.state.query.clone();
    }

    fn end_query_edit(&mut self, end: QueryEditEnd) {
        debug!("leaving query editing");
        if !self.state.editing_query {
            warn!("leaving query editing more than once");
        }
        self.state.editing_query = false;

        match end {
            QueryEditEnd::Confirm => {
                let new_query = std::mem::take(&mut self.state.query_buffer);
                info!("setting the query to `{new_query}`");
                self.state.query = new_query;
            }
            QueryEditEnd::Discard => self.state.query_buffer.clear(),
        }
    }

    /// Re-runs the committed query against the current percentages.
    fn refresh_matches(&mut self) {
        if self.state.query.is_empty() {
            self.state.search_matches.clear();
            return;
        }
        match Pattern::parse(&self.state.query) {
            Ok(pattern) => {
                self.state.search_matches = pattern.find_runs(&self.state.next_percentages);
            }
            Err(e) => {
                warn!("unusable query `{}`: {e}", self.state.query);
                self.state.search_matches.clear();
            }
        }
    }
}

fn check_dimensions(cols: u16, rows: u16) -> Result<(), UiError> {
    if cols < MIN_COLS || rows < MIN_ROWS {
        return Err(UiError::TerminalTooSmall { cols, rows });
    }
    Ok(())
}

fn draw(f: &mut Frame, state: &UiState) {
    let chunks = Layout::vertical([
        Constraint::Length(SEARCH_HEIGHT),
        Constraint::Min(1),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .split(f.area());

    draw_search(f, chunks[0], state);
    draw_data(f, chunks[1], state);
    draw_status(f, chunks[2], state);
}

fn draw_search(f: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::bordered();
    let inner = block.inner(area);

    let (current, style) = if state.editing_query {
        (&state.query_buffer, Style::default().fg(Color::Yellow))
    } else if state.query.is_empty() {
        (&state.query, Style::default())
    } else if state.search_matches.is_empty() {
        (&state.query, Style::default().fg(Color::Red))
    } else {
        (&state.query, Style::default().fg(Color::Green))
    };

    let line = Line::from(vec![
        Span::raw(SEARCH_LABEL),
        Span::styled(current.clone(), style),
    ]);
    let text_width = line.width() as u16;
    let text = Text::from(vec![Line::raw(""), line]);
    f.render_widget(Paragraph::new(text).centered().block(block), area);

    if state.editing_query {
        // Park the cursor right behind the edit buffer.
        let start = inner.x + inner.width.saturating_sub(text_width) / 2;
        let x = (start + text_width).min(inner.right().saturating_sub(1));
        f.set_cursor_position((x, inner.y + 1));
    }
}

fn draw_data(f: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::bordered();
    let inner = block.inner(area);

    // One row/column of padding inside the borders, column-major fill.
    let rows = inner.height.saturating_sub(2) as usize;
    let cols = (inner.width.saturating_sub(2) / COL_WIDTH) as usize;
    if state.next_percentages.is_empty() || rows == 0 || cols == 0 {
        f.render_widget(block, area);
        return;
    }

    let members: HashSet<usize> = state.search_matches.iter().flatten().copied().collect();
    let heads: HashSet<usize> = state
        .search_matches
        .iter()
        .filter_map(|run| run.first().copied())
        .collect();

    let count = state.next_percentages.len().min(rows * cols);
    let mut lines = Vec::with_capacity(rows + 1);
    lines.push(Line::raw(""));
    for y in 0..rows {
        let mut spans = vec![Span::raw(" ")];
        for col in 0..cols {
            let i = col * rows + y;
            if i >= count {
                break;
            }
            let style = if heads.contains(&i) {
                Style::default().fg(Color::Green).add_modifier(Modifier::REVERSED)
            } else if members.contains(&i) {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            spans.push(Span::styled(
                format!("{i:>3}: {:>2}", state.next_percentages[i]),
                style,
            ));
            spans.push(Span::raw(" ".repeat(COL_WIDTH as usize - 7)));
        }
        lines.push(Line::from(spans));
    }

    f.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
}

fn draw_status(f: &mut Frame, area: Rect, state: &UiState) {
    let (label, color) = if state.online {
        ("ONLINE ", Color::Green)
    } else {
        ("OFFLINE ", Color::Red)
    };

    let mut spans = vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(mti) = state.mti {
        spans.push(Span::raw(format!("mti {mti} ")));
    }
    if state.display_count {
        spans.push(Span::raw(format!("({})", state.msg_count)));
    }

    let text = Text::from(vec![Line::raw(""), Line::from(spans)]);
    f.render_widget(
        Paragraph::new(text).centered().block(Block::bordered()),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ui() -> Ui {
        let (tx, _rx) = message::bus();
        Ui::new(tx, Arc::new(AtomicBool::new(false)))
    }

    fn apply(ui: &mut Ui, msgs: Vec<Message>) {
        for msg in msgs {
            ui.process_message(msg).unwrap();
        }
        ui.refresh_matches();
    }

    #[test]
    fn observation_batch_updates_the_model() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::OnlineStatus(true),
                Message::MtiValue(312),
                Message::NextPercentages(vec![4, 15, 92]),
            ],
        );

        assert!(ui.state.online);
        assert_eq!(ui.state.mti, Some(312));
        assert_eq!(ui.state.next_percentages, vec![4, 15, 92]);
        assert_eq!(ui.state.msg_count, 3);
    }

    #[test]
    fn committed_query_is_matched_against_fresh_percentages() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryChar('1'),
                Message::QueryChar('5'),
                Message::EndQueryEdit(QueryEditEnd::Confirm),
                Message::NextPercentages(vec![1, 2, 15, 7, 15]),
            ],
        );

        assert_eq!(ui.state.query, "15");
        assert_eq!(ui.state.search_matches, vec![vec![2], vec![4]]);

        // The next observation re-runs the search.
        apply(&mut ui, vec![Message::NextPercentages(vec![7, 7, 7])]);
        assert!(ui.state.search_matches.is_empty());
    }

    #[test]
    fn discarding_an_edit_keeps_the_query() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryChar('9'),
                Message::EndQueryEdit(QueryEditEnd::Confirm),
                Message::BeginQueryEdit,
                Message::QueryChar('9'),
                Message::QueryBackspace,
                Message::QueryChar('8'),
                Message::EndQueryEdit(QueryEditEnd::Discard),
            ],
        );

        assert_eq!(ui.state.query, "9");
        assert!(ui.state.query_buffer.is_empty());
        assert!(!ui.state.editing_query);
    }

    #[test]
    fn editing_starts_from_the_committed_query() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryChar('4'),
                Message::QueryChar('2'),
                Message::EndQueryEdit(QueryEditEnd::Confirm),
                Message::BeginQueryEdit,
            ],
        );

        assert!(ui.state.editing_query);
        assert_eq!(ui.state.query_buffer, "42");
    }

    #[test]
    fn buffer_rejects_input_the_grammar_forbids() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryChar(' '), // leading space
                Message::QueryChar('4'),
                Message::QueryChar('2'),
                Message::QueryChar('7'), // third digit
                Message::QueryChar('+'),
                Message::QueryChar('+'), // second modifier
            ],
        );

        assert_eq!(ui.state.query_buffer, "42+");
    }

    #[test]
    fn committing_an_empty_query_clears_matches() {
        let mut ui = ui();
        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryChar('7'),
                Message::EndQueryEdit(QueryEditEnd::Confirm),
                Message::NextPercentages(vec![7, 7]),
            ],
        );
        assert!(!ui.state.search_matches.is_empty());

        apply(
            &mut ui,
            vec![
                Message::BeginQueryEdit,
                Message::QueryBackspace,
                Message::EndQueryEdit(QueryEditEnd::Confirm),
            ],
        );
        assert_eq!(ui.state.query, "");
        assert!(ui.state.search_matches.is_empty());
    }

    #[test]
    fn message_count_toggle() {
        let mut ui = ui();
        apply(&mut ui, vec![Message::ToggleMessageCount]);
        assert!(ui.state.display_count);
        apply(&mut ui, vec![Message::ToggleMessageCount]);
        assert!(!ui.state.display_count);
        assert_eq!(ui.state.msg_count, 2);
    }

    #[test]
    fn shrinking_below_the_minimum_is_fatal() {
        let mut ui = ui();
        assert!(ui
            .process_message(Message::Resized { cols: 59, rows: 20 })
            .is_err());
        assert!(ui
            .process_message(Message::Resized { cols: 80, rows: 24 })
            .is_ok());
    }
}
