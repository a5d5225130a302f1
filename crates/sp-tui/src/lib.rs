use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tracing::debug;

use sp_core::{Id, Inventory, KeyValueStore};
use sp_state::{Controller, Settings, View};

pub mod render;

pub use render::{body_lines, build_screen, plain_text, Screen};

const TICK_RATE: Duration = Duration::from_millis(200);

/// What the keyboard is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Moving through the list.
    Browse,
    /// Typing into the add input of the current view.
    Adding,
    /// Renaming a category in place.
    Renaming(Id),
    /// An item is in inline edit mode.
    Editing,
}

/// Focused input inside an item in edit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditFocus {
    Name,
    Cell { row: usize, column: usize },
    AddRow,
    NewVariant { column: usize },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextInput {
    content: String,
    /// Position in characters, not bytes.
    cursor: usize,
}

impl TextInput {
    fn with_text(content: String) -> Self {
        let cursor = content.chars().count();
        Self { content, cursor }
    }

    fn as_str(&self) -> &str {
        &self.content
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn byte_index(&self) -> usize {
        self.content
            .char_indices()
            .nth(self.cursor)
            .map_or(self.content.len(), |(index, _)| index)
    }

    fn insert(&mut self, c: char) {
        let index = self.byte_index();
        self.content.insert(index, c);
        self.cursor += 1;
    }

    fn delete_back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let index = self.byte_index();
        self.content.remove(index);
        true
    }

    fn delete_forward(&mut self) -> bool {
        if self.cursor >= self.content.chars().count() {
            return false;
        }
        let index = self.byte_index();
        self.content.remove(index);
        true
    }

    fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_right(&mut self) {
        if self.cursor < self.content.chars().count() {
            self.cursor += 1;
        }
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.content.chars().count();
    }

    fn reset(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }
}

/// Text typed into a variant row while its item is being edited.
#[derive(Debug, Clone)]
struct VariantDraft {
    id: Id,
    fields: [TextInput; 3],
}

/// Input state kept outside the data model.
#[derive(Debug, Clone)]
pub struct Form {
    mode: Mode,
    cursor: usize,
    add_input: TextInput,
    rename_input: TextInput,
    drafts: Vec<VariantDraft>,
    new_variant: Option<[TextInput; 3]>,
    focus: EditFocus,
}

impl Default for Form {
    fn default() -> Self {
        Self {
            mode: Mode::Browse,
            cursor: 0,
            add_input: TextInput::default(),
            rename_input: TextInput::default(),
            drafts: Vec::new(),
            new_variant: None,
            focus: EditFocus::Name,
        }
    }
}

impl Form {
    /// Current keyboard mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn begin_edit(&mut self, inventory: &Inventory, id: Id) {
        let Some(item) = inventory.item(id) else {
            return;
        };
        self.mode = Mode::Editing;
        self.rename_input = TextInput::with_text(item.name.clone());
        self.drafts.clear();
        self.new_variant = None;
        self.focus = EditFocus::Name;
        self.sync_drafts(inventory, id);
    }

    fn end_edit(&mut self) {
        self.mode = Mode::Browse;
        self.drafts.clear();
        self.new_variant = None;
        self.focus = EditFocus::Name;
    }

    /// Rebuild drafts in model order, keeping whatever was typed into rows
    /// that still exist.
    fn sync_drafts(&mut self, inventory: &Inventory, id: Id) {
        let Some(item) = inventory.item(id) else {
            return;
        };
        let previous = std::mem::take(&mut self.drafts);
        self.drafts = item
            .variants
            .iter()
            .map(|variant| {
                previous
                    .iter()
                    .find(|draft| draft.id == variant.id)
                    .cloned()
                    .unwrap_or_else(|| VariantDraft {
                        id: variant.id,
                        fields: [
                            TextInput::with_text(variant.color.clone()),
                            TextInput::with_text(variant.price.clone()),
                            TextInput::with_text(variant.qty.clone()),
                        ],
                    })
            })
            .collect();

        match self.focus {
            EditFocus::Cell { row, .. } if row >= self.drafts.len() => {
                self.focus = EditFocus::AddRow;
            }
            EditFocus::NewVariant { .. } if self.new_variant.is_none() => {
                self.focus = EditFocus::AddRow;
            }
            _ => {}
        }
    }

    fn focus_order(&self) -> Vec<EditFocus> {
        let mut order = vec![EditFocus::Name];
        for row in 0..self.drafts.len() {
            order.extend((0..3).map(|column| EditFocus::Cell { row, column }));
        }
        if self.new_variant.is_some() {
            order.extend((0..3).map(|column| EditFocus::NewVariant { column }));
        } else {
            order.push(EditFocus::AddRow);
        }
        order
    }

    fn focus_step(&mut self, forward: bool) {
        let order = self.focus_order();
        let current = order
            .iter()
            .position(|focus| *focus == self.focus)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % order.len()
        } else if current == 0 {
            order.len() - 1
        } else {
            current - 1
        };
        self.focus = order[next];
    }

    /// Reconcile with the controller after every key: clamp the cursor and
    /// drop modes whose target disappeared.
    fn sync<S: KeyValueStore>(&mut self, controller: &Controller<S>) {
        let view = controller.view();
        let len = list_len(controller);
        self.cursor = self.cursor.min(len.saturating_sub(1));

        match (self.mode, view.editing_item) {
            (Mode::Editing, Some(id)) => self.sync_drafts(controller.inventory(), id),
            (Mode::Editing, None) => self.end_edit(),
            _ => {}
        }

        if let Mode::Renaming(id) = self.mode {
            if view.view != View::Categories || controller.inventory().category(id).is_none() {
                self.mode = Mode::Browse;
            }
        }
    }
}

fn list_len<S: KeyValueStore>(controller: &Controller<S>) -> usize {
    match controller.view().view {
        View::Categories => controller.inventory().categories().len(),
        View::Items => visible_items(controller).len(),
    }
}

fn visible_items<S: KeyValueStore>(controller: &Controller<S>) -> Vec<Id> {
    controller
        .view()
        .selected_category
        .map(|cat_id| {
            controller
                .inventory()
                .items_in(cat_id)
                .map(|item| item.id)
                .collect()
        })
        .unwrap_or_default()
}

fn category_at<S: KeyValueStore>(controller: &Controller<S>, index: usize) -> Option<Id> {
    controller
        .inventory()
        .categories()
        .get(index)
        .map(|category| category.id)
}

/// Launch the full-screen interface against `store`.
pub fn run<S: KeyValueStore>(store: S, settings: Settings) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut controller = Controller::open(store, settings);
    let mut form = Form::default();

    let outcome = event_loop(&mut terminal, &mut controller, &mut form);
    let flushed = controller.flush();

    restore_terminal(terminal)?;
    outcome?;
    flushed.context("failed to save pending changes")?;
    Ok(())
}

fn event_loop<S: KeyValueStore>(
    terminal: &mut Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
    controller: &mut Controller<S>,
    form: &mut Form,
) -> Result<()> {
    let mut gate = FrameGate::default();
    loop {
        let now = Instant::now();
        controller.tick(now);
        if gate.should_draw(controller.revision()) {
            let screen = build_screen(controller, form);
            terminal.draw(|frame| render::draw(frame, &screen))?;
        }

        let timeout = controller
            .next_deadline()
            .map_or(TICK_RATE, |deadline| deadline.saturating_duration_since(now))
            .min(TICK_RATE);
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    gate.invalidate();
                    if handle_key(controller, form, key, Instant::now()) {
                        return Ok(());
                    }
                }
                Event::Resize(..) => gate.invalidate(),
                _ => {}
            }
        }
    }
}

/// Decides when a new frame is needed: the controller revision moved, or
/// something outside the controller (a key, a resize) touched the screen.
#[derive(Debug, Default)]
struct FrameGate {
    drawn: Option<u64>,
    dirty: bool,
}

impl FrameGate {
    fn invalidate(&mut self) {
        self.dirty = true;
    }

    fn should_draw(&mut self, revision: u64) -> bool {
        let draw = self.dirty || self.drawn != Some(revision);
        self.dirty = false;
        self.drawn = Some(revision);
        draw
    }
}

/// Route one key press. Returns `true` when the user asked to quit.
pub fn handle_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    let quit = if controller.prompt().is_some() {
        handle_prompt_key(controller, key);
        false
    } else {
        match form.mode {
            Mode::Browse => handle_browse_key(controller, form, key),
            Mode::Adding => {
                handle_add_key(controller, form, key);
                false
            }
            Mode::Renaming(id) => {
                handle_rename_key(controller, form, id, key);
                false
            }
            Mode::Editing => {
                handle_edit_key(controller, form, key, now);
                false
            }
        }
    };

    form.sync(controller);
    quit
}

fn handle_prompt_key<S: KeyValueStore>(controller: &mut Controller<S>, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y' | 'Y') | KeyCode::Enter => {
            if let Err(err) = controller.confirm_prompt() {
                debug!(error = %err, "confirmed action failed");
            }
        }
        KeyCode::Char('n' | 'N') | KeyCode::Esc => controller.cancel_prompt(),
        _ => {}
    }
}

fn handle_browse_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    key: KeyEvent,
) -> bool {
    let len = list_len(controller);
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('j') | KeyCode::Down => {
            if len > 0 {
                form.cursor = (form.cursor + 1) % len;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if len > 0 {
                form.cursor = if form.cursor == 0 { len - 1 } else { form.cursor - 1 };
            }
        }
        KeyCode::Char('g') | KeyCode::Home => form.cursor = 0,
        KeyCode::Char('G') | KeyCode::End => form.cursor = len.saturating_sub(1),
        KeyCode::Char('a' | 'n' | '+') => {
            form.add_input.reset();
            form.mode = Mode::Adding;
        }
        _ => match controller.view().view {
            View::Categories => handle_category_key(controller, form, key),
            View::Items => handle_item_key(controller, form, key),
        },
    }
    false
}

fn handle_category_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    key: KeyEvent,
) {
    let Some(id) = category_at(controller, form.cursor) else {
        return;
    };
    match key.code {
        KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
            if controller.select_category(id) {
                form.cursor = 0;
            }
        }
        KeyCode::Char('e') => {
            if let Some(category) = controller.inventory().category(id) {
                form.rename_input = TextInput::with_text(category.name.clone());
                form.mode = Mode::Renaming(id);
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            controller.request_delete_category(id);
        }
        _ => {}
    }
}

fn handle_item_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    key: KeyEvent,
) {
    let current = visible_items(controller).get(form.cursor).copied();
    match key.code {
        KeyCode::Esc | KeyCode::Left | KeyCode::Backspace | KeyCode::Char('h' | 'b') => {
            let selected = controller.view().selected_category;
            controller.back();
            form.cursor = controller
                .inventory()
                .categories()
                .iter()
                .position(|category| Some(category.id) == selected)
                .unwrap_or(0);
        }
        KeyCode::Enter | KeyCode::Char('e') => {
            if let Some(id) = current {
                if controller.start_edit_item(id) {
                    form.begin_edit(controller.inventory(), id);
                }
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(id) = current {
                controller.request_delete_item(id);
            }
        }
        _ => {}
    }
}

fn handle_add_key<S: KeyValueStore>(controller: &mut Controller<S>, form: &mut Form, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            form.add_input.reset();
            form.mode = Mode::Browse;
        }
        KeyCode::Enter => {
            let name = form.add_input.as_str().to_string();
            let added = match controller.view().view {
                View::Categories => controller.add_category(&name),
                View::Items => controller.add_item(&name),
            };
            if let Ok(id) = added {
                form.add_input.reset();
                form.mode = Mode::Browse;
                form.cursor = match controller.view().view {
                    View::Categories => controller
                        .inventory()
                        .categories()
                        .iter()
                        .position(|category| category.id == id),
                    View::Items => visible_items(controller).iter().position(|item| *item == id),
                }
                .unwrap_or(form.cursor);
            }
        }
        _ => {
            edit_text(&mut form.add_input, key);
        }
    }
}

fn handle_rename_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    id: Id,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => form.mode = Mode::Browse,
        KeyCode::Enter => {
            let name = form.rename_input.as_str().to_string();
            if controller.rename_category(id, &name).is_ok() {
                form.mode = Mode::Browse;
            }
        }
        _ => {
            edit_text(&mut form.rename_input, key);
        }
    }
}

fn handle_edit_key<S: KeyValueStore>(
    controller: &mut Controller<S>,
    form: &mut Form,
    key: KeyEvent,
    now: Instant,
) {
    let Some(item_id) = controller.view().editing_item else {
        form.end_edit();
        return;
    };

    match key.code {
        KeyCode::Esc => {
            if matches!(form.focus, EditFocus::NewVariant { .. }) {
                form.new_variant = None;
                form.focus = EditFocus::AddRow;
            } else {
                controller.cancel_edit_item();
                form.end_edit();
            }
            return;
        }
        KeyCode::Tab | KeyCode::Down => {
            form.focus_step(true);
            return;
        }
        KeyCode::BackTab | KeyCode::Up => {
            form.focus_step(false);
            return;
        }
        _ => {}
    }

    match form.focus {
        EditFocus::Name => {
            if key.code == KeyCode::Enter {
                let name = form.rename_input.as_str().to_string();
                if controller.rename_item(item_id, &name).is_ok() {
                    form.end_edit();
                }
            } else {
                edit_text(&mut form.rename_input, key);
            }
        }
        EditFocus::Cell { row, column } => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('d') {
                if let Some(draft) = form.drafts.get(row) {
                    controller.request_delete_variant(item_id, draft.id);
                }
            } else if let Some(draft) = form.drafts.get_mut(row) {
                if edit_text(&mut draft.fields[column], key) {
                    let [color, price, qty] = &draft.fields;
                    controller.update_variant(
                        item_id,
                        draft.id,
                        color.as_str(),
                        price.as_str(),
                        qty.as_str(),
                        now,
                    );
                }
            }
        }
        EditFocus::AddRow => {
            if key.code == KeyCode::Enter {
                form.new_variant = Some(Default::default());
                form.focus = EditFocus::NewVariant { column: 0 };
            }
        }
        EditFocus::NewVariant { column } => {
            if key.code == KeyCode::Enter {
                if let Some([color, price, qty]) = &form.new_variant {
                    let added = controller.add_variant(
                        item_id,
                        color.as_str(),
                        price.as_str(),
                        qty.as_str(),
                    );
                    if added.is_ok() {
                        form.new_variant = None;
                        form.focus = EditFocus::AddRow;
                    }
                }
            } else if let Some(fields) = form.new_variant.as_mut() {
                edit_text(&mut fields[column], key);
            }
        }
    }
}

/// Apply a text-editing key. Returns `true` when the content changed.
fn edit_text(input: &mut TextInput, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('a') => input.move_home(),
            KeyCode::Char('e') => input.move_end(),
            _ => {}
        }
        return false;
    }
    match key.code {
        KeyCode::Char(c) => {
            input.insert(c);
            true
        }
        KeyCode::Backspace => input.delete_back(),
        KeyCode::Delete => input.delete_forward(),
        KeyCode::Left => {
            input.move_left();
            false
        }
        KeyCode::Right => {
            input.move_right();
            false
        }
        KeyCode::Home => {
            input.move_home();
            false
        }
        KeyCode::End => {
            input.move_end();
            false
        }
        _ => false,
    }
}

fn restore_terminal(mut terminal: Terminal<ratatui::backend::CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
