//! Projection of the controller state into a screen tree, and the drawing
//! pass that puts that tree on the terminal.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use sp_core::{Inventory, Item, KeyValueStore};
use sp_state::{Controller, NoticeKind, View};
use sp_utils::format_price;

use crate::{EditFocus, Form, Mode, TextInput};

/// Title shown above the category list.
pub const HOME_TITLE: &str = "FAYYAZ & SONS";

const VARIANT_COLUMNS: [&str; 3] = ["Color", "Price", "Qty"];
const VARIANT_PLACEHOLDERS: [&str; 3] = ["Color", "Price", "Qty"];

/// A text input as it should appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputView {
    pub text: String,
    pub placeholder: &'static str,
    pub focused: bool,
    /// Caret position in characters.
    pub caret: usize,
}

impl InputView {
    fn of(input: &TextInput, placeholder: &'static str, focused: bool) -> Self {
        Self {
            text: input.as_str().to_string(),
            placeholder,
            focused,
            caret: input.cursor(),
        }
    }
}

/// Static text or an editable input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Text(String),
    Input(InputView),
}

impl Field {
    fn plain(&self) -> String {
        match self {
            Field::Text(text) => text.clone(),
            Field::Input(input) if input.text.is_empty() => format!("[{}]", input.placeholder),
            Field::Input(input) => format!("[{}]", input.text),
        }
    }
}

/// One line of the category list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub name: Field,
    pub highlighted: bool,
}

/// The trailing row of a variant table in edit mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddRow {
    Button { focused: bool },
    Draft([InputView; 3]),
}

/// An item with its variant table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCard {
    pub name: Field,
    pub highlighted: bool,
    pub editing: bool,
    pub rows: Vec<[Field; 3]>,
    pub add_row: Option<AddRow>,
}

impl ItemCard {
    fn height(&self) -> u16 {
        let rows = self.rows.len() + usize::from(self.add_row.is_some());
        u16::try_from(rows).unwrap_or(u16::MAX).saturating_add(4)
    }

    /// Index of the table line holding the focused input. The add row comes
    /// after the variant rows.
    fn focused_line(&self) -> Option<usize> {
        let focused = |field: &Field| matches!(field, Field::Input(input) if input.focused);
        self.rows
            .iter()
            .position(|row| row.iter().any(focused))
            .or_else(|| match &self.add_row {
                Some(AddRow::Button { focused: true }) => Some(self.rows.len()),
                Some(AddRow::Draft(fields)) if fields.iter().any(|input| input.focused) => {
                    Some(self.rows.len())
                }
                _ => None,
            })
    }
}

enum TableLine<'a> {
    Row(&'a [Field; 3]),
    Add(&'a AddRow),
}

/// Main content of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Categories(Vec<CategoryRow>),
    Items(Vec<ItemCard>),
    Empty { message: String, detail: String },
}

/// Confirmation overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptView {
    pub title: String,
    pub message: String,
}

/// Transient message line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub message: String,
    pub error: bool,
}

/// Everything the terminal shows for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub title: String,
    pub show_back: bool,
    pub add_label: &'static str,
    pub add_input: InputView,
    pub body: Body,
    pub prompt: Option<PromptView>,
    pub notice: Option<NoticeView>,
    pub hints: Vec<(&'static str, &'static str)>,
}

/// Build the screen for the current state. Reads only its inputs.
pub fn build_screen<S: KeyValueStore>(controller: &Controller<S>, form: &Form) -> Screen {
    let inventory = controller.inventory();
    let view = controller.view();
    let selected = controller.selected_category();
    let adding = form.mode == Mode::Adding;

    let (title, show_back, add_label, placeholder, body) = match (view.view, selected) {
        (View::Items, Some(category)) => (
            category.name.clone(),
            true,
            "Add Item",
            "New Item...",
            items_body(inventory, category.id, &category.name, view.editing_item, form),
        ),
        _ => (
            HOME_TITLE.to_string(),
            false,
            "Add Category",
            "New Category...",
            categories_body(inventory, form),
        ),
    };

    Screen {
        title,
        show_back,
        add_label,
        add_input: InputView::of(&form.add_input, placeholder, adding),
        body,
        prompt: controller.prompt().map(|prompt| PromptView {
            title: prompt.title.clone(),
            message: prompt.message.clone(),
        }),
        notice: controller.notice().map(|notice| NoticeView {
            message: notice.message.clone(),
            error: notice.kind == NoticeKind::Error,
        }),
        hints: key_hints(form, view.view, controller.prompt().is_some()),
    }
}

fn categories_body(inventory: &Inventory, form: &Form) -> Body {
    if inventory.categories().is_empty() {
        return Body::Empty {
            message: "No categories yet.".into(),
            detail: "Add one above to get started!".into(),
        };
    }
    let rows = inventory
        .categories()
        .iter()
        .enumerate()
        .map(|(index, category)| {
            let name = if form.mode == Mode::Renaming(category.id) {
                Field::Input(InputView::of(&form.rename_input, "", true))
            } else {
                Field::Text(category.name.clone())
            };
            CategoryRow {
                name,
                highlighted: index == form.cursor,
            }
        })
        .collect();
    Body::Categories(rows)
}

fn items_body(
    inventory: &Inventory,
    cat_id: sp_core::Id,
    category_name: &str,
    editing: Option<sp_core::Id>,
    form: &Form,
) -> Body {
    let cards: Vec<ItemCard> = inventory
        .items_in(cat_id)
        .enumerate()
        .map(|(index, item)| {
            if editing == Some(item.id) {
                editing_card(item, index == form.cursor, form)
            } else {
                display_card(item, index == form.cursor)
            }
        })
        .collect();
    if cards.is_empty() {
        return Body::Empty {
            message: format!("No items found in \"{category_name}\"."),
            detail: "Add a new item type above to get started.".into(),
        };
    }
    Body::Items(cards)
}

fn display_card(item: &Item, highlighted: bool) -> ItemCard {
    ItemCard {
        name: Field::Text(item.name.clone()),
        highlighted,
        editing: false,
        rows: item
            .variants
            .iter()
            .map(|variant| {
                [
                    Field::Text(variant.color.clone()),
                    Field::Text(format_price(&variant.price)),
                    Field::Text(variant.qty.clone()),
                ]
            })
            .collect(),
        add_row: None,
    }
}

fn editing_card(item: &Item, highlighted: bool, form: &Form) -> ItemCard {
    let rows: Vec<[Field; 3]> = item
        .variants
        .iter()
        .enumerate()
        .map(|(row, variant)| {
            let draft = form.drafts.iter().find(|draft| draft.id == variant.id);
            let stored = [&variant.color, &variant.price, &variant.qty];
            std::array::from_fn(|column| {
                let focused = form.focus == EditFocus::Cell { row, column };
                let input = match draft {
                    Some(draft) => {
                        InputView::of(&draft.fields[column], VARIANT_PLACEHOLDERS[column], focused)
                    }
                    None => InputView::of(
                        &TextInput::with_text(stored[column].clone()),
                        VARIANT_PLACEHOLDERS[column],
                        focused,
                    ),
                };
                Field::Input(input)
            })
        })
        .collect();

    let add_row = match &form.new_variant {
        Some(fields) => AddRow::Draft(std::array::from_fn(|column| {
            InputView::of(
                &fields[column],
                VARIANT_PLACEHOLDERS[column],
                form.focus == EditFocus::NewVariant { column },
            )
        })),
        None => AddRow::Button {
            focused: form.focus == EditFocus::AddRow,
        },
    };

    ItemCard {
        name: Field::Input(InputView::of(
            &form.rename_input,
            "",
            form.focus == EditFocus::Name,
        )),
        highlighted,
        editing: true,
        rows,
        add_row: Some(add_row),
    }
}

fn key_hints(form: &Form, view: View, prompt_open: bool) -> Vec<(&'static str, &'static str)> {
    if prompt_open {
        return vec![("y", "Confirm"), ("n", "Cancel")];
    }
    match form.mode {
        Mode::Adding | Mode::Renaming(_) => vec![("Enter", "Save"), ("Esc", "Cancel")],
        Mode::Editing => match form.focus {
            EditFocus::Name => vec![("Enter", "Save Name"), ("Tab", "Next"), ("Esc", "Done")],
            EditFocus::Cell { .. } => vec![("Tab", "Next"), ("Ctrl-d", "Delete Variant"), ("Esc", "Done")],
            EditFocus::AddRow => vec![("Enter", "Add Variant"), ("Tab", "Next"), ("Esc", "Done")],
            EditFocus::NewVariant { .. } => vec![("Enter", "Add"), ("Tab", "Next Field"), ("Esc", "Cancel")],
        },
        Mode::Browse => match view {
            View::Categories => vec![
                ("q", "Quit"),
                ("↑/↓", "Nav"),
                ("Enter", "Open"),
                ("a", "Add"),
                ("e", "Rename"),
                ("d", "Delete"),
            ],
            View::Items => vec![
                ("q", "Quit"),
                ("Esc", "Back"),
                ("↑/↓", "Nav"),
                ("a", "Add"),
                ("e", "Edit"),
                ("d", "Delete"),
            ],
        },
    }
}

/// Plain-text lines for the main content.
pub fn body_lines(body: &Body) -> Vec<String> {
    let mut lines = Vec::new();
    match body {
        Body::Categories(rows) => {
            lines.extend(rows.iter().map(|row| row.name.plain()));
        }
        Body::Items(cards) => {
            for (index, card) in cards.iter().enumerate() {
                if index > 0 {
                    lines.push(String::new());
                }
                lines.push(card.name.plain());
                let mut header = VARIANT_COLUMNS.join(" | ");
                if card.editing {
                    header.push_str(" | Actions");
                }
                lines.push(format!("  {header}"));
                for row in &card.rows {
                    let mut line = row.iter().map(Field::plain).collect::<Vec<_>>().join(" | ");
                    if card.editing {
                        line.push_str(" | Delete");
                    }
                    lines.push(format!("  {line}"));
                }
                match &card.add_row {
                    Some(AddRow::Button { .. }) => lines.push("  + Add Variant".into()),
                    Some(AddRow::Draft(fields)) => {
                        let cells = fields
                            .iter()
                            .map(|input| Field::Input(input.clone()).plain())
                            .collect::<Vec<_>>()
                            .join(" | ");
                        lines.push(format!("  {cells} | Save"));
                    }
                    None => {}
                }
            }
        }
        Body::Empty { message, detail } => {
            lines.push(message.clone());
            lines.push(detail.clone());
        }
    }
    lines
}

/// The whole screen as plain text, without styling or key hints.
pub fn plain_text(screen: &Screen) -> String {
    let mut lines = Vec::new();
    if screen.show_back {
        lines.push(format!("< {}", screen.title));
    } else {
        lines.push(screen.title.clone());
    }
    lines.push(Field::Input(screen.add_input.clone()).plain());
    lines.extend(body_lines(&screen.body));
    if let Some(prompt) = &screen.prompt {
        lines.push(format!("-- {} --", prompt.title));
        lines.push(prompt.message.clone());
    }
    if let Some(notice) = &screen.notice {
        let marker = if notice.error { '!' } else { '*' };
        lines.push(format!("{marker} {}", notice.message));
    }
    lines.join("\n")
}

/// Draw a full frame. Every call repaints everything.
pub fn draw(frame: &mut Frame, screen: &Screen) {
    let size = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(size);

    let mut caret = None;

    render_header(frame, chunks[0], screen);
    render_add_input(frame, chunks[1], screen, &mut caret);
    match &screen.body {
        Body::Categories(rows) => render_categories(frame, chunks[2], rows, &mut caret),
        Body::Items(cards) => render_cards(frame, chunks[2], cards, &mut caret),
        Body::Empty { message, detail } => render_empty(frame, chunks[2], message, detail),
    }
    render_notice(frame, chunks[3], screen);
    render_guide_bar(frame, chunks[4], &screen.hints);

    if let Some(prompt) = &screen.prompt {
        render_prompt(frame, size, prompt);
    } else if let Some((x, y)) = caret {
        frame.set_cursor(x, y);
    }
}

fn render_header(frame: &mut Frame, area: Rect, screen: &Screen) {
    let mut spans = Vec::new();
    if screen.show_back {
        spans.push(Span::styled("‹ ", Style::default().fg(Color::Cyan)));
    }
    spans.push(Span::styled(
        screen.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Stockpile"));
    frame.render_widget(header, area);
}

fn render_add_input(
    frame: &mut Frame,
    area: Rect,
    screen: &Screen,
    caret: &mut Option<(u16, u16)>,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(screen.add_label)
        .border_style(if screen.add_input.focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        });
    let inner = block.inner(area);
    frame.render_widget(block, area);
    render_input(frame, inner, &screen.add_input, Style::default(), caret);
}

fn render_categories(
    frame: &mut Frame,
    area: Rect,
    rows: &[CategoryRow],
    caret: &mut Option<(u16, u16)>,
) {
    let block = Block::default().borders(Borders::ALL).title("Categories");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height == 0 {
        return;
    }

    let visible = usize::from(inner.height);
    let highlighted = rows.iter().position(|row| row.highlighted).unwrap_or(0);
    let offset = (highlighted + 1).saturating_sub(visible);

    for (line, row) in rows.iter().skip(offset).take(visible).enumerate() {
        let y = inner.y + u16::try_from(line).unwrap_or(u16::MAX);
        let row_area = Rect::new(inner.x, y, inner.width, 1);
        let style = if row.highlighted {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        render_field(frame, row_area, &row.name, style, caret);
    }
}

fn render_cards(
    frame: &mut Frame,
    area: Rect,
    cards: &[ItemCard],
    caret: &mut Option<(u16, u16)>,
) {
    let highlighted = cards.iter().position(|card| card.highlighted).unwrap_or(0);
    let mut first = 0;
    while first < highlighted
        && cards[first..=highlighted]
            .iter()
            .map(ItemCard::height)
            .fold(0u16, u16::saturating_add)
            > area.height
    {
        first += 1;
    }

    let mut y = area.y;
    let bottom = area.y.saturating_add(area.height);
    for card in &cards[first..] {
        if y >= bottom {
            break;
        }
        let height = card.height().min(bottom - y);
        render_card(frame, Rect::new(area.x, y, area.width, height), card, caret);
        y += height;
    }
}

fn render_card(
    frame: &mut Frame,
    area: Rect,
    card: &ItemCard,
    caret: &mut Option<(u16, u16)>,
) {
    let border = if card.editing {
        Style::default().fg(Color::Yellow)
    } else if card.highlighted {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let block = Block::default().borders(Borders::ALL).border_style(border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 {
        return;
    }
    let bottom = inner.y + inner.height;

    let mut y = inner.y;
    render_field(
        frame,
        Rect::new(inner.x, y, inner.width, 1),
        &card.name,
        Style::default().add_modifier(Modifier::BOLD),
        caret,
    );
    y += 1;
    if y >= bottom {
        return;
    }

    let columns = if card.editing { 4 } else { 3 };
    let heading = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let cells = grid_row(Rect::new(inner.x, y, inner.width, 1), columns);
    for (cell, title) in cells.iter().zip(VARIANT_COLUMNS) {
        frame.render_widget(Paragraph::new(title).style(heading), *cell);
    }
    if card.editing {
        frame.render_widget(Paragraph::new("Actions").style(heading), cells[3]);
    }
    y += 1;

    // Rows scroll so the focused one stays inside the card.
    let lines: Vec<TableLine> = card
        .rows
        .iter()
        .map(TableLine::Row)
        .chain(card.add_row.iter().map(TableLine::Add))
        .collect();
    let visible = usize::from(bottom.saturating_sub(y));
    let offset = card
        .focused_line()
        .map_or(0, |line| (line + 1).saturating_sub(visible));

    for line in lines.iter().skip(offset).take(visible) {
        let row_area = Rect::new(inner.x, y, inner.width, 1);
        match line {
            TableLine::Row(row) => {
                let cells = grid_row(row_area, columns);
                for (cell, field) in cells.iter().zip(row.iter()) {
                    render_field(frame, *cell, field, Style::default(), caret);
                }
                if card.editing {
                    frame.render_widget(
                        Paragraph::new("Ctrl-d").style(Style::default().fg(Color::Red)),
                        cells[3],
                    );
                }
            }
            TableLine::Add(AddRow::Button { focused }) => {
                let style = if *focused {
                    Style::default().fg(Color::Black).bg(Color::Green)
                } else {
                    Style::default().fg(Color::Green)
                };
                frame.render_widget(Paragraph::new("+ Add Variant").style(style), row_area);
            }
            TableLine::Add(AddRow::Draft(fields)) => {
                let cells = grid_row(row_area, columns);
                for (cell, input) in cells.iter().zip(fields) {
                    render_input(frame, *cell, input, Style::default(), caret);
                }
                frame.render_widget(
                    Paragraph::new("Enter/Esc").style(Style::default().fg(Color::Green)),
                    cells[3],
                );
            }
        }
        y += 1;
    }
}

fn grid_row(area: Rect, columns: u32) -> std::rc::Rc<[Rect]> {
    let constraints: Vec<Constraint> = (0..columns).map(|_| Constraint::Ratio(1, columns)).collect();
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area)
}

fn render_field(
    frame: &mut Frame,
    area: Rect,
    field: &Field,
    style: Style,
    caret: &mut Option<(u16, u16)>,
) {
    match field {
        Field::Text(text) => frame.render_widget(Paragraph::new(text.as_str()).style(style), area),
        Field::Input(input) => render_input(frame, area, input, style, caret),
    }
}

fn render_input(
    frame: &mut Frame,
    area: Rect,
    input: &InputView,
    style: Style,
    caret: &mut Option<(u16, u16)>,
) {
    if area.width == 0 {
        return;
    }
    if input.text.is_empty() {
        frame.render_widget(
            Paragraph::new(input.placeholder).style(style.fg(Color::DarkGray)),
            area,
        );
        if input.focused {
            *caret = Some((area.x, area.y));
        }
        return;
    }

    let (visible, column) = scroll_to_caret(&input.text, input.caret, area.width);
    frame.render_widget(
        Paragraph::new(visible).style(style.add_modifier(Modifier::UNDERLINED)),
        area,
    );
    if input.focused {
        *caret = Some((area.x + column, area.y));
    }
}

/// Drop leading characters until the caret fits in `width` columns. Returns
/// the visible text and the caret's display column within it.
pub(crate) fn scroll_to_caret(text: &str, caret: usize, width: u16) -> (String, u16) {
    let widths: Vec<usize> = text
        .chars()
        .map(|c| Span::raw(c.to_string()).width())
        .collect();
    let caret = caret.min(widths.len());
    let room = usize::from(width.saturating_sub(1));

    let mut start = 0;
    let mut before: usize = widths[..caret].iter().sum();
    while before > room && start < caret {
        before -= widths[start];
        start += 1;
    }

    let visible = text.chars().skip(start).collect();
    (visible, u16::try_from(before).unwrap_or(u16::MAX))
}

fn render_empty(frame: &mut Frame, area: Rect, message: &str, detail: &str) {
    let lines = vec![
        Line::from(message.to_string()),
        Line::from(Span::styled(
            detail.to_string(),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let empty = Paragraph::new(lines)
        .alignment(ratatui::layout::Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(empty, area);
}

fn render_notice(frame: &mut Frame, area: Rect, screen: &Screen) {
    let Some(notice) = &screen.notice else {
        return;
    };
    let style = if notice.error {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Green)
    };
    frame.render_widget(Paragraph::new(notice.message.as_str()).style(style), area);
}

fn render_guide_bar(frame: &mut Frame, area: Rect, hints: &[(&'static str, &'static str)]) {
    let spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, desc)| {
            vec![
                Span::styled(format!(" [{key}] "), Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan)),
                Span::raw(format!("{desc}  ")),
            ]
        })
        .collect();

    let guide = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Guide"));
    frame.render_widget(guide, area);
}

fn render_prompt(frame: &mut Frame, area: Rect, prompt: &PromptView) {
    let popup_area = centered_rect(60, 25, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(prompt.title.as_str())
        .border_style(Style::default().fg(Color::Red));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(2), Constraint::Length(1)].as_ref())
        .margin(1)
        .split(popup_area);

    let text = Paragraph::new(prompt.message.as_str()).wrap(Wrap { trim: true });
    frame.render_widget(text, chunks[0]);

    let help = Paragraph::new("y: Confirm | n/Esc: Cancel")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[1]);

    frame.render_widget(block, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}
