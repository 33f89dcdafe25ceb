use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState},
};

use crate::columns::ColumnDescriptor;
use crate::domain::PTVConfig;
use crate::model::{Model, UIData};
use crate::pipeline::DerivedView;

pub const TITLE_HEIGHT: u16 = 1;
pub const FOOTER_HEIGHT: u16 = 1;
pub const CMDLINE_HEIGHT: u16 = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

#[derive(Debug)]
pub struct TableUI {
    max_column_width: usize,
}

impl TableUI {
    pub fn new(config: &PTVConfig) -> Self {
        Self {
            max_column_width: config.max_column_width,
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [title_area, table_area, footer_area, cmdline_area] = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(FOOTER_HEIGHT),
            Constraint::Length(CMDLINE_HEIGHT),
        ])
        .areas(frame.area());

        frame.render_widget(Self::title(&uidata), title_area);
        self.draw_table(&uidata, frame, table_area);
        frame.render_widget(Self::footer(uidata.view), footer_area);
        Self::draw_cmdline(&uidata, frame, cmdline_area);

        if uidata.show_columns {
            Self::draw_column_picker(&uidata, frame);
        }
        if uidata.show_popup {
            Self::draw_popup(&uidata, frame);
        }
    }

    fn title(uidata: &UIData) -> Line<'static> {
        let mut spans = vec![" ptv ".bold().reversed(), " ".into(), uidata.name.to_string().yellow()];
        if !uidata.search.is_empty() {
            spans.push("  search: ".into());
            spans.push(uidata.search.to_string().cyan());
        }
        Line::from(spans)
    }

    fn header_label(column: &ColumnDescriptor) -> String {
        let mut label = column.label.clone();
        if column.sort.is_active() {
            label.push(' ');
            label.push_str(column.sort.indicator());
        }
        if !column.filter.is_empty() {
            label.push_str(&format!(" [{}]", column.filter));
        }
        label
    }

    fn column_width(&self, column: &ColumnDescriptor, view: &DerivedView) -> u16 {
        let header = Self::header_label(column).chars().count();
        let widest = view
            .rows
            .iter()
            .map(|r| r.text(column.key).chars().count())
            .max()
            .unwrap_or(0);
        let width = std::cmp::max(header, widest) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, self.max_column_width) as u16
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().border_set(border::PLAIN);
        let visible = uidata.columns.visible();

        let placeholder = if uidata.loading {
            Some("Loading ...")
        } else if !uidata.columns.has_visible() {
            Some("All columns are hidden, press c to show them")
        } else if uidata.view.rows.is_empty() {
            Some("No records")
        } else {
            None
        };
        if let Some(text) = placeholder {
            let paragraph = Paragraph::new(Text::from(text).italic())
                .centered()
                .block(block);
            frame.render_widget(paragraph, area);
            return;
        }

        let widths: Vec<Constraint> = visible
            .iter()
            .map(|c| Constraint::Length(self.column_width(c, uidata.view)))
            .collect();
        let header = Row::new(
            visible
                .iter()
                .map(|c| Cell::from(Self::header_label(c)))
                .collect::<Vec<Cell>>(),
        )
        .style(Style::new().bold().underlined());
        let rows = uidata.view.rows.iter().map(|record| {
            Row::new(
                visible
                    .iter()
                    .map(|c| Cell::from(record.text(c.key)))
                    .collect::<Vec<Cell>>(),
            )
        });

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .column_spacing(1)
            .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .cell_highlight_style(Style::new().bold().yellow());

        let mut state = TableState::default();
        state.select(Some(uidata.selected_row));
        state.select_column(Some(uidata.selected_column));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn footer(view: &DerivedView) -> Line<'static> {
        Line::from(format!(
            " Page {}/{} · {} of {} records · {} per page ",
            view.pagination.current_page,
            view.total_pages().max(1),
            view.total_items,
            view.fetched_items,
            view.pagination.page_size,
        ))
        .dim()
    }

    fn draw_cmdline(uidata: &UIData, frame: &mut Frame, area: Rect) {
        match uidata.cmd_mode {
            Some(mode) => {
                let prompt = mode.prompt();
                let line = Line::from(vec![
                    Span::from(prompt.clone()).bold(),
                    Span::from(uidata.cmdinput.input.clone()),
                ]);
                frame.render_widget(line, area);
                let x = area.x + (prompt.chars().count() + uidata.cmdinput.curser_pos) as u16;
                frame.set_cursor_position(Position::new(
                    std::cmp::min(x, area.right().saturating_sub(1)),
                    area.y,
                ));
            }
            None => {
                let line = Line::from(vec![
                    Span::from(uidata.status_message.to_string()),
                    Span::from("  ? help").dim(),
                ]);
                frame.render_widget(line, area);
            }
        }
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
        let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
        let [area] = vertical.areas(area);
        let [area] = horizontal.areas(area);
        area
    }

    fn draw_popup(uidata: &UIData, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 60, 80);
        let block = Block::bordered()
            .title(Line::from(" Help ").centered())
            .title_bottom(Line::from(vec![" Close ".into(), "<Esc> ".blue().bold()]).centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(uidata.popup_message.to_string()).block(block), area);
    }

    fn draw_column_picker(uidata: &UIData, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 50, 60);
        let items: Vec<ListItem> = uidata
            .columns
            .iter()
            .map(|c| {
                let mark = if c.visible { "[x]" } else { "[ ]" };
                ListItem::new(format!("{mark} {} ({})", c.label, c.key))
            })
            .collect();
        let block = Block::bordered()
            .title(Line::from(" Columns ").centered())
            .title_bottom(
                Line::from(vec![
                    " Toggle ".into(),
                    "<Space>".blue().bold(),
                    " Close ".into(),
                    "<Esc> ".blue().bold(),
                ])
                .centered(),
            )
            .border_set(border::THICK);
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
        let mut state = ListState::default().with_selected(Some(uidata.columns_curser));
        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut state);
    }
}
