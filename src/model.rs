use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::{debug, error, info, trace, warn};

use crate::columns::{ColumnDescriptor, ColumnRegistry};
use crate::domain::{CMDMode, HELP_TEXT, Message, PAGE_SIZE_OPTIONS, PTVConfig, PTVError};
use crate::export::{worksheet, write_worksheet};
use crate::inputter::{InputResult, Inputter};
use crate::pipeline::{self, DerivedView, Pagination, ViewState};
use crate::record::{Field, RecordStore};
use crate::source::{DataSource, FetchResult, expand_path, spawn_fetch};
use crate::submit::{FormDraft, spawn_submit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
    COLUMNS,
}

/// Everything the ui needs to draw one frame.
pub struct UIData<'a> {
    pub name: &'a str,
    pub search: &'a str,
    pub columns: &'a ColumnRegistry,
    pub view: &'a DerivedView,
    pub selected_row: usize,
    pub selected_column: usize,
    pub loading: bool,
    pub show_popup: bool,
    pub popup_message: &'a str,
    pub show_columns: bool,
    pub columns_curser: usize,
    pub cmd_mode: Option<CMDMode>,
    pub cmdinput: &'a InputResult,
    pub status_message: &'a str,
}

pub struct Model {
    config: PTVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    source_name: String,
    store: RecordStore,
    state: ViewState,
    view: DerivedView,
    curser_row: usize,
    curser_column: usize, // Index into the visible columns
    columns_curser: usize, // Index into the registry while picking columns
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    cmd_backup: String, // Value restored when a live edit is canceled
    last_input: InputResult,
    form: FormDraft,
    popup_message: String,
    status_message: String,
    pending: Option<Receiver<FetchResult>>,
    clipboard: Option<Clipboard>,
}

impl Model {
    pub fn init(config: &PTVConfig) -> Result<Self, PTVError> {
        let state = ViewState {
            search: String::new(),
            columns: config.columns.clone(),
            pagination: Pagination::new(config.page_size),
        };
        Ok(Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            source_name: String::new(),
            store: RecordStore::default(),
            view: DerivedView {
                pagination: state.pagination,
                ..Default::default()
            },
            state,
            curser_row: 0,
            curser_column: 0,
            columns_curser: 0,
            input: Inputter::default(),
            cmd_mode: None,
            cmd_backup: String::new(),
            last_input: InputResult::default(),
            form: FormDraft::default(),
            popup_message: String::new(),
            status_message: "Started ptv!".to_string(),
            pending: None,
            clipboard: None,
        })
    }

    /// Issues the one fetch of this session in the background.
    pub fn start_fetch(&mut self, source: DataSource) {
        self.source_name = source.name();
        self.attach(spawn_fetch(source));
    }

    fn attach(&mut self, pending: Receiver<FetchResult>) {
        self.pending = Some(pending);
        self.status = Status::LOADING;
        self.store = RecordStore::default();
        self.view = DerivedView {
            pagination: self.state.pagination,
            ..Default::default()
        };
        self.set_status_message("Loading ...");
    }

    fn poll_fetch(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        let result = match pending.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                Err(PTVError::LoadingFailed("fetch ended without a result".into()))
            }
        };
        self.pending = None;
        self.finish_fetch(result);
    }

    fn finish_fetch(&mut self, result: FetchResult) {
        match result.and_then(|records| RecordStore::load(records, &self.state.columns)) {
            Ok(store) => {
                info!("Loaded {} records", store.len());
                self.store = store;
                self.status = Status::READY;
                self.refresh();
                if self.store.is_empty() {
                    self.set_status_message("No records received");
                } else {
                    self.set_status_message(format!("Loaded {} records", self.store.len()));
                }
            }
            Err(e) => {
                error!("Loading records failed: {e}");
                self.store = RecordStore::default();
                self.status = Status::EMPTY;
                self.refresh();
                self.set_status_message(format!("Loading failed: {e}"));
            }
        }
    }

    #[cfg(test)]
    pub fn set_records(&mut self, records: Vec<crate::record::Record>) {
        self.finish_fetch(Ok(records));
    }

    pub fn is_loading(&self) -> bool {
        self.status == Status::LOADING
    }

    /// Re-derives the visible page from the full store.
    fn refresh(&mut self) {
        match pipeline::run(self.store.records(), &self.state) {
            Ok(view) => self.view = view,
            Err(e) => {
                error!("Updating table failed: {e}");
                self.view = DerivedView {
                    fetched_items: self.store.len(),
                    pagination: self.state.pagination,
                    ..Default::default()
                };
                self.set_status_message(e.to_string());
            }
        }
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        self.curser_row = std::cmp::min(self.curser_row, self.view.rows.len().saturating_sub(1));
        let visible = self.state.columns.visible().len();
        self.curser_column = std::cmp::min(self.curser_column, visible.saturating_sub(1));
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        trace!("Status: {}", self.status_message);
    }

    pub fn get_uidata(&self) -> UIData<'_> {
        UIData {
            name: &self.source_name,
            search: &self.state.search,
            columns: &self.state.columns,
            view: &self.view,
            selected_row: self.curser_row,
            selected_column: self.curser_column,
            loading: self.is_loading(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: &self.popup_message,
            show_columns: self.modus == Modus::COLUMNS,
            columns_curser: self.columns_curser,
            cmd_mode: self.cmd_mode,
            cmdinput: &self.last_input,
            status_message: &self.status_message,
        }
    }

    pub fn view_state(&self) -> &ViewState {
        &self.state
    }

    pub fn derived_view(&self) -> &DerivedView {
        &self.view
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PTVError> {
        self.poll_fetch();

        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::Help => self.show_help(),
                    Message::MoveUp => self.curser_row = self.curser_row.saturating_sub(1),
                    Message::MoveDown => self.move_row_down(),
                    Message::MoveLeft => {
                        self.curser_column = self.curser_column.saturating_sub(1)
                    }
                    Message::MoveRight => self.move_column_right(),
                    Message::NextPage => {
                        self.state.pagination.next(self.view.total_items);
                        self.refresh();
                    }
                    Message::PrevPage => {
                        self.state.pagination.previous(self.view.total_items);
                        self.refresh();
                    }
                    Message::FirstPage => {
                        self.state.pagination.go_to(1, self.view.total_items);
                        self.refresh();
                    }
                    Message::LastPage => {
                        self.state
                            .pagination
                            .go_to(self.view.total_pages(), self.view.total_items);
                        self.refresh();
                    }
                    Message::CyclePageSize => self.cycle_page_size(),
                    Message::Search => {
                        let current = self.state.search.clone();
                        self.enter_cmd_mode(CMDMode::Search, &current);
                    }
                    Message::Filter => {
                        if let Some(column) = self.current_column().cloned() {
                            self.enter_cmd_mode(CMDMode::Filter(column.key), &column.filter);
                        }
                    }
                    Message::ClearFilters => {
                        self.state.columns.clear_filters();
                        self.state.pagination.current_page = 1;
                        self.refresh();
                        self.set_status_message("Cleared all filters");
                    }
                    Message::ToggleSort => {
                        if let Some(field) = self.current_field() {
                            self.state.columns.toggle_sort(field);
                            self.refresh();
                        }
                    }
                    Message::ClearSort => {
                        if let Some(field) = self.current_field() {
                            self.state.columns.clear_sort(field);
                            self.refresh();
                        }
                    }
                    Message::Columns => self.enter_columns_mode(),
                    Message::Export => {
                        let path = self.config.export_path.clone();
                        self.enter_cmd_mode(CMDMode::Export, &path);
                    }
                    Message::CopyRow => self.copy_table_row(),
                    Message::Form => self.start_form(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Enter | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::COLUMNS => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveUp => {
                        self.columns_curser = self.columns_curser.saturating_sub(1)
                    }
                    Message::MoveDown => {
                        if self.columns_curser + 1 < self.state.columns.len() {
                            self.columns_curser += 1;
                        }
                    }
                    Message::ToggleColumn | Message::Enter => self.toggle_column_visibility(),
                    Message::Exit | Message::Columns => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    }
                }
            }
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE | Modus::CMDINPUT => {}
            Modus::POPUP | Modus::COLUMNS => {
                self.modus = self.previous_modus;
                self.previous_modus = Modus::TABLE;
            }
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = HELP_TEXT.to_string();
    }

    fn enter_columns_mode(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::COLUMNS;
        self.columns_curser = 0;
    }

    fn current_column(&self) -> Option<&ColumnDescriptor> {
        self.state.columns.visible().get(self.curser_column).copied()
    }

    fn current_field(&self) -> Option<Field> {
        self.current_column().map(|c| c.key)
    }

    fn move_row_down(&mut self) {
        if self.curser_row + 1 < self.view.rows.len() {
            self.curser_row += 1;
        }
    }

    fn move_column_right(&mut self) {
        if self.curser_column + 1 < self.state.columns.visible().len() {
            self.curser_column += 1;
        }
    }

    fn cycle_page_size(&mut self) {
        let current = self.state.pagination.page_size;
        let next = PAGE_SIZE_OPTIONS
            .iter()
            .copied()
            .find(|&size| size > current)
            .unwrap_or(PAGE_SIZE_OPTIONS[0]);
        self.state.pagination.set_page_size(next);
        self.refresh();
        self.set_status_message(format!("{next} rows per page"));
    }

    // Visibility only affects rendering, the row set stays as it is.
    fn toggle_column_visibility(&mut self) {
        let keys = self.state.columns.keys();
        if let Some(&field) = keys.get(self.columns_curser) {
            self.state.columns.toggle_visibility(field);
            self.clamp_cursor();
            let shown = if self.state.columns.is_visible(field) { "shown" } else { "hidden" };
            self.set_status_message(format!("Column {field} {shown}"));
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, prefill: &str) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.cmd_backup = prefill.to_string();
        self.input.start(prefill);
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_cmd_input();
            return;
        }
        // Search and filters follow every keystroke
        let text = self.last_input.input.clone();
        match self.cmd_mode {
            Some(CMDMode::Search) => self.apply_search(&text),
            Some(CMDMode::Filter(field)) => self.apply_filter(field, &text),
            _ => {}
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let Some(mode) = self.cmd_mode.take() else {
            warn!("Finished input without a command mode");
            return;
        };
        let cmd_input = self.last_input.input.clone();
        let canceled = self.last_input.canceled;
        self.last_input = InputResult::default();

        if canceled {
            let backup = self.cmd_backup.clone();
            match mode {
                CMDMode::Search => self.apply_search(&backup),
                CMDMode::Filter(field) => self.apply_filter(field, &backup),
                CMDMode::FormName | CMDMode::FormLastName | CMDMode::FormAge => {
                    self.set_status_message("Form canceled")
                }
                CMDMode::Export => {}
            }
            return;
        }

        match mode {
            CMDMode::Search => self.apply_search(&cmd_input),
            CMDMode::Filter(field) => self.apply_filter(field, &cmd_input),
            CMDMode::Export => self.export(&cmd_input),
            CMDMode::FormName => {
                self.form.name = cmd_input;
                self.enter_cmd_mode(CMDMode::FormLastName, "");
            }
            CMDMode::FormLastName => {
                self.form.last_name = cmd_input;
                self.enter_cmd_mode(CMDMode::FormAge, "");
            }
            CMDMode::FormAge => {
                self.form.age = cmd_input;
                self.submit_form();
            }
        }
    }

    fn apply_search(&mut self, text: &str) {
        self.state.search = text.trim().to_string();
        self.state.pagination.current_page = 1;
        self.refresh();
        if self.status == Status::READY {
            self.set_status_message(format!("Found {} results", self.view.total_items));
        }
    }

    fn apply_filter(&mut self, field: Field, text: &str) {
        self.state.columns.set_filter(field, text);
        self.state.pagination.current_page = 1;
        self.refresh();
    }

    fn export(&mut self, path: &str) {
        let result = expand_path(path.trim()).and_then(|target| {
            let grid = worksheet(&self.view.rows, &self.state.columns);
            write_worksheet(&grid, &target).map(|rows| (rows, target))
        });
        match result {
            Ok((rows, target)) => {
                self.config.export_path = path.trim().to_string();
                self.set_status_message(format!("Exported {rows} rows to {}", target.display()));
            }
            Err(e) => {
                error!("Export failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    fn start_form(&mut self) {
        if self.config.submit_url.is_none() {
            self.set_status_message("Form submission is disabled, no submit url configured");
            return;
        }
        self.form = FormDraft::default();
        self.enter_cmd_mode(CMDMode::FormName, "");
    }

    fn submit_form(&mut self) {
        let Some(url) = self.config.submit_url.clone() else {
            return;
        };
        match self.form.validate() {
            Ok(payload) => {
                debug!("Submitting form for {} {}", payload.name, payload.last_name);
                spawn_submit(url, payload);
                self.set_status_message("Form sent");
            }
            Err(e) => self.set_status_message(format!("Form not sent: {e}")),
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',' || c == '"');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    /// The selected record as a csv line over the visible columns.
    pub fn selected_row_as_csv(&self) -> Option<String> {
        let record = self.view.rows.get(self.curser_row)?;
        let content = self
            .state
            .columns
            .visible()
            .iter()
            .map(|c| Model::wrap_cell_content(&record.text(c.key)))
            .collect::<Vec<String>>();
        Some(content.join(","))
    }

    fn copy_table_row(&mut self) {
        let Some(row_content) = self.selected_row_as_csv() else {
            return;
        };
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    let e = PTVError::Clipboard(e.to_string());
                    error!("{e}");
                    self.set_status_message(e.to_string());
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(row_content) {
                Ok(_) => self.set_status_message("Copied row to clipboard"),
                Err(e) => self.set_status_message(PTVError::Clipboard(e.to_string()).to_string()),
            }
        }
    }
}
