use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, PTVConfig, PTVError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &PTVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, PTVError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            if model.raw_keyevents() {
                return Ok(Some(Message::RawKey(key)));
            }
            return Ok(self.handle_key(key));
        }
        Ok(None)
    }

    pub fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageDown, _) | (KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::PageUp, _) | (KeyCode::Char('p'), _) => Some(Message::PrevPage),
            (KeyCode::Home, _) | (KeyCode::Char('g'), _) => Some(Message::FirstPage),
            (KeyCode::End, _) | (KeyCode::Char('G'), _) => Some(Message::LastPage),
            (KeyCode::Char('+'), _) => Some(Message::CyclePageSize),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('f'), _) => Some(Message::Filter),
            (KeyCode::Char('F'), _) => Some(Message::ClearFilters),
            (KeyCode::Char('s'), _) => Some(Message::ToggleSort),
            (KeyCode::Char('S'), _) => Some(Message::ClearSort),
            (KeyCode::Char('c'), _) => Some(Message::Columns),
            (KeyCode::Char(' '), _) => Some(Message::ToggleColumn),
            (KeyCode::Char('e'), _) => Some(Message::Export),
            (KeyCode::Char('y'), _) => Some(Message::CopyRow),
            (KeyCode::Char('a'), _) => Some(Message::Form),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
