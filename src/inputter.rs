use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

/// Single line editor used for the search, filter, export and form prompts.
/// The cursor counts characters, not bytes.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.current_input.clear();
                self.curser_pos = 0;
                self.get()
            }
            (kc, km) => self.key(kc, km),
        }
    }

    /// Starts a new edit with `s` prefilled and the cursor at its end.
    pub fn start(&mut self, s: &str) {
        self.clear();
        self.current_input = s.to_string();
        self.curser_pos = s.chars().count();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let idx = self.getbytepos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            let idx = self.getbytepos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, modifier: KeyModifiers) -> InputResult {
        if modifier.contains(KeyModifiers::CONTROL) || modifier.contains(KeyModifiers::ALT) {
            trace!("Ignoring {code:?} with {modifier:?}");
        } else if let Some(chr) = code.as_char() {
            self.current_input.insert(self.getbytepos(), chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(inputter: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(inputter, KeyCode::Char(c));
        }
    }

    #[test]
    fn edits_at_cursor_position() {
        let mut inputter = Inputter::default();
        type_str(&mut inputter, "asprin");
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Left);
        type_str(&mut inputter, "i");
        assert_eq!(inputter.get().input, "aspirin");

        press(&mut inputter, KeyCode::Home);
        press(&mut inputter, KeyCode::Delete);
        press(&mut inputter, KeyCode::End);
        let result = press(&mut inputter, KeyCode::Backspace);
        assert_eq!(result.input, "spiri");
        assert_eq!(result.curser_pos, 5);
    }

    #[test]
    fn handles_multibyte_characters() {
        let mut inputter = Inputter::default();
        inputter.start("МНН");
        assert_eq!(inputter.get().curser_pos, 3);
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Backspace);
        type_str(&mut inputter, "ü");
        assert_eq!(inputter.get().input, "МüН");
    }

    #[test]
    fn enter_finishes_and_escape_cancels() {
        let mut inputter = Inputter::default();
        type_str(&mut inputter, "mg");
        let result = press(&mut inputter, KeyCode::Enter);
        assert!(result.finished && !result.canceled);
        assert_eq!(result.input, "mg");

        inputter.start("x");
        let result = press(&mut inputter, KeyCode::Esc);
        assert!(result.finished && result.canceled);
    }

    #[test]
    fn control_u_clears_line() {
        let mut inputter = Inputter::default();
        inputter.start("paracetamol");
        let result = inputter.read(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert_eq!(result.input, "");
        assert_eq!(result.curser_pos, 0);
    }
}
