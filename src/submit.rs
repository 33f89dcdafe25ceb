use serde::Serialize;
use std::fmt;
use std::thread::{self, JoinHandle};
use tracing::{error, info, info_span};

use crate::domain::SUBMIT_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    pub name: String,
    pub last_name: String,
    pub age: u32,
    pub key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    MissingName,
    MissingLastName,
    InvalidAge(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::MissingName => write!(f, "name is required"),
            FormError::MissingLastName => write!(f, "last name is required"),
            FormError::InvalidAge(age) => write!(f, "age must be a number of at least 1, got \"{age}\""),
        }
    }
}

/// Raw form input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDraft {
    pub name: String,
    pub last_name: String,
    pub age: String,
}

impl FormDraft {
    pub fn validate(&self) -> Result<SubmitPayload, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(FormError::MissingName);
        }
        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            return Err(FormError::MissingLastName);
        }
        let age = match self.age.trim().parse::<u32>() {
            Ok(age) if age >= 1 => age,
            _ => return Err(FormError::InvalidAge(self.age.clone())),
        };
        Ok(SubmitPayload {
            name: name.to_string(),
            last_name: last_name.to_string(),
            age,
            key: SUBMIT_KEY,
        })
    }
}

/// Posts the payload in the background. The outcome is only logged.
pub fn spawn_submit(url: String, payload: SubmitPayload) -> JoinHandle<()> {
    thread::spawn(move || {
        let span = info_span!("submit", url = %url);
        let _enter = span.enter();
        let response = reqwest::blocking::Client::new()
            .post(&url)
            .json(&payload)
            .send()
            .and_then(|r| r.error_for_status());
        match response.and_then(|r| r.text()) {
            Ok(body) => info!("Form submitted: {body}"),
            Err(e) => error!("Form submission failed: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, last_name: &str, age: &str) -> FormDraft {
        FormDraft {
            name: name.into(),
            last_name: last_name.into(),
            age: age.into(),
        }
    }

    #[test]
    fn valid_form_builds_payload_with_key() {
        let payload = draft(" Ivan ", "Franko", "42").validate().unwrap();
        assert_eq!(payload.name, "Ivan");
        assert_eq!(payload.age, 42);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Ivan", "lastName": "Franko", "age": 42, "key": "Kapran"})
        );
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(draft("  ", "Franko", "42").validate(), Err(FormError::MissingName));
        assert_eq!(draft("Ivan", "", "42").validate(), Err(FormError::MissingLastName));
    }

    #[test]
    fn age_must_be_positive_integer() {
        for age in ["0", "-3", "abc", ""] {
            assert!(matches!(
                draft("Ivan", "Franko", age).validate(),
                Err(FormError::InvalidAge(_))
            ));
        }
        assert!(draft("Ivan", "Franko", " 1 ").validate().is_ok());
    }
}
