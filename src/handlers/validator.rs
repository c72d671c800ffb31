//! Input validation
//!
//! A failed check tells the user why (when an error message is configured)
//! and then stops every remaining handler of the event.

use super::templates::{Interpolated, Template, TemplateContext};
use super::{Handler, HandlerError};
use crate::definition::Check;
use crate::dispatcher::EventScope;
use crate::event::Event;
use crate::platform::{ChatApi, ChatRequest};
use async_trait::async_trait;
use std::sync::Arc;

pub struct Validator {
    api: Arc<dyn ChatApi>,
    error_message: Option<Interpolated>,
    checks: Vec<Check>,
}

impl Validator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        error_message: &str,
        checks: Vec<Check>,
    ) -> Result<Self, HandlerError> {
        let error_message = if error_message.is_empty() {
            None
        } else {
            Some(Interpolated::parse(error_message)?)
        };
        Ok(Self {
            api,
            error_message,
            checks,
        })
    }
}

fn passes(check: Check, text: &str) -> bool {
    match check {
        Check::NotEmpty => !text.is_empty(),
        Check::IsInt => text.parse::<i64>().is_ok(),
        Check::IsFloat => text.parse::<f64>().is_ok(),
        Check::IsBool => matches!(
            text,
            "1" | "t" | "T" | "true" | "TRUE" | "True" | "0" | "f" | "F" | "false" | "FALSE"
                | "False"
        ),
    }
}

#[async_trait]
impl Handler for Validator {
    async fn handle(&self, event: &Event, scope: &mut EventScope) -> Result<(), HandlerError> {
        // Anything but a message has no text to validate.
        let failed = match event.text() {
            Some(text) => self.checks.iter().copied().find(|c| !passes(*c, text)),
            None => self.checks.first().copied(),
        };
        let Some(check) = failed else {
            return Ok(());
        };
        tracing::debug!(chat_id = %event.chat_id, check = ?check, "Validation failed");

        if let Some(template) = &self.error_message {
            let text = template.format(&TemplateContext::new(event, scope))?;
            self.api
                .call(ChatRequest::SendMessage {
                    chat_id: event.chat_id,
                    text,
                    parse_mode: None,
                    markup: None,
                })
                .await?;
        }
        Err(HandlerError::ValidationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::testing::RecordingChatApi;
    use crate::event::ChatId;
    use crate::secrets::Secrets;

    fn scope() -> EventScope {
        EventScope::new(ChatId(1), Arc::new(Secrets::new()))
    }

    #[test]
    fn test_checks() {
        assert!(passes(Check::NotEmpty, "x"));
        assert!(!passes(Check::NotEmpty, ""));
        assert!(passes(Check::IsInt, "-12"));
        assert!(!passes(Check::IsInt, "1.5"));
        assert!(passes(Check::IsFloat, "1.5"));
        assert!(!passes(Check::IsFloat, "one"));
        assert!(passes(Check::IsBool, "True"));
        assert!(!passes(Check::IsBool, "yes"));
    }

    #[tokio::test]
    async fn test_failure_sends_message_and_short_circuits() {
        let api = Arc::new(RecordingChatApi::new());
        let validator = Validator::new(
            api.clone(),
            "'${message.text}' is not a number",
            vec![Check::NotEmpty, Check::IsInt],
        )
        .unwrap();

        validator
            .handle(&Event::message(1, 1, "42"), &mut scope())
            .await
            .unwrap();
        assert!(api.requests().is_empty());

        let err = validator
            .handle(&Event::message(1, 2, "abc"), &mut scope())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::ValidationFailed));
        assert_eq!(api.texts(), vec!["'abc' is not a number"]);
    }

    #[tokio::test]
    async fn test_silent_without_message() {
        let api = Arc::new(RecordingChatApi::new());
        let validator = Validator::new(api.clone(), "", vec![Check::IsBool]).unwrap();
        let err = validator
            .handle(&Event::message(1, 1, "maybe"), &mut scope())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::ValidationFailed));
        assert!(api.requests().is_empty());
    }
}
