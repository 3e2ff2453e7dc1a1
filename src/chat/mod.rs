//! Chat platform integration.
//!
//! Notifications are interactive cards posted into rooms. The card model
//! here is platform-neutral; [`CardClient`] renders it into the Lark/Feishu
//! `interactive` message format.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod card_api;

pub use card_api::CardClient;

/// Header colour of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardTemplate {
    Blue,
    Green,
    Orange,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardElement {
    /// Markdown text. Mentions use `<at id=...></at>`.
    Markdown { content: String },
    Divider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub template: CardTemplate,
    pub elements: Vec<CardElement>,
}

impl Card {
    /// All markdown content, one element per line. For assertions and logs.
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|e| match e {
                CardElement::Markdown { content } => Some(content.as_str()),
                CardElement::Divider => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat platform rejected message (code {code}): {message}")]
    Remote { code: i64, message: String },

    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected chat response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub trait ChatClient: Send + Sync + 'static {
    fn send_card(&self, room: &str, card: &Card) -> impl Future<Output = Result<(), ChatError>> + Send;
}
