use serde::Deserialize;

use super::{Card, CardElement, CardTemplate, ChatClient, ChatError};

/// Client for a card-message API: `POST {base}/open-apis/im/v1/messages`
/// with a bearer token and `receive_id_type=chat_id`.
#[derive(Debug, Clone)]
pub struct CardClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    code: i64,
    #[serde(default)]
    msg: String,
}

impl CardClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

fn template_name(template: CardTemplate) -> &'static str {
    match template {
        CardTemplate::Blue => "blue",
        CardTemplate::Green => "green",
        CardTemplate::Orange => "orange",
        CardTemplate::Red => "red",
    }
}

/// The platform's card JSON.
pub(super) fn render(card: &Card) -> serde_json::Value {
    let elements: Vec<serde_json::Value> = card
        .elements
        .iter()
        .map(|element| match element {
            CardElement::Markdown { content } => serde_json::json!({
                "tag": "markdown",
                "content": content,
            }),
            CardElement::Divider => serde_json::json!({ "tag": "hr" }),
        })
        .collect();

    serde_json::json!({
        "config": { "wide_screen_mode": true },
        "header": {
            "template": template_name(card.template),
            "title": { "tag": "plain_text", "content": card.title },
        },
        "elements": elements,
    })
}

impl ChatClient for CardClient {
    async fn send_card(&self, room: &str, card: &Card) -> Result<(), ChatError> {
        let body = serde_json::json!({
            "receive_id": room,
            "msg_type": "interactive",
            // The API expects the card as a JSON string, not an object.
            "content": render(card).to_string(),
        });

        let response = self
            .http
            .post(format!("{}/open-apis/im/v1/messages", self.base_url))
            .query(&[("receive_id_type", "chat_id")])
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let bytes = response.bytes().await?;
        let reply: ApiReply = serde_json::from_slice(&bytes)?;
        if reply.code != 0 {
            return Err(ChatError::Remote {
                code: reply.code,
                message: reply.msg,
            });
        }
        Ok(())
    }
}
