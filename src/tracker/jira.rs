//! Jira REST (v2) client.

use serde::Deserialize;

use super::{IssueTracker, Ticket, TicketStatus, TrackerError};

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IssueSchema {
    key: String,
    fields: IssueFieldsSchema,
}

#[derive(Debug, Deserialize)]
struct IssueFieldsSchema {
    issuetype: NamedSchema,
    assignee: Option<UserSchema>,
    status: NamedSchema,
}

#[derive(Debug, Deserialize)]
struct NamedSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserSchema {
    /// Server and Data Center installations.
    name: Option<String>,
    /// Cloud installations.
    #[serde(rename = "accountId")]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionsSchema {
    transitions: Vec<TransitionSchema>,
}

#[derive(Debug, Deserialize)]
struct TransitionSchema {
    id: String,
    to: NamedSchema,
}

/// Jira's error envelope.
#[derive(Debug, Default, Deserialize)]
struct ErrorSchema {
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: std::collections::BTreeMap<String, String>,
}

impl JiraClient {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            token: token.into(),
        }
    }

    fn issue_url(&self, key: &str, suffix: &str) -> String {
        format!(
            "{}/rest/api/2/issue/{}{}",
            self.base_url,
            urlencoding::encode(key),
            suffix
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, TrackerError> {
        let response = request
            .basic_auth(&self.user, Some(&self.token))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::Remote {
            status,
            text: error_text(&body),
        })
    }
}

/// Flattens Jira's error envelope into one line, falling back to the raw body.
fn error_text(body: &str) -> String {
    let parsed: ErrorSchema = serde_json::from_str(body).unwrap_or_default();
    let mut parts = parsed.error_messages;
    parts.extend(parsed.errors.into_iter().map(|(field, msg)| format!("{field}: {msg}")));
    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}

impl IssueTracker for JiraClient {
    async fn get_ticket(&self, key: &str) -> Result<Ticket, TrackerError> {
        let response = self
            .send(
                self.http
                    .get(self.issue_url(key, ""))
                    .query(&[("fields", "issuetype,assignee,status")]),
            )
            .await?;
        let bytes = response.bytes().await?;
        let issue: IssueSchema = serde_json::from_slice(&bytes)?;

        Ok(Ticket {
            key: issue.key,
            issue_type: issue.fields.issuetype.name,
            assignee: issue.fields.assignee.and_then(|u| u.name.or(u.account_id)),
            status: issue.fields.status.name,
        })
    }

    async fn transition(&self, key: &str, status: TicketStatus) -> Result<bool, TrackerError> {
        let response = self
            .send(self.http.get(self.issue_url(key, "/transitions")))
            .await?;
        let bytes = response.bytes().await?;
        let available: TransitionsSchema = serde_json::from_slice(&bytes)?;

        let Some(transition) = available
            .transitions
            .into_iter()
            .find(|t| status.matches(&t.to.name))
        else {
            return Ok(false);
        };

        self.send(
            self.http
                .post(self.issue_url(key, "/transitions"))
                .json(&serde_json::json!({ "transition": { "id": transition.id } })),
        )
        .await?;
        Ok(true)
    }
}
