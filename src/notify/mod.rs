//! Merge notifications.
//!
//! When a human-authored change request merges, a card goes to every chat
//! room whose routing rule matches the change request's branches.

use tracing::{debug, instrument, warn};

use crate::chat::{Card, CardElement, CardTemplate, ChatClient};
use crate::config::{ProjectConfig, RoomRule};
use crate::effects::HostConnector;
use crate::engine::Engine;
use crate::tracker::IssueTracker;
use crate::types::{ChangeRequest, RepoId};

/// Strips template boilerplate from a description. Returns an empty string
/// when nothing but the title is left.
pub fn clean_description(cr: &ChangeRequest, noise: &[String]) -> String {
    let mut text = cr.description_text().to_string();
    for fragment in noise.iter().filter(|f| !f.is_empty()) {
        text = text.replace(fragment.as_str(), "");
    }
    let text = text.trim();
    if text == cr.title.trim() {
        String::new()
    } else {
        text.to_string()
    }
}

/// Builds the card. `mention` is the author's chat id when the directory
/// knows them; otherwise the raw login is shown.
pub fn build_card(project: &RepoId, cr: &ChangeRequest, mention: Option<&str>, noise: &[String]) -> Card {
    let mut elements = vec![
        CardElement::Markdown {
            content: format!("**Title**\n[{}]({})", cr.title, cr.web_url),
        },
        CardElement::Markdown {
            content: format!("**Direction**\n{} -> {}", cr.source_branch, cr.target_branch),
        },
    ];

    let description = clean_description(cr, noise);
    if !description.is_empty() {
        elements.push(CardElement::Markdown {
            content: format!("**Description**\n{description}"),
        });
    }

    let author = match mention {
        Some(id) => format!("<at id={id}></at>"),
        None => cr.author.clone(),
    };
    elements.push(CardElement::Divider);
    elements.push(CardElement::Markdown {
        content: format!("**Author**\n{author}"),
    });

    Card {
        title: format!("{project} merged a change request"),
        template: CardTemplate::Blue,
        elements,
    }
}

/// Rooms whose rule matches, each listed once in configuration order.
pub fn matching_rooms<'a>(rules: &'a [RoomRule], cr: &ChangeRequest) -> Vec<&'a str> {
    let mut rooms: Vec<&str> = Vec::new();
    for rule in rules {
        if rule.matches(&cr.source_branch, &cr.target_branch) && !rooms.contains(&rule.room.as_str()) {
            rooms.push(&rule.room);
        }
    }
    rooms
}

impl<H, T, C> Engine<H, T, C>
where
    H: HostConnector,
    T: IssueTracker,
    C: ChatClient,
{
    /// Sends the merge card to every matching room. Returns how many sends
    /// succeeded; failures are logged per room.
    #[instrument(skip(self, project, cr), fields(repo = %project.repo, number = %cr.number))]
    pub async fn notify_merged(&self, project: &ProjectConfig, cr: &ChangeRequest) -> usize {
        let rooms = matching_rooms(&project.rooms, cr);
        if rooms.is_empty() {
            debug!("no room routes this change request");
            return 0;
        }

        let config = self.config();
        let mention = config.directory.get(&cr.author).map(String::as_str);
        let card = build_card(&project.repo, cr, mention, &config.description_noise);

        let mut sent = 0;
        for room in rooms {
            match self.chat().send_card(room, &card).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(%room, error = %e, "failed to send merge notification"),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestHarness, change_request};
    use crate::types::CrState;

    fn rule(room: &str, target: &str, source: &str) -> RoomRule {
        RoomRule {
            room: room.to_string(),
            target_branch: target.to_string(),
            source_branch: source.to_string(),
        }
    }

    #[test]
    fn card_contains_link_direction_and_mention() {
        let mut cr = change_request(42, "PROJ-123(feat): add login", "alice", CrState::Merged);
        cr.description = Some("Adds the login page.".to_string());

        let card = build_card(&RepoId::new("acme", "app"), &cr, Some("ou_alice"), &[]);

        assert_eq!(card.title, "acme/app merged a change request");
        let text = card.text();
        assert!(text.contains(&format!("[PROJ-123(feat): add login]({})", cr.web_url)));
        assert!(text.contains("feature/x -> dev"));
        assert!(text.contains("Adds the login page."));
        assert!(text.contains("<at id=ou_alice></at>"));
    }

    #[test]
    fn unknown_author_is_shown_by_login() {
        let cr = change_request(42, "x", "alice", CrState::Merged);
        let card = build_card(&RepoId::new("acme", "app"), &cr, None, &[]);
        assert!(card.text().ends_with("**Author**\nalice"));
    }

    #[test]
    fn description_equal_to_title_is_dropped() {
        let mut cr = change_request(42, "Fix crash", "alice", CrState::Merged);
        cr.description = Some("- [ ] Tested on device\nFix crash\n".to_string());

        let noise = vec!["- [ ] Tested on device\n".to_string()];
        assert_eq!(clean_description(&cr, &noise), "");
        assert!(!build_card(&cr.target_repo, &cr, None, &noise).text().contains("Description"));
    }

    #[test]
    fn rooms_match_on_branch_substrings() {
        let rules = vec![
            rule("oc_dev", "dev", ""),
            rule("oc_hotfix", "dev", "hotfix"),
            rule("oc_master", "master", ""),
            rule("oc_dev", "de", ""),
        ];
        let cr = change_request(42, "x", "alice", CrState::Merged);
        assert_eq!(matching_rooms(&rules, &cr), vec!["oc_dev"]);

        let mut hotfix = cr.clone();
        hotfix.source_branch = "hotfix/login".to_string();
        assert_eq!(matching_rooms(&rules, &hotfix), vec!["oc_dev", "oc_hotfix"]);
    }

    #[tokio::test]
    async fn send_failure_in_one_room_does_not_stop_others() {
        let harness = TestHarness::new();
        harness.chat.fail_room("oc_broken");
        let project = ProjectConfig {
            repo: RepoId::new("acme", "app"),
            ticket_linking: true,
            rooms: vec![rule("oc_broken", "dev", ""), rule("oc_dev", "dev", "")],
        };
        let cr = change_request(42, "x", "alice", CrState::Merged);

        let sent = harness.engine.notify_merged(&project, &cr).await;

        assert_eq!(sent, 1);
        let cards = harness.chat.sent();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].0, "oc_dev");
    }
}
