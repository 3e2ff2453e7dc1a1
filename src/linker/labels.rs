//! Label and ticket-key extraction from titles and changed files.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ChangedFile;

/// `feat(login): ...` style tags in parentheses: `(feat/ci)`.
static COMMIT_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([\w/]+)\)").expect("valid regex"));

/// Conventional-commit prefix: `fix: ...` or `feat/ci(scope): ...`.
static COMMIT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w/]+)[:(]").expect("valid regex"));

static TICKET_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2,11}-\d{2,7}").expect("valid regex"));

pub const MIGRATION_LABEL: &str = "migration";
pub const SCRIPT_LABEL: &str = "script";
pub const BUGFIX_LABEL: &str = "bugfix";

/// Commit-type synonyms and the label each maps to.
const SYNONYMS: &[(&str, &str)] = &[
    ("base", "base"),
    ("bug", "bugfix"),
    ("bugfix", "bugfix"),
    ("chore", "chore"),
    ("ci", "ci"),
    ("deploy", "deploy"),
    ("doc", "document"),
    ("document", "document"),
    ("feat", "feature"),
    ("feature", "feature"),
    ("fix", "bugfix"),
    ("hotfix", "bugfix"),
    ("inf", "infrastructure"),
    ("infra", "infrastructure"),
    ("mi", "migration"),
    ("migration", "migration"),
    ("perf", "performance"),
    ("performance", "performance"),
    ("refact", "refactor"),
    ("refactor", "refactor"),
    ("research", "research"),
    ("rev", "revert"),
    ("revert", "revert"),
    ("style", "style"),
    ("unittest", "unittest"),
    ("ut", "unittest"),
];

fn synonym(tag: &str) -> Option<&'static str> {
    SYNONYMS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, label)| *label)
}

fn push_unique(labels: &mut Vec<&'static str>, label: &'static str) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

/// Labels implied by the commit-type tag in a title. The parenthesized form
/// wins over the prefix form; unknown tags are ignored.
pub fn commit_type_labels(title: &str) -> Vec<&'static str> {
    let Some(captures) = COMMIT_TAGS
        .captures(title)
        .or_else(|| COMMIT_PREFIX.captures(title))
    else {
        return Vec::new();
    };

    let mut labels = Vec::new();
    for tag in captures[1].split('/').flat_map(|part| part.split(',')) {
        let tag = tag.trim_matches(|c: char| c == ',' || c.is_whitespace()).to_lowercase();
        if let Some(label) = synonym(&tag) {
            push_unique(&mut labels, label);
        }
    }
    labels
}

/// Labels implied by newly added files.
pub fn file_labels(files: &[ChangedFile]) -> Vec<&'static str> {
    let mut labels = Vec::new();
    if files.iter().any(|f| f.is_new && f.path.contains("migrations")) {
        labels.push(MIGRATION_LABEL);
    }
    if files.iter().any(|f| f.is_new && f.path.contains("script")) {
        labels.push(SCRIPT_LABEL);
    }
    labels
}

/// Labels to add: everything implied by the files and title that the change
/// request does not carry yet, in a stable order.
pub fn missing_labels(title: &str, files: &[ChangedFile], present: &[String]) -> Vec<String> {
    let mut labels = file_labels(files);
    for label in commit_type_labels(title) {
        push_unique(&mut labels, label);
    }
    labels
        .into_iter()
        .filter(|label| !present.iter().any(|p| p == label))
        .map(str::to_string)
        .collect()
}

/// Ticket keys mentioned in a title, deduplicated in order of appearance.
pub fn ticket_keys(title: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for found in TICKET_KEY.find_iter(title) {
        if !keys.iter().any(|k| k == found.as_str()) {
            keys.push(found.as_str().to_string());
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, is_new: bool) -> ChangedFile {
        ChangedFile {
            path: path.to_string(),
            is_new,
        }
    }

    #[test]
    fn parenthesized_tags_map_through_synonyms() {
        assert_eq!(commit_type_labels("PROJ-123(feat/ci): add login"), vec!["feature", "ci"]);
        assert_eq!(commit_type_labels("PROJ-1 (Fix) crash"), vec!["bugfix"]);
    }

    #[test]
    fn prefix_form_is_used_without_parentheses() {
        assert_eq!(commit_type_labels("hotfix: crash on start"), vec!["bugfix"]);
        assert_eq!(commit_type_labels("perf/refact: faster"), vec!["performance", "refactor"]);
    }

    #[test]
    fn synonyms_collapse_to_one_label() {
        assert_eq!(commit_type_labels("(bug/fix/hotfix) x"), vec!["bugfix"]);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        assert!(commit_type_labels("(wip) something").is_empty());
        assert!(commit_type_labels("no tags here").is_empty());
        assert_eq!(commit_type_labels("(wip/ut) tests"), vec!["unittest"]);
    }

    #[test]
    fn only_new_files_imply_labels() {
        let files = vec![
            file("app/migrations/0002_add.py", true),
            file("scripts/cleanup.sh", false),
        ];
        assert_eq!(file_labels(&files), vec!["migration"]);

        let files = vec![file("tools/script/run.py", true)];
        assert_eq!(file_labels(&files), vec!["script"]);
    }

    #[test]
    fn missing_labels_skips_present_ones() {
        let files = vec![file("db/migrations/0001.sql", true)];
        let present = vec!["migration".to_string()];
        assert_eq!(
            missing_labels("PROJ-123(feat): add login", &files, &present),
            vec!["feature".to_string()]
        );
    }

    #[test]
    fn ticket_keys_are_deduplicated_in_order() {
        assert_eq!(
            ticket_keys("PROJ-123 QA-25 PROJ-123(feat): x"),
            vec!["PROJ-123".to_string(), "QA-25".to_string()]
        );
        assert!(ticket_keys("P-1 lowercase proj-123 short A-12").is_empty());
    }
}
