//! Normalization of upstream items into activity drafts, plus the
//! subscription filter pass.

use sentinel_common::types::{
    clamp_text, ActivityAuthor, ActivityDraft, ActivityKind, SubscriptionFilters, BODY_MAX,
    TITLE_MAX,
};
use sentinel_common::time::parse_timestamp;
use sentinel_github::{CommitItem, IssueItem, PullItem, ReleaseItem};

pub fn commit_draft(subscription_id: i64, item: &CommitItem) -> ActivityDraft {
    let message = &item.commit.message;
    let first_line = message.lines().next().unwrap_or_default();
    // Commits carry one timestamp; it serves as both created and updated.
    let when = parse_timestamp(&item.commit.author.date);
    ActivityDraft {
        subscription_id,
        kind: ActivityKind::Commit,
        external_id: item.sha.clone(),
        title: clamp_text(first_line, TITLE_MAX),
        body: clamp_text(message, BODY_MAX),
        url: item.html_url.clone(),
        author: ActivityAuthor {
            login: item
                .author
                .as_ref()
                .map(|a| a.login.clone())
                .unwrap_or_default(),
            display_name: Some(item.commit.author.name.clone()),
            avatar_url: item.author.as_ref().and_then(|a| a.avatar_url.clone()),
        },
        labels: Vec::new(),
        assignees: Vec::new(),
        state: None,
        extras: serde_json::json!({}),
        source_created_at: when,
        source_updated_at: when,
    }
}

pub fn issue_draft(subscription_id: i64, item: &IssueItem) -> ActivityDraft {
    ActivityDraft {
        subscription_id,
        kind: ActivityKind::Issue,
        external_id: item.number.to_string(),
        title: clamp_text(&item.title, TITLE_MAX),
        body: clamp_text(item.body.as_deref().unwrap_or_default(), BODY_MAX),
        url: item.html_url.clone(),
        author: author_of(item.user.as_ref()),
        labels: item.labels.iter().map(|l| l.name.clone()).collect(),
        assignees: item.assignees.iter().map(|a| a.login.clone()).collect(),
        state: Some(item.state.clone()),
        extras: serde_json::json!({
            "milestone": item.milestone.as_ref().map(|m| m.title.clone()),
            "comments": item.comments,
        }),
        source_created_at: parse_timestamp(&item.created_at),
        source_updated_at: parse_timestamp(&item.updated_at),
    }
}

pub fn pull_draft(subscription_id: i64, item: &PullItem) -> ActivityDraft {
    ActivityDraft {
        subscription_id,
        kind: ActivityKind::PullRequest,
        external_id: item.number.to_string(),
        title: clamp_text(&item.title, TITLE_MAX),
        body: clamp_text(item.body.as_deref().unwrap_or_default(), BODY_MAX),
        url: item.html_url.clone(),
        author: author_of(item.user.as_ref()),
        labels: item.labels.iter().map(|l| l.name.clone()).collect(),
        assignees: item.assignees.iter().map(|a| a.login.clone()).collect(),
        state: Some(item.state.clone()),
        extras: serde_json::json!({
            "milestone": item.milestone.as_ref().map(|m| m.title.clone()),
            "is_draft": item.draft,
            "is_merged": item.merged_at.is_some(),
        }),
        source_created_at: parse_timestamp(&item.created_at),
        source_updated_at: parse_timestamp(&item.updated_at),
    }
}

pub fn release_draft(subscription_id: i64, item: &ReleaseItem) -> ActivityDraft {
    let title = item
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| item.tag_name.clone());
    ActivityDraft {
        subscription_id,
        kind: ActivityKind::Release,
        external_id: item.id.to_string(),
        title: clamp_text(&title, TITLE_MAX),
        body: clamp_text(item.body.as_deref().unwrap_or_default(), BODY_MAX),
        url: item.html_url.clone(),
        author: author_of(item.author.as_ref()),
        labels: Vec::new(),
        assignees: Vec::new(),
        state: None,
        extras: serde_json::json!({
            "tag": item.tag_name,
            "draft": item.draft,
            "prerelease": item.prerelease,
        }),
        source_created_at: parse_timestamp(&item.created_at),
        source_updated_at: item
            .published_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&item.created_at)),
    }
}

fn author_of(user: Option<&sentinel_github::models::UserRef>) -> ActivityAuthor {
    match user {
        Some(user) => ActivityAuthor {
            login: user.login.clone(),
            display_name: None,
            avatar_url: user.avatar_url.clone(),
        },
        None => ActivityAuthor {
            login: "unknown".to_string(),
            display_name: None,
            avatar_url: None,
        },
    }
}

/// Keep a draft only when it passes every populated filter:
/// author not excluded, no excluded label, and (when an include list is
/// set) at least one included label.
pub fn passes_filters(draft: &ActivityDraft, filters: &SubscriptionFilters) -> bool {
    if filters
        .exclude_authors
        .iter()
        .any(|a| a.eq_ignore_ascii_case(&draft.author.login))
    {
        return false;
    }
    if draft
        .labels
        .iter()
        .any(|label| filters.exclude_labels.iter().any(|x| x == label))
    {
        return false;
    }
    if !filters.include_labels.is_empty()
        && !draft
            .labels
            .iter()
            .any(|label| filters.include_labels.iter().any(|x| x == label))
    {
        return false;
    }
    true
}
