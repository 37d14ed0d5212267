//! Notification rule evaluation.
//!
//! A rule matches when every populated condition matches; empty condition
//! lists are wildcards, so a rule with no conditions matches every event.

use std::collections::HashMap;

use sentinel_common::types::{Activity, NotificationRule, Subscription};

/// The fields rules are evaluated against, extracted once per event.
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub event_kind: String,
    pub repo: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub metrics: HashMap<String, i64>,
}

impl RuleContext {
    pub fn from_activity(activity: &Activity, subscription: &Subscription) -> Self {
        let mut metrics = HashMap::new();
        if let Some(comments) = activity.extras.get("comments").and_then(|v| v.as_i64()) {
            metrics.insert("comments".to_string(), comments);
        }
        Self {
            event_kind: activity.kind.as_str().to_string(),
            repo: subscription.repo_ref.clone(),
            author: activity.author.login.clone(),
            title: activity.title.clone(),
            body: activity.body.clone(),
            metrics,
        }
    }

    pub fn for_report(subscription: Option<&Subscription>) -> Self {
        Self {
            event_kind: "report".to_string(),
            repo: subscription.map(|s| s.repo_ref.clone()).unwrap_or_default(),
            ..Default::default()
        }
    }
}

pub fn rule_matches(rule: &NotificationRule, ctx: &RuleContext) -> bool {
    if !rule.enabled {
        return false;
    }
    let conditions = &rule.conditions;

    if !conditions.event_kinds.is_empty() && !conditions.event_kinds.contains(&ctx.event_kind) {
        return false;
    }
    if !conditions.repos.is_empty() && !conditions.repos.contains(&ctx.repo) {
        return false;
    }
    if !conditions.authors.is_empty() && !conditions.authors.contains(&ctx.author) {
        return false;
    }
    if !conditions.keywords.is_empty() {
        let title = ctx.title.to_lowercase();
        let body = ctx.body.to_lowercase();
        let hit = conditions
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .any(|k| title.contains(&k) || body.contains(&k));
        if !hit {
            return false;
        }
    }
    for (metric, bound) in &conditions.thresholds {
        match ctx.metrics.get(metric) {
            Some(value) if value >= bound => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::types::{RuleActions, RuleConditions, RuleKind};

    fn rule(conditions: RuleConditions) -> NotificationRule {
        NotificationRule {
            id: "r".to_string(),
            owner_user_id: 1,
            kind: RuleKind::Activity,
            conditions,
            actions: RuleActions::default(),
            enabled: true,
        }
    }

    fn ctx() -> RuleContext {
        RuleContext {
            event_kind: "issue".to_string(),
            repo: "acme/widget".to_string(),
            author: "carol".to_string(),
            title: "Crash on startup".to_string(),
            body: "stack trace attached".to_string(),
            metrics: HashMap::from([("comments".to_string(), 5)]),
        }
    }

    #[test]
    fn empty_conditions_match_everything() {
        let rule = rule(RuleConditions::default());
        assert!(rule_matches(&rule, &ctx()));
        assert!(rule_matches(&rule, &RuleContext::default()));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut rule = rule(RuleConditions::default());
        rule.enabled = false;
        assert!(!rule_matches(&rule, &ctx()));
    }

    #[test]
    fn all_populated_conditions_must_hold() {
        let matching = rule(RuleConditions {
            event_kinds: vec!["issue".to_string()],
            repos: vec!["acme/widget".to_string()],
            authors: vec!["carol".to_string()],
            ..Default::default()
        });
        assert!(rule_matches(&matching, &ctx()));

        let wrong_repo = rule(RuleConditions {
            event_kinds: vec!["issue".to_string()],
            repos: vec!["other/repo".to_string()],
            ..Default::default()
        });
        assert!(!rule_matches(&wrong_repo, &ctx()));
    }

    #[test]
    fn keywords_match_case_insensitively_in_title_or_body() {
        let by_title = rule(RuleConditions {
            keywords: vec!["CRASH".to_string()],
            ..Default::default()
        });
        assert!(rule_matches(&by_title, &ctx()));

        let by_body = rule(RuleConditions {
            keywords: vec!["stack trace".to_string()],
            ..Default::default()
        });
        assert!(rule_matches(&by_body, &ctx()));

        let miss = rule(RuleConditions {
            keywords: vec!["performance".to_string()],
            ..Default::default()
        });
        assert!(!rule_matches(&miss, &ctx()));
    }

    #[test]
    fn thresholds_require_metric_at_or_above_bound() {
        let met = rule(RuleConditions {
            thresholds: HashMap::from([("comments".to_string(), 3)]),
            ..Default::default()
        });
        assert!(rule_matches(&met, &ctx()));

        let unmet = rule(RuleConditions {
            thresholds: HashMap::from([("comments".to_string(), 10)]),
            ..Default::default()
        });
        assert!(!rule_matches(&unmet, &ctx()));

        // A threshold on an absent metric cannot match.
        let absent = rule(RuleConditions {
            thresholds: HashMap::from([("reactions".to_string(), 1)]),
            ..Default::default()
        });
        assert!(!rule_matches(&absent, &ctx()));
    }
}
