//! Deterministic report rendering: a stats table, the AI paragraphs, and a
//! section per activity kind, in markdown or HTML.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use sentinel_common::time::format_display;
use sentinel_common::types::{Activity, ActivityKind, ReportStats};

pub struct RenderInput<'a> {
    pub title: &'a str,
    pub repo: &'a str,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: &'a str,
    pub trends: &'a str,
    pub stats: ReportStats,
    pub activities: &'a [Activity],
    pub tz: Tz,
}

const KIND_SECTIONS: [(ActivityKind, &str); 4] = [
    (ActivityKind::Commit, "Commits"),
    (ActivityKind::Issue, "Issues"),
    (ActivityKind::PullRequest, "Pull Requests"),
    (ActivityKind::Release, "Releases"),
];

/// Cap per-kind listings so a busy week stays readable.
const MAX_ITEMS_PER_SECTION: usize = 25;

pub fn render_markdown(input: &RenderInput<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", input.title));
    out.push_str(&format!(
        "**Repository:** {}  \n**Period:** {} — {}\n\n",
        input.repo,
        format_display(input.period_start, input.tz),
        format_display(input.period_end, input.tz),
    ));

    out.push_str("## Summary\n\n");
    out.push_str(input.summary);
    out.push_str("\n\n## Trends\n\n");
    out.push_str(input.trends);

    out.push_str("\n\n## Activity\n\n");
    out.push_str("| Kind | Count |\n|------|-------|\n");
    out.push_str(&format!("| Commits | {} |\n", input.stats.commits));
    out.push_str(&format!("| Issues | {} |\n", input.stats.issues));
    out.push_str(&format!("| Pull Requests | {} |\n", input.stats.pull_requests));
    out.push_str(&format!("| Releases | {} |\n", input.stats.releases));

    for (kind, heading) in KIND_SECTIONS {
        let items: Vec<&Activity> = input
            .activities
            .iter()
            .filter(|a| a.kind == kind)
            .collect();
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {heading}\n\n"));
        for activity in items.iter().take(MAX_ITEMS_PER_SECTION) {
            let when = activity
                .source_created_at
                .map(|t| format_display(t, input.tz))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "- [{}]({}) — {} ({})\n",
                activity.title, activity.url, activity.author.login, when
            ));
        }
        if items.len() > MAX_ITEMS_PER_SECTION {
            out.push_str(&format!(
                "- … and {} more\n",
                items.len() - MAX_ITEMS_PER_SECTION
            ));
        }
    }
    out
}

pub fn render_html(input: &RenderInput<'_>) -> String {
    let mut sections = String::new();
    for (kind, heading) in KIND_SECTIONS {
        let items: Vec<&Activity> = input
            .activities
            .iter()
            .filter(|a| a.kind == kind)
            .collect();
        if items.is_empty() {
            continue;
        }
        sections.push_str(&format!("<h2>{heading}</h2>\n<ul>\n"));
        for activity in items.iter().take(MAX_ITEMS_PER_SECTION) {
            sections.push_str(&format!(
                "  <li><a href=\"{}\">{}</a> — {}</li>\n",
                activity.url,
                escape(&activity.title),
                escape(&activity.author.login)
            ));
        }
        sections.push_str("</ul>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body style="font-family:-apple-system,'Segoe UI',Roboto,sans-serif;max-width:720px;margin:0 auto;padding:24px;color:#24292f">
<h1>{title}</h1>
<p><strong>Repository:</strong> {repo}<br>
<strong>Period:</strong> {start} — {end}</p>
<h2>Summary</h2>
<p>{summary}</p>
<h2>Trends</h2>
<p>{trends}</p>
<h2>Activity</h2>
<table border="1" cellpadding="6" cellspacing="0">
<tr><th>Kind</th><th>Count</th></tr>
<tr><td>Commits</td><td>{commits}</td></tr>
<tr><td>Issues</td><td>{issues}</td></tr>
<tr><td>Pull Requests</td><td>{pulls}</td></tr>
<tr><td>Releases</td><td>{releases}</td></tr>
</table>
{sections}
</body>
</html>"#,
        title = escape(input.title),
        repo = escape(input.repo),
        start = format_display(input.period_start, input.tz),
        end = format_display(input.period_end, input.tz),
        summary = escape(input.summary),
        trends = escape(input.trends),
        commits = input.stats.commits,
        issues = input.stats.issues,
        pulls = input.stats.pull_requests,
        releases = input.stats.releases,
        sections = sections,
    )
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_common::types::ActivityAuthor;

    fn activity(kind: ActivityKind, title: &str) -> Activity {
        Activity {
            id: 1,
            subscription_id: 7,
            kind,
            external_id: "1".to_string(),
            title: title.to_string(),
            body: String::new(),
            url: "https://example.com".to_string(),
            author: ActivityAuthor {
                login: "bob".to_string(),
                display_name: None,
                avatar_url: None,
            },
            labels: vec![],
            assignees: vec![],
            state: None,
            extras: serde_json::Value::Null,
            source_created_at: Some(Utc::now()),
            source_updated_at: Some(Utc::now()),
            ingested_at: Utc::now(),
        }
    }

    fn input<'a>(activities: &'a [Activity]) -> RenderInput<'a> {
        RenderInput {
            title: "acme/widget daily report",
            repo: "acme/widget",
            period_start: Utc::now() - chrono::Duration::days(1),
            period_end: Utc::now(),
            summary: "a quiet day",
            trends: "mostly commits",
            stats: ReportStats {
                repos: 1,
                activities: activities.len() as i64,
                commits: 1,
                issues: 1,
                pull_requests: 0,
                releases: 0,
            },
            activities,
            tz: chrono_tz::Asia::Shanghai,
        }
    }

    #[test]
    fn markdown_contains_table_sections_and_ai_text() {
        let activities = vec![
            activity(ActivityKind::Commit, "fix the build"),
            activity(ActivityKind::Issue, "crash report"),
        ];
        let md = render_markdown(&input(&activities));
        assert!(md.contains("# acme/widget daily report"));
        assert!(md.contains("| Commits | 1 |"));
        assert!(md.contains("## Summary"));
        assert!(md.contains("a quiet day"));
        assert!(md.contains("## Commits"));
        assert!(md.contains("fix the build"));
        assert!(md.contains("## Issues"));
        // No section for kinds with no items
        assert!(!md.contains("## Releases"));
    }

    #[test]
    fn html_escapes_titles() {
        let activities = vec![activity(ActivityKind::Issue, "<script>alert(1)</script>")];
        let html = render_html(&input(&activities));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn long_sections_are_truncated() {
        let activities: Vec<Activity> = (0..40)
            .map(|i| activity(ActivityKind::Commit, &format!("commit {i}")))
            .collect();
        let md = render_markdown(&input(&activities));
        assert!(md.contains("… and 15 more"));
    }
}
