//! Email subjects and HTML bodies for the notification channels.

use sentinel_common::types::{Activity, Report, Subscription};

pub fn activity_subject(subscription: &Subscription, activity: &Activity) -> String {
    format!(
        "[Sentinel] {} - new {} activity",
        subscription.repo_ref,
        activity.kind.as_str()
    )
}

pub fn report_subject(report: &Report) -> String {
    format!("[Sentinel] {} report - {}", report.kind.as_str(), report.title)
}

pub fn activity_email_html(subscription: &Subscription, activity: &Activity) -> String {
    let detail = if activity.body.is_empty() {
        String::new()
    } else {
        format!(
            "<p style=\"color:#555\">{}</p>",
            html_escape(&activity.body)
        )
    };
    let link = if activity.url.is_empty() {
        String::new()
    } else {
        format!(
            "<p><a href=\"{}\" style=\"color:#0b5fff\">View on the platform</a></p>",
            activity.url
        )
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family:-apple-system,'Segoe UI',Roboto,sans-serif;max-width:600px;margin:0 auto;padding:20px;color:#333">
  <div style="background:#24292f;color:#fff;padding:20px;border-radius:8px">
    <h2 style="margin:0">Repository activity</h2>
    <p style="margin:4px 0 0">{repo}</p>
  </div>
  <div style="background:#f6f8fa;padding:16px;border-radius:8px;margin-top:16px">
    <h3 style="margin-top:0">{title}</h3>
    <p><strong>Kind:</strong> {kind}</p>
    <p><strong>Author:</strong> {author}</p>
    {detail}
    {link}
  </div>
  <p style="color:#888;font-size:12px;margin-top:20px">Sent automatically by repo-sentinel. Adjust delivery settings in your subscription.</p>
</body>
</html>"#,
        repo = html_escape(&subscription.repo_ref),
        title = html_escape(&activity.title),
        kind = activity.kind.as_str(),
        author = html_escape(&activity.author.login),
        detail = detail,
        link = link,
    )
}

/// Reports embed their rendered body; markdown bodies are coerced into a
/// preformatted block so the mail stays readable.
pub fn report_email_html(report: &Report) -> String {
    match (&report.body, report.format) {
        (Some(body), sentinel_common::types::ReportFormat::Html) => body.clone(),
        (Some(body), sentinel_common::types::ReportFormat::Markdown) => format!(
            "<!DOCTYPE html><html><body style=\"font-family:monospace\"><pre>{}</pre></body></html>",
            html_escape(body)
        ),
        (None, _) => format!(
            "<!DOCTYPE html><html><body><h2>{}</h2><p>{}</p></body></html>",
            html_escape(&report.title),
            html_escape(report.summary.as_deref().unwrap_or("Report generated."))
        ),
    }
}

pub fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_covers_markup() {
        assert_eq!(html_escape("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
    }
}
