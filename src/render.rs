use crate::models::ApplicationRecord;

pub const PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Flagged,
    Ok,
}

impl Marker {
    pub fn symbol(&self) -> &'static str {
        match self {
            Marker::Flagged => "!",
            Marker::Ok => "✓",
        }
    }
}

/// Render-ready form of one application row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub marker: Marker,
    pub company: String,
    pub job_title: String,
    pub client: String,
    pub date: String,
    pub source: String,
    pub details: Option<RowDetails>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowDetails {
    /// (label, value) pairs, placeholder-filled.
    pub fields: Vec<(&'static str, String)>,
    /// Only links that are actually present.
    pub links: Vec<(&'static str, String)>,
    pub flag_reason: Option<String>,
}

impl RowView {
    pub fn build(record: &ApplicationRecord, expanded: bool) -> Self {
        let app = &record.application;
        let details = expanded.then(|| RowDetails {
            fields: vec![
                ("Location", or_placeholder(&app.location)),
                ("Salary", or_placeholder(&app.salary)),
                ("Resume", or_placeholder(&app.resume_used)),
                ("Specialist", non_empty(Some(record.specialist_name.as_str())).unwrap_or(PLACEHOLDER).to_string()),
            ],
            links: [
                ("Source Link", app.source_link.as_deref()),
                ("Application Link", app.application_link.as_deref()),
            ]
            .into_iter()
            .filter_map(|(label, url)| non_empty(url).map(|url| (label, url.to_string())))
            .collect(),
            flag_reason: if app.is_flagged {
                non_empty(app.flag_reason.as_deref()).map(str::to_string)
            } else {
                None
            },
        });

        Self {
            marker: if app.is_flagged { Marker::Flagged } else { Marker::Ok },
            company: app.company.clone(),
            job_title: app.job_title.clone(),
            client: record.client_name.clone(),
            date: app.date_applied.format("%b %-d, %Y").to_string(),
            source: or_placeholder(&app.source),
            details,
        }
    }

    /// Plain-text lines for terminal listings.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} {} • {}", self.marker.symbol(), self.company, self.job_title),
            format!("  {} • {}  [{}]", self.client, self.date, self.source),
        ];
        if let Some(details) = &self.details {
            let fields = details
                .fields
                .iter()
                .map(|(label, value)| format!("{}: {}", label, value))
                .collect::<Vec<_>>()
                .join("  ");
            lines.push(format!("    {}", fields));
            for (label, url) in &details.links {
                lines.push(format!("    {}: {}", label, url));
            }
            if let Some(reason) = &details.flag_reason {
                lines.push(format!("    Flagged: {}", reason));
            }
        }
        lines
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn or_placeholder(value: &Option<String>) -> String {
    non_empty(value.as_deref()).unwrap_or(PLACEHOLDER).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::record;

    #[test]
    fn test_collapsed_row_shows_glance_only() {
        let r = record("Acme", "2026-10-07");
        let row = RowView::build(&r, false);

        assert_eq!(row.marker, Marker::Ok);
        assert_eq!(row.date, "Oct 7, 2026");
        assert_eq!(row.source, "linkedin");
        assert_eq!(row.client, "Ada Lovelace");
        assert!(row.details.is_none());
        assert_eq!(row.lines().len(), 2);
    }

    #[test]
    fn test_expanded_row_fills_placeholders_and_skips_missing_links() {
        let mut r = record("Acme", "2026-10-07");
        r.application.salary = Some("".to_string());
        r.application.location = Some("Remote".to_string());
        r.application.application_link = Some("https://acme.example/apply".to_string());

        let details = RowView::build(&r, true).details.unwrap();
        assert_eq!(
            details.fields,
            vec![
                ("Location", "Remote".to_string()),
                ("Salary", PLACEHOLDER.to_string()),
                ("Resume", PLACEHOLDER.to_string()),
                ("Specialist", "Sam Specialist".to_string()),
            ]
        );
        assert_eq!(details.links, vec![("Application Link", "https://acme.example/apply".to_string())]);
        assert!(details.flag_reason.is_none());
    }

    #[test]
    fn test_flag_reason_only_when_flagged() {
        let mut r = record("Acme", "2026-10-07");
        r.application.flag_reason = Some("Posted twice".to_string());
        assert!(RowView::build(&r, true).details.unwrap().flag_reason.is_none());

        r.application.is_flagged = true;
        let row = RowView::build(&r, true);
        assert_eq!(row.marker, Marker::Flagged);
        assert_eq!(row.details.as_ref().unwrap().flag_reason.as_deref(), Some("Posted twice"));
        assert!(row.lines().iter().any(|l| l.contains("Flagged: Posted twice")));

        // Flagged without a reason shows no note.
        r.application.flag_reason = None;
        assert!(RowView::build(&r, true).details.unwrap().flag_reason.is_none());
    }

    #[test]
    fn test_missing_source_uses_placeholder() {
        let mut r = record("Acme", "2026-10-07");
        r.application.source = None;
        assert_eq!(RowView::build(&r, false).source, PLACEHOLDER);
    }
}
