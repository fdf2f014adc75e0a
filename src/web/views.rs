//! HTML pages rendered with Handlebars.
//!
//! Templates are compiled into the binary and registered once at startup.
//! Handlebars HTML-escapes every `{{value}}`, so model output and file names
//! are safe to interpolate.

use crate::output::{GradingReport, PageImage};
use crate::web::auth::UserInfo;
use axum::http::StatusCode;
use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;
use serde_json::json;

const TEMPLATES: &[(&str, &str)] = &[
    ("login", include_str!("templates/login.hbs")),
    ("upload", include_str!("templates/upload.hbs")),
    ("results", include_str!("templates/results.hbs")),
    ("error", include_str!("templates/error.hbs")),
];

/// Compiled page templates.
#[derive(Debug)]
pub struct Views {
    registry: Handlebars<'static>,
}

#[derive(Serialize)]
struct SubmissionView<'a> {
    name: &'a str,
    display_score: String,
    clean_score: String,
    analysis: &'a str,
    text: &'a str,
    error: Option<&'a str>,
    page_count: usize,
    failed_pages: usize,
    page_images: &'a [PageImage],
}

impl Views {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_partial("header", include_str!("templates/header.hbs"))?;
        registry.register_partial("footer", include_str!("templates/footer.hbs"))?;
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source)?;
        }
        Ok(Self { registry })
    }

    fn user_fields(user: Option<&UserInfo>) -> (serde_json::Value, &str) {
        match user {
            Some(u) => (json!(u), u.display_name()),
            None => (serde_json::Value::Null, ""),
        }
    }

    pub fn login(&self) -> Result<String, RenderError> {
        self.registry.render("login", &json!({ "title": "Login" }))
    }

    pub fn upload(&self, user: Option<&UserInfo>, has_results: bool) -> Result<String, RenderError> {
        let (user, user_name) = Self::user_fields(user);
        self.registry.render(
            "upload",
            &json!({
                "title": "Grade",
                "user": user,
                "user_name": user_name,
                "has_results": has_results,
            }),
        )
    }

    pub fn results(
        &self,
        report: &GradingReport,
        user: Option<&UserInfo>,
    ) -> Result<String, RenderError> {
        let (user, user_name) = Self::user_fields(user);
        let submissions: Vec<SubmissionView<'_>> = report
            .submissions
            .iter()
            .map(|s| SubmissionView {
                name: &s.name,
                display_score: s.display_score(),
                clean_score: s.clean_score(),
                analysis: &s.analysis,
                text: &s.text,
                error: s.error.as_deref(),
                page_count: s.pages.len(),
                failed_pages: s.failed_pages(),
                page_images: &s.page_images,
            })
            .collect();

        self.registry.render(
            "results",
            &json!({
                "title": "Results",
                "user": user,
                "user_name": user_name,
                "key": &report.answer_key,
                "stats": &report.stats,
                "submissions": submissions,
            }),
        )
    }

    pub fn error(
        &self,
        status: StatusCode,
        message: &str,
        hint: Option<&str>,
    ) -> Result<String, RenderError> {
        self.registry.render(
            "error",
            &json!({
                "title": "Error",
                "status": status.to_string(),
                "message": message,
                "hint": hint,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{AnswerKey, GradingStats, StudentSubmission};

    fn report() -> GradingReport {
        GradingReport {
            answer_key: AnswerKey {
                file_name: "key.pdf".into(),
                text: "Q1: H2O".into(),
                page_count: 1,
                page_images: vec![PageImage {
                    page_num: 1,
                    png_base64: "iVBORw0KGgo".into(),
                }],
            },
            submissions: vec![StudentSubmission {
                name: "Alice <b>".into(),
                file_name: "Alice.pdf".into(),
                text: "Q1: water".into(),
                analysis: "<script>alert(1)</script>\nTotal Score: 80/100".into(),
                ..Default::default()
            }],
            stats: GradingStats {
                students: 1,
                graded_students: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn all_templates_compile() {
        assert!(Views::new().is_ok());
    }

    #[test]
    fn results_page_escapes_model_output() {
        let html = Views::new().unwrap().results(&report(), None).unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Alice &lt;b&gt; - 80/100"));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo"));
        assert!(html.contains("/results/scores.csv"));
    }

    #[test]
    fn upload_page_greets_user() {
        let user = UserInfo {
            name: Some("Ada".into()),
            ..Default::default()
        };
        let html = Views::new().unwrap().upload(Some(&user), true).unwrap();
        assert!(html.contains("Welcome, Ada"));
        assert!(html.contains("action=\"/grade\""));
        assert!(html.contains("href=\"/results\""));
    }

    #[test]
    fn login_and_error_pages() {
        let views = Views::new().unwrap();
        assert!(views.login().unwrap().contains("href=\"/login\""));

        let html = views
            .error(StatusCode::BAD_REQUEST, "not a PDF", Some("Check the files."))
            .unwrap();
        assert!(html.contains("400 Bad Request"));
        assert!(html.contains("not a PDF"));
        assert!(html.contains("Check the files."));
    }
}
