// ABOUTME: schema.org JobPosting extraction from JSON-LD script blocks.
// ABOUTME: Used on detail pages to fill fields that the selector candidates left empty.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::model::{Field, JobFields};

/// Finds the first JSON-LD `JobPosting` in the document and maps it onto raw
/// (unnormalized) fields. Returns `None` when no script holds a posting.
pub fn job_posting_fields(doc: &Html) -> Option<JobFields> {
    let selector = Selector::parse("script[type='application/ld+json']").ok()?;
    for script in doc.select(&selector) {
        let text = script.text().collect::<String>();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                if let Some(posting) = find_job_posting(&value) {
                    return Some(posting_to_fields(posting));
                }
            }
            Err(e) => tracing::debug!(error = %e, "skipping malformed JSON-LD block"),
        }
    }
    None
}

fn find_job_posting(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if map
                .get("@type")
                .is_some_and(|t| matches_type(t, "JobPosting"))
            {
                return Some(value);
            }
            for key in ["@graph", "graph", "mainEntity", "itemListElement", "item"] {
                if let Some(found) = map.get(key).and_then(find_job_posting) {
                    return Some(found);
                }
            }
            map.values().find_map(find_job_posting)
        }
        Value::Array(arr) => arr.iter().find_map(find_job_posting),
        _ => None,
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case(expected),
        Value::Array(arr) => arr.iter().any(|v| matches_type(v, expected)),
        _ => false,
    }
}

/// Renders strings, numbers and arrays of them; objects yield their `name`.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(arr) => arr
            .iter()
            .map(as_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map.get("name").map(as_text).unwrap_or_default(),
        _ => String::new(),
    }
}

fn location_text(value: &Value) -> String {
    match value {
        Value::Array(arr) => arr
            .iter()
            .map(location_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(map) => match map.get("address") {
            Some(Value::Object(address)) => ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|k| address.get(*k).map(as_text))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Some(other) => as_text(other),
            None => as_text(value),
        },
        other => as_text(other),
    }
}

fn salary_text(value: &Value) -> String {
    let Value::Object(map) = value else {
        return as_text(value);
    };
    let Some(inner) = map.get("value") else {
        return String::new();
    };
    let Value::Object(quantity) = inner else {
        return as_text(inner);
    };
    let min = quantity.get("minValue").map(as_text).unwrap_or_default();
    let max = quantity.get("maxValue").map(as_text).unwrap_or_default();
    let single = quantity.get("value").map(as_text).unwrap_or_default();
    let unit = quantity
        .get("unitText")
        .map(as_text)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let unit = if unit.is_empty() { "year".to_string() } else { unit };
    match (min.is_empty(), max.is_empty()) {
        (false, false) => format!("{} - {} per {}", min, max, unit),
        (false, true) => format!("{} per {}", min, unit),
        (true, false) => format!("{} per {}", max, unit),
        (true, true) if !single.is_empty() => format!("{} per {}", single, unit),
        _ => String::new(),
    }
}

fn experience_text(value: &Value) -> String {
    match value {
        Value::Object(map) => match map.get("monthsOfExperience").and_then(Value::as_f64) {
            Some(months) => format!("{} years", (months / 12.0).floor()),
            None => map.get("description").map(as_text).unwrap_or_default(),
        },
        other => as_text(other),
    }
}

fn posting_to_fields(posting: &Value) -> JobFields {
    let mut fields = JobFields::default();
    let get = |key: &str| posting.get(key);

    let simple = [
        (Field::Title, "title"),
        (Field::Description, "description"),
        (Field::EmploymentType, "employmentType"),
        (Field::PostedDate, "datePosted"),
        (Field::ApplicationDeadline, "validThrough"),
        (Field::Url, "url"),
    ];
    for (field, key) in simple {
        if let Some(v) = get(key) {
            fields.set(field, as_text(v));
        }
    }
    if let Some(org) = get("hiringOrganization") {
        fields.set(Field::Company, as_text(org));
        if let Some(about) = org.get("description") {
            fields.set(Field::CompanyDescription, as_text(about));
        }
    }
    if let Some(loc) = get("jobLocation") {
        fields.set(Field::Location, location_text(loc));
    }
    if let Some(salary) = get("baseSalary").or_else(|| get("estimatedSalary")) {
        fields.set(Field::Salary, salary_text(salary));
    }
    if let Some(skills) = get("skills").or_else(|| get("qualifications")) {
        fields.set(Field::RequiredSkills, as_text(skills));
    }
    if let Some(exp) = get("experienceRequirements") {
        fields.set(Field::ExperienceLevel, experience_text(exp));
    }
    if let Some(benefits) = get("jobBenefits") {
        fields.set(Field::Benefits, as_text(benefits));
    }
    if get("jobLocationType").is_some_and(|t| matches_type(t, "TELECOMMUTE")) {
        fields.set(Field::WorkplaceType, "Remote");
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(json: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
            json
        ))
    }

    #[test]
    fn reads_a_top_level_job_posting() {
        let html = doc(r#"{
            "@context": "https://schema.org",
            "@type": "JobPosting",
            "title": "Backend Engineer",
            "description": "<p>Build APIs</p>",
            "hiringOrganization": {"@type": "Organization", "name": "Acme"},
            "jobLocation": {"@type": "Place", "address": {"addressLocality": "Berlin", "addressCountry": "DE"}},
            "employmentType": ["FULL_TIME", "CONTRACTOR"],
            "datePosted": "2024-05-01",
            "validThrough": "2024-06-01",
            "baseSalary": {"@type": "MonetaryAmount", "currency": "EUR",
                "value": {"@type": "QuantitativeValue", "minValue": 60000, "maxValue": 80000, "unitText": "YEAR"}},
            "experienceRequirements": {"@type": "OccupationalExperienceRequirements", "monthsOfExperience": 36},
            "jobLocationType": "TELECOMMUTE"
        }"#);
        let fields = job_posting_fields(&html).expect("posting found");
        assert_eq!(fields.title, "Backend Engineer");
        assert_eq!(fields.company, "Acme");
        assert_eq!(fields.location, "Berlin, DE");
        assert_eq!(fields.description, "<p>Build APIs</p>");
        assert_eq!(fields.employment_type, "FULL_TIME, CONTRACTOR");
        assert_eq!(fields.posted_date, "2024-05-01");
        assert_eq!(fields.application_deadline, "2024-06-01");
        assert_eq!(fields.salary, "60000 - 80000 per year");
        assert_eq!(fields.experience_level, "3 years");
        assert_eq!(fields.workplace_type, "Remote");
    }

    #[test]
    fn finds_posting_inside_graph() {
        let html = doc(r#"{"@graph": [
            {"@type": "WebPage", "name": "Careers"},
            {"@type": ["Thing", "JobPosting"], "title": "Nurse", "hiringOrganization": "City Hospital"}
        ]}"#);
        let fields = job_posting_fields(&html).unwrap();
        assert_eq!(fields.title, "Nurse");
        assert_eq!(fields.company, "City Hospital");
    }

    #[test]
    fn ignores_other_types_and_bad_json() {
        assert!(job_posting_fields(&doc(r#"{"@type": "NewsArticle", "headline": "x"}"#)).is_none());
        assert!(job_posting_fields(&doc("{oops")).is_none());
    }
}
