// ABOUTME: Job listing data model: the Field enum, the mutable JobFields struct and the validated JobRecord.
// ABOUTME: Also holds ExtractionContext, the per-fetch state handed to the extractor.

//! Record model.
//!
//! `JobFields` is the plain, fully-populated field struct that extraction
//! builds up. `JobRecord` is the immutable value emitted to callers; it can
//! only be obtained through [`JobRecord::new`], which enforces the emission
//! invariant: a non-empty title plus at least one of company or url.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::strategy::Portal;

/// Every field a job listing can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Company,
    Location,
    Description,
    RequiredSkills,
    Salary,
    Url,
    EmploymentType,
    ExperienceLevel,
    WorkplaceType,
    PostedDate,
    ApplicationDeadline,
    Benefits,
    CompanyDescription,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Title,
        Field::Company,
        Field::Location,
        Field::Description,
        Field::RequiredSkills,
        Field::Salary,
        Field::Url,
        Field::EmploymentType,
        Field::ExperienceLevel,
        Field::WorkplaceType,
        Field::PostedDate,
        Field::ApplicationDeadline,
        Field::Benefits,
        Field::CompanyDescription,
    ];

    /// Fields whose detail-page value replaces the list-page value when non-empty.
    pub const DETAIL_PREFERRED: [Field; 6] = [
        Field::Description,
        Field::RequiredSkills,
        Field::Benefits,
        Field::ExperienceLevel,
        Field::PostedDate,
        Field::ApplicationDeadline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Company => "company",
            Field::Location => "location",
            Field::Description => "description",
            Field::RequiredSkills => "required_skills",
            Field::Salary => "salary",
            Field::Url => "url",
            Field::EmploymentType => "employment_type",
            Field::ExperienceLevel => "experience_level",
            Field::WorkplaceType => "workplace_type",
            Field::PostedDate => "posted_date",
            Field::ApplicationDeadline => "application_deadline",
            Field::Benefits => "benefits",
            Field::CompanyDescription => "company_description",
        }
    }
}

/// All job fields as plain strings. Absent values are empty strings, never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobFields {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub required_skills: String,
    pub salary: String,
    pub url: String,
    pub employment_type: String,
    pub experience_level: String,
    pub workplace_type: String,
    pub posted_date: String,
    pub application_deadline: String,
    pub benefits: String,
    pub company_description: String,
}

impl JobFields {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Company => &self.company,
            Field::Location => &self.location,
            Field::Description => &self.description,
            Field::RequiredSkills => &self.required_skills,
            Field::Salary => &self.salary,
            Field::Url => &self.url,
            Field::EmploymentType => &self.employment_type,
            Field::ExperienceLevel => &self.experience_level,
            Field::WorkplaceType => &self.workplace_type,
            Field::PostedDate => &self.posted_date,
            Field::ApplicationDeadline => &self.application_deadline,
            Field::Benefits => &self.benefits,
            Field::CompanyDescription => &self.company_description,
        }
    }

    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Company => &mut self.company,
            Field::Location => &mut self.location,
            Field::Description => &mut self.description,
            Field::RequiredSkills => &mut self.required_skills,
            Field::Salary => &mut self.salary,
            Field::Url => &mut self.url,
            Field::EmploymentType => &mut self.employment_type,
            Field::ExperienceLevel => &mut self.experience_level,
            Field::WorkplaceType => &mut self.workplace_type,
            Field::PostedDate => &mut self.posted_date,
            Field::ApplicationDeadline => &mut self.application_deadline,
            Field::Benefits => &mut self.benefits,
            Field::CompanyDescription => &mut self.company_description,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Copies every non-empty field of `other` into the empty fields of `self`.
    pub fn fill_missing(&mut self, other: &JobFields) {
        for field in Field::ALL {
            let theirs = other.get(field);
            if self.get(field).is_empty() && !theirs.is_empty() {
                self.set(field, theirs);
            }
        }
    }
}

/// Why a set of fields could not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecordRejected {
    #[error("record has no title")]
    MissingTitle,
    #[error("record has neither company nor url")]
    MissingCompanyAndUrl,
}

/// An immutable, validated job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobFields", into = "JobFields")]
pub struct JobRecord {
    fields: JobFields,
}

impl JobRecord {
    /// Validates `fields` and freezes them into a record.
    pub fn new(fields: JobFields) -> Result<Self, RecordRejected> {
        if fields.title.trim().is_empty() {
            return Err(RecordRejected::MissingTitle);
        }
        if fields.company.trim().is_empty() && fields.url.trim().is_empty() {
            return Err(RecordRejected::MissingCompanyAndUrl);
        }
        Ok(Self { fields })
    }

    /// Merges detail-page fields into this record and returns the enriched copy.
    ///
    /// Detail values win for description, requirements, benefits, experience,
    /// posted date and deadline. Every other field keeps its list-page value and
    /// only takes the detail value to fill a gap.
    pub fn enrich(self, detail: &JobFields) -> JobRecord {
        let mut fields = self.fields;
        for field in Field::DETAIL_PREFERRED {
            let value = detail.get(field);
            if !value.is_empty() {
                fields.set(field, value);
            }
        }
        fields.fill_missing(detail);
        JobRecord { fields }
    }

    pub fn fields(&self) -> &JobFields {
        &self.fields
    }

    pub fn get(&self, field: Field) -> &str {
        self.fields.get(field)
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn company(&self) -> &str {
        &self.fields.company
    }

    pub fn location(&self) -> &str {
        &self.fields.location
    }

    pub fn description(&self) -> &str {
        &self.fields.description
    }

    pub fn required_skills(&self) -> &str {
        &self.fields.required_skills
    }

    pub fn salary(&self) -> &str {
        &self.fields.salary
    }

    pub fn url(&self) -> &str {
        &self.fields.url
    }

    pub fn employment_type(&self) -> &str {
        &self.fields.employment_type
    }

    pub fn experience_level(&self) -> &str {
        &self.fields.experience_level
    }

    pub fn workplace_type(&self) -> &str {
        &self.fields.workplace_type
    }

    pub fn posted_date(&self) -> &str {
        &self.fields.posted_date
    }

    pub fn application_deadline(&self) -> &str {
        &self.fields.application_deadline
    }

    pub fn benefits(&self) -> &str {
        &self.fields.benefits
    }

    pub fn company_description(&self) -> &str {
        &self.fields.company_description
    }

    /// Lower-cased `title|company` key used to drop repeats across pages.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}",
            self.fields.title.to_lowercase(),
            self.fields.company.to_lowercase()
        )
    }
}

impl TryFrom<JobFields> for JobRecord {
    type Error = RecordRejected;

    fn try_from(fields: JobFields) -> Result<Self, Self::Error> {
        JobRecord::new(fields)
    }
}

impl From<JobRecord> for JobFields {
    fn from(record: JobRecord) -> Self {
        record.fields
    }
}

/// Per-fetch extraction state. Created for one page, dropped after it.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub url: Url,
    pub portal: Portal,
    /// Base for resolving relative links (the page URL unless the document sets `<base href>`).
    pub base: Url,
    pub user_agent: String,
}

impl ExtractionContext {
    pub fn new(url: Url, portal: Portal, user_agent: impl Into<String>) -> Self {
        Self {
            base: url.clone(),
            url,
            portal,
            user_agent: user_agent.into(),
        }
    }

    /// Replaces the link base, typically from a `<base href>` element.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}
