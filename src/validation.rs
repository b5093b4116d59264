//! Client-side form validation.
//!
//! Every entity form is checked by one declarative [`RuleSet`] keyed by field
//! path, plus a uniqueness check against the records the console already has
//! loaded. A failing form is never sent to the backend.

use chrono::Datelike;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::entity::{
    EmployeeDraft, Institute, InstituteDraft, Kafedra, KafedraDraft, Student, StudentDraft,
};
use crate::error::ConsoleError;
use crate::record::{FieldPath, FieldValue, Record};

/// Earliest accepted student start year
pub const MIN_YEAR: i64 = 2000;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\+\d{5,15}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Field path → message shown next to the field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        FieldErrors::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Record an error unless the field already has one
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok` when empty, otherwise a validation error
    pub fn into_result(self) -> Result<(), ConsoleError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConsoleError::Validation(self))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Non-blank text, or a non-zero number
    Required,

    /// `+` followed by 5 to 15 digits
    Phone,

    Email,

    /// Whole number within `min..=max`
    YearRange { min: i64, max: i64 },

    /// Reference to another record (id > 0)
    PositiveId,
}

impl Rule {
    pub fn check(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Rule::Required, FieldValue::Text(s)) => !s.trim().is_empty(),
            (Rule::Required, FieldValue::Int(n)) => *n != 0,
            (Rule::Required, FieldValue::Bool(_)) => true,
            (Rule::Phone, FieldValue::Text(s)) => PHONE_RE.is_match(s),
            (Rule::Email, FieldValue::Text(s)) => EMAIL_RE.is_match(s.trim()),
            (Rule::YearRange { min, max }, FieldValue::Int(n)) => (*min..=*max).contains(n),
            (Rule::PositiveId, FieldValue::Int(n)) => *n > 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Check {
    field: FieldPath,
    rule: Rule,
    message: String,
}

/// Ordered list of field checks
///
/// Checks run in insertion order and only the first failure per field is
/// reported.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    checks: Vec<Check>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn rule(mut self, field: &str, rule: Rule, message: impl Into<String>) -> Self {
        self.checks.push(Check {
            field: FieldPath::new(field),
            rule,
            message: message.into(),
        });
        self
    }

    /// Check any serializable form against the rules
    ///
    /// The form is read through its JSON shape, so field paths are the
    /// backend's camelCase names (`person.surname`, `instituteId`).
    pub fn validate<T: Serialize>(&self, form: &T) -> FieldErrors {
        let value = serde_json::to_value(form).unwrap_or(serde_json::Value::Null);
        let mut errors = FieldErrors::new();
        for check in &self.checks {
            if errors.contains(check.field.as_str()) {
                continue;
            }
            if !check.rule.check(&value.field(&check.field)) {
                errors.insert(check.field.as_str(), check.message.clone());
            }
        }
        errors
    }
}

/// Current calendar year, the upper bound for start years
pub fn current_year() -> i64 {
    i64::from(chrono::Local::now().year())
}

fn person_rules(set: RuleSet) -> RuleSet {
    set.rule("person.surname", Rule::Required, "Фамилия обязательна")
        .rule("person.name", Rule::Required, "Имя обязательно")
        .rule("person.patronymic", Rule::Required, "Отчество обязательно")
        .rule("person.phone", Rule::Required, "Телефон обязателен")
        .rule("person.phone", Rule::Phone, "Формат: + и 5–15 цифр")
}

pub fn institute_rules() -> RuleSet {
    RuleSet::new()
        .rule("name", Rule::Required, "Название обязательно")
        .rule("email", Rule::Required, "E-mail обязателен")
        .rule("email", Rule::Email, "Неверный формат e-mail")
        .rule("phone", Rule::Required, "Телефон обязателен")
        .rule("phone", Rule::Phone, "Формат: + и 5–15 цифр")
}

pub fn kafedra_rules() -> RuleSet {
    RuleSet::new()
        .rule("name", Rule::Required, "Название обязательно")
        .rule("email", Rule::Required, "E-mail обязателен")
        .rule("email", Rule::Email, "Неверный формат e-mail")
        .rule("phone", Rule::Required, "Телефон обязателен")
        .rule("phone", Rule::Phone, "Формат: + и 5–15 цифр")
        .rule("room", Rule::Required, "Кабинет обязателен")
        .rule("instituteId", Rule::PositiveId, "Институт обязателен")
}

pub fn student_rules(this_year: i64) -> RuleSet {
    person_rules(RuleSet::new())
        .rule("yearStarted", Rule::Required, "Неверный год")
        .rule(
            "yearStarted",
            Rule::YearRange {
                min: MIN_YEAR,
                max: this_year,
            },
            format!("Год между {MIN_YEAR} и {this_year}"),
        )
}

pub fn employee_rules() -> RuleSet {
    person_rules(RuleSet::new())
        .rule("jobTitleId", Rule::PositiveId, "Должность обязательна")
        .rule("kafedraId", Rule::PositiveId, "Кафедра обязательна")
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Whether another loaded record (not `editing`) already uses `name`
fn name_taken<R: Record>(name: &str, editing: Option<i64>, loaded: &[R]) -> bool {
    loaded.iter().any(|r| {
        Some(r.id()) != editing
            && matches!(r.field(&FieldPath::new("name")), FieldValue::Text(other) if same_text(&other, name))
    })
}

/// Whether another loaded student has the same full name and start year
///
/// Names compare trimmed and case-insensitively.
pub fn student_duplicate(draft: &StudentDraft, editing: Option<i64>, loaded: &[Student]) -> bool {
    let p = &draft.person;
    loaded.iter().any(|s| {
        Some(s.id) != editing
            && s.year_started == draft.year_started
            && same_text(&s.person.surname, &p.surname)
            && same_text(&s.person.name, &p.name)
            && same_text(&s.person.patronymic, &p.patronymic)
    })
}

/// Validate an institute form
///
/// # Arguments
/// * `draft` - Submitted form
/// * `editing` - Id of the institute being edited, `None` when creating
/// * `loaded` - Institutes currently loaded in the console
pub fn validate_institute(
    draft: &InstituteDraft,
    editing: Option<i64>,
    loaded: &[Institute],
) -> FieldErrors {
    let mut errors = institute_rules().validate(draft);
    if !errors.contains("name") && name_taken(&draft.name, editing, loaded) {
        errors.insert("name", "Институт с таким названием уже есть");
    }
    errors
}

pub fn validate_kafedra(
    draft: &KafedraDraft,
    editing: Option<i64>,
    loaded: &[Kafedra],
) -> FieldErrors {
    let mut errors = kafedra_rules().validate(draft);
    if !errors.contains("name") && name_taken(&draft.name, editing, loaded) {
        errors.insert("name", "Кафедра с таким названием уже есть");
    }
    errors
}

pub fn validate_student(
    draft: &StudentDraft,
    editing: Option<i64>,
    loaded: &[Student],
    this_year: i64,
) -> FieldErrors {
    let mut errors = student_rules(this_year).validate(draft);
    if errors.is_empty() && student_duplicate(draft, editing, loaded) {
        let p = &draft.person;
        errors.insert(
            "yearStarted",
            format!(
                "Студент {} {} уже зарегистрирован за {}",
                p.surname, p.name, draft.year_started
            ),
        );
    }
    errors
}

pub fn validate_employee(draft: &EmployeeDraft) -> FieldErrors {
    employee_rules().validate(draft)
}
