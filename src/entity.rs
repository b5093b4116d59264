//! Entity records managed by the dekanat backend.
//!
//! Field names follow the backend's camelCase JSON. Every entity implements
//! [`Record`] so the list-view pipeline can read it, and has a matching
//! [`ListView`] describing its table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::listview::ListView;
use crate::record::{FieldPath, FieldValue, Record};

/// Shown in place of a kafedra name that is not loaded
pub const UNKNOWN_KAFEDRA: &str = "—";

/// The four entity kinds with their own CRUD surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Institute,
    Kafedra,
    Student,
    Employee,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Institute,
        EntityKind::Kafedra,
        EntityKind::Student,
        EntityKind::Employee,
    ];

    /// Path segment used by both the backend and the console routes
    pub fn segment(self) -> &'static str {
        match self {
            EntityKind::Institute => "institutes",
            EntityKind::Kafedra => "kafedras",
            EntityKind::Student => "students",
            EntityKind::Employee => "employees",
        }
    }

    /// Table title shown above the list
    pub fn title(self) -> &'static str {
        match self {
            EntityKind::Institute => "Институты",
            EntityKind::Kafedra => "Кафедры",
            EntityKind::Student => "Список студентов",
            EntityKind::Employee => "Сотрудники",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.segment() == s)
            .ok_or_else(|| format!("Unknown entity kind: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub surname: String,
    pub name: String,
    pub patronymic: String,
    #[serde(default)]
    pub phone: String,
}

impl Person {
    /// "Фамилия Имя Отчество"
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.surname, self.name, self.patronymic)
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "surname" => self.surname.as_str().into(),
            "name" => self.name.as_str().into(),
            "patronymic" => self.patronymic.as_str().into(),
            "phone" => self.phone.as_str().into(),
            _ => FieldValue::Missing,
        }
    }
}

/// Resolve a path on a record that embeds a [`Person`]
///
/// `person.x` reads the person; a bare name the record does not know falls
/// back to the person too, so `surname` and `person.surname` sort alike.
fn person_path(person: &Person, path: &FieldPath, own: FieldValue) -> FieldValue {
    match path.split() {
        ("person", Some(inner)) => person.field(inner),
        (name, None) if own.is_missing() => person.field(name),
        _ => own,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institute {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Record for Institute {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        match path.as_str() {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "email" => self.email.as_str().into(),
            "phone" => self.phone.as_str().into(),
            _ => FieldValue::Missing,
        }
    }
}

impl Institute {
    pub fn view() -> ListView<Institute> {
        ListView::new("name")
            .search("name")
            .search("email")
            .search("phone")
            .column("name", "Название")
            .column("email", "E-mail")
            .column("phone", "Телефон")
    }

    pub fn draft(&self) -> InstituteDraft {
        InstituteDraft {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kafedra {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub room: String,
    pub institute_id: i64,
    #[serde(default)]
    pub credentials_non_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafedraDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub room: String,
    pub institute_id: i64,
    #[serde(default)]
    pub credentials_non_expired: bool,
}

impl Record for Kafedra {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        match path.as_str() {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "email" => self.email.as_str().into(),
            "phone" => self.phone.as_str().into(),
            "room" => self.room.as_str().into(),
            "instituteId" => self.institute_id.into(),
            "credentialsNonExpired" => self.credentials_non_expired.into(),
            _ => FieldValue::Missing,
        }
    }
}

impl Kafedra {
    pub fn view() -> ListView<Kafedra> {
        ListView::new("name")
            .search("name")
            .search("email")
            .search("room")
            .search("phone")
            .column("name", "Название")
            .column("email", "E-mail")
            .column("phone", "Телефон")
            .column("room", "Кабинет")
    }

    pub fn draft(&self) -> KafedraDraft {
        KafedraDraft {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            room: self.room.clone(),
            institute_id: self.institute_id,
            credentials_non_expired: self.credentials_non_expired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialForm {
    #[default]
    Budget,
    Contract,
}

impl FinancialForm {
    pub fn as_str(self) -> &'static str {
        match self {
            FinancialForm::Budget => "BUDGET",
            FinancialForm::Contract => "CONTRACT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FinancialForm::Budget => "Бюджет",
            FinancialForm::Contract => "Контракт",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub person: Person,
    pub year_started: i64,
    pub financial_form: FinancialForm,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDraft {
    pub person: Person,
    pub year_started: i64,
    pub financial_form: FinancialForm,
}

impl Record for Student {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        let own = match path.as_str() {
            "id" => self.id.into(),
            "yearStarted" => self.year_started.into(),
            "financialForm" => self.financial_form.as_str().into(),
            _ => FieldValue::Missing,
        };
        person_path(&self.person, path, own)
    }
}

impl Student {
    pub fn view() -> ListView<Student> {
        ListView::new("person.surname")
            .search("person.surname")
            .search("person.name")
            .search("person.patronymic")
            .category("financialForm")
            .column("person.surname", "Фамилия")
            .column("person.name", "Имя")
            .column("person.patronymic", "Отчество")
            .column("person.phone", "Телефон")
            .column("yearStarted", "Год поступления")
            .column("financialForm", "Форма обучения")
    }

    pub fn draft(&self) -> StudentDraft {
        StudentDraft {
            person: self.person.clone(),
            year_started: self.year_started,
            financial_form: self.financial_form,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub person: Person,
    #[serde(default, alias = "position")]
    pub job_title: String,
    #[serde(default)]
    pub job_title_id: Option<i64>,
    pub kafedra_id: i64,
    #[serde(default)]
    pub credentials_non_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDraft {
    pub person: Person,
    pub job_title_id: i64,
    pub kafedra_id: i64,
    #[serde(default)]
    pub credentials_non_expired: bool,
}

impl Record for Employee {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        let own = match path.as_str() {
            "id" => self.id.into(),
            "jobTitle" => self.job_title.as_str().into(),
            "jobTitleId" => self.job_title_id.into(),
            "kafedraId" => self.kafedra_id.into(),
            "credentialsNonExpired" => self.credentials_non_expired.into(),
            "fullName" => self.person.full_name().into(),
            _ => FieldValue::Missing,
        };
        person_path(&self.person, path, own)
    }
}

impl Employee {
    pub fn draft(&self) -> EmployeeDraft {
        EmployeeDraft {
            person: self.person.clone(),
            job_title_id: self.job_title_id.unwrap_or_default(),
            kafedra_id: self.kafedra_id,
            credentials_non_expired: self.credentials_non_expired,
        }
    }
}

/// An employee as listed in the employee table, joined with its kafedra name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRow {
    #[serde(flatten)]
    pub employee: Employee,
    pub kafedra_name: String,
}

impl Record for EmployeeRow {
    fn id(&self) -> i64 {
        self.employee.id
    }

    fn field(&self, path: &FieldPath) -> FieldValue {
        match path.as_str() {
            "kafedraName" => self.kafedra_name.as_str().into(),
            _ => self.employee.field(path),
        }
    }
}

impl EmployeeRow {
    pub fn view() -> ListView<EmployeeRow> {
        ListView::new("person.surname")
            .search("fullName")
            .search("person.phone")
            .search("jobTitle")
            .search("kafedraName")
            .column("person.surname", "Фамилия")
            .column("person.name", "Имя")
            .column("person.patronymic", "Отчество")
            .column("person.phone", "Телефон")
            .column("jobTitle", "Должность")
            .column("kafedraName", "Кафедра")
            .column("credentialsNonExpired", "Уч. данные")
    }
}

/// Attach kafedra names to employees
///
/// Employees whose kafedra is not among `kafedras` get [`UNKNOWN_KAFEDRA`].
pub fn join_kafedra_names(employees: Vec<Employee>, kafedras: &[Kafedra]) -> Vec<EmployeeRow> {
    let names: HashMap<i64, &str> = kafedras.iter().map(|k| (k.id, k.name.as_str())).collect();

    employees
        .into_iter()
        .map(|employee| {
            let kafedra_name = names
                .get(&employee.kafedra_id)
                .copied()
                .unwrap_or(UNKNOWN_KAFEDRA)
                .to_string();
            EmployeeRow {
                employee,
                kafedra_name,
            }
        })
        .collect()
}
