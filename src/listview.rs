//! Generic list-view pipeline shared by every entity table.
//!
//! A table holds its records in memory and, on every state change, runs
//! `filter → sort → paginate` over them with its [`ViewState`]. The pipeline
//! is pure: the same records and state always yield the same page.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::collation;
use crate::record::{FieldPath, FieldValue, Record};

/// Category value meaning "no category filter"
pub const ALL_CATEGORIES: &str = "ALL";

/// Rows per page when the caller does not say otherwise
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Per-table search, filter, sort and paging parameters
///
/// Owned by exactly one table. Changing the search text, the category or the
/// page size moves the table back to the first page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    search_text: String,
    category_filter: Option<String>,
    sort_field: FieldPath,
    sort_direction: SortDirection,
    page_index: usize,
    page_size: usize,
}

impl ViewState {
    /// Create a state on the first page, sorted ascending by `sort_field`
    ///
    /// A zero `page_size` is raised to one.
    pub fn new(sort_field: impl Into<FieldPath>, page_size: usize) -> Self {
        ViewState {
            search_text: String::new(),
            category_filter: None,
            sort_field: sort_field.into(),
            sort_direction: SortDirection::Ascending,
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category_filter.as_deref()
    }

    pub fn sort_field(&self) -> &FieldPath {
        &self.sort_field
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.search_text {
            self.search_text = text;
            self.page_index = 0;
        }
    }

    /// Set the category filter; `None` and `"ALL"` both disable it
    pub fn set_category(&mut self, category: Option<String>) {
        let category = category.filter(|c| c != ALL_CATEGORIES);
        if category != self.category_filter {
            self.category_filter = category;
            self.page_index = 0;
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        if page_size != self.page_size {
            self.page_size = page_size;
            self.page_index = 0;
        }
    }

    /// Jump to a page; out-of-range pages are tolerated and render empty
    pub fn set_page(&mut self, page_index: usize) {
        self.page_index = page_index;
    }

    pub fn set_sort(&mut self, field: impl Into<FieldPath>, direction: SortDirection) {
        self.sort_field = field.into();
        self.sort_direction = direction;
    }

    /// Header click on a column
    ///
    /// Clicking the active column flips the direction; any other column
    /// becomes active in ascending order.
    pub fn toggle_sort(&mut self, field: impl Into<FieldPath>) {
        let field = field.into();
        if field == self.sort_field {
            self.sort_direction = self.sort_direction.flip();
        } else {
            self.sort_field = field;
            self.sort_direction = SortDirection::Ascending;
        }
    }

    /// Pull a stale page index back onto the last non-empty page
    ///
    /// Used after a delete or any other shrink of the filtered set.
    ///
    /// # Returns
    /// * `bool` - Whether the page index changed
    pub fn clamp_to(&mut self, filtered_total: usize) -> bool {
        let last = last_page_index(filtered_total, self.page_size);
        if self.page_index > last {
            self.page_index = last;
            true
        } else {
            false
        }
    }
}

/// Non-mutating form of [`ViewState::toggle_sort`]
pub fn toggle_sort(state: &ViewState, field: impl Into<FieldPath>) -> ViewState {
    let mut next = state.clone();
    next.toggle_sort(field);
    next
}

/// Index of the last page that holds rows (0 when there are none)
pub fn last_page_index(filtered_total: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    filtered_total.saturating_sub(1) / page_size
}

/// One rendered page of a table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<R> {
    pub rows: Vec<R>,
    pub filtered_total: usize,
    pub page_index: usize,
    pub page_size: usize,
    pub page_count: usize,
}

/// A sortable table column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub field: FieldPath,
    pub label: &'static str,
}

/// Table configuration for one record type
///
/// Names the fields the search box looks at, the optional category field
/// and the columns offered for sorting.
#[derive(Debug, Clone)]
pub struct ListView<R> {
    searchable: Vec<FieldPath>,
    category: Option<FieldPath>,
    columns: Vec<Column>,
    default_sort: FieldPath,
    _records: PhantomData<fn(&R)>,
}

impl<R: Record> ListView<R> {
    pub fn new(default_sort: impl Into<FieldPath>) -> Self {
        ListView {
            searchable: Vec::new(),
            category: None,
            columns: Vec::new(),
            default_sort: default_sort.into(),
            _records: PhantomData,
        }
    }

    /// Add a field the search box matches against
    pub fn search(mut self, path: impl Into<FieldPath>) -> Self {
        self.searchable.push(path.into());
        self
    }

    /// Set the field compared against the category filter
    pub fn category(mut self, path: impl Into<FieldPath>) -> Self {
        self.category = Some(path.into());
        self
    }

    pub fn column(mut self, path: impl Into<FieldPath>, label: &'static str) -> Self {
        self.columns.push(Column {
            field: path.into(),
            label,
        });
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn searchable(&self) -> &[FieldPath] {
        &self.searchable
    }

    pub fn default_sort(&self) -> &FieldPath {
        &self.default_sort
    }

    pub fn has_category(&self) -> bool {
        self.category.is_some()
    }

    /// Fresh state for this table
    pub fn initial_state(&self, page_size: usize) -> ViewState {
        ViewState::new(self.default_sort.clone(), page_size)
    }

    /// Whether `record` passes the search text and the category filter
    pub fn matches(&self, record: &R, state: &ViewState) -> bool {
        let query = state.search_text.to_lowercase();
        let text_match = query.is_empty()
            || self.searchable.iter().any(|path| {
                record
                    .field(path)
                    .search_text()
                    .is_some_and(|value| value.contains(&query))
            });
        if !text_match {
            return false;
        }

        match (&self.category, state.category_filter()) {
            (Some(path), Some(wanted)) => match record.field(path) {
                FieldValue::Text(value) => value == wanted,
                other => other.search_text().as_deref() == Some(wanted),
            },
            _ => true,
        }
    }

    /// Keep the records that match, in their original order
    pub fn filter<'a>(&self, records: &'a [R], state: &ViewState) -> Vec<&'a R> {
        records.iter().filter(|r| self.matches(r, state)).collect()
    }

    /// Run the whole pipeline and return the visible page
    ///
    /// # Arguments
    /// * `records` - Snapshot of every loaded record
    /// * `state` - Current table state
    ///
    /// # Returns
    /// * `ListPage<R>` - Rows of the requested page plus the filtered total
    pub fn run(&self, records: &[R], state: &ViewState) -> ListPage<R>
    where
        R: Clone,
    {
        let mut rows = self.filter(records, state);
        sort(&mut rows, state);
        let filtered_total = rows.len();
        let page = paginate(&rows, state);

        ListPage {
            rows: page.iter().map(|r| R::clone(r)).collect(),
            filtered_total,
            page_index: state.page_index,
            page_size: state.page_size,
            page_count: filtered_total.div_ceil(state.page_size),
        }
    }
}

fn kind_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Bool(_) => 0,
        FieldValue::Int(_) => 1,
        FieldValue::Text(_) => 2,
        FieldValue::Missing => 3,
    }
}

/// Ascending order of two present values
///
/// Text uses Russian collation, numbers compare numerically, `false < true`.
/// Values of different kinds order as flag, number, text.
pub fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Text(a), FieldValue::Text(b)) => collation::compare(a, b),
        (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Compare two records on `field` in `direction`
///
/// Missing values go last in both directions.
pub fn compare_records<R: Record>(
    a: &R,
    b: &R,
    field: &FieldPath,
    direction: SortDirection,
) -> Ordering {
    let (a, b) = (a.field(field), b.field(field));
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => direction.apply(compare_values(&a, &b)),
    }
}

/// Stable sort by the state's sort field and direction
pub fn sort<R: Record>(rows: &mut [R], state: &ViewState) {
    rows.sort_by(|a, b| compare_records(a, b, &state.sort_field, state.sort_direction));
}

/// Slice out the state's page
///
/// A page that starts past the end is empty. The page index is left alone.
pub fn paginate<'a, T>(rows: &'a [T], state: &ViewState) -> &'a [T] {
    let start = state.page_index.saturating_mul(state.page_size);
    if start >= rows.len() {
        return &[];
    }
    let end = start.saturating_add(state.page_size).min(rows.len());
    &rows[start..end]
}
