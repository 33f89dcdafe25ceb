use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{instrument, trace};

use crate::columns::{ActiveFilter, ColumnRegistry, SortDirection, SortSpec};
use crate::domain::{DEFAULT_PAGE_SIZE, PTVError};
use crate::record::{Field, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: usize, // 1-based
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
        }
    }

    /// A new page size always starts over at the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.current_page = 1;
    }

    /// Moves to `page`, clamped to the pages available for `total_items`.
    pub fn go_to(&mut self, page: usize, total_items: usize) {
        let last = total_pages(total_items, self.page_size).max(1);
        self.current_page = page.clamp(1, last);
    }

    pub fn next(&mut self, total_items: usize) {
        self.go_to(self.current_page + 1, total_items);
    }

    pub fn previous(&mut self, total_items: usize) {
        self.go_to(self.current_page.saturating_sub(1), total_items);
    }
}

/// Everything the pipeline needs besides the records themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub search: String,
    pub columns: ColumnRegistry,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedView {
    pub rows: Vec<Record>,
    pub total_items: usize,   // after search and filter, before pagination
    pub fetched_items: usize, // size of the record store
    pub pagination: Pagination,
}

impl DerivedView {
    pub fn total_pages(&self) -> usize {
        total_pages(self.total_items, self.pagination.page_size)
    }
}

pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

pub fn search<'a>(term: &str, rows: &[&'a Record], fields: &[Field]) -> Vec<&'a Record> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .copied()
        .filter(|record| {
            fields
                .iter()
                .any(|field| record.text(*field).to_lowercase().contains(&term))
        })
        .collect()
}

pub fn filter<'a>(filters: &[ActiveFilter], rows: &[&'a Record]) -> Result<Vec<&'a Record>, PTVError> {
    if filters.is_empty() {
        return Ok(rows.to_vec());
    }
    let needles: Vec<(Field, String)> = filters
        .iter()
        .map(|f| (f.field, f.text.to_lowercase()))
        .collect();

    let mut matches = Vec::new();
    for &record in rows {
        let mut keep = true;
        for (field, needle) in needles.iter() {
            let value = record.get(*field).ok_or(PTVError::MissingField(*field))?;
            if !value.to_text().to_lowercase().contains(needle.as_str()) {
                keep = false;
            }
        }
        if keep {
            matches.push(record);
        }
    }
    Ok(matches)
}

/// Returns a new ordering; `rows` itself is left untouched. Ties keep their input order.
pub fn sort<'a>(specs: &[SortSpec], rows: &[&'a Record]) -> Vec<&'a Record> {
    let mut sorted = rows.to_vec();
    if specs.is_empty() {
        return sorted;
    }
    sorted.sort_by(|a, b| {
        for spec in specs {
            let ordering = match (a.get(spec.field), b.get(spec.field)) {
                (Some(x), Some(y)) => x.compare(y),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            let ordering = match spec.direction {
                SortDirection::Desc => ordering.reverse(),
                _ => ordering,
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    sorted
}

pub fn paginate<T>(rows: &[T], page: usize, size: usize) -> &[T] {
    if page == 0 || size == 0 {
        return &[];
    }
    let begin = (page - 1).saturating_mul(size);
    if begin >= rows.len() {
        return &[];
    }
    let end = std::cmp::min(begin.saturating_add(size), rows.len());
    &rows[begin..end]
}

/// Search, filter, sort and paginate `records` according to `state`.
#[instrument(level = "trace", skip_all, fields(records = records.len()))]
pub fn run(records: &[Record], state: &ViewState) -> Result<DerivedView, PTVError> {
    let start_time = Instant::now();
    let all: Vec<&Record> = records.iter().collect();

    let searched = search(&state.search, &all, &state.columns.keys());
    let filtered = filter(&state.columns.active_filters(), &searched)?;
    let sorted = sort(&state.columns.active_sorts(), &filtered);

    let page = paginate(
        &sorted,
        state.pagination.current_page,
        state.pagination.page_size,
    );

    trace!(
        "Pipeline: searched {}, filtered {}, page {} with {} rows in {}µs",
        searched.len(),
        filtered.len(),
        state.pagination.current_page,
        page.len(),
        start_time.elapsed().as_micros()
    );

    Ok(DerivedView {
        rows: page.iter().map(|&r| r.clone()).collect(),
        total_items: sorted.len(),
        fetched_items: records.len(),
        pagination: state.pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnDescriptor;
    use crate::record::Value;

    fn drug(name: &str, unit: &str) -> Record {
        Record::new().with(Field::Name, name).with(Field::Unit, unit)
    }

    fn names(rows: &[&Record]) -> Vec<String> {
        rows.iter().map(|r| r.text(Field::Name)).collect()
    }

    fn registry() -> ColumnRegistry {
        ColumnRegistry::new(vec![
            ColumnDescriptor::new(Field::Name, "Name"),
            ColumnDescriptor::new(Field::Unit, "Unit"),
        ])
        .unwrap()
    }

    fn sample() -> Vec<Record> {
        vec![
            drug("Aspirin", "mg"),
            drug("aspirin forte", "mg"),
            drug("Paracetamol", "g"),
        ]
    }

    #[test]
    fn blank_search_returns_everything_in_order() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        assert_eq!(search("", &rows, &[Field::Name]), rows);
        assert_eq!(search("   ", &rows, &[Field::Name]), rows);
    }

    #[test]
    fn search_matches_any_listed_field_case_insensitive() {
        let records = vec![
            drug("Aspirin", "mg"),
            drug("Ibuprofen", "MG"),
            drug("Paracetamol", "g"),
            Record::new().with(Field::Unit, "mg"),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let fields = [Field::Name, Field::Unit];

        let found = search("  Mg ", &rows, &fields);
        assert_eq!(found.len(), 3);
        for record in rows.iter() {
            let hit = fields
                .iter()
                .any(|f| record.text(*f).to_lowercase().contains("mg"));
            assert_eq!(hit, found.contains(record));
        }

        // Only listed fields are searched
        assert!(search("aspirin", &rows, &[Field::Unit]).is_empty());
    }

    #[test]
    fn search_treats_missing_fields_as_empty() {
        let records = vec![Record::new().with(Field::Unit, "mg")];
        let rows: Vec<&Record> = records.iter().collect();
        assert!(search("undefined", &rows, &[Field::Name]).is_empty());
    }

    #[test]
    fn filter_requires_every_active_column() {
        let records = vec![
            drug("Aspirin", "mg"),
            drug("Aspirin", "g"),
            drug("Paracetamol", "mg"),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let filters = vec![
            ActiveFilter { field: Field::Name, text: "ASP".into() },
            ActiveFilter { field: Field::Unit, text: "mg".into() },
        ];
        let result = filter(&filters, &rows).unwrap();
        assert_eq!(result, vec![&records[0]]);

        let mut reversed = filters.clone();
        reversed.reverse();
        assert_eq!(filter(&reversed, &rows).unwrap(), result);

        let stepwise = filter(&filters[1..], &filter(&filters[..1], &rows).unwrap()).unwrap();
        assert_eq!(stepwise, result);
    }

    #[test]
    fn filter_without_active_filters_is_pass_through() {
        let records = sample();
        let rows: Vec<&Record> = records.iter().collect();
        assert_eq!(filter(&[], &rows).unwrap(), rows);
    }

    #[test]
    fn filter_reports_missing_field() {
        let records = vec![drug("Aspirin", "mg"), drug("Paracetamol", "g")];
        let rows: Vec<&Record> = records.iter().collect();
        let filters = vec![ActiveFilter { field: Field::Dosage, text: "5".into() }];
        let err = filter(&filters, &rows).unwrap_err();
        assert!(matches!(err, PTVError::MissingField(Field::Dosage)));
    }

    #[test]
    fn filter_matches_null_as_empty_text() {
        let records = vec![
            Record::new().with(Field::Dosage, Value::Null),
            Record::new().with(Field::Dosage, "500"),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let filters = vec![ActiveFilter { field: Field::Dosage, text: "5".into() }];
        assert_eq!(filter(&filters, &rows).unwrap(), vec![&records[1]]);
    }

    #[test]
    fn sort_numbers_descending() {
        let records: Vec<Record> = [3_i64, 1, 2]
            .into_iter()
            .map(|n| Record::new().with(Field::Num, n))
            .collect();
        let rows: Vec<&Record> = records.iter().collect();
        let specs = [SortSpec { field: Field::Num, direction: SortDirection::Desc }];
        let sorted: Vec<String> = sort(&specs, &rows).iter().map(|r| r.text(Field::Num)).collect();
        assert_eq!(sorted, vec!["3", "2", "1"]);
    }

    #[test]
    fn sort_strings_ascending_ignores_case() {
        let records = vec![drug("b", ""), drug("A", ""), drug("c", "")];
        let rows: Vec<&Record> = records.iter().collect();
        let specs = [SortSpec { field: Field::Name, direction: SortDirection::Asc }];
        assert_eq!(names(&sort(&specs, &rows)), vec!["A", "b", "c"]);
    }

    #[test]
    fn sort_is_stable_and_leaves_input_untouched() {
        let records = vec![
            drug("x", "mg").with(Field::Num, 1_i64),
            drug("y", "g").with(Field::Num, 2_i64),
            drug("z", "MG").with(Field::Num, 3_i64),
            drug("w", "g").with(Field::Num, 4_i64),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let before = rows.clone();

        let asc = [SortSpec { field: Field::Unit, direction: SortDirection::Asc }];
        assert_eq!(names(&sort(&asc, &rows)), vec!["y", "w", "x", "z"]);

        let desc = [SortSpec { field: Field::Unit, direction: SortDirection::Desc }];
        assert_eq!(names(&sort(&desc, &rows)), vec!["x", "z", "y", "w"]);

        assert_eq!(rows, before);
    }

    #[test]
    fn sort_orders_large_mixed_numbers_exactly() {
        let big = 2_i64.pow(53);
        let records: Vec<Record> = (0..64_i64)
            .map(|k| {
                let num = match k % 3 {
                    0 => Value::Integer(big + k),
                    1 => Value::Float(big as f64),
                    _ => Value::Integer(big - k),
                };
                Record::new().with(Field::Num, num)
            })
            .collect();
        let rows: Vec<&Record> = records.iter().collect();
        let specs = [SortSpec { field: Field::Num, direction: SortDirection::Asc }];

        let sorted = sort(&specs, &rows);
        assert_eq!(sorted.len(), 64);
        for pair in sorted.windows(2) {
            let (a, b) = (pair[0].get(Field::Num).unwrap(), pair[1].get(Field::Num).unwrap());
            assert_ne!(a.compare(b), std::cmp::Ordering::Greater, "{a:?} sorted before {b:?}");
        }
        let integers: Vec<i64> = sorted
            .iter()
            .filter_map(|r| match r.get(Field::Num) {
                Some(Value::Integer(i)) => Some(*i),
                _ => None,
            })
            .collect();
        assert!(integers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn later_sort_specs_break_ties() {
        let records = vec![
            drug("b", "mg"),
            drug("a", "g"),
            drug("a", "mg"),
            drug("c", "g"),
        ];
        let rows: Vec<&Record> = records.iter().collect();
        let specs = [
            SortSpec { field: Field::Unit, direction: SortDirection::Asc },
            SortSpec { field: Field::Name, direction: SortDirection::Desc },
        ];
        let sorted: Vec<(String, String)> = sort(&specs, &rows)
            .iter()
            .map(|r| (r.text(Field::Unit), r.text(Field::Name)))
            .collect();
        assert_eq!(
            sorted,
            vec![
                ("g".to_string(), "c".to_string()),
                ("g".to_string(), "a".to_string()),
                ("mg".to_string(), "b".to_string()),
                ("mg".to_string(), "a".to_string()),
            ]
        );
    }

    #[test]
    fn paginate_slices_one_based_pages() {
        let rows: Vec<usize> = (0..25).collect();
        assert_eq!(paginate(&rows, 3, 10), &rows[20..25]);
        assert_eq!(paginate(&rows, 1, 10), &rows[0..10]);
        assert!(paginate(&rows, 10, 10).is_empty());
        assert!(paginate(&rows, 0, 10).is_empty());
        assert!(paginate(&rows, 1, 0).is_empty());
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(0, 10), 0);
    }

    #[test]
    fn pagination_state_resets_and_clamps() {
        let mut pagination = Pagination::new(10);
        pagination.go_to(3, 25);
        assert_eq!(pagination.current_page, 3);
        pagination.next(25);
        assert_eq!(pagination.current_page, 3);
        pagination.set_page_size(25);
        assert_eq!(pagination.current_page, 1);
        pagination.previous(25);
        assert_eq!(pagination.current_page, 1);
        pagination.go_to(7, 0);
        assert_eq!(pagination.current_page, 1);
    }

    #[test]
    fn end_to_end_aspirin() {
        let records = sample();
        let mut state = ViewState {
            search: "aspirin".into(),
            columns: registry(),
            pagination: Pagination::new(10),
        };

        let view = run(&records, &state).unwrap();
        assert_eq!(view.total_items, 2);

        state.columns.set_filter(Field::Unit, "mg");
        let view = run(&records, &state).unwrap();
        assert_eq!(view.total_items, 2);

        state.columns.toggle_sort(Field::Name);
        let view = run(&records, &state).unwrap();
        let sorted: Vec<String> = view.rows.iter().map(|r| r.text(Field::Name)).collect();
        assert_eq!(sorted, vec!["Aspirin", "aspirin forte"]);

        state.pagination.set_page_size(1);
        let view = run(&records, &state).unwrap();
        assert_eq!(view.rows, vec![drug("Aspirin", "mg")]);
        assert_eq!(view.total_pages(), 2);
        assert_eq!(view.fetched_items, 3);
    }

    #[test]
    fn total_pages_use_post_filter_count() {
        let records: Vec<Record> = (0..30)
            .map(|i| drug(&format!("drug {i}"), if i < 12 { "mg" } else { "g" }))
            .collect();
        let mut state = ViewState {
            search: String::new(),
            columns: registry(),
            pagination: Pagination::new(10),
        };
        state.columns.set_filter(Field::Unit, "mg");
        state.pagination.go_to(2, 12);
        state.pagination.set_page_size(5);
        assert_eq!(state.pagination.current_page, 1);

        let view = run(&records, &state).unwrap();
        assert_eq!(view.total_items, 12);
        assert_eq!(view.total_pages(), 3);
        assert_eq!(view.fetched_items, 30);
    }

    #[test]
    fn view_state_round_trips_and_validates_columns() {
        let mut state = ViewState {
            search: "aspirin".into(),
            columns: registry(),
            ..Default::default()
        };
        state.columns.set_filter(Field::Unit, "mg");
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(serde_json::from_str::<ViewState>(&json).unwrap(), state);

        let duplicate = r#"{"search": "", "pagination": {"current_page": 1, "page_size": 10},
            "columns": [{"key": "name", "label": "A"}, {"key": "name", "label": "B"}]}"#;
        assert!(serde_json::from_str::<ViewState>(duplicate).is_err());

        let empty = r#"{"search": "", "pagination": {"current_page": 1, "page_size": 10}, "columns": []}"#;
        assert!(serde_json::from_str::<ViewState>(empty).is_err());
    }

    #[test]
    fn run_does_not_reorder_the_store() {
        let records = sample();
        let before = records.clone();
        let mut state = ViewState {
            columns: registry(),
            ..Default::default()
        };
        state.columns.set_sort(Field::Name, SortDirection::Desc);
        run(&records, &state).unwrap();
        run(&records, &state).unwrap();
        assert_eq!(records, before);
    }

    #[test]
    fn run_aborts_on_missing_filter_field() {
        let records = vec![Record::new().with(Field::Unit, "mg")];
        let mut state = ViewState {
            columns: registry(),
            ..Default::default()
        };
        state.columns.set_filter(Field::Name, "a");
        assert!(matches!(
            run(&records, &state),
            Err(PTVError::MissingField(Field::Name))
        ));
    }

    #[test]
    fn view_state_serializes() {
        let state = ViewState {
            search: "asp".into(),
            columns: registry(),
            pagination: Pagination::new(25),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: ViewState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
