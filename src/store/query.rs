use std::cmp::Ordering;
use std::marker::PhantomData;

use regex::Regex;

use super::Record;

/// Queryable attributes. Each record type answers for the fields it carries
/// and returns `None` for the rest, which never satisfies a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    CityName,
    TheatreName,
    FilmTitle,
    Variant,
    Date,
    Time,
    ProviderId,
    PriceIdr,
    TheatreId,
    Keyword,
    Kind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Str(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lte,
    Gte,
}

#[derive(Clone, Debug)]
enum Condition {
    Compare { field: Field, op: Op, value: Value },
    Matches { field: Field, pattern: Regex },
}

/// Conjunction of field conditions over one record type.
#[derive(Clone, Debug)]
pub struct Filter<R> {
    conditions: Vec<Condition>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Default for Filter<R> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> Filter<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Compare {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: Field, value: impl Into<Value>) -> Self {
        self.with(field, Op::Eq, value)
    }

    pub fn lte(self, field: Field, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lte, value)
    }

    pub fn gte(self, field: Field, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gte, value)
    }

    /// Adds an equality condition only when `value` is present.
    pub fn eq_opt<V: Into<Value>>(self, field: Field, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    pub fn matches(mut self, field: Field, pattern: Regex) -> Self {
        self.conditions.push(Condition::Matches { field, pattern });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn accepts(&self, record: &R) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Compare { field, op, value } => record
                .field(*field)
                .and_then(|actual| compare(actual, value))
                .map(|ordering| match op {
                    Op::Eq => ordering == Ordering::Equal,
                    Op::Lte => ordering != Ordering::Greater,
                    Op::Gte => ordering != Ordering::Less,
                })
                .unwrap_or(false),
            Condition::Matches { field, pattern } => match record.field(*field) {
                Some(FieldValue::Str(text)) => pattern.is_match(text),
                _ => false,
            },
        })
    }
}

fn compare(actual: FieldValue<'_>, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (FieldValue::Str(a), Value::Str(b)) => Some(a.cmp(b.as_str())),
        (FieldValue::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Screening;

    fn screening(date: &str, time: &str, price: i64) -> Screening {
        Screening {
            city_name: "JAKARTA".into(),
            theatre_name: "GRAND 21".into(),
            film_title: "FILM".into(),
            variant: "2D".into(),
            date: date.into(),
            time: time.into(),
            provider_id: Some("xxi".into()),
            price_idr: Some(price),
            theatre_id: None,
        }
    }

    #[test]
    fn conditions_are_conjunctive() {
        let filter = Filter::<Screening>::new()
            .eq(Field::CityName, "JAKARTA")
            .gte(Field::Date, "2024-01-02")
            .lte(Field::PriceIdr, 50_000);

        assert!(filter.accepts(&screening("2024-01-02", "10:00", 50_000)));
        assert!(filter.accepts(&screening("2024-01-05", "10:00", 35_000)));
        assert!(!filter.accepts(&screening("2024-01-01", "10:00", 35_000)));
        assert!(!filter.accepts(&screening("2024-01-03", "10:00", 60_000)));
    }

    #[test]
    fn type_mismatch_and_missing_fields_never_match() {
        let mut record = screening("2024-01-02", "10:00", 50_000);
        record.theatre_id = None;

        assert!(!Filter::<Screening>::new()
            .eq(Field::PriceIdr, "50000")
            .accepts(&record));
        assert!(!Filter::<Screening>::new()
            .eq(Field::TheatreId, "x")
            .accepts(&record));
        assert!(!Filter::<Screening>::new()
            .eq(Field::Keyword, "FILM")
            .accepts(&record));
    }

    #[test]
    fn regex_condition_matches_substrings() {
        let filter = Filter::<Screening>::new()
            .matches(Field::TheatreName, Regex::new("GRAND").expect("regex"));
        assert!(filter.accepts(&screening("2024-01-02", "10:00", 1)));
    }
}
