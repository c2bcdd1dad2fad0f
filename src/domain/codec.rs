//! Mapping between [`Todo`] and the store's document shape.
//!
//! Field names are camelCase on the wire. The id never travels in the field
//! map; it is the document key.

use chrono::Utc;

use super::document::{DecodeError, Document, FieldValue, Fields};
use super::todo::Todo;

pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const IS_COMPLETED: &str = "isCompleted";
pub const PRIORITY: &str = "priority";
pub const CREATED_AT: &str = "createdAt";
pub const DUE_DATE: &str = "dueDate";

pub fn encode(todo: &Todo) -> Fields {
    Fields::from([
        (TITLE.to_string(), FieldValue::from(todo.title.as_str())),
        (DESCRIPTION.to_string(), FieldValue::from(todo.description.as_str())),
        (IS_COMPLETED.to_string(), FieldValue::from(todo.is_completed)),
        (PRIORITY.to_string(), FieldValue::from(todo.priority)),
        (CREATED_AT.to_string(), FieldValue::from(todo.created_at)),
        (DUE_DATE.to_string(), FieldValue::from(todo.due_date)),
    ])
}

/// Returns `None` for documents that cannot be read as a todo; batch callers skip those.
pub fn decode(document: &Document) -> Option<Todo> {
    try_decode(document).ok()
}

pub fn try_decode(document: &Document) -> Result<Todo, DecodeError> {
    // A malformed createdAt is replaced rather than rejected.
    let created_at = document.get_timestamp(CREATED_AT).ok().flatten().unwrap_or_else(Utc::now);
    Ok(Todo {
        id: document.id.clone(),
        title: document.get_string(TITLE)?.unwrap_or_default().to_string(),
        description: document.get_string(DESCRIPTION)?.unwrap_or_default().to_string(),
        is_completed: document.get_bool(IS_COMPLETED)?.unwrap_or(false),
        priority: document.get_integer(PRIORITY)?.unwrap_or(1),
        created_at,
        due_date: document.get_timestamp(DUE_DATE)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn sample() -> Todo {
        Todo {
            id: String::new(),
            title: "Buy milk".into(),
            description: "2 litres".into(),
            is_completed: true,
            priority: 3,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            due_date: Some(Utc.with_ymd_and_hms(2024, 5, 3, 18, 0, 0).unwrap()),
        }
    }

    #[test]
    fn encode_carries_every_field_but_id() {
        let mut todo = sample();
        todo.id = "abc123".into();
        let fields = encode(&todo);
        let keys: Vec<_> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![CREATED_AT, DESCRIPTION, DUE_DATE, IS_COMPLETED, PRIORITY, TITLE]);
        assert!(!fields.values().any(|v| v == &FieldValue::from("abc123")));
    }

    #[test]
    fn decode_restores_encoded_todo_with_supplied_id() {
        let todo = sample();
        let decoded = decode(&Document::new("abc123", encode(&todo))).unwrap();
        assert_eq!(decoded, Todo { id: "abc123".into(), ..todo });
    }

    #[test]
    fn absent_due_date_stays_absent() {
        let todo = Todo { due_date: None, ..sample() };
        let fields = encode(&todo);
        assert_eq!(fields.get(DUE_DATE), Some(&FieldValue::Null));
        assert_eq!(decode(&Document::new("x", fields)).unwrap().due_date, None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let before = Utc::now();
        let todo = decode(&Document::new("x", Fields::new())).unwrap();
        assert_eq!(todo.title, "");
        assert_eq!(todo.description, "");
        assert!(!todo.is_completed);
        assert_eq!(todo.priority, 1);
        assert!(todo.due_date.is_none());
        assert!(todo.created_at >= before && todo.created_at - before < Duration::seconds(5));
    }

    #[test]
    fn malformed_created_at_falls_back_to_now() {
        let mut fields = encode(&sample());
        fields.insert(CREATED_AT.into(), FieldValue::from("yesterday"));
        let todo = decode(&Document::new("x", fields)).unwrap();
        assert!(Utc::now() - todo.created_at < Duration::seconds(5));
    }

    #[test]
    fn incompatible_field_type_skips_record() {
        let mut fields = encode(&sample());
        fields.insert(IS_COMPLETED.into(), FieldValue::from("yes"));
        let doc = Document::new("x", fields);
        assert!(decode(&doc).is_none());
        assert!(matches!(try_decode(&doc), Err(DecodeError::TypeMismatch { .. })));
    }

    #[test]
    fn out_of_range_priority_is_kept() {
        let todo = Todo { priority: 9, ..sample() };
        assert_eq!(decode(&Document::new("x", encode(&todo))).unwrap().priority, 9);
    }
}
