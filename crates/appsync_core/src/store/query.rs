//! Live query description and in-process evaluation.

use crate::model::document::{CollectionPath, DocumentSnapshot, FieldValue};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Equals { field: String, value: FieldValue },
}

impl FieldFilter {
    fn matches(&self, document: &DocumentSnapshot) -> bool {
        match self {
            Self::Equals { field, value } => document
                .get(field)
                .is_some_and(|current| current.order_cmp(value) == Ordering::Equal),
        }
    }
}

/// Query over exactly one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_equals(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(FieldFilter::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Filters and orders documents already loaded from `self.collection`.
    ///
    /// Ordered queries drop documents lacking the order field; ties break by
    /// document id so results are deterministic.
    pub fn apply(&self, documents: Vec<DocumentSnapshot>) -> Vec<DocumentSnapshot> {
        let mut matched = documents
            .into_iter()
            .filter(|document| self.filters.iter().all(|filter| filter.matches(document)))
            .collect::<Vec<_>>();

        match self.order_by.as_ref() {
            Some(order) => {
                matched.retain(|document| document.get(&order.field).is_some());
                matched.sort_by(|left, right| {
                    let primary = match (left.get(&order.field), right.get(&order.field)) {
                        (Some(a), Some(b)) => a.order_cmp(b),
                        _ => Ordering::Equal,
                    };
                    let primary = match order.direction {
                        SortDirection::Ascending => primary,
                        SortDirection::Descending => primary.reverse(),
                    };
                    primary.then_with(|| left.id.cmp(&right.id))
                });
            }
            None => matched.sort_by(|left, right| left.id.cmp(&right.id)),
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::{Query, SortDirection};
    use crate::model::document::{CollectionPath, Document, DocumentSnapshot, FieldValue};

    fn doc(id: &str, fields: &[(&str, FieldValue)]) -> DocumentSnapshot {
        let fields = fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<Document>();
        DocumentSnapshot::new(id, fields)
    }

    #[test]
    fn equality_filter_keeps_only_matching_documents() {
        let query = Query::collection(CollectionPath::folders()).where_equals("uid", "u1");
        let result = query.apply(vec![
            doc("a", &[("uid", FieldValue::from("u1"))]),
            doc("b", &[("uid", FieldValue::from("u2"))]),
            doc("c", &[]),
        ]);
        let ids = result.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn ordering_drops_documents_without_field_and_breaks_ties_by_id() {
        let query = Query::collection(CollectionPath::notes())
            .order_by("timestamp", SortDirection::Ascending);
        let result = query.apply(vec![
            doc("z", &[("timestamp", FieldValue::Timestamp(1))]),
            doc("late", &[("timestamp", FieldValue::Timestamp(9))]),
            doc("a", &[("timestamp", FieldValue::Timestamp(1))]),
            doc("none", &[]),
        ]);
        let ids = result.iter().map(|d| d.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "z", "late"]);
    }

    #[test]
    fn descending_reverses_primary_order() {
        let query = Query::collection(CollectionPath::notes())
            .order_by("timestamp", SortDirection::Descending);
        let result = query.apply(vec![
            doc("old", &[("timestamp", FieldValue::Timestamp(1))]),
            doc("new", &[("timestamp", FieldValue::Timestamp(2))]),
        ]);
        assert_eq!(result[0].id, "new");
    }
}
