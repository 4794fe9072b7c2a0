//! Structured query construction.
//!
//! Repositories only need single-collection queries with a handful of
//! filters joined by AND, an optional sort and a limit.

use crate::types::{
    CollectionSelector, CompositeFilter, FieldFilter, FieldReference, Filter, Order,
    StructuredQuery, Value,
};

/// Upper bound on documents fetched by one query (or one page of a paged query).
pub const MAX_QUERY_LIMIT: i32 = 1000;

/// Sort direction for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    /// Get the Firestore direction string.
    pub const fn firestore_direction(&self) -> &'static str {
        match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
        }
    }
}

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    LessThan,
}

impl FilterOp {
    pub const fn firestore_op(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::LessThan => "LESS_THAN",
        }
    }
}

/// Builder for a [`StructuredQuery`] over one collection.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    collection_id: String,
    filters: Vec<FieldFilter>,
    order_by: Vec<Order>,
    limit: Option<i32>,
}

impl QueryBuilder {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Add `field == value`.
    pub fn where_eq(self, field: &str, value: Value) -> Self {
        self.filter(field, FilterOp::Equal, value)
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: Value) -> Self {
        self.filters.push(FieldFilter {
            field: FieldReference {
                field_path: field.to_string(),
            },
            op: op.firestore_op().to_string(),
            value,
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push(Order {
            field: FieldReference {
                field_path: field.to_string(),
            },
            direction: direction.firestore_direction().to_string(),
        });
        self
    }

    /// Limit the result count (clamped to 1..=[`MAX_QUERY_LIMIT`]).
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some((limit.min(MAX_QUERY_LIMIT as u32) as i32).max(1));
        self
    }

    pub fn build(self) -> StructuredQuery {
        let mut filters: Vec<Filter> = self
            .filters
            .into_iter()
            .map(|f| Filter {
                composite_filter: None,
                field_filter: Some(f),
            })
            .collect();

        let r#where = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter {
                composite_filter: Some(CompositeFilter {
                    op: "AND".to_string(),
                    filters,
                }),
                field_filter: None,
            }),
        };

        StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: self.collection_id,
                all_descendants: None,
            }],
            r#where,
            order_by: (!self.order_by.is_empty()).then_some(self.order_by),
            start_at: None,
            limit: Some(self.limit.unwrap_or(MAX_QUERY_LIMIT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_filter_is_not_composite() {
        let query = QueryBuilder::new("jobs")
            .where_eq("posted_by", Value::StringValue("u1".into()))
            .build();

        let filter = query.r#where.unwrap();
        assert!(filter.composite_filter.is_none());
        assert_eq!(filter.field_filter.unwrap().op, "EQUAL");
        assert_eq!(query.limit, Some(MAX_QUERY_LIMIT));
    }

    #[test]
    fn test_multiple_filters_are_anded() {
        let query = QueryBuilder::new("job_applications")
            .where_eq("employer_id", Value::StringValue("u1".into()))
            .where_eq("deleted_by_employer", Value::BooleanValue(false))
            .build();

        let composite = query.r#where.unwrap().composite_filter.unwrap();
        assert_eq!(composite.op, "AND");
        assert_eq!(composite.filters.len(), 2);
    }

    #[test]
    fn test_order_and_limit() {
        let query = QueryBuilder::new("jobs")
            .order_by("created_at", SortDirection::Descending)
            .limit(5000)
            .build();

        assert!(query.r#where.is_none());
        let order = query.order_by.unwrap();
        assert_eq!(order[0].field.field_path, "created_at");
        assert_eq!(order[0].direction, "DESCENDING");
        assert_eq!(query.limit, Some(MAX_QUERY_LIMIT));

        let query = QueryBuilder::new("jobs").limit(0).build();
        assert_eq!(query.limit, Some(1));
    }
}
