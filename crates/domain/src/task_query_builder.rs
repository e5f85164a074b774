//! SQL generation for filtered task reads, kept apart from the database
//! client so it can be unit tested without a connection.

use crate::entities::TaskFilter;

const SELECT_COLUMNS: &str = "SELECT id, namespace, date, name, data, category FROM tasks";

pub struct TaskQueryBuilder;

impl TaskQueryBuilder {
    /// Build the namespace-scoped SELECT for `TaskFilter`. The namespace is
    /// always the first parameter; filters append in a fixed order.
    pub fn build_list_query(namespace: &str, filter: &TaskFilter) -> (String, Vec<TaskQueryParam>) {
        let mut query = format!("{SELECT_COLUMNS} WHERE namespace = $1");
        let mut params = vec![TaskQueryParam::Text(namespace.to_string())];

        if let Some(id) = filter.id {
            query.push_str(&format!(" AND id = ${}", params.len() + 1));
            params.push(TaskQueryParam::Int64(id));
        }

        if let Some(name) = &filter.name {
            query.push_str(&format!(" AND name = ${}", params.len() + 1));
            params.push(TaskQueryParam::Text(name.clone()));
        }

        if let Some(category) = &filter.category {
            query.push_str(&format!(" AND category = ${}", params.len() + 1));
            params.push(TaskQueryParam::Text(category.clone()));
        }

        if !filter.not_ids.is_empty() {
            query.push_str(&format!(" AND id <> ALL(${})", params.len() + 1));
            params.push(TaskQueryParam::Int64Array(filter.not_ids.clone()));
        }

        query.push_str(" ORDER BY date ASC");

        (query, params)
    }

    /// Due-and-claimable rows; the lock clause makes concurrent pollers
    /// skip each other's in-flight claims instead of blocking.
    pub fn build_executable_query() -> String {
        format!(
            "{SELECT_COLUMNS} \
             WHERE namespace = $1 \
               AND date <= NOW() \
               AND date > NOW() - ($2::BIGINT * INTERVAL '1 millisecond') \
             FOR UPDATE SKIP LOCKED"
        )
    }

    pub fn build_claim_query() -> String {
        format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE SKIP LOCKED")
    }

    pub fn build_purge_query() -> String {
        "DELETE FROM tasks \
         WHERE namespace = $1 \
           AND date < NOW() - ($2::BIGINT * INTERVAL '1 millisecond')"
            .to_string()
    }
}

/// Type-safe parameter values to bind in builder order.
#[derive(Debug, Clone)]
pub enum TaskQueryParam {
    Text(String),
    Int64(i64),
    Int64Array(Vec<i64>),
}
