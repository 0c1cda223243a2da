//! Postgres-backed query execution for generated endpoints.
//!
//! Executes the configured SQL wrapped in a `json_agg(row_to_json(...))`
//! aggregation so result rows come back as one JSON document regardless of
//! the query's column shape. Declared parameters are substituted as typed,
//! escaped literals; `:name` tokens in the SQL are the binding sites. The
//! endpoint and query configurations arrive pre-resolved from the request
//! handler.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::RunQueryDsl;
use tracing::debug;

use restweave_core::model::{EndpointConfig, ParameterKind, QueryConfig};

use crate::registry::{QueryExecutionError, QueryExecutor, QueryParams};

use super::DieselPoolManager;

#[derive(diesel::QueryableByName)]
struct JsonRows {
    #[diesel(sql_type = diesel::sql_types::Text)]
    items: String,
}

/// [`QueryExecutor`] backed by the Diesel pool manager.
pub struct PgQueryExecutor {
    pools: Arc<DieselPoolManager>,
}

impl PgQueryExecutor {
    pub fn new(pools: Arc<DieselPoolManager>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(
        &self,
        endpoint: &EndpointConfig,
        query: &QueryConfig,
        params: QueryParams,
    ) -> Result<serde_json::Value, QueryExecutionError> {
        let pool = self
            .pools
            .pool(&query.database)
            .ok_or_else(|| QueryExecutionError::UnknownDatabase {
                name: query.database.clone(),
            })?;

        let sql = render_sql(query, endpoint, &params)?;
        debug!(endpoint = %endpoint.name, query = %query.name, "Executing endpoint query");

        let document = tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(|error| error.to_string())?;
            let wrapped = format!(
                "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json)::text AS items FROM ({}) AS t",
                sql
            );
            let row: JsonRows = diesel::sql_query(wrapped)
                .get_result(&mut connection)
                .map_err(|error| error.to_string())?;
            Ok::<String, String>(row.items)
        })
        .await
        .map_err(|error| QueryExecutionError::Execution {
            message: error.to_string(),
        })?
        .map_err(|message| QueryExecutionError::Execution { message })?;

        serde_json::from_str(&document).map_err(|error| QueryExecutionError::Execution {
            message: format!("result was not valid JSON: {}", error),
        })
    }
}

/// Substitute declared parameters and append the pagination clause.
fn render_sql(
    query: &QueryConfig,
    endpoint: &EndpointConfig,
    params: &QueryParams,
) -> Result<String, QueryExecutionError> {
    let mut sql = query.sql.clone();

    // Longest names first so ':id' never clobbers a ':id_range' site.
    let mut declared: Vec<_> = query.parameters.iter().collect();
    declared.sort_by_key(|parameter| std::cmp::Reverse(parameter.name.len()));

    for parameter in declared {
        let token = format!(":{}", parameter.name);
        let literal = match params.values.get(&parameter.name) {
            Some(value) => render_literal(&parameter.name, parameter.kind, value)?,
            None if parameter.required => {
                return Err(QueryExecutionError::MissingParameter {
                    name: parameter.name.clone(),
                });
            }
            None => "NULL".to_string(),
        };
        sql = sql.replace(&token, &literal);
    }

    if let Some(pagination) = endpoint.pagination.as_ref().filter(|p| p.enabled) {
        let page_size = params
            .page_size
            .unwrap_or(pagination.default_page_size)
            .min(pagination.max_page_size)
            .max(1);
        let page = params.page.unwrap_or(1).max(1);
        let offset = (page - 1) as u64 * page_size as u64;
        sql = format!("{} LIMIT {} OFFSET {}", sql, page_size, offset);
    }

    Ok(sql)
}

/// Render one parameter value as a typed SQL literal.
fn render_literal(
    name: &str,
    kind: ParameterKind,
    value: &str,
) -> Result<String, QueryExecutionError> {
    match kind {
        ParameterKind::String => Ok(format!("'{}'", value.replace('\'', "''"))),
        ParameterKind::Integer => value
            .parse::<i64>()
            .map(|parsed| parsed.to_string())
            .map_err(|_| QueryExecutionError::InvalidParameter {
                name: name.to_string(),
                message: format!("'{}' is not an integer", value),
            }),
        ParameterKind::Boolean => match value {
            "true" | "TRUE" => Ok("TRUE".to_string()),
            "false" | "FALSE" => Ok("FALSE".to_string()),
            other => Err(QueryExecutionError::InvalidParameter {
                name: name.to_string(),
                message: format!("'{}' is not a boolean", other),
            }),
        },
    }
}
