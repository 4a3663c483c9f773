use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::gateway::{Direction, Filter, Gateway, GatewayError, Query, Row, Table};

/// PostgREST gateway for a hosted (Supabase-style) project.
#[derive(Debug)]
pub struct RestGateway {
    base_url: String,
    api_key: String,
    bearer: String,
    client: reqwest::blocking::Client,
}

impl RestGateway {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = config.require_url()?.trim_end_matches('/').to_string();
        let api_key = config.require_anon_key()?.to_string();
        let bearer = config.access_token.clone().unwrap_or_else(|| api_key.clone());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { base_url, api_key, bearer, client })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn send(&self, table: Table, request: reqwest::blocking::RequestBuilder) -> Result<Vec<Row>, GatewayError> {
        let response = request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
            .send()
            .map_err(|e| GatewayError::Request {
                table: table.as_str(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| GatewayError::Request {
            table: table.as_str(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                table: table.as_str(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| GatewayError::Decode {
            table: table.as_str(),
            source,
        })
    }
}

impl Gateway for RestGateway {
    fn select(&self, query: &Query) -> Result<Vec<Row>, GatewayError> {
        let params = encode_query(query);
        debug!(table = query.table.as_str(), ?params, "select");
        let request = self.client.get(self.table_url(query.table)).query(&params);
        self.send(query.table, request)
    }

    fn insert(&self, table: Table, row: &Row) -> Result<Row, GatewayError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row.clone()));
        self.send(table, request)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Invalid(format!("insert into {} returned no row", table.as_str())))
    }

    fn update(&self, query: &Query, patch: &Row) -> Result<usize, GatewayError> {
        if query.filters.is_empty() {
            return Err(GatewayError::Invalid("refusing unfiltered update".to_string()));
        }
        let params = encode_filters(&query.filters);
        debug!(table = query.table.as_str(), ?params, "update");
        let request = self
            .client
            .patch(self.table_url(query.table))
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch.clone()));
        Ok(self.send(query.table, request)?.len())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Full PostgREST parameter list for a select.
pub fn encode_query(query: &Query) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let select = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    };
    params.push(("select".to_string(), select));
    params.extend(encode_filters(&query.filters));

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|(column, direction)| match direction {
                Direction::Asc => format!("{}.asc", column),
                Direction::Desc => format!("{}.desc", column),
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    params
}

pub fn encode_filters(filters: &[Filter]) -> Vec<(String, String)> {
    let mut params = Vec::new();
    // PostgREST takes one `and` key, so every null-tolerant exclusion shares it.
    let mut exclusions = Vec::new();

    for filter in filters {
        match filter {
            Filter::Eq(column, value) => params.push((column.to_string(), format!("eq.{}", value.render()))),
            Filter::Gte(column, value) => params.push((column.to_string(), format!("gte.{}", value.render()))),
            Filter::Lte(column, value) => params.push((column.to_string(), format!("lte.{}", value.render()))),
            Filter::In(column, values) => params.push((column.to_string(), format!("in.({})", quote_list(values)))),
            Filter::NotIn(column, values) => exclusions.push(format!(
                "or({c}.is.null,{c}.not.in.({}))",
                quote_list(values),
                c = column
            )),
        }
    }

    if !exclusions.is_empty() {
        params.push(("and".to_string(), format!("({})", exclusions.join(","))));
    }
    params
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
    }

    #[test]
    fn test_encode_application_query() {
        let query = Query::from(Table::Applications)
            .eq("is_deleted", false)
            .gte("date_applied", "2026-10-01")
            .lte("date_applied", "2026-10-17")
            .order("date_applied", Direction::Desc)
            .order("created_at", Direction::Desc);
        let params = encode_query(&query);

        assert_eq!(param(&params, "select"), vec!["*"]);
        assert_eq!(param(&params, "is_deleted"), vec!["eq.false"]);
        assert_eq!(param(&params, "date_applied"), vec!["gte.2026-10-01", "lte.2026-10-17"]);
        assert_eq!(param(&params, "order"), vec!["date_applied.desc,created_at.desc"]);
    }

    #[test]
    fn test_encode_in_uses_quoted_values() {
        let id: Uuid = "6f1c3a52-93a4-4b7e-9d55-5b0b8f7f2c11".parse().unwrap();
        let query = Query::from(Table::Clients).select(&["id", "first_name"]).in_ids("id", [id]);
        let params = encode_query(&query);

        assert_eq!(param(&params, "select"), vec!["id,first_name"]);
        assert_eq!(param(&params, "id"), vec!["in.(\"6f1c3a52-93a4-4b7e-9d55-5b0b8f7f2c11\")"]);
    }

    #[test]
    fn test_encode_exclusions_share_one_and_group() {
        let a = Uuid::nil();
        let query = Query::from(Table::Applications)
            .not_in_ids("client_id", [a])
            .not_in_ids("specialist_id", [a]);
        let params = encode_query(&query);

        let nil = "\"00000000-0000-0000-0000-000000000000\"";
        let expected = format!(
            "(or(client_id.is.null,client_id.not.in.({nil})),or(specialist_id.is.null,specialist_id.not.in.({nil})))"
        );
        assert_eq!(param(&params, "and"), vec![expected.as_str()]);
    }

    #[test]
    fn test_quote_list_escapes_quotes() {
        assert_eq!(quote_list(&["a\"b".to_string()]), "\"a\\\"b\"");
    }

    #[test]
    fn test_new_requires_url_and_key() {
        let err = RestGateway::new(&BackendConfig::default()).unwrap_err();
        assert!(err.to_string().contains("RECRUITOPS_URL"));

        let config = BackendConfig {
            url: Some("https://example.supabase.co/".to_string()),
            anon_key: Some("anon".to_string()),
            ..Default::default()
        };
        let gateway = RestGateway::new(&config).unwrap();
        assert_eq!(gateway.describe(), "https://example.supabase.co");
        assert_eq!(gateway.table_url(Table::ClientAssignments), "https://example.supabase.co/rest/v1/client_assignments");
    }
}
