use anyhow::{anyhow, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::gateway::{is_identifier, Direction, Filter, Gateway, GatewayError, Query, Row, Scalar, Table};

// SQLite has no boolean type; these columns are decoded back to JSON booleans.
const BOOL_COLUMNS: &[&str] = &["is_demo", "is_active", "is_flagged", "is_deleted"];

/// Local SQLite copy of the backend tables, usable anywhere a REST gateway is.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn), path: path.to_path_buf() })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "recruitops") {
            Ok(proj_dirs.data_dir().join("recruitops.db"))
        } else {
            Ok(PathBuf::from("recruitops.db"))
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, GatewayError> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Invalid("local store lock poisoned".to_string()))
    }

    pub fn init(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT,
                email TEXT,
                role TEXT NOT NULL DEFAULT 'specialist' CHECK (role IN ('admin', 'specialist')),
                is_demo INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT,
                email TEXT,
                is_demo INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS client_assignments (
                id TEXT PRIMARY KEY,
                specialist_id TEXT NOT NULL REFERENCES users(id),
                client_id TEXT NOT NULL REFERENCES clients(id),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                company TEXT NOT NULL,
                job_title TEXT NOT NULL,
                client_id TEXT REFERENCES clients(id),
                specialist_id TEXT REFERENCES users(id),
                date_applied TEXT NOT NULL,
                source TEXT,
                source_link TEXT,
                application_link TEXT,
                location TEXT,
                salary TEXT,
                resume_used TEXT,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                flag_reason TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_applications_date ON applications(date_applied);
            CREATE INDEX IF NOT EXISTS idx_applications_client ON applications(client_id);
            CREATE INDEX IF NOT EXISTS idx_applications_specialist ON applications(specialist_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_specialist ON client_assignments(specialist_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Local store at {} not initialized. Run 'recruitops init-local' first.",
                self.path.display()
            ));
        }
        Ok(())
    }

    fn select_rows(
        conn: &Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Row>, GatewayError> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut out = Row::new();
            for (i, name) in names.iter().enumerate() {
                out.insert(name.clone(), column_to_json(name, row.get_ref(i)?));
            }
            Ok(out)
        })?;
        let out = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }
}

impl Gateway for Database {
    fn select(&self, query: &Query) -> Result<Vec<Row>, GatewayError> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            checked(&query.columns)?.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, query.table.as_str());
        let mut params = Vec::new();
        push_where(&mut sql, &mut params, &query.filters)?;

        if !query.order.is_empty() {
            let keys = query
                .order
                .iter()
                .map(|(column, direction)| {
                    checked(&[*column])?;
                    Ok(match direction {
                        Direction::Asc => format!("{} ASC", column),
                        Direction::Desc => format!("{} DESC", column),
                    })
                })
                .collect::<Result<Vec<_>, GatewayError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        let conn = self.conn()?;
        Self::select_rows(&conn, &sql, &params)
    }

    fn insert(&self, table: Table, row: &Row) -> Result<Row, GatewayError> {
        let mut row = row.clone();
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        checked(&columns)?;
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.as_str(),
            columns.join(", "),
            placeholders
        );
        let params: Vec<SqlValue> = row.values().map(json_to_sql).collect();

        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(params.iter()))?;

        let select = format!("SELECT * FROM {} WHERE id = ?", table.as_str());
        Self::select_rows(&conn, &select, &[SqlValue::Text(id)])?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Invalid(format!("inserted row vanished from {}", table.as_str())))
    }

    fn update(&self, query: &Query, patch: &Row) -> Result<usize, GatewayError> {
        if patch.is_empty() {
            return Ok(0);
        }
        if query.filters.is_empty() {
            return Err(GatewayError::Invalid("refusing unfiltered update".to_string()));
        }

        let columns: Vec<&str> = patch.keys().map(String::as_str).collect();
        checked(&columns)?;
        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
        let mut sql = format!("UPDATE {} SET {}", query.table.as_str(), assignments.join(", "));
        let mut params: Vec<SqlValue> = patch.values().map(json_to_sql).collect();
        push_where(&mut sql, &mut params, &query.filters)?;

        let conn = self.conn()?;
        Ok(conn.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn describe(&self) -> String {
        format!("local store {}", self.path.display())
    }
}

fn checked<'a>(names: &'a [&'a str]) -> Result<&'a [&'a str], GatewayError> {
    match names.iter().find(|n| !is_identifier(n)) {
        Some(bad) => Err(GatewayError::Invalid(format!("bad column name '{}'", bad))),
        None => Ok(names),
    }
}

fn push_where(sql: &mut String, params: &mut Vec<SqlValue>, filters: &[Filter]) -> Result<(), GatewayError> {
    let mut clauses = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = filter.column();
        checked(&[column])?;
        let clause = match filter {
            Filter::Eq(_, v) => {
                params.push(scalar_to_sql(v));
                format!("{} = ?", column)
            }
            Filter::Gte(_, v) => {
                params.push(scalar_to_sql(v));
                format!("{} >= ?", column)
            }
            Filter::Lte(_, v) => {
                params.push(scalar_to_sql(v));
                format!("{} <= ?", column)
            }
            Filter::In(_, values) => {
                params.extend(values.iter().cloned().map(SqlValue::Text));
                format!("{} IN ({})", column, vec!["?"; values.len()].join(", "))
            }
            Filter::NotIn(_, values) => {
                params.extend(values.iter().cloned().map(SqlValue::Text));
                format!(
                    "({} IS NULL OR {} NOT IN ({}))",
                    column,
                    column,
                    vec!["?"; values.len()].join(", ")
                )
            }
        };
        clauses.push(clause);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    Ok(())
}

fn scalar_to_sql(value: &Scalar) -> SqlValue {
    match value {
        Scalar::Text(s) => SqlValue::Text(s.clone()),
        Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn column_to_json(name: &str, value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if BOOL_COLUMNS.contains(&name) => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(db: &Database, table: Table, row: Value) -> Row {
        let Value::Object(row) = row else { panic!("row must be an object") };
        db.insert(table, &row).unwrap()
    }

    #[test]
    fn test_ensure_initialized_before_and_after_init() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("nested/recruitops.db")).unwrap();
        let err = db.ensure_initialized().unwrap_err();
        assert!(err.to_string().contains("init-local"));

        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
    }

    #[test]
    fn test_insert_assigns_id_and_decodes_booleans() {
        let db = Database::in_memory().unwrap();
        let row = insert(&db, Table::Clients, json!({"first_name": "Ada", "is_demo": true}));

        assert!(row["id"].as_str().and_then(|s| s.parse::<Uuid>().ok()).is_some());
        assert_eq!(row["is_demo"], json!(true));
        assert_eq!(row["last_name"], Value::Null);
    }

    #[test]
    fn test_select_filters_and_orders() {
        let db = Database::in_memory().unwrap();
        insert(&db, Table::Clients, json!({"first_name": "Zed"}));
        insert(&db, Table::Clients, json!({"first_name": "Amy"}));
        insert(&db, Table::Clients, json!({"first_name": "Demo", "is_demo": true}));

        let query = Query::from(Table::Clients)
            .select(&["id", "first_name"])
            .eq("is_demo", false)
            .order("first_name", Direction::Asc);
        let rows = db.select(&query).unwrap();

        let names: Vec<&str> = rows.iter().filter_map(|r| r["first_name"].as_str()).collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_in_sentinel_matches_nothing() {
        let db = Database::in_memory().unwrap();
        insert(&db, Table::Clients, json!({"first_name": "Amy"}));

        let rows = db.select(&Query::from(Table::Clients).in_ids("id", Vec::new())).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_not_in_keeps_null_references() {
        let db = Database::in_memory().unwrap();
        let demo = Uuid::new_v4();
        insert(&db, Table::Clients, json!({"id": demo.to_string(), "first_name": "Demo", "is_demo": true}));
        for (company, client) in [("Acme", Value::Null), ("Globex", json!(demo.to_string()))] {
            insert(
                &db,
                Table::Applications,
                json!({"company": company, "job_title": "SRE", "client_id": client, "date_applied": "2026-10-01"}),
            );
        }

        let rows = db
            .select(&Query::from(Table::Applications).not_in_ids("client_id", [demo]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["company"], json!("Acme"));
    }

    #[test]
    fn test_update_counts_matched_rows() {
        let db = Database::in_memory().unwrap();
        let row = insert(
            &db,
            Table::Applications,
            json!({"company": "Acme", "job_title": "SRE", "date_applied": "2026-10-01"}),
        );
        let id = row["id"].as_str().unwrap().to_string();

        let mut patch = Row::new();
        patch.insert("is_deleted".to_string(), json!(true));
        let query = Query::from(Table::Applications).eq("id", id.as_str());
        assert_eq!(db.update(&query, &patch).unwrap(), 1);

        let rows = db.select(&Query::from(Table::Applications).eq("is_deleted", true)).unwrap();
        assert_eq!(rows.len(), 1);

        let missing = Query::from(Table::Applications).eq("id", Uuid::nil());
        assert_eq!(db.update(&missing, &patch).unwrap(), 0);
    }

    #[test]
    fn test_unfiltered_update_is_rejected() {
        let db = Database::in_memory().unwrap();
        let mut patch = Row::new();
        patch.insert("is_deleted".to_string(), json!(true));
        assert!(db.update(&Query::from(Table::Applications), &patch).is_err());
    }

    #[test]
    fn test_bad_column_name_is_rejected() {
        let db = Database::in_memory().unwrap();
        let query = Query::from(Table::Clients).select(&["id) FROM users; --"]);
        assert!(matches!(db.select(&query), Err(GatewayError::Invalid(_))));
    }
}
