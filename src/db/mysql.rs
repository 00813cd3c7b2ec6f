use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Executor, Row as _, TypeInfo, ValueRef};

use super::{
    insert_statement, quote_identifier, rows_per_statement, Connector, DbError, Row, SqlSession,
    SqlValue,
};
use crate::config::DatabaseConfig;

/// Session tuning shared by every connection a connector opens.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub insert_batch_size: usize,
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            insert_batch_size: 500,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct MySqlConnector {
    config: DatabaseConfig,
    options: SessionOptions,
}

impl MySqlConnector {
    pub fn new(config: DatabaseConfig, options: SessionOptions) -> Self {
        Self { config, options }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.database)
            .log_statements(log::LevelFilter::Debug)
    }
}

#[async_trait::async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn SqlSession>, DbError> {
        let options = self.connect_options();
        let conn = tokio::time::timeout(self.options.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                DbError::Connection(format!(
                    "timed out after {:?} connecting to {}",
                    self.options.connect_timeout,
                    self.describe()
                ))
            })?
            .map_err(|e| DbError::Connection(format!("{}: {e}", self.describe())))?;

        log::debug!("Connected to {}", self.describe());

        Ok(Box::new(MySqlSession {
            conn: Some(conn),
            insert_batch_size: self.options.insert_batch_size,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.config.user, self.config.host, self.config.port, self.config.database
        )
    }
}

/// A single MySQL/MariaDB connection.
///
/// Statements without bind parameters go over the text protocol, so every
/// fetched cell arrives as the server's textual rendering and is classified
/// by column type afterwards.
pub struct MySqlSession {
    conn: Option<MySqlConnection>,
    insert_batch_size: usize,
}

impl MySqlSession {
    fn conn(&mut self) -> Result<&mut MySqlConnection, DbError> {
        self.conn.as_mut().ok_or(DbError::Closed)
    }

    async fn fetch_text(&mut self, sql: &str) -> Result<Vec<MySqlRow>, DbError> {
        let conn = self.conn()?;
        Ok(conn.fetch_all(sql).await?)
    }

    async fn run(&mut self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(sql).await?;
        Ok(())
    }
}

fn column_as_string(row: &MySqlRow, index: usize) -> Result<String, DbError> {
    let bytes: Option<Vec<u8>> = row.try_get_unchecked(index)?;
    let bytes = bytes.ok_or_else(|| {
        DbError::UnexpectedResult(format!("column {index} is NULL in catalog result"))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| DbError::UnexpectedResult(format!("column {index} is not UTF-8: {e}")))
}

fn decode_row(row: &MySqlRow) -> Result<Row, DbError> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let bytes: Vec<u8> = row.try_get_unchecked(index)?;
        values.push(decode_text_value(&type_name, bytes));
    }
    Ok(values)
}

/// Classify a text-protocol cell by its column type.
pub(crate) fn decode_text_value(type_name: &str, bytes: Vec<u8>) -> SqlValue {
    let unsigned = type_name.ends_with(" UNSIGNED");
    let base = type_name.trim_end_matches(" UNSIGNED");

    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            let parsed = std::str::from_utf8(&bytes).ok().and_then(|text| {
                if unsigned {
                    text.parse::<u64>().ok().map(SqlValue::UInt)
                } else {
                    text.parse::<i64>().ok().map(SqlValue::Int)
                }
            });
            parsed.unwrap_or_else(|| text_or_bytes(bytes))
        }
        "FLOAT" | "DOUBLE" => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| text.parse::<f64>().ok())
            .map(SqlValue::Float)
            .unwrap_or_else(|| text_or_bytes(bytes)),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(bytes),
        _ => text_or_bytes(bytes),
    }
}

fn text_or_bytes(bytes: Vec<u8>) -> SqlValue {
    match String::from_utf8(bytes) {
        Ok(text) => SqlValue::Text(text),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    }
}

#[async_trait::async_trait]
impl SqlSession for MySqlSession {
    async fn list_tables(&mut self) -> Result<Vec<String>, DbError> {
        let rows = self.fetch_text("SHOW TABLES").await?;
        rows.iter().map(|row| column_as_string(row, 0)).collect()
    }

    async fn show_create_table(&mut self, table: &str) -> Result<String, DbError> {
        let sql = format!("SHOW CREATE TABLE {}", quote_identifier(table));
        let rows = self.fetch_text(&sql).await?;
        let row = rows.first().ok_or_else(|| {
            DbError::UnexpectedResult(format!("SHOW CREATE TABLE returned no rows for {table}"))
        })?;
        column_as_string(row, 1)
    }

    async fn drop_table(&mut self, table: &str) -> Result<(), DbError> {
        self.run(&format!("DROP TABLE {}", quote_identifier(table)))
            .await
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.run(sql).await
    }

    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, DbError> {
        let sql = format!("SELECT * FROM {}", quote_identifier(table));
        let rows = self.fetch_text(&sql).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        let sql = format!("SHOW COLUMNS FROM {}", quote_identifier(table));
        let rows = self.fetch_text(&sql).await?;
        rows.iter().map(|row| column_as_string(row, 0)).collect()
    }

    async fn truncate_table(&mut self, table: &str) -> Result<(), DbError> {
        self.run(&format!("TRUNCATE TABLE {}", quote_identifier(table)))
            .await
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(DbError::UnexpectedResult(format!(
                "row has {} values but {table} has {} columns",
                bad.len(),
                columns.len()
            )));
        }

        let per_statement = rows_per_statement(columns.len(), self.insert_batch_size);
        let conn = self.conn()?;
        let mut written = 0u64;

        for chunk in rows.chunks(per_statement) {
            let sql = insert_statement(table, columns, chunk.len());
            let mut query = sqlx::query(&sql);
            for value in chunk.iter().flatten() {
                query = match value {
                    SqlValue::Null => query.bind(None::<String>),
                    SqlValue::Int(v) => query.bind(*v),
                    SqlValue::UInt(v) => query.bind(*v),
                    SqlValue::Float(v) => query.bind(*v),
                    SqlValue::Text(v) => query.bind(v.as_str()),
                    SqlValue::Bytes(v) => query.bind(v.as_slice()),
                };
            }
            written += query.execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<(), DbError> {
        self.run(&format!("SET FOREIGN_KEY_CHECKS={}", u8::from(enabled)))
            .await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.run("COMMIT").await
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
