mod error;
pub mod mysql;

pub use self::error::DbError;
pub use self::mysql::{MySqlConnector, SessionOptions};

/// Upper bound on bind parameters in one MySQL prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// A single cell moved between databases without a compile-time schema.
///
/// Decimal, temporal and JSON values are carried as `Text` so that the
/// target receives exactly what the source printed.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

pub type Row = Vec<SqlValue>;

/// One open connection to a source or target database.
///
/// Every method that takes a table name quotes it itself; callers pass the
/// raw name as reported by `list_tables`.
#[async_trait::async_trait]
pub trait SqlSession: Send {
    async fn list_tables(&mut self) -> Result<Vec<String>, DbError>;

    /// The exact `CREATE TABLE` text the server reports for `table`.
    async fn show_create_table(&mut self, table: &str) -> Result<String, DbError>;

    async fn drop_table(&mut self, table: &str) -> Result<(), DbError>;

    /// Run a statement verbatim.
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;

    /// Every row of `table`, fully materialized.
    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, DbError>;

    /// Column names of `table` in declaration order.
    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, DbError>;

    async fn truncate_table(&mut self, table: &str) -> Result<(), DbError>;

    /// Insert `rows` into `table` using one placeholder per column.
    /// Returns the number of rows written.
    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, DbError>;

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    /// Release the underlying connection. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<(), DbError>;
}

/// Opens sessions against one configured database.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SqlSession>, DbError>;

    /// Human readable endpoint for logs. Never includes credentials.
    fn describe(&self) -> String;
}

/// Quote an identifier for MySQL/MariaDB, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build `INSERT INTO t (c1,c2) VALUES (?,?),(?,?)` for `row_count` rows.
pub fn insert_statement(table: &str, columns: &[String], row_count: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(",");
    let tuple = format!("({})", vec!["?"; columns.len()].join(","));
    let values = vec![tuple.as_str(); row_count.max(1)].join(",");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(table),
        column_list,
        values
    )
}

/// How many rows fit in one insert statement given the configured batch
/// size and the server's placeholder limit.
pub fn rows_per_statement(column_count: usize, batch_size: usize) -> usize {
    let by_placeholders = MAX_PLACEHOLDERS / column_count.max(1);
    batch_size.max(1).min(by_placeholders.max(1))
}
