//! Query surface: rows, first row, writes, and inserts, each in a literal and
//! a parameter-bound form. Statement failures are returned to the caller, not
//! fatal to the process.

use super::decode::{Record, decode_row};
use super::manager::ConnectionManager;
use crate::error::{Error, Result};
use futures::TryStreamExt;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;

/// Dynamically typed bind parameter for the prepared forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Integer(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Integer(v as i64)
    }
}

impl From<u64> for Param {
    fn from(v: u64) -> Self {
        Param::Unsigned(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytes(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Param],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Param::Null => query.bind(None::<String>),
            Param::Text(s) => query.bind(s.clone()),
            Param::Integer(i) => query.bind(*i),
            Param::Unsigned(u) => query.bind(*u),
            Param::Float(f) => query.bind(*f),
            Param::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

impl ConnectionManager {
    /// Run `sql` and decode every row of the result set into records.
    ///
    /// Rows are decoded one at a time off the cursor; the cursor's transport
    /// is released when the stream ends or a decode aborts.
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Record>> {
        let mut rows = sqlx::query(sql).fetch(self.pool()?);
        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(Error::Query)? {
            records.push(decode_row(&row)?);
        }
        Ok(records)
    }

    /// Parameter-bound form of [`query_rows`](Self::query_rows).
    pub async fn query_rows_with(&self, sql: &str, params: &[Param]) -> Result<Vec<Record>> {
        let mut rows = bind_params(sqlx::query(sql), params).fetch(self.pool()?);
        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(Error::Query)? {
            records.push(decode_row(&row)?);
        }
        Ok(records)
    }

    /// First row only; remaining rows are discarded by the driver. An empty
    /// result set yields an empty record.
    pub async fn query_row(&self, sql: &str) -> Result<Record> {
        let row = sqlx::query(sql)
            .fetch_optional(self.pool()?)
            .await
            .map_err(Error::Query)?;
        match row {
            Some(row) => Ok(decode_row(&row)?),
            None => Ok(Record::new()),
        }
    }

    /// Parameter-bound form of [`query_row`](Self::query_row).
    pub async fn query_row_with(&self, sql: &str, params: &[Param]) -> Result<Record> {
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(self.pool()?)
            .await
            .map_err(Error::Query)?;
        match row {
            Some(row) => Ok(decode_row(&row)?),
            None => Ok(Record::new()),
        }
    }

    /// Run a write statement and return the affected-row count.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql)
            .execute(self.pool()?)
            .await
            .map_err(Error::Query)?;
        Ok(done.rows_affected())
    }

    /// Parameter-bound form of [`execute`](Self::execute).
    pub async fn execute_with(&self, sql: &str, params: &[Param]) -> Result<u64> {
        let done = bind_params(sqlx::query(sql), params)
            .execute(self.pool()?)
            .await
            .map_err(Error::Query)?;
        Ok(done.rows_affected())
    }

    /// Run an insert and return the generated identifier.
    pub async fn insert(&self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql)
            .execute(self.pool()?)
            .await
            .map_err(Error::Query)?;
        Ok(done.last_insert_id())
    }

    /// Parameter-bound form of [`insert`](Self::insert).
    pub async fn insert_with(&self, sql: &str, params: &[Param]) -> Result<u64> {
        let done = bind_params(sqlx::query(sql), params)
            .execute(self.pool()?)
            .await
            .map_err(Error::Query)?;
        Ok(done.last_insert_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conversions() {
        assert_eq!(Param::from("s"), Param::Text("s".to_string()));
        assert_eq!(Param::from(7i64), Param::Integer(7));
        assert_eq!(Param::from(7i32), Param::Integer(7));
        assert_eq!(Param::from(7u64), Param::Unsigned(7));
        assert_eq!(Param::from(1.5f64), Param::Float(1.5));
        assert_eq!(Param::from(vec![1u8, 2]), Param::Bytes(vec![1, 2]));
        assert_eq!(Param::from(None::<i64>), Param::Null);
        assert_eq!(Param::from(Some(3i64)), Param::Integer(3));
    }
}
