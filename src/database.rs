use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::info;

use crate::data::{Status, StudentRecord};
use crate::error::{Error, Result};

/// A persisted student joined with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClassifiedStudent {
    pub nama: String,
    pub prodi: String,
    pub nim: String,
    pub jenjang: String,
    pub ip: f64,
    pub ipk: f64,
    pub jumlah_cuti: f64,
    pub jumlah_semester: f64,
    pub jumlah_kehadiran: f64,
    pub status: String,
}

/// One `(prodi, status)` group from the report query.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StatusCount {
    pub prodi: String,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Handle over a connection pool; every operation borrows a connection for
/// the duration of one statement.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

const JOINED_SELECT: &str = r#"
    SELECT m.nama, m.prodi, m.nim, m.jenjang, m.ip, m.ipk,
           m.jumlah_cuti, m.jumlah_semester, m.jumlah_kehadiran, k.status
    FROM mahasiswa m
    JOIN klasifikasi k ON m.id = k.mahasiswa_id
"#;

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.create_schema().await?;
        info!("Database ready at {url}");
        Ok(db)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mahasiswa (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nama TEXT NOT NULL,
                prodi TEXT NOT NULL,
                nim TEXT NOT NULL UNIQUE,
                jenjang TEXT NOT NULL,
                ip REAL NOT NULL,
                ipk REAL NOT NULL,
                jumlah_cuti REAL NOT NULL,
                jumlah_semester REAL NOT NULL,
                jumlah_kehadiran REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS klasifikasi (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mahasiswa_id INTEGER NOT NULL UNIQUE REFERENCES mahasiswa(id),
                status TEXT NOT NULL CHECK (status IN ('DO', 'Tidak DO')),
                classified_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn exists(&self, nim: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM mahasiswa WHERE nim = ?")
            .bind(nim)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Appends a student and returns the generated id, or `None` when the NIM
    /// is already stored.
    pub async fn insert(&self, record: &StudentRecord) -> Result<Option<i64>> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO mahasiswa (nama, prodi, nim, jenjang, ip, ipk, jumlah_cuti, jumlah_semester, jumlah_kehadiran)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(nim) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&record.nama)
        .bind(&record.prodi)
        .bind(&record.nim)
        .bind(&record.jenjang)
        .bind(record.ip)
        .bind(record.ipk)
        .bind(record.jumlah_cuti)
        .bind(record.jumlah_semester)
        .bind(record.jumlah_kehadiran)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.map(|(id,)| id))
    }

    pub async fn insert_result(&self, mahasiswa_id: i64, status: Status) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO klasifikasi (mahasiswa_id, status, classified_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(mahasiswa_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes every classification, then every student.
    pub async fn delete_all(&self) -> Result<u64> {
        let results = sqlx::query("DELETE FROM klasifikasi")
            .execute(&self.pool)
            .await?
            .rows_affected();
        let students = sqlx::query("DELETE FROM mahasiswa")
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(students, results, "Deleted all records");
        Ok(students)
    }

    /// Joined rows, optionally narrowed to names or NIMs containing `search`.
    pub async fn fetch_all(&self, search: Option<&str>) -> Result<Vec<ClassifiedStudent>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let rows = match search {
            Some(term) => {
                let sql = format!("{JOINED_SELECT} WHERE m.nama LIKE ? OR m.nim LIKE ? ORDER BY m.id");
                let pattern = format!("%{term}%");
                sqlx::query_as::<_, ClassifiedStudent>(&sql)
                    .bind(&pattern)
                    .bind(&pattern)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{JOINED_SELECT} ORDER BY m.id");
                sqlx::query_as::<_, ClassifiedStudent>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows)
    }

    pub async fn fetch_by_status(&self, status: Status) -> Result<Vec<ClassifiedStudent>> {
        let sql = format!("{JOINED_SELECT} WHERE k.status = ? ORDER BY m.id");
        let rows = sqlx::query_as::<_, ClassifiedStudent>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Row counts grouped by program and status.
    pub async fn fetch_status_counts(&self) -> Result<Vec<StatusCount>> {
        let rows = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT m.prodi AS prodi, k.status AS status, COUNT(*) AS count
            FROM mahasiswa m
            JOIN klasifikasi k ON m.id = k.mahasiswa_id
            GROUP BY m.prodi, k.status
            ORDER BY m.prodi, k.status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => Error::Conflict(db.message().to_string()),
            _ => Error::Database(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserAccount>(
            "SELECT id, username, email, password, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn count_rows(&self) -> Result<(i64, i64)> {
        let (students,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mahasiswa")
            .fetch_one(&self.pool)
            .await?;
        let (results,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM klasifikasi")
            .fetch_one(&self.pool)
            .await?;
        Ok((students, results))
    }
}
