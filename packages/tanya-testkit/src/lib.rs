//! Scratch Postgres databases for integration tests.
//!
//! Tests requiring a live database read the base DSN from `TANYA_PG_DSN`
//! and skip silently when it is unset, so the default test run stays
//! self-contained.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

pub fn env_dsn() -> Option<String> {
	env::var("TANYA_PG_DSN").ok().filter(|dsn| !dsn.trim().is_empty())
}

pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse TANYA_PG_DSN: {err}.")))?;
		let admin_options = base_options.clone().database("postgres");
		let mut admin_conn = PgConnection::connect_with(&admin_options).await?;
		let name = format!("tanya_test_{}", Uuid::new_v4().simple());
		let create_sql = format!(r#"CREATE DATABASE "{name}""#);

		admin_conn
			.execute(create_sql.as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;
		admin_conn.close().await.ok();

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Drop the scratch database. Call at the end of every test; a leaked
	/// database survives until manually dropped.
	pub async fn cleanup(self) -> Result<()> {
		let mut admin_conn = PgConnection::connect_with(&self.admin_options).await?;

		sqlx::query(
			"SELECT pg_terminate_backend(pid) \
			 FROM pg_stat_activity \
			 WHERE datname = $1 AND pid <> pg_backend_pid()",
		)
		.bind(&self.name)
		.execute(&mut admin_conn)
		.await?;

		let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{}""#, self.name);

		admin_conn
			.execute(drop_sql.as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;
		admin_conn.close().await.ok();

		Ok(())
	}
}
