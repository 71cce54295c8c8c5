//! Read-only view of the external indexing pipeline's jobs.
//!
//! Status transitions belong to the indexing worker; the query pipeline only
//! reads job records and consumes the documents completed jobs produced.

use uuid::Uuid;

use crate::{Result, models::IndexingJobRow};

pub async fn fetch_job(pool: &sqlx::PgPool, job_id: Uuid) -> Result<Option<IndexingJobRow>> {
	let row = sqlx::query_as::<_, IndexingJobRow>("SELECT * FROM indexing_jobs WHERE job_id = $1")
		.bind(job_id)
		.fetch_optional(pool)
		.await?;

	Ok(row)
}
