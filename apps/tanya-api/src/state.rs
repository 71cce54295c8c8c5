use std::sync::Arc;

use tanya_service::TanyaService;
use tanya_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<TanyaService>,
}
impl AppState {
	pub async fn new(config: tanya_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.vector_dim).await?;

		let service = TanyaService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
