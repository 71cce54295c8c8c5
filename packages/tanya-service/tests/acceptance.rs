//! End-to-end pipeline scenarios against a scratch Postgres database.
//!
//! Every test skips silently unless `TANYA_PG_DSN` points at a server with
//! the pgvector extension available.

use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use tanya_config::{
	Cache, Config, EmbeddingProviderConfig, LlmProviderConfig, Memory, Postgres,
	Providers as ProviderSettings, RerankProviderConfig, Retrieval, Security, Service, Storage,
	Summarizer,
};
use tanya_providers::chat::ChatCompletion;
use tanya_service::{
	AskRequest, BoxFuture, ChatProvider, EmbeddingProvider, Providers, RerankProvider,
	RetrievalParams, TanyaService,
};
use tanya_storage::{db::Db, documents, documents::Corpus, vector_literal};
use tanya_testkit::TestDatabase;

const VECTOR_DIM: u32 = 4;

fn test_config(dsn: &str) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres { dsn: dsn.to_string(), pool_max_conns: 4 },
			vector_dim: VECTOR_DIM,
		},
		providers: ProviderSettings {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "embed-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test-embed".to_string(),
				dimensions: VECTOR_DIM,
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
			rerank: RerankProviderConfig {
				enabled: false,
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/v1/rerank".to_string(),
				model: "test-rerank".to_string(),
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "llm-key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "test-llm".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
		},
		retrieval: Retrieval {
			alpha: 0.7,
			min_cosine: 0.25,
			top_k: 8,
			candidate_k: 40,
			rerank_top_n: 8,
		},
		summarizer: Summarizer {
			max_rows: 5,
			max_snippets: 5,
			max_snippet_chars: 1_200,
			token_chars_per_token: 4.0,
		},
		memory: Memory { semantic_top_k: 5, episodic_top_k: 10, include_procedures: false },
		cache: Cache {
			enabled: true,
			embedding_ttl_days: 30,
			completion_ttl_days: 7,
			max_payload_bytes: Some(262_144),
		},
		security: Security { bind_localhost_only: true, api_auth_token: None },
	}
}

struct StaticEmbedding {
	vector: Vec<f32>,
}
impl EmbeddingProvider for StaticEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		let vectors = texts.iter().map(|_| self.vector.clone()).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

struct UnusedRerank;
impl RerankProvider for UnusedRerank {
	fn score<'a>(
		&'a self,
		_cfg: &'a RerankProviderConfig,
		_query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<f32>>> {
		let scores = vec![0.0; docs.len()];

		Box::pin(async move { Ok(scores) })
	}
}

struct ScriptedChat {
	normalize: String,
	sql: String,
	summary: String,
	calls: AtomicUsize,
}
impl ScriptedChat {
	fn new(normalize: &str, sql: &str, summary: &str) -> Arc<Self> {
		Arc::new(Self {
			normalize: normalize.to_string(),
			sql: sql.to_string(),
			summary: summary.to_string(),
			calls: AtomicUsize::new(0),
		})
	}
}
impl ChatProvider for ScriptedChat {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, color_eyre::Result<ChatCompletion>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let system = messages
			.first()
			.and_then(|message| message.get("content"))
			.and_then(|content| content.as_str())
			.unwrap_or_default();
		let content = if system.contains("administrative locations") {
			self.normalize.clone()
		} else if system.contains("PostgreSQL SELECT") {
			self.sql.clone()
		} else {
			self.summary.clone()
		};

		Box::pin(async move { Ok(ChatCompletion { content, usage: None }) })
	}
}

async fn connect(test_db: &TestDatabase) -> Db {
	let db = Db::connect(&tanya_config::Postgres {
		dsn: test_db.dsn().to_string(),
		pool_max_conns: 4,
	})
	.await
	.expect("Failed to connect to the test database.");

	db.ensure_schema(VECTOR_DIM).await.expect("Failed to apply the schema.");

	db
}

fn service(test_db: &TestDatabase, db: Db, chat: Arc<ScriptedChat>, query_vector: Vec<f32>) -> TanyaService {
	TanyaService::with_providers(
		test_config(test_db.dsn()),
		db,
		Providers::new(
			Arc::new(StaticEmbedding { vector: query_vector }),
			Arc::new(UnusedRerank),
			chat,
		),
	)
}

async fn seed_document(db: &Db, project_id: &str, source_type: &str, text: &str, vector: &[f32]) {
	let literal = vector_literal(vector);

	documents::insert_document(
		&db.pool,
		Uuid::new_v4(),
		project_id,
		"node:test",
		source_type,
		text,
		Some(&literal),
		OffsetDateTime::now_utc(),
	)
	.await
	.expect("Failed to seed a document.");
}

async fn create_project_table(db: &Db, schema: &str) {
	sqlx::query(&format!(r#"CREATE SCHEMA IF NOT EXISTS "{schema}""#))
		.execute(&db.pool)
		.await
		.expect("Failed to create the project schema.");
	sqlx::query(&format!(
		r#"CREATE TABLE "{schema}"."projects" (id INT, district TEXT, type TEXT)"#
	))
	.execute(&db.pool)
	.await
	.expect("Failed to create the project table.");
	sqlx::query(&format!(
		"INSERT INTO \"{schema}\".\"projects\" VALUES \
		 (1, 'Kota Bandung', 'mangrove'), (2, 'Kota Bandung', 'urban forest'), \
		 (3, 'Kab Sleman', 'agroforestry')"
	))
	.execute(&db.pool)
	.await
	.expect("Failed to seed the project table.");
}

#[tokio::test]
async fn ask_answers_from_sql_and_appends_exactly_two_turns() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;

	seed_document(
		&db,
		"demo",
		"table",
		"Table \"projects\" with columns \"id\", \"district\", \"type\". \
		 Rows describe NbS projects per district.",
		&[1.0, 0.0, 0.0, 0.0],
	)
	.await;
	create_project_table(&db, "proj_demo").await;

	let chat = ScriptedChat::new(
		r#"{ "districts": [{ "mention": "Kota Bandung", "name": "Bandung", "tier": "Kota" }] }"#,
		"SELECT * FROM \"projects\" WHERE \"district\" ILIKE '%Bandung%'",
		"There are 2 NbS projects in Kota Bandung.",
	);
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);
	let response = service
		.ask(AskRequest {
			query: "How many NbS projects in Kota Bandung?".to_string(),
			project_id: "demo".to_string(),
			user_id: Some("alice".to_string()),
			min_cosine: None,
			top_k: None,
			district_hints: Vec::new(),
			chat_history: None,
		})
		.await
		.expect("ask must succeed.");

	assert!(response.success);

	let sql = response.sql_query.as_deref().expect("a statement was synthesized");

	assert!(sql.contains("\"projects\""));
	assert!(sql.contains("\"district\""));
	assert!(sql.contains("ILIKE '%Bandung%'"));
	assert!(sql.contains("LIMIT 10"));
	assert_eq!(response.data.len(), 2);
	assert_eq!(response.answer, "There are 2 NbS projects in Kota Bandung.");
	assert!(!response.relevant_documents.is_empty());
	assert_eq!(response.search_stats.total_documents_found, response.relevant_documents.len());

	// Exactly the new user turn and assistant turn, in order.
	assert_eq!(response.chat_history.len(), 2);
	assert_eq!(response.chat_history[0].role, "user");
	assert_eq!(response.chat_history[1].role, "assistant");
	assert_eq!(response.chat_history[1].sql_query.as_deref(), Some(sql));

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn no_schema_match_short_circuits_with_the_fixed_answer() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;

	// Lexically disjoint from the question and orthogonal to the query
	// embedding, so neither leg qualifies.
	seed_document(
		&db,
		"empty",
		"table",
		"Tabel anggaran memuat kolom nilai dan tahun.",
		&[0.0, 1.0, 0.0, 0.0],
	)
	.await;

	let chat = ScriptedChat::new(
		r#"{ "provinces": [{ "mention": "Jawa Barat", "name": "Jawa Barat" }] }"#,
		"unused",
		"unused",
	);
	let service = service(&test_db, db, chat.clone(), vec![1.0, 0.0, 0.0, 0.0]);
	let response = service
		.ask(AskRequest {
			query: "What is the monthly rainfall trend in Jawa Barat?".to_string(),
			project_id: "empty".to_string(),
			user_id: Some("alice".to_string()),
			min_cosine: Some(0.5),
			top_k: Some(5),
			district_hints: Vec::new(),
			chat_history: None,
		})
		.await
		.expect("ask must succeed.");

	assert!(response.success);
	assert_eq!(response.sql_query, None);
	assert!(response.relevant_documents.is_empty());
	assert_eq!(response.answer, "No relevant schema information was found for this question.");
	assert_eq!(response.search_stats.total_documents_found, 0);
	assert_eq!(response.chat_history.len(), 2);
	// Normalization ran, but neither synthesis nor summarization did.
	assert_eq!(chat.calls.load(Ordering::SeqCst), 1);

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn execution_failure_becomes_the_turn_content() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;

	seed_document(
		&db,
		"broken",
		"table",
		"Table \"observations\" with column \"rainfall\".",
		&[1.0, 0.0, 0.0, 0.0],
	)
	.await;
	sqlx::query("CREATE SCHEMA IF NOT EXISTS proj_broken")
		.execute(&db.pool)
		.await
		.expect("Failed to create the project schema.");

	let chat = ScriptedChat::new(
		r#"{ "districts": [{ "mention": "Kab Sleman", "name": "Sleman", "tier": "Kab" }] }"#,
		// References a relation that does not exist in the project schema.
		"SELECT * FROM \"observations\"",
		"unused",
	);
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);
	let response = service
		.ask(AskRequest {
			query: "Rainfall observations in Kab Sleman?".to_string(),
			project_id: "broken".to_string(),
			user_id: Some("alice".to_string()),
			min_cosine: None,
			top_k: None,
			district_hints: Vec::new(),
			chat_history: None,
		})
		.await
		.expect("ask must succeed even when execution fails.");

	// The request still succeeds conversationally; the database message is
	// the assistant's content.
	assert!(response.success);
	assert!(response.sql_query.is_some());
	assert!(response.data.is_empty());
	assert!(response.answer.contains("observations"));
	assert_eq!(response.chat_history.len(), 2);

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn concurrent_asks_never_lose_each_others_turns() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let chat = ScriptedChat::new(r#"{ "project_location": true }"#, "unused", "unused");
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);
	let request = |query: &str| AskRequest {
		query: query.to_string(),
		project_id: "shared".to_string(),
		user_id: Some("alice".to_string()),
		min_cosine: None,
		top_k: None,
		district_hints: Vec::new(),
		chat_history: None,
	};

	// Both turns end at the Unlocatable terminal; persistence still runs.
	let (first, second) = tokio::join!(
		service.ask(request("first question")),
		service.ask(request("second question")),
	);

	first.expect("first ask must succeed.");
	second.expect("second ask must succeed.");

	let turns =
		tanya_storage::chat::conversation_turns(&service.db.pool, "alice", "shared")
			.await
			.expect("history read must succeed.");

	assert_eq!(turns.len(), 4, "each request appends exactly its own pair");
	assert_eq!(turns.iter().filter(|turn| turn.role == "user").count(), 2);
	assert_eq!(turns.iter().filter(|turn| turn.role == "assistant").count(), 2);

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn lexical_hits_qualify_below_the_vector_floor() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;

	// Doc A only matches lexically; doc B only matches by vector.
	seed_document(
		&db,
		"hybrid",
		"table",
		"Tabel \"curah_hujan\" memuat curah hujan harian.",
		&[0.0, 1.0, 0.0, 0.0],
	)
	.await;
	seed_document(
		&db,
		"hybrid",
		"table",
		"Tabel \"penduduk\" memuat populasi.",
		&[1.0, 0.0, 0.0, 0.0],
	)
	.await;

	let chat = ScriptedChat::new("{}", "unused", "unused");
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);
	let embedding = vec![1.0, 0.0, 0.0, 0.0];
	let candidates = service
		.retrieve(
			"hybrid",
			"curah hujan",
			&embedding,
			Corpus::Schema,
			&RetrievalParams { min_vector_score: 0.5, top_k: 8, alpha: 0.7 },
		)
		.await
		.expect("retrieve must succeed.");

	assert_eq!(candidates.len(), 2, "union of the vector and lexical legs");

	let lexical_only = candidates
		.iter()
		.find(|candidate| candidate.text.contains("curah_hujan"))
		.expect("lexical-only hit present");

	assert!(lexical_only.vector_score < 0.5);
	assert!(lexical_only.lexical_score > 0.0);

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn procedural_memory_stays_out_of_semantic_retrieval_by_default() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let chat = ScriptedChat::new("{}", "unused", "unused");
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);

	service
		.save_semantic("alice", "memo", "User prefers rainfall reported in millimeters.", &[])
		.await
		.expect("save_semantic must succeed.");
	service
		.log_procedure("alice", "memo", "pipeline", &serde_json::json!({ "stage": "summarized" }))
		.await;

	let embedding = vec![1.0, 0.0, 0.0, 0.0];
	let contents = service.retrieve_semantic("memo", &embedding, 10).await;

	assert_eq!(contents.len(), 1);
	assert!(contents[0].contains("millimeters"));

	// Opting in surfaces the audit entry as well.
	let mut opt_in_cfg = test_config(test_db.dsn());

	opt_in_cfg.memory.include_procedures = true;

	let opt_in = TanyaService::with_providers(
		opt_in_cfg,
		Db { pool: service.db.pool.clone() },
		Providers::new(
			Arc::new(StaticEmbedding { vector: vec![1.0, 0.0, 0.0, 0.0] }),
			Arc::new(UnusedRerank),
			ScriptedChat::new("{}", "unused", "unused"),
		),
	);
	let contents = opt_in.retrieve_semantic("memo", &embedding, 10).await;

	assert_eq!(contents.len(), 2);

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}

#[tokio::test]
async fn episodic_memory_returns_turns_oldest_first() {
	let Some(base_dsn) = tanya_testkit::env_dsn() else {
		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let chat = ScriptedChat::new(r#"{ "project_location": true }"#, "unused", "unused");
	let service = service(&test_db, db, chat, vec![1.0, 0.0, 0.0, 0.0]);

	for query in ["first question", "second question"] {
		service
			.ask(AskRequest {
				query: query.to_string(),
				project_id: "episodes".to_string(),
				user_id: Some("alice".to_string()),
				min_cosine: None,
				top_k: None,
				district_hints: Vec::new(),
				chat_history: None,
			})
			.await
			.expect("ask must succeed.");
	}

	let turns = service.retrieve_episodic("alice", "episodes", 10).await;

	assert_eq!(turns.len(), 4);
	assert!(turns[0].starts_with("user: first question"));
	assert!(turns[3].starts_with("assistant:"));

	service.db.pool.close().await;
	test_db.cleanup().await.expect("Failed to drop test database.");
}
