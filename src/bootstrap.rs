//! Schema bootstrap
//!
//! One-shot: read a schema script, split it on `;` and execute each
//! statement in its own transaction. A failing statement is rolled back and
//! reported; the remaining statements still run.

use crate::cloud::{CredentialSource, Connector};
use crate::config::DatabaseSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Where the schema script comes from
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Reads the script from the object store through the provider bridge
pub struct ObjectStoreSchemaSource {
    connector: Arc<dyn Connector>,
    account_id: String,
    region: String,
    bucket: String,
    key: String,
}

impl ObjectStoreSchemaSource {
    pub fn new(
        connector: Arc<dyn Connector>,
        account_id: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            account_id: account_id.into(),
            region: region.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl SchemaSource for ObjectStoreSchemaSource {
    async fn fetch(&self) -> Result<String> {
        let client = self
            .connector
            .connect(&self.account_id, &self.region, "s3")
            .await
            .context("Failed to reach the object store")?;

        let response = client
            .call("GetObject", &json!({ "Bucket": self.bucket, "Key": self.key }))
            .await
            .with_context(|| format!("Failed to read {}", self.describe()))?;

        response
            .get("Body")
            .and_then(|b| b.as_str())
            .map(|s| s.to_string())
            .with_context(|| format!("{} has no text body", self.describe()))
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Reads the script from a local file
pub struct FileSchemaSource {
    path: PathBuf,
}

impl FileSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    async fn fetch(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Executes one statement atomically
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// Runs statements against PostgreSQL, one transaction each
pub struct PgStatementExecutor {
    pool: PgPool,
}

impl PgStatementExecutor {
    /// Connect with a short-lived password from the credentials collaborator
    pub async fn connect(
        settings: &DatabaseSettings,
        credentials: &dyn CredentialSource,
    ) -> Result<Self> {
        let password = credentials
            .database_token(settings)
            .await
            .context("Failed to acquire a database credential")?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&settings.connection_url(&password))
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}:{}/{}",
                    settings.endpoint, settings.port, settings.name
                )
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StatementExecutor for PgStatementExecutor {
    async fn execute(&self, statement: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        match sqlx::query(statement).execute(&mut *tx).await {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(e.into())
            }
        }
    }
}

/// Split a script into executable statements
///
/// Fragments that are empty or hold only `--` comments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|fragment| {
            fragment
                .lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .map(str::to_string)
        .collect()
}

/// Statements applied and rejected by a bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub applied: Vec<String>,
    /// `(statement, error)`
    pub failed: Vec<(String, String)>,
}

impl BootstrapReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch the schema script and execute it statement by statement
pub async fn run_bootstrap(
    source: &dyn SchemaSource,
    executor: &dyn StatementExecutor,
) -> Result<BootstrapReport> {
    let script = source.fetch().await?;
    let statements = split_statements(&script);
    info!(
        "Bootstrapping {} statements from {}",
        statements.len(),
        source.describe()
    );

    let mut report = BootstrapReport::default();
    for statement in statements {
        match executor.execute(&statement).await {
            Ok(()) => report.applied.push(statement),
            Err(e) => {
                warn!("Statement failed and was rolled back: {:#}", e);
                report.failed.push((statement, format!("{:#}", e)));
            }
        }
    }

    info!(
        "Bootstrap finished: {} applied, {} failed",
        report.applied.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::mock::MockCloud;
    use std::sync::Mutex;

    struct StaticSource(&'static str);

    #[async_trait]
    impl SchemaSource for StaticSource {
        async fn fetch(&self) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn describe(&self) -> String {
            "inline".into()
        }
    }

    /// Rejects statements containing "BROKEN"
    #[derive(Default)]
    struct RecordingExecutor {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatementExecutor for RecordingExecutor {
        async fn execute(&self, statement: &str) -> Result<()> {
            self.executed.lock().unwrap().push(statement.to_string());
            if statement.contains("BROKEN") {
                anyhow::bail!("syntax error at or near \"BROKEN\"");
            }
            Ok(())
        }
    }

    #[test]
    fn test_split_drops_empty_and_comment_fragments() {
        let script = "CREATE TABLE a (id INT);\n\n-- trailing note\n;  ;CREATE INDEX i ON a (id);";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a (id)"]
        );
    }

    #[tokio::test]
    async fn test_failed_statement_does_not_stop_the_rest() {
        let executor = RecordingExecutor::default();
        let source = StaticSource("CREATE TABLE a (id INT); BROKEN STATEMENT; CREATE TABLE b (id INT);");

        let report = run_bootstrap(&source, &executor).await.unwrap();

        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "BROKEN STATEMENT");
        assert!(!report.is_clean());
        assert_eq!(executor.executed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_object_store_source_reads_body() {
        let mock = MockCloud::new();
        mock.on("s3", "GetObject", |params| {
            assert_eq!(params["Bucket"], "modules");
            assert_eq!(params["Key"], "schema.sql");
            Ok(json!({"Body": "CREATE TABLE t (id INT);"}))
        });

        let source = ObjectStoreSchemaSource::new(
            Arc::new(mock.clone()),
            "123456789012",
            "eu-west-1",
            "modules",
            "schema.sql",
        );
        assert_eq!(source.fetch().await.unwrap(), "CREATE TABLE t (id INT);");
        assert_eq!(source.describe(), "s3://modules/schema.sql");
    }
}
