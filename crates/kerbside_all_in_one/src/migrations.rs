use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

/// Applies pending goose migrations by running the goose binary
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn postgres(
        goose_binary_path: impl Into<String>,
        migrations_dir: impl Into<String>,
        dsn: impl Into<String>,
    ) -> Self {
        Self {
            goose_binary_path: goose_binary_path.into(),
            migrations_dir: migrations_dir.into(),
            dsn: dsn.into(),
        }
    }

    fn args<'a>(&'a self, command: &'a str) -> Vec<&'a str> {
        vec!["-dir", &self.migrations_dir, "postgres", &self.dsn, command]
    }

    /// Executes `goose -dir {migrations_dir} postgres {dsn} up`
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running migrations");

        let output = Command::new(&self.goose_binary_path)
            .args(self.args("up"))
            .output()
            .await
            .with_context(|| format!("Failed to run goose at '{}'", self.goose_binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            bail!("Migration failed.\nstdout: {}\nstderr: {}", stdout, stderr);
        }

        debug!(
            output = %String::from_utf8_lossy(&output.stdout),
            "migrations completed successfully"
        );
        Ok(())
    }
}
