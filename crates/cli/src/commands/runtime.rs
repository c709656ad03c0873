use std::future::Future;
use std::sync::Arc;

use surplus_core::audit::TracingAuditSink;
use surplus_core::config::{AppConfig, LoadOptions};
use surplus_core::errors::ApplicationError;
use surplus_core::lifecycle::DonationLifecycleEngine;
use surplus_core::reports::ReportAggregator;
use surplus_db::{connect_with_config, migrations, DbPool, SqlDonationStore};

use crate::commands::CommandResult;

/// Engine and aggregator wired to the configured SQLite store.
pub struct Services {
    pub engine: DonationLifecycleEngine<SqlDonationStore, TracingAuditSink>,
    pub reports: ReportAggregator<SqlDonationStore, TracingAuditSink>,
}

impl Services {
    pub fn new(pool: DbPool, config: &AppConfig) -> Self {
        let store = Arc::new(SqlDonationStore::new(pool));
        Self {
            engine: DonationLifecycleEngine::new(
                store.clone(),
                TracingAuditSink,
                config.lifecycle_policy(),
            ),
            reports: ReportAggregator::new(store, TracingAuditSink, config.reporting_policy()),
        }
    }
}

/// Loads config, opens the database, applies pending migrations and runs
/// `operation` on a current-thread runtime.
pub fn with_services<F, Fut>(command: &str, operation: F) -> CommandResult
where
    F: FnOnce(Services) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::from_application_error(command, &ApplicationError::from(error));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }

        let services = Services::new(pool.clone(), &config);
        let result = operation(services).await;
        pool.close().await;
        result
    })
}
