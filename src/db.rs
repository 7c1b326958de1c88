use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    Schema, Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{
    account, activity_log, department_history, employee, goal, performance_review, refresh_token,
};

/// At most one active assignment per employee, enforced by the database as well
const ONE_ACTIVE_ASSIGNMENT: &str = "CREATE UNIQUE INDEX IF NOT EXISTS uq_ept_department_history_active \
     ON ept_department_history (employee_id) WHERE is_active";

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(config.max_connections)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

fn create_table<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    stmt
}

fn create_index<C: sea_orm::sea_query::IntoIden>(
    name: &str,
    table: impl sea_orm::sea_query::IntoTableRef,
    column: C,
) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(name)
        .table(table)
        .col(column)
        .to_owned()
}

/// Every DDL statement the schema needs, in dependency order
fn migration_statements(backend: DbBackend) -> Vec<String> {
    let schema = Schema::new(backend);

    let tables = [
        create_table(&schema, account::Entity),
        create_table(&schema, refresh_token::Entity),
        create_table(&schema, employee::Entity),
        create_table(&schema, department_history::Entity),
        create_table(&schema, performance_review::Entity),
        create_table(&schema, goal::Entity),
        create_table(&schema, activity_log::Entity),
    ];

    let indexes = [
        create_index(
            "idx_ept_refresh_token_account",
            refresh_token::Entity,
            refresh_token::Column::AccountId,
        ),
        create_index(
            "idx_ept_department_history_employee",
            department_history::Entity,
            department_history::Column::EmployeeId,
        ),
        create_index(
            "idx_ept_performance_review_employee",
            performance_review::Entity,
            performance_review::Column::EmployeeId,
        ),
        create_index(
            "idx_ept_goal_employee",
            goal::Entity,
            goal::Column::EmployeeId,
        ),
    ];

    let mut statements: Vec<String> = tables.iter().map(|t| backend.build(t).to_string()).collect();
    statements.extend(indexes.iter().map(|i| backend.build(i).to_string()));
    if backend == DbBackend::Postgres {
        statements.push(ONE_ACTIVE_ASSIGNMENT.to_string());
    }
    statements
}

/// Create missing tables and indexes (similar to GORM AutoMigrate)
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    info!("Running auto-migration for all entities...");

    for sql in migration_statements(backend) {
        db.execute(Statement::from_string(backend, sql)).await?;
    }

    info!("Auto-migration completed successfully");
    Ok(())
}
