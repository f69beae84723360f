use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("auth_db")]
pub struct AuthDb(sqlx::PgPool);

/// Schema for accounts and token pairs, embedded at compile time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
