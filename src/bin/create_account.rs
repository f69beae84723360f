use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use auth_gate::auth::{AccountService, AuthConfig, AuthError, PasswordService, PgStore, SystemClock};
use auth_gate::db;

#[derive(Parser, Debug)]
#[command(name = "create_account", about = "Create an account with a local password")]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this account.
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let config = AuthConfig::from_env()?;

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    db::run_migrations(&pool).await?;

    let passwords = PasswordService::new(config.password_cost)?;
    let accounts = AccountService::new(
        Arc::new(PgStore::new(pool)),
        passwords,
        Arc::new(SystemClock),
    );

    match accounts.register(&args.email, &args.password).await {
        Ok(account) => {
            println!("Created account '{}' with id {}", account.email, account.id);
            Ok(())
        }
        Err(AuthError::DuplicateAccount) => {
            writeln!(
                io::stderr(),
                "error: an account with email '{}' already exists.",
                args.email.trim()
            )?;
            std::process::exit(1);
        }
        Err(AuthError::Validation(msg)) => {
            writeln!(io::stderr(), "error: {msg}")?;
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}
