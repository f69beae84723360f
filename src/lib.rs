#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod routes;

use crate::auth::{AuthConfig, AuthState, PgStore, SystemClock, TokenIssuer};
use crate::db::AuthDb;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, Route};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};
use std::time::Duration;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    rocket::build()
        .attach(AuthDb::init())
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match AuthDb::fetch(&rocket) {
                    Some(db) => match db::run_migrations(db).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let pool = match AuthDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for authentication");
                    return Err(rocket);
                }
            };

            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("invalid authentication configuration: {}", err);
                    return Err(rocket);
                }
            };

            match AuthState::new(config, Arc::new(PgStore::new(pool)), Arc::new(SystemClock)) {
                Ok(state) => Ok(rocket.manage(state)),
                Err(err) => {
                    log::error!("failed to initialize authentication: {}", err);
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::on_liftoff("Spawn Token Sweeper", |rocket| {
            Box::pin(async move {
                match rocket.state::<AuthState>() {
                    Some(state) => {
                        let tokens = state.tokens.clone();
                        let every = Duration::from_secs(state.config.purge_interval_secs);
                        tokio::spawn(async move {
                            log::info!("starting token sweeper");
                            sweep_expired_tokens(tokens, every).await
                        });
                    }
                    None => log::error!("failed to spawn token sweeper: auth state not found"),
                }
            })
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                auth::routes::register,
                auth::routes::login,
                auth::routes::refresh_token,
                auth::routes::logout,
                routes::users::current_user,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .register("/", catchers![auth::routes::default_catcher])
}

/// Every route served under `/api/v1`, without the OpenAPI document route.
pub fn api_routes() -> Vec<Route> {
    routes![
        auth::routes::register,
        auth::routes::login,
        auth::routes::refresh_token,
        auth::routes::logout,
        routes::users::current_user,
    ]
}

/// Periodically drops token pairs that can no longer be used.
pub async fn sweep_expired_tokens(tokens: Arc<TokenIssuer>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match tokens.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => log::info!("purged {} stale token pair(s)", removed),
            Err(err) => log::warn!("token purge failed: {}", err),
        }
    }
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::{Build, Rocket, Route};

    use crate::auth::{AuthConfig, AuthState, Clock, MemoryStore, PasswordCost};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Configuration suited to tests: cheap hashing and non-`Secure` cookies so
    /// the local client sends them back.
    pub fn test_config() -> AuthConfig {
        AuthConfig {
            cookie_secure: false,
            password_cost: PasswordCost {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..AuthConfig::default()
        }
    }

    /// Auth state over a fresh in-memory store driven by `clock`.
    pub fn memory_auth_state(clock: Arc<dyn Clock>) -> (AuthState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AuthState::new(test_config(), store.clone(), clock)
            .expect("test auth state is valid");
        (state, store)
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use uuid::Uuid;

        use crate::db::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable Postgres with the auth schema applied.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Launch a Postgres container and create a uniquely named database in it.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stdout(
                        "database system is ready to accept connections",
                    ))
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let container = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres")
                    .start()
                    .await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(base_options.clone())
                    .await?;

                let database_name = format!("auth_gate_{}", Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\"", database_name);
                sqlx::query(&create_sql).execute(&admin_pool).await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.database(&database_name))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and stop the container.
            pub async fn close(mut self) {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }
                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment)
                .register("/", catchers![crate::auth::routes::default_catcher]);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
