#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use mongodb::Client;
use rocket::data::{ByteUnit, Limits};
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{BootstrapAdmin, Config, StorageKind};
use crate::data::memory::MemoryStore;
use crate::data::user::{PasswordHash, User};
use crate::data::Store;
use crate::error::{BackendError, ConfigurationError};
use crate::files::{FileStorage, MAX_FILES, MAX_FILE_SIZE};
use crate::mail::{LogMailer, Mailer};
use crate::role::Role;
use crate::route::mount_api;
use crate::security::Security;

pub mod config;
pub mod data;
pub mod error;
pub mod files;
pub mod mail;
pub mod middleware;
pub mod notify;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod supervision;
pub mod util;

fn load_config() -> Result<Config, ConfigurationError> {
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other)
        }
    }
}

async fn open_store(c: &Config) -> Result<Arc<dyn Store>, BackendError> {
    let store: Arc<dyn Store> = match c.storage {
        StorageKind::MongoDb => {
            tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
            let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

            tracing::info!("Using MongoDB database: {}", c.mongodb_db);
            Arc::new(client.database(c.mongodb_db.as_str()))
        }
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage, nothing will be persisted.");
            Arc::new(MemoryStore::default())
        }
    };

    store.setup().await?;
    Ok(store)
}

async fn bootstrap_admin(
    store: &dyn Store,
    security: &Security,
    admin: &BootstrapAdmin,
) -> Result<(), BackendError> {
    let email = admin.email.trim().to_lowercase();
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let hash = match PasswordHash::new(&admin.password, security) {
        Ok(it) => it,
        Err(e) => {
            tracing::error!("Unable to hash bootstrap admin password: {}", e);
            return Ok(());
        }
    };
    store
        .insert_user(&User::new(&admin.name, email, hash, Role::Admin))
        .await?;
    tracing::info!("Created bootstrap admin {}", admin.email);
    Ok(())
}

/// Assembles the server from already loaded parts.
pub fn build(
    config: Config,
    security: Security,
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
) -> Rocket<Build> {
    let form_limit = MAX_FILE_SIZE * MAX_FILES as u64 + 1024 * 1024;
    let limits = Limits::default()
        .limit("file", ByteUnit::from(MAX_FILE_SIZE))
        .limit("data-form", ByteUnit::from(form_limit));
    let figment = rocket::Config::figment().merge(("limits", limits));

    let storage = FileStorage::new(&config.upload_dir);
    let r = rocket::custom(figment)
        .manage(config)
        .manage(security)
        .manage(store)
        .manage(mailer)
        .manage(storage);

    mount_api(r)
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = load_config()?;

    tracing::info!("Initializing security information...");
    let security = Security::load(&c.security_dir)?;

    let store = open_store(&c).await?;
    if let Some(admin) = &c.admin {
        bootstrap_admin(store.as_ref(), &security, admin).await?;
    }

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::some_exact(&[c.frontend_url.as_str()]),
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

    tracing::info!("Starting HTTP server...");
    Ok(build(c, security, store, mailer).attach(cors))
}
