#![allow(async_fn_in_trait)]

#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use bson::doc;
use error::BackendError;
use mongodb::Client;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::chatbot::Chatbot;
use crate::config::{Config, DatabaseBackend};
use crate::error::ConfigurationError;
use crate::identity::Identities;
use crate::route::mount_api;
use crate::storage::Bucket;
use crate::store::mongo::MongoStore;
use crate::store::Store;

pub mod chatbot;
pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod notify;
pub mod resp;
pub mod role;
pub mod route;
pub mod storage;
pub mod store;
pub mod util;

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
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };

    let store = match c.database {
        DatabaseBackend::MongoDb => {
            tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
            let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

            tracing::info!("Using MongoDB database: {}", c.mongodb_db);
            let db = client.database(c.mongodb_db.as_str());

            if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
                tracing::error!("Unable to connect to MongoDB.");
                return Err(e.into());
            }
            Store::new(MongoStore::new(db))
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory document store, data is lost on shutdown.");
            Store::memory()
        }
    };

    tracing::info!("Using upload bucket in {}", c.storage_root.display());
    let bucket = Bucket::from_config(&c);
    let chatbot = Chatbot::from_config(&c);
    tracing::warn!("Using local staff identities, sign-in credentials are kept in memory.");
    let identities = Identities::local();

    tracing::info!("Starting HTTP server...");
    build(c, store, bucket, chatbot, identities)
}

/// Assembles the server around already constructed services.
pub fn build(
    config: Config,
    store: Store,
    bucket: Bucket,
    chatbot: Chatbot,
    identities: Identities,
) -> Result<Rocket<Build>, BackendError> {
    let mut r = rocket::build()
        .manage(config)
        .manage(store)
        .manage(bucket)
        .manage(chatbot)
        .manage(identities);

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    r = r.attach(cors);
    r = mount_api(r);

    Ok(r)
}

#[cfg(test)]
pub(crate) fn test_app() -> Rocket<Build> {
    test_app_with(Store::memory(), Chatbot::disabled())
}

#[cfg(test)]
pub(crate) fn test_app_with(store: Store, chatbot: Chatbot) -> Rocket<Build> {
    let config = Config::ephemeral();
    let bucket = Bucket::from_config(&config);
    build(config, store, bucket, chatbot, Identities::local()).expect("test server builds")
}
