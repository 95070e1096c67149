use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    MongoDb,
    Memory,
}

fn default_database() -> DatabaseBackend {
    match env::var("DATABASE_BACKEND").as_deref() {
        Ok("memory") => DatabaseBackend::Memory,
        _ => DatabaseBackend::MongoDb,
    }
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("tutordesk".to_string())
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(env::var("STORAGE_ROOT").unwrap_or("./bucket".to_string()))
}

#[cfg(debug_assertions)]
fn default_storage_prefix() -> String {
    env::var("STORAGE_PREFIX").unwrap_or("test".to_string())
}
#[cfg(not(debug_assertions))]
fn default_storage_prefix() -> String {
    env::var("STORAGE_PREFIX").unwrap_or("live".to_string())
}

fn default_storage_public_url() -> String {
    env::var("STORAGE_PUBLIC_URL").unwrap_or("http://localhost:8000/bucket".to_string())
}

fn default_openai_api_key() -> Option<String> {
    env::var("OPENAI_API_KEY").ok().filter(|it| !it.is_empty())
}

fn default_openai_url() -> String {
    env::var("OPENAI_URL").unwrap_or("https://api.openai.com/v1/chat/completions".to_string())
}

fn default_chatbot_model() -> String {
    env::var("CHATBOT_MODEL").unwrap_or("gpt-3.5-turbo".to_string())
}

fn default_chatbot_max_tokens() -> u32 {
    150
}

fn default_chatbot_temperature() -> f32 {
    0.3
}

fn default_password_cost() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_database")]
    pub database: DatabaseBackend,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    /// Directory backing the upload bucket.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Environment folder objects are stored under (`live` or `test`).
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
    #[serde(default = "default_storage_public_url")]
    pub storage_public_url: String,

    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_url")]
    pub openai_url: String,
    #[serde(default = "default_chatbot_model")]
    pub chatbot_model: String,
    #[serde(default = "default_chatbot_max_tokens")]
    pub chatbot_max_tokens: u32,
    #[serde(default = "default_chatbot_temperature")]
    pub chatbot_temperature: f32,

    /// bcrypt cost for student and tutor passwords.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            database: default_database(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            storage_root: default_storage_root(),
            storage_prefix: default_storage_prefix(),
            storage_public_url: default_storage_public_url(),
            openai_api_key: default_openai_api_key(),
            openai_url: default_openai_url(),
            chatbot_model: default_chatbot_model(),
            chatbot_max_tokens: default_chatbot_max_tokens(),
            chatbot_temperature: default_chatbot_temperature(),
            password_cost: default_password_cost(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// Configuration for tests and throwaway local runs: in-memory database,
    /// bucket under the system temp directory and no chatbot key.
    pub fn ephemeral() -> Config {
        Config {
            database: DatabaseBackend::Memory,
            storage_root: env::temp_dir().join(format!("tutordesk-{}", util::random_token(8))),
            storage_prefix: "test".to_string(),
            openai_api_key: None,
            password_cost: 4,
            ..Default::default()
        }
    }
}
