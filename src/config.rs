use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("captrak".to_string())
}

fn default_storage() -> StorageKind {
    match env::var("STORAGE").as_deref() {
        Ok("memory") => StorageKind::Memory,
        _ => StorageKind::MongoDb,
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from(env::var("UPLOAD_DIR").unwrap_or("./uploads".to_string()))
}

fn default_frontend_url() -> String {
    env::var("FRONTEND_URL").unwrap_or("http://localhost:5173".to_string())
}

fn default_security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

fn default_cookie_days() -> i64 {
    env::var("COOKIE_EXPIRY_DAYS")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(7)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    MongoDb,
    Memory,
}

/// Account created on start-up when no user with the same email exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_storage")]
    pub storage: StorageKind,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_security_dir")]
    pub security_dir: PathBuf,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_cookie_days")]
    pub cookie_expiry_days: i64,

    #[serde(default)]
    pub admin: Option<BootstrapAdmin>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            storage: default_storage(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            upload_dir: default_upload_dir(),
            security_dir: default_security_dir(),
            frontend_url: default_frontend_url(),
            cookie_expiry_days: default_cookie_days(),
            admin: None,
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        Config::load_from(config_dir())
    }

    pub fn load_from(dir: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            dir.as_ref(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(dir.as_ref().to_path_buf()))?;

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

    /// Configuration for tests: in-memory storage and a private upload directory.
    #[cfg(test)]
    pub fn for_tests() -> Config {
        Config {
            file_path: PathBuf::new(),
            storage: StorageKind::Memory,
            mongodb_uri: String::new(),
            mongodb_db: String::new(),
            upload_dir: env::temp_dir()
                .join("captrak-test-uploads")
                .join(uuid::Uuid::new_v4().to_string()),
            security_dir: env::temp_dir().join("captrak-test-security"),
            frontend_url: "http://localhost:5173".to_string(),
            cookie_expiry_days: 7,
            admin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_is_reported() {
        let dir = env::temp_dir().join(format!("captrak-config-{}", uuid::Uuid::new_v4()));
        match Config::load_from(&dir) {
            Err(ConfigurationError::NotFound(path)) => assert_eq!(path, dir),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = env::temp_dir().join(format!("captrak-config-{}", uuid::Uuid::new_v4()));
        let mut config = Config::for_tests();
        config.file_path = dir.join("settings.yml");
        config.mongodb_db = "fyp".to_string();
        config.admin = Some(BootstrapAdmin {
            name: "Root".to_string(),
            email: "root@example.com".to_string(),
            password: "correct horse".to_string(),
        });
        config.save().expect("unable to save config");

        let loaded = Config::load_from(&dir).expect("unable to load config");
        assert_eq!(loaded.mongodb_db, "fyp");
        assert_eq!(loaded.storage, StorageKind::Memory);
        assert_eq!(
            loaded.admin.map(|it| it.email),
            Some("root@example.com".to_string())
        );
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let config: Config =
            serde_yaml::from_str("mongodb_db: other\n").expect("valid partial config");
        assert_eq!(config.mongodb_db, "other");
        assert!(config.cookie_expiry_days > 0);
        assert!(config.admin.is_none());
    }
}
