use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::engine::ChatId;
use crate::protocol::{ProxyType, TdlibParameters};
use crate::session::DEFAULT_UPDATE_BUFFER;

const DEFAULT_ENGINE_URL: &str = "ws://127.0.0.1:8410/engine";
/// Chat of the public ping bot.
pub const DEFAULT_CHAT_ID: ChatId = 860175318;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProxyKind {
    Socks5,
    Http,
    Mtproto,
}

impl FromStr for ProxyKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "socks5" => Ok(ProxyKind::Socks5),
            "http" => Ok(ProxyKind::Http),
            "mtproto" => Ok(ProxyKind::Mtproto),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn label(&self) -> &'static str {
        match self.kind {
            ProxyKind::Socks5 => "SOCKS proxy",
            ProxyKind::Http => "HTTP proxy",
            ProxyKind::Mtproto => "MTPROTO proxy",
        }
    }

    pub fn proxy_type(&self) -> ProxyType {
        match self.kind {
            ProxyKind::Socks5 => ProxyType::ProxyTypeSocks5 {
                username: self.login.clone(),
                password: self.password.clone(),
            },
            ProxyKind::Http => ProxyType::ProxyTypeHttp {
                username: self.login.clone(),
                password: self.password.clone(),
                http_only: false,
            },
            // MTProto proxies authenticate with a secret carried in the login field.
            ProxyKind::Mtproto => ProxyType::ProxyTypeMtproto {
                secret: self.login.clone(),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub engine_url: String,
    pub api_id: i32,
    pub api_hash: String,
    pub data_dir: PathBuf,
    pub chat_id: ChatId,
    pub update_buffer: usize,
    pub proxy: Option<ProxyConfig>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = cfg!(debug_assertions);
        let value = |key: &'static str| lookup(key).filter(|value| !value.trim().is_empty());

        let engine_url = value("CHATPING_ENGINE_URL")
            .unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let api_id = parse(
            "CHATPING_API_ID",
            value("CHATPING_API_ID").ok_or(ConfigError::Missing("CHATPING_API_ID"))?,
        )?;
        let api_hash = value("CHATPING_API_HASH").ok_or(ConfigError::Missing("CHATPING_API_HASH"))?;
        let data_dir = value("CHATPING_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(debug, value("HOME")));
        let chat_id = value("CHATPING_CHAT_ID")
            .map(|raw| parse("CHATPING_CHAT_ID", raw))
            .transpose()?
            .unwrap_or(DEFAULT_CHAT_ID);
        let update_buffer = value("CHATPING_UPDATE_BUFFER")
            .map(|raw| parse::<usize>("CHATPING_UPDATE_BUFFER", raw))
            .transpose()?
            .unwrap_or(DEFAULT_UPDATE_BUFFER);
        if update_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "CHATPING_UPDATE_BUFFER",
                value: "0".to_string(),
            });
        }

        let proxy = match value("CHATPING_PROXY_TYPE") {
            None => None,
            Some(raw) => {
                let kind = raw.parse::<ProxyKind>().map_err(|_| ConfigError::Invalid {
                    key: "CHATPING_PROXY_TYPE",
                    value: raw.clone(),
                })?;
                let host = value("CHATPING_PROXY_HOST").ok_or(ConfigError::Missing("CHATPING_PROXY_HOST"))?;
                let port = parse(
                    "CHATPING_PROXY_PORT",
                    value("CHATPING_PROXY_PORT").ok_or(ConfigError::Missing("CHATPING_PROXY_PORT"))?,
                )?;
                Some(ProxyConfig {
                    kind,
                    host,
                    port,
                    login: value("CHATPING_PROXY_LOGIN").unwrap_or_default(),
                    password: value("CHATPING_PROXY_PASS").unwrap_or_default(),
                })
            }
        };

        Ok(Self {
            engine_url,
            api_id,
            api_hash,
            data_dir,
            chat_id,
            update_buffer,
            proxy,
        })
    }

    pub fn tdlib_parameters(&self) -> TdlibParameters {
        let device_model = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "Server".to_string());

        TdlibParameters {
            use_test_dc: false,
            database_directory: self.data_dir.join("db").to_string_lossy().into_owned(),
            files_directory: self.data_dir.join("files").to_string_lossy().into_owned(),
            use_file_database: true,
            use_chat_info_database: true,
            use_message_database: true,
            use_secret_chats: false,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            system_language_code: "en".to_string(),
            device_model,
            system_version: "1.0.0".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            enable_storage_optimizer: true,
            ignore_file_names: false,
        }
    }
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn default_data_dir(debug: bool, home: Option<String>) -> PathBuf {
    let base = home.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let dir_name = if debug { "chatping-dev" } else { "chatping" };
    base.join(".local").join("share").join(dir_name)
}
