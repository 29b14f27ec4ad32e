//! JSON objects exchanged with the engine.
//!
//! Every object carries its type name under `@type`. Requests additionally
//! carry an `@extra` id that the engine echoes back on the matching response;
//! objects without it are updates.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const TYPE_KEY: &str = "@type";
pub const EXTRA_KEY: &str = "@extra";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum Request {
    GetAuthorizationState,
    SetTdlibParameters {
        parameters: TdlibParameters,
    },
    CheckDatabaseEncryptionKey {
        encryption_key: String,
    },
    SetAuthenticationPhoneNumber {
        phone_number: String,
    },
    CheckAuthenticationCode {
        code: String,
    },
    CheckAuthenticationPassword {
        password: String,
    },
    SendMessage {
        chat_id: i64,
        reply_to_message_id: i64,
        disable_notification: bool,
        from_background: bool,
        input_message_content: InputMessageContent,
    },
    GetChats {
        // 64-bit values travel as strings to survive JSON number precision.
        offset_order: String,
        offset_chat_id: i64,
        limit: i32,
    },
    GetChat {
        chat_id: i64,
    },
    AddProxy {
        server: String,
        port: i32,
        enable: bool,
        #[serde(rename = "type")]
        kind: ProxyType,
    },
    PingProxy {
        proxy_id: i32,
    },
    Close,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetAuthorizationState => "getAuthorizationState",
            Request::SetTdlibParameters { .. } => "setTdlibParameters",
            Request::CheckDatabaseEncryptionKey { .. } => "checkDatabaseEncryptionKey",
            Request::SetAuthenticationPhoneNumber { .. } => "setAuthenticationPhoneNumber",
            Request::CheckAuthenticationCode { .. } => "checkAuthenticationCode",
            Request::CheckAuthenticationPassword { .. } => "checkAuthenticationPassword",
            Request::SendMessage { .. } => "sendMessage",
            Request::GetChats { .. } => "getChats",
            Request::GetChat { .. } => "getChat",
            Request::AddProxy { .. } => "addProxy",
            Request::PingProxy { .. } => "pingProxy",
            Request::Close => "close",
        }
    }

    pub fn text_message(chat_id: i64, text: &str) -> Self {
        Request::SendMessage {
            chat_id,
            reply_to_message_id: 0,
            disable_notification: false,
            from_background: true,
            input_message_content: InputMessageContent::InputMessageText {
                text: FormattedText {
                    text: text.to_string(),
                },
                disable_web_page_preview: true,
                clear_draft: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TdlibParameters {
    pub use_test_dc: bool,
    pub database_directory: String,
    pub files_directory: String,
    pub use_file_database: bool,
    pub use_chat_info_database: bool,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub api_id: i32,
    pub api_hash: String,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
    pub enable_storage_optimizer: bool,
    pub ignore_file_names: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum InputMessageContent {
    InputMessageText {
        text: FormattedText,
        disable_web_page_preview: bool,
        clear_draft: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "@type", rename = "formattedText")]
pub struct FormattedText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum ProxyType {
    ProxyTypeSocks5 { username: String, password: String },
    ProxyTypeHttp { username: String, password: String, http_only: bool },
    ProxyTypeMtproto { secret: String },
}

#[derive(Debug, Deserialize)]
pub struct ChatIds {
    #[serde(deserialize_with = "int64_list")]
    pub chat_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatObject {
    #[serde(deserialize_with = "int64")]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "int64")]
    pub order: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProxyObject {
    pub id: i32,
}

#[derive(Debug, Deserialize)]
pub struct Seconds {
    pub seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

pub fn type_name(value: &Value) -> &str {
    value.get(TYPE_KEY).and_then(Value::as_str).unwrap_or_default()
}

pub fn request_id(value: &Value) -> Option<u64> {
    value.get(EXTRA_KEY).and_then(Value::as_u64)
}

/// Reads a 64-bit integer sent either as a JSON number or a decimal string.
pub fn int64_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Number(i64),
    Text(String),
}

impl Int64Repr {
    fn into_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            Int64Repr::Number(value) => Ok(value),
            Int64Repr::Text(text) => text
                .parse()
                .map_err(|_| E::custom(format!("invalid int64 string: {text}"))),
        }
    }
}

fn int64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Int64Repr::deserialize(deserializer)?.into_i64()
}

fn int64_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Int64Repr>::deserialize(deserializer)?
        .into_iter()
        .map(Int64Repr::into_i64)
        .collect()
}
