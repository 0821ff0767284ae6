use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::exception::Exception;
use crate::param::{DEFAULT_BODY_MEMORY_LIMIT, DEFAULT_SESSION_TIMEOUT};
use crate::storage::DEFAULT_MEMORY_SESSIONS;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// 会话超时（分钟）
    #[serde(default = "default_session_timeout")]
    session_timeout: u64,
    #[serde(default)]
    session_save_path: Option<String>,
    #[serde(default = "default_session_name")]
    session_name: String,
    #[serde(default = "default_cookie_path")]
    cookie_path: String,
    #[serde(default)]
    cookie_domain: String,
    #[serde(default)]
    cookie_secure: bool,
    #[serde(default = "default_body_memory_limit")]
    body_memory_limit: usize,
    #[serde(default = "default_memory_sessions")]
    memory_sessions: usize,
    #[serde(default = "default_log_config")]
    log_config: String,
}

fn default_session_timeout() -> u64 {
    DEFAULT_SESSION_TIMEOUT / 60 // 3 小时
}

fn default_session_name() -> String {
    "WSESSID".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_body_memory_limit() -> usize {
    DEFAULT_BODY_MEMORY_LIMIT // 8MB
}

fn default_memory_sessions() -> usize {
    DEFAULT_MEMORY_SESSIONS
}

fn default_log_config() -> String {
    "config/log4rs.yaml".to_string()
}

impl Config {
    pub fn new() -> Self {
        Self {
            session_timeout: default_session_timeout(),
            session_save_path: None,
            session_name: default_session_name(),
            cookie_path: default_cookie_path(),
            cookie_domain: String::new(),
            cookie_secure: false,
            body_memory_limit: default_body_memory_limit(),
            memory_sessions: default_memory_sessions(),
            log_config: default_log_config(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}: {}", filename, e);
                return Err(Exception::ConfigNotFound(filename.to_string()));
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}时遇到错误: {}", filename, e);
            return Err(Exception::ConfigNotFound(filename.to_string()));
        }

        let mut raw_config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置: {}", e);
                Config::new()
            }
        };
        if raw_config.memory_sessions == 0 {
            warn!("memory_sessions被设置为0，但进程内会话表不能为空，因此该值将被改为{}。", DEFAULT_MEMORY_SESSIONS);
            raw_config.memory_sessions = DEFAULT_MEMORY_SESSIONS;
        }
        if raw_config.body_memory_limit == 0 {
            warn!("body_memory_limit被设置为0，所有响应体都将写入临时文件。");
        }
        Ok(raw_config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn session_timeout(&self) -> u64 {
        self.session_timeout
    }

    pub fn session_save_path(&self) -> Option<&str> {
        self.session_save_path.as_deref()
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }

    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    pub fn body_memory_limit(&self) -> usize {
        self.body_memory_limit
    }

    pub fn memory_sessions(&self) -> usize {
        self.memory_sessions
    }

    pub fn log_config(&self) -> &str {
        &self.log_config
    }
}
