// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话模块
//!
//! `Session` 在 `SessionStorage` 之上实现会话的生命周期：
//!
//! ```text
//! 未挂载 --start()--> 已开启 --close()--> 未挂载
//!                       |
//!                       +-- start() 时发现 _expire 已过期：清空状态并更换会话 ID
//! ```
//!
//! ## 生命周期约束
//! - `get`/`set`/`has`/`remove`、令牌、闪存消息与指纹操作要求会话已开启。
//! - `set_session_timeout`、`set_path`、`destroy` 要求会话未开启。
//!
//! 违反约束属于调用方的编程错误，直接 `panic!`。
//!
//! ## 保留键
//! `_type`、`_expire`、`_tokens`、`_messages`、`_fingerprint` 由本模块维护。

use std::{path::Path, rc::Rc};

use hmac::{Hmac, Mac};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::{
    config::Config,
    exception::Exception,
    param::*,
    request::Request,
    storage::{SessionData, SessionOptions, SessionStorage},
    util::{constant_time_eq, now_timestamp, parse_relative_seconds, random_hex, to_hex},
};

type HmacSha256 = Hmac<Sha256>;

const MUST_BE_STARTED: &str = "Session must be started to proceed.";
const MUST_NOT_BE_STARTED: &str = "Session can't be started to proceed.";

/// 会话超时：分钟数或相对时间表达式（如 `+2 hours`）。
#[derive(Debug, Clone, PartialEq)]
pub enum Timeout {
    Minutes(u64),
    Relative(String),
}

impl From<u64> for Timeout {
    fn from(minutes: u64) -> Self {
        Timeout::Minutes(minutes)
    }
}

impl From<&str> for Timeout {
    fn from(expression: &str) -> Self {
        match expression.trim().parse::<u64>() {
            Ok(minutes) => Timeout::Minutes(minutes),
            Err(_) => Timeout::Relative(expression.to_string()),
        }
    }
}

impl Timeout {
    fn to_seconds(&self) -> Result<u64, Exception> {
        match self {
            Timeout::Minutes(minutes) => minutes
                .checked_mul(60)
                .ok_or_else(|| Exception::InvalidTimeout(minutes.to_string())),
            Timeout::Relative(expression) => match parse_relative_seconds(expression) {
                Some(seconds) if seconds > 0 => Ok(seconds as u64),
                _ => Err(Exception::InvalidTimeout(expression.clone())),
            },
        }
    }
}

/// 一条闪存消息。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlashMessage {
    pub level: String,
    pub message: Value,
    pub data: Option<Value>,
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// 取出（必要时创建）对象类型的保留键。
fn object_entry<'a>(data: &'a mut SessionData, key: &str) -> &'a mut Map<String, Value> {
    let slot = data
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub struct Session {
    request: Rc<Request>,
    storage: Box<dyn SessionStorage>,
    options: SessionOptions,
    started: bool,
    timeout: u64,
    /// 待发送的 `Set-Cookie` 值
    cookies: Vec<String>,
}

impl Session {
    pub fn new(request: Rc<Request>, storage: impl SessionStorage + 'static) -> Self {
        Self {
            request,
            storage: Box::new(storage),
            options: SessionOptions::default(),
            started: false,
            timeout: DEFAULT_SESSION_TIMEOUT,
            cookies: Vec::new(),
        }
    }

    /// 按配置文件设置超时、Cookie 名称与属性以及保存路径。
    pub fn configure(&mut self, config: &Config) -> Result<&mut Self, Exception> {
        self.set_session_timeout(config.session_timeout())?;
        if let Some(path) = config.session_save_path() {
            self.set_path(path)?;
        }
        self.options.name = config.session_name().to_string();
        self.options.cookie_secure = config.cookie_secure();
        let lifetime = self.storage.cookie_params().lifetime;
        self.storage.set_cookie_params(
            lifetime,
            config.cookie_path(),
            config.cookie_domain(),
            config.cookie_secure(),
        );
        Ok(self)
    }

    fn request_id(&self) -> u128 {
        self.request.id()
    }

    fn assert_started(&self) {
        if !self.started {
            panic!("{}", MUST_BE_STARTED);
        }
    }

    fn assert_not_started(&self) {
        if self.started {
            panic!("{}", MUST_NOT_BE_STARTED);
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// 当前会话 ID，未挂载时为空串。
    pub fn id(&self) -> String {
        self.storage.current_id()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// 取走开启、更换 ID 与销毁过程中产生的 `Set-Cookie` 值。
    pub fn take_cookies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.cookies)
    }

    fn queue_cookie(&mut self) {
        if self.options.use_cookies {
            let cookie = self
                .storage
                .cookie_params()
                .set_cookie(&self.options.name, &self.storage.current_id());
            self.cookies.push(cookie);
        }
    }

    fn incoming_id(&self) -> Option<String> {
        if !self.options.use_cookies && self.options.use_only_cookies {
            return None;
        }
        if let Some(id) = self.request.cookie(&self.options.name) {
            return Some(id.to_string());
        }
        if self.options.use_only_cookies {
            return None;
        }
        match self.request.get(&self.options.name) {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        }
    }
}

// --- 生命周期 ---

impl Session {
    /// 以当前选项开启会话。
    pub fn start(&mut self) -> Result<&mut Self, Exception> {
        if !self.started {
            let incoming = self.incoming_id();
            if !self.storage.attach(&self.options, incoming.clone()) {
                error!("[ID{}]会话存储挂载失败", self.request_id());
                return Err(Exception::SessionStartFailed);
            }
            self.started = true;
            let id = self.storage.current_id();
            info!("[ID{}]会话{}已开启", self.request_id(), id);
            if incoming.as_deref() != Some(id.as_str()) {
                self.queue_cookie();
            }
        }

        let now = now_timestamp();
        let expired = self
            .storage
            .data()
            .get(SESSION_EXPIRE_KEY)
            .and_then(Value::as_i64)
            .is_some_and(|expire| expire < now);
        if expired {
            info!("[ID{}]会话已过期，清空状态并更换ID", self.request_id());
            self.storage.data_mut().clear();
            self.regenerate_id();
        }

        let timeout = self.timeout as i64;
        let data = self.storage.data_mut();
        data.insert(SESSION_EXPIRE_KEY.to_string(), Value::from(now + timeout));
        if !data.contains_key(SESSION_TYPE_KEY) {
            data.insert(SESSION_TYPE_KEY.to_string(), Value::from("normal"));
        }
        Ok(self)
    }

    /// 合并调用方选项后开启会话。
    pub fn start_with(&mut self, options: SessionOptions) -> Result<&mut Self, Exception> {
        if !self.started {
            self.options = options;
        }
        self.start()
    }

    /// 设置超时，只能在开启前调用。
    pub fn set_session_timeout(&mut self, timeout: impl Into<Timeout>) -> Result<&mut Self, Exception> {
        self.assert_not_started();
        let timeout = timeout.into();
        self.timeout = timeout.to_seconds()?;
        debug!("[ID{}]会话超时设置为{}秒", self.request_id(), self.timeout);
        Ok(self)
    }

    /// 超时（分钟）。
    pub fn session_timeout(&self) -> u64 {
        self.timeout / 60
    }

    /// 以持久 Cookie 形式开启会话，有效期与超时一致，并更换会话 ID。
    pub fn enable_cookie(&mut self) -> Result<&mut Self, Exception> {
        if self.timeout == 0 {
            panic!("Session timeout not set.");
        }
        let params = self.storage.cookie_params();
        self.storage
            .set_cookie_params(self.timeout, &params.path, &params.domain, params.secure);
        self.start()?;
        self.storage
            .data_mut()
            .insert(SESSION_TYPE_KEY.to_string(), Value::from("cookie"));
        self.regenerate_id();
        Ok(self)
    }

    /// 更换会话 ID，状态保留。
    pub fn regenerate_id(&mut self) -> &mut Self {
        self.assert_started();
        if self.storage.regenerate_id() {
            debug!("[ID{}]会话ID已更换", self.request_id());
            self.queue_cookie();
        } else {
            warn!("[ID{}]会话ID更换失败", self.request_id());
        }
        self
    }

    /// 写回并卸载，不删除持久化数据。重复调用无副作用。
    pub fn close(&mut self) -> bool {
        if !self.started {
            return true;
        }
        self.started = false;
        let written = self.storage.write_and_detach();
        if written {
            info!("[ID{}]会话已关闭", self.request_id());
        } else {
            error!("[ID{}]会话写回失败", self.request_id());
        }
        written
    }

    /// 清空状态、让客户端 Cookie 立即过期并删除持久化数据。只能在开启前调用。
    pub fn destroy(&mut self) -> &mut Self {
        self.assert_not_started();
        self.storage.data_mut().clear();
        let name = self.options.name.clone();
        if let Some(id) = self.request.cookie(&name).map(|id| id.to_string()) {
            let expired = self.storage.cookie_params().expired_cookie(&name);
            self.cookies.push(expired);
            self.storage.destroy_persisted(&id);
        }
        info!("[ID{}]会话已销毁", self.request_id());
        self
    }

    /// `destroy()` 之后 `close()`。
    pub fn reset(&mut self) -> &mut Self {
        self.destroy();
        self.close();
        self
    }

    /// 会话保存路径。
    pub fn path(&self) -> String {
        self.storage.save_path().display().to_string()
    }

    /// 设置保存路径，只能在开启前调用。文件路径取其所在目录。
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, Exception> {
        self.assert_not_started();
        let path = path.as_ref();
        let dir = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        if !dir.is_dir() {
            return Err(Exception::SavePathNotFound(dir.to_path_buf()));
        }
        let writable = std::fs::metadata(dir)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return Err(Exception::SavePathNotWritable(dir.to_path_buf()));
        }
        self.storage.set_save_path(dir);
        Ok(self)
    }
}

// --- 状态读写 ---

impl Session {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.assert_started();
        self.storage.data().get(key)
    }

    /// 读取并反序列化为 `T`，类型不匹配时返回 `None`。
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.assert_started();
        self.storage
            .data_mut()
            .insert(key.to_string(), value.into());
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.assert_started();
        self.storage.data().contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.assert_started();
        self.storage.data_mut().remove(key)
    }
}

// --- CSRF 令牌 ---

impl Session {
    fn tokens(&mut self) -> &mut Map<String, Value> {
        self.assert_started();
        object_entry(self.storage.data_mut(), SESSION_TOKENS_KEY)
    }

    /// 取令牌，不存在时生成（32 个随机字节的十六进制编码）。
    pub fn get_token(&mut self, name: &str) -> String {
        let tokens = self.tokens();
        if let Some(Value::String(token)) = tokens.get(name) {
            return token.clone();
        }
        let token = random_hex(32);
        tokens.insert(name.to_string(), Value::from(token.clone()));
        token
    }

    /// 重新生成令牌。
    pub fn refresh_token(&mut self, name: &str) -> String {
        let token = random_hex(32);
        self.tokens()
            .insert(name.to_string(), Value::from(token.clone()));
        token
    }

    pub fn remove_token(&mut self, name: &str) -> Option<String> {
        match self.tokens().remove(name) {
            Some(Value::String(token)) => Some(token),
            _ => None,
        }
    }

    /// 定长比较候选值与已存令牌，令牌不存在时返回 `false`。
    pub fn is_valid_token(&mut self, name: &str, candidate: &str) -> bool {
        match self.tokens().get(name) {
            Some(Value::String(token)) => constant_time_eq(token.as_bytes(), candidate.as_bytes()),
            _ => false,
        }
    }
}

// --- 闪存消息 ---

impl Session {
    /// 写入或一次性读取闪存消息。
    ///
    /// `message` 非空时为写入模式：数组的第一项作为消息、第二项作为附加数据，
    /// 覆盖同名旧消息，返回 `None`。`message` 为空（`Value::Null`、空串、空数组）
    /// 时为读取模式：取出并删除同名消息。
    ///
    /// # Panics
    /// `name` 为空时。
    pub fn flash(&mut self, name: &str, message: impl Into<Value>, level: &str) -> Option<FlashMessage> {
        if name.is_empty() {
            panic!("Flash name can't be empty.");
        }
        self.assert_started();
        let message = message.into();
        let messages = object_entry(self.storage.data_mut(), SESSION_MESSAGES_KEY);

        if is_empty_value(&message) {
            let taken = messages.remove(name)?;
            return match serde_json::from_value(taken) {
                Ok(flash) => Some(flash),
                Err(e) => {
                    warn!("闪存消息{}格式不正确: {}", name, e);
                    None
                }
            };
        }

        let (message, data) = match message {
            Value::Array(mut items) => {
                let data = if items.len() > 1 { Some(items.remove(1)) } else { None };
                (items.remove(0), data)
            }
            other => (other, None),
        };
        let flash = FlashMessage {
            level: level.to_string(),
            message,
            data,
        };
        match serde_json::to_value(&flash) {
            Ok(value) => {
                messages.insert(name.to_string(), value);
            }
            Err(e) => error!("闪存消息{}无法序列化: {}", name, e),
        }
        None
    }

    /// 写入 `info` 级别的闪存消息。
    pub fn set_flash(&mut self, name: &str, message: impl Into<Value>) -> &mut Self {
        self.flash(name, message, "info");
        self
    }

    /// 一次性读取闪存消息。
    pub fn take_flash(&mut self, name: &str) -> Option<FlashMessage> {
        self.flash(name, Value::Null, "info")
    }
}

// --- 客户端指纹 ---

impl Session {
    fn fingerprint(&self, private_key: &str, uid: &str) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(private_key.as_bytes()) else {
            error!("[ID{}]无法初始化HMAC", self.request_id());
            return String::new();
        };
        mac.update(self.request.server_or("REMOTE_ADDR", "").as_bytes());
        mac.update(self.request.user_agent().as_bytes());
        mac.update(uid.as_bytes());
        to_hex(&mac.finalize().into_bytes())
    }

    /// 记录客户端指纹（`REMOTE_ADDR` + `User-Agent` + `uid` 的 HMAC-SHA256）。
    pub fn set_fingerprint(&mut self, private_key: &str, uid: &str) -> &mut Self {
        self.assert_started();
        let fingerprint = self.fingerprint(private_key, uid);
        self.set(SESSION_FINGERPRINT_KEY, fingerprint)
    }

    /// 校验客户端指纹。不一致时清空状态并更换会话 ID。
    pub fn check_fingerprint(&mut self, private_key: &str, uid: &str) -> bool {
        self.assert_started();
        let expected = self.fingerprint(private_key, uid);
        let valid = match self.storage.data().get(SESSION_FINGERPRINT_KEY) {
            Some(Value::String(stored)) => constant_time_eq(stored.as_bytes(), expected.as_bytes()),
            _ => false,
        };
        if !valid {
            warn!("[ID{}]客户端指纹不匹配，会话已重置", self.request_id());
            self.storage.data_mut().clear();
            self.regenerate_id();
        }
        valid
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.started {
            self.close();
        }
    }
}
