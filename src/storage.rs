// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话存储模块
//!
//! `SessionStorage` 是 `Session` 与持久化后端之间的接口：挂载时根据传入的会话 ID
//! 载入状态，挂载期间以可变映射的形式暴露状态，卸载时写回。
//!
//! 提供两种实现：
//! - `MemoryStorage`：进程内共享的 LRU 表，容量满时淘汰最久未使用的会话。
//! - `FileStorage`：保存路径下每个会话一个 `sess_<id>` JSON 文件。
//!
//! 同一会话 ID 的并发访问由存储的拥有者负责串行化，这里不做文件锁。

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use lazy_static::lazy_static;
use log::{debug, error, warn};
use lru::LruCache;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::Config,
    util::{http_date, now_timestamp, random_session_id},
};

/// 会话状态表
pub type SessionData = Map<String, Value>;

/// 进程内会话表的默认容量
pub const DEFAULT_MEMORY_SESSIONS: usize = 1024;

lazy_static! {
    static ref SHARED_SESSIONS: Arc<Mutex<SessionStore>> =
        Arc::new(Mutex::new(SessionStore::from_capacity(DEFAULT_MEMORY_SESSIONS)));
}

/// 开启会话时的选项，未给出的字段使用默认值。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionOptions {
    /// Cookie 名称
    pub name: String,
    /// 严格模式：拒绝存储中不存在的会话 ID
    pub use_strict_mode: bool,
    pub use_cookies: bool,
    /// 只从 Cookie 读取会话 ID，不接受查询参数
    pub use_only_cookies: bool,
    pub cookie_httponly: bool,
    pub cookie_samesite: String,
    pub cookie_secure: bool,
    /// 会话 ID 长度（22 到 256）
    pub sid_length: usize,
    /// 每个字符承载的比特数（4 到 6）
    pub sid_bits_per_character: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "WSESSID".to_string(),
            use_strict_mode: true,
            use_cookies: true,
            use_only_cookies: true,
            cookie_httponly: true,
            cookie_samesite: "Strict".to_string(),
            cookie_secure: false,
            sid_length: 48,
            sid_bits_per_character: 5,
        }
    }
}

impl SessionOptions {
    fn is_valid(&self) -> bool {
        (22..=256).contains(&self.sid_length)
            && (4..=6).contains(&self.sid_bits_per_character)
            && !self.name.is_empty()
            && !self.name.chars().any(|c| "=,; \t\r\n".contains(c))
    }
}

/// 会话 Cookie 的属性。
#[derive(Debug, Clone, PartialEq)]
pub struct CookieParams {
    /// 有效期（秒），0 表示浏览器会话期间有效
    pub lifetime: u64,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub httponly: bool,
    pub samesite: String,
}

impl Default for CookieParams {
    fn default() -> Self {
        Self {
            lifetime: 0,
            path: "/".to_string(),
            domain: String::new(),
            secure: false,
            httponly: true,
            samesite: "Strict".to_string(),
        }
    }
}

impl CookieParams {
    /// 生成携带会话 ID 的 `Set-Cookie` 值。
    pub fn set_cookie(&self, name: &str, id: &str) -> String {
        let mut cookie = format!("{}={}", name, id);
        if self.lifetime > 0 {
            let expires = now_timestamp() + self.lifetime as i64;
            cookie.push_str(&format!(
                "; Expires={}; Max-Age={}",
                http_date(expires),
                self.lifetime
            ));
        }
        self.push_attributes(&mut cookie);
        cookie
    }

    /// 生成立即过期的 `Set-Cookie` 值。
    pub fn expired_cookie(&self, name: &str) -> String {
        let mut cookie = format!("{}=deleted; Expires={}; Max-Age=0", name, http_date(1));
        self.push_attributes(&mut cookie);
        cookie
    }

    fn push_attributes(&self, cookie: &mut String) {
        if !self.path.is_empty() {
            cookie.push_str(&format!("; Path={}", self.path));
        }
        if !self.domain.is_empty() {
            cookie.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.httponly {
            cookie.push_str("; HttpOnly");
        }
        if !self.samesite.is_empty() {
            cookie.push_str(&format!("; SameSite={}", self.samesite));
        }
    }
}

/// 会话 ID 只允许字母、数字、`,` 与 `-`。
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 256
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ',' || c == '-')
}

#[cfg_attr(test, mockall::automock)]
pub trait SessionStorage {
    /// 挂载存储，载入 `incoming_id` 对应的会话或分配新 ID。失败时返回 `false`。
    fn attach(&mut self, options: &SessionOptions, incoming_id: Option<String>) -> bool;

    /// 当前会话 ID，未挂载时为空串。
    fn current_id(&self) -> String;

    /// 分配新的会话 ID，保留状态并删除旧 ID 的持久化记录。
    fn regenerate_id(&mut self) -> bool;

    fn data(&self) -> &SessionData;

    fn data_mut(&mut self) -> &mut SessionData;

    /// 写回状态并卸载。
    fn write_and_detach(&mut self) -> bool;

    /// 删除指定会话 ID 的持久化记录。
    fn destroy_persisted(&mut self, id: &str) -> bool;

    fn cookie_params(&self) -> CookieParams;

    fn set_cookie_params(&mut self, lifetime: u64, path: &str, domain: &str, secure: bool);

    fn set_save_path(&mut self, path: &Path);

    fn save_path(&self) -> PathBuf;
}

/// 按会话 ID 索引、容量受限的 LRU 会话表。
pub struct SessionStore {
    cache: LruCache<String, SessionData>,
}

impl SessionStore {
    // 根据容量构造
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("调用from_capacity时指定的大小是0。如果需要自动设置大小，请在调用处进行处理，而不是传入0");
        }
        Self {
            cache: LruCache::new(NonZeroUsize::MIN.saturating_add(capacity - 1)),
        }
    }
    // 放入
    pub fn push(&mut self, id: &str, data: SessionData) {
        self.cache.put(id.to_string(), data);
    }
    // 查询
    pub fn find(&mut self, id: &str) -> Option<&SessionData> {
        self.cache.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<SessionData> {
        self.cache.pop(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 调整容量，缩小时淘汰最久未使用的会话。
    pub fn resize(&mut self, capacity: usize) {
        match NonZeroUsize::new(capacity) {
            Some(cap) => self.cache.resize(cap),
            None => warn!("会话表容量不能为0，保持{}", self.capacity()),
        }
    }
}

fn lock(store: &Mutex<SessionStore>) -> MutexGuard<'_, SessionStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("会话表锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

/// 进程内会话存储。
pub struct MemoryStorage {
    store: Arc<Mutex<SessionStore>>,
    current: Option<String>,
    data: SessionData,
    cookie: CookieParams,
    save_path: PathBuf,
    options: SessionOptions,
}

impl MemoryStorage {
    /// 使用进程级共享会话表。
    pub fn shared() -> Self {
        Self::with_store(Arc::clone(&SHARED_SESSIONS))
    }

    /// 使用进程级共享会话表，容量取自配置的 `memory_sessions`。
    pub fn configured(config: &Config) -> Self {
        let mut store = lock(&SHARED_SESSIONS);
        if store.capacity() != config.memory_sessions() {
            debug!("进程内会话表容量调整为{}", config.memory_sessions());
            store.resize(config.memory_sessions());
        }
        drop(store);
        Self::shared()
    }

    /// 使用独立的会话表。
    pub fn from_capacity(capacity: usize) -> Self {
        Self::with_store(Arc::new(Mutex::new(SessionStore::from_capacity(capacity))))
    }

    fn with_store(store: Arc<Mutex<SessionStore>>) -> Self {
        Self {
            store,
            current: None,
            data: SessionData::new(),
            cookie: CookieParams::default(),
            save_path: PathBuf::new(),
            options: SessionOptions::default(),
        }
    }

    /// 共享同一会话表、但尚未挂载的新句柄。
    pub fn handle(&self) -> Self {
        Self::with_store(Arc::clone(&self.store))
    }

    pub fn len(&self) -> usize {
        lock(&self.store).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.store).is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn attach(&mut self, options: &SessionOptions, incoming_id: Option<String>) -> bool {
        if !options.is_valid() {
            error!("会话选项无效：{:?}", options);
            return false;
        }
        self.options = options.clone();
        self.cookie.httponly = options.cookie_httponly;
        self.cookie.samesite = options.cookie_samesite.clone();
        self.cookie.secure |= options.cookie_secure;

        let mut store = lock(&self.store);
        let incoming = incoming_id.filter(|id| is_valid_session_id(id));
        let (id, data) = match incoming {
            Some(id) => match store.find(&id) {
                Some(data) => {
                    let data = data.clone();
                    (id, data)
                }
                None if !options.use_strict_mode => (id, SessionData::new()),
                None => {
                    debug!("未知的会话ID，严格模式下分配新ID");
                    (random_session_id(options.sid_length, options.sid_bits_per_character), SessionData::new())
                }
            },
            None => (
                random_session_id(options.sid_length, options.sid_bits_per_character),
                SessionData::new(),
            ),
        };
        self.current = Some(id);
        self.data = data;
        true
    }

    fn current_id(&self) -> String {
        self.current.clone().unwrap_or_default()
    }

    fn regenerate_id(&mut self) -> bool {
        let Some(old) = self.current.take() else {
            return false;
        };
        lock(&self.store).remove(&old);
        self.current = Some(random_session_id(
            self.options.sid_length,
            self.options.sid_bits_per_character,
        ));
        true
    }

    fn data(&self) -> &SessionData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    fn write_and_detach(&mut self) -> bool {
        let Some(id) = self.current.take() else {
            return false;
        };
        let data = std::mem::take(&mut self.data);
        lock(&self.store).push(&id, data);
        true
    }

    fn destroy_persisted(&mut self, id: &str) -> bool {
        lock(&self.store).remove(id).is_some()
    }

    fn cookie_params(&self) -> CookieParams {
        self.cookie.clone()
    }

    fn set_cookie_params(&mut self, lifetime: u64, path: &str, domain: &str, secure: bool) {
        self.cookie.lifetime = lifetime;
        self.cookie.path = path.to_string();
        self.cookie.domain = domain.to_string();
        self.cookie.secure = secure;
    }

    fn set_save_path(&mut self, path: &Path) {
        self.save_path = path.to_path_buf();
    }

    fn save_path(&self) -> PathBuf {
        self.save_path.clone()
    }
}

/// 每个会话一个 JSON 文件的存储。
pub struct FileStorage {
    save_path: PathBuf,
    current: Option<String>,
    data: SessionData,
    cookie: CookieParams,
    options: SessionOptions,
}

impl FileStorage {
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            current: None,
            data: SessionData::new(),
            cookie: CookieParams::default(),
            options: SessionOptions::default(),
        }
    }

    fn file_of(&self, id: &str) -> PathBuf {
        self.save_path.join(format!("sess_{}", id))
    }

    fn load(&self, id: &str) -> Option<SessionData> {
        let contents = fs::read(self.file_of(id)).ok()?;
        if contents.is_empty() {
            return Some(SessionData::new());
        }
        match serde_json::from_slice(&contents) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("会话文件sess_{}无法解析，视为空会话: {}", id, e);
                Some(SessionData::new())
            }
        }
    }

    fn new_id(&self) -> String {
        random_session_id(self.options.sid_length, self.options.sid_bits_per_character)
    }
}

impl SessionStorage for FileStorage {
    fn attach(&mut self, options: &SessionOptions, incoming_id: Option<String>) -> bool {
        if !options.is_valid() {
            error!("会话选项无效：{:?}", options);
            return false;
        }
        if !self.save_path.is_dir() {
            error!("会话保存路径{}不存在", self.save_path.display());
            return false;
        }
        self.options = options.clone();
        self.cookie.httponly = options.cookie_httponly;
        self.cookie.samesite = options.cookie_samesite.clone();
        self.cookie.secure |= options.cookie_secure;

        let incoming = incoming_id.filter(|id| is_valid_session_id(id));
        let (id, data) = match incoming {
            Some(id) => match self.load(&id) {
                Some(data) => (id, data),
                None if !options.use_strict_mode => (id, SessionData::new()),
                None => (self.new_id(), SessionData::new()),
            },
            None => (self.new_id(), SessionData::new()),
        };
        debug!("会话文件{}已挂载", self.file_of(&id).display());
        self.current = Some(id);
        self.data = data;
        true
    }

    fn current_id(&self) -> String {
        self.current.clone().unwrap_or_default()
    }

    fn regenerate_id(&mut self) -> bool {
        let Some(old) = self.current.take() else {
            return false;
        };
        let old_file = self.file_of(&old);
        if old_file.exists() {
            if let Err(e) = fs::remove_file(&old_file) {
                warn!("无法删除旧会话文件{}: {}", old_file.display(), e);
            }
        }
        self.current = Some(self.new_id());
        true
    }

    fn data(&self) -> &SessionData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    fn write_and_detach(&mut self) -> bool {
        let Some(id) = self.current.take() else {
            return false;
        };
        let data = std::mem::take(&mut self.data);
        let encoded = match serde_json::to_vec(&data) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("会话状态无法序列化: {}", e);
                return false;
            }
        };
        match fs::write(self.file_of(&id), encoded) {
            Ok(()) => true,
            Err(e) => {
                error!("写入会话文件sess_{}时遇到错误: {}", id, e);
                false
            }
        }
    }

    fn destroy_persisted(&mut self, id: &str) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }
        fs::remove_file(self.file_of(id)).is_ok()
    }

    fn cookie_params(&self) -> CookieParams {
        self.cookie.clone()
    }

    fn set_cookie_params(&mut self, lifetime: u64, path: &str, domain: &str, secure: bool) {
        self.cookie.lifetime = lifetime;
        self.cookie.path = path.to_string();
        self.cookie.domain = domain.to_string();
        self.cookie.secure = secure;
    }

    fn set_save_path(&mut self, path: &Path) {
        self.save_path = path.to_path_buf();
    }

    fn save_path(&self) -> PathBuf {
        self.save_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_store_creation() {
        let store = SessionStore::from_capacity(10);
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.len(), 0);
    }

    #[test]
    #[should_panic(expected = "调用from_capacity时指定的大小是0")]
    fn test_store_zero_capacity_panics() {
        SessionStore::from_capacity(0);
    }

    #[test]
    fn test_store_evicts_least_recent() {
        let mut store = SessionStore::from_capacity(2);
        store.push("a", SessionData::new());
        store.push("b", SessionData::new());
        store.find("a");
        store.push("c", SessionData::new());
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }

    #[test]
    fn test_store_resize() {
        let mut store = SessionStore::from_capacity(3);
        for id in ["a", "b", "c"] {
            store.push(id, SessionData::new());
        }
        store.resize(1);
        assert_eq!(store.capacity(), 1);
        assert!(store.contains("c"));
        assert_eq!(store.len(), 1);

        store.resize(0);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn test_configured_storage_uses_memory_sessions() {
        let config: Config = toml::from_str("memory_sessions = 7").unwrap();
        let storage = MemoryStorage::configured(&config);
        assert_eq!(lock(&storage.store).capacity(), 7);
        assert!(Arc::ptr_eq(&storage.store, &*SHARED_SESSIONS));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SessionOptions = toml::from_str("name = \"SID\"\nsid_length = 32").unwrap();
        assert_eq!(options.name, "SID");
        assert_eq!(options.sid_length, 32);
        assert!(options.use_strict_mode);
        assert_eq!(options.cookie_samesite, "Strict");
    }

    #[test]
    fn test_invalid_options_fail_attach() {
        let mut storage = MemoryStorage::from_capacity(4);
        let options = SessionOptions {
            sid_length: 4,
            ..Default::default()
        };
        assert!(!storage.attach(&options, None));
        assert_eq!(storage.current_id(), "");
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let mut storage = MemoryStorage::from_capacity(4);
        let options = SessionOptions::default();
        assert!(storage.attach(&options, None));
        let id = storage.current_id();
        assert_eq!(id.len(), 48);
        storage.data_mut().insert("user".into(), json!("bob"));
        assert!(storage.write_and_detach());

        let mut other = storage.handle();
        assert!(other.attach(&options, Some(id.clone())));
        assert_eq!(other.current_id(), id);
        assert_eq!(other.data().get("user"), Some(&json!("bob")));
    }

    #[test]
    fn test_memory_storage_strict_mode() {
        let mut storage = MemoryStorage::from_capacity(4);
        let options = SessionOptions::default();
        storage.attach(&options, Some("unknownid".into()));
        assert_ne!(storage.current_id(), "unknownid");

        let lax = SessionOptions {
            use_strict_mode: false,
            ..Default::default()
        };
        let mut storage = storage.handle();
        storage.attach(&lax, Some("unknownid".into()));
        assert_eq!(storage.current_id(), "unknownid");
    }

    #[test]
    fn test_memory_storage_regenerate_drops_old() {
        let mut storage = MemoryStorage::from_capacity(4);
        let options = SessionOptions::default();
        storage.attach(&options, None);
        let old = storage.current_id();
        storage.write_and_detach();

        storage.attach(&options, Some(old.clone()));
        storage.data_mut().insert("k".into(), json!(1));
        assert!(storage.regenerate_id());
        assert_ne!(storage.current_id(), old);
        assert_eq!(storage.data().get("k"), Some(&json!(1)));
        assert!(!storage.destroy_persisted(&old));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path());
        let options = SessionOptions::default();
        assert!(storage.attach(&options, None));
        let id = storage.current_id();
        storage.data_mut().insert("n".into(), json!(42));
        assert!(storage.write_and_detach());
        assert!(dir.path().join(format!("sess_{}", id)).exists());

        let mut storage = FileStorage::new(dir.path());
        assert!(storage.attach(&options, Some(id.clone())));
        assert_eq!(storage.data().get("n"), Some(&json!(42)));
        assert!(storage.destroy_persisted(&id));
        assert!(!dir.path().join(format!("sess_{}", id)).exists());
    }

    #[test]
    fn test_file_storage_rejects_traversal_id() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.attach(&SessionOptions::default(), Some("../../etc/passwd".into()));
        assert!(is_valid_session_id(&storage.current_id()));
        assert!(!storage.destroy_persisted("../x"));
    }

    #[test]
    fn test_file_storage_missing_path() {
        let mut storage = FileStorage::new("/nonexistent/session/dir");
        assert!(!storage.attach(&SessionOptions::default(), None));
    }

    #[test]
    fn test_cookie_strings() {
        let params = CookieParams {
            lifetime: 60,
            domain: "example.org".into(),
            secure: true,
            ..Default::default()
        };
        let cookie = params.set_cookie("WSESSID", "abc");
        assert!(cookie.starts_with("WSESSID=abc; Expires="));
        assert!(cookie.contains("; Max-Age=60; Path=/; Domain=example.org; Secure; HttpOnly; SameSite=Strict"));

        let expired = CookieParams::default().expired_cookie("WSESSID");
        assert_eq!(
            expired,
            "WSESSID=deleted; Expires=Thu, 01 Jan 1970 00:00:01 GMT; Max-Age=0; Path=/; HttpOnly; SameSite=Strict"
        );
    }
}
