// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求视图模块
//!
//! 该模块把传输层交来的环境快照（CGI 风格的键值对、Cookie、请求体字节流）
//! 规范化为只读的 `Request` 视图。它涵盖了：
//! 1. 环境值的读取与净化（首次读取后缓存）。
//! 2. 标头的推导与名称规范化。
//! 3. 请求方法的解析，包括 `_method` 参数与 `X-Http-Method-Override` 覆盖。
//! 4. 查询参数与请求体参数（JSON / 表单 / 原生表）的惰性解析。
//! 5. 浏览器、操作系统、客户端 IP 等启发式信息。
//!
//! 所有派生字段都遵循“计算一次、永久缓存”的约定，因此 `Request` 以 `&self`
//! 对外提供全部读取操作，并通过 `Rc` 在 `Response` 与 `Session` 之间共享。

use std::{
    cell::{OnceCell, RefCell},
    collections::{BTreeMap, HashMap},
    fmt,
    io::{self, Read},
    net::IpAddr,
};

use bytes::Bytes;
use lazy_static::lazy_static;
use log::{debug, error, warn};
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    exception::Exception,
    header::{canonical_name, HeaderStore},
    param::*,
    util::escape_special_chars,
};

lazy_static! {
    static ref CHARSET: Regex = Regex::new(r"(?i)charset\s*=([^;]+)").unwrap();
}

/// 读取环境值时使用的过滤器。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// 转义 `&`、`<`、`>`，引号保持原样（默认过滤器）。
    SpecialChars,
    /// 原样返回。
    Raw,
    /// 仅当值是合法 IP 地址时返回，可排除私有与保留地址段。
    ValidateIp { no_private: bool, no_reserved: bool },
}

impl Filter {
    fn apply(&self, value: &str) -> Option<String> {
        match *self {
            Filter::SpecialChars => Some(escape_special_chars(value)),
            Filter::Raw => Some(value.to_string()),
            Filter::ValidateIp {
                no_private,
                no_reserved,
            } => {
                let ip: IpAddr = value.trim().parse().ok()?;
                if (no_private && is_private_ip(&ip)) || (no_reserved && is_reserved_ip(&ip)) {
                    return None;
                }
                Some(ip.to_string())
            }
        }
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_reserved_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let first = v4.octets()[0];
            first == 0 || v4.is_loopback() || v4.is_link_local() || first >= 240
        }
        IpAddr::V6(v6) => {
            v6.is_unspecified()
                || v6.is_loopback()
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some()
        }
    }
}

/// 传输层提供的不可变环境快照。
///
/// 包含 CGI 风格的环境值、Cookie、原生解析好的查询/请求体参数表，
/// 以及只能读取一次的请求体字节流。
pub struct Environment {
    vars: BTreeMap<String, String>,
    cookies: HashMap<String, String>,
    native_query: Map<String, Value>,
    native_post: Map<String, Value>,
    body: Option<Box<dyn Read>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
            cookies: HashMap::new(),
            native_query: Map::new(),
            native_post: Map::new(),
            body: None,
        }
    }

    /// 从当前进程构建环境（CGI 调用）：环境变量、`HTTP_COOKIE` 与标准输入。
    pub fn from_process() -> Self {
        let mut env = Self::new().with_vars(std::env::vars());
        if let Some(cookie) = env.vars.get("HTTP_COOKIE").cloned() {
            env.cookies = parse_cookie_header(&cookie);
        }
        let length = env
            .vars
            .get("CONTENT_LENGTH")
            .and_then(|l| l.trim().parse::<u64>().ok());
        env.body = Some(match length {
            Some(length) => Box::new(io::stdin().take(length)),
            None => Box::new(io::stdin()),
        });
        env
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_body_reader(Box::new(io::Cursor::new(body.into())))
    }

    pub fn with_body_reader(mut self, reader: Box<dyn Read>) -> Self {
        self.body = Some(reader);
        self
    }

    pub fn with_native_query(mut self, params: Map<String, Value>) -> Self {
        self.native_query = params;
        self
    }

    pub fn with_native_post(mut self, params: Map<String, Value>) -> Self {
        self.native_post = params;
        self
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析 `Cookie` 标头（`a=1; b=2`）。
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// 一次 HTTP 交换的请求视图。
pub struct Request {
    /// 全局请求 ID，用于日志追踪
    id: u128,
    vars: BTreeMap<String, String>,
    cookies: HashMap<String, String>,
    native_query: Map<String, Value>,
    native_post: Map<String, Value>,
    body: RefCell<Option<Box<dyn Read>>>,
    raw_body: OnceCell<Bytes>,
    /// 已读取（并过滤）的环境值，包括不存在的键
    server_cache: RefCell<HashMap<String, Option<String>>>,
    /// `header()` 已读取过的标头，键为规范化名称
    header_cache: RefCell<HashMap<String, String>>,
    headers: OnceCell<HeaderStore>,
    method: OnceCell<String>,
    query_params: OnceCell<Map<String, Value>>,
    body_params: OnceCell<Map<String, Value>>,
}

impl Request {
    pub fn new(id: u128, env: Environment) -> Self {
        debug!("[ID{}]请求视图已创建，环境值{}项", id, env.vars.len());
        Self {
            id,
            vars: env.vars,
            cookies: env.cookies,
            native_query: env.native_query,
            native_post: env.native_post,
            body: RefCell::new(env.body),
            raw_body: OnceCell::new(),
            server_cache: RefCell::new(HashMap::new()),
            header_cache: RefCell::new(HashMap::new()),
            headers: OnceCell::new(),
            method: OnceCell::new(),
            query_params: OnceCell::new(),
            body_params: OnceCell::new(),
        }
    }

    /// 从原始 HTTP/1.x 报文构建请求（直接调用模式）。
    ///
    /// # 逻辑步骤
    /// 1. 以空行切分报文头与请求体，报文头必须是合法的 UTF-8。
    /// 2. 解析请求行，得到 `REQUEST_METHOD`、`REQUEST_URI`、`QUERY_STRING`、`SERVER_PROTOCOL`。
    /// 3. 把每个标头转换为 CGI 键（`HTTP_*`，`CONTENT_TYPE` 与 `CONTENT_LENGTH` 除外）。
    /// 4. 剩余字节作为请求体，若声明了 `Content-Length` 则按其截断。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let separator = buffer.windows(4).position(|w| w == b"\r\n\r\n");
        let (head, body) = match separator {
            Some(pos) => (&buffer[..pos], &buffer[pos + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };
        let head = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequestLine);
        }

        let version = match parts[parts.len() - 1].to_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能包含空格，虽然不规范但通过 join 尝试恢复
        let uri = parts[1..parts.len() - 1].join(" ");
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (uri.clone(), String::new()),
        };

        let mut env = Environment::new()
            .with_var("REQUEST_METHOD", &parts[0].to_uppercase())
            .with_var("REQUEST_URI", &uri)
            .with_var("SCRIPT_NAME", &path)
            .with_var("QUERY_STRING", &query)
            .with_var("SERVER_PROTOCOL", &version.to_string());

        let mut content_length = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            let key = name.trim().to_uppercase().replace('-', "_");
            match key.as_str() {
                "CONTENT_TYPE" => env = env.with_var("CONTENT_TYPE", value),
                "CONTENT_LENGTH" => {
                    content_length = value.parse::<usize>().ok();
                    env = env.with_var("CONTENT_LENGTH", value);
                }
                _ => {
                    if key == "COOKIE" {
                        env.cookies.extend(parse_cookie_header(value));
                    }
                    if key == "HOST" {
                        let (server_name, port) = split_host(value);
                        env = env.with_var("SERVER_NAME", &server_name);
                        if let Some(port) = port {
                            env = env.with_var("SERVER_PORT", &port);
                        }
                    }
                    env = env.with_var(&format!("HTTP_{}", key), value);
                }
            }
        }

        let body = match content_length {
            Some(length) if length < body.len() => &body[..length],
            _ => body,
        };
        debug!("[ID{}]报文解析完毕，请求体{}字节", id, body.len());

        Ok(Self::new(id, env.with_body(body.to_vec())))
    }

    pub fn id(&self) -> u128 {
        self.id
    }
}

fn split_host(host: &str) -> (String, Option<String>) {
    if host.starts_with('[') {
        return match host.split_once(']') {
            Some((addr, rest)) => (
                format!("{}]", addr),
                rest.strip_prefix(':').map(|p| p.to_string()),
            ),
            None => (host.to_string(), None),
        };
    }
    match host.split_once(':') {
        Some((name, port)) => (name.to_string(), Some(port.to_string())),
        None => (host.to_string(), None),
    }
}

/// 把传输层键（如 `HTTP_ACCEPT_LANGUAGE`）规范化为标头名（`Accept-Language`）。
pub fn normalize_header_name(key: &str) -> String {
    let lower = key.to_lowercase();
    let stripped = lower
        .strip_prefix("http_")
        .or_else(|| lower.strip_prefix("http-"))
        .unwrap_or(&lower);
    canonical_name(stripped)
}

/// 把标头名映射为传输层键。
fn transport_key(name: &str) -> String {
    let key = name.trim().to_uppercase().replace('-', "_");
    if name.starts_with("X_") || key.starts_with("HTTP_") || SPECIAL_HEADERS.contains(&key.as_str()) {
        key
    } else {
        format!("HTTP_{}", key)
    }
}

fn is_header_key(key: &str) -> bool {
    key.starts_with("HTTP_") || key.starts_with("X_") || SPECIAL_HEADERS.contains(&key)
}

// --- 环境值与标头 ---

impl Request {
    /// 以默认过滤器读取环境值。
    pub fn server(&self, key: &str) -> Option<String> {
        self.server_filtered(key, None, Filter::SpecialChars)
    }

    pub fn server_or(&self, key: &str, default: &str) -> String {
        self.server_filtered(key, Some(default), Filter::SpecialChars)
            .unwrap_or_else(|| default.to_string())
    }

    /// 读取环境值并应用过滤器。
    ///
    /// 每个键只过滤一次：首次读取的结果（包括“不存在”）会被缓存，
    /// 之后即使换用其他过滤器，也返回首次缓存的值。
    pub fn server_filtered(&self, key: &str, default: Option<&str>, filter: Filter) -> Option<String> {
        if let Some(cached) = self.server_cache.borrow().get(key) {
            return cached.clone().or_else(|| default.map(String::from));
        }
        let value = self.vars.get(key).and_then(|v| filter.apply(v));
        debug!("[ID{}]环境值{}首次读取，过滤器{:?}", self.id, key, filter);
        self.server_cache
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        value.or_else(|| default.map(String::from))
    }

    /// 读取单个请求标头。名称大小写与分隔符风格不敏感。
    ///
    /// 空值视为不存在。
    pub fn header(&self, name: &str) -> Option<String> {
        let canonical = canonical_name(name);
        if let Some(value) = self.header_cache.borrow().get(&canonical) {
            return Some(value.clone());
        }
        let value = self.server(&transport_key(name)).filter(|v| !v.is_empty())?;
        self.header_cache
            .borrow_mut()
            .insert(canonical, value.clone());
        Some(value)
    }

    pub fn header_or(&self, name: &str, default: &str) -> String {
        self.header(name).unwrap_or_else(|| default.to_string())
    }

    /// 推导全部请求标头。整体只推导一次，之后原样返回。
    pub fn headers(&self) -> &HeaderStore {
        self.headers.get_or_init(|| {
            let mut store = HeaderStore::new();
            for key in self.vars.keys().filter(|k| is_header_key(k)) {
                if let Some(value) = self.server(key) {
                    store.set(&normalize_header_name(key), &value, true);
                }
            }
            debug!("[ID{}]标头推导完毕，共{}项", self.id, store.len());
            store
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|c| c.as_str())
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// 请求体原始字节。输入流只读取一次，之后返回缓存。
    pub fn raw_input(&self) -> &Bytes {
        self.raw_body.get_or_init(|| {
            let mut contents = Vec::new();
            if let Some(mut reader) = self.body.borrow_mut().take() {
                if let Err(e) = reader.read_to_end(&mut contents) {
                    error!("[ID{}]读取请求体时遇到错误: {}", self.id, e);
                    contents.clear();
                }
            }
            debug!("[ID{}]请求体读取完毕，{}字节", self.id, contents.len());
            Bytes::from(contents)
        })
    }
}

// --- 请求方法 ---

impl Request {
    /// 当前请求方法，可被覆盖。
    ///
    /// 解析顺序：传输层 `REQUEST_METHOD`（默认 `GET`），请求体参数 `_method`，
    /// 然后是 `X-Http-Method-Override` 标头。结果转为大写后永久缓存。
    pub fn method(&self) -> &str {
        self.method.get_or_init(|| {
            let original = self.original_method();
            let overridden = match self.post_params().get("_method") {
                Some(Value::String(m)) if !m.is_empty() => Some(escape_special_chars(m)),
                _ => self.header("X-Http-Method-Override"),
            };
            let method = overridden.unwrap_or(original).to_uppercase();
            debug!("[ID{}]请求方法解析为{}", self.id, method);
            method
        })
    }

    /// 传输层实际收到的方法，忽略任何覆盖。
    pub fn original_method(&self) -> String {
        self.server_or("REQUEST_METHOD", "GET").to_uppercase()
    }

    /// 原始方法是 POST、但被覆盖为 GET。
    pub fn is_get_over_post(&self) -> bool {
        self.method() == "GET" && self.original_method() == "POST"
    }

    pub fn is_get(&self) -> bool {
        self.method() == "GET"
    }

    pub fn is_head(&self) -> bool {
        self.method() == "HEAD"
    }

    pub fn is_post(&self) -> bool {
        self.method() == "POST"
    }

    pub fn is_put(&self) -> bool {
        self.method() == "PUT"
    }

    pub fn is_patch(&self) -> bool {
        self.method() == "PATCH"
    }

    pub fn is_delete(&self) -> bool {
        self.method() == "DELETE"
    }

    pub fn is_options(&self) -> bool {
        self.method() == "OPTIONS"
    }
}

// --- 参数 ---

impl Request {
    /// 查询字符串参数（不考虑方法覆盖）。
    pub fn query_params(&self) -> &Map<String, Value> {
        self.query_params.get_or_init(|| match self.vars.get("QUERY_STRING") {
            Some(query) => parse_form(query),
            None => self.native_query.clone(),
        })
    }

    /// 请求体参数。
    ///
    /// `Content-Type` 含 `/json` 且请求体非空时按 JSON 解析；
    /// 表单提交时按 URL 编码解析；否则回退到传输层的原生参数表。
    /// 无法解析的 JSON 得到空表。
    pub fn post_params(&self) -> &Map<String, Value> {
        self.body_params.get_or_init(|| {
            let raw = self.raw_input();
            if self.is_json() && !raw.is_empty() {
                return match serde_json::from_slice::<Value>(raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(Value::Array(items)) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                    Ok(other) => {
                        warn!("[ID{}]JSON请求体不是对象或数组：{}", self.id, other);
                        Map::new()
                    }
                    Err(e) => {
                        warn!("[ID{}]无法解析JSON请求体: {}", self.id, e);
                        Map::new()
                    }
                };
            }
            if self.is_form_data() {
                return parse_form(&String::from_utf8_lossy(raw));
            }
            self.native_post.clone()
        })
    }

    /// 查询参数。GET-over-POST 时与 `inputs()` 等价。
    pub fn get(&self, key: &str) -> Option<&Value> {
        if self.is_get_over_post() {
            return self.inputs(key);
        }
        self.query_params().get(key)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// 全部查询参数。GET-over-POST 时与 `all_inputs()` 等价。
    pub fn get_all(&self) -> Map<String, Value> {
        if self.is_get_over_post() {
            return self.all_inputs();
        }
        self.query_params().clone()
    }

    pub fn post(&self, key: &str) -> Option<&Value> {
        self.post_params().get(key)
    }

    pub fn post_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.post(key).unwrap_or(default)
    }

    /// 先查查询参数，再查请求体参数。
    pub fn inputs(&self, key: &str) -> Option<&Value> {
        match self.query_params().get(key) {
            Some(Value::Null) | None => self.post_params().get(key),
            found => found,
        }
    }

    /// 查询参数与请求体参数合并，同名时查询参数优先。
    pub fn all_inputs(&self) -> Map<String, Value> {
        let mut merged = self.post_params().clone();
        for (k, v) in self.query_params() {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    pub fn has_get(&self, key: &str) -> bool {
        self.query_params().contains_key(key)
    }

    pub fn has_post(&self, key: &str) -> bool {
        self.post_params().contains_key(key)
    }
}

/// 解析 URL 编码的键值串，支持 `a[]=1&a[]=2`、`user[name]=x` 形式的嵌套键。
pub fn parse_form(input: &str) -> Map<String, Value> {
    let mut root = Value::Object(Map::new());
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let segments = split_key(&key);
        if segments.len() > MAX_INPUT_NESTING + 1 {
            warn!("表单键嵌套超过{}层，已丢弃: {:.32}...", MAX_INPUT_NESTING, key);
            continue;
        }
        assign(&mut root, &segments, value.into_owned());
    }
    match root {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, into_lists(v))).collect(),
        _ => Map::new(),
    }
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return vec![key.to_string()];
    };
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                segments.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            None => return vec![key.to_string()],
        }
    }
    segments
}

fn assign(slot: &mut Value, segments: &[String], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = Value::String(value);
        return;
    };
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        let key = if head.is_empty() {
            map.keys()
                .filter_map(|k| k.parse::<usize>().ok())
                .map(|n| n + 1)
                .max()
                .unwrap_or(0)
                .to_string()
        } else {
            head.clone()
        };
        assign(map.entry(key).or_insert(Value::Null), rest, value);
    }
}

/// 键恰好为 `0..n` 的对象转换为数组。
fn into_lists(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut indexed: Vec<(usize, Value)> = Vec::with_capacity(map.len());
    let mut is_list = true;
    let len = map.len();
    let mut converted = Map::new();
    for (k, v) in map {
        let v = into_lists(v);
        match k.parse::<usize>() {
            Ok(i) if i < len && is_list => indexed.push((i, v.clone())),
            _ => is_list = false,
        }
        converted.insert(k, v);
    }
    if is_list && indexed.len() == len {
        indexed.sort_by_key(|(i, _)| *i);
        Value::Array(indexed.into_iter().map(|(_, v)| v).collect())
    } else {
        Value::Object(converted)
    }
}

// --- 内容协商与客户端信息 ---

impl Request {
    pub fn content_type(&self) -> String {
        self.header_or("Content-Type", "")
    }

    pub fn content_length(&self) -> u64 {
        self.header("Content-Length")
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn content_charset(&self) -> String {
        let content_type = self.content_type();
        match CHARSET.captures(&content_type) {
            Some(caps) => caps[1].trim().to_string(),
            None => String::new(),
        }
    }

    pub fn accept_encoding(&self) -> String {
        self.header_or("Accept-Encoding", "")
    }

    pub fn referer(&self) -> String {
        self.header_or("Referer", "")
    }

    pub fn user_agent(&self) -> String {
        self.header_or("User-Agent", "")
    }

    /// 表单提交：POST 且未声明类型，或类型为 `application/x-www-form-urlencoded`。
    pub fn is_form_data(&self) -> bool {
        let content_type = self.content_type().to_lowercase();
        (self.original_method() == "POST" && content_type.is_empty())
            || content_type.contains("application/x-www-form-urlencoded")
    }

    pub fn is_json(&self) -> bool {
        self.content_type().to_lowercase().contains("/json")
    }

    /// 调用方是否期望 JSON 响应。
    pub fn wants_json(&self) -> bool {
        self.header_or("Accept", "")
            .to_lowercase()
            .starts_with("application/json")
    }

    pub fn is_ajax(&self) -> bool {
        self.header("X-Requested-With").as_deref() == Some("XMLHttpRequest")
    }

    /// `Host` 标头去掉端口部分，缺失时使用 `SERVER_NAME`。
    pub fn host(&self) -> String {
        match self.header("Host") {
            Some(host) => split_host(&host).0,
            None => self.server_or("SERVER_NAME", ""),
        }
    }

    pub fn port(&self) -> u16 {
        self.server("SERVER_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0)
    }

    /// 客户端 IP：依次检查代理相关键与 `REMOTE_ADDR`，只接受公网地址。
    pub fn ip(&self) -> String {
        const KEYS: [&str; 7] = [
            "HTTP_CLIENT_IP",
            "HTTP_X_FORWARDED_FOR",
            "HTTP_X_FORWARDED",
            "HTTP_X_CLUSTER_CLIENT_IP",
            "HTTP_FORWARDED_FOR",
            "HTTP_FORWARDED",
            "REMOTE_ADDR",
        ];
        let filter = Filter::ValidateIp {
            no_private: true,
            no_reserved: true,
        };
        KEYS.iter()
            .find_map(|key| self.server_filtered(key, None, filter))
            .unwrap_or_default()
    }

    pub fn path_info(&self) -> String {
        self.server_or("PATH_INFO", "")
    }

    pub fn query_string(&self) -> String {
        self.server_or("QUERY_STRING", "")
    }

    pub fn request_uri(&self) -> String {
        self.server_or("REQUEST_URI", "")
    }

    pub fn script_name(&self) -> String {
        self.server_or("SCRIPT_NAME", "")
    }

    pub fn scheme(&self) -> &'static str {
        match self.vars.get("HTTPS").map(|s| s.as_str()) {
            None | Some("") | Some("off") => "http",
            Some(_) => "https",
        }
    }

    /// 根据 `User-Agent` 猜测浏览器，无法识别时返回空串。
    pub fn browser(&self) -> String {
        let ua = self.user_agent().to_lowercase();
        let browser = if ua.contains("opera") {
            if ua.contains("mini") {
                "Opera Mini"
            } else {
                "Opera"
            }
        } else if ua.contains("chrome") {
            "Chrome"
        } else if ua.contains("iphone") {
            "iPhone"
        } else if ua.contains("safari") {
            "Safari"
        } else if ua.contains("firefox") {
            "Firefox"
        } else if ua.contains("msie") {
            "MSIE"
        } else {
            ""
        };
        browser.to_string()
    }

    /// 根据 `User-Agent` 猜测操作系统，无法识别时返回空串。
    pub fn os(&self) -> String {
        let ua = self.user_agent();
        // 桌面系统按原始大小写匹配
        for (needle, os) in [("Win", "Windows"), ("Linux", "Linux"), ("Mac", "Macintosh")] {
            if ua.contains(needle) {
                return os.to_string();
            }
        }
        let ua = ua.to_lowercase();
        const MOBILE_AND_OTHERS: [(&str, &str); 14] = [
            ("iphone", "iPhone"),
            ("ipad", "iPad"),
            ("android", "Android"),
            ("blackberry", "Blackberry"),
            ("palm", "Palm"),
            ("ipod", "iPod"),
            ("freebsd", "FreeBSD"),
            ("openbsd", "OpenBSD"),
            ("netbsd", "NetBSD"),
            ("os/2", "OS/2"),
            ("sunos", "Sunos"),
            ("beos", "Beos"),
            ("aix", "Aix"),
            ("qnx", "QNX"),
        ];
        MOBILE_AND_OTHERS
            .iter()
            .find(|(needle, _)| ua.contains(needle))
            .map(|(_, os)| os.to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("vars", &self.vars)
            .field("cookies", &self.cookies)
            .field("method", &self.method.get())
            .finish_non_exhaustive()
    }
}
