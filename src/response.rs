// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! `Response` 负责累积状态码、标头与响应体，并在最后通过 `Transport` 序列化输出。
//!
//! ## 输出格式
//! 状态行以 CRLF 结尾；每个标头行以 LF 结尾（旧格式）；标头块以 CRLF 结束。
//! 多值标头在存储时以换行连接，发送时拆分为重复的标头行。
//!
//! ## 条件请求
//! `set_last_modified` 在 GET 请求的 `If-Modified-Since` 与给定时间完全一致时，
//! 直接以 304 发送响应。

use std::{
    fmt,
    io::{self, Write},
    rc::Rc,
};

use log::{debug, error, info};
use serde::Serialize;

use crate::{
    body::ResponseBody,
    header::HeaderStore,
    param::*,
    request::Request,
    transport::Transport,
    util::{http_date, parse_http_date},
};

pub struct Response {
    request: Rc<Request>,
    transport: Box<dyn Transport>,
    status_code: u16,
    headers: HeaderStore,
    body: ResponseBody,
    /// HEAD 请求在预处理时记录的截断前长度
    head_length: Option<u64>,
    sent: bool,
}

impl Response {
    pub fn new(request: Rc<Request>, transport: impl Transport + 'static) -> Self {
        Self {
            request,
            transport: Box::new(transport),
            status_code: 200,
            headers: HeaderStore::new(),
            body: ResponseBody::new(),
            head_length: None,
            sent: false,
        }
    }

    /// 设置响应体转存到临时文件前的内存上限，已写入的内容会被丢弃。
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body = ResponseBody::with_threshold(limit);
        self
    }

    pub fn request(&self) -> &Rc<Request> {
        &self.request
    }

    fn id(&self) -> u128 {
        self.request.id()
    }
}

// --- 状态与标头 ---

impl Response {
    /// 设置状态码，0 被忽略。
    pub fn set_status(&mut self, code: u16) -> &mut Self {
        if code > 0 {
            self.status_code = code;
        } else {
            debug!("[ID{}]忽略无效的状态码{}", self.id(), code);
        }
        self
    }

    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// 例如 `HTTP/1.1 404 Not Found`，未知状态码使用 500 的原因短语。
    pub fn status_line(&self) -> String {
        format!(
            "{} {} {}",
            HttpVersion::V1_1,
            self.status_code,
            reason_phrase(self.status_code)
        )
    }

    pub fn set_header(&mut self, name: &str, value: &str, overwrite: bool) -> &mut Self {
        if !self.headers.set(name, value, overwrite) {
            debug!("[ID{}]标头{}已存在，保持原值", self.id(), name);
        }
        self
    }

    /// 仅在标头不存在时写入。
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_header(name, value, false)
    }

    /// 为同名标头追加一个值，发送时输出为多行。
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    pub fn set_headers<I, K, V>(&mut self, headers: I, overwrite: bool) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.set_header(name.as_ref(), value.as_ref(), overwrite);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    pub fn headers(&self) -> &HeaderStore {
        &self.headers
    }

    /// 追加一条 `Set-Cookie`。
    pub fn add_cookie(&mut self, set_cookie: &str) -> &mut Self {
        self.append_header("Set-Cookie", set_cookie)
    }

    pub fn set_expires(&mut self, timestamp: i64) -> &mut Self {
        self.set_header("Expires", &http_date(timestamp), true)
    }

    /// 设置 `Last-Modified`。
    ///
    /// 若请求为 GET 且 `If-Modified-Since` 与 `timestamp` 完全一致，
    /// 立即以 304 发送响应并返回 `Ok(true)`，调用方不应再修改此响应。
    pub fn set_last_modified(&mut self, timestamp: i64) -> io::Result<bool> {
        self.set_header("Last-Modified", &http_date(timestamp), true);
        if self.request.method() != "GET" {
            return Ok(false);
        }
        let since = self
            .request
            .header("If-Modified-Since")
            .and_then(|s| parse_http_date(&s));
        if since == Some(timestamp) {
            debug!("[ID{}]资源未修改，返回304", self.id());
            self.set_status(304);
            self.body.clear();
            self.send()?;
            return Ok(true);
        }
        Ok(false)
    }
}

// --- 响应体 ---

impl Response {
    /// 追加响应体内容。
    pub fn push(&mut self, content: impl AsRef<[u8]>) -> &mut Self {
        if let Err(e) = self.body.append(content.as_ref()) {
            error!("[ID{}]写入响应体时遇到错误: {}", self.id(), e);
        }
        self
    }

    /// 替换响应体内容。
    pub fn replace(&mut self, content: impl AsRef<[u8]>) -> &mut Self {
        self.body.clear();
        self.head_length = None;
        self.push(content)
    }

    pub fn body_len(&self) -> u64 {
        self.body.len()
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn body_bytes(&mut self) -> io::Result<Vec<u8>> {
        self.body.read_all()
    }

    /// 响应体是否已转存到临时文件。
    pub fn is_body_spilled(&self) -> bool {
        self.body.is_spilled()
    }

    /// 设置 HTML 内容，不会自动发送。
    pub fn html(&mut self, content: &str, code: u16) -> &mut Self {
        self.set_status(code)
            .add_header("Content-Type", "text/html")
            .replace(content)
    }

    /// 把 `data` 编码为紧凑的 JSON 作为响应体，不会自动发送。
    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T, code: u16) -> serde_json::Result<&mut Self> {
        let encoded = serde_json::to_vec(data)?;
        Ok(self
            .set_status(code)
            .add_header("Content-Type", "application/json")
            .replace(encoded))
    }
}

// --- 发送 ---

/// 把 `Transport` 的响应体写入接口适配为 `io::Write`。
struct BodySink<'a>(&'a mut dyn Transport);

impl Write for BodySink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_body(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Response {
    /// 发送前的规范化。
    ///
    /// 1. 未设置 `Content-Type` 时采用请求 `Accept` 的第一项，缺省为 `text/html`。
    /// 2. HEAD 请求丢弃响应体，但 `Content-Length` 仍报告截断前的长度。
    /// 3. 其他请求的 `Content-Length` 始终按响应体实际长度计算。
    pub fn preheat(&mut self) -> &mut Self {
        if !self.headers.contains("Content-Type") {
            let accept = self.request.header_or("Accept", "");
            let first = accept.split(',').next().unwrap_or("").trim();
            let content_type = if first.is_empty() { "text/html" } else { first };
            self.headers.set("Content-Type", content_type, false);
        }

        let length = if self.request.is_head() {
            // 每次预处理都会清空响应体，累计此前丢弃的字节
            let length = self.head_length.unwrap_or(0) + self.body.len();
            self.head_length = Some(length);
            self.body.clear();
            length
        } else {
            self.body.len()
        };
        self.headers
            .set("Content-Length", &length.to_string(), true);
        debug!("[ID{}]预处理完毕，Content-Length: {}", self.id(), length);
        self
    }

    /// 写出状态行与全部标头。宿主已写出标头时不做任何事。
    pub fn send_headers(&mut self) -> io::Result<()> {
        if self.transport.headers_sent() {
            debug!("[ID{}]标头已由传输层发送，跳过", self.id());
            return Ok(());
        }
        self.transport
            .write_status(self.status_code, reason_phrase(self.status_code))?;
        for (name, value) in self.headers.lines() {
            self.transport.write_header(name, value)?;
        }
        self.transport.end_headers()
    }

    /// 从头写出响应体。
    pub fn send_body(&mut self) -> io::Result<()> {
        let mut sink = BodySink(self.transport.as_mut());
        let written = self.body.copy_to(&mut sink)?;
        debug!("[ID{}]响应体已写出{}字节", self.request.id(), written);
        self.transport.flush()
    }

    pub fn send(&mut self) -> io::Result<()> {
        self.preheat();
        self.send_headers()?;
        self.send_body()?;
        self.sent = true;
        info!(
            "[ID{}]{} {} -> {}",
            self.id(),
            self.request.method(),
            self.request.request_uri(),
            self.status_code
        );
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// 设置状态码（可选），缺省 `Content-Type: text/html`，追加内容后立即发送。
    pub fn flush(&mut self, content: impl AsRef<[u8]>, code: Option<u16>) -> io::Result<()> {
        if let Some(code) = code {
            self.set_status(code);
        }
        self.add_header("Content-Type", "text/html").push(content);
        self.send()
    }

    /// 307 临时重定向并立即发送。
    pub fn redirect(&mut self, url: &str) -> io::Result<()> {
        self.redirect_with(url, 307)
    }

    pub fn redirect_with(&mut self, url: &str, code: u16) -> io::Result<()> {
        self.set_status(code).set_header("Location", url, true);
        self.send()
    }

    /// 按旧格式序列化当前状态：状态行 CRLF，标头行 LF，CRLF，响应体。
    pub fn as_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.status_line().as_bytes());
        bytes.extend_from_slice(CRLF.as_bytes());
        for (name, value) in self.headers.lines() {
            bytes.extend_from_slice(format!("{}: {}{}", name, value, LF).as_bytes());
        }
        bytes.extend_from_slice(CRLF.as_bytes());
        bytes.extend_from_slice(&self.body.read_all()?);
        Ok(bytes)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{request::Environment, transport::MemoryTransport, util::http_date};
    use serde_json::{json, Value};

    fn response_for(vars: &[(&str, &str)]) -> (Response, MemoryTransport) {
        let request = Rc::new(Request::new(
            0,
            Environment::new().with_vars(vars.iter().copied()),
        ));
        let transport = MemoryTransport::new();
        (Response::new(request, transport.clone()), transport)
    }

    #[test]
    fn test_response_new() {
        let (response, _) = response_for(&[]);
        assert_eq!(response.status(), 200);
        assert!(response.headers().is_empty());
        assert!(!response.has_body());
        assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
    }

    #[test]
    fn test_set_status_ignores_zero() {
        let (mut response, _) = response_for(&[]);
        response.set_status(404).set_status(0);
        assert_eq!(response.status(), 404);
    }

    #[test]
    fn test_unknown_status_uses_500_phrase() {
        let (mut response, _) = response_for(&[]);
        response.set_status(599);
        assert_eq!(response.status_line(), "HTTP/1.1 599 Internal Server Error");
    }

    #[test]
    fn test_header_name_styles_share_entry() {
        let (mut response, _) = response_for(&[]);
        response.set_header("content_type", "text/plain", true);
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/plain"));
        response.add_header("Content-Type", "text/html");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_preheat_computes_length() {
        let (mut response, _) = response_for(&[]);
        response.push("<h1>Hi</h1>").preheat();
        assert_eq!(response.header("Content-Length"), Some("11"));
        assert_eq!(response.header("Content-Type"), Some("text/html"));
    }

    /// 调用方写入的长度不被信任
    #[test]
    fn test_preheat_overrides_explicit_length() {
        let (mut response, _) = response_for(&[]);
        response.set_header("Content-Length", "999", true).push("abc").preheat();
        assert_eq!(response.header("Content-Length"), Some("3"));
    }

    #[test]
    fn test_preheat_adopts_accept() {
        let (mut response, _) = response_for(&[("HTTP_ACCEPT", "application/xml, text/html")]);
        response.preheat();
        assert_eq!(response.header("Content-Type"), Some("application/xml"));
    }

    #[test]
    fn test_preheat_head_request() {
        let (mut response, transport) = response_for(&[("REQUEST_METHOD", "HEAD")]);
        response.push("<h1>Hi</h1>").preheat();
        assert!(!response.has_body());
        assert_eq!(response.header("Content-Length"), Some("11"));

        response.preheat();
        assert_eq!(response.header("Content-Length"), Some("11"));

        response.send().unwrap();
        let captured = transport.captured();
        assert_eq!(captured.header("Content-Length"), Some("11"));
        assert!(captured.body.is_empty());
    }

    #[test]
    fn test_head_length_counts_late_push() {
        let (mut response, transport) = response_for(&[("REQUEST_METHOD", "HEAD")]);
        response.push("abc").preheat();
        response.push("defgh");
        response.send().unwrap();
        assert_eq!(transport.captured().header("Content-Length"), Some("8"));
    }

    #[test]
    fn test_head_length_reset_by_replace() {
        let (mut response, _) = response_for(&[("REQUEST_METHOD", "HEAD")]);
        response.push("abcdef").preheat();
        response.replace("xy").preheat();
        assert_eq!(response.header("Content-Length"), Some("2"));
    }

    #[test]
    fn test_send_splits_multi_value_headers() {
        let (mut response, transport) = response_for(&[]);
        response
            .add_cookie("a=1; Path=/")
            .add_cookie("b=2; Path=/")
            .push("ok");
        response.send().unwrap();

        let captured = transport.captured();
        assert_eq!(captured.status, Some((200, "OK".to_string())));
        assert_eq!(captured.header_count("Set-Cookie"), 2);
        assert_eq!(captured.body, b"ok");
        assert!(response.is_sent());
    }

    #[test]
    fn test_send_headers_skipped_when_already_sent() {
        let request = Rc::new(Request::new(0, Environment::new()));
        let transport = MemoryTransport::with_headers_sent();
        let mut response = Response::new(request, transport.clone());
        response.push("body").send().unwrap();

        let captured = transport.captured();
        assert_eq!(captured.status, None);
        assert!(captured.headers.is_empty());
        assert_eq!(captured.body, b"body");
    }

    #[test]
    fn test_last_modified_not_modified() {
        let ts = 784111777;
        let (mut response, transport) =
            response_for(&[("HTTP_IF_MODIFIED_SINCE", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        assert!(response.set_last_modified(ts).unwrap());
        assert_eq!(response.status(), 304);
        assert!(response.is_sent());
        assert_eq!(transport.captured().status, Some((304, "Not Modified".to_string())));
    }

    #[test]
    fn test_last_modified_changed() {
        let (mut response, transport) =
            response_for(&[("HTTP_IF_MODIFIED_SINCE", "Sun, 06 Nov 1994 08:49:37 GMT")]);
        assert!(!response.set_last_modified(784111778).unwrap());
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("Last-Modified"), Some(http_date(784111778).as_str()));
        assert!(transport.captured().status.is_none());
    }

    #[test]
    fn test_last_modified_ignored_for_post() {
        let (mut response, _) = response_for(&[
            ("REQUEST_METHOD", "POST"),
            ("CONTENT_TYPE", "text/plain"),
            ("HTTP_IF_MODIFIED_SINCE", "Sun, 06 Nov 1994 08:49:37 GMT"),
        ]);
        assert!(!response.set_last_modified(784111777).unwrap());
    }

    #[test]
    fn test_set_expires() {
        let (mut response, _) = response_for(&[]);
        response.set_expires(0);
        assert_eq!(response.header("Expires"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_flush() {
        let (mut response, transport) = response_for(&[]);
        response.flush("<p>x</p>", Some(201)).unwrap();
        let captured = transport.captured();
        assert_eq!(captured.status, Some((201, "Created".to_string())));
        assert_eq!(captured.header("Content-Type"), Some("text/html"));
        assert_eq!(captured.header("Content-Length"), Some("8"));
    }

    #[test]
    fn test_redirect() {
        let (mut response, transport) = response_for(&[]);
        response.redirect("/login").unwrap();
        let captured = transport.captured();
        assert_eq!(captured.status, Some((307, "Temporary Redirect".to_string())));
        assert_eq!(captured.header("Location"), Some("/login"));
    }

    #[test]
    fn test_json_sets_content_type_once() {
        let (mut response, _) = response_for(&[]);
        response.json(&json!({"a": 1}), 200).unwrap();
        response.json(&json!({"a": 1}), 200).unwrap();
        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.header("Content-Type"), Some("application/json"));

        let body: Value = serde_json::from_slice(&response.body_bytes().unwrap()).unwrap();
        assert_eq!(body, json!({"a": 1}));
    }

    #[test]
    fn test_html_does_not_send() {
        let (mut response, transport) = response_for(&[]);
        response.html("<b>x</b>", 404);
        assert_eq!(response.status(), 404);
        assert!(!response.is_sent());
        assert!(transport.captured().status.is_none());
    }

    #[test]
    fn test_as_bytes_legacy_format() {
        let (mut response, _) = response_for(&[]);
        response.set_header("Content-Type", "text/plain", true).push("hi");
        assert_eq!(
            response.as_bytes().unwrap(),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\n\r\nhi"
        );
    }

    #[test]
    fn test_body_spills_with_small_limit() {
        let (response, _) = response_for(&[]);
        let mut response = response.with_body_limit(4);
        response.push("0123456789");
        assert!(response.is_body_spilled());
        assert_eq!(response.body_bytes().unwrap(), b"0123456789");
    }
}
