// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了请求/响应/会话层共用的常量和数据结构，包括：
//! - HTTP 状态码及其原因短语（Reason Phrase）。
//! - 不遵循 `HTTP_*` 命名约定的特殊标头列表。
//! - 响应体内存上限、会话默认超时以及会话状态中的保留键。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// HTTP 协议规定的换行符（Carriage Return Line Feed），用于状态行
pub const CRLF: &str = "\r\n";

/// 标头行之间使用的换行符（沿用旧格式：标头行只用 LF 结尾）
pub const LF: &str = "\n";

/// 响应体在内存中保留的最大字节数，超出后转存到临时文件（8 MiB）
pub const DEFAULT_BODY_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// 会话默认超时时间（秒），即 3 小时
pub const DEFAULT_SESSION_TIMEOUT: u64 = 10800;

/// 表单键中 `[..]` 嵌套的最大层数，超出的键值对被丢弃
pub const MAX_INPUT_NESTING: usize = 64;

/// 会话状态中的保留键：会话类型（`normal` 或 `cookie`）
pub const SESSION_TYPE_KEY: &str = "_type";
/// 会话状态中的保留键：过期时间戳
pub const SESSION_EXPIRE_KEY: &str = "_expire";
/// 会话状态中的保留键：CSRF 令牌表
pub const SESSION_TOKENS_KEY: &str = "_tokens";
/// 会话状态中的保留键：闪存消息表
pub const SESSION_MESSAGES_KEY: &str = "_messages";
/// 会话状态中的保留键：客户端指纹
pub const SESSION_FINGERPRINT_KEY: &str = "_fingerprint";

lazy_static! {
    /// 不以 `HTTP_` 开头、但仍应视为请求标头的传输层键。
    pub static ref SPECIAL_HEADERS: Vec<&'static str> = {
        vec![
            "CONTENT_TYPE",
            "CONTENT_LENGTH",
            "PHP_AUTH_USER",
            "PHP_AUTH_PW",
            "PHP_AUTH_DIGEST",
            "AUTH_TYPE",
        ]
    };
}

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[IANA HTTP Status Code Registry](http://www.iana.org/assignments/http-status-codes/http-status-codes.xhtml)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx: 信息响应 (Informational)
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");
        map.insert(102, "Processing");

        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(203, "Non-Authoritative Information");
        map.insert(204, "No Content");
        map.insert(205, "Reset Content");
        map.insert(206, "Partial Content");
        map.insert(207, "Multi-Status");
        map.insert(208, "Already Reported");
        map.insert(226, "IM Used");

        // 3xx: 重定向 (Redirection)
        map.insert(300, "Multiple Choices");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(305, "Use Proxy");
        map.insert(306, "(Unused)");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(402, "Payment Required");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(407, "Proxy Authentication Required");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Request Entity Too Large");
        map.insert(414, "Request-URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Requested Range Not Satisfiable");
        map.insert(417, "Expectation Failed");
        map.insert(418, "I'm a teapot");
        map.insert(422, "Unprocessable Entity");
        map.insert(423, "Locked");
        map.insert(424, "Failed Dependency");
        map.insert(426, "Upgrade Required");
        map.insert(428, "Precondition Required");
        map.insert(429, "Too Many Requests");
        map.insert(431, "Request Header Fields Too Large");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map.insert(506, "Variant Also Negotiates");
        map.insert(507, "Insufficient Storage");
        map.insert(508, "Loop Detected");
        map.insert(510, "Not Extended");
        map.insert(511, "Network Authentication Required");
        map
    };
}

/// 根据状态码取原因短语，未知状态码回退为 500 的原因短语。
pub fn reason_phrase(code: u16) -> &'static str {
    match STATUS_CODES.get(&code) {
        Some(reason) => reason,
        None => STATUS_CODES[&500],
    }
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 `SERVER_PROTOCOL` 中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}
