// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求/响应/会话层在运行期可能返回给调用方的各类异常情况。
//!
//! ## 设计意图
//! - **可恢复错误**：会话存储挂载失败（StartupError）、保存路径或超时配置错误（ConfigError）、
//!   原始报文无法解析为请求等，均以 `Result<_, Exception>` 的形式交给上层处理。
//! - **编程错误**：在错误的生命周期阶段调用会话操作属于契约违背，不在此枚举中，
//!   而是直接 `panic!`。
//! - **可读性**：通过实现 `std::fmt::Display`，错误信息可直接写入日志。

use std::fmt;
use std::path::PathBuf;

/// 请求/响应/会话层返回的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 原始请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行缺少方法、路径或协议版本。
    MalformedRequestLine,
    /// 客户端使用了不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 会话存储挂载失败（StartupError），不会自动重试。
    SessionStartFailed,
    /// 会话保存路径不存在（ConfigError）。
    SavePathNotFound(PathBuf),
    /// 会话保存路径不可写（ConfigError）。
    SavePathNotWritable(PathBuf),
    /// 会话超时既不是分钟数，也不是可识别的相对时间表达式（ConfigError）。
    InvalidTimeout(String),
    /// 配置文件不存在或无法读取。
    ConfigNotFound(String),
}

use Exception::*;

impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequestLine => write!(f, "Malformed request line"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            SessionStartFailed => write!(f, "Unable to start session. Check your options."),
            SavePathNotFound(p) => write!(f, "Path \"{}\" does not exists.", p.display()),
            SavePathNotWritable(p) => write!(f, "Path \"{}\" is not writeable.", p.display()),
            InvalidTimeout(t) => write!(f, "Invalid session timeout \"{}\"", t),
            ConfigNotFound(file) => write!(f, "Config file \"{}\" can't be read", file),
        }
    }
}

impl std::error::Error for Exception {}
