// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 输出通道
//!
//! `Response` 只通过 `Transport` 写出状态行、标头与响应体：
//! - `WriterTransport`：写入任意 `io::Write`，可选择直接调用（`HTTP/1.1 200 OK`）
//!   或 CGI（`Status: 200 OK`）两种状态行形式。
//! - `MemoryTransport`：写入共享的内存记录，便于测试检查输出。
//!
//! 标头行沿用旧格式，以单个 LF 结尾；状态行与标头块结束符使用 CRLF。

use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use crate::param::{CRLF, LF};

pub trait Transport {
    /// 标头是否已经写出。
    fn headers_sent(&self) -> bool;

    fn write_status(&mut self, code: u16, reason: &str) -> io::Result<()>;

    fn write_header(&mut self, name: &str, value: &str) -> io::Result<()>;

    /// 结束标头块，此后 `headers_sent()` 为真。
    fn end_headers(&mut self) -> io::Result<()>;

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct WriterTransport<W: Write> {
    writer: W,
    cgi: bool,
    headers_sent: bool,
}

impl<W: Write> WriterTransport<W> {
    /// 直接调用模式，状态行为 `HTTP/1.1 <code> <reason>`。
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            cgi: false,
            headers_sent: false,
        }
    }

    /// CGI 模式，状态行为 `Status: <code> <reason>`。
    pub fn cgi(writer: W) -> Self {
        Self {
            writer,
            cgi: true,
            headers_sent: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for WriterTransport<W> {
    fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    fn write_status(&mut self, code: u16, reason: &str) -> io::Result<()> {
        let prefix = if self.cgi { "Status:" } else { "HTTP/1.1" };
        write!(self.writer, "{} {} {}{}", prefix, code, reason, CRLF)
    }

    fn write_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        write!(self.writer, "{}: {}{}", name, value, LF)
    }

    fn end_headers(&mut self) -> io::Result<()> {
        self.headers_sent = true;
        self.writer.write_all(CRLF.as_bytes())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// `MemoryTransport` 记录下的输出。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captured {
    pub status: Option<(u16, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub headers_sent: bool,
}

impl Captured {
    /// 查找第一条同名标头（名称区分大小写，与线上格式一致）。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers.iter().filter(|(n, _)| n == name).count()
    }
}

/// 写入共享内存记录的通道，克隆出的句柄可在发送后读取记录。
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    captured: Rc<RefCell<Captured>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟宿主已经提前写出标头的情况。
    pub fn with_headers_sent() -> Self {
        let transport = Self::default();
        transport.captured.borrow_mut().headers_sent = true;
        transport
    }

    pub fn captured(&self) -> Captured {
        self.captured.borrow().clone()
    }
}

impl Transport for MemoryTransport {
    fn headers_sent(&self) -> bool {
        self.captured.borrow().headers_sent
    }

    fn write_status(&mut self, code: u16, reason: &str) -> io::Result<()> {
        self.captured.borrow_mut().status = Some((code, reason.to_string()));
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.captured
            .borrow_mut()
            .headers
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn end_headers(&mut self) -> io::Result<()> {
        self.captured.borrow_mut().headers_sent = true;
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.captured.borrow_mut().body.extend_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_status_line() {
        let mut t = WriterTransport::new(Vec::new());
        t.write_status(404, "Not Found").unwrap();
        t.write_header("Content-Type", "text/html").unwrap();
        t.end_headers().unwrap();
        t.write_body(b"x").unwrap();
        assert!(t.headers_sent());
        assert_eq!(
            t.into_inner(),
            b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\n\r\nx"
        );
    }

    #[test]
    fn test_cgi_status_line() {
        let mut t = WriterTransport::cgi(Vec::new());
        t.write_status(200, "OK").unwrap();
        assert_eq!(t.into_inner(), b"Status: 200 OK\r\n");
    }

    #[test]
    fn test_memory_transport_shares_record() {
        let handle = MemoryTransport::new();
        let mut t = handle.clone();
        t.write_status(200, "OK").unwrap();
        t.write_header("A", "1").unwrap();
        t.write_header("A", "2").unwrap();
        t.end_headers().unwrap();

        let captured = handle.captured();
        assert_eq!(captured.status, Some((200, "OK".to_string())));
        assert_eq!(captured.header_count("A"), 2);
        assert!(handle.headers_sent());
    }
}
