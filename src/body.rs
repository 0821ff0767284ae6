// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应体缓冲区
//!
//! 响应体先保存在内存中，超过阈值后自动转存到匿名临时文件，
//! 以限制大响应体的内存占用。无论底层是内存还是文件，读写接口保持一致。

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom, Write},
};

use tempfile::SpooledTempFile;

use crate::param::DEFAULT_BODY_MEMORY_LIMIT;

pub struct ResponseBody {
    buffer: SpooledTempFile,
    len: u64,
    threshold: usize,
}

impl ResponseBody {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_BODY_MEMORY_LIMIT)
    }

    /// 指定内存阈值（字节）。
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            buffer: SpooledTempFile::new(threshold),
            len: 0,
            threshold,
        }
    }

    /// 在末尾追加内容。
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.seek(SeekFrom::End(0))?;
        self.buffer.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// 清空内容，已转存的临时文件随之释放。
    pub fn clear(&mut self) {
        self.buffer = SpooledTempFile::new(self.threshold);
        self.len = 0;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 是否已转存到临时文件。
    pub fn is_spilled(&self) -> bool {
        self.buffer.is_rolled()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 从头读取全部内容。
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut contents = Vec::with_capacity(self.len as usize);
        self.buffer.seek(SeekFrom::Start(0))?;
        self.buffer.read_to_end(&mut contents)?;
        Ok(contents)
    }

    /// 从头把全部内容写入 `writer`，返回写入的字节数。
    pub fn copy_to(&mut self, writer: &mut dyn Write) -> io::Result<u64> {
        self.buffer.seek(SeekFrom::Start(0))?;
        io::copy(&mut self.buffer, writer)
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("len", &self.len)
            .field("threshold", &self.threshold)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}
