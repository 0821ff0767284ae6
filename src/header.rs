// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 标头存储模块
//!
//! `HeaderStore` 是请求与响应共用的标头容器：
//! 1. 名称在写入前统一规范化为 `Capitalized-Dash-Case`，因此 `content-type`、
//!    `Content_Type` 与 `CONTENT-TYPE` 指向同一条记录。
//! 2. 保留首次写入的顺序，发送时按顺序输出。
//! 3. 同名多值以换行符连接存放，发送时再拆分为多行。

/// 规范化标头名：`_` 与空格替换为 `-`，全部转小写，每个 `-` 之后的首字母大写。
pub fn canonical_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.trim().chars() {
        match c {
            '_' | '-' | ' ' => {
                canonical.push('-');
                upper_next = true;
            }
            _ if upper_next => {
                canonical.extend(c.to_uppercase());
                upper_next = false;
            }
            _ => canonical.extend(c.to_lowercase()),
        }
    }
    canonical
}

/// 大小写不敏感、保持插入顺序的标头映射。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderStore {
    entries: Vec<(String, String)>,
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = canonical_name(name);
        self.entries.iter().position(|(n, _)| *n == name)
    }

    /// 写入标头。已存在且 `overwrite` 为 `false` 时保持原值并返回 `false`。
    pub fn set(&mut self, name: &str, value: &str, overwrite: bool) -> bool {
        match self.position(name) {
            Some(index) if overwrite => {
                self.entries[index].1 = value.to_string();
                true
            }
            Some(_) => false,
            None => {
                self.entries.push((canonical_name(name), value.to_string()));
                true
            }
        }
    }

    /// 为已有标头追加一个值（换行连接），不存在时等同于 `set`。
    pub fn append(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(index) => {
                let entry = &mut self.entries[index].1;
                entry.push('\n');
                entry.push_str(value);
            }
            None => self.entries.push((canonical_name(name), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历 `(名称, 值)`，多值标头保持换行连接的形式。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// 按线上格式遍历：多值标头拆分为多条 `(名称, 单个值)`。
    pub fn lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, v)| v.split('\n').map(move |value| (n.as_str(), value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("Content_Type"), "Content-Type");
        assert_eq!(canonical_name("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_name("x_http_method_override"), "X-Http-Method-Override");
        assert_eq!(canonical_name("etag"), "Etag");
    }

    #[test]
    fn test_set_respects_overwrite() {
        let mut headers = HeaderStore::new();
        assert!(headers.set("Content-Type", "text/html", true));
        assert!(!headers.set("content_type", "application/json", false));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));

        assert!(headers.set("content-type", "application/json", true));
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut headers = HeaderStore::new();
        headers.set("b", "2", true);
        headers.set("a", "1", true);
        headers.set("B", "3", true);
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_multi_value_lines() {
        let mut headers = HeaderStore::new();
        headers.set("Set-Cookie", "a=1", true);
        headers.append("set_cookie", "b=2");
        assert_eq!(headers.get("Set-Cookie"), Some("a=1\nb=2"));

        let lines: Vec<(&str, &str)> = headers.lines().collect();
        assert_eq!(lines, vec![("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]);
    }

    #[test]
    fn test_remove() {
        let mut headers = HeaderStore::new();
        headers.set("Location", "/", true);
        assert_eq!(headers.remove("location"), Some("/".to_string()));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("location"), None);
    }
}
