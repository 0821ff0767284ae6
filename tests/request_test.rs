// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod request_tests {
    //! # 请求视图集成测试模块
    //!
    //! 从外部调用方的角度验证请求视图：
    //! 1. 标头名称的大小写与分隔符风格不影响读取结果。
    //! 2. 方法覆盖的优先级与 GET-over-POST 场景。
    //! 3. 原始报文解析与 CGI 环境构建的结果一致。

    use proptest::prelude::*;
    use serde_json::json;
    use wlib_http::{header::canonical_name, Environment, Filter, Request};

    fn post_request(body: &str, vars: &[(&str, &str)]) -> Request {
        let env = Environment::new()
            .with_var("REQUEST_METHOD", "POST")
            .with_vars(vars.iter().copied())
            .with_body(body);
        Request::new(1, env)
    }

    #[test]
    fn test_method_param_override_is_not_get_over_post() {
        let req = post_request("_method=DELETE", &[]);
        assert_eq!(req.method(), "DELETE");
        assert_eq!(req.original_method(), "POST");
        assert!(!req.is_get_over_post());
    }

    #[test]
    fn test_get_over_post_inputs_agree() {
        let req = post_request(
            "q=from-body&only=body",
            &[
                ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
                ("HTTP_X_HTTP_METHOD_OVERRIDE", "GET"),
                ("QUERY_STRING", "q=from-query"),
            ],
        );
        assert_eq!(req.method(), "GET");
        assert!(req.is_get_over_post());
        assert_eq!(req.get("q"), req.inputs("q"));
        assert_eq!(req.get("only"), Some(&json!("body")));
        assert_eq!(req.get_all(), req.all_inputs());
    }

    #[test]
    fn test_method_is_resolved_once() {
        let req = post_request("", &[("HTTP_X_HTTP_METHOD_OVERRIDE", "put"), ("CONTENT_TYPE", "text/plain")]);
        let first = req.method().to_string();
        // 首次解析后，即使以其他过滤器读取同一键，方法也不再变化
        req.server_filtered("HTTP_X_HTTP_METHOD_OVERRIDE", None, Filter::Raw);
        assert_eq!(req.method(), first);
        assert_eq!(req.method(), "PUT");
    }

    #[test]
    fn test_headers_cached_as_whole() {
        let req = Request::new(
            1,
            Environment::new()
                .with_var("HTTP_ACCEPT", "text/html")
                .with_var("HTTP_X_TRACE", "<t>"),
        );
        let before = req.headers().clone();
        req.server_filtered("HTTP_X_TRACE", None, Filter::Raw);
        assert_eq!(req.headers(), &before);
        assert_eq!(req.headers().get("X-Trace"), Some("&lt;t&gt;"));
    }

    #[test]
    fn test_raw_message_matches_cgi_environment() {
        let raw = b"PUT /items/7?verbose=1 HTTP/1.1\r\nHost: api.local\r\nContent-Type: application/json\r\nAccept: application/json\r\n\r\n{\"name\":\"lamp\"}";
        let from_raw = Request::try_from(raw, 2).unwrap();

        let from_env = Request::new(
            3,
            Environment::new()
                .with_var("REQUEST_METHOD", "PUT")
                .with_var("REQUEST_URI", "/items/7?verbose=1")
                .with_var("QUERY_STRING", "verbose=1")
                .with_var("CONTENT_TYPE", "application/json")
                .with_var("HTTP_HOST", "api.local")
                .with_var("HTTP_ACCEPT", "application/json")
                .with_body("{\"name\":\"lamp\"}"),
        );

        for req in [&from_raw, &from_env] {
            assert!(req.is_put());
            assert!(req.is_json());
            assert!(req.wants_json());
            assert_eq!(req.host(), "api.local");
            assert_eq!(req.get("verbose"), Some(&json!("1")));
            assert_eq!(req.post("name"), Some(&json!("lamp")));
        }
        assert_eq!(from_raw.id(), 2);
    }

    #[test]
    fn test_json_array_body_uses_index_keys() {
        let req = post_request("[\"a\",\"b\"]", &[("CONTENT_TYPE", "application/json")]);
        assert_eq!(req.post("0"), Some(&json!("a")));
        assert_eq!(req.post("1"), Some(&json!("b")));
    }

    proptest! {
        /// 任意大小写与分隔符风格的标头名都指向同一条记录
        #[test]
        fn prop_header_styles_resolve_same_entry(
            words in prop::collection::vec("[a-zA-Z]{1,8}", 1..4),
            seps in prop::collection::vec(prop::sample::select(vec!['-', '_']), 3),
            upper in any::<bool>(),
        ) {
            // 这些前缀会命中特殊键或已带前缀的键
            let first = words[0].to_lowercase();
            prop_assume!(!["http", "x", "content", "php", "auth"].contains(&first.as_str()));

            let key = format!("HTTP_{}", words.join("_").to_uppercase());
            let req = Request::new(0, Environment::new().with_var(&key, "value"));

            let mut name = String::new();
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    name.push(seps[i - 1]);
                }
                name.push_str(&if upper { word.to_uppercase() } else { word.to_lowercase() });
            }
            prop_assert_eq!(req.header(&name), Some("value".to_string()));
            prop_assert_eq!(req.headers().get(&canonical_name(&name)), Some("value"));
        }
    }
}
