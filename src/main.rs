// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # CGI 演示程序
//!
//! 作为 CGI 脚本被 Web 服务器调用，处理一次请求：
//! - 从环境变量与标准输入构建请求视图
//! - 以文件存储开启会话，记录访问次数
//! - GET 输出带 CSRF 令牌的表单（或 JSON 摘要），POST 校验令牌后以闪存消息重定向
//! - 通过标准输出写回 `Status:` 形式的响应

use std::{error::Error, io, path::PathBuf, rc::Rc};

use log::{error, info};
use serde_json::{json, Value};

use wlib_http::{
    util::escape_special_chars, Config, Environment, FileStorage, FlashMessage, Request, Response,
    Session, WriterTransport,
};

fn main() {
    // 1. 环境配置加载：从 TOML 文件读取运行参数
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}，使用默认配置", e);
            Config::new()
        }
    };

    // 2. 初始化日志系统：通过外部 YAML 配置级别与输出目的地（CGI 的标准输出属于响应，日志只能写文件）
    if let Err(e) = log4rs::init_file(config.log_config(), Default::default()) {
        eprintln!("无法初始化日志系统: {}", e);
    }
    info!("配置文件已载入");

    let id = std::process::id() as u128;
    let request = Rc::new(Request::new(id, Environment::from_process()));
    let mut response = Response::new(Rc::clone(&request), WriterTransport::cgi(io::stdout()))
        .with_body_limit(config.body_memory_limit());

    let save_path = config
        .session_save_path()
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let mut session = Session::new(Rc::clone(&request), FileStorage::new(save_path));

    if let Err(e) = handle(&request, &mut response, &mut session, &config) {
        error!("[ID{}]处理请求时发生异常: {}", id, e);
        if let Err(e) = response.flush("Internal Server Error", Some(500)) {
            error!("[ID{}]写出500响应失败: {}", id, e);
        }
    }
}

/// # 请求处理器
fn handle(
    request: &Request,
    response: &mut Response,
    session: &mut Session,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    session.configure(config)?;
    session.start()?;

    let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
    session.set("visits", visits);

    if request.is_post() {
        let token = request.post("_token").and_then(Value::as_str).unwrap_or("");
        if session.is_valid_token("form", token) {
            let note = request.post("note").and_then(Value::as_str).unwrap_or("");
            session.set_flash("notice", format!("已保存：{}", note));
            session.refresh_token("form");
        } else {
            session.flash("notice", json!(["令牌无效，请重新提交", {"status": 403}]), "error");
        }
        finish_session(response, session);
        response.redirect(&request.request_uri())?;
        return Ok(());
    }

    let token = session.get_token("form");
    let notice = session.take_flash("notice");
    finish_session(response, session);

    if request.wants_json() {
        response.json(
            &json!({
                "method": request.method(),
                "path": request.script_name(),
                "browser": request.browser(),
                "os": request.os(),
                "ip": request.ip(),
                "visits": visits,
                "notice": notice,
            }),
            200,
        )?;
    } else {
        let notice = notice.map(|n| notice_html(&n)).unwrap_or_default();
        response.html(
            &format!(
                "<!DOCTYPE html><html><body>{}<p>第{}次访问</p>\
                 <form method=\"post\"><input type=\"hidden\" name=\"_token\" value=\"{}\">\
                 <input name=\"note\"><button>提交</button></form></body></html>",
                notice, visits, token
            ),
            200,
        );
    }
    response.send()?;
    Ok(())
}

fn finish_session(response: &mut Response, session: &mut Session) {
    for cookie in session.take_cookies() {
        response.add_cookie(&cookie);
    }
    session.close();
}

/// 闪存消息来自用户输入，输出前转义
fn notice_html(notice: &FlashMessage) -> String {
    format!(
        "<p class=\"{}\">{}</p>",
        escape_special_chars(&notice.level),
        escape_special_chars(notice.message.as_str().unwrap_or(""))
    )
}
