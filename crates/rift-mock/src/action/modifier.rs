//! Request/response overrides and modifiers for forwarded traffic.
//!
//! Overrides overlay whole fields (multi-valued fields per name); modifiers edit
//! maps in the fixed order remove, replace, add. `replace` only touches names
//! already present.

use super::forward::set_cookie_name;
use crate::model::{
    BodyContent, CookieMap, CookieModifier, HttpRequest, HttpResponse, MultiMap, MultiMapModifier,
    RequestModifier, RequestOverride, ResponseModifier, ResponseOverride,
};
use bytes::Bytes;
use regex::Regex;

/// Overlay the set fields of `overlay` onto `request`.
pub fn override_request(request: &mut HttpRequest, overlay: &RequestOverride) {
    if let Some(method) = &overlay.method {
        request.method = method.clone();
    }
    if let Some(path) = &overlay.path {
        request.path = path.clone();
    }
    if let Some(query) = &overlay.query_string_parameters {
        overlay_map(&mut request.query_string_parameters, query);
    }
    if let Some(headers) = &overlay.headers {
        overlay_map(&mut request.headers, headers);
        if let Some(cookie_header) = headers.get("cookie") {
            request.cookies = CookieMap::parse_header(cookie_header.iter().map(String::as_str));
        }
    }
    if let Some(cookies) = &overlay.cookies {
        overlay_cookies(&mut request.cookies, cookies);
    }
    if let Some(body) = &overlay.body {
        request.body = Bytes::from(body.bytes());
        if let Some(content_type) = body.content_type() {
            request.headers.insert("content-type", vec![content_type.to_string()]);
        }
    }
    if let Some(secure) = overlay.secure {
        request.secure = secure;
    }
}

/// Apply a request modifier. Fails only on an invalid path regex.
pub fn modify_request(request: &mut HttpRequest, modifier: &RequestModifier) -> Result<(), regex::Error> {
    if let Some(headers) = &modifier.headers {
        modify_map(&mut request.headers, headers);
    }
    if let Some(cookies) = &modifier.cookies {
        modify_cookies(&mut request.cookies, cookies);
    }
    if let Some(query) = &modifier.query_string_parameters {
        modify_map(&mut request.query_string_parameters, query);
    }
    if let Some(path) = &modifier.path {
        let regex = Regex::new(&path.regex)?;
        request.path = regex
            .replace_all(&request.path, path.substitution.as_str())
            .into_owned();
    }
    Ok(())
}

pub fn override_response(response: &mut HttpResponse, overlay: &ResponseOverride) {
    if let Some(status) = overlay.status_code {
        response.status_code = Some(status);
    }
    if let Some(reason) = &overlay.reason_phrase {
        response.reason_phrase = Some(reason.clone());
    }
    if let Some(headers) = &overlay.headers {
        overlay_map(&mut response.headers, headers);
    }
    if let Some(cookies) = &overlay.cookies {
        for (name, _) in cookies.entries() {
            drop_set_cookie(&mut response.headers, name);
        }
        overlay_cookies(&mut response.cookies, cookies);
    }
    if let Some(body) = &overlay.body {
        response.body = Some(body_with_type(body, response.headers.get_first("content-type")));
    }
}

pub fn modify_response(response: &mut HttpResponse, modifier: &ResponseModifier) {
    if let Some(headers) = &modifier.headers {
        modify_map(&mut response.headers, headers);
    }
    if let Some(cookies) = &modifier.cookies {
        // Set-Cookie headers for touched names are regenerated from the cookie map
        for name in cookies.remove.iter().chain(cookies.replace.entries().iter().map(|(n, _)| n)) {
            drop_set_cookie(&mut response.headers, name);
        }
        modify_cookies(&mut response.cookies, cookies);
    }
}

fn overlay_map(target: &mut MultiMap, overlay: &MultiMap) {
    for (name, values) in overlay.iter() {
        target.insert(name, values.to_vec());
    }
}

fn overlay_cookies(target: &mut CookieMap, overlay: &CookieMap) {
    for (name, value) in overlay.entries() {
        if !target.replace(name, value) {
            target.push(name.clone(), value.clone());
        }
    }
}

fn modify_map(target: &mut MultiMap, modifier: &MultiMapModifier) {
    for name in &modifier.remove {
        target.remove(name);
    }
    for (name, values) in modifier.replace.iter() {
        if target.contains(name) {
            target.insert(name, values.to_vec());
        }
    }
    for (name, values) in modifier.add.iter() {
        for value in values {
            target.append(name, value.clone());
        }
    }
}

fn modify_cookies(target: &mut CookieMap, modifier: &CookieModifier) {
    for name in &modifier.remove {
        target.remove(name);
    }
    for (name, value) in modifier.replace.entries() {
        target.replace(name, value);
    }
    for (name, value) in modifier.add.entries() {
        target.push(name.clone(), value.clone());
    }
}

fn drop_set_cookie(headers: &mut MultiMap, name: &str) {
    let Some(values) = headers.get("set-cookie") else {
        return;
    };
    let kept: Vec<String> = values
        .iter()
        .filter(|v| set_cookie_name(v) != Some(name))
        .cloned()
        .collect();
    if kept.is_empty() {
        headers.remove("set-cookie");
    } else {
        headers.insert("set-cookie", kept);
    }
}

/// An override body keeps the upstream content type unless it names its own.
fn body_with_type(body: &BodyContent, upstream_type: Option<&str>) -> BodyContent {
    match (body.content_type(), upstream_type) {
        (None, Some(upstream)) => match body.clone() {
            BodyContent::Text { text, .. } => BodyContent::Text {
                text,
                content_type: Some(upstream.to_string()),
            },
            other => other,
        },
        _ => body.clone(),
    }
}
