//! Synthesized fallback responses.

use crate::net::Response;

/// `{"error":"Network error","offline":true}` at 503.
pub fn offline_payload() -> Response {
  let body = serde_json::json!({
    "error": "Network error",
    "offline": true,
  });
  Response::synthesized(503, "application/json", body.to_string())
}

/// Plain 503 for static assets that are neither cached nor reachable.
pub fn offline_status() -> Response {
  Response::synthesized(503, "text/plain", "Offline")
}

/// Minimal page shown when a navigation has no network and nothing cached.
pub fn offline_page(app_name: &str) -> Response {
  let html = format!(
    "<!DOCTYPE html>\n\
     <html lang=\"en\">\n\
     <head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
     <title>{name} - Offline</title></head>\n\
     <body style=\"font-family:sans-serif;text-align:center;padding:3rem\">\
     <h1>You're offline</h1>\
     <p>{name} can't reach the network right now. Check your connection and try again.</p>\
     </body>\n\
     </html>\n",
    name = app_name
  );
  Response::synthesized(200, "text/html; charset=utf-8", html)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;

  #[test]
  fn test_offline_payload_shape() {
    let response = offline_payload();
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), r#"{"error":"Network error","offline":true}"#);
    let value: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value["offline"], Value::Bool(true));
  }

  #[test]
  fn test_offline_page_names_app() {
    let response = offline_page("TikPluse");
    assert!(response.text().contains("<title>TikPluse - Offline</title>"));
    assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
  }
}
