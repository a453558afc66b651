#![allow(dead_code)]

use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Full};
use vireo::{Method, Request};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn request(method: Method, uri: &str) -> Request {
    let uri: Uri = uri.parse().expect("valid test uri");
    Request::new(method, uri)
}

pub async fn body_string(response: http::Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.expect("infallible body").to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: http::Response<Full<Bytes>>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).expect("json body")
}
