mod common;

use std::collections::BTreeMap;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use coffee_store_api::{middleware::auth::Role, vnpay::signature};
use tower::ServiceExt;

fn signed_query(params: &[(&str, &str)], secret: &str) -> String {
    let mut map: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let hash = signature::sign_params(secret, &map).unwrap();
    map.insert(signature::SECURE_HASH.into(), hash);
    map.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = common::offline_app();
    for uri in ["/api/cart", "/api/orders", "/api/auth/me", "/api/admin/orders"] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let response = common::offline_app()
        .oneshot(
            Request::get("/api/cart")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = common::body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let app = common::offline_app();
    let token = common::bearer(Role::Customer);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/orders")
                .header(header::AUTHORIZATION, &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::patch("/api/admin/inventory/5f2b8a52-4c1e-4f0a-9d7e-0b1c2d3e4f50")
                .header(header::AUTHORIZATION, &token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"delta": 5}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn customers_cannot_upload_images() {
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
         Content-Type: image/png\r\n\r\n\u{0089}PNG\r\n--{boundary}--\r\n"
    );
    let response = common::offline_app()
        .oneshot(
            Request::post("/api/images")
                .header(header::AUTHORIZATION, common::bearer(Role::Customer))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ipn_with_bad_signature_is_rejected() {
    let query = signed_query(
        &[
            ("vnp_Amount", "15960000"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TxnRef", "ORD-20261019-1A2B3C4D"),
        ],
        "WRONGSECRET",
    );
    let response = common::offline_app()
        .oneshot(
            Request::get(format!("/api/payment/vnpay/ipn?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["RspCode"], "97");
    assert_eq!(body["Message"], "Invalid signature");
}

#[tokio::test]
async fn return_with_bad_signature_is_bad_request() {
    let response = common::offline_app()
        .oneshot(
            Request::get("/api/payment/vnpay/return?vnp_TxnRef=ORD-1&vnp_SecureHash=deadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_provider_is_bad_request() {
    let response = common::offline_app()
        .oneshot(
            Request::post("/api/auth/oauth/myspace")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"access_token": "abc"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oauth_without_configured_client_is_refused() {
    for provider in ["google", "facebook"] {
        let response = common::offline_app()
            .oneshot(
                Request::post(format!("/api/auth/oauth/{provider}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"access_token": "token-from-another-app"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{provider}");
        let body = common::body_json(response).await;
        assert!(
            body["message"].as_str().unwrap_or_default().contains("not configured"),
            "{body}"
        );
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = common::offline_app()
        .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = common::body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn docs_are_served() {
    let response = common::offline_app()
        .oneshot(Request::get("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
