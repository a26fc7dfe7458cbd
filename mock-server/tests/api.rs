use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::app;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn form_request(uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.to_string())
        .unwrap()
}

fn get_request(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

const CREATE_TWO: &str = "_method=PUT&client=api\
    &_ff[]=id&_ft[]=eq&_fc[]=0\
    &__method[]=POST&id[]=0&lock_version[]=0&name[]=Alpha\
    &__method[]=POST&id[]=0&lock_version[]=0&name[]=Beta";

// --- read ---

#[tokio::test]
async fn read_empty_table() {
    let resp = app().oneshot(get_request("/crm/people.api")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 0);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_endpoint_returns_404() {
    let resp = app().oneshot(get_request("/crm/people")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- batch ---

#[tokio::test]
async fn create_assigns_ids() {
    let resp = app().oneshot(form_request("/crm/people.api", CREATE_TWO)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    let affected = body["affected_objects"].as_array().unwrap();
    assert_eq!(affected.len(), 2);
    assert_eq!(affected[0]["id"], 1);
    assert_eq!(affected[1]["id"], 2);
    assert_eq!(affected[0]["lock_version"], 0);
    assert_eq!(affected[1]["success"], true);
}

#[tokio::test]
async fn ragged_payload_is_rejected() {
    let body = "_method=PUT&_ff[]=id&_ft[]=eq&_fc[]=0\
        &__method[]=POST&id[]=0&lock_version[]=0&name[]=Alpha\
        &__method[]=POST&id[]=0&lock_version[]=0";
    let resp = app().oneshot(form_request("/crm/people.api", body)).await.unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["errors"][0].as_str().unwrap().contains("column"));
}

#[tokio::test]
async fn rows_outside_the_filter_fail() {
    let body = "_method=PUT&__method[]=POST&id[]=0&lock_version[]=0&name[]=Alpha";
    let resp = app().oneshot(form_request("/crm/people.api", body)).await.unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["affected_objects"][0]["success"], false);
}

#[tokio::test]
async fn unsupported_method_is_reported() {
    let resp = app()
        .oneshot(form_request("/crm/people.api", "_method=PATCH"))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn create_then_read_back() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(form_request("/crm/people.api", CREATE_TWO))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get_request(
            "/crm/people.api?_ff%5B%5D=name&_ft%5B%5D=eq&_fc%5B%5D=Beta&_select_columns%5B%5D=name",
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["name"], "Beta");
    assert_eq!(body["data"][0]["id"], 2);
}

#[tokio::test]
async fn stale_lock_version_rolls_back_batch() {
    let app = app();
    app.clone()
        .oneshot(form_request("/crm/people.api", CREATE_TWO))
        .await
        .unwrap();

    // Row 1 is valid, row 2 carries a stale lock version.
    let body = "_method=PUT&_fm=or&_ff[]=id&_ft[]=eq&_fc[]=1&_ff[]=id&_ft[]=eq&_fc[]=2\
        &__method[]=PUT&id[]=1&lock_version[]=0&name[]=Gamma\
        &__method[]=PUT&id[]=2&lock_version[]=7&name[]=Delta";
    let resp = app
        .clone()
        .oneshot(form_request("/crm/people.api", body))
        .await
        .unwrap();
    let reply = body_json(resp).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["affected_objects"][0]["success"], true);
    assert_eq!(reply["affected_objects"][1]["success"], false);

    let resp = app.oneshot(get_request("/crm/people.api")).await.unwrap();
    let bytes = body_bytes(resp).await;
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.contains("Alpha"), "atomic batch must not apply row 1");
    assert!(!text.contains("Gamma"));
}

#[tokio::test]
async fn per_object_transactions_keep_successful_rows() {
    let app = app();
    app.clone()
        .oneshot(form_request("/crm/people.api", CREATE_TWO))
        .await
        .unwrap();

    let body = "_method=PUT&_per_object_transactions=true\
        &_fm=or&_ff[]=id&_ft[]=eq&_fc[]=1&_ff[]=id&_ft[]=eq&_fc[]=2\
        &__method[]=PUT&id[]=1&lock_version[]=0&name[]=Gamma\
        &__method[]=DELETE&id[]=2&lock_version[]=9&name[]=%3Ano_value%3A";
    let resp = app
        .clone()
        .oneshot(form_request("/crm/people.api", body))
        .await
        .unwrap();
    let reply = body_json(resp).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["affected_objects"][0]["lock_version"], 1);
    assert_eq!(reply["affected_objects"][1]["success"], false);

    let resp = app.oneshot(get_request("/crm/people.api")).await.unwrap();
    let reply = body_json(resp).await;
    assert_eq!(reply["total"], 2);
    assert_eq!(reply["data"][0]["name"], "Gamma");
}

#[tokio::test]
async fn null_sentinel_clears_a_field() {
    let app = app();
    app.clone()
        .oneshot(form_request("/crm/people.api", CREATE_TWO))
        .await
        .unwrap();

    let body = "_method=PUT&_ff[]=id&_ft[]=eq&_fc[]=1\
        &__method[]=PUT&id[]=1&lock_version[]=0&name[]=%3Anull_value%3A";
    app.clone()
        .oneshot(form_request("/crm/people.api", body))
        .await
        .unwrap();

    let resp = app
        .oneshot(get_request("/crm/people.api?_ff%5B%5D=id&_ft%5B%5D=eq&_fc%5B%5D=1"))
        .await
        .unwrap();
    let reply = body_json(resp).await;
    assert_eq!(reply["data"][0]["name"], Value::Null);
    assert_eq!(reply["data"][0]["lock_version"], 1);
}

#[tokio::test]
async fn read_pages_results() {
    let app = app();
    app.clone()
        .oneshot(form_request("/crm/people.api", CREATE_TWO))
        .await
        .unwrap();

    let resp = app
        .oneshot(get_request("/crm/people.api?_start=1&_limit=1"))
        .await
        .unwrap();
    let reply = body_json(resp).await;
    assert_eq!(reply["total"], 2);
    assert_eq!(reply["data"].as_array().unwrap().len(), 1);
    assert_eq!(reply["data"][0]["name"], "Beta");
}
