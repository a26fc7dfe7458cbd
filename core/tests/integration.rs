//! Full batch lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives creates, a mixed
//! update/delete batch, reads and a stale-lock failure over real HTTP using
//! ureq. Validates that the full-square encoding and working-set filter are
//! understood by a service that zips the arrays back into records.

use batch_core::{
    ApiClient, ApiError, Batch, CondensedStatus, FilterExpression, HttpMethod, HttpRequest, HttpResponse,
    Operation, Predicate, ReadQuery,
};

/// Execute an `HttpRequest` using ureq and return an `HttpResponse`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`.
fn execute(req: HttpRequest) -> HttpResponse {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent();

    let content_type = req
        .headers
        .iter()
        .find(|(k, _)| k == "content-type")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    let mut response = match (req.method, req.body) {
        (HttpMethod::Get, _) => agent.get(&req.path).call(),
        (HttpMethod::Delete, _) => agent.delete(&req.path).call(),
        (HttpMethod::Post, Some(body)) => agent.post(&req.path).content_type(&content_type).send(body.as_bytes()),
        (HttpMethod::Post, None) => agent.post(&req.path).send_empty(),
        (HttpMethod::Put, Some(body)) => agent.put(&req.path).content_type(&content_type).send(body.as_bytes()),
        (HttpMethod::Put, None) => agent.put(&req.path).send_empty(),
    }
    .expect("HTTP transport error");

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();

    HttpResponse {
        status,
        headers: Vec::new(),
        body,
    }
}

fn start_server() -> std::net::SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

const PEOPLE: &str = "crm/people";

#[test]
fn batch_lifecycle() {
    let addr = start_server();
    let client = ApiClient::for_service(&format!("http://{addr}"));

    // Step 1: the table starts empty.
    let req = client.build_get(PEOPLE, &ReadQuery::new());
    let reply = client.parse_response(execute(req)).unwrap();
    assert_eq!(reply.condensed_status(), CondensedStatus::Ok);
    assert_eq!(reply.total(), Some(0));

    // Step 2: create two people with different key sets.
    let req = client
        .build_create(
            PEOPLE,
            vec![
                Operation::new().set("name", "Ada Lovelace").set("email", "ada@example.com"),
                Operation::new().set("name", "Charles Babbage").set("phone", "555 0101"),
            ],
        )
        .unwrap();
    let reply = client.parse_response(execute(req)).unwrap();
    reply.assert_ok().unwrap();
    let created = reply.id_versions();
    assert_eq!(created.len(), 2);
    let (ada, charles) = (created[0], created[1]);
    assert_eq!(ada.lock_version, Some(0));

    // Step 3: read back with a filter; the missing phone was never stored.
    let query = ReadQuery::new().filter(FilterExpression::new().and(Predicate::new("name", "bg", "Ada")));
    let reply = client.parse_response(execute(client.build_get(PEOPLE, &query))).unwrap();
    assert_eq!(reply.total(), Some(1));
    let record = &reply.data()[0];
    assert_eq!(record["email"], "ada@example.com");
    assert!(record.get("phone").is_none());

    // Step 4: mixed batch that updates Ada (nulling email), deletes Charles.
    let batch = Batch::new(PEOPLE)
        .push(
            Operation::update(ada.id.unwrap(), ada.lock_version.unwrap())
                .set("name", "Augusta Ada King")
                .set_null("email"),
        )
        .push(Operation::delete(charles.id.unwrap(), charles.lock_version.unwrap()));
    let reply = client.parse_response(execute(client.build_batch(batch).unwrap())).unwrap();
    reply.assert_ok().unwrap();
    let versions = reply.id_versions();
    assert_eq!(versions[0].id, ada.id);
    assert_eq!(versions[0].lock_version, Some(1));

    // Step 5: only Ada remains, renamed, email null.
    let reply = client.parse_response(execute(client.build_get(PEOPLE, &ReadQuery::new()))).unwrap();
    assert_eq!(reply.total(), Some(1));
    let record = &reply.data()[0];
    assert_eq!(record["name"], "Augusta Ada King");
    assert!(record["email"].is_null());

    // Step 6: a stale lock version is understood, but not ok.
    let req = client
        .build_update(PEOPLE, vec![Operation::new().with_identity(ada.id.unwrap(), 0).set("name", "X")])
        .unwrap();
    let reply = client.parse_response(execute(req)).unwrap();
    assert_eq!(reply.condensed_status(), CondensedStatus::NotOk);
    assert!(matches!(reply.assert_ok(), Err(ApiError::PartialFailure { .. })));

    // Step 7: delete Ada using the version chained from step 4.
    let req = client
        .build_delete(PEOPLE, vec![Operation::new().with_identity(ada.id.unwrap(), 1)])
        .unwrap();
    client.parse_response(execute(req)).unwrap().assert_ok().unwrap();

    let reply = client.parse_response(execute(client.build_get(PEOPLE, &ReadQuery::new()))).unwrap();
    assert_eq!(reply.total(), Some(0));
}

#[test]
fn nested_keys_and_lists_round_trip() {
    let addr = start_server();
    let client = ApiClient::for_service(&format!("http://{addr}"));

    let req = client
        .build_create(
            "crm/organisations",
            vec![Operation::new()
                .set("name", "Analytical Engines Ltd")
                .set("main_location[postal[town]]", "London")
                .set("tags", vec!["steam", "brass"])],
        )
        .unwrap();
    client.parse_response(execute(req)).unwrap().assert_ok().unwrap();

    let query = ReadQuery::new().columns(["main_location[postal][town]", "tags"]);
    let reply = client
        .parse_response(execute(client.build_get("crm/organisations", &query)))
        .unwrap();
    let record = &reply.data()[0];
    assert_eq!(record["main_location[postal][town]"], "London");
    assert_eq!(record["tags"], "[steam,brass]");
    assert!(record.get("name").is_none());
}

#[test]
fn invalid_batch_never_reaches_the_wire() {
    let client = ApiClient::for_service("http://127.0.0.1:9");
    let err = client
        .build_create(PEOPLE, vec![Operation::new(), Operation::new().with_identity(4, 0)])
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidCreateIdentity { index: 1 }));
}

#[test]
fn non_api_endpoint_is_an_http_error() {
    let addr = start_server();
    let client = ApiClient::for_service(&format!("http://{addr}"));
    let mut req = client.build_get(PEOPLE, &ReadQuery::new());
    req.path = format!("http://{addr}/crm/people");
    let err = client.parse_response(execute(req)).unwrap_err();
    assert!(matches!(err, ApiError::HttpError { status: 404, .. }));
}
