use serde_json::json;
use upr::github::{GitHubClient, GitHubConfig};
use upr_core::contract::{CommitStatus, HostError, SourceHost};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(&GitHubConfig {
        token: "ghp_test".into(),
        api_url: format!("{}/", server.uri()),
    })
    .expect("client should build")
}

fn pulls(range: std::ops::Range<u64>) -> serde_json::Value {
    range
        .map(|n| json!({ "number": n, "title": format!("PR {n}"), "state": "open" }))
        .collect()
}

#[tokio::test]
async fn open_pull_requests_are_fetched_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("state", "open"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pulls(1..101)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pulls(101..103)))
        .expect(1)
        .mount(&server)
        .await;

    let prs = client(&server)
        .list_pull_requests("acme", "widgets")
        .await
        .unwrap();

    assert_eq!(prs.len(), 102);
    assert_eq!(prs[0].number, 1);
    assert_eq!(prs[101].number, 102);
    assert_eq!(prs[101].title.as_deref(), Some("PR 102"));
}

#[tokio::test]
async fn commits_of_a_pull_request_are_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/3/commits"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "sha": "0ddba11", "commit": { "message": "first" } },
            { "sha": "abc123", "commit": { "message": "second" } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let commits = client(&server).list_commits("acme", "widgets", 3).await.unwrap();

    let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["0ddba11", "abc123"]);
}

#[tokio::test]
async fn comments_are_posted_to_the_issue_thread() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/issues/3/comments"))
        .and(body_json(json!({ "body": "Build passed." })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .create_issue_comment("acme", "widgets", 3, "Build passed.")
        .await
        .unwrap();
}

#[tokio::test]
async fn statuses_omit_unset_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/statuses/abc123"))
        .and(body_json(json!({ "state": "pending", "context": "ci/build" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    let status = CommitStatus {
        state: "pending".into(),
        description: None,
        context: "ci/build".into(),
        target_url: None,
    };
    client(&server)
        .create_commit_status("acme", "widgets", "abc123", &status)
        .await
        .unwrap();
}

#[tokio::test]
async fn api_failures_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_pull_requests("acme", "widgets")
        .await
        .unwrap_err();

    match err {
        HostError::Status { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "Bad credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_payloads_are_decode_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "nope" })))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_pull_requests("acme", "widgets")
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Decode { .. }));
}
