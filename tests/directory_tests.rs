//! Directory source tests with mock server

use serde_json::json;
use vault_deployer::config::DirectoryConfig;
use vault_deployer::error::DirectoryError;
use vault_deployer::identity::{DirectoryMember, DirectorySource, HttpDirectory, MemberKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn directory(mock_server: &MockServer) -> HttpDirectory {
    let config = DirectoryConfig {
        url: format!("{}/{{env}}/tool", mock_server.uri()),
        env: "preprod".to_string(),
        user_group: "gu-rnd".to_string(),
        timeout_secs: 5,
    };
    HttpDirectory::new(&config, "svc-").unwrap()
}

#[tokio::test]
async fn test_groups_from_both_endpoints() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapUserGroup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "gu-rnd", "description": "R&D"},
            {"name": "gu-ops", "description": "[MURPHY] Ops"}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapServiceGroup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "gs-backup", "description": "Backup services"}
        ])))
        .mount(&mock_server)
        .await;

    let groups = directory(&mock_server).groups().await.unwrap();

    assert_eq!(
        groups,
        vec![
            DirectoryMember::group("gu-rnd", "R&D"),
            DirectoryMember::group("gu-ops", "[MURPHY] Ops"),
            DirectoryMember::group("gs-backup", "Backup services"),
        ]
    );
}

#[tokio::test]
async fn test_users_of_the_configured_group() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapGroupMembersInfo/gu-rnd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "alice", "mail": "alice@example.com"},
            {"name": "bob"}
        ])))
        .mount(&mock_server)
        .await;

    let users = directory(&mock_server).users().await.unwrap();

    let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert!(users.iter().all(|u| u.kind == MemberKind::Human));
}

#[tokio::test]
async fn test_services_are_filtered_by_prefix() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapServiceAccount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "svc-backup"},
            {"name": "robot"},
            {"name": "svc-ci"}
        ])))
        .mount(&mock_server)
        .await;

    let services = directory(&mock_server).services().await.unwrap();

    assert_eq!(
        services,
        vec![DirectoryMember::service("svc-backup"), DirectoryMember::service("svc-ci")]
    );
}

#[tokio::test]
async fn test_no_content_is_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapServiceAccount"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    assert!(directory(&mock_server).services().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_error_status_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapGroupMembersInfo/gu-rnd"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    match directory(&mock_server).users().await {
        Err(DirectoryError::Status { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_payload_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/preprod/tool/ldapUserGroup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"groups": []})))
        .mount(&mock_server)
        .await;

    assert!(matches!(
        directory(&mock_server).groups().await,
        Err(DirectoryError::InvalidResponse { .. })
    ));
}
