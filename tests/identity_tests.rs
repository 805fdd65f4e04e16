//! Identity reconciliation tests against a mock Vault

mod common;

use common::vault_client;
use serde_json::json;
use std::collections::BTreeMap;
use vault_deployer::config::IdentityConfig;
use vault_deployer::error::IdentityError;
use vault_deployer::identity::{DirectoryMember, IdentityReconciler, LocalAssignments};
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LDAP_ACCESSOR: &str = "auth_ldap_1";
const OIDC_ACCESSOR: &str = "auth_oidc_2";

async fn mock_auth_backends(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/sys/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "token/": {"type": "token", "accessor": "auth_token_0"},
                "ldap/": {"type": "ldap", "accessor": LDAP_ACCESSOR},
                "oidc/": {"type": "oidc", "accessor": OIDC_ACCESSOR}
            }
        })))
        .mount(mock_server)
        .await;
}

async fn mock_lookup(mock_server: &MockServer, kind: &str, request: serde_json::Value, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("/v1/identity/lookup/{}", kind)))
        .and(body_partial_json(request))
        .respond_with(response)
        .mount(mock_server)
        .await;
}

fn local_users(entries: &[(&str, &[&str])]) -> LocalAssignments {
    LocalAssignments {
        users: entries
            .iter()
            .map(|(name, policies)| {
                (name.to_string(), policies.iter().map(|p| p.to_string()).collect())
            })
            .collect::<BTreeMap<_, _>>(),
        groups: BTreeMap::new(),
    }
}

#[tokio::test]
async fn test_alias_owner_is_adopted() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/v1/identity/entity-alias/id"))
        .and(query_param("list", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "keys": ["alias-a", "alias-stale", "alias-oidc"],
                "key_info": {
                    "alias-a": {"mount_accessor": LDAP_ACCESSOR, "name": "alice", "canonical_id": "A"},
                    "alias-stale": {"mount_accessor": LDAP_ACCESSOR, "name": "mallory", "canonical_id": "M"},
                    "alias-oidc": {"mount_accessor": OIDC_ACCESSOR, "name": "alice", "canonical_id": "A"}
                }
            }
        })))
        .mount(&mock_server)
        .await;

    // No entity named alice yet
    mock_lookup(&mock_server, "entity", json!({"name": "alice"}), ResponseTemplate::new(204)).await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity"))
        .and(body_json(json!({"name": "alice", "metadata": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "B", "name": "alice"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    // but someone logged in through LDAP before: the alias points to A
    mock_lookup(
        &mock_server,
        "entity",
        json!({"alias_name": "alice", "alias_mount_accessor": LDAP_ACCESSOR}),
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "A",
                "name": "entity_5c1a",
                "aliases": [
                    {"id": "alias-a", "name": "alice", "mount_accessor": LDAP_ACCESSOR, "canonical_id": "A"}
                ]
            }
        })),
    )
    .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/identity/entity/id/B"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity"))
        .and(body_partial_json(json!({
            "id": "A",
            "name": "alice",
            "policies": ["team_ro", "team_rw"],
            "metadata": {"ldap_type": "UAD"}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity-alias"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/identity/entity-alias/id/alias-stale"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/identity/entity-alias/id/alias-a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/identity/entity-alias/id/alias-oidc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(
        &client,
        &config,
        local_users(&[("alice", &["team_rw", "team_ro"])]),
    );

    let report = reconciler
        .reconcile_entities(&[DirectoryMember::human("alice")])
        .await
        .unwrap();

    assert_eq!(report.members, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.adopted, 1);
    assert_eq!(report.aliases_created, 0);
    assert_eq!(report.aliases_deleted, 1);
}

#[tokio::test]
async fn test_service_account_entity() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(
        &mock_server,
        "entity",
        json!({"name": "backup"}),
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "E1", "name": "backup", "aliases": []}
        })),
    )
    .await;
    mock_lookup(
        &mock_server,
        "entity",
        json!({"alias_name": "svc-backup"}),
        ResponseTemplate::new(204),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity"))
        .and(body_partial_json(json!({
            "id": "E1",
            "name": "backup",
            "policies": ["service-self-ro"]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity-alias"))
        .and(body_json(json!({
            "name": "svc-backup",
            "canonical_id": "E1",
            "mount_accessor": LDAP_ACCESSOR
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "alias-backup", "canonical_id": "E1"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let report = reconciler
        .reconcile_entities(&[DirectoryMember::service("svc-backup")])
        .await
        .unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.aliases_created, 1);
}

#[tokio::test]
async fn test_groups_are_external_with_sanitized_description() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(
        &mock_server,
        "group",
        json!({"name": "ops"}),
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "G1", "name": "ops", "alias": {}}
        })),
    )
    .await;
    mock_lookup(&mock_server, "group", json!({"alias_name": "ops"}), ResponseTemplate::new(204)).await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/group"))
        .and(body_json(json!({
            "id": "G1",
            "name": "ops",
            "type": "external",
            "policies": ["ops_admin"],
            "metadata": {"description": "Operations", "ldap_type": "UAD"}
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/group-alias"))
        .and(body_json(json!({
            "name": "ops",
            "canonical_id": "G1",
            "mount_accessor": LDAP_ACCESSOR
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "galias-ops"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let local = LocalAssignments {
        users: BTreeMap::new(),
        groups: BTreeMap::from([("ops".to_string(), vec!["ops_admin".to_string()])]),
    };
    let reconciler = IdentityReconciler::new(&client, &config, local);

    let report = reconciler
        .reconcile_groups(&[DirectoryMember::group("OPS", "[MURPHY] Operations")])
        .await
        .unwrap();

    assert_eq!(report.members, 1);
    assert_eq!(report.aliases_created, 1);
}

#[tokio::test]
async fn test_missing_group_is_created_as_external() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(&mock_server, "group", json!({"name": "new"}), ResponseTemplate::new(204)).await;
    mock_lookup(&mock_server, "group", json!({"alias_name": "new"}), ResponseTemplate::new(204)).await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/group"))
        .and(body_json(json!({"name": "new", "metadata": {}, "type": "external"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "G2", "name": "new"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/group"))
        .and(body_partial_json(json!({"id": "G2"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/group-alias"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "galias-new"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let report = reconciler
        .reconcile_groups(&[DirectoryMember::group("new", "")])
        .await
        .unwrap();

    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn test_lookup_without_id_is_an_invariant_violation() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(
        &mock_server,
        "entity",
        json!({"name": "alice"}),
        ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "", "name": "alice"}})),
    )
    .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let result = reconciler
        .reconcile_entities(&[DirectoryMember::human("alice")])
        .await;

    assert!(matches!(result, Err(IdentityError::InvariantViolation { .. })));
}

#[tokio::test]
async fn test_backend_not_initialized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/sys/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"token/": {"type": "token", "accessor": "auth_token_0"}}
        })))
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let result = reconciler
        .reconcile_groups(&[DirectoryMember::group("ops", "")])
        .await;

    assert!(matches!(
        result,
        Err(IdentityError::BackendNotInitialized { ref backend }) if backend == "ldap"
    ));
}

#[tokio::test]
async fn test_alias_only_mode_attaches_without_policy_update() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(
        &mock_server,
        "entity",
        json!({"name": "backup"}),
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "E1",
                "name": "backup",
                "aliases": [
                    {"id": "alias-ldap", "name": "svc-backup", "mount_accessor": LDAP_ACCESSOR, "canonical_id": "E1"}
                ]
            }
        })),
    )
    .await;
    mock_lookup(
        &mock_server,
        "entity",
        json!({"alias_name": "backup", "alias_mount_accessor": OIDC_ACCESSOR}),
        ResponseTemplate::new(204),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity-alias"))
        .and(body_json(json!({
            "name": "backup",
            "canonical_id": "E1",
            "mount_accessor": OIDC_ACCESSOR
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "alias-oidc"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let report = reconciler
        .attach_aliases_from_backends(&["oidc".to_string()], &[DirectoryMember::service("svc-backup")])
        .await
        .unwrap();

    assert_eq!(report.aliases_created, 1);
}

#[tokio::test]
async fn test_alias_only_mode_requires_existing_entity() {
    let mock_server = MockServer::start().await;
    mock_auth_backends(&mock_server).await;

    mock_lookup(&mock_server, "entity", json!({"name": "ghost"}), ResponseTemplate::new(204)).await;
    Mock::given(method("POST"))
        .and(path("/v1/identity/entity"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = vault_client(&mock_server);
    let config = IdentityConfig::default();
    let reconciler = IdentityReconciler::new(&client, &config, LocalAssignments::default());

    let result = reconciler
        .attach_aliases_from_backend("oidc", &[DirectoryMember::human("ghost")])
        .await;

    assert!(matches!(result, Err(IdentityError::InvariantViolation { .. })));
}
