use super::*;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

use shared::protocol::Deployment;

type FormSender = Arc<Mutex<Option<oneshot::Sender<Vec<(String, String)>>>>>;

async fn spawn_api_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn ok(info: Value) -> Json<Value> {
    Json(json!({ "code": 0, "info": info }))
}

fn sample_deployment(name: &str, replicas: i32, revision: i64) -> Deployment {
    Deployment {
        name: name.to_string(),
        image_name: format!("registry/{name}"),
        image: format!("registry/{name}:v{revision}"),
        replicas,
        revision,
        image_tags: None,
    }
}

fn config_json(id: i64) -> Value {
    json!({
        "id": id,
        "app_id": "app1",
        "status": 0,
        "version": format!("1.0.{id}"),
        "host": "*",
        "instance_id": "*",
        "commit_id": format!("c{id}"),
        "md5sum": "d41d8cd98f00b204e9800998ecf8427e",
        "author": "ops",
        "created_time": 1_700_000_000_i64 + id,
        "updated_time": 1_700_000_000_i64 + id,
    })
}

async fn next_phase(rx: &mut broadcast::Receiver<CommandEvent>) -> CommandEvent {
    tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("phase in time")
        .expect("event stream alive")
}

#[tokio::test]
async fn list_apps_success_replaces_store_and_walks_phases() {
    let app = Router::new().route(
        "/api/v1/list",
        get(|| async { ok(json!({ "app_ids": ["app1", "app2"] })) }),
    );
    let client = ConsoleClient::new(spawn_api_server(app).await);
    let mut phases = client.subscribe_commands();

    let payload = client.list_apps().await.expect("list apps");
    assert_eq!(payload.app_ids, vec!["app1", "app2"]);

    let snapshot = client.snapshot().await;
    assert_eq!(
        snapshot.app.app_ids,
        Some(vec!["app1".to_string(), "app2".to_string()])
    );

    let pending = next_phase(&mut phases).await;
    assert_eq!(pending.kind, CommandKind::ListApps);
    assert_eq!(pending.phase, CommandPhase::Pending);
    let done = next_phase(&mut phases).await;
    assert_eq!(done.phase, CommandPhase::Succeeded);
}

#[tokio::test]
async fn sync_replaces_the_app_set_wholesale() {
    let app = Router::new()
        .route(
            "/api/v1/list",
            get(|| async { ok(json!({ "app_ids": ["app1", "app2"] })) }),
        )
        .route(
            "/api/v1/sync",
            post(|| async {
                ok(json!({
                    "app_ids": ["app1", "app2", "app3"],
                    "head": { "name": "refs/heads/app3", "app_id": "app3", "commit_id": "c9" },
                }))
            }),
        );
    let client = ConsoleClient::new(spawn_api_server(app).await);

    client.list_apps().await.expect("list apps");
    let payload = client.sync_app(None).await.expect("sync");
    assert_eq!(payload.head.expect("head").commit_id, "c9");

    let snapshot = client.snapshot().await;
    assert_eq!(
        snapshot.app.app_ids,
        Some(vec![
            "app1".to_string(),
            "app2".to_string(),
            "app3".to_string()
        ])
    );
}

#[tokio::test]
async fn api_error_carries_status_and_message_and_skips_the_store() {
    let app = Router::new().route(
        "/api/v1/kube/list",
        get(|| async { Json(json!({ "code": 500, "info": "kube unavailable" })) }),
    );
    let client = ConsoleClient::new(spawn_api_server(app).await);
    let mut phases = client.subscribe_commands();

    let err = client.list_deployments().await.expect_err("must fail");
    match &err {
        CommandError::Api(api) => {
            assert_eq!(api.status, 500);
            assert_eq!(api.message, "kube unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(client.snapshot().await.kube.deployments.is_none());

    assert_eq!(next_phase(&mut phases).await.phase, CommandPhase::Pending);
    assert_eq!(
        next_phase(&mut phases).await.phase,
        CommandPhase::Failed {
            status: Some(500),
            message: "kube unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn transport_failure_surfaces_without_an_envelope_code() {
    // grab a port and release it so the connect is refused
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = ConsoleClient::new(format!("http://{addr}"));
    let err = client.list_apps().await.expect_err("must fail");
    assert!(matches!(err, CommandError::Transport(_)));
    assert_eq!(err.status(), None);
    assert!(client.snapshot().await.app.app_ids.is_none());
}

#[tokio::test]
async fn non_envelope_body_is_a_decode_error() {
    let app = Router::new().route("/api/v1/list", get(|| async { "gateway timeout" }));
    let client = ConsoleClient::new(spawn_api_server(app).await);

    let err = client.list_apps().await.expect_err("must fail");
    assert!(matches!(err, CommandError::Envelope(_)));
}

#[tokio::test]
async fn publish_sends_the_form_and_prepends_the_config() {
    let (form_tx, form_rx) = oneshot::channel();
    let capture: FormSender = Arc::new(Mutex::new(Some(form_tx)));

    async fn handle_publish(
        State(capture): State<FormSender>,
        Form(form): Form<Vec<(String, String)>>,
    ) -> Json<Value> {
        if let Some(tx) = capture.lock().await.take() {
            let _ = tx.send(form);
        }
        ok(json!({ "app_id": "app1", "config": config_json(3) }))
    }

    let app = Router::new()
        .route(
            "/api/v1/list/:app_id/configs",
            get(|| async { ok(json!({ "configs": [config_json(2)] })) }),
        )
        .route("/api/v1/publish/:app_id", post(handle_publish))
        .with_state(capture);
    let client = ConsoleClient::new(spawn_api_server(app).await);

    client.list_configs("app1").await.expect("configs");
    client
        .publish_config(
            "app1",
            PublishParams {
                commit_id: "c1".to_string(),
                host: "h".to_string(),
                instance_id: "i1".to_string(),
                version: "1".to_string(),
            },
        )
        .await
        .expect("publish");

    let form = form_rx.await.expect("form");
    assert_eq!(
        form,
        vec![
            ("commit_id".to_string(), "c1".to_string()),
            ("host".to_string(), "h".to_string()),
            ("instance_id".to_string(), "i1".to_string()),
            ("version".to_string(), "1".to_string()),
        ]
    );

    let configs = client.snapshot().await.app.configs.expect("configs");
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].id, ConfigId(3));
    assert_eq!(configs[1].id, ConfigId(2));
}

#[tokio::test]
async fn rollback_posts_the_id_and_filters_the_config_out() {
    let (form_tx, form_rx) = oneshot::channel();
    let capture: FormSender = Arc::new(Mutex::new(Some(form_tx)));

    async fn handle_rollback(
        State(capture): State<FormSender>,
        Form(form): Form<Vec<(String, String)>>,
    ) -> Json<Value> {
        if let Some(tx) = capture.lock().await.take() {
            let _ = tx.send(form);
        }
        ok(json!({ "config": config_json(2) }))
    }

    let app = Router::new()
        .route(
            "/api/v1/list/:app_id/configs",
            get(|| async { ok(json!({ "configs": [config_json(3), config_json(2)] })) }),
        )
        .route("/api/v1/rollback/:app_id", post(handle_rollback))
        .with_state(capture);
    let client = ConsoleClient::new(spawn_api_server(app).await);

    client.list_configs("app1").await.expect("configs");
    client
        .rollback_config("app1", ConfigId(2))
        .await
        .expect("rollback");

    assert_eq!(
        form_rx.await.expect("form"),
        vec![("id".to_string(), "2".to_string())]
    );

    let configs = client.snapshot().await.app.configs.expect("configs");
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].id, ConfigId(3));
}

#[tokio::test]
async fn kube_mutation_replaces_the_deployment_in_place() {
    let app = Router::new()
        .route(
            "/api/v1/kube/list",
            get(|| async {
                ok(json!({
                    "deployments": [
                        sample_deployment("web", 2, 1),
                        sample_deployment("worker", 2, 4),
                    ],
                }))
            }),
        )
        .route(
            "/api/v1/kube/setreplicas/:name",
            post(|Form(form): Form<Vec<(String, String)>>| async move {
                assert_eq!(form, vec![("replicas".to_string(), "5".to_string())]);
                ok(json!({ "deployment": sample_deployment("web", 5, 2) }))
            }),
        );
    let client = ConsoleClient::new(spawn_api_server(app).await);

    client.list_deployments().await.expect("list");
    client.set_replicas("web", 5).await.expect("set replicas");

    let deployments = client.snapshot().await.kube.deployments.expect("deployments");
    assert_eq!(deployments.len(), 2);
    assert_eq!(deployments[0], sample_deployment("web", 5, 2));
    assert_eq!(deployments[1], sample_deployment("worker", 2, 4));
}

#[tokio::test]
async fn kube_mutation_for_an_unloaded_name_leaves_the_store_alone() {
    let app = Router::new().route(
        "/api/v1/kube/restart/:name",
        post(|| async { ok(json!({ "deployment": sample_deployment("web", 2, 3) })) }),
    );
    let client = ConsoleClient::new(spawn_api_server(app).await);

    let payload = client.restart_deployment("web").await.expect("restart");
    assert_eq!(payload.deployment.revision, 3);
    assert!(client.snapshot().await.kube.deployments.is_none());
}

#[tokio::test]
async fn detail_fetch_does_not_touch_the_store() {
    let app = Router::new().route(
        "/api/v1/kube/detail/:name",
        get(|| async {
            ok(json!({
                "deployment": sample_deployment("web", 2, 1),
                "hpa": { "name": "web", "min_replicas": 2, "max_replicas": 6 },
            }))
        }),
    );
    let client = ConsoleClient::new(spawn_api_server(app).await);

    let detail = client.get_detail("web").await.expect("detail");
    assert_eq!(detail.deployment.expect("deployment").name, "web");
    assert_eq!(detail.hpa.expect("hpa").max_replicas, 6);

    assert_eq!(client.snapshot().await, EntityStore::default());
}

#[tokio::test]
async fn tags_fetch_attaches_tags_to_the_named_deployment() {
    let app = Router::new()
        .route(
            "/api/v1/kube/list",
            get(|| async { ok(json!({ "deployments": [sample_deployment("web", 2, 1)] })) }),
        )
        .route(
            "/api/v1/kube/listtags/:name",
            get(|| async { ok(json!({ "tags": ["v2", "v1"] })) }),
        );
    let client = ConsoleClient::new(spawn_api_server(app).await);

    client.list_deployments().await.expect("list");
    client.list_tags("web").await.expect("tags");

    let deployments = client.snapshot().await.kube.deployments.expect("deployments");
    assert_eq!(
        deployments[0].image_tags,
        Some(vec!["v2".to_string(), "v1".to_string()])
    );
}
