//! Integration tests for the resource orchestrators using wiremock
//!
//! These tests drive create/read/update/delete/import against mocked Cloud
//! SQL Admin and BigQuery endpoints, including long-running operations that
//! fail or never finish.

use gcprov::gcp::auth::GcpCredentials;
use gcprov::gcp::client::{ApiEndpoints, GcpClient};
use gcprov::gcp::operation::PollPolicy;
use gcprov::resource::bigquery_routine::{self, Language, RoutineConfig, RoutineType};
use gcprov::resource::dispatch::{self, Manifest};
use gcprov::resource::plan::Plan;
use gcprov::resource::sql_database::{self, SqlDatabaseConfig};
use gcprov::resource::standard_sql::TypeKind;
use gcprov::{ProviderContext, ProviderError};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DB_PATH: &str = "/sql/v1beta4/projects/test-project/instances/prod1/databases";
const OP_PATH: &str = "/sql/v1beta4/projects/test-project/operations/op-1";
const ROUTINE_PATH: &str = "/bigquery/v2/projects/test-project/datasets/analytics/routines";

fn context(server: &MockServer) -> ProviderContext {
    let client = GcpClient::with_credentials(
        GcpCredentials::from_token("test-token"),
        "test-project",
        ApiEndpoints::with_root(&server.uri()),
    )
    .unwrap();
    ProviderContext::new(client).with_poll_policy(PollPolicy {
        initial: Duration::from_millis(5),
        max: Duration::from_millis(20),
        multiplier: 2,
    })
}

fn operation(status: &str) -> serde_json::Value {
    json!({
        "kind": "sql#operation",
        "name": "op-1",
        "status": status,
        "operationType": "CREATE_DATABASE"
    })
}

fn orders_response() -> serde_json::Value {
    json!({
        "kind": "sql#database",
        "project": "test-project",
        "instance": "prod1",
        "name": "orders",
        "charset": "UTF8",
        "collation": "en_US.UTF8",
        "selfLink": "https://sqladmin.googleapis.com/sql/v1beta4/projects/test-project/instances/prod1/databases/orders"
    })
}

fn orders() -> SqlDatabaseConfig {
    SqlDatabaseConfig {
        instance: "prod1".to_string(),
        name: "orders".to_string(),
        ..Default::default()
    }
}

fn add_one() -> RoutineConfig {
    RoutineConfig {
        dataset_id: "analytics".to_string(),
        routine_id: "add_one".to_string(),
        routine_type: RoutineType::ScalarFunction,
        definition_body: "x + 1".to_string(),
        ..Default::default()
    }
}

fn add_one_response(description: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "routineReference": {
            "projectId": "test-project",
            "datasetId": "analytics",
            "routineId": "add_one"
        },
        "routineType": "SCALAR_FUNCTION",
        "language": "SQL",
        "definitionBody": "x + 1",
        "arguments": [
            {"name": "x", "dataType": {"typeKind": "INT64"}}
        ],
        "creationTime": "1700000000000",
        "lastModifiedTime": "1700000000000",
        "etag": "abc"
    });
    if let Some(description) = description {
        body["description"] = json!(description);
    }
    body
}

mod sql_database_tests {
    use super::*;

    /// Create posts only the set fields, polls the operation, then reads back
    #[tokio::test]
    async fn test_create_waits_for_operation_and_reads_back() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(DB_PATH))
            .and(bearer_token("test-token"))
            .and(body_json(json!({"name": "orders", "instance": "prod1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("PENDING")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("RUNNING")))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("DONE")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(orders_response()))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        sql_database::create(&ctx, &mut db).await.unwrap();

        assert_eq!(
            db.id.as_deref(),
            Some("projects/test-project/instances/prod1/databases/orders")
        );
        assert_eq!(db.state.charset.as_deref(), Some("UTF8"));
        assert_eq!(db.state.collation.as_deref(), Some("en_US.UTF8"));
        assert_eq!(db.state.project.as_deref(), Some("test-project"));
        assert_eq!(
            db.state.self_link.as_deref(),
            Some("https://sqladmin.googleapis.com/sql/v1/projects/test-project/instances/prod1/databases/orders")
        );
    }

    /// A database that disappeared is dropped from state without error
    #[tokio::test]
    async fn test_read_not_found_marks_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "The database does not exist"}
            })))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");
        db.state.charset = Some("UTF8".to_string());

        sql_database::read(&ctx, &mut db).await.unwrap();
        assert!(!db.is_present());
        assert_eq!(db.state.charset, None);
    }

    /// Other API errors are surfaced
    #[tokio::test]
    async fn test_read_forbidden_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Permission denied"}
            })))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");

        let err = sql_database::read(&ctx, &mut db).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 403, ref message } if message == "Permission denied"));
        assert!(db.is_present());
    }

    /// Update puts under the instance lock, polls, then reads back
    #[tokio::test]
    async fn test_update_waits_for_operation_and_reads_back() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{DB_PATH}/orders")))
            .and(body_json(json!({"charset": "utf8mb4", "name": "orders", "instance": "prod1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("PENDING")))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("RUNNING")))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("DONE")))
            .mount(&server)
            .await;

        let mut updated = orders_response();
        updated["charset"] = json!("utf8mb4");
        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(updated))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut config = orders();
        config.charset = Some("utf8mb4".to_string());
        let mut db = sql_database::new(config).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");

        sql_database::update(&ctx, &mut db).await.unwrap();
        assert_eq!(db.state.charset.as_deref(), Some("utf8mb4"));
        assert!(ctx
            .locks
            .try_lock("google-sql-database-instance-test-project-prod1")
            .is_some());
    }

    /// A create whose operation fails leaves the database absent
    #[tokio::test]
    async fn test_failed_create_leaves_id_unset() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(DB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("PENDING")))
            .mount(&server)
            .await;

        let mut failed = operation("DONE");
        failed["error"] = json!({
            "errors": [{"code": "DATABASE_ALREADY_EXISTS", "message": "orders exists"}]
        });
        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(failed))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(orders_response()))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();

        let err = sql_database::create(&ctx, &mut db).await.unwrap_err();
        match err {
            ProviderError::OperationFailed { action, reason } => {
                assert_eq!(action, "Creating Database");
                assert!(reason.contains("orders exists"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!db.is_present());
        assert_eq!(db.state.charset, None);
    }

    /// A read that hangs gives up at the read deadline
    #[tokio::test]
    async fn test_hung_read_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(orders_response())
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let mut ctx = context(&server);
        ctx.client = ctx.client.with_read_timeout(Duration::from_millis(100));
        let mut db = sql_database::new(orders()).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");

        let started = std::time::Instant::now();
        let err = sql_database::read(&ctx, &mut db).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(db.is_present());
    }

    /// Deleting something already gone succeeds
    #[tokio::test]
    async fn test_delete_not_found_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Not found"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");

        sql_database::delete(&ctx, &mut db).await.unwrap();
        assert!(!db.is_present());
    }

    /// An operation that finishes with errors fails the call
    #[tokio::test]
    async fn test_failed_operation_reports_reason() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("PENDING")))
            .mount(&server)
            .await;

        let mut failed = operation("DONE");
        failed["error"] = json!({
            "errors": [{"code": "INTERNAL_ERROR", "message": "database is in use"}]
        });
        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(failed))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        db.set_id("projects/test-project/instances/prod1/databases/orders");

        let err = sql_database::delete(&ctx, &mut db).await.unwrap_err();
        match err {
            ProviderError::OperationFailed { action, reason } => {
                assert_eq!(action, "Deleting Database");
                assert!(reason.contains("database is in use"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(db.is_present());
    }

    /// An operation that never finishes times out at the deadline
    #[tokio::test]
    async fn test_operation_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(DB_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("PENDING")))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(operation("RUNNING")))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut db = sql_database::new(orders()).unwrap();
        db.timeouts.create = Duration::from_millis(200);

        let started = std::time::Instant::now();
        let err = sql_database::create(&ctx, &mut db).await.unwrap_err();
        assert!(matches!(err, ProviderError::OperationTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!db.is_present());
    }

    /// Short import ids take the provider project
    #[tokio::test]
    async fn test_import_short_form() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(orders_response()))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let db = sql_database::import(&ctx, "prod1/orders", None).await.unwrap();
        assert_eq!(
            db.id.as_deref(),
            Some("projects/test-project/instances/prod1/databases/orders")
        );
        assert_eq!(db.config.instance, "prod1");
        assert_eq!(db.config.name, "orders");
    }

    /// Importing something that doesn't exist is an error
    #[tokio::test]
    async fn test_import_missing_database() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let err = sql_database::import(&ctx, "projects/test-project/instances/prod1/databases/orders", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    /// Apply of an existing database with only server defaults does nothing
    #[tokio::test]
    async fn test_apply_is_noop_when_in_sync() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DB_PATH}/orders")))
            .respond_with(ResponseTemplate::new(200).set_body_json(orders_response()))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let report = dispatch::apply(&ctx, Manifest::SqlDatabase(orders())).await.unwrap();
        assert_eq!(report.plan, Some(Plan::NoOp));
        assert!(report.present);
    }
}

mod bigquery_routine_tests {
    use super::*;

    /// Create sends the reference and reads the routine back
    #[tokio::test]
    async fn test_create_and_read_back() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(ROUTINE_PATH))
            .and(body_partial_json(json!({
                "routineReference": {
                    "projectId": "test-project",
                    "datasetId": "analytics",
                    "routineId": "add_one"
                },
                "routineType": "SCALAR_FUNCTION",
                "definitionBody": "x + 1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(None)))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(None)))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut routine = bigquery_routine::new(add_one()).unwrap();
        bigquery_routine::create(&ctx, &mut routine).await.unwrap();

        assert_eq!(
            routine.id.as_deref(),
            Some("projects/test-project/datasets/analytics/routines/add_one")
        );
        assert_eq!(routine.state.language, Some(Language::Sql));
        assert_eq!(routine.state.creation_time, Some(1_700_000_000_000));
        assert_eq!(routine.state.etag.as_deref(), Some("abc"));
        let args = routine.state.arguments.as_ref().unwrap();
        assert_eq!(args[0].name.as_deref(), Some("x"));
    }

    /// Update puts the whole routine with the new description
    #[tokio::test]
    async fn test_update_description() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .and(body_partial_json(json!({"description": "adds one"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(Some("adds one"))))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(Some("adds one"))))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut config = add_one();
        config.description = Some("adds one".to_string());
        let mut routine = bigquery_routine::new(config).unwrap();
        routine.set_id("projects/test-project/datasets/analytics/routines/add_one");

        bigquery_routine::update(&ctx, &mut routine).await.unwrap();
        assert_eq!(routine.state.description.as_deref(), Some("adds one"));
    }

    /// Values newer than this crate are read back as they are
    #[tokio::test]
    async fn test_read_and_import_keep_newer_enum_values() {
        let server = MockServer::start().await;

        let mut body = add_one_response(None);
        body["routineType"] = json!("TABLE_VALUED_FUNCTION");
        body["language"] = json!("PYTHON");
        body["returnType"] = json!({"typeKind": "JSON"});
        body["arguments"] = json!([
            {"name": "t", "argumentKind": "ANY_TABLE", "dataType": {"typeKind": "BIGNUMERIC"}}
        ]);
        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let id = "projects/test-project/datasets/analytics/routines/add_one";
        let mut routine = bigquery_routine::new(add_one()).unwrap();
        routine.set_id(id);

        bigquery_routine::read(&ctx, &mut routine).await.unwrap();
        assert!(routine.is_present());
        assert_eq!(
            routine.state.routine_type,
            Some(RoutineType::Other("TABLE_VALUED_FUNCTION".to_string()))
        );
        assert_eq!(routine.state.language, Some(Language::Other("PYTHON".to_string())));
        assert_eq!(
            routine.state.return_type.as_ref().map(|t| t.type_kind.clone()),
            Some(TypeKind::Other("JSON".to_string()))
        );

        let imported = bigquery_routine::import(&ctx, id, None).await.unwrap();
        assert_eq!(
            imported.config.routine_type,
            RoutineType::Other("TABLE_VALUED_FUNCTION".to_string())
        );

        let report = dispatch::read_resource(&ctx, "bigquery_routine", id).await.unwrap();
        assert_eq!(report.state["routine_type"], "TABLE_VALUED_FUNCTION");

        let (_, plan) = dispatch::plan_manifest(&ctx, Manifest::BigqueryRoutine(add_one()))
            .await
            .unwrap();
        assert!(matches!(plan, Plan::Replace(ref fields) if fields.contains(&"routine_type".to_string())));
    }

    /// Delete and a subsequent read both reconcile to absent
    #[tokio::test]
    async fn test_delete_then_read() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let id = "projects/test-project/datasets/analytics/routines/add_one";

        let report = dispatch::delete_resource(&ctx, "bigquery_routine", id).await.unwrap();
        assert!(!report.present);

        let report = dispatch::read_resource(&ctx, "bigquery_routine", id).await.unwrap();
        assert!(!report.present);
        assert_eq!(report.id, None);
    }

    /// Import fills the configuration from the remote routine
    #[tokio::test]
    async fn test_import_with_dataset_hint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(Some("adds one"))))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let routine = bigquery_routine::import(&ctx, "add_one", Some("analytics")).await.unwrap();
        assert_eq!(routine.config.dataset_id, "analytics");
        assert_eq!(routine.config.routine_type, RoutineType::ScalarFunction);
        assert_eq!(routine.config.definition_body, "x + 1");
        assert_eq!(routine.config.description.as_deref(), Some("adds one"));
    }

    /// A changed routine type can't be updated in place
    #[tokio::test]
    async fn test_plan_replace_on_routine_type_change() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{ROUTINE_PATH}/add_one")))
            .respond_with(ResponseTemplate::new(200).set_body_json(add_one_response(None)))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let mut config = add_one();
        config.routine_type = RoutineType::Procedure;

        let (_, plan) = dispatch::plan_manifest(&ctx, Manifest::BigqueryRoutine(config))
            .await
            .unwrap();
        assert_eq!(plan, Plan::Replace(vec!["routine_type".to_string()]));
    }
}
