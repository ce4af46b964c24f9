//! Session delegation tests

mod common;

use common::{MockState, MockTunnelConnector, orchestrator, plain_server};
use omniql_core::{ClientFeatures, DatabaseElement, OmniqlError, SelectTopRequest};
use omniql_connection::DatabaseSession;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn connected(state: &Arc<MockState>) -> Arc<DatabaseSession> {
    let tunnels = MockTunnelConnector::new();
    let orchestrator = orchestrator("pg", state, &tunnels);
    let server = plain_server("pg");
    orchestrator.connect(&server, "app").await.unwrap()
}

#[tokio::test]
async fn test_released_session_fails_before_reaching_client() {
    let state = MockState::new();
    let tunnels = MockTunnelConnector::new();
    let orchestrator = orchestrator("pg", &state, &tunnels);
    let server = plain_server("pg");

    let session = orchestrator.connect(&server, "app").await.unwrap();
    orchestrator.disconnect(&server, "app").await;
    let calls_before = state.calls().len();

    assert!(matches!(
        session.list_databases(None).await,
        Err(OmniqlError::NotConnected(ref db)) if db == "app"
    ));
    assert!(matches!(
        session.execute_query("SELECT 1").await,
        Err(OmniqlError::NotConnected(_))
    ));
    assert!(matches!(
        session.wrap_identifier("users"),
        Err(OmniqlError::NotConnected(_))
    ));
    assert!(matches!(session.features(), Err(OmniqlError::NotConnected(_))));
    assert!(matches!(
        session.list_materialized_views(None).await,
        Err(OmniqlError::NotConnected(_))
    ));
    assert!(matches!(
        session.duplicate_table("users", None, "users_copy").await,
        Err(OmniqlError::NotConnected(_))
    ));

    assert_eq!(state.calls().len(), calls_before);
}

#[tokio::test]
async fn test_optional_features_return_neutral_defaults() {
    let state = MockState::new();
    let session = connected(&state).await;

    assert!(session.list_materialized_views(None).await.unwrap().is_empty());
    assert!(
        session
            .list_materialized_view_columns("mv_sales", None)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        session
            .list_table_partitions("users", None)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        session
            .get_materialized_view_create_script("mv_sales", None)
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        session
            .duplicate_table_sql("users", None, "users_copy")
            .unwrap(),
        None
    );
    assert!(
        !session
            .duplicate_table("users", None, "users_copy")
            .await
            .unwrap()
    );

    let calls = state.calls();
    assert!(!calls.contains(&"list_materialized_views".to_string()));
    assert!(!calls.contains(&"duplicate_table_sql".to_string()));
}

#[tokio::test]
async fn test_optional_features_delegate_when_advertised() {
    let state = MockState::new();
    *state.features.lock() = ClientFeatures {
        materialized_views: true,
        duplicate_table: true,
        ..ClientFeatures::default()
    };
    let session = connected(&state).await;

    let views = session.list_materialized_views(None).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "mv_sales");

    assert_eq!(
        session
            .duplicate_table_sql("users", None, "users_copy")
            .unwrap()
            .as_deref(),
        Some("CREATE TABLE users_copy AS SELECT * FROM users;")
    );
    assert!(
        session
            .duplicate_table("users", None, "users_copy")
            .await
            .unwrap()
    );

    // The flag is advertised but the client lacks the operation
    let err = session
        .get_materialized_view_create_script("mv_sales", None)
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_session_supplies_its_database() {
    let state = MockState::new();
    let session = connected(&state).await;

    session.list_schemas(None).await.unwrap();
    session.list_tables(None).await.unwrap();
    session.truncate_all_tables(None).await.unwrap();
    session
        .select_top_stream(&SelectTopRequest::new("users", 10), Some(2))
        .await
        .unwrap();

    let calls = state.calls();
    for expected in [
        "list_schemas:app",
        "list_tables:app",
        "truncate_all_tables:app",
        "select_top_stream:app:users:2",
    ] {
        assert!(calls.contains(&expected.to_string()), "missing {expected}");
    }
}

#[tokio::test]
async fn test_stream_chunk_size_defaults_to_setting() {
    let state = MockState::new();
    let session = connected(&state).await;

    let stream = session.query_stream("SELECT id FROM users", None).await.unwrap();
    let chunks = collect_chunk_sizes(stream).await;

    assert!(state.calls().contains(&"query_stream:app:500".to_string()));
    assert_eq!(chunks, vec![3]);

    let stream = session.query_stream("SELECT id FROM users", Some(2)).await.unwrap();
    assert_eq!(collect_chunk_sizes(stream).await, vec![2, 1]);
}

async fn collect_chunk_sizes(mut stream: omniql_core::QueryStream) -> Vec<usize> {
    let mut sizes = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        sizes.push(chunk.len());
    }
    sizes
}

#[tokio::test]
async fn test_client_errors_pass_through() {
    let state = MockState::new();
    let session = connected(&state).await;

    let err = session.execute_query("SELECT syntax error").await.unwrap_err();
    assert!(matches!(err, OmniqlError::Query(ref msg) if msg.contains("syntax error")));

    let err = session.list_table_columns("missing", None).await.unwrap_err();
    assert!(matches!(err, OmniqlError::NotFound(_)));

    let err = session
        .get_routine_create_script("f", omniql_core::RoutineType::Function, None)
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_delegation_returns_client_results() {
    let state = MockState::new();
    let session = connected(&state).await;

    assert_eq!(session.version_string().await.unwrap(), "Mock 1.0");
    assert_eq!(session.wrap_identifier("users").unwrap(), "`users`");
    assert_eq!(
        session.get_primary_key("users", None).await.unwrap().as_deref(),
        Some("id")
    );

    let results = session.execute_query("SELECT id FROM users").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].row_count(), 3);

    let results = session.query("SELECT 1").await.unwrap().execute().await.unwrap();
    assert_eq!(results.len(), 1);

    session
        .drop_element("users", DatabaseElement::Table, None)
        .await
        .unwrap();
    assert!(state.calls().contains(&"drop_element:users".to_string()));
}
