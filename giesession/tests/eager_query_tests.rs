//! Eager wrappers: InteractiveQuery and ResultSet

#[path = "testutils/mod.rs"]
mod testutils;

use giesession::{
    DagNode, EngineStatus, InteractiveQuery, RequestOptions, ResultSet, SessionError, Value,
};
use testutils::fixture::{Fixture, YEAR_WINDOW_SCRIPT};

#[test]
fn test_launch_and_describe() {
    let fixture = Fixture::new();
    let session = fixture.session();

    let query = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();
    assert_eq!(query.status(), EngineStatus::Running);
    assert!(!query.closed());
    assert!(query.error_msg().is_none());
    assert_eq!(query.object_id(), fixture.graph.object_id);
    assert_eq!(
        query.graph_url(),
        format!("ws://{}/gremlin", query.frontend_endpoint())
    );
    assert!(query.node().evaluated());

    let connection = query.traversal_source().unwrap();
    assert_eq!(connection.url, query.graph_url());
    assert_eq!(connection.traversal_source, "g");
}

#[test]
fn test_execute_returns_complete_result_set() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let query = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();

    let count = query.execute("g.V().count()").unwrap();
    assert_eq!(count.one().unwrap(), Value::Integer(10));

    let years = query
        .execute("g.V().has('year', between(2015, 2017)).values('year')")
        .unwrap();
    assert_eq!(years.len(), 2);
    assert_eq!(
        years.all().unwrap(),
        Value::List(vec![Value::Integer(2015), Value::Integer(2016)])
    );
    assert!(session.objects().contains(years.key()));

    let mut options = RequestOptions::new();
    options.insert("engine".into(), "gae".into());
    let empty = query
        .execute_with_options("g.V().has('year', gt(2100))", &options)
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.one().unwrap(), Value::Null);
    assert_eq!(empty.all().unwrap(), Value::List(vec![]));

    // eager calls stay out of the op graph
    assert_eq!(session.op_count(), 1);

    // and their results leave the registry with the result set
    let key = years.key().to_string();
    drop(years);
    assert!(!session.objects().contains(&key));
    assert!(session.objects().contains(count.key()));
}

#[test]
fn test_result_set_from_lazy_node() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let engine = session.gremlin(&fixture.graph, None).unwrap();

    let node = engine.execute("g.E().hasLabel('cites').count()").unwrap();
    let result = ResultSet::new(node).unwrap();
    assert_eq!(result.values(), &[Value::Integer(9)]);
    assert_eq!(result.one().unwrap(), Value::Integer(9));
    assert_eq!(result.all().unwrap(), Value::List(vec![Value::Integer(9)]));

    // engine, query and one fetch per call
    assert_eq!(session.op_count(), 4);
    assert_eq!(fixture.cluster.submitted("hasLabel('cites')"), 1);
}

#[test]
fn test_eager_subgraph() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let query = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();

    let meta = query.subgraph(YEAR_WINDOW_SCRIPT).unwrap();
    assert_eq!((meta.vertex_count, meta.edge_count), (9, 5));
    assert!(session.objects().contains(&meta.key));

    let derived = InteractiveQuery::launch(session.gremlin(&meta, None).unwrap()).unwrap();
    let count = derived.execute("g.E().count()").unwrap();
    assert_eq!(count.one().unwrap(), Value::Integer(5));
}

#[test]
fn test_close_is_idempotent_and_final() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let query = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();

    query.close().unwrap();
    query.close().unwrap();
    assert!(query.closed());
    assert_eq!(fixture.cluster.local().engine_count(), 0);

    assert!(matches!(
        query.execute("g.V().count()"),
        Err(SessionError::EngineUnavailable {
            status: EngineStatus::Closed,
            ..
        })
    ));
    assert!(matches!(
        query.subgraph(YEAR_WINDOW_SCRIPT),
        Err(SessionError::EngineUnavailable { .. })
    ));
    assert!(query.traversal_source().is_err());
}

#[test]
fn test_failed_script_is_reported_on_the_handle() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let query = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();

    assert!(matches!(
        query.execute("g.V().has('year', inside(2014))"),
        Err(SessionError::RemoteExecution(_))
    ));
    assert_eq!(query.status(), EngineStatus::Failed);
    assert!(query.error_msg().is_some());
    assert!(matches!(
        query.execute("g.V().count()"),
        Err(SessionError::EngineUnavailable {
            status: EngineStatus::Failed,
            ..
        })
    ));

    // a failed engine still accepts close
    query.close().unwrap();
    assert_eq!(query.status(), EngineStatus::Failed);
}

#[test]
fn test_replaced_engine_reports_closed() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let old = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();
    old.close().unwrap();

    let new = InteractiveQuery::launch(session.gremlin(&fixture.graph, None).unwrap()).unwrap();
    assert_eq!(new.status(), EngineStatus::Running);
    assert!(old.closed());

    // closing the stale wrapper leaves the new engine alone
    old.close().unwrap();
    assert_eq!(new.status(), EngineStatus::Running);
    assert_eq!(
        new.execute("g.V().count()").unwrap().one().unwrap(),
        Value::Integer(10)
    );
}
