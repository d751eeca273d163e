//! Routing and the direct → transpile → delegate chain.

mod common;

use std::sync::atomic::Ordering;

use common::*;
use sluice_common::{QueryType, SourcesConfig};
use sluice_error::{ErrorCode, ErrorContext};
use sluice_runtime::{GatewayOptions, QueryGateway};

#[tokio::test]
async fn test_direct_success_touches_nothing_else() -> anyhow::Result<()> {
    let state = MockState::new(MockBehavior {
        rows: 3,
        ..Default::default()
    });
    let transpiler = MockTranspiler::succeeding();
    let delegate = MockDelegate::new(3);
    let gateway = QueryGateway::new(
        options(settings(2), &state)
            .with_transpiler(transpiler.clone())
            .with_delegate(delegate.clone()),
    );

    let page = gateway
        .submit(request("SELECT id, name FROM cat1.t1", QueryType::Stream, 10, 0))
        .await?;
    assert_eq!(page.entries.len(), 3);
    assert!(page.next_uri.is_none());

    assert_eq!(state.executed(), vec!["SELECT id, name FROM t1".to_string()]);
    assert_eq!(transpiler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(delegate.submits(), 0);
    Ok(())
}

#[tokio::test]
async fn test_transpiled_success_skips_delegate() -> anyhow::Result<()> {
    let state = MockState::new(MockBehavior {
        rows: 4,
        accept_only: Some(TRANSPILED_MARKER.to_string()),
        ..Default::default()
    });
    let transpiler = MockTranspiler::succeeding();
    let delegate = MockDelegate::new(3);
    let gateway = QueryGateway::new(
        options(settings(2), &state)
            .with_transpiler(transpiler.clone())
            .with_delegate(delegate.clone()),
    );

    let page = gateway
        .submit(request("SELECT * FROM cat1.t1", QueryType::Stream, 10, 0))
        .await?;
    assert_eq!(page.entries.len(), 4);

    assert_eq!(delegate.submits(), 0);
    assert_eq!(transpiler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.connects.load(Ordering::SeqCst), 2);
    let executed = state.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[1].starts_with(TRANSPILED_MARKER));
    Ok(())
}

#[tokio::test]
async fn test_both_tiers_fail_delegates_once() -> anyhow::Result<()> {
    let state = MockState::new(MockBehavior {
        rows: 4,
        accept_only: Some("never".to_string()),
        ..Default::default()
    });
    let delegate = MockDelegate::new(6);
    let gateway = QueryGateway::new(
        options(settings(2), &state)
            .with_transpiler(MockTranspiler::succeeding())
            .with_delegate(delegate.clone()),
    );

    let sql = "SELECT * FROM cat1.t1";
    let page = gateway
        .submit(request(sql, QueryType::Stream, 10, 0))
        .await?;
    assert_eq!(page.entries, (1..=6).map(mock_row).collect::<Vec<_>>());
    assert!(page.next_uri.is_none());

    assert_eq!(delegate.submits(), 1);
    // The delegate sees the statement as the client wrote it.
    assert_eq!(delegate.statements.lock().clone(), vec![sql.to_string()]);
    assert_eq!(gateway.live_queries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_every_tier_fails() {
    let state = MockState::new(MockBehavior {
        accept_only: Some("never".to_string()),
        ..Default::default()
    });
    let delegate = MockDelegate::failing();
    let gateway = QueryGateway::new(
        options(settings(2), &state)
            .with_transpiler(MockTranspiler::failing())
            .with_delegate(delegate.clone()),
    );

    let err = gateway
        .submit(request("SELECT * FROM cat1.t1", QueryType::Sync, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FallbackExhausted);
    assert!(err.message.contains("delegate engine is down"));
    match &err.context {
        Some(ErrorContext::Fallback { attempts }) => {
            let tiers: Vec<&str> = attempts.iter().map(|a| a.tier.as_str()).collect();
            assert_eq!(tiers, vec!["direct", "transpile", "delegate"]);
            assert!(attempts[0].message.contains("mock source rejected"));
            assert!(attempts[1].message.contains("cannot translate"));
        }
        other => panic!("unexpected context: {:?}", other),
    }
    assert_eq!(delegate.submits(), 1);
    assert_eq!(gateway.live_queries(), 0);
    assert!(gateway.cache().is_empty());
}

#[tokio::test]
async fn test_no_delegate_configured_exhausts_chain() {
    let state = MockState::new(MockBehavior {
        accept_only: Some("never".to_string()),
        ..Default::default()
    });
    let gateway = QueryGateway::new(
        options(settings(2), &state).with_transpiler(MockTranspiler::succeeding()),
    );

    let err = gateway
        .submit(request("SELECT * FROM cat1.t1", QueryType::Stream, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FallbackExhausted);
    assert!(err.message.contains("No delegate engine configured"));
    assert_eq!(state.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_multi_source_goes_straight_to_delegate() -> anyhow::Result<()> {
    let state = MockState::new(MockBehavior {
        rows: 100,
        ..Default::default()
    });
    let delegate = MockDelegate::new(2);
    let gateway = QueryGateway::new(options(settings(2), &state).with_delegate(delegate.clone()));

    let page = gateway
        .submit(request(
            "SELECT * FROM cat1.t1 JOIN cat2.t2 ON t1.id = t2.id",
            QueryType::Stream,
            10,
            0,
        ))
        .await?;
    assert_eq!(page.entries.len(), 2);
    assert_eq!(delegate.submits(), 1);
    assert_eq!(state.connects.load(Ordering::SeqCst), 0);

    // An unqualified table has no single source either.
    gateway
        .submit(request("SELECT * FROM t1", QueryType::Stream, 10, 0))
        .await?;
    assert_eq!(delegate.submits(), 2);
    assert_eq!(state.connects.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_multi_source_without_delegate() {
    let state = MockState::new(MockBehavior::default());
    let gateway = gateway(settings(2), &state);

    let err = gateway
        .submit(request(
            "SELECT * FROM cat1.t1, cat2.t2",
            QueryType::Stream,
            10,
            0,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DelegateUnavailable);
    assert_eq!(gateway.live_queries(), 0);
}

#[tokio::test]
async fn test_client_errors_stop_the_chain() {
    let state = MockState::new(MockBehavior::default());
    let delegate = MockDelegate::new(1);
    let gateway = QueryGateway::new(options(settings(2), &state).with_delegate(delegate.clone()));

    let mismatch = gateway
        .submit(request("SELECT * FROM other.t1", QueryType::Stream, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(mismatch.code, ErrorCode::SourceQualifierMismatch);

    let mut unknown = request("SELECT * FROM cat1.t1", QueryType::Stream, 10, 0);
    unknown.data_source_id = "ds2".to_string();
    let not_found = gateway.submit(unknown).await.unwrap_err();
    assert_eq!(not_found.code, ErrorCode::DataSourceNotFound);
    assert_eq!(not_found.hint.as_deref(), Some("Did you mean 'ds1'?"));

    let syntax = gateway
        .submit(request("SELEC * FROM cat1.t1", QueryType::Stream, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(syntax.code, ErrorCode::SyntaxError);

    assert_eq!(state.connects.load(Ordering::SeqCst), 0);
    assert_eq!(delegate.submits(), 0);
    assert_eq!(gateway.live_queries(), 0);
}

#[tokio::test]
async fn test_unsupported_source_type_is_recorded_per_tier() {
    let mut source = mock_source();
    source.source_type = "teradata".to_string();
    let gateway = QueryGateway::new(
        GatewayOptions::new(
            settings(2),
            PUBLIC_URL,
            SourcesConfig {
                sources: vec![source],
            },
        )
        .with_transpiler(MockTranspiler::succeeding()),
    );

    let err = gateway
        .submit(request("SELECT * FROM cat1.t1", QueryType::Stream, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FallbackExhausted);
    match &err.context {
        Some(ErrorContext::Fallback { attempts }) => {
            assert_eq!(attempts.len(), 3);
            for attempt in &attempts[..2] {
                assert_eq!(attempt.code, Some(ErrorCode::UnsupportedSourceType));
                assert!(attempt.message.contains("teradata"));
            }
            assert_eq!(attempts[2].tier, "delegate");
            assert_eq!(attempts[2].code, None);
        }
        other => panic!("unexpected context: {:?}", other),
    }
    assert_eq!(gateway.live_queries(), 0);
}
