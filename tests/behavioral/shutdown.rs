// ABOUTME: Behavioral tests for fleet teardown
// Verifies pending timers never fire after shutdown and sessions are released

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::sleep;
use wsfleet::fleet::{
    Connection, ConnectionPool, ConnectionState, EgressRoute, FixedRoute, TimerError,
};

use super::fixtures::{connection_config, context, target, Outcome, ScriptedTransport};

#[tokio::test(start_paused = true)]
async fn test_pending_reconnect_never_fires_after_shutdown() {
    let transport = ScriptedTransport::new(Outcome::Fail);
    let ctx = context(&transport);

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(50, 4, 5),
    );
    sleep(Duration::from_millis(1)).await;
    assert_eq!(connection.state(), ConnectionState::ReconnectPending);

    ctx.shutdown().await;
    assert_eq!(ctx.task_count(), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_open_sessions() {
    let transport = ScriptedTransport::new(Outcome::Accept);
    let ctx = context(&transport);

    let mut pool = ConnectionPool::new(
        ctx.clone(),
        target(),
        connection_config(10, 4, 5),
        FixedRoute(EgressRoute::Direct),
    );
    pool.run(2, 2);
    sleep(Duration::from_millis(6)).await;

    let mut probes: Vec<_> = std::iter::from_fn(|| transport.take_probe()).collect();
    assert_eq!(probes.len(), 4);
    assert!(probes.iter_mut().all(|p| p.drain().len() == 1));

    ctx.shutdown().await;
    assert!(ctx.is_shutting_down());
    assert!(probes.iter_mut().all(|p| p.is_released()));
    assert_eq!(ctx.metrics().snapshot().connections_open, 0);

    // No more keepalives once torn down
    sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.metrics().snapshot().keepalives_sent, 4);
}

#[tokio::test(start_paused = true)]
async fn test_timers_refuse_work_after_shutdown() {
    let transport = ScriptedTransport::new(Outcome::Fail);
    let ctx = context(&transport);

    ctx.shutdown().await;

    let result = ctx.timers().once(Duration::from_millis(1), || {});
    assert!(matches!(result, Err(TimerError::ShutDown)));
    assert!(!ctx.timers().is_running());
}
