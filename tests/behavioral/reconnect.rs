// ABOUTME: Behavioral tests for bounded reconnect and dormancy
// Verifies attempt counting, reconnect spacing, and reset on successful open

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::{sleep, Instant};
use wsfleet::fleet::{Connection, ConnectionState, EgressRoute};

use super::fixtures::{connection_config, context, target, Outcome, ScriptedTransport};

const MS: Duration = Duration::from_millis(1);

async fn wait_dormant(connection: &Connection) {
    let mut status = connection.subscribe();
    status
        .wait_for(|s| s.state == ConnectionState::Dormant)
        .await
        .unwrap();
}

/// Failures at every attempt: two opens ten milliseconds apart, then dormant
#[tokio::test(start_paused = true)]
async fn test_failing_connection_goes_dormant_after_budget() {
    let transport = ScriptedTransport::new(Outcome::Fail);
    let ctx = context(&transport);
    let start = Instant::now();

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 2, 5),
    );
    wait_dormant(&connection).await;

    assert_eq!(start.elapsed(), 20 * MS, "Dormant once the third attempt is counted");
    assert_eq!(transport.open_offsets(start), vec![Duration::ZERO, 10 * MS]);
    assert_eq!(connection.attempts(), 3);

    // Nothing is scheduled after dormancy
    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(connection.state(), ConnectionState::Dormant);

    let metrics = ctx.metrics().snapshot();
    assert_eq!(metrics.open_attempts, 2);
    assert_eq!(metrics.connections_dormant, 1);
    assert_eq!(metrics.reconnects_scheduled, 2);

    ctx.shutdown().await;
}

/// A request that cannot be constructed still consumes the attempt and retries
#[tokio::test(start_paused = true)]
async fn test_construction_failure_does_not_stall() {
    let transport = ScriptedTransport::new(Outcome::Refuse);
    let ctx = context(&transport);
    let start = Instant::now();

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 2, 5),
    );

    // First connect happens during construction
    assert_eq!(transport.open_count(), 1);
    assert_eq!(connection.state(), ConnectionState::ReconnectPending);

    wait_dormant(&connection).await;
    assert_eq!(transport.open_offsets(start), vec![Duration::ZERO, 10 * MS]);
    assert_eq!(ctx.metrics().snapshot().construction_failures, 2);

    ctx.shutdown().await;
}

/// A successful open resets the counter, so a later failure streak gets a full budget
#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempts() {
    let transport = ScriptedTransport::scripted([Outcome::Fail, Outcome::Accept], Outcome::Fail);
    let ctx = context(&transport);
    let start = Instant::now();

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 2, 1_000),
    );

    let mut status = connection.subscribe();
    status
        .wait_for(|s| s.state == ConnectionState::Open)
        .await
        .unwrap();
    assert_eq!(start.elapsed(), 10 * MS);
    assert_eq!(connection.attempts(), 0);
    assert!(connection.status().session.is_some());

    let mut probe = transport.take_probe().unwrap();
    assert_eq!(connection.status().session, Some(probe.id));
    probe.close();

    wait_dormant(&connection).await;
    assert_eq!(
        transport.open_offsets(start),
        vec![Duration::ZERO, 10 * MS, 20 * MS, 30 * MS]
    );
    assert_eq!(start.elapsed(), 40 * MS);
    assert!(probe.is_released());

    ctx.shutdown().await;
}

/// A mid-session failure is handled like a close
#[tokio::test(start_paused = true)]
async fn test_session_failure_schedules_reconnect() {
    let transport = ScriptedTransport::scripted([Outcome::Accept], Outcome::Hang);
    let ctx = context(&transport);
    let start = Instant::now();

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 4, 1_000),
    );
    let mut status = connection.subscribe();
    status
        .wait_for(|s| s.state == ConnectionState::Open)
        .await
        .unwrap();

    sleep(3 * MS).await;
    transport.take_probe().unwrap().fail();

    status
        .wait_for(|s| s.state == ConnectionState::Connecting)
        .await
        .unwrap();
    assert_eq!(start.elapsed(), 13 * MS);
    assert_eq!(connection.attempts(), 1);
    assert_eq!(transport.open_count(), 2);

    ctx.shutdown().await;
}

/// A hung handshake times out and counts as a failure
#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_counts_as_failure() {
    let transport = ScriptedTransport::new(Outcome::Hang);
    let ctx = context(&transport);
    let start = Instant::now();

    let mut config = connection_config(10, 1, 1_000);
    config.connect_timeout = 100 * MS;
    let connection = Connection::spawn(&ctx, 0, target(), EgressRoute::Direct, config);

    wait_dormant(&connection).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(start.elapsed(), 110 * MS);

    ctx.shutdown().await;
}

/// With no budget at all the connection never opens
#[tokio::test(start_paused = true)]
async fn test_zero_budget_never_opens() {
    let transport = ScriptedTransport::new(Outcome::Accept);
    let ctx = context(&transport);

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 0, 5),
    );

    assert_eq!(connection.state(), ConnectionState::Dormant);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.open_count(), 0);

    ctx.shutdown().await;
}

/// Repeated close and reopen cycles never pile up timers
///
/// While open a connection holds its actor, the session watcher and one
/// keepalive timer. While waiting to reconnect it holds the actor and one
/// reconnect timer.
#[tokio::test(start_paused = true)]
async fn test_timer_count_stays_bounded_across_reopens() {
    let transport = ScriptedTransport::new(Outcome::Accept);
    let ctx = context(&transport);

    let connection = Connection::spawn(
        &ctx,
        0,
        target(),
        EgressRoute::Direct,
        connection_config(10, 4, 5),
    );
    let mut status = connection.subscribe();

    for cycle in 1..=8 {
        status
            .wait_for(|s| s.state == ConnectionState::Open)
            .await
            .unwrap();
        sleep(MS).await;
        assert_eq!(ctx.task_count(), 3, "open tasks in cycle {cycle}");

        transport.take_probe().unwrap().close();
        status
            .wait_for(|s| s.state == ConnectionState::ReconnectPending)
            .await
            .unwrap();
        sleep(MS).await;
        assert_eq!(ctx.task_count(), 2, "reconnect tasks in cycle {cycle}");
    }

    assert_eq!(transport.open_count(), 8);
    assert_eq!(connection.attempts(), 0);

    ctx.shutdown().await;
}
