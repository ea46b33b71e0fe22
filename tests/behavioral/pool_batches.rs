// ABOUTME: Behavioral tests for batch creation and route rotation
// Verifies every batch shares one route and routes stay fixed across reconnects

use std::collections::HashMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::sleep;
use wsfleet::fleet::{
    ConnectionPool, ConnectionState, EgressRoute, FixedRoute, RoundRobinRoutes, RouteProvider,
};

use super::fixtures::{connection_config, context, proxy, target, Outcome, ScriptedTransport};

/// Round robin that counts advances
struct CountingRoutes {
    inner: RoundRobinRoutes,
    advances: usize,
}

impl RouteProvider for CountingRoutes {
    fn current(&self) -> EgressRoute {
        self.inner.current()
    }

    fn advance(&mut self) {
        self.advances += 1;
        self.inner.advance();
    }
}

fn four_proxies() -> Vec<EgressRoute> {
    (0..4).map(|i| proxy(8080 + i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_batches_rotate_routes() {
    let transport = ScriptedTransport::new(Outcome::Fail);
    let ctx = context(&transport);
    let routes = CountingRoutes {
        inner: RoundRobinRoutes::new(four_proxies()).unwrap(),
        advances: 0,
    };

    let mut pool = ConnectionPool::new(ctx.clone(), target(), connection_config(10, 3, 5), routes);
    pool.run(4, 2);

    assert_eq!(pool.len(), 8);
    assert_eq!(pool.routes().advances, 4);

    let expected = four_proxies();
    for (i, connection) in pool.connections().iter().enumerate() {
        assert_eq!(connection.index(), i);
        assert_eq!(connection.route(), &expected[i / 2], "connection {i}");
    }

    // First connects are issued during creation, in order
    let first_opens: Vec<EgressRoute> = transport.opens().into_iter().map(|o| o.route).collect();
    let expected_opens: Vec<EgressRoute> = expected
        .iter()
        .flat_map(|route| [route.clone(), route.clone()])
        .collect();
    assert_eq!(first_opens, expected_opens);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_routes_fixed_across_reconnects() {
    let transport = ScriptedTransport::new(Outcome::Fail);
    let ctx = context(&transport);

    let mut pool = ConnectionPool::new(
        ctx.clone(),
        target(),
        connection_config(10, 3, 5),
        RoundRobinRoutes::new(four_proxies()).unwrap(),
    );
    pool.run(4, 2);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.state_counts().get(&ConnectionState::Dormant), Some(&8));

    // Three opens per connection, two connections per route
    let mut per_route: HashMap<EgressRoute, usize> = HashMap::new();
    for open in transport.opens() {
        *per_route.entry(open.route).or_default() += 1;
    }
    assert_eq!(per_route.len(), 4);
    assert!(per_route.values().all(|&count| count == 6));

    // Rotation wrapped back to the first proxy after four advances
    assert_eq!(pool.routes().current(), four_proxies()[0]);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_direct_pool_uses_one_route() {
    let transport = ScriptedTransport::new(Outcome::Accept);
    let ctx = context(&transport);

    let mut pool = ConnectionPool::new(
        ctx.clone(),
        target(),
        connection_config(10, 3, 5),
        FixedRoute(EgressRoute::Direct),
    );
    pool.run(3, 3);

    sleep(Duration::from_millis(1)).await;
    assert_eq!(pool.len(), 9);
    assert!(pool.connections().iter().all(|c| c.route() == &EgressRoute::Direct));
    assert_eq!(pool.state_counts().get(&ConnectionState::Open), Some(&9));
    assert_eq!(ctx.metrics().snapshot().connections_open, 9);

    ctx.shutdown().await;
}
