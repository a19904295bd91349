//! Host-driven ticking.

mod test_utils;

use std::{
    thread,
    time::{Duration, Instant},
};

use femtotelemetry::{ClientConfig, MockTransport, TickDriver, spawn_ticker};
use rstest::rstest;
use test_utils::{client_with, memory_config};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn auto_flush(mut config: ClientConfig, interval: Duration) -> ClientConfig {
    config.enable_auto_flush = true;
    config.flush_interval = interval;
    config
}

#[rstest]
fn auto_flush_fires_after_interval(memory_config: ClientConfig) {
    let transport = MockTransport::new();
    let client = client_with(
        auto_flush(memory_config, Duration::from_secs(1)),
        transport.clone(),
    );
    client.track_event("evt");

    assert!(client.tick(Duration::from_millis(500)).is_none());
    let handle = client
        .tick(Duration::from_millis(600))
        .expect("interval elapsed");
    handle.wait().expect("flush report");

    assert_eq!(transport.call_count(), 1);
    assert_eq!(client.stats().queued_count, 0);
}

#[rstest]
fn disabled_auto_flush_never_fires(memory_config: ClientConfig) {
    let transport = MockTransport::new();
    let client = client_with(memory_config, transport.clone());
    client.track_event("evt");

    for _ in 0..10 {
        assert!(client.tick(Duration::from_secs(10)).is_none());
    }
    assert_eq!(transport.call_count(), 0);
}

#[rstest]
fn driver_ticks_every_client(memory_config: ClientConfig) {
    let transports = [MockTransport::new(), MockTransport::new()];
    let driver: TickDriver = transports
        .iter()
        .map(|transport| {
            let client = client_with(
                auto_flush(memory_config.clone(), Duration::from_secs(1)),
                transport.clone(),
            );
            client.track_event("evt");
            client
        })
        .collect();

    assert_eq!(driver.tick(Duration::from_millis(999)), 0);
    assert_eq!(driver.tick(Duration::from_millis(1)), 2);
    assert!(wait_for(|| driver
        .clients()
        .iter()
        .all(|client| client.stats().queued_count == 0)));
    assert!(transports.iter().all(|t| t.call_count() == 1));
}

#[rstest]
fn ticker_thread_drives_auto_flush(mut memory_config: ClientConfig) {
    memory_config.max_batches_per_flush = 1;
    let transport = MockTransport::new();
    let client = client_with(
        auto_flush(memory_config, Duration::from_millis(30)),
        transport.clone(),
    );
    let mut driver = TickDriver::new();
    driver.add(client.clone());

    let ticker = spawn_ticker(driver, Duration::from_millis(5));
    client.track_event("evt");

    assert!(wait_for(|| transport.call_count() == 1));
    ticker.stop();

    client.track_event("after stop");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(client.stats().queued_count, 1);
}
