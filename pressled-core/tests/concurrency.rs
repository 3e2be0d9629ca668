//! Cross-context consistency on a multi-threaded runtime with real time.

use std::sync::Arc;
use std::time::Duration;

use pressled_core::{Driver, DriverConfig, EndpointId, LedState};
use pressled_line::SimChip;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshots_never_disagree_with_lines() {
    let chip = SimChip::new("sim0");
    let config = DriverConfig {
        debounce: Duration::ZERO,
        max_presses: 4,
        ..DriverConfig::default()
    };
    let driver = Arc::new(Driver::start(&chip, config).await.unwrap());

    // Commits from the trigger path, every fourth trigger applies AllOn
    let presser = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move {
            for _ in 0..400 {
                driver.trigger(Instant::now());
                tokio::task::yield_now().await;
            }
        })
    };

    // Direct commands from a client context
    let commander = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move {
            let mut all = driver.open(EndpointId::AllLeds).unwrap();
            let mut led1 = driver.open(EndpointId::Led(1)).unwrap();
            for i in 0..200 {
                if i % 2 == 0 {
                    all.write(b"t").await.unwrap();
                } else {
                    led1.write(b"t").await.unwrap();
                }
            }
        })
    };

    let mut checked = 0;
    while !(presser.is_finished() && commander.is_finished()) {
        let (snap, lines) = driver.status_with_lines().await.unwrap();
        assert_eq!(snap.led_mask, lines, "torn state: {snap:?}");
        assert_eq!(snap.led_state.mask(3), snap.led_mask);
        assert_eq!(LedState::from_mask(snap.led_mask, 3).mask(3), snap.led_mask);
        checked += 1;
        tokio::task::yield_now().await;
    }
    presser.await.unwrap();
    commander.await.unwrap();
    assert!(checked > 0);

    driver.shutdown().await;
    assert!(!chip.is_claimed(17));
}
