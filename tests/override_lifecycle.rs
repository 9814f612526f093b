//! Override lifecycle scenarios across the store, the expiry sweep and the
//! recommendation pipeline.

mod common;

use chrono::Duration;
use sqlx::Row;

use common::{rates, test_app};
use home_battery_controller::domain::{DecisionSource, Device};

#[tokio::test]
async fn expired_override_is_swept_and_control_returns_to_the_optimizer() {
    let app = test_app().await;
    let now = app.state.clock.now();
    app.bridge.set_sensors(&app.state.cfg, 60.0, 0.0);
    app.state
        .repos
        .prices
        .ingest(&rates(now, &[10.0, 12.0, 14.0, 16.0]), now, 7)
        .await
        .unwrap();

    // Three-minute override.
    app.state
        .repos
        .manual
        .set(Device::Main, true, Duration::minutes(3), "user", now)
        .await
        .unwrap();

    let rec = app.state.recommendation_now().await.unwrap();
    assert_eq!(rec.devices.main.source, DecisionSource::ManualOverride);

    // A worker tick lands four minutes later.
    app.clock.advance(Duration::seconds(240));
    let swept = app
        .state
        .repos
        .manual
        .expire_due(app.state.clock.now())
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let rec = app.state.recommendation_now().await.unwrap();
    assert_eq!(rec.devices.main.source, DecisionSource::Optimizer);

    let row = app
        .state
        .repos
        .manual
        .latest(Device::Main)
        .await
        .unwrap()
        .unwrap();
    assert!(!row.is_active);
    assert_eq!(row.cleared_by.as_deref(), Some("system_expiry"));
}

#[tokio::test]
async fn any_operation_sequence_leaves_at_most_one_active_row() {
    let app = test_app().await;
    let manual = &app.state.repos.manual;

    // A scripted mix of set, clear and expiry sweeps for both devices.
    for (step, device) in [
        (0, Device::Main),
        (1, Device::Main),
        (2, Device::Lucy),
        (3, Device::Main),
        (4, Device::Lucy),
        (5, Device::Main),
    ] {
        let now = app.state.clock.now();
        match step % 3 {
            0 => {
                manual
                    .set(device, step % 2 == 0, Duration::minutes(10), "user", now)
                    .await
                    .unwrap();
            }
            1 => {
                manual.clear(device, "user", now).await.unwrap();
            }
            _ => {
                manual.expire_due(now).await.unwrap();
            }
        }
        app.clock.advance(Duration::minutes(7));

        // Invariant: at most one active row per device, and an active row
        // is always unexpired at the instant it is observed.
        let check_now = app.state.clock.now();
        for device in Device::ALL {
            let rows = sqlx::query(
                "SELECT expires_at FROM manual_overrides WHERE device_id = ?1 AND is_active = 1",
            )
            .bind(device.as_str())
            .fetch_all(&app.state.repos.pool)
            .await
            .unwrap();
            assert!(rows.len() <= 1, "{device}: {} active rows", rows.len());

            let status = manual.status(device, check_now).await.unwrap();
            if status.is_active {
                assert!(status.expires_at.unwrap() > check_now);
            }
        }
    }
}

#[tokio::test]
async fn expiry_sweep_satisfies_the_worker_postcondition() {
    let app = test_app().await;
    let manual = &app.state.repos.manual;
    let now = app.state.clock.now();

    manual
        .set(Device::Main, true, Duration::minutes(1), "user", now)
        .await
        .unwrap();
    manual
        .set(Device::Lucy, true, Duration::minutes(30), "user", now)
        .await
        .unwrap();

    let sweep_start = now + Duration::minutes(5);
    manual.expire_due(sweep_start).await.unwrap();

    // No row may remain active with an expiry at or before the sweep start.
    let stragglers: i64 = sqlx::query(
        "SELECT COUNT(*) AS n FROM manual_overrides WHERE is_active = 1 AND expires_at <= ?1",
    )
    .bind(sweep_start)
    .fetch_one(&app.state.repos.pool)
    .await
    .unwrap()
    .get("n");
    assert_eq!(stragglers, 0);

    // The long-lived override survives.
    assert!(manual.status(Device::Lucy, sweep_start).await.unwrap().is_active);
}
