//! Tests for the SQLite order store.

use super::*;
use crate::domain::{Direction, PaymentType};
use chrono::Duration;
use rust_decimal_macros::dec;
use tempfile::TempDir;

async fn open_store() -> (SqliteStorage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let storage = SqliteStorage::new(SqliteStorageConfig {
        path: path.to_string_lossy().into_owned(),
        max_connections: 2,
    })
    .await
    .unwrap();
    (storage, dir)
}

fn sample_order(user_id: i64) -> NewOrder {
    NewOrder {
        user_id,
        direction: Direction::Buy,
        amount_fiat: dec!(1000),
        amount_crypto: dec!(0.00035714),
        rate: dec!(2800000),
        processing_fee: dec!(100),
        admin_fee: dec!(55),
        total_amount: dec!(1155),
        payment_type: PaymentType::Card,
        destination: "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string(),
    }
}

async fn paid_order(store: &SqliteStorage, user_id: i64) -> Order {
    let order = store.create_order(&sample_order(user_id)).await.unwrap();
    assert!(store.bind_processor(order.id, "555", "card").await.unwrap());
    assert!(store.record_payment(order.id, Some(dec!(1155)), false).await.unwrap());
    order
}

// ==================== Order tests ====================

#[tokio::test]
async fn test_create_and_get_order() {
    let (store, _dir) = open_store().await;

    let created = store.create_order(&sample_order(42)).await.unwrap();

    assert!(created.id > 0);
    assert_eq!(created.status, OrderStatus::Created);
    assert!(created.external_id.is_none());
    assert!(!created.is_problematic);

    let loaded = store.get_order(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.total_amount, dec!(1155));
    assert_eq!(loaded.amount_crypto, dec!(0.00035714));
}

#[tokio::test]
async fn test_order_ids_are_unique() {
    let (store, _dir) = open_store().await;

    let first = store.create_order(&sample_order(1)).await.unwrap();
    let second = store.create_order(&sample_order(1)).await.unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_get_missing_order_returns_none() {
    let (store, _dir) = open_store().await;
    assert!(store.get_order(999).await.unwrap().is_none());
    assert!(store.get_order_by_external_id("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bind_processor_only_from_created() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();

    assert!(store.bind_processor(order.id, "12345678", "Карта: 2200").await.unwrap());
    assert!(!store.bind_processor(order.id, "87654321", "other").await.unwrap());

    let order = store.get_order_by_external_id("12345678").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Waiting);
    assert_eq!(order.requisites.as_deref(), Some("Карта: 2200"));
}

#[tokio::test]
async fn test_record_payment_applies_once() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();
    store.bind_processor(order.id, "1", "req").await.unwrap();

    assert!(store.record_payment(order.id, Some(dec!(1100)), true).await.unwrap());
    assert!(!store.record_payment(order.id, Some(dec!(1155)), false).await.unwrap());

    let order = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PaidByClient);
    assert_eq!(order.received_amount, Some(dec!(1100)));
    assert!(order.is_problematic);
}

#[tokio::test]
async fn test_record_payment_keeps_raised_flag() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();
    store.bind_processor(order.id, "1", "req").await.unwrap();
    store
        .update_order(
            order.id,
            &OrderUpdate {
                is_problematic: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store.record_payment(order.id, None, false).await.unwrap();

    let order = store.get_order(order.id).await.unwrap().unwrap();
    assert!(order.is_problematic);
    assert!(order.received_amount.is_none());
}

#[tokio::test]
async fn test_complete_order_updates_user_totals_once() {
    let (store, _dir) = open_store().await;
    store
        .add_user(&NewUser {
            id: 7,
            username: Some("alice".into()),
            first_name: Some("Alice".into()),
        })
        .await
        .unwrap();

    let order = paid_order(&store, 7).await;

    assert!(store.complete_order(order.id).await.unwrap());
    assert!(!store.complete_order(order.id).await.unwrap());

    let user = store.get_user(7).await.unwrap().unwrap();
    assert_eq!(user.total_operations, 1);
    assert_eq!(user.total_amount, dec!(1155));

    let order = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_complete_order_registers_unknown_user() {
    let (store, _dir) = open_store().await;
    let order = paid_order(&store, 99).await;

    assert!(store.complete_order(order.id).await.unwrap());

    let user = store.get_user(99).await.unwrap().unwrap();
    assert_eq!(user.total_operations, 1);
    assert_eq!(user.total_amount, dec!(1155));
}

#[tokio::test]
async fn test_complete_order_rejects_waiting() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();
    store.bind_processor(order.id, "1", "req").await.unwrap();

    assert!(!store.complete_order(order.id).await.unwrap());
    assert!(store.get_user(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transition_status_checks_current_status() {
    let (store, _dir) = open_store().await;
    let order = paid_order(&store, 1).await;
    store.complete_order(order.id).await.unwrap();

    let applied = store
        .transition_status(
            order.id,
            &[OrderStatus::Created, OrderStatus::Waiting],
            OrderStatus::Cancelled,
        )
        .await
        .unwrap();

    assert!(!applied);
    let order = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_transition_status_with_no_sources_is_noop() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();

    assert!(!store
        .transition_status(order.id, &[], OrderStatus::Cancelled)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_escalate_and_resolve_problem() {
    let (store, _dir) = open_store().await;
    let order = paid_order(&store, 3).await;

    assert!(store.escalate_order(order.id).await.unwrap());
    assert!(!store.escalate_order(order.id).await.unwrap());

    let escalated = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(escalated.status, OrderStatus::Problem);
    assert!(escalated.is_problematic);

    assert!(store.complete_order(order.id).await.unwrap());
}

#[tokio::test]
async fn test_update_order_partial_fields() {
    let (store, _dir) = open_store().await;
    let order = store.create_order(&sample_order(1)).await.unwrap();

    let updated = store
        .update_order(
            order.id,
            &OrderUpdate {
                operator_notes: Some("звонил клиенту".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated);

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.operator_notes.as_deref(), Some("звонил клиенту"));
    assert_eq!(loaded.status, OrderStatus::Created);
    assert!(loaded.updated_at >= order.updated_at);

    assert!(!store
        .update_order(12345, &OrderUpdate::default())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_get_user_orders_newest_first_with_limit() {
    let (store, _dir) = open_store().await;
    let first = store.create_order(&sample_order(5)).await.unwrap();
    let second = store.create_order(&sample_order(5)).await.unwrap();
    let third = store.create_order(&sample_order(5)).await.unwrap();
    store.create_order(&sample_order(6)).await.unwrap();

    let orders = store.get_user_orders(5, 2).await.unwrap();

    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![third.id, second.id]);
    assert!(!ids.contains(&first.id));
}

#[tokio::test]
async fn test_list_orders_created_before() {
    let (store, _dir) = open_store().await;
    let waiting = store.create_order(&sample_order(1)).await.unwrap();
    store.bind_processor(waiting.id, "1", "req").await.unwrap();
    store.create_order(&sample_order(1)).await.unwrap();

    let future = Utc::now() + Duration::minutes(1);
    let stale = store
        .list_orders_created_before(OrderStatus::Waiting, future)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, waiting.id);

    let past = Utc::now() - Duration::minutes(30);
    assert!(store
        .list_orders_created_before(OrderStatus::Waiting, past)
        .await
        .unwrap()
        .is_empty());
}

// ==================== Settings tests ====================

#[tokio::test]
async fn test_settings_roundtrip_and_overwrite() {
    let (store, _dir) = open_store().await;

    assert!(store.get_setting("admin_percentage").await.unwrap().is_none());

    store
        .set_setting("admin_percentage", &SettingValue::Number(dec!(7.5)))
        .await
        .unwrap();
    store
        .set_setting("admin_users", &SettingValue::List(vec![1, 2, 3]))
        .await
        .unwrap();
    store
        .set_setting("admin_percentage", &SettingValue::Number(dec!(3)))
        .await
        .unwrap();

    assert_eq!(
        store.get_setting("admin_percentage").await.unwrap(),
        Some(SettingValue::Number(dec!(3)))
    );
    assert_eq!(
        store.get_setting("admin_users").await.unwrap(),
        Some(SettingValue::List(vec![1, 2, 3]))
    );
}

// ==================== User tests ====================

#[tokio::test]
async fn test_add_user_is_idempotent() {
    let (store, _dir) = open_store().await;
    let user = NewUser {
        id: 10,
        username: None,
        first_name: Some("Борис".into()),
    };

    assert!(store.add_user(&user).await.unwrap());
    assert!(!store.add_user(&user).await.unwrap());

    let loaded = store.get_user(10).await.unwrap().unwrap();
    assert_eq!(loaded.first_name.as_deref(), Some("Борис"));
    assert!(!loaded.is_blocked);
    assert_eq!(loaded.total_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_block_and_unblock_user() {
    let (store, _dir) = open_store().await;
    store
        .add_user(&NewUser {
            id: 1,
            username: None,
            first_name: None,
        })
        .await
        .unwrap();

    assert!(store.set_user_blocked(1, true).await.unwrap());
    assert!(store.get_user(1).await.unwrap().unwrap().is_blocked);

    assert!(store.set_user_blocked(1, false).await.unwrap());
    assert!(!store.get_user(1).await.unwrap().unwrap().is_blocked);

    assert!(!store.set_user_blocked(2, true).await.unwrap());
}

#[tokio::test]
async fn test_link_referral_once() {
    let (store, _dir) = open_store().await;
    for id in [1, 2, 3] {
        store
            .add_user(&NewUser {
                id,
                username: None,
                first_name: None,
            })
            .await
            .unwrap();
    }

    assert!(store.link_referral(2, 1).await.unwrap());
    assert!(!store.link_referral(2, 3).await.unwrap());
    assert!(!store.link_referral(3, 3).await.unwrap());
    assert!(!store.link_referral(3, 404).await.unwrap());

    assert_eq!(store.get_user(2).await.unwrap().unwrap().referred_by, Some(1));
    assert_eq!(store.get_user(1).await.unwrap().unwrap().referral_count, 1);
    assert_eq!(store.get_user(3).await.unwrap().unwrap().referred_by, None);
}

#[tokio::test]
async fn test_touch_review() {
    let (store, _dir) = open_store().await;
    store
        .add_user(&NewUser {
            id: 1,
            username: None,
            first_name: None,
        })
        .await
        .unwrap();

    let at = Utc::now();
    assert!(store.touch_review(1, at).await.unwrap());

    let user = store.get_user(1).await.unwrap().unwrap();
    let stored = user.last_review_at.unwrap();
    assert!((stored - at).num_milliseconds().abs() < 1);
}

// ==================== Statistics tests ====================

#[tokio::test]
async fn test_statistics() {
    let (store, _dir) = open_store().await;
    store
        .add_user(&NewUser {
            id: 1,
            username: None,
            first_name: None,
        })
        .await
        .unwrap();

    let done = paid_order(&store, 1).await;
    store.complete_order(done.id).await.unwrap();
    store.create_order(&sample_order(1)).await.unwrap();

    let today = store
        .get_statistics(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(today.total_users, 1);
    assert_eq!(today.total_orders, 2);
    assert_eq!(today.completed_orders, 1);
    assert_eq!(today.total_volume, dec!(1155));
    assert_eq!(today.today_orders, 2);
    assert_eq!(today.today_volume, dec!(1155));

    let tomorrow = store
        .get_statistics(Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(tomorrow.today_orders, 0);
    assert_eq!(tomorrow.today_volume, Decimal::ZERO);
    assert_eq!(tomorrow.total_volume, dec!(1155));
}
