mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::TransactionTrait;
use uuid::Uuid;

use common::TestCtx;
use darzee_api::clock::FixedClock;
use darzee_api::entities::stock_movement::MovementType;
use darzee_api::errors::ServiceError;
use darzee_api::services::reservations;

async fn assert_invariant(ctx: &TestCtx, stock_id: Uuid) {
    let stock = ctx.reload_fabric(stock_id).await;
    assert!(stock.reserved >= Decimal::ZERO, "reserved went negative");
    assert!(
        stock.reserved <= stock.current_stock,
        "reserved {} exceeds stock {}",
        stock.reserved,
        stock.current_stock
    );
}

#[tokio::test]
async fn reserve_release_transfer_sequence_holds_the_invariant() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let a = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(0), dec!(2))
        .await;
    let b = ctx
        .seed_fabric("Fabric B", dec!(100), dec!(6), dec!(0), dec!(2))
        .await;
    let order_id = Uuid::new_v4();

    let txn = ctx.db.begin().await.unwrap();
    reservations::reserve(&txn, &clock, a.id, dec!(4), order_id, None)
        .await
        .unwrap();
    reservations::reserve(&txn, &clock, a.id, dec!(3), order_id, None)
        .await
        .unwrap();
    reservations::release(&txn, &clock, a.id, dec!(2), order_id, None)
        .await
        .unwrap();
    reservations::transfer(&txn, &clock, a.id, b.id, dec!(5), order_id, None)
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_invariant(&ctx, a.id).await;
    assert_invariant(&ctx, b.id).await;

    let a_after = ctx.reload_fabric(a.id).await;
    let b_after = ctx.reload_fabric(b.id).await;
    assert_eq!(a_after.reserved, dec!(0));
    assert_eq!(b_after.reserved, dec!(5));
}

#[tokio::test]
async fn over_reservation_is_rejected_without_writes() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(8), dec!(2))
        .await;

    let txn = ctx.db.begin().await.unwrap();
    let err = reservations::reserve(&txn, &clock, stock.id, dec!(3), Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientAvailableStock(_));
    txn.commit().await.unwrap();

    let after = ctx.reload_fabric(stock.id).await;
    assert_eq!(after.reserved, dec!(8));
    use sea_orm::EntityTrait;
    assert!(darzee_api::entities::stock_movement::Entity::find()
        .all(&*ctx.db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn release_clamps_at_zero() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(1), dec!(2))
        .await;

    let txn = ctx.db.begin().await.unwrap();
    let movement = reservations::release(&txn, &clock, stock.id, dec!(5), Uuid::new_v4(), None)
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(movement.quantity_meters, dec!(-5));
    let after = ctx.reload_fabric(stock.id).await;
    assert_eq!(after.reserved, dec!(0));
    assert_invariant(&ctx, stock.id).await;
}

#[tokio::test]
async fn movements_carry_type_and_running_balance() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(0), dec!(2))
        .await;
    let order_id = Uuid::new_v4();

    let txn = ctx.db.begin().await.unwrap();
    let reserved = reservations::reserve(&txn, &clock, stock.id, dec!(4), order_id, None)
        .await
        .unwrap();
    let released = reservations::release(&txn, &clock, stock.id, dec!(1), order_id, None)
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(
        MovementType::parse(&reserved.movement_type),
        Some(MovementType::OrderReserved)
    );
    // available after reserving 4 of 10
    assert_eq!(reserved.balance_after_meters, dec!(6));
    assert_eq!(
        MovementType::parse(&released.movement_type),
        Some(MovementType::OrderCancelled)
    );
    // available after releasing 1 (reserved back to 3)
    assert_eq!(released.balance_after_meters, dec!(7));
}

#[tokio::test]
async fn consume_draws_down_stock_and_reservation_together() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(4), dec!(2))
        .await;

    let txn = ctx.db.begin().await.unwrap();
    let movement = reservations::consume(&txn, &clock, stock.id, dec!(4), Uuid::new_v4(), None)
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(
        MovementType::parse(&movement.movement_type),
        Some(MovementType::OrderCompleted)
    );
    let after = ctx.reload_fabric(stock.id).await;
    assert_eq!(after.current_stock, dec!(6));
    assert_eq!(after.reserved, dec!(0));
    assert_invariant(&ctx, stock.id).await;
}

#[tokio::test]
async fn adjustment_cannot_undercut_reservations() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(6), dec!(2))
        .await;

    let txn = ctx.db.begin().await.unwrap();
    let err = reservations::adjust(&txn, &clock, stock.id, dec!(-5), None, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let movement = reservations::adjust(
        &txn,
        &clock,
        stock.id,
        dec!(-4),
        None,
        Some("shrinkage count".to_string()),
    )
    .await
    .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(
        MovementType::parse(&movement.movement_type),
        Some(MovementType::Adjustment)
    );
    let after = ctx.reload_fabric(stock.id).await;
    assert_eq!(after.current_stock, dec!(6));
    assert_invariant(&ctx, stock.id).await;
}

#[tokio::test]
async fn transfer_rejects_same_record_and_missing_references() {
    let ctx = TestCtx::new().await;
    let clock = FixedClock(ctx.now);
    let stock = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(10), dec!(5), dec!(2))
        .await;

    let txn = ctx.db.begin().await.unwrap();
    let err = reservations::transfer(
        &txn,
        &clock,
        stock.id,
        stock.id,
        dec!(2),
        Uuid::new_v4(),
        None,
    )
    .await
    .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = reservations::transfer(
        &txn,
        &clock,
        stock.id,
        Uuid::new_v4(),
        dec!(2),
        Uuid::new_v4(),
        None,
    )
    .await
    .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReference(_));
    txn.commit().await.unwrap();
}
