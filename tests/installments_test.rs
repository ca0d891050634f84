mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{SeedItem, SeedOrder, TestCtx};
use darzee_api::entities::payment_installment::InstallmentStatus;
use darzee_api::errors::ServiceError;
use darzee_api::services::installments::{
    CreatePlanRequest, InstallmentFrequency, RecordPaymentRequest,
};

fn plan(n: i32) -> CreatePlanRequest {
    CreatePlanRequest {
        number_of_installments: n,
        first_installment_amount: None,
        frequency: InstallmentFrequency::Monthly,
        start_date: None,
    }
}

#[tokio::test]
async fn plan_rows_sum_to_the_balance_exactly() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Suit", dec!(3.0)).await;
    let fabric = ctx
        .seed_fabric("Tweed", dec!(500), dec!(100), dec!(0), dec!(5))
        .await;

    // Balance 11,200.01 does not divide evenly by three.
    let (order, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(10000.01))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;

    let rows = ctx
        .installment_service()
        .create_plan(ctx.caller, order.id, plan(3))
        .await
        .expect("plan creation should succeed");

    assert_eq!(rows.len(), 3);
    let sum: Decimal = rows.iter().map(|r| r.amount).sum();
    assert_eq!(sum, ctx.reload_order(order.id).await.balance_amount);
    // Rows divide to the paisa, differing only by the remainder.
    assert!((rows[0].amount - rows[2].amount).abs() <= dec!(0.01));
    for row in &rows {
        assert_eq!(row.status(), Some(InstallmentStatus::Pending));
    }
    // Monthly cadence.
    assert!(rows[1].due_date > rows[0].due_date);
    assert!(rows[2].due_date > rows[1].due_date);
}

#[tokio::test]
async fn plan_respects_first_installment_override_and_rejects_duplicates() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Suit", dec!(3.0)).await;
    let fabric = ctx
        .seed_fabric("Tweed", dec!(500), dec!(100), dec!(0), dec!(5))
        .await;

    let (order, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(10000))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;

    let rows = ctx
        .installment_service()
        .create_plan(
            ctx.caller,
            order.id,
            CreatePlanRequest {
                number_of_installments: 3,
                first_installment_amount: Some(dec!(5000)),
                frequency: InstallmentFrequency::Weekly,
                start_date: Some(ctx.now),
            },
        )
        .await
        .expect("plan creation should succeed");

    // Balance 11,200: first 5,000, rest split across two.
    assert_eq!(rows[0].amount, dec!(5000.00));
    assert_eq!(rows[1].amount, dec!(3100.00));
    assert_eq!(rows[2].amount, dec!(3100.00));
    assert_eq!(rows[1].due_date, ctx.now + Duration::days(7));
    assert_eq!(rows[2].due_date, ctx.now + Duration::days(14));

    let err = ctx
        .installment_service()
        .create_plan(ctx.caller, order.id, plan(2))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn recording_payments_updates_status_and_order_balance() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Suit", dec!(3.0)).await;
    let fabric = ctx
        .seed_fabric("Tweed", dec!(500), dec!(100), dec!(0), dec!(5))
        .await;

    let (order, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(10000))],
                advance: dec!(2000),
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;
    // Balance: 11,200 - 2,000 = 9,200 across two installments.
    let rows = ctx
        .installment_service()
        .create_plan(ctx.caller, order.id, plan(2))
        .await
        .unwrap();

    // Partial payment.
    let updated = ctx
        .installment_service()
        .record_payment(
            ctx.caller,
            rows[0].id,
            RecordPaymentRequest {
                paid_amount: dec!(1000),
                paid_date: None,
                payment_mode: Some("CARD".to_string()),
                transaction_ref: Some("TXN-123".to_string()),
                notes: None,
            },
        )
        .await
        .expect("payment should succeed");
    assert_eq!(updated.status(), Some(InstallmentStatus::Partial));

    let reloaded = ctx.reload_order(order.id).await;
    // 11,200 - (2,000 advance + 1,000) = 8,200
    assert_eq!(reloaded.balance_amount, dec!(8200.00));

    // Full payment flips to PAID.
    let updated = ctx
        .installment_service()
        .record_payment(
            ctx.caller,
            rows[0].id,
            RecordPaymentRequest {
                paid_amount: rows[0].amount,
                paid_date: None,
                payment_mode: None,
                transaction_ref: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status(), Some(InstallmentStatus::Paid));

    let err = ctx
        .installment_service()
        .record_payment(
            ctx.caller,
            rows[1].id,
            RecordPaymentRequest {
                paid_amount: dec!(100),
                paid_date: None,
                payment_mode: Some("BARTER".to_string()),
                transaction_ref: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn paying_the_advance_row_updates_the_order_advance() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Suit", dec!(3.0)).await;
    let fabric = ctx
        .seed_fabric("Tweed", dec!(500), dec!(100), dec!(0), dec!(5))
        .await;

    let (order, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(10000))],
                advance: dec!(2000),
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;
    let advance_row = &ctx.installments_of(order.id).await[0];
    assert_eq!(advance_row.installment_number, 1);

    ctx.installment_service()
        .record_payment(
            ctx.caller,
            advance_row.id,
            RecordPaymentRequest {
                paid_amount: dec!(3500),
                paid_date: None,
                payment_mode: Some("UPI".to_string()),
                transaction_ref: None,
                notes: None,
            },
        )
        .await
        .expect("payment should succeed");

    let reloaded = ctx.reload_order(order.id).await;
    assert_eq!(reloaded.advance_paid, dec!(3500));
    assert_eq!(reloaded.balance_amount, dec!(7700.00));
}

#[tokio::test]
async fn unpaid_past_due_installment_derives_overdue_on_payment_reset() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Suit", dec!(3.0)).await;
    let fabric = ctx
        .seed_fabric("Tweed", dec!(500), dec!(100), dec!(0), dec!(5))
        .await;

    let (order, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(10000))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;
    let rows = ctx
        .installment_service()
        .create_plan(
            ctx.caller,
            order.id,
            CreatePlanRequest {
                number_of_installments: 1,
                first_installment_amount: None,
                frequency: InstallmentFrequency::Monthly,
                start_date: Some(ctx.now - Duration::days(3)),
            },
        )
        .await
        .unwrap();

    // Zeroing out a payment on a past-due row derives OVERDUE.
    let updated = ctx
        .installment_service()
        .record_payment(
            ctx.caller,
            rows[0].id,
            RecordPaymentRequest {
                paid_amount: dec!(0),
                paid_date: None,
                payment_mode: None,
                transaction_ref: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status(), Some(InstallmentStatus::Overdue));
}
