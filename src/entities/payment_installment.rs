use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "PENDING",
            InstallmentStatus::Partial => "PARTIAL",
            InstallmentStatus::Paid => "PAID",
            InstallmentStatus::Overdue => "OVERDUE",
            InstallmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(InstallmentStatus::Pending),
            "PARTIAL" => Some(InstallmentStatus::Partial),
            "PAID" => Some(InstallmentStatus::Paid),
            "OVERDUE" => Some(InstallmentStatus::Overdue),
            "CANCELLED" => Some(InstallmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Derives the status of an installment from its amounts and due
    /// date. CANCELLED is sticky; everything else is recomputed from
    /// scratch, so the same rule serves both payment recording and the
    /// schedule rebuild after a split.
    pub fn derive(
        existing: Option<InstallmentStatus>,
        amount: Decimal,
        paid: Decimal,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InstallmentStatus {
        if existing == Some(InstallmentStatus::Cancelled) {
            return InstallmentStatus::Cancelled;
        }
        if paid <= Decimal::ZERO {
            if due_date < now {
                InstallmentStatus::Overdue
            } else {
                InstallmentStatus::Pending
            }
        } else if paid >= amount {
            InstallmentStatus::Paid
        } else {
            InstallmentStatus::Partial
        }
    }
}

/// Accepted payment modes, stored as their SCREAMING_SNAKE_CASE names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
    NetBanking,
}

/// One scheduled payment within an order's plan. Installment #1 is
/// conventionally the advance. Schedules are rebuilt wholesale when an
/// order's total changes structurally.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_installments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub installment_number: i32,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub paid_amount: Decimal,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_mode: Option<String>,
    pub transaction_ref: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Model {
    pub fn status(&self) -> Option<InstallmentStatus> {
        InstallmentStatus::parse(&self.status)
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn payment_mode_names() {
        assert_eq!(PaymentMode::BankTransfer.to_string(), "BANK_TRANSFER");
        assert_eq!("UPI".parse::<PaymentMode>(), Ok(PaymentMode::Upi));
        assert!("BARTER".parse::<PaymentMode>().is_err());
    }

    #[test]
    fn cancelled_is_sticky() {
        let status = InstallmentStatus::derive(
            Some(InstallmentStatus::Cancelled),
            dec!(1000),
            dec!(1000),
            now(),
            now(),
        );
        assert_eq!(status, InstallmentStatus::Cancelled);
    }

    #[test]
    fn unpaid_past_due_is_overdue() {
        let due = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let status = InstallmentStatus::derive(None, dec!(1000), dec!(0), due, now());
        assert_eq!(status, InstallmentStatus::Overdue);
    }

    #[test]
    fn unpaid_before_due_is_pending() {
        let due = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let status = InstallmentStatus::derive(None, dec!(1000), dec!(0), due, now());
        assert_eq!(status, InstallmentStatus::Pending);
    }

    #[test]
    fn paid_in_full_and_partial() {
        let due = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(
            InstallmentStatus::derive(None, dec!(1000), dec!(1000), due, now()),
            InstallmentStatus::Paid
        );
        assert_eq!(
            InstallmentStatus::derive(None, dec!(1000), dec!(1200), due, now()),
            InstallmentStatus::Paid
        );
        assert_eq!(
            InstallmentStatus::derive(None, dec!(1000), dec!(400), due, now()),
            InstallmentStatus::Partial
        );
    }
}
