// dtos/disputedtos.rs
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SettleDisputeDto {
    #[validate(range(min = 0))]
    pub refund_amount_cents: i64,

    #[validate(range(min = 0))]
    pub payout_amount_cents: i64,

    #[validate(length(min = 1, max = 2000, message = "A resolution note is required"))]
    pub resolution_note: String,

    #[validate(length(max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RejectDisputeDto {
    #[validate(length(min = 1, max = 2000, message = "A resolution note is required"))]
    pub resolution_note: String,
}
