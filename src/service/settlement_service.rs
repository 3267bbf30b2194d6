// service/settlement_service.rs
//
// The money-movement side of lifecycle transitions. Every method runs
// inside the caller's transaction: the lifecycle controller owns the unit
// of work, this engine owns which balances move and which ledger rows tag
// the movement.
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{
        db::DBClient,
        walletdb::{LedgerRef, WalletExt},
    },
    models::{
        jobmodel::{JobInstance, JobPost},
        walletmodel::{reference, LedgerKind, LedgerTransaction, Wallet, WalletType},
    },
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct SettlementService {
    db_client: Arc<DBClient>,
}

impl SettlementService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Publish-time pre-escrow hold: the full job cost moves from the
    /// client's available into held balance on their own wallet.
    pub async fn hold_for_publish(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
    ) -> Result<LedgerTransaction, ServiceError> {
        let payer = self.payer_wallet_for_update(tx, post.client_id).await?;

        self.db_client
            .hold_funds_tx(
                tx,
                payer.id,
                post.total_cost_cents(),
                LedgerRef::new(reference::PUBLISH_HOLD, post.id),
            )
            .await
    }

    /// Fund-on-acceptance: move the full job cost (amount + platform fee)
    /// from the client's payer wallet into the instance's escrow wallet.
    /// The publish-time hold is consumed when still present; otherwise the
    /// cost comes straight out of available funds. Never both.
    pub async fn fund_acceptance(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
        instance: &JobInstance,
        escrow_wallet_id: Uuid,
    ) -> Result<LedgerTransaction, ServiceError> {
        let payer = self.payer_wallet_for_update(tx, post.client_id).await?;
        let total = post.total_cost_cents();

        self.db_client
            .fund_escrow_tx(
                tx,
                payer.id,
                escrow_wallet_id,
                total,
                LedgerRef::new(reference::ESCROW_FUNDING, instance.id),
            )
            .await
    }

    /// Completion split: the booked amount goes to the caregiver, the fee
    /// to the platform, both out of escrow held balance. A short escrow is
    /// a data-integrity alarm, not a retryable user error.
    pub async fn split_completion(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
        instance: &JobInstance,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let escrow = self.escrow_wallet_for_update(tx, instance.id).await?;

        let payout = post.total_amount_cents;
        let fee = post.platform_fee_cents;
        if escrow.held_balance < payout + fee {
            return Err(ServiceError::InsufficientEscrowBalance {
                wallet_id: escrow.id,
                required: payout + fee,
                held: escrow.held_balance,
            });
        }

        let payee = self
            .db_client
            .get_or_create_user_wallet_tx(tx, instance.caregiver_id, WalletType::Payee)
            .await?;

        let mut legs = Vec::with_capacity(2);
        legs.push(
            self.db_client
                .capture_held_tx(
                    tx,
                    escrow.id,
                    Some(payee.id),
                    payout,
                    LedgerKind::Release,
                    LedgerRef::new(reference::COMPLETION_PAYOUT, instance.id),
                )
                .await?,
        );

        if fee > 0 {
            let platform = self.db_client.get_platform_wallet_for_update_tx(tx).await?;
            legs.push(
                self.db_client
                    .capture_held_tx(
                        tx,
                        escrow.id,
                        Some(platform.id),
                        fee,
                        LedgerKind::Release,
                        LedgerRef::new(reference::COMPLETION_FEE, instance.id),
                    )
                    .await?,
            );
        }

        Ok(legs)
    }

    /// Cancellation before any acceptance: the client's own publish hold
    /// goes back to their available balance. No escrow wallet exists yet.
    pub async fn refund_before_acceptance(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
    ) -> Result<LedgerTransaction, ServiceError> {
        let payer = self.payer_wallet_for_update(tx, post.client_id).await?;

        self.db_client
            .release_funds_tx(
                tx,
                payer.id,
                post.total_cost_cents(),
                LedgerRef::new(reference::CANCELLATION_REFUND, post.id),
            )
            .await
    }

    /// Cancellation after acceptance: whatever the escrow still holds goes
    /// back to the client; the escrow wallet is left at zero, not deleted.
    /// Returns None when the escrow was already empty.
    pub async fn refund_after_acceptance(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
        instance: &JobInstance,
    ) -> Result<Option<LedgerTransaction>, ServiceError> {
        let escrow = self.escrow_wallet_for_update(tx, instance.id).await?;
        if escrow.held_balance == 0 {
            return Ok(None);
        }

        let payer = self.payer_wallet_for_update(tx, post.client_id).await?;

        let row = self
            .db_client
            .capture_held_tx(
                tx,
                escrow.id,
                Some(payer.id),
                escrow.held_balance,
                LedgerKind::Reversal,
                LedgerRef::new(reference::CANCELLATION_REFUND, instance.id),
            )
            .await?;

        Ok(Some(row))
    }

    /// Expiry of an unaccepted post releases the publish hold in place.
    pub async fn release_on_expiry(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        post: &JobPost,
    ) -> Result<LedgerTransaction, ServiceError> {
        let payer = self.payer_wallet_for_update(tx, post.client_id).await?;

        self.db_client
            .release_funds_tx(
                tx,
                payer.id,
                post.total_cost_cents(),
                LedgerRef::new(reference::EXPIRY_RELEASE, post.id),
            )
            .await
    }

    async fn payer_wallet_for_update(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        user_id: Uuid,
    ) -> Result<Wallet, ServiceError> {
        self.db_client
            .get_user_wallet_for_update_tx(tx, user_id, WalletType::Payer)
            .await?
            .ok_or(ServiceError::UserWalletNotFound {
                user_id,
                wallet_type: "payer",
            })
    }

    async fn escrow_wallet_for_update(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Wallet, ServiceError> {
        self.db_client
            .get_escrow_wallet_for_update_tx(tx, job_instance_id)
            .await?
            .ok_or(ServiceError::EscrowWalletNotFound(job_instance_id))
    }
}
