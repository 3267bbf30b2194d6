// service/dispute_service.rs
//
// Arbitration over the same escrow wallet the lifecycle engine uses, under
// the same locking discipline: dispute row first, then the job instance,
// then wallets. Settlement is replay-safe: the amounts and idempotency key
// land on the dispute row, and a repeated call with the same key gets the
// recorded outcome back instead of moving money twice.
use std::sync::Arc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        db::DBClient,
        disputedb::DisputeExt,
        jobdb::JobExt,
        walletdb::{LedgerRef, WalletExt},
    },
    dtos::disputedtos::{RejectDisputeDto, SettleDisputeDto},
    models::{
        disputemodel::{Dispute, DisputeSettlement, DisputeStatus},
        usermodel::Actor,
        walletmodel::{reference, LedgerKind, WalletType},
    },
    service::{audit_service::AuditService, error::ServiceError},
};

#[derive(Debug, Clone)]
pub struct DisputeService {
    db_client: Arc<DBClient>,
    audit_service: Arc<AuditService>,
}

impl DisputeService {
    pub fn new(db_client: Arc<DBClient>, audit_service: Arc<AuditService>) -> Self {
        Self {
            db_client,
            audit_service,
        }
    }

    /// Claim the dispute for review. Open disputes only; the claiming
    /// arbitrator becomes the assigned one if none was set.
    pub async fn begin_review(
        &self,
        dispute_id: Uuid,
        arbitrator: Actor,
    ) -> Result<Dispute, ServiceError> {
        let db = self.db_client.clone();

        let dispute = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let dispute = db.get_dispute_for_update_tx(tx, dispute_id).await?;
                    if dispute.status != DisputeStatus::Open {
                        return Err(ServiceError::InvalidDisputeStatus {
                            dispute_id,
                            status: dispute.status,
                        });
                    }

                    db.assign_arbitrator_tx(tx, dispute_id, arbitrator.id).await?;
                    db.update_dispute_status_tx(
                        tx,
                        dispute_id,
                        DisputeStatus::Open,
                        DisputeStatus::InReview,
                    )
                    .await
                })
            })
            .await?;

        self.audit_service
            .record(
                "dispute",
                dispute.id,
                "begin_review",
                Some("open"),
                Some("in_review"),
                Some(arbitrator.id),
                None,
            )
            .await;

        Ok(dispute)
    }

    /// Split the escrow between refund (back to the client) and payout (to
    /// the caregiver). The sum is bounded by what the escrow still holds;
    /// the held balance is debited once and each credit leg writes its own
    /// tagged ledger row.
    pub async fn settle(
        &self,
        dispute_id: Uuid,
        arbitrator: Actor,
        dto: SettleDisputeDto,
    ) -> Result<DisputeSettlement, ServiceError> {
        dto.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let refund = dto.refund_amount_cents;
        let payout = dto.payout_amount_cents;
        let note = dto.resolution_note;
        let idempotency_key = dto.idempotency_key;

        let db = self.db_client.clone();
        let key_for_tx = idempotency_key.clone();

        let (settlement, replayed) = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let dispute = db.get_dispute_for_update_tx(tx, dispute_id).await?;

                    if !dispute.status.is_settleable() {
                        // Replay contract: the same idempotency key gets the
                        // recorded amounts back; anything else is an error.
                        if dispute.status == DisputeStatus::Resolved
                            && key_for_tx.is_some()
                            && dispute.idempotency_key == key_for_tx
                        {
                            return Ok((
                                DisputeSettlement {
                                    dispute_id,
                                    refund_amount_cents: dispute.refund_amount_cents.unwrap_or(0),
                                    payout_amount_cents: dispute.payout_amount_cents.unwrap_or(0),
                                    status: dispute.status,
                                },
                                true,
                            ));
                        }
                        return Err(ServiceError::InvalidDisputeStatus {
                            dispute_id,
                            status: dispute.status,
                        });
                    }

                    if let Some(assigned) = dispute.arbitrator_id {
                        if assigned != arbitrator.id && !arbitrator.is_admin() {
                            return Err(ServiceError::Unauthorized {
                                actor_id: arbitrator.id,
                                entity_id: dispute_id,
                            });
                        }
                    }
                    db.assign_arbitrator_tx(tx, dispute_id, arbitrator.id).await?;

                    // Re-derive the job and both parties from the stored
                    // job reference.
                    let instance = db
                        .get_job_instance_for_update_tx(tx, dispute.job_instance_id)
                        .await?;
                    let escrow = db
                        .get_escrow_wallet_for_update_tx(tx, instance.id)
                        .await?
                        .ok_or(ServiceError::EscrowWalletNotFound(instance.id))?;

                    let total = refund + payout;
                    if total > escrow.held_balance {
                        return Err(ServiceError::InsufficientEscrowBalance {
                            wallet_id: escrow.id,
                            required: total,
                            held: escrow.held_balance,
                        });
                    }

                    if total > 0 {
                        db.capture_held_tx(
                            tx,
                            escrow.id,
                            None,
                            total,
                            LedgerKind::Capture,
                            LedgerRef::new(reference::DISPUTE_SETTLEMENT, dispute_id)
                                .with_key(key_for_tx.clone()),
                        )
                        .await?;
                    }

                    if refund > 0 {
                        let payer = db
                            .get_user_wallet_for_update_tx(tx, instance.client_id, WalletType::Payer)
                            .await?
                            .ok_or(ServiceError::UserWalletNotFound {
                                user_id: instance.client_id,
                                wallet_type: "payer",
                            })?;
                        db.credit_available_tx(
                            tx,
                            payer.id,
                            Some(escrow.id),
                            refund,
                            LedgerKind::Reversal,
                            LedgerRef::new(reference::DISPUTE_REFUND, dispute_id)
                                .with_key(key_for_tx.clone()),
                        )
                        .await?;
                    }

                    if payout > 0 {
                        let payee = db
                            .get_or_create_user_wallet_tx(tx, instance.caregiver_id, WalletType::Payee)
                            .await?;
                        db.credit_available_tx(
                            tx,
                            payee.id,
                            Some(escrow.id),
                            payout,
                            LedgerKind::Release,
                            LedgerRef::new(reference::DISPUTE_PAYOUT, dispute_id)
                                .with_key(key_for_tx.clone()),
                        )
                        .await?;
                    }

                    let dispute = db
                        .record_settlement_tx(tx, dispute_id, refund, payout, note, key_for_tx)
                        .await?;

                    db.insert_job_event_tx(
                        tx,
                        instance.id,
                        "dispute_settled",
                        Some(arbitrator.id),
                        Some(json!({
                            "dispute_id": dispute_id,
                            "refund_amount_cents": refund,
                            "payout_amount_cents": payout,
                        })),
                    )
                    .await?;

                    Ok((
                        DisputeSettlement {
                            dispute_id,
                            refund_amount_cents: dispute.refund_amount_cents.unwrap_or(refund),
                            payout_amount_cents: dispute.payout_amount_cents.unwrap_or(payout),
                            status: dispute.status,
                        },
                        false,
                    ))
                })
            })
            .await?;

        if !replayed {
            self.audit_service
                .log_dispute_settlement(
                    arbitrator.id,
                    dispute_id,
                    settlement.refund_amount_cents,
                    settlement.payout_amount_cents,
                )
                .await;
        }

        Ok(settlement)
    }

    /// Close the dispute without moving money.
    pub async fn reject(
        &self,
        dispute_id: Uuid,
        arbitrator: Actor,
        dto: RejectDisputeDto,
    ) -> Result<Dispute, ServiceError> {
        dto.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let note = dto.resolution_note;

        let db = self.db_client.clone();

        let dispute = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let dispute = db.get_dispute_for_update_tx(tx, dispute_id).await?;
                    if !dispute.status.is_settleable() {
                        return Err(ServiceError::InvalidDisputeStatus {
                            dispute_id,
                            status: dispute.status,
                        });
                    }
                    if let Some(assigned) = dispute.arbitrator_id {
                        if assigned != arbitrator.id && !arbitrator.is_admin() {
                            return Err(ServiceError::Unauthorized {
                                actor_id: arbitrator.id,
                                entity_id: dispute_id,
                            });
                        }
                    }
                    db.assign_arbitrator_tx(tx, dispute_id, arbitrator.id).await?;

                    let dispute = db.record_rejection_tx(tx, dispute_id, note).await?;

                    db.insert_job_event_tx(
                        tx,
                        dispute.job_instance_id,
                        "dispute_rejected",
                        Some(arbitrator.id),
                        Some(json!({ "dispute_id": dispute_id })),
                    )
                    .await?;

                    Ok(dispute)
                })
            })
            .await?;

        self.audit_service
            .record(
                "dispute",
                dispute.id,
                "reject",
                None,
                Some("rejected"),
                Some(arbitrator.id),
                None,
            )
            .await;

        Ok(dispute)
    }
}
