// db/walletdb.rs
//
// The ledger store: wallets plus an append-only transaction log.
//
// Every balance-moving primitive follows the same discipline: lock the
// involved wallet rows FOR UPDATE (ascending id when there is more than
// one), append the ledger row first with ON CONFLICT DO NOTHING, and only
// mutate balances when the append actually inserted. A duplicate reference
// means the movement already happened; the primitive returns the recorded
// row and touches nothing. The balance UPDATE itself re-states the guard in
// its WHERE clause so it fails closed even if a writer slipped past the
// in-code check.
use async_trait::async_trait;
use uuid::Uuid;
use sqlx::{Postgres, Transaction};

use super::db::DBClient;
use crate::models::walletmodel::*;
use crate::service::error::ServiceError;

const WALLET_COLUMNS: &str = r#"
    id, wallet_type, user_id, job_instance_id,
    available_balance, held_balance, created_at, updated_at
"#;

const LEDGER_COLUMNS: &str = r#"
    id, source_wallet_id, destination_wallet_id, amount, kind,
    reference_type, reference_id, idempotency_key, created_at
"#;

/// Identifies the business event a movement belongs to; the unique
/// `(reference_type, reference_id, kind)` triple makes replays no-ops.
#[derive(Debug, Clone)]
pub struct LedgerRef {
    pub reference_type: &'static str,
    pub reference_id: Uuid,
    pub idempotency_key: Option<String>,
}

impl LedgerRef {
    pub fn new(reference_type: &'static str, reference_id: Uuid) -> Self {
        Self {
            reference_type,
            reference_id,
            idempotency_key: None,
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

#[async_trait]
pub trait WalletExt {
    async fn create_user_wallet(
        &self,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Wallet, ServiceError>;

    async fn create_escrow_wallet_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Wallet, ServiceError>;

    /// Fetch the user's wallet of the given type, creating an empty one if
    /// it does not exist yet. The returned row is locked either way.
    async fn get_or_create_user_wallet_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Wallet, ServiceError>;

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, ServiceError>;

    async fn get_user_wallet(
        &self,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Option<Wallet>, ServiceError>;

    async fn get_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
    ) -> Result<Wallet, ServiceError>;

    async fn get_user_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Option<Wallet>, ServiceError>;

    async fn get_escrow_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Option<Wallet>, ServiceError>;

    async fn get_platform_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
    ) -> Result<Wallet, ServiceError>;

    /// Lock two wallets in ascending id order regardless of argument order,
    /// returning them as (first-arg, second-arg).
    async fn lock_wallet_pair_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> Result<(Wallet, Wallet), ServiceError>;

    /// available -> held on one wallet.
    async fn hold_funds_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// held -> available on one wallet.
    async fn release_funds_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// held -= on the source; optionally available += on a destination.
    /// One ledger row covers the whole leg.
    async fn capture_held_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        source_wallet_id: Uuid,
        destination_wallet_id: Option<Uuid>,
        amount: i64,
        kind: LedgerKind,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// available += on one wallet. Used for settlement legs whose source
    /// debit was already applied as a single batch; the row still records
    /// the source wallet for the audit trail.
    async fn credit_available_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        source_wallet_id: Option<Uuid>,
        amount: i64,
        kind: LedgerKind,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// available -> available across two wallets; all-or-nothing.
    async fn transfer_available_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        from_wallet_id: Uuid,
        to_wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    /// Move the job cost from the payer into escrow held balance. Consumes
    /// the payer's publish hold when it still covers the amount, otherwise
    /// falls back to available balance; never double-holds the same money.
    async fn fund_escrow_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        payer_wallet_id: Uuid,
        escrow_wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError>;

    async fn get_ledger_by_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
        kind: LedgerKind,
    ) -> Result<Option<LedgerTransaction>, ServiceError>;

    async fn get_ledger_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, ServiceError>;
}

#[async_trait]
impl WalletExt for DBClient {
    async fn create_user_wallet(
        &self,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Wallet, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            INSERT INTO wallets (wallet_type, user_id)
            VALUES ($1, $2)
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(wallet_type)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn create_escrow_wallet_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Wallet, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            INSERT INTO wallets (wallet_type, job_instance_id)
            VALUES ('escrow', $1)
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(job_instance_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(wallet)
    }

    async fn get_or_create_user_wallet_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Wallet, ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (wallet_type, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, wallet_type) WHERE user_id IS NOT NULL DO NOTHING
            "#,
        )
        .bind(wallet_type)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        self.get_user_wallet_for_update_tx(tx, user_id, wallet_type)
            .await?
            .ok_or(ServiceError::UserWalletNotFound {
                user_id,
                wallet_type: wallet_type.to_str(),
            })
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"
        ))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn get_user_wallet(
        &self,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Option<Wallet>, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 AND wallet_type = $2"
        ))
        .bind(user_id)
        .bind(wallet_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn get_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
    ) -> Result<Wallet, ServiceError> {
        sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(wallet_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::WalletNotFound(wallet_id))
    }

    async fn get_user_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
        wallet_type: WalletType,
    ) -> Result<Option<Wallet>, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            SELECT {WALLET_COLUMNS} FROM wallets
            WHERE user_id = $1 AND wallet_type = $2
            FOR UPDATE
            "#
        ))
        .bind(user_id)
        .bind(wallet_type)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(wallet)
    }

    async fn get_escrow_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Option<Wallet>, ServiceError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            SELECT {WALLET_COLUMNS} FROM wallets
            WHERE job_instance_id = $1 AND wallet_type = 'escrow'
            FOR UPDATE
            "#
        ))
        .bind(job_instance_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(wallet)
    }

    async fn get_platform_wallet_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
    ) -> Result<Wallet, ServiceError> {
        sqlx::query_as::<_, Wallet>(&format!(
            r#"
            SELECT {WALLET_COLUMNS} FROM wallets
            WHERE wallet_type = 'platform'
            ORDER BY created_at
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::Validation("Platform wallet is not provisioned".to_string()))
    }

    async fn lock_wallet_pair_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> Result<(Wallet, Wallet), ServiceError> {
        // Fixed total order across all code paths, otherwise two transfers
        // touching the same pair in opposite order can deadlock.
        let (first, second) = if a <= b { (a, b) } else { (b, a) };

        let first_wallet = self.get_wallet_for_update_tx(tx, first).await?;
        let second_wallet = self.get_wallet_for_update_tx(tx, second).await?;

        if first == a {
            Ok((first_wallet, second_wallet))
        } else {
            Ok((second_wallet, first_wallet))
        }
    }

    async fn hold_funds_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        let wallet = self.get_wallet_for_update_tx(tx, wallet_id).await?;

        let appended = self
            .append_ledger(tx, Some(wallet_id), None, amount, LedgerKind::Hold, &reference)
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, LedgerKind::Hold).await;
        };

        if wallet.available_balance < amount {
            return Err(ServiceError::InsufficientAvailableBalance {
                wallet_id,
                required: amount,
                available: wallet.available_balance,
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance - $2,
                held_balance = held_balance + $2,
                updated_at = NOW()
            WHERE id = $1 AND available_balance >= $2
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::ConcurrentModification {
                entity: "wallet",
                entity_id: wallet_id,
            });
        }

        Ok(row)
    }

    async fn release_funds_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        let wallet = self.get_wallet_for_update_tx(tx, wallet_id).await?;

        let appended = self
            .append_ledger(tx, Some(wallet_id), None, amount, LedgerKind::Release, &reference)
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, LedgerKind::Release).await;
        };

        if wallet.held_balance < amount {
            return Err(ServiceError::InsufficientHeldBalance {
                wallet_id,
                required: amount,
                held: wallet.held_balance,
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE wallets
            SET held_balance = held_balance - $2,
                available_balance = available_balance + $2,
                updated_at = NOW()
            WHERE id = $1 AND held_balance >= $2
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::ConcurrentModification {
                entity: "wallet",
                entity_id: wallet_id,
            });
        }

        Ok(row)
    }

    async fn capture_held_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        source_wallet_id: Uuid,
        destination_wallet_id: Option<Uuid>,
        amount: i64,
        kind: LedgerKind,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        let source = match destination_wallet_id {
            Some(dest) => {
                let (source, _) = self.lock_wallet_pair_tx(tx, source_wallet_id, dest).await?;
                source
            }
            None => self.get_wallet_for_update_tx(tx, source_wallet_id).await?,
        };

        let appended = self
            .append_ledger(tx, Some(source_wallet_id), destination_wallet_id, amount, kind, &reference)
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, kind).await;
        };

        if source.held_balance < amount {
            return Err(ServiceError::InsufficientHeldBalance {
                wallet_id: source_wallet_id,
                required: amount,
                held: source.held_balance,
            });
        }

        let debited = sqlx::query(
            r#"
            UPDATE wallets
            SET held_balance = held_balance - $2, updated_at = NOW()
            WHERE id = $1 AND held_balance >= $2
            "#,
        )
        .bind(source_wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if debited.rows_affected() == 0 {
            return Err(ServiceError::ConcurrentModification {
                entity: "wallet",
                entity_id: source_wallet_id,
            });
        }

        if let Some(dest) = destination_wallet_id {
            sqlx::query(
                r#"
                UPDATE wallets
                SET available_balance = available_balance + $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(dest)
            .bind(amount)
            .execute(&mut **tx)
            .await?;
        }

        Ok(row)
    }

    async fn credit_available_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        wallet_id: Uuid,
        source_wallet_id: Option<Uuid>,
        amount: i64,
        kind: LedgerKind,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        self.get_wallet_for_update_tx(tx, wallet_id).await?;

        let appended = self
            .append_ledger(tx, source_wallet_id, Some(wallet_id), amount, kind, &reference)
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, kind).await;
        };

        sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn transfer_available_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        from_wallet_id: Uuid,
        to_wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        let (from, _to) = self.lock_wallet_pair_tx(tx, from_wallet_id, to_wallet_id).await?;

        let appended = self
            .append_ledger(
                tx,
                Some(from_wallet_id),
                Some(to_wallet_id),
                amount,
                LedgerKind::Credit,
                &reference,
            )
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, LedgerKind::Credit).await;
        };

        if from.available_balance < amount {
            return Err(ServiceError::InsufficientAvailableBalance {
                wallet_id: from_wallet_id,
                required: amount,
                available: from.available_balance,
            });
        }

        let debited = sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance - $2, updated_at = NOW()
            WHERE id = $1 AND available_balance >= $2
            "#,
        )
        .bind(from_wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if debited.rows_affected() == 0 {
            return Err(ServiceError::ConcurrentModification {
                entity: "wallet",
                entity_id: from_wallet_id,
            });
        }

        sqlx::query(
            r#"
            UPDATE wallets
            SET available_balance = available_balance + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(to_wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn fund_escrow_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        payer_wallet_id: Uuid,
        escrow_wallet_id: Uuid,
        amount: i64,
        reference: LedgerRef,
    ) -> Result<LedgerTransaction, ServiceError> {
        let (payer, _escrow) = self
            .lock_wallet_pair_tx(tx, payer_wallet_id, escrow_wallet_id)
            .await?;

        let appended = self
            .append_ledger(
                tx,
                Some(payer_wallet_id),
                Some(escrow_wallet_id),
                amount,
                LedgerKind::Hold,
                &reference,
            )
            .await?;
        let Some(row) = appended else {
            return self.recorded_ledger(tx, &reference, LedgerKind::Hold).await;
        };

        // Prefer consuming the publish-time hold; fall back to available
        // funds when the hold is gone. Exactly one side is debited.
        let debited = if payer.held_balance >= amount {
            sqlx::query(
                r#"
                UPDATE wallets
                SET held_balance = held_balance - $2, updated_at = NOW()
                WHERE id = $1 AND held_balance >= $2
                "#,
            )
            .bind(payer_wallet_id)
            .bind(amount)
            .execute(&mut **tx)
            .await?
        } else {
            if payer.available_balance < amount {
                return Err(ServiceError::InsufficientAvailableBalance {
                    wallet_id: payer_wallet_id,
                    required: amount,
                    available: payer.available_balance,
                });
            }
            sqlx::query(
                r#"
                UPDATE wallets
                SET available_balance = available_balance - $2, updated_at = NOW()
                WHERE id = $1 AND available_balance >= $2
                "#,
            )
            .bind(payer_wallet_id)
            .bind(amount)
            .execute(&mut **tx)
            .await?
        };

        if debited.rows_affected() == 0 {
            return Err(ServiceError::ConcurrentModification {
                entity: "wallet",
                entity_id: payer_wallet_id,
            });
        }

        sqlx::query(
            r#"
            UPDATE wallets
            SET held_balance = held_balance + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(escrow_wallet_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn get_ledger_by_reference(
        &self,
        reference_type: &str,
        reference_id: Uuid,
        kind: LedgerKind,
    ) -> Result<Option<LedgerTransaction>, ServiceError> {
        let row = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM ledger_transactions
            WHERE reference_type = $1 AND reference_id = $2 AND kind = $3
            "#
        ))
        .bind(reference_type)
        .bind(reference_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_ledger_for_wallet(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerTransaction>, ServiceError> {
        let rows = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM ledger_transactions
            WHERE source_wallet_id = $1 OR destination_wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// Internal helpers
impl DBClient {
    /// Append one ledger row. Returns None when the reference triple was
    /// already recorded, in which case the caller must not move balances.
    async fn append_ledger(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        source_wallet_id: Option<Uuid>,
        destination_wallet_id: Option<Uuid>,
        amount: i64,
        kind: LedgerKind,
        reference: &LedgerRef,
    ) -> Result<Option<LedgerTransaction>, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(format!(
                "Ledger amounts must be positive, got {}",
                amount
            )));
        }

        let row = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            INSERT INTO ledger_transactions
            (source_wallet_id, destination_wallet_id, amount, kind,
             reference_type, reference_id, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (reference_type, reference_id, kind) DO NOTHING
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(source_wallet_id)
        .bind(destination_wallet_id)
        .bind(amount)
        .bind(kind)
        .bind(reference.reference_type)
        .bind(reference.reference_id)
        .bind(reference.idempotency_key.clone())
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    /// Fetch the previously recorded row for a duplicate reference.
    async fn recorded_ledger(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        reference: &LedgerRef,
        kind: LedgerKind,
    ) -> Result<LedgerTransaction, ServiceError> {
        sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS} FROM ledger_transactions
            WHERE reference_type = $1 AND reference_id = $2 AND kind = $3
            "#
        ))
        .bind(reference.reference_type)
        .bind(reference.reference_id)
        .bind(kind)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ServiceError::Validation("Ledger row vanished after conflict".to_string()))
    }
}
