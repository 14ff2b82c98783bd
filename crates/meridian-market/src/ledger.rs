//! Double-entry bookkeeping for marketplace funds.
//!
//! Every economic effect is one [`LedgerEntry`] decomposed into exactly two
//! [`LedgerPosting`] legs whose amounts are equal and whose sides are
//! opposite, so the books always balance. Entries are keyed by an
//! idempotency token: re-submitting a token is a no-op, which turns
//! at-least-once callers into exactly-once economic effects.
//!
//! The account pairs are fixed per operation:
//!
//! | operation | debit                | credit               |
//! |-----------|----------------------|----------------------|
//! | hold      | user `balance`       | user `hold`          |
//! | debit     | user `hold`          | platform `revenue`   |
//! | refund    | user `hold`          | user `balance`       |
//!
//! Overdraft checking is not this layer's concern; callers must not assume
//! a hold fails on insufficient balance.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meridian_core::{AccountId, EntryId, JobId, UserId};

use crate::error::{Error, Result};
use crate::store::Store;

/// Currency all accounts are denominated in.
pub const CURRENCY: &str = "USD";

/// Who a ledger account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum AccountOwner {
    /// A marketplace user.
    User(UserId),
    /// The platform itself (fees, recognized revenue).
    Platform,
}

impl fmt::Display for AccountOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Platform => write!(f, "platform"),
        }
    }
}

/// Accounting classification of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    /// Something owned.
    Asset,
    /// Something owed.
    Liability,
    /// Earned income.
    Revenue,
    /// Incurred cost.
    Expense,
}

/// One named bucket of value for one owner.
///
/// At most one account exists per (owner, kind, name); resolution is
/// get-or-create on first use and accounts are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    /// Unique account identifier.
    pub id: AccountId,
    /// The account's owner.
    pub owner: AccountOwner,
    /// Accounting classification.
    pub kind: AccountKind,
    /// Semantic name distinguishing accounts of the same kind
    /// (e.g. `balance` vs `hold`).
    pub name: String,
    /// Currency the account is denominated in.
    pub currency: String,
}

/// The economic meaning of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Funds reserved against a future charge.
    Hold,
    /// Reserved funds recognized as earned.
    Debit,
    /// Reserved funds returned to spendable.
    Refund,
    /// A direct charge outside the hold flow.
    Charge,
}

/// One atomic economic event.
///
/// Immutable once written; the idempotency token is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique entry identifier.
    pub id: EntryId,
    /// The job this entry relates to.
    pub job_id: JobId,
    /// The economic meaning.
    pub kind: EntryKind,
    /// Globally unique idempotency token.
    pub idempotency_token: String,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

/// Which side of an account a posting hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingSide {
    /// Debit leg.
    Debit,
    /// Credit leg.
    Credit,
}

/// One leg of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPosting {
    /// The entry this leg belongs to.
    pub entry_id: EntryId,
    /// The account this leg affects.
    pub account_id: AccountId,
    /// Debit or credit.
    pub side: PostingSide,
    /// Non-negative amount.
    pub amount: Decimal,
}

/// The double-entry bookkeeping service.
///
/// All operations are idempotent on their token: the first call records an
/// entry with two balanced postings, every later call with the same token
/// returns without writing.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Creates a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reserves `amount` of the user's spendable funds for `job_id`.
    ///
    /// Moves value from the user's `balance` account to the user's `hold`
    /// account.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or the store fails.
    #[tracing::instrument(skip(self), fields(kind = "HOLD"))]
    pub async fn hold(
        &self,
        token: &str,
        user_id: UserId,
        amount: Decimal,
        job_id: JobId,
    ) -> Result<()> {
        let owner = AccountOwner::User(user_id);
        self.record(
            EntryKind::Hold,
            token,
            amount,
            job_id,
            (owner, AccountKind::Liability, "balance"),
            (owner, AccountKind::Liability, "hold"),
        )
        .await
    }

    /// Recognizes `amount` of the user's reserved funds as platform revenue.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or the store fails.
    #[tracing::instrument(skip(self), fields(kind = "DEBIT"))]
    pub async fn debit(
        &self,
        token: &str,
        user_id: UserId,
        amount: Decimal,
        job_id: JobId,
    ) -> Result<()> {
        self.record(
            EntryKind::Debit,
            token,
            amount,
            job_id,
            (AccountOwner::User(user_id), AccountKind::Liability, "hold"),
            (AccountOwner::Platform, AccountKind::Revenue, "revenue"),
        )
        .await
    }

    /// Returns `amount` of the user's reserved funds to spendable.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative or the store fails.
    #[tracing::instrument(skip(self), fields(kind = "REFUND"))]
    pub async fn refund(
        &self,
        token: &str,
        user_id: UserId,
        amount: Decimal,
        job_id: JobId,
    ) -> Result<()> {
        let owner = AccountOwner::User(user_id);
        self.record(
            EntryKind::Refund,
            token,
            amount,
            job_id,
            (owner, AccountKind::Liability, "hold"),
            (owner, AccountKind::Liability, "balance"),
        )
        .await
    }

    /// Records one balanced entry: a debit leg against `debit_account` and a
    /// credit leg against `credit_account`, both for `amount`.
    async fn record(
        &self,
        kind: EntryKind,
        token: &str,
        amount: Decimal,
        job_id: JobId,
        debit_account: (AccountOwner, AccountKind, &str),
        credit_account: (AccountOwner, AccountKind, &str),
    ) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidAmount {
                message: format!("posting amount must be non-negative, got {amount}"),
            });
        }

        // Cheap pre-check; the store re-checks the token inside the insert
        // transaction, which is what makes concurrent duplicates safe.
        if self.store.find_entry_by_token(token).await?.is_some() {
            tracing::debug!(token, "duplicate ledger token, no-op");
            return Ok(());
        }

        let (debit_owner, debit_kind, debit_name) = debit_account;
        let (credit_owner, credit_kind, credit_name) = credit_account;
        let debit = self
            .store
            .get_or_create_account(&debit_owner, debit_kind, debit_name)
            .await?;
        let credit = self
            .store
            .get_or_create_account(&credit_owner, credit_kind, credit_name)
            .await?;

        let entry = LedgerEntry {
            id: EntryId::generate(),
            job_id,
            kind,
            idempotency_token: token.to_string(),
            created_at: Utc::now(),
        };
        let postings = [
            LedgerPosting {
                entry_id: entry.id,
                account_id: debit.id,
                side: PostingSide::Debit,
                amount,
            },
            LedgerPosting {
                entry_id: entry.id,
                account_id: credit.id,
                side: PostingSide::Credit,
                amount,
            },
        ];

        let outcome = self.store.insert_entry(&entry, &postings).await?;
        if outcome.is_recorded() {
            crate::metrics::record_ledger_entry(kind);
        } else {
            tracing::debug!(token, "duplicate ledger token lost the race, no-op");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::store::Store;

    fn ledger_and_store() -> (Ledger, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (Ledger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn hold_posts_two_balanced_legs() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();

        ledger.hold("tok-1", user, Decimal::new(60, 2), job).await?;

        let entries = store.entries_for_job(&job).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Hold);

        let postings = store.postings_for_entry(&entries[0].id).await?;
        assert_eq!(postings.len(), 2);
        let debits: Decimal = postings
            .iter()
            .filter(|p| p.side == PostingSide::Debit)
            .map(|p| p.amount)
            .sum();
        let credits: Decimal = postings
            .iter()
            .filter(|p| p.side == PostingSide::Credit)
            .map(|p| p.amount)
            .sum();
        assert_eq!(debits, credits);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_token_is_noop() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();

        ledger.hold("tok-dup", user, Decimal::ONE, job).await?;
        ledger.hold("tok-dup", user, Decimal::ONE, job).await?;

        let entries = store.entries_for_job(&job).await?;
        assert_eq!(entries.len(), 1);
        let postings = store.postings_for_entry(&entries[0].id).await?;
        assert_eq!(postings.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_token_across_operations_is_noop() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();

        ledger.hold("tok-shared", user, Decimal::ONE, job).await?;
        ledger.refund("tok-shared", user, Decimal::ONE, job).await?;

        let entries = store.entries_for_job(&job).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::Hold);
        Ok(())
    }

    #[tokio::test]
    async fn debit_credits_platform_revenue() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();

        ledger.debit("tok-d", user, Decimal::new(723, 2), job).await?;

        let revenue = store
            .get_or_create_account(&AccountOwner::Platform, AccountKind::Revenue, "revenue")
            .await?;
        let entries = store.entries_for_job(&job).await?;
        let postings = store.postings_for_entry(&entries[0].id).await?;
        let credit_leg = postings
            .iter()
            .find(|p| p.side == PostingSide::Credit)
            .unwrap();
        assert_eq!(credit_leg.account_id, revenue.id);
        Ok(())
    }

    #[tokio::test]
    async fn refund_returns_funds_to_balance() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();
        let owner = AccountOwner::User(user);

        ledger.hold("tok-h", user, Decimal::TEN, job).await?;
        ledger.refund("tok-r", user, Decimal::TEN, job).await?;

        let balance = store
            .get_or_create_account(&owner, AccountKind::Liability, "balance")
            .await?;
        let entries = store.entries_for_job(&job).await?;
        assert_eq!(entries.len(), 2);
        let refund = entries.iter().find(|e| e.kind == EntryKind::Refund).unwrap();
        let postings = store.postings_for_entry(&refund.id).await?;
        let credit_leg = postings
            .iter()
            .find(|p| p.side == PostingSide::Credit)
            .unwrap();
        assert_eq!(credit_leg.account_id, balance.id);
        Ok(())
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let (ledger, _store) = ledger_and_store();
        let err = ledger
            .hold("tok-neg", UserId::generate(), Decimal::NEGATIVE_ONE, JobId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn concurrent_duplicate_holds_record_one_entry() -> Result<()> {
        let (ledger, store) = ledger_and_store();
        let user = UserId::generate();
        let job = JobId::generate();

        let a = ledger.hold("tok-race", user, Decimal::ONE, job);
        let b = ledger.hold("tok-race", user, Decimal::ONE, job);
        let (ra, rb) = tokio::join!(a, b);
        ra?;
        rb?;

        assert_eq!(store.entries_for_job(&job).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn account_owner_display() {
        assert_eq!(AccountOwner::Platform.to_string(), "platform");
        let user = UserId::generate();
        assert!(AccountOwner::User(user).to_string().starts_with("user:"));
    }
}
