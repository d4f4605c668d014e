//! Obligo versioned contract store
//!
//! The authoritative table of contracts, keyed by contract id, with two
//! derived indexes: identity -> ordered version list and identity -> active
//! contract id. All mutation funnels through the write-lock boundary of one
//! [`ContractStore`], so version assignment, status transitions, and
//! active-set swaps never race; readers take the read lock and only ever see
//! committed state.
//!
//! Contracts are never physically removed. Approval supersedes the previous
//! active version in the same write-lock scope that registers the new one, so
//! no reader can observe two actives or a stale active id. Deletion is a
//! soft marker kept for audit.

use chrono::Utc;
use obligo_model::{
    Contract, ContractId, ContractIdentity, ContractStatus, Discrepancy, SecondaryReview,
    TransitionError,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("contract not found: {0}")]
    NotFound(ContractId),
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
    #[error("no active contract for {counterparty_key} / {product_group}")]
    NoActiveContract {
        counterparty_key: String,
        product_group: String,
    },
    #[error("contract {0} is soft-deleted")]
    SoftDeleted(ContractId),
}

#[derive(Default)]
struct Inner {
    contracts: HashMap<ContractId, Contract>,
    /// Identity -> contract ids in ingestion (= version) order.
    versions: BTreeMap<ContractIdentity, Vec<ContractId>>,
    /// Identity -> the single active (approved) contract id.
    active: BTreeMap<ContractIdentity, ContractId>,
}

impl Inner {
    fn get_mut(&mut self, id: ContractId) -> Result<&mut Contract, StoreError> {
        let contract = self.contracts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if contract.deleted {
            return Err(StoreError::SoftDeleted(id));
        }
        Ok(contract)
    }
}

#[derive(Default)]
pub struct ContractStore {
    inner: RwLock<Inner>,
}

impl ContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a contract: assign the next version for its identity, reset the
    /// status to draft, and chain the audit hash to the previous version.
    /// Never overwrites a prior version.
    pub fn ingest(&self, mut contract: Contract) -> ContractId {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let chain = inner.versions.entry(contract.identity()).or_default();

        contract.version = chain.len() as u32 + 1;
        contract.status = ContractStatus::Draft;
        contract.previous_version_hash = chain
            .last()
            .and_then(|prev| inner.contracts.get(prev))
            .and_then(|prev| prev.document_hash.clone());
        contract.updated_at = Utc::now();

        let id = contract.id;
        info!(
            contract = %id,
            counterparty = %contract.counterparty,
            product_group = %contract.product_group,
            version = contract.version,
            "ingested contract"
        );
        chain.push(id);
        inner.contracts.insert(id, contract);
        id
    }

    /// Reviewer-driven status transition. On approval, the previous active
    /// contract for the identity (if any, and different) is superseded and
    /// the new one registered as active inside the same write-lock scope.
    pub fn update_status(
        &self,
        id: ContractId,
        new_status: ContractStatus,
        reviewer: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.status.check_transition(new_status)?;

        let from = contract.status;
        contract.status = new_status;
        // Absent reviewer/notes leave the prior record in place.
        if let Some(reviewer) = reviewer {
            contract.reviewer = Some(reviewer.to_string());
        }
        if let Some(notes) = notes {
            contract.review_notes = Some(notes.to_string());
        }
        contract.updated_at = Utc::now();
        let identity = contract.identity();
        info!(contract = %id, %from, to = %new_status, "status transition");

        if new_status == ContractStatus::Approved {
            if let Some(&previous) = inner.active.get(&identity) {
                if previous != id {
                    if let Some(old) = inner.contracts.get_mut(&previous) {
                        old.status = ContractStatus::Superseded;
                        old.updated_at = Utc::now();
                        info!(contract = %previous, superseded_by = %id, "superseded previous active");
                    }
                }
            }
            inner.active.insert(identity, id);
        }
        Ok(())
    }

    pub fn get(&self, id: ContractId) -> Result<Contract, StoreError> {
        self.inner
            .read()
            .contracts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// All versions for an identity, in ingestion order.
    pub fn versions(&self, identity: &ContractIdentity) -> Vec<Contract> {
        let inner = self.inner.read();
        inner
            .versions
            .get(identity)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.contracts.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The single active contract for an identity.
    pub fn active(&self, identity: &ContractIdentity) -> Result<Contract, StoreError> {
        let inner = self.inner.read();
        inner
            .active
            .get(identity)
            .and_then(|id| inner.contracts.get(id))
            .filter(|c| !c.deleted)
            .cloned()
            .ok_or_else(|| StoreError::NoActiveContract {
                counterparty_key: identity.counterparty_key.clone(),
                product_group: identity.product_group.clone(),
            })
    }

    /// Every currently-active contract in a product group: the exact input
    /// surface the constraint bridge consumes.
    pub fn get_active_set(&self, product_group: &str) -> Vec<Contract> {
        let inner = self.inner.read();
        inner
            .active
            .iter()
            .filter(|(identity, _)| identity.product_group == product_group)
            .filter_map(|(_, id)| inner.contracts.get(id))
            .filter(|c| !c.deleted)
            .cloned()
            .collect()
    }

    /// All contracts (any status) in a product group, minus soft-deleted.
    pub fn contracts_for_group(&self, product_group: &str) -> Vec<Contract> {
        let inner = self.inner.read();
        inner
            .contracts
            .values()
            .filter(|c| c.product_group == product_group && !c.deleted)
            .cloned()
            .collect()
    }

    pub fn update_open_position(&self, id: ContractId, quantity: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.open_position = Some(quantity);
        contract.position_refreshed_at = Some(Utc::now());
        contract.updated_at = Utc::now();
        debug!(contract = %id, quantity, "open position refreshed");
        Ok(())
    }

    pub fn update_validation(
        &self,
        id: ContractId,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.completeness_validation = Some(result);
        contract.updated_at = Utc::now();
        debug!(contract = %id, "completeness validation attached");
        Ok(())
    }

    pub fn update_external_validation(
        &self,
        id: ContractId,
        result: serde_json::Value,
        discrepancies: Vec<Discrepancy>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.external_validation = Some(result);
        contract.discrepancies = discrepancies;
        contract.external_validated_at = Some(Utc::now());
        contract.updated_at = Utc::now();
        debug!(contract = %id, "external validation attached");
        Ok(())
    }

    pub fn update_secondary_review(
        &self,
        id: ContractId,
        review: SecondaryReview,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.secondary_review = Some(review);
        contract.updated_at = Utc::now();
        debug!(contract = %id, "secondary review attached");
        Ok(())
    }

    /// Flag or clear the stale-data marker set by upstream feeds.
    pub fn set_stale_data(&self, id: ContractId, stale: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.stale_data = stale;
        contract.updated_at = Utc::now();
        Ok(())
    }

    /// Soft delete: the record stays for audit and drops out of the active
    /// set and all further mutation.
    pub fn soft_delete(&self, id: ContractId, reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let contract = inner.get_mut(id)?;
        contract.deleted = true;
        contract.delete_reason = Some(reason.to_string());
        contract.updated_at = Utc::now();
        let identity = contract.identity();
        if inner.active.get(&identity) == Some(&id) {
            inner.active.remove(&identity);
        }
        info!(contract = %id, reason, "soft-deleted contract");
        Ok(())
    }
}
