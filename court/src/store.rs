//! Persistence seam for bounties and disputes.
//!
//! Writes are revision-checked: a record is replaced only if the stored
//! revision still equals the revision the caller read.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{CourtError, Result};
use crate::types::{Bounty, Dispute};

/// Storage for court records.
#[async_trait]
pub trait CourtStore: Send + Sync {
    async fn insert_bounty(&self, bounty: Bounty) -> Result<Bounty>;

    async fn bounty(&self, id: &str) -> Result<Bounty>;

    /// Replace a bounty if its stored revision equals `bounty.revision`.
    /// Returns the stored record with the incremented revision.
    async fn replace_bounty(&self, bounty: Bounty) -> Result<Bounty>;

    async fn bounties(&self) -> Vec<Bounty>;

    async fn insert_dispute(&self, dispute: Dispute) -> Result<Dispute>;

    async fn dispute(&self, id: &str) -> Result<Dispute>;

    /// Replace a dispute if its stored revision equals `dispute.revision`.
    async fn replace_dispute(&self, dispute: Dispute) -> Result<Dispute>;

    async fn disputes(&self) -> Vec<Dispute>;
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryStore {
    bounties: DashMap<String, Bounty>,
    disputes: DashMap<String, Dispute>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourtStore for InMemoryStore {
    async fn insert_bounty(&self, bounty: Bounty) -> Result<Bounty> {
        if self.bounties.contains_key(&bounty.id) {
            return Err(CourtError::InvalidRequest(format!("bounty {} already exists", bounty.id)));
        }
        self.bounties.insert(bounty.id.clone(), bounty.clone());
        Ok(bounty)
    }

    async fn bounty(&self, id: &str) -> Result<Bounty> {
        self.bounties
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CourtError::NotFound(format!("bounty {}", id)))
    }

    async fn replace_bounty(&self, mut bounty: Bounty) -> Result<Bounty> {
        let mut entry = self
            .bounties
            .get_mut(&bounty.id)
            .ok_or_else(|| CourtError::NotFound(format!("bounty {}", bounty.id)))?;

        if entry.revision != bounty.revision {
            return Err(CourtError::ConcurrentModification(format!("bounty {}", bounty.id)));
        }

        bounty.revision += 1;
        *entry = bounty.clone();
        Ok(bounty)
    }

    async fn bounties(&self) -> Vec<Bounty> {
        let mut all: Vec<Bounty> = self.bounties.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    async fn insert_dispute(&self, dispute: Dispute) -> Result<Dispute> {
        if self.disputes.contains_key(&dispute.id) {
            return Err(CourtError::InvalidRequest(format!(
                "dispute {} already exists",
                dispute.id
            )));
        }
        self.disputes.insert(dispute.id.clone(), dispute.clone());
        Ok(dispute)
    }

    async fn dispute(&self, id: &str) -> Result<Dispute> {
        self.disputes
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CourtError::NotFound(format!("dispute {}", id)))
    }

    async fn replace_dispute(&self, mut dispute: Dispute) -> Result<Dispute> {
        let mut entry = self
            .disputes
            .get_mut(&dispute.id)
            .ok_or_else(|| CourtError::NotFound(format!("dispute {}", dispute.id)))?;

        if entry.revision != dispute.revision {
            return Err(CourtError::ConcurrentModification(format!("dispute {}", dispute.id)));
        }

        dispute.revision += 1;
        *entry = dispute.clone();
        Ok(dispute)
    }

    async fn disputes(&self) -> Vec<Dispute> {
        let mut all: Vec<Dispute> = self.disputes.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }
}
