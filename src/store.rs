use crate::error::Result;
use crate::schema::{DocumentTotal, LimitPolicy, MonthlySnapshot};
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Read-only view onto the external Document Source, scoped by tenant and
/// calendar year. This subsystem never writes through this trait.
pub trait DocumentSource: Send + Sync {
    /// Documents issued by `tenant_id` in `year`, optionally restricted to an
    /// explicit id set.
    fn fetch_year(
        &self,
        tenant_id: &str,
        year: i32,
        doc_ids: Option<&[String]>,
    ) -> Result<Vec<DocumentTotal>>;

    /// Single-document lookup used by the event-triggered path to resolve
    /// tenant and year. Absence is a value, not an error.
    fn fetch_by_id(&self, doc_id: &str) -> Result<Option<DocumentTotal>>;
}

/// Per-year limit policy storage with lazy defaulting.
pub trait PolicyStore: Send + Sync {
    /// Returns the policy for `year`, inserting `LimitPolicy::default_for_year`
    /// on first access. Once created the row is immutable except through
    /// `put`.
    fn get_or_create(&self, year: i32) -> Result<LimitPolicy>;

    /// Explicit policy replacement, for operators and tests. Validates the
    /// supplied policy before storing it.
    fn put(&self, policy: LimitPolicy) -> Result<()>;
}

/// Durable per-(tenant, year, month) snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Upserts one recalculation run's full 12-row set as a single logical
    /// unit: either all rows land or the call fails without partial writes
    /// for that (tenant, year). Last writer wins across runs.
    fn upsert_year(&self, snapshots: &[MonthlySnapshot]) -> Result<()>;

    /// The stored rows for (tenant, year), ordered by month. Empty if the
    /// tenant-year has never been recalculated.
    fn fetch_year(&self, tenant_id: &str, year: i32) -> Result<Vec<MonthlySnapshot>>;
}

/// In-memory Document Source for tests and embedded use.
#[derive(Default)]
pub struct InMemoryDocumentSource {
    docs: RwLock<BTreeMap<String, DocumentTotal>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: DocumentTotal) {
        self.docs.write().insert(doc.id.clone(), doc);
    }

    pub fn remove(&self, doc_id: &str) {
        self.docs.write().remove(doc_id);
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn fetch_year(
        &self,
        tenant_id: &str,
        year: i32,
        doc_ids: Option<&[String]>,
    ) -> Result<Vec<DocumentTotal>> {
        let docs = self.docs.read();
        let selected: Vec<DocumentTotal> = docs
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .filter(|d| d.issue_year() == Some(year))
            .filter(|d| match doc_ids {
                Some(ids) => ids.iter().any(|id| *id == d.id),
                None => true,
            })
            .cloned()
            .collect();

        debug!(
            "Fetched {} document(s) for tenant {} year {}",
            selected.len(),
            tenant_id,
            year
        );
        Ok(selected)
    }

    fn fetch_by_id(&self, doc_id: &str) -> Result<Option<DocumentTotal>> {
        Ok(self.docs.read().get(doc_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<BTreeMap<i32, LimitPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn get_or_create(&self, year: i32) -> Result<LimitPolicy> {
        let mut policies = self.policies.write();
        let policy = policies
            .entry(year)
            .or_insert_with(|| LimitPolicy::default_for_year(year));
        Ok(*policy)
    }

    fn put(&self, policy: LimitPolicy) -> Result<()> {
        policy.validate()?;
        self.policies.write().insert(policy.year, policy);
        Ok(())
    }
}

type SnapshotKey = (String, i32, u32);

#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: RwLock<BTreeMap<SnapshotKey, MonthlySnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn upsert_year(&self, snapshots: &[MonthlySnapshot]) -> Result<()> {
        // Single write lock over the whole set gives the all-or-nothing
        // semantics the orchestrator relies on.
        let mut rows = self.rows.write();
        for snapshot in snapshots {
            rows.insert(
                (snapshot.tenant_id.clone(), snapshot.year, snapshot.month),
                snapshot.clone(),
            );
        }
        Ok(())
    }

    fn fetch_year(&self, tenant_id: &str, year: i32) -> Result<Vec<MonthlySnapshot>> {
        let rows = self.rows.read();
        let mut selected: Vec<MonthlySnapshot> = rows
            .values()
            .filter(|s| s.tenant_id == tenant_id && s.year == year)
            .cloned()
            .collect();
        selected.sort_by_key(|s| s.month);
        Ok(selected)
    }
}
