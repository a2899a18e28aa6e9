use crate::db::store::{InvoiceCommit, InvoiceStore};
use crate::error::InvoiceError;
use crate::models::{InvoiceRecord, IssuanceRow, Month, Seller};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// 落库步骤, 用于注入失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    RegisterDevices,
    InsertInvoice,
    MarkInvoiced,
}

#[derive(Debug, Clone)]
struct StoredIssuance {
    year: i32,
    row: IssuanceRow,
    actual_used: BigDecimal,
    invoiced: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    sellers: Vec<Seller>,
    company_devices: HashMap<String, Vec<String>>,
    issuances: Vec<StoredIssuance>,
    registered: BTreeSet<String>,
    invoices: Vec<InvoiceRecord>,
}

/// 内存实现, 用于测试与本地调试
///
/// 提交时先在副本上执行全部步骤, 成功后整体替换, 失败则丢弃副本.
#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    state: RwLock<MemoryState>,
    fail_at: RwLock<Option<CommitStep>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, InvoiceError> {
        self.state
            .read()
            .map_err(|_| InvoiceError::Persistence("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, InvoiceError> {
        self.state
            .write()
            .map_err(|_| InvoiceError::Persistence("lock poisoned".to_string()))
    }

    pub fn add_seller(&self, seller: Seller) {
        if let Ok(mut state) = self.state.write() {
            state.sellers.push(seller);
        }
    }

    pub fn add_company_device(&self, company: &str, device_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state
                .company_devices
                .entry(company.to_string())
                .or_default()
                .push(device_id.to_string());
        }
    }

    /// 添加一条已核对的明细 (actual_used = issued)
    pub fn add_issuance(&self, year: i32, row: IssuanceRow) {
        let actual_used = row.issued.clone();
        self.add_issuance_with_actual(year, row, actual_used);
    }

    pub fn add_issuance_with_actual(&self, year: i32, row: IssuanceRow, actual_used: BigDecimal) {
        if let Ok(mut state) = self.state.write() {
            state.issuances.push(StoredIssuance {
                year,
                row,
                actual_used,
                invoiced: false,
            });
        }
    }

    pub fn register(&self, device_id: &str) {
        if let Ok(mut state) = self.state.write() {
            state.registered.insert(device_id.to_string());
        }
    }

    /// 下一次提交在指定步骤失败 (一次性)
    pub fn fail_next_commit_at(&self, step: CommitStep) {
        if let Ok(mut fail) = self.fail_at.write() {
            *fail = Some(step);
        }
    }

    pub fn registered_snapshot(&self) -> BTreeSet<String> {
        self.read().map(|s| s.registered.clone()).unwrap_or_default()
    }

    pub fn invoices_snapshot(&self) -> Vec<InvoiceRecord> {
        self.read().map(|s| s.invoices.clone()).unwrap_or_default()
    }

    pub fn open_issuance_count(&self) -> usize {
        self.read()
            .map(|s| s.issuances.iter().filter(|i| !i.invoiced).count())
            .unwrap_or(0)
    }

    fn take_failure(&self) -> Option<CommitStep> {
        self.fail_at.write().ok().and_then(|mut f| f.take())
    }
}

fn matches_scope(item: &StoredIssuance, device_ids: &[String], year: i32, months: &[Month]) -> bool {
    item.year == year
        && device_ids.contains(&item.row.device_id)
        && Month::from_number(item.row.month as u32)
            .map(|m| months.contains(&m))
            .unwrap_or(false)
        && item.row.issued == item.actual_used
        && !item.invoiced
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn list_sellers(&self) -> Result<Vec<Seller>, InvoiceError> {
        let mut sellers = self.read()?.sellers.clone();
        sellers.sort_by(|a, b| {
            a.group_name
                .cmp(&b.group_name)
                .then_with(|| a.seller.cmp(&b.seller))
        });
        Ok(sellers)
    }

    async fn list_company_devices(&self, company: &str) -> Result<Vec<String>, InvoiceError> {
        let mut devices = self
            .read()?
            .company_devices
            .get(company)
            .cloned()
            .unwrap_or_default();
        devices.sort();
        Ok(devices)
    }

    async fn list_issuances(
        &self,
        device_ids: &[String],
        year: i32,
        months: &[Month],
    ) -> Result<Vec<IssuanceRow>, InvoiceError> {
        let state = self.read()?;
        let mut rows: Vec<IssuanceRow> = state
            .issuances
            .iter()
            .filter(|i| matches_scope(i, device_ids, year, months))
            .map(|i| i.row.clone())
            .collect();
        rows.sort_by(|a, b| {
            a.device_id
                .cmp(&b.device_id)
                .then_with(|| a.project.cmp(&b.project))
                .then_with(|| a.month.cmp(&b.month))
        });
        Ok(rows)
    }

    async fn registered_devices(&self, device_ids: &[String]) -> Result<Option<String>, InvoiceError> {
        let state = self.read()?;
        let found: Vec<&str> = state
            .registered
            .iter()
            .filter(|id| device_ids.contains(id))
            .map(|id| id.as_str())
            .collect();
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.join(",")))
        }
    }

    async fn commit_invoice(&self, commit: &InvoiceCommit) -> Result<(), InvoiceError> {
        let failure = self.take_failure();
        let mut state = self.write()?;
        let mut staged = state.clone();

        // 1. 注册设备
        for device_id in &commit.register_devices {
            staged.registered.insert(device_id.clone());
        }
        if failure == Some(CommitStep::RegisterDevices) {
            return Err(InvoiceError::Persistence("injected failure: register devices".to_string()));
        }

        // 2. 写发票记录
        staged.invoices.push(commit.record.clone());
        if failure == Some(CommitStep::InsertInvoice) {
            return Err(InvoiceError::Persistence("injected failure: insert invoice".to_string()));
        }

        // 3. 标记明细已开票
        let mut marked = 0u64;
        for item in staged.issuances.iter_mut() {
            if matches_scope(item, &commit.invoiced_devices, commit.year, &commit.months) {
                item.invoiced = true;
                marked += 1;
            }
        }
        if failure == Some(CommitStep::MarkInvoiced) {
            return Err(InvoiceError::Persistence("injected failure: mark invoiced".to_string()));
        }
        if marked != commit.expected_rows {
            return Err(InvoiceError::Persistence(format!(
                "expected to invoice {} issuance rows but {} were still open",
                commit.expected_rows, marked
            )));
        }

        *state = staged;
        Ok(())
    }
}
