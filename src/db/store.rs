use crate::db::queries;
use crate::error::InvoiceError;
use crate::models::{InvoiceRecord, IssuanceRow, Month, Seller};
use async_trait::async_trait;
use sqlx::PgPool;

/// 确认开票时需要一次性落库的全部内容
#[derive(Debug, Clone)]
pub struct InvoiceCommit {
    pub record: InvoiceRecord,
    /// 本次新注册的设备
    pub register_devices: Vec<String>,
    /// 本次开票涉及的设备 (其发行明细将标记为已开票)
    pub invoiced_devices: Vec<String>,
    pub year: i32,
    pub months: Vec<Month>,
    /// 加载时读到的明细行数, 用于乐观并发校验
    pub expected_rows: u64,
}

/// 数据访问边界
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn list_sellers(&self) -> Result<Vec<Seller>, InvoiceError>;

    async fn list_company_devices(&self, company: &str) -> Result<Vec<String>, InvoiceError>;

    /// 仅返回 issued = actual_used 且未开票的明细
    async fn list_issuances(
        &self,
        device_ids: &[String],
        year: i32,
        months: &[Month],
    ) -> Result<Vec<IssuanceRow>, InvoiceError>;

    /// 已注册子集, 逗号分隔; 无则 None
    async fn registered_devices(&self, device_ids: &[String]) -> Result<Option<String>, InvoiceError>;

    /// 单事务: 注册设备 + 写发票记录 + 标记明细已开票, 任一失败全部回滚
    async fn commit_invoice(&self, commit: &InvoiceCommit) -> Result<(), InvoiceError>;
}

/// PostgreSQL 实现
#[derive(Debug, Clone)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn list_sellers(&self) -> Result<Vec<Seller>, InvoiceError> {
        Ok(queries::list_sellers(&self.pool).await?)
    }

    async fn list_company_devices(&self, company: &str) -> Result<Vec<String>, InvoiceError> {
        Ok(queries::list_company_devices(&self.pool, company).await?)
    }

    async fn list_issuances(
        &self,
        device_ids: &[String],
        year: i32,
        months: &[Month],
    ) -> Result<Vec<IssuanceRow>, InvoiceError> {
        Ok(queries::list_issuances(&self.pool, device_ids, year, months).await?)
    }

    async fn registered_devices(&self, device_ids: &[String]) -> Result<Option<String>, InvoiceError> {
        Ok(queries::registered_devices(&self.pool, device_ids).await?)
    }

    async fn commit_invoice(&self, commit: &InvoiceCommit) -> Result<(), InvoiceError> {
        queries::commit_invoice(&self.pool, commit).await
    }
}
