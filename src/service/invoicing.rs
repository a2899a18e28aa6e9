use crate::db::{InvoiceCommit, InvoiceStore};
use crate::document::{DocumentSink, InvoiceDocument, WorksheetDocument};
use crate::error::InvoiceError;
use crate::models::{
    month_range, pivot_issuance_rows, CommercialParameters, DeviceIssuance, InvoiceCalculationResult,
    InvoiceRecord, InvoiceRequest, Month,
};
use crate::service::calculator::calculate;
use crate::service::partial::{pending_prompts, resolve_partials, PartialDecider, PartialPrompt};
use crate::service::registration::{pending_registrations, RegistrationTracker};
use crate::service::sellers::SellerDirectory;
use chrono::Local;
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// 开票会话状态: Draft -> Previewed (可重复) -> Confirmed (终态)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Draft,
    Previewed,
    Confirmed,
}

/// 从数据库加载、透视后的账期数据 (尚未确认 partial)
#[derive(Debug, Clone)]
pub struct IssuanceBatch {
    pub months: Vec<Month>,
    pub devices: Vec<DeviceIssuance>,
    pub source_rows: u64,
}

impl IssuanceBatch {
    pub fn pending_prompts(&self, year: i32) -> Vec<PartialPrompt> {
        pending_prompts(&self.devices, &self.months, year)
    }
}

/// 单次开票会话 (单操作员)
#[derive(Debug, Clone)]
pub struct InvoiceSession {
    request: InvoiceRequest,
    months: Vec<Month>,
    devices: Vec<DeviceIssuance>,
    registered: HashSet<String>,
    source_rows: u64,
    state: SessionState,
    last_result: Option<InvoiceCalculationResult>,
}

impl InvoiceSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> &InvoiceRequest {
        &self.request
    }

    pub fn months(&self) -> &[Month] {
        &self.months
    }

    pub fn devices(&self) -> &[DeviceIssuance] {
        &self.devices
    }

    pub fn registered(&self) -> &HashSet<String> {
        &self.registered
    }

    pub fn last_result(&self) -> Option<&InvoiceCalculationResult> {
        self.last_result.as_ref()
    }

    fn ensure_open(&self) -> Result<(), InvoiceError> {
        if self.state == SessionState::Confirmed {
            return Err(InvoiceError::SessionClosed);
        }
        Ok(())
    }

    /// 修改商务参数, 会话回到 Draft
    pub fn update_parameters(&mut self, params: CommercialParameters) -> Result<(), InvoiceError> {
        self.ensure_open()?;
        params.validate()?;
        self.request.params = params;
        self.state = SessionState::Draft;
        self.last_result = None;
        Ok(())
    }

    /// 计算并展示结果, 不落库; 可重复调用
    pub fn preview(&mut self) -> Result<InvoiceCalculationResult, InvoiceError> {
        self.ensure_open()?;
        let result = calculate(&self.devices, &self.registered, &self.request.params);
        self.state = SessionState::Previewed;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    pub fn worksheet(&mut self) -> Result<WorksheetDocument, InvoiceError> {
        let result = self.preview()?;
        Ok(WorksheetDocument::build(
            &self.request.company_name,
            self.request.year,
            &self.months,
            &self.devices,
            &result,
        ))
    }

    /// 设备编号 (去重, 保持顺序)
    pub fn device_ids(&self) -> Vec<String> {
        let ids: IndexSet<&str> = self.devices.iter().map(|d| d.device_id.as_str()).collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// 项目名称 (去重) 以 " and " 连接
    pub fn projects_label(&self) -> String {
        let projects: IndexSet<&str> = self.devices.iter().map(|d| d.project.as_str()).collect();
        projects.into_iter().collect::<Vec<_>>().join(" and ")
    }
}

/// 确认开票的产出
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedInvoice {
    pub record: InvoiceRecord,
    pub result: InvoiceCalculationResult,
    pub documents: Vec<PathBuf>,
}

/// 开票服务
pub struct InvoiceService<S: InvoiceStore> {
    store: Arc<S>,
    sellers: SellerDirectory<S>,
    tracker: RegistrationTracker<S>,
    sink: Arc<dyn DocumentSink>,
}

impl<S: InvoiceStore> InvoiceService<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn DocumentSink>) -> Self {
        Self {
            sellers: SellerDirectory::new(store.clone()),
            tracker: RegistrationTracker::new(store.clone()),
            store,
            sink,
        }
    }

    pub fn sellers(&self) -> &SellerDirectory<S> {
        &self.sellers
    }

    pub fn tracker(&self) -> &RegistrationTracker<S> {
        &self.tracker
    }

    /// 公司名下的设备; 未找到时返回 `NoDevices`
    pub async fn company_devices(&self, company: &str) -> Result<Vec<String>, InvoiceError> {
        let devices = self.store.list_company_devices(company).await?;
        if devices.is_empty() {
            tracing::warn!("Company {} has no devices", company);
            return Err(InvoiceError::NoDevices(company.to_string()));
        }
        Ok(devices)
    }

    /// 校验请求并加载账期数据
    pub async fn load_batch(&self, request: &InvoiceRequest) -> Result<IssuanceBatch, InvoiceError> {
        if request.device_ids.is_empty() {
            return Err(InvoiceError::EmptySelection);
        }
        let months = month_range(&request.period_from, &request.period_to)?;
        request.params.validate()?;

        let rows = self
            .store
            .list_issuances(&request.device_ids, request.year, &months)
            .await?;
        let source_rows = rows.len() as u64;
        let devices = pivot_issuance_rows(rows, &months)?;
        if devices.is_empty() {
            tracing::warn!(
                "No open issuance for {} in {} {}-{}",
                request.company_name, request.year, request.period_from, request.period_to
            );
            return Err(InvoiceError::NoDevices(request.company_name.clone()));
        }
        for device in &devices {
            device.validate()?;
        }

        tracing::info!(
            "加载 {} {}: {} 个设备, {} 条明细, 账期 {} 个月",
            request.company_name,
            request.year,
            devices.len(),
            source_rows,
            months.len()
        );

        Ok(IssuanceBatch {
            months,
            devices,
            source_rows,
        })
    }

    /// 确认 partial (如有) 并查询注册状态, 生成 Draft 会话
    ///
    /// 操作员取消时直接返回 `Cancelled`, 不会查询注册状态.
    pub async fn prepare_batch<D: PartialDecider>(
        &self,
        request: InvoiceRequest,
        batch: IssuanceBatch,
        decider: &mut D,
    ) -> Result<InvoiceSession, InvoiceError> {
        let IssuanceBatch {
            months,
            devices,
            source_rows,
        } = batch;

        let devices = if devices.iter().any(|d| d.has_partial_in(&months)) {
            resolve_partials(&devices, &months, request.year, decider)?
        } else {
            devices
        };

        let ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
        let registered = self.tracker.registered_subset(&ids).await?;
        tracing::info!("已注册设备 {}/{}", registered.len(), ids.len());

        Ok(InvoiceSession {
            request,
            months,
            devices,
            registered,
            source_rows,
            state: SessionState::Draft,
            last_result: None,
        })
    }

    pub async fn prepare<D: PartialDecider>(
        &self,
        request: InvoiceRequest,
        decider: &mut D,
    ) -> Result<InvoiceSession, InvoiceError> {
        let batch = self.load_batch(&request).await?;
        self.prepare_batch(request, batch, decider).await
    }

    /// 预览工作表: 计算并输出文档, 无任何落库
    pub fn preview_worksheet(
        &self,
        session: &mut InvoiceSession,
    ) -> Result<(InvoiceCalculationResult, PathBuf), InvoiceError> {
        let worksheet = session.worksheet()?;
        let path = self.sink.render_worksheet(&worksheet)?;
        Ok((worksheet.result, path))
    }

    /// 确认开票: 先落库 (注册 + 发票记录), 成功后再生成文档
    ///
    /// 落库失败时不生成任何文档, 会话保持可再次确认.
    pub async fn confirm(&self, session: &mut InvoiceSession) -> Result<ConfirmedInvoice, InvoiceError> {
        session.ensure_open()?;
        let result = session.preview()?;

        let request = session.request.clone();
        let seller = self
            .sellers
            .lookup(&request.group_name, &request.company_name)
            .await?;

        let device_ids = session.device_ids();
        let record = InvoiceRecord::flatten(
            &request,
            &session.months,
            &device_ids,
            &session.projects_label(),
            &result,
        );
        let commit = InvoiceCommit {
            record: record.clone(),
            register_devices: pending_registrations(&session.devices, &session.registered),
            invoiced_devices: device_ids,
            year: request.year,
            months: session.months.clone(),
            expected_rows: session.source_rows,
        };

        if let Err(e) = self.store.commit_invoice(&commit).await {
            tracing::error!(
                "Invoice {} for {} not persisted: {}",
                record.invoice_id, request.company_name, e
            );
            return Err(e);
        }
        session.state = SessionState::Confirmed;
        session.registered.extend(commit.register_devices.iter().cloned());
        tracing::info!(
            "Invoice {} confirmed: {} devices, {} newly registered",
            record.invoice_id,
            commit.invoiced_devices.len(),
            commit.register_devices.len()
        );

        let invoice_doc = InvoiceDocument::build(&record, &seller, Local::now().date_naive())?;
        let worksheet = WorksheetDocument::build(
            &request.company_name,
            request.year,
            &session.months,
            &session.devices,
            &result,
        );
        let documents = vec![
            self.sink.render_invoice(&invoice_doc)?,
            self.sink.render_worksheet(&worksheet)?,
        ];

        Ok(ConfirmedInvoice {
            record,
            result,
            documents,
        })
    }
}
