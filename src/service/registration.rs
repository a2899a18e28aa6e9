use crate::db::InvoiceStore;
use crate::error::InvoiceError;
use crate::models::DeviceIssuance;
use std::collections::HashSet;
use std::sync::Arc;

/// 解析逗号分隔的已注册设备串, 去除空白与空项
pub fn parse_registered_list(raw: Option<&str>) -> HashSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// 设备注册状态跟踪
///
/// 注册写入只发生在确认开票的事务中 (见 `InvoiceStore::commit_invoice`),
/// 预览不会修改注册状态.
pub struct RegistrationTracker<S: InvoiceStore> {
    store: Arc<S>,
}

impl<S: InvoiceStore> RegistrationTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn registered_subset(&self, device_ids: &[String]) -> Result<HashSet<String>, InvoiceError> {
        if device_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let raw = self.store.registered_devices(device_ids).await?;
        Ok(parse_registered_list(raw.as_deref()))
    }

    pub async fn is_registered(&self, device_id: &str) -> Result<bool, InvoiceError> {
        let subset = self.registered_subset(&[device_id.to_string()]).await?;
        Ok(subset.contains(device_id))
    }
}

/// 尚未注册的设备 (去重, 保持出现顺序), 确认开票时一并注册
pub fn pending_registrations(devices: &[DeviceIssuance], registered: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    devices
        .iter()
        .map(|d| d.device_id.clone())
        .filter(|id| !registered.contains(id) && seen.insert(id.clone()))
        .collect()
}
