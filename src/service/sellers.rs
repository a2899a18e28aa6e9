use crate::db::InvoiceStore;
use crate::error::InvoiceError;
use crate::models::Seller;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// 卖方默认商务参数及开票身份信息
#[derive(Debug, Clone, Serialize)]
pub struct SellerDefaults {
    pub seller: Seller,
    pub unit_price: BigDecimal,
    pub success_fee_percent: BigDecimal,
    pub usd_rate: Option<BigDecimal>,
    pub eur_rate: Option<BigDecimal>,
}

type SellerGroups = BTreeMap<String, Vec<Seller>>;

/// 某一代缓存的完整快照
struct CachedGroups {
    generation: u64,
    groups: Arc<SellerGroups>,
}

/// 卖方目录: 读穿缓存, 由调用方持有并显式失效
///
/// 每次失效递增代数; 快照只在加载期间代数未变时才替换进缓存,
/// 加载期间发生失效则丢弃本次结果重新加载.
pub struct SellerDirectory<S: InvoiceStore> {
    store: Arc<S>,
    generation: AtomicU64,
    cache: RwLock<Option<CachedGroups>>,
    // 同一时刻只有一个加载在进行
    load_lock: Mutex<()>,
}

fn group_sellers(sellers: Vec<Seller>) -> SellerGroups {
    let mut groups = SellerGroups::new();
    for seller in sellers {
        groups.entry(seller.group_name.clone()).or_default().push(seller);
    }
    groups
}

impl<S: InvoiceStore> SellerDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
            cache: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    async fn cached(&self, generation: u64) -> Option<Arc<SellerGroups>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|c| c.generation == generation)
            .map(|c| c.groups.clone())
    }

    async fn snapshot(&self) -> Result<Arc<SellerGroups>, InvoiceError> {
        loop {
            let wanted = self.generation.load(Ordering::Acquire);
            if let Some(groups) = self.cached(wanted).await {
                return Ok(groups);
            }

            let _loading = self.load_lock.lock().await;
            // 等锁期间可能已有其他请求加载完成
            let wanted = self.generation.load(Ordering::Acquire);
            if let Some(groups) = self.cached(wanted).await {
                return Ok(groups);
            }

            let groups = Arc::new(group_sellers(self.store.list_sellers().await?));
            if self.generation.load(Ordering::Acquire) != wanted {
                tracing::info!("卖方缓存加载期间被失效, 重新加载");
                continue;
            }

            tracing::info!("卖方缓存加载完成: {} 个分组", groups.len());
            *self.cache.write().await = Some(CachedGroups {
                generation: wanted,
                groups: groups.clone(),
            });
            return Ok(groups);
        }
    }

    /// 丢弃缓存, 下次访问时重新加载
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::info!("卖方缓存已失效");
    }

    pub async fn groups(&self) -> Result<Vec<String>, InvoiceError> {
        Ok(self.snapshot().await?.keys().cloned().collect())
    }

    pub async fn sellers_in(&self, group: &str) -> Result<Vec<Seller>, InvoiceError> {
        Ok(self.snapshot().await?.get(group).cloned().unwrap_or_default())
    }

    pub async fn lookup(&self, group: &str, company: &str) -> Result<Seller, InvoiceError> {
        let found = self
            .sellers_in(group)
            .await?
            .into_iter()
            .find(|s| s.seller == company);

        found.ok_or_else(|| {
            tracing::warn!("Seller {} not found in group {}", company, group);
            InvoiceError::SellerNotFound {
                group: group.to_string(),
                company: company.to_string(),
            }
        })
    }

    /// 预填商务参数 (汇率来自配置, 可能缺省)
    pub async fn defaults_for(
        &self,
        group: &str,
        company: &str,
        usd_rate: Option<BigDecimal>,
        eur_rate: Option<BigDecimal>,
    ) -> Result<SellerDefaults, InvoiceError> {
        let seller = self.lookup(group, company).await?;
        Ok(SellerDefaults {
            unit_price: seller.indicative_price.clone(),
            success_fee_percent: seller.success_fee.clone(),
            usd_rate,
            eur_rate,
            seller,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InvoiceCommit, MemoryInvoiceStore};
    use crate::models::{IssuanceRow, Month};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    /// 第一次 list_sellers 读完数据后挂起, 直到测试放行
    #[derive(Default)]
    struct PausingStore {
        inner: MemoryInvoiceStore,
        paused_once: AtomicBool,
        list_calls: AtomicU64,
        reading: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl InvoiceStore for PausingStore {
        async fn list_sellers(&self) -> Result<Vec<Seller>, InvoiceError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let sellers = self.inner.list_sellers().await?;
            if !self.paused_once.swap(true, Ordering::SeqCst) {
                self.reading.notify_one();
                self.resume.notified().await;
            }
            Ok(sellers)
        }

        async fn list_company_devices(&self, company: &str) -> Result<Vec<String>, InvoiceError> {
            self.inner.list_company_devices(company).await
        }

        async fn list_issuances(
            &self,
            device_ids: &[String],
            year: i32,
            months: &[Month],
        ) -> Result<Vec<IssuanceRow>, InvoiceError> {
            self.inner.list_issuances(device_ids, year, months).await
        }

        async fn registered_devices(&self, device_ids: &[String]) -> Result<Option<String>, InvoiceError> {
            self.inner.registered_devices(device_ids).await
        }

        async fn commit_invoice(&self, commit: &InvoiceCommit) -> Result<(), InvoiceError> {
            self.inner.commit_invoice(commit).await
        }
    }

    fn seller(group: &str, name: &str) -> Seller {
        Seller {
            group_name: group.to_string(),
            seller: name.to_string(),
            success_fee: BigDecimal::from(10),
            indicative_price: BigDecimal::from(1),
            pan: "AAAPL1234C".to_string(),
            gst: "27AAAPL1234C1Z5".to_string(),
            registration_number: None,
            address: "1 Main Road, Pune".to_string(),
        }
    }

    #[tokio::test]
    async fn caches_until_invalidated() {
        let store = Arc::new(MemoryInvoiceStore::new());
        store.add_seller(seller("Green", "Alpha Power"));
        let directory = SellerDirectory::new(store.clone());

        assert_eq!(directory.groups().await.unwrap(), vec!["Green".to_string()]);

        // 缓存命中时看不到新数据
        store.add_seller(seller("Blue", "Beta Energy"));
        assert_eq!(directory.groups().await.unwrap().len(), 1);

        directory.invalidate();
        assert_eq!(
            directory.groups().await.unwrap(),
            vec!["Blue".to_string(), "Green".to_string()]
        );
    }

    #[tokio::test]
    async fn lookup_miss_is_reported() {
        let store = Arc::new(MemoryInvoiceStore::new());
        store.add_seller(seller("Green", "Alpha Power"));
        let directory = SellerDirectory::new(store);

        let err = directory.lookup("Green", "Nobody").await.unwrap_err();
        assert!(err.is_lookup_miss());

        let defaults = directory
            .defaults_for("Green", "Alpha Power", Some(BigDecimal::from(83)), None)
            .await
            .unwrap();
        assert_eq!(defaults.success_fee_percent, BigDecimal::from(10));
        assert_eq!(defaults.usd_rate, Some(BigDecimal::from(83)));
        assert!(defaults.eur_rate.is_none());
    }

    #[tokio::test]
    async fn invalidation_during_load_is_not_lost() {
        let store = Arc::new(PausingStore::default());
        store.inner.add_seller(seller("Green", "Alpha Power"));
        let directory = Arc::new(SellerDirectory::new(store.clone()));

        let loader = tokio::spawn({
            let directory = directory.clone();
            async move { directory.groups().await }
        });

        // 加载已读到旧数据, 此时新增卖方并失效
        store.reading.notified().await;
        store.inner.add_seller(seller("Blue", "Beta Energy"));
        directory.invalidate();
        store.resume.notify_one();

        let groups = loader.await.unwrap().unwrap();
        assert_eq!(groups, vec!["Blue".to_string(), "Green".to_string()]);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 2);

        assert_eq!(directory.groups().await.unwrap().len(), 2);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_loads_do_not_duplicate_sellers() {
        let store = Arc::new(MemoryInvoiceStore::new());
        store.add_seller(seller("Green", "Alpha Power"));
        store.add_seller(seller("Green", "Gamma Solar"));
        let directory = Arc::new(SellerDirectory::new(store));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let directory = directory.clone();
                tokio::spawn(async move {
                    if i % 4 == 0 {
                        directory.invalidate();
                    }
                    directory.sellers_in("Green").await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().len(), 2);
        }
    }
}
