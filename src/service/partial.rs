use crate::error::InvoiceError;
use crate::models::{DeviceIssuance, Month, MonthIssuance};
use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// partial 月份的选择状态
///
/// 默认值与候选值互斥: 选中任一候选值即取消默认值, 反之亦然.
/// 候选值可多选; `Candidates` 为空集表示什么都没选 (结果为 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "indexes", rename_all = "snake_case")]
pub enum PartialSelection {
    Default,
    Candidates(BTreeSet<usize>),
}

impl PartialSelection {
    pub fn nothing() -> Self {
        PartialSelection::Candidates(BTreeSet::new())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, PartialSelection::Default)
    }

    pub fn is_candidate_selected(&self, idx: usize) -> bool {
        match self {
            PartialSelection::Default => false,
            PartialSelection::Candidates(set) => set.contains(&idx),
        }
    }

    pub fn select_default(&mut self) {
        *self = PartialSelection::Default;
    }

    pub fn deselect_default(&mut self) {
        if self.is_default() {
            *self = Self::nothing();
        }
    }

    pub fn toggle_default(&mut self) {
        if self.is_default() {
            self.deselect_default();
        } else {
            self.select_default();
        }
    }

    pub fn select_candidate(&mut self, idx: usize) {
        match self {
            PartialSelection::Default => *self = PartialSelection::Candidates(BTreeSet::from([idx])),
            PartialSelection::Candidates(set) => {
                set.insert(idx);
            }
        }
    }

    pub fn deselect_candidate(&mut self, idx: usize) {
        if let PartialSelection::Candidates(set) = self {
            set.remove(&idx);
        }
    }

    pub fn toggle_candidate(&mut self, idx: usize) {
        if self.is_candidate_selected(idx) {
            self.deselect_candidate(idx);
        } else {
            self.select_candidate(idx);
        }
    }
}

impl Default for PartialSelection {
    fn default() -> Self {
        PartialSelection::Default
    }
}

/// 呈现给操作员的 partial 确认项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPrompt {
    pub device_id: String,
    pub project: String,
    pub year: i32,
    pub month: Month,
    pub default_value: BigDecimal,
    pub candidates: Vec<BigDecimal>,
}

impl PartialPrompt {
    pub fn key(&self) -> PartialKey {
        PartialKey::new(self.device_id.as_str(), self.project.as_str(), self.month)
    }
}

/// 确认项标识: 同一设备可在多个项目下各有一条记录
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialKey {
    pub device_id: String,
    pub project: String,
    pub month: Month,
}

impl PartialKey {
    pub fn new(device_id: impl Into<String>, project: impl Into<String>, month: Month) -> Self {
        Self {
            device_id: device_id.into(),
            project: project.into(),
            month,
        }
    }
}

/// 单个 (设备, 项目, 月份) 的确认状态
#[derive(Debug, Clone)]
pub struct PartialResolution {
    prompt: PartialPrompt,
    selection: PartialSelection,
}

impl PartialResolution {
    pub fn new(prompt: PartialPrompt) -> Self {
        Self {
            prompt,
            selection: PartialSelection::Default,
        }
    }

    pub fn prompt(&self) -> &PartialPrompt {
        &self.prompt
    }

    pub fn selection(&self) -> &PartialSelection {
        &self.selection
    }

    /// 应用操作员的选择, 候选下标越界则拒绝
    pub fn apply(&mut self, selection: PartialSelection) -> Result<(), InvoiceError> {
        if let PartialSelection::Candidates(set) = &selection {
            if let Some(bad) = set.iter().find(|i| **i >= self.prompt.candidates.len()) {
                return Err(InvoiceError::InvalidCandidates(format!(
                    "device {} {}: candidate #{} does not exist ({} available)",
                    self.prompt.device_id,
                    self.prompt.month,
                    bad,
                    self.prompt.candidates.len()
                )));
            }
        }
        self.selection = selection;
        Ok(())
    }

    /// 已选金额之和
    pub fn resolved_value(&self) -> BigDecimal {
        match &self.selection {
            PartialSelection::Default => self.prompt.default_value.clone(),
            PartialSelection::Candidates(set) => set
                .iter()
                .filter_map(|i| self.prompt.candidates.get(*i))
                .fold(BigDecimal::zero(), |acc, v| acc + v),
        }
    }
}

/// 操作员的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialDecision {
    Resolved(PartialSelection),
    Cancelled,
}

/// 阻塞式确认接口 (原桌面端的模态对话框)
pub trait PartialDecider {
    fn decide(&mut self, prompt: &PartialPrompt) -> PartialDecision;
}

impl<F> PartialDecider for F
where
    F: FnMut(&PartialPrompt) -> PartialDecision,
{
    fn decide(&mut self, prompt: &PartialPrompt) -> PartialDecision {
        self(prompt)
    }
}

/// 预先提交的选择 (HTTP 请求携带); 缺失的项视为取消
#[derive(Debug, Clone, Default)]
pub struct PresetDecider {
    choices: HashMap<PartialKey, PartialSelection>,
}

impl PresetDecider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_choice(
        mut self,
        device_id: impl Into<String>,
        project: impl Into<String>,
        month: Month,
        selection: PartialSelection,
    ) -> Self {
        self.insert(PartialKey::new(device_id, project, month), selection);
        self
    }

    pub fn insert(&mut self, key: PartialKey, selection: PartialSelection) {
        self.choices.insert(key, selection);
    }

    /// 未被覆盖的确认项
    pub fn missing<'a>(&self, prompts: &'a [PartialPrompt]) -> Vec<&'a PartialPrompt> {
        prompts
            .iter()
            .filter(|p| !self.choices.contains_key(&p.key()))
            .collect()
    }
}

impl PartialDecider for PresetDecider {
    fn decide(&mut self, prompt: &PartialPrompt) -> PartialDecision {
        match self.choices.get(&prompt.key()) {
            Some(selection) => PartialDecision::Resolved(selection.clone()),
            None => PartialDecision::Cancelled,
        }
    }
}

/// 列出账期内所有待确认的 partial 月份 (按设备顺序, 月份按日历顺序)
pub fn pending_prompts(devices: &[DeviceIssuance], months: &[Month], year: i32) -> Vec<PartialPrompt> {
    let mut prompts = Vec::new();
    for device in devices {
        for month in months {
            let Some(mi) = device.months.get(month) else {
                continue;
            };
            if !mi.partial {
                continue;
            }
            prompts.push(PartialPrompt {
                device_id: device.device_id.clone(),
                project: device.project.clone(),
                year,
                month: *month,
                default_value: mi.issued.clone(),
                candidates: mi.candidates.clone(),
            });
        }
    }
    prompts
}

/// 逐项询问操作员并生成确认后的设备数据
///
/// 先收集全部决定再统一应用: 任一项取消则返回 `Cancelled`, 不产生任何修改.
/// 返回的设备只保留账期内月份, 总量随之重新计算.
pub fn resolve_partials<D: PartialDecider + ?Sized>(
    devices: &[DeviceIssuance],
    months: &[Month],
    year: i32,
    decider: &mut D,
) -> Result<Vec<DeviceIssuance>, InvoiceError> {
    let prompts = pending_prompts(devices, months, year);
    let mut resolved: HashMap<PartialKey, BigDecimal> = HashMap::with_capacity(prompts.len());

    for prompt in prompts {
        let key = prompt.key();
        let mut resolution = PartialResolution::new(prompt);

        match decider.decide(resolution.prompt()) {
            PartialDecision::Resolved(selection) => resolution.apply(selection)?,
            PartialDecision::Cancelled => {
                tracing::info!(
                    "partial 确认被取消: 设备 {} {} {}",
                    resolution.prompt().device_id,
                    resolution.prompt().month,
                    year
                );
                return Err(InvoiceError::Cancelled);
            }
        }

        let value = resolution.resolved_value();
        tracing::debug!(
            "设备 {} ({}) {} partial 确认: {} -> {}",
            key.device_id,
            key.project,
            key.month,
            resolution.prompt().default_value,
            value
        );
        resolved.insert(key, value);
    }

    let out = devices
        .iter()
        .map(|device| {
            let mut updated: IndexMap<Month, MonthIssuance> = IndexMap::with_capacity(months.len());
            for month in months {
                let current = device.months.get(month);
                let key = PartialKey::new(device.device_id.as_str(), device.project.as_str(), *month);
                let value = match resolved.get(&key) {
                    Some(v) if current.map(|mi| mi.partial).unwrap_or(false) => v.clone(),
                    _ => current.map(|mi| mi.issued.clone()).unwrap_or_else(BigDecimal::zero),
                };
                updated.insert(*month, MonthIssuance::settled(value));
            }
            DeviceIssuance {
                device_id: device.device_id.clone(),
                capacity: device.capacity.clone(),
                project: device.project.clone(),
                months: updated,
            }
        })
        .collect();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn prompt(default: &str, candidates: &[&str]) -> PartialPrompt {
        PartialPrompt {
            device_id: "DEV-1".to_string(),
            project: "Hydro".to_string(),
            year: 2024,
            month: Month::March,
            default_value: dec(default),
            candidates: candidates.iter().map(|c| dec(c)).collect(),
        }
    }

    fn sample_devices() -> Vec<DeviceIssuance> {
        vec![
            DeviceIssuance::new("DEV-1", dec("2"), "Hydro")
                .with_month(Month::February, dec("10"))
                .with_partial(Month::March, dec("50"), vec![dec("20"), dec("15.5"), dec("4")])
                .with_month(Month::April, dec("7")),
            DeviceIssuance::new("DEV-2", dec("5"), "Hydro")
                .with_month(Month::February, dec("1"))
                .with_month(Month::March, dec("2")),
        ]
    }

    #[test]
    fn default_selection_keeps_default_value() {
        let r = PartialResolution::new(prompt("50", &["20", "15.5"]));
        assert!(r.selection().is_default());
        assert_eq!(r.resolved_value(), dec("50"));
    }

    #[test]
    fn candidate_subset_sums_exactly() {
        let mut r = PartialResolution::new(prompt("50", &["20", "15.5", "4"]));
        r.apply(PartialSelection::Candidates(BTreeSet::from([0, 2]))).unwrap();
        assert_eq!(r.resolved_value(), dec("24"));
    }

    #[test]
    fn empty_selection_sums_to_zero() {
        let mut r = PartialResolution::new(prompt("50", &[]));
        r.apply(PartialSelection::nothing()).unwrap();
        assert_eq!(r.resolved_value(), dec("0"));
    }

    #[test]
    fn out_of_range_candidate_is_rejected() {
        let mut r = PartialResolution::new(prompt("50", &["20"]));
        let err = r.apply(PartialSelection::Candidates(BTreeSet::from([1]))).unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidCandidates(_)));
        assert!(r.selection().is_default());
    }

    #[test]
    fn choosing_candidate_deselects_default_and_back() {
        let mut s = PartialSelection::Default;
        s.select_candidate(1);
        assert!(!s.is_default());
        assert!(s.is_candidate_selected(1));

        s.select_candidate(0);
        assert_eq!(s, PartialSelection::Candidates(BTreeSet::from([0, 1])));

        s.select_default();
        assert!(s.is_default());
        assert!(!s.is_candidate_selected(0));

        s.toggle_default();
        assert_eq!(s, PartialSelection::nothing());
    }

    #[test]
    fn resolve_overwrites_partial_months_and_recomputes_total() {
        let months = [Month::February, Month::March, Month::April];
        let mut decider = PresetDecider::new().with_choice(
            "DEV-1",
            "Hydro",
            Month::March,
            PartialSelection::Candidates(BTreeSet::from([0, 1])),
        );

        let resolved = resolve_partials(&sample_devices(), &months, 2024, &mut decider).unwrap();
        let d1 = &resolved[0];
        assert_eq!(d1.issued_in(Month::March), dec("35.5"));
        assert!(!d1.months[&Month::March].partial);
        assert_eq!(d1.total_issued(), dec("52.5"));

        // 未涉及 partial 的设备保持原值
        assert_eq!(resolved[1].total_issued(), dec("3"));
    }

    #[test]
    fn resolve_restricts_to_months_in_scope() {
        let months = [Month::February, Month::March];
        let mut decider = |_: &PartialPrompt| PartialDecision::Resolved(PartialSelection::Default);
        let resolved = resolve_partials(&sample_devices(), &months, 2024, &mut decider).unwrap();
        assert_eq!(resolved[0].months.len(), 2);
        assert_eq!(resolved[0].total_issued(), dec("60"));
    }

    #[test]
    fn cancel_aborts_without_changes() {
        let devices = sample_devices();
        let before = devices.clone();
        let mut asked = 0;
        let mut decider = |_: &PartialPrompt| {
            asked += 1;
            PartialDecision::Cancelled
        };

        let err = resolve_partials(&devices, &Month::ALL, 2024, &mut decider).unwrap_err();
        assert!(matches!(err, InvoiceError::Cancelled));
        assert_eq!(asked, 1);
        assert_eq!(devices, before);
    }

    #[test]
    fn preset_decider_reports_missing_prompts() {
        let prompts = pending_prompts(&sample_devices(), &Month::ALL, 2024);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].default_value, dec("50"));
        assert_eq!(prompts[0].candidates.len(), 3);

        let decider = PresetDecider::new();
        assert_eq!(decider.missing(&prompts).len(), 1);
        let decider = decider.with_choice("DEV-1", "Hydro", Month::March, PartialSelection::Default);
        assert!(decider.missing(&prompts).is_empty());
    }

    #[test]
    fn same_device_under_two_projects_resolves_independently() {
        let months = [Month::March];
        let devices = vec![
            DeviceIssuance::new("DEV-1", dec("2"), "Hydro").with_partial(Month::March, dec("50"), vec![dec("20")]),
            DeviceIssuance::new("DEV-1", dec("2"), "Solar").with_partial(Month::March, dec("30"), vec![dec("5")]),
        ];

        let mut keep_default = |_: &PartialPrompt| PartialDecision::Resolved(PartialSelection::Default);
        let resolved = resolve_partials(&devices, &months, 2024, &mut keep_default).unwrap();
        assert_eq!(resolved[0].total_issued(), dec("50"));
        assert_eq!(resolved[1].total_issued(), dec("30"));

        let mut decider = PresetDecider::new()
            .with_choice("DEV-1", "Hydro", Month::March, PartialSelection::Default)
            .with_choice("DEV-1", "Solar", Month::March, PartialSelection::Candidates(BTreeSet::from([0])));
        let prompts = pending_prompts(&devices, &months, 2024);
        assert_eq!(prompts.len(), 2);
        assert!(decider.missing(&prompts).is_empty());

        let resolved = resolve_partials(&devices, &months, 2024, &mut decider).unwrap();
        assert_eq!(resolved[0].total_issued(), dec("50"));
        assert_eq!(resolved[1].total_issued(), dec("5"));
    }

    #[test]
    fn selection_wire_shape() {
        let s: PartialSelection = serde_json::from_str(r#"{"kind":"candidates","indexes":[2,0]}"#).unwrap();
        assert_eq!(s, PartialSelection::Candidates(BTreeSet::from([0, 2])));
        let s: PartialSelection = serde_json::from_str(r#"{"kind":"default"}"#).unwrap();
        assert!(s.is_default());
    }

    #[derive(Debug, Clone)]
    enum Action {
        SelectDefault,
        DeselectDefault,
        ToggleCandidate(usize),
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::SelectDefault),
            Just(Action::DeselectDefault),
            (0usize..4).prop_map(Action::ToggleCandidate),
        ]
    }

    proptest! {
        /// 任意操作序列下默认值与候选值都不会同时被选中
        #[test]
        fn default_and_candidates_are_exclusive(actions in prop::collection::vec(action(), 0..40)) {
            let mut s = PartialSelection::Default;
            for a in actions {
                match a {
                    Action::SelectDefault => s.select_default(),
                    Action::DeselectDefault => s.deselect_default(),
                    Action::ToggleCandidate(i) => s.toggle_candidate(i),
                }
                let any_candidate = (0..4).any(|i| s.is_candidate_selected(i));
                prop_assert!(!(s.is_default() && any_candidate));
            }
        }

        /// 确认后的总量等于账期内各月数值之和
        #[test]
        fn resolved_total_is_sum_of_months(picks in prop::collection::btree_set(0usize..3, 0..3)) {
            let months = [Month::February, Month::March, Month::April];
            let mut decider = PresetDecider::new()
                .with_choice("DEV-1", "Hydro", Month::March, PartialSelection::Candidates(picks));
            let resolved = resolve_partials(&sample_devices(), &months, 2024, &mut decider).unwrap();
            for d in resolved {
                let sum = months.iter().fold(BigDecimal::zero(), |acc, m| acc + d.issued_in(*m));
                prop_assert_eq!(d.total_issued(), sum);
            }
        }
    }
}
