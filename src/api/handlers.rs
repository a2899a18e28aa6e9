use crate::config::InvoicingConfig;
use crate::db::InvoiceStore;
use crate::error::InvoiceError;
use crate::models::{InvoiceCalculationResult, InvoiceRequest, Month, Seller};
use crate::service::{
    ConfirmedInvoice, InvoiceService, InvoiceSession, PartialKey, PartialPrompt, PartialSelection, PresetDecider,
    SellerDefaults,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 共享状态
pub struct ApiState<S: InvoiceStore> {
    pub service: Arc<InvoiceService<S>>,
    pub invoicing: InvoicingConfig,
}

/// 操作员对某个 partial 月份的选择
#[derive(Debug, Clone, Deserialize)]
pub struct PartialChoice {
    pub device_id: String,
    pub project: String,
    pub month: Month,
    pub selection: PartialSelection,
}

/// 请求体: 开票参数 + partial 选择
#[derive(Debug, Deserialize)]
pub struct InvoiceApiRequest {
    #[serde(flatten)]
    pub invoice: InvoiceRequest,
    #[serde(default)]
    pub selections: Vec<PartialChoice>,
    /// 预览时是否同时输出工作表文件
    #[serde(default)]
    pub render_worksheet: bool,
}

/// 通用响应体
#[derive(Debug, Serialize)]
pub struct BasicResponse {
    pub success: bool,
    pub message: String,
}

/// 预览响应体
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub message: String,
    pub result: Option<InvoiceCalculationResult>,
    pub registered: Vec<String>,
    pub worksheet: Option<String>,
}

/// 待确认的 partial 月份 (HTTP 409)
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub success: bool,
    pub message: String,
    pub pending: Vec<PartialPrompt>,
}

/// 确认开票响应体
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub invoice: Option<ConfirmedInvoice>,
}

fn status_for(err: &InvoiceError) -> StatusCode {
    if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_lookup_miss() {
        StatusCode::NOT_FOUND
    } else {
        match err {
            InvoiceError::Cancelled | InvoiceError::SessionClosed => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn error_response(err: InvoiceError) -> Response {
    let response = BasicResponse {
        success: false,
        message: format!("Error: {}", err),
    };
    (status_for(&err), Json(response)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 卖方分组列表
pub async fn seller_groups<S: InvoiceStore>(State(state): State<Arc<ApiState<S>>>) -> Response {
    match state.service.sellers().groups().await {
        Ok(groups) => (StatusCode::OK, Json(groups)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 分组下的卖方
pub async fn sellers_in_group<S: InvoiceStore>(
    State(state): State<Arc<ApiState<S>>>,
    Path(group): Path<String>,
) -> Response {
    match state.service.sellers().sellers_in(&group).await {
        Ok(sellers) => (StatusCode::OK, Json::<Vec<Seller>>(sellers)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 卖方默认商务参数 (预填表单)
pub async fn seller_defaults<S: InvoiceStore>(
    State(state): State<Arc<ApiState<S>>>,
    Path((group, company)): Path<(String, String)>,
) -> Response {
    let result = state
        .service
        .sellers()
        .defaults_for(
            &group,
            &company,
            state.invoicing.default_usd_rate.clone(),
            state.invoicing.default_eur_rate.clone(),
        )
        .await;
    match result {
        Ok(defaults) => (StatusCode::OK, Json::<SellerDefaults>(defaults)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 刷新卖方缓存
pub async fn invalidate_sellers<S: InvoiceStore>(State(state): State<Arc<ApiState<S>>>) -> Response {
    state.service.sellers().invalidate();
    let response = BasicResponse {
        success: true,
        message: "Seller cache invalidated".to_string(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// 公司名下设备
pub async fn company_devices<S: InvoiceStore>(
    State(state): State<Arc<ApiState<S>>>,
    Path(company): Path<String>,
) -> Response {
    match state.service.company_devices(&company).await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => error_response(e),
    }
}

/// 加载数据并套用请求中的 partial 选择; 有未覆盖的 partial 月份时返回 409
async fn open_session<S: InvoiceStore>(
    service: &InvoiceService<S>,
    req: InvoiceApiRequest,
) -> Result<InvoiceSession, Response> {
    let InvoiceApiRequest {
        invoice, selections, ..
    } = req;

    let batch = service.load_batch(&invoice).await.map_err(error_response)?;
    let prompts = batch.pending_prompts(invoice.year);

    let mut decider = PresetDecider::new();
    for choice in selections {
        decider.insert(
            PartialKey::new(choice.device_id, choice.project, choice.month),
            choice.selection,
        );
    }

    let missing: Vec<PartialPrompt> = decider.missing(&prompts).into_iter().cloned().collect();
    if !missing.is_empty() {
        let response = PendingResponse {
            success: false,
            message: format!("{} partial issuance month(s) need a decision", missing.len()),
            pending: missing,
        };
        return Err((StatusCode::CONFLICT, Json(response)).into_response());
    }

    service
        .prepare_batch(invoice, batch, &mut decider)
        .await
        .map_err(error_response)
}

/// 预览: 计算金额, 不落库
pub async fn preview_invoice<S: InvoiceStore>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<InvoiceApiRequest>,
) -> Response {
    let render = req.render_worksheet;
    let mut session = match open_session(&state.service, req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let outcome = if render {
        state
            .service
            .preview_worksheet(&mut session)
            .map(|(result, path)| (result, Some(path.display().to_string())))
    } else {
        session.preview().map(|result| (result, None))
    };

    match outcome {
        Ok((result, worksheet)) => {
            let mut registered: Vec<String> = session.registered().iter().cloned().collect();
            registered.sort();
            let response = PreviewResponse {
                success: true,
                message: format!(
                    "Previewed {} devices, {} units",
                    result.total_devices, result.total_issued
                ),
                result: Some(result),
                registered,
                worksheet,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// 确认开票: 落库后生成文档
pub async fn confirm_invoice<S: InvoiceStore>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<InvoiceApiRequest>,
) -> Response {
    let mut session = match open_session(&state.service, req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.service.confirm(&mut session).await {
        Ok(invoice) => {
            let response = ConfirmResponse {
                success: true,
                message: format!("Invoice {} generated", invoice.record.invoice_id),
                invoice: Some(invoice),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(e),
    }
}
