use crate::db::store::InvoiceCommit;
use crate::error::InvoiceError;
use crate::models::{InvoiceRecord, IssuanceRow, Month, Seller};
use sqlx::{PgConnection, PgPool};

fn month_numbers(months: &[Month]) -> Vec<i32> {
    months.iter().map(|m| m.number() as i32).collect()
}

/// 查询全部卖方 (按组、卖方排序)
pub async fn list_sellers(pool: &PgPool) -> Result<Vec<Seller>, sqlx::Error> {
    sqlx::query_as::<_, Seller>(
        r#"
        SELECT group_name, seller, success_fee, indicative_price,
               pan, gst, registration_number, address
        FROM sellers
        ORDER BY group_name, seller
        "#
    )
    .fetch_all(pool)
    .await
}

/// 查询公司名下的设备
pub async fn list_company_devices(pool: &PgPool, company: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT device_id
        FROM t_irec_device
        WHERE company = $1
        ORDER BY device_id
        "#
    )
    .bind(company)
    .fetch_all(pool)
    .await
}

/// 查询账期内可开票的发行明细 (issued = actual_used 且未开票)
pub async fn list_issuances(
    pool: &PgPool,
    device_ids: &[String],
    year: i32,
    months: &[Month],
) -> Result<Vec<IssuanceRow>, sqlx::Error> {
    sqlx::query_as::<_, IssuanceRow>(
        r#"
        SELECT i.device_id,
               d.project,
               d.capacity,
               i.month,
               i.issued,
               i.is_partial,
               i.candidates
        FROM t_irec_issuance i
        INNER JOIN t_irec_device d ON d.device_id = i.device_id
        WHERE i.device_id = ANY($1)
          AND i.year = $2
          AND i.month = ANY($3)
          AND i.issued = i.actual_used
          AND i.invoiced = false
        ORDER BY d.device_id, d.project, i.month
        "#
    )
    .bind(device_ids)
    .bind(year)
    .bind(month_numbers(months))
    .fetch_all(pool)
    .await
}

/// 已注册设备, 以逗号拼接返回
pub async fn registered_devices(pool: &PgPool, device_ids: &[String]) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT string_agg(device_id, ',' ORDER BY device_id)
        FROM t_irec_registered_device
        WHERE device_id = ANY($1)
        "#
    )
    .bind(device_ids)
    .fetch_one(pool)
    .await
}

async fn insert_registrations(conn: &mut PgConnection, commit: &InvoiceCommit) -> Result<u64, sqlx::Error> {
    if commit.register_devices.is_empty() {
        return Ok(0);
    }

    let mut query_builder =
        sqlx::QueryBuilder::new("INSERT INTO t_irec_registered_device (device_id, invoice_id, registered_at) ");
    query_builder.push_values(&commit.register_devices, |mut b, device_id| {
        b.push_bind(device_id)
            .push_bind(commit.record.invoice_id)
            .push_bind(commit.record.created_at);
    });
    query_builder.push(" ON CONFLICT (device_id) DO NOTHING");

    let result = query_builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

async fn insert_invoice(conn: &mut PgConnection, record: &InvoiceRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO t_irec_invoice (
            invoice_id, created_at, group_name, company_name, year,
            period_from, period_to, device_ids, projects,
            unit_price, success_fee_percent, usd_rate, eur_rate, remove_fees,
            capacity, total_devices, total_issued,
            registration_fee, issuance_fee, gross_amount,
            reg_fee_inr, issuance_fee_inr, net_revenue,
            success_fee, final_revenue, net_rate
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
            $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
        )
        "#
    )
    .bind(record.invoice_id)
    .bind(record.created_at)
    .bind(&record.group_name)
    .bind(&record.company_name)
    .bind(record.year)
    .bind(record.period_from.number() as i32)
    .bind(record.period_to.number() as i32)
    .bind(&record.device_ids)
    .bind(&record.projects)
    .bind(&record.unit_price)
    .bind(&record.success_fee_percent)
    .bind(&record.usd_rate)
    .bind(&record.eur_rate)
    .bind(record.remove_fees)
    .bind(&record.capacity)
    .bind(record.total_devices)
    .bind(&record.total_issued)
    .bind(&record.registration_fee)
    .bind(&record.issuance_fee)
    .bind(&record.gross_amount)
    .bind(&record.reg_fee_inr)
    .bind(&record.issuance_fee_inr)
    .bind(&record.net_revenue)
    .bind(&record.success_fee)
    .bind(&record.final_revenue)
    .bind(&record.net_rate)
    .execute(conn)
    .await?;
    Ok(())
}

async fn mark_invoiced(conn: &mut PgConnection, commit: &InvoiceCommit) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE t_irec_issuance
        SET invoiced = true, invoice_id = $4
        WHERE device_id = ANY($1)
          AND year = $2
          AND month = ANY($3)
          AND issued = actual_used
          AND invoiced = false
        "#
    )
    .bind(&commit.invoiced_devices)
    .bind(commit.year)
    .bind(month_numbers(&commit.months))
    .bind(commit.record.invoice_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// 确认开票: 单事务内完成注册、写发票、标记明细
pub async fn commit_invoice(pool: &PgPool, commit: &InvoiceCommit) -> Result<(), InvoiceError> {
    let start_time = std::time::Instant::now();
    let invoice_id = commit.record.invoice_id;

    let work = async {
        let mut tx = pool.begin().await?;

        let registered = insert_registrations(&mut tx, commit).await?;
        tracing::debug!("发票 {} 注册设备 {} 个", invoice_id, registered);

        insert_invoice(&mut tx, &commit.record).await?;

        let marked = mark_invoiced(&mut tx, commit).await?;
        if marked != commit.expected_rows {
            // 明细已被其他会话开票, 放弃整个事务
            tx.rollback().await?;
            return Err(InvoiceError::Persistence(format!(
                "expected to invoice {} issuance rows but {} were still open",
                commit.expected_rows, marked
            )));
        }

        tx.commit().await?;
        Ok::<(), InvoiceError>(())
    };

    // 超时控制: 30秒, 超时则事务随连接回滚
    match tokio::time::timeout(std::time::Duration::from_secs(30), work).await {
        Ok(Ok(())) => {
            tracing::info!("✓ 发票 {} 落库成功, 耗时: {:?}", invoice_id, start_time.elapsed());
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("✗ 发票 {} 落库失败, 耗时: {:?}, 错误: {}", invoice_id, start_time.elapsed(), e);
            Err(e)
        }
        Err(_) => {
            tracing::error!("✗ 发票 {} 落库超时 (>30秒)!", invoice_id);
            Err(InvoiceError::Persistence("commit timed out".to_string()))
        }
    }
}
