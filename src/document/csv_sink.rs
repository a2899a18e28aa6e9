use crate::document::{DocumentSink, InvoiceDocument, WorksheetDocument};
use crate::error::InvoiceError;
use bigdecimal::BigDecimal;
use csv::WriterBuilder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// CSV 文档输出 (工作表 / 发票)
#[derive(Debug, Clone)]
pub struct CsvDocumentSink {
    output_dir: PathBuf,
}

impl CsvDocumentSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn create(&self, file_name: &str) -> Result<(csv::Writer<File>, PathBuf), InvoiceError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name);
        let file = File::create(&path)?;
        // 明细区与汇总区列数不同
        let writer = WriterBuilder::new().flexible(true).from_writer(file);
        Ok((writer, path))
    }
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn fixed(v: &BigDecimal, digits: i64) -> String {
    v.with_scale(digits).to_string()
}

impl DocumentSink for CsvDocumentSink {
    fn render_worksheet(&self, doc: &WorksheetDocument) -> Result<PathBuf, InvoiceError> {
        let from = doc.months.first().map(|m| m.name()).unwrap_or("");
        let to = doc.months.last().map(|m| m.name()).unwrap_or("");
        let file_name = format!("worksheet_{}_{}_{}-{}.csv", file_safe(&doc.company_name), doc.year, from, to);
        let (mut writer, path) = self.create(&file_name)?;

        let mut header = vec!["Device ID".to_string(), "Project".to_string(), "Capacity (MW)".to_string()];
        header.extend(doc.months.iter().map(|m| m.name().to_string()));
        header.push("Total Issued".to_string());
        writer.write_record(&header)?;

        for row in &doc.rows {
            let mut record = vec![row.device_id.clone(), row.project.clone(), fixed(&row.capacity, 2)];
            record.extend(row.monthly.iter().map(|v| fixed(v, 4)));
            record.push(fixed(&row.total_issued, 4));
            writer.write_record(&record)?;
        }

        let r = &doc.result;
        let mut totals = vec!["Total".to_string(), String::new(), fixed(&r.total_capacity, 2)];
        totals.extend(doc.month_totals().iter().map(|v| fixed(v, 4)));
        totals.push(fixed(&r.total_issued, 4));
        writer.write_record(&totals)?;

        writer.write_record([""])?;
        let summary = [
            ("Total Devices", r.total_devices.to_string()),
            ("Registration Fee (EUR)", fixed(&r.registration_fee, 2)),
            ("Issuance Fee (EUR)", fixed(&r.issuance_fee, 4)),
            ("Gross Amount (INR)", fixed(&r.gross_amount, 4)),
            ("Registration Fee (INR)", fixed(&r.reg_fee_inr, 4)),
            ("Issuance Fee (INR)", fixed(&r.issuance_fee_inr, 4)),
            ("Net Revenue (INR)", fixed(&r.net_revenue, 4)),
            ("Success Fee (INR)", fixed(&r.success_fee, 4)),
            ("Final Revenue (INR)", fixed(&r.final_revenue, 4)),
            ("Net Rate (INR/unit)", fixed(&r.net_rate, 4)),
        ];
        for (label, value) in summary {
            writer.write_record([label, value.as_str()])?;
        }

        writer.flush()?;
        tracing::info!("工作表已生成: {}", path.display());
        Ok(path)
    }

    fn render_invoice(&self, doc: &InvoiceDocument) -> Result<PathBuf, InvoiceError> {
        let file_name = format!("invoice_{}.csv", doc.invoice_id);
        let (mut writer, path) = self.create(&file_name)?;

        writer.write_record(["Invoice ID", doc.invoice_id.to_string().as_str()])?;
        writer.write_record(["Company", doc.company_name.as_str()])?;
        writer.write_record(["PAN", doc.pan.as_str()])?;
        writer.write_record(["GST", doc.gst.as_str()])?;
        for line in &doc.address_lines {
            writer.write_record(["Address", line.as_str()])?;
        }
        writer.write_record(["Date of Invoice", doc.invoice_date.format("%d-%m-%Y").to_string().as_str()])?;
        writer.write_record(["Period", doc.period_label.as_str()])?;
        for line in &doc.project_lines {
            writer.write_record(["Project", line.as_str()])?;
        }

        writer.write_record([""])?;
        writer.write_record(["Description", "Taxable Value", "CGST 9%", "SGST 9%"])?;
        writer.write_record([
            doc.description.clone(),
            fixed(&doc.taxable_value, 4),
            fixed(&doc.cgst, 4),
            fixed(&doc.sgst, 4),
        ])?;
        writer.write_record(["Total Invoice Value", fixed(&doc.total, 4).as_str()])?;
        writer.write_record(["Amount in Words", doc.amount_in_words.as_str()])?;

        writer.flush()?;
        tracing::info!("发票已生成: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceIssuance, InvoiceCalculationResult, Month};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn worksheet_has_device_rows_totals_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvDocumentSink::new(dir.path().join("out"));

        let months = [Month::January, Month::February];
        let devices = vec![
            DeviceIssuance::new("D1", dec("0.5"), "Solar A")
                .with_month(Month::January, dec("40"))
                .with_month(Month::February, dec("60")),
            DeviceIssuance::new("D2", dec("4"), "Wind B")
                .with_month(Month::January, dec("900"))
                .with_month(Month::February, dec("0")),
        ];
        let result = InvoiceCalculationResult {
            total_capacity: dec("4.5"),
            total_devices: 2,
            total_issued: dec("1000"),
            registration_fee: dec("1100"),
            issuance_fee: dec("25"),
            gross_amount: dec("8300"),
            reg_fee_inr: dec("99000"),
            issuance_fee_inr: dec("2250"),
            net_revenue: dec("-92950"),
            success_fee: dec("-9295"),
            final_revenue: dec("-83655"),
            net_rate: dec("-83.655"),
        };
        let doc = WorksheetDocument::build("Alpha Power Ltd.", 2024, &months, &devices, &result);

        let path = sink.render_worksheet(&doc).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "worksheet_Alpha_Power_Ltd__2024_January-February.csv"
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Device ID,Project,Capacity (MW),January,February,Total Issued");
        assert_eq!(lines[1], "D1,Solar A,0.50,40.0000,60.0000,100.0000");
        assert_eq!(lines[3], "Total,,4.50,940.0000,60.0000,1000.0000");
        assert!(content.contains("Net Rate (INR/unit),-83.6550"));
    }
}
