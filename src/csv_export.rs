//! 在庫のCSVエクスポート
//!
//! 全レコードをCSVテキストに整形する。列構成はラベル印刷ツール側と
//! 合わせてあるため、並びを変える場合は両方を更新すること。

use crate::repository::Chemical;

const CSV_HEADER: &[&str] = &[
    "ID",
    "Name",
    "CAS Number",
    "Barcode",
    "Tracking ID",
    "Quantity",
    "Unit",
    "Hazards",
    "SDS Link",
];

/// カンマ・引用符・改行を含むフィールドをダブルクォートで包む
fn escape_csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row(out: &mut String, fields: &[String]) {
    let escaped: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
    out.push_str(&escaped.join(","));
    out.push_str("\r\n");
}

/// 在庫レコードをCSVテキストに変換する
pub fn render_inventory_csv(records: &[Chemical]) -> String {
    let mut out = String::new();
    write_row(
        &mut out,
        &CSV_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
    );

    for record in records {
        write_row(
            &mut out,
            &[
                record.id.to_string(),
                record.name.clone(),
                record.cas_number.clone(),
                record.barcode.clone().unwrap_or_default(),
                record.tracking_id.clone().unwrap_or_default(),
                record.quantity_value.to_string(),
                record.quantity_unit.clone(),
                record.hazards.clone(),
                record.sds_link.clone().unwrap_or_default(),
            ],
        );
    }

    out
}
