//! マイグレーションSQLのスキーマ検証。barcode は 002 で追加され 001 には無いことなど。

const INIT_SQL: &str = include_str!("../migrations/001_init.sql");
const BARCODE_SQL: &str = include_str!("../migrations/002_add_barcode.sql");

#[test]
fn test_init_creates_chemicals_table() {
    let lower = INIT_SQL.to_lowercase();
    assert!(
        lower.contains("create table if not exists chemicals"),
        "001_init must create table chemicals"
    );
}

#[test]
fn test_init_chemicals_columns() {
    let block = extract_chemicals_create_block(INIT_SQL);
    for column in [
        "name",
        "cas_number",
        "tracking_id",
        "quantity_value",
        "quantity_unit",
        "hazards",
        "sds_link",
        "description",
        "created_at",
    ] {
        assert!(
            block.contains(column),
            "chemicals table must define {column}"
        );
    }
}

#[test]
fn test_init_tracking_id_is_unique() {
    let block = extract_chemicals_create_block(INIT_SQL);
    let tracking_line = block
        .lines()
        .find(|l| l.contains("tracking_id"))
        .expect("tracking_id column not found");
    assert!(
        tracking_line.contains("UNIQUE"),
        "tracking_id must carry a UNIQUE constraint"
    );
}

#[test]
fn test_barcode_arrives_in_second_migration() {
    // barcode はスキャナ対応で後から追加された列
    let block = extract_chemicals_create_block(INIT_SQL);
    assert!(
        !block.contains("barcode"),
        "001_init must not define barcode"
    );
    assert!(
        BARCODE_SQL.contains("ALTER TABLE chemicals ADD COLUMN barcode"),
        "002 must add the barcode column"
    );
}

fn extract_chemicals_create_block(s: &str) -> String {
    let start = "CREATE TABLE IF NOT EXISTS chemicals (";
    let i = s.find(start).expect("chemicals CREATE TABLE block not found");
    let rest = &s[i + start.len()..];
    let depth = rest
        .chars()
        .scan(1i32, |d, c| {
            match c {
                '(' => *d += 1,
                ')' => *d -= 1,
                _ => {}
            }
            Some(*d)
        })
        .position(|d| d == 0)
        .expect("matching ')' for chemicals block");
    rest[..depth].to_string()
}
