//! 実DB（インメモリSQLite）を使った在庫サービスの統合テスト

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use chemtrack::repository::{run_migrations, NewChemical, SqliteChemicalRepository};

// テスト用のデータベースプールを作成（1接続に固定しないとDBが分かれる）
async fn create_test_repo() -> SqliteChemicalRepository {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    run_migrations(&pool).await.unwrap();
    SqliteChemicalRepository::new(pool)
}

fn submitted_record() -> NewChemical {
    NewChemical {
        name: "Sodium Hypochlorite".to_string(),
        cas_number: "7681-52-9".to_string(),
        barcode: Some("4901990000000".to_string()),
        tracking_id: None,
        quantity_value: 500.0,
        quantity_unit: "ml".to_string(),
        hazards: "Irritant, Aquatic Hazard".to_string(),
        sds_link: Some(
            "https://pubchem.ncbi.nlm.nih.gov/compound/23665760#section=Safety-and-Hazards"
                .to_string(),
        ),
        description: Some("Bleach shelf A".to_string()),
    }
}

#[tokio::test]
async fn test_submit_then_list_round_trip() {
    let repo = create_test_repo().await;

    let submitted = submitted_record();
    let created = chemtrack::create_chemical(&repo, submitted.clone())
        .await
        .unwrap();

    let listed = chemtrack::list_chemicals(&repo, 0, 100).await.unwrap();
    assert_eq!(listed.len(), 1);
    let listed = &listed[0];

    // サーバ採番のIDと自動生成トラッキングID以外は送信値と一致する
    assert_eq!(listed.id, created.id);
    assert_eq!(listed.name, submitted.name);
    assert_eq!(listed.cas_number, submitted.cas_number);
    assert_eq!(listed.barcode, submitted.barcode);
    assert_eq!(listed.quantity_value, submitted.quantity_value);
    assert_eq!(listed.quantity_unit, submitted.quantity_unit);
    assert_eq!(listed.hazards, submitted.hazards);
    assert_eq!(listed.sds_link, submitted.sds_link);
    assert_eq!(listed.description, submitted.description);

    // 自動生成されたトラッキングIDは8桁
    assert_eq!(listed.tracking_id.as_deref().map(str::len), Some(8));
}

#[tokio::test]
async fn test_duplicate_tracking_id_rejected_end_to_end() {
    let repo = create_test_repo().await;

    let mut first = submitted_record();
    first.tracking_id = Some("shelf-42".to_string());
    chemtrack::create_chemical(&repo, first).await.unwrap();

    let mut second = submitted_record();
    second.barcode = None;
    second.tracking_id = Some("shelf-42".to_string());

    let err = chemtrack::create_chemical(&repo, second).await.unwrap_err();
    assert_eq!(err, "Tracking ID already registered");
}

#[tokio::test]
async fn test_search_round_trip() {
    let repo = create_test_repo().await;

    chemtrack::create_chemical(&repo, submitted_record())
        .await
        .unwrap();

    let mut other = submitted_record();
    other.name = "Ethanol".to_string();
    other.cas_number = "64-17-5".to_string();
    other.barcode = None;
    chemtrack::create_chemical(&repo, other).await.unwrap();

    let hits = chemtrack::search_chemicals(&repo, "hypochlorite").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "Sodium Hypochlorite");

    let by_cas = chemtrack::search_chemicals(&repo, "64-17-5").await.unwrap();
    assert_eq!(by_cas.len(), 1);
    assert_eq!(by_cas[0].name, "Ethanol");
}

#[tokio::test]
async fn test_export_csv_round_trip() {
    let repo = create_test_repo().await;

    chemtrack::create_chemical(&repo, submitted_record())
        .await
        .unwrap();

    let csv = chemtrack::export_inventory_csv(&repo).await.unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "ID,Name,CAS Number,Barcode,Tracking ID,Quantity,Unit,Hazards,SDS Link"
    );
    assert!(lines[1].contains("Sodium Hypochlorite"));
    assert!(lines[1].contains("7681-52-9"));
    // hazards はカンマを含むためクォートされる
    assert!(lines[1].contains("\"Irritant, Aquatic Hazard\""));
}
