//! 商品名 → ハザード分類の解決パイプライン
//!
//! # 処理の流れ
//! 1. クエリを小文字化
//! 2. キーワードテーブルを先頭から走査し、最初に含まれたトリガーで学名に変換
//! 3. PubChem で CID を検索（失敗したら found=false で打ち切り）
//! 4. GHS分類ビューを取得（失敗しても found=true のまま「データなし」に退化）
//! 5. 生テキストへのコード部分文字列チェックでハザードタグを導出
//!
//! 結果はあくまでヒューリスティックな提案であり、安全性の正式な判定ではない。
//! キャッシュは行わず、同じクエリでも毎回 PubChem に問い合わせる。

use serde::{Deserialize, Serialize};

use crate::pubchem::client::PubChemClientTrait;

/// トリガー → 学名の変換テーブル
///
/// 先頭から走査して最初に一致したトリガーが勝つ（最長一致ではない）。
/// 複数トリガーを含むクエリ（例: "alcohol" と "spirit" の両方を含む商品名）は
/// テーブル順で結果が変わる。既知の仕様であり、並び替える場合は要レビュー。
pub const KEYWORD_TABLE: &[(&str, &str)] = &[
    ("clorox", "sodium hypochlorite"),
    ("bleach", "sodium hypochlorite"),
    ("domestos", "sodium hypochlorite"),
    ("acetone", "acetone"),
    ("polish remover", "acetone"),
    ("spirit", "mineral spirits"),
    ("turpentine", "turpentine"),
    ("ethanol", "ethanol"),
    ("alcohol", "ethanol"),
    ("methanol", "methanol"),
    ("drain", "sodium hydroxide"),
    ("soda", "sodium bicarbonate"),
];

/// GHSハザードコードのファミリー → 表示タグ
///
/// 部分文字列チェックなので "H314" は "H31"、"H400" は "H4" に一致する
const HAZARD_CODE_FAMILIES: &[(&str, &str)] = &[
    ("H22", "Flammable"),
    ("H30", "Toxic"),
    ("H31", "Irritant"),
    ("H35", "Carcinogenic"),
    ("H4", "Aquatic Hazard"),
];

/// コードが1つも見つからなかったときの番兵タグ
///
/// 「照会したがデータがなかった」ことを示し、照会自体の失敗（found=false）とは区別する
pub const NO_HAZARD_DATA: &str = "Check SDS";

/// 解決結果（都度生成し、永続化もキャッシュもしない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub found: bool,
    pub suggested_name: Option<String>,
    pub hazards: Vec<String>,
    pub sds_link: Option<String>,
    pub description: String,
}

impl Resolution {
    fn not_found(query: &str) -> Self {
        Self {
            found: false,
            suggested_name: None,
            hazards: Vec::new(),
            sds_link: None,
            description: format!("No PubChem match for '{query}'"),
        }
    }
}

/// 商品名を学名に変換する
///
/// 小文字化したクエリに対してテーブルを先頭から走査し、最初に含まれた
/// トリガーの学名を返す。どのトリガーも含まれない場合は小文字化した
/// クエリをそのまま返す（パススルー）。
pub fn translate_product_name(query: &str) -> String {
    let normalized = query.to_lowercase();
    for (trigger, canonical) in KEYWORD_TABLE {
        if normalized.contains(trigger) {
            return (*canonical).to_string();
        }
    }
    normalized
}

/// GHS分類ビューの生テキストからハザードタグを導出する
///
/// ツリー構造はパースせず、コードファミリーの部分文字列の有無だけを見る。
/// 将来構造化パーサに置き換える場合もこの関数の差し替えで済む。
pub fn derive_hazard_tags(raw_detail: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for (code_prefix, tag) in HAZARD_CODE_FAMILIES {
        if raw_detail.contains(code_prefix) && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }

    if tags.is_empty() {
        tags.push(NO_HAZARD_DATA.to_string());
    }
    tags
}

/// ハザード解決サービス
///
/// キーワード変換と PubChem 照会をまとめ、失敗をすべて境界内で吸収する。
/// リモート呼び出し・パースの失敗が呼び出し側に伝播することはない。
pub struct HazardResolutionService<C: PubChemClientTrait> {
    client: C,
    web_base_url: String,
}

impl<C: PubChemClientTrait> HazardResolutionService<C> {
    pub fn new(client: C, web_base_url: &str) -> Self {
        Self {
            client,
            web_base_url: web_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// SDSセクションへの参照URLを構築
    fn sds_link(&self, cid: u64) -> String {
        format!(
            "{}/compound/{}#section=Safety-and-Hazards",
            self.web_base_url, cid
        )
    }

    /// 商品名からハザード分類を解決する
    ///
    /// CID検索の失敗（接続不可・非2xx・不正な応答・CIDゼロ件）はすべて
    /// found=false に畳み込む。リトライはしない。
    pub async fn resolve(&self, query: &str) -> Resolution {
        self.resolve_with_cid(query).await.0
    }

    /// 一括インポート用の解決
    ///
    /// resolve と同じパイプラインに加え、PubChem の正式名称（Title）で
    /// suggested_name を置き換える。Title取得の失敗は学名のまま退化する。
    pub async fn resolve_for_import(&self, raw_value: &str) -> Resolution {
        let (mut resolution, cid) = self.resolve_with_cid(raw_value).await;

        if let (true, Some(cid)) = (resolution.found, cid) {
            match self.client.fetch_title(cid).await {
                Ok(title) if !title.is_empty() => {
                    resolution.suggested_name = Some(title);
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Title lookup failed for CID {cid}, keeping canonical name: {e}");
                }
            }
        }

        resolution
    }

    async fn resolve_with_cid(&self, query: &str) -> (Resolution, Option<u64>) {
        let canonical = translate_product_name(query);
        log::info!("Resolving chemical name (query_length={})", query.len());

        let cids = match self.client.search_cids(&canonical).await {
            Ok(cids) => cids,
            Err(e) => {
                log::warn!("CID search failed: {e}");
                return (Resolution::not_found(&canonical), None);
            }
        };

        // 最初のCIDを採用する（PubChem の返却順に従う）
        let cid = match cids.first() {
            Some(cid) => *cid,
            None => {
                log::info!("CID search returned no results");
                return (Resolution::not_found(&canonical), None);
            }
        };

        // 詳細取得の失敗は全体を失敗させず「データなし」に退化させる
        let hazards = match self.client.fetch_ghs_classification(cid).await {
            Ok(raw) => derive_hazard_tags(&raw),
            Err(e) => {
                log::warn!("GHS classification fetch failed for CID {cid}: {e}");
                vec![NO_HAZARD_DATA.to_string()]
            }
        };

        let resolution = Resolution {
            found: true,
            suggested_name: Some(canonical),
            hazards,
            sds_link: Some(self.sds_link(cid)),
            description: format!("Matched PubChem CID {cid}"),
        };
        (resolution, Some(cid))
    }
}
