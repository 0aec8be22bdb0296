//! PubChem 連携モジュール
//!
//! 商品名からハザード分類を推定するための PubChem PUG REST 呼び出しを担当する。
//! 結果はヒューリスティックな提案であり、正式な安全性判定には使わないこと。

pub mod client;
pub mod resolver;

pub use client::{PubChemClient, PubChemClientTrait, PubChemError};
pub use resolver::{
    derive_hazard_tags, translate_product_name, HazardResolutionService, Resolution,
    KEYWORD_TABLE, NO_HAZARD_DATA,
};
