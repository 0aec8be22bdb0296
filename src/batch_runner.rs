//! 汎用的なバッチ処理エンジン
//!
//! # 概要
//! 一括インポートなど、外部APIを繰り返し呼ぶ処理で共通して使用される
//! 処理ロジックを一元化し、進捗ログやレート制限ディレイを統一的に管理します。
//!
//! # 使用例
//! ```ignore
//! use crate::batch_runner::{BatchTask, BatchRunner};
//!
//! struct MyTask;
//!
//! #[async_trait]
//! impl BatchTask for MyTask {
//!     type Input = String;
//!     type Output = i32;
//!     type Context = MyContext;
//!
//!     fn name(&self) -> &str { "my task" }
//!
//!     async fn process(&self, input: Self::Input, ctx: &Self::Context) -> Result<Self::Output, String> {
//!         // 1件分の処理
//!         Ok(input.len() as i32)
//!     }
//! }
//!
//! let runner = BatchRunner::new(MyTask, 10, 1000);
//! let result = runner.run(inputs, &context, || false).await?;
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

/// バッチ処理の1タスクを定義するトレイト
///
/// # フック
/// - `before_batch`: バッチ処理前に呼び出される（キャッシュ一括取得等に使用）
/// - `process_batch`: バッチ単位での処理（デフォルトは1件ずつ `process` を呼び出す）
/// - `after_batch`: バッチ処理後に呼び出される（一括DB保存等に使用）
#[async_trait]
pub trait BatchTask: Send + Sync {
    /// 入力データの型
    type Input: Send + Clone;
    /// 出力データの型
    type Output: Send;
    /// コンテキスト（DBプールやAPIクライアントなど）の型
    type Context: Send + Sync;

    /// タスク名（ログ表示用）
    fn name(&self) -> &str;

    /// 1件分の処理を実行
    async fn process(
        &self,
        input: Self::Input,
        context: &Self::Context,
    ) -> Result<Self::Output, String>;

    /// バッチ処理前のフック（オプション）
    async fn before_batch(
        &self,
        _inputs: &[Self::Input],
        _context: &Self::Context,
    ) -> Result<(), String> {
        Ok(())
    }

    /// バッチ単位での処理（オプション）
    ///
    /// デフォルトは1件ずつ `process` を呼び出します。
    /// チャンク単位でAPI呼び出しをまとめたい場合にオーバーライドします。
    async fn process_batch(
        &self,
        inputs: Vec<Self::Input>,
        context: &Self::Context,
    ) -> Vec<Result<Self::Output, String>> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            results.push(self.process(input, context).await);
        }
        results
    }

    /// バッチ処理後のフック（オプション）
    async fn after_batch(
        &self,
        _batch_number: usize,
        _results: &[Result<Self::Output, String>],
        _context: &Self::Context,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// バッチ処理の結果
#[derive(Debug, Clone)]
pub struct BatchResult<O> {
    /// 成功した処理結果のリスト
    pub outputs: Vec<O>,
    /// 成功件数
    pub success_count: usize,
    /// 失敗件数
    pub failed_count: usize,
    /// 途中キャンセルされたか
    pub cancelled: bool,
}

/// バッチ処理エンジン
///
/// `BatchTask`を実装したタスクを、指定されたバッチサイズとディレイで実行します。
pub struct BatchRunner<T: BatchTask> {
    task: T,
    batch_size: usize,
    delay_ms: u64,
}

impl<T: BatchTask> BatchRunner<T> {
    /// 新しいBatchRunnerを作成
    ///
    /// # Arguments
    /// * `task` - 実行するタスク
    /// * `batch_size` - 1バッチあたりの処理件数
    /// * `delay_ms` - バッチ間のディレイ（ミリ秒）
    pub fn new(task: T, batch_size: usize, delay_ms: u64) -> Self {
        Self {
            task,
            batch_size: batch_size.max(1),
            delay_ms,
        }
    }

    /// バッチ処理を実行
    ///
    /// # Arguments
    /// * `inputs` - 処理対象の入力データリスト
    /// * `context` - 処理に必要なコンテキスト
    /// * `should_cancel` - キャンセルチェック関数（trueを返すと処理を中断）
    pub async fn run(
        &self,
        inputs: Vec<T::Input>,
        context: &T::Context,
        should_cancel: impl Fn() -> bool,
    ) -> Result<BatchResult<T::Output>, String> {
        let total_items = inputs.len();
        let task_name = self.task.name();

        log::info!(
            "[{}] Starting batch processing: {} items, batch_size={}, delay={}ms",
            task_name,
            total_items,
            self.batch_size,
            self.delay_ms
        );

        let mut outputs: Vec<T::Output> = Vec::with_capacity(total_items);
        let mut success_count: usize = 0;
        let mut failed_count: usize = 0;
        let mut processed_count: usize = 0;
        let mut batch_number: usize = 0;

        for chunk in inputs.chunks(self.batch_size) {
            // キャンセルチェック
            if should_cancel() {
                log::info!(
                    "[{}] Processing cancelled: {}/{} items processed",
                    task_name,
                    processed_count,
                    total_items
                );
                return Ok(BatchResult {
                    outputs,
                    success_count,
                    failed_count,
                    cancelled: true,
                });
            }

            batch_number += 1;

            // 2バッチ目以降はディレイを入れる（レート制限対策）
            if batch_number > 1 && self.delay_ms > 0 {
                log::debug!(
                    "[{}] Waiting {}ms before batch {}",
                    task_name,
                    self.delay_ms,
                    batch_number
                );
                sleep(Duration::from_millis(self.delay_ms)).await;
            }

            if let Err(e) = self.task.before_batch(chunk, context).await {
                log::error!("[{}] before_batch failed: {}", task_name, e);
                return Err(e);
            }

            let chunk_vec: Vec<T::Input> = chunk.to_vec();
            let batch_results = self.task.process_batch(chunk_vec, context).await;

            let mut batch_success = 0;
            let mut batch_failed = 0;
            for result in &batch_results {
                match result {
                    Ok(_) => {
                        success_count += 1;
                        batch_success += 1;
                    }
                    Err(e) => {
                        log::warn!("[{}] Item processing failed: {}", task_name, e);
                        failed_count += 1;
                        batch_failed += 1;
                    }
                }
                processed_count += 1;
            }

            if let Err(e) = self
                .task
                .after_batch(batch_number, &batch_results, context)
                .await
            {
                log::error!("[{}] after_batch failed: {}", task_name, e);
                return Err(e);
            }

            for result in batch_results {
                if let Ok(output) = result {
                    outputs.push(output);
                }
            }

            log::info!(
                "[{}] Batch {} complete: {} success, {} failed ({}/{} items)",
                task_name,
                batch_number,
                batch_success,
                batch_failed,
                processed_count,
                total_items
            );
        }

        log::info!(
            "[{}] Batch processing complete: {} success, {} failed",
            task_name,
            success_count,
            failed_count
        );

        Ok(BatchResult {
            outputs,
            success_count,
            failed_count,
            cancelled: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // テスト用のモックタスク
    struct MockTask {
        fail_indices: Vec<usize>,
    }

    #[async_trait]
    impl BatchTask for MockTask {
        type Input = usize;
        type Output = String;
        type Context = ();

        fn name(&self) -> &str {
            "test task"
        }

        async fn process(
            &self,
            input: Self::Input,
            _ctx: &Self::Context,
        ) -> Result<Self::Output, String> {
            if self.fail_indices.contains(&input) {
                Err(format!("Failed for index {}", input))
            } else {
                Ok(format!("Result for {}", input))
            }
        }
    }

    #[test]
    fn test_batch_runner_new_clamps_zero_batch_size() {
        let task = MockTask {
            fail_indices: vec![],
        };
        let runner = BatchRunner::new(task, 0, 1000);
        assert_eq!(runner.batch_size, 1);
        assert_eq!(runner.delay_ms, 1000);
    }

    #[tokio::test]
    async fn test_run_all_success() {
        let task = MockTask {
            fail_indices: vec![],
        };
        let runner = BatchRunner::new(task, 2, 0);

        let result = runner.run(vec![0, 1, 2, 3, 4], &(), || false).await.unwrap();
        assert_eq!(result.success_count, 5);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.outputs.len(), 5);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_run_counts_failures_and_continues() {
        let task = MockTask {
            fail_indices: vec![1, 3],
        };
        let runner = BatchRunner::new(task, 2, 0);

        let result = runner.run(vec![0, 1, 2, 3, 4], &(), || false).await.unwrap();
        assert_eq!(result.success_count, 3);
        assert_eq!(result.failed_count, 2);
        assert_eq!(
            result.outputs,
            vec![
                "Result for 0".to_string(),
                "Result for 2".to_string(),
                "Result for 4".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_run_cancel_before_first_batch() {
        let task = MockTask {
            fail_indices: vec![],
        };
        let runner = BatchRunner::new(task, 2, 0);

        let result = runner.run(vec![0, 1, 2], &(), || true).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(result.success_count, 0);
        assert!(result.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_run_empty_input() {
        let task = MockTask {
            fail_indices: vec![],
        };
        let runner = BatchRunner::new(task, 10, 0);

        let result = runner.run(vec![], &(), || false).await.unwrap();
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failed_count, 0);
        assert!(!result.cancelled);
    }
}
