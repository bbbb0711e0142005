//! ジョブとその状態のモデル。

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{CaptureError, FailureKind},
    materializer::ResultPayload,
    operation::Operation,
};

/// ジョブの進行状態。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// サーバー応答待ち。
    Pending,
    /// 正常完了（結果はResultPayloadとして保持）。
    Succeeded,
    /// 失敗（分類とエラーメッセージ付き）。
    Failed { kind: FailureKind, message: String },
}

impl JobStatus {
    /// 終端状態かどうか。
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// 1回の操作実行とそのライフサイクル。
#[derive(Clone, Debug)]
pub struct Job {
    /// 状態更新に使う安定ID。
    pub id: Uuid,
    /// 実行した操作。
    pub operation: Operation,
    /// 送信したファイル数。
    pub item_count: usize,
    /// 現在の処理状態。
    pub status: JobStatus,
    /// 推定進捗（0..=100）。
    pub progress: u8,
    /// 成功時の結果。
    pub result: Option<Arc<ResultPayload>>,
}

impl Job {
    /// 待機状態でジョブを作成する。
    pub fn new(operation: Operation, item_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            item_count,
            status: JobStatus::Pending,
            // 送信直後は1%から始める。
            progress: 1,
            result: None,
        }
    }

    /// 成功として確定する。
    pub fn succeed(&mut self, payload: ResultPayload) {
        self.status = JobStatus::Succeeded;
        self.result = Some(Arc::new(payload));
        self.progress = 100;
    }

    /// 失敗として確定する。結果は保持しない。
    pub fn fail(&mut self, err: &CaptureError) {
        self.status = JobStatus::Failed {
            kind: err.kind(),
            message: err.to_string(),
        };
        self.result = None;
        self.progress = 100;
    }
}
