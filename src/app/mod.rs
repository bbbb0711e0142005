//! TUIのイベントループ、入力処理、状態管理。

mod handlers;
mod render;

use anyhow::Result;
use crossterm::event::{self, Event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    error::FailureKind,
    events::UiState,
    input::InputBoxState,
    jobs::{Job, JobStatus},
    materializer::SaveTarget,
    media::PreviewRegistry,
    operation::Operation,
    session::Session,
    shortcuts::Shortcuts,
    ui::Tui,
    worker::{self, WorkerCmd, WorkerEvent},
};

use handlers::{handle_key, is_ctrl_c};
use render::draw;

/// 入力処理と描画で共有するアプリ状態。
pub struct App {
    /// 永続化された設定ファイルのパス。
    pub cfg_path: PathBuf,
    /// メモリ上の現在設定。
    pub cfg: Config,
    /// 選択位置やステータスなどUI固有の状態。
    pub ui: UiState,
    /// 作業セット・ジョブ・結果。
    pub session: Session,
    /// Workerへのコマンド送信チャネル。
    pub worker_tx: mpsc::Sender<WorkerCmd>,
    /// Workerからのイベント受信チャネル。
    pub worker_rx: mpsc::Receiver<WorkerEvent>,

    /// 設定画面で編集するベースURL。
    pub base_url: String,
    /// 設定画面で編集する保存先フォルダ。
    pub output_dir: String,

    /// 入力ボックスの状態（入力中はSome）。
    pub input_box: Option<InputBoxState>,

    /// ショートカットキー設定。
    pub shortcuts: Shortcuts,
}

/// 結果一覧の1行（操作と保存対象）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRow {
    pub operation: Operation,
    pub target: SaveTarget,
    pub file_name: String,
}

impl App {
    /// 設定とWorkerチャネルからアプリ状態を組み立てる。
    pub fn new(
        cfg_path: PathBuf,
        cfg: Config,
        shortcuts: Shortcuts,
        worker_tx: mpsc::Sender<WorkerCmd>,
        worker_rx: mpsc::Receiver<WorkerEvent>,
    ) -> Self {
        Self {
            cfg_path,
            base_url: cfg.server.base_url.clone(),
            output_dir: cfg.download.output_dir.display().to_string(),
            cfg,
            ui: UiState::new(),
            session: Session::new(PreviewRegistry::default()),
            worker_tx,
            worker_rx,
            input_box: None,
            shortcuts,
        }
    }

    /// 結果パネルに並ぶ保存可能な単位を列挙する。
    pub fn result_rows(&self) -> Vec<ResultRow> {
        let mut rows = vec![];
        for (op, payload) in self.session.results() {
            // 先頭がアーカイブまたは結合テキスト、以降が個別レコード。
            for (i, unit) in payload.units(op).into_iter().enumerate() {
                let target = if i == 0 {
                    SaveTarget::Primary
                } else {
                    SaveTarget::Record(i - 1)
                };
                rows.push(ResultRow {
                    operation: op,
                    target,
                    file_name: unit.file_name,
                });
            }
        }
        rows
    }

    /// 選択中の操作。
    pub fn selected_operation(&self) -> Operation {
        Operation::ALL[self.ui.selected_action.min(Operation::ALL.len() - 1)]
    }
}

/// ユーザーが終了するまでメインTUIループを回す。
pub async fn run_app(terminal: &mut Tui) -> Result<()> {
    // 設定ファイルを読み込む（初回はデフォルトを生成）。
    let cfg_path = PathBuf::from("config.toml");
    let cfg = Config::load_or_default(&cfg_path)?;

    // ショートカット設定を読み込む（無ければデフォルト）。
    let shortcuts = Shortcuts::load_or_default("shortcut.toml")?;

    // Worker通信用のコマンド/イベントチャネルを作る。
    let (tx_cmd, rx_cmd) = mpsc::channel::<WorkerCmd>(64);
    let (tx_ev, rx_ev) = mpsc::channel::<WorkerEvent>(256);

    // 初期設定スナップショットでWorkerを起動する。
    tokio::spawn(worker::run(rx_cmd, tx_ev, cfg.clone()));

    let mut app = App::new(cfg_path, cfg, shortcuts, tx_cmd, rx_ev);
    app.ui.notify(format!("Server: {}", app.cfg.server.base_url));

    loop {
        // 現在の状態を描画する。
        terminal.draw(|f| draw(f, &app))?;

        // 入力処理の前にWorkerイベントを消化する。
        while let Ok(ev) = app.worker_rx.try_recv() {
            handle_worker_event(&mut app, ev);
        }

        // UIの応答性確保のため短いタイムアウトで入力をポーリングする。
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(k) = event::read()?
        {
            // どのフェーズでもCtrl+Cで終了できるようにする。
            if is_ctrl_c(&k) {
                break;
            }
            if handle_key(&mut app, k).await? {
                break;
            }
        }
    }

    // 実行中のジョブは中断して終了する。
    let pending: Vec<Operation> = app.session.pending().map(|j| j.operation).collect();
    for op in pending {
        let _ = app.worker_tx.send(WorkerCmd::Cancel(op)).await;
    }
    Ok(())
}

/// WorkerイベントをUI状態へ反映する。
pub(crate) fn handle_worker_event(app: &mut App, ev: WorkerEvent) {
    match ev {
        WorkerEvent::MediaLoaded(items) => {
            // 読み込んだ順に作業セットへ追加する。
            let n = items.len();
            app.session.working_set.add_files(items);
            app.ui.notify(format!("Added {n} file(s)"));
        }
        WorkerEvent::Progress { operation, value } => {
            app.session.progress(operation, value);
        }
        WorkerEvent::JobFinished(job) => {
            let msg = finished_message(&job);
            app.ui.error = match &job.status {
                JobStatus::Failed { .. } => Some(msg.clone()),
                _ => None,
            };
            app.session.finish(job);
            app.ui.notify(msg);
        }
        WorkerEvent::Saved { operation, path } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            app.ui.error = None;
            app.ui.notify(format!("{operation}: {name} saved to {}", path.display()));
        }
        WorkerEvent::Log(s) => {
            app.ui.notify(s);
        }
        WorkerEvent::Error(s) => {
            app.ui.notify(format!("Error: {s}"));
            app.ui.error = Some(s);
        }
    }
}

/// 終端ジョブの通知文言を作る。
fn finished_message(job: &Job) -> String {
    let op = job.operation;
    match &job.status {
        JobStatus::Succeeded => format!("{op} completed successfully."),
        JobStatus::Failed { kind, message } => match kind {
            // 通信失敗とサーバー拒否は同じ汎用メッセージで通知する。
            FailureKind::OperationFailed => {
                format!("Failed to {}.", op.label().to_lowercase())
            }
            FailureKind::BadResult => format!("{op}: unusable result ({message})"),
            FailureKind::Cancelled => format!("{op} cancelled."),
            FailureKind::SaveFailed | FailureKind::Refused => format!("{op}: {message}"),
        },
        JobStatus::Pending => format!("{op} is still running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::CaptureError,
        materializer::{self, tests::zip_of},
        media::MediaItem,
    };

    fn test_app() -> App {
        let (tx_cmd, _rx_cmd) = mpsc::channel(4);
        let (_tx_ev, rx_ev) = mpsc::channel(4);
        App::new(
            PathBuf::from("config.toml"),
            Config::default(),
            Shortcuts::default(),
            tx_cmd,
            rx_ev,
        )
    }

    #[test]
    fn test_media_loaded_appends_to_working_set() {
        // 読み込んだメディアが作業セットに追加されることを検証する。
        let mut app = test_app();
        handle_worker_event(
            &mut app,
            WorkerEvent::MediaLoaded(vec![
                MediaItem::from_bytes("a.mp4", vec![]),
                MediaItem::from_bytes("b.mp4", vec![]),
            ]),
        );
        assert_eq!(app.session.working_set.len(), 2);
        assert_eq!(app.ui.status, "Added 2 file(s)");
    }

    #[test]
    fn test_transport_failure_uses_generic_notice() {
        // 通信失敗時は汎用の失敗メッセージになることを検証する。
        let mut app = test_app();
        app.session.begin(Operation::ExtractSourceCode).unwrap();
        let mut job = Job::new(Operation::ExtractSourceCode, 0);
        job.fail(&CaptureError::Rejected { status: 404 });
        handle_worker_event(&mut app, WorkerEvent::JobFinished(job));

        assert_eq!(app.ui.status, "Failed to extract source code.");
        assert!(app.ui.error.is_some());
        assert!(!app.session.is_pending(Operation::ExtractSourceCode));
    }

    #[test]
    fn test_result_rows_list_structured_records() {
        // 構造化結果が結合テキスト＋個別レコードとして並ぶことを検証する。
        let mut app = test_app();
        let mut job = Job::new(Operation::TranscribeVideo, 1);
        job.succeed(
            materializer::materialize(
                Operation::TranscribeVideo,
                Some("application/json"),
                br#"[{"filename":"a.txt","content":"A"},{"filename":"b.txt","content":"B"}]"#
                    .to_vec(),
            )
            .unwrap(),
        );
        handle_worker_event(&mut app, WorkerEvent::JobFinished(job));

        let mut job = Job::new(Operation::ExtractSourceCode, 1);
        job.succeed(
            materializer::materialize(
                Operation::ExtractSourceCode,
                None,
                zip_of(&[("main.py", "x")]),
            )
            .unwrap(),
        );
        handle_worker_event(&mut app, WorkerEvent::JobFinished(job));

        let rows = app.result_rows();
        let names: Vec<_> = rows.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "generated_transcription.txt",
                "a.txt",
                "b.txt",
                "extracted_source_code.zip"
            ]
        );
        assert_eq!(rows[2].target, SaveTarget::Record(1));
        assert_eq!(app.ui.status, "Extract Source Code completed successfully.");
    }
}
